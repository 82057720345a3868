use crate::errors::{Result, WeaveError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

pub mod spinner;

/// Atomic file operations so readers never observe a half-written state file
pub mod atomic_file {
    use super::*;

    /// Write JSON data to a file atomically using a temporary file + rename, under a lock file
    pub fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
        let _lock = file_locking::FileLock::acquire(path)?;
        write_json_unlocked(path, data)
    }

    /// Same as `write_json` for callers already holding the lock
    pub fn write_json_unlocked<T: Serialize>(path: &Path, data: &T) -> Result<()> {
        let content = serde_json::to_string_pretty(data)
            .map_err(|e| WeaveError::config(format!("Failed to serialize data: {e}")))?;

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, content)
            .map_err(|e| WeaveError::config(format!("Failed to write temporary file: {e}")))?;

        fs::rename(&temp_path, path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            WeaveError::config(format!("Failed to finalize file write: {e}"))
        })
    }

    /// Read a JSON file, returning `None` when it does not exist
    pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .map_err(|e| WeaveError::config(format!("Failed to read {}: {e}", path.display())))?;
        let value = serde_json::from_str(&content)
            .map_err(|e| WeaveError::config(format!("Failed to parse {}: {e}", path.display())))?;
        Ok(Some(value))
    }

    /// Remove a file if present
    pub fn remove(path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_file(path).map_err(|e| {
                WeaveError::config(format!("Failed to delete {}: {e}", path.display()))
            })?;
        }
        Ok(())
    }
}

/// Lock files guarding read-modify-write cycles shared with the daemon
pub mod file_locking {
    use super::*;
    use std::fs::{File, OpenOptions};
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    pub struct FileLock {
        _file: File,
        lock_path: PathBuf,
    }

    impl FileLock {
        const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
        const RETRY_INTERVAL: Duration = Duration::from_millis(50);
        /// Lock files older than this were left behind by a crashed process
        const STALE_AFTER: Duration = Duration::from_secs(60);

        pub fn acquire_with_timeout(file_path: &Path, timeout: Duration) -> Result<Self> {
            let lock_path = file_path.with_extension("lock");
            if let Some(parent) = lock_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let start_time = Instant::now();

            loop {
                match Self::try_acquire(&lock_path) {
                    Ok(lock) => return Ok(lock),
                    Err(e) => {
                        if Self::is_stale(&lock_path) {
                            tracing::warn!("Removing stale lock file {:?}", lock_path);
                            let _ = fs::remove_file(&lock_path);
                            continue;
                        }
                        if start_time.elapsed() >= timeout {
                            return Err(WeaveError::config(format!(
                                "Timeout waiting for lock on {file_path:?} after {}ms: {e}",
                                timeout.as_millis()
                            )));
                        }
                        std::thread::sleep(Self::RETRY_INTERVAL);
                    }
                }
            }
        }

        pub fn try_acquire(lock_path: &Path) -> Result<Self> {
            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(lock_path)
                .map_err(|e| {
                    WeaveError::config(format!("Failed to acquire lock {lock_path:?}: {e}"))
                })?;

            Ok(Self {
                _file: file,
                lock_path: lock_path.to_path_buf(),
            })
        }

        pub fn acquire(file_path: &Path) -> Result<Self> {
            Self::acquire_with_timeout(file_path, Self::DEFAULT_TIMEOUT)
        }

        fn is_stale(lock_path: &Path) -> bool {
            fs::metadata(lock_path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| modified.elapsed().ok())
                .map(|age| age > Self::STALE_AFTER)
                .unwrap_or(false)
        }
    }

    impl Drop for FileLock {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.lock_path);
        }
    }

    /// Execute an operation with file locking protection
    pub fn with_file_lock<F, R>(file_path: &Path, operation: F) -> Result<R>
    where
        F: FnOnce() -> Result<R>,
    {
        let _lock = FileLock::acquire(file_path)?;
        operation()
    }
}

/// Quote a string for use inside a backend revset or fileset expression
pub fn quote_expr(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
