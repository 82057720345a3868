//! Background snapshot daemon.
//!
//! One process per machine. Every interval it walks the registered repositories
//! and force-captures each workspace's on-disk edits, so changes made by agents
//! outside of weave show up in status and focus without anyone running a command.

pub mod registry;

pub use registry::RepoRegistry;

use crate::errors::{Result, WeaveError};
use crate::repo::WeaveRepo;
use crate::workspace::WorkspaceManager;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use sysinfo::{Pid, Process, ProcessStatus, ProcessesToUpdate, Signal, System};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct DaemonStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub repositories: Vec<PathBuf>,
    pub log_file: PathBuf,
}

/// Outcome of one pass over every registered workspace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotReport {
    pub snapshotted: usize,
    pub failed: usize,
}

pub struct Daemon {
    state_dir: PathBuf,
}

impl Daemon {
    pub const PID_FILE: &'static str = "daemon.pid";
    pub const LOG_FILE: &'static str = "daemon.log";

    pub fn new(state_dir: &Path) -> Self {
        Self {
            state_dir: state_dir.to_path_buf(),
        }
    }

    pub fn pid_file(&self) -> PathBuf {
        self.state_dir.join(Self::PID_FILE)
    }

    pub fn log_file(&self) -> PathBuf {
        self.state_dir.join(Self::LOG_FILE)
    }

    pub fn registry(&self) -> RepoRegistry {
        RepoRegistry::new(&self.state_dir)
    }

    fn recorded_pid(&self) -> Option<u32> {
        fs::read_to_string(self.pid_file())
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    /// Pid of the live daemon. A pid file naming a dead process is removed.
    pub fn running_pid(&self) -> Result<Option<u32>> {
        let Some(pid) = self.recorded_pid() else {
            return Ok(None);
        };
        if process_alive(pid) {
            return Ok(Some(pid));
        }
        debug!("Removing stale daemon pid file (pid {})", pid);
        let pid_file = self.pid_file();
        if pid_file.exists() {
            fs::remove_file(pid_file)?;
        }
        Ok(None)
    }

    /// Launch `<exe> daemon run` detached from the calling terminal
    pub fn start(&self, exe: &Path) -> Result<u32> {
        if let Some(pid) = self.running_pid()? {
            return Err(WeaveError::DaemonRunning(pid));
        }
        fs::create_dir_all(&self.state_dir)?;
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_file())?;

        let mut command = Command::new(exe);
        command
            .args(["daemon", "run"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log));
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let child = command.spawn()?;
        let pid = child.id();
        fs::write(self.pid_file(), pid.to_string())?;
        info!("Started daemon (pid {})", pid);
        Ok(pid)
    }

    pub fn stop(&self) -> Result<u32> {
        let pid = self.running_pid()?.ok_or(WeaveError::DaemonNotRunning)?;
        terminate(pid)?;

        for _ in 0..50 {
            if !process_alive(pid) {
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        if process_alive(pid) {
            warn!("Daemon (pid {}) is still shutting down", pid);
        }
        let pid_file = self.pid_file();
        if pid_file.exists() {
            fs::remove_file(pid_file)?;
        }
        info!("Stopped daemon (pid {})", pid);
        Ok(pid)
    }

    pub fn status(&self) -> Result<DaemonStatus> {
        let pid = self.running_pid()?;
        Ok(DaemonStatus {
            running: pid.is_some(),
            pid,
            repositories: self.registry().list()?,
            log_file: self.log_file(),
        })
    }

    /// Snapshot every workspace of every registered repository, once.
    /// Failures are logged and counted; they never stop the pass.
    pub fn snapshot_pass<F>(&self, open: &F) -> Result<SnapshotReport>
    where
        F: Fn(&Path) -> Result<WeaveRepo>,
    {
        let mut report = SnapshotReport::default();
        for root in self.registry().list()? {
            if !root.join(".jj").exists() {
                debug!("Skipping {} (no longer a repository)", root.display());
                continue;
            }
            match open(&root) {
                Ok(repo) => {
                    let (ok, failed) = snapshot_repo(&repo);
                    report.snapshotted += ok;
                    report.failed += failed;
                }
                Err(e) => {
                    warn!("Could not open {}: {}", root.display(), e);
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Foreground loop behind `weave daemon run`; returns on Ctrl-C or SIGTERM
    pub async fn run<F>(&self, interval: Duration, open: F) -> Result<()>
    where
        F: Fn(&Path) -> Result<WeaveRepo>,
    {
        let own_pid = std::process::id();
        match self.running_pid()? {
            Some(pid) if pid != own_pid => return Err(WeaveError::DaemonRunning(pid)),
            Some(_) => {}
            None => {
                fs::create_dir_all(&self.state_dir)?;
                fs::write(self.pid_file(), own_pid.to_string())?;
            }
        }
        info!(
            "Daemon running (pid {}), snapshotting every {}s",
            own_pid,
            interval.as_secs()
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let shutdown = wait_for_shutdown();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => match self.snapshot_pass(&open) {
                    Ok(report) => debug!(
                        "Snapshot pass: {} ok, {} failed",
                        report.snapshotted, report.failed
                    ),
                    Err(e) => warn!("Snapshot pass failed: {}", e),
                },
                _ = &mut shutdown => break,
            }
        }

        if self.recorded_pid() == Some(own_pid) {
            fs::remove_file(self.pid_file())?;
        }
        info!("Daemon stopped");
        Ok(())
    }
}

/// Returns (snapshotted, failed) for the workspaces of one repository
fn snapshot_repo(repo: &WeaveRepo) -> (usize, usize) {
    let manager = WorkspaceManager::new(repo);
    let workspaces = match manager.list() {
        Ok(list) => list,
        Err(e) => {
            warn!("Could not list workspaces of {}: {}", repo.root().display(), e);
            return (0, 1);
        }
    };

    let mut ok = 0;
    let mut failed = 0;
    for ws in workspaces {
        if !repo.workspace_exists(&ws.name) {
            continue;
        }
        match manager.snapshot(&ws.name) {
            Ok(()) => ok += 1,
            Err(e) if e.is_locked() => {
                debug!("{} is locked, retrying next pass", ws.name);
                failed += 1;
            }
            Err(e) => {
                warn!("Snapshot of {} failed: {}", ws.name, e);
                failed += 1;
            }
        }
    }
    (ok, failed)
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut term) = signal(SignalKind::terminate()) {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
            return;
        }
    }
    let _ = tokio::signal::ctrl_c().await;
}

fn find_process(sys: &mut System, pid: u32) -> Option<&Process> {
    let pid = Pid::from_u32(pid);
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    sys.process(pid).filter(|p| p.status() != ProcessStatus::Zombie)
}

fn process_alive(pid: u32) -> bool {
    find_process(&mut System::new(), pid).is_some()
}

/// Ask the daemon to shut down, killing it outright where signals are unsupported
fn terminate(pid: u32) -> Result<()> {
    let mut sys = System::new();
    let Some(process) = find_process(&mut sys, pid) else {
        return Ok(());
    };
    let sent = process
        .kill_with(Signal::Term)
        .unwrap_or_else(|| process.kill());
    if sent {
        Ok(())
    } else {
        Err(WeaveError::command_failed(
            format!("kill {pid}"),
            "the process did not accept the signal",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::test_support::TestRepo;
    use tempfile::TempDir;

    #[test]
    fn test_status_without_daemon() {
        let tmp = TempDir::new().unwrap();
        let daemon = Daemon::new(tmp.path());
        let status = daemon.status().unwrap();
        assert!(!status.running);
        assert_eq!(status.log_file, tmp.path().join("daemon.log"));
    }

    #[test]
    fn test_stop_without_daemon() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            Daemon::new(tmp.path()).stop(),
            Err(WeaveError::DaemonNotRunning)
        ));
    }

    #[test]
    fn test_stale_pid_file_is_cleared() {
        let tmp = TempDir::new().unwrap();
        let daemon = Daemon::new(tmp.path());
        // Beyond pid_max on every supported platform
        fs::write(daemon.pid_file(), "2147483646").unwrap();

        assert_eq!(daemon.running_pid().unwrap(), None);
        assert!(!daemon.pid_file().exists());
    }

    #[test]
    fn test_process_lookup() {
        assert!(process_alive(std::process::id()));
        assert!(!process_alive(2147483646));
        // Nothing to signal is not an error
        terminate(2147483646).unwrap();
    }

    #[test]
    fn test_start_refuses_when_live_pid_recorded() {
        let tmp = TempDir::new().unwrap();
        let daemon = Daemon::new(tmp.path());
        let own = std::process::id();
        fs::write(daemon.pid_file(), own.to_string()).unwrap();

        match daemon.start(Path::new("/nonexistent/weave")) {
            Err(WeaveError::DaemonRunning(pid)) => assert_eq!(pid, own),
            other => panic!("expected DaemonRunning, got {other:?}"),
        }
        assert!(daemon.status().unwrap().running);
    }

    #[test]
    fn test_snapshot_pass_covers_workspaces_on_disk() {
        let t = TestRepo::new();
        t.create_workspace_dir("agent-a");
        t.runner.on(
            &["workspace", "list"],
            "default: aaa 111 x\nagent-a: bbb 222 y\ngone: ccc 333 z\n",
        );
        let daemon = Daemon::new(t.repo.state_dir());
        daemon.registry().register(t.repo.root()).unwrap();

        let repo = t.repo.clone();
        let report = daemon.snapshot_pass(&|_| Ok(repo.clone())).unwrap();

        assert_eq!(report, SnapshotReport { snapshotted: 2, failed: 0 });
        assert_eq!(t.runner.calls_to("status").len(), 2);
    }

    #[test]
    fn test_snapshot_pass_continues_after_failures() {
        let t = TestRepo::new();
        t.runner.on(&["workspace", "list"], "default: aaa 111 x\n");
        t.runner
            .on_err(&["status"], "Error: The working copy is locked by another process");
        let missing = t.dir.path().join("missing-but-registered");
        fs::create_dir_all(missing.join(".jj")).unwrap();

        let daemon = Daemon::new(t.repo.state_dir());
        daemon.registry().register(&missing).unwrap();
        daemon.registry().register(t.repo.root()).unwrap();

        let repo = t.repo.clone();
        let root = t.repo.root().to_path_buf();
        let report = daemon
            .snapshot_pass(&|path| {
                if path == root {
                    Ok(repo.clone())
                } else {
                    Err(WeaveError::not_found("not a repository"))
                }
            })
            .unwrap();

        assert_eq!(report, SnapshotReport { snapshotted: 0, failed: 2 });
    }
}
