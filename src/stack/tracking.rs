use crate::errors::Result;
use crate::providers::PrInfo;
use crate::utils::{atomic_file, file_locking};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A bookmark under weave's management
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedBookmark {
    pub tracked_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr: Option<PrInfo>,
}

/// Which bookmarks are managed and the last PR state seen for each.
///
/// Callers update it only after the backend mutation it describes has succeeded.
#[derive(Debug, Clone)]
pub struct TrackingStore {
    file: PathBuf,
}

impl TrackingStore {
    pub const FILE_NAME: &'static str = "tracking.json";

    pub fn new(meta_dir: &Path) -> Self {
        Self {
            file: meta_dir.join(Self::FILE_NAME),
        }
    }

    pub fn load(&self) -> Result<BTreeMap<String, TrackedBookmark>> {
        Ok(atomic_file::read_json(&self.file)?.unwrap_or_default())
    }

    fn modify<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut BTreeMap<String, TrackedBookmark>) -> R,
    {
        if let Some(parent) = self.file.parent() {
            fs::create_dir_all(parent)?;
        }
        file_locking::with_file_lock(&self.file, || {
            let mut entries = self.load()?;
            let result = f(&mut entries);
            atomic_file::write_json_unlocked(&self.file, &entries)?;
            Ok(result)
        })
    }

    /// Returns false when the bookmark was already tracked
    pub fn track(&self, name: &str) -> Result<bool> {
        self.modify(|entries| {
            if entries.contains_key(name) {
                return false;
            }
            entries.insert(
                name.to_string(),
                TrackedBookmark {
                    tracked_at: Utc::now(),
                    pr: None,
                },
            );
            true
        })
    }

    /// Returns false when the bookmark was not tracked
    pub fn untrack(&self, name: &str) -> Result<bool> {
        self.modify(|entries| entries.remove(name).is_some())
    }

    pub fn is_tracked(&self, name: &str) -> Result<bool> {
        Ok(self.load()?.contains_key(name))
    }

    pub fn get(&self, name: &str) -> Result<Option<TrackedBookmark>> {
        Ok(self.load()?.remove(name))
    }

    /// Record PR metadata, tracking the bookmark if needed
    pub fn set_pr(&self, name: &str, pr: PrInfo) -> Result<()> {
        self.modify(|entries| {
            entries
                .entry(name.to_string())
                .or_insert_with(|| TrackedBookmark {
                    tracked_at: Utc::now(),
                    pr: None,
                })
                .pr = Some(pr);
        })
    }

    pub fn clear_pr(&self, name: &str) -> Result<()> {
        self.modify(|entries| {
            if let Some(entry) = entries.get_mut(name) {
                entry.pr = None;
            }
        })
    }

    pub fn tracked_names(&self) -> Result<Vec<String>> {
        Ok(self.load()?.into_keys().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::fake::pr;
    use crate::providers::PrState;
    use tempfile::TempDir;

    #[test]
    fn test_track_untrack() {
        let tmp = TempDir::new().unwrap();
        let store = TrackingStore::new(&tmp.path().join("weave"));

        assert!(store.track("feat-a").unwrap());
        assert!(!store.track("feat-a").unwrap());
        assert!(store.is_tracked("feat-a").unwrap());
        assert!(store.untrack("feat-a").unwrap());
        assert!(!store.untrack("feat-a").unwrap());
        assert!(store.tracked_names().unwrap().is_empty());
    }

    #[test]
    fn test_set_pr_tracks_and_persists_camel_case() {
        let tmp = TempDir::new().unwrap();
        let store = TrackingStore::new(tmp.path());
        store
            .set_pr("feat-a", pr(4, "feat-a", "main", PrState::Open))
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(tmp.path().join("tracking.json")).unwrap())
                .unwrap();
        assert!(raw["feat-a"]["trackedAt"].is_string());
        assert_eq!(raw["feat-a"]["pr"]["number"], 4);

        store.clear_pr("feat-a").unwrap();
        assert!(store.get("feat-a").unwrap().unwrap().pr.is_none());
    }
}
