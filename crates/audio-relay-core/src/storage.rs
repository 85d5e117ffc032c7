//! Durable relay state
//!
//! Keeps per-channel checkpoints and the set of already relayed content ids
//! in memory and persists them as two JSON documents. Mutations never touch
//! disk; [`RelayStore::flush`] writes both documents atomically.

use crate::error::StorageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// File name of the checkpoint document.
pub const PROGRESS_FILE: &str = "progress.json";
/// File name of the seen-id document.
pub const SEEN_FILE: &str = "seen.json";

/// Persisted checkpoint entry for one channel.
#[derive(Debug, Serialize, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    /// Last fully processed message id.
    pub last_id: i32,
}

/// Interface for relay state stores
#[async_trait]
pub trait RelayStore: Send + Sync {
    /// Last processed message id for a channel (0 if unknown)
    async fn checkpoint(&self, channel_id: i64) -> i32;
    /// Checkpoint value as of the last successful flush
    async fn persisted_checkpoint(&self, channel_id: i64) -> i32;
    /// Advance a channel checkpoint; lower values are ignored
    async fn set_checkpoint(&self, channel_id: i64, message_id: i32);
    /// Whether a content id was already relayed
    async fn is_seen(&self, unique_id: &str) -> bool;
    /// Record a relayed content id
    async fn mark_seen(&self, unique_id: &str);
    /// Persist checkpoints and seen ids
    async fn flush(&self) -> Result<(), StorageError>;
}

/// Flush a store, logging instead of failing.
///
/// Returns `true` if the state landed on disk.
pub async fn flush_or_warn(store: &dyn RelayStore, reason: &str) -> bool {
    match store.flush().await {
        Ok(()) => {
            debug!(reason, "Relay state flushed");
            true
        }
        Err(e) => {
            warn!(reason, error = %e, "Could not save relay state");
            false
        }
    }
}

#[derive(Default)]
struct StoreState {
    checkpoints: HashMap<i64, i32>,
    persisted: HashMap<i64, i32>,
    seen: HashSet<String>,
    progress_dirty: bool,
    seen_dirty: bool,
}

/// JSON-file backed store living in a state directory.
pub struct JsonFileStore {
    progress_path: PathBuf,
    seen_path: PathBuf,
    state: Mutex<StoreState>,
}

impl JsonFileStore {
    /// Open the store in `dir`, loading whatever state is readable.
    ///
    /// Missing or corrupt documents load as empty.
    pub async fn open(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let progress_path = dir.join(PROGRESS_FILE);
        let seen_path = dir.join(SEEN_FILE);

        let checkpoints = load_progress(&progress_path).await;
        let seen = load_seen(&seen_path).await;

        info!(
            channels = checkpoints.len(),
            seen = seen.len(),
            "Relay state loaded from {}",
            dir.display()
        );

        Self {
            progress_path,
            seen_path,
            state: Mutex::new(StoreState {
                persisted: checkpoints.clone(),
                checkpoints,
                seen,
                progress_dirty: false,
                seen_dirty: false,
            }),
        }
    }

    /// Number of relayed content ids held in memory.
    #[cfg(test)]
    pub async fn seen_count(&self) -> usize {
        self.state.lock().await.seen.len()
    }
}

#[async_trait]
impl RelayStore for JsonFileStore {
    async fn checkpoint(&self, channel_id: i64) -> i32 {
        self.state
            .lock()
            .await
            .checkpoints
            .get(&channel_id)
            .copied()
            .unwrap_or(0)
    }

    async fn persisted_checkpoint(&self, channel_id: i64) -> i32 {
        self.state
            .lock()
            .await
            .persisted
            .get(&channel_id)
            .copied()
            .unwrap_or(0)
    }

    async fn set_checkpoint(&self, channel_id: i64, message_id: i32) {
        let mut state = self.state.lock().await;
        let current = state.checkpoints.entry(channel_id).or_insert(0);
        if message_id > *current {
            *current = message_id;
            state.progress_dirty = true;
        }
    }

    async fn is_seen(&self, unique_id: &str) -> bool {
        self.state.lock().await.seen.contains(unique_id)
    }

    async fn mark_seen(&self, unique_id: &str) {
        let mut state = self.state.lock().await;
        if state.seen.insert(unique_id.to_string()) {
            state.seen_dirty = true;
        }
    }

    async fn flush(&self) -> Result<(), StorageError> {
        // Held across the writes so only one flush touches the files at a time.
        let mut state = self.state.lock().await;

        if state.progress_dirty {
            let doc: BTreeMap<String, Checkpoint> = state
                .checkpoints
                .iter()
                .map(|(channel, last_id)| (channel.to_string(), Checkpoint { last_id: *last_id }))
                .collect();
            write_atomic(&self.progress_path, &serde_json::to_vec(&doc)?).await?;
            state.persisted = state.checkpoints.clone();
            state.progress_dirty = false;
        }

        if state.seen_dirty {
            let doc: BTreeSet<&String> = state.seen.iter().collect();
            write_atomic(&self.seen_path, &serde_json::to_vec(&doc)?).await?;
            state.seen_dirty = false;
        }

        Ok(())
    }
}

async fn load_progress(path: &Path) -> HashMap<i64, i32> {
    let Some(bytes) = read_optional(path).await else {
        return HashMap::new();
    };
    match serde_json::from_slice::<BTreeMap<String, Checkpoint>>(&bytes) {
        Ok(doc) => doc
            .into_iter()
            .filter_map(|(channel, checkpoint)| match channel.parse::<i64>() {
                Ok(id) => Some((id, checkpoint.last_id)),
                Err(_) => {
                    warn!("Ignoring checkpoint for unparsable channel key {channel:?}");
                    None
                }
            })
            .collect(),
        Err(e) => {
            warn!("Progress file {} is unreadable, starting empty: {}", path.display(), e);
            HashMap::new()
        }
    }
}

async fn load_seen(path: &Path) -> HashSet<String> {
    let Some(bytes) = read_optional(path).await else {
        return HashSet::new();
    };
    // Older files stored numeric document ids; accept both forms.
    match serde_json::from_slice::<Vec<serde_json::Value>>(&bytes) {
        Ok(values) => values
            .into_iter()
            .filter_map(|value| match value {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Err(e) => {
            warn!("Seen file {} is unreadable, starting empty: {}", path.display(), e);
            HashSet::new()
        }
    }
}

async fn read_optional(path: &Path) -> Option<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!("Could not read {}: {}", path.display(), e);
            None
        }
    }
}

/// Write `contents` to a temp file next to `path` and rename it into place.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent).await?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("state");
    let tmp_path = parent.join(format!(".{file_name}.tmp.{}", uuid::Uuid::new_v4().simple()));

    {
        let mut tmp = tokio::fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp_path)
            .await?;
        tmp.write_all(contents).await?;
        tmp.sync_all().await?;
    }

    if let Err(err) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(err.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_files_start_empty() {
        let dir = tempdir().expect("tempdir");
        let store = JsonFileStore::open(dir.path()).await;

        assert_eq!(store.checkpoint(-100).await, 0);
        assert!(!store.is_seen("abc").await);
    }

    #[tokio::test]
    async fn test_checkpoint_is_monotonic() {
        let dir = tempdir().expect("tempdir");
        let store = JsonFileStore::open(dir.path()).await;

        store.set_checkpoint(-100, 7).await;
        store.set_checkpoint(-100, 3).await;
        assert_eq!(store.checkpoint(-100).await, 7);
        store.set_checkpoint(-100, 9).await;
        assert_eq!(store.checkpoint(-100).await, 9);
    }

    #[tokio::test]
    async fn test_mutations_are_not_persisted_until_flush() {
        let dir = tempdir().expect("tempdir");
        let store = JsonFileStore::open(dir.path()).await;

        store.set_checkpoint(-100, 5).await;
        store.mark_seen("u1").await;
        assert!(!dir.path().join(PROGRESS_FILE).exists());
        assert_eq!(store.persisted_checkpoint(-100).await, 0);

        store.flush().await.expect("flush");
        assert_eq!(store.persisted_checkpoint(-100).await, 5);

        let reopened = JsonFileStore::open(dir.path()).await;
        assert_eq!(reopened.checkpoint(-100).await, 5);
        assert!(reopened.is_seen("u1").await);
    }

    #[tokio::test]
    async fn test_progress_file_layout() {
        let dir = tempdir().expect("tempdir");
        let store = JsonFileStore::open(dir.path()).await;
        store.set_checkpoint(-1001234, 42).await;
        store.flush().await.expect("flush");

        let raw = std::fs::read_to_string(dir.path().join(PROGRESS_FILE)).expect("read");
        let doc: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(doc["-1001234"]["last_id"], 42);
    }

    #[tokio::test]
    async fn test_corrupt_files_load_as_empty() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join(PROGRESS_FILE), "{not json").expect("write");
        std::fs::write(dir.path().join(SEEN_FILE), "[1, 2").expect("write");

        let store = JsonFileStore::open(dir.path()).await;
        assert_eq!(store.checkpoint(-100).await, 0);
        assert_eq!(store.seen_count().await, 0);

        store.set_checkpoint(-100, 1).await;
        store.mark_seen("u").await;
        store.flush().await.expect("flush over corrupt files");
        let reopened = JsonFileStore::open(dir.path()).await;
        assert_eq!(reopened.checkpoint(-100).await, 1);
    }

    #[tokio::test]
    async fn test_numeric_seen_ids_are_accepted() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join(SEEN_FILE), r#"[5012345678, "AgAD"]"#).expect("write");

        let store = JsonFileStore::open(dir.path()).await;
        assert!(store.is_seen("5012345678").await);
        assert!(store.is_seen("AgAD").await);
    }

    #[tokio::test]
    async fn test_flush_leaves_no_temp_files() {
        let dir = tempdir().expect("tempdir");
        let store = JsonFileStore::open(dir.path()).await;
        store.set_checkpoint(-100, 2).await;
        store.mark_seen("u").await;
        store.flush().await.expect("flush");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read_dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_dirty_state() {
        let dir = tempdir().expect("tempdir");
        // A regular file where the state directory should be.
        let blocked = dir.path().join("state");
        std::fs::write(&blocked, "").expect("write");

        let store = JsonFileStore::open(&blocked).await;
        store.set_checkpoint(-100, 3).await;
        assert!(store.flush().await.is_err());
        assert!(!flush_or_warn(&store, "test").await);
        assert_eq!(store.checkpoint(-100).await, 3);
        assert_eq!(store.persisted_checkpoint(-100).await, 0);
    }
}
