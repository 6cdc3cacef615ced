//! Durable record of completed work units, used to resume interrupted runs.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::types::WorkUnit;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(rename = "completed_dates", alias = "completed", default)]
    pub completed: BTreeSet<WorkUnit>,
    #[serde(default)]
    pub last_date: Option<NaiveDate>,
}

impl Checkpoint {
    pub fn is_completed(&self, unit: &WorkUnit) -> bool {
        self.completed.contains(unit)
    }

    pub fn len(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Returns an empty checkpoint when nothing was persisted yet.
    async fn load(&self) -> Result<Checkpoint>;

    /// Atomically replaces the persisted checkpoint.
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;
}

/// Single JSON document, replaced via temp file + rename on every save.
#[derive(Clone, Debug)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("checkpoint");
        self.path
            .with_file_name(format!(".{name}.tmp-{}", Uuid::new_v4().simple()))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self) -> Result<Checkpoint> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Checkpoint::default());
            }
            Err(err) => return Err(PipelineError::persistence(&self.path, err)),
        };
        serde_json::from_slice(&bytes).map_err(|source| PipelineError::CorruptRecord {
            path: self.path.clone(),
            source,
        })
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let bytes = serde_json::to_vec(checkpoint)?;
        let parent = self.parent_dir();
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| PipelineError::persistence(parent, err))?;

        let tmp = self.temp_path();
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|err| PipelineError::persistence(&tmp, err))?;
        file.write_all(&bytes)
            .await
            .map_err(|err| PipelineError::persistence(&tmp, err))?;
        file.sync_all()
            .await
            .map_err(|err| PipelineError::persistence(&tmp, err))?;
        drop(file);

        if let Err(err) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(PipelineError::persistence(&self.path, err));
        }
        // the rename itself is only durable once the directory entry is
        sync_dir(parent)
            .await
            .map_err(|err| PipelineError::persistence(parent, err))
    }
}

#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Process-local store for tests and dry runs.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCheckpointStore {
    state: Arc<Mutex<Option<Checkpoint>>>,
}

impl InMemoryCheckpointStore {
    pub fn with_checkpoint(checkpoint: Checkpoint) -> Self {
        Self {
            state: Arc::new(Mutex::new(Some(checkpoint))),
        }
    }

    pub async fn snapshot(&self) -> Option<Checkpoint> {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self) -> Result<Checkpoint> {
        Ok(self.state.lock().await.clone().unwrap_or_default())
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        *self.state.lock().await = Some(checkpoint.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(day: u32) -> WorkUnit {
        WorkUnit(NaiveDate::from_ymd_opt(2024, 1, day).unwrap())
    }

    #[tokio::test]
    async fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("progress.json"));
        assert_eq!(store.load().await.unwrap(), Checkpoint::default());
    }

    #[tokio::test]
    async fn save_overwrites_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("state/progress.json"));

        let mut checkpoint = Checkpoint {
            completed: [unit(1), unit(2)].into_iter().collect(),
            last_date: Some(unit(2).date()),
        };
        store.save(&checkpoint).await.unwrap();
        checkpoint.completed.insert(unit(3));
        checkpoint.last_date = Some(unit(3).date());
        store.save(&checkpoint).await.unwrap();

        assert_eq!(store.load().await.unwrap(), checkpoint);
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("state"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("progress.json")]);
    }

    #[test]
    fn bare_file_name_resolves_to_the_working_directory() {
        assert_eq!(FileCheckpointStore::new("progress.json").parent_dir(), Path::new("."));
        assert_eq!(
            FileCheckpointStore::new("state/progress.json").parent_dir(),
            Path::new("state")
        );
    }

    #[tokio::test]
    async fn directory_sync_after_rename_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        sync_dir(dir.path()).await.unwrap();
        let missing = sync_dir(&dir.path().join("absent")).await;
        if cfg!(unix) {
            assert!(missing.is_err());
        }
    }

    #[tokio::test]
    async fn reads_the_on_disk_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(
            &path,
            r#"{"completed_dates": ["2024-01-02", "2024-01-01"], "last_date": "2024-01-02"}"#,
        )
        .unwrap();

        let checkpoint = FileCheckpointStore::new(&path).load().await.unwrap();
        assert!(checkpoint.is_completed(&unit(1)));
        assert!(checkpoint.is_completed(&unit(2)));
        assert_eq!(checkpoint.last_date, Some(unit(2).date()));

        let json = serde_json::to_value(&checkpoint).unwrap();
        assert_eq!(json["completed_dates"][0], "2024-01-01");
    }

    #[tokio::test]
    async fn garbage_is_reported_as_corrupt_not_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, b"{not json").unwrap();
        let err = FileCheckpointStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, PipelineError::CorruptRecord { .. }));
    }
}
