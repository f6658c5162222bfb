//! Durable job records, keyed by job id.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::JobState;
use crate::error::StoreError;

pub const RECORD_VERSION: u32 = 1;

/// What gets persisted at a pause point or checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub state: JobState,
}

impl JobRecord {
    pub fn new(state: JobState) -> Self {
        Self {
            version: RECORD_VERSION,
            saved_at: Utc::now(),
            state,
        }
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn save(&self, record: &JobRecord) -> Result<(), StoreError>;
    async fn load(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError>;
    async fn delete(&self, job_id: &str) -> Result<(), StoreError>;
    async fn list(&self) -> Result<Vec<String>, StoreError>;
}

#[derive(Default)]
pub struct MemoryJobStore {
    data: tokio::sync::RwLock<HashMap<String, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn save(&self, record: &JobRecord) -> Result<(), StoreError> {
        self.data
            .write()
            .await
            .insert(record.state.job_id.clone(), record.clone());
        Ok(())
    }

    async fn load(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.data.read().await.get(job_id).cloned())
    }

    async fn delete(&self, job_id: &str) -> Result<(), StoreError> {
        self.data.write().await.remove(job_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self.data.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// One pretty-printed JSON file per job: `<dir>/<job_id>.job.json`.
pub struct FileJobStore {
    dir: PathBuf,
}

const FILE_SUFFIX: &str = ".job.json";

impl FileJobStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("{job_id}{FILE_SUFFIX}"))
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn save(&self, record: &JobRecord) -> Result<(), StoreError> {
        let path = self.path_for(&record.state.job_id);
        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        // Write then rename so a crash never leaves a truncated record.
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))
    }

    async fn load(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError> {
        let bytes = match tokio::fs::read(self.path_for(job_id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Storage(e.to_string())),
        };

        let record = serde_json::from_slice::<JobRecord>(&bytes)
            .map_err(|e| StoreError::Corrupted(format!("{job_id}: {e}")))?;
        Ok(Some(record))
    }

    async fn delete(&self, job_id: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(job_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Storage(e.to_string())),
        }
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(id) = name.strip_suffix(FILE_SUFFIX) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
