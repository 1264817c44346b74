//! Append-only JSON-lines measurement store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use kneeflex_core::error::EstimationError;
use kneeflex_core::measurement::{MeasurementRecord, MeasurementStore};
use kneeflex_core::types::RecordId;

/// Writes one JSON object per line to a local file.
#[derive(Debug, Clone)]
pub struct JsonlMeasurementStore {
    path: PathBuf,
}

impl JsonlMeasurementStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every record in the file, oldest first. A missing file is empty.
    pub async fn load_all(&self) -> Result<Vec<MeasurementRecord>, EstimationError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error("read", &self.path, e)),
        };

        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str(line).map_err(|e| {
                    EstimationError::Internal(format!(
                        "{}:{}: unreadable measurement: {e}",
                        self.path.display(),
                        index + 1
                    ))
                })
            })
            .collect()
    }

    /// The most recent record, if any.
    pub async fn latest(&self) -> Result<Option<MeasurementRecord>, EstimationError> {
        Ok(self.load_all().await?.pop())
    }
}

#[async_trait]
impl MeasurementStore for JsonlMeasurementStore {
    async fn save(&self, record: &MeasurementRecord) -> Result<RecordId, EstimationError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("create directory for", &self.path, e))?;
        }

        let mut line = serde_json::to_string(record)
            .map_err(|e| EstimationError::Internal(format!("measurement serialization failed: {e}")))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| io_error("open", &self.path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| io_error("write", &self.path, e))?;
        file.flush()
            .await
            .map_err(|e| io_error("flush", &self.path, e))?;

        tracing::debug!(id = %record.id, path = %self.path.display(), "Measurement saved");
        Ok(record.id)
    }
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> EstimationError {
    EstimationError::Internal(format!("failed to {action} {}: {err}", path.display()))
}
