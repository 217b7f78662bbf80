//! Append-only NDJSON audit journal.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::record::AuditRecord;
use crate::{AuditResult, AuditSink};

/// File-backed sink writing one JSON record per line.
pub struct JournalAuditSink {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl JournalAuditSink {
    /// Opens (or creates) the journal at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors raised while preparing the file.
    pub async fn open(path: impl Into<PathBuf>) -> AuditResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Returns the journal path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the last `limit` records, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a line fails to decode.
    pub async fn tail(&self, limit: usize) -> AuditResult<Vec<AuditRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        // Serialize with writers so a half-written line is never read.
        let _guard = self.file.lock().await;
        let data = fs::read(&self.path).await?;

        let mut records = data
            .split(|byte| *byte == b'\n')
            .filter(|line| !line.is_empty())
            .map(serde_json::from_slice::<AuditRecord>)
            .collect::<Result<Vec<_>, _>>()?;

        if records.len() > limit {
            records.drain(..records.len() - limit);
        }
        Ok(records)
    }
}

#[async_trait]
impl AuditSink for JournalAuditSink {
    async fn record(&self, record: &AuditRecord) -> AuditResult<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut guard = self.file.lock().await;
        guard.write_all(&line).await?;
        guard.flush().await?;
        Ok(())
    }
}
