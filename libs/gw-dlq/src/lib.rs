//! The dead-letter log (component C): an append-only JSON-lines file of
//! records that exhausted retry, plus the diagnostic error that killed them.

use std::path::{Path, PathBuf};

use gw_types::IngestRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum DlqError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to (de)serialize dead-letter entry: {0}")]
    Serde(#[from] serde_json::Error),
}

/// One line of the dead-letter log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    #[serde(flatten)]
    pub record: IngestRecord,
    pub error: String,
    pub dead_lettered_at: i64,
}

pub struct DeadLetterLog {
    path: PathBuf,
    file: Mutex<fs::File>,
}

impl DeadLetterLog {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, DlqError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `record` with its final diagnostic `error` and the current
    /// wall-clock time in milliseconds since epoch.
    pub async fn publish(
        &self,
        record: IngestRecord,
        error: String,
        dead_lettered_at: i64,
    ) -> Result<(), DlqError> {
        let entry = DeadLetterEntry {
            record,
            error,
            dead_lettered_at,
        };
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    /// Reads every entry currently on disk, in append order. Intended for
    /// offline inspection (the CLI), not for the hot ingestion path.
    pub async fn read_all(&self) -> Result<Vec<DeadLetterEntry>, DlqError> {
        read_all(&self.path).await
    }
}

/// Standalone reader, usable without holding a writer handle (e.g. from the
/// DLQ inspector CLI, which never writes).
pub async fn read_all(path: impl AsRef<Path>) -> Result<Vec<DeadLetterEntry>, DlqError> {
    let file = match fs::File::open(path.as_ref()).await {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    let mut reader = BufReader::new(file);
    let mut entries = Vec::new();
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            break;
        }
        let trimmed = line.trim_end_matches('\n');
        if trimmed.is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(trimmed)?);
    }
    Ok(entries)
}
