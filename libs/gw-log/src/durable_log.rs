use std::path::{Path, PathBuf};

use gw_types::IngestRecord;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::LogError;

/// Append-only, fsync-on-append file of ingestion records.
///
/// One `DurableLog` is the single writer for its path; the replay loop reads
/// the same path through an independent `LogTailReader`, relying on normal
/// file semantics (the writer always appends, the reader never needs to
/// coordinate with it beyond byte offsets).
pub struct DurableLog {
    path: PathBuf,
    file: Mutex<fs::File>,
}

impl DurableLog {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
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

    /// Serializes `record` as one JSON line, appends it, and fsyncs before
    /// returning. Returns the new total size of the log in bytes.
    pub async fn append(&self, record: &IngestRecord) -> Result<u64, LogError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(file.metadata().await?.len())
    }

    /// Current length of the log file in bytes.
    pub async fn size_bytes(&self) -> Result<u64, LogError> {
        Ok(fs::metadata(&self.path).await?.len())
    }
}
