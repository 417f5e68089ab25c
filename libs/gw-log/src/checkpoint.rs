use std::path::{Path, PathBuf};

use tokio::fs;

use crate::LogError;

/// Persisted byte offset of the last record handed off to the bounded
/// queue (not necessarily persisted to the store — see module docs).
pub struct Checkpointer {
    path: PathBuf,
}

impl Checkpointer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns 0 if the checkpoint file is absent or unparseable.
    pub async fn load(&self) -> u64 {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => contents.trim().parse::<u64>().unwrap_or(0),
            Err(_) => 0,
        }
    }

    /// Loads the checkpoint and clamps it to `log_size`: a rotated or
    /// truncated log resets replay to the beginning rather than seeking
    /// past the end of the file.
    pub async fn load_clamped(&self, log_size: u64) -> u64 {
        let offset = self.load().await;
        if offset > log_size { 0 } else { offset }
    }

    /// Atomically persists `offset` (write to a temp file, then rename).
    pub async fn save(&self, offset: u64) -> Result<(), LogError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp_path = tmp_path_for(&self.path);
        fs::write(&tmp_path, offset.to_string()).await?;
        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
