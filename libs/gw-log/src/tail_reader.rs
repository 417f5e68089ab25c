use std::io::SeekFrom;
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

use crate::LogError;

/// Sequential reader over the durable log starting at a byte offset.
///
/// Used by the replay loop. A partial trailing line (a write that was not
/// yet fsynced, or a crash mid-write) is never surfaced as a record: the
/// reader rewinds to the start of that line so a later call — once the rest
/// of the line has been appended — re-reads it whole.
pub struct LogTailReader {
    reader: BufReader<File>,
    base_offset: u64,
}

impl LogTailReader {
    pub async fn open(path: impl AsRef<Path>, start_offset: u64) -> Result<Self, LogError> {
        let mut file = File::open(path.as_ref()).await?;
        file.seek(SeekFrom::Start(start_offset)).await?;
        Ok(Self {
            reader: BufReader::new(file),
            base_offset: start_offset,
        })
    }

    /// Current byte offset (start of the next unread line).
    pub fn offset(&self) -> u64 {
        self.base_offset
    }

    /// Returns the next complete line (without its trailing `\n`) plus the
    /// number of bytes it occupied on disk including the newline, or `None`
    /// if there is no complete line to read yet (clean EOF or a partial
    /// trailing line).
    pub async fn next_line(&mut self) -> Result<Option<(String, u64)>, LogError> {
        let mut buf = Vec::new();
        let n = self.reader.read_until(b'\n', &mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        if buf.last() != Some(&b'\n') {
            // Partial tail line: rewind so the next attempt re-reads it whole.
            self.reader
                .seek(SeekFrom::Start(self.base_offset))
                .await?;
            return Ok(None);
        }
        buf.pop();
        let line = String::from_utf8(buf)
            .map_err(|err| LogError::InvalidUtf8(err.utf8_error().to_string()))?;
        self.base_offset += n as u64;
        Ok(Some((line, n as u64)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::fs;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn reads_complete_lines_from_the_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingestion.log");
        fs::write(&path, "one\ntwo\n").await.unwrap();

        let mut reader = LogTailReader::open(&path, 0).await.unwrap();
        let (line, len) = reader.next_line().await.unwrap().unwrap();
        assert_eq!(line, "one");
        assert_eq!(len, 4);
        let (line, _) = reader.next_line().await.unwrap().unwrap();
        assert_eq!(line, "two");
        assert!(reader.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn starts_at_a_mid_file_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingestion.log");
        fs::write(&path, "one\ntwo\nthree\n").await.unwrap();

        let mut reader = LogTailReader::open(&path, 4).await.unwrap();
        let (line, _) = reader.next_line().await.unwrap().unwrap();
        assert_eq!(line, "two");
    }

    #[tokio::test]
    async fn partial_trailing_line_is_not_consumed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingestion.log");
        fs::write(&path, "one\ntwo-partial-no-newline").await.unwrap();

        let mut reader = LogTailReader::open(&path, 0).await.unwrap();
        let (line, _) = reader.next_line().await.unwrap().unwrap();
        assert_eq!(line, "one");
        assert!(reader.next_line().await.unwrap().is_none());
        assert_eq!(reader.offset(), 4);

        // Once the rest of the line is appended, it becomes readable.
        let mut file = fs::OpenOptions::new().append(true).open(&path).await.unwrap();
        file.write_all(b"\n").await.unwrap();
        file.flush().await.unwrap();

        let mut reader = LogTailReader::open(&path, reader.offset()).await.unwrap();
        let (line, _) = reader.next_line().await.unwrap().unwrap();
        assert_eq!(line, "two-partial-no-newline");
    }
}
