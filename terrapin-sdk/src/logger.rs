//! Best-effort transcript of raw inbound traffic.

use std::path::Path;

use chrono::Local;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Appends timestamped raw server lines to a file the core never reads
/// back. Every failure is swallowed after a diagnostic: the transcript must
/// never take the session down.
pub struct TranscriptLog {
    file: Option<File>,
}

impl TranscriptLog {
    /// A transcript that records nothing (no path configured).
    pub fn disabled() -> Self {
        Self { file: None }
    }

    /// Open `path` for appending. On failure the transcript is disabled
    /// and a warning is emitted.
    pub async fn open(path: &Path) -> Self {
        match OpenOptions::new().create(true).append(true).open(path).await {
            Ok(file) => Self { file: Some(file) },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "transcript log unavailable");
                Self { file: None }
            }
        }
    }

    /// Record one raw line with a local timestamp. Errors are ignored.
    pub async fn record(&mut self, raw: &str) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let entry = format!("{} {raw}\n", Local::now().format("%Y-%m-%d %H:%M:%S"));
        let _ = file.write_all(entry.as_bytes()).await;
        let _ = file.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_lines_to_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.log");

        let mut log = TranscriptLog::open(&path).await;
        log.record("PING :abc").await;
        log.record(":srv 001 shelly :Welcome").await;
        drop(log);

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("PING :abc"));
        assert!(lines[1].ends_with(":srv 001 shelly :Welcome"));
    }

    #[tokio::test]
    async fn unwritable_path_degrades_to_disabled() {
        let mut log = TranscriptLog::open(Path::new("/definitely/not/a/dir/x.log")).await;
        // Must not panic or error out.
        log.record("PING :abc").await;
    }
}
