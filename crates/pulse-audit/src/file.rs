use crate::{AuditError, AuditEvent, AuditSink};
use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Append-and-sync sink: one JSON line per event, fsynced before returning.
pub struct FileSink {
    file: Mutex<Option<File>>,
}

impl FileSink {
    pub fn open(path: &Path) -> Result<Self, AuditError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(Some(file)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<File>> {
        self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AuditSink for FileSink {
    async fn notify(&self, event: &AuditEvent) -> Result<(), AuditError> {
        // Serialization stays outside the critical section.
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut guard = self.lock();
        let file = guard
            .as_mut()
            .ok_or_else(|| AuditError::Io(std::io::Error::other("audit file already closed")))?;
        file.write_all(&line)?;
        file.sync_all()?;
        Ok(())
    }

    async fn close(&self) -> Result<(), AuditError> {
        // Dropping the handle closes it; the Option makes close idempotent.
        self.lock().take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn appends_one_json_line_per_event() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log");
        let sink = FileSink::open(&path).unwrap();

        sink.notify(&AuditEvent::now(vec!["a".into()], "1.2.3.4".into()))
            .await
            .unwrap();
        sink.notify(&AuditEvent::now(vec!["b".into(), "c".into()], "1.2.3.4".into()))
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: AuditEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.metrics, vec!["b".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn notify_after_close_fails() {
        let dir = TempDir::new().unwrap();
        let sink = FileSink::open(&dir.path().join("audit.log")).unwrap();
        sink.close().await.unwrap();
        sink.close().await.unwrap(); // idempotent
        let res = sink
            .notify(&AuditEvent::now(vec!["a".into()], "ip".into()))
            .await;
        assert!(res.is_err());
    }
}
