//! Transcript log sink.
//!
//! Appends one line per event to `<logdir>/<room>.log`. File handles are
//! opened on demand and kept open for the life of the process.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

/// Transcript entry kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// A PRIVMSG or NOTICE payload.
    Message,
    /// Membership or topic bookkeeping (joined, left, topic changes).
    Meta,
}

/// One transcript entry.
#[derive(Debug)]
pub struct LogEvent {
    pub room: String,
    pub who: String,
    pub what: String,
    pub timestamp: DateTime<Utc>,
    pub kind: LogKind,
}

impl LogEvent {
    fn render(&self) -> String {
        let ts = self.timestamp.format("%Y-%m-%d %H:%M:%S");
        match self.kind {
            LogKind::Message => format!("[{}] <{}> {}\n", ts, self.who, self.what),
            LogKind::Meta => format!("[{}] * {} {}\n", ts, self.who, self.what),
        }
    }
}

/// Spawn the transcript writer task.
///
/// Without a log directory the task only drains the channel.
pub fn spawn_transcript_writer(
    logdir: Option<PathBuf>,
) -> (mpsc::Sender<LogEvent>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<LogEvent>(256);
    let task = tokio::spawn(async move {
        let dir = match logdir {
            Some(dir) => dir,
            None => {
                while rx.recv().await.is_some() {}
                return;
            }
        };
        let mut files: HashMap<String, File> = HashMap::new();
        while let Some(event) = rx.recv().await {
            if !files.contains_key(&event.room) {
                let path = dir.join(format!("{}.log", event.room));
                match OpenOptions::new().create(true).append(true).open(&path).await {
                    Ok(file) => {
                        files.insert(event.room.clone(), file);
                    }
                    Err(e) => {
                        error!(room = %event.room, error = %e, "cannot open transcript");
                        continue;
                    }
                }
            }
            if let Some(file) = files.get_mut(&event.room) {
                if let Err(e) = file.write_all(event.render().as_bytes()).await {
                    error!(room = %event.room, error = %e, "transcript write failed");
                    files.remove(&event.room);
                }
            }
        }
        for file in files.values_mut() {
            let _ = file.flush().await;
        }
    });
    (tx, task)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: LogKind, what: &str) -> LogEvent {
        LogEvent {
            room: "#test".to_string(),
            who: "alice".to_string(),
            what: what.to_string(),
            timestamp: "2026-08-02T10:30:00Z".parse().unwrap(),
            kind,
        }
    }

    #[test]
    fn test_render_message() {
        assert_eq!(
            event(LogKind::Message, "hello").render(),
            "[2026-08-02 10:30:00] <alice> hello\n"
        );
    }

    #[test]
    fn test_render_meta() {
        assert_eq!(
            event(LogKind::Meta, "joined").render(),
            "[2026-08-02 10:30:00] * alice joined\n"
        );
    }

    #[tokio::test]
    async fn test_writes_appended() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, task) = spawn_transcript_writer(Some(dir.path().to_path_buf()));
        tx.send(event(LogKind::Meta, "joined")).await.unwrap();
        tx.send(event(LogKind::Message, "hi there")).await.unwrap();
        drop(tx);
        task.await.unwrap();

        let contents = std::fs::read_to_string(dir.path().join("#test.log")).unwrap();
        assert_eq!(
            contents,
            "[2026-08-02 10:30:00] * alice joined\n[2026-08-02 10:30:00] <alice> hi there\n"
        );
    }

    #[tokio::test]
    async fn test_dummy_sink_drains() {
        let (tx, task) = spawn_transcript_writer(None);
        tx.send(event(LogKind::Message, "dropped")).await.unwrap();
        drop(tx);
        task.await.unwrap();
    }
}
