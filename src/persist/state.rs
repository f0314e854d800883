//! Room state sink and loader.
//!
//! Each room's durable metadata is a two-line file `<statedir>/<room>`:
//! the topic, then the key. Writes go through a temp file and a rename so
//! a crash never leaves a half-written state behind. The temp name does
//! not look like a channel name, so a leftover one is ignored at startup.

use std::path::{Path, PathBuf};
use tinyirc_proto::ChannelExt;
use tokio::fs;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// A room's durable metadata.
#[derive(Debug)]
pub struct StateEvent {
    pub room: String,
    pub topic: String,
    pub key: String,
}

/// Room state loaded from disk at startup.
#[derive(Debug, PartialEq, Eq)]
pub struct RoomState {
    pub name: String,
    pub topic: String,
    pub key: String,
}

/// Spawn the state keeper task.
///
/// Without a state directory the task only drains the channel.
pub fn spawn_state_keeper(
    statedir: Option<PathBuf>,
) -> (mpsc::Sender<StateEvent>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<StateEvent>(256);
    let task = tokio::spawn(async move {
        let dir = match statedir {
            Some(dir) => dir,
            None => {
                while rx.recv().await.is_some() {}
                return;
            }
        };
        while let Some(event) = rx.recv().await {
            if let Err(e) = write_state(&dir, &event).await {
                error!(room = %event.room, error = %e, "state write failed");
            }
        }
    });
    (tx, task)
}

async fn write_state(dir: &Path, event: &StateEvent) -> std::io::Result<()> {
    let path = dir.join(&event.room);
    let tmp = dir.join(format!(".{}.tmp", event.room));
    fs::write(&tmp, format!("{}\n{}\n", event.topic, event.key)).await?;
    fs::rename(&tmp, &path).await
}

/// Scan the state directory and load every saved room.
///
/// Entries whose name is not a valid channel name are ignored. Files with
/// fewer than two lines are corrupted: they are logged and skipped. An
/// unreadable directory or file is a startup failure.
pub fn load_rooms(dir: &Path) -> std::io::Result<Vec<RoomState>> {
    let mut rooms = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.as_str().is_channel_name() {
            continue;
        }
        let contents = std::fs::read_to_string(entry.path())?;
        let mut lines = contents.split('\n');
        match (lines.next(), lines.next()) {
            (Some(topic), Some(key)) => rooms.push(RoomState {
                name,
                topic: topic.to_string(),
                key: key.to_string(),
            }),
            _ => warn!(room = %name, "state file corrupted, skipping"),
        }
    }
    Ok(rooms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, task) = spawn_state_keeper(Some(dir.path().to_path_buf()));
        tx.send(StateEvent {
            room: "#secret".to_string(),
            topic: "hello".to_string(),
            key: "s3cret".to_string(),
        })
        .await
        .unwrap();
        drop(tx);
        task.await.unwrap();

        let contents = std::fs::read_to_string(dir.path().join("#secret")).unwrap();
        assert_eq!(contents, "hello\ns3cret\n");

        let rooms = load_rooms(dir.path()).unwrap();
        assert_eq!(
            rooms,
            vec![RoomState {
                name: "#secret".to_string(),
                topic: "hello".to_string(),
                key: "s3cret".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_rewrite_replaces_state() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, task) = spawn_state_keeper(Some(dir.path().to_path_buf()));
        for topic in ["first", "second"] {
            tx.send(StateEvent {
                room: "#room".to_string(),
                topic: topic.to_string(),
                key: String::new(),
            })
            .await
            .unwrap();
        }
        drop(tx);
        task.await.unwrap();

        let contents = std::fs::read_to_string(dir.path().join("#room")).unwrap();
        assert_eq!(contents, "second\n\n");
    }

    #[test]
    fn test_load_skips_corrupted_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("#good"), "topic\nkey\n").unwrap();
        std::fs::write(dir.path().join("#bad"), "no-newline").unwrap();
        std::fs::write(dir.path().join("README"), "not a room\n\n").unwrap();
        std::fs::write(dir.path().join(".#good.tmp"), "left\nover\n").unwrap();

        let rooms = load_rooms(dir.path()).unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].name, "#good");
        assert_eq!(rooms[0].topic, "topic");
        assert_eq!(rooms[0].key, "key");
    }

    #[test]
    fn test_load_missing_dir_fails() {
        assert!(load_rooms(Path::new("/nonexistent/statedir")).is_err());
    }
}
