use crate::broadcast::LogBroadcaster;
use fluxwatch_core::{LogEntry, LogSource};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::debug;

/// Spawn a task relaying one output pipe of the watcher into the
/// broadcaster, line by line, until end-of-stream. Each line is
/// timestamped at read time and appended before the next read, so lines
/// from the same pipe reach every subscriber in write order.
pub fn spawn_line_reader<R>(
    pipe: R,
    source: LogSource,
    broadcaster: Arc<LogBroadcaster>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            broadcaster.append(LogEntry::new(source, line));
        }
        debug!(%source, "Watcher output stream closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reader_relays_lines_in_order() {
        let broadcaster = Arc::new(LogBroadcaster::new(100, 16));
        let pipe: &[u8] = b"first\nsecond\nthird\n";

        spawn_line_reader(pipe, LogSource::Stdout, broadcaster.clone())
            .await
            .unwrap();

        let mut subscription = broadcaster.subscribe();
        let mut texts = Vec::new();
        while let Ok(entry) = subscription.receiver.try_recv() {
            texts.push(entry.text);
        }
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_reader_terminates_on_eof() {
        let broadcaster = Arc::new(LogBroadcaster::new(100, 16));
        let pipe: &[u8] = b"";

        let handle = spawn_line_reader(pipe, LogSource::Stderr, broadcaster.clone());
        handle.await.unwrap();
        assert_eq!(broadcaster.history_len(), 0);
    }
}
