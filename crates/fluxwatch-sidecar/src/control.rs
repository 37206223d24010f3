use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The single recognized control command, sent by the parent process over
/// the sidecar's stdin.
pub const SHUTDOWN_COMMAND: &str = "sidecar shutdown";

/// A decoded control-stream line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Terminate the watcher and force-exit the whole host process
    Shutdown,
    /// Anything else; logged and ignored
    Unrecognized(String),
}

impl ControlCommand {
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            SHUTDOWN_COMMAND => ControlCommand::Shutdown,
            other => ControlCommand::Unrecognized(other.to_string()),
        }
    }
}

/// Long-lived loop over the parent-owned control stream. Fire-and-forget
/// from the controller's perspective: no acknowledgement is ever written
/// back, and malformed input never ends the loop.
pub struct ControlChannel {
    shutdown: CancellationToken,
}

impl ControlChannel {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self { shutdown }
    }

    /// Read newline-delimited commands until the shutdown command arrives
    /// or the stream closes.
    pub async fn run<R>(self, reader: R)
    where
        R: AsyncBufRead + Unpin,
    {
        info!("Waiting for control commands");
        let mut lines = reader.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match ControlCommand::parse(&line) {
                    ControlCommand::Shutdown => {
                        info!("Received '{SHUTDOWN_COMMAND}' command");
                        // Non-cancelable once initiated; the top-level
                        // owner performs the actual teardown and exit.
                        self.shutdown.cancel();
                        return;
                    }
                    ControlCommand::Unrecognized(text) => {
                        warn!(command = %text, "Invalid control command, ignoring");
                    }
                },
                Ok(None) => {
                    debug!("Control input closed");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read control input");
                    return;
                }
            }
        }
    }

    /// Production entry point: consume this process's stdin.
    pub async fn run_stdin(self) {
        self.run(BufReader::new(tokio::io::stdin())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shutdown() {
        assert_eq!(
            ControlCommand::parse("sidecar shutdown"),
            ControlCommand::Shutdown
        );
        assert_eq!(
            ControlCommand::parse("  sidecar shutdown  \n"),
            ControlCommand::Shutdown
        );
    }

    #[test]
    fn test_parse_unrecognized() {
        assert_eq!(
            ControlCommand::parse("foo"),
            ControlCommand::Unrecognized("foo".to_string())
        );
        assert_eq!(
            ControlCommand::parse("sidecar shutdown now"),
            ControlCommand::Unrecognized("sidecar shutdown now".to_string())
        );
        assert_eq!(
            ControlCommand::parse(""),
            ControlCommand::Unrecognized(String::new())
        );
    }

    #[tokio::test]
    async fn test_shutdown_command_trips_token() {
        let token = CancellationToken::new();
        let channel = ControlChannel::new(token.clone());

        let input: &[u8] = b"foo\nbar\nsidecar shutdown\nignored\n";
        channel.run(input).await;

        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_unrecognized_input_keeps_loop_alive() {
        let token = CancellationToken::new();
        let channel = ControlChannel::new(token.clone());

        // The loop consumes every line without tripping the token, then
        // returns at end-of-stream.
        let input: &[u8] = b"foo\nsidecar restart\nshutdown\n";
        channel.run(input).await;

        assert!(!token.is_cancelled());
    }
}
