use std::path::Path;

use dvcprims_channel::{ChannelError, MessageChannel, StreamChannel, StreamListener};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::cmd::{shutdown_on_ctrl_c, EchoArgs};
use crate::exit::{channel_error, CliResult, SUCCESS};

/// Why an echo session stopped reading.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    PeerClosed,
    Shutdown,
    Rejected,
    Failed,
}

fn classify_recv_error(err: &ChannelError) -> SessionEnd {
    match err {
        ChannelError::Disconnected | ChannelError::Disposed => SessionEnd::PeerClosed,
        ChannelError::Cancelled => SessionEnd::Shutdown,
        ChannelError::ProtocolViolation(_) | ChannelError::MessageTooLarge { .. } => {
            SessionEnd::Rejected
        }
        _ => SessionEnd::Failed,
    }
}

pub async fn run(args: EchoArgs, dir: &Path) -> CliResult<i32> {
    let listener = StreamListener::bind(dir, &args.name)
        .map_err(|err| channel_error("bind failed", err))?
        .with_config(args.framing.config());
    tracing::info!(channel = %listener.name(), path = %listener.path().display(), "echo server listening");

    let shutdown = shutdown_on_ctrl_c();
    let mut sessions = JoinSet::new();

    loop {
        let channel = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                accepted.map_err(|err| channel_error("accept failed", err))?
            }
        };
        sessions.spawn(echo_session(channel, shutdown.clone()));

        // Reap finished sessions so the set does not grow without bound.
        while sessions.try_join_next().is_some() {}
    }

    sessions.shutdown().await;
    Ok(SUCCESS)
}

async fn echo_session(channel: StreamChannel, shutdown: CancellationToken) {
    loop {
        let message = match channel.read_message(&shutdown).await {
            Ok(message) => message,
            Err(err) => {
                match classify_recv_error(&err) {
                    SessionEnd::PeerClosed | SessionEnd::Shutdown => {
                        tracing::debug!(channel = channel.name(), reason = %err, "echo session ended");
                    }
                    SessionEnd::Rejected => {
                        tracing::warn!(channel = channel.name(), error = %err, "peer broke framing");
                    }
                    SessionEnd::Failed => {
                        tracing::error!(channel = channel.name(), error = %err, "receive failed");
                    }
                }
                break;
            }
        };

        tracing::info!(channel = channel.name(), size = message.len(), "echoing message");

        if let Err(err) = channel.send_message(&message).await {
            tracing::warn!(channel = channel.name(), error = %err, "echo send failed");
            break;
        }
    }
    channel.dispose();
}

#[cfg(test)]
mod tests {
    use dvcprims_frame::FrameError;
    use dvcprims_transport::ChannelStream;

    use super::*;

    #[test]
    fn disconnected_error_ends_session_quietly() {
        assert_eq!(
            classify_recv_error(&ChannelError::Disconnected),
            SessionEnd::PeerClosed
        );
        assert_eq!(
            classify_recv_error(&ChannelError::Cancelled),
            SessionEnd::Shutdown
        );
    }

    #[test]
    fn framing_errors_are_rejections() {
        assert_eq!(
            classify_recv_error(&ChannelError::ProtocolViolation(FrameError::Faulted)),
            SessionEnd::Rejected
        );
        assert_eq!(
            classify_recv_error(&ChannelError::Io(std::io::Error::other("boom"))),
            SessionEnd::Failed
        );
    }

    #[tokio::test]
    async fn session_echoes_until_peer_leaves() {
        let (server_side, client_side) = ChannelStream::pair(4096);
        let server = StreamChannel::new("ECHO", server_side);
        let client = StreamChannel::new("ECHO", client_side);
        let session = tokio::spawn(echo_session(server, CancellationToken::new()));

        let payload = vec![7u8; 4000];
        client.send_message(&payload).await.unwrap();
        let echoed = client.read_message(&CancellationToken::new()).await.unwrap();
        assert_eq!(echoed.as_ref(), payload.as_slice());

        client.dispose();
        session.await.unwrap();
    }

    #[tokio::test]
    async fn session_stops_on_shutdown() {
        let (server_side, _client_side) = ChannelStream::pair(64);
        let server = StreamChannel::new("ECHO", server_side);
        let shutdown = CancellationToken::new();
        let session = tokio::spawn(echo_session(server, shutdown.clone()));

        shutdown.cancel();
        session.await.unwrap();
    }
}
