use std::path::{Path, PathBuf};

use dvcprims_transport::UnixDomainSocket;
use tracing::info;

use crate::channel::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::name::ChannelName;
use crate::stream::StreamChannel;

/// Environment variable naming the directory that holds channel endpoints.
pub const CHANNEL_DIR_ENV: &str = "DVCPRIMS_CHANNEL_DIR";

/// Endpoint directory from [`CHANNEL_DIR_ENV`], else `<tmp>/dvcprims`.
pub fn default_channel_dir() -> PathBuf {
    match std::env::var_os(CHANNEL_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => std::env::temp_dir().join("dvcprims"),
    }
}

/// Open the channel named `name`, served by a listener in `dir`.
pub async fn open(dir: impl AsRef<Path>, name: &str) -> Result<StreamChannel> {
    open_with_config(dir, name, ChannelConfig::default()).await
}

/// Open with explicit configuration.
///
/// The name is validated before anything touches the filesystem. A missing
/// endpoint, or one nobody is accepting on, is [`ChannelError::Unavailable`].
pub async fn open_with_config(
    dir: impl AsRef<Path>,
    name: &str,
    config: ChannelConfig,
) -> Result<StreamChannel> {
    let name = ChannelName::new(name)?;
    let path = name.socket_path(dir);

    match UnixDomainSocket::connect(&path).await {
        Ok(stream) => {
            info!(channel = %name, ?path, "channel opened");
            Ok(StreamChannel::with_config(name.as_str(), stream, config))
        }
        Err(err) if err.is_unavailable() => Err(ChannelError::Unavailable {
            name: name.to_string(),
            source: err,
        }),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::channel::MessageChannel;
    use crate::listener::StreamListener;

    fn make_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "dvcc-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir
    }

    #[tokio::test]
    async fn open_roundtrip() {
        let dir = make_dir("open");
        let listener = StreamListener::bind(&dir, "ECHO").expect("listener should bind");

        let server = tokio::spawn(async move {
            let channel = listener.accept().await.expect("listener should accept");
            let message = channel
                .read_message(&CancellationToken::new())
                .await
                .expect("should receive message");
            channel
                .send_message(&message)
                .await
                .expect("should echo message");
            let err = channel
                .read_message(&CancellationToken::new())
                .await
                .expect_err("client should go away");
            assert!(matches!(err, ChannelError::Disconnected));
            assert!(!channel.is_open());
        });

        let client = open(&dir, "ECHO").await.expect("client should open");
        let payload = vec![0xABu8; 64 * 1024];
        client.send_message(&payload).await.expect("send should succeed");
        let echoed = client
            .read_message(&CancellationToken::new())
            .await
            .expect("echo should arrive");
        assert_eq!(echoed.as_ref(), payload.as_slice());

        client.dispose();
        server.await.expect("server task should complete");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn default_channel_dir_is_absolute() {
        let dir = default_channel_dir();
        assert!(dir.is_absolute() || std::env::var_os(CHANNEL_DIR_ENV).is_some());
    }

    #[tokio::test]
    async fn missing_endpoint_is_unavailable() {
        let dir = make_dir("missing");
        let err = open(&dir, "NOPE").await.unwrap_err();
        assert!(matches!(err, ChannelError::Unavailable { ref name, .. } if name == "NOPE"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn invalid_name_rejected_before_connecting() {
        let dir = make_dir("invalid");
        let err = open(&dir, "TOOLONGNAME").await.unwrap_err();
        assert!(matches!(err, ChannelError::InvalidName { .. }));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
