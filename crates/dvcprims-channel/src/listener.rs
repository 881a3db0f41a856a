use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use dvcprims_transport::{TransportError, UnixDomainSocket};
use tracing::debug;

use crate::channel::ChannelConfig;
use crate::error::Result;
use crate::name::ChannelName;
use crate::stream::StreamChannel;

/// Accepts stream channels opened by name.
pub struct StreamListener {
    name: ChannelName,
    socket: UnixDomainSocket,
    config: ChannelConfig,
    accepted: AtomicU64,
}

impl StreamListener {
    /// Serve the channel `name` from a socket in `dir`, creating `dir` if needed.
    ///
    /// Must run inside a Tokio runtime.
    pub fn bind(dir: impl AsRef<Path>, name: &str) -> Result<Self> {
        let name = ChannelName::new(name)?;
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|source| TransportError::Bind {
            path: dir.to_path_buf(),
            source,
        })?;
        let socket = UnixDomainSocket::bind(name.socket_path(dir))?;
        Ok(Self {
            name,
            socket,
            config: ChannelConfig::default(),
            accepted: AtomicU64::new(0),
        })
    }

    /// Override the configuration given to accepted channels.
    pub fn with_config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    /// Accept the next connection as a channel.
    pub async fn accept(&self) -> Result<StreamChannel> {
        let stream = self.socket.accept().await?;
        let count = self.accepted.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            channel = %self.name,
            count,
            peer = ?stream.peer_credentials(),
            "channel accepted"
        );
        Ok(StreamChannel::with_config(
            self.name.as_str(),
            stream,
            self.config.clone(),
        ))
    }

    /// The channel this listener serves.
    pub fn name(&self) -> &ChannelName {
        &self.name
    }

    /// Bound socket path.
    pub fn path(&self) -> &Path {
        self.socket.path()
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }
}
