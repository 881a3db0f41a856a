use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use dvcprims_channel::ChannelConfig;
use dvcprims_frame::{FrameConfig, DEFAULT_MAX_FRAME_PAYLOAD, DEFAULT_MAX_MESSAGE_SIZE};
use tokio_util::sync::CancellationToken;

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod echo;
pub mod frames;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve a channel and echo every message back.
    Echo(EchoArgs),
    /// Open a channel and send one message.
    Send(SendArgs),
    /// Serve a channel and print received messages.
    Listen(ListenArgs),
    /// Show how a message is split into frames.
    Frames(FramesArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, dir: &Path, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => block_on(echo::run(args, dir)),
        Command::Send(args) => block_on(send::run(args, dir, format)),
        Command::Listen(args) => block_on(listen::run(args, dir, format)),
        Command::Frames(args) => frames::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

fn block_on<F>(future: F) -> CliResult<i32>
where
    F: Future<Output = CliResult<i32>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime startup failed", err))?;
    runtime.block_on(future)
}

/// Token cancelled on Ctrl-C.
pub(crate) fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupt received, shutting down");
                trigger.cancel();
            }
            Err(err) => tracing::warn!(error = %err, "signal handler setup failed"),
        }
    });
    token
}

/// Framing limits. Both ends of a channel must use the same frame size.
#[derive(Args, Debug, Clone)]
pub struct FramingArgs {
    /// Maximum payload bytes per frame.
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_PAYLOAD)]
    pub max_frame_payload: usize,
    /// Largest message accepted or sent, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_MESSAGE_SIZE)]
    pub max_message_size: usize,
}

impl FramingArgs {
    pub fn config(&self) -> ChannelConfig {
        ChannelConfig {
            frame: FrameConfig {
                max_frame_payload: self.max_frame_payload,
                max_message_size: self.max_message_size,
            },
        }
    }
}

#[derive(Args, Debug)]
pub struct PayloadArgs {
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
}

impl PayloadArgs {
    pub fn is_empty(&self) -> bool {
        self.json.is_none() && self.data.is_none() && self.file.is_none()
    }

    pub fn resolve(&self) -> CliResult<Vec<u8>> {
        if let Some(json) = &self.json {
            serde_json::from_str::<serde_json::Value>(json)
                .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
            return Ok(json.as_bytes().to_vec());
        }
        if let Some(data) = &self.data {
            return Ok(data.as_bytes().to_vec());
        }
        if let Some(path) = &self.file {
            return fs::read(path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
        }
        Ok(Vec::new())
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Channel name to serve.
    pub name: String,
    #[command(flatten)]
    pub framing: FramingArgs,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Channel name to open.
    pub name: String,
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Wait for one response message and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for a response when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    #[command(flatten)]
    pub framing: FramingArgs,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Channel name to serve.
    pub name: String,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub framing: FramingArgs,
}

#[derive(Args, Debug)]
pub struct FramesArgs {
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Use a zero-filled message of this many bytes.
    #[arg(long, conflicts_with_all = ["json", "data", "file"])]
    pub size: Option<usize>,
    /// Maximum payload bytes per frame.
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_PAYLOAD)]
    pub max_frame_payload: usize,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_args_build_channel_config() {
        let framing = FramingArgs {
            max_frame_payload: 512,
            max_message_size: 4096,
        };
        let config = framing.config();
        assert_eq!(config.frame.max_frame_payload, 512);
        assert_eq!(config.frame.max_message_size, 4096);
    }

    #[test]
    fn payload_resolution() {
        let json = PayloadArgs {
            json: Some("{\"ok\":true}".into()),
            data: None,
            file: None,
        };
        assert_eq!(json.resolve().unwrap(), b"{\"ok\":true}");

        let bad = PayloadArgs {
            json: Some("{nope".into()),
            data: None,
            file: None,
        };
        assert_eq!(bad.resolve().unwrap_err().code, USAGE);

        let empty = PayloadArgs {
            json: None,
            data: None,
            file: None,
        };
        assert!(empty.is_empty());
        assert!(empty.resolve().unwrap().is_empty());
    }
}
