use std::path::Path;

use dvcprims_channel::{ChannelError, MessageChannel, StreamListener};

use crate::cmd::{shutdown_on_ctrl_c, ListenArgs};
use crate::exit::{channel_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub async fn run(args: ListenArgs, dir: &Path, format: OutputFormat) -> CliResult<i32> {
    let listener = StreamListener::bind(dir, &args.name)
        .map_err(|err| channel_error("bind failed", err))?
        .with_config(args.framing.config());
    tracing::info!(channel = %listener.name(), path = %listener.path().display(), "listening");

    let shutdown = shutdown_on_ctrl_c();
    let mut printed = 0usize;

    loop {
        let channel = tokio::select! {
            _ = shutdown.cancelled() => return Ok(SUCCESS),
            accepted = listener.accept() => {
                accepted.map_err(|err| channel_error("accept failed", err))?
            }
        };

        loop {
            let message = match channel.read_message(&shutdown).await {
                Ok(message) => message,
                Err(ChannelError::Disconnected) => break,
                Err(ChannelError::Cancelled) => return Ok(SUCCESS),
                Err(err) => return Err(channel_error("receive failed", err)),
            };

            print_message(channel.name(), &message, format);
            printed = printed.saturating_add(1);

            if let Some(count) = args.count {
                if printed >= count {
                    channel.dispose();
                    return Ok(SUCCESS);
                }
            }
        }
    }
}
