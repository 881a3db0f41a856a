use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use dvcprims_channel::{open_with_config, ChannelError, MessageChannel};
use tokio_util::sync::CancellationToken;

use crate::cmd::SendArgs;
use crate::exit::{channel_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_message, OutputFormat};

pub async fn run(args: SendArgs, dir: &Path, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = args.payload.resolve()?;
    if args.payload.is_empty() {
        tracing::debug!("no payload given, sending an empty message");
    }

    let channel = open_with_config(dir, &args.name, args.framing.config())
        .await
        .map_err(|err| channel_error("open failed", err))?;

    channel
        .send_message(&payload)
        .await
        .map_err(|err| channel_error("send failed", err))?;
    tracing::debug!(channel = channel.name(), size = payload.len(), "message sent");

    if args.wait {
        let message = wait_for_response(&channel, wait_timeout).await?;
        print_message(channel.name(), &message, format);
    }

    channel.dispose();
    Ok(SUCCESS)
}

/// Read one message, cancelling the read once `timeout` passes without one.
async fn wait_for_response<C>(channel: &C, timeout: Duration) -> CliResult<Bytes>
where
    C: MessageChannel + ?Sized,
{
    let cancel = CancellationToken::new();
    let timer = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            cancel.cancel();
        })
    };

    let result = channel.read_message(&cancel).await;
    timer.abort();

    match result {
        Ok(message) => Ok(message),
        Err(ChannelError::Cancelled) => Err(CliError::new(
            TIMEOUT,
            format!("no response within {}ms", timeout.as_millis()),
        )),
        Err(err) => Err(channel_error("receive failed", err)),
    }
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use dvcprims_channel::StreamChannel;
    use dvcprims_transport::ChannelStream;

    use super::*;

    #[tokio::test]
    async fn wait_for_response_returns_reply() {
        let (local, remote) = ChannelStream::pair(1024);
        let local = StreamChannel::new("ECHO", local);
        let remote = StreamChannel::new("ECHO", remote);

        remote.send_message(b"pong").await.unwrap();
        let reply = wait_for_response(&local, Duration::from_secs(5))
            .await
            .expect("reply should arrive");
        assert_eq!(reply.as_ref(), b"pong");
    }

    #[tokio::test]
    async fn wait_for_response_times_out() {
        let (local, _remote) = ChannelStream::pair(1024);
        let local = StreamChannel::new("ECHO", local);

        let err = wait_for_response(&local, Duration::from_millis(20))
            .await
            .expect_err("nothing was sent");
        assert_eq!(err.code, TIMEOUT);
        assert!(local.is_open());
    }

    #[tokio::test]
    async fn wait_for_response_reports_departed_peer() {
        let (local, remote) = ChannelStream::pair(1024);
        let local = StreamChannel::new("ECHO", local);
        drop(remote);

        let err = wait_for_response(&local, Duration::from_secs(5))
            .await
            .expect_err("peer is gone");
        assert_eq!(err.code, crate::exit::FAILURE);
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration(" ").is_err());
    }
}
