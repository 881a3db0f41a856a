//! Minimal echo server: serves one channel and echoes messages back.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --features cli -- --dir /tmp/dvcprims-echo-example send ECHO \
//!     --json '{"hello":"world"}' --wait --wait-timeout 3s

use dvcprims::channel::{MessageChannel, StreamListener};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join("dvcprims-echo-example");
    let listener = StreamListener::bind(&dir, "ECHO")?;
    eprintln!("Listening on {}", listener.path().display());

    // Accept one client and echo messages until it disconnects.
    let channel = listener.accept().await?;
    let never = CancellationToken::new();

    loop {
        match channel.read_message(&never).await {
            Ok(message) => {
                eprintln!("Received {} bytes", message.len());
                channel.send_message(&message).await?;
            }
            Err(e) => {
                eprintln!("Channel closed: {e}");
                break;
            }
        }
    }

    drop(listener);
    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}
