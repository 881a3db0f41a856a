use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use dvcprims_frame::{frames, Result as FrameResult, HEADER_SIZE};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    schema_id: &'a str,
    channel: &'a str,
    size: usize,
    payload: String,
    timestamp: String,
}

pub fn print_message(channel: &str, message: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                schema_id: "https://schemas.3leaps.dev/dvcprims/cli/v1/message-received.schema.json",
                channel,
                size: message.len(),
                payload: payload_preview(message),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    channel.to_string(),
                    message.len().to_string(),
                    payload_preview(message),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "channel={} size={} payload={}",
                channel,
                message.len(),
                payload_preview(message)
            );
        }
        OutputFormat::Raw => print_raw(message),
    }
}

#[derive(Debug, Serialize)]
pub struct FrameRow {
    pub index: usize,
    pub flags: String,
    pub length: u32,
    pub payload_offset: usize,
    pub payload_size: usize,
}

/// How one message is laid out on the wire.
#[derive(Debug, Serialize)]
pub struct FrameLayout {
    pub schema_id: &'static str,
    pub message_size: usize,
    pub max_frame_payload: usize,
    pub wire_size: usize,
    pub frames: Vec<FrameRow>,
}

impl FrameLayout {
    pub fn describe(message: &[u8], max_frame_payload: usize) -> FrameResult<Self> {
        let mut offset = 0usize;
        let mut rows = Vec::new();
        for (index, (header, payload)) in frames(message, max_frame_payload)?.enumerate() {
            rows.push(FrameRow {
                index,
                flags: header.flags.to_string(),
                length: header.length,
                payload_offset: offset,
                payload_size: payload.len(),
            });
            offset += payload.len();
        }

        Ok(Self {
            schema_id: "https://schemas.3leaps.dev/dvcprims/cli/v1/frame-layout.schema.json",
            message_size: message.len(),
            max_frame_payload,
            wire_size: message.len() + rows.len() * HEADER_SIZE,
            frames: rows,
        })
    }
}

/// Print a frame layout. Raw output is handled by the caller, which writes
/// the encoded frames instead.
pub fn print_layout(layout: &FrameLayout, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(layout).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "FLAGS", "LENGTH", "OFFSET", "PAYLOAD"]);
            for row in &layout.frames {
                table.add_row(vec![
                    row.index.to_string(),
                    row.flags.clone(),
                    row.length.to_string(),
                    row.payload_offset.to_string(),
                    row.payload_size.to_string(),
                ]);
            }
            println!("{table}");
            println!(
                "{} bytes in {} frame(s), {} bytes on the wire",
                layout.message_size,
                layout.frames.len(),
                layout.wire_size
            );
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for row in &layout.frames {
                println!(
                    "frame={} flags={} length={} offset={} payload={}",
                    row.index, row.flags, row.length, row.payload_offset, row.payload_size
                );
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
