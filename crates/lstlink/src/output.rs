use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use lstlink_flash::FlashReport;
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
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

#[derive(Serialize)]
struct ReplyOutput<'a> {
    hwid: String,
    command: &'a str,
    reply: &'a str,
    timestamp: String,
}

/// A command and the radio's decoded answer.
pub fn print_reply(hwid: u16, command: &str, reply: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ReplyOutput {
            hwid: format_hwid(hwid),
            command,
            reply,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["HWID", "COMMAND", "REPLY"]);
            table.add_row(vec![format_hwid(hwid), command.to_string(), reply.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => println!("{reply}"),
    }
}

#[derive(Serialize)]
struct FieldsOutput<'a> {
    hwid: String,
    reply: &'a str,
    fields: serde_json::Map<String, serde_json::Value>,
    timestamp: String,
}

/// Named reply fields, e.g. telemetry.
pub fn print_fields(
    hwid: u16,
    reply: &str,
    fields: &[(&'static str, String)],
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let fields = fields
                .iter()
                .map(|(name, value)| ((*name).to_string(), field_value(value)))
                .collect();
            print_json(&FieldsOutput {
                hwid: format_hwid(hwid),
                reply,
                fields,
                timestamp: now_unix_seconds(),
            });
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["FIELD", "VALUE"]);
            for (name, value) in fields {
                table.add_row(vec![(*name).to_string(), value.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{reply}");
            for (name, value) in fields {
                println!("{name} {value}");
            }
        }
        OutputFormat::Raw => println!("{reply}"),
    }
}

/// Integers stay numbers in JSON; anything else is a string.
fn field_value(value: &str) -> serde_json::Value {
    match value.parse::<i64>() {
        Ok(number) => serde_json::Value::from(number),
        Err(_) => serde_json::Value::from(value),
    }
}

#[derive(Serialize)]
struct PacketOutput<'a> {
    endpoint: &'a str,
    size: usize,
    packet: String,
    decoded: &'a str,
    timestamp: String,
}

/// One packet seen on a broker endpoint.
pub fn print_packet(endpoint: &str, packet: &[u8], decoded: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&PacketOutput {
            endpoint,
            size: packet.len(),
            packet: hex::encode(packet),
            decoded,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["ENDPOINT", "SIZE", "DECODED"]);
            table.add_row(vec![
                endpoint.to_string(),
                packet.len().to_string(),
                decoded.to_string(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{endpoint} size={} {decoded}", packet.len());
        }
        OutputFormat::Raw => print_raw(packet),
    }
}

#[derive(Serialize)]
struct FlashOutput {
    hwid: String,
    pages_written: usize,
    pages_skipped: usize,
    attempts: usize,
}

pub fn print_flash_report(hwid: u16, report: &FlashReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&FlashOutput {
            hwid: format_hwid(hwid),
            pages_written: report.pages_written,
            pages_skipped: report.pages_skipped,
            attempts: report.attempts,
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["HWID", "WRITTEN", "SKIPPED", "ATTEMPTS"]);
            table.add_row(vec![
                format_hwid(hwid),
                report.pages_written.to_string(),
                report.pages_skipped.to_string(),
                report.attempts.to_string(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => println!(
            "flashed {}: {} pages written, {} skipped, bootloader entered after {} attempt(s)",
            format_hwid(hwid),
            report.pages_written,
            report.pages_skipped,
            report.attempts
        ),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn format_hwid(hwid: u16) -> String {
    format!("{hwid:04X}")
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
