use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use lstlink_session::{open_link, DeviceRegistry, Link, Session, SessionConfig};
use lstlink_transport::{
    DEFAULT_ECHO_SOCKET, DEFAULT_RX_SOCKET, DEFAULT_TX_SOCKET, UART1_ECHO_SOCKET,
    UART1_RX_SOCKET, UART1_TX_SOCKET,
};

use crate::exit::{session_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod bootloader_image;
pub mod flash;
pub mod listen;
pub mod mux;
pub mod send;
pub mod sign;
pub mod telem;
pub mod time_sync;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one command to a radio and print its reply.
    Cmd(CmdArgs),
    /// Request telemetry and print it field by field.
    Telem(TelemArgs),
    /// Set the radio clock to the current time since J2000.
    TimeSync(TimeSyncArgs),
    /// Own a serial device and share it over broker sockets.
    Mux(MuxArgs),
    /// Sign (or take a signature for) an application and bootload it.
    Flash(FlashArgs),
    /// Compute an application's CBC-MAC signature.
    Sign(SignArgs),
    /// Stamp a bootloader build with a hardware ID and signing keys.
    BootloaderImage(BootloaderImageArgs),
    /// Print traffic seen on broker sockets.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Cmd(args) => send::run(args, format),
        Command::Telem(args) => telem::run(args, format),
        Command::TimeSync(args) => time_sync::run(args, format),
        Command::Mux(args) => mux::run(args),
        Command::Flash(args) => flash::run(args, format),
        Command::Sign(args) => sign::run(args),
        Command::BootloaderImage(args) => bootloader_image::run(args),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where the radio is and which one to address.
#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Receive endpoint: a broker socket (ipc://...) or a serial device.
    #[arg(short = 'r', long, env = "RX_PATH", default_value = UART1_RX_SOCKET)]
    pub rx_path: String,
    /// Transmit endpoint: a broker socket (ipc://...) or a serial device.
    #[arg(short = 't', long, env = "TX_PATH", default_value = UART1_TX_SOCKET)]
    pub tx_path: String,
    /// Hardware ID of the radio (hex, 0001 to FFFE).
    #[arg(short = 'i', long, value_parser = parse_hwid)]
    pub hwid: u16,
}

/// How long to wait for a reply and how often to re-send.
#[derive(Args, Debug)]
pub struct ReplyArgs {
    /// Wait per attempt (e.g. 1200ms, 2s).
    #[arg(long, default_value = "1200ms")]
    pub timeout: String,
    /// Re-sends after the first attempt. Default: until answered.
    #[arg(long)]
    pub retries: Option<usize>,
}

#[derive(Args, Debug)]
pub struct CmdArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    #[command(flatten)]
    pub reply: ReplyArgs,
    /// Command text, e.g. `lst get_time`.
    #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

#[derive(Args, Debug)]
pub struct TelemArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    #[command(flatten)]
    pub reply: ReplyArgs,
}

#[derive(Args, Debug)]
pub struct TimeSyncArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Give up after this many unanswered attempts. Default: never.
    #[arg(long)]
    pub max_attempts: Option<usize>,
}

#[derive(Args, Debug)]
pub struct MuxArgs {
    /// Serial device the radio is attached to.
    pub device: String,
    /// Broadcast socket for traffic from the radio.
    #[arg(long, default_value = DEFAULT_RX_SOCKET)]
    pub rx_socket: String,
    /// Ingress socket for traffic to the radio.
    #[arg(long, default_value = DEFAULT_TX_SOCKET)]
    pub tx_socket: String,
    /// Copy of everything sent to the radio.
    #[arg(long, default_value = DEFAULT_ECHO_SOCKET)]
    pub echo_socket: String,
    /// Use the UART1 socket names instead of the defaults.
    #[arg(long, conflicts_with_all = ["rx_socket", "tx_socket", "echo_socket"])]
    pub uart1: bool,
    #[arg(long, default_value_t = lstlink_transport::DEFAULT_BAUD_RATE)]
    pub baud: u32,
    /// Owner of the socket files (requires --group).
    #[arg(long, requires = "group")]
    pub user: Option<String>,
    /// Group of the socket files (requires --user).
    #[arg(long, requires = "user")]
    pub group: Option<String>,
    /// Permission bits of the socket files, in octal (e.g. 660).
    #[arg(long, value_parser = parse_mode)]
    pub mode: Option<u32>,
}

impl MuxArgs {
    /// `(rx, tx, echo)` endpoints after applying `--uart1`.
    pub fn endpoints(&self) -> (&str, &str, &str) {
        if self.uart1 {
            (UART1_RX_SOCKET, UART1_TX_SOCKET, UART1_ECHO_SOCKET)
        } else {
            (
                self.rx_socket.as_str(),
                self.tx_socket.as_str(),
                self.echo_socket.as_str(),
            )
        }
    }
}

#[derive(Args, Debug)]
pub struct FlashArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Application signature as 32 hex digits.
    #[arg(long, conflicts_with = "signature_file")]
    pub signature: Option<String>,
    /// File holding the hex signature, e.g. from `lstlink sign`.
    #[arg(long)]
    pub signature_file: Option<PathBuf>,
    /// AES-128 key (hex) to sign the application with. A given signature
    /// takes precedence.
    #[arg(short = 'k', long, env = "SIGNING_KEY", hide_env_values = true)]
    pub signing_key: Option<String>,
    /// Give up after this many bootloader entry attempts. Default: never.
    #[arg(long)]
    pub max_attempts: Option<usize>,
    /// Application image (Intel HEX).
    pub firmware: PathBuf,
}

#[derive(Args, Debug)]
pub struct SignArgs {
    /// AES-128 key (hex).
    #[arg(short = 'k', long, env = "SIGNING_KEY", hide_env_values = true)]
    pub signing_key: String,
    /// Unsigned application image (Intel HEX).
    pub input: PathBuf,
    /// Where to write the hex signature.
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct BootloaderImageArgs {
    /// Three AES-128 signing keys (hex).
    #[arg(long, num_args = 3, value_name = "KEY", required_unless_present = "key_file", conflicts_with = "key_file")]
    pub keys: Vec<String>,
    /// File with comma-separated hex signing keys.
    #[arg(long)]
    pub key_file: Option<PathBuf>,
    /// Value of the reserved word (hex).
    #[arg(long, default_value = "0", value_parser = parse_hex_u16)]
    pub reserved: u16,
    /// Hardware ID to stamp (hex, 0001 to FFFE).
    #[arg(short = 'i', long, value_parser = parse_hwid)]
    pub hwid: u16,
    /// Output file. Must not exist yet.
    #[arg(short = 'o', long)]
    pub out: PathBuf,
    /// Bootloader build (Intel HEX).
    pub bootloader: PathBuf,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Broadcast socket of the broker.
    #[arg(long, default_value = UART1_RX_SOCKET)]
    pub rx_socket: String,
    /// Echo socket of the broker.
    #[arg(long, default_value = UART1_ECHO_SOCKET)]
    pub echo_socket: String,
    /// Skip the broadcast socket.
    #[arg(long, conflicts_with = "no_echo")]
    pub no_rx: bool,
    /// Skip the echo socket.
    #[arg(long)]
    pub no_echo: bool,
    /// Exit after printing N packets.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// A hardware ID in hex, with or without `0x`.
pub fn parse_hwid(input: &str) -> Result<u16, String> {
    let hwid = parse_hex_u16(input)?;
    if hwid == 0x0000 || hwid == 0xFFFF {
        return Err(format!("hardware ID {hwid:04X} is reserved (valid: 0001 to FFFE)"));
    }
    Ok(hwid)
}

pub fn parse_hex_u16(input: &str) -> Result<u16, String> {
    let digits = input
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|_| format!("'{input}' is not a 16-bit hex value"))
}

fn parse_mode(input: &str) -> Result<u32, String> {
    let mode = u32::from_str_radix(input.trim_start_matches("0o"), 8)
        .map_err(|_| format!("'{input}' is not an octal mode"))?;
    if mode > 0o7777 {
        return Err(format!("mode {mode:o} is out of range"));
    }
    Ok(mode)
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Open the link named by `link` and wrap it in a session.
///
/// `registry` owns any serial device opened on the way and must outlive
/// the session.
pub fn open_session(
    link: &LinkArgs,
    config: SessionConfig,
    registry: &DeviceRegistry,
) -> CliResult<Session<Box<dyn Link>>> {
    let boxed = open_link(&link.rx_path, &link.tx_path, registry, config.queue_capacity)
        .map_err(|err| session_error("cannot open link", err))?;
    Ok(Session::with_config(boxed, link.hwid, config))
}

/// A flag raised on Ctrl-C.
pub fn install_ctrlc_handler(flag: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
