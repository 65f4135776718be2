use std::fmt;
use std::io;

use lstlink_broker::BrokerError;
use lstlink_flash::{FlashError, ImageError};
use lstlink_frame::FrameError;
use lstlink_session::SessionError;
use lstlink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
/// Also used when the radio never answered.
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::PermissionDenied => TRANSPORT_ERROR,
        io::ErrorKind::AlreadyExists => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::InvalidEndpoint(_) => CliError::new(USAGE, format!("{context}: {err}")),
        TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn session_error(context: &str, err: SessionError) -> CliError {
    if err.is_no_response() {
        return CliError::new(TIMEOUT, format!("{context}: {err}"));
    }
    match err {
        SessionError::Transport(err) => transport_error(context, err),
        SessionError::Frame(err) => frame_error(context, err),
        SessionError::Command(_) | SessionError::UnexpectedReply { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        SessionError::Disconnected(_) | SessionError::Cancelled => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
    }
}

pub fn broker_error(context: &str, err: BrokerError) -> CliError {
    match err {
        BrokerError::Transport(err) => transport_error(context, err),
        BrokerError::Frame(err) => frame_error(context, err),
        BrokerError::Device(_) => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn image_error(context: &str, err: ImageError) -> CliError {
    match err {
        ImageError::KeyLength { .. } | ImageError::KeyHex(_) | ImageError::InvalidHwid(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn flash_error(context: &str, err: FlashError) -> CliError {
    match err {
        FlashError::Image(err) => image_error(context, err),
        FlashError::Session(err) => session_error(context, err),
        FlashError::BootloaderUnreachable { .. } | FlashError::PageWrite { .. } => {
            CliError::new(TIMEOUT, format!("{context}: {err}"))
        }
        FlashError::Cancelled => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}
