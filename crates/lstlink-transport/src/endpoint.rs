//! Endpoint addressing.
//!
//! Client tools take an rx path and a tx path. A path with the `ipc://`
//! scheme names a broker socket; anything else is a serial device.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, TransportError};

/// Scheme prefix for broker endpoints.
pub const IPC_SCHEME: &str = "ipc://";

/// Broker broadcast endpoint (inbound radio traffic) for UART0.
pub const DEFAULT_RX_SOCKET: &str = "ipc:///tmp/radiomux_rx";
/// Broker ingress endpoint (outbound packets) for UART0.
pub const DEFAULT_TX_SOCKET: &str = "ipc:///tmp/radiomux_tx";
/// Broker echo endpoint (copy of everything transmitted) for UART0.
pub const DEFAULT_ECHO_SOCKET: &str = "ipc:///tmp/radiomux_echo";
/// Broker broadcast endpoint for UART1.
pub const UART1_RX_SOCKET: &str = "ipc:///tmp/radiomux1_rx";
/// Broker ingress endpoint for UART1.
pub const UART1_TX_SOCKET: &str = "ipc:///tmp/radiomux1_tx";
/// Broker echo endpoint for UART1.
pub const UART1_ECHO_SOCKET: &str = "ipc:///tmp/radiomux1_echo";

/// Where a link's bytes go.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// A broker socket on the local filesystem.
    Ipc(PathBuf),
    /// A serial device such as `/dev/ttyUSB0`.
    Serial(String),
}

impl Endpoint {
    /// Classify a path string.
    pub fn parse(input: &str) -> Self {
        match input.strip_prefix(IPC_SCHEME) {
            Some(path) => Endpoint::Ipc(PathBuf::from(path)),
            None => Endpoint::Serial(input.to_string()),
        }
    }

    /// Parse a string that must name a broker socket.
    pub fn parse_ipc(input: &str) -> Result<PathBuf> {
        match Self::parse(input) {
            Endpoint::Ipc(path) if !path.as_os_str().is_empty() => Ok(path),
            _ => Err(TransportError::InvalidEndpoint(input.to_string())),
        }
    }

    pub fn is_ipc(&self) -> bool {
        matches!(self, Endpoint::Ipc(_))
    }

    /// Socket path, if this is a broker endpoint.
    pub fn ipc_path(&self) -> Option<&Path> {
        match self {
            Endpoint::Ipc(path) => Some(path),
            Endpoint::Serial(_) => None,
        }
    }
}

impl FromStr for Endpoint {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Ipc(path) => write!(f, "{IPC_SCHEME}{}", path.display()),
            Endpoint::Serial(device) => f.write_str(device),
        }
    }
}
