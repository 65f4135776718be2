//! Physical and local transports for talking to a radio.
//!
//! Two kinds of byte pipe live here:
//! - [`SerialDevice`], the UART the radio is attached to
//! - [`UnixDomainSocket`] / [`IpcStream`], the local endpoints a link broker
//!   exposes so several tools can share one serial device
//!
//! [`Endpoint`] decides which of the two an rx/tx path string refers to.

pub mod endpoint;
pub mod error;
pub mod serial;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use endpoint::{
    Endpoint, DEFAULT_ECHO_SOCKET, DEFAULT_RX_SOCKET, DEFAULT_TX_SOCKET, IPC_SCHEME,
    UART1_ECHO_SOCKET, UART1_RX_SOCKET, UART1_TX_SOCKET,
};
pub use error::{Result, TransportError};
pub use serial::{SerialConfig, SerialDevice, DEFAULT_BAUD_RATE};
pub use traits::IpcStream;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
