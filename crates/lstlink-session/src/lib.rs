//! Request/response sessions with an OpenLST radio.
//!
//! A [`Session`] owns the sequence counter and the send, wait and retry
//! logic. It talks through a [`Link`]: either straight to a serial device
//! ([`SerialLink`], shared per device through a [`DeviceRegistry`]) or
//! through a running link broker ([`BrokerLink`]).

pub mod broker_link;
pub mod error;
pub mod link;
pub mod queue;
pub mod serial_link;
pub mod session;

pub use broker_link::BrokerLink;
pub use error::{Result, SessionError};
pub use link::{open_link, Link};
pub use queue::{InboundQueue, Recv, DEFAULT_QUEUE_CAPACITY};
pub use serial_link::{DeviceRegistry, SerialLink, SerialListener};
pub use session::{
    is_reply, next_sequence, Session, SessionConfig, DEFAULT_TIMEOUT, POLL_INTERVAL,
    SEQUENCE_MAX, SEQUENCE_MIN,
};
