//! Link broker: exclusive owner of one serial device.
//!
//! Clients never open the device themselves. They write packets to the
//! ingress socket and read the device's traffic from the broadcast socket.
//! Every packet accepted for transmission is also copied to the echo
//! socket for monitoring tools.
//!
//! Fan-out is best effort. A subscriber that attaches late misses what was
//! already published, and one that cannot keep up is dropped.

pub mod broker;
pub mod config;
pub mod error;
pub mod fanout;

pub use broker::{Broker, BrokerStats, SubscriberCounts};
pub use config::{BrokerConfig, DEFAULT_POLL_TIMEOUT, DEFAULT_SUBSCRIBER_WRITE_TIMEOUT};
pub use error::{BrokerError, Result};
pub use fanout::Fanout;
