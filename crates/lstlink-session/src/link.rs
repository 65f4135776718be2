use std::time::Duration;

use bytes::Bytes;
use lstlink_transport::{Endpoint, TransportError};

use crate::broker_link::BrokerLink;
use crate::error::Result;
use crate::serial_link::{DeviceRegistry, SerialLink};

/// A packet pipe to a radio.
///
/// Implementations add and strip the serial framing themselves; callers
/// deal in bare packets.
pub trait Link: Send {
    /// Transmit one packet.
    fn send_message(&mut self, message: &[u8]) -> Result<()>;

    /// Wait up to `timeout` for the next inbound packet.
    fn poll_message(&mut self, timeout: Duration) -> Result<Option<Bytes>>;

    /// Discard inbound packets that arrived before now.
    fn flush(&mut self) -> Result<()>;
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn send_message(&mut self, message: &[u8]) -> Result<()> {
        (**self).send_message(message)
    }

    fn poll_message(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        (**self).poll_message(timeout)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// Open a link from rx/tx path strings.
///
/// An `ipc://` rx path selects the broker's broadcast socket, and the tx
/// path must then be a broker ingress socket too. Anything else is a
/// serial device, shared through `registry`; the tx path is ignored.
pub fn open_link(
    rx: &str,
    tx: &str,
    registry: &DeviceRegistry,
    queue_capacity: usize,
) -> Result<Box<dyn Link>> {
    match Endpoint::parse(rx) {
        Endpoint::Ipc(rx_path) => {
            let tx_path = Endpoint::parse_ipc(tx)?;
            Ok(Box::new(BrokerLink::connect(
                &rx_path,
                &tx_path,
                queue_capacity,
            )?))
        }
        Endpoint::Serial(device) if device.is_empty() => {
            Err(TransportError::InvalidEndpoint(rx.to_string()).into())
        }
        Endpoint::Serial(device) => {
            let listener = registry.open(&device)?;
            Ok(Box::new(SerialLink::new(listener, queue_capacity)))
        }
    }
}
