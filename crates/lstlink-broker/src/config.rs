use std::path::PathBuf;
use std::time::Duration;

use lstlink_frame::DEVICE_MAX_PAYLOAD;
use lstlink_transport::{
    Endpoint, DEFAULT_ECHO_SOCKET, DEFAULT_RX_SOCKET, DEFAULT_TX_SOCKET,
};

use crate::error::Result;

/// How long the poll loop and reader threads wait before re-checking the
/// stop flag.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// A subscriber that cannot take a frame within this long is dropped.
pub const DEFAULT_SUBSCRIBER_WRITE_TIMEOUT: Duration = Duration::from_millis(250);

/// Broker endpoints and timing.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Broadcast of everything the device sends.
    pub broadcast: PathBuf,
    /// Ingress for packets to transmit.
    pub ingress: PathBuf,
    /// Copy of every packet accepted for transmission.
    pub echo: PathBuf,
    pub poll_timeout: Duration,
    pub subscriber_write_timeout: Duration,
    /// Outbound packets longer than this are truncated before the device
    /// write.
    pub device_max_payload: usize,
    /// Permission bits for the endpoint files.
    pub socket_mode: Option<u32>,
    /// `(user, group)` to hand the endpoint files to.
    pub owner: Option<(String, String)>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            broadcast: strip_scheme(DEFAULT_RX_SOCKET),
            ingress: strip_scheme(DEFAULT_TX_SOCKET),
            echo: strip_scheme(DEFAULT_ECHO_SOCKET),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            subscriber_write_timeout: DEFAULT_SUBSCRIBER_WRITE_TIMEOUT,
            device_max_payload: DEVICE_MAX_PAYLOAD,
            socket_mode: None,
            owner: None,
        }
    }
}

fn strip_scheme(endpoint: &str) -> PathBuf {
    match Endpoint::parse(endpoint) {
        Endpoint::Ipc(path) => path,
        Endpoint::Serial(path) => PathBuf::from(path),
    }
}

impl BrokerConfig {
    /// Build from `ipc://` endpoint strings (rx = broadcast, tx = ingress).
    pub fn from_endpoints(rx: &str, tx: &str, echo: &str) -> Result<Self> {
        Ok(Self {
            broadcast: Endpoint::parse_ipc(rx)?,
            ingress: Endpoint::parse_ipc(tx)?,
            echo: Endpoint::parse_ipc(echo)?,
            ..Self::default()
        })
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn with_subscriber_write_timeout(mut self, timeout: Duration) -> Self {
        self.subscriber_write_timeout = timeout;
        self
    }

    pub fn with_device_max_payload(mut self, max: usize) -> Self {
        self.device_max_payload = max;
        self
    }

    pub fn with_socket_mode(mut self, mode: u32) -> Self {
        self.socket_mode = Some(mode);
        self
    }

    pub fn with_owner(mut self, user: impl Into<String>, group: impl Into<String>) -> Self {
        self.owner = Some((user.into(), group.into()));
        self
    }
}

#[cfg(test)]
mod tests {
    use lstlink_transport::TransportError;

    use super::*;
    use crate::error::BrokerError;

    #[test]
    fn defaults_use_radiomux_paths() {
        let config = BrokerConfig::default();
        assert_eq!(config.broadcast, PathBuf::from("/tmp/radiomux_rx"));
        assert_eq!(config.ingress, PathBuf::from("/tmp/radiomux_tx"));
        assert_eq!(config.echo, PathBuf::from("/tmp/radiomux_echo"));
        assert_eq!(config.device_max_payload, 251);
        assert_eq!(config.poll_timeout, Duration::from_millis(500));
    }

    #[test]
    fn endpoints_must_be_ipc() {
        let config = BrokerConfig::from_endpoints(
            "ipc:///tmp/radiomux1_rx",
            "ipc:///tmp/radiomux1_tx",
            "ipc:///tmp/radiomux1_echo",
        )
        .unwrap();
        assert_eq!(config.ingress, PathBuf::from("/tmp/radiomux1_tx"));

        let err = BrokerConfig::from_endpoints("/dev/ttyUSB0", "ipc:///a", "ipc:///b")
            .unwrap_err();
        assert!(matches!(
            err,
            BrokerError::Transport(TransportError::InvalidEndpoint(_))
        ));
    }
}
