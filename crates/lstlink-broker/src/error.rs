/// Errors that stop a link broker.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// An endpoint could not be created or accepted on.
    #[error("transport error: {0}")]
    Transport(#[from] lstlink_transport::TransportError),

    /// Framing failed on the serial device.
    #[error("frame error: {0}")]
    Frame(#[from] lstlink_frame::FrameError),

    /// The serial device stopped answering reads or writes.
    #[error("serial device failed: {0}")]
    Device(String),

    /// A worker thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, BrokerError>;
