/// Errors that can occur while talking to a radio.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] lstlink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] lstlink_frame::FrameError),

    /// The command text could not be encoded.
    #[error("command error: {0}")]
    Command(#[from] lstlink_command::CommandError),

    /// The radio answered, but not with what the caller required.
    #[error(
        "reply to '{command}' was {}, expected '{expected}'",
        .actual.as_deref().map_or("nothing".to_string(), |a| format!("'{a}'"))
    )]
    UnexpectedReply {
        command: String,
        expected: String,
        actual: Option<String>,
    },

    /// The link's background reader stopped.
    #[error("link disconnected: {0}")]
    Disconnected(String),

    /// The cancel flag was raised while waiting.
    #[error("cancelled")]
    Cancelled,
}

impl SessionError {
    /// Whether this is a missing reply rather than a wrong one.
    pub fn is_no_response(&self) -> bool {
        matches!(self, SessionError::UnexpectedReply { actual: None, .. })
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
