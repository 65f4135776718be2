/// Errors raised while turning command text into a packet, or while
/// decoding arguments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// Fewer than two tokens (system and command name).
    #[error("command too short: '{0}'")]
    TooShort(String),

    /// The first token is not a known system tag.
    #[error("unknown system '{0}'")]
    UnknownSystem(String),

    /// No descriptor with this name.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// No descriptor with this opcode.
    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    /// Too few or too many argument tokens.
    #[error("argument count mismatch for '{command}': expected {expected}, got {got}")]
    ArgumentCount {
        command: &'static str,
        expected: String,
        got: usize,
    },

    /// A token could not be encoded for its argument.
    #[error("invalid value for '{argument}': {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: String,
    },

    /// Not enough bytes left to decode an argument.
    #[error("not enough bytes for '{argument}' (need {needed}, have {available})")]
    Truncated {
        argument: &'static str,
        needed: usize,
        available: usize,
    },

    /// The encoded arguments do not fit in one frame.
    #[error("arguments too long ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A packet shorter than its 6-byte header.
    #[error("packet too short ({0} bytes)")]
    ShortPacket(usize),
}

pub type Result<T> = std::result::Result<T, CommandError>;
