//! Ground tooling for OpenLST radios.
//!
//! lstlink talks to an OpenLST radio over its serial line, either directly
//! or through a broker process that owns the device and shares it with
//! any number of clients.
//!
//! # Crate Structure
//!
//! - [`transport`]: Unix socket endpoints and the serial device
//! - [`frame`]: the `0x22 0x69 len` serial framing
//! - [`command`]: command text to packet bytes and back
//! - [`session`]: sequence numbers, replies, retries and links
//! - [`broker`]: the process that owns a serial device and fans it out
//! - [`flash`]: flash layout, signing, Intel HEX and the bootloader

/// Re-export transport types.
pub mod transport {
    pub use lstlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use lstlink_frame::*;
}

/// Re-export command codec types.
pub mod command {
    pub use lstlink_command::*;
}

/// Re-export session types.
pub mod session {
    pub use lstlink_session::*;
}

/// Re-export broker types.
pub mod broker {
    pub use lstlink_broker::*;
}

/// Re-export flash types.
pub mod flash {
    pub use lstlink_flash::*;
}
