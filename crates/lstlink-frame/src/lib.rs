//! Serial framing for the radio link.
//!
//! Every packet on the wire is wrapped as:
//! - a 2-byte sync marker (`0x22 0x69`)
//! - a 1-byte payload length
//! - the payload
//!
//! The decoder is an explicit state machine, so a stream can be fed in
//! arbitrary fragments and garbage between frames is skipped.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

pub use codec::{
    encode_frame, DecodeState, FrameConfig, FrameDecoder, DEVICE_MAX_PAYLOAD, HEADER_SIZE,
    MAX_PAYLOAD, SYNC,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;

#[cfg(feature = "async")]
pub use async_codec::EspCodec;
