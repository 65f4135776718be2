use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{FrameError, Result};

/// Sync marker that opens every frame.
pub const SYNC: [u8; 2] = [0x22, 0x69];

/// Frame header: sync (2) + length (1).
pub const HEADER_SIZE: usize = 3;

/// Largest payload the one-byte length field can describe.
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// Largest payload the radio firmware accepts on its UART.
pub const DEVICE_MAX_PAYLOAD: usize = 251;

/// Encode a payload into the wire format.
///
/// ```text
/// ┌──────────────┬──────────┬──────────────────┐
/// │ Sync (2B)    │ Length   │ Payload          │
/// │ 0x22 0x69    │ (1B)     │ (Length bytes)   │
/// └──────────────┴──────────┴──────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&SYNC);
    dst.put_u8(payload.len() as u8);
    dst.put_slice(payload);
    Ok(())
}

/// Where the decoder is within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeState {
    /// Scanning for the first sync byte.
    #[default]
    AwaitingSync,
    /// Saw `0x22`, expecting `0x69`.
    AwaitingSecondSync,
    /// Sync complete, next byte is the payload length.
    AwaitingLength,
    /// Collecting payload bytes.
    AwaitingPayload { remaining: usize },
}

impl DecodeState {
    /// Transition on one header byte.
    ///
    /// A repeated `0x22` keeps the match alive at the newest byte, so
    /// `22 22 69` still synchronises.
    pub fn next(self, byte: u8) -> DecodeState {
        match (self, byte) {
            (DecodeState::AwaitingSync, b) if b == SYNC[0] => DecodeState::AwaitingSecondSync,
            (DecodeState::AwaitingSync, _) => DecodeState::AwaitingSync,
            (DecodeState::AwaitingSecondSync, b) if b == SYNC[1] => DecodeState::AwaitingLength,
            (DecodeState::AwaitingSecondSync, b) if b == SYNC[0] => {
                DecodeState::AwaitingSecondSync
            }
            (DecodeState::AwaitingSecondSync, _) => DecodeState::AwaitingSync,
            (DecodeState::AwaitingLength, len) => DecodeState::AwaitingPayload {
                remaining: len as usize,
            },
            (DecodeState::AwaitingPayload { .. }, _) => self,
        }
    }
}

/// Incremental frame decoder.
///
/// Feed it bytes with [`FrameDecoder::decode`]; it consumes input only up
/// to the end of the first completed frame, so bytes that follow (possibly
/// the next frame) stay in the caller's buffer.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    state: DecodeState,
    payload: BytesMut,
    discarded: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Bytes skipped while hunting for a sync marker.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Forget any partial frame.
    pub fn reset(&mut self) {
        self.state = DecodeState::AwaitingSync;
        self.payload.clear();
    }

    /// Make progress on `src`.
    ///
    /// Returns `Some(payload)` once a frame completes, or `None` when `src`
    /// ran out first. A partial frame is kept for the next call.
    pub fn decode(&mut self, src: &mut BytesMut) -> Option<Bytes> {
        loop {
            if self.state == (DecodeState::AwaitingPayload { remaining: 0 }) {
                self.state = DecodeState::AwaitingSync;
                return Some(self.payload.split().freeze());
            }
            if src.is_empty() {
                return None;
            }

            self.state = match self.state {
                DecodeState::AwaitingPayload { remaining } => {
                    let take = remaining.min(src.len());
                    self.payload.extend_from_slice(&src.split_to(take));
                    DecodeState::AwaitingPayload {
                        remaining: remaining - take,
                    }
                }
                header => {
                    let byte = src.get_u8();
                    let next = header.next(byte);
                    self.count_discarded(header, next);
                    next
                }
            };
        }
    }

    /// Decode every complete frame in `data`.
    pub fn decode_all(&mut self, data: &[u8]) -> Vec<Bytes> {
        let mut src = BytesMut::from(data);
        let mut frames = Vec::new();
        while let Some(frame) = self.decode(&mut src) {
            frames.push(frame);
        }
        frames
    }

    fn count_discarded(&mut self, from: DecodeState, to: DecodeState) {
        let skipped = match (from, to) {
            (DecodeState::AwaitingSync, DecodeState::AwaitingSync) => 1,
            (DecodeState::AwaitingSecondSync, DecodeState::AwaitingSecondSync) => 1,
            (DecodeState::AwaitingSecondSync, DecodeState::AwaitingSync) => 2,
            _ => 0,
        };
        if skipped > 0 {
            self.discarded += skipped;
            trace!(discarded = self.discarded, "skipping bytes outside a frame");
        }
    }
}

/// Configuration for frame readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size accepted by the writer. Default: 255.
    pub max_payload_size: usize,
    /// Read timeout for stream-backed readers.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for stream-backed writers.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
