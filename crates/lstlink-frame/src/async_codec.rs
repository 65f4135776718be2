//! Tokio codec over the same framing, for async consumers.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_frame, FrameDecoder, MAX_PAYLOAD};
use crate::error::FrameError;

/// `tokio_util` codec yielding frame payloads.
#[derive(Debug)]
pub struct EspCodec {
    decoder: FrameDecoder,
    max_payload_size: usize,
}

impl EspCodec {
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PAYLOAD)
    }

    /// Refuse to encode payloads longer than `max_payload_size`.
    pub fn with_max_payload(max_payload_size: usize) -> Self {
        Self {
            decoder: FrameDecoder::new(),
            max_payload_size: max_payload_size.min(MAX_PAYLOAD),
        }
    }
}

impl Default for EspCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for EspCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.decoder.decode(src))
    }
}

impl<T: AsRef<[u8]>> Encoder<T> for EspCodec {
    type Error = FrameError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = item.as_ref();
        if payload.len() > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload_size,
            });
        }
        encode_frame(payload, dst)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;

    #[tokio::test]
    async fn framed_read_skips_noise() {
        let mut wire = BytesMut::new();
        wire.extend_from_slice(&[0x00, 0x22, 0x00]);
        encode_frame(b"first", &mut wire).unwrap();
        encode_frame(b"", &mut wire).unwrap();
        let wire = wire.freeze();

        let mut framed = FramedRead::new(&wire[..], EspCodec::new());
        assert_eq!(framed.next().await.unwrap().unwrap().as_ref(), b"first");
        assert!(framed.next().await.unwrap().unwrap().is_empty());
        assert!(framed.next().await.is_none());
    }

    #[tokio::test]
    async fn framed_write_then_read() {
        let mut sink = FramedWrite::new(Vec::new(), EspCodec::new());
        sink.send(b"ping".as_slice()).await.unwrap();
        sink.send(vec![0x22, 0x69]).await.unwrap();
        let wire = sink.into_inner();

        let mut framed = FramedRead::new(wire.as_slice(), EspCodec::new());
        assert_eq!(framed.next().await.unwrap().unwrap().as_ref(), b"ping");
        assert_eq!(framed.next().await.unwrap().unwrap().as_ref(), &[0x22, 0x69]);
    }

    #[test]
    fn encode_respects_device_limit() {
        let mut codec = EspCodec::with_max_payload(crate::DEVICE_MAX_PAYLOAD);
        let mut dst = BytesMut::new();
        let err = codec.encode([0u8; 252], &mut dst).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 252, max: 251 }));
    }
}
