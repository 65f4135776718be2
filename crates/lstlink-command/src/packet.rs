use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CommandError, Result};

/// Bytes available for arguments after the header, within the radio's
/// 251-byte frame ceiling.
pub const MAX_ARGUMENT_SIZE: usize = 245;

/// The fixed 6-byte header at the front of every packet.
///
/// ```text
/// ┌────────────┬────────────┬────────┬────────┐
/// │ target u16 │ seq u16    │ system │ opcode │
/// │ (LE)       │ (LE)       │ (1B)   │ (1B)   │
/// └────────────┴────────────┴────────┴────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketHeader {
    pub target_id: u16,
    pub sequence: u16,
    pub system: u8,
    pub opcode: u8,
}

impl PacketHeader {
    pub const SIZE: usize = 6;

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(CommandError::ShortPacket(bytes.len()));
        }
        Ok(Self {
            target_id: u16::from_le_bytes([bytes[0], bytes[1]]),
            sequence: u16::from_le_bytes([bytes[2], bytes[3]]),
            system: bytes[4],
            opcode: bytes[5],
        })
    }

    pub fn write(&self, dst: &mut BytesMut) {
        dst.reserve(Self::SIZE);
        dst.put_u16_le(self.target_id);
        dst.put_u16_le(self.sequence);
        dst.put_u8(self.system);
        dst.put_u8(self.opcode);
    }
}

/// A packet split into its header and argument bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet<'a> {
    pub header: PacketHeader,
    pub arguments: &'a [u8],
}

impl<'a> Packet<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        let header = PacketHeader::parse(bytes)?;
        Ok(Self {
            header,
            arguments: &bytes[PacketHeader::SIZE..],
        })
    }

    /// Serialise, refusing argument payloads the radio cannot carry.
    pub fn to_bytes(&self) -> Result<Bytes> {
        if self.arguments.len() > MAX_ARGUMENT_SIZE {
            return Err(CommandError::PayloadTooLarge {
                size: self.arguments.len(),
                max: MAX_ARGUMENT_SIZE,
            });
        }
        let mut buf = BytesMut::with_capacity(PacketHeader::SIZE + self.arguments.len());
        self.header.write(&mut buf);
        buf.put_slice(self.arguments);
        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fields_are_little_endian() {
        let header = PacketHeader::parse(&[0x34, 0x12, 0x10, 0x00, 0x01, 0x14]).unwrap();
        assert_eq!(
            header,
            PacketHeader {
                target_id: 0x1234,
                sequence: 16,
                system: 0x01,
                opcode: 0x14,
            }
        );
    }

    #[test]
    fn packet_keeps_arguments() {
        let raw = [0x01, 0x00, 0x20, 0x00, 0x01, 0x01, 0x07];
        let packet = Packet::parse(&raw).unwrap();
        assert_eq!(packet.header.sequence, 0x20);
        assert_eq!(packet.arguments, &[0x07]);
        assert_eq!(packet.to_bytes().unwrap().as_ref(), &raw);
    }

    #[test]
    fn oversized_arguments_not_serialised() {
        let arguments = [0u8; MAX_ARGUMENT_SIZE + 1];
        let packet = Packet {
            header: PacketHeader {
                target_id: 1,
                sequence: 16,
                system: 0x01,
                opcode: 0x11,
            },
            arguments: &arguments,
        };
        assert_eq!(
            packet.to_bytes().unwrap_err(),
            CommandError::PayloadTooLarge { size: 246, max: 245 }
        );
    }

    #[test]
    fn short_packet_rejected() {
        assert_eq!(
            PacketHeader::parse(&[1, 2, 3]).unwrap_err(),
            CommandError::ShortPacket(3)
        );
    }
}
