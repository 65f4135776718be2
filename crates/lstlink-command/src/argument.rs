//! Typed command arguments.
//!
//! The set of argument kinds is closed: integers of three widths (signed
//! and unsigned), fixed-length hex blobs, free text, and enumerations.

use bytes::{BufMut, BytesMut};

use crate::error::{CommandError, Result};

/// Width and signedness of an integer argument. All encodings are
/// little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
}

impl IntType {
    pub const fn width(self) -> usize {
        match self {
            IntType::I8 | IntType::U8 => 1,
            IntType::I16 | IntType::U16 => 2,
            IntType::I32 | IntType::U32 => 4,
        }
    }

    pub const fn min(self) -> i64 {
        match self {
            IntType::I8 => i8::MIN as i64,
            IntType::I16 => i16::MIN as i64,
            IntType::I32 => i32::MIN as i64,
            IntType::U8 | IntType::U16 | IntType::U32 => 0,
        }
    }

    pub const fn max(self) -> i64 {
        match self {
            IntType::I8 => i8::MAX as i64,
            IntType::U8 => u8::MAX as i64,
            IntType::I16 => i16::MAX as i64,
            IntType::U16 => u16::MAX as i64,
            IntType::I32 => i32::MAX as i64,
            IntType::U32 => u32::MAX as i64,
        }
    }

    // Callers range-check `value` first, so the narrowing casts are exact.
    fn put(self, value: i64, dst: &mut BytesMut) {
        match self {
            IntType::I8 => dst.put_i8(value as i8),
            IntType::U8 => dst.put_u8(value as u8),
            IntType::I16 => dst.put_i16_le(value as i16),
            IntType::U16 => dst.put_u16_le(value as u16),
            IntType::I32 => dst.put_i32_le(value as i32),
            IntType::U32 => dst.put_u32_le(value as u32),
        }
    }

    fn get(self, src: &[u8]) -> i64 {
        match self {
            IntType::I8 => src[0] as i8 as i64,
            IntType::U8 => src[0] as i64,
            IntType::I16 => i16::from_le_bytes([src[0], src[1]]) as i64,
            IntType::U16 => u16::from_le_bytes([src[0], src[1]]) as i64,
            IntType::I32 => i32::from_le_bytes([src[0], src[1], src[2], src[3]]) as i64,
            IntType::U32 => u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as i64,
        }
    }
}

/// Which side of a short hex blob gets zero-filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pad {
    Left,
    Right,
    /// Input must be exactly the declared length.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Int { ty: IntType, min: i64, max: i64 },
    Hex { length: usize, pad: Pad },
    /// Free text; always the last argument and takes every remaining token.
    Text,
    Enum { mapping: &'static [(&'static str, u8)] },
}

/// One named positional argument of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argument {
    pub name: &'static str,
    pub kind: ArgKind,
}

impl Argument {
    /// An integer argument over the full range of `ty`.
    pub const fn int(name: &'static str, ty: IntType) -> Self {
        Self::int_range(name, ty, ty.min(), ty.max())
    }

    /// An integer argument restricted to `min..=max`.
    pub const fn int_range(name: &'static str, ty: IntType, min: i64, max: i64) -> Self {
        assert!(min >= ty.min() && max <= ty.max() && min <= max);
        Self {
            name,
            kind: ArgKind::Int { ty, min, max },
        }
    }

    pub const fn i8(name: &'static str) -> Self {
        Self::int(name, IntType::I8)
    }

    pub const fn u8(name: &'static str) -> Self {
        Self::int(name, IntType::U8)
    }

    pub const fn i16(name: &'static str) -> Self {
        Self::int(name, IntType::I16)
    }

    pub const fn u16(name: &'static str) -> Self {
        Self::int(name, IntType::U16)
    }

    pub const fn i32(name: &'static str) -> Self {
        Self::int(name, IntType::I32)
    }

    pub const fn u32(name: &'static str) -> Self {
        Self::int(name, IntType::U32)
    }

    pub const fn hex(name: &'static str, length: usize, pad: Pad) -> Self {
        Self {
            name,
            kind: ArgKind::Hex { length, pad },
        }
    }

    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            kind: ArgKind::Text,
        }
    }

    pub const fn enumeration(name: &'static str, mapping: &'static [(&'static str, u8)]) -> Self {
        Self {
            name,
            kind: ArgKind::Enum { mapping },
        }
    }

    /// Whether this argument swallows all remaining tokens.
    pub fn consumes_rest(&self) -> bool {
        matches!(self.kind, ArgKind::Text)
    }

    /// Append the wire form of `token` to `dst`.
    pub fn encode(&self, token: &str, dst: &mut BytesMut) -> Result<()> {
        match self.kind {
            ArgKind::Int { ty, min, max } => {
                let value = parse_int(token)
                    .ok_or_else(|| self.invalid(format!("'{token}' is not an integer")))?;
                if value < min || value > max {
                    return Err(self.invalid(format!("{value} is outside {min}..={max}")));
                }
                ty.put(value, dst);
            }
            ArgKind::Hex { length, pad } => {
                let bytes = hex::decode(token)
                    .map_err(|err| self.invalid(format!("'{token}' is not hex: {err}")))?;
                if bytes.len() > length {
                    return Err(self.invalid(format!(
                        "{} bytes is longer than {length}",
                        bytes.len()
                    )));
                }
                let fill = length - bytes.len();
                match pad {
                    Pad::None if fill > 0 => {
                        return Err(self.invalid(format!(
                            "{} bytes is shorter than {length}",
                            bytes.len()
                        )));
                    }
                    Pad::Left => {
                        dst.put_bytes(0, fill);
                        dst.put_slice(&bytes);
                    }
                    Pad::Right | Pad::None => {
                        dst.put_slice(&bytes);
                        dst.put_bytes(0, fill);
                    }
                }
            }
            ArgKind::Text => dst.put_slice(strip_quotes(token).as_bytes()),
            ArgKind::Enum { mapping } => {
                let code = mapping
                    .iter()
                    .find(|(name, _)| *name == token)
                    .map(|(_, code)| *code)
                    .or_else(|| {
                        let value = parse_int(token)?;
                        mapping
                            .iter()
                            .find(|(_, code)| i64::from(*code) == value)
                            .map(|(_, code)| *code)
                    })
                    .ok_or_else(|| self.invalid(format!("'{token}' is not in the enumeration")))?;
                dst.put_u8(code);
            }
        }
        Ok(())
    }

    /// Decode one value from the front of `src`, returning its text form and
    /// the unconsumed bytes.
    pub fn decode<'a>(&self, src: &'a [u8]) -> Result<(String, &'a [u8])> {
        match self.kind {
            ArgKind::Int { ty, .. } => {
                let (head, rest) = self.split(src, ty.width())?;
                Ok((ty.get(head).to_string(), rest))
            }
            ArgKind::Hex { length, .. } => {
                let (head, rest) = self.split(src, length)?;
                Ok((hex::encode(head), rest))
            }
            ArgKind::Text => Ok((format!("\"{}\"", String::from_utf8_lossy(src)), &[])),
            ArgKind::Enum { mapping } => {
                let (head, rest) = self.split(src, 1)?;
                let name = mapping
                    .iter()
                    .find(|(_, code)| *code == head[0])
                    .map(|(name, _)| *name)
                    .ok_or_else(|| self.invalid(format!("unknown code {}", head[0])))?;
                Ok((name.to_string(), rest))
            }
        }
    }

    fn split<'a>(&self, src: &'a [u8], needed: usize) -> Result<(&'a [u8], &'a [u8])> {
        if src.len() < needed {
            return Err(CommandError::Truncated {
                argument: self.name,
                needed,
                available: src.len(),
            });
        }
        Ok(src.split_at(needed))
    }

    fn invalid(&self, reason: String) -> CommandError {
        CommandError::InvalidArgument {
            argument: self.name,
            reason,
        }
    }
}

/// Parse a decimal, `0x`, `0o` or `0b` integer with an optional sign.
pub fn parse_int(token: &str) -> Option<i64> {
    let (negative, unsigned) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token.strip_prefix('+').unwrap_or(token)),
    };
    let (radix, digits) = match unsigned.get(..2) {
        Some("0x" | "0X") => (16, &unsigned[2..]),
        Some("0o" | "0O") => (8, &unsigned[2..]),
        Some("0b" | "0B") => (2, &unsigned[2..]),
        _ => (10, unsigned),
    };
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return None;
    }
    let magnitude = i64::from_str_radix(digits, radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

fn strip_quotes(token: &str) -> &str {
    if token.len() >= 2 && token.starts_with('"') && token.ends_with('"') {
        &token[1..token.len() - 1]
    } else {
        token
    }
}
