//! Command text to packet bytes and back.

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::error::{CommandError, Result};
use crate::packet::{Packet, PacketHeader};
use crate::table::{by_name, by_opcode, CommandDescriptor, LST, SYSTEM_TAG};

/// Encode `command` (e.g. `"lst set_time 100 200"`) into packet bytes.
pub fn encode(target_id: u16, sequence: u16, command: &str) -> Result<Bytes> {
    let tokens: Vec<&str> = command.split_whitespace().collect();
    if tokens.len() < 2 {
        return Err(CommandError::TooShort(command.trim().to_string()));
    }
    if tokens[0] != SYSTEM_TAG {
        return Err(CommandError::UnknownSystem(tokens[0].to_string()));
    }
    let descriptor =
        by_name(tokens[1]).ok_or_else(|| CommandError::UnknownCommand(tokens[1].to_string()))?;

    let mut arguments = BytesMut::new();
    encode_arguments(descriptor, &tokens[2..], &mut arguments)?;
    Packet {
        header: PacketHeader {
            target_id,
            sequence,
            system: LST,
            opcode: descriptor.opcode,
        },
        arguments: &arguments[..],
    }
    .to_bytes()
}

/// Encode positional argument tokens for `descriptor`.
///
/// Running out of tokens is fine once only optional arguments remain.
pub fn encode_arguments(
    descriptor: &CommandDescriptor,
    tokens: &[&str],
    dst: &mut BytesMut,
) -> Result<()> {
    let mut remaining = tokens;
    for (index, argument) in descriptor.arguments.iter().enumerate() {
        if remaining.is_empty() {
            if descriptor.is_optional(index) {
                return Ok(());
            }
            return Err(count_mismatch(descriptor, tokens.len()));
        }
        if argument.consumes_rest() {
            argument.encode(&remaining.join(" "), dst)?;
            remaining = &[];
        } else {
            argument.encode(remaining[0], dst)?;
            remaining = &remaining[1..];
        }
    }
    if !remaining.is_empty() {
        return Err(count_mismatch(descriptor, tokens.len()));
    }
    Ok(())
}

/// Render packet bytes as command text.
///
/// Never fails: packets that cannot be decoded come back as a placeholder
/// carrying the raw bytes in hex (`too_short ..`, `unknown_sys ..`,
/// `lst unknown ..`).
pub fn decode(packet: &[u8]) -> String {
    let Ok(parsed) = Packet::parse(packet) else {
        return format!("too_short {}", hex::encode(packet));
    };
    if parsed.header.system != LST {
        return format!("unknown_sys {}", hex::encode(&packet[4..]));
    }
    match decode_lst(parsed.header.opcode, parsed.arguments) {
        Ok(text) => text,
        Err(err) => {
            debug!(%err, "undecodable lst packet");
            format!("lst unknown {}", hex::encode(&packet[5..]))
        }
    }
}

fn decode_lst(opcode: u8, arguments: &[u8]) -> Result<String> {
    let descriptor = by_opcode(opcode).ok_or(CommandError::UnknownOpcode(opcode))?;
    let mut parts = vec![SYSTEM_TAG.to_string(), descriptor.name.to_string()];
    parts.extend(decode_arguments(descriptor, arguments)?);
    Ok(parts.join(" "))
}

/// Decode argument bytes into text values, left to right.
///
/// An optional argument that cannot be decoded ends the list. Bytes beyond
/// the last argument are ignored.
pub fn decode_arguments(descriptor: &CommandDescriptor, arguments: &[u8]) -> Result<Vec<String>> {
    let mut values = Vec::with_capacity(descriptor.arguments.len());
    let mut rest = arguments;
    for (index, argument) in descriptor.arguments.iter().enumerate() {
        match argument.decode(rest) {
            Ok((value, tail)) => {
                values.push(value);
                rest = tail;
            }
            Err(_) if descriptor.is_optional(index) => break,
            Err(err) => return Err(err),
        }
    }
    Ok(values)
}

/// Decode a packet's arguments as `(name, value)` pairs.
pub fn decode_fields(packet: &[u8]) -> Result<Vec<(&'static str, String)>> {
    let packet = Packet::parse(packet)?;
    let opcode = packet.header.opcode;
    let descriptor = by_opcode(opcode).ok_or(CommandError::UnknownOpcode(opcode))?;
    let values = decode_arguments(descriptor, packet.arguments)?;
    Ok(descriptor
        .arguments
        .iter()
        .map(|argument| argument.name)
        .zip(values)
        .collect())
}

fn count_mismatch(descriptor: &CommandDescriptor, got: usize) -> CommandError {
    let total = descriptor.arguments.len();
    let required = descriptor.required();
    let expected = if required == total {
        total.to_string()
    } else {
        format!("{required} to {total}")
    };
    CommandError::ArgumentCount {
        command: descriptor.name,
        expected,
        got,
    }
}
