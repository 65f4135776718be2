//! OpenLST command translation.
//!
//! Converts between human-readable commands such as
//! `lst bootloader_write_page 8 <hex>` and the binary packets the radio
//! understands. The command table is static; see [`table::COMMANDS`].

pub mod argument;
pub mod error;
pub mod packet;
pub mod table;
pub mod translator;

pub use argument::{ArgKind, Argument, IntType, Pad};
pub use error::{CommandError, Result};
pub use packet::{Packet, PacketHeader, MAX_ARGUMENT_SIZE};
pub use table::{by_name, by_opcode, opcode, CommandDescriptor, COMMANDS, LST, SYSTEM_TAG};
pub use translator::{decode, decode_arguments, decode_fields, encode, encode_arguments};
