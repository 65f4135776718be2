//! The OpenLST command set.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::argument::{Argument, IntType, Pad};

/// Text tag of the only system the translator speaks.
pub const SYSTEM_TAG: &str = "lst";

/// System byte for commands handled by the radio itself.
pub const LST: u8 = 0x01;

/// Opcode values.
pub mod opcode {
    pub const BOOTLOADER_PING: u8 = 0x00;
    pub const BOOTLOADER_ACK: u8 = 0x01;
    pub const BOOTLOADER_WRITE_PAGE: u8 = 0x02;
    pub const BOOTLOADER_ERASE: u8 = 0x0c;
    pub const BOOTLOADER_NACK: u8 = 0x0f;
    pub const ACK: u8 = 0x10;
    pub const ASCII: u8 = 0x11;
    pub const REBOOT: u8 = 0x12;
    pub const GET_TIME: u8 = 0x13;
    pub const SET_TIME: u8 = 0x14;
    pub const GET_TELEM: u8 = 0x17;
    pub const TELEM: u8 = 0x18;
    pub const GET_CALLSIGN: u8 = 0x19;
    pub const SET_CALLSIGN: u8 = 0x1a;
    pub const CALLSIGN: u8 = 0x1b;
    /// Board-specific command range starts here.
    pub const SET_RF_PARAMS: u8 = 0x80;
    pub const NACK: u8 = 0xff;
}

/// Bytes in one bootloader flash page.
pub const PAGE_DATA_LEN: usize = 128;

/// Name, opcode and argument layout of one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub name: &'static str,
    pub opcode: u8,
    pub arguments: &'static [Argument],
    /// How many trailing arguments may be left out.
    pub optional: usize,
}

impl CommandDescriptor {
    const fn new(name: &'static str, opcode: u8, arguments: &'static [Argument]) -> Self {
        Self {
            name,
            opcode,
            arguments,
            optional: 0,
        }
    }

    const fn optional(mut self, count: usize) -> Self {
        assert!(count <= self.arguments.len());
        self.optional = count;
        self
    }

    /// Arguments that must always be present.
    pub fn required(&self) -> usize {
        self.arguments.len() - self.optional
    }

    /// Whether the argument at `index` may be omitted.
    pub fn is_optional(&self, index: usize) -> bool {
        index >= self.required()
    }
}

const NO_ARGS: &[Argument] = &[];
const REASON: &[Argument] = &[Argument::u8("reason")];
const STATUS: &[Argument] = &[Argument::u8("status")];
const DELAY: &[Argument] = &[Argument::u32("delay")];
const WRITE_PAGE: &[Argument] = &[
    Argument::u8("page"),
    Argument::hex("data", PAGE_DATA_LEN, Pad::None),
];
const SET_TIME: &[Argument] = &[Argument::u32("seconds"), Argument::u32("nanoseconds")];
const CALLSIGN: &[Argument] = &[Argument::text("callsign")];
const TEXT: &[Argument] = &[Argument::text("text")];
/// Raw CC1110 register values: FREQ, FSCTRL0/1, MDMCFG4 bandwidth bits
/// (`e << 2 | m`), DRATE exponent and mantissa, DEVIATN (`e << 4 | m`),
/// PA config.
const RF_PARAMS: &[Argument] = &[
    Argument::int_range("freq", IntType::U32, 0, 0x00FF_FFFF),
    Argument::u8("fsctrl0"),
    Argument::u8("fsctrl1"),
    Argument::int_range("chan_bw", IntType::U8, 0, 0x0F),
    Argument::int_range("drate_e", IntType::U8, 0, 0x0F),
    Argument::u8("drate_m"),
    Argument::int_range("deviatn", IntType::U8, 0, 0x77),
    Argument::u8("pa_config"),
];
const TELEM: &[Argument] = &[
    Argument::u8("reserved"),
    Argument::u32("uptime"),
    Argument::u32("uart0_rx_count"),
    Argument::u32("uart1_rx_count"),
    Argument::u8("rx_mode"),
    Argument::u8("tx_mode"),
    Argument::i16("adc0"),
    Argument::i16("adc1"),
    Argument::i16("adc2"),
    Argument::i16("adc3"),
    Argument::i16("adc4"),
    Argument::i16("adc5"),
    Argument::i16("adc6"),
    Argument::i16("adc7"),
    Argument::i16("adc8"),
    Argument::i16("adc9"),
    Argument::i8("last_rssi"),
    Argument::u8("last_lqi"),
    Argument::i8("last_freqest"),
    Argument::u32("packets_sent"),
    Argument::u32("cs_count"),
    Argument::u32("packets_good"),
    Argument::u32("packets_rejected_checksum"),
    Argument::u32("packets_rejected_reserved"),
    Argument::u32("packets_rejected_other"),
    Argument::u32("reserved0"),
    Argument::u32("reserved1"),
    Argument::u32("custom0"),
    Argument::u32("custom1"),
];

/// Every command the translator knows.
pub static COMMANDS: &[CommandDescriptor] = &[
    CommandDescriptor::new("ack", opcode::ACK, NO_ARGS),
    CommandDescriptor::new("nack", opcode::NACK, NO_ARGS),
    CommandDescriptor::new("bootloader_ack", opcode::BOOTLOADER_ACK, REASON).optional(1),
    CommandDescriptor::new("bootloader_nack", opcode::BOOTLOADER_NACK, REASON).optional(1),
    CommandDescriptor::new("bootloader_ping", opcode::BOOTLOADER_PING, NO_ARGS),
    CommandDescriptor::new("bootloader_erase", opcode::BOOTLOADER_ERASE, STATUS).optional(1),
    CommandDescriptor::new(
        "bootloader_write_page",
        opcode::BOOTLOADER_WRITE_PAGE,
        WRITE_PAGE,
    )
    .optional(1),
    CommandDescriptor::new("reboot", opcode::REBOOT, DELAY).optional(1),
    CommandDescriptor::new("get_time", opcode::GET_TIME, NO_ARGS),
    CommandDescriptor::new("set_time", opcode::SET_TIME, SET_TIME),
    CommandDescriptor::new("get_callsign", opcode::GET_CALLSIGN, NO_ARGS),
    CommandDescriptor::new("set_callsign", opcode::SET_CALLSIGN, CALLSIGN),
    CommandDescriptor::new("callsign", opcode::CALLSIGN, CALLSIGN),
    CommandDescriptor::new("get_telem", opcode::GET_TELEM, NO_ARGS),
    CommandDescriptor::new("telem", opcode::TELEM, TELEM),
    CommandDescriptor::new("ascii", opcode::ASCII, TEXT),
    CommandDescriptor::new("set_rf_params", opcode::SET_RF_PARAMS, RF_PARAMS),
];

static BY_NAME: LazyLock<HashMap<&'static str, &'static CommandDescriptor>> =
    LazyLock::new(|| COMMANDS.iter().map(|cmd| (cmd.name, cmd)).collect());

static BY_OPCODE: LazyLock<HashMap<u8, &'static CommandDescriptor>> =
    LazyLock::new(|| COMMANDS.iter().map(|cmd| (cmd.opcode, cmd)).collect());

/// Look a command up by its text name.
pub fn by_name(name: &str) -> Option<&'static CommandDescriptor> {
    BY_NAME.get(name).copied()
}

/// Look a command up by opcode.
pub fn by_opcode(opcode: u8) -> Option<&'static CommandDescriptor> {
    BY_OPCODE.get(&opcode).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argument::ArgKind;
    use std::collections::HashSet;

    fn text_is_last(descriptor: &CommandDescriptor) -> bool {
        descriptor
            .arguments
            .iter()
            .rev()
            .skip(1)
            .all(|arg| !matches!(arg.kind, ArgKind::Text))
    }

    #[test]
    fn names_and_opcodes_are_unique() {
        let names: HashSet<_> = COMMANDS.iter().map(|c| c.name).collect();
        let opcodes: HashSet<_> = COMMANDS.iter().map(|c| c.opcode).collect();
        assert_eq!(names.len(), COMMANDS.len());
        assert_eq!(opcodes.len(), COMMANDS.len());
        assert_eq!(BY_NAME.len(), COMMANDS.len());
        assert_eq!(BY_OPCODE.len(), COMMANDS.len());
    }

    #[test]
    fn lookups_agree() {
        for cmd in COMMANDS {
            assert_eq!(by_name(cmd.name), Some(cmd));
            assert_eq!(by_opcode(cmd.opcode), Some(cmd));
        }
        assert!(by_name("warp_drive").is_none());
        assert!(by_opcode(0x42).is_none());
    }

    #[test]
    fn text_arguments_are_last() {
        for cmd in COMMANDS {
            assert!(text_is_last(cmd), "{}", cmd.name);
        }
    }

    #[test]
    fn telem_layout() {
        let telem = by_name("telem").unwrap();
        assert_eq!(telem.arguments.len(), 29);
        assert_eq!(telem.arguments[0].name, "reserved");
        let width: usize = telem
            .arguments
            .iter()
            .map(|arg| match arg.kind {
                ArgKind::Int { ty, .. } => ty.width(),
                _ => panic!("telem has only integers"),
            })
            .sum();
        assert_eq!(width, 78);
    }

    #[test]
    fn rf_params_is_a_board_command() {
        let rf = by_opcode(0x80).unwrap();
        assert_eq!(rf.name, "set_rf_params");
        assert_eq!(rf.required(), 8);
        assert_eq!(rf.arguments[0].name, "freq");
        assert_eq!(rf.arguments[7].name, "pa_config");
    }

    #[test]
    fn optional_tails() {
        let write_page = by_name("bootloader_write_page").unwrap();
        assert_eq!(write_page.required(), 1);
        assert!(!write_page.is_optional(0));
        assert!(write_page.is_optional(1));

        assert_eq!(by_name("set_time").unwrap().required(), 2);
        assert_eq!(by_name("reboot").unwrap().required(), 0);
    }
}
