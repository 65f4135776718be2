//! Flash images and the bootloader flashing protocol for OpenLST radios.
//!
//! - [`layout`]: the fixed flash address map
//! - [`image`]: [`FlashImage`], pages, and checked region insertion for
//!   building bootloader images
//! - [`sign`]: AES-128 CBC-MAC application signatures
//! - [`hexfile`]: Intel HEX in and out
//! - [`flasher`]: reboot, erase and page-write over a [`CommandPort`]

pub mod error;
pub mod flasher;
pub mod hexfile;
pub mod image;
pub mod layout;
pub mod sign;

pub use error::{FlashError, ImageError, Result};
pub use flasher::{CommandPort, FlashConfig, FlashReport, Flasher};
pub use image::{assemble_bootloader, BootloaderSettings, FlashImage, Page, ERASED};
pub use sign::{cbc_mac, parse_key, sign_image, signature, KEY_LEN};
