//! Intel HEX reading and writing for flash images.
//!
//! Only the subset the radio toolchain produces: data (`00`) and
//! end-of-file (`01`) records with 16-bit addresses.

use std::fmt::Write as _;

use crate::error::ImageError;
use crate::image::{FlashImage, ERASED};
use crate::layout::FLASH_SIZE;

const RECORD_DATA: u8 = 0x00;
const RECORD_EOF: u8 = 0x01;

/// Bytes per data record written by [`dump`].
pub const LINE_SIZE: usize = 32;

/// Parse hex text into a flash image. Unwritten bytes stay 0xFF.
pub fn parse(text: &str) -> Result<FlashImage, ImageError> {
    let mut bytes = vec![ERASED; FLASH_SIZE];
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let record = raw.trim();
        if record.is_empty() {
            continue;
        }
        let bad = |reason: String| ImageError::Hex { line, reason };

        let body = record
            .strip_prefix(':')
            .ok_or_else(|| bad("does not start with ':'".to_string()))?;
        let decoded = hex::decode(body).map_err(|err| bad(err.to_string()))?;
        if decoded.len() < 5 {
            return Err(bad("record too short".to_string()));
        }

        let count = usize::from(decoded[0]);
        if decoded.len() != count + 5 {
            return Err(bad(format!(
                "byte count {count} does not match record length"
            )));
        }
        let sum = decoded.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        if sum != 0 {
            return Err(bad("bad checksum".to_string()));
        }

        let address = usize::from(u16::from_be_bytes([decoded[1], decoded[2]]));
        let data = &decoded[4..4 + count];
        match decoded[3] {
            RECORD_DATA => {
                let end = address + data.len();
                if end > FLASH_SIZE {
                    return Err(bad(format!("data ends at 0x{end:05X}, past flash")));
                }
                bytes[address..end].copy_from_slice(data);
            }
            RECORD_EOF => return FlashImage::from_bytes(bytes),
            other => return Err(bad(format!("unsupported record type {other:02X}"))),
        }
    }
    Err(ImageError::HexMissingEof)
}

/// Render an image as hex text, skipping lines that are all 0xFF.
pub fn dump(image: &FlashImage) -> String {
    let mut out = String::new();
    for (index, chunk) in image.as_bytes().chunks(LINE_SIZE).enumerate() {
        if chunk.iter().all(|&b| b == ERASED) {
            continue;
        }
        let address = index * LINE_SIZE;
        let mut record = Vec::with_capacity(chunk.len() + 4);
        record.push(chunk.len() as u8);
        record.extend_from_slice(&(address as u16).to_be_bytes());
        record.push(RECORD_DATA);
        record.extend_from_slice(chunk);
        let sum = record.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        record.push(sum.wrapping_neg());
        let _ = writeln!(out, ":{}", hex::encode_upper(&record));
    }
    out.push_str(":00000001FF\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_data_records() {
        let text = ":0400100001020304E2\n:00000001FF\n";
        let image = parse(text).unwrap();
        assert_eq!(&image.as_bytes()[0x10..0x14], &[1, 2, 3, 4]);
        assert_eq!(image.as_bytes()[0x0F], 0xFF);
        assert_eq!(image.as_bytes()[0x14], 0xFF);
    }

    #[test]
    fn dump_then_parse_keeps_image() {
        let mut bytes = vec![ERASED; FLASH_SIZE];
        bytes[0x0400..0x0410].copy_from_slice(&[0xA5; 16]);
        bytes[0x7FFE] = 0x00;
        let image = FlashImage::from_bytes(bytes).unwrap();

        let text = dump(&image);
        assert_eq!(text.lines().count(), 3);
        assert!(text.ends_with(":00000001FF\n"));
        assert_eq!(parse(&text).unwrap(), image);
    }

    #[test]
    fn dump_of_erased_image_is_only_eof() {
        assert_eq!(dump(&FlashImage::erased()), ":00000001FF\n");
    }

    #[test]
    fn rejects_bad_checksum() {
        let err = parse(":0400100001020304E3\n:00000001FF\n").unwrap_err();
        assert!(matches!(err, ImageError::Hex { line: 1, .. }));
    }

    #[test]
    fn rejects_missing_colon_and_unknown_record() {
        assert!(matches!(
            parse("0400100001020304E2\n"),
            Err(ImageError::Hex { line: 1, .. })
        ));
        assert!(matches!(
            parse(":020000040000FA\n:00000001FF\n"),
            Err(ImageError::Hex { line: 1, .. })
        ));
    }

    #[test]
    fn requires_eof_record() {
        assert!(matches!(
            parse(":0400100001020304E2\n"),
            Err(ImageError::HexMissingEof)
        ));
    }

    #[test]
    fn rejects_data_past_flash_end() {
        let err = parse(":02FFFF000102FD\n:00000001FF\n").unwrap_err();
        assert!(matches!(err, ImageError::Hex { line: 1, .. }));
    }
}
