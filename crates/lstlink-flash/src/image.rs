use std::ops::RangeInclusive;

use tracing::debug;

use crate::error::ImageError;
use crate::layout::{
    page_number, Region, APPLICATION, FLASH_PAGE_SIZE, FLASH_SIGNATURE_KEY_LEN,
    FLASH_SIGNATURE_LEN, FLASH_SIZE, HWID, RESERVED, SIGNATURE, SIGNING_KEYS, STORAGE,
};

/// Erased flash reads as this.
pub const ERASED: u8 = 0xFF;

/// The whole flash address space as bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct FlashImage {
    bytes: Vec<u8>,
}

/// One 128-byte write page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page<'a> {
    pub number: usize,
    pub address: usize,
    pub data: &'a [u8],
}

impl Page<'_> {
    /// Pages that are all erased are never transmitted.
    pub fn is_erased(&self) -> bool {
        self.data.iter().all(|&b| b == ERASED)
    }
}

/// Empty in the image-assembly sense: never written (0xFF) or zeroed.
fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == 0x00) || bytes.iter().all(|&b| b == ERASED)
}

impl FlashImage {
    /// A fully erased image.
    pub fn erased() -> Self {
        Self {
            bytes: vec![ERASED; FLASH_SIZE],
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ImageError> {
        if bytes.len() != FLASH_SIZE {
            return Err(ImageError::ImageSize {
                expected: FLASH_SIZE,
                got: bytes.len(),
            });
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn region(&self, region: Region) -> &[u8] {
        &self.bytes[region.range()]
    }

    /// Write `data` at `address`. Callers guarantee it fits.
    pub(crate) fn write(&mut self, address: usize, data: &[u8]) {
        self.bytes[address..address + data.len()].copy_from_slice(data);
    }

    /// The write pages whose addresses fall in `addresses`, in order.
    pub fn pages(&self, addresses: RangeInclusive<usize>) -> impl Iterator<Item = Page<'_>> {
        let first = page_number(*addresses.start());
        let last = page_number((*addresses.end()).min(FLASH_SIZE - 1));
        (first..=last).map(move |number| {
            let address = number * FLASH_PAGE_SIZE;
            Page {
                number,
                address,
                data: &self.bytes[address..address + FLASH_PAGE_SIZE],
            }
        })
    }

    /// Store `value` at the start of `region`.
    ///
    /// Only a blank slot (all 0x00 or all 0xFF) or one already holding
    /// exactly `value` may be written. Anything else is left untouched and
    /// reported.
    pub fn insert(
        &mut self,
        region: Region,
        offset: usize,
        value: &[u8],
    ) -> Result<(), ImageError> {
        let start = region.start + offset;
        if offset + value.len() > region.len() {
            return Err(ImageError::RegionOverflow {
                region: region.name,
                capacity: region.len() - offset.min(region.len()),
                size: value.len(),
            });
        }
        let current = &self.bytes[start..start + value.len()];
        if current != value && !is_blank(current) {
            return Err(ImageError::RegionNotEmpty {
                region: region.name,
                offset: start,
            });
        }
        debug!(region = region.name, offset = start, len = value.len(), "inserting");
        self.write(start, value);
        Ok(())
    }

    pub fn insert_hwid(&mut self, hwid: u16) -> Result<(), ImageError> {
        if hwid == 0x0000 || hwid == 0xFFFF {
            return Err(ImageError::InvalidHwid(hwid));
        }
        self.insert(HWID, 0, &hwid.to_le_bytes())
    }

    pub fn hwid(&self) -> u16 {
        let bytes = self.region(HWID);
        u16::from_le_bytes([bytes[0], bytes[1]])
    }

    pub fn insert_keys(&mut self, keys: &[[u8; FLASH_SIGNATURE_KEY_LEN]]) -> Result<(), ImageError> {
        let capacity = SIGNING_KEYS.len();
        if keys.len() * FLASH_SIGNATURE_KEY_LEN > capacity {
            return Err(ImageError::RegionOverflow {
                region: SIGNING_KEYS.name,
                capacity,
                size: keys.len() * FLASH_SIGNATURE_KEY_LEN,
            });
        }
        for (index, key) in keys.iter().enumerate() {
            self.insert(SIGNING_KEYS, index * FLASH_SIGNATURE_KEY_LEN, key)?;
        }
        Ok(())
    }

    pub fn insert_reserved(&mut self, reserved: u16) -> Result<(), ImageError> {
        self.insert(RESERVED, 0, &reserved.to_le_bytes())
    }

    /// Mark the application area as erased.
    pub fn insert_blank_application(&mut self) -> Result<(), ImageError> {
        self.insert(APPLICATION, 0, &vec![ERASED; APPLICATION.len()])
    }

    pub fn insert_blank_signature(&mut self) -> Result<(), ImageError> {
        self.insert(SIGNATURE, 0, &[ERASED; FLASH_SIGNATURE_LEN])
    }

    pub fn insert_blank_storage(&mut self) -> Result<(), ImageError> {
        self.insert(STORAGE, 0, &vec![ERASED; STORAGE.len()])
    }

    /// Overwrite the application signature unconditionally.
    pub fn set_signature(&mut self, signature: &[u8; FLASH_SIGNATURE_LEN]) {
        self.write(SIGNATURE.start, signature);
    }

    pub fn signature(&self) -> &[u8] {
        self.region(SIGNATURE)
    }
}

impl Default for FlashImage {
    fn default() -> Self {
        Self::erased()
    }
}

impl std::fmt::Debug for FlashImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let used = self.bytes.iter().filter(|&&b| b != ERASED).count();
        f.debug_struct("FlashImage")
            .field("size", &self.bytes.len())
            .field("programmed", &used)
            .finish()
    }
}

/// Settings stamped into a bootloader image before it is programmed.
#[derive(Debug, Clone)]
pub struct BootloaderSettings {
    pub hwid: u16,
    pub keys: Vec<[u8; FLASH_SIGNATURE_KEY_LEN]>,
    pub reserved: u16,
}

/// Build a distributable bootloader image from a bootloader build.
///
/// Works on a copy: on error the input is unchanged and nothing partial
/// is returned.
pub fn assemble_bootloader(
    bootloader: &FlashImage,
    settings: &BootloaderSettings,
) -> Result<FlashImage, ImageError> {
    let mut image = bootloader.clone();
    image.insert_hwid(settings.hwid)?;
    image.insert_keys(&settings.keys)?;
    image.insert_reserved(settings.reserved)?;
    image.insert_blank_application()?;
    image.insert_blank_signature()?;
    image.insert_blank_storage()?;
    Ok(image)
}
