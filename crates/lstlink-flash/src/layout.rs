//! Flash address map of the radio (CC1110, 32 KiB).
//!
//! These offsets are baked into the bootloader and application builds and
//! must not drift.

use std::ops::Range;

pub const FLASH_SIZE: usize = 0x8000;
pub const FLASH_PAGE_SIZE: usize = 128;

pub const FLASH_BOOTLOADER_START: usize = 0x0000;
pub const FLASH_SIGNATURE_KEYS: usize = 0x03CC;
pub const FLASH_SIGNATURE_KEY_LEN: usize = 16;
pub const FLASH_SIGNATURE_KEY_COUNT: usize = 3;
pub const FLASH_RESERVED: usize = 0x03FC;
pub const FLASH_HWID: usize = 0x03FE;
pub const FLASH_APP_START: usize = 0x0400;
/// Last byte of the application area, signature included.
pub const FLASH_APP_END: usize = 0x6BFF;
pub const FLASH_SIGNATURE_START: usize = 0x6BF0;
pub const FLASH_SIGNATURE_LEN: usize = 16;
pub const FLASH_STORAGE_START: usize = 0x6C00;
pub const FLASH_STORAGE_END: usize = 0x6FFF;
pub const FLASH_UPDATER_START: usize = 0x7000;

/// Page number that ends a transfer. Carries no data.
pub const SENTINEL_PAGE: u8 = 255;

/// A named byte range of the flash image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub name: &'static str,
    pub start: usize,
    /// One past the last byte.
    pub end: usize,
}

impl Region {
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub const fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

pub const BOOTLOADER: Region = Region {
    name: "bootloader",
    start: FLASH_BOOTLOADER_START,
    end: FLASH_SIGNATURE_KEYS,
};
pub const SIGNING_KEYS: Region = Region {
    name: "signing keys",
    start: FLASH_SIGNATURE_KEYS,
    end: FLASH_RESERVED,
};
pub const RESERVED: Region = Region {
    name: "reserved",
    start: FLASH_RESERVED,
    end: FLASH_HWID,
};
pub const HWID: Region = Region {
    name: "hardware ID",
    start: FLASH_HWID,
    end: FLASH_APP_START,
};
pub const APPLICATION: Region = Region {
    name: "application",
    start: FLASH_APP_START,
    end: FLASH_SIGNATURE_START,
};
pub const SIGNATURE: Region = Region {
    name: "signature",
    start: FLASH_SIGNATURE_START,
    end: FLASH_STORAGE_START,
};
pub const STORAGE: Region = Region {
    name: "storage",
    start: FLASH_STORAGE_START,
    end: FLASH_UPDATER_START,
};
pub const UPDATER: Region = Region {
    name: "updater",
    start: FLASH_UPDATER_START,
    end: FLASH_SIZE,
};

/// Every region, in address order.
pub const REGIONS: [Region; 8] = [
    BOOTLOADER,
    SIGNING_KEYS,
    RESERVED,
    HWID,
    APPLICATION,
    SIGNATURE,
    STORAGE,
    UPDATER,
];

/// Page number of the page holding `address`.
pub const fn page_number(address: usize) -> usize {
    address / FLASH_PAGE_SIZE
}
