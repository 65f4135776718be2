use lstlink_session::SessionError;

/// Errors building, parsing or signing a flash image.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// The target region holds different data already.
    #[error("{region} area is not empty (at 0x{offset:04X})")]
    RegionNotEmpty { region: &'static str, offset: usize },

    /// The value does not fit its region.
    #[error("{region} area holds {capacity} bytes, got {size}")]
    RegionOverflow {
        region: &'static str,
        capacity: usize,
        size: usize,
    },

    #[error("invalid hardware ID 0x{0:04X} (valid: 0001..FFFE)")]
    InvalidHwid(u16),

    #[error("expected a {expected}-byte hex key, got {got} bytes")]
    KeyLength { expected: usize, got: usize },

    #[error("invalid hex key: {0}")]
    KeyHex(#[from] hex::FromHexError),

    /// CBC-MAC input must be whole blocks.
    #[error("MAC input of {0} bytes is not a multiple of 16")]
    UnalignedMac(usize),

    #[error("image must be {expected} bytes, got {got}")]
    ImageSize { expected: usize, got: usize },

    #[error("hex line {line}: {reason}")]
    Hex { line: usize, reason: String },

    #[error("hex file has no end-of-file record")]
    HexMissingEof,
}

/// Errors from a flashing run.
#[derive(Debug, thiserror::Error)]
pub enum FlashError {
    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// The radio never acknowledged the erase.
    #[error("bootloader did not answer after {attempts} attempts")]
    BootloaderUnreachable { attempts: usize },

    /// A page write was not acknowledged. The run is aborted.
    #[error("page {page} was not written: {source}")]
    PageWrite { page: usize, source: SessionError },

    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, FlashError>;
