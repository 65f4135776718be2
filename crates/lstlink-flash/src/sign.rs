//! Application signing.
//!
//! The bootloader only boots an application whose CBC-MAC (AES-128, zero
//! IV, last ciphertext block) over the application area matches the
//! signature stored after it.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use tracing::debug;

use crate::error::ImageError;
use crate::image::FlashImage;
use crate::layout::{APPLICATION, FLASH_SIGNATURE_LEN};

pub const KEY_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

/// Parse a hex string into a key or signature of exactly `N` bytes.
pub fn parse_key<const N: usize>(text: &str) -> Result<[u8; N], ImageError> {
    let bytes = hex::decode(text.trim())?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| ImageError::KeyLength {
        expected: N,
        got: bytes.len(),
    })
}

/// CBC-MAC of `data` under `key`.
pub fn cbc_mac(key: &[u8; KEY_LEN], data: &[u8]) -> Result<[u8; BLOCK_LEN], ImageError> {
    if data.len() % BLOCK_LEN != 0 {
        return Err(ImageError::UnalignedMac(data.len()));
    }
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut state = [0u8; BLOCK_LEN];
    for chunk in data.chunks_exact(BLOCK_LEN) {
        for (s, b) in state.iter_mut().zip(chunk) {
            *s ^= b;
        }
        let mut block = GenericArray::clone_from_slice(&state);
        cipher.encrypt_block(&mut block);
        state.copy_from_slice(&block);
    }
    Ok(state)
}

/// Signature of the application area of `image`.
pub fn signature(
    image: &FlashImage,
    key: &[u8; KEY_LEN],
) -> Result<[u8; FLASH_SIGNATURE_LEN], ImageError> {
    let tag = cbc_mac(key, image.region(APPLICATION))?;
    debug!(signature = %hex::encode(tag), "computed application signature");
    Ok(tag)
}

/// Compute the signature and store it in the image.
pub fn sign_image(
    image: &mut FlashImage,
    key: &[u8; KEY_LEN],
) -> Result<[u8; FLASH_SIGNATURE_LEN], ImageError> {
    let tag = signature(image, key)?;
    image.set_signature(&tag);
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    // NIST SP 800-38A F.2.1 (CBC-AES128.Encrypt), first block.
    const NIST_KEY: &str = "2b7e151628aed2a6abf7158809cf4f3c";
    const NIST_PLAIN: &str = "6bc1bee22e409f96e93d7e117393172a";
    const NIST_CIPHER: &str = "7649abac8119b246cee98e9b12e9197d";

    #[test]
    fn single_block_matches_cbc_vector() {
        // The vector uses IV 000102..0f; fold it into the plaintext.
        let mut plain: [u8; 16] = parse_key(NIST_PLAIN).unwrap();
        for (i, b) in plain.iter_mut().enumerate() {
            *b ^= i as u8;
        }
        let key = parse_key(NIST_KEY).unwrap();
        let expected: [u8; 16] = parse_key(NIST_CIPHER).unwrap();
        assert_eq!(cbc_mac(&key, &plain).unwrap(), expected);
    }

    #[test]
    fn chains_blocks() {
        let key = [0x42; 16];
        let data = [0x5a; 48];
        let first = cbc_mac(&key, &data[..16]).unwrap();
        let whole = cbc_mac(&key, &data).unwrap();
        assert_ne!(first, whole);

        // Same result when the prefix is replaced by its MAC.
        let mut second_block = [0u8; 16];
        for (i, b) in second_block.iter_mut().enumerate() {
            *b = first[i] ^ 0x5a;
        }
        let two = cbc_mac(&key, &second_block).unwrap();
        let mut third_block = [0u8; 16];
        for (i, b) in third_block.iter_mut().enumerate() {
            *b = two[i] ^ 0x5a;
        }
        assert_eq!(cbc_mac(&key, &third_block).unwrap(), whole);
    }

    #[test]
    fn rejects_partial_block() {
        assert!(matches!(
            cbc_mac(&[0; 16], &[0; 17]),
            Err(ImageError::UnalignedMac(17))
        ));
    }

    #[test]
    fn sign_image_splices_tag() {
        let mut image = FlashImage::erased();
        let key = [7u8; 16];
        let tag = sign_image(&mut image, &key).unwrap();
        assert_eq!(image.signature(), &tag);
        assert_eq!(signature(&image, &key).unwrap(), tag);
    }

    #[test]
    fn parse_key_checks_length() {
        assert!(matches!(
            parse_key::<16>("0011"),
            Err(ImageError::KeyLength {
                expected: 16,
                got: 2
            })
        ));
        assert!(matches!(parse_key::<16>("zz"), Err(ImageError::KeyHex(_))));
    }
}
