//! Signature and checksum of a finished section.
//!
//! The signature is a SHA-1 digest over everything from the file size field to the end of the
//! section; the checksum is an Adler-32 over everything after the
//! checksum field, which includes the signature. Both have to be computed last and in this
//! order.

use sha1::{Digest, Sha1};

use crate::{
    reader::header::{CHECKSUM_OFFSET, FILE_SIZE_OFFSET, SIGNATURE_OFFSET, SIGNATURE_SIZE},
    Result,
};

/// Compute and store the signature and checksum of the section `[start, end)` of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the range is not inside `data` or is shorter than
/// a header.
pub fn update_signature_and_checksum(data: &mut [u8], start: usize, end: usize) -> Result<()> {
    if end > data.len() || start + FILE_SIZE_OFFSET > end {
        return Err(out_of_bounds_error!());
    }

    let signature = compute_signature(&data[start + FILE_SIZE_OFFSET..end]);
    data[start + SIGNATURE_OFFSET..start + SIGNATURE_OFFSET + SIGNATURE_SIZE]
        .copy_from_slice(&signature);

    let checksum = compute_checksum(&data[start + SIGNATURE_OFFSET..end]);
    data[start + CHECKSUM_OFFSET..start + CHECKSUM_OFFSET + 4]
        .copy_from_slice(&checksum.to_le_bytes());
    Ok(())
}

/// SHA-1 of `bytes`.
#[must_use]
pub fn compute_signature(bytes: &[u8]) -> [u8; SIGNATURE_SIZE] {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    let mut signature = [0u8; SIGNATURE_SIZE];
    signature.copy_from_slice(&hasher.finalize());
    signature
}

/// Adler-32 of `bytes`.
#[must_use]
pub fn compute_checksum(bytes: &[u8]) -> u32 {
    let mut hasher = simd_adler32::Adler32::new();
    hasher.write(bytes);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values() {
        assert_eq!(compute_checksum(b"Wikipedia"), 0x11e6_0398);
        assert_eq!(
            compute_signature(b"abc"),
            [
                0xa9, 0x99, 0x3e, 0x36, 0x47, 0x06, 0x81, 0x6a, 0xba, 0x3e, 0x25, 0x71, 0x78, 0x50,
                0xc2, 0x6c, 0x9c, 0xd0, 0xd8, 0x9d
            ]
        );
    }

    #[test]
    fn test_update_is_idempotent() {
        let mut data = vec![0u8; 0x80];
        data[0x40] = 7;
        update_signature_and_checksum(&mut data, 0, 0x80).unwrap();
        let first = data.clone();
        update_signature_and_checksum(&mut data, 0, 0x80).unwrap();
        assert_eq!(data, first);
        assert_ne!(&data[SIGNATURE_OFFSET..FILE_SIZE_OFFSET], &[0u8; 20]);

        let checksum = u32::from_le_bytes(data[8..12].try_into().unwrap());
        assert_eq!(checksum, compute_checksum(&data[12..]));
    }

    #[test]
    fn test_range_checked() {
        let mut data = vec![0u8; 16];
        assert!(update_signature_and_checksum(&mut data, 0, 16).is_err());
    }
}
