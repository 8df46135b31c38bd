//! Low-level byte order and variable-length integer utilities for DEX parsing and generation.
//!
//! This module provides bounds-checked reading and writing of the primitive little-endian
//! values found in DEX containers, plus the LEB128 family of variable-length encodings used
//! throughout the offset-addressed part of the format (class data, encoded arrays, debug
//! information and exception handler lists).
//!
//! # Key Components
//!
//! ## Core Trait
//! - [`crate::file::io::DexIO`] - Trait defining little-endian conversion for primitive types
//!
//! ## Fixed-Width Access
//! - [`crate::file::io::read_le`] - Read a value from the start of a buffer
//! - [`crate::file::io::read_le_at`] - Read a value at an offset and advance the offset
//! - [`crate::file::io::write_le_at`] - Write a value at an offset and advance the offset
//!
//! ## LEB128
//! - [`crate::file::io::read_uleb128_at`] / [`crate::file::io::read_sleb128_at`] - Decode
//! - [`crate::file::io::write_uleb128`] / [`crate::file::io::write_sleb128`] - Encode into a `Vec<u8>`
//! - [`crate::file::io::uleb128_size`] / [`crate::file::io::sleb128_size`] - Encoded sizes
//!
//! # Usage Examples
//!
//! ```rust
//! use dexscope::file::io::{read_le_at, read_uleb128_at, write_uleb128};
//!
//! let data = [0x01, 0x00, 0x02, 0x00];
//! let mut offset = 0;
//! let first: u16 = read_le_at(&data, &mut offset)?;
//! let second: u16 = read_le_at(&data, &mut offset)?;
//! assert_eq!((first, second, offset), (1, 2, 4));
//!
//! let mut encoded = Vec::new();
//! write_uleb128(&mut encoded, 624_485);
//! assert_eq!(encoded, [0xE5, 0x8E, 0x26]);
//! let mut offset = 0;
//! assert_eq!(read_uleb128_at(&encoded, &mut offset)?, 624_485);
//! # Ok::<(), dexscope::Error>(())
//! ```
//!
//! # Error Handling
//!
//! All reading and writing functions return [`crate::Result<T>`] and will return
//! [`crate::Error::OutOfBounds`] if there are insufficient bytes in the buffer to complete the
//! operation. Overlong LEB128 sequences are reported as [`crate::Error::Malformed`].

use crate::{Error::OutOfBounds, Result};

/// Trait for implementing type-specific safe binary data reading and writing operations.
///
/// Each implementation defines a `Bytes` associated type that represents the fixed-size
/// byte array required for that particular type (e.g., `[u8; 4]` for `u32`).
pub trait DexIO: Sized {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
}

// Implement DexIO support for u8
impl DexIO for u8 {
    type Bytes = [u8; 1];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        u8::from_le_bytes(bytes)
    }

    fn to_le_bytes(self) -> Self::Bytes {
        u8::to_le_bytes(self)
    }
}

// Implement DexIO support for u16
impl DexIO for u16 {
    type Bytes = [u8; 2];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        u16::from_le_bytes(bytes)
    }

    fn to_le_bytes(self) -> Self::Bytes {
        u16::to_le_bytes(self)
    }
}

// Implement DexIO support for i16
impl DexIO for i16 {
    type Bytes = [u8; 2];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        i16::from_le_bytes(bytes)
    }

    fn to_le_bytes(self) -> Self::Bytes {
        i16::to_le_bytes(self)
    }
}

// Implement DexIO support for u32
impl DexIO for u32 {
    type Bytes = [u8; 4];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        u32::from_le_bytes(bytes)
    }

    fn to_le_bytes(self) -> Self::Bytes {
        u32::to_le_bytes(self)
    }
}

// Implement DexIO support for i32
impl DexIO for i32 {
    type Bytes = [u8; 4];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        i32::from_le_bytes(bytes)
    }

    fn to_le_bytes(self) -> Self::Bytes {
        i32::to_le_bytes(self)
    }
}

// Implement DexIO support for u64
impl DexIO for u64 {
    type Bytes = [u8; 8];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        u64::from_le_bytes(bytes)
    }

    fn to_le_bytes(self) -> Self::Bytes {
        u64::to_le_bytes(self)
    }
}

/// Safely reads a value of type `T` in little-endian byte order from the start of a buffer.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the buffer is shorter than `T`.
pub fn read_le<T: DexIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Safely reads a value of type `T` in little-endian byte order at `offset`, advancing it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are not enough bytes left.
pub fn read_le_at<T: DexIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;

    Ok(T::from_le_bytes(read))
}

/// Safely writes a value of type `T` in little-endian byte order at `offset`, advancing it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit into the buffer.
pub fn write_le_at<T: DexIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let bytes = value.to_le_bytes();
    data[*offset..end].copy_from_slice(bytes.as_ref());
    *offset = end;

    Ok(())
}

/// Decodes an unsigned LEB128 value of at most five bytes.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] on truncated input and [`crate::Error::Malformed`]
/// when the encoding is longer than five bytes.
pub fn read_uleb128_at(data: &[u8], offset: &mut usize) -> Result<u32> {
    let mut result = 0_u32;
    let mut shift = 0_u32;
    loop {
        let Some(&byte) = data.get(*offset) else {
            return Err(OutOfBounds);
        };
        *offset += 1;

        if shift == 28 && byte > 0x0F {
            return Err(malformed_error!(
                "ULEB128 value exceeds 32 bits at offset {}",
                *offset - 1
            ));
        }
        result |= u32::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// Decodes a signed LEB128 value of at most five bytes.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] on truncated input and [`crate::Error::Malformed`]
/// when the encoding is longer than five bytes.
pub fn read_sleb128_at(data: &[u8], offset: &mut usize) -> Result<i32> {
    let mut result = 0_i32;
    let mut shift = 0_u32;
    loop {
        let Some(&byte) = data.get(*offset) else {
            return Err(OutOfBounds);
        };
        *offset += 1;

        if shift > 28 {
            return Err(malformed_error!(
                "SLEB128 value exceeds 32 bits at offset {}",
                *offset - 1
            ));
        }
        result |= i32::from(byte & 0x7F) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            if shift < 32 && byte & 0x40 != 0 {
                result |= -1_i32 << shift;
            }
            return Ok(result);
        }
    }
}

/// Encodes `value` as unsigned LEB128.
pub fn write_uleb128(out: &mut Vec<u8>, mut value: u32) {
    loop {
        #[allow(clippy::cast_possible_truncation)]
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Encodes `value` as signed LEB128.
pub fn write_sleb128(out: &mut Vec<u8>, mut value: i32) {
    loop {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        if done {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Number of bytes [`write_uleb128`] produces for `value`.
#[must_use]
pub fn uleb128_size(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0x0FFF_FFFF => 4,
        _ => 5,
    }
}

/// Number of bytes [`write_sleb128`] produces for `value`.
#[must_use]
pub fn sleb128_size(value: i32) -> usize {
    let magnitude = if value < 0 { !value } else { value };
    match magnitude {
        0..=0x3F => 1,
        0x40..=0x1FFF => 2,
        0x2000..=0x0F_FFFF => 3,
        0x10_0000..=0x07FF_FFFF => 4,
        _ => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_BUFFER: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

    #[test]
    fn read_le_u8() {
        let result = read_le::<u8>(&TEST_BUFFER).unwrap();
        assert_eq!(result, 0x01);
    }

    #[test]
    fn read_le_u16() {
        let result = read_le::<u16>(&TEST_BUFFER).unwrap();
        assert_eq!(result, 0x0201);
    }

    #[test]
    fn read_le_u32() {
        let result = read_le::<u32>(&TEST_BUFFER).unwrap();
        assert_eq!(result, 0x0403_0201);
    }

    #[test]
    fn read_le_u64() {
        let result = read_le::<u64>(&TEST_BUFFER).unwrap();
        assert_eq!(result, 0x0807_0605_0403_0201);
    }

    #[test]
    fn read_le_at_advances() {
        let mut offset = 6;
        let result = read_le_at::<u16>(&TEST_BUFFER, &mut offset).unwrap();
        assert_eq!(result, 0x0807);
        assert_eq!(offset, 8);
        assert!(matches!(
            read_le_at::<u8>(&TEST_BUFFER, &mut offset),
            Err(OutOfBounds)
        ));
    }

    #[test]
    fn write_le_at_roundtrip() {
        let mut buffer = [0u8; 6];
        let mut offset = 0;
        write_le_at(&mut buffer, &mut offset, 0x1234_u16).unwrap();
        write_le_at(&mut buffer, &mut offset, -2_i32).unwrap();
        assert_eq!(buffer, [0x34, 0x12, 0xFE, 0xFF, 0xFF, 0xFF]);
        assert!(write_le_at(&mut buffer, &mut offset, 1_u8).is_err());
    }

    #[test]
    fn uleb128_known_values() {
        let cases: [(u32, &[u8]); 5] = [
            (0, &[0x00]),
            (1, &[0x01]),
            (127, &[0x7F]),
            (128, &[0x80, 0x01]),
            (16256, &[0x80, 0x7F]),
        ];
        for (value, bytes) in cases {
            let mut out = Vec::new();
            write_uleb128(&mut out, value);
            assert_eq!(out, bytes);
            assert_eq!(uleb128_size(value), bytes.len());
        }
        let mut out = Vec::new();
        write_uleb128(&mut out, u32::MAX);
        assert_eq!(out, [0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        let mut offset = 0;
        assert_eq!(read_uleb128_at(&out, &mut offset).unwrap(), u32::MAX);
        assert_eq!(offset, 5);
    }

    #[test]
    fn sleb128_known_values() {
        let cases: [(i32, &[u8]); 5] = [
            (0, &[0x00]),
            (1, &[0x01]),
            (-1, &[0x7F]),
            (-128, &[0x80, 0x7F]),
            (63, &[0x3F]),
        ];
        for (value, bytes) in cases {
            let mut out = Vec::new();
            write_sleb128(&mut out, value);
            assert_eq!(out, bytes);
            assert_eq!(sleb128_size(value), bytes.len());
            let mut offset = 0;
            assert_eq!(read_sleb128_at(&out, &mut offset).unwrap(), value);
        }
        for value in [i32::MIN, i32::MAX, 64, -65, 8192, -8193] {
            let mut out = Vec::new();
            write_sleb128(&mut out, value);
            assert_eq!(sleb128_size(value), out.len());
            let mut offset = 0;
            assert_eq!(read_sleb128_at(&out, &mut offset).unwrap(), value);
        }
    }

    #[test]
    fn leb128_errors() {
        let mut offset = 0;
        assert!(matches!(
            read_uleb128_at(&[0x80, 0x80], &mut offset),
            Err(OutOfBounds)
        ));
        let mut offset = 0;
        assert!(matches!(
            read_uleb128_at(&[0xFF, 0xFF, 0xFF, 0xFF, 0x7F], &mut offset),
            Err(crate::Error::Malformed { .. })
        ));
    }
}
