//! Low-level byte stream parser for DEX structures.
//!
//! This module provides the [`crate::file::parser::Parser`] type, a cursor-based binary data
//! parser used to decode every structure of a DEX container. It offers bounds-checked access
//! with support for the fixed-width little-endian fields of the index tables and the LEB128
//! encodings of the data section.
//!
//! # Architecture
//!
//! The parser is built around a simple cursor-based model that maintains a position within
//! a byte slice:
//!
//! - **Position tracking** - Maintains current offset for sequential parsing operations
//! - **Bounds checking** - All operations validate data availability before reading
//! - **Type-safe reading** - Strongly typed methods for common data types
//!
//! # Key Components
//!
//! ## Navigation Methods
//! - [`crate::file::parser::Parser::seek`] - Move to specific position
//! - [`crate::file::parser::Parser::advance_by`] - Move forward by specified bytes
//! - [`crate::file::parser::Parser::pos`] - Get current position
//! - [`crate::file::parser::Parser::align`] - Align to byte boundaries
//!
//! ## Data Access Methods
//! - [`crate::file::parser::Parser::read_le`] - Read primitive types (little-endian)
//! - [`crate::file::parser::Parser::read_uleb128`] - Read unsigned LEB128 values
//! - [`crate::file::parser::Parser::read_sleb128`] - Read signed LEB128 values
//! - [`crate::file::parser::Parser::read_uleb128p1`] - Read LEB128 values biased by one
//! - [`crate::file::parser::Parser::read_bytes`] - Borrow a run of raw bytes
//!
//! # Usage Examples
//!
//! ```rust
//! use dexscope::Parser;
//!
//! let data = [0x01, 0x02, 0x03, 0x04, 0xE5, 0x8E, 0x26, 0x00];
//! let mut parser = Parser::new(&data);
//!
//! let value = parser.read_le::<u32>()?;
//! assert_eq!(value, 0x0403_0201);
//! assert_eq!(parser.read_uleb128()?, 624_485);
//! assert_eq!(parser.read_uleb128p1()?, None);
//! # Ok::<(), dexscope::Error>(())
//! ```
//!
//! # Error Handling
//!
//! All parsing methods return [`crate::Result<T>`] with [`crate::Error::OutOfBounds`] for reads
//! past the end of the data and [`crate::Error::Malformed`] for invalid encodings.

use crate::{
    file::io::{read_le_at, read_sleb128_at, read_uleb128_at, DexIO},
    Result,
};

/// A cursor over a borrowed byte slice.
///
/// `Parser` never copies the underlying data; slices returned by
/// [`Parser::read_bytes`] borrow from the original buffer.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser positioned at offset 0.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Create a new parser positioned at `position`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `position` lies past the end of `data`.
    pub fn at(data: &'a [u8], position: usize) -> Result<Self> {
        let mut parser = Parser::new(data);
        parser.seek(position)?;
        Ok(parser)
    }

    /// Length of the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the underlying data is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether unread bytes remain.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Move the cursor to `pos`.
    ///
    /// Seeking to exactly the end of the data is allowed, so that empty trailing structures
    /// can be addressed.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` lies past the end of the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Move the cursor forward by `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if that moves past the end of the data.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        let end = self.calc_end_position(step)?;
        self.position = end;
        Ok(())
    }

    /// Current cursor position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// The complete underlying data.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Read the byte at the cursor without advancing.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the data.
    pub fn peek_byte(&self) -> Result<u8> {
        self.data
            .get(self.position)
            .copied()
            .ok_or(out_of_bounds_error!())
    }

    /// Read a value at the cursor without advancing.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value does not fit.
    pub fn peek_le<T: DexIO>(&self) -> Result<T> {
        let mut temp_position = self.position;
        read_le_at::<T>(self.data, &mut temp_position)
    }

    /// Run `f` and restore the cursor if it fails.
    ///
    /// # Errors
    /// Propagates the error returned by `f`.
    pub fn transactional<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let saved_position = self.position;
        let result = f(self);
        if result.is_err() {
            self.position = saved_position;
        }
        result
    }

    /// Advance the cursor to the next multiple of `alignment`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the padding runs past the end of the data.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let padding = (alignment - (self.position % alignment)) % alignment;
        self.advance_by(padding)
    }

    /// Read a little-endian value and advance.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value does not fit.
    pub fn read_le<T: DexIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Read an unsigned LEB128 value.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] or [`crate::Error::Malformed`] on bad input.
    pub fn read_uleb128(&mut self) -> Result<u32> {
        read_uleb128_at(self.data, &mut self.position)
    }

    /// Read a signed LEB128 value.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] or [`crate::Error::Malformed`] on bad input.
    pub fn read_sleb128(&mut self) -> Result<i32> {
        read_sleb128_at(self.data, &mut self.position)
    }

    /// Read an unsigned LEB128 value biased by one, where the encoded value 0 stands for
    /// `NO_INDEX`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] or [`crate::Error::Malformed`] on bad input.
    pub fn read_uleb128p1(&mut self) -> Result<Option<u32>> {
        let value = self.read_uleb128()?;
        Ok(value.checked_sub(1))
    }

    /// Number of unread bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Position after consuming `length` more bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if that position lies past the end of the data.
    pub fn calc_end_position(&self, length: usize) -> Result<usize> {
        let end = self
            .position
            .checked_add(length)
            .ok_or(out_of_bounds_error!())?;

        if end > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        Ok(end)
    }

    /// Borrow the next `length` bytes and advance.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `length` bytes remain.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        let end = self.calc_end_position(length)?;
        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    /// Borrow the bytes up to (excluding) the next NUL byte and advance past the terminator.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if no terminator exists.
    pub fn read_until_nul(&mut self) -> Result<&'a [u8]> {
        let start = self.position;
        let Some(length) = self.data[start..].iter().position(|&b| b == 0) else {
            return Err(malformed_error!(
                "Unterminated string data starting at offset {}",
                start
            ));
        };
        self.position = start + length + 1;
        Ok(&self.data[start..start + length])
    }

    /// Read `count` consecutive 16-bit code units.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the units do not fit.
    pub fn read_units(&mut self, count: usize) -> Result<Vec<u16>> {
        let bytes = self.read_bytes(count.checked_mul(2).ok_or(out_of_bounds_error!())?)?;
        Ok(bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_read_uleb128() {
        let test_cases = vec![
            (vec![0x00], 0),
            (vec![0x7F], 0x7F),
            (vec![0x80, 0x7F], 16256),
            (vec![0xE5, 0x8E, 0x26], 624_485),
        ];

        for (input, expected) in test_cases {
            let mut parser = Parser::new(&input);
            let result = parser.read_uleb128().unwrap();
            assert_eq!(result, expected);
            assert!(!parser.has_more_data());
        }

        let mut parser = Parser::new(&[]);
        assert!(matches!(parser.read_uleb128(), Err(Error::OutOfBounds)));
    }

    #[test]
    fn test_read_sleb128() {
        let mut parser = Parser::new(&[0x02, 0x7E, 0xFF, 0x00, 0x80, 0x7F]);
        assert_eq!(parser.read_sleb128().unwrap(), 2);
        assert_eq!(parser.read_sleb128().unwrap(), -2);
        assert_eq!(parser.read_sleb128().unwrap(), 127);
        assert_eq!(parser.read_sleb128().unwrap(), -128);
    }

    #[test]
    fn test_read_uleb128p1() {
        let mut parser = Parser::new(&[0x00, 0x01, 0x80, 0x01]);
        assert_eq!(parser.read_uleb128p1().unwrap(), None);
        assert_eq!(parser.read_uleb128p1().unwrap(), Some(0));
        assert_eq!(parser.read_uleb128p1().unwrap(), Some(127));
    }

    #[test]
    fn test_align_and_seek() {
        let data = [0u8; 9];
        let mut parser = Parser::new(&data);
        parser.advance_by(1).unwrap();
        parser.align(4).unwrap();
        assert_eq!(parser.pos(), 4);
        parser.align(4).unwrap();
        assert_eq!(parser.pos(), 4);
        parser.seek(9).unwrap();
        assert!(!parser.has_more_data());
        assert!(parser.seek(10).is_err());
    }

    #[test]
    fn test_read_until_nul() {
        let data = b"abc\0def";
        let mut parser = Parser::new(data);
        assert_eq!(parser.read_until_nul().unwrap(), b"abc");
        assert_eq!(parser.pos(), 4);
        assert!(matches!(
            parser.read_until_nul(),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn test_transactional_restores_position() {
        let data = [0x01, 0x02];
        let mut parser = Parser::new(&data);
        let result = parser.transactional(|p| {
            p.read_le::<u8>()?;
            p.read_le::<u32>()
        });
        assert!(result.is_err());
        assert_eq!(parser.pos(), 0);
    }

    #[test]
    fn test_read_units() {
        let data = [0x1A, 0x00, 0x05, 0x00];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_units(2).unwrap(), vec![0x001A, 0x0005]);
        assert!(parser.read_units(1).is_err());
    }
}
