//! Growable byte buffer used while generating one container section.
//!
//! The buffer keeps a cursor that can be moved backwards to patch already written structures
//! and forwards past regions that are filled in later. Positions are relative to the start of
//! the buffer; [`DexOutputBuffer::offset`] adds the base of the section inside its container,
//! which is what every offset stored in the output refers to.

use crate::file::io::{write_sleb128, write_uleb128};

/// Output bytes of one section with a movable cursor.
#[derive(Debug, Default)]
pub struct DexOutputBuffer {
    data: Vec<u8>,
    position: usize,
    base: u32,
}

impl DexOutputBuffer {
    /// Create an empty buffer whose first byte lives at `base` in the container.
    #[must_use]
    pub fn new(base: u32) -> DexOutputBuffer {
        DexOutputBuffer {
            data: Vec::new(),
            position: 0,
            base,
        }
    }

    /// The cursor, relative to the start of the buffer.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// The cursor as an absolute container offset.
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.base + self.position as u32
    }

    /// The container offset of the first byte.
    #[must_use]
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Number of bytes written so far, including gaps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Move the cursor to the absolute container `offset`.
    ///
    /// Skipped bytes read as zero until written.
    pub fn move_to_offset(&mut self, offset: u32) {
        self.move_to(offset.saturating_sub(self.base) as usize);
    }

    /// Move the cursor to `position`.
    pub fn move_to(&mut self, position: usize) {
        self.position = position;
        if self.data.len() < position {
            self.data.resize(position, 0);
        }
    }

    /// Pad with zero bytes until the absolute offset is a multiple of `alignment`.
    pub fn align(&mut self, alignment: usize) {
        let offset = self.offset() as usize;
        let aligned = offset.div_ceil(alignment) * alignment;
        self.move_to(self.position + (aligned - offset));
    }

    /// Write raw bytes at the cursor.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        let end = self.position + bytes.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[self.position..end].copy_from_slice(bytes);
        self.position = end;
    }

    /// Write one byte.
    pub fn put_u8(&mut self, value: u8) {
        self.put_bytes(&[value]);
    }

    /// Write a little-endian u16.
    pub fn put_u16(&mut self, value: u16) {
        self.put_bytes(&value.to_le_bytes());
    }

    /// Write a little-endian u32.
    pub fn put_u32(&mut self, value: u32) {
        self.put_bytes(&value.to_le_bytes());
    }

    /// Write code units.
    pub fn put_units(&mut self, units: &[u16]) {
        for unit in units {
            self.put_u16(*unit);
        }
    }

    /// Write an unsigned LEB128 value.
    pub fn put_uleb128(&mut self, value: u32) {
        let mut encoded = Vec::with_capacity(5);
        write_uleb128(&mut encoded, value);
        self.put_bytes(&encoded);
    }

    /// Write a signed LEB128 value.
    pub fn put_sleb128(&mut self, value: i32) {
        let mut encoded = Vec::with_capacity(5);
        write_sleb128(&mut encoded, value);
        self.put_bytes(&encoded);
    }

    /// Overwrite a u32 at `position` without moving the cursor.
    pub fn patch_u32(&mut self, position: usize, value: u32) {
        let saved = self.position;
        self.move_to(position);
        self.put_u32(value);
        self.position = saved;
    }

    /// The written bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Consume the buffer.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_and_patch() {
        let mut buffer = DexOutputBuffer::new(0);
        buffer.put_u8(1);
        buffer.align(4);
        assert_eq!(buffer.position(), 4);
        buffer.put_u32(0xdead_beef);
        buffer.patch_u32(0, 7);
        assert_eq!(buffer.position(), 8);
        assert_eq!(buffer.as_slice(), &[7, 0, 0, 0, 0xef, 0xbe, 0xad, 0xde]);
    }

    #[test]
    fn test_alignment_uses_container_offset() {
        let mut buffer = DexOutputBuffer::new(0x102);
        buffer.align(4);
        assert_eq!(buffer.offset(), 0x104);
        assert_eq!(buffer.position(), 2);

        buffer.move_to_offset(0x110);
        buffer.put_uleb128(300);
        assert_eq!(&buffer.as_slice()[0x0e..], &[0xac, 0x02]);
    }
}
