//! Modified UTF-8 strings.
//!
//! Containers store string data as modified UTF-8 (MUTF-8): UTF-16 code units encoded one by
//! one, with `U+0000` written as the two-byte form `C0 80` so that the payload never contains a
//! NUL byte. The canonical order of the string table compares UTF-16 code units, which differs
//! from byte order for supplementary characters.

use std::{cmp::Ordering, fmt, sync::Arc};

/// A reference to an interned [`DexString`].
pub type StringRc = Arc<DexString>;

/// A string as stored in a container.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DexString {
    /// Length in UTF-16 code units
    size: u32,
    /// MUTF-8 payload without the terminating NUL
    content: Box<[u8]>,
}

impl DexString {
    /// Encode `value` as MUTF-8.
    #[must_use]
    pub fn new(value: &str) -> DexString {
        let mut content = Vec::with_capacity(value.len());
        let mut size = 0u32;
        for unit in value.encode_utf16() {
            size += 1;
            match unit {
                0x0001..=0x007f => content.push(unit as u8),
                0x0000 | 0x0080..=0x07ff => {
                    content.push(0xc0 | ((unit >> 6) & 0x1f) as u8);
                    content.push(0x80 | (unit & 0x3f) as u8);
                }
                _ => {
                    content.push(0xe0 | ((unit >> 12) & 0x0f) as u8);
                    content.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                    content.push(0x80 | (unit & 0x3f) as u8);
                }
            }
        }

        DexString {
            size,
            content: content.into_boxed_slice(),
        }
    }

    /// Wrap an already encoded MUTF-8 payload.
    #[must_use]
    pub fn from_mutf8(size: u32, content: &[u8]) -> DexString {
        DexString {
            size,
            content: content.into(),
        }
    }

    /// Length in UTF-16 code units.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// The MUTF-8 payload without terminator.
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Whether the payload starts with `prefix`.
    #[must_use]
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.content.starts_with(prefix)
    }

    /// Iterate over the UTF-16 code units.
    pub fn utf16_units(&self) -> Utf16Units<'_> {
        Utf16Units {
            data: &self.content,
            position: 0,
        }
    }

    /// Decode into a Rust string, replacing unpaired surrogates.
    #[must_use]
    pub fn to_string_lossy(&self) -> String {
        let units: Vec<u16> = self.utf16_units().collect();
        String::from_utf16_lossy(&units)
    }
}

/// Iterator over the UTF-16 code units of a MUTF-8 payload.
pub struct Utf16Units<'a> {
    data: &'a [u8],
    position: usize,
}

impl Iterator for Utf16Units<'_> {
    type Item = u16;

    fn next(&mut self) -> Option<u16> {
        let first = *self.data.get(self.position)?;
        let continuation = |offset: usize| {
            self.data
                .get(self.position + offset)
                .map_or(0, |b| u16::from(*b & 0x3f))
        };

        let (unit, length) = match first >> 4 {
            0x0..=0x7 => (u16::from(first), 1),
            0xc | 0xd => ((u16::from(first & 0x1f) << 6) | continuation(1), 2),
            0xe => (
                (u16::from(first & 0x0f) << 12) | (continuation(1) << 6) | continuation(2),
                3,
            ),
            _ => (0xfffd, 1),
        };

        self.position += length;
        Some(unit)
    }
}

impl Ord for DexString {
    fn cmp(&self, other: &Self) -> Ordering {
        self.utf16_units()
            .cmp(other.utf16_units())
            .then_with(|| self.content.cmp(&other.content))
    }
}

impl PartialOrd for DexString {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for DexString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_lossy())
    }
}

impl fmt::Debug for DexString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii() {
        let value = DexString::new("Lcom/example/Foo;");
        assert_eq!(value.size(), 17);
        assert_eq!(value.content(), b"Lcom/example/Foo;");
        assert_eq!(value.to_string(), "Lcom/example/Foo;");
    }

    #[test]
    fn test_nul_and_multibyte() {
        let value = DexString::new("a\0\u{e9}\u{20ac}");
        assert_eq!(value.size(), 4);
        assert_eq!(
            value.content(),
            &[b'a', 0xc0, 0x80, 0xc3, 0xa9, 0xe2, 0x82, 0xac]
        );
        assert_eq!(value.to_string_lossy(), "a\0\u{e9}\u{20ac}");
    }

    #[test]
    fn test_supplementary_is_surrogate_pair() {
        let value = DexString::new("\u{1f600}");
        assert_eq!(value.size(), 2);
        assert_eq!(value.content().len(), 6);
        assert_eq!(value.to_string_lossy(), "\u{1f600}");
    }

    #[test]
    fn test_utf16_order() {
        // U+FFFF sorts after a surrogate pair in UTF-16 order, but before it in code point order
        let bmp = DexString::new("\u{ffff}");
        let supplementary = DexString::new("\u{10000}");
        assert!(supplementary < bmp);

        assert!(DexString::new("a") < DexString::new("b"));
        assert!(DexString::new("a") < DexString::new("aa"));
        assert!(DexString::new("Z") < DexString::new("a"));
    }
}
