//! Input container abstraction.
//!
//! This module provides the [`crate::file::File`] type, the entry point for loading a DEX
//! container from disk or from memory. It abstracts over the data source and validates the
//! container magic before any structure is parsed.
//!
//! # Architecture
//!
//! - **Backend system** - Pluggable data sources (memory-mapped files, memory buffers)
//! - **Magic validation** - `dex\n` prefix, three version digits and a terminating NUL
//! - **Cursor parsing** - [`crate::file::parser::Parser`] and the [`crate::file::io`] primitives
//!
//! # Key Components
//!
//! - [`crate::file::File`] - A validated input container with its origin
//! - [`crate::file::Backend`] - Trait for different data sources
//! - [`crate::file::DexVersion`] - The container versions this crate reads and writes
//! - [`crate::file::physical::Physical`] - Memory-mapped file backend
//! - [`crate::file::memory::Memory`] - In-memory buffer backend
//!
//! # Examples
//!
//! ```rust,no_run
//! use dexscope::File;
//! use std::path::Path;
//!
//! let file = File::from_file(Path::new("classes.dex"))?;
//! println!("{}: version {} with {} bytes", file.origin(), file.version(), file.len());
//! # Ok::<(), dexscope::Error>(())
//! ```

pub mod io;
pub mod memory;
pub mod parser;
pub mod physical;

use std::{fmt, path::Path};

use crate::{
    Error::{Empty, NotSupported},
    Result,
};
use memory::Memory;
use physical::Physical;

/// Common prefix of every container magic.
pub const DEX_FILE_MAGIC_PREFIX: &[u8; 4] = b"dex\n";

/// Total length of the magic, including the version digits and the terminating NUL.
pub const DEX_MAGIC_SIZE: usize = 8;

/// Backend trait for the input data.
///
/// Implementations provide bounds-checked access to the raw bytes of one input container.
pub trait Backend: Send + Sync {
    /// Returns a slice of the data at the given offset and length.
    ///
    /// # Errors
    ///
    /// Returns an error if the requested range is out of bounds.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;
}

/// Container format versions.
///
/// The version is encoded as three ASCII digits inside the magic. Version 041 is the
/// multi-section container format with the larger header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DexVersion {
    /// `035`, the baseline format
    V35,
    /// `037`, adds default and static interface methods
    V37,
    /// `038`, adds method handles and call sites
    V38,
    /// `039`, adds const-method-handle and const-method-type
    V39,
    /// `040`, relaxed simple names
    V40,
    /// `041`, multiple sections in one container
    V41,
}

impl DexVersion {
    /// Parse the three version digits of a magic.
    #[must_use]
    pub fn from_digits(digits: &[u8]) -> Option<DexVersion> {
        match digits {
            b"035" => Some(DexVersion::V35),
            b"037" => Some(DexVersion::V37),
            b"038" => Some(DexVersion::V38),
            b"039" => Some(DexVersion::V39),
            b"040" => Some(DexVersion::V40),
            b"041" => Some(DexVersion::V41),
            _ => None,
        }
    }

    /// The three version digits.
    #[must_use]
    pub fn digits(self) -> &'static [u8; 3] {
        match self {
            DexVersion::V35 => b"035",
            DexVersion::V37 => b"037",
            DexVersion::V38 => b"038",
            DexVersion::V39 => b"039",
            DexVersion::V40 => b"040",
            DexVersion::V41 => b"041",
        }
    }

    /// The complete 8-byte magic for this version.
    #[must_use]
    pub fn magic(self) -> [u8; DEX_MAGIC_SIZE] {
        let digits = self.digits();
        [
            b'd', b'e', b'x', b'\n', digits[0], digits[1], digits[2], 0,
        ]
    }

    /// Whether this version uses the multi-section container layout.
    #[must_use]
    pub fn is_container(self) -> bool {
        self == DexVersion::V41
    }

    /// Size of the file header for this version.
    #[must_use]
    pub fn header_size(self) -> usize {
        if self.is_container() {
            0x78
        } else {
            0x70
        }
    }
}

impl fmt::Display for DexVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.digits()))
    }
}

/// Parse the version of a buffer that starts with a container magic.
///
/// # Errors
/// Returns [`crate::Error::NotSupported`] if the prefix, the digits or the terminator are wrong.
pub fn parse_magic(data: &[u8]) -> Result<DexVersion> {
    if data.len() < DEX_MAGIC_SIZE
        || &data[..4] != DEX_FILE_MAGIC_PREFIX
        || data[DEX_MAGIC_SIZE - 1] != 0
    {
        return Err(NotSupported);
    }

    DexVersion::from_digits(&data[4..7]).ok_or(NotSupported)
}

/// A validated input container.
///
/// Owns the raw bytes of one input through a [`Backend`] and remembers where they came from,
/// so format errors can be reported against the offending input.
pub struct File {
    data: Box<dyn Backend>,
    version: DexVersion,
    origin: String,
}

impl File {
    /// Loads a container from a file on disk.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or does not start with a container magic.
    pub fn from_file(file: &Path) -> Result<File> {
        let input = Physical::new(file)?;

        Self::load(input, file.display().to_string())
    }

    /// Loads a container from a memory buffer.
    ///
    /// # Errors
    /// Returns an error if the buffer is empty or does not start with a container magic.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        Self::from_mem_with_origin(data, "<memory>")
    }

    /// Loads a container from a memory buffer, recording `origin` for diagnostics.
    ///
    /// # Errors
    /// Returns an error if the buffer is empty or does not start with a container magic.
    pub fn from_mem_with_origin(data: Vec<u8>, origin: impl Into<String>) -> Result<File> {
        Self::load(Memory::new(data), origin.into())
    }

    fn load<T: Backend + 'static>(data: T, origin: String) -> Result<File> {
        if data.len() == 0 {
            return Err(Empty);
        }

        let version = parse_magic(data.data())?;

        Ok(File {
            data: Box::new(data),
            version,
            origin,
        })
    }

    /// Returns the total size of the container in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the container holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    /// The version found in the magic of the first section.
    #[must_use]
    pub fn version(&self) -> DexVersion {
        self.version
    }

    /// Where this container was loaded from.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The complete raw data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// A bounds-checked slice of the raw data.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the data.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.data.data_slice(offset, len)
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("origin", &self.origin)
            .field("version", &self.version)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_versions() {
        for version in [
            DexVersion::V35,
            DexVersion::V37,
            DexVersion::V38,
            DexVersion::V39,
            DexVersion::V40,
            DexVersion::V41,
        ] {
            assert_eq!(parse_magic(&version.magic()).unwrap(), version);
        }
    }

    #[test]
    fn test_bad_magic() {
        assert!(matches!(parse_magic(b"dex\n036\0"), Err(NotSupported)));
        assert!(matches!(parse_magic(b"dey\n035\0"), Err(NotSupported)));
        assert!(matches!(parse_magic(b"dex\n035 "), Err(NotSupported)));
        assert!(matches!(parse_magic(b"dex\n"), Err(NotSupported)));
    }

    #[test]
    fn test_from_mem() {
        let mut data = DexVersion::V39.magic().to_vec();
        data.resize(0x70, 0);

        let file = File::from_mem_with_origin(data, "test.dex").unwrap();
        assert_eq!(file.version(), DexVersion::V39);
        assert_eq!(file.origin(), "test.dex");
        assert_eq!(file.len(), 0x70);
        assert_eq!(file.data_slice(0, 4).unwrap(), b"dex\n");
        assert!(file.data_slice(0x6c, 8).is_err());
    }

    #[test]
    fn test_from_mem_empty() {
        assert!(matches!(File::from_mem(Vec::new()), Err(Empty)));
    }

    #[test]
    fn test_header_size() {
        assert_eq!(DexVersion::V35.header_size(), 0x70);
        assert_eq!(DexVersion::V41.header_size(), 0x78);
        assert_eq!(DexVersion::V38.to_string(), "038");
    }
}
