//! Container header parsing.
//!
//! This module defines the [`DexHeader`] struct, the fixed header at the start of every
//! container (or container section), together with the byte offsets of its fields. The writer
//! uses the same offsets to emit and back-patch headers.
//!
//! # Layout
//!
//! | Offset | Field | Notes |
//! |---|---|---|
//! | `0x00` | magic | `dex\n` + 3 version digits + NUL |
//! | `0x08` | checksum | Adler-32 over `[0x0c, end)` |
//! | `0x0c` | signature | SHA-1 over `[0x20, end)` |
//! | `0x20` | file size | |
//! | `0x24` | header size | `0x70`, or `0x78` for the container format |
//! | `0x28` | endian tag | `0x12345678` |
//! | `0x34` | map offset | |
//! | `0x38`..`0x6c` | table size/offset pairs | |
//! | `0x68` | data size/offset | zero in the container format |
//! | `0x70` | container size/offset | container format only |

use crate::{
    file::{parse_magic, parser::Parser, DexVersion},
    Result,
};

/// Offset of the checksum.
pub const CHECKSUM_OFFSET: usize = 0x08;
/// Offset of the signature.
pub const SIGNATURE_OFFSET: usize = 0x0c;
/// Size of the signature.
pub const SIGNATURE_SIZE: usize = 20;
/// Offset of the file size.
pub const FILE_SIZE_OFFSET: usize = 0x20;
/// Offset of the header size.
pub const HEADER_SIZE_OFFSET: usize = 0x24;
/// Offset of the endian tag.
pub const ENDIAN_TAG_OFFSET: usize = 0x28;
/// Offset of the map offset.
pub const MAP_OFF_OFFSET: usize = 0x34;
/// Offset of the string id table size.
pub const STRING_IDS_SIZE_OFFSET: usize = 0x38;
/// Offset of the data section size.
pub const DATA_SIZE_OFFSET: usize = 0x68;
/// Offset of the container size.
pub const CONTAINER_SIZE_OFFSET: usize = 0x70;
/// Offset of the container offset.
pub const CONTAINER_OFF_OFFSET: usize = 0x74;

/// The little-endian tag.
pub const ENDIAN_CONSTANT: u32 = 0x1234_5678;
/// Header size of the standard format.
pub const HEADER_SIZE: u32 = 0x70;
/// Header size of the container format.
pub const HEADER_SIZE_V41: u32 = 0x78;

/// The fixed header of a container or container section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexHeader {
    /// Format version from the magic
    pub version: DexVersion,
    /// Adler-32 checksum
    pub checksum: u32,
    /// SHA-1 signature
    pub signature: [u8; SIGNATURE_SIZE],
    /// Size of this file or section
    pub file_size: u32,
    /// Size of this header
    pub header_size: u32,
    /// Endianness tag
    pub endian_tag: u32,
    /// Size of the link section
    pub link_size: u32,
    /// Offset of the link section
    pub link_off: u32,
    /// Offset of the map
    pub map_off: u32,
    /// Number of string ids
    pub string_ids_size: u32,
    /// Offset of the string ids
    pub string_ids_off: u32,
    /// Number of type ids
    pub type_ids_size: u32,
    /// Offset of the type ids
    pub type_ids_off: u32,
    /// Number of proto ids
    pub proto_ids_size: u32,
    /// Offset of the proto ids
    pub proto_ids_off: u32,
    /// Number of field ids
    pub field_ids_size: u32,
    /// Offset of the field ids
    pub field_ids_off: u32,
    /// Number of method ids
    pub method_ids_size: u32,
    /// Offset of the method ids
    pub method_ids_off: u32,
    /// Number of class definitions
    pub class_defs_size: u32,
    /// Offset of the class definitions
    pub class_defs_off: u32,
    /// Size of the data section
    pub data_size: u32,
    /// Offset of the data section
    pub data_off: u32,
    /// Size of the whole container, container format only
    pub container_size: u32,
    /// Offset of this section in the container, container format only
    pub container_off: u32,
}

impl DexHeader {
    /// Read the header starting at `offset`.
    ///
    /// # Arguments
    /// * `data` - The complete container
    /// * `offset` - Start of the header, non-zero for later container sections
    ///
    /// # Errors
    /// Returns an error if the magic is not supported, the header size does not match the
    /// version, or the endian tag is wrong.
    pub fn read(data: &[u8], offset: usize) -> Result<DexHeader> {
        let version = parse_magic(data.get(offset..).ok_or(out_of_bounds_error!())?)?;

        let mut parser = Parser::at(data, offset + 8)?;
        let checksum = parser.read_le::<u32>()?;
        let mut signature = [0u8; SIGNATURE_SIZE];
        signature.copy_from_slice(parser.read_bytes(SIGNATURE_SIZE)?);
        let file_size = parser.read_le::<u32>()?;
        let header_size = parser.read_le::<u32>()?;
        let expected_header_size = version.header_size() as u32;
        if header_size != expected_header_size {
            return Err(malformed_error!(
                "Invalid header size for version {}: expected 0x{:x}, got 0x{:x}",
                version,
                expected_header_size,
                header_size
            ));
        }

        let endian_tag = parser.read_le::<u32>()?;
        if endian_tag != ENDIAN_CONSTANT {
            return Err(malformed_error!("Unsupported endian tag 0x{:08x}", endian_tag));
        }

        let mut header = DexHeader {
            version,
            checksum,
            signature,
            file_size,
            header_size,
            endian_tag,
            link_size: parser.read_le::<u32>()?,
            link_off: parser.read_le::<u32>()?,
            map_off: parser.read_le::<u32>()?,
            string_ids_size: parser.read_le::<u32>()?,
            string_ids_off: parser.read_le::<u32>()?,
            type_ids_size: parser.read_le::<u32>()?,
            type_ids_off: parser.read_le::<u32>()?,
            proto_ids_size: parser.read_le::<u32>()?,
            proto_ids_off: parser.read_le::<u32>()?,
            field_ids_size: parser.read_le::<u32>()?,
            field_ids_off: parser.read_le::<u32>()?,
            method_ids_size: parser.read_le::<u32>()?,
            method_ids_off: parser.read_le::<u32>()?,
            class_defs_size: parser.read_le::<u32>()?,
            class_defs_off: parser.read_le::<u32>()?,
            data_size: parser.read_le::<u32>()?,
            data_off: parser.read_le::<u32>()?,
            container_size: 0,
            container_off: 0,
        };

        if version.is_container() {
            header.container_size = parser.read_le::<u32>()?;
            header.container_off = parser.read_le::<u32>()?;
            if header.container_off as usize != offset {
                return Err(malformed_error!(
                    "Container section at 0x{:x} claims offset 0x{:x}",
                    offset,
                    header.container_off
                ));
            }
        }

        if (offset as u64) + u64::from(file_size) > data.len() as u64 {
            return Err(malformed_error!(
                "File size 0x{:x} at 0x{:x} exceeds the input of 0x{:x} bytes",
                file_size,
                offset,
                data.len()
            ));
        }

        Ok(header)
    }
}
