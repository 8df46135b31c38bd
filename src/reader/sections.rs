//! The section map.
//!
//! Every container ends with a map listing its sections as `(type, size, offset)` triples,
//! sorted by offset. The reader locates all tables through the map rather than through the
//! header, and the writer emits it last.

use strum::{Display, EnumIter};

use crate::{file::parser::Parser, Result};

/// Size in bytes of one map entry.
pub const MAP_ITEM_SIZE: usize = 12;

/// Section types of the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
#[repr(u16)]
pub enum SectionKind {
    /// The file header
    Header = 0x0000,
    /// String id table
    StringId = 0x0001,
    /// Type id table
    TypeId = 0x0002,
    /// Proto id table
    ProtoId = 0x0003,
    /// Field id table
    FieldId = 0x0004,
    /// Method id table
    MethodId = 0x0005,
    /// Class definition table
    ClassDef = 0x0006,
    /// Call site id table
    CallSiteId = 0x0007,
    /// Method handle table
    MethodHandle = 0x0008,
    /// The map itself
    MapList = 0x1000,
    /// Type lists
    TypeList = 0x1001,
    /// Annotation set ref lists
    AnnotationSetRefList = 0x1002,
    /// Annotation sets
    AnnotationSet = 0x1003,
    /// Class data
    ClassData = 0x2000,
    /// Code items
    Code = 0x2001,
    /// String data
    StringData = 0x2002,
    /// Debug info
    DebugInfo = 0x2003,
    /// Annotations
    Annotation = 0x2004,
    /// Encoded arrays
    EncodedArray = 0x2005,
    /// Annotations directories
    AnnotationsDirectory = 0x2006,
    /// Hidden API restrictions
    HiddenApiClassData = 0xf000,
}

impl SectionKind {
    /// Decode a map type code.
    #[must_use]
    pub fn from_u16(value: u16) -> Option<SectionKind> {
        Some(match value {
            0x0000 => SectionKind::Header,
            0x0001 => SectionKind::StringId,
            0x0002 => SectionKind::TypeId,
            0x0003 => SectionKind::ProtoId,
            0x0004 => SectionKind::FieldId,
            0x0005 => SectionKind::MethodId,
            0x0006 => SectionKind::ClassDef,
            0x0007 => SectionKind::CallSiteId,
            0x0008 => SectionKind::MethodHandle,
            0x1000 => SectionKind::MapList,
            0x1001 => SectionKind::TypeList,
            0x1002 => SectionKind::AnnotationSetRefList,
            0x1003 => SectionKind::AnnotationSet,
            0x2000 => SectionKind::ClassData,
            0x2001 => SectionKind::Code,
            0x2002 => SectionKind::StringData,
            0x2003 => SectionKind::DebugInfo,
            0x2004 => SectionKind::Annotation,
            0x2005 => SectionKind::EncodedArray,
            0x2006 => SectionKind::AnnotationsDirectory,
            0xf000 => SectionKind::HiddenApiClassData,
            _ => return None,
        })
    }

    /// Size of one item of a fixed-size table.
    #[must_use]
    pub fn item_size(self) -> Option<usize> {
        match self {
            SectionKind::StringId | SectionKind::TypeId | SectionKind::CallSiteId => Some(4),
            SectionKind::ProtoId => Some(12),
            SectionKind::FieldId | SectionKind::MethodId | SectionKind::MethodHandle => Some(8),
            SectionKind::ClassDef => Some(32),
            _ => None,
        }
    }
}

/// One entry of the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DexSection {
    /// Section type
    pub kind: SectionKind,
    /// Number of items
    pub size: u32,
    /// Absolute offset of the first item
    pub offset: u32,
    /// Offset of the next section, or the end of the input
    pub end: u32,
}

impl DexSection {
    /// An absent section.
    #[must_use]
    pub fn empty(kind: SectionKind) -> DexSection {
        DexSection {
            kind,
            size: 0,
            offset: 0,
            end: 0,
        }
    }
}

/// The parsed map of one container section.
#[derive(Debug, Clone, Default)]
pub struct SectionMap {
    sections: Vec<DexSection>,
}

impl SectionMap {
    /// Parse the map at `map_off`.
    ///
    /// Entries with unknown type codes are skipped. Entries whose range ends past `end` are
    /// rejected.
    ///
    /// # Errors
    /// Returns an error if the map is truncated or an entry lies outside the input.
    pub fn parse(data: &[u8], map_off: usize, end: usize) -> Result<SectionMap> {
        let mut parser = Parser::at(data, map_off)?;
        let count = parser.read_le::<u32>()? as usize;
        if count.saturating_mul(MAP_ITEM_SIZE) > parser.remaining() {
            return Err(malformed_error!("Map with {} entries is truncated", count));
        }

        let mut sections = Vec::with_capacity(count);
        for _ in 0..count {
            let code = parser.read_le::<u16>()?;
            let _unused = parser.read_le::<u16>()?;
            let size = parser.read_le::<u32>()?;
            let offset = parser.read_le::<u32>()?;

            if u64::from(offset) + u64::from(size) > end as u64 {
                return Err(malformed_error!(
                    "Section 0x{:04x} at 0x{:x} with {} items points past the end (0x{:x})",
                    code,
                    offset,
                    size,
                    end
                ));
            }

            match SectionKind::from_u16(code) {
                Some(kind) => sections.push(DexSection {
                    kind,
                    size,
                    offset,
                    end: 0,
                }),
                None => log::debug!("Skipping unknown map entry 0x{:04x}", code),
            }
        }

        for index in 0..sections.len() {
            sections[index].end = sections
                .get(index + 1)
                .map_or(end as u32, |next| next.offset);
        }

        log::debug!("Parsed map at 0x{:x} with {} sections", map_off, sections.len());
        Ok(SectionMap { sections })
    }

    /// The section of `kind`, or an empty section if the map has none.
    #[must_use]
    pub fn lookup(&self, kind: SectionKind) -> DexSection {
        self.sections
            .iter()
            .find(|section| section.kind == kind)
            .copied()
            .unwrap_or_else(|| DexSection::empty(kind))
    }

    /// All known sections, in map order.
    #[must_use]
    pub fn sections(&self) -> &[DexSection] {
        &self.sections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_bytes(entries: &[(u16, u32, u32)]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&(entries.len() as u32).to_le_bytes());
        for (code, size, offset) in entries {
            data.extend_from_slice(&code.to_le_bytes());
            data.extend_from_slice(&0u16.to_le_bytes());
            data.extend_from_slice(&size.to_le_bytes());
            data.extend_from_slice(&offset.to_le_bytes());
        }
        data
    }

    #[test]
    fn test_parse_and_lookup() {
        let data = map_bytes(&[(0x0000, 1, 0), (0x0001, 3, 0x70), (0x7777, 1, 0x80), (0x1000, 1, 0x90)]);
        let map = SectionMap::parse(&data, 0, 0x100).unwrap();

        assert_eq!(map.sections().len(), 3);
        let strings = map.lookup(SectionKind::StringId);
        assert_eq!(strings.size, 3);
        assert_eq!(strings.end, 0x90);
        assert_eq!(map.lookup(SectionKind::MapList).end, 0x100);

        let absent = map.lookup(SectionKind::CallSiteId);
        assert_eq!(absent.size, 0);
    }

    #[test]
    fn test_entry_past_end() {
        let data = map_bytes(&[(0x0001, 0x10, 0xf8)]);
        assert!(SectionMap::parse(&data, 0, 0x100).is_err());
    }

    #[test]
    fn test_item_sizes() {
        assert_eq!(SectionKind::ProtoId.item_size(), Some(12));
        assert_eq!(SectionKind::ClassDef.item_size(), Some(32));
        assert_eq!(SectionKind::Code.item_size(), None);
        assert_eq!(SectionKind::from_u16(0x2006), Some(SectionKind::AnnotationsDirectory));
    }
}
