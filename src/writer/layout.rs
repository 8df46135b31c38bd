//! Placement of the fixed tables and the trailing map.
//!
//! The id tables follow the header back to back, in the order strings, types, protos, fields,
//! methods, class definitions, call sites, method handles. Their offsets only depend on the
//! table sizes, so [`Layout::new`] computes them up front and the data section starts right
//! after the last table. Data sections are recorded as they are written; the map lists every
//! non-empty section sorted by offset and ends the file.

use crate::{
    file::DexVersion,
    reader::sections::{SectionKind, MAP_ITEM_SIZE},
    writer::{buffer::DexOutputBuffer, mapping::ObjectToOffsetMapping},
};

/// One entry of the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapEntry {
    /// Section type
    pub kind: SectionKind,
    /// Number of items
    pub size: u32,
    /// Absolute offset of the first item
    pub offset: u32,
}

/// Offsets of every table and section of one output section.
#[derive(Debug, Clone)]
pub struct Layout {
    /// Format version written to the header
    pub version: DexVersion,
    /// Offset of the header in the container
    pub base: u32,
    /// Whether this section carries its own string ids and string data
    pub owns_strings: bool,
    /// Number of string ids
    pub string_ids_size: u32,
    /// Offset of the string ids, 0 when not owned
    pub string_ids_off: u32,
    /// Offset of the type ids
    pub type_ids_off: u32,
    /// Offset of the proto ids
    pub proto_ids_off: u32,
    /// Offset of the field ids
    pub field_ids_off: u32,
    /// Offset of the method ids
    pub method_ids_off: u32,
    /// Offset of the class definitions
    pub class_defs_off: u32,
    /// Offset of the call site ids
    pub call_site_ids_off: u32,
    /// Offset of the method handles
    pub method_handles_off: u32,
    /// Start of the data section
    pub data_off: u32,
    /// Offset of the map, set by [`Layout::write_map`]
    pub map_off: u32,
    /// End of the section, set by [`Layout::write_map`]
    pub end: u32,
    /// Buffer position of the map entry offset of shared string ids
    pub shared_string_ids_entry: Option<usize>,
    entries: Vec<MapEntry>,
}

impl Layout {
    /// Place the header and the id tables of `mapping` at `base`.
    ///
    /// Without `owns_strings` the string ids live in another section of the same container;
    /// this section only reports their count.
    #[must_use]
    pub fn new(
        mapping: &ObjectToOffsetMapping,
        version: DexVersion,
        base: u32,
        owns_strings: bool,
    ) -> Layout {
        let mut layout = Layout {
            version,
            base,
            owns_strings,
            string_ids_size: mapping.strings().len() as u32,
            string_ids_off: 0,
            type_ids_off: 0,
            proto_ids_off: 0,
            field_ids_off: 0,
            method_ids_off: 0,
            class_defs_off: 0,
            call_site_ids_off: 0,
            method_handles_off: 0,
            data_off: 0,
            map_off: 0,
            end: 0,
            shared_string_ids_entry: None,
            entries: Vec::new(),
        };
        layout.record(SectionKind::Header, 1, base);

        let mut offset = base + version.header_size() as u32;
        if owns_strings {
            layout.string_ids_off =
                layout.place(&mut offset, SectionKind::StringId, mapping.strings().len());
        }
        layout.type_ids_off = layout.place(&mut offset, SectionKind::TypeId, mapping.types().len());
        layout.proto_ids_off =
            layout.place(&mut offset, SectionKind::ProtoId, mapping.protos().len());
        layout.field_ids_off =
            layout.place(&mut offset, SectionKind::FieldId, mapping.fields().len());
        layout.method_ids_off =
            layout.place(&mut offset, SectionKind::MethodId, mapping.methods().len());
        layout.class_defs_off =
            layout.place(&mut offset, SectionKind::ClassDef, mapping.classes().len());
        layout.call_site_ids_off =
            layout.place(&mut offset, SectionKind::CallSiteId, mapping.call_sites().len());
        layout.method_handles_off =
            layout.place(&mut offset, SectionKind::MethodHandle, mapping.method_handles().len());
        layout.data_off = offset;
        layout
    }

    fn place(&mut self, offset: &mut u32, kind: SectionKind, count: usize) -> u32 {
        let start = *offset;
        *offset += (kind.item_size().unwrap_or(0) * count) as u32;
        if count == 0 {
            return 0;
        }
        self.record(kind, count as u32, start);
        start
    }

    /// Record a data section. Empty sections are not listed in the map.
    pub fn record(&mut self, kind: SectionKind, size: u32, offset: u32) {
        if size > 0 {
            self.entries.push(MapEntry { kind, size, offset });
        }
    }

    /// All recorded sections sorted by offset, without the map itself.
    #[must_use]
    pub fn entries(&self) -> Vec<MapEntry> {
        let mut entries = self.entries.clone();
        entries.sort_by_key(|entry| entry.offset);
        entries
    }

    /// Write the map at the next 4-byte boundary. This ends the section.
    ///
    /// A section that shares its string ids gets a string id entry with offset 0 at the end
    /// of the map, to be patched once the owning section is placed.
    pub fn write_map(&mut self, buffer: &mut DexOutputBuffer) {
        buffer.align(4);
        self.map_off = buffer.offset();

        let mut entries = self.entries();
        entries.push(MapEntry {
            kind: SectionKind::MapList,
            size: 1,
            offset: self.map_off,
        });
        let shared_strings = !self.owns_strings && self.string_ids_size > 0;
        let count = entries.len() + usize::from(shared_strings);

        buffer.put_u32(count as u32);
        for entry in &entries {
            buffer.put_u16(entry.kind as u16);
            buffer.put_u16(0);
            buffer.put_u32(entry.size);
            buffer.put_u32(entry.offset);
        }
        if shared_strings {
            buffer.put_u16(SectionKind::StringId as u16);
            buffer.put_u16(0);
            buffer.put_u32(self.string_ids_size);
            self.shared_string_ids_entry = Some(buffer.position());
            buffer.put_u32(0);
        }
        debug_assert_eq!(
            buffer.offset() - self.map_off,
            (4 + count * MAP_ITEM_SIZE) as u32
        );
        self.end = buffer.offset();
    }

    /// Size of the section in bytes.
    #[must_use]
    pub fn file_size(&self) -> u32 {
        self.end - self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{collect::IndexedItemSet, naming::IdentityLens, ItemFactory};

    #[test]
    fn test_table_offsets() {
        let factory = ItemFactory::new();
        let mut items = IndexedItemSet::default();
        let int = factory.create_type("I");
        items.strings.insert(int.descriptor.clone());
        items.strings.insert(factory.create_string("x"));
        items.types.insert(int.clone());
        let mapping = ObjectToOffsetMapping::new(&items, &IdentityLens).unwrap();

        let layout = Layout::new(&mapping, DexVersion::V35, 0, true);
        assert_eq!(layout.string_ids_off, 0x70);
        assert_eq!(layout.type_ids_off, 0x78);
        assert_eq!(layout.proto_ids_off, 0);
        assert_eq!(layout.data_off, 0x7c);

        let shared = Layout::new(&mapping, DexVersion::V41, 0x200, false);
        assert_eq!(shared.string_ids_off, 0);
        assert_eq!(shared.type_ids_off, 0x278);
    }

    #[test]
    fn test_map_sorted_and_terminal() {
        let mapping =
            ObjectToOffsetMapping::new(&IndexedItemSet::default(), &IdentityLens).unwrap();
        let mut layout = Layout::new(&mapping, DexVersion::V35, 0, true);
        let mut buffer = DexOutputBuffer::new(0);
        buffer.move_to(0x90);
        layout.record(SectionKind::Code, 2, 0x80);
        layout.record(SectionKind::DebugInfo, 1, 0x70);
        layout.record(SectionKind::TypeList, 0, 0x88);
        layout.write_map(&mut buffer);

        let kinds: Vec<SectionKind> = layout.entries().iter().map(|entry| entry.kind).collect();
        assert_eq!(
            kinds,
            [SectionKind::Header, SectionKind::DebugInfo, SectionKind::Code]
        );
        assert_eq!(layout.map_off, 0x90);
        // count + header, debug info, code, map
        assert_eq!(layout.end, 0x90 + 4 + 4 * 12);
        assert_eq!(&buffer.as_slice()[0x90..0x94], &4u32.to_le_bytes());
    }
}
