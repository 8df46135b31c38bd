//! Decoding of one container section into the model.
//!
//! A [`DexParser`] works in three steps:
//!
//! 1. [`DexParser::new`] reads the header, the map and the string table. Later sections of a
//!    container are handed the string table of the last section instead.
//! 2. [`DexParser::populate_index_tables`] fills the fixed-size tables in dependency order:
//!    checksum and tool markers, types, fields, protos, methods, method handles, call sites.
//!    With strict checks the canonical order of types, fields and methods is verified.
//! 3. [`DexParser::read_classes`] decodes the class definitions with their members, code,
//!    annotations and static values.
//!
//! Offset-addressed structures are memoized in an [`OffsetCache`] keyed by their byte offset, so
//! a structure shared by several referrers is decoded once and shared in the model. Offset 0
//! means "absent" and never reaches the cache. Debug info referenced by a method whose
//! instructions exceed the range of a pc-based decoding is re-decoded as event-based into a
//! second cache, because the same bytes may be read both ways by different methods.
//!
//! Code items are never shared: every method gets its own decoded body.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use crate::{
    file::parser::Parser,
    model::{
        annotations::{AnnotationSet, AnnotationVisibility, DexAnnotation, ParameterAnnotations},
        class::{AccessFlags, DexProgramClass, EncodedField, EncodedMethod},
        code::{instruction::decode_instructions, DexCode, TryHandler, TryItem, TypeAddrPair},
        debug::{DebugInfo, DebugInfoRc},
        items::{
            CallSiteRc, FieldRc, MethodHandleKind, MethodHandleMember, MethodHandleRc, MethodRc,
            ProtoRc, TypeList, TypeRc,
        },
        marker::{parse_checksums, Marker},
        string::{DexString, StringRc},
        values::{EncodedAnnotation, EncodedArray, EncodedValue},
        IndexResolver, ItemFactory,
    },
    reader::{
        header::DexHeader,
        sections::{DexSection, SectionKind, SectionMap},
    },
    Error::OrderViolation,
    Options, Result,
};

const NO_INDEX: u32 = 0xffff_ffff;

/// The fixed-size tables of one section.
#[derive(Default)]
pub struct IndexedItems {
    strings: Arc<[StringRc]>,
    types: Vec<TypeRc>,
    protos: Vec<ProtoRc>,
    fields: Vec<FieldRc>,
    methods: Vec<MethodRc>,
    method_handles: Vec<MethodHandleRc>,
    call_sites: Vec<CallSiteRc>,
}

fn table_get<T: Clone>(table: &[T], index: u32, name: &str) -> Result<T> {
    table.get(index as usize).cloned().ok_or_else(|| {
        malformed_error!(
            "{} index {} out of range ({} entries)",
            name,
            index,
            table.len()
        )
    })
}

impl IndexResolver for IndexedItems {
    fn string(&self, index: u32) -> Result<StringRc> {
        table_get(&self.strings, index, "String")
    }

    fn ty(&self, index: u32) -> Result<TypeRc> {
        table_get(&self.types, index, "Type")
    }

    fn proto(&self, index: u32) -> Result<ProtoRc> {
        table_get(&self.protos, index, "Proto")
    }

    fn field(&self, index: u32) -> Result<FieldRc> {
        table_get(&self.fields, index, "Field")
    }

    fn method(&self, index: u32) -> Result<MethodRc> {
        table_get(&self.methods, index, "Method")
    }

    fn call_site(&self, index: u32) -> Result<CallSiteRc> {
        table_get(&self.call_sites, index, "Call site")
    }

    fn method_handle(&self, index: u32) -> Result<MethodHandleRc> {
        table_get(&self.method_handles, index, "Method handle")
    }
}

/// An annotations directory, resolved to its members.
#[derive(Debug, Default)]
struct AnnotationsDirectory {
    class: Arc<AnnotationSet>,
    fields: HashMap<FieldRc, Arc<AnnotationSet>>,
    methods: HashMap<MethodRc, Arc<AnnotationSet>>,
    parameters: HashMap<MethodRc, Arc<ParameterAnnotations>>,
}

/// A structure decoded from an offset.
#[derive(Clone)]
enum CachedItem {
    TypeList(Arc<TypeList>),
    Annotation(Arc<DexAnnotation>),
    AnnotationSet(Arc<AnnotationSet>),
    RefList(Arc<ParameterAnnotations>),
    Directory(Arc<AnnotationsDirectory>),
    EncodedArray(Arc<EncodedArray>),
    DebugInfo(DebugInfoRc),
}

/// Memo of decoded structures: an arena plus an offset index into it.
#[derive(Default)]
pub struct OffsetCache {
    arena: Vec<CachedItem>,
    slots: HashMap<u32, usize>,
}

impl OffsetCache {
    fn get(&self, offset: u32) -> Option<&CachedItem> {
        self.slots.get(&offset).map(|slot| &self.arena[*slot])
    }

    fn insert(&mut self, offset: u32, item: CachedItem) {
        self.slots.insert(offset, self.arena.len());
        self.arena.push(item);
    }

    /// Number of memoized structures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Whether nothing was memoized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }
}

macro_rules! cached_at {
    ($self:ident, $offset:expr, $variant:ident, $parse:ident) => {{
        let offset: u32 = $offset;
        if let Some(CachedItem::$variant(item)) = $self.cache.get(offset) {
            Ok(item.clone())
        } else {
            let mut parser = Parser::at($self.data, offset as usize)?;
            let item = Arc::new($self.$parse(&mut parser)?);
            $self.cache.insert(offset, CachedItem::$variant(item.clone()));
            Ok(item)
        }
    }};
}

/// Decoder for one container or container section.
pub struct DexParser<'a> {
    data: &'a [u8],
    offset: usize,
    origin: String,
    header: DexHeader,
    sections: SectionMap,
    factory: Arc<ItemFactory>,
    items: IndexedItems,
    cache: OffsetCache,
    event_debug_cache: HashMap<u32, DebugInfoRc>,
    checksums: BTreeMap<String, u64>,
    markers: Vec<Marker>,
    strict_checks: bool,
    allow_pc_based_debug_info: bool,
}

impl<'a> DexParser<'a> {
    /// Create a parser for the section starting at `offset`.
    ///
    /// # Arguments
    /// * `data` - The complete input
    /// * `offset` - Start of this section's header
    /// * `origin` - Name of the input, for diagnostics
    /// * `factory` - Factory interning all decoded items
    /// * `options` - Reader switches
    /// * `shared_strings` - String table of the last container section, for earlier sections
    ///
    /// # Errors
    /// Returns an error if the header, the map or the string table is malformed.
    pub fn new(
        data: &'a [u8],
        offset: usize,
        origin: impl Into<String>,
        factory: Arc<ItemFactory>,
        options: &Options,
        shared_strings: Option<Arc<[StringRc]>>,
    ) -> Result<DexParser<'a>> {
        let header = DexHeader::read(data, offset)?;
        let sections = SectionMap::parse(data, header.map_off as usize, data.len())?;

        let mut parser = DexParser {
            data,
            offset,
            origin: origin.into(),
            header,
            sections,
            factory,
            items: IndexedItems::default(),
            cache: OffsetCache::default(),
            event_debug_cache: HashMap::new(),
            checksums: BTreeMap::new(),
            markers: Vec::new(),
            strict_checks: options.strict_checks,
            allow_pc_based_debug_info: options.allow_pc_based_debug_info,
        };

        parser.items.strings = match shared_strings {
            Some(strings) => strings,
            None => parser.parse_strings()?.into(),
        };
        Ok(parser)
    }

    /// The parsed header.
    #[must_use]
    pub fn header(&self) -> &DexHeader {
        &self.header
    }

    /// Offset of this section in the input.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The string table used by this section.
    #[must_use]
    pub fn strings(&self) -> Arc<[StringRc]> {
        self.items.strings.clone()
    }

    /// Class checksums recovered from the checksum marker.
    #[must_use]
    pub fn checksums(&self) -> &BTreeMap<String, u64> {
        &self.checksums
    }

    /// Tool markers found in the string table.
    #[must_use]
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// The offset-addressed structures decoded so far.
    #[must_use]
    pub fn cache(&self) -> &OffsetCache {
        &self.cache
    }

    /// The resolved tables.
    #[must_use]
    pub fn items(&self) -> &IndexedItems {
        &self.items
    }

    fn section(&self, kind: SectionKind) -> DexSection {
        self.sections.lookup(kind)
    }

    fn table_parser(&self, kind: SectionKind, index: usize) -> Result<Parser<'a>> {
        let section = self.section(kind);
        let item_size = kind.item_size().unwrap_or(0);
        Parser::at(self.data, section.offset as usize + item_size * index)
    }

    fn parse_strings(&self) -> Result<Vec<StringRc>> {
        let section = self.section(SectionKind::StringId);
        let mut ids = Parser::at(self.data, section.offset as usize)?;
        let mut strings = Vec::with_capacity(section.size as usize);
        for _ in 0..section.size {
            let data_off = ids.read_le::<u32>()? as usize;
            let mut parser = Parser::at(self.data, data_off)?;
            let utf16_size = parser.read_uleb128()?;
            let content = parser.read_until_nul()?;
            strings.push(
                self.factory
                    .intern_string(DexString::from_mutf8(utf16_size, content)),
            );
        }
        Ok(strings)
    }

    /// Fill all fixed-size tables.
    ///
    /// # Errors
    /// Returns an error if a table is malformed, or [`crate::Error::OrderViolation`] if strict
    /// checks are enabled and a table is not in canonical order.
    pub fn populate_index_tables(&mut self) -> Result<()> {
        self.populate_markers();
        self.populate_types()?;
        self.populate_fields()?;
        self.populate_protos()?;
        self.populate_methods()?;
        self.populate_method_handles()?;
        self.populate_call_sites()?;
        Ok(())
    }

    fn populate_markers(&mut self) {
        for string in self.items.strings.iter().rev() {
            if !Marker::has_marker_prefix(string.content()) {
                break;
            }
            let text = string.to_string_lossy();
            if let Some(checksums) = parse_checksums(&text) {
                self.checksums.extend(checksums);
            } else if let Some(marker) = Marker::parse(&text) {
                self.markers.push(marker);
            }
        }
        self.markers.reverse();
    }

    fn populate_types(&mut self) -> Result<()> {
        let section = self.section(SectionKind::TypeId);
        let mut parser = Parser::at(self.data, section.offset as usize)?;
        let mut previous: Option<u32> = None;
        let mut types = Vec::with_capacity(section.size as usize);
        for index in 0..section.size as usize {
            let descriptor_idx = parser.read_le::<u32>()?;
            if self.strict_checks && previous.is_some_and(|previous| previous >= descriptor_idx) {
                return Err(OrderViolation {
                    table: "type_ids",
                    index,
                });
            }
            previous = Some(descriptor_idx);
            types.push(
                self.factory
                    .intern_type(self.items.string(descriptor_idx)?),
            );
        }
        self.items.types = types;
        Ok(())
    }

    fn populate_fields(&mut self) -> Result<()> {
        let section = self.section(SectionKind::FieldId);
        let mut parser = Parser::at(self.data, section.offset as usize)?;
        let mut previous: Option<(u16, u32, u16)> = None;
        let mut fields = Vec::with_capacity(section.size as usize);
        for index in 0..section.size as usize {
            let class_idx = parser.read_le::<u16>()?;
            let type_idx = parser.read_le::<u16>()?;
            let name_idx = parser.read_le::<u32>()?;
            let key = (class_idx, name_idx, type_idx);
            if self.strict_checks && previous.is_some_and(|previous| previous >= key) {
                return Err(OrderViolation {
                    table: "field_ids",
                    index,
                });
            }
            previous = Some(key);
            fields.push(self.factory.intern_field(
                self.items.ty(u32::from(class_idx))?,
                self.items.string(name_idx)?,
                self.items.ty(u32::from(type_idx))?,
            ));
        }
        self.items.fields = fields;
        Ok(())
    }

    fn populate_protos(&mut self) -> Result<()> {
        let section = self.section(SectionKind::ProtoId);
        let mut protos = Vec::with_capacity(section.size as usize);
        for index in 0..section.size as usize {
            let mut parser = self.table_parser(SectionKind::ProtoId, index)?;
            let _shorty_idx = parser.read_le::<u32>()?;
            let return_type_idx = parser.read_le::<u32>()?;
            let parameters_off = parser.read_le::<u32>()?;
            let return_type = self.items.ty(return_type_idx)?;
            let parameters = self.type_list_at(parameters_off)?;
            protos.push(
                self.factory
                    .create_proto(&return_type, parameters.as_ref().clone()),
            );
        }
        self.items.protos = protos;
        Ok(())
    }

    fn populate_methods(&mut self) -> Result<()> {
        let section = self.section(SectionKind::MethodId);
        let mut parser = Parser::at(self.data, section.offset as usize)?;
        let mut previous: Option<(u16, u32, u16)> = None;
        let mut methods = Vec::with_capacity(section.size as usize);
        for index in 0..section.size as usize {
            let class_idx = parser.read_le::<u16>()?;
            let proto_idx = parser.read_le::<u16>()?;
            let name_idx = parser.read_le::<u32>()?;
            let key = (class_idx, name_idx, proto_idx);
            if self.strict_checks && previous.is_some_and(|previous| previous >= key) {
                return Err(OrderViolation {
                    table: "method_ids",
                    index,
                });
            }
            previous = Some(key);
            methods.push(self.factory.intern_method(
                self.items.ty(u32::from(class_idx))?,
                self.items.string(name_idx)?,
                self.items.proto(u32::from(proto_idx))?,
            ));
        }
        self.items.methods = methods;
        Ok(())
    }

    fn populate_method_handles(&mut self) -> Result<()> {
        let section = self.section(SectionKind::MethodHandle);
        let mut parser = Parser::at(self.data, section.offset as usize)?;
        let mut handles = Vec::with_capacity(section.size as usize);
        for _ in 0..section.size {
            let kind_value = parser.read_le::<u16>()?;
            let _unused = parser.read_le::<u16>()?;
            let member_idx = u32::from(parser.read_le::<u16>()?);
            let _unused = parser.read_le::<u16>()?;

            let kind = MethodHandleKind::from_u16(kind_value).ok_or_else(|| {
                malformed_error!("Unsupported method handle kind 0x{:x}", kind_value)
            })?;
            let member = if kind.is_field_handle() {
                MethodHandleMember::Field(self.items.field(member_idx)?)
            } else {
                MethodHandleMember::Method(self.items.method(member_idx)?)
            };
            handles.push(self.factory.create_method_handle(kind, member));
        }
        self.items.method_handles = handles;
        Ok(())
    }

    fn populate_call_sites(&mut self) -> Result<()> {
        let section = self.section(SectionKind::CallSiteId);
        let mut parser = Parser::at(self.data, section.offset as usize)?;
        let mut call_sites = Vec::with_capacity(section.size as usize);
        for index in 0..section.size {
            let array_off = parser.read_le::<u32>()?;
            let array = self.encoded_array_at(array_off)?;
            let call_site = match array.values.as_slice() {
                [EncodedValue::MethodHandle(bootstrap), EncodedValue::String(name), EncodedValue::MethodType(proto), extra @ ..] => {
                    self.factory.create_call_site(
                        bootstrap.clone(),
                        name.clone(),
                        proto.clone(),
                        extra.to_vec(),
                    )
                }
                _ => {
                    return Err(malformed_error!(
                        "Call site {} does not start with handle, name and type",
                        index
                    ))
                }
            };
            call_sites.push(call_site);
        }
        self.items.call_sites = call_sites;
        Ok(())
    }

    fn parse_type_list(&mut self, parser: &mut Parser<'a>) -> Result<TypeList> {
        let size = parser.read_le::<u32>()?;
        (0..size)
            .map(|_| self.items.ty(u32::from(parser.read_le::<u16>()?)))
            .collect()
    }

    fn type_list_at(&mut self, offset: u32) -> Result<Arc<TypeList>> {
        if offset == 0 {
            return Ok(Arc::default());
        }
        cached_at!(self, offset, TypeList, parse_type_list)
    }

    fn parse_encoded_array(&mut self, parser: &mut Parser<'a>) -> Result<EncodedArray> {
        EncodedArray::read(parser, &self.items)
    }

    fn encoded_array_at(&mut self, offset: u32) -> Result<Arc<EncodedArray>> {
        if offset == 0 {
            return Ok(Arc::default());
        }
        cached_at!(self, offset, EncodedArray, parse_encoded_array)
    }

    fn parse_annotation(&mut self, parser: &mut Parser<'a>) -> Result<DexAnnotation> {
        let visibility_value = parser.read_le::<u8>()?;
        let visibility = AnnotationVisibility::from_u8(visibility_value).ok_or_else(|| {
            malformed_error!("Unknown annotation visibility 0x{:x}", visibility_value)
        })?;
        Ok(DexAnnotation {
            visibility,
            annotation: EncodedAnnotation::read(parser, &self.items)?,
        })
    }

    fn annotation_at(&mut self, offset: u32) -> Result<Arc<DexAnnotation>> {
        cached_at!(self, offset, Annotation, parse_annotation)
    }

    fn parse_annotation_set(&mut self, parser: &mut Parser<'a>) -> Result<AnnotationSet> {
        let size = parser.read_le::<u32>()?;
        let offsets = (0..size)
            .map(|_| parser.read_le::<u32>())
            .collect::<Result<Vec<_>>>()?;
        let mut annotations: Vec<Arc<DexAnnotation>> = Vec::with_capacity(offsets.len());
        for offset in offsets {
            let annotation = self.annotation_at(offset)?;
            if annotations
                .iter()
                .any(|existing| existing.annotation.ty == annotation.annotation.ty)
            {
                return Err(malformed_error!(
                    "Multiple annotations of type {}",
                    annotation.annotation.ty
                ));
            }
            annotations.push(annotation);
        }
        Ok(AnnotationSet::new(annotations))
    }

    fn annotation_set_at(&mut self, offset: u32) -> Result<Arc<AnnotationSet>> {
        if offset == 0 {
            return Ok(Arc::default());
        }
        cached_at!(self, offset, AnnotationSet, parse_annotation_set)
    }

    fn parse_ref_list(&mut self, parser: &mut Parser<'a>) -> Result<ParameterAnnotations> {
        let size = parser.read_le::<u32>()?;
        let offsets = (0..size)
            .map(|_| parser.read_le::<u32>())
            .collect::<Result<Vec<_>>>()?;
        let sets = offsets
            .into_iter()
            .map(|offset| self.annotation_set_at(offset))
            .collect::<Result<Vec<_>>>()?;
        Ok(ParameterAnnotations { sets })
    }

    fn ref_list_at(&mut self, offset: u32) -> Result<Arc<ParameterAnnotations>> {
        if offset == 0 {
            return Ok(Arc::default());
        }
        cached_at!(self, offset, RefList, parse_ref_list)
    }

    fn read_member_offsets(parser: &mut Parser<'a>, size: u32) -> Result<Vec<(u32, u32)>> {
        (0..size)
            .map(|_| Ok((parser.read_le::<u32>()?, parser.read_le::<u32>()?)))
            .collect()
    }

    fn parse_directory(&mut self, parser: &mut Parser<'a>) -> Result<AnnotationsDirectory> {
        let class_annotations_off = parser.read_le::<u32>()?;
        let fields_size = parser.read_le::<u32>()?;
        let methods_size = parser.read_le::<u32>()?;
        let parameters_size = parser.read_le::<u32>()?;
        let field_entries = Self::read_member_offsets(parser, fields_size)?;
        let method_entries = Self::read_member_offsets(parser, methods_size)?;
        let parameter_entries = Self::read_member_offsets(parser, parameters_size)?;

        let mut directory = AnnotationsDirectory {
            class: self.annotation_set_at(class_annotations_off)?,
            ..AnnotationsDirectory::default()
        };
        for (field_idx, offset) in field_entries {
            let field = self.items.field(field_idx)?;
            directory.fields.insert(field, self.annotation_set_at(offset)?);
        }
        for (method_idx, offset) in method_entries {
            let method = self.items.method(method_idx)?;
            directory
                .methods
                .insert(method, self.annotation_set_at(offset)?);
        }
        for (method_idx, offset) in parameter_entries {
            let method = self.items.method(method_idx)?;
            directory
                .parameters
                .insert(method, self.ref_list_at(offset)?);
        }
        Ok(directory)
    }

    fn directory_at(&mut self, offset: u32) -> Result<Arc<AnnotationsDirectory>> {
        if offset == 0 {
            return Ok(Arc::default());
        }
        cached_at!(self, offset, Directory, parse_directory)
    }

    fn debug_info_at(&mut self, offset: u32, code: &DexCode) -> Result<Option<DebugInfoRc>> {
        if offset == 0 {
            return Ok(None);
        }

        let debug_info = match self.cache.get(offset) {
            Some(CachedItem::DebugInfo(info)) => info.clone(),
            _ => {
                let mut parser = Parser::at(self.data, offset as usize)?;
                let info = Arc::new(DebugInfo::read(
                    &mut parser,
                    &self.items,
                    self.allow_pc_based_debug_info,
                )?);
                self.cache.insert(offset, CachedItem::DebugInfo(info.clone()));
                info
            }
        };

        if let DebugInfo::PcBased { max_pc, .. } = debug_info.as_ref() {
            let last = code.last_executable_offset().unwrap_or(0);
            if last > *max_pc {
                if let Some(info) = self.event_debug_cache.get(&offset) {
                    return Ok(Some(info.clone()));
                }
                let mut parser = Parser::at(self.data, offset as usize)?;
                let info = Arc::new(DebugInfo::read(&mut parser, &self.items, false)?);
                self.event_debug_cache.insert(offset, info.clone());
                return Ok(Some(info));
            }
        }
        Ok(Some(debug_info))
    }

    fn read_code(&mut self, offset: u32) -> Result<Option<DexCode>> {
        if offset == 0 {
            return Ok(None);
        }

        let mut parser = Parser::at(self.data, offset as usize)?;
        parser.align(4)?;
        let registers_size = parser.read_le::<u16>()?;
        let ins_size = parser.read_le::<u16>()?;
        let outs_size = parser.read_le::<u16>()?;
        let tries_size = parser.read_le::<u16>()?;
        let debug_info_off = parser.read_le::<u32>()?;
        let insns_size = parser.read_le::<u32>()? as usize;
        let units = parser.read_units(insns_size)?;

        let mut tries = Vec::with_capacity(usize::from(tries_size));
        let mut handlers = Vec::new();
        if tries_size > 0 {
            if insns_size % 2 != 0 {
                let _padding = parser.read_le::<u16>()?;
            }
            let mut raw_tries = Vec::with_capacity(usize::from(tries_size));
            for _ in 0..tries_size {
                let start_addr = parser.read_le::<u32>()?;
                let insn_count = parser.read_le::<u16>()?;
                let handler_off = parser.read_le::<u16>()?;
                raw_tries.push((start_addr, insn_count, handler_off));
            }

            let list_start = parser.pos();
            let handler_count = parser.read_uleb128()?;
            let mut handler_index_by_offset = HashMap::new();
            for index in 0..handler_count as usize {
                handler_index_by_offset.insert(parser.pos() - list_start, index);
                let size = parser.read_sleb128()?;
                let mut pairs = Vec::with_capacity(size.unsigned_abs() as usize);
                for _ in 0..size.unsigned_abs() {
                    let type_idx = parser.read_uleb128()?;
                    let addr = parser.read_uleb128()?;
                    pairs.push(TypeAddrPair {
                        ty: self.items.ty(type_idx)?,
                        addr,
                    });
                }
                let catch_all_addr = if size <= 0 {
                    Some(parser.read_uleb128()?)
                } else {
                    None
                };
                handlers.push(TryHandler {
                    pairs,
                    catch_all_addr,
                });
            }

            for (start_addr, insn_count, handler_off) in raw_tries {
                let handler_index = *handler_index_by_offset
                    .get(&usize::from(handler_off))
                    .ok_or_else(|| {
                        malformed_error!("No catch handler at list offset {}", handler_off)
                    })?;
                tries.push(TryItem {
                    start_addr,
                    insn_count,
                    handler_index,
                });
            }
        }

        let mut code = DexCode {
            registers_size,
            ins_size,
            outs_size,
            instructions: decode_instructions(&units, &self.items)?,
            tries,
            handlers,
            debug_info: None,
            highest_sorting_string: None,
        };
        code.debug_info = self.debug_info_at(debug_info_off, &code)?;
        Ok(Some(code))
    }

    fn read_fields(
        &mut self,
        parser: &mut Parser<'a>,
        size: u32,
        directory: &AnnotationsDirectory,
        static_values: Option<&EncodedArray>,
    ) -> Result<Vec<EncodedField>> {
        let mut fields = Vec::with_capacity(size as usize);
        let mut field_idx = 0u32;
        for index in 0..size as usize {
            field_idx = field_idx.wrapping_add(parser.read_uleb128()?);
            let access_flags = AccessFlags::from_bits_retain(parser.read_uleb128()?);
            let field = self.items.field(field_idx)?;
            let static_value = if access_flags.contains(AccessFlags::STATIC) {
                static_values.and_then(|values| values.values.get(index).cloned())
            } else {
                None
            };
            fields.push(EncodedField {
                annotations: directory.fields.get(&field).cloned().unwrap_or_default(),
                field,
                access_flags,
                static_value,
            });
        }
        Ok(fields)
    }

    fn read_methods(
        &mut self,
        parser: &mut Parser<'a>,
        size: u32,
        directory: &AnnotationsDirectory,
    ) -> Result<Vec<EncodedMethod>> {
        let mut methods = Vec::with_capacity(size as usize);
        let mut method_idx = 0u32;
        for _ in 0..size {
            method_idx = method_idx.wrapping_add(parser.read_uleb128()?);
            let access_flags = AccessFlags::from_bits_retain(parser.read_uleb128()?);
            let code_off = parser.read_uleb128()?;
            let method = self.items.method(method_idx)?;
            let code = self.read_code(code_off)?.map(Arc::new);
            methods.push(EncodedMethod {
                annotations: directory.methods.get(&method).cloned().unwrap_or_default(),
                parameter_annotations: directory
                    .parameters
                    .get(&method)
                    .cloned()
                    .unwrap_or_default(),
                method,
                access_flags,
                code,
            });
        }
        Ok(methods)
    }

    /// Decode all class definitions of this section.
    ///
    /// # Errors
    /// Returns an error if a class definition or anything it references is malformed.
    pub fn read_classes(&mut self) -> Result<Vec<DexProgramClass>> {
        let section = self.section(SectionKind::ClassDef);
        let mut classes = Vec::with_capacity(section.size as usize);

        for index in 0..section.size as usize {
            let mut parser = self.table_parser(SectionKind::ClassDef, index)?;
            let class_idx = parser.read_le::<u32>()?;
            let access_flags = AccessFlags::from_bits_retain(parser.read_le::<u32>()?);
            let superclass_idx = parser.read_le::<u32>()?;
            let interfaces_off = parser.read_le::<u32>()?;
            let source_file_idx = parser.read_le::<u32>()?;
            let annotations_off = parser.read_le::<u32>()?;
            let class_data_off = parser.read_le::<u32>()?;
            let static_values_off = parser.read_le::<u32>()?;

            let ty = self.items.ty(class_idx)?;
            let super_type = if superclass_idx == NO_INDEX {
                None
            } else {
                Some(self.items.ty(superclass_idx)?)
            };
            let source_file = if source_file_idx == NO_INDEX {
                None
            } else {
                Some(self.items.string(source_file_idx)?)
            };

            let directory = self.directory_at(annotations_off)?;
            let mut class = DexProgramClass::new(ty, access_flags, super_type);
            class.interfaces = self.type_list_at(interfaces_off)?.as_ref().clone();
            class.source_file = source_file;
            class.annotations = directory.class.clone();
            class.checksum = self.checksums.get(&class.descriptor()).copied();
            class.origin = Some(self.origin.clone());

            if class_data_off != 0 {
                let static_values = if static_values_off == 0 {
                    None
                } else {
                    Some(self.encoded_array_at(static_values_off)?)
                };

                let mut data = Parser::at(self.data, class_data_off as usize)?;
                let static_fields_size = data.read_uleb128()?;
                let instance_fields_size = data.read_uleb128()?;
                let direct_methods_size = data.read_uleb128()?;
                let virtual_methods_size = data.read_uleb128()?;

                class.static_fields = self.read_fields(
                    &mut data,
                    static_fields_size,
                    &directory,
                    static_values.as_deref(),
                )?;
                class.instance_fields =
                    self.read_fields(&mut data, instance_fields_size, &directory, None)?;
                class.direct_methods = self.read_methods(&mut data, direct_methods_size, &directory)?;
                class.virtual_methods =
                    self.read_methods(&mut data, virtual_methods_size, &directory)?;
            }

            classes.push(class);
        }

        log::debug!(
            "{}: read {} classes from section at 0x{:x}",
            self.origin,
            classes.len(),
            self.offset
        );
        Ok(classes)
    }
}
