//! Serialization of one output file.
//!
//! [`FileWriter`] turns the classes of a virtual file, frozen in an [`ObjectToOffsetMapping`],
//! into the bytes of one container section:
//!
//! 1. [`FileWriter::check_interface_methods`] rejects interface members the target runtime
//!    cannot execute.
//! 2. [`FileWriter::collect`] registers every offset-addressed item in a
//!    [`MixedSectionCollection`], in the order chosen by the layout strategy.
//! 3. [`FileWriter::generate`] writes the data section, section by section, in the order
//!    debug info, code, type lists, string data, annotations, class data, encoded arrays,
//!    annotation sets, annotation set ref lists, annotations directories, map. The id tables
//!    and the header are filled in last, once every offset is known.
//!
//! [`FileWriter::write`] runs all three steps for a standalone file and seals it with the
//! signature and checksum.

use std::collections::HashMap;

use crate::{
    diagnostics::{DiagnosticCategory, Diagnostics},
    file::io::{write_sleb128, write_uleb128},
    model::{
        class::{static_values_of, ClassRc, DexProgramClass, EncodedField, EncodedMethod},
        code::{instruction::encode_instructions, CodeRc, DexCode},
        items::{MethodHandleMember, MethodRc, TypeRc},
        naming::NamingLens,
        values::{EncodedArray, EncodedValue},
        AccessFlags, IndexLookup,
    },
    reader::{
        header::{ENDIAN_CONSTANT, SIGNATURE_SIZE},
        sections::SectionKind,
    },
    writer::{
        buffer::DexOutputBuffer,
        integrity::update_signature_and_checksum,
        layout::Layout,
        mapping::ObjectToOffsetMapping,
        mixed::{AnnotationsDirectory, MixedSectionCollection, MixedSectionOffsets},
        strategy::MixedSectionLayoutStrategy,
    },
    Error, Options, Result,
};

const NO_INDEX: u32 = 0xffff_ffff;

fn narrow(kind: &'static str, index: u32) -> Result<u16> {
    u16::try_from(index).map_err(|_| Error::IndexOverflow {
        kind,
        index: index as usize,
    })
}

/// A finished section.
#[derive(Debug)]
pub struct GeneratedSection {
    /// Section bytes, starting with the header
    pub bytes: Vec<u8>,
    /// Where everything was placed
    pub layout: Layout,
}

/// Writer for the classes of one output file.
pub struct FileWriter<'a> {
    mapping: &'a ObjectToOffsetMapping,
    lens: &'a dyn NamingLens,
    options: &'a Options,
    strategy: &'a dyn MixedSectionLayoutStrategy,
    diagnostics: &'a Diagnostics,
    rewritten_code: Option<&'a HashMap<MethodRc, CodeRc>>,
}

impl<'a> FileWriter<'a> {
    /// Create a writer over a finished mapping.
    #[must_use]
    pub fn new(
        mapping: &'a ObjectToOffsetMapping,
        lens: &'a dyn NamingLens,
        options: &'a Options,
        strategy: &'a dyn MixedSectionLayoutStrategy,
        diagnostics: &'a Diagnostics,
    ) -> FileWriter<'a> {
        FileWriter {
            mapping,
            lens,
            options,
            strategy,
            diagnostics,
            rewritten_code: None,
        }
    }

    /// Use these code bodies instead of the ones stored on the methods.
    #[must_use]
    pub fn with_rewritten_code(mut self, code: &'a HashMap<MethodRc, CodeRc>) -> FileWriter<'a> {
        self.rewritten_code = Some(code);
        self
    }

    /// Check, collect and generate a standalone file.
    ///
    /// # Errors
    /// Returns [`Error::Capability`] for illegal interface members, or an error if an item
    /// cannot be encoded.
    pub fn write(&self) -> Result<Vec<u8>> {
        self.check_interface_methods()?;
        let collection = self.collect()?;
        let section = self.generate(&collection, 0, true)?;
        let mut bytes = section.bytes;
        let end = bytes.len();
        update_signature_and_checksum(&mut bytes, 0, end)?;
        Ok(bytes)
    }

    fn code_of(&self, method: &EncodedMethod) -> Option<CodeRc> {
        self.rewritten_code
            .and_then(|rewritten| rewritten.get(&method.method).cloned())
            .or_else(|| method.code.clone())
    }

    /// Reject interface members that the configured API level cannot run.
    ///
    /// Every violation is reported to the diagnostics; the first one is returned.
    ///
    /// # Errors
    /// Returns [`Error::Capability`] if any interface member is illegal.
    pub fn check_interface_methods(&self) -> Result<()> {
        let mut first = None;
        for class in self.mapping.classes().iter().filter(|c| c.is_interface()) {
            let violations = class
                .methods()
                .filter_map(|method| self.interface_method_violation(method))
                .chain(class.fields().filter_map(interface_field_violation));
            for message in violations {
                let descriptor = class.descriptor();
                self.diagnostics.error(
                    DiagnosticCategory::Capability,
                    format!("{descriptor}: {message}"),
                );
                first.get_or_insert(Error::Capability {
                    class: descriptor,
                    message,
                });
            }
        }
        match first {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn interface_method_violation(&self, method: &EncodedMethod) -> Option<String> {
        let name = &method.method.name;
        let level = self.options.min_api_level;
        if method.method.is_class_initializer() {
            return None;
        }
        if method.method.is_constructor() {
            return Some("Interfaces must not declare constructors".to_string());
        }
        if method.is_private() {
            return (!self.options.can_use_private_interface_methods()).then(|| {
                format!("Private interface method {name} is not supported at API level {level}")
            });
        }
        if !method.is_public() {
            return Some(format!("Interface method {name} must be public or private"));
        }
        if method.is_static() {
            return (!self.options.can_use_default_and_static_interface_methods()).then(|| {
                format!("Static interface method {name} is not supported at API level {level}")
            });
        }
        if !method.is_abstract() && !self.options.can_use_default_and_static_interface_methods()
        {
            return Some(format!(
                "Default interface method {name} is not supported at API level {level}"
            ));
        }
        None
    }

    fn sorted_fields<'c>(&self, fields: &'c [EncodedField]) -> Result<Vec<(u32, &'c EncodedField)>> {
        let mut sorted = fields
            .iter()
            .map(|field| Ok((self.mapping.field_index(&field.field)?, field)))
            .collect::<Result<Vec<_>>>()?;
        sorted.sort_by_key(|(index, _)| *index);
        Ok(sorted)
    }

    fn sorted_methods<'c>(
        &self,
        methods: &'c [EncodedMethod],
    ) -> Result<Vec<(u32, &'c EncodedMethod)>> {
        let mut sorted = methods
            .iter()
            .map(|method| Ok((self.mapping.method_index(&method.method)?, method)))
            .collect::<Result<Vec<_>>>()?;
        sorted.sort_by_key(|(index, _)| *index);
        Ok(sorted)
    }

    fn directory_of(&self, class: &DexProgramClass) -> Result<AnnotationsDirectory> {
        let mut directory = AnnotationsDirectory {
            class: (!class.annotations.is_empty()).then(|| class.annotations.clone()),
            ..AnnotationsDirectory::default()
        };
        for field in class.fields() {
            if !field.annotations.is_empty() {
                let index = self.mapping.field_index(&field.field)?;
                directory.fields.push((index, field.annotations.clone()));
            }
        }
        for method in class.methods() {
            if !method.annotations.is_empty() {
                let index = self.mapping.method_index(&method.method)?;
                directory.methods.push((index, method.annotations.clone()));
            }
            if !method.parameter_annotations.is_empty() {
                let index = self.mapping.method_index(&method.method)?;
                directory
                    .parameters
                    .push((index, method.parameter_annotations.clone()));
            }
        }
        directory.fields.sort_by_key(|(index, _)| *index);
        directory.methods.sort_by_key(|(index, _)| *index);
        directory.parameters.sort_by_key(|(index, _)| *index);
        Ok(directory)
    }

    fn static_values(&self, class: &DexProgramClass) -> Result<Option<EncodedArray>> {
        let sorted = self.sorted_fields(&class.static_fields)?;
        Ok(static_values_of(sorted.into_iter().map(|(_, field)| field)))
    }

    /// Register every offset-addressed item of the file.
    ///
    /// # Errors
    /// Returns an error if a member is missing from the mapping.
    pub fn collect(&self) -> Result<MixedSectionCollection> {
        let mut collection = MixedSectionCollection::default();
        for class in self.strategy.collection_order(self.mapping.classes()) {
            collection.add_type_list(&class.interfaces);
            collection.add_directory(&class.ty, self.directory_of(&class)?);
            if let Some(values) = self.static_values(&class)? {
                collection.add_static_values(&class.ty, values);
            }
            if class.has_members() {
                collection.add_class_data(&class);
            }
            for methods in [&class.direct_methods, &class.virtual_methods] {
                for (_, method) in self.sorted_methods(methods)? {
                    if let Some(code) = self.code_of(method) {
                        collection.add_code(&method.method, &code);
                    }
                }
            }
        }
        for proto in self.mapping.protos() {
            collection.add_type_list(&proto.parameters);
        }
        for call_site in self.mapping.call_sites() {
            let mut values = vec![
                EncodedValue::MethodHandle(call_site.bootstrap.clone()),
                EncodedValue::String(call_site.method_name.clone()),
                EncodedValue::MethodType(call_site.method_proto.clone()),
            ];
            values.extend(call_site.extra_args.iter().cloned());
            collection.add_call_site(call_site, EncodedArray::new(values));
        }
        Ok(collection)
    }

    /// Write the section starting at container offset `base`.
    ///
    /// Without `owns_strings`, no string ids or string data are written and the header refers
    /// to a string table placed later in the container.
    ///
    /// # Errors
    /// Returns an error if an item cannot be encoded.
    pub fn generate(
        &self,
        collection: &MixedSectionCollection,
        base: u32,
        owns_strings: bool,
    ) -> Result<GeneratedSection> {
        let version = self.options.dex_version();
        let mut layout = Layout::new(self.mapping, version, base, owns_strings);
        let mut buffer = DexOutputBuffer::new(base);
        let mut offsets = MixedSectionOffsets::default();
        buffer.move_to_offset(layout.data_off);

        self.write_debug_infos(collection, &mut buffer, &mut offsets, &mut layout)?;
        self.write_codes(collection, &mut buffer, &mut offsets, &mut layout)?;
        self.write_type_lists(collection, &mut buffer, &mut offsets, &mut layout)?;
        if owns_strings {
            self.write_string_data(&mut buffer, &mut offsets, &mut layout);
        }
        self.write_annotations(collection, &mut buffer, &mut offsets, &mut layout)?;
        self.write_class_data(collection, &mut buffer, &mut offsets, &mut layout)?;
        self.write_encoded_arrays(collection, &mut buffer, &mut offsets, &mut layout)?;
        self.write_annotation_sets(collection, &mut buffer, &mut offsets, &mut layout)?;
        self.write_ref_lists(collection, &mut buffer, &mut offsets, &mut layout)?;
        self.write_directories(collection, &mut buffer, &mut offsets, &mut layout)?;
        layout.write_map(&mut buffer);

        self.write_id_tables(collection, &offsets, &layout, &mut buffer)?;
        write_header(&layout, self.mapping, &mut buffer);

        log::debug!(
            "Generated section at 0x{:x}: {} bytes, {} classes, {} strings, {} methods",
            base,
            layout.file_size(),
            self.mapping.classes().len(),
            self.mapping.strings().len(),
            self.mapping.methods().len()
        );
        Ok(GeneratedSection {
            bytes: buffer.into_bytes(),
            layout,
        })
    }

    fn write_debug_infos(
        &self,
        collection: &MixedSectionCollection,
        buffer: &mut DexOutputBuffer,
        offsets: &mut MixedSectionOffsets,
        layout: &mut Layout,
    ) -> Result<()> {
        let start = buffer.offset();
        for debug_info in collection.debug_infos.iter() {
            offsets.set_debug_info(debug_info, buffer.offset());
            let mut out = Vec::new();
            debug_info.write(&mut out, self.mapping)?;
            buffer.put_bytes(&out);
        }
        layout.record(
            SectionKind::DebugInfo,
            collection.debug_infos.len() as u32,
            start,
        );
        Ok(())
    }

    fn write_codes(
        &self,
        collection: &MixedSectionCollection,
        buffer: &mut DexOutputBuffer,
        offsets: &mut MixedSectionOffsets,
        layout: &mut Layout,
    ) -> Result<()> {
        buffer.align(4);
        let start = buffer.offset();
        let mut written: HashMap<CodeRc, u32> = HashMap::new();
        let mut count = 0u32;
        for (method, code) in &collection.codes {
            if self.options.canonicalize_code {
                if let Some(offset) = written.get(code) {
                    offsets.set_code(method, *offset);
                    continue;
                }
            }
            buffer.align(4);
            let offset = buffer.offset();
            self.write_code(code, offsets, buffer)?;
            offsets.set_code(method, offset);
            count += 1;
            if self.options.canonicalize_code {
                written.insert(code.clone(), offset);
            }
        }
        layout.record(SectionKind::Code, count, start);
        Ok(())
    }

    fn write_code(
        &self,
        code: &DexCode,
        offsets: &MixedSectionOffsets,
        buffer: &mut DexOutputBuffer,
    ) -> Result<()> {
        let units = encode_instructions(&code.instructions, self.mapping)?;
        let tries_size = u16::try_from(code.tries.len())
            .map_err(|_| malformed_error!("{} try items do not fit a code item", code.tries.len()))?;

        buffer.put_u16(code.registers_size);
        buffer.put_u16(code.ins_size);
        buffer.put_u16(code.outs_size);
        buffer.put_u16(tries_size);
        buffer.put_u32(offsets.debug_info(code.debug_info.as_deref())?);
        buffer.put_u32(units.len() as u32);
        buffer.put_units(&units);
        if code.tries.is_empty() {
            return Ok(());
        }

        if units.len() % 2 != 0 {
            buffer.put_u16(0);
        }

        let mut handlers = Vec::new();
        let mut handler_offsets = Vec::with_capacity(code.handlers.len());
        write_uleb128(&mut handlers, code.handlers.len() as u32);
        for handler in &code.handlers {
            handler_offsets.push(handlers.len());
            let size = handler.pairs.len() as i32;
            write_sleb128(
                &mut handlers,
                if handler.catch_all_addr.is_some() {
                    -size
                } else {
                    size
                },
            );
            for pair in &handler.pairs {
                write_uleb128(&mut handlers, self.mapping.type_index(&pair.ty)?);
                write_uleb128(&mut handlers, pair.addr);
            }
            if let Some(addr) = handler.catch_all_addr {
                write_uleb128(&mut handlers, addr);
            }
        }

        for try_item in &code.tries {
            let handler_offset = handler_offsets
                .get(try_item.handler_index)
                .ok_or_else(|| malformed_error!("No handler {}", try_item.handler_index))?;
            buffer.put_u32(try_item.start_addr);
            buffer.put_u16(try_item.insn_count);
            buffer.put_u16(
                u16::try_from(*handler_offset)
                    .map_err(|_| malformed_error!("Handler list too large for a code item"))?,
            );
        }
        buffer.put_bytes(&handlers);
        Ok(())
    }

    fn write_type_lists(
        &self,
        collection: &MixedSectionCollection,
        buffer: &mut DexOutputBuffer,
        offsets: &mut MixedSectionOffsets,
        layout: &mut Layout,
    ) -> Result<()> {
        buffer.align(4);
        let start = buffer.offset();
        for list in collection.type_lists.iter() {
            buffer.align(4);
            offsets.set_type_list(list, buffer.offset());
            buffer.put_u32(list.len() as u32);
            for ty in list {
                buffer.put_u16(narrow("type", self.mapping.type_index(ty)?)?);
            }
        }
        layout.record(
            SectionKind::TypeList,
            collection.type_lists.len() as u32,
            start,
        );
        Ok(())
    }

    fn write_string_data(
        &self,
        buffer: &mut DexOutputBuffer,
        offsets: &mut MixedSectionOffsets,
        layout: &mut Layout,
    ) {
        let start = buffer.offset();
        for string in self.mapping.strings() {
            offsets.push_string_data(buffer.offset());
            buffer.put_uleb128(string.size());
            buffer.put_bytes(string.content());
            buffer.put_u8(0);
        }
        layout.record(
            SectionKind::StringData,
            self.mapping.strings().len() as u32,
            start,
        );
    }

    fn write_annotations(
        &self,
        collection: &MixedSectionCollection,
        buffer: &mut DexOutputBuffer,
        offsets: &mut MixedSectionOffsets,
        layout: &mut Layout,
    ) -> Result<()> {
        let start = buffer.offset();
        for annotation in collection.annotations.iter() {
            offsets.set_annotation(annotation, buffer.offset());
            let mut out = vec![annotation.visibility as u8];
            annotation.annotation.write(&mut out, self.mapping)?;
            buffer.put_bytes(&out);
        }
        layout.record(
            SectionKind::Annotation,
            collection.annotations.len() as u32,
            start,
        );
        Ok(())
    }

    fn write_class_data(
        &self,
        collection: &MixedSectionCollection,
        buffer: &mut DexOutputBuffer,
        offsets: &mut MixedSectionOffsets,
        layout: &mut Layout,
    ) -> Result<()> {
        let start = buffer.offset();
        for class in &collection.class_data {
            offsets.set_class_data(&class.ty, buffer.offset());
            let static_fields = self.sorted_fields(&class.static_fields)?;
            let instance_fields = self.sorted_fields(&class.instance_fields)?;
            let direct_methods = self.sorted_methods(&class.direct_methods)?;
            let virtual_methods = self.sorted_methods(&class.virtual_methods)?;

            buffer.put_uleb128(static_fields.len() as u32);
            buffer.put_uleb128(instance_fields.len() as u32);
            buffer.put_uleb128(direct_methods.len() as u32);
            buffer.put_uleb128(virtual_methods.len() as u32);
            for fields in [&static_fields, &instance_fields] {
                let mut previous = 0;
                for (index, field) in fields {
                    buffer.put_uleb128(index - previous);
                    buffer.put_uleb128(field.access_flags.bits());
                    previous = *index;
                }
            }
            for methods in [&direct_methods, &virtual_methods] {
                let mut previous = 0;
                for (index, method) in methods {
                    buffer.put_uleb128(index - previous);
                    buffer.put_uleb128(method.access_flags.bits());
                    buffer.put_uleb128(offsets.code(&method.method));
                    previous = *index;
                }
            }
        }
        layout.record(
            SectionKind::ClassData,
            collection.class_data.len() as u32,
            start,
        );
        Ok(())
    }

    fn write_encoded_arrays(
        &self,
        collection: &MixedSectionCollection,
        buffer: &mut DexOutputBuffer,
        offsets: &mut MixedSectionOffsets,
        layout: &mut Layout,
    ) -> Result<()> {
        let start = buffer.offset();
        for array in collection.encoded_arrays.iter() {
            offsets.set_encoded_array(array, buffer.offset());
            let mut out = Vec::new();
            array.write(&mut out, self.mapping)?;
            buffer.put_bytes(&out);
        }
        layout.record(
            SectionKind::EncodedArray,
            collection.encoded_arrays.len() as u32,
            start,
        );
        Ok(())
    }

    fn write_annotation_sets(
        &self,
        collection: &MixedSectionCollection,
        buffer: &mut DexOutputBuffer,
        offsets: &mut MixedSectionOffsets,
        layout: &mut Layout,
    ) -> Result<()> {
        buffer.align(4);
        let start = buffer.offset();
        for set in collection.annotation_sets.iter() {
            buffer.align(4);
            offsets.set_annotation_set(set, buffer.offset());
            let mut entries = set
                .annotations
                .iter()
                .map(|annotation| {
                    Ok((
                        self.mapping.type_index(&annotation.annotation.ty)?,
                        offsets.annotation(annotation)?,
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            entries.sort_by_key(|(index, _)| *index);
            buffer.put_u32(entries.len() as u32);
            for (_, offset) in entries {
                buffer.put_u32(offset);
            }
        }
        layout.record(
            SectionKind::AnnotationSet,
            collection.annotation_sets.len() as u32,
            start,
        );
        Ok(())
    }

    fn write_ref_lists(
        &self,
        collection: &MixedSectionCollection,
        buffer: &mut DexOutputBuffer,
        offsets: &mut MixedSectionOffsets,
        layout: &mut Layout,
    ) -> Result<()> {
        buffer.align(4);
        let start = buffer.offset();
        for list in collection.ref_lists.iter() {
            buffer.align(4);
            offsets.set_ref_list(list, buffer.offset());
            buffer.put_u32(list.sets.len() as u32);
            for set in &list.sets {
                buffer.put_u32(offsets.annotation_set(set)?);
            }
        }
        layout.record(
            SectionKind::AnnotationSetRefList,
            collection.ref_lists.len() as u32,
            start,
        );
        Ok(())
    }

    fn write_directories(
        &self,
        collection: &MixedSectionCollection,
        buffer: &mut DexOutputBuffer,
        offsets: &mut MixedSectionOffsets,
        layout: &mut Layout,
    ) -> Result<()> {
        buffer.align(4);
        let start = buffer.offset();
        for directory in collection.directories.iter() {
            buffer.align(4);
            offsets.set_directory(directory, buffer.offset());
            let class_set = match &directory.class {
                Some(set) => offsets.annotation_set(set)?,
                None => 0,
            };
            buffer.put_u32(class_set);
            buffer.put_u32(directory.fields.len() as u32);
            buffer.put_u32(directory.methods.len() as u32);
            buffer.put_u32(directory.parameters.len() as u32);
            for (index, set) in directory.fields.iter().chain(&directory.methods) {
                buffer.put_u32(*index);
                buffer.put_u32(offsets.annotation_set(set)?);
            }
            for (index, list) in &directory.parameters {
                buffer.put_u32(*index);
                buffer.put_u32(offsets.ref_list(list)?);
            }
        }
        layout.record(
            SectionKind::AnnotationsDirectory,
            collection.directories.len() as u32,
            start,
        );
        Ok(())
    }

    fn type_index16(&self, ty: &TypeRc) -> Result<u16> {
        narrow("type", self.mapping.type_index(ty)?)
    }

    fn write_id_tables(
        &self,
        collection: &MixedSectionCollection,
        offsets: &MixedSectionOffsets,
        layout: &Layout,
        buffer: &mut DexOutputBuffer,
    ) -> Result<()> {
        let mapping = self.mapping;

        if layout.owns_strings {
            buffer.move_to_offset(layout.string_ids_off);
            for offset in offsets.string_data() {
                buffer.put_u32(*offset);
            }
        }

        buffer.move_to_offset(layout.type_ids_off);
        for ty in mapping.types() {
            buffer.put_u32(mapping.string_index(&self.lens.lookup_descriptor(ty))?);
        }

        buffer.move_to_offset(layout.proto_ids_off);
        for proto in mapping.protos() {
            buffer.put_u32(mapping.string_index(&proto.shorty)?);
            buffer.put_u32(mapping.type_index(&proto.return_type)?);
            buffer.put_u32(offsets.type_list(&proto.parameters)?);
        }

        buffer.move_to_offset(layout.field_ids_off);
        for field in mapping.fields() {
            buffer.put_u16(self.type_index16(&field.holder)?);
            buffer.put_u16(self.type_index16(&field.ty)?);
            buffer.put_u32(mapping.string_index(&self.lens.lookup_field_name(field))?);
        }

        buffer.move_to_offset(layout.method_ids_off);
        for method in mapping.methods() {
            buffer.put_u16(self.type_index16(&method.holder)?);
            buffer.put_u16(narrow("proto", mapping.proto_index(&method.proto)?)?);
            buffer.put_u32(mapping.string_index(&self.lens.lookup_method_name(method))?);
        }

        buffer.move_to_offset(layout.class_defs_off);
        for class in mapping.classes() {
            self.write_class_def(class, collection, offsets, buffer)?;
        }

        buffer.move_to_offset(layout.call_site_ids_off);
        for call_site in mapping.call_sites() {
            buffer.put_u32(offsets.encoded_array(collection.call_site_array(call_site))?);
        }

        buffer.move_to_offset(layout.method_handles_off);
        for handle in mapping.method_handles() {
            let member = match &handle.member {
                MethodHandleMember::Field(field) => mapping.field_index(field)?,
                MethodHandleMember::Method(method) => mapping.method_index(method)?,
            };
            buffer.put_u16(handle.kind as u16);
            buffer.put_u16(0);
            buffer.put_u16(narrow("method handle member", member)?);
            buffer.put_u16(0);
        }
        Ok(())
    }

    fn write_class_def(
        &self,
        class: &ClassRc,
        collection: &MixedSectionCollection,
        offsets: &MixedSectionOffsets,
        buffer: &mut DexOutputBuffer,
    ) -> Result<()> {
        let mapping = self.mapping;
        let super_index = match &class.super_type {
            Some(super_type) => mapping.type_index(super_type)?,
            None => NO_INDEX,
        };
        let source_file = match &class.source_file {
            Some(source_file) => mapping.string_index(source_file)?,
            None => NO_INDEX,
        };

        buffer.put_u32(mapping.type_index(&class.ty)?);
        buffer.put_u32(class.access_flags.bits());
        buffer.put_u32(super_index);
        buffer.put_u32(offsets.type_list(&class.interfaces)?);
        buffer.put_u32(source_file);
        buffer.put_u32(offsets.directory(collection.directory_of(&class.ty))?);
        buffer.put_u32(offsets.class_data(&class.ty));
        buffer.put_u32(offsets.encoded_array(collection.static_values_of(&class.ty))?);
        Ok(())
    }
}

fn interface_field_violation(field: &EncodedField) -> Option<String> {
    (!field.access_flags.contains(AccessFlags::PUBLIC))
        .then(|| format!("Interface field {} must be public", field.field.name))
}

/// Fill in the header of the section described by `layout`.
///
/// The checksum and signature are left zero. A container header reports its own size as the
/// container size until the container is assembled.
fn write_header(layout: &Layout, mapping: &ObjectToOffsetMapping, buffer: &mut DexOutputBuffer) {
    let file_size = layout.file_size();

    buffer.move_to(0);
    buffer.put_bytes(&layout.version.magic());
    buffer.put_u32(0);
    buffer.put_bytes(&[0u8; SIGNATURE_SIZE]);
    buffer.put_u32(file_size);
    buffer.put_u32(layout.version.header_size() as u32);
    buffer.put_u32(ENDIAN_CONSTANT);
    buffer.put_u32(0);
    buffer.put_u32(0);
    buffer.put_u32(layout.map_off);

    let tables = [
        (mapping.strings().len(), layout.string_ids_off),
        (mapping.types().len(), layout.type_ids_off),
        (mapping.protos().len(), layout.proto_ids_off),
        (mapping.fields().len(), layout.field_ids_off),
        (mapping.methods().len(), layout.method_ids_off),
        (mapping.classes().len(), layout.class_defs_off),
    ];
    for (size, offset) in tables {
        buffer.put_u32(size as u32);
        buffer.put_u32(offset);
    }

    if layout.version.is_container() {
        buffer.put_u32(0);
        buffer.put_u32(0);
        buffer.put_u32(file_size);
        buffer.put_u32(layout.base);
    } else {
        buffer.put_u32(layout.end - layout.data_off);
        buffer.put_u32(layout.data_off);
    }
}
