//! Final index assignment for one output file.
//!
//! [`ObjectToOffsetMapping`] freezes the item set of a virtual file into the canonical table
//! order and answers index queries during encoding. Names are taken through the
//! [`NamingLens`], so a renamed type sorts by its output descriptor.
//!
//! Canonical orders:
//!
//! - strings by UTF-16 code units;
//! - types by the index of their descriptor string;
//! - protos by return type index, then by the parameter type indices;
//! - fields by (holder, name, type) and methods by (holder, name, proto);
//! - method handles by (kind, member index), call sites structurally.
//!
//! Classes are ordered so that a supertype or interface defined in the same file comes before
//! its subtypes; unrelated classes keep type order.

use std::{
    collections::{HashMap, HashSet},
    hash::Hash,
    sync::Arc,
};

use crate::{
    model::{
        class::ClassRc,
        collect::IndexedItemSet,
        items::{
            CallSiteRc, FieldRc, MethodHandleMember, MethodHandleRc, MethodRc, ProtoRc, TypeRc,
        },
        naming::NamingLens,
        string::StringRc,
        IndexLookup,
    },
    options::MAX_ENTRIES,
    Result,
};

/// One id table: items in index order plus the reverse lookup.
#[derive(Debug)]
struct IndexTable<T: Hash + Eq> {
    items: Vec<T>,
    indices: HashMap<T, u32>,
}

impl<T: Hash + Eq + Clone> IndexTable<T> {
    fn new(items: Vec<T>) -> IndexTable<T> {
        let indices = items
            .iter()
            .enumerate()
            .map(|(index, item)| (item.clone(), index as u32))
            .collect();
        IndexTable { items, indices }
    }

    fn index(&self, item: &T, kind: &str) -> Result<u32>
    where
        T: std::fmt::Debug,
    {
        self.indices
            .get(item)
            .copied()
            .ok_or_else(|| malformed_error!("{} {:?} is not part of this file", kind, item))
    }
}

impl<T: Hash + Eq> Default for IndexTable<T> {
    fn default() -> Self {
        IndexTable {
            items: Vec::new(),
            indices: HashMap::new(),
        }
    }
}

/// Frozen index tables of one output file.
pub struct ObjectToOffsetMapping {
    strings: IndexTable<StringRc>,
    types: IndexTable<TypeRc>,
    protos: IndexTable<ProtoRc>,
    fields: IndexTable<FieldRc>,
    methods: IndexTable<MethodRc>,
    method_handles: IndexTable<MethodHandleRc>,
    call_sites: IndexTable<CallSiteRc>,
    classes: Vec<ClassRc>,
}

impl ObjectToOffsetMapping {
    /// Build the tables for `items`, using its own strings.
    ///
    /// # Errors
    /// Returns an error if an item refers to something missing from `items`.
    pub fn new(items: &IndexedItemSet, lens: &dyn NamingLens) -> Result<ObjectToOffsetMapping> {
        let mut strings: Vec<StringRc> = items.strings.iter().cloned().collect();
        strings.sort();
        Self::with_strings(items, lens, strings)
    }

    /// Build the tables for `items` over an externally sorted string table.
    ///
    /// Used by container output, where all sections share the string table of the last one.
    ///
    /// # Errors
    /// Returns an error if an item refers to something missing from the tables.
    pub fn with_strings(
        items: &IndexedItemSet,
        lens: &dyn NamingLens,
        strings: Vec<StringRc>,
    ) -> Result<ObjectToOffsetMapping> {
        let mut mapping = ObjectToOffsetMapping {
            strings: IndexTable::new(strings),
            types: IndexTable::default(),
            protos: IndexTable::default(),
            fields: IndexTable::default(),
            methods: IndexTable::default(),
            method_handles: IndexTable::default(),
            call_sites: IndexTable::default(),
            classes: Vec::new(),
        };

        let mut types = items
            .types
            .iter()
            .map(|ty| Ok((mapping.string_index(&lens.lookup_descriptor(ty))?, ty.clone())))
            .collect::<Result<Vec<_>>>()?;
        types.sort_by_key(|(index, _)| *index);
        mapping.types = IndexTable::new(types.into_iter().map(|(_, ty)| ty).collect());

        let mut protos = items
            .protos
            .iter()
            .map(|proto| {
                let parameters = proto
                    .parameters
                    .iter()
                    .map(|ty| mapping.type_index(ty))
                    .collect::<Result<Vec<_>>>()?;
                Ok(((mapping.type_index(&proto.return_type)?, parameters), proto.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        protos.sort_by(|(a, _), (b, _)| a.cmp(b));
        mapping.protos = IndexTable::new(protos.into_iter().map(|(_, proto)| proto).collect());

        let mut fields = items
            .fields
            .iter()
            .map(|field| {
                let key = (
                    mapping.type_index(&field.holder)?,
                    mapping.string_index(&lens.lookup_field_name(field))?,
                    mapping.type_index(&field.ty)?,
                );
                Ok((key, field.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        fields.sort_by_key(|(key, _)| *key);
        mapping.fields = IndexTable::new(fields.into_iter().map(|(_, field)| field).collect());

        let mut methods = items
            .methods
            .iter()
            .map(|method| {
                let key = (
                    mapping.type_index(&method.holder)?,
                    mapping.string_index(&lens.lookup_method_name(method))?,
                    mapping.proto_index(&method.proto)?,
                );
                Ok((key, method.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        methods.sort_by_key(|(key, _)| *key);
        mapping.methods = IndexTable::new(methods.into_iter().map(|(_, method)| method).collect());

        let mut handles = items
            .method_handles
            .iter()
            .map(|handle| {
                let member = match &handle.member {
                    MethodHandleMember::Field(field) => mapping.field_index(field)?,
                    MethodHandleMember::Method(method) => mapping.method_index(method)?,
                };
                Ok(((handle.kind as u16, member), handle.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        handles.sort_by_key(|(key, _)| *key);
        mapping.method_handles =
            IndexTable::new(handles.into_iter().map(|(_, handle)| handle).collect());

        let mut call_sites: Vec<CallSiteRc> = items.call_sites.iter().cloned().collect();
        call_sites.sort();
        mapping.call_sites = IndexTable::new(call_sites);

        mapping.classes = mapping.sort_classes(&items.classes)?;
        Ok(mapping)
    }

    fn sort_classes(&self, classes: &[ClassRc]) -> Result<Vec<ClassRc>> {
        let mut by_index = classes
            .iter()
            .map(|class| Ok((self.type_index(&class.ty)?, class.clone())))
            .collect::<Result<Vec<_>>>()?;
        by_index.sort_by_key(|(index, _)| *index);

        let defined: HashMap<TypeRc, ClassRc> = by_index
            .iter()
            .map(|(_, class)| (class.ty.clone(), class.clone()))
            .collect();
        let mut visited = HashSet::with_capacity(classes.len());
        let mut ordered = Vec::with_capacity(classes.len());
        for (_, class) in &by_index {
            add_with_supertypes(class, &defined, &mut visited, &mut ordered);
        }
        Ok(ordered)
    }

    /// Strings in index order.
    #[must_use]
    pub fn strings(&self) -> &[StringRc] {
        &self.strings.items
    }

    /// Types in index order.
    #[must_use]
    pub fn types(&self) -> &[TypeRc] {
        &self.types.items
    }

    /// Protos in index order.
    #[must_use]
    pub fn protos(&self) -> &[ProtoRc] {
        &self.protos.items
    }

    /// Fields in index order.
    #[must_use]
    pub fn fields(&self) -> &[FieldRc] {
        &self.fields.items
    }

    /// Methods in index order.
    #[must_use]
    pub fn methods(&self) -> &[MethodRc] {
        &self.methods.items
    }

    /// Method handles in index order.
    #[must_use]
    pub fn method_handles(&self) -> &[MethodHandleRc] {
        &self.method_handles.items
    }

    /// Call sites in index order.
    #[must_use]
    pub fn call_sites(&self) -> &[CallSiteRc] {
        &self.call_sites.items
    }

    /// Classes in definition order.
    #[must_use]
    pub fn classes(&self) -> &[ClassRc] {
        &self.classes
    }

    /// The first string that needs a wide operand to be loaded, if any.
    ///
    /// With `force`, every string is treated as jumbo.
    #[must_use]
    pub fn first_jumbo_string(&self, force: bool) -> Option<&StringRc> {
        if force {
            self.strings.items.first()
        } else {
            self.strings.items.get(MAX_ENTRIES)
        }
    }
}

fn add_with_supertypes(
    class: &ClassRc,
    defined: &HashMap<TypeRc, ClassRc>,
    visited: &mut HashSet<TypeRc>,
    ordered: &mut Vec<ClassRc>,
) {
    if !visited.insert(class.ty.clone()) {
        return;
    }
    let supertypes = class.super_type.iter().chain(class.interfaces.iter());
    for supertype in supertypes {
        if let Some(parent) = defined.get(supertype) {
            add_with_supertypes(parent, defined, visited, ordered);
        }
    }
    ordered.push(class.clone());
}

impl IndexLookup for ObjectToOffsetMapping {
    fn string_index(&self, string: &StringRc) -> Result<u32> {
        self.strings.index(string, "String")
    }

    fn type_index(&self, ty: &TypeRc) -> Result<u32> {
        self.types.index(ty, "Type")
    }

    fn proto_index(&self, proto: &ProtoRc) -> Result<u32> {
        self.protos.index(proto, "Proto")
    }

    fn field_index(&self, field: &FieldRc) -> Result<u32> {
        self.fields.index(field, "Field")
    }

    fn method_index(&self, method: &MethodRc) -> Result<u32> {
        self.methods.index(method, "Method")
    }

    fn call_site_index(&self, call_site: &CallSiteRc) -> Result<u32> {
        self.call_sites.index(call_site, "Call site")
    }

    fn method_handle_index(&self, handle: &MethodHandleRc) -> Result<u32> {
        self.method_handles.index(handle, "Method handle")
    }
}

/// Sorted union of the strings of several files, for a shared container string table.
#[must_use]
pub fn shared_strings<'a>(items: impl IntoIterator<Item = &'a IndexedItemSet>) -> Vec<StringRc> {
    let mut strings: Vec<StringRc> = items
        .into_iter()
        .flat_map(|set| set.strings.iter().cloned())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    strings.sort();
    strings
}
