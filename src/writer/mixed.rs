//! The data section: offset-addressed items of one output file.
//!
//! Writing happens in two passes. The collect pass walks the classes of a file and registers
//! every offset-addressed item in a [`MixedSectionCollection`], which only records presence and
//! registration order and deduplicates structurally equal items. The generate pass writes each
//! section in turn and records where every item landed in [`MixedSectionOffsets`], so that
//! items written later can refer to items written earlier.
//!
//! Empty type lists, annotation sets and parameter annotation lists are never registered; they
//! are referenced with offset 0.

use std::{
    borrow::Borrow,
    collections::{HashMap, HashSet},
    fmt::Debug,
    hash::Hash,
    sync::Arc,
};

use crate::{
    model::{
        annotations::{AnnotationSet, DexAnnotation, ParameterAnnotations},
        class::ClassRc,
        code::CodeRc,
        debug::{DebugInfo, DebugInfoRc},
        items::{CallSiteRc, MethodRc, TypeList, TypeRc},
        values::EncodedArray,
    },
    Result,
};

/// Insertion-ordered set.
#[derive(Debug, Clone)]
pub struct OrderedSet<T> {
    items: Vec<T>,
    seen: HashSet<T>,
}

impl<T> Default for OrderedSet<T> {
    fn default() -> Self {
        OrderedSet {
            items: Vec::new(),
            seen: HashSet::new(),
        }
    }
}

impl<T: Hash + Eq + Clone> OrderedSet<T> {
    /// Add `item`, returning whether it was new.
    pub fn add(&mut self, item: T) -> bool {
        if self.seen.insert(item.clone()) {
            self.items.push(item);
            true
        } else {
            false
        }
    }

    /// Items in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Number of distinct items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Annotations of a class and its members, keyed by output indices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AnnotationsDirectory {
    /// Class annotations
    pub class: Option<Arc<AnnotationSet>>,
    /// (field index, annotations), sorted by index
    pub fields: Vec<(u32, Arc<AnnotationSet>)>,
    /// (method index, annotations), sorted by index
    pub methods: Vec<(u32, Arc<AnnotationSet>)>,
    /// (method index, parameter annotations), sorted by index
    pub parameters: Vec<(u32, Arc<ParameterAnnotations>)>,
}

impl AnnotationsDirectory {
    /// Returns `true` if the directory holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.class.is_none()
            && self.fields.is_empty()
            && self.methods.is_empty()
            && self.parameters.is_empty()
    }
}

/// Everything the data section of one file has to hold, in registration order.
#[derive(Debug, Default)]
pub struct MixedSectionCollection {
    /// Interface lists and proto parameter lists
    pub type_lists: OrderedSet<TypeList>,
    /// Individual annotations
    pub annotations: OrderedSet<Arc<DexAnnotation>>,
    /// Annotation sets
    pub annotation_sets: OrderedSet<Arc<AnnotationSet>>,
    /// Parameter annotation lists
    pub ref_lists: OrderedSet<Arc<ParameterAnnotations>>,
    /// Class annotation directories
    pub directories: OrderedSet<Arc<AnnotationsDirectory>>,
    /// Static values and call site arrays
    pub encoded_arrays: OrderedSet<Arc<EncodedArray>>,
    /// Debug info programs
    pub debug_infos: OrderedSet<DebugInfoRc>,
    /// Code bodies with their owning method
    pub codes: Vec<(MethodRc, CodeRc)>,
    /// Classes that have members
    pub class_data: Vec<ClassRc>,
    class_directories: HashMap<TypeRc, Arc<AnnotationsDirectory>>,
    class_static_values: HashMap<TypeRc, Arc<EncodedArray>>,
    call_site_arrays: HashMap<CallSiteRc, Arc<EncodedArray>>,
}

impl MixedSectionCollection {
    /// Register a type list. Empty lists are skipped.
    pub fn add_type_list(&mut self, list: &TypeList) {
        if !list.is_empty() {
            self.type_lists.add(list.clone());
        }
    }

    /// Register an annotation set and its annotations. Empty sets are skipped.
    pub fn add_annotation_set(&mut self, set: &Arc<AnnotationSet>) {
        if set.is_empty() || !self.annotation_sets.add(set.clone()) {
            return;
        }
        for annotation in &set.annotations {
            self.annotations.add(annotation.clone());
        }
    }

    /// Register a parameter annotation list and its non-empty sets.
    pub fn add_ref_list(&mut self, list: &Arc<ParameterAnnotations>) {
        if list.is_empty() || !self.ref_lists.add(list.clone()) {
            return;
        }
        for set in &list.sets {
            self.add_annotation_set(set);
        }
    }

    /// Register the annotations directory of class `ty`.
    pub fn add_directory(&mut self, ty: &TypeRc, directory: AnnotationsDirectory) {
        if directory.is_empty() {
            return;
        }
        if let Some(set) = &directory.class {
            self.add_annotation_set(set);
        }
        for (_, set) in &directory.fields {
            self.add_annotation_set(set);
        }
        for (_, set) in &directory.methods {
            self.add_annotation_set(set);
        }
        for (_, list) in &directory.parameters {
            self.add_ref_list(list);
        }
        let directory = Arc::new(directory);
        self.directories.add(directory.clone());
        self.class_directories.insert(ty.clone(), directory);
    }

    /// Register the static values of class `ty`.
    pub fn add_static_values(&mut self, ty: &TypeRc, values: EncodedArray) {
        let values = Arc::new(values);
        self.encoded_arrays.add(values.clone());
        self.class_static_values.insert(ty.clone(), values);
    }

    /// Register the encoded array describing `call_site`.
    pub fn add_call_site(&mut self, call_site: &CallSiteRc, array: EncodedArray) {
        let array = Arc::new(array);
        self.encoded_arrays.add(array.clone());
        self.call_site_arrays.insert(call_site.clone(), array);
    }

    /// Register the code of `method` and its debug info.
    pub fn add_code(&mut self, method: &MethodRc, code: &CodeRc) {
        if let Some(debug_info) = &code.debug_info {
            self.debug_infos.add(debug_info.clone());
        }
        self.codes.push((method.clone(), code.clone()));
    }

    /// Register the class data of `class`.
    pub fn add_class_data(&mut self, class: &ClassRc) {
        self.class_data.push(class.clone());
    }

    /// The annotations directory registered for class `ty`.
    #[must_use]
    pub fn directory_of(&self, ty: &TypeRc) -> Option<&Arc<AnnotationsDirectory>> {
        self.class_directories.get(ty)
    }

    /// The static values registered for class `ty`.
    #[must_use]
    pub fn static_values_of(&self, ty: &TypeRc) -> Option<&Arc<EncodedArray>> {
        self.class_static_values.get(ty)
    }

    /// The encoded array registered for `call_site`.
    #[must_use]
    pub fn call_site_array(&self, call_site: &CallSiteRc) -> Option<&Arc<EncodedArray>> {
        self.call_site_arrays.get(call_site)
    }
}

fn lookup<K, Q>(map: &HashMap<K, u32>, key: &Q, kind: &str) -> Result<u32>
where
    K: Hash + Eq + Borrow<Q>,
    Q: Hash + Eq + Debug + ?Sized,
{
    map.get(key)
        .copied()
        .ok_or_else(|| malformed_error!("{} {:?} was not written", kind, key))
}

/// Where each data section item was written.
#[derive(Debug, Default)]
pub struct MixedSectionOffsets {
    type_lists: HashMap<TypeList, u32>,
    annotations: HashMap<Arc<DexAnnotation>, u32>,
    annotation_sets: HashMap<Arc<AnnotationSet>, u32>,
    ref_lists: HashMap<Arc<ParameterAnnotations>, u32>,
    directories: HashMap<Arc<AnnotationsDirectory>, u32>,
    encoded_arrays: HashMap<Arc<EncodedArray>, u32>,
    debug_infos: HashMap<DebugInfoRc, u32>,
    codes: HashMap<MethodRc, u32>,
    class_data: HashMap<TypeRc, u32>,
    string_data: Vec<u32>,
}

impl MixedSectionOffsets {
    pub(crate) fn set_type_list(&mut self, list: &TypeList, offset: u32) {
        self.type_lists.insert(list.clone(), offset);
    }

    pub(crate) fn set_annotation(&mut self, annotation: &Arc<DexAnnotation>, offset: u32) {
        self.annotations.insert(annotation.clone(), offset);
    }

    pub(crate) fn set_annotation_set(&mut self, set: &Arc<AnnotationSet>, offset: u32) {
        self.annotation_sets.insert(set.clone(), offset);
    }

    pub(crate) fn set_ref_list(&mut self, list: &Arc<ParameterAnnotations>, offset: u32) {
        self.ref_lists.insert(list.clone(), offset);
    }

    pub(crate) fn set_directory(&mut self, directory: &Arc<AnnotationsDirectory>, offset: u32) {
        self.directories.insert(directory.clone(), offset);
    }

    pub(crate) fn set_encoded_array(&mut self, array: &Arc<EncodedArray>, offset: u32) {
        self.encoded_arrays.insert(array.clone(), offset);
    }

    pub(crate) fn set_debug_info(&mut self, debug_info: &DebugInfoRc, offset: u32) {
        self.debug_infos.insert(debug_info.clone(), offset);
    }

    pub(crate) fn set_code(&mut self, method: &MethodRc, offset: u32) {
        self.codes.insert(method.clone(), offset);
    }

    pub(crate) fn set_class_data(&mut self, ty: &TypeRc, offset: u32) {
        self.class_data.insert(ty.clone(), offset);
    }

    pub(crate) fn push_string_data(&mut self, offset: u32) {
        self.string_data.push(offset);
    }

    /// Offset of a type list, 0 when empty.
    ///
    /// # Errors
    /// Returns an error if a non-empty list was not written.
    pub fn type_list(&self, list: &TypeList) -> Result<u32> {
        if list.is_empty() {
            return Ok(0);
        }
        lookup(&self.type_lists, list, "Type list")
    }

    /// Offset of an annotation.
    ///
    /// # Errors
    /// Returns an error if the annotation was not written.
    pub fn annotation(&self, annotation: &DexAnnotation) -> Result<u32> {
        lookup(&self.annotations, annotation, "Annotation")
    }

    /// Offset of an annotation set, 0 when empty.
    ///
    /// # Errors
    /// Returns an error if a non-empty set was not written.
    pub fn annotation_set(&self, set: &AnnotationSet) -> Result<u32> {
        if set.is_empty() {
            return Ok(0);
        }
        lookup(&self.annotation_sets, set, "Annotation set")
    }

    /// Offset of a parameter annotation list, 0 when empty.
    ///
    /// # Errors
    /// Returns an error if a non-empty list was not written.
    pub fn ref_list(&self, list: &ParameterAnnotations) -> Result<u32> {
        if list.is_empty() {
            return Ok(0);
        }
        lookup(&self.ref_lists, list, "Annotation set ref list")
    }

    /// Offset of an annotations directory, 0 when absent.
    ///
    /// # Errors
    /// Returns an error if the directory was not written.
    pub fn directory(&self, directory: Option<&Arc<AnnotationsDirectory>>) -> Result<u32> {
        match directory {
            Some(directory) => lookup(&self.directories, directory.as_ref(), "Directory"),
            None => Ok(0),
        }
    }

    /// Offset of an encoded array, 0 when absent.
    ///
    /// # Errors
    /// Returns an error if the array was not written.
    pub fn encoded_array(&self, array: Option<&Arc<EncodedArray>>) -> Result<u32> {
        match array {
            Some(array) => lookup(&self.encoded_arrays, array.as_ref(), "Encoded array"),
            None => Ok(0),
        }
    }

    /// Offset of a debug info program, 0 when absent.
    ///
    /// # Errors
    /// Returns an error if the program was not written.
    pub fn debug_info(&self, debug_info: Option<&DebugInfo>) -> Result<u32> {
        match debug_info {
            Some(debug_info) => lookup(&self.debug_infos, debug_info, "Debug info"),
            None => Ok(0),
        }
    }

    /// Offset of the code of `method`, 0 when it has none.
    #[must_use]
    pub fn code(&self, method: &MethodRc) -> u32 {
        self.codes.get(method).copied().unwrap_or(0)
    }

    /// Offset of the class data of `ty`, 0 when the class has no members.
    #[must_use]
    pub fn class_data(&self, ty: &TypeRc) -> u32 {
        self.class_data.get(ty).copied().unwrap_or(0)
    }

    /// Offsets of the string data items, by string index.
    #[must_use]
    pub fn string_data(&self) -> &[u32] {
        &self.string_data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        annotations::AnnotationVisibility, values::EncodedAnnotation, ItemFactory,
    };

    fn annotation(factory: &ItemFactory, descriptor: &str) -> Arc<DexAnnotation> {
        Arc::new(DexAnnotation {
            visibility: AnnotationVisibility::Runtime,
            annotation: EncodedAnnotation {
                ty: factory.create_type(descriptor),
                elements: Vec::new(),
            },
        })
    }

    #[test]
    fn test_structural_deduplication() {
        let factory = ItemFactory::new();
        let mut collection = MixedSectionCollection::default();

        let first = Arc::new(AnnotationSet::new(vec![annotation(&factory, "LA;")]));
        let second = Arc::new(AnnotationSet::new(vec![annotation(&factory, "LA;")]));
        collection.add_annotation_set(&first);
        collection.add_annotation_set(&second);
        collection.add_annotation_set(&Arc::default());
        assert_eq!(collection.annotation_sets.len(), 1);
        assert_eq!(collection.annotations.len(), 1);

        collection.add_type_list(&vec![factory.create_type("I")]);
        collection.add_type_list(&vec![factory.create_type("I")]);
        collection.add_type_list(&Vec::new());
        assert_eq!(collection.type_lists.len(), 1);
    }

    #[test]
    fn test_directory_registers_members() {
        let factory = ItemFactory::new();
        let ty = factory.create_type("LHolder;");
        let set = Arc::new(AnnotationSet::new(vec![annotation(&factory, "LB;")]));
        let mut collection = MixedSectionCollection::default();

        collection.add_directory(
            &ty,
            AnnotationsDirectory {
                methods: vec![(3, set.clone())],
                parameters: vec![(
                    3,
                    Arc::new(ParameterAnnotations {
                        sets: vec![Arc::default(), set],
                    }),
                )],
                ..AnnotationsDirectory::default()
            },
        );
        collection.add_directory(&factory.create_type("LEmpty;"), AnnotationsDirectory::default());

        assert_eq!(collection.directories.len(), 1);
        assert_eq!(collection.ref_lists.len(), 1);
        assert_eq!(collection.annotation_sets.len(), 1);
        assert!(collection.directory_of(&ty).is_some());
    }

    #[test]
    fn test_empty_items_have_offset_zero() {
        let offsets = MixedSectionOffsets::default();
        assert_eq!(offsets.type_list(&Vec::new()).unwrap(), 0);
        assert_eq!(offsets.annotation_set(&AnnotationSet::default()).unwrap(), 0);
        assert_eq!(offsets.directory(None).unwrap(), 0);
        assert!(offsets
            .type_list(&vec![ItemFactory::new().create_type("I")])
            .is_err());
    }
}
