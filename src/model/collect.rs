//! Closure computation over the items a class references.
//!
//! Adding a class to an output file pulls in every indexable item reachable from it: its own
//! type, member references and their components, items referenced by code, annotations, static
//! values and debug info. Names go through the [`NamingLens`], so the string closure of a file
//! contains the output names.
//!
//! Every `add_*` of an [`IndexedItemCollection`] returns whether the item was new. Components of
//! an item are only visited when the item itself was new, which keeps the walk linear.

use std::collections::HashSet;

use crate::model::{
    class::{ClassRc, DexProgramClass},
    code::{instruction::ItemRef, DexCode},
    debug::DebugInfo,
    items::{
        CallSiteRc, FieldRc, MethodHandleMember, MethodHandleRc, MethodRc, ProtoRc, TypeRc,
    },
    naming::NamingLens,
    string::StringRc,
    values::{EncodedAnnotation, EncodedValue},
};

/// A sink for indexable items.
pub trait IndexedItemCollection {
    /// Add a class definition.
    fn add_class(&mut self, class: &ClassRc) -> bool;
    /// Add a string.
    fn add_string(&mut self, string: &StringRc) -> bool;
    /// Add a type.
    fn add_type(&mut self, ty: &TypeRc) -> bool;
    /// Add a proto.
    fn add_proto(&mut self, proto: &ProtoRc) -> bool;
    /// Add a field.
    fn add_field(&mut self, field: &FieldRc) -> bool;
    /// Add a method.
    fn add_method(&mut self, method: &MethodRc) -> bool;
    /// Add a call site.
    fn add_call_site(&mut self, call_site: &CallSiteRc) -> bool;
    /// Add a method handle.
    fn add_method_handle(&mut self, handle: &MethodHandleRc) -> bool;
}

/// A plain set of indexable items.
#[derive(Debug, Clone, Default)]
pub struct IndexedItemSet {
    /// Class definitions, in insertion order
    pub classes: Vec<ClassRc>,
    /// Defined types, for duplicate detection
    pub class_types: HashSet<TypeRc>,
    /// Strings
    pub strings: HashSet<StringRc>,
    /// Types
    pub types: HashSet<TypeRc>,
    /// Protos
    pub protos: HashSet<ProtoRc>,
    /// Fields
    pub fields: HashSet<FieldRc>,
    /// Methods
    pub methods: HashSet<MethodRc>,
    /// Call sites
    pub call_sites: HashSet<CallSiteRc>,
    /// Method handles
    pub method_handles: HashSet<MethodHandleRc>,
}

impl IndexedItemSet {
    /// Move everything from `other` into this set.
    pub fn absorb(&mut self, other: IndexedItemSet) {
        for class in other.classes {
            if self.class_types.insert(class.ty.clone()) {
                self.classes.push(class);
            }
        }
        self.strings.extend(other.strings);
        self.types.extend(other.types);
        self.protos.extend(other.protos);
        self.fields.extend(other.fields);
        self.methods.extend(other.methods);
        self.call_sites.extend(other.call_sites);
        self.method_handles.extend(other.method_handles);
    }

    /// Whether nothing was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
            && self.strings.is_empty()
            && self.types.is_empty()
            && self.protos.is_empty()
            && self.fields.is_empty()
            && self.methods.is_empty()
            && self.call_sites.is_empty()
            && self.method_handles.is_empty()
    }
}

impl IndexedItemCollection for IndexedItemSet {
    fn add_class(&mut self, class: &ClassRc) -> bool {
        if self.class_types.insert(class.ty.clone()) {
            self.classes.push(class.clone());
            true
        } else {
            false
        }
    }

    fn add_string(&mut self, string: &StringRc) -> bool {
        self.strings.insert(string.clone())
    }

    fn add_type(&mut self, ty: &TypeRc) -> bool {
        self.types.insert(ty.clone())
    }

    fn add_proto(&mut self, proto: &ProtoRc) -> bool {
        self.protos.insert(proto.clone())
    }

    fn add_field(&mut self, field: &FieldRc) -> bool {
        self.fields.insert(field.clone())
    }

    fn add_method(&mut self, method: &MethodRc) -> bool {
        self.methods.insert(method.clone())
    }

    fn add_call_site(&mut self, call_site: &CallSiteRc) -> bool {
        self.call_sites.insert(call_site.clone())
    }

    fn add_method_handle(&mut self, handle: &MethodHandleRc) -> bool {
        self.method_handles.insert(handle.clone())
    }
}

/// Walks the closure of classes into an [`IndexedItemCollection`].
pub struct ItemCollector<'a> {
    items: &'a mut dyn IndexedItemCollection,
    lens: &'a dyn NamingLens,
}

impl<'a> ItemCollector<'a> {
    /// Collect into `items`, naming through `lens`.
    pub fn new(items: &'a mut dyn IndexedItemCollection, lens: &'a dyn NamingLens) -> Self {
        ItemCollector { items, lens }
    }

    /// Add a class and everything it references.
    pub fn class(&mut self, class: &ClassRc) {
        if !self.items.add_class(class) {
            return;
        }
        self.class_contents(class);
    }

    fn class_contents(&mut self, class: &DexProgramClass) {
        self.ty(&class.ty);
        if let Some(super_type) = &class.super_type {
            self.ty(super_type);
        }
        for interface in &class.interfaces {
            self.ty(interface);
        }
        if let Some(source_file) = &class.source_file {
            self.items.add_string(source_file);
        }
        for annotation in &class.annotations.annotations {
            self.annotation(&annotation.annotation);
        }
        for field in class.fields() {
            self.field(&field.field);
            for annotation in &field.annotations.annotations {
                self.annotation(&annotation.annotation);
            }
            if let Some(value) = &field.static_value {
                self.value(value);
            }
        }
        for method in class.methods() {
            self.method(&method.method);
            for annotation in &method.annotations.annotations {
                self.annotation(&annotation.annotation);
            }
            for set in &method.parameter_annotations.sets {
                for annotation in &set.annotations {
                    self.annotation(&annotation.annotation);
                }
            }
            if let Some(code) = &method.code {
                self.code(code);
            }
        }
    }

    /// Add a string.
    pub fn string(&mut self, string: &StringRc) {
        self.items.add_string(string);
    }

    /// Add a type and its output descriptor.
    pub fn ty(&mut self, ty: &TypeRc) {
        if self.items.add_type(ty) {
            let descriptor = self.lens.lookup_descriptor(ty);
            self.items.add_string(&descriptor);
        }
    }

    /// Add a proto and its components.
    pub fn proto(&mut self, proto: &ProtoRc) {
        if self.items.add_proto(proto) {
            self.items.add_string(&proto.shorty);
            self.ty(&proto.return_type);
            for parameter in &proto.parameters {
                self.ty(parameter);
            }
        }
    }

    /// Add a field reference and its components.
    pub fn field(&mut self, field: &FieldRc) {
        if self.items.add_field(field) {
            self.ty(&field.holder);
            let name = self.lens.lookup_field_name(field);
            self.items.add_string(&name);
            self.ty(&field.ty);
        }
    }

    /// Add a method reference and its components.
    pub fn method(&mut self, method: &MethodRc) {
        if self.items.add_method(method) {
            self.ty(&method.holder);
            let name = self.lens.lookup_method_name(method);
            self.items.add_string(&name);
            self.proto(&method.proto);
        }
    }

    /// Add a method handle and its member.
    pub fn method_handle(&mut self, handle: &MethodHandleRc) {
        if self.items.add_method_handle(handle) {
            match &handle.member {
                MethodHandleMember::Field(field) => self.field(field),
                MethodHandleMember::Method(method) => self.method(method),
            }
        }
    }

    /// Add a call site and its components.
    pub fn call_site(&mut self, call_site: &CallSiteRc) {
        if self.items.add_call_site(call_site) {
            self.method_handle(&call_site.bootstrap);
            self.items.add_string(&call_site.method_name);
            self.proto(&call_site.method_proto);
            for value in &call_site.extra_args {
                self.value(value);
            }
        }
    }

    /// Add the items of an encoded value.
    pub fn value(&mut self, value: &EncodedValue) {
        match value {
            EncodedValue::MethodType(proto) => self.proto(proto),
            EncodedValue::MethodHandle(handle) => self.method_handle(handle),
            EncodedValue::String(string) => self.string(string),
            EncodedValue::Type(ty) => self.ty(ty),
            EncodedValue::Field(field) | EncodedValue::Enum(field) => self.field(field),
            EncodedValue::Method(method) => self.method(method),
            EncodedValue::Array(array) => {
                for value in &array.values {
                    self.value(value);
                }
            }
            EncodedValue::Annotation(annotation) => self.annotation(annotation),
            _ => {}
        }
    }

    /// Add the items of an annotation.
    pub fn annotation(&mut self, annotation: &EncodedAnnotation) {
        self.ty(&annotation.ty);
        for element in &annotation.elements {
            self.string(&element.name);
            self.value(&element.value);
        }
    }

    /// Add the items referenced by a code body.
    pub fn code(&mut self, code: &DexCode) {
        for item in code.item_refs() {
            match item {
                ItemRef::String(string) => self.string(&string),
                ItemRef::Type(ty) => self.ty(&ty),
                ItemRef::Field(field) => self.field(&field),
                ItemRef::Method(method) => self.method(&method),
                ItemRef::Proto(proto) => self.proto(&proto),
                ItemRef::CallSite(call_site) => self.call_site(&call_site),
                ItemRef::MethodHandle(handle) => self.method_handle(&handle),
            }
        }
        for ty in code.handler_types() {
            self.ty(ty);
        }
        if let Some(debug_info) = &code.debug_info {
            self.debug_info(debug_info);
        }
    }

    /// Add the items of debug info.
    pub fn debug_info(&mut self, debug_info: &DebugInfo) {
        for string in debug_info.strings() {
            self.string(&string);
        }
        for ty in debug_info.types() {
            self.ty(&ty);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::{
        class::{AccessFlags, EncodedMethod},
        code::instruction::Insn,
        naming::{IdentityLens, MapLens},
        ItemFactory,
    };

    fn sample(factory: &ItemFactory) -> ClassRc {
        let holder = factory.create_type("Lcom/example/Main;");
        let proto = factory.create_proto(&factory.void_type(), vec![]);
        let callee = factory.create_method(
            &factory.create_type("Lcom/example/Other;"),
            &proto,
            "run",
        );
        let code = DexCode::new(
            1,
            0,
            0,
            vec![
                Insn::ConstString {
                    register: 0,
                    string: factory.create_string("hello"),
                },
                Insn::Ref {
                    units: vec![0x0071, 0, 0],
                    item: ItemRef::Method(callee),
                    proto: None,
                },
                Insn::Simple { units: vec![0x000e] },
            ],
        );
        let main = EncodedMethod::new(
            factory.create_method(&holder, &proto, "main"),
            AccessFlags::PUBLIC | AccessFlags::STATIC,
            Some(Arc::new(code)),
        );
        Arc::new(
            DexProgramClass::new(holder, AccessFlags::PUBLIC, Some(factory.object_type()))
                .with_method(main),
        )
    }

    #[test]
    fn test_class_closure() {
        let factory = ItemFactory::new();
        let class = sample(&factory);

        let mut items = IndexedItemSet::default();
        ItemCollector::new(&mut items, &IdentityLens).class(&class);

        assert_eq!(items.classes.len(), 1);
        assert_eq!(items.methods.len(), 2);
        assert_eq!(items.protos.len(), 1);
        // Main, Object, Other, V
        assert_eq!(items.types.len(), 4);
        assert!(items.strings.contains(&factory.create_string("hello")));
        assert!(items.strings.contains(&factory.create_string("V")));
        assert!(items.strings.contains(&factory.create_string("run")));

        // A second add is a no-op
        let before = items.strings.len();
        ItemCollector::new(&mut items, &IdentityLens).class(&class);
        assert_eq!(items.strings.len(), before);
        assert_eq!(items.classes.len(), 1);
    }

    #[test]
    fn test_closure_uses_renamed_strings() {
        let factory = Arc::new(ItemFactory::new());
        let class = sample(&factory);
        let lens = MapLens::new(factory.clone()).rename_type(&class.ty, "La;");

        let mut items = IndexedItemSet::default();
        ItemCollector::new(&mut items, &lens).class(&class);
        assert!(items.strings.contains(&factory.create_string("La;")));
        assert!(!items
            .strings
            .contains(&factory.create_string("Lcom/example/Main;")));
    }
}
