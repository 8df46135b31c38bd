//! Program classes and their members.

use std::sync::Arc;

use bitflags::bitflags;

use crate::model::{
    annotations::{AnnotationSet, ParameterAnnotations},
    code::CodeRc,
    items::{FieldRc, MethodRc, TypeList, TypeRc},
    string::StringRc,
    values::{EncodedArray, EncodedValue},
};

/// A shared program class.
pub type ClassRc = Arc<DexProgramClass>;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Access flags of classes, fields and methods
    pub struct AccessFlags : u32 {
        /// Visible everywhere
        const PUBLIC = 0x0001;
        /// Visible to the defining class only
        const PRIVATE = 0x0002;
        /// Visible to the package and subclasses
        const PROTECTED = 0x0004;
        /// Not bound to an instance
        const STATIC = 0x0008;
        /// Not overridable or assignable after construction
        const FINAL = 0x0010;
        /// Method acquires the receiver's monitor
        const SYNCHRONIZED = 0x0020;
        /// Field with special access rules for threads
        const VOLATILE = 0x0040;
        /// Compiler-generated bridge method
        const BRIDGE = 0x0040;
        /// Field not saved by default serialization
        const TRANSIENT = 0x0080;
        /// Last argument is a rest argument
        const VARARGS = 0x0080;
        /// Method implemented in native code
        const NATIVE = 0x0100;
        /// Class is an interface
        const INTERFACE = 0x0200;
        /// Not directly instantiable or without implementation
        const ABSTRACT = 0x0400;
        /// Strict floating point rules
        const STRICT = 0x0800;
        /// Not directly defined in source
        const SYNTHETIC = 0x1000;
        /// Class is an annotation
        const ANNOTATION = 0x2000;
        /// Class or field is an enum
        const ENUM = 0x4000;
        /// Constructor or class initializer
        const CONSTRUCTOR = 0x1_0000;
        /// Method declared `synchronized`
        const DECLARED_SYNCHRONIZED = 0x2_0000;
    }
}

/// A field definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedField {
    /// The field reference
    pub field: FieldRc,
    /// Access flags
    pub access_flags: AccessFlags,
    /// Annotations on the field
    pub annotations: Arc<AnnotationSet>,
    /// Initial value of a static field, `None` for the default
    pub static_value: Option<EncodedValue>,
}

impl EncodedField {
    /// A field without annotations and initial value.
    #[must_use]
    pub fn new(field: FieldRc, access_flags: AccessFlags) -> EncodedField {
        EncodedField {
            field,
            access_flags,
            annotations: Arc::default(),
            static_value: None,
        }
    }

    /// Whether the field is static.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(AccessFlags::STATIC)
    }
}

/// A method definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedMethod {
    /// The method reference
    pub method: MethodRc,
    /// Access flags
    pub access_flags: AccessFlags,
    /// Annotations on the method
    pub annotations: Arc<AnnotationSet>,
    /// Annotations on the parameters
    pub parameter_annotations: Arc<ParameterAnnotations>,
    /// The code, absent for abstract and native methods
    pub code: Option<CodeRc>,
}

impl EncodedMethod {
    /// A method without annotations.
    #[must_use]
    pub fn new(method: MethodRc, access_flags: AccessFlags, code: Option<CodeRc>) -> EncodedMethod {
        EncodedMethod {
            method,
            access_flags,
            annotations: Arc::default(),
            parameter_annotations: Arc::default(),
            code,
        }
    }

    /// Static, private or constructor methods are direct.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.access_flags
            .intersects(AccessFlags::STATIC | AccessFlags::PRIVATE | AccessFlags::CONSTRUCTOR)
    }

    /// Whether the method is static.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(AccessFlags::STATIC)
    }

    /// Whether the method is abstract.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(AccessFlags::ABSTRACT)
    }

    /// Whether the method is private.
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.access_flags.contains(AccessFlags::PRIVATE)
    }

    /// Whether the method is public.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.access_flags.contains(AccessFlags::PUBLIC)
    }
}

/// A class definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DexProgramClass {
    /// The defined type
    pub ty: TypeRc,
    /// Access flags
    pub access_flags: AccessFlags,
    /// Superclass, absent for `java.lang.Object`
    pub super_type: Option<TypeRc>,
    /// Implemented interfaces
    pub interfaces: TypeList,
    /// Name of the source file
    pub source_file: Option<StringRc>,
    /// Class annotations
    pub annotations: Arc<AnnotationSet>,
    /// Static fields, in definition order
    pub static_fields: Vec<EncodedField>,
    /// Instance fields
    pub instance_fields: Vec<EncodedField>,
    /// Static, private and constructor methods
    pub direct_methods: Vec<EncodedMethod>,
    /// Virtual methods
    pub virtual_methods: Vec<EncodedMethod>,
    /// Checksum carried through from the input, if any
    pub checksum: Option<u64>,
    /// The input class this class was synthesized for
    pub synthesizing_context: Option<TypeRc>,
    /// Where the class was read from
    pub origin: Option<String>,
}

impl DexProgramClass {
    /// A class without members.
    #[must_use]
    pub fn new(ty: TypeRc, access_flags: AccessFlags, super_type: Option<TypeRc>) -> DexProgramClass {
        DexProgramClass {
            ty,
            access_flags,
            super_type,
            interfaces: Vec::new(),
            source_file: None,
            annotations: Arc::default(),
            static_fields: Vec::new(),
            instance_fields: Vec::new(),
            direct_methods: Vec::new(),
            virtual_methods: Vec::new(),
            checksum: None,
            synthesizing_context: None,
            origin: None,
        }
    }

    /// Add a field to the static or instance list, depending on its flags.
    #[must_use]
    pub fn with_field(mut self, field: EncodedField) -> DexProgramClass {
        if field.is_static() {
            self.static_fields.push(field);
        } else {
            self.instance_fields.push(field);
        }
        self
    }

    /// Add a method to the direct or virtual list, depending on its flags.
    #[must_use]
    pub fn with_method(mut self, method: EncodedMethod) -> DexProgramClass {
        if method.is_direct() {
            self.direct_methods.push(method);
        } else {
            self.virtual_methods.push(method);
        }
        self
    }

    /// Set the implemented interfaces.
    #[must_use]
    pub fn with_interfaces(mut self, interfaces: TypeList) -> DexProgramClass {
        self.interfaces = interfaces;
        self
    }

    /// Set the input checksum.
    #[must_use]
    pub fn with_checksum(mut self, checksum: u64) -> DexProgramClass {
        self.checksum = Some(checksum);
        self
    }

    /// Mark as synthesized for `context`.
    #[must_use]
    pub fn with_synthesizing_context(mut self, context: TypeRc) -> DexProgramClass {
        self.synthesizing_context = Some(context);
        self
    }

    /// The descriptor of the defined type.
    #[must_use]
    pub fn descriptor(&self) -> String {
        self.ty.descriptor_str()
    }

    /// Whether the class is an interface.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(AccessFlags::INTERFACE)
    }

    /// Whether the class was synthesized for another class.
    #[must_use]
    pub fn is_synthesized(&self) -> bool {
        self.synthesizing_context
            .as_ref()
            .is_some_and(|context| *context != self.ty)
    }

    /// All fields, static first.
    pub fn fields(&self) -> impl Iterator<Item = &EncodedField> {
        self.static_fields.iter().chain(self.instance_fields.iter())
    }

    /// All methods, direct first.
    pub fn methods(&self) -> impl Iterator<Item = &EncodedMethod> {
        self.direct_methods.iter().chain(self.virtual_methods.iter())
    }

    /// Whether the class has any member.
    #[must_use]
    pub fn has_members(&self) -> bool {
        self.fields().next().is_some() || self.methods().next().is_some()
    }

    /// Whether the class or any member carries annotations.
    #[must_use]
    pub fn has_annotations(&self) -> bool {
        !self.annotations.is_empty()
            || self.fields().any(|field| !field.annotations.is_empty())
            || self.methods().any(|method| {
                !method.annotations.is_empty() || !method.parameter_annotations.is_empty()
            })
    }

    /// The static values array.
    ///
    /// Holds one value per static field in field order, with trailing default values trimmed.
    /// Returns `None` when every static field has its default value.
    #[must_use]
    pub fn static_values(&self) -> Option<EncodedArray> {
        static_values_of(&self.static_fields)
    }
}

/// Initial values of `fields` in the given order, trimmed like [`DexProgramClass::static_values`].
#[must_use]
pub fn static_values_of<'a>(
    fields: impl IntoIterator<Item = &'a EncodedField>,
) -> Option<EncodedArray> {
    let mut values: Vec<EncodedValue> = fields
        .into_iter()
        .map(|field| match &field.static_value {
            Some(value) => value.clone(),
            None => EncodedValue::default_for(field.field.ty.descriptor.content()),
        })
        .collect();
    while values.last().is_some_and(EncodedValue::is_default) {
        values.pop();
    }
    if values.is_empty() {
        None
    } else {
        Some(EncodedArray::new(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemFactory;

    #[test]
    fn test_static_values_trimming() {
        let factory = ItemFactory::new();
        let holder = factory.create_type("LA;");
        let int = factory.create_type("I");
        let string = factory.create_type("Ljava/lang/String;");

        let mut first = EncodedField::new(
            factory.create_field(&holder, &int, "a"),
            AccessFlags::STATIC,
        );
        first.static_value = Some(EncodedValue::Int(0));
        let mut second = EncodedField::new(
            factory.create_field(&holder, &string, "b"),
            AccessFlags::STATIC,
        );
        second.static_value = Some(EncodedValue::String(factory.create_string("x")));
        let third = EncodedField::new(
            factory.create_field(&holder, &int, "c"),
            AccessFlags::STATIC,
        );

        let class = DexProgramClass::new(holder.clone(), AccessFlags::PUBLIC, None)
            .with_field(first.clone())
            .with_field(third.clone());
        assert!(class.static_values().is_none());

        let class = DexProgramClass::new(holder, AccessFlags::PUBLIC, None)
            .with_field(first)
            .with_field(second)
            .with_field(third);
        let values = class.static_values().unwrap();
        assert_eq!(values.values.len(), 2);
        assert_eq!(values.values[0], EncodedValue::Int(0));
    }

    #[test]
    fn test_member_placement() {
        let factory = ItemFactory::new();
        let holder = factory.create_type("LA;");
        let proto = factory.create_proto(&factory.void_type(), vec![]);

        let init = EncodedMethod::new(
            factory.create_method(&holder, &proto, "<init>"),
            AccessFlags::PUBLIC | AccessFlags::CONSTRUCTOR,
            None,
        );
        let run = EncodedMethod::new(
            factory.create_method(&holder, &proto, "run"),
            AccessFlags::PUBLIC | AccessFlags::ABSTRACT,
            None,
        );
        let class = DexProgramClass::new(holder.clone(), AccessFlags::PUBLIC, None)
            .with_method(init)
            .with_method(run);

        assert_eq!(class.direct_methods.len(), 1);
        assert_eq!(class.virtual_methods.len(), 1);
        assert!(!class.is_synthesized());
        assert!(!class
            .with_synthesizing_context(holder)
            .is_synthesized());
    }
}
