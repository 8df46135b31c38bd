//! Indexable items: types, protos, fields, methods, method handles and call sites.
//!
//! Every item is a plain value with structural equality. Items are interned by
//! [`crate::model::ItemFactory`], so two equal items share one allocation, and the derived
//! orderings match the canonical order of the corresponding id table when names are not
//! rewritten.

use std::{cmp::Ordering, fmt, sync::Arc};

use strum::Display;

use crate::model::{string::StringRc, values::EncodedValue};

/// A reference to an interned [`DexType`].
pub type TypeRc = Arc<DexType>;
/// A reference to an interned [`DexProto`].
pub type ProtoRc = Arc<DexProto>;
/// A reference to an interned [`DexField`].
pub type FieldRc = Arc<DexField>;
/// A reference to an interned [`DexMethod`].
pub type MethodRc = Arc<DexMethod>;
/// A reference to an interned [`DexMethodHandle`].
pub type MethodHandleRc = Arc<DexMethodHandle>;
/// A reference to an interned [`DexCallSite`].
pub type CallSiteRc = Arc<DexCallSite>;

/// An ordered list of types, as used for parameters and interfaces.
pub type TypeList = Vec<TypeRc>;

/// A type, identified by its descriptor.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DexType {
    /// The descriptor, e.g. `Ljava/lang/Object;`, `I` or `[J`
    pub descriptor: StringRc,
}

impl DexType {
    /// The descriptor as a Rust string.
    #[must_use]
    pub fn descriptor_str(&self) -> String {
        self.descriptor.to_string_lossy()
    }

    fn first_byte(&self) -> u8 {
        self.descriptor.content().first().copied().unwrap_or(b'V')
    }

    /// `V`
    #[must_use]
    pub fn is_void(&self) -> bool {
        self.first_byte() == b'V'
    }

    /// A primitive type such as `I` or `Z`.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(
            self.first_byte(),
            b'Z' | b'B' | b'S' | b'C' | b'I' | b'J' | b'F' | b'D'
        )
    }

    /// An array type.
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.first_byte() == b'['
    }

    /// A class or interface type.
    #[must_use]
    pub fn is_class(&self) -> bool {
        self.first_byte() == b'L'
    }

    /// `J` or `D`, which occupy two registers.
    #[must_use]
    pub fn is_wide(&self) -> bool {
        matches!(self.first_byte(), b'J' | b'D')
    }

    /// The shorty character of this type.
    #[must_use]
    pub fn shorty_char(&self) -> char {
        match self.first_byte() {
            b'L' | b'[' => 'L',
            other => other as char,
        }
    }

    /// The dotted Java name of a class type, e.g. `com.example.Foo`.
    #[must_use]
    pub fn java_name(&self) -> String {
        descriptor_to_java_name(&self.descriptor_str())
    }
}

/// Convert `Lcom/example/Foo;` into `com.example.Foo`. Non-class descriptors are returned as is.
#[must_use]
pub fn descriptor_to_java_name(descriptor: &str) -> String {
    match descriptor
        .strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
    {
        Some(inner) => inner.replace('/', "."),
        None => descriptor.to_string(),
    }
}

impl fmt::Display for DexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.descriptor)
    }
}

impl fmt::Debug for DexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.descriptor)
    }
}

/// A method prototype: return type and parameter types, plus the derived shorty.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DexProto {
    /// Short-form descriptor, e.g. `VIL`
    pub shorty: StringRc,
    /// Return type
    pub return_type: TypeRc,
    /// Parameter types
    pub parameters: TypeList,
}

impl Ord for DexProto {
    fn cmp(&self, other: &Self) -> Ordering {
        self.return_type
            .cmp(&other.return_type)
            .then_with(|| self.parameters.cmp(&other.parameters))
    }
}

impl PartialOrd for DexProto {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for DexProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for parameter in &self.parameters {
            write!(f, "{}", parameter)?;
        }
        write!(f, "){}", self.return_type)
    }
}

/// A field reference.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DexField {
    /// Declaring class
    pub holder: TypeRc,
    /// Simple name
    pub name: StringRc,
    /// Field type
    pub ty: TypeRc,
}

impl fmt::Debug for DexField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}:{}", self.holder, self.name, self.ty)
    }
}

/// A method reference.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DexMethod {
    /// Declaring class
    pub holder: TypeRc,
    /// Simple name
    pub name: StringRc,
    /// Prototype
    pub proto: ProtoRc,
}

impl DexMethod {
    /// `<init>`
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name.content() == b"<init>"
    }

    /// `<clinit>`
    #[must_use]
    pub fn is_class_initializer(&self) -> bool {
        self.name.content() == b"<clinit>"
    }
}

impl fmt::Debug for DexMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}{:?}", self.holder, self.name, self.proto)
    }
}

/// Kind of a method handle, as encoded in the method handle table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[repr(u16)]
pub enum MethodHandleKind {
    /// Static field setter
    StaticPut = 0x00,
    /// Static field getter
    StaticGet = 0x01,
    /// Instance field setter
    InstancePut = 0x02,
    /// Instance field getter
    InstanceGet = 0x03,
    /// Static method invoker
    InvokeStatic = 0x04,
    /// Instance method invoker
    InvokeInstance = 0x05,
    /// Constructor invoker
    InvokeConstructor = 0x06,
    /// Direct method invoker
    InvokeDirect = 0x07,
    /// Interface method invoker
    InvokeInterface = 0x08,
}

impl MethodHandleKind {
    /// Decode the kind stored in the table.
    #[must_use]
    pub fn from_u16(value: u16) -> Option<MethodHandleKind> {
        Some(match value {
            0x00 => MethodHandleKind::StaticPut,
            0x01 => MethodHandleKind::StaticGet,
            0x02 => MethodHandleKind::InstancePut,
            0x03 => MethodHandleKind::InstanceGet,
            0x04 => MethodHandleKind::InvokeStatic,
            0x05 => MethodHandleKind::InvokeInstance,
            0x06 => MethodHandleKind::InvokeConstructor,
            0x07 => MethodHandleKind::InvokeDirect,
            0x08 => MethodHandleKind::InvokeInterface,
            _ => return None,
        })
    }

    /// Field accessors reference a field, all others a method.
    #[must_use]
    pub fn is_field_handle(self) -> bool {
        (self as u16) <= MethodHandleKind::InstanceGet as u16
    }
}

/// The member a method handle refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MethodHandleMember {
    /// Field accessor target
    Field(FieldRc),
    /// Invoker target
    Method(MethodRc),
}

/// A method handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DexMethodHandle {
    /// Handle kind
    pub kind: MethodHandleKind,
    /// Referenced member
    pub member: MethodHandleMember,
}

/// A call site: bootstrap method handle, name, type and static arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DexCallSite {
    /// Bootstrap linker method
    pub bootstrap: MethodHandleRc,
    /// Method name passed to the bootstrap method
    pub method_name: StringRc,
    /// Method type passed to the bootstrap method
    pub method_proto: ProtoRc,
    /// Additional static arguments
    pub extra_args: Vec<EncodedValue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemFactory;

    #[test]
    fn test_type_predicates() {
        let factory = ItemFactory::new();
        assert!(factory.create_type("I").is_primitive());
        assert!(factory.create_type("J").is_wide());
        assert!(factory.create_type("[I").is_array());
        assert!(factory.create_type("V").is_void());
        assert_eq!(factory.create_type("[I").shorty_char(), 'L');

        let class = factory.create_type("Lcom/example/Foo;");
        assert!(class.is_class());
        assert_eq!(class.java_name(), "com.example.Foo");
    }

    #[test]
    fn test_member_order() {
        let factory = ItemFactory::new();
        let a = factory.create_type("La;");
        let b = factory.create_type("Lb;");
        let int = factory.create_type("I");

        let f1 = factory.create_field(&a, &int, "y");
        let f2 = factory.create_field(&a, &int, "z");
        let f3 = factory.create_field(&b, &int, "a");
        assert!(f1 < f2);
        assert!(f2 < f3);

        let void_proto = factory.create_proto(&factory.create_type("V"), vec![]);
        let int_proto = factory.create_proto(&int, vec![]);
        // Return type I sorts before V
        assert!(int_proto < void_proto);
    }

    #[test]
    fn test_method_handle_kind() {
        assert!(MethodHandleKind::InstanceGet.is_field_handle());
        assert!(!MethodHandleKind::InvokeStatic.is_field_handle());
        assert_eq!(
            MethodHandleKind::from_u16(8),
            Some(MethodHandleKind::InvokeInterface)
        );
        assert_eq!(MethodHandleKind::from_u16(9), None);
    }
}
