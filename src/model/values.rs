//! Encoded values, encoded arrays and encoded annotations.
//!
//! Encoded values appear in static field initializers, annotation elements and call site
//! arguments. Each value starts with a header byte `(arg << 5) | type`, where `arg` is usually
//! the payload width minus one:
//!
//! - signed integers use the minimal sign-extended width,
//! - chars and item indices use the minimal zero-extended width,
//! - floats and doubles are right-zero-extended, dropping trailing zero low bytes,
//! - booleans carry their value in `arg` and have no payload.

use crate::{
    file::{io::write_uleb128, parser::Parser},
    model::{
        items::{FieldRc, MethodHandleRc, MethodRc, ProtoRc, TypeRc},
        string::StringRc,
        IndexLookup, IndexResolver,
    },
    Result,
};

const VALUE_BYTE: u8 = 0x00;
const VALUE_SHORT: u8 = 0x02;
const VALUE_CHAR: u8 = 0x03;
const VALUE_INT: u8 = 0x04;
const VALUE_LONG: u8 = 0x06;
const VALUE_FLOAT: u8 = 0x10;
const VALUE_DOUBLE: u8 = 0x11;
const VALUE_METHOD_TYPE: u8 = 0x15;
const VALUE_METHOD_HANDLE: u8 = 0x16;
const VALUE_STRING: u8 = 0x17;
const VALUE_TYPE: u8 = 0x18;
const VALUE_FIELD: u8 = 0x19;
const VALUE_METHOD: u8 = 0x1a;
const VALUE_ENUM: u8 = 0x1b;
const VALUE_ARRAY: u8 = 0x1c;
const VALUE_ANNOTATION: u8 = 0x1d;
const VALUE_NULL: u8 = 0x1e;
const VALUE_BOOLEAN: u8 = 0x1f;

/// A constant value.
///
/// Floating point values are kept as their raw bits so that values can be hashed and ordered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EncodedValue {
    /// Signed 8-bit integer
    Byte(i8),
    /// Signed 16-bit integer
    Short(i16),
    /// Unsigned 16-bit character
    Char(u16),
    /// Signed 32-bit integer
    Int(i32),
    /// Signed 64-bit integer
    Long(i64),
    /// IEEE754 single, as bits
    Float(u32),
    /// IEEE754 double, as bits
    Double(u64),
    /// A method prototype
    MethodType(ProtoRc),
    /// A method handle
    MethodHandle(MethodHandleRc),
    /// A string
    String(StringRc),
    /// A type
    Type(TypeRc),
    /// A field
    Field(FieldRc),
    /// A method
    Method(MethodRc),
    /// An enum constant, referenced by its field
    Enum(FieldRc),
    /// A nested array
    Array(EncodedArray),
    /// A nested annotation
    Annotation(EncodedAnnotation),
    /// `null`
    Null,
    /// A boolean
    Boolean(bool),
}

/// An array of encoded values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EncodedArray {
    /// The elements
    pub values: Vec<EncodedValue>,
}

/// A name/value pair of an annotation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnnotationElement {
    /// Element name
    pub name: StringRc,
    /// Element value
    pub value: EncodedValue,
}

/// An annotation without visibility.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EncodedAnnotation {
    /// Annotation type
    pub ty: TypeRc,
    /// Elements, sorted by name when written
    pub elements: Vec<AnnotationElement>,
}

impl EncodedValue {
    /// The default value of a field of type `descriptor`.
    #[must_use]
    pub fn default_for(descriptor: &[u8]) -> EncodedValue {
        match descriptor.first() {
            Some(b'Z') => EncodedValue::Boolean(false),
            Some(b'B') => EncodedValue::Byte(0),
            Some(b'S') => EncodedValue::Short(0),
            Some(b'C') => EncodedValue::Char(0),
            Some(b'I') => EncodedValue::Int(0),
            Some(b'J') => EncodedValue::Long(0),
            Some(b'F') => EncodedValue::Float(0),
            Some(b'D') => EncodedValue::Double(0),
            _ => EncodedValue::Null,
        }
    }

    /// Whether this is the default value of its type.
    #[must_use]
    pub fn is_default(&self) -> bool {
        matches!(
            self,
            EncodedValue::Boolean(false)
                | EncodedValue::Byte(0)
                | EncodedValue::Short(0)
                | EncodedValue::Char(0)
                | EncodedValue::Int(0)
                | EncodedValue::Long(0)
                | EncodedValue::Float(0)
                | EncodedValue::Double(0)
                | EncodedValue::Null
        )
    }

    /// Decode one value.
    ///
    /// # Errors
    /// Returns an error on truncated input, an unknown value type or an unresolvable index.
    pub fn read(parser: &mut Parser, resolver: &dyn IndexResolver) -> Result<EncodedValue> {
        let header = parser.read_le::<u8>()?;
        let arg = header >> 5;
        let size = usize::from(arg) + 1;

        Ok(match header & 0x1f {
            VALUE_BYTE => EncodedValue::Byte(read_signed(parser, size)? as i8),
            VALUE_SHORT => EncodedValue::Short(read_signed(parser, size)? as i16),
            VALUE_CHAR => EncodedValue::Char(read_unsigned(parser, size)? as u16),
            VALUE_INT => EncodedValue::Int(read_signed(parser, size)? as i32),
            VALUE_LONG => EncodedValue::Long(read_signed(parser, size)?),
            VALUE_FLOAT => {
                let bits = read_unsigned(parser, size)? << (8 * (4 - size.min(4)));
                EncodedValue::Float(bits as u32)
            }
            VALUE_DOUBLE => {
                let bits = read_unsigned(parser, size)? << (8 * (8 - size));
                EncodedValue::Double(bits)
            }
            VALUE_METHOD_TYPE => EncodedValue::MethodType(resolver.proto(read_index(parser, size)?)?),
            VALUE_METHOD_HANDLE => {
                EncodedValue::MethodHandle(resolver.method_handle(read_index(parser, size)?)?)
            }
            VALUE_STRING => EncodedValue::String(resolver.string(read_index(parser, size)?)?),
            VALUE_TYPE => EncodedValue::Type(resolver.ty(read_index(parser, size)?)?),
            VALUE_FIELD => EncodedValue::Field(resolver.field(read_index(parser, size)?)?),
            VALUE_METHOD => EncodedValue::Method(resolver.method(read_index(parser, size)?)?),
            VALUE_ENUM => EncodedValue::Enum(resolver.field(read_index(parser, size)?)?),
            VALUE_ARRAY => EncodedValue::Array(EncodedArray::read(parser, resolver)?),
            VALUE_ANNOTATION => EncodedValue::Annotation(EncodedAnnotation::read(parser, resolver)?),
            VALUE_NULL => EncodedValue::Null,
            VALUE_BOOLEAN => EncodedValue::Boolean(arg != 0),
            other => return Err(malformed_error!("Unknown encoded value type 0x{:02x}", other)),
        })
    }

    /// Encode this value.
    ///
    /// # Errors
    /// Returns an error if a referenced item has no index in `lookup`.
    pub fn write(&self, out: &mut Vec<u8>, lookup: &dyn IndexLookup) -> Result<()> {
        match self {
            EncodedValue::Byte(value) => {
                out.push(VALUE_BYTE);
                out.push(*value as u8);
            }
            EncodedValue::Short(value) => write_signed(out, VALUE_SHORT, i64::from(*value)),
            EncodedValue::Char(value) => write_unsigned(out, VALUE_CHAR, u64::from(*value)),
            EncodedValue::Int(value) => write_signed(out, VALUE_INT, i64::from(*value)),
            EncodedValue::Long(value) => write_signed(out, VALUE_LONG, *value),
            EncodedValue::Float(bits) => write_right_extended(out, VALUE_FLOAT, u64::from(*bits), 4),
            EncodedValue::Double(bits) => write_right_extended(out, VALUE_DOUBLE, *bits, 8),
            EncodedValue::MethodType(proto) => {
                write_unsigned(out, VALUE_METHOD_TYPE, u64::from(lookup.proto_index(proto)?));
            }
            EncodedValue::MethodHandle(handle) => write_unsigned(
                out,
                VALUE_METHOD_HANDLE,
                u64::from(lookup.method_handle_index(handle)?),
            ),
            EncodedValue::String(string) => {
                write_unsigned(out, VALUE_STRING, u64::from(lookup.string_index(string)?));
            }
            EncodedValue::Type(ty) => {
                write_unsigned(out, VALUE_TYPE, u64::from(lookup.type_index(ty)?));
            }
            EncodedValue::Field(field) => {
                write_unsigned(out, VALUE_FIELD, u64::from(lookup.field_index(field)?));
            }
            EncodedValue::Method(method) => {
                write_unsigned(out, VALUE_METHOD, u64::from(lookup.method_index(method)?));
            }
            EncodedValue::Enum(field) => {
                write_unsigned(out, VALUE_ENUM, u64::from(lookup.field_index(field)?));
            }
            EncodedValue::Array(array) => {
                out.push(VALUE_ARRAY);
                array.write(out, lookup)?;
            }
            EncodedValue::Annotation(annotation) => {
                out.push(VALUE_ANNOTATION);
                annotation.write(out, lookup)?;
            }
            EncodedValue::Null => out.push(VALUE_NULL),
            EncodedValue::Boolean(value) => out.push((u8::from(*value) << 5) | VALUE_BOOLEAN),
        }
        Ok(())
    }
}

impl EncodedArray {
    /// Create an array from values.
    #[must_use]
    pub fn new(values: Vec<EncodedValue>) -> EncodedArray {
        EncodedArray { values }
    }

    /// Decode a length-prefixed array.
    ///
    /// # Errors
    /// Returns an error on truncated input or unresolvable indices.
    pub fn read(parser: &mut Parser, resolver: &dyn IndexResolver) -> Result<EncodedArray> {
        let size = parser.read_uleb128()?;
        let mut values = Vec::with_capacity(size.min(1024) as usize);
        for _ in 0..size {
            values.push(EncodedValue::read(parser, resolver)?);
        }
        Ok(EncodedArray { values })
    }

    /// Encode a length-prefixed array.
    ///
    /// # Errors
    /// Returns an error if a referenced item has no index.
    pub fn write(&self, out: &mut Vec<u8>, lookup: &dyn IndexLookup) -> Result<()> {
        write_uleb128(out, self.values.len() as u32);
        for value in &self.values {
            value.write(out, lookup)?;
        }
        Ok(())
    }
}

impl EncodedAnnotation {
    /// Decode an annotation body.
    ///
    /// # Errors
    /// Returns an error on truncated input or unresolvable indices.
    pub fn read(parser: &mut Parser, resolver: &dyn IndexResolver) -> Result<EncodedAnnotation> {
        let ty = resolver.ty(parser.read_uleb128()?)?;
        let size = parser.read_uleb128()?;
        let mut elements = Vec::with_capacity(size.min(256) as usize);
        for _ in 0..size {
            let name = resolver.string(parser.read_uleb128()?)?;
            let value = EncodedValue::read(parser, resolver)?;
            elements.push(AnnotationElement { name, value });
        }
        Ok(EncodedAnnotation { ty, elements })
    }

    /// Encode an annotation body. Elements are emitted sorted by name.
    ///
    /// # Errors
    /// Returns an error if a referenced item has no index.
    pub fn write(&self, out: &mut Vec<u8>, lookup: &dyn IndexLookup) -> Result<()> {
        write_uleb128(out, lookup.type_index(&self.ty)?);
        write_uleb128(out, self.elements.len() as u32);

        let mut elements: Vec<&AnnotationElement> = self.elements.iter().collect();
        elements.sort_by(|a, b| a.name.cmp(&b.name));
        for element in elements {
            write_uleb128(out, lookup.string_index(&element.name)?);
            element.value.write(out, lookup)?;
        }
        Ok(())
    }
}

fn read_unsigned(parser: &mut Parser, size: usize) -> Result<u64> {
    if size > 8 {
        return Err(malformed_error!("Encoded value of {} bytes", size));
    }
    let bytes = parser.read_bytes(size)?;
    Ok(bytes
        .iter()
        .rev()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte)))
}

fn read_signed(parser: &mut Parser, size: usize) -> Result<i64> {
    let raw = read_unsigned(parser, size)?;
    let shift = 64 - 8 * size as u32;
    Ok(((raw << shift) as i64) >> shift)
}

fn read_index(parser: &mut Parser, size: usize) -> Result<u32> {
    if size > 4 {
        return Err(malformed_error!("Index encoded with {} bytes", size));
    }
    Ok(read_unsigned(parser, size)? as u32)
}

fn write_signed(out: &mut Vec<u8>, value_type: u8, value: i64) {
    let mut size = 1;
    while size < 8 {
        let shift = 64 - 8 * size as u32;
        if (value << shift) >> shift == value {
            break;
        }
        size += 1;
    }
    write_bytes(out, value_type, value as u64, size);
}

fn write_unsigned(out: &mut Vec<u8>, value_type: u8, value: u64) {
    let mut size = 1;
    while size < 8 && value >> (8 * size) != 0 {
        size += 1;
    }
    write_bytes(out, value_type, value, size);
}

fn write_right_extended(out: &mut Vec<u8>, value_type: u8, bits: u64, width: usize) {
    let mut size = width;
    let mut value = bits;
    while size > 1 && value & 0xff == 0 {
        value >>= 8;
        size -= 1;
    }
    write_bytes(out, value_type, value, size);
}

fn write_bytes(out: &mut Vec<u8>, value_type: u8, value: u64, size: usize) {
    out.push((((size - 1) as u8) << 5) | value_type);
    for index in 0..size {
        out.push((value >> (8 * index)) as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::FixedIndex;

    fn encode(value: &EncodedValue) -> Vec<u8> {
        let mut out = Vec::new();
        value.write(&mut out, &FixedIndex::default()).unwrap();
        out
    }

    fn decode(bytes: &[u8]) -> EncodedValue {
        let resolver = FixedIndex::default();
        let mut parser = Parser::new(bytes);
        let value = EncodedValue::read(&mut parser, &resolver).unwrap();
        assert!(!parser.has_more_data());
        value
    }

    #[test]
    fn test_minimal_signed_width() {
        assert_eq!(encode(&EncodedValue::Int(0)), vec![0x04, 0x00]);
        assert_eq!(encode(&EncodedValue::Int(-1)), vec![0x04, 0xff]);
        assert_eq!(encode(&EncodedValue::Int(0x80)), vec![0x24, 0x80, 0x00]);
        assert_eq!(encode(&EncodedValue::Int(-129)), vec![0x24, 0x7f, 0xff]);
        assert_eq!(
            encode(&EncodedValue::Long(i64::MIN)),
            vec![0xe6, 0, 0, 0, 0, 0, 0, 0, 0x80]
        );
    }

    #[test]
    fn test_unsigned_and_boolean() {
        assert_eq!(encode(&EncodedValue::Char(0xffff)), vec![0x23, 0xff, 0xff]);
        assert_eq!(encode(&EncodedValue::Boolean(true)), vec![0x3f]);
        assert_eq!(encode(&EncodedValue::Boolean(false)), vec![0x1f]);
        assert_eq!(encode(&EncodedValue::Null), vec![0x1e]);
    }

    #[test]
    fn test_right_zero_extended_float() {
        // 1.0f = 0x3f800000, only the top byte pair survives
        let one = EncodedValue::Float(1.0f32.to_bits());
        assert_eq!(encode(&one), vec![0x30, 0x80, 0x3f]);
        assert_eq!(decode(&[0x30, 0x80, 0x3f]), one);

        let half = EncodedValue::Double(0.5f64.to_bits());
        assert_eq!(encode(&half), vec![0x31, 0xe0, 0x3f]);
        assert_eq!(decode(&[0x31, 0xe0, 0x3f]), half);
    }

    #[test]
    fn test_decode_sign_extension() {
        assert_eq!(decode(&[0x02, 0xfe]), EncodedValue::Short(-2));
        assert_eq!(decode(&[0x26, 0x00, 0x80]), EncodedValue::Long(-32768));
        assert_eq!(decode(&[0x23, 0x00, 0x80]), EncodedValue::Char(0x8000));
    }

    #[test]
    fn test_unknown_type() {
        let resolver = FixedIndex::default();
        let mut parser = Parser::new(&[0x05]);
        assert!(EncodedValue::read(&mut parser, &resolver).is_err());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(EncodedValue::default_for(b"Z"), EncodedValue::Boolean(false));
        assert_eq!(EncodedValue::default_for(b"J"), EncodedValue::Long(0));
        assert_eq!(EncodedValue::default_for(b"Ljava/lang/String;"), EncodedValue::Null);
        assert!(EncodedValue::Double(0).is_default());
        assert!(!EncodedValue::Double((-0.0f64).to_bits()).is_default());
    }
}
