//! Instruction decoding and encoding.
//!
//! Instructions are sequences of 16-bit code units. The low byte of the first unit is the
//! opcode, which selects one of the fixed instruction formats below and therefore the size of
//! the instruction. Three pseudo-instructions (switch tables and array data) start with a nop
//! opcode and an identifying high byte, and carry their own length.
//!
//! Only the parts of the instruction set that matter to index rewriting and relocation are
//! modelled structurally:
//!
//! - instructions with an item index operand keep the resolved item,
//! - string loads, branches and payload users are modelled by kind,
//! - everything else is kept as raw code units.

use std::fmt;

use strum::Display;

use crate::{
    model::{
        items::{CallSiteRc, FieldRc, MethodHandleRc, MethodRc, ProtoRc, TypeRc},
        string::StringRc,
        IndexLookup, IndexResolver,
    },
    Error::IndexOverflow,
    Result,
};

/// Opcode of `const-string`.
pub const OP_CONST_STRING: u8 = 0x1a;
/// Opcode of `const-string/jumbo`.
pub const OP_CONST_STRING_JUMBO: u8 = 0x1b;
/// Opcode of `fill-array-data`.
pub const OP_FILL_ARRAY_DATA: u8 = 0x26;
/// Opcode of `goto`.
pub const OP_GOTO: u8 = 0x28;
/// Opcode of `goto/16`.
pub const OP_GOTO_16: u8 = 0x29;
/// Opcode of `goto/32`.
pub const OP_GOTO_32: u8 = 0x2a;
/// Opcode of `packed-switch`.
pub const OP_PACKED_SWITCH: u8 = 0x2b;
/// Opcode of `sparse-switch`.
pub const OP_SPARSE_SWITCH: u8 = 0x2c;
/// Opcode of `if-eq`, the first register-pair comparison.
pub const OP_IF_EQ: u8 = 0x32;
/// Opcode of `if-eqz`, the first zero comparison.
pub const OP_IF_EQZ: u8 = 0x38;
/// Opcode of `invoke-polymorphic`.
pub const OP_INVOKE_POLYMORPHIC: u8 = 0xfa;
/// Opcode of `invoke-polymorphic/range`.
pub const OP_INVOKE_POLYMORPHIC_RANGE: u8 = 0xfb;

/// First unit of a `packed-switch` payload.
pub const PACKED_SWITCH_IDENT: u16 = 0x0100;
/// First unit of a `sparse-switch` payload.
pub const SPARSE_SWITCH_IDENT: u16 = 0x0200;
/// First unit of a `fill-array-data` payload.
pub const FILL_ARRAY_DATA_IDENT: u16 = 0x0300;

/// Instruction formats, named after the format identifiers of the instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[allow(missing_docs)]
pub enum Format {
    F10x,
    F12x,
    F11n,
    F11x,
    F10t,
    F20t,
    F22x,
    F21t,
    F21s,
    F21h,
    F21c,
    F23x,
    F22b,
    F22t,
    F22s,
    F22c,
    F32x,
    F30t,
    F31t,
    F31i,
    F31c,
    F35c,
    F3rc,
    F45cc,
    F4rcc,
    F51l,
}

impl Format {
    /// Size of the format in code units.
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            Format::F10x | Format::F12x | Format::F11n | Format::F11x | Format::F10t => 1,
            Format::F20t
            | Format::F22x
            | Format::F21t
            | Format::F21s
            | Format::F21h
            | Format::F21c
            | Format::F23x
            | Format::F22b
            | Format::F22t
            | Format::F22s
            | Format::F22c => 2,
            Format::F32x
            | Format::F30t
            | Format::F31t
            | Format::F31i
            | Format::F31c
            | Format::F35c
            | Format::F3rc => 3,
            Format::F45cc | Format::F4rcc => 4,
            Format::F51l => 5,
        }
    }
}

/// The format of `opcode`.
#[must_use]
pub fn format_of(opcode: u8) -> Format {
    match opcode {
        0x00 | 0x0e | 0x3e..=0x43 | 0x73 | 0x79 | 0x7a | 0xe3..=0xf9 => Format::F10x,
        0x01 | 0x04 | 0x07 | 0x21 | 0x7b..=0x8f | 0xb0..=0xcf => Format::F12x,
        0x02 | 0x05 | 0x08 => Format::F22x,
        0x03 | 0x06 | 0x09 => Format::F32x,
        0x0a..=0x0d | 0x0f..=0x11 | 0x1d | 0x1e | 0x27 => Format::F11x,
        0x12 => Format::F11n,
        0x13 | 0x16 => Format::F21s,
        0x14 | 0x17 => Format::F31i,
        0x15 | 0x19 => Format::F21h,
        0x18 => Format::F51l,
        0x1a | 0x1c | 0x1f | 0x22 | 0x60..=0x6d | 0xfe | 0xff => Format::F21c,
        0x1b => Format::F31c,
        0x20 | 0x23 | 0x52..=0x5f => Format::F22c,
        0x24 | 0x6e..=0x72 | 0xfc => Format::F35c,
        0x25 | 0x74..=0x78 | 0xfd => Format::F3rc,
        0x26 | 0x2b | 0x2c => Format::F31t,
        0x28 => Format::F10t,
        0x29 => Format::F20t,
        0x2a => Format::F30t,
        0x2d..=0x31 | 0x44..=0x51 | 0x90..=0xaf => Format::F23x,
        0x32..=0x37 => Format::F22t,
        0x38..=0x3d => Format::F21t,
        0xd0..=0xd7 => Format::F22s,
        0xd8..=0xe2 => Format::F22b,
        0xfa => Format::F45cc,
        0xfb => Format::F4rcc,
    }
}

/// Kind of item an index operand refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RefKind {
    /// String id
    String,
    /// Type id
    Type,
    /// Field id
    Field,
    /// Method id
    Method,
    /// Proto id
    Proto,
    /// Call site id
    CallSite,
    /// Method handle id
    MethodHandle,
}

/// The kind of item referenced by the index operand of `opcode`, if it has one.
///
/// String loads are modelled separately and return `None`.
#[must_use]
pub fn ref_kind_of(opcode: u8) -> Option<RefKind> {
    match opcode {
        0x1c | 0x1f | 0x20 | 0x22 | 0x23 | 0x24 | 0x25 => Some(RefKind::Type),
        0x52..=0x6d => Some(RefKind::Field),
        0x6e..=0x72 | 0x74..=0x78 | 0xfa | 0xfb => Some(RefKind::Method),
        0xfc | 0xfd => Some(RefKind::CallSite),
        0xfe => Some(RefKind::MethodHandle),
        0xff => Some(RefKind::Proto),
        _ => None,
    }
}

/// A resolved index operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemRef {
    /// A string
    String(StringRc),
    /// A type
    Type(TypeRc),
    /// A field
    Field(FieldRc),
    /// A method
    Method(MethodRc),
    /// A prototype
    Proto(ProtoRc),
    /// A call site
    CallSite(CallSiteRc),
    /// A method handle
    MethodHandle(MethodHandleRc),
}

impl ItemRef {
    /// Resolve `index` of `kind`.
    ///
    /// # Errors
    /// Returns an error if the index is out of range.
    pub fn resolve(kind: RefKind, index: u32, resolver: &dyn IndexResolver) -> Result<ItemRef> {
        Ok(match kind {
            RefKind::String => ItemRef::String(resolver.string(index)?),
            RefKind::Type => ItemRef::Type(resolver.ty(index)?),
            RefKind::Field => ItemRef::Field(resolver.field(index)?),
            RefKind::Method => ItemRef::Method(resolver.method(index)?),
            RefKind::Proto => ItemRef::Proto(resolver.proto(index)?),
            RefKind::CallSite => ItemRef::CallSite(resolver.call_site(index)?),
            RefKind::MethodHandle => ItemRef::MethodHandle(resolver.method_handle(index)?),
        })
    }

    /// The output index of the referenced item.
    ///
    /// # Errors
    /// Returns an error if the item is not part of the output.
    pub fn index(&self, lookup: &dyn IndexLookup) -> Result<u32> {
        match self {
            ItemRef::String(item) => lookup.string_index(item),
            ItemRef::Type(item) => lookup.type_index(item),
            ItemRef::Field(item) => lookup.field_index(item),
            ItemRef::Method(item) => lookup.method_index(item),
            ItemRef::Proto(item) => lookup.proto_index(item),
            ItemRef::CallSite(item) => lookup.call_site_index(item),
            ItemRef::MethodHandle(item) => lookup.method_handle_index(item),
        }
    }

    /// Name of the item kind, for diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            ItemRef::String(_) => "string",
            ItemRef::Type(_) => "type",
            ItemRef::Field(_) => "field",
            ItemRef::Method(_) => "method",
            ItemRef::Proto(_) => "proto",
            ItemRef::CallSite(_) => "call site",
            ItemRef::MethodHandle(_) => "method handle",
        }
    }
}

/// Comparison of a conditional branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum IfTest {
    /// `==`
    Eq = 0,
    /// `!=`
    Ne = 1,
    /// `<`
    Lt = 2,
    /// `>=`
    Ge = 3,
    /// `>`
    Gt = 4,
    /// `<=`
    Le = 5,
}

impl IfTest {
    fn from_index(index: u8) -> IfTest {
        match index {
            0 => IfTest::Eq,
            1 => IfTest::Ne,
            2 => IfTest::Lt,
            3 => IfTest::Ge,
            4 => IfTest::Gt,
            _ => IfTest::Le,
        }
    }

    /// The comparison that holds exactly when this one does not.
    #[must_use]
    pub fn invert(self) -> IfTest {
        match self {
            IfTest::Eq => IfTest::Ne,
            IfTest::Ne => IfTest::Eq,
            IfTest::Lt => IfTest::Ge,
            IfTest::Ge => IfTest::Lt,
            IfTest::Gt => IfTest::Le,
            IfTest::Le => IfTest::Gt,
        }
    }
}

/// Instructions that reference a payload pseudo-instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum PayloadKind {
    /// `fill-array-data`
    FillArrayData,
    /// `packed-switch`
    PackedSwitch,
    /// `sparse-switch`
    SparseSwitch,
}

impl PayloadKind {
    fn opcode(self) -> u8 {
        match self {
            PayloadKind::FillArrayData => OP_FILL_ARRAY_DATA,
            PayloadKind::PackedSwitch => OP_PACKED_SWITCH,
            PayloadKind::SparseSwitch => OP_SPARSE_SWITCH,
        }
    }
}

/// A decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Insn {
    /// `nop`
    Nop,
    /// Any instruction without index operand or relative target, kept as raw units
    Simple {
        /// Raw code units, opcode included
        units: Vec<u16>,
    },
    /// An instruction with an index operand at unit 1
    Ref {
        /// Raw code units, opcode included; index operands are patched on encode
        units: Vec<u16>,
        /// The referenced item
        item: ItemRef,
        /// Second operand of `invoke-polymorphic`, at unit 3
        proto: Option<ProtoRc>,
    },
    /// `const-string vAA, string@BBBB`
    ConstString {
        /// Destination register
        register: u8,
        /// The string
        string: StringRc,
    },
    /// `const-string/jumbo vAA, string@BBBBBBBB`
    ConstStringJumbo {
        /// Destination register
        register: u8,
        /// The string
        string: StringRc,
    },
    /// `goto +AA`
    Goto {
        /// Relative target in code units
        offset: i8,
    },
    /// `goto/16 +AAAA`
    Goto16 {
        /// Relative target in code units
        offset: i16,
    },
    /// `goto/32 +AAAAAAAA`
    Goto32 {
        /// Relative target in code units
        offset: i32,
    },
    /// `if-test vA, vB, +CCCC`
    IfTest {
        /// The comparison
        test: IfTest,
        /// First register
        a: u8,
        /// Second register
        b: u8,
        /// Relative target in code units
        offset: i16,
    },
    /// `if-testz vAA, +BBBB`
    IfTestZ {
        /// The comparison against zero
        test: IfTest,
        /// Register
        a: u8,
        /// Relative target in code units
        offset: i16,
    },
    /// `fill-array-data`, `packed-switch` or `sparse-switch`
    PayloadUser {
        /// Which instruction
        kind: PayloadKind,
        /// Operand register
        register: u8,
        /// Relative offset of the payload in code units
        offset: i32,
    },
    /// Jump table of a `packed-switch`
    PackedSwitchPayload {
        /// Key of the first target
        first_key: i32,
        /// Targets relative to the switch instruction
        targets: Vec<i32>,
    },
    /// Jump table of a `sparse-switch`
    SparseSwitchPayload {
        /// Sorted keys
        keys: Vec<i32>,
        /// Targets relative to the switch instruction
        targets: Vec<i32>,
    },
    /// Data of a `fill-array-data`
    FillArrayDataPayload {
        /// Width of one element in bytes
        element_width: u16,
        /// Number of elements
        size: u32,
        /// Element bytes, padded to full units
        data: Vec<u8>,
    },
}

fn unit_at(units: &[u16], index: usize) -> Result<u16> {
    units.get(index).copied().ok_or(out_of_bounds_error!())
}

fn i32_at(units: &[u16], index: usize) -> Result<i32> {
    let low = u32::from(unit_at(units, index)?);
    let high = u32::from(unit_at(units, index + 1)?);
    Ok((low | (high << 16)) as i32)
}

fn push_i32(out: &mut Vec<u16>, value: i32) {
    out.push(value as u32 as u16);
    out.push(((value as u32) >> 16) as u16);
}

fn narrow_index(item: &ItemRef, lookup: &dyn IndexLookup) -> Result<u16> {
    let index = item.index(lookup)?;
    u16::try_from(index).map_err(|_| IndexOverflow {
        kind: item.kind_name(),
        index: index as usize,
    })
}

impl Insn {
    /// Decode the instruction at the start of `units`.
    ///
    /// # Errors
    /// Returns an error if the instruction is truncated or an operand cannot be resolved.
    pub fn decode(units: &[u16], resolver: &dyn IndexResolver) -> Result<Insn> {
        let first = unit_at(units, 0)?;
        let opcode = (first & 0xff) as u8;
        let high = (first >> 8) as u8;

        if opcode == 0 {
            return match first {
                0 => Ok(Insn::Nop),
                PACKED_SWITCH_IDENT => {
                    let size = usize::from(unit_at(units, 1)?);
                    let first_key = i32_at(units, 2)?;
                    let targets = (0..size)
                        .map(|i| i32_at(units, 4 + 2 * i))
                        .collect::<Result<Vec<_>>>()?;
                    Ok(Insn::PackedSwitchPayload { first_key, targets })
                }
                SPARSE_SWITCH_IDENT => {
                    let size = usize::from(unit_at(units, 1)?);
                    let keys = (0..size)
                        .map(|i| i32_at(units, 2 + 2 * i))
                        .collect::<Result<Vec<_>>>()?;
                    let targets = (0..size)
                        .map(|i| i32_at(units, 2 + 2 * size + 2 * i))
                        .collect::<Result<Vec<_>>>()?;
                    Ok(Insn::SparseSwitchPayload { keys, targets })
                }
                FILL_ARRAY_DATA_IDENT => {
                    let element_width = unit_at(units, 1)?;
                    let size = i32_at(units, 2)? as u32;
                    let byte_count = usize::from(element_width)
                        .checked_mul(size as usize)
                        .ok_or(out_of_bounds_error!())?;
                    let unit_count = byte_count.div_ceil(2);
                    let mut data = Vec::with_capacity(unit_count * 2);
                    for i in 0..unit_count {
                        data.extend_from_slice(&unit_at(units, 4 + i)?.to_le_bytes());
                    }
                    Ok(Insn::FillArrayDataPayload {
                        element_width,
                        size,
                        data,
                    })
                }
                other => Ok(Insn::Simple { units: vec![other] }),
            };
        }

        let size = format_of(opcode).size();
        if units.len() < size {
            return Err(malformed_error!(
                "Instruction 0x{:02x} needs {} units, {} left",
                opcode,
                size,
                units.len()
            ));
        }

        Ok(match opcode {
            OP_CONST_STRING => Insn::ConstString {
                register: high,
                string: resolver.string(u32::from(units[1]))?,
            },
            OP_CONST_STRING_JUMBO => Insn::ConstStringJumbo {
                register: high,
                string: resolver.string(i32_at(units, 1)? as u32)?,
            },
            OP_GOTO => Insn::Goto { offset: high as i8 },
            OP_GOTO_16 => Insn::Goto16 {
                offset: units[1] as i16,
            },
            OP_GOTO_32 => Insn::Goto32 {
                offset: i32_at(units, 1)?,
            },
            OP_FILL_ARRAY_DATA | OP_PACKED_SWITCH | OP_SPARSE_SWITCH => Insn::PayloadUser {
                kind: match opcode {
                    OP_FILL_ARRAY_DATA => PayloadKind::FillArrayData,
                    OP_PACKED_SWITCH => PayloadKind::PackedSwitch,
                    _ => PayloadKind::SparseSwitch,
                },
                register: high,
                offset: i32_at(units, 1)?,
            },
            0x32..=0x37 => Insn::IfTest {
                test: IfTest::from_index(opcode - OP_IF_EQ),
                a: high & 0x0f,
                b: high >> 4,
                offset: units[1] as i16,
            },
            0x38..=0x3d => Insn::IfTestZ {
                test: IfTest::from_index(opcode - OP_IF_EQZ),
                a: high,
                offset: units[1] as i16,
            },
            _ => match ref_kind_of(opcode) {
                Some(kind) => {
                    let item = ItemRef::resolve(kind, u32::from(units[1]), resolver)?;
                    let proto = if opcode == OP_INVOKE_POLYMORPHIC
                        || opcode == OP_INVOKE_POLYMORPHIC_RANGE
                    {
                        Some(resolver.proto(u32::from(units[3]))?)
                    } else {
                        None
                    };
                    Insn::Ref {
                        units: units[..size].to_vec(),
                        item,
                        proto,
                    }
                }
                None => Insn::Simple {
                    units: units[..size].to_vec(),
                },
            },
        })
    }

    /// Size in code units.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Insn::Nop | Insn::Goto { .. } => 1,
            Insn::Simple { units } | Insn::Ref { units, .. } => units.len(),
            Insn::ConstString { .. }
            | Insn::Goto16 { .. }
            | Insn::IfTest { .. }
            | Insn::IfTestZ { .. } => 2,
            Insn::ConstStringJumbo { .. } | Insn::Goto32 { .. } | Insn::PayloadUser { .. } => 3,
            Insn::PackedSwitchPayload { targets, .. } => 4 + targets.len() * 2,
            Insn::SparseSwitchPayload { keys, targets } => 2 + keys.len() * 2 + targets.len() * 2,
            Insn::FillArrayDataPayload {
                element_width,
                size,
                ..
            } => 4 + (usize::from(*element_width) * *size as usize).div_ceil(2),
        }
    }

    /// Whether this is a payload pseudo-instruction.
    #[must_use]
    pub fn is_payload(&self) -> bool {
        matches!(
            self,
            Insn::PackedSwitchPayload { .. }
                | Insn::SparseSwitchPayload { .. }
                | Insn::FillArrayDataPayload { .. }
        )
    }

    /// The relative target of a branch or payload user.
    #[must_use]
    pub fn branch_offset(&self) -> Option<i32> {
        match self {
            Insn::Goto { offset } => Some(i32::from(*offset)),
            Insn::Goto16 { offset } => Some(i32::from(*offset)),
            Insn::Goto32 { offset } => Some(*offset),
            Insn::IfTest { offset, .. } | Insn::IfTestZ { offset, .. } => Some(i32::from(*offset)),
            Insn::PayloadUser { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    /// The string loaded by `const-string` or `const-string/jumbo`.
    #[must_use]
    pub fn loaded_string(&self) -> Option<&StringRc> {
        match self {
            Insn::ConstString { string, .. } | Insn::ConstStringJumbo { string, .. } => {
                Some(string)
            }
            _ => None,
        }
    }

    /// Items referenced through index operands.
    pub fn item_refs(&self) -> Vec<ItemRef> {
        match self {
            Insn::Ref { item, proto, .. } => {
                let mut refs = vec![item.clone()];
                if let Some(proto) = proto {
                    refs.push(ItemRef::Proto(proto.clone()));
                }
                refs
            }
            Insn::ConstString { string, .. } | Insn::ConstStringJumbo { string, .. } => {
                vec![ItemRef::String(string.clone())]
            }
            _ => Vec::new(),
        }
    }

    /// Append the encoded code units to `out`.
    ///
    /// # Errors
    /// Returns [`crate::Error::IndexOverflow`] if an index does not fit its operand.
    pub fn encode(&self, out: &mut Vec<u16>, lookup: &dyn IndexLookup) -> Result<()> {
        match self {
            Insn::Nop => out.push(0),
            Insn::Simple { units } => out.extend_from_slice(units),
            Insn::Ref { units, item, proto } => {
                let start = out.len();
                out.extend_from_slice(units);
                out[start + 1] = narrow_index(item, lookup)?;
                if let Some(proto) = proto {
                    out[start + 3] = narrow_index(&ItemRef::Proto(proto.clone()), lookup)?;
                }
            }
            Insn::ConstString { register, string } => {
                let index = lookup.string_index(string)?;
                let index = u16::try_from(index).map_err(|_| IndexOverflow {
                    kind: "string",
                    index: index as usize,
                })?;
                out.push(u16::from(OP_CONST_STRING) | (u16::from(*register) << 8));
                out.push(index);
            }
            Insn::ConstStringJumbo { register, string } => {
                out.push(u16::from(OP_CONST_STRING_JUMBO) | (u16::from(*register) << 8));
                push_i32(out, lookup.string_index(string)? as i32);
            }
            Insn::Goto { offset } => {
                out.push(u16::from(OP_GOTO) | (u16::from(*offset as u8) << 8));
            }
            Insn::Goto16 { offset } => {
                out.push(u16::from(OP_GOTO_16));
                out.push(*offset as u16);
            }
            Insn::Goto32 { offset } => {
                out.push(u16::from(OP_GOTO_32));
                push_i32(out, *offset);
            }
            Insn::IfTest { test, a, b, offset } => {
                out.push(
                    u16::from(OP_IF_EQ + *test as u8)
                        | (u16::from(*a & 0x0f) << 8)
                        | (u16::from(*b & 0x0f) << 12),
                );
                out.push(*offset as u16);
            }
            Insn::IfTestZ { test, a, offset } => {
                out.push(u16::from(OP_IF_EQZ + *test as u8) | (u16::from(*a) << 8));
                out.push(*offset as u16);
            }
            Insn::PayloadUser {
                kind,
                register,
                offset,
            } => {
                out.push(u16::from(kind.opcode()) | (u16::from(*register) << 8));
                push_i32(out, *offset);
            }
            Insn::PackedSwitchPayload { first_key, targets } => {
                out.push(PACKED_SWITCH_IDENT);
                out.push(targets.len() as u16);
                push_i32(out, *first_key);
                for target in targets {
                    push_i32(out, *target);
                }
            }
            Insn::SparseSwitchPayload { keys, targets } => {
                out.push(SPARSE_SWITCH_IDENT);
                out.push(keys.len() as u16);
                for key in keys {
                    push_i32(out, *key);
                }
                for target in targets {
                    push_i32(out, *target);
                }
            }
            Insn::FillArrayDataPayload {
                element_width,
                size,
                data,
            } => {
                out.push(FILL_ARRAY_DATA_IDENT);
                out.push(*element_width);
                push_i32(out, *size as i32);
                let unit_count = (usize::from(*element_width) * *size as usize).div_ceil(2);
                for i in 0..unit_count {
                    let low = data.get(2 * i).copied().unwrap_or(0);
                    let high = data.get(2 * i + 1).copied().unwrap_or(0);
                    out.push(u16::from_le_bytes([low, high]));
                }
            }
        }
        Ok(())
    }
}

/// An instruction and its offset inside the method, in code units.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instruction {
    /// Offset in code units from the start of the instruction stream
    pub offset: u32,
    /// The instruction
    pub insn: Insn,
}

impl Instruction {
    /// Size in code units.
    #[must_use]
    pub fn size(&self) -> usize {
        self.insn.size()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}: {:?}", self.offset, self.insn)
    }
}

/// Decode a complete instruction stream.
///
/// # Errors
/// Returns an error if an instruction is truncated or an operand cannot be resolved.
pub fn decode_instructions(
    units: &[u16],
    resolver: &dyn IndexResolver,
) -> Result<Vec<Instruction>> {
    let mut instructions = Vec::new();
    let mut offset = 0usize;
    while offset < units.len() {
        let insn = Insn::decode(&units[offset..], resolver)?;
        let size = insn.size();
        instructions.push(Instruction {
            offset: offset as u32,
            insn,
        });
        offset += size;
    }
    Ok(instructions)
}

/// Encode a complete instruction stream.
///
/// # Errors
/// Returns an error if an index does not fit its operand.
pub fn encode_instructions(
    instructions: &[Instruction],
    lookup: &dyn IndexLookup,
) -> Result<Vec<u16>> {
    let mut out = Vec::new();
    for instruction in instructions {
        instruction.insn.encode(&mut out, lookup)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::FixedIndex;

    #[test]
    fn test_format_sizes() {
        assert_eq!(format_of(0x00).size(), 1);
        assert_eq!(format_of(0x1a).size(), 2);
        assert_eq!(format_of(0x1b).size(), 3);
        assert_eq!(format_of(0x18).size(), 5);
        assert_eq!(format_of(0x6e).size(), 3);
        assert_eq!(format_of(0xfa).size(), 4);
        assert_eq!(format_of(0x0e).size(), 1);
        assert_eq!(format_of(0xd8).size(), 2);
    }

    #[test]
    fn test_decode_mixed_stream() {
        let index = FixedIndex::default();
        // const-string v0, string@3; if-eqz v0, +3; invoke-static {v0}, method@7; return-void
        let units = [0x001a, 0x0003, 0x0038, 0x0003, 0x1071, 0x0007, 0x0000, 0x000e];
        let instructions = decode_instructions(&units, &index).unwrap();

        assert_eq!(instructions.len(), 4);
        assert_eq!(instructions[1].offset, 2);
        assert!(matches!(
            instructions[1].insn,
            Insn::IfTestZ {
                test: IfTest::Eq,
                a: 0,
                offset: 3
            }
        ));
        assert!(matches!(instructions[2].insn, Insn::Ref { .. }));
        assert_eq!(instructions[3].offset, 7);

        let encoded = encode_instructions(&instructions, &index).unwrap();
        assert_eq!(encoded, units);
    }

    #[test]
    fn test_payloads() {
        let index = FixedIndex::default();
        let units = [
            PACKED_SWITCH_IDENT,
            2,
            10,
            0,
            5,
            0,
            0xfffe,
            0xffff,
            FILL_ARRAY_DATA_IDENT,
            1,
            3,
            0,
            0x0201,
            0x0003,
        ];
        let instructions = decode_instructions(&units, &index).unwrap();
        assert_eq!(instructions.len(), 2);
        assert_eq!(
            instructions[0].insn,
            Insn::PackedSwitchPayload {
                first_key: 10,
                targets: vec![5, -2]
            }
        );
        assert_eq!(instructions[1].offset, 8);
        assert_eq!(instructions[1].size(), 6);

        let encoded = encode_instructions(&instructions, &index).unwrap();
        assert_eq!(encoded, units);
    }

    #[test]
    fn test_narrow_string_overflow() {
        let index = FixedIndex {
            string_index: Some(0x1_0000),
            ..FixedIndex::default()
        };
        let string = index.string(0).unwrap();
        let insn = Insn::ConstString {
            register: 0,
            string: string.clone(),
        };
        assert!(matches!(
            insn.encode(&mut Vec::new(), &index),
            Err(IndexOverflow { kind: "string", .. })
        ));

        let jumbo = Insn::ConstStringJumbo {
            register: 1,
            string,
        };
        let mut out = Vec::new();
        jumbo.encode(&mut out, &index).unwrap();
        assert_eq!(out, vec![0x011b, 0x0000, 0x0001]);
    }

    #[test]
    fn test_if_test_invert() {
        for test in [
            IfTest::Eq,
            IfTest::Ne,
            IfTest::Lt,
            IfTest::Ge,
            IfTest::Gt,
            IfTest::Le,
        ] {
            assert_ne!(test.invert(), test);
            assert_eq!(test.invert().invert(), test);
        }
    }
}
