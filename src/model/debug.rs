//! Debug information: line tables and local variable ranges.
//!
//! Debug info is a small state machine program. Besides the general event-based encoding, a
//! compact pc-based form exists for methods whose line table maps every instruction offset to
//! the line with the same number: start line 0, no parameter names, a zero-change special event
//! followed by one-line/one-unit special events only. Whether an encoded program can be read
//! as pc-based depends on the method referencing it, so the reader may decode the same bytes
//! both ways.

use std::sync::Arc;

use crate::{
    file::{
        io::{write_sleb128, write_uleb128},
        parser::Parser,
    },
    model::{items::TypeRc, string::StringRc, IndexLookup, IndexResolver},
    Result,
};

const DBG_END_SEQUENCE: u8 = 0x00;
const DBG_ADVANCE_PC: u8 = 0x01;
const DBG_ADVANCE_LINE: u8 = 0x02;
const DBG_START_LOCAL: u8 = 0x03;
const DBG_START_LOCAL_EXTENDED: u8 = 0x04;
const DBG_END_LOCAL: u8 = 0x05;
const DBG_RESTART_LOCAL: u8 = 0x06;
const DBG_SET_PROLOGUE_END: u8 = 0x07;
const DBG_SET_EPILOGUE_BEGIN: u8 = 0x08;
const DBG_SET_FILE: u8 = 0x09;

/// First special opcode.
pub const DBG_FIRST_SPECIAL: u8 = 0x0a;
/// Smallest line delta of a special opcode.
pub const DBG_LINE_BASE: i32 = -4;
/// Number of line deltas a special opcode can express.
pub const DBG_LINE_RANGE: i32 = 15;

/// Start line that marks pc-based debug info.
pub const PC_BASED_START_LINE: u32 = 0;

/// A shared debug info program.
pub type DebugInfoRc = Arc<DebugInfo>;

/// One event of the line number state machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DebugEvent {
    /// Advance the address without emitting a row
    AdvancePc(u32),
    /// Advance the line without emitting a row
    AdvanceLine(i32),
    /// Introduce a local variable
    StartLocal {
        /// Register holding the local
        register: u32,
        /// Variable name
        name: Option<StringRc>,
        /// Variable type
        ty: Option<TypeRc>,
        /// Generic signature
        signature: Option<StringRc>,
    },
    /// End a local variable
    EndLocal(u32),
    /// Reintroduce a previously ended local
    RestartLocal(u32),
    /// End of the method prologue
    PrologueEnd,
    /// Start of the method epilogue
    EpilogueBegin,
    /// Switch the source file
    SetFile(Option<StringRc>),
    /// Advance line and address, then emit a row
    Default {
        /// Line advance in `-4..=10`
        line_delta: i32,
        /// Address advance in code units
        pc_delta: u32,
    },
}

impl DebugEvent {
    /// A special event, if the deltas fit a special opcode.
    #[must_use]
    pub fn special(line_delta: i32, pc_delta: u32) -> Option<DebugEvent> {
        let event = DebugEvent::Default {
            line_delta,
            pc_delta,
        };
        event.special_opcode().map(|_| event)
    }

    fn from_special_opcode(opcode: u8) -> DebugEvent {
        let adjusted = i32::from(opcode - DBG_FIRST_SPECIAL);
        DebugEvent::Default {
            line_delta: DBG_LINE_BASE + adjusted % DBG_LINE_RANGE,
            pc_delta: (adjusted / DBG_LINE_RANGE) as u32,
        }
    }

    /// The special opcode for a `Default` event, if its deltas are encodable.
    #[must_use]
    pub fn special_opcode(&self) -> Option<u8> {
        match self {
            DebugEvent::Default {
                line_delta,
                pc_delta,
            } => {
                if *line_delta < DBG_LINE_BASE || *line_delta >= DBG_LINE_BASE + DBG_LINE_RANGE {
                    return None;
                }
                let opcode = i64::from(DBG_FIRST_SPECIAL)
                    + i64::from(line_delta - DBG_LINE_BASE)
                    + i64::from(DBG_LINE_RANGE) * i64::from(*pc_delta);
                u8::try_from(opcode).ok()
            }
            _ => None,
        }
    }

    /// Address advance caused by this event.
    #[must_use]
    pub fn pc_delta(&self) -> u32 {
        match self {
            DebugEvent::AdvancePc(delta) => *delta,
            DebugEvent::Default { pc_delta, .. } => *pc_delta,
            _ => 0,
        }
    }

    fn write(&self, out: &mut Vec<u8>, lookup: &dyn IndexLookup) -> Result<()> {
        match self {
            DebugEvent::AdvancePc(delta) => {
                out.push(DBG_ADVANCE_PC);
                write_uleb128(out, *delta);
            }
            DebugEvent::AdvanceLine(delta) => {
                out.push(DBG_ADVANCE_LINE);
                write_sleb128(out, *delta);
            }
            DebugEvent::StartLocal {
                register,
                name,
                ty,
                signature,
            } => {
                out.push(if signature.is_some() {
                    DBG_START_LOCAL_EXTENDED
                } else {
                    DBG_START_LOCAL
                });
                write_uleb128(out, *register);
                write_optional(out, name.as_ref().map(|n| lookup.string_index(n)).transpose()?);
                write_optional(out, ty.as_ref().map(|t| lookup.type_index(t)).transpose()?);
                if let Some(signature) = signature {
                    write_optional(out, Some(lookup.string_index(signature)?));
                }
            }
            DebugEvent::EndLocal(register) => {
                out.push(DBG_END_LOCAL);
                write_uleb128(out, *register);
            }
            DebugEvent::RestartLocal(register) => {
                out.push(DBG_RESTART_LOCAL);
                write_uleb128(out, *register);
            }
            DebugEvent::PrologueEnd => out.push(DBG_SET_PROLOGUE_END),
            DebugEvent::EpilogueBegin => out.push(DBG_SET_EPILOGUE_BEGIN),
            DebugEvent::SetFile(name) => {
                out.push(DBG_SET_FILE);
                write_optional(out, name.as_ref().map(|n| lookup.string_index(n)).transpose()?);
            }
            DebugEvent::Default { .. } => match self.special_opcode() {
                Some(opcode) => out.push(opcode),
                None => return Err(malformed_error!("Special debug event out of range: {:?}", self)),
            },
        }
        Ok(())
    }
}

/// Event-based debug info.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventBasedDebugInfo {
    /// Initial value of the line register
    pub start_line: u32,
    /// Parameter names, `None` for unnamed parameters
    pub parameters: Vec<Option<StringRc>>,
    /// The program
    pub events: Vec<DebugEvent>,
}

/// Debug info of one method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DebugInfo {
    /// Line equals instruction offset, up to `max_pc`
    PcBased {
        /// Number of (unnamed) parameters
        parameter_count: u32,
        /// Highest instruction offset covered
        max_pc: u32,
    },
    /// The general form
    EventBased(EventBasedDebugInfo),
}

impl DebugInfo {
    /// Decode a debug info program.
    ///
    /// With `allow_pc_based`, a program that matches the pc-based shape is returned as
    /// [`DebugInfo::PcBased`]. A program without events is never pc-based.
    ///
    /// # Errors
    /// Returns an error on truncated input or unresolvable indices.
    pub fn read(
        parser: &mut Parser,
        resolver: &dyn IndexResolver,
        allow_pc_based: bool,
    ) -> Result<DebugInfo> {
        let start_line = parser.read_uleb128()?;
        let mut pc_based = allow_pc_based && start_line == PC_BASED_START_LINE;

        let parameter_count = parser.read_uleb128()?;
        let mut parameters = Vec::with_capacity(parameter_count.min(256) as usize);
        for _ in 0..parameter_count {
            let name = match parser.read_uleb128p1()? {
                Some(index) => {
                    pc_based = false;
                    Some(resolver.string(index)?)
                }
                None => None,
            };
            parameters.push(name);
        }

        let mut events = Vec::new();
        loop {
            let opcode = parser.read_le::<u8>()?;
            let event = match opcode {
                DBG_END_SEQUENCE => break,
                DBG_ADVANCE_PC => DebugEvent::AdvancePc(parser.read_uleb128()?),
                DBG_ADVANCE_LINE => DebugEvent::AdvanceLine(parser.read_sleb128()?),
                DBG_START_LOCAL | DBG_START_LOCAL_EXTENDED => {
                    let register = parser.read_uleb128()?;
                    let name = read_optional_string(parser, resolver)?;
                    let ty = match parser.read_uleb128p1()? {
                        Some(index) => Some(resolver.ty(index)?),
                        None => None,
                    };
                    let signature = if opcode == DBG_START_LOCAL_EXTENDED {
                        read_optional_string(parser, resolver)?
                    } else {
                        None
                    };
                    DebugEvent::StartLocal {
                        register,
                        name,
                        ty,
                        signature,
                    }
                }
                DBG_END_LOCAL => DebugEvent::EndLocal(parser.read_uleb128()?),
                DBG_RESTART_LOCAL => DebugEvent::RestartLocal(parser.read_uleb128()?),
                DBG_SET_PROLOGUE_END => DebugEvent::PrologueEnd,
                DBG_SET_EPILOGUE_BEGIN => DebugEvent::EpilogueBegin,
                DBG_SET_FILE => DebugEvent::SetFile(read_optional_string(parser, resolver)?),
                special => {
                    let event = DebugEvent::from_special_opcode(special);
                    if pc_based {
                        let expected = if events.is_empty() { (0, 0) } else { (1, 1) };
                        pc_based = event
                            == DebugEvent::Default {
                                line_delta: expected.0,
                                pc_delta: expected.1,
                            };
                    }
                    events.push(event);
                    continue;
                }
            };
            pc_based = false;
            events.push(event);
        }

        if pc_based && !events.is_empty() {
            Ok(DebugInfo::PcBased {
                parameter_count,
                max_pc: events.len() as u32 - 1,
            })
        } else {
            Ok(DebugInfo::EventBased(EventBasedDebugInfo {
                start_line,
                parameters,
                events,
            }))
        }
    }

    /// Whether this is the pc-based form.
    #[must_use]
    pub fn is_pc_based(&self) -> bool {
        matches!(self, DebugInfo::PcBased { .. })
    }

    /// The equivalent event-based program.
    #[must_use]
    pub fn to_event_based(&self) -> EventBasedDebugInfo {
        match self {
            DebugInfo::EventBased(info) => info.clone(),
            DebugInfo::PcBased {
                parameter_count,
                max_pc,
            } => {
                let mut events = Vec::with_capacity(*max_pc as usize + 1);
                events.push(DebugEvent::Default {
                    line_delta: 0,
                    pc_delta: 0,
                });
                for _ in 0..*max_pc {
                    events.push(DebugEvent::Default {
                        line_delta: 1,
                        pc_delta: 1,
                    });
                }
                EventBasedDebugInfo {
                    start_line: PC_BASED_START_LINE,
                    parameters: vec![None; *parameter_count as usize],
                    events,
                }
            }
        }
    }

    /// Strings referenced by the program.
    pub fn strings(&self) -> Vec<StringRc> {
        let mut strings = Vec::new();
        if let DebugInfo::EventBased(info) = self {
            strings.extend(info.parameters.iter().flatten().cloned());
            for event in &info.events {
                match event {
                    DebugEvent::StartLocal {
                        name, signature, ..
                    } => {
                        strings.extend(name.iter().cloned());
                        strings.extend(signature.iter().cloned());
                    }
                    DebugEvent::SetFile(Some(name)) => strings.push(name.clone()),
                    _ => {}
                }
            }
        }
        strings
    }

    /// Types referenced by the program.
    pub fn types(&self) -> Vec<TypeRc> {
        match self {
            DebugInfo::EventBased(info) => info
                .events
                .iter()
                .filter_map(|event| match event {
                    DebugEvent::StartLocal { ty: Some(ty), .. } => Some(ty.clone()),
                    _ => None,
                })
                .collect(),
            DebugInfo::PcBased { .. } => Vec::new(),
        }
    }

    /// Encode the program, terminated by an end-sequence opcode.
    ///
    /// # Errors
    /// Returns an error if a referenced item has no index.
    pub fn write(&self, out: &mut Vec<u8>, lookup: &dyn IndexLookup) -> Result<()> {
        match self {
            DebugInfo::PcBased {
                parameter_count,
                max_pc,
            } => {
                write_uleb128(out, PC_BASED_START_LINE);
                write_uleb128(out, *parameter_count);
                for _ in 0..*parameter_count {
                    write_optional(out, None);
                }
                // (0, 0) then one (1, 1) row per unit
                out.push(0x0e);
                for _ in 0..*max_pc {
                    out.push(0x1e);
                }
            }
            DebugInfo::EventBased(info) => {
                write_uleb128(out, info.start_line);
                write_uleb128(out, info.parameters.len() as u32);
                for parameter in &info.parameters {
                    write_optional(
                        out,
                        parameter.as_ref().map(|p| lookup.string_index(p)).transpose()?,
                    );
                }
                for event in &info.events {
                    event.write(out, lookup)?;
                }
            }
        }
        out.push(DBG_END_SEQUENCE);
        Ok(())
    }
}

fn read_optional_string(
    parser: &mut Parser,
    resolver: &dyn IndexResolver,
) -> Result<Option<StringRc>> {
    match parser.read_uleb128p1()? {
        Some(index) => Ok(Some(resolver.string(index)?)),
        None => Ok(None),
    }
}

fn write_optional(out: &mut Vec<u8>, index: Option<u32>) {
    write_uleb128(out, index.map_or(0, |index| index + 1));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::FixedIndex;

    #[test]
    fn test_special_opcode() {
        let event = DebugEvent::special(0, 0).unwrap();
        assert_eq!(event.special_opcode(), Some(0x0e));
        let event = DebugEvent::special(1, 1).unwrap();
        assert_eq!(event.special_opcode(), Some(0x1e));
        assert_eq!(DebugEvent::from_special_opcode(0x1e), event);

        assert!(DebugEvent::special(11, 0).is_none());
        assert!(DebugEvent::special(-5, 0).is_none());
        assert!(DebugEvent::special(0, 17).is_none());
    }

    #[test]
    fn test_pc_based_detection() {
        let index = FixedIndex::default();
        let bytes = [0x00, 0x01, 0x00, 0x0e, 0x1e, 0x1e, 0x00];

        let info = DebugInfo::read(&mut Parser::new(&bytes), &index, true).unwrap();
        assert_eq!(
            info,
            DebugInfo::PcBased {
                parameter_count: 1,
                max_pc: 2
            }
        );

        let mut out = Vec::new();
        info.write(&mut out, &index).unwrap();
        assert_eq!(out, bytes);

        let event_based = DebugInfo::read(&mut Parser::new(&bytes), &index, false).unwrap();
        assert_eq!(
            event_based,
            DebugInfo::EventBased(info.to_event_based())
        );
    }

    #[test]
    fn test_event_based() {
        let index = FixedIndex::default();
        // start 10, no parameters, start-local v1 name@2 type@3, advance-pc 40, special, end
        let bytes = [0x0a, 0x00, 0x03, 0x01, 0x03, 0x04, 0x01, 0x28, 0x0e, 0x00];
        let info = DebugInfo::read(&mut Parser::new(&bytes), &index, true).unwrap();

        let DebugInfo::EventBased(ref events) = info else {
            panic!("expected event based debug info");
        };
        assert_eq!(events.start_line, 10);
        assert_eq!(events.events.len(), 3);
        assert_eq!(events.events[1], DebugEvent::AdvancePc(40));
        assert_eq!(info.strings().len(), 1);
        assert_eq!(info.types().len(), 1);

        let mut out = Vec::new();
        info.write(&mut out, &index).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn test_empty_program_is_not_pc_based() {
        let index = FixedIndex::default();
        let info = DebugInfo::read(&mut Parser::new(&[0x00, 0x00, 0x00]), &index, true).unwrap();
        assert!(!info.is_pc_based());
    }
}
