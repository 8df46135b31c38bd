//! Code bodies.
//!
//! A [`DexCode`] holds the decoded instruction stream of one method together with its
//! exception table and debug info. Instructions keep their offsets (in 16-bit code units) so
//! that branch displacements, try ranges and debug info stay meaningful without re-layout.

pub mod instruction;

use std::sync::Arc;

use crate::model::{
    debug::DebugInfoRc,
    items::TypeRc,
    string::StringRc,
};

use instruction::{Insn, Instruction, ItemRef};

/// A shared code body.
pub type CodeRc = Arc<DexCode>;

/// One typed catch clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeAddrPair {
    /// Caught exception type
    pub ty: TypeRc,
    /// Handler address in code units
    pub addr: u32,
}

/// A list of catch clauses, optionally ending in a catch-all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TryHandler {
    /// Typed clauses, in order
    pub pairs: Vec<TypeAddrPair>,
    /// Catch-all handler address
    pub catch_all_addr: Option<u32>,
}

/// A protected range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TryItem {
    /// First covered code unit
    pub start_addr: u32,
    /// Number of covered code units
    pub insn_count: u16,
    /// Index into [`DexCode::handlers`]
    pub handler_index: usize,
}

/// The code of one method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DexCode {
    /// Number of registers
    pub registers_size: u16,
    /// Number of incoming argument words
    pub ins_size: u16,
    /// Number of outgoing argument words
    pub outs_size: u16,
    /// Instructions with their offsets
    pub instructions: Vec<Instruction>,
    /// Protected ranges, sorted by address
    pub tries: Vec<TryItem>,
    /// Handler lists referenced by the tries
    pub handlers: Vec<TryHandler>,
    /// Line table and locals
    pub debug_info: Option<DebugInfoRc>,
    /// Set by the jumbo string rewriter: every string at or above this one is loaded with
    /// `const-string/jumbo`
    pub highest_sorting_string: Option<StringRc>,
}

impl DexCode {
    /// Create a code body, assigning instruction offsets from the instruction sizes.
    #[must_use]
    pub fn new(registers_size: u16, ins_size: u16, outs_size: u16, insns: Vec<Insn>) -> DexCode {
        let mut offset = 0u32;
        let instructions = insns
            .into_iter()
            .map(|insn| {
                let instruction = Instruction { offset, insn };
                offset += instruction.size() as u32;
                instruction
            })
            .collect();
        DexCode {
            registers_size,
            ins_size,
            outs_size,
            instructions,
            tries: Vec::new(),
            handlers: Vec::new(),
            debug_info: None,
            highest_sorting_string: None,
        }
    }

    /// Size of the instruction stream in code units.
    #[must_use]
    pub fn code_units(&self) -> u32 {
        self.instructions
            .last()
            .map_or(0, |last| last.offset + last.size() as u32)
    }

    /// Offset of the last instruction that is not a payload.
    #[must_use]
    pub fn last_executable_offset(&self) -> Option<u32> {
        self.instructions
            .iter()
            .rev()
            .find(|instruction| !instruction.insn.is_payload())
            .map(|instruction| instruction.offset)
    }

    /// Index of the instruction starting at `offset`.
    #[must_use]
    pub fn instruction_index_at(&self, offset: u32) -> Option<usize> {
        self.instructions
            .binary_search_by_key(&offset, |instruction| instruction.offset)
            .ok()
    }

    /// All items referenced by the instruction operands.
    pub fn item_refs(&self) -> impl Iterator<Item = ItemRef> + '_ {
        self.instructions
            .iter()
            .flat_map(|instruction| instruction.insn.item_refs())
    }

    /// Exception types caught by the handlers.
    pub fn handler_types(&self) -> impl Iterator<Item = &TypeRc> {
        self.handlers
            .iter()
            .flat_map(|handler| handler.pairs.iter().map(|pair| &pair.ty))
    }

    /// Strings loaded by `const-string` and `const-string/jumbo`.
    pub fn loaded_strings(&self) -> impl Iterator<Item = &StringRc> {
        self.instructions
            .iter()
            .filter_map(|instruction| instruction.insn.loaded_string())
    }
}
