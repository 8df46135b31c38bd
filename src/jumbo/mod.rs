//! Rewriting of code bodies whose strings no longer fit a 16-bit index.
//!
//! Once a file holds more than 65536 strings, every `const-string` loading a string at or above
//! the first jumbo string must become `const-string/jumbo`, which is one code unit longer. The
//! growth shifts every later instruction, so branches may no longer reach their targets,
//! payloads may lose their 4-byte alignment, and try ranges, handler addresses and line tables
//! point at the wrong units.
//!
//! [`JumboStringRewriter`] moves the instructions into an arena and records every offset-based
//! reference as a link to an arena index before anything moves:
//!
//! - branch and payload-user targets, and the targets of switch payloads
//! - start and end of every try range
//! - handler addresses
//! - the address of every address-advancing debug event
//!
//! The instruction stream is then grown until it reaches a fixpoint: a `goto` that no longer
//! reaches its target becomes `goto/16` or `goto/32`, a conditional branch becomes the inverted
//! condition over a `goto/32`, and a misaligned payload gets a `nop` in front of it (or loses
//! one that nothing points at). Replacing an instruction is a write to its arena slot, so the
//! links never need repair. Finally the offsets are committed into the instructions, the
//! exception table and the debug info.
//!
//! # Examples
//!
//! ```rust,ignore
//! if JumboStringRewriter::requires_rewrite(&code, &first_jumbo) {
//!     let code = JumboStringRewriter::new(&code, &first_jumbo).rewrite()?;
//! }
//! ```

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    model::{
        code::{
            instruction::{Insn, Instruction},
            DexCode, TryHandler, TryItem, TypeAddrPair,
        },
        debug::{DebugEvent, DebugInfo, EventBasedDebugInfo, PC_BASED_START_LINE},
        items::TypeRc,
        string::StringRc,
    },
    Result,
};

struct Node {
    insn: Insn,
    offset: u32,
}

#[derive(Debug, Clone, Copy)]
struct TryLink {
    start: usize,
    end: usize,
    ends_after_last: bool,
    handler_index: usize,
}

struct HandlerLink {
    catch_all: Option<usize>,
    pairs: Vec<(TypeRc, usize)>,
}

struct DebugLinks {
    info: EventBasedDebugInfo,
    /// Arena index reached by each address-advancing event
    targets: Vec<Option<usize>>,
}

enum Growable {
    Condition,
    Goto8,
    Goto16,
}

/// Rewrites one code body for a given jumbo threshold.
pub struct JumboStringRewriter<'a> {
    code: &'a DexCode,
    first_jumbo_string: &'a StringRc,
    arena: Vec<Node>,
    order: Vec<usize>,
    targets: HashMap<usize, Vec<usize>>,
    payload_to_switch: HashMap<usize, usize>,
    tries: Vec<TryLink>,
    handlers: Vec<HandlerLink>,
    debug: Option<DebugLinks>,
    pinned: HashSet<usize>,
}

impl<'a> JumboStringRewriter<'a> {
    /// Whether `code` loads a string at or above `first_jumbo_string` with a 16-bit operand.
    #[must_use]
    pub fn requires_rewrite(code: &DexCode, first_jumbo_string: &StringRc) -> bool {
        if code.highest_sorting_string.as_ref() == Some(first_jumbo_string) {
            return false;
        }
        code.instructions.iter().any(|instruction| {
            matches!(&instruction.insn, Insn::ConstString { string, .. } if string >= first_jumbo_string)
        })
    }

    /// Create a rewriter.
    ///
    /// # Arguments
    /// * `code` - The code body, unchanged by the rewrite
    /// * `first_jumbo_string` - The lowest string whose output index exceeds 16 bits
    #[must_use]
    pub fn new(code: &'a DexCode, first_jumbo_string: &'a StringRc) -> JumboStringRewriter<'a> {
        JumboStringRewriter {
            code,
            first_jumbo_string,
            arena: Vec::new(),
            order: Vec::new(),
            targets: HashMap::new(),
            payload_to_switch: HashMap::new(),
            tries: Vec::new(),
            handlers: Vec::new(),
            debug: None,
            pinned: HashSet::new(),
        }
    }

    /// Produce the rewritten code body.
    ///
    /// Rewriting a body that was already rewritten for the same threshold returns an
    /// unchanged copy.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if an offset in the body does not point at an
    /// instruction, or if a try range grows beyond 65535 code units.
    pub fn rewrite(mut self) -> Result<DexCode> {
        if self.code.highest_sorting_string.as_ref() == Some(self.first_jumbo_string) {
            return Ok(self.code.clone());
        }

        self.record_targets()?;
        self.expand()?;

        let instructions = self.commit_instructions()?;
        let tries = self.commit_tries()?;
        let handlers = self.commit_handlers();
        let debug_info = self.commit_debug_info()?;

        Ok(DexCode {
            registers_size: self.code.registers_size,
            ins_size: self.code.ins_size,
            outs_size: self.code.outs_size,
            instructions,
            tries,
            handlers,
            debug_info,
            highest_sorting_string: Some(self.first_jumbo_string.clone()),
        })
    }

    fn push(&mut self, insn: Insn) -> usize {
        self.arena.push(Node { insn, offset: 0 });
        self.arena.len() - 1
    }

    fn record_targets(&mut self) -> Result<()> {
        let mut by_offset = HashMap::new();
        for instruction in &self.code.instructions {
            by_offset.insert(instruction.offset, self.arena.len());
            self.arena.push(Node {
                insn: instruction.insn.clone(),
                offset: instruction.offset,
            });
        }
        self.order = (0..self.arena.len()).collect();

        let at = |address: i64| -> Result<usize> {
            u32::try_from(address)
                .ok()
                .and_then(|address| by_offset.get(&address).copied())
                .ok_or_else(|| malformed_error!("No instruction at address {}", address))
        };

        for (id, node) in self.arena.iter().enumerate() {
            if let Insn::PayloadUser { offset, .. } = node.insn {
                let payload = at(i64::from(node.offset) + i64::from(offset))?;
                self.payload_to_switch.insert(payload, id);
                self.targets.insert(id, vec![payload]);
            }
        }

        for (id, node) in self.arena.iter().enumerate() {
            match &node.insn {
                Insn::Goto { .. }
                | Insn::Goto16 { .. }
                | Insn::Goto32 { .. }
                | Insn::IfTest { .. }
                | Insn::IfTestZ { .. } => {
                    let offset = node.insn.branch_offset().unwrap_or_default();
                    let target = at(i64::from(node.offset) + i64::from(offset))?;
                    self.targets.insert(id, vec![target]);
                }
                Insn::PackedSwitchPayload { targets, .. }
                | Insn::SparseSwitchPayload { targets, .. } => {
                    let switch = self
                        .payload_to_switch
                        .get(&id)
                        .copied()
                        .ok_or_else(|| malformed_error!("Switch payload at {} is unused", node.offset))?;
                    let base = i64::from(self.arena[switch].offset);
                    let resolved = targets
                        .iter()
                        .map(|target| at(base + i64::from(*target)))
                        .collect::<Result<Vec<_>>>()?;
                    self.targets.insert(id, resolved);
                }
                _ => {}
            }
        }

        let Some(last) = self.arena.len().checked_sub(1) else {
            return Ok(());
        };
        let last_offset = self.arena[last].offset;

        for item in &self.code.tries {
            let start = at(i64::from(item.start_addr))?;
            let end_address = item.start_addr + u32::from(item.insn_count);
            let (end, ends_after_last) = if end_address > last_offset {
                (last, true)
            } else {
                (at(i64::from(end_address))?, false)
            };
            self.pinned.insert(start);
            self.pinned.insert(end);
            self.tries.push(TryLink {
                start,
                end,
                ends_after_last,
                handler_index: item.handler_index,
            });
        }

        for handler in &self.code.handlers {
            let catch_all = handler
                .catch_all_addr
                .map(|address| at(i64::from(address)))
                .transpose()?;
            let pairs = handler
                .pairs
                .iter()
                .map(|pair| Ok((pair.ty.clone(), at(i64::from(pair.addr))?)))
                .collect::<Result<Vec<_>>>()?;
            self.pinned.extend(catch_all);
            self.pinned.extend(pairs.iter().map(|(_, target)| *target));
            self.handlers.push(HandlerLink { catch_all, pairs });
        }

        self.debug = match self.code.debug_info.as_deref() {
            None => None,
            Some(DebugInfo::PcBased { parameter_count, max_pc }) => {
                Some(self.pc_based_links(*parameter_count, *max_pc))
            }
            Some(DebugInfo::EventBased(info)) => {
                let mut address = 0i64;
                let mut targets = Vec::with_capacity(info.events.len());
                for event in &info.events {
                    match event {
                        DebugEvent::AdvancePc(_) | DebugEvent::Default { .. } => {
                            address += i64::from(event.pc_delta());
                            targets.push(Some(at(address)?));
                        }
                        _ => targets.push(None),
                    }
                }
                Some(DebugLinks {
                    info: info.clone(),
                    targets,
                })
            }
        };
        if let Some(debug) = &self.debug {
            self.pinned.extend(debug.targets.iter().flatten());
        }
        Ok(())
    }

    /// Pc-based info maps every instruction to the line equal to its original address.
    fn pc_based_links(&self, parameter_count: u32, max_pc: u32) -> DebugLinks {
        let mut events = Vec::new();
        let mut targets = Vec::new();
        let mut previous = 0u32;
        for (id, node) in self.arena.iter().enumerate() {
            if node.offset > max_pc || node.insn.is_payload() {
                continue;
            }
            let delta = node.offset - previous;
            events.push(DebugEvent::Default {
                line_delta: delta as i32,
                pc_delta: delta,
            });
            targets.push(Some(id));
            previous = node.offset;
        }
        DebugLinks {
            info: EventBasedDebugInfo {
                start_line: PC_BASED_START_LINE,
                parameters: vec![None; parameter_count as usize],
                events,
            },
            targets,
        }
    }

    fn layout(&mut self) {
        let mut offset = 0u32;
        for &id in &self.order {
            let node = &mut self.arena[id];
            node.offset = offset;
            offset += node.insn.size() as u32;
        }
    }

    fn displacement(&self, id: usize) -> Option<i64> {
        let target = *self.targets.get(&id)?.first()?;
        Some(i64::from(self.arena[target].offset) - i64::from(self.arena[id].offset))
    }

    fn is_target(&self, id: usize) -> bool {
        self.pinned.contains(&id) || self.targets.values().any(|targets| targets.contains(&id))
    }

    fn expand(&mut self) -> Result<()> {
        for &id in &self.order {
            let node = &mut self.arena[id];
            let jumbo = match &node.insn {
                Insn::ConstString { register, string } if string >= self.first_jumbo_string => {
                    Insn::ConstStringJumbo {
                        register: *register,
                        string: string.clone(),
                    }
                }
                _ => continue,
            };
            log::trace!("const-string at {} becomes const-string/jumbo", node.offset);
            node.insn = jumbo;
        }

        let mut pass = 0usize;
        loop {
            pass += 1;
            self.layout();
            let mut changed = false;
            let mut position = 0usize;
            while position < self.order.len() {
                if self.grow(position)? {
                    changed = true;
                    self.layout();
                } else {
                    position += 1;
                }
            }
            log::debug!(
                "Jumbo rewrite pass {} over {} instructions, changed: {}",
                pass,
                self.order.len(),
                changed
            );
            if !changed {
                return Ok(());
            }
        }
    }

    /// Grow or realign the instruction at `position` if needed.
    fn grow(&mut self, position: usize) -> Result<bool> {
        let id = self.order[position];
        let node = &self.arena[id];
        if node.insn.is_payload() {
            if node.offset % 2 == 0 {
                return Ok(false);
            }
            self.align_payload(position);
            return Ok(true);
        }

        let kind = match node.insn {
            Insn::IfTest { .. } | Insn::IfTestZ { .. } => Growable::Condition,
            Insn::Goto { .. } => Growable::Goto8,
            Insn::Goto16 { .. } => Growable::Goto16,
            _ => return Ok(false),
        };
        let Some(displacement) = self.displacement(id) else {
            return Ok(false);
        };
        let fits_16 = i16::try_from(displacement).is_ok();

        match kind {
            Growable::Condition if !fits_16 => {
                self.invert_condition(position)?;
                Ok(true)
            }
            Growable::Goto8 if i8::try_from(displacement).is_err() => {
                log::trace!("goto at {} widened for displacement {}", node.offset, displacement);
                self.arena[id].insn = if fits_16 {
                    Insn::Goto16 { offset: 0 }
                } else {
                    Insn::Goto32 { offset: 0 }
                };
                Ok(true)
            }
            Growable::Goto16 if !fits_16 => {
                log::trace!("goto/16 at {} widened for displacement {}", node.offset, displacement);
                self.arena[id].insn = Insn::Goto32 { offset: 0 };
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Turn `if-test target` into `if-!test fallthrough; goto/32 target`.
    fn invert_condition(&mut self, position: usize) -> Result<()> {
        let id = self.order[position];
        let inverted = match &self.arena[id].insn {
            Insn::IfTest { test, a, b, .. } => Insn::IfTest {
                test: test.invert(),
                a: *a,
                b: *b,
                offset: 0,
            },
            Insn::IfTestZ { test, a, .. } => Insn::IfTestZ {
                test: test.invert(),
                a: *a,
                offset: 0,
            },
            other => return Err(malformed_error!("Cannot invert {:?}", other)),
        };
        let fallthrough = self.order.get(position + 1).copied().ok_or_else(|| {
            malformed_error!("Conditional branch at {} ends the code", self.arena[id].offset)
        })?;
        log::trace!("Conditional branch at {} inverted over goto/32", self.arena[id].offset);

        let jump = self.push(Insn::Goto32 { offset: 0 });
        self.order.insert(position + 1, jump);
        let target = self.targets.remove(&id).unwrap_or_default();
        self.targets.insert(jump, target);
        self.targets.insert(id, vec![fallthrough]);
        self.arena[id].insn = inverted;
        Ok(())
    }

    /// Drop the `nop` in front of the payload at `position`, or insert one.
    fn align_payload(&mut self, position: usize) {
        if let Some(previous) = position.checked_sub(1) {
            let candidate = self.order[previous];
            if matches!(self.arena[candidate].insn, Insn::Nop) && !self.is_target(candidate) {
                log::trace!("Removed nop before payload at {}", self.arena[candidate].offset);
                self.order.remove(previous);
                return;
            }
        }
        let nop = self.push(Insn::Nop);
        self.order.insert(position, nop);
        log::trace!("Inserted nop before payload at {}", self.arena[self.order[position + 1]].offset);
    }

    fn relative(&self, from: usize, to: usize) -> i64 {
        i64::from(self.arena[to].offset) - i64::from(self.arena[from].offset)
    }

    fn target_of(&self, id: usize) -> Result<usize> {
        self.targets
            .get(&id)
            .and_then(|targets| targets.first().copied())
            .ok_or_else(|| malformed_error!("Branch at {} lost its target", self.arena[id].offset))
    }

    fn commit_instructions(&self) -> Result<Vec<Instruction>> {
        self.order
            .iter()
            .map(|&id| {
                let node = &self.arena[id];
                let out_of_range =
                    |displacement: i64| malformed_error!("Displacement {} at {} out of range", displacement, node.offset);
                let insn = match &node.insn {
                    Insn::Goto { .. } => {
                        let displacement = self.relative(id, self.target_of(id)?);
                        Insn::Goto {
                            offset: i8::try_from(displacement).map_err(|_| out_of_range(displacement))?,
                        }
                    }
                    Insn::Goto16 { .. } => {
                        let displacement = self.relative(id, self.target_of(id)?);
                        Insn::Goto16 {
                            offset: i16::try_from(displacement).map_err(|_| out_of_range(displacement))?,
                        }
                    }
                    Insn::Goto32 { .. } => {
                        let displacement = self.relative(id, self.target_of(id)?);
                        Insn::Goto32 {
                            offset: i32::try_from(displacement).map_err(|_| out_of_range(displacement))?,
                        }
                    }
                    Insn::IfTest { test, a, b, .. } => {
                        let displacement = self.relative(id, self.target_of(id)?);
                        Insn::IfTest {
                            test: *test,
                            a: *a,
                            b: *b,
                            offset: i16::try_from(displacement).map_err(|_| out_of_range(displacement))?,
                        }
                    }
                    Insn::IfTestZ { test, a, .. } => {
                        let displacement = self.relative(id, self.target_of(id)?);
                        Insn::IfTestZ {
                            test: *test,
                            a: *a,
                            offset: i16::try_from(displacement).map_err(|_| out_of_range(displacement))?,
                        }
                    }
                    Insn::PayloadUser { kind, register, .. } => {
                        let displacement = self.relative(id, self.target_of(id)?);
                        Insn::PayloadUser {
                            kind: *kind,
                            register: *register,
                            offset: i32::try_from(displacement).map_err(|_| out_of_range(displacement))?,
                        }
                    }
                    Insn::PackedSwitchPayload { first_key, .. } => Insn::PackedSwitchPayload {
                        first_key: *first_key,
                        targets: self.switch_targets(id)?,
                    },
                    Insn::SparseSwitchPayload { keys, .. } => Insn::SparseSwitchPayload {
                        keys: keys.clone(),
                        targets: self.switch_targets(id)?,
                    },
                    other => other.clone(),
                };
                Ok(Instruction {
                    offset: node.offset,
                    insn,
                })
            })
            .collect()
    }

    fn switch_targets(&self, payload: usize) -> Result<Vec<i32>> {
        let switch = self
            .payload_to_switch
            .get(&payload)
            .copied()
            .ok_or_else(|| malformed_error!("Switch payload at {} is unused", self.arena[payload].offset))?;
        self.targets
            .get(&payload)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|&target| {
                let displacement = self.relative(switch, target);
                i32::try_from(displacement)
                    .map_err(|_| malformed_error!("Switch target displacement {} out of range", displacement))
            })
            .collect()
    }

    fn commit_tries(&self) -> Result<Vec<TryItem>> {
        self.tries
            .iter()
            .map(|link| {
                let start = self.arena[link.start].offset;
                let mut end = self.arena[link.end].offset;
                if link.ends_after_last {
                    end += self.arena[link.end].insn.size() as u32;
                }
                let insn_count = u16::try_from(end - start).map_err(|_| {
                    malformed_error!("Try range at {} spans {} code units", start, end - start)
                })?;
                Ok(TryItem {
                    start_addr: start,
                    insn_count,
                    handler_index: link.handler_index,
                })
            })
            .collect()
    }

    fn commit_handlers(&self) -> Vec<TryHandler> {
        self.handlers
            .iter()
            .map(|link| TryHandler {
                pairs: link
                    .pairs
                    .iter()
                    .map(|(ty, target)| TypeAddrPair {
                        ty: ty.clone(),
                        addr: self.arena[*target].offset,
                    })
                    .collect(),
                catch_all_addr: link.catch_all.map(|target| self.arena[target].offset),
            })
            .collect()
    }

    fn commit_debug_info(&self) -> Result<Option<Arc<DebugInfo>>> {
        let Some(debug) = &self.debug else {
            return Ok(None);
        };

        let mut events = Vec::with_capacity(debug.info.events.len());
        let mut address = 0u32;
        for (event, target) in debug.info.events.iter().zip(&debug.targets) {
            let Some(target) = target else {
                events.push(event.clone());
                continue;
            };
            let new_address = self.arena[*target].offset;
            let pc_delta = new_address.checked_sub(address).ok_or_else(|| {
                malformed_error!("Debug events out of order at address {}", new_address)
            })?;
            address = new_address;

            match event {
                DebugEvent::AdvancePc(_) => events.push(DebugEvent::AdvancePc(pc_delta)),
                DebugEvent::Default { line_delta, .. } => {
                    match DebugEvent::special(*line_delta, pc_delta) {
                        Some(special) => events.push(special),
                        None => {
                            if pc_delta > 0 {
                                events.push(DebugEvent::AdvancePc(pc_delta));
                            }
                            match DebugEvent::special(*line_delta, 0) {
                                Some(special) => events.push(special),
                                None => {
                                    events.push(DebugEvent::AdvanceLine(*line_delta));
                                    events.push(DebugEvent::Default {
                                        line_delta: 0,
                                        pc_delta: 0,
                                    });
                                }
                            }
                        }
                    }
                }
                other => events.push(other.clone()),
            }
        }

        Ok(Some(Arc::new(DebugInfo::EventBased(EventBasedDebugInfo {
            start_line: debug.info.start_line,
            parameters: debug.info.parameters.clone(),
            events,
        }))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{code::instruction::IfTest, ItemFactory};

    fn const_string(factory: &ItemFactory, value: &str) -> Insn {
        Insn::ConstString {
            register: 0,
            string: factory.create_string(value),
        }
    }

    fn return_void() -> Insn {
        Insn::Simple { units: vec![0x000e] }
    }

    #[test]
    fn test_requires_rewrite() {
        let factory = ItemFactory::new();
        let code = DexCode::new(1, 0, 0, vec![const_string(&factory, "b"), return_void()]);
        assert!(JumboStringRewriter::requires_rewrite(&code, &factory.create_string("a")));
        assert!(JumboStringRewriter::requires_rewrite(&code, &factory.create_string("b")));
        assert!(!JumboStringRewriter::requires_rewrite(&code, &factory.create_string("c")));
    }

    #[test]
    fn test_branch_over_jumbo_string() {
        let factory = ItemFactory::new();
        // if-eqz v0, +5; const-string v0, "z"; goto -4 (back to the const-string); return-void
        let code = DexCode::new(
            1,
            0,
            0,
            vec![
                Insn::IfTestZ {
                    test: IfTest::Eq,
                    a: 0,
                    offset: 5,
                },
                const_string(&factory, "z"),
                Insn::Goto { offset: -2 },
                return_void(),
            ],
        );
        let threshold = factory.create_string("m");
        let rewritten = JumboStringRewriter::new(&code, &threshold).rewrite().unwrap();

        let offsets: Vec<u32> = rewritten.instructions.iter().map(|i| i.offset).collect();
        assert_eq!(offsets, vec![0, 2, 5, 6]);
        assert!(matches!(rewritten.instructions[1].insn, Insn::ConstStringJumbo { .. }));
        assert!(matches!(rewritten.instructions[0].insn, Insn::IfTestZ { offset: 6, .. }));
        assert!(matches!(rewritten.instructions[2].insn, Insn::Goto { offset: -3 }));
        assert_eq!(rewritten.highest_sorting_string, Some(threshold));
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let factory = ItemFactory::new();
        let code = DexCode::new(1, 0, 0, vec![const_string(&factory, "z"), return_void()]);
        let threshold = factory.create_string("a");
        let once = JumboStringRewriter::new(&code, &threshold).rewrite().unwrap();
        assert!(!JumboStringRewriter::requires_rewrite(&once, &threshold));
        let twice = JumboStringRewriter::new(&once, &threshold).rewrite().unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_payload_realigned() {
        let factory = ItemFactory::new();
        // const-string v0; packed-switch v0, +4; return-void; packed-switch-payload
        let code = DexCode::new(
            1,
            0,
            0,
            vec![
                const_string(&factory, "z"),
                Insn::PayloadUser {
                    kind: crate::model::code::instruction::PayloadKind::PackedSwitch,
                    register: 0,
                    offset: 4,
                },
                return_void(),
                Insn::PackedSwitchPayload {
                    first_key: 0,
                    targets: vec![3],
                },
            ],
        );
        assert_eq!(code.instructions[3].offset, 6);

        let threshold = factory.create_string("a");
        let rewritten = JumboStringRewriter::new(&code, &threshold).rewrite().unwrap();
        let payload = rewritten.instructions.last().unwrap();
        assert_eq!(payload.offset % 2, 0);
        assert_eq!(payload.offset, 8);
        assert!(matches!(rewritten.instructions[3].insn, Insn::Nop));
        assert!(matches!(rewritten.instructions[1].insn, Insn::PayloadUser { offset: 5, .. }));
        // return-void is now at 6, three units after the switch at 3
        assert!(matches!(&payload.insn, Insn::PackedSwitchPayload { targets, .. } if targets == &vec![3]));
    }

    #[test]
    fn test_tries_and_handlers_follow_instructions() {
        let factory = ItemFactory::new();
        let throwable = factory.create_type("Ljava/lang/Throwable;");
        let mut code = DexCode::new(
            1,
            0,
            0,
            vec![const_string(&factory, "z"), return_void(), return_void()],
        );
        code.tries.push(TryItem {
            start_addr: 0,
            insn_count: 3,
            handler_index: 0,
        });
        code.handlers.push(TryHandler {
            pairs: vec![TypeAddrPair {
                ty: throwable,
                addr: 3,
            }],
            catch_all_addr: None,
        });

        let threshold = factory.create_string("a");
        let rewritten = JumboStringRewriter::new(&code, &threshold).rewrite().unwrap();
        assert_eq!(rewritten.tries[0].start_addr, 0);
        assert_eq!(rewritten.tries[0].insn_count, 4);
        assert_eq!(rewritten.handlers[0].pairs[0].addr, 4);
    }

    #[test]
    fn test_debug_advances_follow_instructions() {
        let factory = ItemFactory::new();
        let mut code = DexCode::new(1, 0, 0, vec![const_string(&factory, "z"), return_void()]);
        code.debug_info = Some(Arc::new(DebugInfo::EventBased(EventBasedDebugInfo {
            start_line: 10,
            parameters: vec![],
            events: vec![
                DebugEvent::Default {
                    line_delta: 0,
                    pc_delta: 0,
                },
                DebugEvent::Default {
                    line_delta: 1,
                    pc_delta: 2,
                },
            ],
        })));

        let threshold = factory.create_string("a");
        let rewritten = JumboStringRewriter::new(&code, &threshold).rewrite().unwrap();
        match rewritten.debug_info.as_deref() {
            Some(DebugInfo::EventBased(info)) => assert_eq!(
                info.events[1],
                DebugEvent::Default {
                    line_delta: 1,
                    pc_delta: 3
                }
            ),
            other => panic!("unexpected {other:?}"),
        }
    }

    /// `head`, a const-string, `nops` nops and a final return-void.
    fn spanning(factory: &ItemFactory, head: Insn, nops: usize) -> DexCode {
        let mut insns = vec![head, const_string(factory, "z")];
        insns.extend(std::iter::repeat(Insn::Nop).take(nops));
        insns.push(return_void());
        DexCode::new(1, 0, 0, insns)
    }

    #[test]
    fn test_condition_inverted_over_wide_goto() {
        let factory = ItemFactory::new();
        // if-eqz v0, +32767 lands on the return-void, one unit out of range after the growth
        let head = Insn::IfTestZ {
            test: IfTest::Eq,
            a: 0,
            offset: i16::MAX,
        };
        let code = spanning(&factory, head, 32763);
        assert_eq!(code.instructions.last().unwrap().offset, 32767);

        let threshold = factory.create_string("a");
        let rewritten = JumboStringRewriter::new(&code, &threshold).rewrite().unwrap();
        let insns = &rewritten.instructions;
        assert_eq!(insns[0].offset, 0);
        assert!(matches!(
            insns[0].insn,
            Insn::IfTestZ {
                test: IfTest::Ne,
                a: 0,
                offset: 5
            }
        ));
        assert_eq!(insns[1].offset, 2);
        assert!(matches!(insns[1].insn, Insn::Goto32 { offset: 32769 }));
        assert_eq!(insns[2].offset, 5);
        assert!(matches!(insns[2].insn, Insn::ConstStringJumbo { .. }));
        assert_eq!(insns.last().unwrap().offset, 32771);
    }

    #[test]
    fn test_goto_widened_to_goto16() {
        let factory = ItemFactory::new();
        let code = spanning(&factory, Insn::Goto { offset: i8::MAX }, 124);
        assert_eq!(code.instructions.last().unwrap().offset, 127);

        let threshold = factory.create_string("a");
        let rewritten = JumboStringRewriter::new(&code, &threshold).rewrite().unwrap();
        assert!(matches!(rewritten.instructions[0].insn, Insn::Goto16 { offset: 129 }));
        assert_eq!(rewritten.instructions.last().unwrap().offset, 129);
    }

    #[test]
    fn test_goto16_widened_to_goto32() {
        let factory = ItemFactory::new();
        let code = spanning(&factory, Insn::Goto16 { offset: i16::MAX }, 32763);

        let threshold = factory.create_string("a");
        let rewritten = JumboStringRewriter::new(&code, &threshold).rewrite().unwrap();
        assert!(matches!(rewritten.instructions[0].insn, Insn::Goto32 { offset: 32769 }));
        assert_eq!(rewritten.instructions.last().unwrap().offset, 32769);
    }
}
