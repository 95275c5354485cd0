//! Incremental per-bank disassembly store and the rendered listing.
//!
//! [`DisassemblyCache::update`] decodes forward from a requested address,
//! preloads call and jump targets up to a bounded depth, and merges the
//! results into per-bank line tables keyed by bank-relative offset, so a
//! bank's decoded image survives being paged out. [`render`] turns the
//! accumulated store into the text listing whose line numbers are the
//! addressing currency for breakpoints and stack frames.
//!
//! [`render`]: DisassemblyCache::render

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use crate::disasm::{Disassembler, Instruction, OperandKind};
use crate::labels::SymbolTable;
use crate::memory::{AddressSpace, BankId};
use crate::target::{DebugTarget, TargetError};

/// Instructions decoded per update request before the block is abandoned.
const MAX_RUN_INSTRUCTIONS: usize = 30;
/// Cached lines walked when deciding a request is already covered.
const CACHED_CHAIN_LIMIT: usize = 10;
/// Lookahead fetched from the remote per decode run.
const FETCH_WINDOW: u16 = 0x100;
/// Default preload depth for call/jump targets.
pub const DEFAULT_RECURSION_DEPTH: u8 = 2;

/// One rendered instruction line.
#[derive(Debug, Clone)]
pub struct DisasmLine {
    pub bank: BankId,
    /// Bank-relative offset of the first byte.
    pub offset: u16,
    /// 1-based position in the rendered listing; 0 until rendered.
    pub file_line: i32,
    pub instruction: Instruction,
    /// Index of the breakpoint armed on this line, if any.
    pub breakpoint: Option<i32>,
}

/// Accumulated decoded image of one bank. Never evicted during a session.
#[derive(Debug, Default, Clone)]
pub struct DisasmBank {
    lines: BTreeMap<u16, DisasmLine>,
}

impl DisasmBank {
    pub fn line_at(&self, offset: u16) -> Option<&DisasmLine> {
        self.lines.get(&offset)
    }

    pub fn lines(&self) -> impl Iterator<Item = &DisasmLine> {
        self.lines.values()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct DisassemblyCache {
    banks: BTreeMap<BankId, DisasmBank>,
    /// file_line → (bank, offset), rebuilt on every render.
    line_index: HashMap<i32, (BankId, u16)>,
    /// Page-table serial observed by the last update or render.
    seen_serial: Option<u64>,
}

impl DisassemblyCache {
    pub fn bank(&self, id: BankId) -> Option<&DisasmBank> {
        self.banks.get(&id)
    }

    pub fn line(&self, bank: BankId, offset: u16) -> Option<&DisasmLine> {
        self.banks.get(&bank).and_then(|b| b.line_at(offset))
    }

    /// The line rendered at `file_line`, if the listing has been rendered.
    pub fn line_at_file_line(&self, file_line: i32) -> Option<&DisasmLine> {
        let (bank, offset) = self.line_index.get(&file_line).copied()?;
        self.line(bank, offset)
    }

    /// The rendered listing line for a logical address.
    pub fn line_for_address(&self, space: &AddressSpace, address: u16) -> Option<i32> {
        let slot = space.find_slot(address).ok()?;
        let line = self.line(slot.bank, address - slot.min)?;
        (line.file_line > 0).then_some(line.file_line)
    }

    pub(crate) fn set_breakpoint_ref(
        &mut self,
        bank: BankId,
        offset: u16,
        breakpoint: Option<i32>,
    ) -> bool {
        if let Some(line) = self
            .banks
            .get_mut(&bank)
            .and_then(|b| b.lines.get_mut(&offset))
        {
            line.breakpoint = breakpoint;
            true
        } else {
            false
        }
    }

    /// Incrementally disassemble from `address`, preloading call and jump
    /// targets `max_recursion_depth` levels deep.
    ///
    /// Returns `true` when new lines were added or the page-table snapshot
    /// changed since the last render, i.e. when the listing needs to be
    /// regenerated. Decode failures abort the affected run only; previously
    /// cached lines are never discarded.
    pub fn update(
        &mut self,
        target: &mut dyn DebugTarget,
        space: &mut AddressSpace,
        disasm: &Disassembler,
        address: u16,
        max_recursion_depth: u8,
    ) -> Result<bool, TargetError> {
        let mut work: Vec<(u16, u8)> = vec![(address, max_recursion_depth)];
        let mut visited: HashSet<u16> = HashSet::new();
        let mut added = false;

        while let Some((addr, depth)) = work.pop() {
            if !visited.insert(addr) {
                continue;
            }
            if self.chain_cached(space, addr) {
                log::trace!("cache hit at ${addr:04X}, skipping decode");
                continue;
            }

            let buf = target.read_memory(addr, FETCH_WINDOW)?;
            let mut cursor = addr;

            for _ in 0..MAX_RUN_INSTRUCTIONS {
                let rel = cursor.wrapping_sub(addr) as usize;
                if rel >= buf.len() {
                    break;
                }
                let instruction = match disasm.decode(&buf, rel) {
                    Ok(instruction) => instruction,
                    Err(err) => {
                        log::warn!("decode failed at ${cursor:04X}: {err}");
                        break;
                    }
                };

                let length = u16::from(instruction.length);
                let is_return = instruction.is_return();
                let next = cursor.wrapping_add(length);

                let mut targets: Vec<u16> = Vec::new();
                if depth > 0 {
                    for op in &instruction.operands {
                        match op.kind {
                            OperandKind::CodeAddress => targets.push(op.value),
                            // value is sign-extended, so a wrapping add is
                            // the signed offset from the next instruction.
                            OperandKind::CodeRelative => {
                                targets.push(next.wrapping_add(op.value));
                            }
                            _ => {}
                        }
                    }
                }

                let slot = space.resolve_slot(cursor);
                let offset = cursor - slot.min;
                let bank = self.banks.entry(slot.bank).or_default();
                if !bank.lines.contains_key(&offset) {
                    bank.lines.insert(
                        offset,
                        DisasmLine {
                            bank: slot.bank,
                            offset,
                            file_line: 0,
                            instruction,
                            breakpoint: None,
                        },
                    );
                    added = true;
                    for dest in targets {
                        work.push((dest, depth - 1));
                    }
                }

                if is_return {
                    break;
                }
                if next < cursor {
                    // Wrapped the top of the address space.
                    break;
                }
                cursor = next;
            }
        }

        let serial = space.serial();
        let page_changed = self.seen_serial.is_some_and(|s| s != serial);
        self.seen_serial = Some(serial);
        Ok(added || page_changed)
    }

    /// Walk up to [`CACHED_CHAIN_LIMIT`] cached lines from `address`; the
    /// request is covered when the chain reaches a return, or the limit,
    /// before hitting a gap.
    fn chain_cached(&self, space: &mut AddressSpace, address: u16) -> bool {
        let mut cursor = address;
        for _ in 0..CACHED_CHAIN_LIMIT {
            let slot = space.resolve_slot(cursor);
            let Some(line) = self
                .banks
                .get(&slot.bank)
                .and_then(|b| b.line_at(cursor - slot.min))
            else {
                return false;
            };
            if line.instruction.is_return() {
                return true;
            }
            cursor = cursor.wrapping_add(u16::from(line.instruction.length));
        }
        true
    }

    /// Render the full listing: slot order first, then banks that are not
    /// currently paged in but have content. Assigns sequential `file_line`
    /// numbers and rebuilds the line index as it goes.
    pub fn render(&mut self, space: &AddressSpace, labels: Option<&SymbolTable>) -> String {
        let mut out = String::new();
        let mut next_line: i32 = 1;
        self.line_index.clear();

        let mut sections: Vec<(BankId, u16, bool)> = Vec::new();
        let mut listed: Vec<BankId> = Vec::new();
        for slot in space.slots() {
            // A bank mapped into two slots renders once, at its first slot.
            if !listed.contains(&slot.bank) {
                sections.push((slot.bank, slot.min, true));
                listed.push(slot.bank);
            }
        }
        for (id, bank) in &self.banks {
            if !bank.is_empty() && !listed.contains(id) {
                sections.push((*id, 0, false));
            }
        }

        let mut first = true;
        for (id, base, paged_in) in sections {
            let Some(bank) = self.banks.get_mut(&id) else {
                continue;
            };
            if bank.lines.is_empty() {
                continue;
            }

            if !first {
                out.push('\n');
                next_line += 1;
            }
            first = false;

            if paged_in {
                let _ = writeln!(out, "; {id}  paged at ${base:04X}");
            } else {
                let _ = writeln!(out, "; {id}  (not paged in)");
            }
            next_line += 1;

            let mut prev_end: Option<u16> = None;
            for line in bank.lines.values_mut() {
                if prev_end.is_some_and(|end| end != line.offset) {
                    out.push('\n');
                    next_line += 1;
                }

                if let Some(sym) = labels {
                    for name in sym.labels_for(id, line.offset) {
                        let _ = writeln!(out, "{name}:");
                        next_line += 1;
                    }
                }

                let address = if paged_in {
                    base.wrapping_add(line.offset)
                } else {
                    line.offset
                };
                let raw = line
                    .instruction
                    .bytes
                    .iter()
                    .map(|b| format!("{b:02X}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                let _ = writeln!(
                    out,
                    "      {address:04X} {raw:<11} {}",
                    line.instruction.text
                );
                line.file_line = next_line;
                self.line_index.insert(next_line, (id, line.offset));
                next_line += 1;

                prev_end = Some(line.offset.wrapping_add(u16::from(line.instruction.length)));
            }
        }

        self.seen_serial = Some(space.serial());
        out
    }

    /// Write the listing to `path`, the only persisted artifact. The file is
    /// made writable before the write and read-only after, signalling that
    /// its content is generated.
    pub fn write_listing(
        &mut self,
        space: &AddressSpace,
        labels: Option<&SymbolTable>,
        path: &Path,
    ) -> io::Result<()> {
        let text = self.render(space, labels);

        if let Ok(meta) = fs::metadata(path) {
            let mut perms = meta.permissions();
            if perms.readonly() {
                perms.set_readonly(false);
                fs::set_permissions(path, perms)?;
            }
        }
        fs::write(path, &text)?;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_readonly(true);
        fs::set_permissions(path, perms)
    }
}
