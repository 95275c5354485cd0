//! Per-session facade wiring the pieces to a debugger backend.
//!
//! One [`DebugSession`] owns one address space, one disassembly cache, and
//! one breakpoint table, all keyed registries scoped to the session so
//! parallel sessions stay isolated. Frontends drive the session; the
//! session drives the boxed [`DebugTarget`].

use std::io;
use std::path::Path;

use crate::breakpoints::{Breakpoint, BreakpointError, BreakpointTable};
use crate::disasm::Disassembler;
use crate::labels::SymbolTable;
use crate::listing::{DEFAULT_RECURSION_DEPTH, DisasmLine, DisassemblyCache};
use crate::memory::AddressSpace;
use crate::opcodes::OpcodeTableSet;
use crate::stack;
use crate::target::{DebugTarget, Registers, TargetError};

pub struct DebugSession {
    target: Box<dyn DebugTarget>,
    space: AddressSpace,
    cache: DisassemblyCache,
    breakpoints: BreakpointTable,
    disasm: Disassembler,
    symbols: Option<SymbolTable>,
}

impl DebugSession {
    /// Connect the target and discover its breakpoint capacity.
    pub fn connect(
        mut target: Box<dyn DebugTarget>,
        tables: OpcodeTableSet,
        slot_size: u16,
    ) -> Result<Self, TargetError> {
        target.connect()?;
        let capacity = target.breakpoint_capacity()?;
        log::debug!("remote reports {capacity} breakpoint slots");
        Ok(Self {
            target,
            space: AddressSpace::new(slot_size),
            cache: DisassemblyCache::default(),
            breakpoints: BreakpointTable::new(capacity),
            disasm: Disassembler::new(tables),
            symbols: None,
        })
    }

    pub fn set_symbols(&mut self, symbols: SymbolTable) {
        self.symbols = Some(symbols);
    }

    pub fn address_space(&self) -> &AddressSpace {
        &self.space
    }

    pub fn cache(&self) -> &DisassemblyCache {
        &self.cache
    }

    pub fn breakpoints(&self) -> &BreakpointTable {
        &self.breakpoints
    }

    pub fn registers(&mut self) -> Result<Registers, TargetError> {
        self.target.read_registers()
    }

    /// Re-read the remote page table and re-arm breakpoints whose banks
    /// moved.
    pub fn refresh_paging(&mut self) -> Result<(), BreakpointError> {
        let line = self.target.page_table_line()?;
        self.space.apply_page_table(&line);
        self.breakpoints.commit(&self.space, self.target.as_mut())
    }

    /// Disassemble forward from `address` with the default preload depth.
    pub fn update_around(&mut self, address: u16) -> Result<bool, TargetError> {
        self.cache.update(
            self.target.as_mut(),
            &mut self.space,
            &self.disasm,
            address,
            DEFAULT_RECURSION_DEPTH,
        )
    }

    pub fn render_listing(&mut self) -> String {
        self.cache.render(&self.space, self.symbols.as_ref())
    }

    pub fn write_listing(&mut self, path: &Path) -> io::Result<()> {
        self.cache
            .write_listing(&self.space, self.symbols.as_ref(), path)
    }

    pub fn line_for_address(&self, address: u16) -> Option<i32> {
        self.cache.line_for_address(&self.space, address)
    }

    pub fn line_at(&self, file_line: i32) -> Option<&DisasmLine> {
        self.cache.line_at_file_line(file_line)
    }

    /// Arm a breakpoint on the instruction rendered at `file_line`.
    pub fn add_breakpoint_at_line(&mut self, file_line: i32) -> Result<Breakpoint, BreakpointError> {
        let (bank, offset) = {
            let line = self
                .cache
                .line_at_file_line(file_line)
                .ok_or(BreakpointError::UnknownLine)?;
            (line.bank, line.offset)
        };
        self.breakpoints
            .add(&mut self.cache, &self.space, self.target.as_mut(), bank, offset)
    }

    /// Arm a breakpoint on the instruction at a logical address.
    pub fn add_breakpoint_at_address(&mut self, address: u16) -> Result<Breakpoint, BreakpointError> {
        let slot = self
            .space
            .find_slot(address)
            .map_err(|_| BreakpointError::UnknownLine)?;
        self.breakpoints.add(
            &mut self.cache,
            &self.space,
            self.target.as_mut(),
            slot.bank,
            address - slot.min,
        )
    }

    pub fn remove_breakpoint_at_line(&mut self, file_line: i32) -> Result<(), BreakpointError> {
        let (bank, offset) = {
            let Some(line) = self.cache.line_at_file_line(file_line) else {
                return Ok(());
            };
            (line.bank, line.offset)
        };
        self.breakpoints
            .remove(&mut self.cache, self.target.as_mut(), bank, offset)
    }

    pub fn clear_breakpoints(&mut self) -> Result<(), BreakpointError> {
        self.breakpoints
            .clear(&mut self.cache, self.target.as_mut())
    }

    /// Reconstruct the call stack from the current SP.
    pub fn call_stack(&mut self) -> Result<Vec<u16>, TargetError> {
        let regs = self.target.read_registers()?;
        stack::unwind(self.target.as_mut(), regs.pc, regs.sp)
    }
}
