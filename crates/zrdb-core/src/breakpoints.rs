//! Fixed-capacity breakpoint slots and remote arming.
//!
//! The remote debugger exposes a fixed number of breakpoint slots,
//! discovered at connect time. This table allocates indices (lowest free
//! first), links each breakpoint to its disassembly line by key, and pushes
//! the desired set to the remote. The armed address is
//! `bank.paged_address + offset`, which stays valid only while that bank
//! remains paged into its slot — callers re-commit after every page-table
//! refresh.

use thiserror::Error;

use crate::listing::DisassemblyCache;
use crate::memory::{AddressSpace, BankId};
use crate::target::{DebugTarget, TargetError};

#[derive(Debug, Error)]
pub enum BreakpointError {
    /// All remote breakpoint slots are in use. Surfaced to the user as an
    /// actionable condition; the session keeps running.
    #[error("all {capacity} remote breakpoint slots are in use")]
    CapacityExceeded { capacity: usize },
    #[error("no disassembly line at the requested position")]
    UnknownLine,
    #[error(transparent)]
    Target(#[from] TargetError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    /// 0-based remote slot index.
    pub index: i32,
    pub bank: BankId,
    /// Bank-relative offset of the line the breakpoint sits on.
    pub offset: u16,
}

#[derive(Debug, Default)]
pub struct BreakpointTable {
    capacity: usize,
    slots: Vec<Option<Breakpoint>>,
    /// Absolute address last armed per index; lets `commit` skip slots the
    /// remote already has right.
    armed: Vec<Option<u16>>,
}

impl BreakpointTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: vec![None; capacity],
            armed: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.slots.iter().flatten()
    }

    pub fn get(&self, bank: BankId, offset: u16) -> Option<Breakpoint> {
        self.iter()
            .find(|bp| bp.bank == bank && bp.offset == offset)
            .copied()
    }

    /// Arm a breakpoint on an existing disassembly line. A no-op returning
    /// the existing breakpoint when the line already has one.
    pub fn add(
        &mut self,
        cache: &mut DisassemblyCache,
        space: &AddressSpace,
        target: &mut dyn DebugTarget,
        bank: BankId,
        offset: u16,
    ) -> Result<Breakpoint, BreakpointError> {
        let Some(line) = cache.line(bank, offset) else {
            return Err(BreakpointError::UnknownLine);
        };
        if let Some(index) = line.breakpoint
            && let Some(existing) = self.slots.get(index as usize).copied().flatten()
        {
            return Ok(existing);
        }

        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(BreakpointError::CapacityExceeded {
                capacity: self.capacity,
            })?;

        let address = arm_address(space, bank, offset);
        target.set_breakpoint(index as i32, address)?;
        target.enable_breakpoint(index as i32)?;

        let bp = Breakpoint {
            index: index as i32,
            bank,
            offset,
        };
        self.slots[index] = Some(bp);
        self.armed[index] = Some(address);
        cache.set_breakpoint_ref(bank, offset, Some(bp.index));
        Ok(bp)
    }

    /// Tear down the breakpoint on a line, if any.
    pub fn remove(
        &mut self,
        cache: &mut DisassemblyCache,
        target: &mut dyn DebugTarget,
        bank: BankId,
        offset: u16,
    ) -> Result<(), BreakpointError> {
        let Some(bp) = self.get(bank, offset) else {
            return Ok(());
        };
        self.remove_index(cache, target, bp.index)
    }

    pub fn remove_index(
        &mut self,
        cache: &mut DisassemblyCache,
        target: &mut dyn DebugTarget,
        index: i32,
    ) -> Result<(), BreakpointError> {
        let slot = index as usize;
        let Some(bp) = self.slots.get(slot).copied().flatten() else {
            return Ok(());
        };
        target.disable_breakpoint(index)?;
        self.slots[slot] = None;
        self.armed[slot] = None;
        cache.set_breakpoint_ref(bp.bank, bp.offset, None);
        Ok(())
    }

    pub fn clear(
        &mut self,
        cache: &mut DisassemblyCache,
        target: &mut dyn DebugTarget,
    ) -> Result<(), BreakpointError> {
        for index in 0..self.slots.len() {
            self.remove_index(cache, target, index as i32)?;
        }
        Ok(())
    }

    /// Push the current set to the remote. Idempotent; slots whose armed
    /// address is already current are skipped, so calling after every
    /// add/remove batch or page-table refresh is cheap.
    pub fn commit(
        &mut self,
        space: &AddressSpace,
        target: &mut dyn DebugTarget,
    ) -> Result<(), BreakpointError> {
        for i in 0..self.slots.len() {
            let Some(bp) = self.slots[i] else {
                continue;
            };
            let address = arm_address(space, bp.bank, bp.offset);
            if self.armed[i] == Some(address) {
                continue;
            }
            target.set_breakpoint(bp.index, address)?;
            target.enable_breakpoint(bp.index)?;
            self.armed[i] = Some(address);
        }
        Ok(())
    }
}

fn arm_address(space: &AddressSpace, bank: BankId, offset: u16) -> u16 {
    let base = space.bank(bank).map_or(0, |b| b.paged_address);
    base.wrapping_add(offset)
}
