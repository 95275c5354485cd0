#![allow(dead_code)]

use zrdb_core::target::{DebugTarget, Registers, TargetError};

/// In-memory debugger backend used by the behavior tests.
pub struct FakeTarget {
    pub mem: Vec<u8>,
    pub regs: Registers,
    pub capacity: usize,
    pub page_line: String,
    /// Log of `set_breakpoint` calls, in order.
    pub armed: Vec<(i32, u16)>,
    pub enabled: Vec<i32>,
    pub disabled: Vec<i32>,
    /// Number of `read_memory` calls served.
    pub reads: usize,
}

impl FakeTarget {
    pub fn new() -> Self {
        Self {
            mem: vec![0; 0x10000],
            regs: Registers::default(),
            capacity: 10,
            page_line: String::new(),
            armed: Vec::new(),
            enabled: Vec::new(),
            disabled: Vec::new(),
            reads: 0,
        }
    }

    pub fn load(&mut self, address: u16, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            let at = (address as usize + i) & 0xFFFF;
            self.mem[at] = b;
        }
    }
}

impl DebugTarget for FakeTarget {
    fn connect(&mut self) -> Result<(), TargetError> {
        Ok(())
    }

    fn read_memory(&mut self, address: u16, len: u16) -> Result<Vec<u8>, TargetError> {
        self.reads += 1;
        Ok((0..len)
            .map(|i| self.mem[(address.wrapping_add(i)) as usize])
            .collect())
    }

    fn read_registers(&mut self) -> Result<Registers, TargetError> {
        Ok(self.regs)
    }

    fn page_table_line(&mut self) -> Result<String, TargetError> {
        Ok(self.page_line.clone())
    }

    fn breakpoint_capacity(&mut self) -> Result<usize, TargetError> {
        Ok(self.capacity)
    }

    fn set_breakpoint(&mut self, index: i32, address: u16) -> Result<(), TargetError> {
        self.armed.push((index, address));
        Ok(())
    }

    fn enable_breakpoint(&mut self, index: i32) -> Result<(), TargetError> {
        self.enabled.push(index);
        Ok(())
    }

    fn disable_breakpoint(&mut self, index: i32) -> Result<(), TargetError> {
        self.disabled.push(index);
        Ok(())
    }
}
