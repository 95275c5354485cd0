//! Capability interface to the remote debugger.
//!
//! The core never depends on a concrete backend; everything it needs from
//! the remote side is expressed here as a blocking call-and-response trait.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("not connected to the remote debugger")]
    NotConnected,
    #[error("remote protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Z80 register file as reported by the remote debugger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    pub pc: u16,
    pub sp: u16,
    pub af: u16,
    pub bc: u16,
    pub de: u16,
    pub hl: u16,
    pub ix: u16,
    pub iy: u16,
    pub af_alt: u16,
    pub bc_alt: u16,
    pub de_alt: u16,
    pub hl_alt: u16,
    pub i: u8,
    pub r: u8,
}

/// The operations the core needs from a debugger backend.
pub trait DebugTarget {
    fn connect(&mut self) -> Result<(), TargetError>;

    /// Read `len` bytes starting at `address`, wrapping at the top of the
    /// 64KB space. May return fewer bytes than requested.
    fn read_memory(&mut self, address: u16, len: u16) -> Result<Vec<u8>, TargetError>;

    fn read_registers(&mut self) -> Result<Registers, TargetError>;

    /// The current page table in the remote's token syntax.
    fn page_table_line(&mut self) -> Result<String, TargetError>;

    /// Number of breakpoint slots the remote supports. Discovered once at
    /// connect time.
    fn breakpoint_capacity(&mut self) -> Result<usize, TargetError>;

    fn set_breakpoint(&mut self, index: i32, address: u16) -> Result<(), TargetError>;

    fn enable_breakpoint(&mut self, index: i32) -> Result<(), TargetError>;

    fn disable_breakpoint(&mut self, index: i32) -> Result<(), TargetError>;
}
