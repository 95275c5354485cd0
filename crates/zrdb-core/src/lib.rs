//! Debug-adapter core for remote Z80-family targets.
//!
//! This crate turns raw emulator state (memory bytes, a page-table line, a
//! register dump) into a navigable debugging surface: a table-driven
//! disassembler, a banked 64KB address model, an incremental per-bank
//! disassembly cache with a rendered listing, breakpoint slot management,
//! and a call-stack reconstruction heuristic. Transports and frontends live
//! in separate crates and drive the core via the [`session`] facade and the
//! [`target::DebugTarget`] trait.

/// Fixed-capacity breakpoint slots and remote arming.
pub mod breakpoints;

/// Table-driven instruction decoder.
pub mod disasm;

/// Symbol (label) files.
pub mod labels;

/// Incremental per-bank disassembly store and the rendered listing.
pub mod listing;

/// Banks, slots, and the logical 64KB address space.
pub mod memory;

/// Layered opcode dispatch tables.
pub mod opcodes;

/// Per-session facade wiring the pieces to a debugger backend.
pub mod session;

/// Call-stack reconstruction from a raw stack window.
pub mod stack;

/// Capability interface to the remote debugger.
pub mod target;
