//! Call-stack reconstruction from a raw stack window.

use crate::target::{DebugTarget, TargetError};

/// Bytes of stack examined per reconstruction.
const STACK_WINDOW: u16 = 20;

/// Opcodes of the 3-byte call family (`call` and `call cc`).
const CALL_OPCODES: [u8; 9] = [0xCD, 0xC4, 0xCC, 0xD4, 0xDC, 0xE4, 0xEC, 0xF4, 0xFC];
/// Single-byte restart opcodes (`rst`).
const RESTART_OPCODES: [u8; 8] = [0xC7, 0xCF, 0xD7, 0xDF, 0xE7, 0xEF, 0xF7, 0xFF];

/// Reconstruct a call-stack view starting at `sp`.
///
/// Entry 0 is always `pc`. Each stacked 16-bit value is mapped back to the
/// call site that would have pushed it by probing the three bytes just below
/// the stored address; values that do not look like return addresses are
/// kept unadjusted. Pushed data and return addresses are indistinguishable,
/// so misclassification in either direction is an accepted tradeoff.
pub fn unwind(target: &mut dyn DebugTarget, pc: u16, sp: u16) -> Result<Vec<u16>, TargetError> {
    let mut frames = vec![pc];
    let window = target.read_memory(sp, STACK_WINDOW)?;

    for chunk in window.chunks_exact(2) {
        let addr = u16::from_le_bytes([chunk[0], chunk[1]]);
        let probe = target.read_memory(addr.wrapping_sub(3), 3)?;
        let frame = if probe.len() == 3 {
            if CALL_OPCODES.contains(&probe[0]) {
                addr.wrapping_sub(3)
            } else if CALL_OPCODES.contains(&probe[1]) {
                addr.wrapping_sub(2)
            } else if RESTART_OPCODES.contains(&probe[2]) {
                addr.wrapping_sub(1)
            } else {
                addr
            }
        } else {
            addr
        };
        frames.push(frame);
    }

    Ok(frames)
}
