//! Wire format of the emulator's line-oriented command protocol.
//!
//! Commands are single lines; the remote answers with zero or more text
//! lines and terminates every response with the [`PROMPT`] marker (no
//! trailing newline). Addresses and lengths travel as bare hex. Error
//! responses are lines starting with `Error`.

use zrdb_core::target::Registers;

/// Marker the remote prints when a response is complete.
pub const PROMPT: &str = "command> ";

/// If a full response (terminated by [`PROMPT`]) is buffered, split it into
/// trimmed, non-empty lines and return how many bytes were consumed.
pub fn take_response(buf: &[u8]) -> Option<(Vec<String>, usize)> {
    let text = std::str::from_utf8(buf).ok()?;
    let end = text.find(PROMPT)?;
    let lines = text[..end]
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();
    Some((lines, end + PROMPT.len()))
}

/// First `Error ...` line of a response, if any.
pub fn find_error(lines: &[String]) -> Option<&str> {
    lines
        .iter()
        .map(String::as_str)
        .find(|l| l.starts_with("Error"))
}

pub fn cmd_read_memory(address: u16, len: u16) -> String {
    format!("read-memory {address:04x} {len:x}")
}

pub fn cmd_set_breakpoint(index: i32, address: u16) -> String {
    format!("set-breakpoint {index} {address:04x}")
}

pub fn cmd_enable_breakpoint(index: i32) -> String {
    format!("enable-breakpoint {index}")
}

pub fn cmd_disable_breakpoint(index: i32) -> String {
    format!("disable-breakpoint {index}")
}

/// Parse a memory dump: hex byte pairs, whitespace between pairs optional.
pub fn parse_hex_dump(line: &str) -> Result<Vec<u8>, String> {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() % 2 != 0 {
        return Err(format!("odd-length hex dump ({} digits)", compact.len()));
    }
    (0..compact.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&compact[i..i + 2], 16)
                .map_err(|e| format!("bad hex pair {:?}: {e}", &compact[i..i + 2]))
        })
        .collect()
}

/// Parse a register dump line such as
/// `PC=8000 SP=ff4a AF=0044 BC=174b HL=107f DE=0006 IX=ffff IY=5c3a
/// AF'=0044 BC'=0000 HL'=0000 DE'=0000 I=3f R=22`.
///
/// Unknown keys are skipped; PC and SP are required.
pub fn parse_registers(line: &str) -> Result<Registers, String> {
    let mut regs = Registers::default();
    let mut seen_pc = false;
    let mut seen_sp = false;

    for token in line.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        let word = |v: &str| u16::from_str_radix(v, 16).map_err(|e| format!("{key}={v:?}: {e}"));
        match key {
            "PC" => {
                regs.pc = word(value)?;
                seen_pc = true;
            }
            "SP" => {
                regs.sp = word(value)?;
                seen_sp = true;
            }
            "AF" => regs.af = word(value)?,
            "BC" => regs.bc = word(value)?,
            "DE" => regs.de = word(value)?,
            "HL" => regs.hl = word(value)?,
            "IX" => regs.ix = word(value)?,
            "IY" => regs.iy = word(value)?,
            "AF'" => regs.af_alt = word(value)?,
            "BC'" => regs.bc_alt = word(value)?,
            "DE'" => regs.de_alt = word(value)?,
            "HL'" => regs.hl_alt = word(value)?,
            "I" => regs.i = word(value)? as u8,
            "R" => regs.r = word(value)? as u8,
            _ => {}
        }
    }

    if !seen_pc || !seen_sp {
        return Err(format!("register dump missing PC or SP: {line:?}"));
    }
    Ok(regs)
}

/// Parse the breakpoint-capacity response, a single decimal count.
pub fn parse_capacity(line: &str) -> Result<usize, String> {
    line.trim()
        .parse::<usize>()
        .map_err(|e| format!("bad breakpoint count {line:?}: {e}"))
}
