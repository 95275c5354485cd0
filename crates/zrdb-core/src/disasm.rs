//! Table-driven instruction decoder.
//!
//! [`Disassembler::decode`] walks the loaded dispatch tables one byte at a
//! time, then extracts the operands named by `{...}` tokens in the resolved
//! instruction text. It decodes exactly one instruction per call, never
//! reads past what the walk and the operands need, and never panics on
//! malformed input.

use std::collections::VecDeque;

use thiserror::Error;

use crate::opcodes::{DISPLACED_SUFFIX, OpcodeTableSet, ROOT_TABLE, TableEntry};

/// The single-byte unconditional return. Ends a decoded basic block.
pub const RETURN_OPCODE: u8 = 0xC9;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The table walk reached a byte with no redirect, text, or collision
    /// entry. Fatal to this decode call only.
    #[error("invalid opcode at offset {offset}")]
    InvalidOpcode { offset: usize },
    /// Ran out of bytes mid-walk or mid-operand. The caller should supply
    /// more lookahead and retry.
    #[error("instruction truncated at offset {offset}")]
    Truncated { offset: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    Imm8,
    Imm16,
    CodeRelative,
    IndexDisplacement,
    DataAddress,
    CodeAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    pub kind: OperandKind,
    pub value: u16,
}

impl Operand {
    /// The signed byte of a relative or index-displacement operand.
    /// `value` holds it sign-extended.
    pub fn displacement(&self) -> i8 {
        self.value as u8 as i8
    }
}

/// One decoded instruction. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Bytes consumed from the stream.
    pub length: u8,
    /// The exact encoding, `length` bytes.
    pub bytes: Vec<u8>,
    /// Mnemonic text with operand tokens resolved to literals. Symbol
    /// substitution happens one layer up.
    pub text: String,
    pub operands: Vec<Operand>,
}

impl Instruction {
    pub fn is_return(&self) -> bool {
        self.bytes == [RETURN_OPCODE]
    }
}

fn token_kind(token: &str) -> Option<OperandKind> {
    match token {
        "{b}" => Some(OperandKind::Imm8),
        "{+b}" => Some(OperandKind::CodeRelative),
        "{+i}" => Some(OperandKind::IndexDisplacement),
        "{w}" => Some(OperandKind::Imm16),
        "{code}" => Some(OperandKind::CodeAddress),
        "{data}" => Some(OperandKind::DataAddress),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct Disassembler {
    tables: OpcodeTableSet,
}

impl Disassembler {
    pub fn new(tables: OpcodeTableSet) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &OpcodeTableSet {
        &self.tables
    }

    /// Decode one instruction starting at `start`.
    ///
    /// Callers should supply around 50 bytes of lookahead so long prefixed
    /// forms do not report [`DecodeError::Truncated`].
    pub fn decode(&self, bytes: &[u8], start: usize) -> Result<Instruction, DecodeError> {
        let mut pos = start;
        let mut queued: VecDeque<u8> = VecDeque::new();
        let mut table = ROOT_TABLE.to_string();

        let text = loop {
            let byte = *bytes.get(pos).ok_or(DecodeError::Truncated {
                offset: pos - start,
            })?;
            pos += 1;

            match self.tables.resolve(&table, byte) {
                Some(TableEntry::Redirect(name)) => {
                    if let Some(base) = name.strip_suffix(DISPLACED_SUFFIX) {
                        // Displaced dispatch: the data byte sits between the
                        // prefix and the selector byte. Queue it; operand
                        // extraction drains the queue before the stream.
                        let data = *bytes.get(pos).ok_or(DecodeError::Truncated {
                            offset: pos - start,
                        })?;
                        pos += 1;
                        queued.push_back(data);
                        table = base.to_string();
                    } else {
                        table = name.clone();
                    }
                }
                Some(TableEntry::Text(text)) => break text.clone(),
                Some(TableEntry::Collision) => {
                    // A prefix immediately followed by another prefix has no
                    // effect: the consumed prefix byte(s) become raw data and
                    // the colliding byte is re-read as the next instruction.
                    pos -= 1;
                    let raw = &bytes[start..pos];
                    if raw.is_empty() {
                        // A collision entry in the root table is a table bug.
                        return Err(DecodeError::InvalidOpcode { offset: 0 });
                    }
                    let listed = raw
                        .iter()
                        .map(|b| format!("${b:02X}"))
                        .collect::<Vec<_>>()
                        .join(",");
                    return Ok(Instruction {
                        length: (pos - start) as u8,
                        bytes: raw.to_vec(),
                        text: format!("db {listed}"),
                        operands: Vec::new(),
                    });
                }
                None => {
                    return Err(DecodeError::InvalidOpcode {
                        offset: pos - 1 - start,
                    });
                }
            }
        };

        let (text, operands) = self.extract_operands(&text, bytes, start, &mut pos, &mut queued)?;

        Ok(Instruction {
            length: (pos - start) as u8,
            bytes: bytes[start..pos].to_vec(),
            text,
            operands,
        })
    }

    /// Resolve `{...}` tokens left to right, consuming queued displacement
    /// bytes first and stream bytes after, little-endian for 16-bit values.
    fn extract_operands(
        &self,
        text: &str,
        bytes: &[u8],
        start: usize,
        pos: &mut usize,
        queued: &mut VecDeque<u8>,
    ) -> Result<(String, Vec<Operand>), DecodeError> {
        let mut out = String::with_capacity(text.len());
        let mut operands = Vec::new();
        let mut rest = text;

        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}').map(|i| open + i) else {
                break;
            };
            let token = &rest[open..=close];
            let Some(kind) = token_kind(token) else {
                // Unknown token: a table bug, refuse to guess.
                return Err(DecodeError::InvalidOpcode {
                    offset: *pos - start,
                });
            };

            out.push_str(&rest[..open]);

            let mut take = || -> Result<u8, DecodeError> {
                if let Some(byte) = queued.pop_front() {
                    return Ok(byte);
                }
                let byte = *bytes.get(*pos).ok_or(DecodeError::Truncated {
                    offset: *pos - start,
                })?;
                *pos += 1;
                Ok(byte)
            };

            match kind {
                OperandKind::Imm8 => {
                    let byte = take()?;
                    out.push_str(&format!("${byte:02X}"));
                    operands.push(Operand {
                        kind,
                        value: u16::from(byte),
                    });
                }
                OperandKind::CodeRelative | OperandKind::IndexDisplacement => {
                    let disp = take()? as i8;
                    out.push_str(&format!("{disp:+}"));
                    operands.push(Operand {
                        kind,
                        value: disp as i16 as u16,
                    });
                }
                OperandKind::Imm16 | OperandKind::CodeAddress | OperandKind::DataAddress => {
                    let lo = take()?;
                    let hi = take()?;
                    let word = u16::from_le_bytes([lo, hi]);
                    out.push_str(&format!("${word:04X}"));
                    operands.push(Operand { kind, value: word });
                }
            }

            rest = &rest[close + 1..];
        }

        out.push_str(rest);
        Ok((out, operands))
    }
}
