//! Symbol (label) files.
//!
//! A symbol file carries one label per line in the form `BANK:OFFSET name`,
//! where `BANK` uses the page-table token syntax (`RO0`, `RA5`, `-` for the
//! unpaged bank) and `OFFSET` is the bank-relative hex offset. Lines that
//! are empty or start with `;` are skipped. The listing renderer and the
//! breakpoint front end consume labels through [`SymbolTable`]; parsing
//! never participates in decoding or addressing.

use std::collections::HashMap;

use thiserror::Error;

use crate::memory::BankId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LabelError {
    #[error("line {line}: {msg}")]
    Malformed { line: usize, msg: String },
}

#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    by_bank_offset: HashMap<(BankId, u16), Vec<String>>,
    by_name: HashMap<String, (BankId, u16)>,
}

impl SymbolTable {
    pub fn parse(text: &str) -> Result<Self, LabelError> {
        let mut out = Self::default();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }

            let Some((lhs, name)) = line.split_once(' ') else {
                return Err(LabelError::Malformed {
                    line: idx + 1,
                    msg: "expected `BANK:OFFSET name`".into(),
                });
            };
            let Some((bank_s, offset_s)) = lhs.split_once(':') else {
                return Err(LabelError::Malformed {
                    line: idx + 1,
                    msg: format!("missing `:` in {lhs:?}"),
                });
            };

            let Some(bank) = BankId::parse_token(bank_s) else {
                return Err(LabelError::Malformed {
                    line: idx + 1,
                    msg: format!("invalid bank {bank_s:?}"),
                });
            };
            let offset = u16::from_str_radix(offset_s, 16).map_err(|e| LabelError::Malformed {
                line: idx + 1,
                msg: format!("invalid offset {offset_s:?}: {e}"),
            })?;

            let name = name.trim();
            if name.is_empty() {
                continue;
            }

            out.by_bank_offset
                .entry((bank, offset))
                .or_default()
                .push(name.to_string());
            out.by_name.insert(name.to_string(), (bank, offset));
        }

        Ok(out)
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn first_label_for(&self, bank: BankId, offset: u16) -> Option<&str> {
        self.by_bank_offset
            .get(&(bank, offset))
            .and_then(|v| v.first())
            .map(|s| s.as_str())
    }

    /// All labels at one position, in file order.
    pub fn labels_for(&self, bank: BankId, offset: u16) -> &[String] {
        self.by_bank_offset
            .get(&(bank, offset))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn lookup_name(&self, name: &str) -> Option<(BankId, u16)> {
        self.by_name.get(name).copied()
    }
}
