//! Banks, slots, and the logical 64KB address space.
//!
//! The logical space is divided into fixed-size slots; each slot holds one
//! physical bank at a time. The current slot→bank assignment (the page
//! table) is refreshed from the remote debugger's token line, e.g.
//! `"RO1 RA5 RA2 RA7 SCR5 PEN"`. Slots and banks are created lazily and
//! live for the whole session; a bank record is shared by key between the
//! address space, the disassembly cache, and the breakpoint table.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// An address failed to resolve to a populated slot. Slots cover the
    /// whole space, so this indicates a stale lookup, not a user error.
    #[error("address ${address:04X} is outside every known slot")]
    UnknownSlot { address: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BankKind {
    Unpaged,
    Rom,
    Ram,
    Diverted,
}

/// Half-page selector for banks mapped as two halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum BankPart {
    #[default]
    Whole,
    Low,
    High,
}

/// Identity of a physical bank. Ordering is (kind, number, part);
/// `Unpaged` carries no number or part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BankId {
    pub kind: BankKind,
    pub number: u16,
    pub part: BankPart,
}

impl BankId {
    pub fn unpaged() -> Self {
        Self {
            kind: BankKind::Unpaged,
            number: 0,
            part: BankPart::Whole,
        }
    }

    pub fn rom(number: u16) -> Self {
        Self {
            kind: BankKind::Rom,
            number,
            part: BankPart::Whole,
        }
    }

    pub fn ram(number: u16) -> Self {
        Self {
            kind: BankKind::Ram,
            number,
            part: BankPart::Whole,
        }
    }

    pub fn diverted(number: u16) -> Self {
        Self {
            kind: BankKind::Diverted,
            number,
            part: BankPart::Whole,
        }
    }

    pub fn with_part(self, part: BankPart) -> Self {
        match self.kind {
            BankKind::Unpaged => self,
            _ => Self { part, ..self },
        }
    }

    /// Parse a page-table or symbol-file bank token: `RO<n>`/`O<n>` for ROM,
    /// `RA<n>`/`A<n>` for RAM, `DV<n>` for diverted banks, `-` for the
    /// unpaged whole-space bank. An `L`/`H` suffix selects a half page.
    pub fn parse_token(token: &str) -> Option<Self> {
        if token == "-" {
            return Some(Self::unpaged());
        }
        let (kind, rest) = if let Some(rest) = token.strip_prefix("RO") {
            (BankKind::Rom, rest)
        } else if let Some(rest) = token.strip_prefix("RA") {
            (BankKind::Ram, rest)
        } else if let Some(rest) = token.strip_prefix("DV") {
            (BankKind::Diverted, rest)
        } else if let Some(rest) = token.strip_prefix('O') {
            (BankKind::Rom, rest)
        } else if let Some(rest) = token.strip_prefix('A') {
            (BankKind::Ram, rest)
        } else {
            return None;
        };
        let (rest, part) = if let Some(rest) = rest.strip_suffix('L') {
            (rest, BankPart::Low)
        } else if let Some(rest) = rest.strip_suffix('H') {
            (rest, BankPart::High)
        } else {
            (rest, BankPart::Whole)
        };
        let number = rest.parse::<u16>().ok()?;
        Some(Self { kind, number, part })
    }
}

impl fmt::Display for BankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            BankKind::Unpaged => return write!(f, "-"),
            BankKind::Rom => write!(f, "RO{}", self.number)?,
            BankKind::Ram => write!(f, "RA{}", self.number)?,
            BankKind::Diverted => write!(f, "DV{}", self.number)?,
        }
        match self.part {
            BankPart::Whole => Ok(()),
            BankPart::Low => write!(f, "L"),
            BankPart::High => write!(f, "H"),
        }
    }
}

/// A physical memory page. Created lazily on first reference and mutated
/// whenever a new page-table snapshot arrives.
#[derive(Debug, Clone)]
pub struct Bank {
    pub id: BankId,
    pub is_paged_in: bool,
    /// Logical address the bank is mapped at; meaningful only while
    /// `is_paged_in`.
    pub paged_address: u16,
    pub length: u16,
}

/// A fixed region of the logical address space holding one bank at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// [`WHOLE_SPACE_SLOT`] when paging is disabled.
    pub index: i32,
    pub min: u16,
    pub max: u16,
    /// Key into the owning [`AddressSpace`]'s bank registry.
    pub bank: BankId,
}

/// Slot index used when paging is disabled and one slot spans the space.
pub const WHOLE_SPACE_SLOT: i32 = -1;

/// Owns the slot and bank registries for one debugging session.
#[derive(Debug, Clone)]
pub struct AddressSpace {
    slot_size: u16,
    paging_enabled: bool,
    slots: BTreeMap<i32, Slot>,
    banks: HashMap<BankId, Bank>,
    serial: u64,
}

impl AddressSpace {
    pub fn new(slot_size: u16) -> Self {
        Self {
            slot_size,
            paging_enabled: false,
            slots: BTreeMap::new(),
            banks: HashMap::new(),
            serial: 0,
        }
    }

    pub fn slot_size(&self) -> u16 {
        self.slot_size
    }

    pub fn paging_enabled(&self) -> bool {
        self.paging_enabled
    }

    /// Monotonic page-table snapshot counter, bumped by
    /// [`apply_page_table`](Self::apply_page_table).
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// The slot covering `address`, created on first use.
    pub fn resolve_slot(&mut self, address: u16) -> Slot {
        let index = if self.paging_enabled {
            i32::from(address / self.slot_size)
        } else {
            WHOLE_SPACE_SLOT
        };
        if let Some(slot) = self.slots.get(&index) {
            return *slot;
        }

        let slot = if index == WHOLE_SPACE_SLOT {
            Slot {
                index,
                min: 0,
                max: 0xFFFF,
                bank: BankId::unpaged(),
            }
        } else {
            let min = index as u16 * self.slot_size;
            Slot {
                index,
                min,
                max: min + (self.slot_size - 1),
                bank: BankId::unpaged(),
            }
        };
        self.bank_for(slot.bank);
        self.slots.insert(index, slot);
        slot
    }

    /// Non-creating lookup used by rendering and breakpoint translation.
    pub fn find_slot(&self, address: u16) -> Result<Slot, MemoryError> {
        self.slots
            .values()
            .find(|s| s.min <= address && address <= s.max)
            .copied()
            .ok_or(MemoryError::UnknownSlot { address })
    }

    /// The bank record for `id`, created on first reference.
    pub fn bank_for(&mut self, id: BankId) -> &mut Bank {
        let length = self.slot_size;
        self.banks.entry(id).or_insert_with(|| Bank {
            id,
            is_paged_in: false,
            paged_address: 0,
            length,
        })
    }

    pub fn bank(&self, id: BankId) -> Option<&Bank> {
        self.banks.get(&id)
    }

    /// Slots in ascending address order.
    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.values()
    }

    pub fn banks(&self) -> impl Iterator<Item = &Bank> {
        self.banks.values()
    }

    /// Rebuild the slot→bank assignment from a remote page-table line.
    ///
    /// `RO`/`RA`/`O`/`A`/`DV` tokens name banks in slot order; `PEN`/`PDI`
    /// toggle paging; anything else is skipped. An empty line means paging
    /// is off and one unpaged bank spans the space.
    pub fn apply_page_table(&mut self, line: &str) {
        let mut assigned: Vec<BankId> = Vec::new();
        let mut enabled = None;
        for token in line.split_whitespace() {
            match token {
                "PEN" => enabled = Some(true),
                "PDI" => enabled = Some(false),
                _ => match BankId::parse_token(token) {
                    Some(id) => assigned.push(id),
                    None => log::debug!("ignoring page-table token {token:?}"),
                },
            }
        }

        self.paging_enabled = enabled.unwrap_or(!assigned.is_empty());
        for bank in self.banks.values_mut() {
            bank.is_paged_in = false;
        }
        self.slots.clear();

        if !self.paging_enabled {
            let id = BankId::unpaged();
            self.slots.insert(
                WHOLE_SPACE_SLOT,
                Slot {
                    index: WHOLE_SPACE_SLOT,
                    min: 0,
                    max: 0xFFFF,
                    bank: id,
                },
            );
            let bank = self.bank_for(id);
            bank.is_paged_in = true;
            bank.paged_address = 0;
            bank.length = 0xFFFF;
        } else {
            let slot_size = self.slot_size;
            for (i, id) in assigned.into_iter().enumerate() {
                let min = i as u32 * u32::from(slot_size);
                if min > 0xFFFF {
                    log::warn!("page-table names more banks than slots, ignoring {id}");
                    continue;
                }
                let min = min as u16;
                let index = i as i32;
                self.slots.insert(
                    index,
                    Slot {
                        index,
                        min,
                        max: min + (slot_size - 1),
                        bank: id,
                    },
                );
                let bank = self.bank_for(id);
                bank.is_paged_in = true;
                bank.paged_address = min;
                bank.length = slot_size;
            }
        }

        self.serial = self.serial.wrapping_add(1);
    }
}
