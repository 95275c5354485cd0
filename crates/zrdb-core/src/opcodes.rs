//! Layered opcode dispatch tables.
//!
//! A table set is an ordered stack of layers. Each layer maps table names to
//! 256-entry dispatch tables; decoding starts in the [`ROOT_TABLE`] and
//! follows redirects until a terminal instruction text is reached. When two
//! layers define the same (table, byte) entry the later layer wins, which
//! lets an extension instruction set (the Z80N layer, say) patch individual
//! bytes of the base tables without duplicating them.
//!
//! Two on-disk formats parse to the same in-memory set: a grid format
//! (rows are the high nibble, pipe-separated columns the low nibble) and a
//! keyed format (`[table]` sections with `byte = text` entries). Malformed
//! input is a configuration error surfaced at load time.

use std::collections::HashMap;

use thiserror::Error;

/// Name of the table decoding starts in.
pub const ROOT_TABLE: &str = "start";

/// Suffix on a redirect target requesting displaced dispatch: one data byte
/// is consumed and queued before the walk continues in the target table
/// (the `dd cb d op` shape, where the displacement precedes the selector).
pub const DISPLACED_SUFFIX: &str = "{b}";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("line {line}: {msg}")]
    Malformed { line: usize, msg: String },
    #[error("layer {layer:?} defines no tables")]
    EmptyLayer { layer: String },
}

impl TableError {
    fn at(line: usize, msg: impl Into<String>) -> Self {
        Self::Malformed {
            line: line + 1,
            msg: msg.into(),
        }
    }
}

/// One dispatch decision for a byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableEntry {
    /// Continue the walk in the named sub-table.
    Redirect(String),
    /// Terminal instruction text, possibly containing operand tokens.
    Text(String),
    /// Prefix collision sentinel: the preceding prefix byte(s) decode as raw
    /// data and the current byte restarts decoding.
    Collision,
}

impl TableEntry {
    fn parse(cell: &str) -> Option<Self> {
        let cell = cell.trim();
        if cell.is_empty() {
            return None;
        }
        if cell == "*" {
            return Some(Self::Collision);
        }
        if let Some(name) = cell.strip_prefix('>') {
            return Some(Self::Redirect(name.trim().to_string()));
        }
        Some(Self::Text(cell.to_string()))
    }
}

/// A single 256-entry dispatch table.
#[derive(Debug, Clone)]
pub struct OpcodeTable {
    entries: Box<[Option<TableEntry>; 256]>,
}

impl Default for OpcodeTable {
    fn default() -> Self {
        Self {
            entries: Box::new([const { None }; 256]),
        }
    }
}

impl OpcodeTable {
    pub fn set(&mut self, byte: u8, entry: TableEntry) {
        self.entries[byte as usize] = Some(entry);
    }

    pub fn get(&self, byte: u8) -> Option<&TableEntry> {
        self.entries[byte as usize].as_ref()
    }
}

#[derive(Debug, Clone)]
struct TableLayer {
    name: String,
    tables: HashMap<String, OpcodeTable>,
}

/// An ordered stack of table layers.
#[derive(Debug, Default, Clone)]
pub struct OpcodeTableSet {
    layers: Vec<TableLayer>,
}

impl OpcodeTableSet {
    /// The base Z80 instruction set.
    pub fn z80() -> Result<Self, TableError> {
        let mut set = Self::default();
        set.load_grid("z80", include_str!("tables/z80.opc"))?;
        Ok(set)
    }

    /// Base Z80 plus the Z80N (ZX Spectrum Next) extension layer.
    pub fn z80_next() -> Result<Self, TableError> {
        let mut set = Self::z80()?;
        set.load_keyed("z80n", include_str!("tables/z80n.opc"))?;
        Ok(set)
    }

    /// Append a layer parsed from the grid format.
    pub fn load_grid(&mut self, name: &str, text: &str) -> Result<(), TableError> {
        let tables = parse_grid(text)?;
        self.push_layer(name, tables)
    }

    /// Append a layer parsed from the keyed format.
    pub fn load_keyed(&mut self, name: &str, text: &str) -> Result<(), TableError> {
        let tables = parse_keyed(text)?;
        self.push_layer(name, tables)
    }

    fn push_layer(
        &mut self,
        name: &str,
        tables: HashMap<String, OpcodeTable>,
    ) -> Result<(), TableError> {
        if tables.is_empty() {
            return Err(TableError::EmptyLayer {
                layer: name.to_string(),
            });
        }
        self.layers.push(TableLayer {
            name: name.to_string(),
            tables,
        });
        Ok(())
    }

    /// Resolve a byte in the named table. Layers are scanned in load order;
    /// the last layer that defines the entry wins.
    pub fn resolve(&self, table: &str, byte: u8) -> Option<&TableEntry> {
        let mut found = None;
        for layer in &self.layers {
            if let Some(entry) = layer.tables.get(table).and_then(|t| t.get(byte)) {
                found = Some(entry);
            }
        }
        found
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.layers.iter().any(|l| l.tables.contains_key(table))
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|l| l.name.as_str())
    }
}

fn parse_grid(text: &str) -> Result<HashMap<String, OpcodeTable>, TableError> {
    let mut tables: HashMap<String, OpcodeTable> = HashMap::new();
    let mut current: Option<String> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line.strip_prefix("table ") {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(TableError::at(idx, "empty table name"));
            }
            if tables.contains_key(&name) {
                return Err(TableError::at(idx, format!("duplicate table {name:?}")));
            }
            tables.insert(name.clone(), OpcodeTable::default());
            current = Some(name);
            continue;
        }

        let Some(table) = current.clone() else {
            return Err(TableError::at(idx, "row outside a table"));
        };

        let Some((label, rest)) = line.split_once('|') else {
            return Err(TableError::at(idx, "row has no cells"));
        };
        let hi = parse_row_label(label.trim())
            .ok_or_else(|| TableError::at(idx, format!("bad row label {:?}", label.trim())))?;

        let cells: Vec<&str> = rest.split('|').collect();
        if cells.len() != 16 {
            return Err(TableError::at(
                idx,
                format!("expected 16 cells, got {}", cells.len()),
            ));
        }

        let entries = tables.entry(table).or_default();
        for (lo, cell) in cells.iter().enumerate() {
            if let Some(entry) = TableEntry::parse(cell) {
                entries.set(hi << 4 | lo as u8, entry);
            }
        }
    }

    Ok(tables)
}

/// Row labels are the high nibble followed by `x`, e.g. `3x`.
fn parse_row_label(label: &str) -> Option<u8> {
    let mut chars = label.chars();
    let nibble = chars.next()?.to_digit(16)?;
    match chars.next() {
        Some('x') if chars.next().is_none() => Some(nibble as u8),
        _ => None,
    }
}

fn parse_keyed(text: &str) -> Result<HashMap<String, OpcodeTable>, TableError> {
    let mut tables: HashMap<String, OpcodeTable> = HashMap::new();
    let mut current: Option<String> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(TableError::at(idx, "empty table name"));
            }
            tables.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }

        let Some(table) = current.clone() else {
            return Err(TableError::at(idx, "entry outside a [table] section"));
        };

        let Some((key, value)) = line.split_once('=') else {
            return Err(TableError::at(idx, "expected `byte = text`"));
        };
        let byte = u8::from_str_radix(key.trim(), 16)
            .map_err(|e| TableError::at(idx, format!("bad byte {:?}: {e}", key.trim())))?;
        let Some(entry) = TableEntry::parse(value) else {
            return Err(TableError::at(idx, "empty entry"));
        };

        tables.entry(table).or_default().set(byte, entry);
    }

    Ok(tables)
}
