use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum InstructionSet {
    #[default]
    Z80,
    Z80Next,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub slot_size: u16,
    pub instruction_set: InstructionSet,
    pub listing_path: PathBuf,
    pub symbols_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 10000,
            slot_size: 0x4000,
            instruction_set: InstructionSet::default(),
            listing_path: PathBuf::from("disassembly.lst"),
            symbols_path: None,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("zrdb").join("config.toml");
    }
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home).join(".config").join("zrdb").join("config.toml");
    }
    PathBuf::from("zrdb.toml")
}

/// Load the config, falling back to defaults when the file is missing or
/// does not parse.
pub fn load(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(text) => match toml::from_str(&text) {
            Ok(config) => config,
            Err(e) => {
                warn!("ignoring malformed config {}: {e}", path.display());
                Config::default()
            }
        },
        Err(_) => Config::default(),
    }
}
