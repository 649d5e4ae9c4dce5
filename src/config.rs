//! Runtime settings for the CLI.
//!
//! Settings come from an optional YAML file; command-line flags override the
//! file, and every key has a default so no file is required.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::parse_delimiter;

pub const DEFAULT_TABLE_NAME: &str = "data";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub mappings_dir: PathBuf,
    pub outbox_dir: PathBuf,
    pub default_table_name: String,
    /// Single character or one of `comma`, `tab`, `pipe`, `semicolon`.
    pub delimiter: Option<String>,
    pub input_encoding: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mappings_dir: PathBuf::from("mappings"),
            outbox_dir: PathBuf::from("outbox"),
            default_table_name: DEFAULT_TABLE_NAME.to_string(),
            delimiter: None,
            input_encoding: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Opening config file {path:?}"))?;
        Self::from_yaml(&raw).with_context(|| format!("Parsing config file {path:?}"))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(raw)?;
        config.delimiter_byte()?;
        Ok(config)
    }

    /// Loads `path` when given, defaults otherwise.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn delimiter_byte(&self) -> Result<Option<u8>> {
        self.delimiter
            .as_deref()
            .map(|raw| parse_delimiter(raw).map_err(|err| anyhow::anyhow!(err)))
            .transpose()
    }
}
