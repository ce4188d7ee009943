//! Application configuration file handling.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::storage::StorageConfig;

/// Top-level YAML configuration:
///
/// ```yaml
/// storage:
///   type: swift
///   params:
///     container: backups
///     auth-version: 3
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
}

impl Config {
    /// Read and parse a YAML configuration file. Unknown storage types fail
    /// here, at load time.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("parse config file {}", path.display()))
    }
}
