//! Backup name derivation and validation.
//!
//! Runs before any pipe, task, or network client is created: a bad name is a
//! configuration error, never a streaming-time one.

use std::path::PathBuf;

use anyhow::{bail, Result};

/// Derive the destination object name for a backup.
///
/// With an explicit name, that name is used. Without one, a single resource
/// lends its own path as the name; more than one resource without an explicit
/// name is an error, since no sensible name can be derived across multiple
/// inputs. The result is always suffixed with the archive format tag.
pub fn derive_backup_name(
    resources: &[PathBuf],
    explicit: Option<&str>,
    format: &str,
) -> Result<String> {
    if resources.is_empty() {
        bail!("resources for backup were not specified");
    }

    let base = match explicit {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => {
            if resources.len() > 1 {
                bail!(
                    "backup name is required when handling more than one file or directory \
                     (pass --name)"
                );
            }
            resources[0].display().to_string()
        }
    };

    Ok(format!("{}.{}", base, format))
}
