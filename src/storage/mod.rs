//! Remote storage backends.
//!
//! A [`Storage`] authenticates against a backend and streams a backup from
//! the pipe's read end to a named remote object. Backends form a closed,
//! tag-keyed set: [`StorageKind`] is the CLI-facing selector and
//! [`StorageConfig`] the YAML-facing one; both reject unknown tags at parse
//! time, long before any byte is streamed.

pub mod swift;

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::ValueEnum;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::pipe::PipeReader;

/// Storage backend selector for the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    /// OpenStack Swift object storage
    Swift,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Swift => write!(f, "swift"),
        }
    }
}

/// A remote storage backend.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Establish a session with the backend. Called once per backup
    /// operation, before any upload.
    async fn authenticate(&self, cancel: &CancellationToken) -> Result<()>;

    /// Read `source` to end-of-data and upload it under the name and
    /// metadata in `params`. If the source signals an error because the
    /// producer failed, this fails with that error rather than uploading a
    /// truncated object.
    async fn write(
        &self,
        cancel: &CancellationToken,
        source: PipeReader,
        params: &WriteParams,
    ) -> Result<()>;
}

/// Backend-specific upload metadata plus the backup name, one variant per
/// backend. Owned by the caller and mutated exactly once, via
/// [`set_name`](Self::set_name), before the upload starts.
#[derive(Debug, Clone)]
pub enum WriteParams {
    Swift(swift::SwiftWriteParams),
}

impl WriteParams {
    /// Inject the derived backup name as the destination object name.
    pub fn set_name(&mut self, name: &str) {
        match self {
            WriteParams::Swift(params) => params.object_name = Some(name.to_string()),
        }
    }

    /// The destination object name, once set.
    pub fn name(&self) -> Option<&str> {
        match self {
            WriteParams::Swift(params) => params.object_name.as_deref(),
        }
    }
}

/// Storage section of the configuration file: a backend tag plus that
/// backend's own parameter structure, selected at parse time.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "lowercase")]
pub enum StorageConfig {
    Swift(swift::SwiftSettings),
}

impl StorageConfig {
    pub fn kind(&self) -> StorageKind {
        match self {
            StorageConfig::Swift(_) => StorageKind::Swift,
        }
    }

    /// Build the backend client. Credentials are resolved (config plus
    /// environment) and validated here, before any pipe or task exists.
    pub fn build(&self) -> Result<Arc<dyn Storage>> {
        match self {
            StorageConfig::Swift(settings) => {
                Ok(Arc::new(swift::SwiftStorage::new(settings.resolve()?)?))
            }
        }
    }

    /// Write parameters seeded from the configuration, name not yet set.
    pub fn write_params(&self) -> WriteParams {
        match self {
            StorageConfig::Swift(settings) => WriteParams::Swift(settings.write_params()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_name_injects_the_object_name() {
        let mut params = WriteParams::Swift(swift::SwiftWriteParams::default());
        assert!(params.name().is_none());

        params.set_name("/tmp/a.txt.tar.zst");
        assert_eq!(params.name(), Some("/tmp/a.txt.tar.zst"));
    }

    #[test]
    fn storage_config_parses_the_swift_tag() {
        let yaml = "type: swift\nparams:\n  container: backups\n  auth-version: 2\n";
        let config: StorageConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.kind(), StorageKind::Swift);

        match config {
            StorageConfig::Swift(settings) => {
                assert_eq!(settings.container.as_deref(), Some("backups"));
                assert_eq!(settings.auth_version, Some(2));
            }
        }
    }

    #[test]
    fn storage_config_rejects_unknown_tags() {
        let yaml = "type: carrier-pigeon\nparams: {}\n";
        let err = serde_yaml::from_str::<StorageConfig>(yaml).unwrap_err();
        assert!(err.to_string().contains("carrier-pigeon"));
    }

    #[test]
    fn storage_kind_displays_its_tag() {
        assert_eq!(StorageKind::Swift.to_string(), "swift");
    }
}
