//! # packhorse
//!
//! A streaming backup tool: archive a set of local files, compress the
//! stream, and upload it to remote object storage without ever holding the
//! full archive on disk or in memory.
//!
//! ## Overview
//!
//! The archive producer and the storage consumer run concurrently, joined by
//! an in-process rendezvous pipe. The producer encodes the archive into the
//! pipe's write half from a blocking thread; the consumer authenticates to
//! the backend and drains the read half into a streaming upload. Because the
//! pipe hands over one write's bytes at a time, a slow upload back-pressures
//! the encoder and memory stays bounded regardless of archive size.
//!
//! ## Features
//!
//! - **Streaming end to end**: no temporary archive file, no full in-memory
//!   buffer
//! - **Multiple archive formats**: `tar.zst` (default) and `tar.gz`,
//!   selected from the backup name's suffix
//! - **Swift object storage**: TempAuth and Keystone (v1-v3) authentication,
//!   credentials from YAML configuration or environment variables
//! - **Failure propagation**: a producer failure travels through the pipe
//!   and surfaces from the upload with its original message
//! - **Cancellation**: an interrupt aborts authentication, upload, and any
//!   blocked pipe operation
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::PathBuf;
//!
//! use packhorse::application::Backup;
//! use packhorse::archive;
//! use packhorse::naming::derive_backup_name;
//! use packhorse::storage::swift::SwiftSettings;
//! use packhorse::storage::StorageConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let resources = vec![PathBuf::from("/tmp/a.txt")];
//! let name = derive_backup_name(&resources, None, archive::DEFAULT_FORMAT)?;
//!
//! let storage_config = StorageConfig::Swift(SwiftSettings::default());
//! let storage = storage_config.build()?;
//! let mut params = storage_config.write_params();
//! params.set_name(&name);
//!
//! let backup = Backup::new(storage, archive::identify(&name)?);
//! backup.save(&CancellationToken::new(), &resources, &params).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`pipe`]: the rendezvous byte pipe connecting producer and consumer
//! - [`archive`]: archive producers and the format registry
//! - [`storage`]: storage backends, write parameters, and the backend
//!   registry
//! - [`application`]: the backup orchestrator
//! - [`naming`]: backup name derivation and validation
//! - [`config`]: YAML configuration loading
//! - [`cli`]: command-line interface definitions

/// Backup orchestration
pub mod application;

/// Archive producers and the format registry
pub mod archive;

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Configuration file handling
pub mod config;

/// Backup name derivation and validation
pub mod naming;

/// In-process rendezvous byte pipe
pub mod pipe;

/// Remote storage backends
pub mod storage;
