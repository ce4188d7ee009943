//! Backup orchestration.
//!
//! [`Backup::save`] runs the archive producer and the storage consumer
//! concurrently over one pipe: the producer streams the encoded archive into
//! the write half from a blocking thread while the consumer authenticates and
//! then drains the read half into the backend. The pipe close protocol is the
//! only coordination between the two; `save` never joins the producer task.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::archive::Archiver;
use crate::pipe::{self, BlockingWriter};
use crate::storage::{Storage, WriteParams};

/// The backup application: one storage backend, one archive producer.
pub struct Backup {
    storage: Arc<dyn Storage>,
    archiver: Arc<dyn Archiver>,
}

impl Backup {
    pub fn new(storage: Arc<dyn Storage>, archiver: Arc<dyn Archiver>) -> Self {
        Self { storage, archiver }
    }

    /// Archive `resources` and stream the result into storage under the name
    /// and metadata carried by `params`.
    ///
    /// The operation is all-or-nothing from the caller's view: on error, no
    /// complete remote object may be assumed to exist (a partial object may
    /// remain; no cleanup is attempted). If authentication fails, the
    /// producer is abandoned rather than awaited; dropping the read half on
    /// return fails the producer's next pipe write, which stops it.
    pub async fn save(
        &self,
        cancel: &CancellationToken,
        resources: &[PathBuf],
        params: &WriteParams,
    ) -> Result<()> {
        info!(
            "Archiving {} resource(s) as {}",
            resources.len(),
            self.archiver.format()
        );

        let (writer, reader) = pipe::in_memory(cancel.clone());

        let archiver = Arc::clone(&self.archiver);
        let resources = resources.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut dest = BlockingWriter::new(writer);
            match archiver.produce(&mut dest, &resources) {
                Ok(()) => dest.into_inner().close(),
                Err(err) => {
                    warn!("Archive production failed: {:#}", err);
                    dest.into_inner()
                        .close_with_error(io::Error::other(format!("produce archive: {:#}", err)));
                }
            }
        });

        info!("Authenticating to storage");
        self.storage
            .authenticate(cancel)
            .await
            .context("authenticate storage")?;
        info!("Authentication to storage succeeded");

        info!("Writing backup to storage");
        self.storage
            .write(cancel, reader, params)
            .await
            .context("write to storage")?;
        info!("Writing to storage completed");

        Ok(())
    }
}
