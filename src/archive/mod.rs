//! Archive producers.
//!
//! An [`Archiver`] turns a list of local resources into a single encoded
//! archive stream, one entry per resource, named after the resource's base
//! name. Producers are synchronous by design (encoders are plain
//! `std::io::Write` pipelines); the orchestrator decides where they run.
//!
//! The encoding is selected from the backup name's suffix over a closed set
//! of format tags, so the chosen producer's [`format`](Archiver::format) and
//! the name always agree. An unknown suffix is a configuration error at
//! startup, never a failure during streaming.

mod tar_gz;
mod tar_zstd;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};

pub use tar_gz::TarGzArchiver;
pub use tar_zstd::TarZstdArchiver;

/// Format tag used when the caller does not ask for anything else.
pub const DEFAULT_FORMAT: &str = "tar.zst";

/// Format tags with a registered producer.
pub const SUPPORTED_FORMATS: &[&str] = &["tar.zst", "tar.gz"];

/// A producer of one archive encoding.
pub trait Archiver: Send + Sync + std::fmt::Debug {
    /// The format tag this producer emits, e.g. `tar.zst`.
    fn format(&self) -> &'static str;

    /// Read each resource from the local filesystem and write a single
    /// encoded archive to `dest`, using each resource's base name as its
    /// entry name. Does not close `dest`; closing is the caller's job.
    fn produce(&self, dest: &mut dyn Write, resources: &[PathBuf]) -> Result<()>;
}

/// Look up the producer registered for a format tag.
pub fn by_tag(tag: &str) -> Result<Arc<dyn Archiver>> {
    match tag {
        "tar.zst" => Ok(Arc::new(TarZstdArchiver::new())),
        "tar.gz" => Ok(Arc::new(TarGzArchiver::new())),
        _ => bail!(
            "unsupported archive format '{}' (supported: {})",
            tag,
            SUPPORTED_FORMATS.join(", ")
        ),
    }
}

/// Identify the producer for a backup name from its suffix.
pub fn identify(name: &str) -> Result<Arc<dyn Archiver>> {
    for tag in SUPPORTED_FORMATS {
        if name.ends_with(&format!(".{}", tag)) {
            return by_tag(tag);
        }
    }
    bail!(
        "cannot identify archive format of '{}' (supported: {})",
        name,
        SUPPORTED_FORMATS.join(", ")
    )
}

/// An archive entry scheduled for streaming: source path, entry name, and
/// whether it is a directory tree.
#[derive(Debug)]
struct PlannedEntry {
    source: PathBuf,
    name: String,
    is_dir: bool,
}

/// Resolve entry names and stat every resource up front, so unreadable
/// inputs fail before the first byte is streamed.
fn plan_entries(resources: &[PathBuf]) -> Result<Vec<PlannedEntry>> {
    resources
        .iter()
        .map(|resource| {
            let name = entry_name(resource)?;
            let metadata = fs::metadata(resource)
                .with_context(|| format!("read resource {}", resource.display()))?;
            Ok(PlannedEntry {
                source: resource.clone(),
                name,
                is_dir: metadata.is_dir(),
            })
        })
        .collect()
}

fn entry_name(resource: &Path) -> Result<String> {
    resource
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("resource {} has no base name", resource.display()))
}

/// Append all resources to a tar stream. Shared by every tar-based producer.
fn append_resources<W: Write>(builder: &mut tar::Builder<W>, resources: &[PathBuf]) -> Result<()> {
    for entry in plan_entries(resources)? {
        if entry.is_dir {
            builder
                .append_dir_all(&entry.name, &entry.source)
                .with_context(|| format!("archive directory {}", entry.source.display()))?;
        } else {
            builder
                .append_path_with_name(&entry.source, &entry.name)
                .with_context(|| format!("archive file {}", entry.source.display()))?;
        }
    }
    Ok(())
}
