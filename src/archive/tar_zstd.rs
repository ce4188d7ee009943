use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};

use super::{append_resources, Archiver};

/// Tar stream compressed with zstd; the default producer.
#[derive(Debug)]
pub struct TarZstdArchiver {
    level: i32,
}

impl TarZstdArchiver {
    pub fn new() -> Self {
        Self {
            level: zstd::DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl Default for TarZstdArchiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Archiver for TarZstdArchiver {
    fn format(&self) -> &'static str {
        "tar.zst"
    }

    fn produce(&self, dest: &mut dyn Write, resources: &[PathBuf]) -> Result<()> {
        let encoder = zstd::Encoder::new(dest, self.level).context("initialize zstd encoder")?;
        let mut builder = tar::Builder::new(encoder);

        append_resources(&mut builder, resources)?;

        let encoder = builder.into_inner().context("finish tar stream")?;
        encoder.finish().context("finish zstd stream")?;
        Ok(())
    }
}
