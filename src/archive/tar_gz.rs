use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;

use super::{append_resources, Archiver};

/// Tar stream compressed with gzip.
#[derive(Debug)]
pub struct TarGzArchiver {
    level: Compression,
}

impl TarGzArchiver {
    pub fn new() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Default for TarGzArchiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Archiver for TarGzArchiver {
    fn format(&self) -> &'static str {
        "tar.gz"
    }

    fn produce(&self, dest: &mut dyn Write, resources: &[PathBuf]) -> Result<()> {
        let encoder = GzEncoder::new(dest, self.level);
        let mut builder = tar::Builder::new(encoder);

        append_resources(&mut builder, resources)?;

        let encoder = builder.into_inner().context("finish tar stream")?;
        encoder.finish().context("finish gzip stream")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn produces_a_gzip_compressed_tar_stream() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("notes.md");
        fs::write(&file, b"gzip me").unwrap();

        let mut out = Vec::new();
        TarGzArchiver::new().produce(&mut out, &[file]).unwrap();

        let mut decoded = Vec::new();
        flate2::read::GzDecoder::new(&out[..])
            .read_to_end(&mut decoded)
            .unwrap();

        let mut archive = tar::Archive::new(&decoded[..]);
        let mut entries = archive.entries().unwrap();
        let mut entry = entries.next().unwrap().unwrap();
        assert_eq!(entry.path().unwrap().display().to_string(), "notes.md");

        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"gzip me");
    }

    #[test]
    fn format_tag() {
        assert_eq!(TarGzArchiver::new().format(), "tar.gz");
    }
}
