use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};

use super::{ArtifactSet, ArtifactStore};
use crate::errors::PackagingError;
use crate::models::{ArchiveInfo, RunId};

/// Bundles every artifact currently stored for a run into one archive.
pub trait Packager: Send + Sync {
    fn package(&self, run_id: &RunId) -> Result<ArchiveInfo, PackagingError>;
}

/// Writes `<archive_dir>/<run_id>.tar.gz`.
///
/// Entries are added in sorted path order with fixed metadata, so packaging
/// an unchanged run twice yields the same listing and content.
pub struct TarballPackager {
    store: Arc<dyn ArtifactStore>,
    archive_dir: PathBuf,
}

impl TarballPackager {
    pub const EXTENSION: &'static str = "tar.gz";

    pub fn new(store: Arc<dyn ArtifactStore>, archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            archive_dir: archive_dir.into(),
        }
    }

    pub fn archive_path(&self, run_id: &RunId) -> PathBuf {
        self.archive_dir
            .join(format!("{}.{}", run_id, Self::EXTENSION))
    }

    fn write_archive(&self, target: &Path, files: &ArtifactSet) -> std::io::Result<()> {
        let file = File::create(target)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.mode(tar::HeaderMode::Deterministic);

        for (path, content) in files.iter() {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(0);
            header.set_cksum();
            builder.append_data(&mut header, path, content.as_bytes())?;
        }

        builder.into_inner()?.finish()?.sync_all()
    }
}

impl Packager for TarballPackager {
    fn package(&self, run_id: &RunId) -> Result<ArchiveInfo, PackagingError> {
        let files = self.store.load(run_id)?;
        if files.is_empty() {
            return Err(PackagingError::EmptyRun {
                run_id: run_id.to_string(),
            });
        }

        let io_err = |path: &Path, source| PackagingError::Io {
            path: path.to_path_buf(),
            source,
        };

        std::fs::create_dir_all(&self.archive_dir).map_err(|e| io_err(&self.archive_dir, e))?;
        let target = self.archive_path(run_id);
        // Build next to the final name and rename, so a reader never sees a
        // half-written archive.
        let partial = target.with_extension("partial");
        self.write_archive(&partial, &files)
            .map_err(|e| io_err(&partial, e))?;
        std::fs::rename(&partial, &target).map_err(|e| io_err(&target, e))?;

        let bytes = std::fs::read(&target).map_err(|e| io_err(&target, e))?;
        let sha256 = Sha256::digest(&bytes)
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<String>();

        Ok(ArchiveInfo {
            path: target,
            sha256,
            file_count: files.len(),
            size_bytes: bytes.len() as u64,
        })
    }
}

/// Read a packaged archive back into an [`ArtifactSet`].
pub fn read_archive(path: &Path) -> Result<ArtifactSet, PackagingError> {
    let io_err = |source| PackagingError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    let mut files = ArtifactSet::new();
    for entry in archive.entries().map_err(io_err)? {
        let mut entry = entry.map_err(io_err)?;
        let name = entry.path().map_err(io_err)?.to_string_lossy().into_owned();
        let mut content = String::new();
        entry.read_to_string(&mut content).map_err(io_err)?;
        files.insert(name, content);
    }
    Ok(files)
}
