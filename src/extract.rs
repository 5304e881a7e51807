//! Zip extraction confined to a staging directory.
//!
//! Every archive, whichever catalog it came from, is unpacked through
//! [`extract`]. An entry whose normalized destination leaves the staging
//! directory aborts the whole extraction.
use crate::error::{Error, Result};
use path_dedot::ParseDot;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::result::ZipError;
use zip::ZipArchive;

/// Resolves `entry_name` beneath `staging_dir`, refusing anything that would
/// land outside it.
pub fn resolve_entry(staging_dir: &Path, entry_name: &str) -> Result<PathBuf> {
    let joined = staging_dir.join(entry_name);
    let normalized = joined.parse_dot()?.into_owned();
    if !normalized.starts_with(staging_dir) {
        return Err(Error::PathTraversal {
            entry: entry_name.to_string(),
        });
    }
    Ok(normalized)
}

/// Unpacks `archive_path` into `staging_dir` and returns the produced files
/// relative to `staging_dir`, in archive order. Directory entries are created
/// but not reported.
pub fn extract(archive_path: &Path, staging_dir: &Path) -> Result<Vec<PathBuf>> {
    debug!(?archive_path, ?staging_dir, "extracting archive");
    fs::create_dir_all(staging_dir)?;
    let staging_dir = staging_dir.parse_dot()?.into_owned();

    let corrupt = |source| Error::CorruptArchive {
        archive: archive_path.to_path_buf(),
        source,
    };
    let file = File::open(archive_path).map_err(|e| corrupt(ZipError::Io(e)))?;
    let mut archive = ZipArchive::new(file).map_err(corrupt)?;

    let mut produced = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(corrupt)?;
        let destination = resolve_entry(&staging_dir, entry.name())?;

        if entry.is_dir() {
            fs::create_dir_all(&destination)?;
            continue;
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&destination)?;
        io::copy(&mut entry, &mut out)?;

        let relative = destination
            .strip_prefix(&staging_dir)
            .map(Path::to_path_buf)
            .map_err(|_| Error::PathTraversal {
                entry: entry.name().to_string(),
            })?;
        debug!(entry = %entry.name(), "extracted");
        produced.push(relative);
    }

    info!(?archive_path, extracted_count = produced.len(), "extraction complete");
    Ok(produced)
}

/// Whether a download should be treated as a zip archive.
pub fn is_zip(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}
