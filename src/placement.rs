use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Resolves where a single file called `source_name` should end up.
///
/// An empty `output` means `cwd`; a relative one is taken relative to `cwd`.
/// If the result is an existing directory the source's base name is appended,
/// otherwise the path is used as-is and its parent directories are created.
pub fn make_output_path(source_name: &str, output: &str, cwd: &Path) -> Result<PathBuf> {
    if source_name.is_empty() {
        return Err(Error::Protocol(
            "expected source name, got empty name".to_string(),
        ));
    }

    let output = if output.is_empty() {
        cwd.to_path_buf()
    } else {
        cwd.join(output)
    };

    if output.is_dir() {
        let base_name = Path::new(source_name)
            .file_name()
            .ok_or_else(|| Error::Protocol(format!("source has no file name: {source_name}")))?;
        return Ok(output.join(base_name));
    }

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(output)
}

/// Moves everything produced in `staging_dir` to its final location.
///
/// A single produced file with a non-empty `destination` is placed as a file
/// (see [`make_output_path`]). Otherwise `destination` (or `cwd` when empty)
/// is a directory root and the relative layout is recreated beneath it.
/// Files already moved are left in place if a later move fails.
pub fn place(
    staging_dir: &Path,
    produced: &[PathBuf],
    destination: &str,
    cwd: &Path,
) -> Result<Vec<PathBuf>> {
    if let [single] = produced {
        if !destination.is_empty() {
            let source_name = single.to_string_lossy();
            let target = make_output_path(&source_name, destination, cwd)?;
            move_file(&staging_dir.join(single), &target)?;
            info!(path = %target.display(), "placed download");
            return Ok(vec![target]);
        }
    }

    let root = if destination.is_empty() {
        cwd.to_path_buf()
    } else {
        cwd.join(destination)
    };

    let mut placed = Vec::with_capacity(produced.len());
    for relative in produced {
        let target = root.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        move_file(&staging_dir.join(relative), &target)?;
        debug!(path = %target.display(), "placed file");
        placed.push(target);
    }
    info!(root = %root.display(), count = placed.len(), "placed extracted files");
    Ok(placed)
}

pub fn move_file(source: &Path, destination: &Path) -> Result<()> {
    move_with(source, destination, |from, to| fs::rename(from, to))
}

/// Renames when possible; across devices falls back to copy then delete.
fn move_with<R>(source: &Path, destination: &Path, rename: R) -> Result<()>
where
    R: Fn(&Path, &Path) -> io::Result<()>,
{
    match rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            debug!(?source, ?destination, "cross-device move, copying");
            let mut from = File::open(source)?;
            let mut to = File::create(destination)?;
            io::copy(&mut from, &mut to)?;
            to.sync_all()?;
            drop(from);
            fs::remove_file(source)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
