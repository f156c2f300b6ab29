use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SwapError {
    #[error("failed to back up {archive} to {backup}: {source}")]
    Backup {
        archive: PathBuf,
        backup: PathBuf,
        source: io::Error,
    },

    #[error("refusing to overwrite existing backup: {0}")]
    BackupExists(PathBuf),

    #[error("failed to replace {archive}: {source}")]
    Replace { archive: PathBuf, source: io::Error },
}

/// `app.asar` -> `app.asar.bak.<timestamp>`
pub fn backup_path(archive: &Path, timestamp: &str) -> PathBuf {
    let mut name = archive.as_os_str().to_os_string();
    name.push(format!(".bak.{timestamp}"));
    PathBuf::from(name)
}

/// Back up `archive`, then overwrite it with the bytes of `replacement`.
///
/// The backup is fully written and synced before the archive is touched, and
/// the archive itself is replaced by rename, so a crash leaves either the old
/// or the new archive in place, never a partial one.
pub fn backup_and_swap(
    archive: &Path,
    replacement: &Path,
    timestamp: &str,
) -> Result<PathBuf, SwapError> {
    let backup = backup_path(archive, timestamp);
    if backup.exists() {
        return Err(SwapError::BackupExists(backup));
    }

    durable_copy(archive, &backup, false).map_err(|source| SwapError::Backup {
        archive: archive.to_path_buf(),
        backup: backup.clone(),
        source,
    })?;
    tracing::info!(backup = %backup.display(), "archive backed up");

    durable_copy(replacement, archive, true).map_err(|source| SwapError::Replace {
        archive: archive.to_path_buf(),
        source,
    })?;
    tracing::info!(archive = %archive.display(), "archive replaced");

    Ok(backup)
}

/// Copy `src` onto `dest` via a synced tempfile in `dest`'s directory.
///
/// Permissions follow `dest` when it is being replaced, `src` otherwise.
fn durable_copy(src: &Path, dest: &Path, overwrite: bool) -> io::Result<()> {
    let parent = dest.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "Path has no parent directory")
    })?;

    let permissions = if overwrite && dest.exists() {
        fs::metadata(dest)?.permissions()
    } else {
        fs::metadata(src)?.permissions()
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    io::copy(&mut File::open(src)?, &mut temp)?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    fs::set_permissions(temp.path(), permissions)?;

    if overwrite {
        temp.persist(dest).map_err(|e| e.error)?;
    } else {
        temp.persist_noclobber(dest).map_err(|e| e.error)?;
    }
    Ok(())
}

/// Atomic file write: tempfile + fsync + rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "Path has no parent directory")
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(temp.path(), meta.permissions())?;
    }
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
