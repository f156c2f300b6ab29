//! Resolve which `app.asar` to patch.
//!
//! Priority order:
//! 1. Explicit `--asar` flag (`~` expanded)
//! 2. `CODEX_ASAR` environment variable
//! 3. Well-known extraction locations under the current directory
//! 4. A recursive scan that must find exactly one `app.asar`

use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

pub const ARCHIVE_ENV: &str = "CODEX_ASAR";
const ARCHIVE_NAME: &str = "app.asar";

const CANDIDATES: &[&str] = &[
    "squashfs-root/resources/app.asar",
    "work/extracted/resources/app.asar",
    "work/extracted/Codex.app/Contents/Resources/app.asar",
];

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("multiple app.asar files found; pass --asar to choose one: {}", list(.0))]
    Ambiguous(Vec<PathBuf>),
}

fn list(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolve the archive from the flag, environment, or current directory.
///
/// `Ok(None)` means nothing was found; the returned path is not checked for
/// existence when it came from the flag or environment.
pub fn resolve_archive(flag: Option<&Path>) -> Result<Option<PathBuf>, DiscoverError> {
    if let Some(path) = flag {
        return Ok(Some(expand_tilde(path)));
    }

    if let Some(env_path) = env::var_os(ARCHIVE_ENV).filter(|v| !v.is_empty()) {
        return Ok(Some(expand_tilde(Path::new(&env_path))));
    }

    match env::current_dir() {
        Ok(cwd) => find_default_archive(&cwd),
        Err(_) => Ok(None),
    }
}

/// Look under `root` for the well-known locations, then scan for a single
/// `app.asar`.
pub fn find_default_archive(root: &Path) -> Result<Option<PathBuf>, DiscoverError> {
    if let Some(found) = CANDIDATES
        .iter()
        .map(|candidate| root.join(candidate))
        .find(|candidate| candidate.is_file())
    {
        return Ok(Some(found));
    }

    let mut matches: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == ARCHIVE_NAME)
        .map(|entry| entry.into_path())
        .collect();
    matches.sort();

    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        _ => Err(DiscoverError::Ambiguous(matches)),
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match home::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}
