//! One patch session against one archive.
//!
//! extract -> locate bundle -> run rules -> (real run, text changed only)
//! write bundle -> syntax check -> beautify (best effort) -> pack -> backup
//! and swap -> checksums.
//!
//! The archive is never touched until every rule, the syntax check, and the
//! repack have succeeded and the backup is on disk. The extracted tree lives
//! in a temporary directory that is removed on every path unless retention
//! was requested.

use crate::bundle::{locate_bundle, BundleError};
use crate::checksum::{asar_header_sha256, sha256_file};
use crate::engine::{
    preview, run_rules, ApplicationError, Outcome, PatchRule, RuleOutcome, RunFailure, RunMode,
};
use crate::swap::{atomic_write, backup_and_swap, SwapError};
use crate::tools::{ToolError, Toolchain};
use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;

const EXTRACT_PREFIX: &str = "codex_app_asar_extract_";
const PACK_PREFIX: &str = "codex_app_asar_pack_";
const KEEP_PREFIX: &str = "codex_app_asar_extract_keep.";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("archive not found: {0}")]
    ArchiveMissing(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error("extraction failed: {0}")]
    Extract(#[source] ToolError),

    #[error("syntax check failed: {0}")]
    Syntax(#[source] ToolError),

    #[error("repack failed: {0}")]
    Pack(#[source] ToolError),

    #[error(transparent)]
    Rules(#[from] RunFailure),

    #[error("diff preview failed: {0}")]
    Preview(#[source] ApplicationError),

    #[error(transparent)]
    Swap(#[from] SwapError),
}

impl SessionError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        SessionError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A failed session, with the extracted tree if it was kept for inspection.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct SessionFailure {
    #[source]
    pub error: SessionError,
    pub kept_extracted: Option<PathBuf>,
}

impl From<SessionError> for SessionFailure {
    fn from(error: SessionError) -> Self {
        Self {
            error,
            kept_extracted: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub mode: RunMode,
    pub beautify: bool,
    pub keep_extracted: bool,
    /// Fill per-rule substitutions for dry runs too.
    pub diff: bool,
    /// Where temporary and kept trees are created.
    pub scratch_dir: PathBuf,
    /// UTC stamp used for backup and kept-tree names.
    pub timestamp: String,
}

impl SessionOptions {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            beautify: true,
            keep_extracted: false,
            diff: false,
            scratch_dir: std::env::temp_dir(),
            timestamp: Utc::now().format("%Y%m%dT%H%M%SZ").to_string(),
        }
    }
}

/// What a real run left on disk.
#[derive(Debug, Clone, Serialize)]
pub struct Persisted {
    pub backup: PathBuf,
    /// Beautified copy, relative to the archive root.
    pub beautified: Option<PathBuf>,
    pub new_sha256: Option<String>,
    pub backup_sha256: Option<String>,
    pub header_sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub archive: PathBuf,
    /// Bundle path relative to the archive root.
    pub bundle: PathBuf,
    pub mode: RunMode,
    pub outcomes: Vec<RuleOutcome>,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub persisted: Option<Persisted>,
    pub kept_extracted: Option<PathBuf>,
}

/// Run `rules` against the webview bundle inside `archive`.
pub fn run_session(
    archive: &Path,
    rules: &[PatchRule],
    tools: &Toolchain,
    options: &SessionOptions,
) -> Result<SessionReport, SessionFailure> {
    if !archive.is_file() {
        return Err(SessionError::ArchiveMissing(archive.to_path_buf()).into());
    }

    let extracted = tempfile::Builder::new()
        .prefix(EXTRACT_PREFIX)
        .tempdir_in(&options.scratch_dir)
        .map_err(|e| SessionError::io(&options.scratch_dir, e))?;

    let result = patch_extracted(archive, extracted.path(), rules, tools, options);

    if !options.keep_extracted {
        return result.map_err(SessionFailure::from);
    }

    let kept_extracted = keep_tree(extracted, options);
    match result {
        Ok(mut report) => {
            report.kept_extracted = kept_extracted;
            Ok(report)
        }
        Err(error) => Err(SessionFailure {
            error,
            kept_extracted,
        }),
    }
}

fn patch_extracted(
    archive: &Path,
    root: &Path,
    rules: &[PatchRule],
    tools: &Toolchain,
    options: &SessionOptions,
) -> Result<SessionReport, SessionError> {
    tools
        .archive
        .extract(archive, root)
        .map_err(SessionError::Extract)?;

    let bundle = locate_bundle(root)?;
    let original = fs::read_to_string(&bundle).map_err(|e| SessionError::io(&bundle, e))?;

    let run = run_rules(&original, rules, options.mode)?;

    let mut report = SessionReport {
        archive: archive.to_path_buf(),
        bundle: bundle.strip_prefix(root).unwrap_or(&bundle).to_path_buf(),
        mode: options.mode,
        outcome: run.outcome(),
        outcomes: run.outcomes,
        persisted: None,
        kept_extracted: None,
    };

    if options.mode == RunMode::DryRun {
        if options.diff {
            for (outcome, rule) in report.outcomes.iter_mut().zip(rules) {
                outcome.substitutions =
                    preview(&original, rule).map_err(SessionError::Preview)?;
            }
        }
        return Ok(report);
    }

    if !run.changed {
        tracing::info!("no changes to write");
        return Ok(report);
    }

    atomic_write(&bundle, run.text.as_bytes()).map_err(|e| SessionError::io(&bundle, e))?;
    tools
        .validator
        .validate(&bundle)
        .map_err(SessionError::Syntax)?;

    let beautified = if options.beautify {
        match tools.beautifier.beautify(&bundle) {
            Ok(path) => Some(path.strip_prefix(root).unwrap_or(&path).to_path_buf()),
            Err(err) => {
                tracing::warn!(error = %err, "beautify failed; continuing with the patched bundle");
                None
            }
        }
    } else {
        None
    };

    let pack_dir = tempfile::Builder::new()
        .prefix(PACK_PREFIX)
        .tempdir_in(&options.scratch_dir)
        .map_err(|e| SessionError::io(&options.scratch_dir, e))?;
    let packed = pack_dir.path().join(archive_file_name(archive));
    tools
        .archive
        .pack(root, &packed)
        .map_err(SessionError::Pack)?;

    let backup = backup_and_swap(archive, &packed, &options.timestamp)?;

    report.persisted = Some(Persisted {
        new_sha256: report_checksum("archive", sha256_file(archive)),
        backup_sha256: report_checksum("backup", sha256_file(&backup)),
        header_sha256: report_checksum("asar header", asar_header_sha256(archive)),
        backup,
        beautified,
    });
    Ok(report)
}

fn archive_file_name(archive: &Path) -> PathBuf {
    archive
        .file_name()
        .map_or_else(|| PathBuf::from("app.asar"), PathBuf::from)
}

/// Checksums are informational once the swap is done; a failure is logged
/// rather than reported as a failed run.
fn report_checksum<E: std::fmt::Display>(what: &str, result: Result<String, E>) -> Option<String> {
    match result {
        Ok(sum) => Some(sum),
        Err(err) => {
            tracing::warn!(error = %err, "could not checksum {what}");
            None
        }
    }
}

/// Move the extracted tree to a stable location. Refuses to overwrite an
/// existing directory.
fn keep_tree(extracted: TempDir, options: &SessionOptions) -> Option<PathBuf> {
    let keep_dir = options
        .scratch_dir
        .join(format!("{KEEP_PREFIX}{}", options.timestamp));

    if keep_dir.exists() {
        tracing::warn!(path = %keep_dir.display(), "refusing to overwrite kept tree; extracted files discarded");
        return None;
    }

    match fs::rename(extracted.path(), &keep_dir) {
        Ok(()) => {
            tracing::info!(path = %keep_dir.display(), "kept extracted tree");
            Some(keep_dir)
        }
        Err(err) => {
            tracing::warn!(error = %err, "could not keep extracted tree");
            None
        }
    }
}
