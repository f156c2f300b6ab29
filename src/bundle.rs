//! Locate the webview bundle inside an extracted archive.
//!
//! Bundle filenames carry a content hash that changes with every app build,
//! so the bundle is resolved through the script reference in
//! `webview/index.html` rather than by name.

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

const INDEX_HTML: &str = "webview/index.html";
const ASSETS_DIR: &str = "webview/assets";

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("missing expected file: {0}")]
    IndexMissing(PathBuf),

    #[error("could not locate webview bundle in {0}")]
    ReferenceMissing(PathBuf),

    #[error("bundle referenced by index.html does not exist: {0}")]
    BundleMissing(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn script_reference() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"src=["'][^"']*assets/(index-[^"']+\.js)["']"#)
            .expect("script reference pattern is valid")
    })
}

/// Resolve the bundle path from `webview/index.html` under `extracted_root`.
pub fn locate_bundle(extracted_root: &Path) -> Result<PathBuf, BundleError> {
    let index_html = extracted_root.join(INDEX_HTML);
    if !index_html.exists() {
        return Err(BundleError::IndexMissing(index_html));
    }

    let html = fs::read_to_string(&index_html).map_err(|source| BundleError::Io {
        path: index_html.clone(),
        source,
    })?;

    let file_name = script_reference()
        .captures(&html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| BundleError::ReferenceMissing(index_html.clone()))?;

    let bundle = extracted_root.join(ASSETS_DIR).join(file_name);
    if !bundle.is_file() {
        return Err(BundleError::BundleMissing(bundle));
    }

    tracing::debug!(bundle = %bundle.display(), "located webview bundle");
    Ok(bundle)
}
