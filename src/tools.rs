//! External collaborators: archive extraction/packing, syntax checking, and
//! beautification.
//!
//! Each concern is a trait so a run can be driven by the stock command-line
//! tools (`npx asar`, `node --check`, `js-beautify`) or by in-process fakes.
//! Every command runs synchronously with no timeout.

use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

const NPX_ENV: &str = "CODEX_PATCHER_NPX";
const NODE_ENV: &str = "CODEX_PATCHER_NODE";
const JS_BEAUTIFY: &str = "js-beautify@1.15.1";

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("command failed ({status}): {command}\n{output}")]
    Failed {
        command: String,
        status: String,
        output: String,
    },
}

pub trait ArchiveTool {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<(), ToolError>;
    fn pack(&self, src: &Path, archive: &Path) -> Result<(), ToolError>;
}

pub trait SyntaxValidator {
    fn validate(&self, document: &Path) -> Result<(), ToolError>;
}

pub trait Beautifier {
    /// Write a formatted copy next to `document`, returning its path.
    fn beautify(&self, document: &Path) -> Result<PathBuf, ToolError>;
}

/// The collaborators one session runs with.
pub struct Toolchain {
    pub archive: Box<dyn ArchiveTool>,
    pub validator: Box<dyn SyntaxValidator>,
    pub beautifier: Box<dyn Beautifier>,
}

impl Toolchain {
    /// Command-backed tools; `CODEX_PATCHER_NPX` / `CODEX_PATCHER_NODE`
    /// override the binaries.
    pub fn from_env() -> Self {
        let npx = env::var_os(NPX_ENV).unwrap_or_else(|| OsString::from("npx"));
        let node = env::var_os(NODE_ENV).unwrap_or_else(|| OsString::from("node"));
        Self {
            archive: Box::new(AsarCli { npx: npx.clone() }),
            validator: Box::new(NodeCheck { node }),
            beautifier: Box::new(JsBeautify { npx }),
        }
    }
}

/// `npx -y asar extract|pack`.
#[derive(Debug, Clone)]
pub struct AsarCli {
    pub npx: OsString,
}

impl ArchiveTool for AsarCli {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<(), ToolError> {
        run_checked(
            &self.npx,
            &[
                OsStr::new("-y"),
                OsStr::new("asar"),
                OsStr::new("extract"),
                archive.as_os_str(),
                dest.as_os_str(),
            ],
            None,
        )
        .map(drop)
    }

    fn pack(&self, src: &Path, archive: &Path) -> Result<(), ToolError> {
        run_checked(
            &self.npx,
            &[
                OsStr::new("-y"),
                OsStr::new("asar"),
                OsStr::new("pack"),
                src.as_os_str(),
                archive.as_os_str(),
            ],
            None,
        )
        .map(drop)
    }
}

/// `node --check <file>`, run in place so the surrounding package.json
/// decides the module type.
#[derive(Debug, Clone)]
pub struct NodeCheck {
    pub node: OsString,
}

impl SyntaxValidator for NodeCheck {
    fn validate(&self, document: &Path) -> Result<(), ToolError> {
        run_checked(
            &self.node,
            &[OsStr::new("--check"), document.as_os_str()],
            None,
        )
        .map(drop)
    }
}

/// `npx -y js-beautify` into `<stem>.beautified.js`.
#[derive(Debug, Clone)]
pub struct JsBeautify {
    pub npx: OsString,
}

impl Beautifier for JsBeautify {
    fn beautify(&self, document: &Path) -> Result<PathBuf, ToolError> {
        let output = beautified_path(document);
        run_checked(
            &self.npx,
            &[
                OsStr::new("-y"),
                OsStr::new(JS_BEAUTIFY),
                document.as_os_str(),
                OsStr::new("-o"),
                output.as_os_str(),
                OsStr::new("--indent-size"),
                OsStr::new("2"),
                OsStr::new("--wrap-line-length"),
                OsStr::new("100"),
                OsStr::new("--max-preserve-newlines"),
                OsStr::new("2"),
                OsStr::new("--end-with-newline"),
            ],
            None,
        )?;
        Ok(output)
    }
}

/// `index-abc.js` -> `index-abc.beautified.js`
pub fn beautified_path(document: &Path) -> PathBuf {
    document.with_extension("beautified.js")
}

/// Run a command to completion, returning stdout followed by stderr.
///
/// A non-zero exit becomes [`ToolError::Failed`] carrying the command line
/// and everything it printed.
pub fn run_checked(
    program: &OsStr,
    args: &[&OsStr],
    cwd: Option<&Path>,
) -> Result<String, ToolError> {
    let command_line = std::iter::once(program)
        .chain(args.iter().copied())
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    tracing::debug!(command = %command_line, "running external tool");

    let mut command = Command::new(program);
    command.args(args);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let output = command.output().map_err(|source| ToolError::Spawn {
        program: program.to_string_lossy().into_owned(),
        source,
    })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        let status = output
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |code| code.to_string());
        return Err(ToolError::Failed {
            command: command_line,
            status,
            output: combined,
        });
    }

    Ok(combined)
}
