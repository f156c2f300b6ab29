//! Codex ASAR Patcher: idempotent, count-verified rewrites of the Codex
//! desktop webview bundle.
//!
//! # Architecture
//!
//! Every change is a [`PatchRule`]: a regular expression describing the
//! unpatched shape, an exact number of occurrences it must have, and a
//! capture-aware replacement. Before anything is written each rule is
//! classified against the current text as already applied, needing
//! application, or an error. A document is only rewritten when every rule in
//! the set classified cleanly.
//!
//! A [`session`] wraps the rule pass with archive I/O: extract `app.asar`,
//! locate the bundle, run the rules, syntax-check, repack, then back up the
//! original before replacing it.
//!
//! # Safety
//!
//! - Precondition counts are verified before and after substitution
//! - Re-running a rule set on patched text is a no-op
//! - Nothing is persisted unless every rule, the syntax check, and the repack
//!   succeed
//! - The original archive is backed up (tempfile + fsync + persist) before it
//!   is replaced
//!
//! # Example
//!
//! ```no_run
//! use codex_asar_patcher::{apply_rules, PatchRule, Replacement};
//!
//! let rule = PatchRule::new("flag_on", r"enabled:!1", Replacement::template("enabled:!0"))
//!     .unwrap();
//!
//! match apply_rules("x={enabled:!1}", &[rule]) {
//!     Ok(run) => println!("{}", run.text),
//!     Err(e) => eprintln!("Patch failed: {}", e),
//! }
//! ```

pub mod bundle;
pub mod checksum;
pub mod config;
pub mod discover;
pub mod engine;
pub mod logging;
pub mod rules;
pub mod session;
pub mod swap;
pub mod tools;

// Re-exports
pub use config::{load_from_path, load_from_str, ConfigError, RuleSetConfig, ValidationError};
pub use engine::{
    apply, apply_rules, check_rules, classify, preview, run_rules, Application, ApplicationError,
    Classification, ClassificationError, Matcher, MatcherError, Outcome, PatchRule, Replacement,
    RuleError, RuleFailure, RuleMatch, RuleOutcome, RuleRun, RuleStatus, RunFailure, RunMode,
    SearchError, Substitution,
};
pub use rules::RuleSet;
pub use session::{
    run_session, Persisted, SessionError, SessionFailure, SessionOptions, SessionReport,
};
pub use tools::{ArchiveTool, Beautifier, SyntaxValidator, ToolError, Toolchain};
