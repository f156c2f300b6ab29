//! Patch-rule engine: matching, classification, application, and the
//! per-run orchestration over a single document.

pub mod applicator;
pub mod classifier;
pub mod matcher;
pub mod rule;
pub mod runner;

pub use applicator::{apply, preview, Application, ApplicationError, Substitution};
pub use classifier::{classify, Classification, ClassificationError};
pub use matcher::{Matcher, MatcherError, RuleMatch, SearchError};
pub use rule::{PatchRule, RenderFn, Replacement, RuleError};
pub use runner::{
    apply_rules, check_rules, run_rules, Outcome, RuleFailure, RuleOutcome, RuleRun, RuleStatus,
    RunFailure, RunMode,
};
