//! Three-way rule classification.
//!
//! Blind substitution is unsafe both across repeated runs (re-patching an
//! already patched bundle) and across upstream drift (the shape moved or
//! multiplied). Classification tells those apart from a true one-time
//! application before any text is touched.

use crate::engine::matcher::SearchError;
use crate::engine::rule::PatchRule;
use thiserror::Error;

/// State of one rule against the current document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Postcondition holds and the precondition is absent; nothing to do.
    Already,
    /// Precondition present exactly `expected_count` times.
    NeedsApply { matches: usize },
}

/// The document is in a shape the rule does not understand.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassificationError {
    #[error("{rule}: rule precondition absent and postcondition unconfirmed")]
    PreconditionAbsent { rule: String },

    #[error("{rule}: unpatched and patched forms both present ({found} unpatched match(es))")]
    Inconsistent { rule: String, found: usize },

    #[error("{rule}: expected {expected} match(es), found {found}")]
    CountMismatch {
        rule: String,
        expected: usize,
        found: usize,
    },

    #[error("{rule}: {source}")]
    Search {
        rule: String,
        #[source]
        source: SearchError,
    },
}

/// Decide whether `rule` is already satisfied, needs applying, or cannot be
/// applied safely to `text`.
pub fn classify(text: &str, rule: &PatchRule) -> Result<Classification, ClassificationError> {
    let search = |source: SearchError| ClassificationError::Search {
        rule: rule.name().to_string(),
        source,
    };
    let found = rule.unpatched().count(text).map_err(search)?;
    let evidence = rule.evidence_in(text).map_err(search)?;

    if found == 0 {
        if evidence {
            tracing::debug!(rule = rule.name(), "already applied");
            return Ok(Classification::Already);
        }
        return Err(ClassificationError::PreconditionAbsent {
            rule: rule.name().to_string(),
        });
    }

    if evidence {
        return Err(ClassificationError::Inconsistent {
            rule: rule.name().to_string(),
            found,
        });
    }

    if found != rule.expected_count() {
        return Err(ClassificationError::CountMismatch {
            rule: rule.name().to_string(),
            expected: rule.expected_count(),
            found,
        });
    }

    tracing::debug!(rule = rule.name(), matches = found, "needs apply");
    Ok(Classification::NeedsApply { matches: found })
}
