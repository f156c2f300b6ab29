use crate::engine::matcher::SearchError;
use crate::engine::rule::PatchRule;
use serde::Serialize;
use thiserror::Error;

/// One planned or performed replacement of a matched span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Substitution {
    /// Starting byte offset of the match (inclusive)
    pub start: usize,
    /// Ending byte offset of the match (exclusive)
    pub end: usize,
    pub before: String,
    pub after: String,
}

/// Result of a committed rule application.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Application carries the patched text"]
pub struct Application {
    pub text: String,
    pub substitutions: Vec<Substitution>,
}

impl Application {
    pub fn replaced(&self) -> usize {
        self.substitutions.len()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("{rule}: expected {expected} replacement(s), got {found}")]
    MatchCount {
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

/// Compute the substitutions `rule` would make in `text`, without touching it.
///
/// The replacement is invoked once per match, so captured identifiers are
/// echoed back per occurrence.
pub fn preview(text: &str, rule: &PatchRule) -> Result<Vec<Substitution>, ApplicationError> {
    rule.unpatched()
        .find_iter(text)
        .map(|m| {
            let m = m.map_err(|source| ApplicationError::Search {
                rule: rule.name().to_string(),
                source,
            })?;
            Ok(Substitution {
                start: m.start(),
                end: m.end(),
                before: m.as_str().to_string(),
                after: rule.replacement().expand(&m),
            })
        })
        .collect()
}

/// Apply `rule` to `text`, returning the new text.
///
/// Fails without producing any text unless exactly `expected_count`
/// replacements were realized.
pub fn apply(text: String, rule: &PatchRule) -> Result<Application, ApplicationError> {
    let substitutions = preview(&text, rule)?;

    if substitutions.len() != rule.expected_count() {
        return Err(ApplicationError::MatchCount {
            rule: rule.name().to_string(),
            expected: rule.expected_count(),
            found: substitutions.len(),
        });
    }

    let grown: usize = substitutions.iter().map(|s| s.after.len()).sum();
    let mut patched = String::with_capacity(text.len() + grown);
    let mut cursor = 0;
    for substitution in &substitutions {
        patched.push_str(&text[cursor..substitution.start]);
        patched.push_str(&substitution.after);
        cursor = substitution.end;
    }
    patched.push_str(&text[cursor..]);

    tracing::debug!(
        rule = rule.name(),
        replaced = substitutions.len(),
        "rule applied"
    );

    Ok(Application {
        text: patched,
        substitutions,
    })
}
