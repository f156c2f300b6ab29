use crate::engine::matcher::{Matcher, MatcherError, RuleMatch, SearchError};
use std::fmt;
use thiserror::Error;

/// Render function producing the replacement for one match.
pub type RenderFn = fn(&RuleMatch<'_>) -> String;

/// How a matched region is rewritten.
#[derive(Clone)]
pub enum Replacement {
    /// `$name` / `${name}` template expanded against the match captures.
    Template(String),
    /// Function of the match; `captures` lists every group it reads.
    Render {
        captures: &'static [&'static str],
        render: RenderFn,
    },
}

impl Replacement {
    pub fn template(text: impl Into<String>) -> Self {
        Replacement::Template(text.into())
    }

    pub fn render(captures: &'static [&'static str], render: RenderFn) -> Self {
        Replacement::Render { captures, render }
    }

    /// Produce the replacement text for one match.
    pub fn expand(&self, m: &RuleMatch<'_>) -> String {
        match self {
            Replacement::Template(template) => m.expand(template),
            Replacement::Render { render, .. } => render(m),
        }
    }

    /// Capture names the replacement reads.
    pub fn captures(&self) -> Vec<String> {
        match self {
            Replacement::Template(template) => template_refs(template),
            Replacement::Render { captures, .. } => {
                captures.iter().map(|c| c.to_string()).collect()
            }
        }
    }

    /// The replacement text when it does not depend on the match at all,
    /// with `$$` escapes resolved.
    pub fn literal(&self) -> Option<String> {
        match self {
            Replacement::Template(template) if template_refs(template).is_empty() => {
                Some(template.replace("$$", "$"))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for Replacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Replacement::Template(template) => f.debug_tuple("Template").field(template).finish(),
            Replacement::Render { captures, .. } => f
                .debug_struct("Render")
                .field("captures", captures)
                .finish_non_exhaustive(),
        }
    }
}

/// Capture names referenced by a template (`$$` is an escaped dollar).
fn template_refs(template: &str) -> Vec<String> {
    let mut refs = Vec::new();
    let mut rest = template;
    while let Some(at) = rest.find('$') {
        rest = &rest[at + 1..];
        if let Some(after) = rest.strip_prefix('$') {
            rest = after;
            continue;
        }
        let name = if let Some(braced) = rest.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => {
                    rest = &braced[end + 1..];
                    &braced[..end]
                }
                None => break,
            }
        } else {
            let end = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            let name = &rest[..end];
            rest = &rest[end..];
            name
        };
        if !name.is_empty() && !refs.iter().any(|r| r == name) {
            refs.push(name.to_string());
        }
    }
    refs
}

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("rule name must not be empty")]
    EmptyName,

    #[error("rule '{rule}': expected count must be at least 1")]
    ZeroCount { rule: String },

    #[error("rule '{rule}': {source}")]
    Pattern {
        rule: String,
        #[source]
        source: MatcherError,
    },

    #[error("rule '{rule}': replacement reads capture '{capture}' which the unpatched pattern does not define")]
    UnknownCapture { rule: String, capture: String },
}

/// One declarative text transformation with a recognizable before-state and
/// after-state. Immutable once built.
#[derive(Debug, Clone)]
pub struct PatchRule {
    name: String,
    unpatched: Matcher,
    patched: Option<Matcher>,
    replacement: Replacement,
    expected_count: usize,
}

impl PatchRule {
    /// Build a rule expecting exactly one occurrence of `unpatched`.
    pub fn new(
        name: impl Into<String>,
        unpatched: &str,
        replacement: Replacement,
    ) -> Result<Self, RuleError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RuleError::EmptyName);
        }
        let unpatched = compile(&name, unpatched)?;

        for capture in replacement.captures() {
            let numbered = capture.chars().all(|c| c.is_ascii_digit());
            if !numbered && !unpatched.has_group(&capture) {
                return Err(RuleError::UnknownCapture {
                    rule: name,
                    capture,
                });
            }
        }

        Ok(Self {
            name,
            unpatched,
            patched: None,
            replacement,
            expected_count: 1,
        })
    }

    /// Attach the pattern recognizing the already-patched form.
    pub fn with_patched(mut self, pattern: &str) -> Result<Self, RuleError> {
        self.patched = Some(compile(&self.name, pattern)?);
        Ok(self)
    }

    pub fn with_expected_count(mut self, count: usize) -> Result<Self, RuleError> {
        if count == 0 {
            return Err(RuleError::ZeroCount { rule: self.name });
        }
        self.expected_count = count;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unpatched(&self) -> &Matcher {
        &self.unpatched
    }

    pub fn patched(&self) -> Option<&Matcher> {
        self.patched.as_ref()
    }

    pub fn replacement(&self) -> &Replacement {
        &self.replacement
    }

    pub fn expected_count(&self) -> usize {
        self.expected_count
    }

    /// Whether the rule can recognize its own output.
    pub fn has_evidence(&self) -> bool {
        self.patched.is_some() || self.replacement.literal().is_some()
    }

    /// Already-patched evidence: the patched matcher, or the constant
    /// replacement text for rules without one.
    pub fn evidence_in(&self, text: &str) -> Result<bool, SearchError> {
        match (&self.patched, self.replacement.literal()) {
            (Some(patched), _) => patched.is_match(text),
            (None, Some(literal)) => Ok(text.contains(&literal)),
            (None, None) => Ok(false),
        }
    }

    /// Whether a constant replacement matches the rule's own unpatched
    /// pattern, so the output would be patched again on the next run.
    pub fn rewrites_into_itself(&self) -> Result<bool, SearchError> {
        match self.replacement.literal() {
            Some(literal) => self.unpatched.is_match(&literal),
            None => Ok(false),
        }
    }
}

fn compile(rule: &str, pattern: &str) -> Result<Matcher, RuleError> {
    Matcher::new(pattern).map_err(|source| RuleError::Pattern {
        rule: rule.to_string(),
        source,
    })
}
