//! Run orchestrator - sequences all rules over one document
//!
//! This module:
//! - Classifies each rule against the text produced by the rules before it
//! - Applies rules that need it (real run) or records them (dry run)
//! - Aborts on the first rule it cannot classify or apply, keeping the
//!   statuses gathered so far
//! - Reports whether the document changed at all

use crate::engine::applicator::{self, ApplicationError, Substitution};
use crate::engine::classifier::{classify, Classification, ClassificationError};
use crate::engine::rule::PatchRule;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Classify only; never mutate text or persisted state.
    DryRun,
    /// Classify and apply.
    Apply,
}

/// Final status of one rule in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Already,
    WouldApply,
    Applied,
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RuleStatus::Already => "already",
            RuleStatus::WouldApply => "would_apply",
            RuleStatus::Applied => "applied",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleOutcome {
    pub rule: String,
    pub status: RuleStatus,
    /// Spans rewritten by the rule (filled for applied rules, and for dry
    /// runs when a preview was requested).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub substitutions: Vec<Substitution>,
}

/// Overall outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    NoChanges,
    WouldApply,
    Applied,
    Failed { rule: String, reason: String },
}

/// Why a rule stopped the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleFailure {
    #[error(transparent)]
    Classification(#[from] ClassificationError),
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

/// A run aborted at `rule`; `completed` holds the statuses before it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("rule '{rule}' failed: {source}")]
pub struct RunFailure {
    pub completed: Vec<RuleOutcome>,
    pub rule: String,
    #[source]
    pub source: RuleFailure,
}

impl RunFailure {
    pub fn outcome(&self) -> Outcome {
        Outcome::Failed {
            rule: self.rule.clone(),
            reason: self.source.to_string(),
        }
    }
}

/// A completed pass over all rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleRun {
    pub mode: RunMode,
    pub outcomes: Vec<RuleOutcome>,
    /// Document after the pass; identical to the input for dry runs.
    pub text: String,
    pub changed: bool,
}

impl RuleRun {
    pub fn outcome(&self) -> Outcome {
        match self.mode {
            RunMode::DryRun
                if self
                    .outcomes
                    .iter()
                    .any(|o| o.status == RuleStatus::WouldApply) =>
            {
                Outcome::WouldApply
            }
            RunMode::Apply if self.changed => Outcome::Applied,
            _ => Outcome::NoChanges,
        }
    }

    pub fn statuses(&self) -> impl Iterator<Item = (&str, RuleStatus)> + '_ {
        self.outcomes.iter().map(|o| (o.rule.as_str(), o.status))
    }
}

/// Run every rule, in order, over `original`.
pub fn run_rules(
    original: &str,
    rules: &[PatchRule],
    mode: RunMode,
) -> Result<RuleRun, RunFailure> {
    let mut text = original.to_string();
    let mut outcomes = Vec::with_capacity(rules.len());

    for rule in rules {
        let step = step_rule(text, rule, mode);
        let (next, outcome) = match step {
            Ok(step) => step,
            Err(source) => {
                tracing::warn!(rule = rule.name(), error = %source, "rule failed, aborting run");
                return Err(RunFailure {
                    completed: outcomes,
                    rule: rule.name().to_string(),
                    source,
                });
            }
        };
        text = next;
        outcomes.push(outcome);
    }

    let changed = text != original;
    tracing::info!(?mode, rules = rules.len(), changed, "rule pass complete");

    Ok(RuleRun {
        mode,
        outcomes,
        text,
        changed,
    })
}

/// Classify-then-apply over the whole rule set.
pub fn apply_rules(original: &str, rules: &[PatchRule]) -> Result<RuleRun, RunFailure> {
    run_rules(original, rules, RunMode::Apply)
}

/// Read-only status evaluation; mirrors `apply_rules` classifications.
pub fn check_rules(original: &str, rules: &[PatchRule]) -> Result<RuleRun, RunFailure> {
    run_rules(original, rules, RunMode::DryRun)
}

fn step_rule(
    text: String,
    rule: &PatchRule,
    mode: RunMode,
) -> Result<(String, RuleOutcome), RuleFailure> {
    let outcome = |status, substitutions| RuleOutcome {
        rule: rule.name().to_string(),
        status,
        substitutions,
    };

    match (classify(&text, rule)?, mode) {
        (Classification::Already, _) => Ok((text, outcome(RuleStatus::Already, Vec::new()))),
        (Classification::NeedsApply { .. }, RunMode::DryRun) => {
            Ok((text, outcome(RuleStatus::WouldApply, Vec::new())))
        }
        (Classification::NeedsApply { .. }, RunMode::Apply) => {
            let application = applicator::apply(text, rule)?;
            Ok((
                application.text,
                outcome(RuleStatus::Applied, application.substitutions),
            ))
        }
    }
}
