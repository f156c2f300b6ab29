use crate::engine::{PatchRule, Replacement, RuleError};
use crate::rules::RuleSet;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct RuleSetConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RuleDefinition {
    pub name: String,
    /// Pattern recognizing the pre-patch form
    pub unpatched: String,
    /// Pattern recognizing the post-patch form
    #[serde(default)]
    pub patched: Option<String>,
    /// `$name` / `${name}` template
    pub replacement: String,
    #[serde(default)]
    pub expected_count: Option<usize>,
}

impl RuleSetConfig {
    /// Check the whole file and report every issue at once.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.rules.is_empty() {
            issues.push(ValidationIssue::EmptyRuleList);
        }

        let mut seen = HashSet::new();
        for rule in &self.rules {
            if rule.name.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    rule: None,
                    field: "name",
                });
            } else if !seen.insert(rule.name.as_str()) {
                issues.push(ValidationIssue::DuplicateName {
                    rule: rule.name.clone(),
                });
            }
            if rule.unpatched.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    rule: Some(rule.name.clone()),
                    field: "unpatched",
                });
            }
            if rule.patched.as_deref().is_some_and(|p| p.trim().is_empty()) {
                issues.push(ValidationIssue::MissingField {
                    rule: Some(rule.name.clone()),
                    field: "patched",
                });
            }
            if rule.expected_count == Some(0) {
                issues.push(ValidationIssue::InvalidCombo {
                    rule: Some(rule.name.clone()),
                    message: "expected_count must be at least 1".to_string(),
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Compile every definition into a [`PatchRule`].
    pub fn compile(&self) -> Result<RuleSet, ValidationError> {
        let mut issues = Vec::new();
        let mut rules = Vec::with_capacity(self.rules.len());

        for definition in &self.rules {
            let rule = match definition.compile() {
                Ok(rule) => rule,
                Err(source) => {
                    issues.push(ValidationIssue::Rule(source.to_string()));
                    continue;
                }
            };
            if !rule.has_evidence() {
                issues.push(ValidationIssue::NoEvidence {
                    rule: definition.name.clone(),
                });
                continue;
            }
            match rule.rewrites_into_itself() {
                Ok(false) => rules.push(rule),
                Ok(true) => issues.push(ValidationIssue::SelfMatching {
                    rule: definition.name.clone(),
                }),
                Err(source) => issues.push(ValidationIssue::Rule(source.to_string())),
            }
        }

        if !issues.is_empty() {
            return Err(ValidationError { issues });
        }

        Ok(RuleSet {
            name: self.meta.name.clone(),
            description: self.meta.description.clone(),
            rules,
        })
    }
}

impl RuleDefinition {
    fn compile(&self) -> Result<PatchRule, RuleError> {
        let mut rule = PatchRule::new(
            self.name.as_str(),
            &self.unpatched,
            Replacement::template(self.replacement.as_str()),
        )?;
        if let Some(patched) = &self.patched {
            rule = rule.with_patched(patched)?;
        }
        if let Some(count) = self.expected_count {
            rule = rule.with_expected_count(count)?;
        }
        Ok(rule)
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyRuleList,
    MissingField {
        rule: Option<String>,
        field: &'static str,
    },
    DuplicateName {
        rule: String,
    },
    InvalidCombo {
        rule: Option<String>,
        message: String,
    },
    /// Neither a patched pattern nor a constant replacement; re-runs could
    /// not recognize the rule's own output.
    NoEvidence {
        rule: String,
    },
    /// The constant replacement matches the rule's own unpatched pattern.
    SelfMatching {
        rule: String,
    },
    Rule(String),
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyRuleList => write!(f, "rule set contains no rules"),
            ValidationIssue::MissingField { rule, field } => match rule {
                Some(name) => write!(f, "rule '{name}' missing required field '{field}'"),
                None => write!(f, "rule missing required field '{field}'"),
            },
            ValidationIssue::DuplicateName { rule } => {
                write!(f, "rule name '{rule}' is used more than once")
            }
            ValidationIssue::InvalidCombo { rule, message } => match rule {
                Some(name) => write!(f, "rule '{name}' has invalid configuration: {message}"),
                None => write!(f, "invalid rule configuration: {message}"),
            },
            ValidationIssue::NoEvidence { rule } => write!(
                f,
                "rule '{rule}' needs a 'patched' pattern (its replacement depends on captures)"
            ),
            ValidationIssue::SelfMatching { rule } => write!(
                f,
                "rule '{rule}' replacement matches its own unpatched pattern"
            ),
            ValidationIssue::Rule(message) => write!(f, "{message}"),
        }
    }
}
