//! Regex matcher with named back-reference support.
//!
//! Bundle rules need back-references to say "the same minified identifier
//! appears here again", so patterns compile with `fancy-regex`. A
//! `(?P=name)` reference is checked against the groups the pattern declares
//! and handed to the engine as `\k<name>`.

use fancy_regex::{Captures, Expander, Regex, RegexBuilder};
use thiserror::Error;

/// Backtracking budget per search; bundles are large single-line files.
const BACKTRACK_LIMIT: usize = 10_000_000;

#[derive(Error, Debug)]
pub enum MatcherError {
    #[error("invalid pattern `{pattern}`: {source}")]
    Syntax {
        pattern: String,
        #[source]
        source: Box<fancy_regex::Error>,
    },

    #[error("back-reference to unknown group '{name}' in `{pattern}`")]
    UnknownGroup { pattern: String, name: String },

    #[error("unterminated back-reference in `{pattern}`")]
    UnterminatedReference { pattern: String },
}

/// A search that the engine gave up on, e.g. the backtrack limit was hit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("search for `{pattern}` failed: {message}")]
pub struct SearchError {
    pub pattern: String,
    pub message: String,
}

/// A compiled pattern locating zero or more non-overlapping occurrences of a
/// code shape.
#[derive(Debug, Clone)]
pub struct Matcher {
    source: String,
    regex: Regex,
}

impl Matcher {
    pub fn new(pattern: &str) -> Result<Self, MatcherError> {
        let translated = translate_backrefs(pattern)?;
        let regex = RegexBuilder::new(&translated)
            .backtrack_limit(BACKTRACK_LIMIT)
            .build()
            .map_err(|source| MatcherError::Syntax {
                pattern: pattern.to_string(),
                source: Box::new(source),
            })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, text: &str) -> Result<bool, SearchError> {
        self.regex
            .is_match(text)
            .map_err(|err| self.search_error(err))
    }

    pub fn count(&self, text: &str) -> Result<usize, SearchError> {
        self.find_iter(text)
            .try_fold(0, |n, m| m.map(|_| n + 1))
    }

    pub fn find_iter<'m, 't>(&'m self, text: &'t str) -> Matches<'m, 't> {
        Matches {
            matcher: self,
            inner: self.regex.captures_iter(text),
        }
    }

    /// Names of the groups declared in the pattern.
    pub fn group_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.regex.capture_names().flatten()
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.group_names().any(|group| group == name)
    }

    fn search_error(&self, err: fancy_regex::Error) -> SearchError {
        SearchError {
            pattern: self.source.clone(),
            message: err.to_string(),
        }
    }
}

/// One occurrence of a matcher in a text, with its captures.
#[derive(Debug)]
pub struct RuleMatch<'t> {
    caps: Captures<'t>,
    whole: fancy_regex::Match<'t>,
}

impl<'t> RuleMatch<'t> {
    /// Text of a named capture, or `""` when the group did not participate.
    pub fn get(&self, name: &str) -> &'t str {
        self.caps.name(name).map_or("", |m| m.as_str())
    }

    pub fn as_str(&self) -> &'t str {
        self.whole.as_str()
    }

    pub fn start(&self) -> usize {
        self.whole.start()
    }

    pub fn end(&self) -> usize {
        self.whole.end()
    }

    /// Expand a `$name` / `${name}` template against this match.
    pub fn expand(&self, template: &str) -> String {
        Expander::default().expansion(template, &self.caps)
    }
}

/// Iterator over matches, see [`Matcher::find_iter`].
pub struct Matches<'m, 't> {
    matcher: &'m Matcher,
    inner: fancy_regex::CaptureMatches<'m, 't>,
}

impl<'m, 't> Iterator for Matches<'m, 't> {
    type Item = Result<RuleMatch<'t>, SearchError>;

    fn next(&mut self) -> Option<Self::Item> {
        let caps = match self.inner.next()? {
            Ok(caps) => caps,
            Err(err) => return Some(Err(self.matcher.search_error(err))),
        };
        let whole = caps.get(0)?;
        Some(Ok(RuleMatch { caps, whole }))
    }
}

/// Rewrite every `(?P=name)` into `\k<name>`, rejecting references to groups
/// the pattern never declares.
fn translate_backrefs(pattern: &str) -> Result<String, MatcherError> {
    const REFERENCE: &str = "(?P=";

    let mut out = String::with_capacity(pattern.len());
    let mut in_class = false;
    let mut chars = pattern.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        match c {
            '\\' => {
                out.push(c);
                if let Some((_, escaped)) = chars.next() {
                    out.push(escaped);
                }
            }
            '[' if !in_class => {
                in_class = true;
                out.push(c);
            }
            ']' if in_class => {
                in_class = false;
                out.push(c);
            }
            '(' if !in_class && pattern[idx..].starts_with(REFERENCE) => {
                let name_start = idx + REFERENCE.len();
                let name_len = pattern[name_start..].find(')').ok_or_else(|| {
                    MatcherError::UnterminatedReference {
                        pattern: pattern.to_string(),
                    }
                })?;
                let name = &pattern[name_start..name_start + name_len];
                if !declares_group(pattern, name) {
                    return Err(MatcherError::UnknownGroup {
                        pattern: pattern.to_string(),
                        name: name.to_string(),
                    });
                }
                out.push_str(&format!(r"\k<{name}>"));

                // Skip past "?P=name)".
                let resume = name_start + name_len + 1;
                while chars.peek().is_some_and(|(i, _)| *i < resume) {
                    chars.next();
                }
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

fn declares_group(pattern: &str, name: &str) -> bool {
    !name.is_empty()
        && (pattern.contains(&format!("(?P<{name}>")) || pattern.contains(&format!("(?<{name}>")))
}
