//! Rule types — forwarding rules and text-replacement rules.
//!
//! The original rule records arrive as loosely shaped `(original, replacement)`
//! string pairs; [`ReplacementRule::parse`] turns them into tagged variants so
//! the pipeline can match exhaustively instead of re-inspecting strings.

use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::RuleError;
use crate::transport::ChatId;

/// Edit-propagation window applied when a rule doesn't set one.
pub const DEFAULT_MAX_EDIT_TIME: Duration = Duration::from_secs(300);

/// Sentinel marking a full-text replacement rule.
const FULL_TEXT_SENTINEL: &str = "[[FULL_TEXT]]";

/// Sentinel marking a composite (multi-step) replacement rule.
const COMPOSITE_SENTINEL: &str = "[[ALL_IN_ONE]]";

/// Label suffix selecting regex replacement.
const REGEX_LABEL_SUFFIX: &str = "_regex";

// ── Forwarding rules ────────────────────────────────────────────────

/// Declarative mapping from source channels to destination channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardingRule {
    /// Unique key.
    pub label: String,
    /// Channels whose messages this rule picks up.
    pub sources: Vec<ChatId>,
    /// Channels copies are delivered to, in order.
    pub destinations: Vec<ChatId>,
    /// Inactive rules are skipped by route resolution.
    pub active: bool,
    /// Pause before sending each matched message.
    pub delay: Duration,
    /// Window during which edits to the original propagate to copies.
    pub max_edit_time: Duration,
    pub created_at: DateTime<Utc>,
}

impl ForwardingRule {
    /// Create an active rule with default delay and edit window.
    pub fn new(label: impl Into<String>, sources: Vec<ChatId>, destinations: Vec<ChatId>) -> Self {
        Self {
            label: label.into(),
            sources,
            destinations,
            active: true,
            delay: Duration::ZERO,
            max_edit_time: DEFAULT_MAX_EDIT_TIME,
            created_at: Utc::now(),
        }
    }
}

// ── Replacement rules ───────────────────────────────────────────────

/// A named text transformation. The variant is fixed at creation.
#[derive(Debug, Clone)]
pub struct ReplacementRule {
    /// Unique key. A `_regex` suffix selected the regex variant at parse time.
    pub label: String,
    pub active: bool,
    /// Raw left-hand side as the user supplied it (kept for persistence).
    pub original: String,
    /// Raw right-hand side as the user supplied it.
    pub replacement: String,
    pub kind: ReplacementKind,
}

/// The four replacement variants.
#[derive(Debug, Clone)]
pub enum ReplacementKind {
    /// Literal substring substitution.
    Simple { original: String, replacement: String },
    /// Case-insensitive regex substitution across the whole string.
    Regex {
        pattern: String,
        replacement: String,
        regex: Regex,
    },
    /// Replaces the entire input unconditionally.
    FullText { replacement: String },
    /// Ordered sub-replacements, applied in declaration order.
    Composite { steps: Vec<CompositeStep> },
}

/// A single step inside a composite rule. One level deep only — a step is
/// never itself composite.
#[derive(Debug, Clone)]
pub enum CompositeStep {
    Simple { original: String, replacement: String },
    Regex {
        pattern: String,
        replacement: String,
        regex: Regex,
    },
    /// Restricted literal form reserved for link substitution.
    UrlTag { tag: String, replacement: String },
}

impl ReplacementRule {
    /// Parse a raw `(original, replacement)` pair into a typed rule.
    ///
    /// Detection, matching the command surface:
    /// - label ending in `_regex` → [`ReplacementKind::Regex`], with one pair
    ///   of surrounding parentheses stripped from the pattern;
    /// - `original` containing `[[FULL_TEXT]]` → [`ReplacementKind::FullText`];
    /// - `original` containing `[[ALL_IN_ONE]]` → [`ReplacementKind::Composite`],
    ///   steps parsed from `replacement`;
    /// - anything else → [`ReplacementKind::Simple`].
    ///
    /// Fails with [`RuleError::InvalidPattern`] if any regex doesn't compile.
    pub fn parse(
        label: impl Into<String>,
        original: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Result<Self, RuleError> {
        let label = label.into();
        let original = original.into();
        let replacement = replacement.into();

        let kind = if label.ends_with(REGEX_LABEL_SUFFIX) {
            let pattern = strip_parens(&original);
            let regex = compile_pattern(&label, pattern)?;
            ReplacementKind::Regex {
                pattern: pattern.to_string(),
                replacement: replacement.clone(),
                regex,
            }
        } else if original.contains(FULL_TEXT_SENTINEL) {
            ReplacementKind::FullText {
                replacement: replacement.clone(),
            }
        } else if original.contains(COMPOSITE_SENTINEL) {
            ReplacementKind::Composite {
                steps: parse_composite_steps(&label, &replacement)?,
            }
        } else {
            ReplacementKind::Simple {
                original: original.clone(),
                replacement: replacement.clone(),
            }
        };

        Ok(Self {
            label,
            active: true,
            original,
            replacement,
            kind,
        })
    }

    /// Rebuild a rule from its persisted form, recompiling any regexes.
    pub fn from_spec(spec: &ReplacementSpec) -> Result<Self, RuleError> {
        let mut rule = Self::parse(&spec.label, &spec.original, &spec.replacement)?;
        rule.active = spec.active;
        Ok(rule)
    }

    /// Persisted form of this rule. Compiled regexes are dropped; loading
    /// recompiles them from the raw pattern.
    pub fn to_spec(&self) -> ReplacementSpec {
        ReplacementSpec {
            label: self.label.clone(),
            original: self.original.clone(),
            replacement: self.replacement.clone(),
            active: self.active,
        }
    }

    /// Short variant name for logging and listings.
    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            ReplacementKind::Simple { .. } => "simple",
            ReplacementKind::Regex { .. } => "regex",
            ReplacementKind::FullText { .. } => "full_text",
            ReplacementKind::Composite { .. } => "composite",
        }
    }
}

/// Serializable form of a replacement rule. The snapshot store round-trips
/// this instead of the compiled rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplacementSpec {
    pub label: String,
    pub original: String,
    pub replacement: String,
    pub active: bool,
}

// ── Parsing helpers ─────────────────────────────────────────────────

/// Strip one pair of surrounding parentheses, if present.
fn strip_parens(pattern: &str) -> &str {
    pattern
        .strip_prefix('(')
        .and_then(|p| p.strip_suffix(')'))
        .unwrap_or(pattern)
}

fn compile_pattern(label: &str, pattern: &str) -> Result<Regex, RuleError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| RuleError::InvalidPattern {
            label: label.to_string(),
            message: e.to_string(),
        })
}

/// Parse the composite step list: comma-separated `lhs -> rhs` pairs, with
/// `regex:` and `url:` prefixes on the left selecting the step kind.
/// Fragments without an arrow are skipped.
fn parse_composite_steps(label: &str, text: &str) -> Result<Vec<CompositeStep>, RuleError> {
    let mut steps = Vec::new();

    for part in text.split(',') {
        let part = part.trim();
        let Some((lhs, rhs)) = part.split_once("->") else {
            continue;
        };
        let lhs = trim_quoted(lhs);
        let rhs = trim_quoted(rhs);

        if let Some(pattern) = lhs.strip_prefix("regex:") {
            let regex = compile_pattern(label, pattern)?;
            steps.push(CompositeStep::Regex {
                pattern: pattern.to_string(),
                replacement: rhs.to_string(),
                regex,
            });
        } else if let Some(tag) = lhs.strip_prefix("url:") {
            steps.push(CompositeStep::UrlTag {
                tag: tag.to_string(),
                replacement: rhs.to_string(),
            });
        } else {
            steps.push(CompositeStep::Simple {
                original: lhs.to_string(),
                replacement: rhs.to_string(),
            });
        }
    }

    Ok(steps)
}

/// Trim surrounding whitespace and double quotes.
fn trim_quoted(s: &str) -> &str {
    s.trim_matches(|c: char| c == ' ' || c == '"')
}
