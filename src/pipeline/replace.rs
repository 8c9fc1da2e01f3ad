//! Replacement pipeline — ordered, best-effort text transformation.
//!
//! Applies every active replacement rule in stored (label) order; each rule
//! sees the previous rule's output. A rule that fails is logged and skipped,
//! the rest of the chain still runs.

use std::sync::Arc;

use tracing::warn;

use crate::error::TransformError;
use crate::rules::model::{CompositeStep, ReplacementKind, ReplacementRule};
use crate::rules::store::RuleStore;

/// Upper bound on a single rule's output. A rule expanding past this is
/// treated as failed and skipped, leaving its input intact.
const MAX_RULE_OUTPUT: usize = 64 * 1024;

/// Platform message length limit; the final output is capped here.
const MAX_MESSAGE_LEN: usize = 4096;

/// Applies the store's active replacement chain to message text.
pub struct ReplacementPipeline {
    rules: Arc<RuleStore>,
}

impl ReplacementPipeline {
    pub fn new(rules: Arc<RuleStore>) -> Self {
        Self { rules }
    }

    /// Run `text` through all active replacement rules in stored order.
    ///
    /// Empty input short-circuits without consulting any rule.
    pub async fn apply(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let rules = self.rules.active_replacements().await;
        apply_chain(&rules, text)
    }
}

/// Apply an explicit rule chain. Later rules see earlier rules' output.
pub fn apply_chain(rules: &[ReplacementRule], text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut out = text.to_string();
    for rule in rules {
        match apply_rule(rule, &out) {
            Ok(next) => out = next,
            Err(e) => {
                warn!(label = %rule.label, error = %e, "Replacement rule failed, skipping");
            }
        }
    }
    sanitize(out)
}

/// Apply one rule to `text`.
fn apply_rule(rule: &ReplacementRule, text: &str) -> Result<String, TransformError> {
    let out = match &rule.kind {
        ReplacementKind::Simple {
            original,
            replacement,
        } => text.replace(original.as_str(), replacement),
        ReplacementKind::Regex {
            regex, replacement, ..
        } => regex.replace_all(text, replacement.as_str()).into_owned(),
        ReplacementKind::FullText { replacement } => replacement.clone(),
        ReplacementKind::Composite { steps } => {
            let mut out = text.to_string();
            for step in steps {
                out = apply_step(step, &out);
            }
            out
        }
    };

    if out.len() > MAX_RULE_OUTPUT {
        return Err(TransformError::OutputTooLarge {
            label: rule.label.clone(),
            limit: MAX_RULE_OUTPUT,
        });
    }
    Ok(out)
}

/// Apply one composite sub-step.
fn apply_step(step: &CompositeStep, text: &str) -> String {
    match step {
        CompositeStep::Simple {
            original,
            replacement,
        } => text.replace(original.as_str(), replacement),
        CompositeStep::Regex {
            regex, replacement, ..
        } => regex.replace_all(text, replacement.as_str()).into_owned(),
        CompositeStep::UrlTag { tag, replacement } => text.replace(tag.as_str(), replacement),
    }
}

/// Strip NUL bytes and cap at the platform message limit (on a char
/// boundary).
fn sanitize(mut text: String) -> String {
    if text.contains('\0') {
        text.retain(|c| c != '\0');
    }
    if text.len() > MAX_MESSAGE_LEN {
        let mut cut = MAX_MESSAGE_LEN;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}
