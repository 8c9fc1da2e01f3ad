//! Route resolution — which forwarding rules apply to an inbound message.
//!
//! The platform reports broadcast/group channels in two interchangeable
//! numeric forms: a short id and a long form carrying a `-100` decimal
//! prefix (`123456` ↔ `-100123456`). Rules and events may each use either
//! form, so matching normalizes both sides.

use std::sync::Arc;

use tracing::debug;

use crate::rules::model::ForwardingRule;
use crate::rules::store::RuleStore;
use crate::transport::ChatId;

/// Decimal prefix of the long channel-id form.
const MARKED_PREFIX: &str = "-100";

/// Resolves inbound origins to the forwarding rules that pick them up.
pub struct RouteResolver {
    rules: Arc<RuleStore>,
}

impl RouteResolver {
    pub fn new(rules: Arc<RuleStore>) -> Self {
        Self { rules }
    }

    /// All active rules with a source matching `origin`, in store order.
    ///
    /// An empty result is the normal no-route outcome, not an error.
    pub async fn resolve(&self, origin: ChatId) -> Vec<ForwardingRule> {
        let matched: Vec<ForwardingRule> = self
            .rules
            .forwarding_rules()
            .await
            .into_iter()
            .filter(|rule| rule.active && rule.sources.iter().any(|&s| ids_match(s, origin)))
            .collect();

        debug!(
            origin,
            matched = matched.len(),
            "Resolved forwarding routes"
        );
        matched
    }
}

// ── Identifier normalization ────────────────────────────────────────

/// Whether `id` is already in the long (`-100`-prefixed) form.
pub fn is_marked(id: ChatId) -> bool {
    id.to_string().starts_with(MARKED_PREFIX)
}

/// The long form of `id`: `-100` prepended to its absolute decimal digits.
/// `None` when the result does not fit an i64.
pub fn marked_form(id: ChatId) -> Option<ChatId> {
    format!("{MARKED_PREFIX}{}", id.unsigned_abs()).parse().ok()
}

/// Two channel ids refer to the same channel if they are equal, or one is
/// the long form of the other. Applied symmetrically so neither the rule
/// side nor the message side needs a canonical form.
pub fn ids_match(a: ChatId, b: ChatId) -> bool {
    if a == b {
        return true;
    }
    if is_marked(a) && marked_form(b) == Some(a) {
        return true;
    }
    if is_marked(b) && marked_form(a) == Some(b) {
        return true;
    }
    false
}

/// The form a destination id is actually sent to: negative short-form ids
/// are promoted to the long form, everything else passes through.
pub fn send_form(id: ChatId) -> ChatId {
    if id < 0 && !is_marked(id) {
        marked_form(id).unwrap_or(id)
    } else {
        id
    }
}
