//! Text-command front end for rule management.
//!
//! Parses `/forward` and `/replace` commands and executes them against the
//! rule store, returning a human-readable reply string. No transport
//! coupling — the caller decides where replies go.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::RuleError;
use crate::rules::store::RuleStore;
use crate::transport::ChatId;

const FORWARD_USAGE: &str = "📋 Forward commands:\n\
    /forward add [LABEL] [SOURCE_IDS] -> [DESTINATION_IDS]\n\
    /forward remove [LABEL]\n\
    /forward start [LABEL]\n\
    /forward stop [LABEL]\n\
    /forward delay [LABEL] [SECONDS]\n\
    /forward max_time_edit [LABEL] [SECONDS]\n\
    /forward task";

const REPLACE_USAGE: &str = "📋 Replace commands:\n\
    /replace add [LABEL] [ORIGINAL] -> [REPLACEMENT]\n\
    /replace remove [LABEL]\n\
    /replace list\n\
    /replace clear";

/// Executes user commands against the rule store.
pub struct CommandHandler {
    rules: Arc<RuleStore>,
}

impl CommandHandler {
    pub fn new(rules: Arc<RuleStore>) -> Self {
        Self { rules }
    }

    /// Handle a message as a command.
    ///
    /// Returns `None` when the text is not a command at all; otherwise the
    /// reply to show the user (success or error).
    pub async fn handle(&self, text: &str) -> Option<String> {
        let text = text.trim();
        if !text.starts_with('/') {
            return None;
        }

        let mut parts = text.split_whitespace();
        let command = parts.next()?;
        let args: Vec<&str> = parts.collect();

        let reply = match command {
            "/forward" => self.forward_command(&args).await,
            "/replace" => self.replace_command(&args).await,
            _ => "❌ Unknown command. Use /forward or /replace".to_string(),
        };
        Some(reply)
    }

    // ── /forward ────────────────────────────────────────────────────

    async fn forward_command(&self, args: &[&str]) -> String {
        let Some((&sub, rest)) = args.split_first() else {
            return FORWARD_USAGE.to_string();
        };

        match sub {
            "add" => self.forward_add(rest).await,
            "remove" => match require_label(rest, "/forward remove [LABEL]") {
                Ok(label) => reply_on(
                    self.rules.remove_forwarding_rule(label).await,
                    format!("✅ Removed forwarding rule '{label}'"),
                ),
                Err(usage) => usage,
            },
            "start" => match require_label(rest, "/forward start [LABEL]") {
                Ok(label) => reply_on(
                    self.rules.set_active(label, true).await,
                    format!("▶️ Started forwarding rule '{label}'"),
                ),
                Err(usage) => usage,
            },
            "stop" => match require_label(rest, "/forward stop [LABEL]") {
                Ok(label) => reply_on(
                    self.rules.set_active(label, false).await,
                    format!("⏹️ Stopped forwarding rule '{label}'"),
                ),
                Err(usage) => usage,
            },
            "delay" => self.forward_delay(rest).await,
            "max_time_edit" => self.forward_max_edit(rest).await,
            "task" => self.forward_task().await,
            _ => "❌ Unknown forward subcommand".to_string(),
        }
    }

    async fn forward_add(&self, args: &[&str]) -> String {
        let joined = args.join(" ");
        let Some((left, right)) = joined.split_once("->") else {
            return "❌ Usage: /forward add [LABEL] [SOURCE_IDS] -> [DESTINATION_IDS]".to_string();
        };

        let mut left_parts = left.split_whitespace();
        let Some(label) = left_parts.next() else {
            return "❌ Usage: /forward add [LABEL] [SOURCE_IDS] -> [DESTINATION_IDS]".to_string();
        };
        let sources = parse_channel_ids(&left_parts.collect::<Vec<_>>().join(" "));
        let destinations = parse_channel_ids(right);

        match self
            .rules
            .add_forwarding_rule(label, sources, destinations)
            .await
        {
            Ok(rule) => format!(
                "✅ Added forwarding rule '{label}'\n📤 Sources: {}\n📥 Destinations: {}",
                format_ids(&rule.sources),
                format_ids(&rule.destinations),
            ),
            Err(e) => format!("❌ Error adding forwarding rule: {e}"),
        }
    }

    async fn forward_delay(&self, args: &[&str]) -> String {
        let [label, seconds] = args else {
            return "❌ Usage: /forward delay [LABEL] [SECONDS]".to_string();
        };
        match parse_seconds(label, seconds) {
            Ok(delay) => reply_on(
                self.rules.set_delay(label, delay).await,
                format!("⏱️ Set delay for '{label}' to {}", format_duration(delay)),
            ),
            Err(e) => format!("❌ {e}"),
        }
    }

    async fn forward_max_edit(&self, args: &[&str]) -> String {
        let [label, seconds] = args else {
            return "❌ Usage: /forward max_time_edit [LABEL] [SECONDS]".to_string();
        };
        match parse_seconds(label, seconds) {
            Ok(window) => reply_on(
                self.rules.set_max_edit_time(label, window).await,
                format!(
                    "⏰ Set max edit time for '{label}' to {}",
                    format_duration(window)
                ),
            ),
            Err(e) => format!("❌ {e}"),
        }
    }

    async fn forward_task(&self) -> String {
        let rules = self.rules.forwarding_rules().await;
        if rules.is_empty() {
            return "📋 No forwarding rules".to_string();
        }

        let mut out = String::from("📋 Forwarding rules:\n\n");
        for rule in rules {
            let status = if rule.active { "▶️" } else { "⏸️" };
            out.push_str(&format!(
                "{status} {}\n   📤 Sources: {}\n   📥 Destinations: {}\n   ⏱️ Delay: {}\n   ⏰ Max edit: {}\n\n",
                rule.label,
                format_ids(&rule.sources),
                format_ids(&rule.destinations),
                format_duration(rule.delay),
                format_duration(rule.max_edit_time),
            ));
        }
        out.trim_end().to_string()
    }

    // ── /replace ────────────────────────────────────────────────────

    async fn replace_command(&self, args: &[&str]) -> String {
        let Some((&sub, rest)) = args.split_first() else {
            return REPLACE_USAGE.to_string();
        };

        match sub {
            "add" => self.replace_add(rest).await,
            "remove" => match require_label(rest, "/replace remove [LABEL]") {
                Ok(label) => reply_on(
                    self.rules.remove_replacement_rule(label).await,
                    format!("✅ Removed replacement rule '{label}'"),
                ),
                Err(usage) => usage,
            },
            "list" => self.replace_list().await,
            "clear" => reply_on(
                self.rules.clear_replacement_rules().await,
                "✅ Cleared all replacement rules".to_string(),
            ),
            _ => "❌ Unknown replace subcommand".to_string(),
        }
    }

    async fn replace_add(&self, args: &[&str]) -> String {
        let joined = args.join(" ");
        let Some((left, right)) = joined.split_once("->") else {
            return "❌ Usage: /replace add [LABEL] [ORIGINAL] -> [REPLACEMENT]".to_string();
        };

        let mut left_parts = left.trim().splitn(2, ' ');
        let Some(label) = left_parts.next().filter(|l| !l.is_empty()) else {
            return "❌ Usage: /replace add [LABEL] [ORIGINAL] -> [REPLACEMENT]".to_string();
        };
        let original = left_parts.next().unwrap_or("").trim();
        let replacement = right.trim();

        match self
            .rules
            .add_replacement_rule(label, original, replacement)
            .await
        {
            Ok(rule) => format!(
                "✅ Added {} replacement rule '{label}'",
                rule.kind_label()
            ),
            Err(e) => format!("❌ Error adding replacement rule: {e}"),
        }
    }

    async fn replace_list(&self) -> String {
        let rules = self.rules.replacement_rules().await;
        if rules.is_empty() {
            return "📋 No replacement rules".to_string();
        }

        let mut out = String::from("📋 Replacement rules:\n\n");
        for rule in rules {
            let status = if rule.active { "▶️" } else { "⏸️" };
            out.push_str(&format!(
                "{status} {} [{}]: {} -> {}\n",
                rule.label,
                rule.kind_label(),
                rule.original,
                rule.replacement,
            ));
        }
        out.trim_end().to_string()
    }
}

// ── Parsing helpers ─────────────────────────────────────────────────

fn require_label<'a>(args: &[&'a str], usage: &str) -> Result<&'a str, String> {
    args.first().copied().ok_or_else(|| format!("❌ Usage: {usage}"))
}

fn reply_on(result: Result<(), RuleError>, success: String) -> String {
    match result {
        Ok(()) => success,
        Err(e) => format!("❌ {e}"),
    }
}

/// Parse a comma-separated channel-id list. Unparseable fragments are
/// skipped with a warning, matching the permissive original surface.
fn parse_channel_ids(text: &str) -> Vec<ChatId> {
    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| match part.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!(part, "Skipping invalid channel id");
                None
            }
        })
        .collect()
}

/// Parse a non-negative seconds argument into a duration.
fn parse_seconds(label: &str, text: &str) -> Result<Duration, RuleError> {
    let secs: i64 = text.parse().map_err(|_| RuleError::InvalidArgument {
        label: label.to_string(),
        message: format!("'{text}' is not a number of seconds"),
    })?;
    if secs < 0 {
        return Err(RuleError::InvalidArgument {
            label: label.to_string(),
            message: "seconds must be non-negative".to_string(),
        });
    }
    Ok(Duration::from_secs(secs as u64))
}

/// Human-readable duration: `45s`, `1m 30s`, `1h 1m`.
fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

fn format_ids(ids: &[ChatId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
