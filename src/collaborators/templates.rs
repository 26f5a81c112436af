//! `MessageProvider`: key → string template resolver with `{placeholder}`
//! substitution (spec.md §6). Keeps user-facing copy out of the dispatch
//! logic, the same separation meshbbs draws between `commands.rs` control
//! flow and its `ui` formatting helpers.

use std::collections::HashMap;

pub trait MessageProvider: Send + Sync {
    fn get(&self, key: &str, params: &HashMap<&str, String>) -> String;
}

/// Minimal built-in provider: a fixed table of English defaults, used by
/// the `serve` demo and tests when no richer template store is wired in.
pub struct DefaultMessageProvider;

impl MessageProvider for DefaultMessageProvider {
    fn get(&self, key: &str, params: &HashMap<&str, String>) -> String {
        let template = match key {
            "waiting.start" => "Starting a new game...",
            "waiting.hints" => "Thinking of a hint...",
            "waiting.ask" => "Thinking...",
            "help" => "Send a yes/no question, or /20q start to begin.",
            "model_info" => "This bot answers questions using the configured AI model.",
            "unknown_command" => "Sorry, I didn't understand that command. Send /20q for help.",
            "session_not_found" => "There is no active game in this chat yet.",
            "access_denied_blocked" => "Sorry {nickname}, you are not allowed to use this bot.",
            "lock_contention" => "Another command is in progress, please try again shortly.",
            "ai_timeout" => "The AI took too long to respond.",
            "ai_unavailable" => "The AI service is unavailable right now.",
            _ => key,
        };
        substitute(template, params)
    }
}

fn substitute(template: &str, params: &HashMap<&str, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in params {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_placeholders() {
        let provider = DefaultMessageProvider;
        let mut params = HashMap::new();
        params.insert("nickname", "alice".to_string());
        let text = provider.get("access_denied_blocked", &params);
        assert_eq!(text, "Sorry alice, you are not allowed to use this bot.");
    }

    #[test]
    fn unknown_key_falls_back_to_key_itself() {
        let provider = DefaultMessageProvider;
        let params = HashMap::new();
        assert_eq!(provider.get("nonexistent.key", &params), "nonexistent.key");
    }
}
