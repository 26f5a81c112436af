//! Command parser (component A).
//!
//! Structurally this is meshbbs's [`crate::command`] sibling of
//! `PublicCommandParser` (`examples/smartyhall-meshbbs/src/bbs/public.rs`):
//! a prefix check followed by a fixed, ordered list of pattern matches, each
//! returning a typed command value. The priority order is spec.md §4.A and
//! must not be reordered — it is what makes `/20q <q1>, <q2>` resolve as a
//! chained question rather than as two separate `Ask` attempts, and what
//! makes `/20q` alone resolve to `Help` rather than `Unknown`.

use log::trace;

use crate::logutil::escape_log;

use super::{ChainCondition, Command, ModelOverride, StatsPeriod};

#[derive(Clone)]
pub struct CommandParser {
    prefix: String,
}

impl CommandParser {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// `parse(text) -> Command | null`. `None` means "not addressed to this
    /// bot" (wrong or missing prefix). A recognized prefix with no matching
    /// sub-pattern returns `Some(Command::Unknown)`.
    pub fn parse(&self, text: &str) -> Option<Command> {
        let trimmed = text.trim();
        if !trimmed.starts_with(self.prefix.as_str()) {
            return None;
        }
        let body = trimmed[self.prefix.len()..].trim_start();

        // Priority 1: Help
        if body.is_empty() {
            trace!("parsed Help from '{}'", escape_log(text));
            return Some(Command::Help);
        }

        // Priority 2: Admin (Korean + English spellings, case-insensitive)
        if let Some(admin) = parse_admin(body) {
            trace!("parsed admin command from '{}'", escape_log(text));
            return Some(admin);
        }

        // Priority 3: the fixed-keyword commands
        if let Some(cmd) = parse_fixed_keyword(body) {
            trace!("parsed fixed-keyword command from '{}'", escape_log(text));
            return Some(cmd);
        }

        // Priority 4/5: chained questions (conditional, then regular) —
        // require at least two comma-separated parts; a single part falls
        // through to the Ask patterns below.
        if let Some(rest) = strip_ci_prefix(body, "if ") {
            if let Some(questions) = split_chain_questions(rest) {
                trace!("parsed conditional chained question from '{}'", escape_log(text));
                return Some(Command::ChainedQuestion {
                    questions,
                    condition: ChainCondition::IfTrue,
                });
            }
        }
        if let Some(questions) = split_chain_questions(body) {
            trace!("parsed chained question from '{}'", escape_log(text));
            return Some(Command::ChainedQuestion {
                questions,
                condition: ChainCondition::Always,
            });
        }

        // Priority 6: Ask
        Some(parse_ask(body))
    }
}

fn parse_admin(body: &str) -> Option<Command> {
    let lower = body.to_ascii_lowercase();
    if body.starts_with("관리자") {
        let rest = body["관리자".len()..].trim();
        if rest == "강제종료" {
            return Some(Command::AdminForceEnd);
        }
        if rest == "전체삭제" {
            return Some(Command::AdminClearAll);
        }
    }
    if let Some(rest) = lower.strip_prefix("admin") {
        let rest = rest.trim();
        if rest == "forceend" || rest == "force-end" || rest == "force_end" {
            return Some(Command::AdminForceEnd);
        }
        if rest == "clearall" || rest == "clear-all" || rest == "clear_all" {
            return Some(Command::AdminClearAll);
        }
    }
    None
}

fn parse_fixed_keyword(body: &str) -> Option<Command> {
    let mut parts = body.splitn(2, char::is_whitespace);
    let head = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim();
    let head_lower = head.to_ascii_lowercase();

    match head {
        "시작" => return Some(Command::Start { categories: split_words(rest) }),
        "힌트" | "ㅎㅌ" => return Some(Command::Hints { count: parse_leading_u32(rest) }),
        "포기" => return Some(Command::Surrender),
        "동의" => return Some(Command::Agree),
        "거부" => return Some(Command::Reject),
        "상태" | "현황" => return Some(Command::Status),
        "모델" => return Some(Command::ModelInfo),
        _ => {}
    }

    match head_lower.as_str() {
        "start" => return Some(Command::Start { categories: split_words(rest) }),
        "hint" => return Some(Command::Hints { count: parse_leading_u32(rest) }),
        "surrender" => return Some(Command::Surrender),
        _ => {}
    }

    if head == "전적" {
        if let Some(after_room) = rest.strip_prefix("룸") {
            return Some(Command::RoomStats { period: parse_stats_period(after_room.trim()) });
        }
        let nickname = if rest.is_empty() { None } else { Some(rest.to_string()) };
        return Some(Command::UserStats { nickname });
    }

    if head == "사용량" {
        let tokens = split_words(rest);
        let mut period = None;
        let mut model = None;
        for token in tokens {
            if period.is_none() {
                if let Some(p) = parse_stats_period(&token) {
                    period = Some(p);
                    continue;
                }
            }
            if model.is_none() {
                model = ModelOverride::normalize(&token);
            }
        }
        return Some(Command::AdminUsage { period, model });
    }

    None
}

fn parse_stats_period(token: &str) -> Option<StatsPeriod> {
    match token {
        "오늘" | "today" => Some(StatsPeriod::Today),
        "주간" | "weekly" => Some(StatsPeriod::Weekly),
        "월간" | "monthly" => Some(StatsPeriod::Monthly),
        "일간" => Some(StatsPeriod::Today),
        _ => None,
    }
}

fn parse_ask(body: &str) -> Command {
    if let Some(rest) = body.strip_prefix("정답") {
        return Command::Ask { question: rest.trim().to_string() };
    }
    if let Some(rest) = body.strip_prefix("질문") {
        return Command::Ask { question: rest.trim().to_string() };
    }
    if let Some(rest) = strip_ci_prefix(body, "ask") {
        let rest = rest.trim_start();
        return Command::Ask { question: rest.to_string() };
    }
    if let Some(rest) = body.strip_prefix('?') {
        return Command::Ask { question: rest.trim().to_string() };
    }
    Command::Ask { question: body.to_string() }
}

/// A chained question needs >= 2 comma-separated non-empty parts; with only
/// one part the text falls through to the Ask patterns instead (spec.md §4.A).
fn split_chain_questions(body: &str) -> Option<Vec<String>> {
    let parts: Vec<String> = body
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() >= 2 {
        Some(parts)
    } else {
        None
    }
}

fn split_words(s: &str) -> Vec<String> {
    s.split_whitespace().map(|w| w.to_string()).collect()
}

fn parse_leading_u32(s: &str) -> Option<u32> {
    let token = s.split_whitespace().next()?;
    token.parse::<u32>().ok()
}

/// Case-insensitive ASCII prefix strip (used only for the Latin-script `if`
/// and `ask` keywords; Korean keywords never need case folding).
fn strip_ci_prefix<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() < prefix.len() {
        return None;
    }
    let (head, tail) = s.split_at(prefix.len());
    if head.eq_ignore_ascii_case(prefix) {
        Some(tail)
    } else {
        None
    }
}
