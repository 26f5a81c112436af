//! Command model: the typed values the parser produces and the orchestrator
//! dispatches on.
//!
//! Mirrors the shape of meshbbs's `PublicCommand` (`src/bbs/public.rs`) — a
//! small enum with payload-carrying variants — generalized to the full
//! 20-questions command surface and the derived predicates the lock manager
//! and outbound sender need (`requires_write_lock`, `waiting_message_key`).

pub mod parser;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Condition under which a chained question's remainder should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainCondition {
    Always,
    IfTrue,
}

/// Period selector accepted by usage/stats commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsPeriod {
    Today,
    Weekly,
    Monthly,
    AllTime,
}

/// Normalized model override tokens (see spec.md §6 "Model tokens normalize as").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelOverride {
    Flash25,
    Flash30,
    Pro25,
    Pro30,
}

impl ModelOverride {
    pub fn normalize(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "2.5flash" | "flash-25" => Some(Self::Flash25),
            "3.0flash" | "flash-30" => Some(Self::Flash30),
            "2.5pro" | "pro-25" => Some(Self::Pro25),
            "3.0pro" | "pro-30" | "pro" => Some(Self::Pro30),
            _ => None,
        }
    }
}

/// A single question within a chained command.
pub type Question = String;

/// A fully parsed command, immutable once produced by [`parser::CommandParser`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start {
        categories: Vec<String>,
    },
    Hints {
        count: Option<u32>,
    },
    Ask {
        question: String,
    },
    ChainedQuestion {
        questions: Vec<Question>,
        condition: ChainCondition,
    },
    Surrender,
    Agree,
    Reject,
    Status,
    ModelInfo,
    Help,
    UserStats {
        nickname: Option<String>,
    },
    RoomStats {
        period: Option<StatsPeriod>,
    },
    AdminForceEnd,
    AdminClearAll,
    AdminUsage {
        period: Option<StatsPeriod>,
        model: Option<ModelOverride>,
    },
    Unknown,
}

impl Command {
    /// `RequiresWriteLock()` — true for every command except the read-only
    /// status/stat queries listed in spec.md §3.
    pub fn requires_write_lock(&self) -> bool {
        !matches!(
            self,
            Command::Status | Command::UserStats { .. } | Command::RoomStats { .. } | Command::AdminUsage { .. }
        )
    }

    /// `WaitingMessageKey()` — non-null only for the three long-running
    /// command kinds that justify a progress message.
    pub fn waiting_message_key(&self) -> Option<&'static str> {
        match self {
            Command::Start { .. } => Some("waiting.start"),
            Command::Hints { .. } => Some("waiting.hints"),
            Command::Ask { .. } => Some("waiting.ask"),
            _ => None,
        }
    }

    /// Whether this command belongs to the replace-on-duplicate enqueue set
    /// (spec.md invariant 3): a second occurrence refreshes the existing
    /// queue entry instead of being rejected as a duplicate.
    pub fn is_replace_on_duplicate(&self) -> bool {
        matches!(self, Command::Surrender | Command::Agree | Command::Reject)
    }

    /// Whether executing this command requires an existing game session.
    pub fn requires_session(&self) -> bool {
        matches!(
            self,
            Command::Hints { .. }
                | Command::Ask { .. }
                | Command::ChainedQuestion { .. }
                | Command::Surrender
                | Command::Agree
                | Command::Reject
                | Command::Status
        )
    }
}

/// One inbound chat message, as delivered by the (opaque) stream consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub chat_id: String,
    pub user_id: String,
    pub sender: Option<String>,
    pub thread_id: Option<String>,
    pub content: String,
}

impl InboundMessage {
    /// Display name used in notifications: sender if present, else user_id,
    /// else "anonymous" — with the anonymous fallback also applying when
    /// `user_id == chat_id` (meshbbs's `Session::display_name` inspires the
    /// "fall back to a generic label" shape of this helper).
    pub fn display_name(&self) -> String {
        if let Some(sender) = &self.sender {
            if !sender.is_empty() {
                return sender.clone();
            }
        }
        if self.user_id == self.chat_id || self.user_id.is_empty() {
            return "anonymous".to_string();
        }
        self.user_id.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundKind {
    Waiting,
    Final,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub chat_id: String,
    pub thread_id: Option<String>,
    pub text: String,
    pub kind: OutboundKind,
}

/// A record in the per-chat pending queue (spec.md §3 `PendingMessage`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMessage {
    pub user_id: String,
    pub content: String,
    pub thread_id: Option<String>,
    pub sender: Option<String>,
    pub timestamp_millis: u64,
    pub is_chain_batch: bool,
    pub batch_questions: Vec<Question>,
}

impl PendingMessage {
    pub fn raw(inbound: &InboundMessage) -> Self {
        Self {
            user_id: inbound.user_id.clone(),
            content: inbound.content.clone(),
            thread_id: inbound.thread_id.clone(),
            sender: inbound.sender.clone(),
            timestamp_millis: now_millis(),
            is_chain_batch: false,
            batch_questions: Vec::new(),
        }
    }

    pub fn chain_batch(inbound: &InboundMessage, remaining: Vec<Question>) -> Self {
        Self {
            user_id: inbound.user_id.clone(),
            content: String::new(),
            thread_id: inbound.thread_id.clone(),
            sender: inbound.sender.clone(),
            timestamp_millis: now_millis(),
            is_chain_batch: true,
            batch_questions: remaining,
        }
    }

    /// Normalized content used for dedup comparisons (exact string match on
    /// trimmed content; chain batches never participate in dedup).
    pub fn dedup_key(&self) -> Option<String> {
        if self.is_chain_batch {
            None
        } else {
            Some(self.content.trim().to_string())
        }
    }

    pub fn display_name(&self) -> String {
        if let Some(sender) = &self.sender {
            if !sender.is_empty() {
                return sender.clone();
            }
        }
        if self.user_id.is_empty() {
            return "anonymous".to_string();
        }
        self.user_id.clone()
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
