//! The error taxonomy (spec.md §7): semantic kinds, not types. Every
//! external-call error collapses into one [`ErrorKind`] via
//! [`ErrorKind::from_riddle_error`]/[`ErrorKind::from_lock_error`], then the
//! orchestrator and queue processor render it through a single mapping
//! function (`ErrorKind::user_message`/`ErrorKind::outbound_kind`) instead
//! of string-matching scattered across call sites — mirroring the split
//! meshbbs draws between `validation::SecurityError` (typed, `thiserror`)
//! and the `anyhow::Result` context wrapping at its storage boundary.

use thiserror::Error;

use crate::collaborators::riddle::RiddleError;
use crate::command::OutboundKind;
use crate::lock::LockError;
use crate::outbound::{OutboundSender, Publisher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SessionNotFound,
    InvalidQuestion,
    DuplicateQuestion,
    HintLimitExceeded,
    HintNotAvailable,
    GuessRateLimit,
    AiTimeout,
    AiUnavailable,
    AccessDenied,
    UserBlocked,
    Lock,
    Generic,
}

#[derive(Debug, Error)]
#[error("{kind:?}: {detail}")]
pub struct DispatchError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl ErrorKind {
    pub fn from_riddle_error(e: &RiddleError) -> Self {
        match e {
            RiddleError::SessionNotFound => ErrorKind::SessionNotFound,
            RiddleError::InvalidQuestion(_) => ErrorKind::InvalidQuestion,
            RiddleError::DuplicateQuestion => ErrorKind::DuplicateQuestion,
            RiddleError::HintLimitExceeded => ErrorKind::HintLimitExceeded,
            RiddleError::HintNotAvailable => ErrorKind::HintNotAvailable,
            RiddleError::GuessRateLimit { .. } => ErrorKind::GuessRateLimit,
            RiddleError::AiTimeout => ErrorKind::AiTimeout,
            RiddleError::AiUnavailable => ErrorKind::AiUnavailable,
            RiddleError::Generic(_) => ErrorKind::Generic,
        }
    }

    pub fn from_lock_error(_e: &LockError) -> Self {
        ErrorKind::Lock
    }

    /// Every kind maps to `Final` except `Lock`, which is emitted as
    /// `Error` to surface the transport-level contention hint (spec.md §4.D
    /// "Error semantics").
    pub fn outbound_kind(&self) -> OutboundKind {
        match self {
            ErrorKind::Lock => OutboundKind::Error,
            _ => OutboundKind::Final,
        }
    }

    /// `AccessDenied` emits nothing at all (spec.md §4.H step 2); every
    /// other kind has a user-visible message.
    pub fn is_silent(&self) -> bool {
        matches!(self, ErrorKind::AccessDenied)
    }

    pub fn user_message(&self, detail: &str) -> String {
        match self {
            ErrorKind::SessionNotFound => "There is no active game in this chat yet.".to_string(),
            ErrorKind::InvalidQuestion => format!("That question isn't valid: {detail}"),
            ErrorKind::DuplicateQuestion => "You already asked that question.".to_string(),
            ErrorKind::HintLimitExceeded => "You've used all available hints for this game.".to_string(),
            ErrorKind::HintNotAvailable => "No hint is available right now.".to_string(),
            ErrorKind::GuessRateLimit => format!("Please wait before guessing again: {detail}"),
            ErrorKind::AiTimeout => "The AI took too long to respond.".to_string(),
            ErrorKind::AiUnavailable => "The AI service is unavailable right now.".to_string(),
            ErrorKind::AccessDenied => String::new(),
            ErrorKind::UserBlocked => format!("Sorry {detail}, you are not allowed to use this bot."),
            ErrorKind::Lock => "Another command is in progress, please try again shortly.".to_string(),
            ErrorKind::Generic => format!("Something went wrong: {detail}"),
        }
    }
}

impl DispatchError {
    pub fn from_riddle_error(e: RiddleError) -> Self {
        let kind = ErrorKind::from_riddle_error(&e);
        Self { kind, detail: e.to_string() }
    }

    pub fn generic(detail: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Generic, detail: detail.into() }
    }
}

/// Shared error → outbound rendering used by both the queue processor and
/// the orchestrator's immediate-dispatch path, so the two call sites can
/// never drift on how a [`DispatchError`] becomes a user-visible message
/// (spec.md §7 "translate to the taxonomy via a single mapping function").
pub async fn emit_dispatch_error<P: Publisher>(
    outbound: &OutboundSender<P>,
    chat_id: &str,
    thread_id: Option<String>,
    err: DispatchError,
) {
    if err.kind.is_silent() {
        return;
    }
    let text = err.kind.user_message(&err.detail);
    match err.kind.outbound_kind() {
        OutboundKind::Error => outbound.send_lock_error(chat_id, thread_id, &text).await,
        _ => outbound.send_error(chat_id, thread_id, &text).await,
    }
}
