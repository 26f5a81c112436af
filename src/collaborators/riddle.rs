//! `RiddleService`: the riddle-rules engine (spec.md §6). Evaluates
//! questions/guesses against the hidden answer, tracks per-chat session
//! state, and produces the user-facing text the core chunks and sends
//! unmodified. Game-logic correctness is an explicit Non-goal of this
//! crate (spec.md §1) — this trait is the seam, not an implementation.

use async_trait::async_trait;
use thiserror::Error;

/// Coarse outcome of a yes/no-style answer, used by the chained-question
/// handler (component G) to decide whether to continue an `IfTrue` chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerScale {
    AlwaysYes,
    MostlyYes,
    MostlyNo,
    AlwaysNo,
    Invalid,
}

impl AnswerScale {
    /// `IfTrue` chains continue only on a clearly affirmative answer
    /// (spec.md §4.G).
    pub fn is_affirmative(&self) -> bool {
        matches!(self, AnswerScale::AlwaysYes | AnswerScale::MostlyYes)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOutcome {
    pub message: String,
    pub scale: AnswerScale,
    pub is_answer_attempt: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub main: String,
    pub hint: Option<String>,
    pub question_count: u32,
}

#[derive(Debug, Error)]
pub enum RiddleError {
    #[error("no active session for this chat")]
    SessionNotFound,
    #[error("invalid question: {0}")]
    InvalidQuestion(String),
    #[error("duplicate question")]
    DuplicateQuestion,
    #[error("hint limit exceeded")]
    HintLimitExceeded,
    #[error("no hint available")]
    HintNotAvailable,
    #[error("guess rate limit, retry in {retry_after_seconds}s")]
    GuessRateLimit { retry_after_seconds: u64 },
    #[error("AI call timed out")]
    AiTimeout,
    #[error("AI backend unavailable")]
    AiUnavailable,
    #[error("riddle service error: {0}")]
    Generic(String),
}

#[async_trait]
pub trait RiddleService: Send + Sync {
    async fn start(&self, chat_id: &str, user_id: &str, categories: &[String]) -> Result<String, RiddleError>;

    /// Answers one question, or evaluates an explicit guess, returning the
    /// coarse outcome the chain handler needs. `is_chain` marks history
    /// entries produced by a chain-batch drain for bookkeeping.
    async fn answer_with_outcome(
        &self,
        chat_id: &str,
        user_id: &str,
        sender: Option<&str>,
        question: &str,
        is_chain: bool,
    ) -> Result<AnswerOutcome, RiddleError>;

    async fn generate_hint(&self, chat_id: &str, user_id: &str, count: Option<u32>) -> Result<String, RiddleError>;

    async fn surrender(&self, chat_id: &str, user_id: &str) -> Result<String, RiddleError>;

    async fn handle_vote(&self, chat_id: &str, user_id: &str, agree: bool) -> Result<String, RiddleError>;

    /// Separated main/hint text plus question count, for the `Status`
    /// command and for a chain batch's post-batch summary.
    async fn status_separated_with_count(&self, chat_id: &str) -> Result<StatusReport, RiddleError>;

    async fn has_session(&self, chat_id: &str) -> bool;

    /// Hints left before `HintLimitExceeded`, or `None` if there is no
    /// session / the budget is unbounded. Consulted by the orchestrator to
    /// decide whether showing a waiting message for `Hints` is useful
    /// (spec.md §4.H step 7: "Hints skips it if the hint budget is
    /// exhausted").
    async fn hints_remaining(&self, chat_id: &str) -> Option<u32>;

    /// `관리자 강제종료` — administrator force-ends the session regardless of
    /// game state, bypassing access control (spec.md §4.H step 2).
    async fn admin_force_end(&self, chat_id: &str) -> Result<String, RiddleError>;

    /// `관리자 전체삭제` — administrator wipes the session entirely (history
    /// included), distinct from a normal surrender.
    async fn admin_clear_all(&self, chat_id: &str) -> Result<String, RiddleError>;
}
