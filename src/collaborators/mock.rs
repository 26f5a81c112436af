//! Minimal in-memory collaborator implementations used by the integration
//! test suite and the `serve` demo entrypoint — analogous to how meshbbs's
//! own tests drive `PublicState`/`SchedulerHandle` directly rather than a
//! live Meshtastic device.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::access::{AccessControl, DenialReason};
use super::riddle::{AnswerOutcome, AnswerScale, RiddleError, RiddleService, StatusReport};
use super::stats::{StatsError, StatsService};
use crate::command::{ModelOverride, StatsPeriod};

#[derive(Default)]
pub struct MockRiddleService {
    sessions: Mutex<HashMap<String, MockSession>>,
    scales: Mutex<HashMap<String, AnswerScale>>,
}

struct MockSession {
    question_count: u32,
    hints_given: u32,
}

impl MockRiddleService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the scale the next `answer_with_outcome` call for `chat_id`
    /// returns; defaults to `AlwaysYes` otherwise. Test-only hook.
    pub fn set_next_scale(&self, chat_id: &str, scale: AnswerScale) {
        self.scales.lock().unwrap().insert(chat_id.to_string(), scale);
    }
}

#[async_trait]
impl RiddleService for MockRiddleService {
    async fn start(&self, chat_id: &str, _user_id: &str, _categories: &[String]) -> Result<String, RiddleError> {
        self.sessions.lock().unwrap().insert(chat_id.to_string(), MockSession { question_count: 0, hints_given: 0 });
        Ok("A new riddle has begun.".to_string())
    }

    async fn answer_with_outcome(
        &self,
        chat_id: &str,
        _user_id: &str,
        _sender: Option<&str>,
        _question: &str,
        _is_chain: bool,
    ) -> Result<AnswerOutcome, RiddleError> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get_mut(chat_id).ok_or(RiddleError::SessionNotFound)?;
        session.question_count += 1;
        let scale = self.scales.lock().unwrap().remove(chat_id).unwrap_or(AnswerScale::AlwaysYes);
        Ok(AnswerOutcome { message: "OK".to_string(), scale, is_answer_attempt: false })
    }

    async fn generate_hint(&self, chat_id: &str, _user_id: &str, _count: Option<u32>) -> Result<String, RiddleError> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get_mut(chat_id).ok_or(RiddleError::SessionNotFound)?;
        if session.hints_given >= 3 {
            return Err(RiddleError::HintLimitExceeded);
        }
        session.hints_given += 1;
        Ok(format!("Hint #{}", session.hints_given))
    }

    async fn surrender(&self, chat_id: &str, _user_id: &str) -> Result<String, RiddleError> {
        self.sessions.lock().unwrap().remove(chat_id);
        Ok("You gave up. The answer was a mock.".to_string())
    }

    async fn handle_vote(&self, _chat_id: &str, _user_id: &str, agree: bool) -> Result<String, RiddleError> {
        Ok(if agree { "Vote recorded: agree.".to_string() } else { "Vote recorded: reject.".to_string() })
    }

    async fn status_separated_with_count(&self, chat_id: &str) -> Result<StatusReport, RiddleError> {
        let sessions = self.sessions.lock().unwrap();
        let session = sessions.get(chat_id).ok_or(RiddleError::SessionNotFound)?;
        Ok(StatusReport {
            main: format!("{} questions asked so far.", session.question_count),
            hint: if session.hints_given > 0 { Some(format!("{} hints used.", session.hints_given)) } else { None },
            question_count: session.question_count,
        })
    }

    async fn has_session(&self, chat_id: &str) -> bool {
        self.sessions.lock().unwrap().contains_key(chat_id)
    }

    async fn hints_remaining(&self, chat_id: &str) -> Option<u32> {
        let sessions = self.sessions.lock().unwrap();
        let session = sessions.get(chat_id)?;
        Some(3u32.saturating_sub(session.hints_given))
    }

    async fn admin_force_end(&self, chat_id: &str) -> Result<String, RiddleError> {
        self.sessions.lock().unwrap().remove(chat_id);
        Ok("An administrator force-ended the game.".to_string())
    }

    async fn admin_clear_all(&self, chat_id: &str) -> Result<String, RiddleError> {
        self.sessions.lock().unwrap().remove(chat_id);
        Ok("All game state for this room has been cleared.".to_string())
    }
}

pub struct AllowAllAccessControl;

#[async_trait]
impl AccessControl for AllowAllAccessControl {
    async fn get_denial_reason(&self, _user_id: &str, _chat_id: &str) -> Option<DenialReason> {
        None
    }
}

pub struct BlockListAccessControl {
    blocked: Vec<String>,
}

impl BlockListAccessControl {
    pub fn new(blocked: Vec<String>) -> Self {
        Self { blocked }
    }
}

#[async_trait]
impl AccessControl for BlockListAccessControl {
    async fn get_denial_reason(&self, user_id: &str, _chat_id: &str) -> Option<DenialReason> {
        if self.blocked.iter().any(|b| b == user_id) {
            Some(DenialReason::Blocked(user_id.to_string()))
        } else {
            None
        }
    }
}

/// Fixed-text stats backend: enough to drive the `serve` demo and
/// integration tests without a real persistence schema (spec.md's
/// Non-goals explicitly exclude "persistence schema for statistics").
#[derive(Default)]
pub struct MockStatsService;

#[async_trait]
impl StatsService for MockStatsService {
    async fn user_stats(&self, _chat_id: &str, user_id: &str, nickname: Option<&str>) -> Result<String, StatsError> {
        let who = nickname.unwrap_or(user_id);
        Ok(format!("{who} has no recorded games yet."))
    }

    async fn room_stats(&self, _chat_id: &str, period: Option<StatsPeriod>) -> Result<String, StatsError> {
        Ok(format!("No games recorded for this room ({}).", period_label(period)))
    }

    async fn admin_usage(&self, period: Option<StatsPeriod>, model: Option<ModelOverride>) -> Result<String, StatsError> {
        let model_label = model.map(model_label).unwrap_or("all models");
        Ok(format!("Usage report for {} / {}: 0 calls.", period_label(period), model_label))
    }
}

fn period_label(period: Option<StatsPeriod>) -> &'static str {
    match period {
        Some(StatsPeriod::Today) => "today",
        Some(StatsPeriod::Weekly) => "this week",
        Some(StatsPeriod::Monthly) => "this month",
        Some(StatsPeriod::AllTime) | None => "all time",
    }
}

fn model_label(model: ModelOverride) -> &'static str {
    match model {
        ModelOverride::Flash25 => "flash-25",
        ModelOverride::Flash30 => "flash-30",
        ModelOverride::Pro25 => "pro-25",
        ModelOverride::Pro30 => "pro-30",
    }
}
