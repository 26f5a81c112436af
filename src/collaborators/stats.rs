//! `StatsService`: the statistics/usage handlers spec.md §1 keeps out of
//! scope — "pure read/write operations" against a persistence schema this
//! crate never defines. The trait is narrow on purpose: `UserStats`,
//! `RoomStats` and `AdminUsage` each resolve to one read call, the same
//! "thin read-only query" shape meshbbs's `storage::Storage::topic_stats`
//! boundary has relative to `bbs/commands.rs`.

use async_trait::async_trait;
use thiserror::Error;

use crate::command::{ModelOverride, StatsPeriod};

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("stats backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait StatsService: Send + Sync {
    /// `전적 [닉]` — per-user game record. `nickname` absent means "the
    /// caller's own record".
    async fn user_stats(&self, chat_id: &str, user_id: &str, nickname: Option<&str>) -> Result<String, StatsError>;

    /// `전적 룸 [일간/주간/월간]` — room-wide record; `None` period means
    /// all-time.
    async fn room_stats(&self, chat_id: &str, period: Option<StatsPeriod>) -> Result<String, StatsError>;

    /// `사용량 [오늘/주간/월간] [모델]` — admin-only usage report, optionally
    /// scoped to one normalized model token.
    async fn admin_usage(&self, period: Option<StatsPeriod>, model: Option<ModelOverride>) -> Result<String, StatsError>;
}
