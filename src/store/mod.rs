//! The shared key-value store abstraction.
//!
//! spec.md explicitly keeps the persistent game-state store out of scope,
//! describing it only as "abstract key-value primitives with atomic
//! scripting". [`SharedStore`] is that abstraction made concrete enough to
//! compile against: every primitive the lock manager ([`crate::lock`]) and
//! the pending queue ([`crate::queue`]) need, expressed as one atomic
//! operation per trait method so a single round trip to the backing store
//! (a Lua script in the Redis-backed implementation) can never be observed
//! half-applied.
//!
//! Two implementations live alongside the trait: [`redis_store::RedisStore`]
//! for production, and [`memory_store::MemoryStore`] for tests — the same
//! split meshbbs draws between its on-disk `Storage` and a temp-dir-backed
//! instance in tests, except here the in-memory one is a first-class second
//! implementation rather than a throwaway fixture.

pub mod memory_store;
pub mod redis_store;

use async_trait::async_trait;
use thiserror::Error;

use crate::command::PendingMessage;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("shared store unreachable: {0}")]
    Unavailable(String),
    #[error("shared store operation failed: {0}")]
    Backend(String),
}

/// Result of an `Enqueue`/`EnqueueReplacingDuplicate` call (spec.md §4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Success,
    QueueFull,
    Duplicate,
}

/// A snapshot of queue occupancy, used by `GetQueueDetails`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDetails {
    pub size: usize,
    pub queue_max: usize,
}

#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Compare-and-set-with-TTL: succeeds only if no write lock and no read
    /// lock currently exist for `chat_id`.
    async fn try_acquire_write_lock(&self, chat_id: &str, token: &str, ttl_ms: u64) -> Result<bool, StoreError>;

    /// Releases the write lock iff `token` matches the current holder.
    async fn release_write_lock(&self, chat_id: &str, token: &str) -> Result<bool, StoreError>;

    /// Extends the TTL of the write lock iff `token` still matches.
    async fn renew_write_lock(&self, chat_id: &str, token: &str, ttl_ms: u64) -> Result<bool, StoreError>;

    /// Atomically rejects if a write lock exists, else adds `token` to the
    /// shared read-lock set and (re)sets its TTL.
    async fn try_acquire_read_lock(&self, chat_id: &str, token: &str, ttl_ms: u64) -> Result<bool, StoreError>;

    /// Removes `token` from the read-lock set.
    async fn release_read_lock(&self, chat_id: &str, token: &str) -> Result<(), StoreError>;

    async fn is_processing(&self, chat_id: &str) -> Result<bool, StoreError>;
    async fn start_processing(&self, chat_id: &str, ttl_ms: u64) -> Result<(), StoreError>;
    async fn finish_processing(&self, chat_id: &str) -> Result<(), StoreError>;

    /// Atomic enqueue against both the ordered list and the dedup set.
    /// `replace_duplicate` selects `EnqueueReplacingDuplicate` semantics.
    async fn enqueue(
        &self,
        chat_id: &str,
        msg: PendingMessage,
        replace_duplicate: bool,
        queue_max: usize,
        pending_ttl_ms: u64,
    ) -> Result<EnqueueOutcome, StoreError>;

    /// Pops up to `n` messages in FIFO order; may return fewer.
    async fn dequeue_batch(&self, chat_id: &str, n: usize) -> Result<Vec<PendingMessage>, StoreError>;

    async fn has_pending(&self, chat_id: &str) -> Result<bool, StoreError>;
    async fn queue_details(&self, chat_id: &str, queue_max: usize) -> Result<QueueDetails, StoreError>;
    async fn clear(&self, chat_id: &str) -> Result<(), StoreError>;

    async fn set_chain_skip_flag(&self, chat_id: &str, user_id: &str, ttl_ms: u64) -> Result<(), StoreError>;

    /// Atomic check-and-clear: two successive calls return `true` then
    /// `false` (spec.md testable property 7). Must never be split into
    /// separate read + delete round trips (spec.md §9 design notes).
    async fn check_and_clear_chain_skip_flag(&self, chat_id: &str, user_id: &str) -> Result<bool, StoreError>;
}
