//! Pending queue store (component C).
//!
//! Thin typed wrapper over [`crate::store::SharedStore`]'s enqueue/dequeue
//! primitives, adding the policy spec.md §4.C describes: which commands
//! replace a duplicate rather than being rejected, and the human-readable
//! queue-detail summary the notifier (component E) renders.

use std::sync::Arc;

use log::warn;
use thiserror::Error;

use crate::command::PendingMessage;
use crate::store::{EnqueueOutcome, SharedStore, StoreError};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<StoreError> for QueueError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) | StoreError::Backend(msg) => QueueError::StoreUnavailable(msg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueDetails {
    pub size: usize,
    pub queue_max: usize,
}

pub struct PendingQueue {
    store: Arc<dyn SharedStore>,
    queue_max: usize,
    pending_ttl_ms: u64,
    chain_skip_ttl_ms: u64,
}

impl PendingQueue {
    pub fn new(store: Arc<dyn SharedStore>, queue_max: usize, pending_ttl_ms: u64, chain_skip_ttl_ms: u64) -> Self {
        Self { store, queue_max, pending_ttl_ms, chain_skip_ttl_ms }
    }

    pub async fn enqueue(&self, chat_id: &str, msg: PendingMessage, replace_on_duplicate: bool) -> Result<EnqueueOutcome, QueueError> {
        let outcome = self
            .store
            .enqueue(chat_id, msg, replace_on_duplicate, self.queue_max, self.pending_ttl_ms)
            .await?;
        if matches!(outcome, EnqueueOutcome::QueueFull) {
            warn!(target: "dispatch::queue", "queue full for chat {chat_id} (max {})", self.queue_max);
        }
        Ok(outcome)
    }

    pub async fn dequeue_batch(&self, chat_id: &str, n: usize) -> Result<Vec<PendingMessage>, QueueError> {
        Ok(self.store.dequeue_batch(chat_id, n).await?)
    }

    pub async fn has_pending(&self, chat_id: &str) -> Result<bool, QueueError> {
        Ok(self.store.has_pending(chat_id).await?)
    }

    pub async fn queue_details(&self, chat_id: &str) -> Result<QueueDetails, QueueError> {
        let d = self.store.queue_details(chat_id, self.queue_max).await?;
        Ok(QueueDetails { size: d.size, queue_max: d.queue_max })
    }

    pub async fn clear(&self, chat_id: &str) -> Result<(), QueueError> {
        Ok(self.store.clear(chat_id).await?)
    }

    pub async fn set_chain_skip_flag(&self, chat_id: &str, user_id: &str) -> Result<(), QueueError> {
        Ok(self.store.set_chain_skip_flag(chat_id, user_id, self.chain_skip_ttl_ms).await?)
    }

    pub async fn check_and_clear_chain_skip_flag(&self, chat_id: &str, user_id: &str) -> Result<bool, QueueError> {
        Ok(self.store.check_and_clear_chain_skip_flag(chat_id, user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::InboundMessage;
    use crate::store::memory_store::MemoryStore;

    fn inbound(chat: &str, user: &str, content: &str) -> InboundMessage {
        InboundMessage { chat_id: chat.to_string(), user_id: user.to_string(), sender: None, thread_id: None, content: content.to_string() }
    }

    fn queue() -> PendingQueue {
        PendingQueue::new(Arc::new(MemoryStore::new()), 5, 60_000, 120_000)
    }

    #[tokio::test]
    async fn enqueue_reports_queue_full_past_capacity() {
        let q = queue();
        for i in 0..5 {
            let msg = PendingMessage::raw(&inbound("c1", "u1", &format!("m{i}")));
            assert_eq!(q.enqueue("c1", msg, false).await.unwrap(), EnqueueOutcome::Success);
        }
        let overflow = PendingMessage::raw(&inbound("c1", "u1", "one more"));
        assert_eq!(q.enqueue("c1", overflow, false).await.unwrap(), EnqueueOutcome::QueueFull);
    }

    #[tokio::test]
    async fn duplicate_non_replaceable_message_is_rejected() {
        let q = queue();
        let msg = PendingMessage::raw(&inbound("c1", "u1", "same text"));
        assert_eq!(q.enqueue("c1", msg.clone(), false).await.unwrap(), EnqueueOutcome::Success);
        assert_eq!(q.enqueue("c1", msg, false).await.unwrap(), EnqueueOutcome::Duplicate);
        assert_eq!(q.queue_details("c1").await.unwrap().size, 1);
    }

    #[tokio::test]
    async fn chain_skip_flag_is_cleared_after_one_check() {
        let q = queue();
        q.set_chain_skip_flag("c1", "u1").await.unwrap();
        assert!(q.check_and_clear_chain_skip_flag("c1", "u1").await.unwrap());
        assert!(!q.check_and_clear_chain_skip_flag("c1", "u1").await.unwrap());
    }
}
