//! In-process fake of [`super::SharedStore`], used by unit and integration
//! tests in place of a live Redis instance — the same role meshbbs's
//! in-memory `PublicState` cooldown maps play for testing `public.rs`
//! without a device.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{EnqueueOutcome, QueueDetails, SharedStore, StoreError};
use crate::command::PendingMessage;

struct TtlValue<T> {
    value: T,
    expires_at: Instant,
}

impl<T> TtlValue<T> {
    fn new(value: T, ttl_ms: u64) -> Self {
        Self { value, expires_at: Instant::now() + Duration::from_millis(ttl_ms.max(1)) }
    }

    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

#[derive(Default)]
struct ChatState {
    write_lock: Option<TtlValue<String>>,
    read_locks: HashMap<String, Instant>,
    processing: Option<Instant>,
    queue: VecDeque<PendingMessage>,
    dedup: HashSet<String>,
    chain_skip: HashMap<String, Instant>,
}

impl ChatState {
    fn write_lock_live(&mut self) -> bool {
        match &self.write_lock {
            Some(v) if v.is_live() => true,
            Some(_) => {
                self.write_lock = None;
                false
            }
            None => false,
        }
    }

    fn read_locks_live(&mut self) -> bool {
        let now = Instant::now();
        self.read_locks.retain(|_, exp| *exp > now);
        !self.read_locks.is_empty()
    }
}

/// In-memory [`SharedStore`]. Single-process only: suitable for tests, not
/// for coordinating multiple dispatcher instances.
#[derive(Default)]
pub struct MemoryStore {
    chats: Mutex<HashMap<String, ChatState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn try_acquire_write_lock(&self, chat_id: &str, token: &str, ttl_ms: u64) -> Result<bool, StoreError> {
        let mut chats = self.chats.lock().await;
        let chat = chats.entry(chat_id.to_string()).or_default();
        if chat.write_lock_live() || chat.read_locks_live() {
            return Ok(false);
        }
        chat.write_lock = Some(TtlValue::new(token.to_string(), ttl_ms));
        Ok(true)
    }

    async fn release_write_lock(&self, chat_id: &str, token: &str) -> Result<bool, StoreError> {
        let mut chats = self.chats.lock().await;
        let Some(chat) = chats.get_mut(chat_id) else { return Ok(false) };
        match &chat.write_lock {
            Some(v) if v.value == token => {
                chat.write_lock = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn renew_write_lock(&self, chat_id: &str, token: &str, ttl_ms: u64) -> Result<bool, StoreError> {
        let mut chats = self.chats.lock().await;
        let Some(chat) = chats.get_mut(chat_id) else { return Ok(false) };
        match &mut chat.write_lock {
            Some(v) if v.value == token => {
                v.expires_at = Instant::now() + Duration::from_millis(ttl_ms.max(1));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn try_acquire_read_lock(&self, chat_id: &str, token: &str, ttl_ms: u64) -> Result<bool, StoreError> {
        let mut chats = self.chats.lock().await;
        let chat = chats.entry(chat_id.to_string()).or_default();
        if chat.write_lock_live() {
            return Ok(false);
        }
        chat.read_locks.insert(token.to_string(), Instant::now() + Duration::from_millis(ttl_ms.max(1)));
        Ok(true)
    }

    async fn release_read_lock(&self, chat_id: &str, token: &str) -> Result<(), StoreError> {
        let mut chats = self.chats.lock().await;
        if let Some(chat) = chats.get_mut(chat_id) {
            chat.read_locks.remove(token);
        }
        Ok(())
    }

    async fn is_processing(&self, chat_id: &str) -> Result<bool, StoreError> {
        let mut chats = self.chats.lock().await;
        let Some(chat) = chats.get_mut(chat_id) else { return Ok(false) };
        match chat.processing {
            Some(exp) if exp > Instant::now() => Ok(true),
            Some(_) => {
                chat.processing = None;
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn start_processing(&self, chat_id: &str, ttl_ms: u64) -> Result<(), StoreError> {
        let mut chats = self.chats.lock().await;
        let chat = chats.entry(chat_id.to_string()).or_default();
        chat.processing = Some(Instant::now() + Duration::from_millis(ttl_ms.max(1)));
        Ok(())
    }

    async fn finish_processing(&self, chat_id: &str) -> Result<(), StoreError> {
        let mut chats = self.chats.lock().await;
        if let Some(chat) = chats.get_mut(chat_id) {
            chat.processing = None;
        }
        Ok(())
    }

    async fn enqueue(
        &self,
        chat_id: &str,
        msg: PendingMessage,
        replace_duplicate: bool,
        queue_max: usize,
        _pending_ttl_ms: u64,
    ) -> Result<EnqueueOutcome, StoreError> {
        let mut chats = self.chats.lock().await;
        let chat = chats.entry(chat_id.to_string()).or_default();

        if let Some(key) = msg.dedup_key() {
            if chat.dedup.contains(&key) {
                if replace_duplicate {
                    chat.queue.retain(|m| m.dedup_key().as_deref() != Some(key.as_str()));
                    chat.queue.push_back(msg);
                    return Ok(EnqueueOutcome::Success);
                }
                return Ok(EnqueueOutcome::Duplicate);
            }
        }

        if chat.queue.len() >= queue_max {
            return Ok(EnqueueOutcome::QueueFull);
        }

        if let Some(key) = msg.dedup_key() {
            chat.dedup.insert(key);
        }
        chat.queue.push_back(msg);
        Ok(EnqueueOutcome::Success)
    }

    async fn dequeue_batch(&self, chat_id: &str, n: usize) -> Result<Vec<PendingMessage>, StoreError> {
        let mut chats = self.chats.lock().await;
        let Some(chat) = chats.get_mut(chat_id) else { return Ok(Vec::new()) };
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let Some(msg) = chat.queue.pop_front() else { break };
            if let Some(key) = msg.dedup_key() {
                chat.dedup.remove(&key);
            }
            out.push(msg);
        }
        Ok(out)
    }

    async fn has_pending(&self, chat_id: &str) -> Result<bool, StoreError> {
        let chats = self.chats.lock().await;
        Ok(chats.get(chat_id).map(|c| !c.queue.is_empty()).unwrap_or(false))
    }

    async fn queue_details(&self, chat_id: &str, queue_max: usize) -> Result<QueueDetails, StoreError> {
        let chats = self.chats.lock().await;
        let size = chats.get(chat_id).map(|c| c.queue.len()).unwrap_or(0);
        Ok(QueueDetails { size, queue_max })
    }

    async fn clear(&self, chat_id: &str) -> Result<(), StoreError> {
        let mut chats = self.chats.lock().await;
        if let Some(chat) = chats.get_mut(chat_id) {
            chat.queue.clear();
            chat.dedup.clear();
        }
        Ok(())
    }

    async fn set_chain_skip_flag(&self, chat_id: &str, user_id: &str, ttl_ms: u64) -> Result<(), StoreError> {
        let mut chats = self.chats.lock().await;
        let chat = chats.entry(chat_id.to_string()).or_default();
        chat.chain_skip.insert(user_id.to_string(), Instant::now() + Duration::from_millis(ttl_ms.max(1)));
        Ok(())
    }

    async fn check_and_clear_chain_skip_flag(&self, chat_id: &str, user_id: &str) -> Result<bool, StoreError> {
        let mut chats = self.chats.lock().await;
        let Some(chat) = chats.get_mut(chat_id) else { return Ok(false) };
        match chat.chain_skip.remove(user_id) {
            Some(exp) if exp > Instant::now() => Ok(true),
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::InboundMessage;

    fn inbound(chat: &str, user: &str, content: &str) -> InboundMessage {
        InboundMessage {
            chat_id: chat.to_string(),
            user_id: user.to_string(),
            sender: None,
            thread_id: None,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn write_lock_excludes_read_lock_and_vice_versa() {
        let store = MemoryStore::new();
        assert!(store.try_acquire_write_lock("c1", "tok-a", 10_000).await.unwrap());
        assert!(!store.try_acquire_read_lock("c1", "tok-b", 10_000).await.unwrap());
        assert!(store.release_write_lock("c1", "tok-a").await.unwrap());
        assert!(store.try_acquire_read_lock("c1", "tok-b", 10_000).await.unwrap());
        assert!(!store.try_acquire_write_lock("c1", "tok-c", 10_000).await.unwrap());
    }

    #[tokio::test]
    async fn release_requires_matching_token() {
        let store = MemoryStore::new();
        store.try_acquire_write_lock("c1", "tok-a", 10_000).await.unwrap();
        assert!(!store.release_write_lock("c1", "wrong-token").await.unwrap());
        assert!(store.release_write_lock("c1", "tok-a").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_enqueue_is_rejected_unless_replacing() {
        let store = MemoryStore::new();
        let msg = PendingMessage::raw(&inbound("c1", "u1", "hello"));
        assert_eq!(
            store.enqueue("c1", msg.clone(), false, 10, 60_000).await.unwrap(),
            EnqueueOutcome::Success
        );
        assert_eq!(
            store.enqueue("c1", msg.clone(), false, 10, 60_000).await.unwrap(),
            EnqueueOutcome::Duplicate
        );
        assert_eq!(store.queue_details("c1", 10).await.unwrap().size, 1);

        assert_eq!(
            store.enqueue("c1", msg, true, 10, 60_000).await.unwrap(),
            EnqueueOutcome::Success
        );
        assert_eq!(store.queue_details("c1", 10).await.unwrap().size, 1);
    }

    #[tokio::test]
    async fn queue_full_once_queue_max_reached() {
        let store = MemoryStore::new();
        for i in 0..3 {
            let msg = PendingMessage::raw(&inbound("c1", "u1", &format!("msg-{i}")));
            store.enqueue("c1", msg, false, 3, 60_000).await.unwrap();
        }
        let overflow = PendingMessage::raw(&inbound("c1", "u1", "one-too-many"));
        assert_eq!(store.enqueue("c1", overflow, false, 3, 60_000).await.unwrap(), EnqueueOutcome::QueueFull);
    }

    #[tokio::test]
    async fn dequeue_batch_is_fifo() {
        let store = MemoryStore::new();
        for i in 0..3 {
            let msg = PendingMessage::raw(&inbound("c1", "u1", &format!("msg-{i}")));
            store.enqueue("c1", msg, false, 10, 60_000).await.unwrap();
        }
        let batch = store.dequeue_batch("c1", 2).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].content, "msg-0");
        assert_eq!(batch[1].content, "msg-1");
        assert_eq!(store.queue_details("c1", 10).await.unwrap().size, 1);
    }

    #[tokio::test]
    async fn chain_skip_flag_check_and_clear_is_idempotent() {
        let store = MemoryStore::new();
        store.set_chain_skip_flag("c1", "u1", 10_000).await.unwrap();
        assert!(store.check_and_clear_chain_skip_flag("c1", "u1").await.unwrap());
        assert!(!store.check_and_clear_chain_skip_flag("c1", "u1").await.unwrap());
    }
}
