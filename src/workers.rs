//! Process-wide worker pools (spec.md §9 design notes): the player
//! registration queue and the stats recorder queue. Both are module-scoped
//! singletons started on first use, grounded on the same
//! `mpsc`-channel-plus-background-task shape as meshbbs's
//! `SchedulerHandle`/`start_scheduler` (`src/bbs/dispatch.rs`) — a cloneable
//! handle wrapping a sender, a detached task draining the receiver, and an
//! explicit async `shutdown()` that drains in-flight work before returning.
//!
//! Neither pool sits on the critical path of user-visible latency (spec.md
//! §5 "stats writes are never on the critical path"): callers fire a
//! non-blocking `send` and move on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use log::warn;
use tokio::sync::{mpsc, oneshot};

/// Registers a player against the riddle service's bookkeeping. Fire-and-
/// forget: failures are logged, never surfaced to the chat.
#[async_trait]
pub trait PlayerRegistrar: Send + Sync {
    async fn register(&self, chat_id: &str, user_id: &str);
}

/// Persists one usage/statistics record. Fire-and-forget, same contract as
/// [`PlayerRegistrar`].
#[async_trait]
pub trait StatsRecorder: Send + Sync {
    async fn record(&self, chat_id: &str, user_id: &str, event: &str);
}

enum PoolCommand<T> {
    Work(T),
    Shutdown(oneshot::Sender<()>),
}

/// Overflow policy applied when the bounded channel is full: `Drop` discards
/// the new item (telemetry-grade paths, per spec.md §9 design notes);
/// `Fallback` runs the work inline on the caller's task instead of queueing
/// it, trading a brief blocking call for not losing the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    Drop,
    Fallback,
}

#[derive(Default)]
struct PoolMetrics {
    dropped: AtomicU64,
    fallback: AtomicU64,
}

pub struct PlayerRegistrationPool {
    tx: mpsc::Sender<PoolCommand<(String, String)>>,
    registrar: Arc<dyn PlayerRegistrar>,
    policy: OverflowPolicy,
    metrics: Arc<PoolMetrics>,
}

impl PlayerRegistrationPool {
    pub fn start(registrar: Arc<dyn PlayerRegistrar>, capacity: usize, policy: OverflowPolicy) -> Self {
        let (tx, mut rx) = mpsc::channel::<PoolCommand<(String, String)>>(capacity.max(1));
        let worker_registrar = registrar.clone();
        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    PoolCommand::Work((chat_id, user_id)) => worker_registrar.register(&chat_id, &user_id).await,
                    PoolCommand::Shutdown(done) => {
                        let _ = done.send(());
                        break;
                    }
                }
            }
        });
        Self { tx, registrar, policy, metrics: Arc::new(PoolMetrics::default()) }
    }

    /// Registers a player asynchronously (spec.md §4.H step 4: "register the
    /// player asynchronously"). Never blocks the caller beyond a channel
    /// send, and never surfaces a failure to the chat.
    pub fn register(&self, chat_id: &str, user_id: &str) {
        match self.tx.try_send(PoolCommand::Work((chat_id.to_string(), user_id.to_string()))) {
            Ok(()) => {}
            Err(_) if self.policy == OverflowPolicy::Fallback => {
                self.metrics.fallback.fetch_add(1, Ordering::Relaxed);
                let registrar = self.registrar.clone();
                let chat_id = chat_id.to_string();
                let user_id = user_id.to_string();
                tokio::spawn(async move { registrar.register(&chat_id, &user_id).await });
            }
            Err(_) => {
                self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(target: "dispatch::workers", "player registration queue full, dropping registration for {chat_id}");
            }
        }
    }

    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(PoolCommand::Shutdown(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.metrics.dropped.load(Ordering::Relaxed)
    }
}

pub struct StatsRecorderPool {
    tx: mpsc::Sender<PoolCommand<(String, String, String)>>,
    recorder: Arc<dyn StatsRecorder>,
    policy: OverflowPolicy,
    metrics: Arc<PoolMetrics>,
}

impl StatsRecorderPool {
    pub fn start(recorder: Arc<dyn StatsRecorder>, capacity: usize, policy: OverflowPolicy) -> Self {
        let (tx, mut rx) = mpsc::channel::<PoolCommand<(String, String, String)>>(capacity.max(1));
        let worker_recorder = recorder.clone();
        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    PoolCommand::Work((chat_id, user_id, event)) => worker_recorder.record(&chat_id, &user_id, &event).await,
                    PoolCommand::Shutdown(done) => {
                        let _ = done.send(());
                        break;
                    }
                }
            }
        });
        Self { tx, recorder, policy, metrics: Arc::new(PoolMetrics::default()) }
    }

    pub fn record(&self, chat_id: &str, user_id: &str, event: &str) {
        match self.tx.try_send(PoolCommand::Work((chat_id.to_string(), user_id.to_string(), event.to_string()))) {
            Ok(()) => {}
            Err(_) if self.policy == OverflowPolicy::Fallback => {
                self.metrics.fallback.fetch_add(1, Ordering::Relaxed);
                let recorder = self.recorder.clone();
                let chat_id = chat_id.to_string();
                let user_id = user_id.to_string();
                let event = event.to_string();
                tokio::spawn(async move { recorder.record(&chat_id, &user_id, &event).await });
            }
            Err(_) => {
                self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(target: "dispatch::workers", "stats recorder queue full, dropping event for {chat_id}");
            }
        }
    }

    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(PoolCommand::Shutdown(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.metrics.dropped.load(Ordering::Relaxed)
    }
}

static PLAYER_POOL: OnceLock<Arc<PlayerRegistrationPool>> = OnceLock::new();
static STATS_POOL: OnceLock<Arc<StatsRecorderPool>> = OnceLock::new();

/// Starts the player-registration worker pool on first use and returns the
/// shared handle on every subsequent call.
pub fn player_pool(registrar: Arc<dyn PlayerRegistrar>, capacity: usize, policy: OverflowPolicy) -> Arc<PlayerRegistrationPool> {
    PLAYER_POOL.get_or_init(|| Arc::new(PlayerRegistrationPool::start(registrar, capacity, policy))).clone()
}

/// Starts the stats-recorder worker pool on first use and returns the
/// shared handle on every subsequent call.
pub fn stats_pool(recorder: Arc<dyn StatsRecorder>, capacity: usize, policy: OverflowPolicy) -> Arc<StatsRecorderPool> {
    STATS_POOL.get_or_init(|| Arc::new(StatsRecorderPool::start(recorder, capacity, policy))).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::{sleep, Duration};

    #[derive(Default)]
    struct RecordingRegistrar {
        seen: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl PlayerRegistrar for RecordingRegistrar {
        async fn register(&self, chat_id: &str, user_id: &str) {
            self.seen.lock().unwrap().push((chat_id.to_string(), user_id.to_string()));
        }
    }

    #[tokio::test]
    async fn register_reaches_the_worker() {
        let registrar = Arc::new(RecordingRegistrar::default());
        let pool = PlayerRegistrationPool::start(registrar.clone(), 8, OverflowPolicy::Drop);
        pool.register("c1", "u1");
        sleep(Duration::from_millis(20)).await;
        assert_eq!(registrar.seen.lock().unwrap().as_slice(), &[("c1".to_string(), "u1".to_string())]);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn overflow_with_drop_policy_increments_dropped_counter() {
        let registrar = Arc::new(RecordingRegistrar::default());
        let pool = PlayerRegistrationPool::start(registrar, 1, OverflowPolicy::Drop);
        for i in 0..50 {
            pool.register("c1", &format!("u{i}"));
        }
        assert!(pool.dropped_count() > 0);
        pool.shutdown().await;
    }
}
