//! Shared harness for the integration test suite: wires a full
//! [`GameMessageService`] against an in-memory store and the mock
//! collaborators, the same "drive the real dispatcher end to end against a
//! fake backend" approach meshbbs's own test suite takes with `PublicState`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use riddlebot_dispatch::chain::ChainHandler;
use riddlebot_dispatch::collaborators::access::AccessControl;
use riddlebot_dispatch::collaborators::mock::MockStatsService;
use riddlebot_dispatch::collaborators::riddle::{AnswerOutcome, RiddleError, RiddleService, StatusReport};
use riddlebot_dispatch::collaborators::templates::DefaultMessageProvider;
use riddlebot_dispatch::command::parser::CommandParser;
use riddlebot_dispatch::command::{InboundMessage, OutboundMessage};
use riddlebot_dispatch::config::CategoriesConfig;
use riddlebot_dispatch::lock::LockManager;
use riddlebot_dispatch::orchestrator::GameMessageService;
use riddlebot_dispatch::outbound::{OutboundSender, Publisher};
use riddlebot_dispatch::queue::PendingQueue;
use riddlebot_dispatch::store::memory_store::MemoryStore;
use riddlebot_dispatch::store::SharedStore;
use riddlebot_dispatch::workers::{OverflowPolicy, PlayerRegistrar, PlayerRegistrationPool, StatsRecorder, StatsRecorderPool};

pub const PREFIX: &str = "/20q";

#[derive(Clone, Default)]
pub struct RecordingPublisher {
    pub sent: Arc<Mutex<Vec<OutboundMessage>>>,
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, message: OutboundMessage) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

impl RecordingPublisher {
    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|m| m.text.clone()).collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

struct NoopRegistrar;

#[async_trait]
impl PlayerRegistrar for NoopRegistrar {
    async fn register(&self, _chat_id: &str, _user_id: &str) {}
}

struct NoopStatsRecorder;

#[async_trait]
impl StatsRecorder for NoopStatsRecorder {
    async fn record(&self, _chat_id: &str, _user_id: &str, _event: &str) {}
}

/// Wraps a [`MockRiddleService`]-like inner service and inserts an artificial
/// delay before `answer_with_outcome` resolves, used to exercise the
/// delayed-waiting race without a real slow backend.
pub struct DelayedAnswerRiddleService<R: RiddleService> {
    inner: R,
    delay: Duration,
}

impl<R: RiddleService> DelayedAnswerRiddleService<R> {
    pub fn new(inner: R, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl<R: RiddleService> RiddleService for DelayedAnswerRiddleService<R> {
    async fn start(&self, chat_id: &str, user_id: &str, categories: &[String]) -> Result<String, RiddleError> {
        self.inner.start(chat_id, user_id, categories).await
    }

    async fn answer_with_outcome(
        &self,
        chat_id: &str,
        user_id: &str,
        sender: Option<&str>,
        question: &str,
        is_chain: bool,
    ) -> Result<AnswerOutcome, RiddleError> {
        tokio::time::sleep(self.delay).await;
        self.inner.answer_with_outcome(chat_id, user_id, sender, question, is_chain).await
    }

    async fn generate_hint(&self, chat_id: &str, user_id: &str, count: Option<u32>) -> Result<String, RiddleError> {
        self.inner.generate_hint(chat_id, user_id, count).await
    }

    async fn surrender(&self, chat_id: &str, user_id: &str) -> Result<String, RiddleError> {
        self.inner.surrender(chat_id, user_id).await
    }

    async fn handle_vote(&self, chat_id: &str, user_id: &str, agree: bool) -> Result<String, RiddleError> {
        self.inner.handle_vote(chat_id, user_id, agree).await
    }

    async fn status_separated_with_count(&self, chat_id: &str) -> Result<StatusReport, RiddleError> {
        self.inner.status_separated_with_count(chat_id).await
    }

    async fn has_session(&self, chat_id: &str) -> bool {
        self.inner.has_session(chat_id).await
    }

    async fn hints_remaining(&self, chat_id: &str) -> Option<u32> {
        self.inner.hints_remaining(chat_id).await
    }

    async fn admin_force_end(&self, chat_id: &str) -> Result<String, RiddleError> {
        self.inner.admin_force_end(chat_id).await
    }

    async fn admin_clear_all(&self, chat_id: &str) -> Result<String, RiddleError> {
        self.inner.admin_clear_all(chat_id).await
    }
}

pub struct Harness {
    pub service: GameMessageService<RecordingPublisher>,
    pub publisher: RecordingPublisher,
    pub queue: Arc<PendingQueue>,
    pub store: Arc<dyn SharedStore>,
}

pub struct HarnessConfig {
    pub delayed_waiting_ms: u64,
    pub acquire_timeout_ms: u64,
    pub write_lock_ttl_ms: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self { delayed_waiting_ms: 5_000, acquire_timeout_ms: 250, write_lock_ttl_ms: 10_000 }
    }
}

pub fn build(riddle: Arc<dyn RiddleService>, access: Arc<dyn AccessControl>, config: HarnessConfig) -> Harness {
    let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());

    let lock_manager = Arc::new(LockManager::new(
        store.clone(),
        config.write_lock_ttl_ms,
        config.write_lock_ttl_ms,
        config.write_lock_ttl_ms,
        config.acquire_timeout_ms,
    ));
    let queue = Arc::new(PendingQueue::new(store.clone(), 10, 60_000, 120_000));
    let stats = Arc::new(MockStatsService);
    let templates = Arc::new(DefaultMessageProvider);
    let chain = Arc::new(ChainHandler::new(riddle.clone(), queue.clone()));
    let publisher = RecordingPublisher::default();
    let outbound = Arc::new(OutboundSender::new(publisher.clone(), 900));
    let parser = CommandParser::new(PREFIX);
    let registrar = Arc::new(PlayerRegistrationPool::start(Arc::new(NoopRegistrar), 16, OverflowPolicy::Drop));
    let recorder = Arc::new(StatsRecorderPool::start(Arc::new(NoopStatsRecorder), 16, OverflowPolicy::Drop));

    let service = GameMessageService::new(
        parser,
        access,
        riddle,
        stats,
        templates,
        lock_manager,
        queue.clone(),
        outbound,
        chain,
        registrar,
        recorder,
        config.delayed_waiting_ms,
        4,
        50,
        CategoriesConfig::default(),
    );

    Harness { service, publisher, queue, store }
}

pub fn inbound(chat_id: &str, user_id: &str, content: &str) -> InboundMessage {
    InboundMessage {
        chat_id: chat_id.to_string(),
        user_id: user_id.to_string(),
        sender: None,
        thread_id: None,
        content: content.to_string(),
    }
}
