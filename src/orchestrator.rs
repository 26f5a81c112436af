//! Game message service (component H): the top-level dispatch described in
//! spec.md §4.H. Structurally this plays the same role meshbbs's
//! `bbs/commands.rs` top-level `handle_command` dispatcher plays relative to
//! `bbs/public.rs`'s parser — parse, check access, route to the per-command
//! handler, emit — generalized to the queue/lock-aware routing this crate's
//! concurrency model requires.
//!
//! Split in two pieces to resolve the cyclic dependency spec.md §9 design
//! notes call out: [`CommandRunner`] holds every collaborator needed to
//! actually execute a parsed [`Command`] and is handed to [`QueueProcessor`]
//! as its injected executor; [`GameMessageService`] owns both the runner and
//! the processor and adds the immediate-vs-enqueue routing decision on top.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::time::sleep;

use crate::chain::ChainHandler;
use crate::collaborators::access::{AccessControl, DenialReason};
use crate::collaborators::riddle::RiddleService;
use crate::collaborators::stats::StatsService;
use crate::collaborators::templates::MessageProvider;
use crate::command::parser::CommandParser;
use crate::command::{ChainCondition, Command, InboundMessage, ModelOverride, PendingMessage, StatsPeriod};
use crate::config::CategoriesConfig;
use crate::errors::{emit_dispatch_error, DispatchError, ErrorKind};
use crate::lock::{LockManager, LockOutcomeError};
use crate::outbound::{OutboundSender, Publisher};
use crate::processor::{CommandExecutor, QueueProcessor};
use crate::queue::PendingQueue;
use crate::workers::{PlayerRegistrationPool, StatsRecorderPool};

use std::collections::HashMap;

/// Everything needed to run one already-parsed [`Command`] to completion and
/// emit its reply. Shared between the orchestrator's immediate-dispatch path
/// and the queue processor's drain path (as a [`CommandExecutor`]).
pub struct CommandRunner<P: Publisher> {
    parser: CommandParser,
    riddle: Arc<dyn RiddleService>,
    stats: Arc<dyn StatsService>,
    templates: Arc<dyn MessageProvider>,
    chain: Arc<ChainHandler>,
    outbound: Arc<OutboundSender<P>>,
    player_pool: Arc<PlayerRegistrationPool>,
    stats_pool: Arc<StatsRecorderPool>,
    delayed_waiting_ms: u64,
    categories: CategoriesConfig,
}

impl<P: Publisher + 'static> CommandRunner<P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        parser: CommandParser,
        riddle: Arc<dyn RiddleService>,
        stats: Arc<dyn StatsService>,
        templates: Arc<dyn MessageProvider>,
        chain: Arc<ChainHandler>,
        outbound: Arc<OutboundSender<P>>,
        player_pool: Arc<PlayerRegistrationPool>,
        stats_pool: Arc<StatsRecorderPool>,
        delayed_waiting_ms: u64,
        categories: CategoriesConfig,
    ) -> Self {
        Self { parser, riddle, stats, templates, chain, outbound, player_pool, stats_pool, delayed_waiting_ms, categories }
    }

    /// Runs one already-parsed command against one inbound message and
    /// emits its reply. Used both for immediate dispatch and for a raw
    /// [`PendingMessage`] re-parsed at drain time.
    pub async fn execute_inbound(&self, inbound: &InboundMessage, command: &Command) -> Result<(), DispatchError> {
        self.player_pool.register(&inbound.chat_id, &inbound.user_id);
        crate::metrics::inc_commands_dispatched();

        match command {
            Command::Start { categories } => self.run_start(inbound, categories).await,
            Command::Hints { count } => self.run_hints(inbound, *count).await,
            Command::Ask { question } => self.run_ask(inbound, question).await,
            Command::ChainedQuestion { questions, condition } => self.run_chained(inbound, questions, *condition).await,
            Command::Surrender => {
                self.run_simple_recorded(inbound, self.riddle.surrender(&inbound.chat_id, &inbound.user_id), "surrender").await
            }
            Command::Agree => self.run_simple(inbound, self.riddle.handle_vote(&inbound.chat_id, &inbound.user_id, true)).await,
            Command::Reject => self.run_simple(inbound, self.riddle.handle_vote(&inbound.chat_id, &inbound.user_id, false)).await,
            Command::Status => self.run_status(inbound).await,
            Command::ModelInfo => self.run_model_info(inbound).await,
            Command::Help => self.run_help(inbound).await,
            Command::UserStats { nickname } => self.run_user_stats(inbound, nickname.as_deref()).await,
            Command::RoomStats { period } => self.run_room_stats(inbound, *period).await,
            Command::AdminForceEnd => {
                self.run_simple_recorded(inbound, self.riddle.admin_force_end(&inbound.chat_id), "admin_force_end").await
            }
            Command::AdminClearAll => {
                self.run_simple_recorded(inbound, self.riddle.admin_clear_all(&inbound.chat_id), "admin_clear_all").await
            }
            Command::AdminUsage { period, model } => self.run_admin_usage(inbound, *period, *model).await,
            Command::Unknown => self.run_unknown(inbound).await,
        }
    }

    /// Re-parses a dequeued [`PendingMessage`] and routes it — either to
    /// [`ChainHandler::process_batch`] (chain batch) or to
    /// [`Self::execute_inbound`] (raw inbound). This is the function wired
    /// into [`QueueProcessor`] as its [`CommandExecutor`].
    pub async fn execute_pending(&self, chat_id: &str, msg: PendingMessage) -> Result<(), DispatchError> {
        if msg.is_chain_batch {
            let text = self.chain.process_batch(chat_id, &msg.user_id, &msg.batch_questions).await;
            self.outbound.send_final(chat_id, msg.thread_id.clone(), &text).await;
            return Ok(());
        }

        let inbound = InboundMessage {
            chat_id: chat_id.to_string(),
            user_id: msg.user_id.clone(),
            sender: msg.sender.clone(),
            thread_id: msg.thread_id.clone(),
            content: msg.content.clone(),
        };
        match self.parser.parse(&inbound.content) {
            Some(command) => self.execute_inbound(&inbound, &command).await,
            None => Ok(()),
        }
    }

    /// Filters `categories` down to the ones `CategoriesConfig` allows before
    /// asking the riddle service to start a game with them. A request naming
    /// only disallowed categories is rejected outright rather than silently
    /// starting an unrestricted game.
    async fn run_start(&self, inbound: &InboundMessage, categories: &[String]) -> Result<(), DispatchError> {
        let allowed: Vec<String> = categories.iter().filter(|c| self.categories.is_enabled(c)).cloned().collect();
        if !categories.is_empty() && allowed.is_empty() {
            return Err(DispatchError::generic(format!(
                "none of the requested categories are enabled: {}",
                categories.join(", ")
            )));
        }
        let categories = allowed;
        let categories = categories.as_slice();

        let had_session = self.riddle.has_session(&inbound.chat_id).await;
        if !had_session {
            self.send_waiting(inbound, "waiting.start").await;
        }
        let result = self.riddle.start(&inbound.chat_id, &inbound.user_id, categories).await;
        self.finish(inbound, result).await
    }

    async fn run_hints(&self, inbound: &InboundMessage, count: Option<u32>) -> Result<(), DispatchError> {
        let budget_exhausted = matches!(self.riddle.hints_remaining(&inbound.chat_id).await, Some(0));
        if !budget_exhausted {
            self.send_waiting(inbound, "waiting.hints").await;
        }
        let result = self.riddle.generate_hint(&inbound.chat_id, &inbound.user_id, count).await;
        self.finish(inbound, result).await
    }

    /// The "delayed waiting" protocol (spec.md §4.H step 6): race the riddle
    /// call against a timer, showing the waiting message only if the timer
    /// wins. The call runs on a spawned task so a panic inside it is
    /// recovered via `JoinError` rather than taking down the dispatcher
    /// (spec.md §9 design notes' open question, decided in DESIGN.md).
    async fn run_ask(&self, inbound: &InboundMessage, question: &str) -> Result<(), DispatchError> {
        let riddle = self.riddle.clone();
        let chat_id = inbound.chat_id.clone();
        let user_id = inbound.user_id.clone();
        let sender = inbound.sender.clone();
        let question = question.to_string();

        let handle = tokio::spawn(async move {
            riddle.answer_with_outcome(&chat_id, &user_id, sender.as_deref(), &question, false).await
        });
        tokio::pin!(handle);

        enum Race<T> {
            Done(T),
            TimedOut,
        }

        let race = tokio::select! {
            res = &mut handle => Race::Done(res),
            _ = sleep(Duration::from_millis(self.delayed_waiting_ms)) => Race::TimedOut,
        };

        let joined = match race {
            Race::Done(res) => res,
            Race::TimedOut => {
                self.send_waiting(inbound, "waiting.ask").await;
                handle.await
            }
        };

        let result = match joined {
            Ok(inner) => inner.map(|outcome| outcome.message),
            Err(join_err) => {
                warn!(target: "dispatch::orchestrator", "ask task panicked for {}: {join_err}", inbound.chat_id);
                return Err(DispatchError::generic("the bot hit an internal error answering that"));
            }
        };
        self.finish(inbound, result).await
    }

    async fn run_chained(&self, inbound: &InboundMessage, questions: &[String], condition: ChainCondition) -> Result<(), DispatchError> {
        let outcome = self.chain.handle_first(inbound, questions, condition).await;
        if let Some(notice) = outcome.queued_notice {
            self.outbound.send_waiting(&inbound.chat_id, inbound.thread_id.clone(), &notice).await;
        }
        self.outbound.send_final(&inbound.chat_id, inbound.thread_id.clone(), &outcome.reply_text).await;
        Ok(())
    }

    async fn run_status(&self, inbound: &InboundMessage) -> Result<(), DispatchError> {
        match self.riddle.status_separated_with_count(&inbound.chat_id).await {
            Ok(status) => {
                let text = match status.hint {
                    Some(hint) => format!("{}\n\n{}", status.main, hint),
                    None => status.main,
                };
                self.outbound.send_final(&inbound.chat_id, inbound.thread_id.clone(), &text).await;
                Ok(())
            }
            Err(e) => Err(DispatchError::from_riddle_error(e)),
        }
    }

    async fn run_model_info(&self, inbound: &InboundMessage) -> Result<(), DispatchError> {
        let text = self.templates.get("model_info", &HashMap::new());
        self.outbound.send_final(&inbound.chat_id, inbound.thread_id.clone(), &text).await;
        Ok(())
    }

    async fn run_help(&self, inbound: &InboundMessage) -> Result<(), DispatchError> {
        let text = self.templates.get("help", &HashMap::new());
        self.outbound.send_final(&inbound.chat_id, inbound.thread_id.clone(), &text).await;
        Ok(())
    }

    async fn run_user_stats(&self, inbound: &InboundMessage, nickname: Option<&str>) -> Result<(), DispatchError> {
        match self.stats.user_stats(&inbound.chat_id, &inbound.user_id, nickname).await {
            Ok(text) => {
                self.outbound.send_final(&inbound.chat_id, inbound.thread_id.clone(), &text).await;
                Ok(())
            }
            Err(e) => Err(DispatchError::generic(e.to_string())),
        }
    }

    async fn run_room_stats(&self, inbound: &InboundMessage, period: Option<StatsPeriod>) -> Result<(), DispatchError> {
        match self.stats.room_stats(&inbound.chat_id, period).await {
            Ok(text) => {
                self.outbound.send_final(&inbound.chat_id, inbound.thread_id.clone(), &text).await;
                Ok(())
            }
            Err(e) => Err(DispatchError::generic(e.to_string())),
        }
    }

    async fn run_admin_usage(&self, inbound: &InboundMessage, period: Option<StatsPeriod>, model: Option<ModelOverride>) -> Result<(), DispatchError> {
        match self.stats.admin_usage(period, model).await {
            Ok(text) => {
                self.outbound.send_final(&inbound.chat_id, inbound.thread_id.clone(), &text).await;
                Ok(())
            }
            Err(e) => Err(DispatchError::generic(e.to_string())),
        }
    }

    async fn run_unknown(&self, inbound: &InboundMessage) -> Result<(), DispatchError> {
        let text = self.templates.get("unknown_command", &HashMap::new());
        self.outbound.send_final(&inbound.chat_id, inbound.thread_id.clone(), &text).await;
        Ok(())
    }

    async fn run_simple(&self, inbound: &InboundMessage, fut: impl std::future::Future<Output = Result<String, crate::collaborators::riddle::RiddleError>>) -> Result<(), DispatchError> {
        let result = fut.await;
        self.finish(inbound, result).await
    }

    /// Like [`Self::run_simple`], but also records `event` against the
    /// stats-recorder pool (fire-and-forget, off the critical path) when the
    /// game actually concludes. `RiddleService`'s outcome types don't expose
    /// a "won" signal (game-rules evaluation is out of scope for this
    /// crate), so only the conclusion points the dispatcher itself drives —
    /// surrender and the admin commands — are recorded.
    async fn run_simple_recorded(
        &self,
        inbound: &InboundMessage,
        fut: impl std::future::Future<Output = Result<String, crate::collaborators::riddle::RiddleError>>,
        event: &str,
    ) -> Result<(), DispatchError> {
        let result = fut.await;
        if result.is_ok() {
            self.stats_pool.record(&inbound.chat_id, &inbound.user_id, event);
        }
        self.finish(inbound, result).await
    }

    async fn finish(&self, inbound: &InboundMessage, result: Result<String, crate::collaborators::riddle::RiddleError>) -> Result<(), DispatchError> {
        match result {
            Ok(text) => {
                self.outbound.send_final(&inbound.chat_id, inbound.thread_id.clone(), &text).await;
                Ok(())
            }
            Err(e) => Err(DispatchError::from_riddle_error(e)),
        }
    }

    async fn send_waiting(&self, inbound: &InboundMessage, key: &str) {
        let text = self.templates.get(key, &HashMap::new());
        self.outbound.send_waiting(&inbound.chat_id, inbound.thread_id.clone(), &text).await;
    }
}

/// Top-level per-message dispatch (component H). Owns the pieces that make
/// the immediate-vs-enqueue decision: the parser, access control, the lock
/// manager, the queue processor, and the [`CommandRunner`] both paths
/// execute through.
pub struct GameMessageService<P: Publisher + 'static> {
    parser: CommandParser,
    access: Arc<dyn AccessControl>,
    riddle: Arc<dyn RiddleService>,
    lock_manager: Arc<LockManager>,
    queue: Arc<PendingQueue>,
    processor: Arc<QueueProcessor<P>>,
    outbound: Arc<OutboundSender<P>>,
    runner: Arc<CommandRunner<P>>,
}

impl<P: Publisher + 'static> GameMessageService<P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        parser: CommandParser,
        access: Arc<dyn AccessControl>,
        riddle: Arc<dyn RiddleService>,
        stats: Arc<dyn StatsService>,
        templates: Arc<dyn MessageProvider>,
        lock_manager: Arc<LockManager>,
        queue: Arc<PendingQueue>,
        outbound: Arc<OutboundSender<P>>,
        chain: Arc<ChainHandler>,
        player_pool: Arc<PlayerRegistrationPool>,
        stats_pool: Arc<StatsRecorderPool>,
        delayed_waiting_ms: u64,
        batch_size: usize,
        mq_max_queue_iterations: u32,
        categories: CategoriesConfig,
    ) -> Self {
        let runner = Arc::new(CommandRunner::new(
            parser.clone(),
            riddle.clone(),
            stats,
            templates,
            chain,
            outbound.clone(),
            player_pool,
            stats_pool,
            delayed_waiting_ms,
            categories,
        ));

        let executor_runner = runner.clone();
        let executor: CommandExecutor = Arc::new(move |chat_id: String, msg: PendingMessage| {
            let runner = executor_runner.clone();
            Box::pin(async move { runner.execute_pending(&chat_id, msg).await })
        });

        let processor = Arc::new(QueueProcessor::new(
            lock_manager.clone(),
            queue.clone(),
            outbound.clone(),
            parser.clone(),
            executor,
            batch_size,
            mq_max_queue_iterations,
        ));

        Self { parser, access, riddle, lock_manager, queue, processor, outbound, runner }
    }

    /// Dispatches one inbound message (spec.md §4.H). Drops silently if the
    /// parser returns `None` (not addressed to this bot).
    pub async fn dispatch(&self, inbound: InboundMessage) {
        let Some(command) = self.parser.parse(&inbound.content) else {
            return;
        };

        let bypasses_access_control = matches!(command, Command::AdminForceEnd | Command::AdminClearAll);
        if !bypasses_access_control {
            if let Some(reason) = self.access.get_denial_reason(&inbound.user_id, &inbound.chat_id).await {
                match reason {
                    DenialReason::Silent => return,
                    DenialReason::Blocked(nickname) => {
                        let err = DispatchError { kind: ErrorKind::UserBlocked, detail: nickname };
                        emit_dispatch_error(&self.outbound, &inbound.chat_id, inbound.thread_id.clone(), err).await;
                        return;
                    }
                }
            }
        }

        if command.requires_session() && !self.riddle.has_session(&inbound.chat_id).await {
            let err = DispatchError { kind: ErrorKind::SessionNotFound, detail: String::new() };
            emit_dispatch_error(&self.outbound, &inbound.chat_id, inbound.thread_id.clone(), err).await;
            return;
        }

        let chat_id = inbound.chat_id.clone();
        let already_busy = self.processor.has_pending(&chat_id).await || self.lock_manager.is_processing(&chat_id).await.unwrap_or(false);

        if already_busy {
            let msg = PendingMessage::raw(&inbound);
            self.processor.enqueue_and_notify(&chat_id, msg, command.is_replace_on_duplicate()).await;
            self.processor.process_queued_messages(&chat_id).await;
            return;
        }

        let requires_write_lock = command.requires_write_lock();
        let runs_long = matches!(command, Command::Start { .. } | Command::Hints { .. } | Command::Ask { .. });
        let runner = self.runner.clone();
        let lock_manager = self.lock_manager.clone();

        let result = if requires_write_lock && runs_long {
            lock_manager
                .with_renewed_lock(&chat_id, "orchestrator", || self.run_under_processing_flag(&chat_id, &inbound, &command, runner))
                .await
        } else if requires_write_lock {
            lock_manager
                .with_lock(&chat_id, "orchestrator", || self.run_under_processing_flag(&chat_id, &inbound, &command, runner))
                .await
        } else {
            lock_manager
                .with_read_lock(&chat_id, "orchestrator", || self.run_under_processing_flag(&chat_id, &inbound, &command, runner))
                .await
        };

        match result {
            Ok(()) => {}
            Err(LockOutcomeError::Lock(_)) => {
                // Defer: lock contention is treated as "enqueue", not a user-visible error.
                let msg = PendingMessage::raw(&inbound);
                self.processor.enqueue_and_notify(&chat_id, msg, command.is_replace_on_duplicate()).await;
            }
            Err(LockOutcomeError::Inner(dispatch_err)) => {
                emit_dispatch_error(&self.outbound, &chat_id, inbound.thread_id.clone(), dispatch_err).await;
            }
        }

        self.processor.process_queued_messages(&chat_id).await;
    }

    async fn run_under_processing_flag(
        &self,
        chat_id: &str,
        inbound: &InboundMessage,
        command: &Command,
        runner: Arc<CommandRunner<P>>,
    ) -> Result<(), DispatchError> {
        match self
            .lock_manager
            .with_processing_flag(chat_id, || runner.execute_inbound(inbound, command))
            .await
        {
            Ok(()) => Ok(()),
            Err(LockOutcomeError::Lock(e)) => Err(DispatchError::generic(e.to_string())),
            Err(LockOutcomeError::Inner(e)) => Err(e),
        }
    }

    pub fn queue(&self) -> &Arc<PendingQueue> {
        &self.queue
    }

    pub async fn log_startup(&self, prefix: &str) {
        info!(target: "dispatch::orchestrator", "dispatcher ready, prefix={prefix}");
    }
}
