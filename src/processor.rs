//! Queue processor (component F): drains a chat's pending queue under lock,
//! re-enqueueing on lock contention. Resolves the cyclic dependency between
//! the orchestrator and the processor by taking an injected
//! [`CommandExecutor`] closure at construction (spec.md §9 design notes) —
//! the orchestrator owns the processor, not the other way around, the same
//! direction meshbbs's `SchedulerHandle` is owned by (not owning) the
//! component that enqueues into it.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::warn;

use crate::command::parser::CommandParser;
use crate::command::PendingMessage;
use crate::errors::{emit_dispatch_error, DispatchError};
use crate::lock::{LockManager, LockOutcomeError};
use crate::notifier::QueueNotifier;
use crate::outbound::{OutboundSender, Publisher};
use crate::queue::PendingQueue;
use crate::store::EnqueueOutcome;

/// Routes one dequeued [`PendingMessage`] to either the chain-batch handler
/// or the orchestrator's single-command router. Boxed because the
/// orchestrator (which owns the real implementation) is constructed after
/// the processor that needs to call into it.
pub type CommandExecutor =
    Arc<dyn Fn(String, PendingMessage) -> Pin<Box<dyn Future<Output = Result<(), DispatchError>> + Send>> + Send + Sync>;

pub struct QueueProcessor<P: Publisher> {
    lock_manager: Arc<LockManager>,
    queue: Arc<PendingQueue>,
    notifier: QueueNotifier,
    outbound: Arc<OutboundSender<P>>,
    parser: CommandParser,
    executor: CommandExecutor,
    batch_size: usize,
    mq_max_queue_iterations: u32,
    iteration_cap_hits: AtomicU32,
}

impl<P: Publisher> QueueProcessor<P> {
    pub fn new(
        lock_manager: Arc<LockManager>,
        queue: Arc<PendingQueue>,
        outbound: Arc<OutboundSender<P>>,
        parser: CommandParser,
        executor: CommandExecutor,
        batch_size: usize,
        mq_max_queue_iterations: u32,
    ) -> Self {
        Self {
            lock_manager,
            queue,
            notifier: QueueNotifier::new(),
            outbound,
            parser,
            executor,
            batch_size,
            mq_max_queue_iterations,
            iteration_cap_hits: AtomicU32::new(0),
        }
    }

    /// Enqueues a raw inbound as a [`PendingMessage`] and publishes an
    /// acknowledgment describing the resulting queue state (spec.md §4.F).
    pub async fn enqueue_and_notify(&self, chat_id: &str, msg: PendingMessage, replace_on_duplicate: bool) {
        let outcome = match self.queue.enqueue(chat_id, msg.clone(), replace_on_duplicate).await {
            Ok(o) => o,
            Err(e) => {
                warn!(target: "dispatch::processor", "enqueue failed for {chat_id}: {e}");
                let notice = self.notifier.failed(&msg, "the queue is temporarily unavailable");
                self.outbound.send_final(chat_id, notice.thread_id, &notice.text).await;
                return;
            }
        };

        let notice = match outcome {
            EnqueueOutcome::Success => {
                let details = self.queue.queue_details(chat_id).await.unwrap_or(crate::queue::QueueDetails { size: 0, queue_max: 0 });
                crate::metrics::observe_queue_depth(details.size);
                crate::metrics::inc_commands_enqueued();
                self.notifier.processing_start(&msg, crate::store::QueueDetails { size: details.size, queue_max: details.queue_max })
            }
            EnqueueOutcome::QueueFull => self.notifier.failed(&msg, "the queue is full, please try again later"),
            EnqueueOutcome::Duplicate => self.notifier.duplicate(&msg),
        };
        self.outbound.send_waiting(chat_id, notice.thread_id, &notice.text).await;
    }

    pub async fn has_pending(&self, chat_id: &str) -> bool {
        self.queue.has_pending(chat_id).await.unwrap_or(false)
    }

    /// Drains up to `mq_max_queue_iterations` batches of `batch_size`
    /// messages each (spec.md §4.F). Stops immediately (without consuming
    /// the rest of its budget) the moment a lock acquisition fails, since
    /// the current holder will drive the next drain forward.
    pub async fn process_queued_messages(&self, chat_id: &str) {
        for iteration in 0..self.mq_max_queue_iterations {
            let batch = match self.queue.dequeue_batch(chat_id, self.batch_size).await {
                Ok(b) => b,
                Err(e) => {
                    warn!(target: "dispatch::processor", "dequeue failed for {chat_id}: {e}");
                    return;
                }
            };
            if batch.is_empty() {
                return;
            }

            for msg in batch {
                if !self.process_one(chat_id, msg).await {
                    // Lock contention: message was re-enqueued, stop draining.
                    return;
                }
            }

            if iteration + 1 == self.mq_max_queue_iterations {
                self.iteration_cap_hits.fetch_add(1, Ordering::Relaxed);
                crate::metrics::inc_drain_iteration_cap_hit();
                warn!(target: "dispatch::processor", "hit drain iteration cap for chat {chat_id}");
            }
        }
    }

    /// Returns `false` if the drain should stop (lock contention observed).
    async fn process_one(&self, chat_id: &str, msg: PendingMessage) -> bool {
        if msg.is_chain_batch {
            if self.queue.check_and_clear_chain_skip_flag(chat_id, &msg.user_id).await.unwrap_or(false) {
                let text = format!("SKIP:{}", msg.batch_questions.join(", "));
                self.outbound.send_final(chat_id, msg.thread_id.clone(), &text).await;
                return true;
            }
            return self.run_under_lock(chat_id, msg, true).await;
        }

        let requires_write_lock = self
            .parser
            .parse(&msg.content)
            .map(|cmd| cmd.requires_write_lock())
            .unwrap_or(true);
        self.run_under_lock(chat_id, msg, requires_write_lock).await
    }

    async fn run_under_lock(&self, chat_id: &str, msg: PendingMessage, requires_write_lock: bool) -> bool {
        let executor = self.executor.clone();
        let thread_id = msg.thread_id.clone();

        let result = if requires_write_lock {
            self.lock_manager
                .with_lock(chat_id, "queue-processor", || self.run_executor(chat_id, msg.clone(), executor))
                .await
        } else {
            self.lock_manager
                .with_read_lock(chat_id, "queue-processor", || self.run_executor(chat_id, msg.clone(), executor))
                .await
        };

        match result {
            Ok(()) => true,
            Err(LockOutcomeError::Lock(_)) => {
                // No additional notification on re-enqueue, to avoid loops (spec.md §4.F).
                // Re-enqueue under the same replace-on-duplicate rule the original
                // dispatch decision used (spec.md §4.F) — a chain batch is never a
                // duplicate-replaceable command, otherwise it's whatever the parsed
                // command calls for (e.g. a contended Agree/Reject/Surrender still
                // replaces an older duplicate in the queue).
                let replace_on_duplicate = if msg.is_chain_batch {
                    false
                } else {
                    self.parser
                        .parse(&msg.content)
                        .map(|cmd| cmd.is_replace_on_duplicate())
                        .unwrap_or(false)
                };
                if let Err(e) = self.queue.enqueue(chat_id, msg, replace_on_duplicate).await {
                    warn!(target: "dispatch::processor", "failed to re-enqueue after lock contention on {chat_id}: {e}");
                }
                false
            }
            Err(LockOutcomeError::Inner(dispatch_err)) => {
                self.emit_error(chat_id, thread_id, dispatch_err).await;
                true
            }
        }
    }

    async fn run_executor(&self, chat_id: &str, msg: PendingMessage, executor: CommandExecutor) -> Result<(), DispatchError> {
        match self
            .lock_manager
            .with_processing_flag(chat_id, || executor(chat_id.to_string(), msg))
            .await
        {
            Ok(()) => Ok(()),
            Err(LockOutcomeError::Lock(e)) => Err(DispatchError::generic(e.to_string())),
            Err(LockOutcomeError::Inner(e)) => Err(e),
        }
    }

    async fn emit_error(&self, chat_id: &str, thread_id: Option<String>, err: DispatchError) {
        emit_dispatch_error(&self.outbound, chat_id, thread_id, err).await;
    }

    /// Count of drains that hit the iteration safety cap — exposed for
    /// `metrics::snapshot`.
    pub fn iteration_cap_hits(&self) -> u32 {
        self.iteration_cap_hits.load(Ordering::Relaxed)
    }
}
