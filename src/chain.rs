//! Chained-question handler (component G): the multi-question batch state
//! machine and skip protocol described in spec.md §4.G. q1 always runs
//! synchronously under the caller's lock (see [`ChainHandler::handle_first`]);
//! q2..qN are handed off through the pending queue as a single chain-batch
//! `PendingMessage` and later drained by the queue processor under a fresh
//! lock (see [`ChainHandler::process_batch`]).

use std::sync::Arc;

use log::{info, warn};

use crate::collaborators::riddle::RiddleService;
use crate::command::{ChainCondition, InboundMessage, PendingMessage, Question};
use crate::queue::PendingQueue;

pub struct ChainOutcome {
    /// Text to send as the synchronous reply to q1 (includes the skip
    /// notice appended when the chain does not continue).
    pub reply_text: String,
    /// Acknowledgment text for the queued remainder, sent as `Waiting`.
    /// `None` when there were no remaining questions to queue.
    pub queued_notice: Option<String>,
}

pub struct ChainHandler {
    riddle: Arc<dyn RiddleService>,
    queue: Arc<PendingQueue>,
}

impl ChainHandler {
    pub fn new(riddle: Arc<dyn RiddleService>, queue: Arc<PendingQueue>) -> Self {
        Self { riddle, queue }
    }

    /// Runs q1 and, if there is a remainder, enqueues it as a chain batch.
    /// Always called under the current (already-held) lock.
    pub async fn handle_first(
        &self,
        inbound: &InboundMessage,
        questions: &[Question],
        condition: ChainCondition,
    ) -> ChainOutcome {
        let remaining: Vec<Question> = questions[1..].to_vec();

        let queued_notice = if !remaining.is_empty() {
            let batch = PendingMessage::chain_batch(inbound, remaining.clone());
            match self.queue.enqueue(&inbound.chat_id, batch, false).await {
                Ok(_) => Some(format!("Queued the remaining questions: {}", remaining.join(", "))),
                Err(e) => {
                    // Enqueue failure is logged but does not abort q1 (spec.md §4.G).
                    warn!(target: "dispatch::chain", "failed to enqueue chain batch for {}: {e}", inbound.chat_id);
                    None
                }
            }
        } else {
            None
        };

        let q1 = &questions[0];
        let outcome = self
            .riddle
            .answer_with_outcome(&inbound.chat_id, &inbound.user_id, inbound.sender.as_deref(), q1, false)
            .await;

        let mut reply_text = match &outcome {
            Ok(o) => o.message.clone(),
            Err(e) => e.to_string(),
        };

        if !remaining.is_empty() {
            let should_continue = match condition {
                ChainCondition::Always => true,
                ChainCondition::IfTrue => outcome.map(|o| o.scale.is_affirmative()).unwrap_or(false),
            };
            if !should_continue {
                if let Err(e) = self.queue.set_chain_skip_flag(&inbound.chat_id, &inbound.user_id).await {
                    warn!(target: "dispatch::chain", "failed to set chain skip flag: {e}");
                }
                reply_text.push_str(&format!("\n\nSKIP:{}", remaining.join(", ")));
            }
        }

        ChainOutcome { reply_text, queued_notice }
    }

    /// Drains a previously-queued chain batch, under a fresh lock. Returns
    /// the final reply text.
    pub async fn process_batch(&self, chat_id: &str, user_id: &str, batch_questions: &[Question]) -> String {
        if self.queue.check_and_clear_chain_skip_flag(chat_id, user_id).await.unwrap_or(false) {
            return format!("SKIP:{}", batch_questions.join(", "));
        }

        for question in batch_questions {
            if let Err(e) = self.riddle.answer_with_outcome(chat_id, user_id, None, question, true).await {
                // Individual failures are logged; the batch does not abort (spec.md §4.G).
                warn!(target: "dispatch::chain", "chain batch question failed for {chat_id}: {e}");
            }
        }

        match self.riddle.status_separated_with_count(chat_id).await {
            Ok(status) => {
                info!(target: "dispatch::chain", "chain batch complete for {chat_id}, {} questions asked", status.question_count);
                match status.hint {
                    Some(hint) => format!("{}\n\n{}", status.main, hint),
                    None => status.main,
                }
            }
            Err(_) => "The game session is no longer active.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::mock::MockRiddleService;
    use crate::collaborators::riddle::AnswerScale;
    use crate::store::memory_store::MemoryStore;

    fn inbound(chat: &str, user: &str, content: &str) -> InboundMessage {
        InboundMessage { chat_id: chat.to_string(), user_id: user.to_string(), sender: None, thread_id: None, content: content.to_string() }
    }

    fn handler(riddle: Arc<MockRiddleService>) -> ChainHandler {
        let queue = Arc::new(PendingQueue::new(Arc::new(MemoryStore::new()), 10, 60_000, 120_000));
        ChainHandler::new(riddle, queue)
    }

    #[tokio::test]
    async fn if_true_chain_skips_when_first_answer_is_negative() {
        let riddle = Arc::new(MockRiddleService::new());
        riddle.start("c1", "u1", &[]).await.unwrap();
        riddle.set_next_scale("c1", AnswerScale::AlwaysNo);
        let h = handler(riddle);

        let inbound = inbound("c1", "u1", "if q1, q2");
        let outcome = h
            .handle_first(&inbound, &["q1".to_string(), "q2".to_string()], ChainCondition::IfTrue)
            .await;

        assert!(outcome.reply_text.contains("SKIP:q2"));
        assert!(outcome.queued_notice.is_some());
    }

    #[tokio::test]
    async fn always_chain_continues_regardless_of_scale() {
        let riddle = Arc::new(MockRiddleService::new());
        riddle.start("c1", "u1", &[]).await.unwrap();
        riddle.set_next_scale("c1", AnswerScale::AlwaysNo);
        let h = handler(riddle);

        let inbound = inbound("c1", "u1", "q1, q2");
        let outcome = h
            .handle_first(&inbound, &["q1".to_string(), "q2".to_string()], ChainCondition::Always)
            .await;

        assert!(!outcome.reply_text.contains("SKIP"));
    }

    #[tokio::test]
    async fn process_batch_honors_skip_flag_without_calling_riddle_service() {
        let riddle = Arc::new(MockRiddleService::new());
        let queue = Arc::new(PendingQueue::new(Arc::new(MemoryStore::new()), 10, 60_000, 120_000));
        queue.set_chain_skip_flag("c1", "u1").await.unwrap();
        let h = ChainHandler::new(riddle, queue);

        let reply = h.process_batch("c1", "u1", &["q1".to_string(), "q2".to_string()]).await;
        assert_eq!(reply, "SKIP:q1, q2");
    }
}
