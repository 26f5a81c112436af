//! Queue notifier (component E): a pure mapping from a [`PendingMessage`]
//! and an outcome code to an [`OutboundMessage`]. No state, no I/O — the
//! same "stateless factory of message variants" shape as meshbbs's
//! `ui::topics_page`/`ui::list_1_to_5` formatting helpers in `commands.rs`.

use crate::command::{OutboundKind, OutboundMessage, PendingMessage};
use crate::store::QueueDetails;

pub struct QueueNotifier;

impl QueueNotifier {
    pub fn new() -> Self {
        Self
    }

    /// Acknowledgment for a just-enqueued message: describes current queue
    /// occupancy (spec.md §4.F "Success" case).
    pub fn processing_start(&self, msg: &PendingMessage, details: QueueDetails) -> OutboundMessage {
        let text = format!(
            "{}, your message has been queued ({} of {} waiting).",
            msg.display_name(),
            details.size,
            details.queue_max
        );
        self.waiting(msg, text)
    }

    pub fn retry(&self, msg: &PendingMessage) -> OutboundMessage {
        self.waiting(msg, format!("{}, the bot is busy; your message will run shortly.", msg.display_name()))
    }

    pub fn duplicate(&self, msg: &PendingMessage) -> OutboundMessage {
        self.waiting(msg, format!("{}, you are already queued with this content.", msg.display_name()))
    }

    /// `Failed` and `Error` are both terminal (`Final`): spec.md §4.E.
    pub fn failed(&self, msg: &PendingMessage, reason: &str) -> OutboundMessage {
        self.final_message(msg, format!("{}, that could not be processed: {}", msg.display_name(), reason))
    }

    pub fn error(&self, msg: &PendingMessage, mapped_text: &str) -> OutboundMessage {
        self.final_message(msg, mapped_text.to_string())
    }

    fn waiting(&self, msg: &PendingMessage, text: String) -> OutboundMessage {
        OutboundMessage { chat_id: String::new(), thread_id: msg.thread_id.clone(), text, kind: OutboundKind::Waiting }
    }

    fn final_message(&self, msg: &PendingMessage, text: String) -> OutboundMessage {
        OutboundMessage { chat_id: String::new(), thread_id: msg.thread_id.clone(), text, kind: OutboundKind::Final }
    }
}

impl Default for QueueNotifier {
    fn default() -> Self {
        Self::new()
    }
}
