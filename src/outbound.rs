//! Outbound chunker & sender (component D).
//!
//! `chunk_by_lines` implements spec.md §4.D exactly: rune-based (char-based,
//! not byte-based) greedy line packing. Getting this rune-vs-byte distinction
//! right matters for any multi-byte text (the Korean command surface this
//! bot speaks included) — a byte-indexed truncation could split a code
//! point. `OutboundSender` wraps the packed chunks with the Waiting/Final
//! typing rule and delegates the actual publish to an injected `Publisher`
//! collaborator, the same "narrow injected function" shape as meshbbs's
//! `MeshtasticConnection::send_text` boundary.

use async_trait::async_trait;
use log::warn;

use crate::command::{OutboundKind, OutboundMessage};

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, message: OutboundMessage) -> anyhow::Result<()>;
}

/// Greedy line-packing into `max_len`-rune-bounded chunks (spec.md §4.D).
///
/// `max_len <= 0` returns the input unchanged as a single chunk; a
/// pure-whitespace/newline-only input returns zero chunks.
pub fn chunk_by_lines(text: &str, max_len: i64) -> Vec<String> {
    if max_len <= 0 {
        return vec![text.to_string()];
    }
    if text.trim().is_empty() {
        return Vec::new();
    }
    let max_len = max_len as usize;

    let mut chunks = Vec::new();
    let mut current_lines: Vec<String> = Vec::new();
    let mut current_len = 0usize;

    for raw_line in text.split('\n') {
        let line = truncate_runes(raw_line, max_len);
        let line_len = line.chars().count();
        let separator_len = if current_lines.is_empty() { 0 } else { 1 };

        if current_len + separator_len + line_len <= max_len {
            current_len += separator_len + line_len;
            current_lines.push(line);
        } else {
            if !current_lines.is_empty() {
                chunks.push(current_lines.join("\n"));
            }
            current_len = line_len;
            current_lines = vec![line];
        }
    }

    if !current_lines.is_empty() {
        chunks.push(current_lines.join("\n"));
    }

    chunks
}

/// Truncate `s` to at most `max_len` runes, guaranteeing the cut lands on a
/// code point boundary (never splitting a multi-byte character).
fn truncate_runes(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    s.chars().take(max_len).collect()
}

pub struct OutboundSender<P: Publisher> {
    publisher: P,
    max_chunk_len: i64,
}

impl<P: Publisher> OutboundSender<P> {
    pub fn new(publisher: P, max_chunk_len: i64) -> Self {
        Self { publisher, max_chunk_len }
    }

    /// Chunks `text` and publishes all-but-last as `Waiting`, last as
    /// `Final`. Zero chunks still produce one empty `Final` so every inbound
    /// gets a terminal reply (spec.md §4.D, testable property 2).
    pub async fn send_final(&self, chat_id: &str, thread_id: Option<String>, text: &str) {
        let chunks = chunk_by_lines(text, self.max_chunk_len);
        if chunks.is_empty() {
            crate::metrics::inc_chunks_emitted(1);
            self.publish(chat_id, thread_id, String::new(), OutboundKind::Final).await;
            return;
        }
        crate::metrics::inc_chunks_emitted(chunks.len() as u64);
        let last = chunks.len() - 1;
        for (i, chunk) in chunks.into_iter().enumerate() {
            let kind = if i == last { OutboundKind::Final } else { OutboundKind::Waiting };
            self.publish(chat_id, thread_id.clone(), chunk, kind).await;
        }
    }

    pub async fn send_waiting(&self, chat_id: &str, thread_id: Option<String>, waiting_text: &str) {
        self.publish(chat_id, thread_id, waiting_text.to_string(), OutboundKind::Waiting).await;
    }

    /// Game errors are emitted as `Final` to suppress transport-level error
    /// decoration (spec.md §4.D "Error semantics").
    pub async fn send_error(&self, chat_id: &str, thread_id: Option<String>, text: &str) {
        self.publish(chat_id, thread_id, text.to_string(), OutboundKind::Final).await;
    }

    /// Lock-contention hints are the one case emitted as `type = Error`.
    pub async fn send_lock_error(&self, chat_id: &str, thread_id: Option<String>, text: &str) {
        self.publish(chat_id, thread_id, text.to_string(), OutboundKind::Error).await;
    }

    async fn publish(&self, chat_id: &str, thread_id: Option<String>, text: String, kind: OutboundKind) {
        let message = OutboundMessage { chat_id: chat_id.to_string(), thread_id, text, kind };
        if let Err(e) = self.publisher.publish(message).await {
            warn!(target: "dispatch::outbound", "publish failed for chat {chat_id}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, message: OutboundMessage) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    #[test]
    fn round_trip_when_everything_fits() {
        let chunks = chunk_by_lines("line one\nline two", 900);
        assert_eq!(chunks, vec!["line one\nline two".to_string()]);
    }

    #[test]
    fn splits_when_a_line_does_not_fit() {
        let chunks = chunk_by_lines("aaaa\nbbbb", 6);
        assert_eq!(chunks, vec!["aaaa".to_string(), "bbbb".to_string()]);
    }

    #[test]
    fn truncates_an_overlong_single_line_on_rune_boundary() {
        let text = "\u{c548}\u{b155}\u{d558}\u{c138}\u{c694}"; // 5-char Korean greeting
        let chunks = chunk_by_lines(text, 3);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chars().count(), 3);
    }

    #[test]
    fn non_positive_max_len_returns_input_unchanged() {
        let chunks = chunk_by_lines("anything at all", 0);
        assert_eq!(chunks, vec!["anything at all".to_string()]);
    }

    #[test]
    fn round_trip_preserves_interior_blank_lines() {
        let chunks = chunk_by_lines("para one\n\npara two", 900);
        assert_eq!(chunks, vec!["para one\n\npara two".to_string()]);
    }

    #[test]
    fn whitespace_only_input_yields_zero_chunks() {
        let chunks = chunk_by_lines("   \n\n   \n", 900);
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn zero_chunks_still_emit_one_empty_final() {
        let sender = OutboundSender::new(RecordingPublisher::default(), 900);
        sender.send_final("c1", None, "\n\n  \n").await;
        let sent = sender.publisher.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, OutboundKind::Final);
        assert_eq!(sent[0].text, "");
    }

    #[tokio::test]
    async fn multiple_chunks_tag_all_but_last_as_waiting() {
        let sender = OutboundSender::new(RecordingPublisher::default(), 6);
        sender.send_final("c1", None, "aaaa\nbbbb\ncccc").await;
        let sent = sender.publisher.sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].kind, OutboundKind::Waiting);
        assert_eq!(sent[1].kind, OutboundKind::Waiting);
        assert_eq!(sent[2].kind, OutboundKind::Final);
    }
}
