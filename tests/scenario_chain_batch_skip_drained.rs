//! Scenario D: a chain batch is sitting in the pending queue, its skip flag
//! already set (e.g. left over from a prior synchronous `q1` that decided
//! not to continue). Draining it must produce a single `Final` with text
//! `SKIP:<questions>` and must never call the riddle service again.

mod support;

use std::sync::Arc;

use riddlebot_dispatch::collaborators::mock::{AllowAllAccessControl, MockRiddleService};
use riddlebot_dispatch::collaborators::riddle::RiddleService;
use riddlebot_dispatch::command::{InboundMessage, OutboundKind, PendingMessage};

use support::{build, inbound, HarnessConfig};

#[tokio::test]
async fn chain_batch_with_skip_flag_set_is_drained_without_touching_riddle_service() {
    let riddle = Arc::new(MockRiddleService::new());
    let harness = build(riddle.clone(), Arc::new(AllowAllAccessControl), HarnessConfig::default());

    harness.service.dispatch(inbound("c1", "u1", "/20q start")).await;
    harness.publisher.clear();

    let batch_inbound: InboundMessage = inbound("c1", "u1", "if q1, q2, q3");
    let batch = PendingMessage::chain_batch(&batch_inbound, vec!["q2".to_string(), "q3".to_string()]);
    harness.queue.enqueue("c1", batch, false).await.unwrap();
    harness.queue.set_chain_skip_flag("c1", "u1").await.unwrap();

    // Any dispatch on the chat triggers the processor's drain of the pending
    // queue; use a second, unrelated inbound to trigger it rather than
    // reaching into the processor directly.
    harness.service.dispatch(inbound("c1", "u1", "/20q 상태")).await;

    let sent = harness.publisher.sent.lock().unwrap().clone();
    let finals: Vec<_> = sent.iter().filter(|m| m.kind == OutboundKind::Final).collect();
    assert_eq!(finals.len(), 2, "expected the batch's own skip notice plus the status reply, got {sent:?}");
    assert_eq!(finals[0].text, "SKIP:q2, q3");

    let status = riddle.status_separated_with_count("c1").await.unwrap();
    assert_eq!(status.question_count, 0, "q2/q3 must never reach the riddle service once skipped");
}
