//! Scenario C: a conditional chained question whose first answer is
//! negative sets the chain-skip flag and appends a skip notice to the
//! synchronous reply; the queued remainder is discarded without calling the
//! riddle service again.

mod support;

use std::sync::Arc;

use riddlebot_dispatch::collaborators::mock::{AllowAllAccessControl, MockRiddleService};
use riddlebot_dispatch::collaborators::riddle::{AnswerScale, RiddleService};
use riddlebot_dispatch::command::OutboundKind;

use support::{build, inbound, HarnessConfig};

#[tokio::test]
async fn if_true_chain_with_negative_first_answer_skips_remainder() {
    let riddle = Arc::new(MockRiddleService::new());
    let harness = build(riddle.clone(), Arc::new(AllowAllAccessControl), HarnessConfig::default());

    harness.service.dispatch(inbound("c1", "u1", "/20q start")).await;
    harness.publisher.clear();

    riddle.set_next_scale("c1", AnswerScale::AlwaysNo);
    harness.service.dispatch(inbound("c1", "u1", "/20q if is it a person, is it a job")).await;

    let sent = harness.publisher.sent.lock().unwrap().clone();
    let finals: Vec<_> = sent.iter().filter(|m| m.kind == OutboundKind::Final).collect();
    assert_eq!(finals.len(), 2, "expected q1's reply plus the drain's own skip notice, got {sent:?}");
    assert!(finals[0].text.contains("OK"));
    assert!(finals[0].text.contains("SKIP:is it a job"), "got {:?}", finals[0].text);
    assert_eq!(finals[1].text, "SKIP:is it a job");

    // The batch drain already consumed the flag, so a fresh check finds it cleared.
    assert!(!harness.queue.check_and_clear_chain_skip_flag("c1", "u1").await.unwrap());

    let status = riddle.status_separated_with_count("c1").await.unwrap();
    assert_eq!(status.question_count, 1, "the skipped remainder must never reach the riddle service");
}
