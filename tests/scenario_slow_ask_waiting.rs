//! Scenario B: a slow `Ask` exceeds the delayed-waiting threshold, so the
//! waiting message is shown before the final reply.

mod support;

use std::sync::Arc;
use std::time::Duration;

use riddlebot_dispatch::collaborators::mock::{AllowAllAccessControl, MockRiddleService};
use riddlebot_dispatch::command::OutboundKind;

use support::{build, inbound, DelayedAnswerRiddleService, HarnessConfig};

#[tokio::test]
async fn slow_ask_shows_waiting_then_final() {
    let inner = MockRiddleService::new();
    let riddle = Arc::new(DelayedAnswerRiddleService::new(inner, Duration::from_millis(50)));
    let harness = build(
        riddle,
        Arc::new(AllowAllAccessControl),
        HarnessConfig { delayed_waiting_ms: 10, ..Default::default() },
    );

    harness.service.dispatch(inbound("c1", "u1", "/20q start")).await;
    harness.publisher.clear();

    harness.service.dispatch(inbound("c1", "u1", "/20q is it alive")).await;

    let sent = harness.publisher.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 2, "expected a waiting message then a final, got {sent:?}");
    assert_eq!(sent[0].kind, OutboundKind::Waiting);
    assert_eq!(sent[1].kind, OutboundKind::Final);
    assert_eq!(sent[1].text, "OK");
}
