//! Scenario A: a fast `Ask` resolves well under the delayed-waiting
//! threshold, so no `Waiting` message is shown — only the `Final` reply.

mod support;

use std::sync::Arc;

use riddlebot_dispatch::collaborators::mock::{AllowAllAccessControl, MockRiddleService};
use riddlebot_dispatch::command::OutboundKind;

use support::{build, inbound, HarnessConfig};

#[tokio::test]
async fn fast_ask_shows_no_waiting_message() {
    let riddle = Arc::new(MockRiddleService::new());
    let harness = build(
        riddle,
        Arc::new(AllowAllAccessControl),
        HarnessConfig { delayed_waiting_ms: 500, ..Default::default() },
    );

    harness.service.dispatch(inbound("c1", "u1", "/20q start")).await;
    harness.publisher.clear();

    harness.service.dispatch(inbound("c1", "u1", "/20q is it alive")).await;

    let sent = harness.publisher.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1, "expected exactly one reply, got {sent:?}");
    assert_eq!(sent[0].kind, OutboundKind::Final);
    assert_eq!(sent[0].text, "OK");
}
