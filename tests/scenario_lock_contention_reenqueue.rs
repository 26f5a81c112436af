//! Scenario F: another dispatcher instance already holds the write lock when
//! a command arrives. The losing dispatch defers silently (no user-visible
//! error — just a queue acknowledgment) by re-enqueueing, and stops its own
//! drain. Once the lock is free, the next drain executes the deferred
//! command exactly once.

mod support;

use std::sync::Arc;

use riddlebot_dispatch::collaborators::mock::{AllowAllAccessControl, MockRiddleService};
use riddlebot_dispatch::collaborators::riddle::RiddleService;
use riddlebot_dispatch::command::OutboundKind;
use riddlebot_dispatch::store::SharedStore;

use support::{build, inbound, HarnessConfig};

#[tokio::test]
async fn deferred_command_runs_exactly_once_after_the_competing_lock_is_released() {
    let riddle = Arc::new(MockRiddleService::new());
    let harness = build(
        riddle.clone(),
        Arc::new(AllowAllAccessControl),
        HarnessConfig { acquire_timeout_ms: 50, write_lock_ttl_ms: 10_000, ..Default::default() },
    );

    // Simulate a second dispatcher instance already holding the chat's write
    // lock (e.g. mid-Start on another process).
    harness.store.try_acquire_write_lock("c1", "other-dispatcher", 10_000).await.unwrap();

    harness.service.dispatch(inbound("c1", "u1", "/20q start")).await;

    // The contended dispatch never ran Start; it was deferred into the queue
    // with no user-visible error.
    assert!(!riddle.has_session("c1").await);
    assert!(harness.queue.has_pending("c1").await.unwrap(), "the deferred Start must remain queued");
    let sent_while_contended = harness.publisher.sent.lock().unwrap().clone();
    assert!(
        sent_while_contended.iter().all(|m| m.kind != OutboundKind::Error),
        "lock contention during initial dispatch must not surface as a user error, got {sent_while_contended:?}"
    );
    harness.publisher.clear();

    // The competing dispatcher releases the lock; any subsequent activity on
    // the chat (here, a ModelInfo query, which needs no existing session)
    // should now drain the deferred Start.
    harness.store.release_write_lock("c1", "other-dispatcher").await.unwrap();
    harness.service.dispatch(inbound("c1", "u1", "/20q 모델")).await;

    assert!(riddle.has_session("c1").await, "the deferred Start must have run once the lock was free");
    assert!(!harness.queue.has_pending("c1").await.unwrap());

    let sent = harness.publisher.sent.lock().unwrap().clone();
    let finals: Vec<_> = sent.iter().filter(|m| m.kind == OutboundKind::Final).collect();
    assert_eq!(finals.len(), 2, "expected the drained Start reply plus the model-info reply, got {sent:?}");
    assert_eq!(finals[0].text, "A new riddle has begun.");
}
