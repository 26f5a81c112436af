//! Scenario E: an admin command from a blocked user still executes — admin
//! commands bypass access control, but not the lock or the queue.

mod support;

use std::sync::Arc;

use riddlebot_dispatch::collaborators::mock::{BlockListAccessControl, MockRiddleService};
use riddlebot_dispatch::collaborators::riddle::RiddleService;
use riddlebot_dispatch::command::OutboundKind;

use support::{build, inbound, HarnessConfig};

#[tokio::test]
async fn admin_force_end_runs_for_a_blocked_user() {
    let riddle = Arc::new(MockRiddleService::new());
    let access = Arc::new(BlockListAccessControl::new(vec!["blocked-user".to_string()]));
    let harness = build(riddle.clone(), access.clone(), HarnessConfig::default());

    // A normal command from the blocked user is denied with a block notice,
    // not executed.
    harness.service.dispatch(inbound("c1", "blocked-user", "/20q start")).await;
    let denial = harness.publisher.sent.lock().unwrap().clone();
    assert_eq!(denial.len(), 1);
    assert!(denial[0].text.contains("not allowed"), "got {:?}", denial[0].text);
    assert!(!riddle.has_session("c1").await, "the blocked start must never reach the riddle service");
    harness.publisher.clear();

    harness.service.dispatch(inbound("c1", "blocked-user", "/20q 관리자 강제종료")).await;

    let sent = harness.publisher.sent.lock().unwrap().clone();
    let finals: Vec<_> = sent.iter().filter(|m| m.kind == OutboundKind::Final).collect();
    assert_eq!(finals.len(), 1, "expected the admin force-end reply, got {sent:?}");
    assert_eq!(finals[0].text, "An administrator force-ended the game.");
}

#[tokio::test]
async fn non_admin_command_from_an_allowed_user_still_works() {
    let riddle = Arc::new(MockRiddleService::new());
    let access = Arc::new(BlockListAccessControl::new(vec!["blocked-user".to_string()]));
    let harness = build(riddle.clone(), access, HarnessConfig::default());

    harness.service.dispatch(inbound("c1", "regular-user", "/20q start")).await;

    let sent = harness.publisher.sent.lock().unwrap().clone();
    assert!(sent.iter().any(|m| m.kind == OutboundKind::Final), "expected a reply for the allowed user, got {sent:?}");
}
