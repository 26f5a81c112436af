//! `AccessControl`: boolean denial check + reason tag (spec.md §6). Silent
//! denial emits nothing; a denial with a reason emits a personalized
//! error naming the user (spec.md §4.H step 2).

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// Denied, but the user should not be told (no message emitted).
    Silent,
    /// Denied with a user-visible reason; `UserBlocked` taxonomy kind.
    Blocked(String),
}

#[async_trait]
pub trait AccessControl: Send + Sync {
    /// `None` means allowed. `Some(reason)` means denied.
    async fn get_denial_reason(&self, user_id: &str, chat_id: &str) -> Option<DenialReason>;
}
