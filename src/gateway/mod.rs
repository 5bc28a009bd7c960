//! Seams towards the chat platform: who holds the player role, who moderates,
//! and where notices go.

pub mod directory;
pub mod notifier;

use std::collections::BTreeSet;

use futures::future::BoxFuture;

use crate::{
    dto::sse::Notice,
    state::{ScopeId, players::PlayerId},
};

/// Lists the members holding the player role in a scope.
pub trait MembershipSource: Send + Sync {
    /// Non-bot holders of `role` in `scope`, or `None` when the role does not exist there.
    fn list_role_holders(
        &self,
        scope: &ScopeId,
        role: &str,
    ) -> BoxFuture<'static, Option<BTreeSet<PlayerId>>>;
}

/// Decides whether a caller may run moderator-only commands.
pub trait Authorizer: Send + Sync {
    /// True when `caller` moderates `scope`.
    fn is_moderator(&self, caller: PlayerId, scope: &ScopeId) -> BoxFuture<'static, bool>;
}

/// Delivers notices to a scope. Delivery failures are the sink's concern.
pub trait NotificationSink: Send + Sync {
    /// Publish `notice` to everyone following `scope`.
    fn broadcast(&self, scope: &ScopeId, notice: Notice);
}
