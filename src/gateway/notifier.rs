use tracing::{debug, warn};

use crate::{
    dto::sse::{Notice, ServerEvent},
    gateway::NotificationSink,
    state::{ScopeId, SseHub},
};

/// Notification sink publishing notices as JSON events on the SSE hub.
#[derive(Clone)]
pub struct SseNotifier {
    hub: SseHub,
}

impl SseNotifier {
    /// Publish on `hub`.
    pub fn new(hub: SseHub) -> Self {
        Self { hub }
    }
}

impl NotificationSink for SseNotifier {
    fn broadcast(&self, scope: &ScopeId, notice: Notice) {
        let name = notice.event_name();
        match ServerEvent::json(Some(scope.clone()), name.to_string(), &notice) {
            Ok(event) => {
                debug!(%scope, event = name, "publishing notice");
                self.hub.broadcast(event);
            }
            Err(err) => warn!(%scope, event = name, error = %err, "failed to serialise notice"),
        }
    }
}
