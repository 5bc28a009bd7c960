use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::{
    dto::sse::{Handshake, ServerEvent},
    state::{ScopeId, SharedState},
};

/// Subscribe to the notices of every scope, or of `scope` only.
pub fn subscribe(state: &SharedState, scope: Option<ScopeId>) -> ScopedReceiver {
    ScopedReceiver {
        receiver: state.sse().subscribe(),
        scope,
    }
}

/// Broadcast receiver paired with the scope it is filtered on.
pub struct ScopedReceiver {
    receiver: broadcast::Receiver<ServerEvent>,
    scope: Option<ScopeId>,
}

impl ScopedReceiver {
    fn accepts(&self, event: &ServerEvent) -> bool {
        match (&self.scope, &event.scope) {
            (None, _) => true,
            (Some(wanted), Some(scope)) => wanted == scope,
            (Some(_), None) => false,
        }
    }
}

/// Convert a subscription into an SSE response, opening with a handshake and
/// forwarding matching events until the client disconnects.
pub fn to_sse_stream(
    mut subscription: ScopedReceiver,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        if let Some(handshake) = handshake_event(subscription.scope.clone()) {
            if tx.send(Ok(handshake)).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = subscription.receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if !subscription.accepts(&payload) {
                                continue;
                            }

                            let mut event = Event::default().data(payload.data);
                            if let Some(name) = payload.event {
                                event = event.event(name);
                            }

                            if tx.send(Ok(event)).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(skipped, "SSE subscriber lagged behind");
                            continue;
                        }
                    }
                }
            }
        }

        match subscription.scope {
            Some(scope) => info!(%scope, "scope SSE stream disconnected"),
            None => info!("SSE stream disconnected"),
        }
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn handshake_event(scope: Option<ScopeId>) -> Option<Event> {
    let message = match &scope {
        Some(scope) => format!("subscribed to notices of scope `{scope}`"),
        None => "subscribed to notices of every scope".to_string(),
    };
    let data = serde_json::to_string(&Handshake { scope, message }).ok()?;
    Some(Event::default().event("handshake").data(data))
}
