//! Push channel: registry changes as server-sent events.
//!
//! Each connection gets its own broadcast receiver. The stream opens with
//! the current table so a new observer never starts blank. A subscriber
//! that lags skips what it missed; closing the connection drops the
//! receiver and unsubscribes.

use std::convert::Infallible;

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Serialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

use mesh_registry::StatusEvent;

use crate::ApiState;

/// GET /events
pub async fn stream_events(
    State(state): State<ApiState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Subscribe first: nothing published after the snapshot is lost.
    let rx = state.registry.hub().subscribe();
    let snapshot = state.registry.snapshot_event().await;
    debug!(
        subscribers = state.registry.hub().subscriber_count(),
        "push channel subscriber connected"
    );

    let live = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(event) => Some(event),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(skipped, "push channel subscriber lagged");
            None
        }
    });
    let stream = tokio_stream::once(snapshot)
        .chain(live)
        .filter_map(|event| to_sse(&event));

    Sse::new(stream.map(Ok)).keep_alive(KeepAlive::default())
}

fn to_sse(event: &StatusEvent) -> Option<Event> {
    match Event::default().event(event.kind()).json_data(event) {
        Ok(sse) => Some(sse),
        Err(e) => {
            warn!(kind = event.kind(), error = %e, "failed to encode status event");
            None
        }
    }
}

#[derive(Serialize)]
pub struct SubscriberCount {
    pub subscribers: usize,
}

/// GET /events/subscribers
pub async fn subscriber_count(State(state): State<ApiState>) -> impl IntoResponse {
    Json(SubscriberCount {
        subscribers: state.registry.hub().subscriber_count(),
    })
}
