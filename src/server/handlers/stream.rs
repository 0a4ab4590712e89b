//! Server-sent event stream of log events.
//!
//! Each event is sent as a JSON `data:` line. When nothing is published for
//! a heartbeat interval a comment line is sent instead, which keeps idle
//! connections open through proxies.

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::{self, Stream};
use tracing::{debug, warn};

use super::super::AppState;
use crate::events::Delivery;

pub async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.control.events().subscribe();
    let heartbeat = state.heartbeat;
    debug!("Event stream client connected");

    let events = stream::unfold(subscription, move |mut subscription| async move {
        let event = match subscription.poll(heartbeat).await? {
            Delivery::Event(log_event) => {
                Event::default().json_data(&log_event).unwrap_or_else(|e| {
                    warn!("Could not serialize event: {}", e);
                    Event::default().comment("dropped")
                })
            }
            Delivery::Heartbeat => Event::default().comment("heartbeat"),
        };
        Some((Ok(event), subscription))
    });

    Sse::new(events)
}
