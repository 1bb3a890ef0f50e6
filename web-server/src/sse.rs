//! Server-Sent Events push channel for async analysis runs.
//!
//! Every event of every run started through POST /api/analyze-async is
//! published here. The SSE event name is the event type and the data is the
//! JSON payload, always carrying `request_id`:
//! ```text
//! event: post_summary_ready
//! data: {"request_id":"...","type":"post_summary_ready","summary":{...}}
//! ```
//! A subscriber that only cares about one run passes `?request_id=...`. It
//! first receives the events that run already published, then live ones, and
//! the stream ends after the run's `analysis_complete` or `error` event.

use std::convert::Infallible;

use analysis_pipeline::RequestEvent;
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub request_id: Option<String>,
}

/// Encode one run event as an SSE frame.
pub fn to_sse_event(event: &RequestEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(data) => Some(Event::default().event(event.event.name()).data(data)),
        Err(e) => {
            tracing::warn!(request_id = %event.request_id, "Failed to encode event: {}", e);
            None
        }
    }
}

fn wanted(filter: Option<&str>, event: &RequestEvent) -> bool {
    filter.map_or(true, |id| id == event.request_id)
}

/// GET /api/events
pub async fn events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let filter = query.request_id;
    let (backlog, mut rx) = state.hub.subscribe(filter.as_deref());
    tracing::debug!(request_id = ?filter, replayed = backlog.len(), "Event subscriber connected");

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("connected")
            .data(r#"{"status":"Connected to Snooze server"}"#));

        let mut finished = false;
        for event in backlog {
            finished = event.event.is_terminal();
            if let Some(frame) = to_sse_event(&event) {
                yield Ok(frame);
            }
        }

        while !(finished && filter.is_some()) {
            match rx.recv().await {
                Ok(event) => {
                    if !wanted(filter.as_deref(), &event) {
                        continue;
                    }
                    finished = event.event.is_terminal();
                    if let Some(frame) = to_sse_event(&event) {
                        yield Ok(frame);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event subscriber lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
