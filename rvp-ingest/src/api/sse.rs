//! Server-Sent Events (SSE) for pipeline progress
//!
//! Streams every `PulseEvent`: run lifecycle, in-flight page sets, page
//! failures, scoring results and chart updates.

use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

/// GET /events
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    rvp_common::sse::create_event_sse_stream(&state.event_bus, "rvp-ingest")
}
