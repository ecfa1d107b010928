//! HTTP API handlers for rvp-ingest
//!
//! REST control surface for the pipeline plus an SSE progress stream.

pub mod charts;
pub mod health;
pub mod pipeline;
pub mod sse;

pub use charts::chart_routes;
pub use health::health_routes;
pub use pipeline::pipeline_routes;
pub use sse::event_stream;
