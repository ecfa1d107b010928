//! # ReviewPulse Common Library
//!
//! Shared code for the ReviewPulse crates including:
//! - Error type
//! - Configuration loading (TOML bootstrap, path resolution)
//! - Event types (PulseEvent enum) and the EventBus
//! - SSE helpers

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
