//! Exactly-once alarm engine for timed trading signals.
//!
//! A [`Signal`](signal::Signal) names an asset, a direction and the instant
//! at which the user wants to be alerted. The [`engine`] polls the current
//! signal list once per second, fires each signal at most once (shifted
//! earlier by the configured antidelay), and keeps the alarm ringing until
//! the user dismisses it.

pub mod api;
pub mod api_client;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod keepalive;
pub mod registry;
pub mod signal;
pub mod store;
pub mod tracing;
pub mod trigger;
pub mod wake;
