//! HTTP control API.
//!
//! Mirrors what a UI needs from the engine: the alarm state, the dismiss
//! button, the antidelay setting and the signal list. Handlers talk to the
//! engine through its [`EngineHandle`](crate::engine::EngineHandle) and to
//! storage through the [`SignalSource`](crate::store::SignalSource).

mod server;
mod v0;

pub use server::{SharedState, router, serve};
