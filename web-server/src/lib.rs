//! HTTP surface for Snooze: synchronous and streaming analysis endpoints,
//! cache maintenance and health.

pub mod handlers;
pub mod hub;
pub mod server;
pub mod sse;

pub use hub::{EventHub, HubSink};
pub use server::{build_router, start_server, AppState};
