//! HTTP API for door detection.
//!
//! `detection_router()` returns a composable `Router`; `start_server_on()`
//! binds it and runs it on a background task.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use router::detection_router;
pub use server::{start_server_on, DetectionServer, ServerSession};
pub use types::ApiContext;
