//! API server implementation
//!
//! Exposes liveness, status and the external re-trigger hook.

pub mod handlers;
pub mod routes;
pub mod server;

pub use server::{ApiServer, AppState};
