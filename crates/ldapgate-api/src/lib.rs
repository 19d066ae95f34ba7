//! HTTP surface for Ldapgate
//!
//! A small axum service exposing the Basic-Auth protected `/whoami`
//! endpoint, capability discovery, heartbeats and Prometheus metrics.

pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod server;

pub use metrics::MetricsRecorder;
pub use middleware::AuthenticatedUser;
pub use server::{create_router, AppState, GateServer};
