//! # Middleware Stack
//!
//! - [`metrics`]: Prometheus request metrics and domain gauges.
//!
//! Request tracing uses `tower_http::trace::TraceLayer` directly in `lib.rs`
//! and authentication lives in [`crate::auth`].

pub mod metrics;
