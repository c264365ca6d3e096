//! Liveness/readiness tracking for the jobq runtime (C10, ambient).
//!
//! Deliberately embedder-ready rather than a standalone server: this crate
//! tracks readiness state only. Exposing it over HTTP is left to the
//! embedding application, which already owns its own HTTP surface and
//! health-endpoint conventions.

mod checker;

pub use checker::{HealthChecker, HealthStatus};
