//! Metrics and monitoring for queue-keeper
//!
//! Prometheus collectors for sessions, bus events and login restores, and
//! the HTTP server that exposes them next to the health probes.

pub mod collector;
pub mod health;

pub use collector::{EventMetrics, MetricsCollector, ServiceMetrics, SessionMetrics};
pub use health::{HealthServer, HealthServerConfig, HealthServerState};
