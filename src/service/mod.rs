//! Service layer for queue-keeper
//!
//! Application state, health checks, the host integration HTTP routes and
//! background task management for the daemon.

pub mod app;
pub mod health;
pub mod http;

pub use app::{AppState, QueueKeeperService, ServiceError};
pub use health::{HealthCheck, HealthStatus};
