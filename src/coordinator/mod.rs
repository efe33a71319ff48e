//! Session coordination
//!
//! The [`SessionCoordinator`] owns the [`ProjectionStore`] and the session
//! registry, and is the only component that writes to either.

pub mod manager;
pub mod store;

pub use manager::{CoordinatorStats, RestoreOutcome, SessionCoordinator, SessionState};
pub use store::ProjectionStore;
