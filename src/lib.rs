//! Queue Keeper - matchmaking session coordinator
//!
//! This crate keeps every locally connected player's matchmaking status in
//! step with a remote matchmaker service. It observes ticket and pending-match
//! events from an AMQP bus, caches the relevant tickets, and maintains one
//! matchmaking session per online player.

pub mod amqp;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod messaging;
pub mod metrics;
pub mod player;
pub mod rpc;
pub mod service;
pub mod session;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{MatchmakingError, Result};
pub use types::*;

// Re-export key components
pub use commands::QueueCommands;
pub use config::{GameModeCollection, GameModeConfig};
pub use coordinator::{
    CoordinatorStats, ProjectionStore, RestoreOutcome, SessionCoordinator, SessionState,
};
pub use messaging::MessagingHub;
pub use player::{InMemoryPlayerRegistry, LocalPlayer, Notice, PlayerHandle, PlayerRegistry};
pub use rpc::MatchmakerService;
pub use session::{DefaultSession, DeleteReason, MatchmakingSession, SessionFactory};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
