//! Configuration management for the queue-keeper service
//!
//! This module handles service configuration loading from environment variables
//! and TOML files, plus the live game mode collection.

pub mod app;
pub mod game_mode;

// Re-export commonly used types
pub use app::{validate_config, AmqpSettings, AppConfig, ServiceSettings, SessionSettings};
pub use game_mode::{GameModeCollection, GameModeConfig, GameModeUpdate, PartyRestrictions};
