//! Error types for the session coordinator
//!
//! Typed errors are defined with thiserror and carried through anyhow so that
//! call sites can attach context without losing the variant.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific coordination scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("AMQP connection failed: {message}")]
    AmqpConnectionFailed { message: String },

    #[error("Invalid message: {reason}")]
    InvalidMessage { reason: String },

    #[error("Matchmaker RPC failed: {message}")]
    RpcFailed { message: String },

    #[error("Matchmaker RPC timed out after {timeout_ms}ms")]
    RpcTimeout { timeout_ms: u64 },

    #[error("Game mode not found: {game_mode_id}")]
    GameModeNotFound { game_mode_id: String },

    #[error("Player not found: {player_id}")]
    PlayerNotFound { player_id: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl MatchmakingError {
    /// Shorthand for the poisoned-lock case that every shared map can hit
    pub fn lock_poisoned(what: &str) -> Self {
        MatchmakingError::InternalError {
            message: format!("Failed to acquire {} lock", what),
        }
    }
}
