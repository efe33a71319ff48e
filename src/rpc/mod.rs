//! Remote matchmaker RPC collaborator
//!
//! The coordinator only calls `get_player_queue_info`, during login
//! recovery. Queue and dequeue are issued by the player command surface.

pub mod amqp_client;

pub use amqp_client::AmqpMatchmakerClient;

use crate::error::{MatchmakingError, Result};
use crate::types::{PlayerId, Ticket};
use crate::utils::generate_correlation_id;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Outcome of a queue request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueResult {
    Success,
    AlreadyInQueue,
    NoPermission,
    InvalidMap,
    PartyTooLarge,
    InvalidGameMode,
    GameModeDisabled,
    #[serde(other)]
    Unknown,
}

impl QueueResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueResult::Success => "success",
            QueueResult::AlreadyInQueue => "already_in_queue",
            QueueResult::NoPermission => "no_permission",
            QueueResult::InvalidMap => "invalid_map",
            QueueResult::PartyTooLarge => "party_too_large",
            QueueResult::InvalidGameMode => "invalid_game_mode",
            QueueResult::GameModeDisabled => "game_mode_disabled",
            QueueResult::Unknown => "unknown",
        }
    }
}

/// Outcome of a dequeue request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DequeueResult {
    Success,
    NotInQueue,
    NoPermission,
    AlreadyMarkedForDequeue,
    #[serde(other)]
    Unknown,
}

impl DequeueResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            DequeueResult::Success => "success",
            DequeueResult::NotInQueue => "not_in_queue",
            DequeueResult::NoPermission => "no_permission",
            DequeueResult::AlreadyMarkedForDequeue => "already_marked_for_dequeue",
            DequeueResult::Unknown => "unknown",
        }
    }
}

/// Request body sent to the matchmaker's RPC queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum RpcRequest {
    GetPlayerQueueInfo { player_id: PlayerId },
    QueuePlayer { game_mode_id: String, player_id: PlayerId },
    DequeuePlayer { player_id: PlayerId },
}

/// Reply body published to the caller's reply queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RpcResponse {
    /// `ticket` is absent when the player is not queued
    QueueInfo { ticket: Option<Ticket> },
    Queue { result: QueueResult },
    Dequeue { result: DequeueResult },
    Error { message: String },
}

/// Calls into the remote matchmaker
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MatchmakerService: Send + Sync {
    /// The player's live ticket, or `None` when they are not queued
    async fn get_player_queue_info(&self, player_id: &str) -> Result<Option<Ticket>>;

    async fn queue_player(&self, game_mode_id: &str, player_id: &str) -> Result<QueueResult>;

    async fn dequeue_player(&self, player_id: &str) -> Result<DequeueResult>;
}

/// In-memory matchmaker used by tests and offline runs.
///
/// Queueing a player files a single-player ticket under a fresh id;
/// dequeueing removes it. Forced results and failures can be injected.
#[derive(Default)]
pub struct StaticMatchmakerService {
    tickets: RwLock<HashMap<PlayerId, Ticket>>,
    forced_queue_result: RwLock<Option<QueueResult>>,
    forced_dequeue_result: RwLock<Option<DequeueResult>>,
    failure: RwLock<Option<String>>,
}

impl StaticMatchmakerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// File `ticket` under every one of its players
    pub fn with_ticket(self, ticket: Ticket) -> Self {
        self.insert_ticket(ticket);
        self
    }

    pub fn insert_ticket(&self, ticket: Ticket) {
        if let Ok(mut tickets) = self.tickets.write() {
            for player_id in &ticket.player_ids {
                tickets.insert(player_id.clone(), ticket.clone());
            }
        }
    }

    pub fn ticket_for(&self, player_id: &str) -> Option<Ticket> {
        self.tickets.read().ok()?.get(player_id).cloned()
    }

    pub fn force_queue_result(&self, result: Option<QueueResult>) {
        if let Ok(mut forced) = self.forced_queue_result.write() {
            *forced = result;
        }
    }

    pub fn force_dequeue_result(&self, result: Option<DequeueResult>) {
        if let Ok(mut forced) = self.forced_dequeue_result.write() {
            *forced = result;
        }
    }

    /// Make every call fail with `message` until cleared with `None`
    pub fn fail_with(&self, message: Option<&str>) {
        if let Ok(mut failure) = self.failure.write() {
            *failure = message.map(str::to_string);
        }
    }

    fn check_failure(&self) -> Result<()> {
        let failure = self
            .failure
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("matchmaker failure"))?;
        match failure.as_ref() {
            Some(message) => Err(MatchmakingError::RpcFailed {
                message: message.clone(),
            }
            .into()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MatchmakerService for StaticMatchmakerService {
    async fn get_player_queue_info(&self, player_id: &str) -> Result<Option<Ticket>> {
        self.check_failure()?;
        Ok(self.ticket_for(player_id))
    }

    async fn queue_player(&self, game_mode_id: &str, player_id: &str) -> Result<QueueResult> {
        self.check_failure()?;

        let forced = *self
            .forced_queue_result
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("forced queue result"))?;
        if let Some(result) = forced {
            return Ok(result);
        }

        let mut tickets = self
            .tickets
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("matchmaker tickets"))?;
        if tickets.contains_key(player_id) {
            return Ok(QueueResult::AlreadyInQueue);
        }

        let ticket = Ticket::new(
            generate_correlation_id(),
            game_mode_id,
            vec![player_id.to_string()],
        );
        debug!("Filed ticket {} for '{}'", ticket.id, player_id);
        tickets.insert(player_id.to_string(), ticket);
        Ok(QueueResult::Success)
    }

    async fn dequeue_player(&self, player_id: &str) -> Result<DequeueResult> {
        self.check_failure()?;

        let forced = *self
            .forced_dequeue_result
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("forced dequeue result"))?;
        if let Some(result) = forced {
            return Ok(result);
        }

        let mut tickets = self
            .tickets
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("matchmaker tickets"))?;
        match tickets.remove(player_id) {
            Some(ticket) => {
                tickets.retain(|_, other| other.id != ticket.id);
                Ok(DequeueResult::Success)
            }
            None => Ok(DequeueResult::NotInQueue),
        }
    }
}
