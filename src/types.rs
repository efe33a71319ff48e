//! Common types shared by the coordinator, the bus codec and the RPC client

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for players
pub type PlayerId = String;

/// Unique identifier for tickets
pub type TicketId = String;

/// Unique identifier for pending and finalized matches
pub type MatchId = String;

/// One matchmaking request, covering a whole party
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub game_mode_id: String,
    /// Party members, in the order the matchmaker reports them
    pub player_ids: Vec<PlayerId>,
    #[serde(default = "crate::utils::current_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    pub fn new(
        id: impl Into<TicketId>,
        game_mode_id: impl Into<String>,
        player_ids: Vec<PlayerId>,
    ) -> Self {
        Self {
            id: id.into(),
            game_mode_id: game_mode_id.into(),
            player_ids,
            created_at: crate::utils::current_timestamp(),
        }
    }

    pub fn has_player(&self, player_id: &str) -> bool {
        self.player_ids.iter().any(|id| id == player_id)
    }
}

/// A match tentatively formed from one or more tickets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMatch {
    pub id: MatchId,
    pub game_mode_id: String,
    pub ticket_ids: Vec<TicketId>,
    /// Instant at which the players are due to be sent to the match
    pub teleport_time: DateTime<Utc>,
}

impl PendingMatch {
    pub fn references_ticket(&self, ticket_id: &str) -> bool {
        self.ticket_ids.iter().any(|id| id == ticket_id)
    }
}

/// A finalized match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub game_mode_id: String,
    pub tickets: Vec<Ticket>,
}

impl Match {
    /// Every player in every ticket of the match
    pub fn player_ids(&self) -> impl Iterator<Item = &PlayerId> {
        self.tickets.iter().flat_map(|ticket| ticket.player_ids.iter())
    }
}

/// Why the matchmaker deleted a ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketDeleteReason {
    MatchCreated,
    ManualDequeue,
    GameModeDeleted,
    #[serde(other)]
    Unknown,
}

/// Why the matchmaker deleted a pending match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PendingMatchDeleteReason {
    /// The pending match was finalized; `MatchCreated` carries the teardown
    MatchCreated,
    /// A ticket in the pending match was deleted before it was finalized
    TicketDeleted,
    #[serde(other)]
    Unknown,
}

/// Bus message types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketCreated {
    pub ticket: Ticket,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketUpdated {
    pub old_ticket: Ticket,
    pub new_ticket: Ticket,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketDeleted {
    pub ticket: Ticket,
    pub reason: TicketDeleteReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMatchCreated {
    pub pending_match: PendingMatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMatchUpdated {
    pub pending_match: PendingMatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMatchDeleted {
    pub pending_match: PendingMatch,
    pub reason: PendingMatchDeleteReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCreated {
    #[serde(rename = "match")]
    pub created_match: Match,
}

/// Union type for all matchmaker bus messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MatchmakerMessage {
    TicketCreated(TicketCreated),
    TicketUpdated(TicketUpdated),
    TicketDeleted(TicketDeleted),
    PendingMatchCreated(PendingMatchCreated),
    PendingMatchUpdated(PendingMatchUpdated),
    PendingMatchDeleted(PendingMatchDeleted),
    MatchCreated(MatchCreated),
}

impl MatchmakerMessage {
    /// Short label used in logs and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            MatchmakerMessage::TicketCreated(_) => "ticket_created",
            MatchmakerMessage::TicketUpdated(_) => "ticket_updated",
            MatchmakerMessage::TicketDeleted(_) => "ticket_deleted",
            MatchmakerMessage::PendingMatchCreated(_) => "pending_match_created",
            MatchmakerMessage::PendingMatchUpdated(_) => "pending_match_updated",
            MatchmakerMessage::PendingMatchDeleted(_) => "pending_match_deleted",
            MatchmakerMessage::MatchCreated(_) => "match_created",
        }
    }
}
