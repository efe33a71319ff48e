//! Per-player matchmaking sessions
//!
//! A session mirrors one online player's participation in a ticket. The
//! coordinator owns every session and is the only caller of its hooks; a
//! session reacts with player-facing side effects only and never calls back
//! into the coordinator.
//!
//! Embedding applications customise messaging and timers by supplying their
//! own [`SessionFactory`]; [`DefaultSession`] is the stock implementation.

pub mod default;
pub mod timer;

pub use default::DefaultSession;
pub use timer::ScheduledTask;

use crate::config::{GameModeConfig, SessionSettings};
use crate::player::PlayerHandle;
use crate::types::{PendingMatch, Ticket, TicketDeleteReason};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Why a session is being torn down with a player notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeleteReason {
    GameModeDeleted,
    ManualDequeue,
    MatchCreated,
    /// The player vanished from the ticket, e.g. they left the party
    Unknown,
}

impl DeleteReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeleteReason::GameModeDeleted => "game_mode_deleted",
            DeleteReason::ManualDequeue => "manual_dequeue",
            DeleteReason::MatchCreated => "match_created",
            DeleteReason::Unknown => "unknown",
        }
    }
}

impl From<TicketDeleteReason> for DeleteReason {
    fn from(reason: TicketDeleteReason) -> Self {
        match reason {
            TicketDeleteReason::MatchCreated => DeleteReason::MatchCreated,
            TicketDeleteReason::ManualDequeue => DeleteReason::ManualDequeue,
            TicketDeleteReason::GameModeDeleted => DeleteReason::GameModeDeleted,
            TicketDeleteReason::Unknown => DeleteReason::Unknown,
        }
    }
}

/// Hooks the coordinator drives for one player.
///
/// `destroy` is called exactly once, either right after `notify_deletion` or
/// on its own when the player disconnects. Timers owned by the session must
/// not fire once `destroy` has returned.
pub trait MatchmakingSession: Send + Sync {
    fn player(&self) -> &Arc<dyn PlayerHandle>;

    fn ticket(&self) -> &Ticket;

    /// Replace the cached ticket after a membership change
    fn set_ticket(&mut self, ticket: Ticket);

    fn on_pending_match_create(&mut self, pending_match: &PendingMatch);

    fn on_pending_match_update(&mut self, pending_match: &PendingMatch);

    fn on_pending_match_cancelled(&mut self, pending_match: &PendingMatch);

    /// Tell the player they have been removed from the queue
    fn notify_deletion(&mut self, reason: DeleteReason);

    fn destroy(&mut self);
}

/// Everything a factory needs to build a session
#[derive(Clone)]
pub struct SessionContext {
    pub player: Arc<dyn PlayerHandle>,
    pub game_mode: GameModeConfig,
    pub ticket: Ticket,
    pub settings: SessionSettings,
}

/// Builds a session for a player joining a ticket
pub type SessionFactory =
    Arc<dyn Fn(SessionContext) -> Box<dyn MatchmakingSession> + Send + Sync>;
