//! Test fixtures shared by the integration tests

#![allow(dead_code)]

use chrono::Duration as ChronoDuration;
use queue_keeper::config::{GameModeCollection, GameModeConfig, SessionSettings};
use queue_keeper::coordinator::SessionCoordinator;
use queue_keeper::messaging::MessagingHub;
use queue_keeper::player::{InMemoryPlayerRegistry, LocalPlayer, PlayerHandle};
use queue_keeper::rpc::{MatchmakerService, StaticMatchmakerService};
use queue_keeper::session::{DeleteReason, MatchmakingSession, SessionContext, SessionFactory};
use queue_keeper::types::{MatchId, PendingMatch, PlayerId, Ticket, TicketId};
use queue_keeper::utils::current_timestamp;
use std::sync::{Arc, Mutex};

/// One hook invocation observed on a recording session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Created { player: PlayerId, ticket: TicketId },
    TicketSet { player: PlayerId, ticket: TicketId },
    PendingMatchCreated { player: PlayerId, pending_match: MatchId },
    PendingMatchUpdated { player: PlayerId, pending_match: MatchId },
    PendingMatchCancelled { player: PlayerId, pending_match: MatchId },
    Deleted { player: PlayerId, reason: DeleteReason },
    Destroyed { player: PlayerId },
}

impl SessionEvent {
    pub fn player(&self) -> &str {
        match self {
            SessionEvent::Created { player, .. }
            | SessionEvent::TicketSet { player, .. }
            | SessionEvent::PendingMatchCreated { player, .. }
            | SessionEvent::PendingMatchUpdated { player, .. }
            | SessionEvent::PendingMatchCancelled { player, .. }
            | SessionEvent::Deleted { player, .. }
            | SessionEvent::Destroyed { player } => player,
        }
    }
}

/// Shared log of every hook call made on recording sessions
#[derive(Debug, Clone, Default)]
pub struct SessionLog {
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: SessionEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn events_for(&self, player_id: &str) -> Vec<SessionEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.player() == player_id)
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&SessionEvent) -> bool) -> usize {
        self.events().iter().filter(|event| predicate(event)).count()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    /// A factory whose sessions report into this log
    pub fn factory(&self) -> SessionFactory {
        let log = self.clone();
        Arc::new(move |context: SessionContext| {
            log.push(SessionEvent::Created {
                player: context.player.id().clone(),
                ticket: context.ticket.id.clone(),
            });
            Box::new(RecordingSession {
                player: context.player,
                ticket: context.ticket,
                log: log.clone(),
                destroyed: false,
            }) as Box<dyn MatchmakingSession>
        })
    }
}

/// Session that records its hook calls and nothing else
pub struct RecordingSession {
    player: Arc<dyn PlayerHandle>,
    ticket: Ticket,
    log: SessionLog,
    destroyed: bool,
}

impl RecordingSession {
    fn player_id(&self) -> PlayerId {
        self.player.id().clone()
    }
}

impl MatchmakingSession for RecordingSession {
    fn player(&self) -> &Arc<dyn PlayerHandle> {
        &self.player
    }

    fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    fn set_ticket(&mut self, ticket: Ticket) {
        self.log.push(SessionEvent::TicketSet {
            player: self.player_id(),
            ticket: ticket.id.clone(),
        });
        self.ticket = ticket;
    }

    fn on_pending_match_create(&mut self, pending_match: &PendingMatch) {
        self.log.push(SessionEvent::PendingMatchCreated {
            player: self.player_id(),
            pending_match: pending_match.id.clone(),
        });
    }

    fn on_pending_match_update(&mut self, pending_match: &PendingMatch) {
        self.log.push(SessionEvent::PendingMatchUpdated {
            player: self.player_id(),
            pending_match: pending_match.id.clone(),
        });
    }

    fn on_pending_match_cancelled(&mut self, pending_match: &PendingMatch) {
        self.log.push(SessionEvent::PendingMatchCancelled {
            player: self.player_id(),
            pending_match: pending_match.id.clone(),
        });
    }

    fn notify_deletion(&mut self, reason: DeleteReason) {
        self.log.push(SessionEvent::Deleted {
            player: self.player_id(),
            reason,
        });
    }

    fn destroy(&mut self) {
        assert!(!self.destroyed, "session destroyed twice");
        self.destroyed = true;
        self.log.push(SessionEvent::Destroyed {
            player: self.player_id(),
        });
    }
}

/// Coordinator wired to a hub, an in-memory registry and a recording factory
pub struct TestSystem {
    pub players: Arc<InMemoryPlayerRegistry>,
    pub coordinator: Arc<SessionCoordinator>,
    pub hub: Arc<MessagingHub>,
    pub log: SessionLog,
}

impl TestSystem {
    pub fn new() -> Self {
        Self::with_matchmaker(StaticMatchmakerService::new())
    }

    pub fn with_matchmaker(matchmaker: StaticMatchmakerService) -> Self {
        Self::with_service(Arc::new(matchmaker))
    }

    pub fn with_service(matchmaker: Arc<dyn MatchmakerService>) -> Self {
        let players = Arc::new(InMemoryPlayerRegistry::new());
        let log = SessionLog::new();

        let coordinator = Arc::new(
            SessionCoordinator::new(
                players.clone(),
                game_modes(),
                matchmaker,
                SessionSettings::default(),
            )
            .with_session_factory(log.factory()),
        );

        let hub = Arc::new(MessagingHub::new());
        coordinator
            .subscribe(&hub)
            .expect("coordinator should subscribe");

        Self {
            players,
            coordinator,
            hub,
            log,
        }
    }

    /// Connect a player without running queue recovery
    pub fn connect(&self, player_id: &str) -> Arc<LocalPlayer> {
        let player = Arc::new(LocalPlayer::new(player_id, player_id.to_uppercase()));
        self.players
            .connect(player.clone())
            .expect("player should connect");
        player
    }

    /// Connect a player and run queue recovery, the way the host does
    pub async fn login(&self, player_id: &str) -> Arc<LocalPlayer> {
        let player = self.connect(player_id);
        self.coordinator.handle_player_login(player_id).await;
        player
    }

    /// Unregister a player, then tell the coordinator
    pub fn disconnect(&self, player_id: &str) {
        self.players
            .disconnect(player_id)
            .expect("player should disconnect");
        self.coordinator.handle_player_disconnect(player_id);
    }

    /// Invariant: a session exists iff the player is online and appears in a
    /// cached ticket
    pub fn assert_invariant(&self, player_ids: &[&str]) {
        for player_id in player_ids {
            let online = self.players.local_player(player_id).is_some();
            let cached = !self
                .coordinator
                .store()
                .tickets_for_player(player_id)
                .expect("store readable")
                .is_empty();

            assert_eq!(
                self.coordinator.has_session(player_id),
                online && cached,
                "session/invariant mismatch for '{}' (online: {}, cached: {})",
                player_id,
                online,
                cached
            );
        }
    }
}

pub fn game_modes() -> Arc<GameModeCollection> {
    Arc::new(GameModeCollection::with_configs(vec![
        GameModeConfig::new("duel", "Duel").with_party_size(1, 2),
        GameModeConfig::new("block_sumo", "Block Sumo").with_party_size(1, 4),
    ]))
}

pub fn ticket(id: &str, players: &[&str]) -> Ticket {
    Ticket::new(id, "duel", players.iter().map(|p| p.to_string()).collect())
}

pub fn pending(id: &str, tickets: &[&str]) -> PendingMatch {
    PendingMatch {
        id: id.to_string(),
        game_mode_id: "duel".to_string(),
        ticket_ids: tickets.iter().map(|t| t.to_string()).collect(),
        teleport_time: current_timestamp() + ChronoDuration::seconds(30),
    }
}

pub fn notice_texts(player: &LocalPlayer) -> Vec<String> {
    player
        .drain_notices()
        .into_iter()
        .map(|notice| notice.text)
        .collect()
}
