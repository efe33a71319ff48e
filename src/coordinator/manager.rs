//! Session coordinator
//!
//! Mirrors remote ticket and pending-match state onto the players connected
//! to this instance. Bus handlers and player lifecycle hooks may run on any
//! thread and in any interleaving; every handler takes the session registry
//! lock for its whole body, then touches the projection store, so changes
//! for one player are applied in the order their events are observed.
//!
//! Handlers are total. Errors are logged and counted, never propagated.

use super::store::ProjectionStore;
use crate::config::{GameModeCollection, GameModeConfig, SessionSettings};
use crate::error::{MatchmakingError, Result};
use crate::messaging::MessagingHub;
use crate::metrics::MetricsCollector;
use crate::player::{Notice, PlayerHandle, PlayerRegistry};
use crate::rpc::MatchmakerService;
use crate::session::{
    DefaultSession, DeleteReason, MatchmakingSession, SessionContext, SessionFactory,
};
use crate::types::{
    MatchCreated, MatchId, PendingMatch, PendingMatchCreated, PendingMatchDeleteReason,
    PendingMatchDeleted, PendingMatchUpdated, PlayerId, Ticket, TicketCreated, TicketDeleted,
    TicketId, TicketUpdated,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

const RESTORE_ERROR_MESSAGE: &str =
    "An unknown error occurred while restoring your queue. Please report this to a staff member.";

/// Where a session is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Queued,
    PendingMatch(MatchId),
}

/// Result of a login-time queue restore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The matchmaker has no ticket for the player
    NotQueued,
    Restored,
    GameModeUnresolved,
    Failed,
    /// The player left before the restore finished
    PlayerOffline,
}

impl RestoreOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreOutcome::NotQueued => "not_queued",
            RestoreOutcome::Restored => "restored",
            RestoreOutcome::GameModeUnresolved => "game_mode_unresolved",
            RestoreOutcome::Failed => "failed",
            RestoreOutcome::PlayerOffline => "player_offline",
        }
    }
}

/// Statistics about coordinator operations
#[derive(Debug, Clone, Default)]
pub struct CoordinatorStats {
    /// Total bus events handled
    pub events_processed: u64,
    /// Bus events whose handler hit an error
    pub events_failed: u64,
    /// Total sessions created
    pub sessions_created: u64,
    /// Total sessions destroyed
    pub sessions_destroyed: u64,
    /// Login restores that produced a session
    pub restores_succeeded: u64,
    /// Login restores that ended in an error notice
    pub restores_failed: u64,
    /// Current number of sessions
    pub active_sessions: usize,
    /// Current number of cached tickets
    pub cached_tickets: usize,
    /// Current number of cached pending matches
    pub cached_pending_matches: usize,
}

struct SessionEntry {
    session: Box<dyn MatchmakingSession>,
    state: SessionState,
}

type SessionMap = HashMap<PlayerId, SessionEntry>;

/// The session coordinator
pub struct SessionCoordinator {
    store: ProjectionStore,
    sessions: RwLock<SessionMap>,
    players: Arc<dyn PlayerRegistry>,
    game_modes: Arc<GameModeCollection>,
    matchmaker: Arc<dyn MatchmakerService>,
    session_factory: SessionFactory,
    settings: SessionSettings,
    stats: RwLock<CoordinatorStats>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl SessionCoordinator {
    /// Create a coordinator that builds [`DefaultSession`]s
    pub fn new(
        players: Arc<dyn PlayerRegistry>,
        game_modes: Arc<GameModeCollection>,
        matchmaker: Arc<dyn MatchmakerService>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            store: ProjectionStore::new(),
            sessions: RwLock::new(HashMap::new()),
            players,
            game_modes,
            matchmaker,
            session_factory: DefaultSession::factory(),
            settings,
            stats: RwLock::new(CoordinatorStats::default()),
            metrics: None,
        }
    }

    /// Replace the session implementation
    pub fn with_session_factory(mut self, session_factory: SessionFactory) -> Self {
        self.session_factory = session_factory;
        self
    }

    /// Record into a metrics collector
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Register a listener for every bus message type on `hub`
    pub fn subscribe(self: &Arc<Self>, hub: &MessagingHub) -> Result<()> {
        let coordinator = self.clone();
        hub.add_listener(move |message: &TicketCreated| coordinator.on_ticket_created(message))?;

        let coordinator = self.clone();
        hub.add_listener(move |message: &TicketUpdated| coordinator.on_ticket_updated(message))?;

        let coordinator = self.clone();
        hub.add_listener(move |message: &TicketDeleted| coordinator.on_ticket_deleted(message))?;

        let coordinator = self.clone();
        hub.add_listener(move |message: &PendingMatchCreated| {
            coordinator.on_pending_match_created(message)
        })?;

        let coordinator = self.clone();
        hub.add_listener(move |message: &PendingMatchUpdated| {
            coordinator.on_pending_match_updated(message)
        })?;

        let coordinator = self.clone();
        hub.add_listener(move |message: &PendingMatchDeleted| {
            coordinator.on_pending_match_deleted(message)
        })?;

        let coordinator = self.clone();
        hub.add_listener(move |message: &MatchCreated| coordinator.on_match_created(message))?;

        info!("Session coordinator subscribed to matchmaker events");
        Ok(())
    }

    pub fn on_ticket_created(&self, message: &TicketCreated) {
        self.process_event("ticket_created", || self.try_ticket_created(message));
    }

    pub fn on_ticket_updated(&self, message: &TicketUpdated) {
        self.process_event("ticket_updated", || self.try_ticket_updated(message));
    }

    pub fn on_ticket_deleted(&self, message: &TicketDeleted) {
        self.process_event("ticket_deleted", || self.try_ticket_deleted(message));
    }

    pub fn on_pending_match_created(&self, message: &PendingMatchCreated) {
        self.process_event("pending_match_created", || {
            self.try_pending_match_created(message)
        });
    }

    pub fn on_pending_match_updated(&self, message: &PendingMatchUpdated) {
        self.process_event("pending_match_updated", || {
            self.try_pending_match_updated(message)
        });
    }

    pub fn on_pending_match_deleted(&self, message: &PendingMatchDeleted) {
        self.process_event("pending_match_deleted", || {
            self.try_pending_match_deleted(message)
        });
    }

    pub fn on_match_created(&self, message: &MatchCreated) {
        self.process_event("match_created", || self.try_match_created(message));
    }

    /// Restore a freshly connected player's queue from the matchmaker.
    ///
    /// Must run after the player is visible in the registry. This is the only
    /// handler that waits on the network; the call is bounded by the
    /// configured restore timeout.
    pub async fn handle_player_login(&self, player_id: &str) {
        let started = Instant::now();

        let outcome = match self.try_player_login(player_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Failed to restore queue for '{}': {}", player_id, e);
                if let Some(player) = self.players.get_player(player_id) {
                    player.send_notice(Notice::error(RESTORE_ERROR_MESSAGE));
                }
                RestoreOutcome::Failed
            }
        };

        self.update_stats(|stats| match outcome {
            RestoreOutcome::Restored => stats.restores_succeeded += 1,
            RestoreOutcome::Failed | RestoreOutcome::GameModeUnresolved => {
                stats.restores_failed += 1
            }
            RestoreOutcome::NotQueued | RestoreOutcome::PlayerOffline => {}
        });

        if let Some(metrics) = &self.metrics {
            metrics.record_restore(outcome.as_str(), started.elapsed());
            self.refresh_gauges(metrics);
        }

        debug!(
            "Login restore for '{}' finished as {} in {:.2}ms",
            player_id,
            outcome.as_str(),
            started.elapsed().as_secs_f64() * 1000.0
        );
    }

    /// Tear down a departing player's session without notifying them.
    ///
    /// The ticket stays cached; party members may still be online here.
    pub fn handle_player_disconnect(&self, player_id: &str) {
        let closed = self.sessions_mut().map(|mut sessions| {
            self.close_session(&mut sessions, player_id, None, "disconnect")
        });

        match closed {
            Ok(true) => debug!("Closed session for disconnected player '{}'", player_id),
            Ok(false) => debug!("Disconnected player '{}' had no session", player_id),
            Err(e) => error!("Failed to handle disconnect of '{}': {}", player_id, e),
        }

        if let Some(metrics) = &self.metrics {
            self.refresh_gauges(metrics);
        }
    }

    pub fn has_session(&self, player_id: &str) -> bool {
        self.sessions
            .read()
            .map(|sessions| sessions.contains_key(player_id))
            .unwrap_or(false)
    }

    pub fn session_state(&self, player_id: &str) -> Option<SessionState> {
        let sessions = self.sessions.read().ok()?;
        sessions.get(player_id).map(|entry| entry.state.clone())
    }

    /// The ticket a player's session currently holds
    pub fn session_ticket(&self, player_id: &str) -> Option<Ticket> {
        let sessions = self.sessions.read().ok()?;
        sessions
            .get(player_id)
            .map(|entry| entry.session.ticket().clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .map(|sessions| sessions.len())
            .unwrap_or(0)
    }

    pub fn session_player_ids(&self) -> Vec<PlayerId> {
        self.sessions
            .read()
            .map(|sessions| sessions.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn store(&self) -> &ProjectionStore {
        &self.store
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Get current coordinator statistics
    pub fn get_stats(&self) -> Result<CoordinatorStats> {
        let mut stats = self
            .stats
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("coordinator stats"))?
            .clone();

        stats.active_sessions = self.session_count();
        stats.cached_tickets = self.store.ticket_count();
        stats.cached_pending_matches = self.store.pending_match_count();
        Ok(stats)
    }

    fn try_ticket_created(&self, message: &TicketCreated) -> Result<()> {
        let ticket = &message.ticket;
        let mut sessions = self.sessions_mut()?;
        let mut game_mode = None;
        let mut has_local_players = false;

        for player_id in &ticket.player_ids {
            match Self::owning_ticket(&sessions, player_id) {
                Some(owner) if owner == ticket.id => {
                    has_local_players = true;
                    continue;
                }
                Some(owner) => {
                    debug!(
                        "'{}' moved from ticket {} to {}",
                        player_id, owner, ticket.id
                    );
                    self.close_session(&mut sessions, player_id, None, "replaced");
                }
                None => {}
            }

            let Some(player) = self.players.get_player(player_id) else {
                continue;
            };

            let game_mode = game_mode
                .get_or_insert_with(|| self.resolve_game_mode(&ticket.game_mode_id))
                .clone();
            self.open_session(&mut sessions, player, ticket, game_mode, "bus");
            has_local_players = true;
        }

        if has_local_players {
            self.store.put_ticket(ticket.clone())?;
            debug!("Cached ticket {}", ticket.id);
        } else {
            debug!("Ticket {} has no players here, not caching", ticket.id);
        }

        Ok(())
    }

    fn try_ticket_updated(&self, message: &TicketUpdated) -> Result<()> {
        let new_ticket = &message.new_ticket;
        let mut sessions = self.sessions_mut()?;

        let cached = self.store.get_ticket(&new_ticket.id)?;
        let was_cached = cached.is_some();
        let previous = cached.unwrap_or_else(|| message.old_ticket.clone());
        let mut game_mode = None;

        for player_id in &new_ticket.player_ids {
            match Self::owning_ticket(&sessions, player_id) {
                Some(owner) if owner == new_ticket.id => {
                    if let Some(entry) = sessions.get_mut(player_id) {
                        entry.session.set_ticket(new_ticket.clone());
                    }
                    continue;
                }
                Some(owner) => {
                    debug!(
                        "'{}' moved from ticket {} to {}",
                        player_id, owner, new_ticket.id
                    );
                    self.close_session(&mut sessions, player_id, None, "replaced");
                }
                None => {}
            }

            let Some(player) = self.players.get_player(player_id) else {
                continue;
            };

            let game_mode = game_mode
                .get_or_insert_with(|| self.resolve_game_mode(&new_ticket.game_mode_id))
                .clone();
            self.open_session(&mut sessions, player, new_ticket, game_mode, "bus");
        }

        for player_id in &previous.player_ids {
            if new_ticket.has_player(player_id) {
                continue;
            }
            if Self::owning_ticket(&sessions, player_id).as_deref() == Some(new_ticket.id.as_str())
            {
                debug!("'{}' left ticket {}", player_id, new_ticket.id);
                self.close_session(
                    &mut sessions,
                    player_id,
                    Some(DeleteReason::Unknown),
                    DeleteReason::Unknown.as_str(),
                );
            }
        }

        let has_local_players = new_ticket
            .player_ids
            .iter()
            .any(|player_id| sessions.contains_key(player_id));

        if was_cached || has_local_players {
            self.store.put_ticket(new_ticket.clone())?;
        } else {
            info!(
                "Ticket {} updated but has no players here, not caching",
                new_ticket.id
            );
        }

        Ok(())
    }

    fn try_ticket_deleted(&self, message: &TicketDeleted) -> Result<()> {
        let ticket = &message.ticket;
        let mut sessions = self.sessions_mut()?;

        let Some(cached) = self.store.remove_ticket(&ticket.id)? else {
            info!("Deleted ticket {} was not cached here", ticket.id);
            return Ok(());
        };

        let reason = DeleteReason::from(message.reason);
        let members: BTreeSet<&PlayerId> = cached
            .player_ids
            .iter()
            .chain(ticket.player_ids.iter())
            .collect();

        let mut closed = 0;
        for player_id in members {
            if Self::owning_ticket(&sessions, player_id).as_deref() != Some(ticket.id.as_str()) {
                continue;
            }
            if self.close_session(&mut sessions, player_id, Some(reason), reason.as_str()) {
                closed += 1;
            }
        }

        self.store
            .remove_pending_matches_for(std::slice::from_ref(&ticket.id))?;

        info!(
            "Ticket {} deleted ({:?}), closed {} local sessions",
            ticket.id, message.reason, closed
        );
        Ok(())
    }

    fn try_pending_match_created(&self, message: &PendingMatchCreated) -> Result<()> {
        let pending_match = &message.pending_match;
        let mut sessions = self.sessions_mut()?;

        let (tickets, reached) = self.fan_out(&mut sessions, pending_match, |entry| {
            entry.session.on_pending_match_create(pending_match);
            entry.state = SessionState::PendingMatch(pending_match.id.clone());
        })?;

        if tickets > 0 {
            self.store.put_pending_match(pending_match.clone())?;
            debug!(
                "Pending match {} reached {} local sessions",
                pending_match.id, reached
            );
        }

        Ok(())
    }

    fn try_pending_match_updated(&self, message: &PendingMatchUpdated) -> Result<()> {
        let pending_match = &message.pending_match;
        let mut sessions = self.sessions_mut()?;

        let (tickets, _) = self.fan_out(&mut sessions, pending_match, |entry| {
            entry.session.on_pending_match_update(pending_match);
            entry.state = SessionState::PendingMatch(pending_match.id.clone());
        })?;

        if tickets > 0 {
            self.store.put_pending_match(pending_match.clone())?;
        }

        Ok(())
    }

    fn try_pending_match_deleted(&self, message: &PendingMatchDeleted) -> Result<()> {
        let pending_match = &message.pending_match;
        let mut sessions = self.sessions_mut()?;

        // A finalized match is announced by MatchCreated, which tears the sessions down
        if message.reason != PendingMatchDeleteReason::MatchCreated {
            self.fan_out(&mut sessions, pending_match, |entry| {
                entry.session.on_pending_match_cancelled(pending_match);
                entry.state = SessionState::Queued;
            })?;
        } else {
            debug!(
                "Pending match {} finalized, awaiting match creation",
                pending_match.id
            );
        }

        self.store.remove_pending_match(&pending_match.id)?;
        Ok(())
    }

    fn try_match_created(&self, message: &MatchCreated) -> Result<()> {
        let created_match = &message.created_match;
        let mut sessions = self.sessions_mut()?;

        let mut closed = 0;
        for player_id in created_match.player_ids() {
            if self.close_session(
                &mut sessions,
                player_id,
                Some(DeleteReason::MatchCreated),
                DeleteReason::MatchCreated.as_str(),
            ) {
                closed += 1;
            }
        }

        let ticket_ids: Vec<TicketId> = created_match
            .tickets
            .iter()
            .map(|ticket| ticket.id.clone())
            .collect();
        for ticket_id in &ticket_ids {
            self.store.remove_ticket(ticket_id)?;
        }
        self.store.remove_pending_matches_for(&ticket_ids)?;

        info!(
            "Match {} created, closed {} local sessions",
            created_match.id, closed
        );
        Ok(())
    }

    async fn try_player_login(&self, player_id: &str) -> Result<RestoreOutcome> {
        let Some(player) = self.players.get_player(player_id) else {
            return Ok(RestoreOutcome::PlayerOffline);
        };

        let restore_timeout = self.settings.restore_timeout();
        let lookup = timeout(
            restore_timeout,
            self.matchmaker.get_player_queue_info(player_id),
        )
        .await;

        let queue_info = match lookup {
            Ok(Ok(queue_info)) => queue_info,
            Ok(Err(e)) => {
                error!("Failed to get queue info for '{}': {}", player_id, e);
                player.send_notice(Notice::error(RESTORE_ERROR_MESSAGE));
                return Ok(RestoreOutcome::Failed);
            }
            Err(_) => {
                let e = MatchmakingError::RpcTimeout {
                    timeout_ms: restore_timeout.as_millis() as u64,
                };
                error!("Failed to get queue info for '{}': {}", player_id, e);
                player.send_notice(Notice::error(RESTORE_ERROR_MESSAGE));
                return Ok(RestoreOutcome::Failed);
            }
        };

        let Some(ticket) = queue_info else {
            return Ok(RestoreOutcome::NotQueued);
        };

        let Some(game_mode) = self.game_modes.get_config(&ticket.game_mode_id) else {
            error!(
                "No game mode config '{}' to restore the queue of '{}'",
                ticket.game_mode_id, player_id
            );
            player.send_notice(Notice::error(format!(
                "Your queue for {} could not be transferred! Please tell a staff member.",
                ticket.game_mode_id
            )));
            return Ok(RestoreOutcome::GameModeUnresolved);
        };

        let mut sessions = self.sessions_mut()?;

        // The player may have left while the lookup was in flight
        let Some(player) = self.players.get_player(player_id) else {
            return Ok(RestoreOutcome::PlayerOffline);
        };

        // Bus events handled during the lookup are newer than the snapshot
        let ticket = match self.store.get_ticket(&ticket.id)? {
            Some(cached) if cached.has_player(player_id) => cached,
            Some(cached) => {
                info!(
                    "Ticket {} no longer lists '{}', skipping restore",
                    cached.id, player_id
                );
                return Ok(RestoreOutcome::NotQueued);
            }
            None => {
                self.store.put_ticket(ticket.clone())?;
                ticket
            }
        };

        match Self::owning_ticket(&sessions, player_id) {
            Some(owner) if owner == ticket.id => {
                if let Some(entry) = sessions.get_mut(player_id) {
                    entry.session.set_ticket(ticket.clone());
                }
            }
            Some(_) => {
                self.close_session(&mut sessions, player_id, None, "replaced");
                self.open_session(&mut sessions, player.clone(), &ticket, game_mode.clone(), "login");
            }
            None => {
                self.open_session(&mut sessions, player.clone(), &ticket, game_mode.clone(), "login");
            }
        }

        player.send_notice(Notice::success(format!(
            "Your queue for {} has been transferred!",
            game_mode.friendly_name
        )));
        info!(
            "Restored '{}' into ticket {} for {}",
            player_id, ticket.id, game_mode.id
        );

        Ok(RestoreOutcome::Restored)
    }

    /// Invoke `action` on every session whose ticket is referenced by the
    /// match and cached here. Returns the number of cached tickets and the
    /// number of sessions reached.
    fn fan_out<F>(
        &self,
        sessions: &mut SessionMap,
        pending_match: &PendingMatch,
        mut action: F,
    ) -> Result<(usize, usize)>
    where
        F: FnMut(&mut SessionEntry),
    {
        let tickets = self.store.cached_tickets(&pending_match.ticket_ids)?;
        if tickets.is_empty() {
            info!(
                "Pending match {} references no tickets cached here",
                pending_match.id
            );
            return Ok((0, 0));
        }

        let mut reached = 0;
        for ticket in &tickets {
            for player_id in &ticket.player_ids {
                let Some(entry) = sessions.get_mut(player_id) else {
                    continue;
                };
                if entry.session.ticket().id != ticket.id {
                    continue;
                }
                action(entry);
                reached += 1;
            }
        }

        Ok((tickets.len(), reached))
    }

    fn open_session(
        &self,
        sessions: &mut SessionMap,
        player: Arc<dyn PlayerHandle>,
        ticket: &Ticket,
        game_mode: GameModeConfig,
        source: &str,
    ) {
        let player_id = player.id().clone();
        let session = (self.session_factory)(SessionContext {
            player,
            game_mode,
            ticket: ticket.clone(),
            settings: self.settings.clone(),
        });

        sessions.insert(
            player_id.clone(),
            SessionEntry {
                session,
                state: SessionState::Queued,
            },
        );

        debug!("Opened session for '{}' on ticket {}", player_id, ticket.id);
        self.update_stats(|stats| stats.sessions_created += 1);
        if let Some(metrics) = &self.metrics {
            metrics.record_session_created(source);
        }
    }

    /// Remove and tear down a session, notifying the player first when a
    /// reason is given. A missing session is not an error.
    fn close_session(
        &self,
        sessions: &mut SessionMap,
        player_id: &str,
        reason: Option<DeleteReason>,
        cause: &str,
    ) -> bool {
        let Some(mut entry) = sessions.remove(player_id) else {
            return false;
        };

        if let Some(reason) = reason {
            entry.session.notify_deletion(reason);
        }
        entry.session.destroy();

        debug!("Closed session for '{}' ({})", player_id, cause);
        self.update_stats(|stats| stats.sessions_destroyed += 1);
        if let Some(metrics) = &self.metrics {
            metrics.record_session_destroyed(cause);
        }
        true
    }

    fn owning_ticket(sessions: &SessionMap, player_id: &str) -> Option<TicketId> {
        sessions
            .get(player_id)
            .map(|entry| entry.session.ticket().id.clone())
    }

    fn resolve_game_mode(&self, game_mode_id: &str) -> GameModeConfig {
        self.game_modes.get_config(game_mode_id).unwrap_or_else(|| {
            warn!(
                "Unknown game mode '{}', using its id as the display name",
                game_mode_id
            );
            GameModeConfig::unresolved(game_mode_id)
        })
    }

    fn sessions_mut(&self) -> Result<RwLockWriteGuard<'_, SessionMap>> {
        Ok(self
            .sessions
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("session registry"))?)
    }

    fn process_event<F>(&self, event_type: &'static str, handler: F)
    where
        F: FnOnce() -> Result<()>,
    {
        let started = Instant::now();
        let result = handler();
        let success = result.is_ok();

        if let Err(e) = result {
            error!("Failed to process {} event: {}", event_type, e);
        }

        self.update_stats(|stats| {
            stats.events_processed += 1;
            if !success {
                stats.events_failed += 1;
            }
        });

        if let Some(metrics) = &self.metrics {
            metrics.record_event(event_type, success, started.elapsed());
            self.refresh_gauges(metrics);
        }
    }

    fn update_stats(&self, update: impl FnOnce(&mut CoordinatorStats)) {
        match self.stats.write() {
            Ok(mut stats) => update(&mut stats),
            Err(_) => warn!("Coordinator stats lock poisoned, dropping update"),
        }
    }

    fn refresh_gauges(&self, metrics: &MetricsCollector) {
        if let Ok(stats) = self.get_stats() {
            metrics.update_from_coordinator_stats(&stats);
        }
    }
}
