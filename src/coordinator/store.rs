//! Local projection of remote ticket and pending-match state
//!
//! Plain keyed storage with one lock per map. Written only by the
//! coordinator; every lock is held for a single operation.

use crate::error::{MatchmakingError, Result};
use crate::types::{MatchId, PendingMatch, Ticket, TicketId};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct ProjectionStore {
    tickets: RwLock<HashMap<TicketId, Ticket>>,
    pending_matches: RwLock<HashMap<MatchId, PendingMatch>>,
}

impl ProjectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_ticket(&self, ticket_id: &str) -> Result<Option<Ticket>> {
        let tickets = self
            .tickets
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("ticket cache"))?;
        Ok(tickets.get(ticket_id).cloned())
    }

    pub fn contains_ticket(&self, ticket_id: &str) -> Result<bool> {
        let tickets = self
            .tickets
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("ticket cache"))?;
        Ok(tickets.contains_key(ticket_id))
    }

    /// Insert or replace a ticket, returning the previous copy
    pub fn put_ticket(&self, ticket: Ticket) -> Result<Option<Ticket>> {
        let mut tickets = self
            .tickets
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("ticket cache"))?;
        Ok(tickets.insert(ticket.id.clone(), ticket))
    }

    pub fn remove_ticket(&self, ticket_id: &str) -> Result<Option<Ticket>> {
        let mut tickets = self
            .tickets
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("ticket cache"))?;
        Ok(tickets.remove(ticket_id))
    }

    /// Cached tickets among `ticket_ids`, in the given order
    pub fn cached_tickets(&self, ticket_ids: &[TicketId]) -> Result<Vec<Ticket>> {
        let tickets = self
            .tickets
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("ticket cache"))?;
        Ok(ticket_ids
            .iter()
            .filter_map(|id| tickets.get(id).cloned())
            .collect())
    }

    /// Every cached ticket that lists `player_id`
    pub fn tickets_for_player(&self, player_id: &str) -> Result<Vec<Ticket>> {
        let tickets = self
            .tickets
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("ticket cache"))?;
        Ok(tickets
            .values()
            .filter(|ticket| ticket.has_player(player_id))
            .cloned()
            .collect())
    }

    pub fn ticket_count(&self) -> usize {
        self.tickets.read().map(|tickets| tickets.len()).unwrap_or(0)
    }

    pub fn get_pending_match(&self, match_id: &str) -> Result<Option<PendingMatch>> {
        let matches = self
            .pending_matches
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("pending match cache"))?;
        Ok(matches.get(match_id).cloned())
    }

    pub fn put_pending_match(&self, pending_match: PendingMatch) -> Result<()> {
        let mut matches = self
            .pending_matches
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("pending match cache"))?;
        matches.insert(pending_match.id.clone(), pending_match);
        Ok(())
    }

    pub fn remove_pending_match(&self, match_id: &str) -> Result<Option<PendingMatch>> {
        let mut matches = self
            .pending_matches
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("pending match cache"))?;
        Ok(matches.remove(match_id))
    }

    /// Drop every pending match that references one of `ticket_ids`
    pub fn remove_pending_matches_for(&self, ticket_ids: &[TicketId]) -> Result<usize> {
        let mut matches = self
            .pending_matches
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("pending match cache"))?;
        let before = matches.len();
        matches.retain(|_, pending| !ticket_ids.iter().any(|id| pending.references_ticket(id)));
        Ok(before - matches.len())
    }

    pub fn pending_match_count(&self) -> usize {
        self.pending_matches
            .read()
            .map(|matches| matches.len())
            .unwrap_or(0)
    }
}
