//! Player collaborator interfaces
//!
//! The coordinator never owns players. It looks them up through a
//! [`PlayerRegistry`] and talks to them through a [`PlayerHandle`], both of
//! which the embedding host provides. The in-memory implementations here back
//! the daemon's HTTP surface and the tests.

use crate::error::{MatchmakingError, Result};
use crate::types::PlayerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};

/// Maximum number of undelivered notices a [`LocalPlayer`] keeps
pub const NOTICE_BUFFER_CAPACITY: usize = 64;

/// Tone of a player-facing message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

/// A message shown to a player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

impl Notice {
    pub fn new(level: NoticeLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
            sent_at: crate::utils::current_timestamp(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, text)
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, text)
    }
}

/// A connected player, as seen by the coordinator and its sessions.
///
/// `send_notice` may be called from any thread. Hosts whose player API is
/// bound to a single thread must hop onto it inside their implementation.
pub trait PlayerHandle: Send + Sync {
    fn id(&self) -> &PlayerId;

    fn username(&self) -> &str;

    fn send_notice(&self, notice: Notice);
}

/// Lookup of players connected to this instance
pub trait PlayerRegistry: Send + Sync {
    /// Returns `None` when the player is not connected here
    fn get_player(&self, player_id: &str) -> Option<Arc<dyn PlayerHandle>>;

    fn is_online(&self, player_id: &str) -> bool {
        self.get_player(player_id).is_some()
    }
}

/// A player handle that buffers notices until the host collects them
#[derive(Debug)]
pub struct LocalPlayer {
    id: PlayerId,
    username: String,
    notices: Mutex<VecDeque<Notice>>,
}

impl LocalPlayer {
    pub fn new(id: impl Into<PlayerId>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            notices: Mutex::new(VecDeque::new()),
        }
    }

    /// Take every buffered notice, oldest first
    pub fn drain_notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .map(|mut notices| notices.drain(..).collect())
            .unwrap_or_default()
    }
}

impl PlayerHandle for LocalPlayer {
    fn id(&self) -> &PlayerId {
        &self.id
    }

    fn username(&self) -> &str {
        &self.username
    }

    fn send_notice(&self, notice: Notice) {
        debug!("Notice for '{}': {}", self.id, notice.text);

        match self.notices.lock() {
            Ok(mut notices) => {
                if notices.len() == NOTICE_BUFFER_CAPACITY {
                    notices.pop_front();
                }
                notices.push_back(notice);
            }
            Err(_) => warn!("Dropping notice for '{}': buffer lock poisoned", self.id),
        }
    }
}

/// Registry of players connected to this instance
#[derive(Default)]
pub struct InMemoryPlayerRegistry {
    players: RwLock<HashMap<PlayerId, Arc<LocalPlayer>>>,
}

impl InMemoryPlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a player as connected, replacing any stale handle
    pub fn connect(&self, player: Arc<LocalPlayer>) -> Result<()> {
        let mut players = self
            .players
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("player registry"))?;
        players.insert(player.id().clone(), player);
        Ok(())
    }

    /// Remove a player, returning the handle if they were connected
    pub fn disconnect(&self, player_id: &str) -> Result<Option<Arc<LocalPlayer>>> {
        let mut players = self
            .players
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("player registry"))?;
        Ok(players.remove(player_id))
    }

    /// Concrete handle lookup, for hosts that need the buffer
    pub fn local_player(&self, player_id: &str) -> Option<Arc<LocalPlayer>> {
        self.players.read().ok()?.get(player_id).cloned()
    }

    pub fn online_count(&self) -> usize {
        self.players.read().map(|players| players.len()).unwrap_or(0)
    }

    pub fn online_ids(&self) -> Vec<PlayerId> {
        self.players
            .read()
            .map(|players| players.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl PlayerRegistry for InMemoryPlayerRegistry {
    fn get_player(&self, player_id: &str) -> Option<Arc<dyn PlayerHandle>> {
        self.local_player(player_id)
            .map(|player| player as Arc<dyn PlayerHandle>)
    }
}
