//! Player queue commands
//!
//! `queue` and `dequeue` call the remote matchmaker and turn its answer into
//! a notice for the player. The coordinator is not involved; the resulting
//! ticket changes come back over the bus.

use crate::config::{GameModeCollection, GameModeConfig};
use crate::metrics::MetricsCollector;
use crate::player::{Notice, PlayerHandle};
use crate::rpc::{DequeueResult, MatchmakerService, QueueResult};
use std::sync::Arc;
use tracing::{debug, error};

const DEQUEUE_UNKNOWN_ERROR: &str = "An unknown error occurred. Please report this to a staff member";

/// Queue and dequeue commands
pub struct QueueCommands {
    matchmaker: Arc<dyn MatchmakerService>,
    game_modes: Arc<GameModeCollection>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl QueueCommands {
    pub fn new(matchmaker: Arc<dyn MatchmakerService>, game_modes: Arc<GameModeCollection>) -> Self {
        Self {
            matchmaker,
            game_modes,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Enabled mode whose friendly name matches `mode_name`, ignoring case
    pub fn find_mode(&self, mode_name: &str) -> Option<GameModeConfig> {
        let mode_name = mode_name.trim();
        self.game_modes
            .enabled_configs()
            .into_iter()
            .find(|config| config.friendly_name.eq_ignore_ascii_case(mode_name))
    }

    /// Friendly names of enabled modes starting with `prefix`, ignoring case.
    /// A blank prefix lists every enabled mode.
    pub fn suggest_modes(&self, prefix: &str) -> Vec<String> {
        let prefix = prefix.trim().to_lowercase();
        let mut names: Vec<String> = self
            .game_modes
            .enabled_configs()
            .into_iter()
            .map(|config| config.friendly_name)
            .filter(|name| name.to_lowercase().starts_with(&prefix))
            .collect();
        names.sort();
        names
    }

    /// Queue `player` for the mode named `mode_name`; returns the notice sent
    pub async fn queue_for_mode(&self, player: &dyn PlayerHandle, mode_name: &str) -> Notice {
        let Some(mode) = self.find_mode(mode_name) else {
            self.record("queue", "invalid_mode");
            return Self::reply(player, Notice::error(format!("Invalid mode {}!", mode_name.trim())));
        };

        let result = match self.matchmaker.queue_player(&mode.id, player.id()).await {
            Ok(result) => result,
            Err(e) => {
                error!(
                    "Failed to queue '{}' for {}: {}",
                    player.id(),
                    mode.friendly_name,
                    e
                );
                self.record("queue", "rpc_error");
                return Self::reply(player, Self::queue_unknown_error(&mode));
            }
        };

        self.record("queue", result.as_str());
        debug!("Queue '{}' for {}: {:?}", player.id(), mode.id, result);

        let notice = match result {
            QueueResult::Success => {
                Notice::success(format!("Queued for {}!", mode.friendly_name))
            }
            QueueResult::AlreadyInQueue => Notice::error("You are already queued!"),
            QueueResult::NoPermission => {
                Notice::error("You do not have permission to queue your party.")
            }
            QueueResult::PartyTooLarge => Notice::error(format!(
                "Your party is too large for {}. The maximum party size is {} players.",
                mode.friendly_name, mode.party_restrictions.max_size
            )),
            QueueResult::InvalidMap
            | QueueResult::InvalidGameMode
            | QueueResult::GameModeDisabled
            | QueueResult::Unknown => {
                error!(
                    "Matchmaker rejected queue for {} with {}",
                    mode.friendly_name,
                    result.as_str()
                );
                Self::queue_unknown_error(&mode)
            }
        };

        Self::reply(player, notice)
    }

    /// Dequeue `player`; returns the notice sent
    pub async fn dequeue(&self, player: &dyn PlayerHandle) -> Notice {
        let result = match self.matchmaker.dequeue_player(player.id()).await {
            Ok(result) => result,
            Err(e) => {
                error!("Failed to dequeue '{}': {}", player.id(), e);
                self.record("dequeue", "rpc_error");
                return Self::reply(player, Notice::error(DEQUEUE_UNKNOWN_ERROR));
            }
        };

        self.record("dequeue", result.as_str());

        let notice = match result {
            DequeueResult::Success => Notice::success("You have been dequeued"),
            DequeueResult::NotInQueue => Notice::error("You are not queued for a game"),
            DequeueResult::NoPermission => Notice::error("You do not have permission to dequeue"),
            DequeueResult::AlreadyMarkedForDequeue => {
                Notice::error("You are already marked for dequeue")
            }
            DequeueResult::Unknown => {
                error!("Dequeue of '{}' failed for an unknown reason", player.id());
                Notice::error(DEQUEUE_UNKNOWN_ERROR)
            }
        };

        Self::reply(player, notice)
    }

    fn queue_unknown_error(mode: &GameModeConfig) -> Notice {
        Notice::error(format!(
            "An unknown error occurred while trying to queue you for {}. Please try again later.",
            mode.friendly_name
        ))
    }

    fn reply(player: &dyn PlayerHandle, notice: Notice) -> Notice {
        player.send_notice(notice.clone());
        notice
    }

    fn record(&self, command: &str, result: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_command(command, result);
        }
    }
}
