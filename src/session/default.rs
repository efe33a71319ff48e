//! Stock session implementation: queue reminders and a teleport countdown

use super::timer::ScheduledTask;
use super::{DeleteReason, MatchmakingSession, SessionContext, SessionFactory};
use crate::config::GameModeConfig;
use crate::player::{Notice, PlayerHandle};
use crate::types::{PendingMatch, Ticket};
use crate::utils::{current_timestamp, duration_until, seconds_until};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

pub struct DefaultSession {
    player: Arc<dyn PlayerHandle>,
    ticket: Ticket,
    game_mode: GameModeConfig,
    countdown_seconds: u64,
    /// Shared with the reminder task, which stays quiet while a match is pending
    match_pending: Arc<AtomicBool>,
    teleport_time: Option<DateTime<Utc>>,
    reminder: ScheduledTask,
    countdown: Vec<ScheduledTask>,
    destroyed: bool,
}

impl DefaultSession {
    pub fn new(context: SessionContext) -> Self {
        let match_pending = Arc::new(AtomicBool::new(false));

        let reminder = {
            let player = context.player.clone();
            let match_pending = match_pending.clone();
            let text = format!("You are in queue for {}...", context.game_mode.friendly_name);
            ScheduledTask::repeating(context.settings.reminder_interval(), move || {
                if !match_pending.load(Ordering::SeqCst) {
                    player.send_notice(Notice::success(text.clone()));
                }
            })
        };

        Self {
            player: context.player,
            ticket: context.ticket,
            game_mode: context.game_mode,
            countdown_seconds: context.settings.countdown_seconds,
            match_pending,
            teleport_time: None,
            reminder,
            countdown: Vec::new(),
            destroyed: false,
        }
    }

    /// Factory producing [`DefaultSession`]s
    pub fn factory() -> SessionFactory {
        Arc::new(|context: SessionContext| {
            Box::new(DefaultSession::new(context)) as Box<dyn MatchmakingSession>
        })
    }

    pub fn game_mode(&self) -> &GameModeConfig {
        &self.game_mode
    }

    pub fn teleport_time(&self) -> Option<DateTime<Utc>> {
        self.teleport_time
    }

    fn cancel_countdown(&mut self) {
        for task in self.countdown.drain(..) {
            task.cancel();
        }
    }

    /// Schedule "Teleporting in n..." for each of the final seconds still ahead
    fn schedule_countdown(&mut self, teleport_time: DateTime<Utc>) {
        self.cancel_countdown();
        self.teleport_time = Some(teleport_time);

        let now = current_timestamp();
        for remaining in 1..=self.countdown_seconds {
            let fire_at = teleport_time - ChronoDuration::seconds(remaining as i64);
            if fire_at <= now {
                continue;
            }

            let player = self.player.clone();
            self.countdown.push(ScheduledTask::delayed(
                duration_until(fire_at, now),
                move || player.send_notice(Notice::info(format!("Teleporting in {}...", remaining))),
            ));
        }
    }
}

impl MatchmakingSession for DefaultSession {
    fn player(&self) -> &Arc<dyn PlayerHandle> {
        &self.player
    }

    fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    fn set_ticket(&mut self, ticket: Ticket) {
        self.ticket = ticket;
    }

    fn on_pending_match_create(&mut self, pending_match: &PendingMatch) {
        if self.destroyed {
            return;
        }

        self.match_pending.store(true, Ordering::SeqCst);
        let seconds = seconds_until(pending_match.teleport_time, current_timestamp());
        self.player.send_notice(Notice::success(format!(
            "{} match found! Teleporting in {} seconds...",
            self.game_mode.friendly_name, seconds
        )));
        self.schedule_countdown(pending_match.teleport_time);
    }

    fn on_pending_match_update(&mut self, pending_match: &PendingMatch) {
        if self.destroyed {
            return;
        }

        self.match_pending.store(true, Ordering::SeqCst);
        if self.teleport_time != Some(pending_match.teleport_time) {
            debug!(
                "Teleport time for '{}' moved, restarting countdown",
                self.player.id()
            );
            self.schedule_countdown(pending_match.teleport_time);
        }
    }

    fn on_pending_match_cancelled(&mut self, _pending_match: &PendingMatch) {
        if self.destroyed {
            return;
        }

        self.cancel_countdown();
        self.teleport_time = None;
        self.match_pending.store(false, Ordering::SeqCst);
        self.player.send_notice(Notice::info(format!(
            "{} match cancelled.",
            self.game_mode.friendly_name
        )));
    }

    fn notify_deletion(&mut self, reason: DeleteReason) {
        let text = match reason {
            DeleteReason::ManualDequeue => "You have been removed from the queue.",
            DeleteReason::GameModeDeleted => "The game mode you were in queue for has been disabled.",
            DeleteReason::MatchCreated | DeleteReason::Unknown => return,
        };
        self.player.send_notice(Notice::error(text));
    }

    fn destroy(&mut self) {
        self.destroyed = true;
        self.reminder.cancel();
        self.cancel_countdown();
    }
}
