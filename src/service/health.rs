//! Health check endpoints and monitoring
//!
//! This module provides health check functionality for queue-keeper,
//! including readiness and liveness probes.

use crate::service::app::AppState;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    pub version: String,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional error message if unhealthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    pub online_players: usize,
    pub active_sessions: usize,
    pub cached_tickets: usize,
    pub cached_pending_matches: usize,
    pub events_processed: u64,
    pub events_failed: u64,
    pub restores_succeeded: u64,
    pub restores_failed: u64,
    pub uptime_seconds: u64,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(app_state: Arc<AppState>) -> Result<Self> {
        let checks = vec![
            Self::check_service_running(&app_state).await,
            Self::check_coordinator(&app_state),
            Self::check_amqp_health(&app_state),
            Self::check_game_modes(&app_state),
        ];

        let status = Self::combine(&checks);
        let stats = Self::gather_service_stats(&app_state);

        Ok(HealthCheck {
            status,
            service: app_state.config().service.name.clone(),
            version: crate::VERSION.to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if app_state.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - running, coordinator reachable and broker up
    pub async fn readiness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if !app_state.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        let checks = [
            Self::check_coordinator(&app_state),
            Self::check_amqp_health(&app_state),
        ];
        Ok(Self::combine(&checks))
    }

    fn combine(checks: &[ComponentCheck]) -> HealthStatus {
        let mut overall = HealthStatus::Healthy;
        for check in checks {
            match check.status {
                HealthStatus::Unhealthy => return HealthStatus::Unhealthy,
                HealthStatus::Degraded => overall = HealthStatus::Degraded,
                HealthStatus::Healthy => {}
            }
        }
        overall
    }

    /// Check if service is running
    async fn check_service_running(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = if app_state.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn check_coordinator(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = match app_state.coordinator_stats() {
            Ok(stats) if stats.events_failed > 0 => (
                HealthStatus::Degraded,
                Some(format!("{} bus events failed", stats.events_failed)),
            ),
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => {
                error!("Coordinator stats check failed: {}", e);
                (
                    HealthStatus::Unhealthy,
                    Some(format!("Stats check failed: {}", e)),
                )
            }
        };

        ComponentCheck {
            name: "session_coordinator".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn check_amqp_health(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = match app_state.amqp_connection() {
            Some(connection) if connection.is_alive() => (HealthStatus::Healthy, None),
            Some(_) => (
                HealthStatus::Unhealthy,
                Some("AMQP connection is closed".to_string()),
            ),
            None => (
                HealthStatus::Healthy,
                Some("AMQP disabled (dry run)".to_string()),
            ),
        };

        ComponentCheck {
            name: "amqp_connection".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn check_game_modes(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();
        let enabled = app_state.game_modes().enabled_configs().len();

        let (status, message) = if enabled == 0 {
            (
                HealthStatus::Degraded,
                Some("No enabled game modes".to_string()),
            )
        } else {
            (HealthStatus::Healthy, None)
        };

        ComponentCheck {
            name: "game_modes".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn gather_service_stats(app_state: &AppState) -> ServiceStats {
        let uptime_seconds = app_state.uptime().as_secs();
        let online_players = app_state.players().online_count();

        match app_state.coordinator_stats() {
            Ok(stats) => ServiceStats {
                online_players,
                active_sessions: stats.active_sessions,
                cached_tickets: stats.cached_tickets,
                cached_pending_matches: stats.cached_pending_matches,
                events_processed: stats.events_processed,
                events_failed: stats.events_failed,
                restores_succeeded: stats.restores_succeeded,
                restores_failed: stats.restores_failed,
                uptime_seconds,
            },
            Err(e) => {
                debug!("Failed to get coordinator stats for health check: {}", e);
                ServiceStats {
                    online_players,
                    uptime_seconds,
                    ..ServiceStats::default()
                }
            }
        }
    }
}

impl HealthCheck {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
