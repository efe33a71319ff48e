//! Metrics collection using Prometheus
//!
//! Counters and gauges for the session coordinator, the bus consumer and
//! the player command surface.

use crate::coordinator::CoordinatorStats;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};
use std::sync::Arc;
use std::time::Duration;

/// Main metrics collector for the queue-keeper service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Session lifecycle and projection metrics
    session_metrics: SessionMetrics,

    /// Bus event and restore metrics
    event_metrics: EventMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Total AMQP messages consumed
    pub amqp_messages_total: IntCounterVec,

    /// AMQP message processing errors
    pub amqp_errors_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Session lifecycle metrics
#[derive(Clone)]
pub struct SessionMetrics {
    /// Sessions currently registered
    pub active_sessions: IntGauge,

    /// Sessions created, by what created them
    pub sessions_created_total: IntCounterVec,

    /// Sessions destroyed, by reason
    pub sessions_destroyed_total: IntCounterVec,

    /// Tickets held in the projection store
    pub cached_tickets: IntGauge,

    /// Pending matches held in the projection store
    pub cached_pending_matches: IntGauge,
}

/// Bus event, restore and command metrics
#[derive(Clone)]
pub struct EventMetrics {
    /// Bus events handled by the coordinator
    pub events_total: IntCounterVec,

    /// Time spent handling a bus event
    pub event_duration: HistogramVec,

    /// Login restores, by outcome
    pub restores_total: IntCounterVec,

    /// Time spent restoring a player's queue on login
    pub restore_duration: Histogram,

    /// Player commands, by command and result
    pub commands_total: IntCounterVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let session_metrics = SessionMetrics::new(&registry)?;
        let event_metrics = EventMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            session_metrics,
            event_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn sessions(&self) -> &SessionMetrics {
        &self.session_metrics
    }

    pub fn events(&self) -> &EventMetrics {
        &self.event_metrics
    }

    /// Refresh gauges from coordinator stats
    pub fn update_from_coordinator_stats(&self, stats: &CoordinatorStats) {
        self.session_metrics
            .active_sessions
            .set(stats.active_sessions as i64);
        self.session_metrics
            .cached_tickets
            .set(stats.cached_tickets as i64);
        self.session_metrics
            .cached_pending_matches
            .set(stats.cached_pending_matches as i64);
    }

    /// Record a bus event handled by the coordinator
    pub fn record_event(&self, event_type: &str, success: bool, duration: Duration) {
        let outcome = if success { "ok" } else { "error" };

        self.event_metrics
            .events_total
            .with_label_values(&[event_type, outcome])
            .inc();

        self.event_metrics
            .event_duration
            .with_label_values(&[event_type])
            .observe(duration.as_secs_f64());
    }

    pub fn record_session_created(&self, source: &str) {
        self.session_metrics
            .sessions_created_total
            .with_label_values(&[source])
            .inc();
    }

    pub fn record_session_destroyed(&self, reason: &str) {
        self.session_metrics
            .sessions_destroyed_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Record a login restore attempt
    pub fn record_restore(&self, outcome: &str, duration: Duration) {
        self.event_metrics
            .restores_total
            .with_label_values(&[outcome])
            .inc();

        self.event_metrics
            .restore_duration
            .observe(duration.as_secs_f64());
    }

    pub fn record_command(&self, command: &str, result: &str) {
        self.event_metrics
            .commands_total
            .with_label_values(&[command, result])
            .inc();
    }

    /// Record an AMQP message consumed from the events queue
    pub fn record_amqp_message(&self, routing_key: &str, success: bool) {
        let status = if success { "success" } else { "error" };

        self.service_metrics
            .amqp_messages_total
            .with_label_values(&[routing_key, status])
            .inc();

        if !success {
            self.service_metrics
                .amqp_errors_total
                .with_label_values(&[routing_key])
                .inc();
        }
    }

    pub fn update_uptime(&self, uptime: Duration) {
        self.service_metrics
            .uptime_seconds
            .set(uptime.as_secs() as i64);
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("queue_keeper_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let amqp_messages_total = IntCounterVec::new(
            Opts::new(
                "queue_keeper_amqp_messages_total",
                "Total AMQP messages consumed",
            ),
            &["routing_key", "status"],
        )?;
        registry.register(Box::new(amqp_messages_total.clone()))?;

        let amqp_errors_total = IntCounterVec::new(
            Opts::new("queue_keeper_amqp_errors_total", "Total AMQP errors"),
            &["routing_key"],
        )?;
        registry.register(Box::new(amqp_errors_total.clone()))?;

        let health_status = IntGauge::new(
            "queue_keeper_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("queue_keeper_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            amqp_messages_total,
            amqp_errors_total,
            health_status,
            component_health,
        })
    }
}

impl SessionMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_sessions =
            IntGauge::new("queue_keeper_active_sessions", "Sessions currently registered")?;
        registry.register(Box::new(active_sessions.clone()))?;

        let sessions_created_total = IntCounterVec::new(
            Opts::new("queue_keeper_sessions_created_total", "Total sessions created"),
            &["source"],
        )?;
        registry.register(Box::new(sessions_created_total.clone()))?;

        let sessions_destroyed_total = IntCounterVec::new(
            Opts::new(
                "queue_keeper_sessions_destroyed_total",
                "Total sessions destroyed",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(sessions_destroyed_total.clone()))?;

        let cached_tickets = IntGauge::new(
            "queue_keeper_cached_tickets",
            "Tickets held in the projection store",
        )?;
        registry.register(Box::new(cached_tickets.clone()))?;

        let cached_pending_matches = IntGauge::new(
            "queue_keeper_cached_pending_matches",
            "Pending matches held in the projection store",
        )?;
        registry.register(Box::new(cached_pending_matches.clone()))?;

        Ok(Self {
            active_sessions,
            sessions_created_total,
            sessions_destroyed_total,
            cached_tickets,
            cached_pending_matches,
        })
    }
}

impl EventMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let events_total = IntCounterVec::new(
            Opts::new("queue_keeper_events_total", "Bus events handled"),
            &["event_type", "outcome"],
        )?;
        registry.register(Box::new(events_total.clone()))?;

        let event_duration = HistogramVec::new(
            HistogramOpts::new(
                "queue_keeper_event_duration_seconds",
                "Bus event handling time",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1]),
            &["event_type"],
        )?;
        registry.register(Box::new(event_duration.clone()))?;

        let restores_total = IntCounterVec::new(
            Opts::new("queue_keeper_restores_total", "Login queue restores"),
            &["outcome"],
        )?;
        registry.register(Box::new(restores_total.clone()))?;

        let restore_duration = Histogram::with_opts(
            HistogramOpts::new(
                "queue_keeper_restore_duration_seconds",
                "Login queue restore time",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(restore_duration.clone()))?;

        let commands_total = IntCounterVec::new(
            Opts::new("queue_keeper_commands_total", "Player commands handled"),
            &["command", "result"],
        )?;
        registry.register(Box::new(commands_total.clone()))?;

        Ok(Self {
            events_total,
            event_duration,
            restores_total,
            restore_duration,
            commands_total,
        })
    }
}
