//! Main application state and service coordination
//!
//! [`AppState`] holds the shared components and is handed to the HTTP layer;
//! [`QueueKeeperService`] owns what has a lifecycle: the event consumer, the
//! HTTP server task and the background maintenance tasks.

use crate::amqp::{AmqpConfig, AmqpConnection, MatchmakerEventConsumer};
use crate::commands::QueueCommands;
use crate::config::{AppConfig, GameModeCollection};
use crate::coordinator::{CoordinatorStats, SessionCoordinator};
use crate::messaging::MessagingHub;
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector};
use crate::player::{InMemoryPlayerRegistry, LocalPlayer};
use crate::rpc::{AmqpMatchmakerClient, MatchmakerService, StaticMatchmakerService};
use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Shared application state
pub struct AppState {
    config: AppConfig,
    players: Arc<InMemoryPlayerRegistry>,
    game_modes: Arc<GameModeCollection>,
    coordinator: Arc<SessionCoordinator>,
    commands: Arc<QueueCommands>,
    hub: Arc<MessagingHub>,
    metrics: Arc<MetricsCollector>,
    amqp_connection: Option<Arc<AmqpConnection>>,
    is_running: RwLock<bool>,
    started_at: Instant,
}

impl AppState {
    /// Connect to the broker and build every component. With `dry_run` no
    /// broker is contacted and an in-memory matchmaker answers RPCs.
    pub async fn new(config: AppConfig, dry_run: bool) -> Result<Self, ServiceError> {
        info!("Initializing queue-keeper");
        info!(
            "Configuration: service={}, amqp_url={}, dry_run={}",
            config.service.name, config.amqp.url, dry_run
        );

        if dry_run {
            warn!("Dry run: not connecting to AMQP, using an in-memory matchmaker");
            return Self::with_matchmaker(config, Arc::new(StaticMatchmakerService::new()), None);
        }

        let amqp_connection = Self::initialize_amqp(&config).await?;
        let matchmaker = AmqpMatchmakerClient::new(
            &amqp_connection,
            config.amqp.rpc_queue.clone(),
            config.rpc_timeout(),
        )
        .await
        .map_err(|e| ServiceError::Initialization {
            message: format!("Failed to initialize matchmaker client: {}", e),
        })?;

        Self::with_matchmaker(config, Arc::new(matchmaker), Some(amqp_connection))
    }

    /// Build the components around an existing matchmaker client
    pub fn with_matchmaker(
        config: AppConfig,
        matchmaker: Arc<dyn MatchmakerService>,
        amqp_connection: Option<Arc<AmqpConnection>>,
    ) -> Result<Self, ServiceError> {
        let metrics = Arc::new(MetricsCollector::new().map_err(|e| {
            ServiceError::Initialization {
                message: format!("Failed to create metrics collector: {}", e),
            }
        })?);

        let game_modes = Arc::new(Self::initialize_game_modes(&config)?);
        let players = Arc::new(InMemoryPlayerRegistry::new());

        let coordinator = Arc::new(
            SessionCoordinator::new(
                players.clone(),
                game_modes.clone(),
                matchmaker.clone(),
                config.sessions.clone(),
            )
            .with_metrics(metrics.clone()),
        );

        let hub = Arc::new(MessagingHub::new());
        coordinator
            .subscribe(&hub)
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to subscribe coordinator: {}", e),
            })?;

        let commands = Arc::new(
            QueueCommands::new(matchmaker, game_modes.clone()).with_metrics(metrics.clone()),
        );

        Ok(Self {
            config,
            players,
            game_modes,
            coordinator,
            commands,
            hub,
            metrics,
            amqp_connection,
            is_running: RwLock::new(false),
            started_at: Instant::now(),
        })
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub async fn set_running(&self, running: bool) {
        *self.is_running.write().await = running;
    }

    pub fn players(&self) -> &Arc<InMemoryPlayerRegistry> {
        &self.players
    }

    pub fn game_modes(&self) -> &Arc<GameModeCollection> {
        &self.game_modes
    }

    pub fn coordinator(&self) -> &Arc<SessionCoordinator> {
        &self.coordinator
    }

    pub fn commands(&self) -> &Arc<QueueCommands> {
        &self.commands
    }

    pub fn hub(&self) -> &Arc<MessagingHub> {
        &self.hub
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Get AMQP connection for health checks; `None` in a dry run
    pub fn amqp_connection(&self) -> Option<&Arc<AmqpConnection>> {
        self.amqp_connection.as_ref()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Register a player and restore their queue.
    ///
    /// Returns once recovery has finished, successfully or not.
    pub async fn connect_player(&self, player_id: &str, username: &str) -> Result<Arc<LocalPlayer>> {
        let player = match self.players.local_player(player_id) {
            Some(player) => player,
            None => {
                let player = Arc::new(LocalPlayer::new(player_id, username));
                self.players.connect(player.clone())?;
                player
            }
        };

        self.coordinator.handle_player_login(player_id).await;
        Ok(player)
    }

    /// Unregister a player, then close their session
    pub fn disconnect_player(&self, player_id: &str) -> Result<bool> {
        let removed = self.players.disconnect(player_id)?;
        self.coordinator.handle_player_disconnect(player_id);
        Ok(removed.is_some())
    }

    pub fn coordinator_stats(&self) -> Result<CoordinatorStats> {
        self.coordinator.get_stats()
    }

    fn initialize_game_modes(config: &AppConfig) -> Result<GameModeCollection, ServiceError> {
        match &config.sessions.game_modes_path {
            Some(path) => {
                let collection = GameModeCollection::load_from_file(path).map_err(|e| {
                    ServiceError::Configuration {
                        message: format!(
                            "Failed to load game modes from {}: {}",
                            path.display(),
                            e
                        ),
                    }
                })?;
                info!(
                    "Loaded {} game modes from {}",
                    collection.all_configs().len(),
                    path.display()
                );
                Ok(collection)
            }
            None => {
                warn!("No game modes file configured; every mode will be unresolved");
                Ok(GameModeCollection::new())
            }
        }
    }

    /// Initialize AMQP connection with retry logic
    async fn initialize_amqp(config: &AppConfig) -> Result<Arc<AmqpConnection>, ServiceError> {
        info!("Connecting to AMQP broker: {}", config.amqp.url);

        let amqp_config =
            AmqpConfig::from_settings(&config.amqp).map_err(|e| ServiceError::Configuration {
                message: format!("Failed to parse AMQP URL: {}", e),
            })?;

        let connection =
            AmqpConnection::new(amqp_config)
                .await
                .map_err(|e| ServiceError::AmqpConnection {
                    message: format!("Failed to connect to AMQP: {}", e),
                })?;

        Ok(Arc::new(connection))
    }
}

/// The running daemon
pub struct QueueKeeperService {
    state: Arc<AppState>,
    health_server: Arc<HealthServer>,
    event_consumer: Option<MatchmakerEventConsumer>,
    background_tasks: Vec<JoinHandle<()>>,
}

impl QueueKeeperService {
    pub fn new(state: Arc<AppState>) -> Self {
        let health_config = HealthServerConfig {
            port: state.config().service.http_port,
            host: "0.0.0.0".to_string(),
        };
        let health_server = Arc::new(
            HealthServer::new(health_config, state.metrics().clone()).with_app_state(state.clone()),
        );

        Self {
            state,
            health_server,
            event_consumer: None,
            background_tasks: Vec::new(),
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Start the HTTP server, event consumption and background tasks
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting queue-keeper");

        self.state.set_running(true).await;

        self.start_http_server().await;
        self.start_event_consumption().await?;
        self.start_background_tasks();

        info!("✅ queue-keeper started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of queue-keeper");

        self.state.set_running(false).await;

        if let Some(consumer) = &self.event_consumer {
            if let Err(e) = consumer.stop_consuming().await {
                warn!("Failed to stop event consumer: {}", e);
            } else {
                info!("✅ Event consumption stopped");
            }
        }

        if let Err(e) = self.health_server.stop().await {
            warn!("Failed to stop HTTP server: {}", e);
        }

        self.stop_background_tasks().await;

        // Close every session so no timers outlive the process' useful life
        for player_id in self.state.coordinator().session_player_ids() {
            self.state.coordinator().handle_player_disconnect(&player_id);
        }

        let final_stats = self
            .state
            .coordinator_stats()
            .map_err(|e| ServiceError::BackgroundTask {
                message: format!("Failed to get final stats: {}", e),
            })?;
        info!("Final coordinator statistics: {:?}", final_stats);

        info!("✅ queue-keeper shutdown completed");
        Ok(())
    }

    async fn start_http_server(&mut self) {
        let health_server = self.health_server.clone();
        let port = self.state.config().service.http_port;

        let handle = tokio::spawn(async move {
            if let Err(e) = health_server.start().await {
                error!("HTTP server failed: {}", e);
            } else {
                info!("HTTP server task completed");
            }
        });
        self.background_tasks.push(handle);

        // Give the server a moment to bind
        tokio::time::sleep(Duration::from_millis(100)).await;
        info!("✅ HTTP server started on port {}", port);
    }

    async fn start_event_consumption(&mut self) -> Result<(), ServiceError> {
        let Some(connection) = self.state.amqp_connection() else {
            info!("No AMQP connection, matchmaker events must be posted over HTTP");
            return Ok(());
        };

        let channel = connection
            .open_channel()
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to open consumer channel: {}", e),
            })?;

        let mut consumer =
            MatchmakerEventConsumer::new(channel, self.state.config().amqp.events_exchange.clone());
        consumer
            .start_consuming(self.state.hub().clone(), Some(self.state.metrics().clone()))
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to start consuming events: {}", e),
            })?;

        self.event_consumer = Some(consumer);
        Ok(())
    }

    fn start_background_tasks(&mut self) {
        if let Some(path) = self.state.config().sessions.game_modes_path.clone() {
            let state = self.state.clone();
            let reload_interval = state.config().game_modes_reload_interval();
            info!(
                "Starting game mode reload task ({}s interval)...",
                reload_interval.as_secs()
            );

            self.background_tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(reload_interval);
                interval.tick().await;

                while state.is_running().await {
                    interval.tick().await;

                    match state.game_modes().reload_from_file(&path) {
                        Ok(updates) if !updates.is_empty() => {
                            info!("Applied {} game mode updates", updates.len());
                        }
                        Ok(_) => debug!("Game modes unchanged"),
                        Err(e) => warn!("Game mode reload failed: {}", e),
                    }
                }

                info!("Game mode reload task stopped");
            }));
        }

        info!("Starting health metrics task (15s interval)...");
        let state = self.state.clone();
        self.background_tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(15));

            while state.is_running().await {
                interval.tick().await;

                let metrics = state.metrics();
                metrics.update_uptime(state.uptime());

                let amqp_healthy = state
                    .amqp_connection()
                    .map(|connection| connection.is_alive())
                    .unwrap_or(true);
                let coordinator_stats = state.coordinator_stats();

                metrics.update_component_health("amqp", amqp_healthy);
                metrics.update_component_health("coordinator", coordinator_stats.is_ok());
                metrics.update_health_status(if amqp_healthy && coordinator_stats.is_ok() {
                    2
                } else {
                    0
                });

                if let Ok(stats) = coordinator_stats {
                    metrics.update_from_coordinator_stats(&stats);
                }
            }

            info!("Health metrics task stopped");
        }));

        info!(
            "{} background tasks started",
            self.background_tasks.len()
        );
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            return;
        }

        info!("Stopping {} background tasks...", task_count);
        for (i, task) in self.background_tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}
