//! Reseller Monitor - affiliate swap monitoring service
//!
//! This is the main entry point. It wires the explorer client, cursor store,
//! live stats, log buffer and notifier together, spawns one polling task per
//! affiliate and serves the reporting API until SIGINT/SIGTERM.

use anyhow::Context;
use chrono::Utc;
use futures_util::future::join_all;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use reseller_monitor::config::AppConfig;
use reseller_monitor::db;
use reseller_monitor::handlers::{api_router, AppState, CredentialFlags};
use reseller_monitor::metrics::MetricsState;
use reseller_monitor::monitoring::{
    start_polling_task, start_summary_task, AffiliatePoller, CursorStore, ExplorerClient,
    LabelResolver, LogBuffer, MonitorContext, PollerSettings, SqliteCursorStore,
    StatsAggregator, TransactionSource,
};
use reseller_monitor::notifications::{NotificationSink, Notifier, TelegramClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    tracing::info!("Starting Reseller Monitor v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = load_config()?;
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        affiliates = config.affiliates.len(),
        monitoring = config.monitoring.enabled,
        telegram = config.telegram.enabled,
        "Configuration loaded"
    );

    // Initialize database
    let db_pool = db::init_pool(&config.database).await?;
    db::run_migrations(&db_pool).await?;
    tracing::info!("Database initialized");

    let cursors: Arc<dyn CursorStore> = Arc::new(SqliteCursorStore::new(db_pool.clone()));
    let labels = Arc::new(LabelResolver::with_tokens(&config.tokens));
    let aggregator = Arc::new(StatsAggregator::new(&config.affiliates));
    let log = Arc::new(LogBuffer::new(config.monitoring.log_capacity));
    let metrics = Arc::new(MetricsState::new());

    let sink: Option<Arc<dyn NotificationSink>> = if config.telegram.enabled {
        Some(Arc::new(TelegramClient::new(&config.telegram)?))
    } else {
        tracing::warn!("Telegram notifications disabled");
        None
    };
    let notifier = Arc::new(Notifier::new(
        sink,
        &config.affiliates,
        config.telegram.main_chat_id,
        config.telegram.title_min_interval_secs,
        labels.clone(),
    ));

    let source: Arc<dyn TransactionSource> = Arc::new(ExplorerClient::new(&config.explorer)?);

    let ctx = MonitorContext {
        source,
        cursors: cursors.clone(),
        aggregator: aggregator.clone(),
        log: log.clone(),
        labels,
        notifier,
        metrics: metrics.clone(),
    };

    let cancel_token = CancellationToken::new();
    let mut tasks = Vec::new();
    let mut pollers = Vec::new();

    if config.monitoring.enabled {
        let settings = PollerSettings::from(&config.monitoring);
        for affiliate in &config.affiliates {
            let poller = Arc::new(AffiliatePoller::new(
                affiliate.clone(),
                ctx.clone(),
                settings.clone(),
            )?);
            pollers.push(poller.clone());
            tasks.push(tokio::spawn(start_polling_task(
                poller,
                config.monitoring.poll_interval_secs,
                cancel_token.clone(),
            )));
        }
        tracing::info!(count = pollers.len(), "Affiliate polling tasks started");

        tasks.push(tokio::spawn(start_summary_task(
            pollers.clone(),
            ctx.clone(),
            config.monitoring.description_interval_secs,
            cancel_token.clone(),
        )));
    } else {
        tracing::warn!("Monitoring disabled - serving reports only");
    }

    // Create shared state
    let app_state = Arc::new(AppState {
        started_at: Utc::now(),
        monitor_enabled: config.monitoring.enabled,
        log,
        aggregator,
        cursors,
        pollers,
        credentials: CredentialFlags {
            explorer_jwt: config.has_explorer_jwt(),
            telegram_bot_token: config.has_bot_token(),
        },
    });

    let app = api_router(app_state, metrics);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Server listening");

    tokio::spawn(shutdown_signal(cancel_token.clone()));

    let server_cancel = cancel_token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_cancel.cancelled().await })
        .await?;

    // Pollers finish the page in flight before exiting
    cancel_token.cancel();
    for result in join_all(tasks).await {
        if let Err(e) = result {
            tracing::error!(error = %e, "Background task panicked");
        }
    }

    db_pool.close().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Cancel `token` on SIGINT or SIGTERM
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }

    token.cancel();
}

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reseller_monitor=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Load and validate configuration
fn load_config() -> anyhow::Result<AppConfig> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

    Ok(config)
}
