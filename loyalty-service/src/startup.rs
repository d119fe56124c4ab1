//! Application startup and lifecycle management.

use axum::Router;
use chrono::Utc;
use service_core::error::AppError;
use service_core::middleware::rate_limit::KeyedRateLimiter;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;

use crate::config::LoyaltyConfig;
use crate::services::{LoyaltyDb, LoyaltyStore, RandomCodeGenerator, TierEngine};
use crate::{build_router, AppState};

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    engine: TierEngine,
    rate_limiter: KeyedRateLimiter,
    sweep_interval: Duration,
}

impl Application {
    /// Connect to MongoDB and build the application.
    pub async fn build(config: LoyaltyConfig) -> Result<Self, AppError> {
        let db = LoyaltyDb::connect(&config.mongodb.uri, &config.mongodb.database).await?;

        db.initialize_indexes().await.map_err(|e| {
            tracing::error!("Failed to initialize database indexes: {}", e);
            e
        })?;

        Self::with_store(config, Arc::new(db)).await
    }

    /// Build the application over an already prepared store.
    pub async fn with_store(
        config: LoyaltyConfig,
        store: Arc<dyn LoyaltyStore>,
    ) -> Result<Self, AppError> {
        let codes = RandomCodeGenerator::new(
            config.rewards.coupon_prefix.clone(),
            config.rewards.code_length,
        );
        let engine = TierEngine::new(
            Arc::clone(&store),
            config.rewards.tiers.clone(),
            Arc::new(codes),
            config.rewards.coupon_policy(),
        );

        let rate_limiter =
            KeyedRateLimiter::new(config.rate_limit.requests, config.rate_limit.window_seconds)?;

        let state = AppState {
            config: config.clone(),
            store,
            engine: engine.clone(),
        };
        let router = build_router(state, rate_limiter.clone());

        // Bind HTTP listener (port 0 = random port for testing)
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port,
            tiers = engine.tiers().iter().count(),
            "Loyalty service ready"
        );

        Ok(Self {
            port,
            listener,
            router,
            engine,
            rate_limiter,
            sweep_interval: Duration::from_secs(config.sweep_interval_seconds.max(1)),
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until SIGINT/SIGTERM. A background task expires overdue coupons
    /// and evicts idle rate-limit keys on every sweep interval.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let sweeper = tokio::spawn(run_sweeps(
            self.engine,
            self.rate_limiter,
            self.sweep_interval,
        ));

        tracing::info!("Listening on port {}", self.port);
        let result = axum::serve(
            self.listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        sweeper.abort();

        result.map_err(|e| {
            tracing::error!("HTTP server error: {}", e);
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}

async fn run_sweeps(engine: TierEngine, rate_limiter: KeyedRateLimiter, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;

        if let Err(e) = engine.expire_overdue_coupons(Utc::now()).await {
            tracing::warn!(error = %e, "Coupon expiry sweep failed");
        }

        let tracked = rate_limiter.sweep();
        tracing::debug!(tracked, "Rate limiter swept");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
