//! WhatsJet - campaign delivery service entry point

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use whatsjet_api::AppState;
use whatsjet_common::config::{Config, LoggingConfig};
use whatsjet_core::{
    CampaignManager, Dispatcher, GraphApiProvider, InboundProcessor, Metrics, PgJobQueue,
    Scheduler, SendWorker, VendorRateLimiter,
};
use whatsjet_storage::{DatabasePool, Storage};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting WhatsJet campaign service...");

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;
    info!("Database connection established");

    // Run migrations
    db_pool.migrate().await?;
    info!("Database migrations completed");

    let storage = Storage::postgres(db_pool.clone());
    let queue = Arc::new(
        PgJobQueue::new(db_pool.clone()).with_visibility_timeout(config.job_visibility_timeout()),
    );
    let metrics = Arc::new(Metrics::new()?);
    let provider = Arc::new(GraphApiProvider::new(&config.provider)?);

    // Campaign pipeline
    let limiter = Arc::new(VendorRateLimiter::new(&config.dispatch));
    let dispatcher = Arc::new(Dispatcher::new(
        storage.clone(),
        queue.clone(),
        limiter,
        &config.dispatch,
    ));
    let manager = Arc::new(CampaignManager::new(
        storage.clone(),
        dispatcher,
        metrics.clone(),
    ));
    let worker = Arc::new(SendWorker::new(
        storage.clone(),
        queue,
        provider,
        manager.clone(),
        metrics.clone(),
        &config.worker,
    )?);
    let processor = Arc::new(InboundProcessor::new(
        storage.clone(),
        manager.clone(),
        metrics.clone(),
        &config.inbound,
    ));
    let scheduler = Scheduler::new(storage.clone(), manager.clone(), &config.scheduler);

    // Start send workers
    let worker_handle = tokio::spawn(worker.run());

    // Start scheduler
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run().await;
    });

    // Pick up campaigns that were RUNNING when the process stopped
    manager.resume_running().await?;

    // Start API server
    let api_handle = {
        let app = whatsjet_api::create_router(AppState {
            storage,
            manager: manager.clone(),
            processor,
            metrics,
            db_pool: Some(db_pool.clone()),
            app_secret: config.provider.app_secret.clone(),
        });
        let addr = format!("{}:{}", config.api.bind_address, config.api.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind API server to {}", addr))?;
        info!("Starting API server on {}", addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("API server error: {}", e);
            }
        })
    };

    info!("WhatsJet started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // Unacknowledged jobs are redelivered after their visibility timeout.
    api_handle.abort();
    scheduler_handle.abort();
    worker_handle.abort();

    info!("WhatsJet shutdown complete");

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},whatsjet=debug", config.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
