//! MailWarm - warmup service entry point

use anyhow::Result;
use mailwarm_common::config::{Config, LoggingConfig};
use mailwarm_core::{
    clock_from_config, run_daily_scheduler, run_job_executor, summarize, Clock,
    DefaultBackendResolver, EngineSettings, GmailBackend, InboxMonitor, InboxRescueQueue,
    ReputationService, SharedRng, SmtpBackend, Stores, WarmupEngine,
};
use mailwarm_storage::DatabasePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    init_logging(&config.logging);
    info!("Starting MailWarm warmup service...");

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;
    db_pool.health_check().await?;

    // Run migrations
    db_pool.migrate().await?;

    let stores = Stores::from_pool(db_pool);
    let clock = clock_from_config(&config.warmup)?;
    let rng = SharedRng::from_seed(config.warmup.rng_seed);

    // Mail backends
    let gmail = Arc::new(GmailBackend::new(config.gmail.clone(), clock.clone())?);
    let smtp = Arc::new(SmtpBackend::new(config.smtp.clone()));
    let resolver = Arc::new(DefaultBackendResolver::new(gmail, smtp));

    let rescue_queue = Arc::new(InboxRescueQueue::new());
    let engine = Arc::new(
        WarmupEngine::new(
            stores.clone(),
            resolver,
            clock.clone(),
            rng,
            EngineSettings::from_config(&config),
        )
        .with_rescue_queue(rescue_queue),
    );

    report_fleet(&engine, &stores, clock.clone()).await;

    let cancel = CancellationToken::new();

    // Start daily scheduler
    let scheduler_handle = {
        let engine = engine.clone();
        let cancel = cancel.clone();
        let hour = config.warmup.daily_trigger_hour;
        tokio::spawn(async move { run_daily_scheduler(engine, hour, cancel).await })
    };

    // Start job executor
    let executor_handle = {
        let engine = engine.clone();
        let cancel = cancel.clone();
        let interval = config.warmup.execution_interval_secs;
        tokio::spawn(async move { run_job_executor(engine, interval, cancel).await })
    };

    // Start inbox monitor
    let monitor_handle = {
        let monitor = InboxMonitor::new(engine.clone(), &config.warmup);
        let cancel = cancel.clone();
        tokio::spawn(async move { monitor.run(cancel).await })
    };

    info!("MailWarm started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    cancel.cancel();
    for (name, handle) in [
        ("daily scheduler", scheduler_handle),
        ("job executor", executor_handle),
        ("inbox monitor", monitor_handle),
    ] {
        if let Err(e) = handle.await {
            error!("Task error in {}: {}", name, e);
        }
    }

    info!("MailWarm shutdown complete");

    Ok(())
}

/// Check credentials and log the fleet's state before the loops start
async fn report_fleet(engine: &WarmupEngine, stores: &Stores, clock: Arc<dyn Clock>) {
    let accounts = match stores.accounts.get_connected().await {
        Ok(accounts) => accounts,
        Err(e) => {
            warn!("Failed to load connected accounts: {}", e);
            return;
        }
    };

    for account in &accounts {
        if let Err(e) = engine.validate_account(account).await {
            warn!(
                account_id = %account.id,
                "Mail account failed validation: {}", e
            );
        }
    }

    match summarize(stores, clock.as_ref(), &accounts).await {
        Ok(summary) => info!(
            "Fleet: {} active accounts, {} sent today, {} replies today, {} jobs pending",
            summary.active_accounts,
            summary.sent_today,
            summary.replies_today,
            summary.pending_jobs
        ),
        Err(e) => warn!("Failed to summarize fleet: {}", e),
    }

    let ids: Vec<_> = accounts.iter().map(|a| a.id).collect();
    match ReputationService::new(stores.clone(), clock).scores(&ids).await {
        Ok(scores) => {
            for score in scores {
                info!(
                    account_id = %score.account_id,
                    "Reputation for {}: {:.1} ({})",
                    score.email_address, score.score, score.label
                );
            }
        }
        Err(e) => warn!("Failed to score accounts: {}", e),
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_level(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
