//! Inbox monitor - periodically scans warmup inboxes
//!
//! Each tick scans accounts queued for rescue first, then any warmed
//! account whose last full scan is older than the full-scan interval.

use crate::engine::WarmupEngine;
use chrono::Duration;
use mailwarm_common::config::WarmupConfig;
use mailwarm_common::types::MailAccountId;
use mailwarm_common::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::{interval, Duration as TokioDuration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Inbox monitor
pub struct InboxMonitor {
    engine: Arc<WarmupEngine>,
    tick_secs: u64,
    full_scan_interval: Duration,
}

impl InboxMonitor {
    pub fn new(engine: Arc<WarmupEngine>, config: &WarmupConfig) -> Self {
        Self {
            engine,
            tick_secs: config.inbox_tick_secs.max(1),
            full_scan_interval: Duration::seconds(config.full_scan_interval_secs as i64),
        }
    }

    /// Run ticks until cancelled
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = interval(TokioDuration::from_secs(self.tick_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Inbox monitor started (tick: {}s, full scan: {}s)",
            self.tick_secs,
            self.full_scan_interval.num_seconds()
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("Inbox monitor tick failed: {}", e);
                    }
                }
            }
        }

        info!("Inbox monitor stopped");
    }

    /// Scan every account that is due; returns the number scanned
    pub async fn tick(&self) -> Result<usize> {
        let targets = self.due_accounts().await?;
        if targets.is_empty() {
            return Ok(0);
        }

        let clock = self.engine.clock();
        let accounts = &self.engine.stores().accounts;
        for account_id in &targets {
            if let Err(e) = self.engine.scan_account(*account_id).await {
                warn!(account_id = %account_id, "Inbox scan failed: {}", e);
            }
            if let Err(e) = accounts.touch_inbox_scan(*account_id, clock.now()).await {
                warn!(account_id = %account_id, "Failed to record inbox scan: {}", e);
            }
        }

        debug!("Inbox monitor scanned {} accounts", targets.len());
        Ok(targets.len())
    }

    /// Rescue-queued accounts in arrival order, then accounts due a full scan
    async fn due_accounts(&self) -> Result<Vec<MailAccountId>> {
        let clock = self.engine.clock();
        let stores = self.engine.stores();

        let warmed: HashSet<MailAccountId> = stores
            .profiles
            .get_active_profiles(clock.today())
            .await?
            .into_iter()
            .map(|p| p.mail_account_id)
            .collect();
        let connected: Vec<_> = stores
            .accounts
            .get_connected()
            .await?
            .into_iter()
            .filter(|a| warmed.contains(&a.id))
            .collect();

        // Drained only once the stores have answered
        let queued = self.engine.rescue_queue().drain();
        let now = clock.now();
        let mut targets: Vec<MailAccountId> = queued
            .into_iter()
            .filter(|id| connected.iter().any(|a| a.id == *id))
            .collect();
        for account in &connected {
            let due = account
                .last_inbox_scan_at
                .map_or(true, |at| now - at >= self.full_scan_interval);
            if due && !targets.contains(&account.id) {
                targets.push(account.id);
            }
        }

        Ok(targets)
    }
}
