//! Reputation scoring
//!
//! Scores an account 0-100 from a rolling 7-day window of its logs and job
//! outcomes:
//!
//! ```text
//! spam_rate        = spam / sent
//! bounce_rate      = failed_jobs / (sent + failed_jobs)
//! reply_rate       = replied / sent
//! variability      = stddev(daily sent) / mean(daily sent), clamped to [0, 1]
//! negative_signals = min(1, variability + max(0, 0.3 - reply_rate))
//! score            = 100 - (40 * spam_rate + 25 * bounce_rate + 20 * negative_signals)
//! ```
//!
//! Rates are 0 without sends, and so is the reply shortfall. The trend
//! applies the same formula to each day of the window on its own.

use crate::clock::Clock;
use crate::engine::Stores;
use chrono::{Duration, NaiveDate};
use mailwarm_common::types::{EmailDirection, MailAccountId, WarmupJobStatus};
use mailwarm_common::Result;
use mailwarm_storage::models::{WarmupEmailLog, WarmupJob};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Days covered by a score
pub const WINDOW_DAYS: i64 = 7;

const SPAM_WEIGHT: f64 = 40.0;
const BOUNCE_WEIGHT: f64 = 25.0;
const NEGATIVE_WEIGHT: f64 = 20.0;
const TARGET_REPLY_RATE: f64 = 0.3;

/// Health label for a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReputationLabel {
    Healthy,
    Normal,
    AtRisk,
    Critical,
}

impl ReputationLabel {
    pub fn for_score(score: f64) -> Self {
        if score >= 85.0 {
            Self::Healthy
        } else if score >= 70.0 {
            Self::Normal
        } else if score >= 50.0 {
            Self::AtRisk
        } else {
            Self::Critical
        }
    }
}

impl std::fmt::Display for ReputationLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "Healthy"),
            Self::Normal => write!(f, "Normal"),
            Self::AtRisk => write!(f, "At risk"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}

/// Counts feeding one score
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ActivityCounts {
    pub sent: u32,
    pub spam: u32,
    pub replied: u32,
    pub failed_jobs: u32,
    /// Sent count per day that had at least one send
    pub daily_sent: Vec<u32>,
}

impl ActivityCounts {
    fn record_log(&mut self, log: &WarmupEmailLog) {
        match log.direction {
            EmailDirection::Sent => self.sent += 1,
            EmailDirection::Replied => self.replied += 1,
            EmailDirection::Received => {}
        }
        if log.is_spam {
            self.spam += 1;
        }
    }

    fn record_job(&mut self, job: &WarmupJob) {
        if job.status == WarmupJobStatus::Failed {
            self.failed_jobs += 1;
        }
    }

    pub fn spam_rate(&self) -> f64 {
        if self.sent == 0 {
            return 0.0;
        }
        (f64::from(self.spam) / f64::from(self.sent)).min(1.0)
    }

    pub fn bounce_rate(&self) -> f64 {
        let attempts = self.sent + self.failed_jobs;
        if attempts == 0 {
            return 0.0;
        }
        f64::from(self.failed_jobs) / f64::from(attempts)
    }

    pub fn reply_rate(&self) -> f64 {
        if self.sent == 0 {
            return 0.0;
        }
        f64::from(self.replied) / f64::from(self.sent)
    }

    /// Coefficient of variation of the daily send volume
    pub fn variability(&self) -> f64 {
        if self.daily_sent.len() < 2 {
            return 0.0;
        }
        let n = self.daily_sent.len() as f64;
        let mean = self.daily_sent.iter().map(|&c| f64::from(c)).sum::<f64>() / n;
        if mean == 0.0 {
            return 0.0;
        }
        let variance = self
            .daily_sent
            .iter()
            .map(|&c| (f64::from(c) - mean).powi(2))
            .sum::<f64>()
            / n;
        (variance.sqrt() / mean).clamp(0.0, 1.0)
    }

    pub fn negative_signals(&self) -> f64 {
        let reply_shortfall = if self.sent == 0 {
            0.0
        } else {
            (TARGET_REPLY_RATE - self.reply_rate()).max(0.0)
        };
        (self.variability() + reply_shortfall).min(1.0)
    }

    /// Score in [0, 100], rounded to two decimals
    pub fn score(&self) -> f64 {
        let raw = 100.0
            - (SPAM_WEIGHT * self.spam_rate()
                + BOUNCE_WEIGHT * self.bounce_rate()
                + NEGATIVE_WEIGHT * self.negative_signals());
        (raw.clamp(0.0, 100.0) * 100.0).round() / 100.0
    }
}

/// Score for one account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReputationScore {
    pub account_id: MailAccountId,
    pub email_address: String,
    pub score: f64,
    pub label: ReputationLabel,
    /// Daily scores, oldest day first
    pub trend: Vec<f64>,
}

/// Score and trend for one account's window
///
/// `days` lists the local dates of the window in order; logs and jobs
/// falling outside it count toward the total but not the trend.
pub fn score_window(
    clock: &dyn Clock,
    days: &[NaiveDate],
    logs: &[&WarmupEmailLog],
    jobs: &[&WarmupJob],
) -> (f64, Vec<f64>) {
    let mut total = ActivityCounts::default();
    let mut per_day: BTreeMap<NaiveDate, ActivityCounts> = BTreeMap::new();

    for log in logs {
        total.record_log(log);
        per_day
            .entry(clock.local_date(log.activity_at()))
            .or_default()
            .record_log(log);
    }
    for job in jobs {
        total.record_job(job);
        per_day
            .entry(clock.local_date(job.executed_at.unwrap_or(job.scheduled_at)))
            .or_default()
            .record_job(job);
    }

    total.daily_sent = per_day
        .values()
        .map(|c| c.sent)
        .filter(|&sent| sent > 0)
        .collect();

    let trend = days
        .iter()
        .map(|day| per_day.get(day).map_or(100.0, ActivityCounts::score))
        .collect();

    (total.score(), trend)
}

/// Reputation scores computed from the stores
pub struct ReputationService {
    stores: Stores,
    clock: Arc<dyn Clock>,
}

impl ReputationService {
    pub fn new(stores: Stores, clock: Arc<dyn Clock>) -> Self {
        Self { stores, clock }
    }

    /// Score each known account over the last seven local days
    pub async fn scores(&self, account_ids: &[MailAccountId]) -> Result<Vec<ReputationScore>> {
        if account_ids.is_empty() {
            return Ok(Vec::new());
        }

        let today = self.clock.today();
        let days: Vec<NaiveDate> = (0..WINDOW_DAYS)
            .rev()
            .map(|back| today - Duration::days(back))
            .collect();
        let (from, _) = self.clock.day_bounds(days[0]);
        let (_, to) = self.clock.day_bounds(today);

        let logs = self
            .stores
            .logs
            .query_by_accounts(account_ids, from, to)
            .await?;
        let jobs = self
            .stores
            .jobs
            .list_in_range(account_ids, from, to)
            .await?;

        let mut scores = Vec::with_capacity(account_ids.len());
        for &account_id in account_ids {
            let Some(account) = self.stores.accounts.get(account_id).await? else {
                debug!(account_id = %account_id, "Skipping score for unknown account");
                continue;
            };

            let account_logs: Vec<_> = logs
                .iter()
                .filter(|l| l.mail_account_id == account_id)
                .collect();
            let account_jobs: Vec<_> = jobs
                .iter()
                .filter(|j| j.mail_account_id == account_id)
                .collect();
            let (score, trend) =
                score_window(self.clock.as_ref(), &days, &account_logs, &account_jobs);

            scores.push(ReputationScore {
                account_id,
                email_address: account.email_address,
                score,
                label: ReputationLabel::for_score(score),
                trend,
            });
        }

        Ok(scores)
    }
}
