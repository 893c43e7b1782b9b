//! Dashboard counters

use crate::clock::Clock;
use crate::engine::Stores;
use mailwarm_common::types::EmailDirection;
use mailwarm_common::Result;
use mailwarm_storage::models::MailAccount;
use serde::Serialize;

/// Today's activity across a set of accounts
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub active_accounts: usize,
    pub sent_today: usize,
    pub replies_today: usize,
    pub pending_jobs: i64,
}

/// Summarize `accounts` for the current local day
pub async fn summarize(
    stores: &Stores,
    clock: &dyn Clock,
    accounts: &[MailAccount],
) -> Result<DashboardSummary> {
    if accounts.is_empty() {
        return Ok(DashboardSummary::default());
    }

    let ids: Vec<_> = accounts.iter().map(|a| a.id).collect();
    let (start, end) = clock.day_bounds(clock.today());
    let logs = stores.logs.query_by_accounts(&ids, start, end).await?;

    Ok(DashboardSummary {
        active_accounts: accounts.iter().filter(|a| a.is_connected()).count(),
        sent_today: logs
            .iter()
            .filter(|l| l.direction == EmailDirection::Sent)
            .count(),
        replies_today: logs
            .iter()
            .filter(|l| l.direction == EmailDirection::Replied)
            .count(),
        pending_jobs: stores.jobs.count_pending(&ids).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedOffsetClock;
    use crate::engine::tests::{account, start};
    use chrono::Duration;
    use mailwarm_common::types::{MailAccountStatus, WarmupJobType};
    use mailwarm_storage::models::{WarmupEmailLog, WarmupJob};
    use mailwarm_storage::repository::{JobRepository, LogRepository};
    use mailwarm_storage::MemoryStore;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_summarize_counts_today_only() {
        let store = Arc::new(MemoryStore::new());
        let stores = Stores::memory(store.clone());
        let clock = FixedOffsetClock::utc().pinned_at(start());

        let connected = account("a@example.com");
        let mut broken = account("b@example.com");
        broken.status = MailAccountStatus::Error;

        let entries = [
            (EmailDirection::Sent, Duration::zero()),
            (EmailDirection::Sent, Duration::hours(-2)),
            (EmailDirection::Replied, Duration::hours(1)),
            (EmailDirection::Received, Duration::zero()),
            (EmailDirection::Sent, Duration::days(-1)),
        ];
        for (i, (direction, offset)) in entries.into_iter().enumerate() {
            let mut log = WarmupEmailLog::new(connected.id, format!("m{}", i), direction);
            log.sent_at = Some(start() + offset);
            LogRepository::append(store.as_ref(), &log).await.unwrap();
        }

        let mut done = WarmupJob::pending(broken.id, WarmupJobType::SendEmail, start());
        done.succeed(start());
        let jobs = [
            WarmupJob::pending(connected.id, WarmupJobType::SendEmail, start()),
            WarmupJob::pending(broken.id, WarmupJobType::ReplyEmail, start()),
            done,
        ];
        JobRepository::add_jobs(store.as_ref(), &jobs).await.unwrap();

        let summary = summarize(&stores, &clock, &[connected, broken])
            .await
            .unwrap();
        assert_eq!(
            summary,
            DashboardSummary {
                active_accounts: 1,
                sent_today: 2,
                replies_today: 1,
                pending_jobs: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_summarize_no_accounts() {
        let stores = Stores::memory(Arc::new(MemoryStore::new()));
        let clock = FixedOffsetClock::utc().pinned_at(start());
        assert_eq!(
            summarize(&stores, &clock, &[]).await.unwrap(),
            DashboardSummary::default()
        );
    }
}
