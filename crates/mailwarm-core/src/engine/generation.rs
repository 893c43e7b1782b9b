//! Daily generation pass

use super::WarmupEngine;
use mailwarm_common::Result;
use mailwarm_storage::models::WarmupProfile;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of one generation pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GenerationSummary {
    pub profiles: usize,
    /// Accounts that already had jobs today
    pub skipped: usize,
    pub failed: usize,
    pub jobs_created: u64,
}

impl WarmupEngine {
    /// Plan today's jobs for every active profile
    ///
    /// Safe to run repeatedly on the same day: an account that already has
    /// any job inside today's local bounds is left alone.
    pub async fn generate_daily_jobs(&self, cancel: &CancellationToken) -> Result<GenerationSummary> {
        let today = self.clock.today();
        let profiles = self.stores.profiles.get_active_profiles(today).await?;
        let mut summary = GenerationSummary::default();

        for profile in profiles {
            if cancel.is_cancelled() {
                info!("Daily generation cancelled");
                break;
            }
            summary.profiles += 1;

            let account_id = profile.mail_account_id;
            match self.generate_for_profile(profile).await {
                Ok(Some(created)) => summary.jobs_created += created,
                Ok(None) => summary.skipped += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!(account_id = %account_id, "Failed to generate warmup jobs: {}", e);
                }
            }
        }

        info!(
            "Daily generation finished (profiles: {}, skipped: {}, failed: {}, jobs: {})",
            summary.profiles, summary.skipped, summary.failed, summary.jobs_created
        );
        Ok(summary)
    }

    /// Returns `None` when the account already has jobs today
    async fn generate_for_profile(&self, profile: WarmupProfile) -> Result<Option<u64>> {
        let today = self.clock.today();
        let (start, end) = self.clock.day_bounds(today);

        if self
            .stores
            .jobs
            .has_jobs_in_range(profile.mail_account_id, start, end)
            .await?
        {
            debug!(account_id = %profile.mail_account_id, "Jobs already planned for today");
            return Ok(None);
        }

        let jobs = self.rng.with(|rng| {
            self.strategy
                .generate_daily_jobs(&profile, today, self.clock.as_ref(), rng)
        });
        if jobs.is_empty() {
            return Ok(Some(0));
        }

        let created = self.stores.jobs.add_jobs(&jobs).await?;
        self.stores
            .profiles
            .increment_current_day(profile.id, self.clock.now())
            .await?;

        debug!(
            account_id = %profile.mail_account_id,
            day = profile.current_day + 1,
            "Planned {} warmup jobs", created
        );
        Ok(Some(created))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{profile_for, Harness};
    use super::*;
    use crate::clock::Clock;
    use chrono::{Duration, NaiveDate};
    use mailwarm_common::types::WarmupJobType;
    use mailwarm_storage::models::WarmupJob;
    use mailwarm_storage::repository::{JobRepository, ProfileRepository};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_generation_is_idempotent_per_day() {
        let harness = Harness::new();
        let account = harness.add_peer("a@example.com").await;
        let cancel = CancellationToken::new();

        let first = harness.engine.generate_daily_jobs(&cancel).await.unwrap();
        assert_eq!(first.jobs_created, 3);
        assert_eq!(harness.store.jobs().await.len(), 3);

        let second = harness.engine.generate_daily_jobs(&cancel).await.unwrap();
        assert_eq!(second.jobs_created, 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(harness.store.jobs().await.len(), 3);

        let profile = ProfileRepository::get_by_account(harness.store.as_ref(), account.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.current_day, 1);
    }

    #[tokio::test]
    async fn test_next_day_generates_again() {
        let harness = Harness::new();
        harness.add_peer("a@example.com").await;
        let cancel = CancellationToken::new();

        harness.engine.generate_daily_jobs(&cancel).await.unwrap();
        harness.clock.advance(Duration::days(1));
        let summary = harness.engine.generate_daily_jobs(&cancel).await.unwrap();

        assert_eq!(summary.jobs_created, 3);
        assert_eq!(harness.store.jobs().await.len(), 6);
    }

    #[tokio::test]
    async fn test_existing_job_today_blocks_generation() {
        let harness = Harness::new();
        let account = harness.add_peer("a@example.com").await;
        let reply = WarmupJob::pending(
            account.id,
            WarmupJobType::ReplyEmail,
            harness.clock.now() + Duration::minutes(10),
        );
        JobRepository::add_jobs(harness.store.as_ref(), &[reply])
            .await
            .unwrap();

        let summary = harness
            .engine
            .generate_daily_jobs(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(harness.store.jobs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_inactive_profiles_are_ignored() {
        let harness = Harness::new();
        let future = harness.add_account("future@example.com").await;
        let mut not_started = profile_for(future.id);
        not_started.start_date = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        harness.store.insert_profile(not_started).await;

        let finished = harness.add_account("done@example.com").await;
        let mut exhausted = profile_for(finished.id);
        exhausted.max_duration_days = 10;
        exhausted.current_day = 10;
        harness.store.insert_profile(exhausted).await;

        let disabled = harness.add_account("off@example.com").await;
        let mut off = profile_for(disabled.id);
        off.is_enabled = false;
        harness.store.insert_profile(off).await;

        let summary = harness
            .engine
            .generate_daily_jobs(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.profiles, 0);
        assert!(harness.store.jobs().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_plan_keeps_current_day() {
        let harness = Harness::new();
        let account = harness.add_account("a@example.com").await;
        let mut profile = profile_for(account.id);
        profile.daily_min_emails = 0;
        profile.daily_max_emails = 0;
        harness.store.insert_profile(profile).await;

        harness
            .engine
            .generate_daily_jobs(&CancellationToken::new())
            .await
            .unwrap();

        let stored = ProfileRepository::get_by_account(harness.store.as_ref(), account.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.current_day, 0);
    }

    #[tokio::test]
    async fn test_settings_edit_does_not_rewind_current_day() {
        let harness = Harness::new();
        let account = harness.add_peer("a@example.com").await;
        let before = ProfileRepository::get_by_account(harness.store.as_ref(), account.id)
            .await
            .unwrap()
            .unwrap();

        harness
            .engine
            .generate_daily_jobs(&CancellationToken::new())
            .await
            .unwrap();

        // An edit based on the profile as read before the pass
        let mut edited = before.clone();
        edited.daily_max_emails = 9;
        ProfileRepository::update(harness.store.as_ref(), &edited)
            .await
            .unwrap();

        let stored = ProfileRepository::get(harness.store.as_ref(), before.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.current_day, 1);
        assert_eq!(stored.daily_max_emails, 9);
    }

    #[tokio::test]
    async fn test_cancelled_pass_does_nothing() {
        let harness = Harness::new();
        harness.add_peer("a@example.com").await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = harness.engine.generate_daily_jobs(&cancel).await.unwrap();
        assert_eq!(summary, GenerationSummary::default());
        assert!(harness.store.jobs().await.is_empty());
    }
}
