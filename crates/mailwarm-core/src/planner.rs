//! Daily job planning

use crate::clock::Clock;
use chrono::{Duration, NaiveDate};
use mailwarm_common::types::WarmupJobType;
use mailwarm_storage::models::{WarmupJob, WarmupProfile};
use rand::{Rng, RngCore};

/// Turns a profile into one day's jobs
///
/// Implementations are pure: the same profile, date, clock and random
/// sequence always give the same schedule. Whether the day was already
/// planned is the caller's concern.
pub trait WarmupStrategy: Send + Sync {
    fn generate_daily_jobs(
        &self,
        profile: &WarmupProfile,
        date: NaiveDate,
        clock: &dyn Clock,
        rng: &mut dyn RngCore,
    ) -> Vec<WarmupJob>;
}

/// Spreads the day's volume evenly across the profile's time window
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearWarmupStrategy;

impl LinearWarmupStrategy {
    fn total_emails(profile: &WarmupProfile, rng: &mut dyn RngCore) -> i32 {
        let max = profile.daily_max_emails;
        if !profile.randomize || max <= 0 {
            return max;
        }
        let min = profile.daily_min_emails.clamp(0, max);
        rng.gen_range(min..=max)
    }
}

impl WarmupStrategy for LinearWarmupStrategy {
    fn generate_daily_jobs(
        &self,
        profile: &WarmupProfile,
        date: NaiveDate,
        clock: &dyn Clock,
        rng: &mut dyn RngCore,
    ) -> Vec<WarmupJob> {
        let total = Self::total_emails(profile, rng);
        if total <= 0 || profile.time_window_end <= profile.time_window_start {
            return Vec::new();
        }

        let window_start = date.and_time(profile.time_window_start);
        let window_minutes = (profile.time_window_end - profile.time_window_start)
            .num_minutes()
            .max(1);
        // Truncates to zero when there are more emails than minutes
        let step = window_minutes / i64::from(total);

        (0..total)
            .map(|i| {
                let local = window_start + Duration::minutes(i64::from(i) * step);
                let job_type = if i % 3 == 0 {
                    WarmupJobType::ReplyEmail
                } else {
                    WarmupJobType::SendEmail
                };
                WarmupJob::pending(profile.mail_account_id, job_type, clock.local_to_utc(local))
            })
            .collect()
    }
}
