//! Background loops driving the engine

use crate::clock::Clock;
use crate::engine::WarmupEngine;
use chrono::{Duration, NaiveTime};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::time::{interval, sleep, Duration as TokioDuration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Run the generation pass now and then daily at `trigger_hour` local time
pub async fn run_daily_scheduler(
    engine: Arc<WarmupEngine>,
    trigger_hour: u32,
    cancel: CancellationToken,
) {
    info!("Daily scheduler started (trigger hour: {:02}:00)", trigger_hour);

    loop {
        if let Err(e) = engine.generate_daily_jobs(&cancel).await {
            error!("Daily generation failed: {}", e);
        }

        let wait = until_next_trigger(engine.clock(), trigger_hour);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(wait) => {}
        }
    }

    info!("Daily scheduler stopped");
}

/// Execute due jobs every `interval_secs`
pub async fn run_job_executor(
    engine: Arc<WarmupEngine>,
    interval_secs: u64,
    cancel: CancellationToken,
) {
    let mut ticker = interval(TokioDuration::from_secs(interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Job executor started (interval: {}s)", interval_secs);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = engine.execute_pending_jobs(&cancel).await {
                    error!("Error executing warmup jobs: {}", e);
                }
            }
        }
    }

    info!("Job executor stopped");
}

/// Time until the next local `hour`:00, strictly in the future
pub fn until_next_trigger(clock: &dyn Clock, hour: u32) -> StdDuration {
    let now = clock.now();
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);

    let today = clock.local_date(now);
    let mut next = clock.local_to_utc(today.and_time(at));
    if next <= now {
        next = clock.local_to_utc((today + Duration::days(1)).and_time(at));
    }

    (next - now).to_std().unwrap_or(StdDuration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedOffsetClock;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn clock_at(offset_minutes: i32, h: u32, m: u32) -> FixedOffsetClock {
        FixedOffsetClock::from_minutes(offset_minutes)
            .unwrap()
            .pinned_at(Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap())
    }

    #[test]
    fn test_until_next_trigger_later_today() {
        let clock = clock_at(0, 0, 30);
        assert_eq!(
            until_next_trigger(&clock, 1),
            StdDuration::from_secs(30 * 60)
        );
    }

    #[test]
    fn test_until_next_trigger_rolls_to_tomorrow() {
        let clock = clock_at(0, 1, 0);
        assert_eq!(
            until_next_trigger(&clock, 1),
            StdDuration::from_secs(24 * 3600)
        );
    }

    #[test]
    fn test_until_next_trigger_uses_local_time() {
        // 23:00 UTC is 01:00 the next day at +02:00, so 02:00 local is an hour away
        let clock = clock_at(120, 23, 0);
        assert_eq!(
            until_next_trigger(&clock, 2),
            StdDuration::from_secs(3600)
        );
    }
}
