//! Warmup profile repository

use crate::db::DatabasePool;
use crate::models::{CreateWarmupProfile, WarmupProfile};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use mailwarm_common::types::{MailAccountId, ProfileId};
use mailwarm_common::{Error, Result};
use sqlx::FromRow;
use uuid::Uuid;

/// Warmup profile repository trait
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn create(&self, input: CreateWarmupProfile) -> Result<WarmupProfile>;
    async fn get(&self, id: ProfileId) -> Result<Option<WarmupProfile>>;
    async fn get_by_account(&self, account_id: MailAccountId) -> Result<Option<WarmupProfile>>;

    /// Enabled profiles that have started by `today` and still have day
    /// budget left
    async fn get_active_profiles(&self, today: NaiveDate) -> Result<Vec<WarmupProfile>>;

    /// Write the profile's settings; `current_day` is left as stored
    async fn update(&self, profile: &WarmupProfile) -> Result<()>;

    /// Advance `current_day` by one in place
    async fn increment_current_day(&self, id: ProfileId, at: DateTime<Utc>) -> Result<()>;

    async fn delete(&self, id: ProfileId) -> Result<()>;
}

#[derive(FromRow)]
struct ProfileRow {
    id: Uuid,
    mail_account_id: Uuid,
    is_enabled: bool,
    start_date: NaiveDate,
    daily_min_emails: i32,
    daily_max_emails: i32,
    reply_rate: f64,
    max_duration_days: i32,
    time_window_start: NaiveTime,
    time_window_end: NaiveTime,
    randomize: bool,
    current_day: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProfileRow> for WarmupProfile {
    fn from(row: ProfileRow) -> Self {
        Self {
            id: row.id,
            mail_account_id: row.mail_account_id,
            is_enabled: row.is_enabled,
            start_date: row.start_date,
            daily_min_emails: row.daily_min_emails,
            daily_max_emails: row.daily_max_emails,
            reply_rate: row.reply_rate,
            max_duration_days: row.max_duration_days,
            time_window_start: row.time_window_start,
            time_window_end: row.time_window_end,
            randomize: row.randomize,
            current_day: row.current_day,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Database warmup profile repository
pub struct DbProfileRepository {
    pool: DatabasePool,
}

impl DbProfileRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileRepository for DbProfileRepository {
    async fn create(&self, input: CreateWarmupProfile) -> Result<WarmupProfile> {
        let id = Uuid::now_v7();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO warmup_profiles (
                id, mail_account_id, is_enabled, start_date, daily_min_emails,
                daily_max_emails, reply_rate, max_duration_days, time_window_start,
                time_window_end, randomize, current_day, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 0, $12, $13)
            "#,
        )
        .bind(id)
        .bind(input.mail_account_id)
        .bind(input.is_enabled)
        .bind(input.start_date)
        .bind(input.daily_min_emails)
        .bind(input.daily_max_emails)
        .bind(input.reply_rate)
        .bind(input.max_duration_days)
        .bind(input.time_window_start)
        .bind(input.time_window_end)
        .bind(input.randomize)
        .bind(now)
        .bind(now)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        self.get(id)
            .await?
            .ok_or_else(|| Error::Internal("Failed to create warmup profile".to_string()))
    }

    async fn get(&self, id: ProfileId) -> Result<Option<WarmupProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>("SELECT * FROM warmup_profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(row.map(WarmupProfile::from))
    }

    async fn get_by_account(&self, account_id: MailAccountId) -> Result<Option<WarmupProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT * FROM warmup_profiles WHERE mail_account_id = $1",
        )
        .bind(account_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(row.map(WarmupProfile::from))
    }

    async fn get_active_profiles(&self, today: NaiveDate) -> Result<Vec<WarmupProfile>> {
        let rows = sqlx::query_as::<_, ProfileRow>(
            r#"
            SELECT * FROM warmup_profiles
            WHERE is_enabled = TRUE
              AND start_date <= $1
              AND (max_duration_days = 0 OR current_day < max_duration_days)
            ORDER BY created_at ASC
            "#,
        )
        .bind(today)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(rows.into_iter().map(WarmupProfile::from).collect())
    }

    async fn update(&self, profile: &WarmupProfile) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE warmup_profiles SET
                is_enabled = $2,
                start_date = $3,
                daily_min_emails = $4,
                daily_max_emails = $5,
                reply_rate = $6,
                max_duration_days = $7,
                time_window_start = $8,
                time_window_end = $9,
                randomize = $10,
                updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(profile.id)
        .bind(profile.is_enabled)
        .bind(profile.start_date)
        .bind(profile.daily_min_emails)
        .bind(profile.daily_max_emails)
        .bind(profile.reply_rate)
        .bind(profile.max_duration_days)
        .bind(profile.time_window_start)
        .bind(profile.time_window_end)
        .bind(profile.randomize)
        .bind(Utc::now())
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn increment_current_day(&self, id: ProfileId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE warmup_profiles SET current_day = current_day + 1, updated_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, id: ProfileId) -> Result<()> {
        sqlx::query("DELETE FROM warmup_profiles WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}
