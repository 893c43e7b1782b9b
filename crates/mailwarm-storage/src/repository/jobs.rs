//! Warmup job repository

use crate::db::DatabasePool;
use crate::models::WarmupJob;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailwarm_common::types::{JobId, MailAccountId};
use mailwarm_common::{Error, Result};
use sqlx::FromRow;
use uuid::Uuid;

/// Warmup job repository trait
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Persist a batch of new jobs
    async fn add_jobs(&self, jobs: &[WarmupJob]) -> Result<u64>;

    /// Pending jobs with `scheduled_at <= now`, oldest first
    async fn get_due_jobs(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<WarmupJob>>;

    /// Move a job from pending to in-progress; false when someone else won
    async fn claim(&self, id: JobId, now: DateTime<Utc>) -> Result<bool>;

    /// Store the terminal outcome of a claimed job; false when the job was
    /// already terminal
    async fn update_job(&self, job: &WarmupJob) -> Result<bool>;

    /// Whether any job exists for the account within `[start, end]`
    async fn has_jobs_in_range(
        &self,
        account_id: MailAccountId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<bool>;

    /// Jobs for the accounts scheduled within `[start, end]`
    async fn list_in_range(
        &self,
        account_ids: &[MailAccountId],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WarmupJob>>;

    /// Number of pending jobs across the accounts
    async fn count_pending(&self, account_ids: &[MailAccountId]) -> Result<i64>;

    /// Fail jobs left in progress since before `cutoff`
    async fn fail_stale_claims(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Result<u64>;
}

#[derive(FromRow)]
struct JobRow {
    id: Uuid,
    mail_account_id: Uuid,
    job_type: String,
    scheduled_at: DateTime<Utc>,
    executed_at: Option<DateTime<Utc>>,
    status: String,
    error_message: Option<String>,
    attempt: i32,
    claimed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for WarmupJob {
    type Error = Error;

    fn try_from(row: JobRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            mail_account_id: row.mail_account_id,
            job_type: row.job_type.parse().map_err(Error::Database)?,
            scheduled_at: row.scheduled_at,
            executed_at: row.executed_at,
            status: row.status.parse().map_err(Error::Database)?,
            error_message: row.error_message,
            attempt: row.attempt,
            claimed_at: row.claimed_at,
            created_at: row.created_at,
        })
    }
}

fn into_jobs(rows: Vec<JobRow>) -> Result<Vec<WarmupJob>> {
    rows.into_iter().map(WarmupJob::try_from).collect()
}

/// Database warmup job repository
pub struct DbJobRepository {
    pool: DatabasePool,
}

impl DbJobRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for DbJobRepository {
    async fn add_jobs(&self, jobs: &[WarmupJob]) -> Result<u64> {
        let mut count = 0u64;
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        for job in jobs {
            let result = sqlx::query(
                r#"
                INSERT INTO warmup_jobs (
                    id, mail_account_id, job_type, scheduled_at, status,
                    attempt, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(job.id)
            .bind(job.mail_account_id)
            .bind(job.job_type.to_string())
            .bind(job.scheduled_at)
            .bind(job.status.to_string())
            .bind(job.attempt)
            .bind(job.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

            count += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count)
    }

    async fn get_due_jobs(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<WarmupJob>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM warmup_jobs
            WHERE status = 'pending' AND scheduled_at <= $1
            ORDER BY scheduled_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        into_jobs(rows)
    }

    async fn claim(&self, id: JobId, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE warmup_jobs SET
                status = 'in_progress',
                claimed_at = $2
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_job(&self, job: &WarmupJob) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE warmup_jobs SET
                status = $2,
                executed_at = $3,
                error_message = $4
            WHERE id = $1 AND status IN ('pending', 'in_progress')
            "#,
        )
        .bind(job.id)
        .bind(job.status.to_string())
        .bind(job.executed_at)
        .bind(&job.error_message)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn has_jobs_in_range(
        &self,
        account_id: MailAccountId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM warmup_jobs
                WHERE mail_account_id = $1 AND scheduled_at >= $2 AND scheduled_at <= $3
            )
            "#,
        )
        .bind(account_id)
        .bind(start)
        .bind(end)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(exists)
    }

    async fn list_in_range(
        &self,
        account_ids: &[MailAccountId],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WarmupJob>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM warmup_jobs
            WHERE mail_account_id = ANY($1) AND scheduled_at >= $2 AND scheduled_at <= $3
            ORDER BY scheduled_at ASC
            "#,
        )
        .bind(account_ids)
        .bind(start)
        .bind(end)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        into_jobs(rows)
    }

    async fn count_pending(&self, account_ids: &[MailAccountId]) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM warmup_jobs WHERE mail_account_id = ANY($1) AND status = 'pending'",
        )
        .bind(account_ids)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn fail_stale_claims(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE warmup_jobs SET
                status = 'failed',
                executed_at = $2,
                error_message = 'Claim abandoned'
            WHERE status = 'in_progress' AND claimed_at < $1
            "#,
        )
        .bind(cutoff)
        .bind(now)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
