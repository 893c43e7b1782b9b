//! Warmup email log repository

use crate::db::DatabasePool;
use crate::models::WarmupEmailLog;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailwarm_common::types::MailAccountId;
use mailwarm_common::{Error, Result};
use sqlx::FromRow;
use uuid::Uuid;

/// Warmup email log repository trait
#[async_trait]
pub trait LogRepository: Send + Sync {
    async fn append(&self, log: &WarmupEmailLog) -> Result<()>;

    /// Whether a log already exists for the provider message id
    async fn exists(&self, account_id: MailAccountId, message_id: &str) -> Result<bool>;

    /// Logs for the accounts whose activity time falls within `[from, to]`
    async fn query_by_accounts(
        &self,
        account_ids: &[MailAccountId],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<WarmupEmailLog>>;

    /// Most recent inbound log whose sender address is not exactly `own_address`
    async fn latest_inbound(
        &self,
        account_id: MailAccountId,
        own_address: &str,
    ) -> Result<Option<WarmupEmailLog>>;
}

#[derive(FromRow)]
struct LogRow {
    id: Uuid,
    mail_account_id: Uuid,
    message_id: String,
    warmup_id: Option<String>,
    direction: String,
    subject: String,
    from_address: String,
    to_address: String,
    sent_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    opened_at: Option<DateTime<Utc>>,
    marked_as_important: bool,
    marked_as_starred: bool,
    is_spam: bool,
    is_warmup: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<LogRow> for WarmupEmailLog {
    type Error = Error;

    fn try_from(row: LogRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            mail_account_id: row.mail_account_id,
            message_id: row.message_id,
            warmup_id: row.warmup_id,
            direction: row.direction.parse().map_err(Error::Database)?,
            subject: row.subject,
            from_address: row.from_address,
            to_address: row.to_address,
            sent_at: row.sent_at,
            delivered_at: row.delivered_at,
            opened_at: row.opened_at,
            marked_as_important: row.marked_as_important,
            marked_as_starred: row.marked_as_starred,
            is_spam: row.is_spam,
            is_warmup: row.is_warmup,
            created_at: row.created_at,
        })
    }
}

/// Database warmup email log repository
pub struct DbLogRepository {
    pool: DatabasePool,
}

impl DbLogRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogRepository for DbLogRepository {
    async fn append(&self, log: &WarmupEmailLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO warmup_email_logs (
                id, mail_account_id, message_id, warmup_id, direction, subject,
                from_address, to_address, sent_at, delivered_at, opened_at,
                marked_as_important, marked_as_starred, is_spam, is_warmup, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(log.id)
        .bind(log.mail_account_id)
        .bind(&log.message_id)
        .bind(&log.warmup_id)
        .bind(log.direction.to_string())
        .bind(&log.subject)
        .bind(&log.from_address)
        .bind(&log.to_address)
        .bind(log.sent_at)
        .bind(log.delivered_at)
        .bind(log.opened_at)
        .bind(log.marked_as_important)
        .bind(log.marked_as_starred)
        .bind(log.is_spam)
        .bind(log.is_warmup)
        .bind(log.created_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn exists(&self, account_id: MailAccountId, message_id: &str) -> Result<bool> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM warmup_email_logs
                WHERE mail_account_id = $1 AND message_id = $2
            )
            "#,
        )
        .bind(account_id)
        .bind(message_id)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn query_by_accounts(
        &self,
        account_ids: &[MailAccountId],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<WarmupEmailLog>> {
        let rows = sqlx::query_as::<_, LogRow>(
            r#"
            SELECT * FROM warmup_email_logs
            WHERE mail_account_id = ANY($1)
              AND COALESCE(sent_at, delivered_at, created_at) >= $2
              AND COALESCE(sent_at, delivered_at, created_at) <= $3
            ORDER BY COALESCE(sent_at, delivered_at, created_at) ASC
            "#,
        )
        .bind(account_ids)
        .bind(from)
        .bind(to)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter().map(WarmupEmailLog::try_from).collect()
    }

    async fn latest_inbound(
        &self,
        account_id: MailAccountId,
        own_address: &str,
    ) -> Result<Option<WarmupEmailLog>> {
        sqlx::query_as::<_, LogRow>(
            r#"
            SELECT * FROM warmup_email_logs
            WHERE mail_account_id = $1
              AND direction = 'received'
              AND from_address <> ''
              AND LOWER(TRIM(COALESCE(
                    SUBSTRING(from_address FROM '<([^<>]*)>[^<>]*$'),
                    from_address
                  ))) <> LOWER(TRIM($2))
            ORDER BY COALESCE(sent_at, delivered_at, created_at) DESC
            LIMIT 1
            "#,
        )
        .bind(account_id)
        .bind(own_address)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?
        .map(WarmupEmailLog::try_from)
        .transpose()
    }
}
