//! Mail account repository

use crate::db::DatabasePool;
use crate::models::{GmailCredentials, MailAccount, SmtpSettings};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailwarm_common::types::MailAccountId;
use mailwarm_common::{Error, Result};
use sqlx::FromRow;
use uuid::Uuid;

/// Mail account repository trait
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn get(&self, id: MailAccountId) -> Result<Option<MailAccount>>;
    async fn get_by_address(&self, address: &str) -> Result<Option<MailAccount>>;
    async fn get_connected(&self) -> Result<Vec<MailAccount>>;

    /// Add `count` to the account's warmup-message-seen counter
    async fn increment_warmup_seen(&self, id: MailAccountId, count: i32) -> Result<()>;

    /// Record the time of the last full inbox scan
    async fn touch_inbox_scan(&self, id: MailAccountId, at: DateTime<Utc>) -> Result<()>;
}

#[derive(FromRow)]
struct AccountRow {
    id: Uuid,
    user_id: Uuid,
    display_name: Option<String>,
    email_address: String,
    provider: String,
    status: String,
    gmail_access_token: Option<String>,
    gmail_token_expires_at: Option<DateTime<Utc>>,
    smtp_host: Option<String>,
    smtp_port: Option<i32>,
    smtp_username: Option<String>,
    smtp_password: Option<String>,
    smtp_use_tls: bool,
    warmup_messages_seen: i32,
    last_inbox_scan_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for MailAccount {
    type Error = Error;

    fn try_from(row: AccountRow) -> Result<Self> {
        let gmail = row.gmail_access_token.map(|access_token| GmailCredentials {
            access_token,
            token_expires_at: row.gmail_token_expires_at,
        });

        let smtp = match (row.smtp_host, row.smtp_username) {
            (Some(host), Some(username)) => Some(SmtpSettings {
                host,
                port: row
                    .smtp_port
                    .and_then(|p| u16::try_from(p).ok())
                    .unwrap_or(587),
                username,
                password: row.smtp_password.unwrap_or_default(),
                use_tls: row.smtp_use_tls,
            }),
            _ => None,
        };

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            display_name: row.display_name,
            email_address: row.email_address,
            provider: row.provider.parse().map_err(Error::Database)?,
            status: row.status.parse().map_err(Error::Database)?,
            gmail,
            smtp,
            warmup_messages_seen: row.warmup_messages_seen,
            last_inbox_scan_at: row.last_inbox_scan_at,
            created_at: row.created_at,
        })
    }
}

/// Database mail account repository
pub struct DbAccountRepository {
    pool: DatabasePool,
}

impl DbAccountRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for DbAccountRepository {
    async fn get(&self, id: MailAccountId) -> Result<Option<MailAccount>> {
        sqlx::query_as::<_, AccountRow>("SELECT * FROM mail_accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?
            .map(MailAccount::try_from)
            .transpose()
    }

    async fn get_by_address(&self, address: &str) -> Result<Option<MailAccount>> {
        sqlx::query_as::<_, AccountRow>(
            "SELECT * FROM mail_accounts WHERE LOWER(email_address) = LOWER($1)",
        )
        .bind(address)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?
        .map(MailAccount::try_from)
        .transpose()
    }

    async fn get_connected(&self) -> Result<Vec<MailAccount>> {
        let rows = sqlx::query_as::<_, AccountRow>(
            "SELECT * FROM mail_accounts WHERE status = 'connected' ORDER BY email_address ASC",
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter().map(MailAccount::try_from).collect()
    }

    async fn increment_warmup_seen(&self, id: MailAccountId, count: i32) -> Result<()> {
        sqlx::query(
            "UPDATE mail_accounts SET warmup_messages_seen = warmup_messages_seen + $2 WHERE id = $1",
        )
        .bind(id)
        .bind(count)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn touch_inbox_scan(&self, id: MailAccountId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE mail_accounts SET last_inbox_scan_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}
