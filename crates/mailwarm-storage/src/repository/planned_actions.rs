//! Planned action repository

use crate::db::DatabasePool;
use crate::models::PlannedAction;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailwarm_common::types::{MailAccountId, PlannedActionId};
use mailwarm_common::{Error, Result, WarmupActionPlan};
use sqlx::FromRow;
use uuid::Uuid;

/// Planned action repository trait
#[async_trait]
pub trait PlannedActionRepository: Send + Sync {
    async fn save(&self, action: &PlannedAction) -> Result<()>;

    /// Look up by the Message-ID of the carrying message
    async fn find_by_message_id(&self, message_id: &str) -> Result<Option<PlannedAction>>;

    /// Newest unapplied record aimed at the account, or at its address when
    /// the target account was unknown at send time
    async fn find_pending_for_target(
        &self,
        account_id: MailAccountId,
        address: &str,
    ) -> Result<Option<PlannedAction>>;

    /// Set `applied_at` if still unset; false when already applied
    async fn mark_applied(&self, id: PlannedActionId, at: DateTime<Utc>) -> Result<bool>;
}

#[derive(FromRow)]
struct PlannedActionRow {
    id: Uuid,
    sender_account_id: Option<Uuid>,
    target_account_id: Option<Uuid>,
    target_address: String,
    message_id: String,
    plan: String,
    created_at: DateTime<Utc>,
    applied_at: Option<DateTime<Utc>>,
}

impl TryFrom<PlannedActionRow> for PlannedAction {
    type Error = Error;

    fn try_from(row: PlannedActionRow) -> Result<Self> {
        let plan = WarmupActionPlan::parse(&row.plan)
            .ok_or_else(|| Error::Database(format!("Corrupt plan on planned action {}", row.id)))?;

        Ok(Self {
            id: row.id,
            sender_account_id: row.sender_account_id,
            target_account_id: row.target_account_id,
            target_address: row.target_address,
            message_id: row.message_id,
            plan,
            created_at: row.created_at,
            applied_at: row.applied_at,
        })
    }
}

/// Database planned action repository
pub struct DbPlannedActionRepository {
    pool: DatabasePool,
}

impl DbPlannedActionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlannedActionRepository for DbPlannedActionRepository {
    async fn save(&self, action: &PlannedAction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO warmup_planned_actions (
                id, sender_account_id, target_account_id, target_address,
                message_id, plan, created_at, applied_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(action.id)
        .bind(action.sender_account_id)
        .bind(action.target_account_id)
        .bind(&action.target_address)
        .bind(&action.message_id)
        .bind(action.plan.to_header_value())
        .bind(action.created_at)
        .bind(action.applied_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn find_by_message_id(&self, message_id: &str) -> Result<Option<PlannedAction>> {
        sqlx::query_as::<_, PlannedActionRow>(
            "SELECT * FROM warmup_planned_actions WHERE message_id = $1 LIMIT 1",
        )
        .bind(message_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?
        .map(PlannedAction::try_from)
        .transpose()
    }

    async fn find_pending_for_target(
        &self,
        account_id: MailAccountId,
        address: &str,
    ) -> Result<Option<PlannedAction>> {
        sqlx::query_as::<_, PlannedActionRow>(
            r#"
            SELECT * FROM warmup_planned_actions
            WHERE applied_at IS NULL
              AND (target_account_id = $1
                   OR (target_account_id IS NULL AND LOWER(target_address) = LOWER($2)))
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(account_id)
        .bind(address)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?
        .map(PlannedAction::try_from)
        .transpose()
    }

    async fn mark_applied(&self, id: PlannedActionId, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE warmup_planned_actions SET applied_at = $2 WHERE id = $1 AND applied_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}
