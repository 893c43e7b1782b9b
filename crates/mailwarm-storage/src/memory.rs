//! In-memory store
//!
//! Implements every repository trait over plain vectors. Used by the engine
//! tests and by single-process tooling that does not need persistence.

use crate::models::{
    CreateWarmupProfile, MailAccount, PlannedAction, WarmupEmailLog, WarmupJob, WarmupProfile,
};
use crate::repository::{
    AccountRepository, JobRepository, LogRepository, PlannedActionRepository, ProfileRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use mailwarm_common::types::{
    EmailAddress, JobId, MailAccountId, PlannedActionId, ProfileId, WarmupJobStatus,
};
use mailwarm_common::Result;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    accounts: Vec<MailAccount>,
    profiles: Vec<WarmupProfile>,
    jobs: Vec<WarmupJob>,
    logs: Vec<WarmupEmailLog>,
    planned: Vec<PlannedAction>,
}

/// In-memory implementation of all stores
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an account
    pub async fn insert_account(&self, account: MailAccount) {
        let mut state = self.state.lock().await;
        state.accounts.retain(|a| a.id != account.id);
        state.accounts.push(account);
    }

    /// Insert or replace a profile
    pub async fn insert_profile(&self, profile: WarmupProfile) {
        let mut state = self.state.lock().await;
        state.profiles.retain(|p| p.id != profile.id);
        state.profiles.push(profile);
    }

    /// Snapshot of all jobs
    pub async fn jobs(&self) -> Vec<WarmupJob> {
        self.state.lock().await.jobs.clone()
    }

    /// Snapshot of all logs
    pub async fn logs(&self) -> Vec<WarmupEmailLog> {
        self.state.lock().await.logs.clone()
    }

    /// Snapshot of all planned actions
    pub async fn planned_actions(&self) -> Vec<PlannedAction> {
        self.state.lock().await.planned.clone()
    }
}

#[async_trait]
impl JobRepository for MemoryStore {
    async fn add_jobs(&self, jobs: &[WarmupJob]) -> Result<u64> {
        let mut state = self.state.lock().await;
        state.jobs.extend_from_slice(jobs);
        Ok(jobs.len() as u64)
    }

    async fn get_due_jobs(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<WarmupJob>> {
        let state = self.state.lock().await;
        let mut due: Vec<WarmupJob> = state
            .jobs
            .iter()
            .filter(|j| j.status == WarmupJobStatus::Pending && j.scheduled_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|j| j.scheduled_at);
        due.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(due)
    }

    async fn claim(&self, id: JobId, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state
            .jobs
            .iter_mut()
            .find(|j| j.id == id && j.status == WarmupJobStatus::Pending)
        {
            Some(job) => {
                job.status = WarmupJobStatus::InProgress;
                job.claimed_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_job(&self, job: &WarmupJob) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state
            .jobs
            .iter_mut()
            .find(|j| j.id == job.id && !j.status.is_terminal())
        {
            Some(stored) => {
                stored.status = job.status;
                stored.executed_at = job.executed_at;
                stored.error_message = job.error_message.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn has_jobs_in_range(
        &self,
        account_id: MailAccountId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.jobs.iter().any(|j| {
            j.mail_account_id == account_id && j.scheduled_at >= start && j.scheduled_at <= end
        }))
    }

    async fn list_in_range(
        &self,
        account_ids: &[MailAccountId],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WarmupJob>> {
        let state = self.state.lock().await;
        let mut jobs: Vec<WarmupJob> = state
            .jobs
            .iter()
            .filter(|j| {
                account_ids.contains(&j.mail_account_id)
                    && j.scheduled_at >= start
                    && j.scheduled_at <= end
            })
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.scheduled_at);
        Ok(jobs)
    }

    async fn count_pending(&self, account_ids: &[MailAccountId]) -> Result<i64> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .iter()
            .filter(|j| {
                account_ids.contains(&j.mail_account_id) && j.status == WarmupJobStatus::Pending
            })
            .count() as i64)
    }

    async fn fail_stale_claims(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut failed = 0;
        for job in state.jobs.iter_mut().filter(|j| {
            j.status == WarmupJobStatus::InProgress && j.claimed_at.map_or(false, |c| c < cutoff)
        }) {
            job.fail("Claim abandoned", now);
            failed += 1;
        }
        Ok(failed)
    }
}

#[async_trait]
impl ProfileRepository for MemoryStore {
    async fn create(&self, input: CreateWarmupProfile) -> Result<WarmupProfile> {
        let now = Utc::now();
        let profile = WarmupProfile {
            id: Uuid::now_v7(),
            mail_account_id: input.mail_account_id,
            is_enabled: input.is_enabled,
            start_date: input.start_date,
            daily_min_emails: input.daily_min_emails,
            daily_max_emails: input.daily_max_emails,
            reply_rate: input.reply_rate,
            max_duration_days: input.max_duration_days,
            time_window_start: input.time_window_start,
            time_window_end: input.time_window_end,
            randomize: input.randomize,
            current_day: 0,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().await.profiles.push(profile.clone());
        Ok(profile)
    }

    async fn get(&self, id: ProfileId) -> Result<Option<WarmupProfile>> {
        let state = self.state.lock().await;
        Ok(state.profiles.iter().find(|p| p.id == id).cloned())
    }

    async fn get_by_account(&self, account_id: MailAccountId) -> Result<Option<WarmupProfile>> {
        let state = self.state.lock().await;
        Ok(state
            .profiles
            .iter()
            .find(|p| p.mail_account_id == account_id)
            .cloned())
    }

    async fn get_active_profiles(&self, today: NaiveDate) -> Result<Vec<WarmupProfile>> {
        let state = self.state.lock().await;
        Ok(state
            .profiles
            .iter()
            .filter(|p| p.is_enabled && p.start_date <= today && p.has_days_remaining())
            .cloned()
            .collect())
    }

    async fn update(&self, profile: &WarmupProfile) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(stored) = state.profiles.iter_mut().find(|p| p.id == profile.id) {
            let current_day = stored.current_day;
            *stored = profile.clone();
            stored.current_day = current_day;
            stored.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn increment_current_day(&self, id: ProfileId, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(stored) = state.profiles.iter_mut().find(|p| p.id == id) {
            stored.current_day += 1;
            stored.updated_at = at;
        }
        Ok(())
    }

    async fn delete(&self, id: ProfileId) -> Result<()> {
        self.state.lock().await.profiles.retain(|p| p.id != id);
        Ok(())
    }
}

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn get(&self, id: MailAccountId) -> Result<Option<MailAccount>> {
        let state = self.state.lock().await;
        Ok(state.accounts.iter().find(|a| a.id == id).cloned())
    }

    async fn get_by_address(&self, address: &str) -> Result<Option<MailAccount>> {
        let state = self.state.lock().await;
        Ok(state
            .accounts
            .iter()
            .find(|a| a.email_address.eq_ignore_ascii_case(address))
            .cloned())
    }

    async fn get_connected(&self) -> Result<Vec<MailAccount>> {
        let state = self.state.lock().await;
        let mut accounts: Vec<MailAccount> = state
            .accounts
            .iter()
            .filter(|a| a.is_connected())
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.email_address.cmp(&b.email_address));
        Ok(accounts)
    }

    async fn increment_warmup_seen(&self, id: MailAccountId, count: i32) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(account) = state.accounts.iter_mut().find(|a| a.id == id) {
            account.warmup_messages_seen += count;
        }
        Ok(())
    }

    async fn touch_inbox_scan(&self, id: MailAccountId, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(account) = state.accounts.iter_mut().find(|a| a.id == id) {
            account.last_inbox_scan_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl LogRepository for MemoryStore {
    async fn append(&self, log: &WarmupEmailLog) -> Result<()> {
        self.state.lock().await.logs.push(log.clone());
        Ok(())
    }

    async fn exists(&self, account_id: MailAccountId, message_id: &str) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state
            .logs
            .iter()
            .any(|l| l.mail_account_id == account_id && l.message_id == message_id))
    }

    async fn query_by_accounts(
        &self,
        account_ids: &[MailAccountId],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<WarmupEmailLog>> {
        let state = self.state.lock().await;
        let mut logs: Vec<WarmupEmailLog> = state
            .logs
            .iter()
            .filter(|l| {
                let at = l.activity_at();
                account_ids.contains(&l.mail_account_id) && at >= from && at <= to
            })
            .cloned()
            .collect();
        logs.sort_by_key(|l| l.activity_at());
        Ok(logs)
    }

    async fn latest_inbound(
        &self,
        account_id: MailAccountId,
        own_address: &str,
    ) -> Result<Option<WarmupEmailLog>> {
        let own = EmailAddress::from_header(own_address);
        let state = self.state.lock().await;
        Ok(state
            .logs
            .iter()
            .filter(|l| {
                l.mail_account_id == account_id
                    && l.is_inbound()
                    && !l.from_address.is_empty()
                    && !own.as_ref().map_or(false, |o| o.matches(&l.from_address))
            })
            .max_by_key(|l| l.activity_at())
            .cloned())
    }
}

#[async_trait]
impl PlannedActionRepository for MemoryStore {
    async fn save(&self, action: &PlannedAction) -> Result<()> {
        self.state.lock().await.planned.push(action.clone());
        Ok(())
    }

    async fn find_by_message_id(&self, message_id: &str) -> Result<Option<PlannedAction>> {
        let state = self.state.lock().await;
        Ok(state
            .planned
            .iter()
            .find(|p| p.message_id == message_id)
            .cloned())
    }

    async fn find_pending_for_target(
        &self,
        account_id: MailAccountId,
        address: &str,
    ) -> Result<Option<PlannedAction>> {
        let state = self.state.lock().await;
        Ok(state
            .planned
            .iter()
            .filter(|p| {
                p.applied_at.is_none()
                    && (p.target_account_id == Some(account_id)
                        || (p.target_account_id.is_none()
                            && p.target_address.eq_ignore_ascii_case(address)))
            })
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn mark_applied(&self, id: PlannedActionId, at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state
            .planned
            .iter_mut()
            .find(|p| p.id == id && p.applied_at.is_none())
        {
            Some(action) => {
                action.applied_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
