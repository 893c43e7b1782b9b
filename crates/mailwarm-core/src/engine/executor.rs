//! Execution pass for due jobs

use super::{new_message_id, new_warmup_id, reply_subject, WarmupEngine};
use crate::backend::{MailBackend, OutgoingMail};
use crate::plan::generate_plan;
use chrono::Duration;
use mailwarm_common::types::{
    EmailAddress, EmailDirection, MailAccountId, WarmupJobStatus, WarmupJobType,
};
use mailwarm_common::{Error, Result};
use mailwarm_storage::models::{MailAccount, PlannedAction, WarmupEmailLog, WarmupJob};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const SEND_SUBJECT: &str = "Warmup ping";
const SEND_BODY: &str = "Hello from MailWarm warmup.";
const FALLBACK_REPLY_SUBJECT: &str = "Warmup reply";
const REPLY_BODY: &str = "Replying to warmup thread.";

/// Outcome of one execution pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Jobs another executor claimed first
    pub skipped: usize,
    pub retried: usize,
    pub stale_claims: u64,
}

impl ExecutionSummary {
    fn absorb(&mut self, other: ExecutionSummary) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.retried += other.retried;
    }
}

/// Who a send or reply goes to
#[derive(Debug, Clone)]
struct Correspondent {
    address: String,
    account_id: Option<MailAccountId>,
    subject: String,
    body: &'static str,
    /// Picked from the peer pool rather than from an inbound message
    is_peer: bool,
}

/// Due jobs per account, accounts in order of their earliest job
fn group_by_account(jobs: Vec<WarmupJob>) -> Vec<(MailAccountId, Vec<WarmupJob>)> {
    let mut index: HashMap<MailAccountId, usize> = HashMap::new();
    let mut groups: Vec<(MailAccountId, Vec<WarmupJob>)> = Vec::new();
    for job in jobs {
        match index.get(&job.mail_account_id) {
            Some(&i) => groups[i].1.push(job),
            None => {
                index.insert(job.mail_account_id, groups.len());
                groups.push((job.mail_account_id, vec![job]));
            }
        }
    }
    groups
}

impl WarmupEngine {
    /// Execute every due pending job
    ///
    /// Accounts run in parallel up to the configured concurrency; one
    /// account's jobs run sequentially in scheduled order. Cancellation is
    /// checked between jobs, never in the middle of a backend call.
    pub async fn execute_pending_jobs(
        self: &Arc<Self>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionSummary> {
        let now = self.clock.now();
        let stale_claims = self
            .stores
            .jobs
            .fail_stale_claims(now - self.settings.stale_claim_timeout, now)
            .await?;
        if stale_claims > 0 {
            warn!("Failed {} abandoned job claims", stale_claims);
        }

        let due = self
            .stores
            .jobs
            .get_due_jobs(now, self.settings.batch_size)
            .await?;
        let mut summary = ExecutionSummary {
            due: due.len(),
            stale_claims,
            ..Default::default()
        };
        if due.is_empty() {
            return Ok(summary);
        }

        debug!("Processing {} due warmup jobs", due.len());

        let peers = Arc::new(self.peer_pool().await?);
        let semaphore = Arc::new(Semaphore::new(self.settings.worker_concurrency.max(1)));
        let mut handles = Vec::new();

        for (account_id, jobs) in group_by_account(due) {
            if cancel.is_cancelled() {
                break;
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| Error::Internal(e.to_string()))?;
            let engine = Arc::clone(self);
            let peers = Arc::clone(&peers);
            let cancel = cancel.clone();

            let handle = tokio::spawn(async move {
                let outcome = engine
                    .run_account_jobs(account_id, jobs, &peers, &cancel)
                    .await;
                drop(permit);
                outcome
            });
            handles.push(handle);
        }

        for handle in handles {
            match handle.await {
                Ok(outcome) => summary.absorb(outcome),
                Err(e) => error!("Task error: {}", e),
            }
        }

        info!(
            "Execution pass finished (due: {}, succeeded: {}, failed: {}, skipped: {}, retried: {})",
            summary.due, summary.succeeded, summary.failed, summary.skipped, summary.retried
        );
        Ok(summary)
    }

    /// Connected accounts that have an active profile
    async fn peer_pool(&self) -> Result<Vec<MailAccount>> {
        let active: HashSet<MailAccountId> = self
            .stores
            .profiles
            .get_active_profiles(self.clock.today())
            .await?
            .into_iter()
            .map(|p| p.mail_account_id)
            .collect();

        Ok(self
            .stores
            .accounts
            .get_connected()
            .await?
            .into_iter()
            .filter(|a| active.contains(&a.id))
            .collect())
    }

    async fn run_account_jobs(
        &self,
        account_id: MailAccountId,
        jobs: Vec<WarmupJob>,
        peers: &[MailAccount],
        cancel: &CancellationToken,
    ) -> ExecutionSummary {
        let lock = self.account_lock(account_id);
        let _guard = lock.lock().await;
        let mut outcome = ExecutionSummary::default();

        for mut job in jobs {
            if cancel.is_cancelled() {
                debug!(account_id = %account_id, "Execution cancelled");
                break;
            }

            let claimed_at = self.clock.now();
            match self.stores.jobs.claim(job.id, claimed_at).await {
                Ok(true) => {
                    job.status = WarmupJobStatus::InProgress;
                    job.claimed_at = Some(claimed_at);
                }
                Ok(false) => {
                    debug!(job_id = %job.id, "Job already claimed");
                    outcome.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(job_id = %job.id, "Failed to claim job: {}", e);
                    outcome.skipped += 1;
                    continue;
                }
            }

            let result = self.execute_job(&job, peers).await;
            let succeeded = result.is_ok();
            if self.finish_job(job, result).await {
                outcome.retried += 1;
            }
            if succeeded {
                outcome.succeeded += 1;
            } else {
                outcome.failed += 1;
            }
        }

        outcome
    }

    async fn execute_job(&self, job: &WarmupJob, peers: &[MailAccount]) -> Result<()> {
        let account = self.require_account(job.mail_account_id).await?;
        let backend = self.resolver.resolve(&account);

        match job.job_type {
            WarmupJobType::SendEmail | WarmupJobType::ReplyEmail => {
                self.send_for_job(job, &account, backend.as_ref(), peers)
                    .await
            }
            WarmupJobType::MarkImportant => {
                let target = self.latest_inbound_message(&account).await?;
                backend.mark_important(&account, &target).await
            }
            WarmupJobType::MoveToInbox => {
                let target = self.latest_inbound_message(&account).await?;
                backend.move_to_inbox(&account, &target).await
            }
        }
    }

    /// Provider id of the newest message received from someone else
    async fn latest_inbound_message(&self, account: &MailAccount) -> Result<String> {
        self.stores
            .logs
            .latest_inbound(account.id, &account.email_address)
            .await?
            .map(|log| log.message_id)
            .ok_or_else(|| {
                Error::NotFound(format!("inbound message for {}", account.email_address))
            })
    }

    async fn send_for_job(
        &self,
        job: &WarmupJob,
        account: &MailAccount,
        backend: &dyn MailBackend,
        peers: &[MailAccount],
    ) -> Result<()> {
        let correspondent = self.resolve_correspondent(job, account, peers).await?;
        let now = self.clock.now();
        let warmup_id = new_warmup_id();
        let plan = self.rng.with(|rng| generate_plan(rng));
        let mail = OutgoingMail {
            to: correspondent.address.clone(),
            subject: correspondent.subject.clone(),
            body: correspondent.body.to_string(),
            message_id: new_message_id(&account.email_address),
            warmup_id: Some(warmup_id.clone()),
            plan: Some(plan),
            in_reply_to: None,
            thread_id: None,
        };

        // Must exist before the mail can be scanned on the other side
        let planned = PlannedAction::new(
            Some(account.id),
            correspondent.account_id,
            correspondent.address.clone(),
            mail.message_id.clone(),
            plan,
            now,
        );
        self.stores.planned.save(&planned).await?;

        let provider_id = backend.send(account, &mail).await?;

        if job.job_type == WarmupJobType::SendEmail && correspondent.is_peer {
            if let Some(peer_id) = correspondent.account_id {
                self.schedule_follow_up(peer_id).await?;
                self.rescue_queue.enqueue(peer_id);
            }
        }

        let direction = match job.job_type {
            WarmupJobType::ReplyEmail => EmailDirection::Replied,
            _ => EmailDirection::Sent,
        };
        let mut log = WarmupEmailLog::new(account.id, provider_id, direction);
        log.warmup_id = Some(warmup_id);
        log.subject = mail.subject;
        log.from_address = account.email_address.clone();
        log.to_address = mail.to;
        log.sent_at = Some(now);
        log.delivered_at = Some(now);
        log.is_warmup = true;
        log.created_at = now;
        self.stores.logs.append(&log).await?;

        debug!(
            job_id = %job.id,
            account_id = %account.id,
            to = %correspondent.address,
            "Warmup {} sent", job.job_type
        );
        Ok(())
    }

    async fn resolve_correspondent(
        &self,
        job: &WarmupJob,
        account: &MailAccount,
        peers: &[MailAccount],
    ) -> Result<Correspondent> {
        if job.job_type == WarmupJobType::ReplyEmail {
            if let Some(correspondent) = self.reply_target(account).await? {
                return Ok(correspondent);
            }
        }

        let (subject, body) = match job.job_type {
            WarmupJobType::ReplyEmail => (FALLBACK_REPLY_SUBJECT, REPLY_BODY),
            _ => (SEND_SUBJECT, SEND_BODY),
        };

        Ok(match self.pick_peer(account, peers) {
            Some(peer) => Correspondent {
                address: peer.email_address,
                account_id: Some(peer.id),
                subject: subject.to_string(),
                body,
                is_peer: true,
            },
            None => {
                debug!(account_id = %account.id, "No peer available, sending to self");
                Correspondent {
                    address: account.email_address.clone(),
                    account_id: Some(account.id),
                    subject: subject.to_string(),
                    body,
                    is_peer: false,
                }
            }
        })
    }

    /// Sender of the latest inbound message, unless that is the account itself
    async fn reply_target(&self, account: &MailAccount) -> Result<Option<Correspondent>> {
        let Some(log) = self
            .stores
            .logs
            .latest_inbound(account.id, &account.email_address)
            .await?
        else {
            return Ok(None);
        };

        let Some(sender) = EmailAddress::from_header(&log.from_address) else {
            return Ok(None);
        };
        if sender.matches(&account.email_address) {
            return Ok(None);
        }

        let address = sender.to_string();
        let account_id = self
            .stores
            .accounts
            .get_by_address(&address)
            .await?
            .map(|a| a.id);

        Ok(Some(Correspondent {
            address,
            account_id,
            subject: reply_subject(&log.subject),
            body: REPLY_BODY,
            is_peer: false,
        }))
    }

    fn pick_peer(&self, account: &MailAccount, peers: &[MailAccount]) -> Option<MailAccount> {
        let candidates: Vec<&MailAccount> = peers
            .iter()
            .filter(|p| {
                p.id != account.id && !p.email_address.eq_ignore_ascii_case(&account.email_address)
            })
            .collect();
        self.rng
            .with(|rng| candidates.choose(rng).map(|p| (*p).clone()))
    }

    async fn schedule_follow_up(&self, peer_id: MailAccountId) -> Result<()> {
        let low = self.settings.reply_delay_min_minutes;
        let high = self.settings.reply_delay_max_minutes.max(low);
        let delay = self.rng.with(|rng| rng.gen_range(low..=high));

        let job = WarmupJob::pending(
            peer_id,
            WarmupJobType::ReplyEmail,
            self.clock.now() + Duration::minutes(delay),
        );
        self.stores.jobs.add_jobs(&[job]).await?;
        Ok(())
    }

    /// Store the job's outcome; returns true when a retry was queued
    async fn finish_job(&self, mut job: WarmupJob, result: Result<()>) -> bool {
        let now = self.clock.now();
        let retry = match &result {
            Ok(()) => {
                job.succeed(now);
                None
            }
            Err(e) => {
                warn!(
                    job_id = %job.id,
                    account_id = %job.mail_account_id,
                    "Warmup {} failed: {}", job.job_type, e
                );
                job.fail(e.to_string(), now);
                self.settings.retry.next_attempt(&job, e, now)
            }
        };

        match self.stores.jobs.update_job(&job).await {
            Ok(true) => {}
            Ok(false) => warn!(job_id = %job.id, "Job was already finished elsewhere"),
            Err(e) => error!(job_id = %job.id, "Failed to store job outcome: {}", e),
        }

        let Some(next) = retry else {
            return false;
        };
        match self.stores.jobs.add_jobs(&[next]).await {
            Ok(_) => {
                info!(job_id = %job.id, attempt = job.attempt + 1, "Queued job retry");
                true
            }
            Err(e) => {
                error!(job_id = %job.id, "Failed to queue job retry: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{account, Call, Harness};
    use super::super::{EngineSettings, RetryPolicy};
    use super::*;
    use crate::clock::Clock;
    use chrono::Duration;
    use mailwarm_common::types::EmailDirection;
    use mailwarm_storage::repository::{JobRepository, LogRepository};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    async fn due_job(
        harness: &Harness,
        account_id: MailAccountId,
        job_type: WarmupJobType,
    ) -> WarmupJob {
        let scheduled_at = harness.clock.now() - Duration::minutes(1);
        let job = WarmupJob::pending(account_id, job_type, scheduled_at);
        JobRepository::add_jobs(harness.store.as_ref(), &[job.clone()])
            .await
            .unwrap();
        job
    }

    fn stored<'a>(jobs: &'a [WarmupJob], id: Uuid) -> &'a WarmupJob {
        jobs.iter().find(|j| j.id == id).unwrap()
    }

    #[tokio::test]
    async fn test_send_to_peer_schedules_follow_up() {
        let harness = Harness::new();
        let a = harness.add_peer("a@example.com").await;
        let b = harness.add_peer("b@example.com").await;
        let job = due_job(&harness, a.id, WarmupJobType::SendEmail).await;

        let summary = harness
            .engine
            .execute_pending_jobs(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.succeeded, 1);

        let sends = harness.backend.sends();
        assert_eq!(sends.len(), 1);
        let (from, mail) = &sends[0];
        assert_eq!(from, "a@example.com");
        assert_eq!(mail.to, "b@example.com");
        assert!(mail.warmup_id.as_deref().unwrap().starts_with("mailwarm-"));
        assert!(mail.plan.is_some());

        let jobs = harness.store.jobs().await;
        let done = stored(&jobs, job.id);
        assert_eq!(done.status, WarmupJobStatus::Success);
        assert_eq!(done.executed_at, Some(harness.clock.now()));

        let follow_up: Vec<&WarmupJob> = jobs.iter().filter(|j| j.id != job.id).collect();
        assert_eq!(follow_up.len(), 1);
        assert_eq!(follow_up[0].mail_account_id, b.id);
        assert_eq!(follow_up[0].job_type, WarmupJobType::ReplyEmail);
        let delay = follow_up[0].scheduled_at - harness.clock.now();
        assert!(delay >= Duration::minutes(5) && delay <= Duration::minutes(15));

        let logs = harness.store.logs().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].direction, EmailDirection::Sent);
        assert_eq!(logs[0].to_address, "b@example.com");
        assert!(logs[0].is_warmup);

        let planned = harness.store.planned_actions().await;
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].target_account_id, Some(b.id));
        assert_eq!(planned[0].message_id, mail.message_id);
        assert_eq!(Some(planned[0].plan), mail.plan);

        assert_eq!(harness.engine.rescue_queue().drain(), vec![b.id]);
    }

    #[tokio::test]
    async fn test_send_without_peers_goes_to_self() {
        let harness = Harness::new();
        let a = harness.add_peer("a@example.com").await;
        due_job(&harness, a.id, WarmupJobType::SendEmail).await;

        harness
            .engine
            .execute_pending_jobs(&CancellationToken::new())
            .await
            .unwrap();

        let sends = harness.backend.sends();
        assert_eq!(sends[0].1.to, "a@example.com");
        // No conversation partner, so no follow-up
        assert_eq!(harness.store.jobs().await.len(), 1);
        assert!(harness.engine.rescue_queue().is_empty());
    }

    #[tokio::test]
    async fn test_reply_uses_latest_inbound_sender() {
        let harness = Harness::new();
        let a = harness.add_peer("a@example.com").await;
        harness.add_peer("b@example.com").await;

        let mut inbound = WarmupEmailLog::new(a.id, "gm-1", EmailDirection::Received);
        inbound.from_address = "Outside <outside@example.net>".to_string();
        inbound.subject = "Lunch".to_string();
        inbound.delivered_at = Some(harness.clock.now() - Duration::hours(1));
        LogRepository::append(harness.store.as_ref(), &inbound)
            .await
            .unwrap();
        due_job(&harness, a.id, WarmupJobType::ReplyEmail).await;

        harness
            .engine
            .execute_pending_jobs(&CancellationToken::new())
            .await
            .unwrap();

        let sends = harness.backend.sends();
        assert_eq!(sends[0].1.to, "outside@example.net");
        assert_eq!(sends[0].1.subject, "Re: Lunch");

        let logs = harness.store.logs().await;
        let replied: Vec<_> = logs
            .iter()
            .filter(|l| l.direction == EmailDirection::Replied)
            .collect();
        assert_eq!(replied.len(), 1);
        // Replies never spawn another follow-up
        assert_eq!(harness.store.jobs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_reply_without_inbound_falls_back_to_peer() {
        let harness = Harness::new();
        let a = harness.add_peer("a@example.com").await;
        harness.add_peer("b@example.com").await;
        due_job(&harness, a.id, WarmupJobType::ReplyEmail).await;

        harness
            .engine
            .execute_pending_jobs(&CancellationToken::new())
            .await
            .unwrap();

        let sends = harness.backend.sends();
        assert_eq!(sends[0].1.to, "b@example.com");
        assert_eq!(sends[0].1.subject, FALLBACK_REPLY_SUBJECT);
    }

    #[tokio::test]
    async fn test_missing_account_fails_without_backend_call() {
        let harness = Harness::new();
        let job = due_job(&harness, Uuid::now_v7(), WarmupJobType::SendEmail).await;

        let summary = harness
            .engine
            .execute_pending_jobs(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.failed, 1);
        assert!(harness.backend.calls().is_empty());

        let jobs = harness.store.jobs().await;
        let failed = stored(&jobs, job.id);
        assert_eq!(failed.status, WarmupJobStatus::Failed);
        assert!(failed.error_message.as_deref().unwrap().contains("mail account"));
        assert_eq!(failed.executed_at, Some(harness.clock.now()));
    }

    #[tokio::test]
    async fn test_mark_important_targets_latest_inbound() {
        let harness = Harness::new();
        let a = harness.add_peer("a@example.com").await;
        let mut inbound = WarmupEmailLog::new(a.id, "gm-7", EmailDirection::Received);
        inbound.from_address = "b@example.com".to_string();
        LogRepository::append(harness.store.as_ref(), &inbound)
            .await
            .unwrap();
        due_job(&harness, a.id, WarmupJobType::MarkImportant).await;
        let move_job = due_job(&harness, a.id, WarmupJobType::MoveToInbox).await;

        harness
            .engine
            .execute_pending_jobs(&CancellationToken::new())
            .await
            .unwrap();

        let calls = harness.backend.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], Call::Modify { id, change, .. }
            if id == "gm-7" && change.adds("IMPORTANT")));
        assert!(matches!(&calls[1], Call::Modify { id, change, .. }
            if id == "gm-7" && change.adds("INBOX") && change.removes("SPAM")));
        let jobs = harness.store.jobs().await;
        assert_eq!(stored(&jobs, move_job.id).status, WarmupJobStatus::Success);
    }

    #[tokio::test]
    async fn test_mark_important_without_inbound_fails() {
        let harness = Harness::new();
        let a = harness.add_peer("a@example.com").await;
        let job = due_job(&harness, a.id, WarmupJobType::MarkImportant).await;

        harness
            .engine
            .execute_pending_jobs(&CancellationToken::new())
            .await
            .unwrap();

        let jobs = harness.store.jobs().await;
        assert_eq!(stored(&jobs, job.id).status, WarmupJobStatus::Failed);
    }

    #[tokio::test]
    async fn test_backend_failure_is_not_retried_by_default() {
        let harness = Harness::new();
        let a = harness.add_peer("a@example.com").await;
        harness.add_peer("b@example.com").await;
        harness.backend.fail_sends_to("b@example.com");
        let job = due_job(&harness, a.id, WarmupJobType::SendEmail).await;

        let summary = harness
            .engine
            .execute_pending_jobs(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!((summary.failed, summary.retried), (1, 0));

        let jobs = harness.store.jobs().await;
        assert_eq!(jobs.len(), 1);
        let failed = stored(&jobs, job.id);
        assert_eq!(failed.status, WarmupJobStatus::Failed);
        assert!(failed.error_message.as_deref().unwrap().contains("connection reset"));
        assert!(harness.store.logs().await.is_empty());
    }

    #[tokio::test]
    async fn test_retry_policy_requeues_transient_failures() {
        let harness = Harness::with_settings(EngineSettings {
            retry: RetryPolicy {
                max_attempts: 2,
                backoff_secs: 120,
            },
            ..Default::default()
        });
        let a = harness.add_peer("a@example.com").await;
        harness.add_peer("b@example.com").await;
        harness.backend.fail_sends_to("b@example.com");
        let job = due_job(&harness, a.id, WarmupJobType::SendEmail).await;

        let summary = harness
            .engine
            .execute_pending_jobs(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.retried, 1);

        let jobs = harness.store.jobs().await;
        let retry = jobs.iter().find(|j| j.id != job.id).unwrap();
        assert_eq!(retry.attempt, 2);
        assert_eq!(retry.status, WarmupJobStatus::Pending);
        assert_eq!(retry.scheduled_at, harness.clock.now() + Duration::seconds(120));
    }

    #[tokio::test]
    async fn test_jobs_run_in_scheduled_order_per_account() {
        let harness = Harness::new();
        let a = harness.add_peer("a@example.com").await;
        let now = harness.clock.now();
        let later = WarmupJob::pending(a.id, WarmupJobType::SendEmail, now - Duration::minutes(1));
        let earlier = WarmupJob::pending(a.id, WarmupJobType::ReplyEmail, now - Duration::minutes(30));
        JobRepository::add_jobs(harness.store.as_ref(), &[later, earlier])
            .await
            .unwrap();

        harness
            .engine
            .execute_pending_jobs(&CancellationToken::new())
            .await
            .unwrap();

        let subjects: Vec<String> = harness
            .backend
            .sends()
            .into_iter()
            .map(|(_, m)| m.subject)
            .collect();
        assert_eq!(subjects, vec![FALLBACK_REPLY_SUBJECT, SEND_SUBJECT]);
    }

    #[tokio::test]
    async fn test_claimed_job_is_not_executed_twice() {
        let harness = Harness::new();
        let a = harness.add_peer("a@example.com").await;
        let job = due_job(&harness, a.id, WarmupJobType::SendEmail).await;
        JobRepository::claim(harness.store.as_ref(), job.id, harness.clock.now())
            .await
            .unwrap();

        let summary = harness
            .engine
            .execute_pending_jobs(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.due, 0);
        assert!(harness.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stale_claims_are_failed() {
        let harness = Harness::new();
        let a = harness.add_peer("a@example.com").await;
        let job = due_job(&harness, a.id, WarmupJobType::SendEmail).await;
        JobRepository::claim(
            harness.store.as_ref(),
            job.id,
            harness.clock.now() - Duration::hours(1),
        )
        .await
        .unwrap();

        let summary = harness
            .engine
            .execute_pending_jobs(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.stale_claims, 1);
        let jobs = harness.store.jobs().await;
        assert_eq!(stored(&jobs, job.id).error_message.as_deref(), Some("Claim abandoned"));
    }

    #[tokio::test]
    async fn test_cancelled_pass_leaves_jobs_pending() {
        let harness = Harness::new();
        let a = harness.add_peer("a@example.com").await;
        let job = due_job(&harness, a.id, WarmupJobType::SendEmail).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        harness.engine.execute_pending_jobs(&cancel).await.unwrap();

        let jobs = harness.store.jobs().await;
        assert_eq!(stored(&jobs, job.id).status, WarmupJobStatus::Pending);
    }

    #[test]
    fn test_group_by_account_keeps_order() {
        let (a, b) = (account("a@x.com"), account("b@x.com"));
        let now = chrono::Utc::now();
        let jobs = vec![
            WarmupJob::pending(a.id, WarmupJobType::SendEmail, now),
            WarmupJob::pending(b.id, WarmupJobType::SendEmail, now),
            WarmupJob::pending(a.id, WarmupJobType::ReplyEmail, now),
        ];
        let groups = group_by_account(jobs);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, a.id);
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[0].1[1].job_type, WarmupJobType::ReplyEmail);
        assert_eq!(groups[1].0, b.id);
    }
}
