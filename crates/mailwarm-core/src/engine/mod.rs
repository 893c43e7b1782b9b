//! Warmup engine
//!
//! Owns the three passes that move warmup forward: daily job generation,
//! execution of due jobs, and application of action plans to inbound
//! warmup messages. Work for one account is serialized by a per-account
//! lock; different accounts proceed in parallel.

mod executor;
mod generation;
mod inbox;

pub use executor::ExecutionSummary;
pub use generation::GenerationSummary;
pub use inbox::{decide_actions, InboundActions, ScanSummary};

use crate::backend::BackendResolver;
use crate::clock::Clock;
use crate::planner::{LinearWarmupStrategy, WarmupStrategy};
use crate::rescue_queue::InboxRescueQueue;
use crate::rng::SharedRng;
use chrono::{DateTime, Duration, Utc};
use mailwarm_common::types::{EmailAddress, MailAccountId};
use mailwarm_common::{Config, Error, Result};
use mailwarm_storage::models::{MailAccount, WarmupJob};
use mailwarm_storage::repository::{
    AccountRepository, DbAccountRepository, DbJobRepository, DbLogRepository,
    DbPlannedActionRepository, DbProfileRepository, JobRepository, LogRepository,
    PlannedActionRepository, ProfileRepository,
};
use mailwarm_storage::{DatabasePool, MemoryStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Every store the engine reads and writes
#[derive(Clone)]
pub struct Stores {
    pub profiles: Arc<dyn ProfileRepository>,
    pub accounts: Arc<dyn AccountRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub logs: Arc<dyn LogRepository>,
    pub planned: Arc<dyn PlannedActionRepository>,
}

impl Stores {
    /// PostgreSQL-backed stores sharing one pool
    pub fn from_pool(pool: DatabasePool) -> Self {
        Self {
            profiles: Arc::new(DbProfileRepository::new(pool.clone())),
            accounts: Arc::new(DbAccountRepository::new(pool.clone())),
            jobs: Arc::new(DbJobRepository::new(pool.clone())),
            logs: Arc::new(DbLogRepository::new(pool.clone())),
            planned: Arc::new(DbPlannedActionRepository::new(pool)),
        }
    }

    /// All stores served by one in-memory store
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            profiles: store.clone(),
            accounts: store.clone(),
            jobs: store.clone(),
            logs: store.clone(),
            planned: store,
        }
    }
}

/// Explicit retry for failed jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; 1 disables retry
    pub max_attempts: i32,
    pub backoff_secs: i64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_secs: 300,
        }
    }
}

impl RetryPolicy {
    /// The follow-up job for a failed one, if the failure is retryable
    pub fn next_attempt(
        &self,
        job: &WarmupJob,
        error: &Error,
        now: DateTime<Utc>,
    ) -> Option<WarmupJob> {
        if job.attempt >= self.max_attempts || !error.is_transient() {
            return None;
        }
        let delay = Duration::seconds(self.backoff_secs * i64::from(job.attempt));
        let mut next = WarmupJob::pending(job.mail_account_id, job.job_type, now + delay);
        next.attempt = job.attempt + 1;
        next.created_at = now;
        Some(next)
    }
}

/// Tunables for the engine passes
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub worker_concurrency: usize,
    pub batch_size: i64,
    /// Delay range for the follow-up reply after a send, in minutes
    pub reply_delay_min_minutes: i64,
    pub reply_delay_max_minutes: i64,
    pub stale_claim_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            worker_concurrency: 8,
            batch_size: 500,
            reply_delay_min_minutes: 5,
            reply_delay_max_minutes: 15,
            stale_claim_timeout: Duration::minutes(15),
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        let warmup = &config.warmup;
        Self {
            worker_concurrency: warmup.worker_concurrency.max(1),
            batch_size: warmup.batch_size,
            reply_delay_min_minutes: warmup.reply_delay_min_minutes,
            reply_delay_max_minutes: warmup.reply_delay_max_minutes,
            stale_claim_timeout: Duration::seconds(warmup.stale_claim_timeout_secs),
            retry: RetryPolicy {
                max_attempts: config.retry.max_attempts,
                backoff_secs: config.retry.backoff_secs,
            },
        }
    }
}

/// Warmup engine
pub struct WarmupEngine {
    stores: Stores,
    resolver: Arc<dyn BackendResolver>,
    strategy: Arc<dyn WarmupStrategy>,
    clock: Arc<dyn Clock>,
    rng: SharedRng,
    rescue_queue: Arc<InboxRescueQueue>,
    settings: EngineSettings,
    account_locks: Mutex<HashMap<MailAccountId, Arc<tokio::sync::Mutex<()>>>>,
}

impl WarmupEngine {
    pub fn new(
        stores: Stores,
        resolver: Arc<dyn BackendResolver>,
        clock: Arc<dyn Clock>,
        rng: SharedRng,
        settings: EngineSettings,
    ) -> Self {
        Self {
            stores,
            resolver,
            strategy: Arc::new(LinearWarmupStrategy),
            clock,
            rng,
            rescue_queue: Arc::new(InboxRescueQueue::new()),
            settings,
            account_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the planning strategy
    pub fn with_strategy(mut self, strategy: Arc<dyn WarmupStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Share a rescue queue with other components
    pub fn with_rescue_queue(mut self, queue: Arc<InboxRescueQueue>) -> Self {
        self.rescue_queue = queue;
        self
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn rescue_queue(&self) -> &Arc<InboxRescueQueue> {
        &self.rescue_queue
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Check an account's backend credentials
    pub async fn validate_account(&self, account: &MailAccount) -> Result<()> {
        self.resolver.resolve(account).validate(account).await
    }

    /// Lock serializing all work on one account
    fn account_lock(&self, account_id: MailAccountId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.account_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(account_id).or_default())
    }

    async fn require_account(&self, account_id: MailAccountId) -> Result<MailAccount> {
        self.stores
            .accounts
            .get(account_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("mail account {}", account_id)))
    }
}

/// Subject for a reply, adding a single `Re: ` prefix
pub(crate) fn reply_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    let has_prefix = trimmed
        .get(..3)
        .map(|p| p.eq_ignore_ascii_case("re:"))
        .unwrap_or(false);
    if has_prefix {
        trimmed.to_string()
    } else {
        format!("Re: {}", trimmed)
    }
}

/// Fresh Message-ID in the sender's domain, without angle brackets
pub(crate) fn new_message_id(sender: &str) -> String {
    let domain = EmailAddress::parse(sender)
        .map(|a| a.domain)
        .unwrap_or_else(|| "mailwarm.local".to_string());
    format!("{}@{}", Uuid::new_v4().simple(), domain)
}

/// Embedded identifier for a new warmup conversation
pub(crate) fn new_warmup_id() -> String {
    format!("mailwarm-{}", Uuid::new_v4().simple())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::{LabelChange, MailBackend, ObservedMessage, OutgoingMail};
    use crate::clock::FixedOffsetClock;
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveTime, TimeZone};
    use mailwarm_common::types::{MailAccountStatus, MailProviderType, WarmupJobType};
    use mailwarm_storage::models::{GmailCredentials, WarmupProfile};
    use pretty_assertions::assert_eq;

    /// Calls recorded by [`FakeBackend`]
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        Send { from: String, mail: OutgoingMail },
        Modify { account: String, id: String, change: LabelChange },
        Trash { account: String, id: String },
    }

    /// Mail backend double that records calls and serves canned inboxes
    #[derive(Default)]
    pub(crate) struct FakeBackend {
        pub calls: Mutex<Vec<Call>>,
        pub inboxes: Mutex<HashMap<String, Vec<ObservedMessage>>>,
        /// Sends to these addresses fail with a backend error
        pub failing_recipients: Mutex<Vec<String>>,
        pub fail_modify: Mutex<bool>,
    }

    impl FakeBackend {
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn sends(&self) -> Vec<(String, OutgoingMail)> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Send { from, mail } => Some((from, mail)),
                    _ => None,
                })
                .collect()
        }

        pub fn set_inbox(&self, address: &str, messages: Vec<ObservedMessage>) {
            self.inboxes
                .lock()
                .unwrap()
                .insert(address.to_string(), messages);
        }

        pub fn fail_sends_to(&self, address: &str) {
            self.failing_recipients
                .lock()
                .unwrap()
                .push(address.to_string());
        }
    }

    #[async_trait]
    impl MailBackend for FakeBackend {
        fn provider(&self) -> MailProviderType {
            MailProviderType::Gmail
        }

        async fn validate(&self, _account: &MailAccount) -> Result<()> {
            Ok(())
        }

        async fn send(&self, account: &MailAccount, mail: &OutgoingMail) -> Result<String> {
            if self.failing_recipients.lock().unwrap().contains(&mail.to) {
                return Err(Error::Backend("connection reset".to_string()));
            }
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call::Send {
                from: account.email_address.clone(),
                mail: mail.clone(),
            });
            Ok(format!("provider-{}", calls.len()))
        }

        async fn fetch_recent(&self, account: &MailAccount) -> Result<Vec<ObservedMessage>> {
            Ok(self
                .inboxes
                .lock()
                .unwrap()
                .get(&account.email_address)
                .cloned()
                .unwrap_or_default())
        }

        async fn modify_labels(
            &self,
            account: &MailAccount,
            message_id: &str,
            change: &LabelChange,
        ) -> Result<()> {
            if *self.fail_modify.lock().unwrap() {
                return Err(Error::Backend("modify rejected".to_string()));
            }
            self.calls.lock().unwrap().push(Call::Modify {
                account: account.email_address.clone(),
                id: message_id.to_string(),
                change: change.clone(),
            });
            Ok(())
        }

        async fn trash(&self, account: &MailAccount, message_id: &str) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Trash {
                account: account.email_address.clone(),
                id: message_id.to_string(),
            });
            Ok(())
        }
    }

    pub(crate) struct FakeResolver(pub Arc<FakeBackend>);

    impl BackendResolver for FakeResolver {
        fn resolve(&self, _account: &MailAccount) -> Arc<dyn MailBackend> {
            self.0.clone()
        }
    }

    /// Engine over an in-memory store, a fake backend and a pinned clock
    pub(crate) struct Harness {
        pub store: Arc<MemoryStore>,
        pub backend: Arc<FakeBackend>,
        pub clock: Arc<FixedOffsetClock>,
        pub engine: Arc<WarmupEngine>,
    }

    impl Harness {
        pub fn new() -> Self {
            Self::with_settings(EngineSettings::default())
        }

        pub fn with_settings(settings: EngineSettings) -> Self {
            Self::build(settings, Stores::memory)
        }

        /// Harness whose engine uses the stores built by `stores` over the
        /// harness's own memory store
        pub fn with_stores(stores: impl FnOnce(Arc<MemoryStore>) -> Stores) -> Self {
            Self::build(EngineSettings::default(), stores)
        }

        fn build(
            settings: EngineSettings,
            stores: impl FnOnce(Arc<MemoryStore>) -> Stores,
        ) -> Self {
            let store = Arc::new(MemoryStore::new());
            let backend = Arc::new(FakeBackend::default());
            let clock = Arc::new(FixedOffsetClock::utc().pinned_at(start()));
            let stores = stores(store.clone());
            let engine = WarmupEngine::new(
                stores,
                Arc::new(FakeResolver(backend.clone())),
                clock.clone(),
                SharedRng::seeded(17),
                settings,
            );
            Self {
                store,
                backend,
                clock,
                engine: Arc::new(engine),
            }
        }

        pub async fn add_account(&self, address: &str) -> MailAccount {
            let account = account(address);
            self.store.insert_account(account.clone()).await;
            account
        }

        /// Account with an enabled profile that makes it a peer
        pub async fn add_peer(&self, address: &str) -> MailAccount {
            let account = self.add_account(address).await;
            self.store.insert_profile(profile_for(account.id)).await;
            account
        }

        pub async fn account(&self, id: MailAccountId) -> MailAccount {
            AccountRepository::get(self.store.as_ref(), id)
                .await
                .unwrap()
                .unwrap()
        }
    }

    /// 2024-03-04 10:00 UTC
    pub(crate) fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap()
    }

    pub(crate) fn account(address: &str) -> MailAccount {
        MailAccount {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            display_name: None,
            email_address: address.to_string(),
            provider: MailProviderType::Gmail,
            status: MailAccountStatus::Connected,
            gmail: Some(GmailCredentials {
                access_token: "token".to_string(),
                token_expires_at: None,
            }),
            smtp: None,
            warmup_messages_seen: 0,
            last_inbox_scan_at: None,
            created_at: start(),
        }
    }

    pub(crate) fn profile_for(account_id: MailAccountId) -> WarmupProfile {
        WarmupProfile {
            id: Uuid::now_v7(),
            mail_account_id: account_id,
            is_enabled: true,
            start_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            daily_min_emails: 3,
            daily_max_emails: 3,
            reply_rate: 0.3,
            max_duration_days: 0,
            time_window_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            time_window_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            randomize: false,
            current_day: 0,
            created_at: start(),
            updated_at: start(),
        }
    }

    #[test]
    fn test_retry_policy() {
        let now = start();
        let job = WarmupJob::pending(Uuid::now_v7(), WarmupJobType::SendEmail, now);
        let transient = Error::Backend("timeout".to_string());

        assert!(RetryPolicy::default()
            .next_attempt(&job, &transient, now)
            .is_none());

        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_secs: 60,
        };
        let next = policy.next_attempt(&job, &transient, now).unwrap();
        assert_eq!(next.attempt, 2);
        assert_eq!(next.scheduled_at, now + Duration::seconds(60));
        assert_eq!(next.job_type, WarmupJobType::SendEmail);

        let third = policy.next_attempt(&next, &transient, now).unwrap();
        assert_eq!(third.scheduled_at, now + Duration::seconds(120));
        assert!(policy.next_attempt(&third, &transient, now).is_none());

        let config = Error::Config("no token".to_string());
        assert!(policy.next_attempt(&job, &config, now).is_none());
    }

    #[test]
    fn test_reply_subject() {
        assert_eq!(reply_subject("Hello"), "Re: Hello");
        assert_eq!(reply_subject("RE: Hello"), "RE: Hello");
        assert_eq!(reply_subject("re:Hello"), "re:Hello");
        assert_eq!(reply_subject(""), "Re: ");
    }

    #[test]
    fn test_new_message_id_uses_sender_domain() {
        let id = new_message_id("me@example.org");
        assert!(id.ends_with("@example.org"));
        assert!(!id.contains('<'));
        assert!(new_message_id("broken").ends_with("@mailwarm.local"));
    }

    #[tokio::test]
    async fn test_account_lock_is_shared_per_account() {
        let harness = Harness::new();
        let id = Uuid::now_v7();
        let a = harness.engine.account_lock(id);
        let b = harness.engine.account_lock(id);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &harness.engine.account_lock(Uuid::now_v7())));
    }
}
