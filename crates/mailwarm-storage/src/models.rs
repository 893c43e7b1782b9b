//! Database models

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use mailwarm_common::types::{
    EmailDirection, JobId, LogId, MailAccountId, MailAccountStatus, MailProviderType,
    PlannedActionId, ProfileId, UserId, WarmupJobStatus, WarmupJobType,
};
use mailwarm_common::WarmupActionPlan;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Warmup profile model
///
/// One profile per mail account. `current_day` counts successful daily
/// generations and is informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmupProfile {
    pub id: ProfileId,
    pub mail_account_id: MailAccountId,
    pub is_enabled: bool,
    pub start_date: NaiveDate,
    pub daily_min_emails: i32,
    pub daily_max_emails: i32,
    pub reply_rate: f64,
    /// Zero means unlimited
    pub max_duration_days: i32,
    pub time_window_start: NaiveTime,
    pub time_window_end: NaiveTime,
    pub randomize: bool,
    pub current_day: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WarmupProfile {
    /// Whether the profile still has day budget left
    pub fn has_days_remaining(&self) -> bool {
        self.max_duration_days == 0 || self.current_day < self.max_duration_days
    }
}

/// Create warmup profile input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWarmupProfile {
    pub mail_account_id: MailAccountId,
    pub is_enabled: bool,
    pub start_date: NaiveDate,
    pub daily_min_emails: i32,
    pub daily_max_emails: i32,
    pub reply_rate: f64,
    pub max_duration_days: i32,
    pub time_window_start: NaiveTime,
    pub time_window_end: NaiveTime,
    pub randomize: bool,
}

/// Update warmup profile input
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateWarmupProfile {
    pub is_enabled: Option<bool>,
    pub start_date: Option<NaiveDate>,
    pub daily_min_emails: Option<i32>,
    pub daily_max_emails: Option<i32>,
    pub reply_rate: Option<f64>,
    pub max_duration_days: Option<i32>,
    pub time_window_start: Option<NaiveTime>,
    pub time_window_end: Option<NaiveTime>,
    pub randomize: Option<bool>,
}

impl UpdateWarmupProfile {
    /// Apply the changes to a profile
    pub fn apply(&self, profile: &mut WarmupProfile) {
        if let Some(v) = self.is_enabled {
            profile.is_enabled = v;
        }
        if let Some(v) = self.start_date {
            profile.start_date = v;
        }
        if let Some(v) = self.daily_min_emails {
            profile.daily_min_emails = v;
        }
        if let Some(v) = self.daily_max_emails {
            profile.daily_max_emails = v;
        }
        if let Some(v) = self.reply_rate {
            profile.reply_rate = v;
        }
        if let Some(v) = self.max_duration_days {
            profile.max_duration_days = v;
        }
        if let Some(v) = self.time_window_start {
            profile.time_window_start = v;
        }
        if let Some(v) = self.time_window_end {
            profile.time_window_end = v;
        }
        if let Some(v) = self.randomize {
            profile.randomize = v;
        }
    }
}

/// Gmail OAuth credentials stored for an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GmailCredentials {
    pub access_token: String,
    pub token_expires_at: Option<DateTime<Utc>>,
}

/// SMTP submission settings stored for an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub use_tls: bool,
}

/// Mail account model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailAccount {
    pub id: MailAccountId,
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub email_address: String,
    pub provider: MailProviderType,
    pub status: MailAccountStatus,
    pub gmail: Option<GmailCredentials>,
    pub smtp: Option<SmtpSettings>,
    /// Warmup messages seen so far, drives the grace window
    pub warmup_messages_seen: i32,
    pub last_inbox_scan_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MailAccount {
    pub fn is_connected(&self) -> bool {
        self.status == MailAccountStatus::Connected
    }
}

/// Warmup job model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmupJob {
    pub id: JobId,
    pub mail_account_id: MailAccountId,
    pub job_type: WarmupJobType,
    pub scheduled_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub status: WarmupJobStatus,
    pub error_message: Option<String>,
    /// 1-based attempt number
    pub attempt: i32,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WarmupJob {
    /// Build a new pending job
    pub fn pending(
        mail_account_id: MailAccountId,
        job_type: WarmupJobType,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            mail_account_id,
            job_type,
            scheduled_at,
            executed_at: None,
            status: WarmupJobStatus::Pending,
            error_message: None,
            attempt: 1,
            claimed_at: None,
            created_at: Utc::now(),
        }
    }

    /// Mark the job succeeded
    pub fn succeed(&mut self, at: DateTime<Utc>) {
        self.status = WarmupJobStatus::Success;
        self.error_message = None;
        self.executed_at = Some(at);
    }

    /// Mark the job failed with a message
    pub fn fail(&mut self, message: impl Into<String>, at: DateTime<Utc>) {
        self.status = WarmupJobStatus::Failed;
        self.error_message = Some(message.into());
        self.executed_at = Some(at);
    }
}

/// Warmup email log model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmupEmailLog {
    pub id: LogId,
    pub mail_account_id: MailAccountId,
    /// Provider message id
    pub message_id: String,
    pub warmup_id: Option<String>,
    pub direction: EmailDirection,
    pub subject: String,
    pub from_address: String,
    pub to_address: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub marked_as_important: bool,
    pub marked_as_starred: bool,
    pub is_spam: bool,
    pub is_warmup: bool,
    pub created_at: DateTime<Utc>,
}

impl WarmupEmailLog {
    /// Build a log entry with all flags cleared
    pub fn new(
        mail_account_id: MailAccountId,
        message_id: impl Into<String>,
        direction: EmailDirection,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            mail_account_id,
            message_id: message_id.into(),
            warmup_id: None,
            direction,
            subject: String::new(),
            from_address: String::new(),
            to_address: String::new(),
            sent_at: None,
            delivered_at: None,
            opened_at: None,
            marked_as_important: false,
            marked_as_starred: false,
            is_spam: false,
            is_warmup: false,
            created_at: Utc::now(),
        }
    }

    /// Timestamp used to place the log on a calendar day
    pub fn activity_at(&self) -> DateTime<Utc> {
        self.sent_at
            .or(self.delivered_at)
            .unwrap_or(self.created_at)
    }

    pub fn is_inbound(&self) -> bool {
        self.direction == EmailDirection::Received
    }
}

/// Planned action record, the plan attached to one outgoing warmup message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub id: PlannedActionId,
    pub sender_account_id: Option<MailAccountId>,
    pub target_account_id: Option<MailAccountId>,
    pub target_address: String,
    /// Internet Message-ID of the carrying message
    pub message_id: String,
    pub plan: WarmupActionPlan,
    pub created_at: DateTime<Utc>,
    pub applied_at: Option<DateTime<Utc>>,
}

impl PlannedAction {
    pub fn new(
        sender_account_id: Option<MailAccountId>,
        target_account_id: Option<MailAccountId>,
        target_address: impl Into<String>,
        message_id: impl Into<String>,
        plan: WarmupActionPlan,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            sender_account_id,
            target_account_id,
            target_address: target_address.into(),
            message_id: message_id.into(),
            plan,
            created_at,
            applied_at: None,
        }
    }
}
