//! Common types for MailWarm

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for users
pub type UserId = Uuid;

/// Unique identifier for mail accounts
pub type MailAccountId = Uuid;

/// Unique identifier for warmup profiles
pub type ProfileId = Uuid;

/// Unique identifier for warmup jobs
pub type JobId = Uuid;

/// Unique identifier for warmup email log entries
pub type LogId = Uuid;

/// Unique identifier for planned action records
pub type PlannedActionId = Uuid;

/// Timestamp wrapper
pub type Timestamp = DateTime<Utc>;

/// Header carrying the warmup identifier embedded in every warmup message
pub const WARMUP_ID_HEADER: &str = "X-Warmup-Id";

/// Header carrying the encoded action plan for the receiving mailbox
pub const WARMUP_PLAN_HEADER: &str = "X-Warmup-Plan";

/// Email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress {
    pub local: String,
    pub domain: String,
}

impl EmailAddress {
    /// Create a new email address
    pub fn new(local: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            domain: domain.into(),
        }
    }

    /// Parse a bare email address from a string
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.trim().splitn(2, '@').collect();
        if parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty() {
            Some(Self::new(parts[0], parts[1]))
        } else {
            None
        }
    }

    /// Parse the address out of a header value such as `"Jane" <jane@example.com>`
    pub fn from_header(value: &str) -> Option<Self> {
        let value = value.trim();
        let candidate = match (value.rfind('<'), value.rfind('>')) {
            (Some(start), Some(end)) if start < end => &value[start + 1..end],
            _ => value,
        };
        Self::parse(candidate)
    }

    /// Case-insensitive comparison against another address string
    pub fn matches(&self, other: &str) -> bool {
        Self::from_header(other)
            .map(|o| {
                o.local.eq_ignore_ascii_case(&self.local)
                    && o.domain.eq_ignore_ascii_case(&self.domain)
            })
            .unwrap_or(false)
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

impl std::str::FromStr for EmailAddress {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::Validation("Invalid email address".to_string()))
    }
}

/// Warmup job status
///
/// `Pending -> InProgress -> {Success, Failed}`; the last two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmupJobStatus {
    Pending,
    InProgress,
    Success,
    Failed,
}

impl WarmupJobStatus {
    /// Whether no further transition is allowed
    pub fn is_terminal(&self) -> bool {
        matches!(self, WarmupJobStatus::Success | WarmupJobStatus::Failed)
    }
}

impl std::fmt::Display for WarmupJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WarmupJobStatus::Pending => write!(f, "pending"),
            WarmupJobStatus::InProgress => write!(f, "in_progress"),
            WarmupJobStatus::Success => write!(f, "success"),
            WarmupJobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for WarmupJobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WarmupJobStatus::Pending),
            "in_progress" => Ok(WarmupJobStatus::InProgress),
            "success" => Ok(WarmupJobStatus::Success),
            "failed" => Ok(WarmupJobStatus::Failed),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// Warmup job type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmupJobType {
    SendEmail,
    ReplyEmail,
    MarkImportant,
    MoveToInbox,
}

impl std::fmt::Display for WarmupJobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WarmupJobType::SendEmail => write!(f, "send_email"),
            WarmupJobType::ReplyEmail => write!(f, "reply_email"),
            WarmupJobType::MarkImportant => write!(f, "mark_important"),
            WarmupJobType::MoveToInbox => write!(f, "move_to_inbox"),
        }
    }
}

impl std::str::FromStr for WarmupJobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "send_email" => Ok(WarmupJobType::SendEmail),
            "reply_email" => Ok(WarmupJobType::ReplyEmail),
            "mark_important" => Ok(WarmupJobType::MarkImportant),
            "move_to_inbox" => Ok(WarmupJobType::MoveToInbox),
            _ => Err(format!("Unknown job type: {}", s)),
        }
    }
}

/// Direction of a logged message relative to the account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailDirection {
    Sent,
    Received,
    Replied,
}

impl std::fmt::Display for EmailDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmailDirection::Sent => write!(f, "sent"),
            EmailDirection::Received => write!(f, "received"),
            EmailDirection::Replied => write!(f, "replied"),
        }
    }
}

impl std::str::FromStr for EmailDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(EmailDirection::Sent),
            "received" => Ok(EmailDirection::Received),
            "replied" => Ok(EmailDirection::Replied),
            _ => Err(format!("Unknown email direction: {}", s)),
        }
    }
}

/// Mail provider behind an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailProviderType {
    Gmail,
    SmtpImap,
}

impl std::fmt::Display for MailProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailProviderType::Gmail => write!(f, "gmail"),
            MailProviderType::SmtpImap => write!(f, "smtp_imap"),
        }
    }
}

impl std::str::FromStr for MailProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gmail" => Ok(MailProviderType::Gmail),
            "smtp_imap" => Ok(MailProviderType::SmtpImap),
            _ => Err(format!("Unknown provider type: {}", s)),
        }
    }
}

/// Connection status of a mail account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailAccountStatus {
    Pending,
    Connected,
    Error,
}

impl std::fmt::Display for MailAccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailAccountStatus::Pending => write!(f, "pending"),
            MailAccountStatus::Connected => write!(f, "connected"),
            MailAccountStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for MailAccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MailAccountStatus::Pending),
            "connected" => Ok(MailAccountStatus::Connected),
            "error" => Ok(MailAccountStatus::Error),
            _ => Err(format!("Unknown account status: {}", s)),
        }
    }
}
