//! Mail backends
//!
//! A backend performs the network side of warmup for one account: sending,
//! listing recent mail and mutating message state. Which backend serves an
//! account is decided by its provider type through a [`BackendResolver`].

pub mod gmail;
pub mod smtp;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mail_builder::headers::raw::Raw;
use mail_builder::MessageBuilder;
use mailwarm_common::types::{MailProviderType, WARMUP_ID_HEADER, WARMUP_PLAN_HEADER};
use mailwarm_common::{Error, Result, WarmupActionPlan};
use mailwarm_storage::models::MailAccount;
use std::sync::Arc;

pub use gmail::GmailBackend;
pub use smtp::SmtpBackend;

/// Provider label names
pub mod labels {
    pub const INBOX: &str = "INBOX";
    pub const SPAM: &str = "SPAM";
    pub const UNREAD: &str = "UNREAD";
    pub const STARRED: &str = "STARRED";
    pub const IMPORTANT: &str = "IMPORTANT";
}

/// A message to send from an account
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Internet Message-ID without angle brackets
    pub message_id: String,
    pub warmup_id: Option<String>,
    pub plan: Option<WarmupActionPlan>,
    pub in_reply_to: Option<String>,
    /// Provider thread to file the message into
    pub thread_id: Option<String>,
}

/// A message seen in an account's mailbox
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservedMessage {
    /// Provider message id
    pub id: String,
    pub thread_id: Option<String>,
    /// Internet Message-ID without angle brackets
    pub message_id: Option<String>,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub warmup_id: Option<String>,
    pub plan: Option<WarmupActionPlan>,
    pub received_at: Option<DateTime<Utc>>,
    pub labels: Vec<String>,
}

impl ObservedMessage {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn is_spam(&self) -> bool {
        self.has_label(labels::SPAM)
    }

    pub fn is_unread(&self) -> bool {
        self.has_label(labels::UNREAD)
    }

    pub fn is_starred(&self) -> bool {
        self.has_label(labels::STARRED)
    }

    pub fn is_important(&self) -> bool {
        self.has_label(labels::IMPORTANT)
    }

    pub fn in_inbox(&self) -> bool {
        self.has_label(labels::INBOX)
    }
}

/// Labels to add and remove in one mutation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelChange {
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

impl LabelChange {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    pub fn adds(&self, label: &str) -> bool {
        self.add.iter().any(|l| l == label)
    }

    pub fn removes(&self, label: &str) -> bool {
        self.remove.iter().any(|l| l == label)
    }
}

/// Mail backend capability
#[async_trait]
pub trait MailBackend: Send + Sync {
    fn provider(&self) -> MailProviderType;

    /// Check that the account's credentials work
    async fn validate(&self, account: &MailAccount) -> Result<()>;

    /// Send a message, returning the provider message id
    async fn send(&self, account: &MailAccount, mail: &OutgoingMail) -> Result<String>;

    /// Recently received messages, spam first
    async fn fetch_recent(&self, account: &MailAccount) -> Result<Vec<ObservedMessage>>;

    async fn modify_labels(
        &self,
        account: &MailAccount,
        message_id: &str,
        change: &LabelChange,
    ) -> Result<()>;

    async fn trash(&self, account: &MailAccount, message_id: &str) -> Result<()>;

    async fn mark_important(&self, account: &MailAccount, message_id: &str) -> Result<()> {
        let change = LabelChange {
            add: vec![labels::IMPORTANT.to_string()],
            remove: Vec::new(),
        };
        self.modify_labels(account, message_id, &change).await
    }

    async fn move_to_inbox(&self, account: &MailAccount, message_id: &str) -> Result<()> {
        let change = LabelChange {
            add: vec![labels::INBOX.to_string()],
            remove: vec![labels::SPAM.to_string()],
        };
        self.modify_labels(account, message_id, &change).await
    }
}

/// Picks the backend serving an account
pub trait BackendResolver: Send + Sync {
    fn resolve(&self, account: &MailAccount) -> Arc<dyn MailBackend>;
}

/// Resolver over the built-in backends
pub struct DefaultBackendResolver {
    gmail: Arc<dyn MailBackend>,
    smtp: Arc<dyn MailBackend>,
}

impl DefaultBackendResolver {
    pub fn new(gmail: Arc<dyn MailBackend>, smtp: Arc<dyn MailBackend>) -> Self {
        Self { gmail, smtp }
    }
}

impl BackendResolver for DefaultBackendResolver {
    fn resolve(&self, account: &MailAccount) -> Arc<dyn MailBackend> {
        match account.provider {
            MailProviderType::Gmail => Arc::clone(&self.gmail),
            MailProviderType::SmtpImap => Arc::clone(&self.smtp),
        }
    }
}

/// Strip surrounding whitespace and angle brackets from a Message-ID
pub fn normalize_message_id(value: &str) -> String {
    value
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .to_string()
}

/// Build the RFC 5322 bytes for an outgoing message
pub fn compose(from: &str, mail: &OutgoingMail) -> Result<Vec<u8>> {
    let mut builder = MessageBuilder::new()
        .from(from)
        .to(mail.to.as_str())
        .subject(mail.subject.as_str())
        .message_id(mail.message_id.as_str())
        .text_body(mail.body.as_str());

    if let Some(parent) = &mail.in_reply_to {
        builder = builder
            .in_reply_to(parent.as_str())
            .references(parent.as_str());
    }
    if let Some(warmup_id) = &mail.warmup_id {
        builder = builder.header(WARMUP_ID_HEADER, Raw::new(warmup_id.as_str()));
    }
    if let Some(plan) = &mail.plan {
        builder = builder.header(WARMUP_PLAN_HEADER, Raw::new(plan.to_header_value()));
    }

    builder
        .write_to_vec()
        .map_err(|e| Error::Internal(format!("Failed to build message: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outgoing() -> OutgoingMail {
        OutgoingMail {
            to: "peer@example.com".to_string(),
            subject: "Quick question".to_string(),
            body: "Hello there".to_string(),
            message_id: "abc123@example.org".to_string(),
            warmup_id: Some("mailwarm-1".to_string()),
            plan: Some(WarmupActionPlan {
                mark_read: true,
                ..Default::default()
            }),
            in_reply_to: Some("parent@example.com".to_string()),
            thread_id: None,
        }
    }

    #[test]
    fn test_compose_carries_warmup_headers() {
        let raw = compose("me@example.org", &outgoing()).unwrap();
        let text = String::from_utf8(raw).unwrap();

        assert!(text.contains("X-Warmup-Id: mailwarm-1"));
        assert!(text.contains("X-Warmup-Plan: r=1;rep=0;imp=0;star=0;arc=0;del=0;res=0;gr=7"));
        assert!(text.contains("Message-ID: <abc123@example.org>"));
        assert!(text.contains("In-Reply-To: <parent@example.com>"));
        assert!(text.contains("Subject: Quick question"));
    }

    #[test]
    fn test_normalize_message_id() {
        assert_eq!(normalize_message_id(" <a@b> "), "a@b");
        assert_eq!(normalize_message_id("a@b"), "a@b");
    }

    #[test]
    fn test_label_change_queries() {
        let change = LabelChange {
            add: vec![labels::STARRED.to_string()],
            remove: vec![labels::SPAM.to_string()],
        };
        assert!(change.adds(labels::STARRED));
        assert!(change.removes(labels::SPAM));
        assert!(!change.is_empty());
        assert!(LabelChange::default().is_empty());
    }
}
