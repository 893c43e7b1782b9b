//! SMTP submission backend
//!
//! Sends through the account's SMTP server. The IMAP side is not wired up,
//! so fetching returns nothing and message mutations are skipped.

use super::{compose, LabelChange, MailBackend, ObservedMessage, OutgoingMail};
use async_trait::async_trait;
use lettre::address::{Address, Envelope};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use mailwarm_common::config::SmtpConfig;
use mailwarm_common::types::{EmailAddress, MailProviderType};
use mailwarm_common::{Error, Result};
use mailwarm_storage::models::{MailAccount, SmtpSettings};
use std::time::Duration;
use tracing::debug;

pub struct SmtpBackend {
    config: SmtpConfig,
}

impl SmtpBackend {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn settings<'a>(&self, account: &'a MailAccount) -> Result<&'a SmtpSettings> {
        account.smtp.as_ref().ok_or_else(|| {
            Error::Config(format!(
                "SMTP settings are missing for {}",
                account.email_address
            ))
        })
    }

    fn transport(&self, settings: &SmtpSettings) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let builder = if settings.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
        }
        .map_err(|e| Error::Config(format!("Invalid SMTP host {}: {}", settings.host, e)))?;

        Ok(builder
            .port(settings.port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .timeout(Some(Duration::from_secs(self.config.timeout_secs)))
            .build())
    }
}

fn parse_address(value: &str) -> Result<Address> {
    let bare = EmailAddress::from_header(value)
        .ok_or_else(|| Error::Validation(format!("Invalid email address: {}", value)))?;
    bare.to_string()
        .parse()
        .map_err(|e| Error::Validation(format!("Invalid email address {}: {}", value, e)))
}

#[async_trait]
impl MailBackend for SmtpBackend {
    fn provider(&self) -> MailProviderType {
        MailProviderType::SmtpImap
    }

    async fn validate(&self, account: &MailAccount) -> Result<()> {
        let transport = self.transport(self.settings(account)?)?;
        match transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::Backend(format!(
                "SMTP server refused connection for {}",
                account.email_address
            ))),
            Err(e) => Err(Error::Backend(format!("SMTP connection failed: {}", e))),
        }
    }

    async fn send(&self, account: &MailAccount, mail: &OutgoingMail) -> Result<String> {
        let transport = self.transport(self.settings(account)?)?;
        let envelope = Envelope::new(
            Some(parse_address(&account.email_address)?),
            vec![parse_address(&mail.to)?],
        )
        .map_err(|e| Error::Validation(format!("Invalid envelope: {}", e)))?;
        let raw = compose(&account.email_address, mail)?;

        transport
            .send_raw(&envelope, &raw)
            .await
            .map_err(|e| Error::Backend(format!("SMTP send failed: {}", e)))?;
        debug!(account = %account.email_address, message_id = %mail.message_id, "SMTP message accepted");

        // SMTP has no provider-side id, the Message-ID stands in for it
        Ok(mail.message_id.clone())
    }

    async fn fetch_recent(&self, _account: &MailAccount) -> Result<Vec<ObservedMessage>> {
        Ok(Vec::new())
    }

    async fn modify_labels(
        &self,
        account: &MailAccount,
        message_id: &str,
        change: &LabelChange,
    ) -> Result<()> {
        debug!(
            account = %account.email_address,
            message_id,
            "Skipping label change {:?} without IMAP", change
        );
        Ok(())
    }

    async fn trash(&self, account: &MailAccount, message_id: &str) -> Result<()> {
        debug!(account = %account.email_address, message_id, "Skipping trash without IMAP");
        Ok(())
    }
}
