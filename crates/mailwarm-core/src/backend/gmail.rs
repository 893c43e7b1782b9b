//! Gmail REST backend

use super::{
    compose, labels, normalize_message_id, LabelChange, MailBackend, ObservedMessage, OutgoingMail,
};
use crate::clock::Clock;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{TimeZone, Utc};
use mailwarm_common::config::GmailConfig;
use mailwarm_common::types::{MailProviderType, WARMUP_ID_HEADER, WARMUP_PLAN_HEADER};
use mailwarm_common::{Error, Result, WarmupActionPlan};
use mailwarm_storage::models::{GmailCredentials, MailAccount};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const MESSAGES_PATH: &str = "/gmail/v1/users/me/messages";
const PROFILE_PATH: &str = "/gmail/v1/users/me/profile";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct Payload {
    #[serde(default)]
    headers: Vec<Header>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageResponse {
    id: String,
    thread_id: Option<String>,
    #[serde(default)]
    label_ids: Vec<String>,
    /// Milliseconds since the epoch, sent as a string
    internal_date: Option<String>,
    #[serde(default)]
    payload: Payload,
}

impl MessageResponse {
    fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    fn into_observed(self, account: &MailAccount) -> ObservedMessage {
        let subject = self.header("Subject").unwrap_or("(no subject)").to_string();
        let from = self.header("From").unwrap_or_default().to_string();
        let to = self
            .header("To")
            .map(str::to_string)
            .unwrap_or_else(|| account.email_address.clone());
        let message_id = self.header("Message-ID").map(normalize_message_id);
        let warmup_id = self
            .header(WARMUP_ID_HEADER)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let plan = self.header(WARMUP_PLAN_HEADER).and_then(WarmupActionPlan::parse);
        let received_at = self
            .internal_date
            .as_deref()
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());

        ObservedMessage {
            id: self.id,
            thread_id: self.thread_id,
            message_id,
            subject,
            from,
            to,
            warmup_id,
            plan,
            received_at,
            labels: self.label_ids,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyRequest<'a> {
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    add_label_ids: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    remove_label_ids: &'a [String],
}

/// Gmail API client acting with each account's stored access token
pub struct GmailBackend {
    config: GmailConfig,
    client: Client,
    clock: Arc<dyn Clock>,
}

impl GmailBackend {
    pub fn new(config: GmailConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            clock,
        })
    }

    fn credentials<'a>(&self, account: &'a MailAccount) -> Result<&'a GmailCredentials> {
        let creds = account.gmail.as_ref().ok_or_else(|| {
            Error::Config(format!(
                "Gmail details are missing for {}",
                account.email_address
            ))
        })?;
        if creds.access_token.is_empty() {
            return Err(Error::Config(format!(
                "Gmail access token is missing for {}",
                account.email_address
            )));
        }
        if let Some(expires_at) = creds.token_expires_at {
            if expires_at <= self.clock.now() {
                return Err(Error::Config(format!(
                    "Gmail access token expired for {}",
                    account.email_address
                )));
            }
        }
        Ok(creds)
    }

    /// Build an authorized request against the API base URL
    fn build_request(
        &self,
        creds: &GmailCredentials,
        method: Method,
        path: &str,
    ) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path);
        self.client
            .request(method, &url)
            .bearer_auth(&creds.access_token)
    }

    async fn execute(request: reqwest::RequestBuilder, what: &str) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::Backend(format!("Gmail {} request failed: {}", what, e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_else(|e| {
            warn!("Failed to read Gmail error body: {}", e);
            String::new()
        });
        if status == StatusCode::UNAUTHORIZED {
            Err(Error::Config(format!("Gmail rejected credentials: {}", body)))
        } else {
            Err(Error::Backend(format!(
                "Gmail {} failed: status={} body={}",
                what, status, body
            )))
        }
    }

    async fn list_label(&self, creds: &GmailCredentials, label: &str) -> Result<Vec<MessageRef>> {
        let page_size = self.config.list_page_size.to_string();
        let request = self
            .build_request(creds, Method::GET, MESSAGES_PATH)
            .query(&[
                ("labelIds", label),
                ("maxResults", page_size.as_str()),
                ("includeSpamTrash", "true"),
            ]);
        let list: ListResponse = Self::execute(request, "list")
            .await?
            .json()
            .await
            .map_err(|e| Error::Backend(format!("Invalid Gmail list response: {}", e)))?;
        Ok(list.messages)
    }

    async fn get_message(&self, creds: &GmailCredentials, id: &str) -> Result<MessageResponse> {
        let path = format!("{}/{}", MESSAGES_PATH, id);
        let request = self
            .build_request(creds, Method::GET, &path)
            .query(&[("format", "metadata")]);
        Self::execute(request, "get")
            .await?
            .json()
            .await
            .map_err(|e| Error::Backend(format!("Invalid Gmail message response: {}", e)))
    }
}

#[async_trait]
impl MailBackend for GmailBackend {
    fn provider(&self) -> MailProviderType {
        MailProviderType::Gmail
    }

    async fn validate(&self, account: &MailAccount) -> Result<()> {
        let creds = self.credentials(account)?;
        Self::execute(self.build_request(creds, Method::GET, PROFILE_PATH), "profile").await?;
        Ok(())
    }

    async fn send(&self, account: &MailAccount, mail: &OutgoingMail) -> Result<String> {
        let creds = self.credentials(account)?;
        let raw = compose(&account.email_address, mail)?;
        let body = SendRequest {
            raw: URL_SAFE_NO_PAD.encode(raw),
            thread_id: mail.thread_id.as_deref(),
        };

        let path = format!("{}/send", MESSAGES_PATH);
        let request = self.build_request(creds, Method::POST, &path).json(&body);
        let sent: MessageRef = Self::execute(request, "send")
            .await?
            .json()
            .await
            .map_err(|e| Error::Backend(format!("Invalid Gmail send response: {}", e)))?;

        debug!(account = %account.email_address, message_id = %sent.id, "Gmail message sent");
        Ok(sent.id)
    }

    async fn fetch_recent(&self, account: &MailAccount) -> Result<Vec<ObservedMessage>> {
        let creds = self.credentials(account)?;
        let mut seen = HashSet::new();
        let mut messages = Vec::new();

        // Spam first so warmup mail is rescued before it ages out
        for label in [labels::SPAM, labels::INBOX] {
            for item in self.list_label(creds, label).await? {
                if !seen.insert(item.id.clone()) {
                    continue;
                }
                let message = self.get_message(creds, &item.id).await?;
                messages.push(message.into_observed(account));
            }
        }

        Ok(messages)
    }

    async fn modify_labels(
        &self,
        account: &MailAccount,
        message_id: &str,
        change: &LabelChange,
    ) -> Result<()> {
        if change.is_empty() {
            return Ok(());
        }
        let creds = self.credentials(account)?;
        let path = format!("{}/{}/modify", MESSAGES_PATH, message_id);
        let body = ModifyRequest {
            add_label_ids: &change.add,
            remove_label_ids: &change.remove,
        };
        Self::execute(self.build_request(creds, Method::POST, &path).json(&body), "modify").await?;
        Ok(())
    }

    async fn trash(&self, account: &MailAccount, message_id: &str) -> Result<()> {
        let creds = self.credentials(account)?;
        let path = format!("{}/{}/trash", MESSAGES_PATH, message_id);
        Self::execute(self.build_request(creds, Method::POST, &path), "trash").await?;
        Ok(())
    }
}
