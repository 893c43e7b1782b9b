//! Inbound plan application
//!
//! Every newly observed message gets a Received log. Warmup messages that
//! carry or match an unapplied plan additionally get that plan applied once:
//! delete wins over everything, star and important wait out the grace
//! window, and label failures are logged and skipped.

use super::{new_message_id, reply_subject, WarmupEngine};
use crate::backend::{labels, LabelChange, MailBackend, ObservedMessage, OutgoingMail};
use crate::plan::generate_plan;
use chrono::{DateTime, Utc};
use mailwarm_common::types::{EmailAddress, EmailDirection, MailAccountId};
use mailwarm_common::{Result, WarmupActionPlan};
use mailwarm_storage::models::{MailAccount, PlannedAction, WarmupEmailLog};
use tracing::{debug, info, warn};

const INBOX_REPLY_BODY: &str = "Thanks for your email, noted.";

/// What to do with one inbound warmup message
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InboundActions {
    /// Move to trash and do nothing else
    pub trash: bool,
    pub labels: LabelChange,
    pub star: bool,
    pub important: bool,
    pub rescue: bool,
    pub archive: bool,
    pub mark_read: bool,
    pub reply: bool,
}

/// Decide the mutations for a message given its plan and the account's
/// warmup-message count so far
pub fn decide_actions(
    plan: &WarmupActionPlan,
    warmup_seen: i32,
    message: &ObservedMessage,
) -> InboundActions {
    if plan.delete {
        return InboundActions {
            trash: true,
            ..Default::default()
        };
    }

    let within_grace = warmup_seen < plan.important_star_grace_limit;
    let mut actions = InboundActions::default();

    if plan.add_star && !within_grace && !message.is_starred() {
        actions.star = true;
        actions.labels.add.push(labels::STARRED.to_string());
    }
    if plan.mark_important && !within_grace && !message.is_important() {
        actions.important = true;
        actions.labels.add.push(labels::IMPORTANT.to_string());
    }
    if plan.rescue_from_spam && message.is_spam() {
        actions.rescue = true;
        actions.labels.remove.push(labels::SPAM.to_string());
        if !plan.archive {
            actions.labels.add.push(labels::INBOX.to_string());
        }
    }
    if plan.archive && message.in_inbox() {
        actions.archive = true;
        actions.labels.remove.push(labels::INBOX.to_string());
    }
    if plan.mark_read && message.is_unread() {
        actions.mark_read = true;
        actions.labels.remove.push(labels::UNREAD.to_string());
    }
    actions.reply = plan.send_reply;

    actions
}

/// Outcome of scanning one account
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub fetched: usize,
    pub new_messages: usize,
    pub plans_applied: usize,
    pub replies_sent: usize,
}

impl WarmupEngine {
    /// Fetch an account's recent mail, log new messages and apply their plans
    pub async fn scan_account(&self, account_id: MailAccountId) -> Result<ScanSummary> {
        let lock = self.account_lock(account_id);
        let _guard = lock.lock().await;

        let account = self.require_account(account_id).await?;
        let backend = self.resolver.resolve(&account);
        let messages = backend.fetch_recent(&account).await?;

        let mut summary = ScanSummary {
            fetched: messages.len(),
            ..Default::default()
        };
        let mut warmup_seen = account.warmup_messages_seen;

        for message in messages {
            if self.stores.logs.exists(account.id, &message.id).await? {
                continue;
            }
            summary.new_messages += 1;

            let now = self.clock.now();
            let mut log = received_log(&account, &message, now);

            if let Some(plan) = self.claim_plan(&account, &message, now).await? {
                self.stores
                    .accounts
                    .increment_warmup_seen(account.id, 1)
                    .await?;
                log.is_warmup = true;
                let actions = decide_actions(&plan, warmup_seen, &message);
                if self
                    .apply_actions(&account, backend.as_ref(), &message, &actions, &mut log, now)
                    .await
                {
                    summary.replies_sent += 1;
                }
                warmup_seen += 1;
                summary.plans_applied += 1;
            }

            self.stores.logs.append(&log).await?;
        }

        if summary.new_messages > 0 {
            info!(
                account_id = %account.id,
                "Inbox scan logged {} new messages, applied {} plans",
                summary.new_messages, summary.plans_applied
            );
        }
        Ok(summary)
    }

    /// Find the message's plan and mark it applied
    ///
    /// A stored record found by Message-ID wins; otherwise the plan carried
    /// in the header, recorded as applied under the Message-ID before it is
    /// returned; otherwise, for messages with a warmup id, the newest
    /// unapplied record aimed at this account. Returns `None` when there is
    /// no plan or it was already applied.
    async fn claim_plan(
        &self,
        account: &MailAccount,
        message: &ObservedMessage,
        now: DateTime<Utc>,
    ) -> Result<Option<WarmupActionPlan>> {
        // Provider id stands in when the message has no Message-ID
        let key = message.message_id.as_deref().unwrap_or(&message.id);
        let by_message_id = self.stores.planned.find_by_message_id(key).await?;

        let record = match by_message_id {
            Some(record) => Some(record),
            None => match message.plan {
                Some(plan) => {
                    let mut marker = PlannedAction::new(
                        None,
                        Some(account.id),
                        account.email_address.clone(),
                        key,
                        plan,
                        now,
                    );
                    marker.applied_at = Some(now);
                    self.stores.planned.save(&marker).await?;
                    return Ok(Some(plan));
                }
                None if message.warmup_id.is_some() => {
                    self.stores
                        .planned
                        .find_pending_for_target(account.id, &account.email_address)
                        .await?
                }
                None => None,
            },
        };

        let Some(record) = record else {
            return Ok(None);
        };
        if record.applied_at.is_some()
            || !self.stores.planned.mark_applied(record.id, now).await?
        {
            debug!(plan_id = %record.id, "Plan already applied");
            return Ok(None);
        }
        Ok(Some(record.plan))
    }

    /// Apply decided actions; returns true when a reply went out
    async fn apply_actions(
        &self,
        account: &MailAccount,
        backend: &dyn MailBackend,
        message: &ObservedMessage,
        actions: &InboundActions,
        log: &mut WarmupEmailLog,
        now: DateTime<Utc>,
    ) -> bool {
        if actions.trash {
            match backend.trash(account, &message.id).await {
                Ok(()) => {
                    log.marked_as_important = false;
                    log.marked_as_starred = false;
                    log.is_spam = false;
                }
                Err(e) => warn!(
                    account_id = %account.id,
                    message_id = %message.id,
                    "Failed to delete warmup mail: {}", e
                ),
            }
            return false;
        }

        if !actions.labels.is_empty() {
            match backend.modify_labels(account, &message.id, &actions.labels).await {
                Ok(()) => {
                    log.marked_as_starred |= actions.star;
                    log.marked_as_important |= actions.important;
                    if actions.rescue {
                        log.is_spam = false;
                    }
                    if actions.mark_read {
                        log.opened_at = Some(now);
                    }
                }
                Err(e) => warn!(
                    account_id = %account.id,
                    message_id = %message.id,
                    "Failed to apply warmup labels: {}", e
                ),
            }
        }

        if !actions.reply {
            return false;
        }
        match self.reply_to(account, backend, message, now).await {
            Ok(sent) => sent,
            Err(e) => {
                warn!(account_id = %account.id, "Failed to auto-reply to warmup mail: {}", e);
                false
            }
        }
    }

    /// Reply in-thread with a fresh plan for the next hop
    async fn reply_to(
        &self,
        account: &MailAccount,
        backend: &dyn MailBackend,
        message: &ObservedMessage,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let sender = match EmailAddress::from_header(&message.from) {
            Some(sender) if !sender.matches(&account.email_address) => sender,
            _ => return Ok(false),
        };

        let plan = self.rng.with(|rng| generate_plan(rng));
        let mail = OutgoingMail {
            to: sender.to_string(),
            subject: reply_subject(&message.subject),
            body: INBOX_REPLY_BODY.to_string(),
            message_id: new_message_id(&account.email_address),
            warmup_id: message.warmup_id.clone(),
            plan: Some(plan),
            in_reply_to: message.message_id.clone(),
            thread_id: message.thread_id.clone(),
        };

        let target = self.stores.accounts.get_by_address(&mail.to).await?;
        let planned = PlannedAction::new(
            Some(account.id),
            target.as_ref().map(|a| a.id),
            mail.to.clone(),
            mail.message_id.clone(),
            plan,
            now,
        );
        self.stores.planned.save(&planned).await?;

        let provider_id = backend.send(account, &mail).await?;

        let mut reply_log = WarmupEmailLog::new(account.id, provider_id, EmailDirection::Replied);
        reply_log.warmup_id = mail.warmup_id.clone();
        reply_log.subject = mail.subject.clone();
        reply_log.from_address = account.email_address.clone();
        reply_log.to_address = mail.to.clone();
        reply_log.sent_at = Some(now);
        reply_log.delivered_at = Some(now);
        reply_log.is_warmup = true;
        reply_log.created_at = now;
        self.stores.logs.append(&reply_log).await?;

        if let Some(target) = target {
            self.rescue_queue.enqueue(target.id);
        }
        Ok(true)
    }
}

fn received_log(
    account: &MailAccount,
    message: &ObservedMessage,
    now: DateTime<Utc>,
) -> WarmupEmailLog {
    let mut log = WarmupEmailLog::new(account.id, message.id.clone(), EmailDirection::Received);
    log.warmup_id = message.warmup_id.clone();
    log.subject = message.subject.clone();
    log.from_address = message.from.clone();
    log.to_address = message.to.clone();
    log.sent_at = message.received_at;
    log.delivered_at = message.received_at;
    log.marked_as_important = message.is_important();
    log.marked_as_starred = message.is_starred();
    log.is_spam = message.is_spam();
    log.is_warmup = message.warmup_id.is_some();
    log.created_at = now;
    log
}
