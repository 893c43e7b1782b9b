//! Accounts waiting for a prompt inbox scan

use mailwarm_common::types::MailAccountId;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct State {
    order: VecDeque<MailAccountId>,
    queued: HashSet<MailAccountId>,
}

/// FIFO of account ids, each present at most once
#[derive(Debug, Default)]
pub struct InboxRescueQueue {
    state: Mutex<State>,
}

impl InboxRescueQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an account; returns false if it was already waiting
    pub fn enqueue(&self, account_id: MailAccountId) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.queued.insert(account_id) {
            return false;
        }
        state.order.push_back(account_id);
        true
    }

    /// Take every queued account in arrival order
    pub fn drain(&self) -> Vec<MailAccountId> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.queued.clear();
        state.order.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
