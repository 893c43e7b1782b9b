//! Warmup action plan
//!
//! A plan is the bundle of inbox actions the receiving mailbox applies to one
//! warmup message. It travels inside the `X-Warmup-Plan` header (and is kept
//! in planned-action records) as a flat `key=value;` string:
//!
//! ```text
//! r=1;rep=0;imp=0;star=0;arc=1;del=0;res=1;gr=7
//! ```
//!
//! Missing keys decode to `false`, except `gr` which decodes to
//! [`DEFAULT_GRACE_LIMIT`].

use serde::{Deserialize, Serialize};

/// Grace limit used when a plan does not carry one
pub const DEFAULT_GRACE_LIMIT: i32 = 7;

/// Inbox actions planned for a single warmup message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmupActionPlan {
    pub mark_read: bool,
    pub send_reply: bool,
    pub mark_important: bool,
    pub add_star: bool,
    pub archive: bool,
    pub delete: bool,
    pub rescue_from_spam: bool,
    /// Number of warmup messages an account must have seen before star and
    /// important are applied
    pub important_star_grace_limit: i32,
}

impl Default for WarmupActionPlan {
    fn default() -> Self {
        Self {
            mark_read: false,
            send_reply: false,
            mark_important: false,
            add_star: false,
            archive: false,
            delete: false,
            rescue_from_spam: false,
            important_star_grace_limit: DEFAULT_GRACE_LIMIT,
        }
    }
}

impl WarmupActionPlan {
    /// Encode the plan for a message header
    pub fn to_header_value(&self) -> String {
        self.to_string()
    }

    /// Decode a header value, returning `None` when the value is absent or
    /// carries no recognised key
    pub fn parse(value: &str) -> Option<Self> {
        let mut plan = Self::default();
        let mut recognised = false;

        for pair in value.split(';') {
            let Some((key, raw)) = pair.split_once('=') else {
                continue;
            };
            let raw = raw.trim();

            match key.trim() {
                "r" => plan.mark_read = parse_flag(raw),
                "rep" => plan.send_reply = parse_flag(raw),
                "imp" => plan.mark_important = parse_flag(raw),
                "star" => plan.add_star = parse_flag(raw),
                "arc" => plan.archive = parse_flag(raw),
                "del" => plan.delete = parse_flag(raw),
                "res" => plan.rescue_from_spam = parse_flag(raw),
                "gr" => {
                    plan.important_star_grace_limit =
                        raw.parse().unwrap_or(DEFAULT_GRACE_LIMIT)
                }
                _ => continue,
            }
            recognised = true;
        }

        recognised.then_some(plan)
    }
}

fn parse_flag(raw: &str) -> bool {
    raw == "1" || raw.eq_ignore_ascii_case("true")
}

fn flag(value: bool) -> u8 {
    u8::from(value)
}

impl std::fmt::Display for WarmupActionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "r={};rep={};imp={};star={};arc={};del={};res={};gr={}",
            flag(self.mark_read),
            flag(self.send_reply),
            flag(self.mark_important),
            flag(self.add_star),
            flag(self.archive),
            flag(self.delete),
            flag(self.rescue_from_spam),
            self.important_star_grace_limit
        )
    }
}

impl std::str::FromStr for WarmupActionPlan {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
            .ok_or_else(|| crate::Error::Validation(format!("Invalid action plan: {}", s)))
    }
}
