//! MailWarm Core - warmup planning, execution and scoring
//!
//! This crate plans each account's daily warmup traffic, executes it against
//! the account's mail backend, applies action plans to inbound warmup mail,
//! and scores account reputation from the resulting logs.

pub mod backend;
pub mod clock;
pub mod engine;
pub mod monitor;
pub mod plan;
pub mod planner;
pub mod profiles;
pub mod rescue_queue;
pub mod reputation;
pub mod rng;
pub mod runner;
pub mod stats;

pub use backend::{
    BackendResolver, DefaultBackendResolver, GmailBackend, MailBackend, ObservedMessage,
    OutgoingMail, SmtpBackend,
};
pub use clock::{clock_from_config, Clock, FixedOffsetClock, SystemClock};
pub use engine::{EngineSettings, RetryPolicy, Stores, WarmupEngine};
pub use monitor::InboxMonitor;
pub use planner::{LinearWarmupStrategy, WarmupStrategy};
pub use profiles::ProfileService;
pub use rescue_queue::InboxRescueQueue;
pub use reputation::{ReputationLabel, ReputationScore, ReputationService};
pub use rng::SharedRng;
pub use runner::{run_daily_scheduler, run_job_executor};
pub use stats::{summarize, DashboardSummary};
