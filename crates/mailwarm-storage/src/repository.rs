//! Repository layer for data access

pub mod accounts;
pub mod jobs;
pub mod logs;
pub mod planned_actions;
pub mod profiles;

// Re-export concrete repository implementations
pub use accounts::DbAccountRepository;
pub use jobs::DbJobRepository;
pub use logs::DbLogRepository;
pub use planned_actions::DbPlannedActionRepository;
pub use profiles::DbProfileRepository;

// Re-export repository traits
pub use accounts::AccountRepository;
pub use jobs::JobRepository;
pub use logs::LogRepository;
pub use planned_actions::PlannedActionRepository;
pub use profiles::ProfileRepository;
