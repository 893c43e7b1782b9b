//! MailWarm Storage - Persistence for warmup state
//!
//! Repository traits for profiles, accounts, jobs, logs and planned actions,
//! with a PostgreSQL implementation and an in-memory one.

pub mod db;
pub mod memory;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use memory::MemoryStore;
pub use models::*;
pub use repository::*;
