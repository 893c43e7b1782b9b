//! MailWarm Common - Shared types and utilities
//!
//! This crate provides the identifiers, enums, action plan model,
//! configuration and error types shared across all MailWarm components.

pub mod config;
pub mod error;
pub mod plan;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use plan::WarmupActionPlan;
