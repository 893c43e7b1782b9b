//! Configuration for MailWarm

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "MAILWARM_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Warmup scheduling configuration
    #[serde(default)]
    pub warmup: WarmupConfig,

    /// Retry policy for failed jobs
    #[serde(default)]
    pub retry: RetryConfig,

    /// Gmail REST backend configuration
    #[serde(default)]
    pub gmail: GmailConfig,

    /// SMTP backend configuration
    #[serde(default)]
    pub smtp: SmtpConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database backend, only "postgres" is supported
    #[serde(default = "default_db_backend")]
    pub backend: String,

    /// Database URL
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_db_backend() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Warmup scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupConfig {
    /// Local hour (0-23) at which the daily generation pass runs
    #[serde(default = "default_daily_trigger_hour")]
    pub daily_trigger_hour: u32,

    /// Seconds between execution passes
    #[serde(default = "default_execution_interval")]
    pub execution_interval_secs: u64,

    /// Seconds between inbox monitor ticks
    #[serde(default = "default_inbox_tick")]
    pub inbox_tick_secs: u64,

    /// Minimum seconds between full inbox scans of one account
    #[serde(default = "default_full_scan_interval")]
    pub full_scan_interval_secs: u64,

    /// Accounts processed in parallel by one execution pass
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Maximum due jobs loaded per execution pass
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Lower bound of the follow-up reply delay in minutes
    #[serde(default = "default_reply_delay_min")]
    pub reply_delay_min_minutes: i64,

    /// Upper bound of the follow-up reply delay in minutes
    #[serde(default = "default_reply_delay_max")]
    pub reply_delay_max_minutes: i64,

    /// Jobs left in progress longer than this are failed as abandoned
    #[serde(default = "default_stale_claim_timeout")]
    pub stale_claim_timeout_secs: i64,

    /// Fixed offset east of UTC used as "local" time; host zone when unset
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,

    /// Seed for the shared random source; entropy when unset
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            daily_trigger_hour: default_daily_trigger_hour(),
            execution_interval_secs: default_execution_interval(),
            inbox_tick_secs: default_inbox_tick(),
            full_scan_interval_secs: default_full_scan_interval(),
            worker_concurrency: default_worker_concurrency(),
            batch_size: default_batch_size(),
            reply_delay_min_minutes: default_reply_delay_min(),
            reply_delay_max_minutes: default_reply_delay_max(),
            stale_claim_timeout_secs: default_stale_claim_timeout(),
            utc_offset_minutes: None,
            rng_seed: None,
        }
    }
}

fn default_daily_trigger_hour() -> u32 {
    2
}

fn default_execution_interval() -> u64 {
    60
}

fn default_inbox_tick() -> u64 {
    10
}

fn default_full_scan_interval() -> u64 {
    300
}

fn default_worker_concurrency() -> usize {
    8
}

fn default_batch_size() -> i64 {
    500
}

fn default_reply_delay_min() -> i64 {
    5
}

fn default_reply_delay_max() -> i64 {
    15
}

fn default_stale_claim_timeout() -> i64 {
    900
}

/// Retry policy for failed jobs
///
/// `max_attempts = 1` disables retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts allowed per job, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,

    /// Base backoff in seconds, multiplied by the attempt number
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: i64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_secs: default_backoff_secs(),
        }
    }
}

fn default_max_attempts() -> i32 {
    1
}

fn default_backoff_secs() -> i64 {
    300
}

/// Gmail REST backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    /// Base URL of the Gmail API
    #[serde(default = "default_gmail_api_url")]
    pub api_base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_gmail_timeout")]
    pub timeout_secs: u64,

    /// Messages listed per label during a fetch
    #[serde(default = "default_list_page_size")]
    pub list_page_size: u32,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_gmail_api_url(),
            timeout_secs: default_gmail_timeout(),
            list_page_size: default_list_page_size(),
        }
    }
}

fn default_gmail_api_url() -> String {
    "https://gmail.googleapis.com".to_string()
}

fn default_gmail_timeout() -> u64 {
    30
}

fn default_list_page_size() -> u32 {
    10
}

/// SMTP backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Connection timeout in seconds
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_smtp_timeout(),
        }
    }
}

fn default_smtp_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `MAILWARM_CONFIG` or the default locations
    pub fn load() -> crate::Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::from_file(Path::new(&path));
        }

        let paths = [
            PathBuf::from("./mailwarm.toml"),
            PathBuf::from("./config.toml"),
            PathBuf::from("/etc/mailwarm/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }

    fn validate(&self) -> crate::Result<()> {
        if self.database.backend != "postgres" {
            return Err(crate::Error::Config(format!(
                "Unsupported database backend: {}",
                self.database.backend
            )));
        }
        if self.warmup.daily_trigger_hour > 23 {
            return Err(crate::Error::Config(
                "warmup.daily_trigger_hour must be between 0 and 23".to_string(),
            ));
        }
        if self.warmup.reply_delay_min_minutes > self.warmup.reply_delay_max_minutes {
            return Err(crate::Error::Config(
                "warmup.reply_delay_min_minutes exceeds reply_delay_max_minutes".to_string(),
            ));
        }
        if self.retry.max_attempts < 1 {
            return Err(crate::Error::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let warmup = WarmupConfig::default();
        assert_eq!(warmup.daily_trigger_hour, 2);
        assert_eq!(warmup.execution_interval_secs, 60);
        assert_eq!(warmup.inbox_tick_secs, 10);
        assert_eq!(warmup.full_scan_interval_secs, 300);
        assert_eq!(warmup.reply_delay_min_minutes, 5);
        assert_eq!(warmup.reply_delay_max_minutes, 15);
        assert_eq!(warmup.rng_seed, None);

        let retry = RetryConfig::default();
        assert_eq!(retry.max_attempts, 1);

        let gmail = GmailConfig::default();
        assert_eq!(gmail.api_base_url, "https://gmail.googleapis.com");
        assert_eq!(gmail.list_page_size, 10);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[database]
url = "postgres://localhost/mailwarm"

[logging]
format = "text"

[warmup]
daily_trigger_hour = 3
utc_offset_minutes = 120
rng_seed = 42

[retry]
max_attempts = 3
backoff_secs = 60
"#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.database.backend, "postgres");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.logging.format, "text");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.warmup.daily_trigger_hour, 3);
        assert_eq!(config.warmup.utc_offset_minutes, Some(120));
        assert_eq!(config.warmup.rng_seed, Some(42));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.smtp.timeout_secs, 30);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_hour = r#"
[database]
url = "postgres://localhost/mailwarm"

[warmup]
daily_trigger_hour = 24
"#;
        assert!(matches!(
            Config::from_toml(bad_hour),
            Err(crate::Error::Config(_))
        ));

        let bad_delay = r#"
[database]
url = "postgres://localhost/mailwarm"

[warmup]
reply_delay_min_minutes = 20
reply_delay_max_minutes = 10
"#;
        assert!(Config::from_toml(bad_delay).is_err());

        assert!(Config::from_toml("[logging]\nlevel = \"debug\"\n").is_err());
    }
}
