use serde::Deserialize;

/// Root application configuration. Loaded from environment variables with
/// the prefix `CADENCE__`. Constructed once at startup and passed to each
/// component; never read as ambient global state.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_concurrent_dispatches")]
    pub max_concurrent_dispatches: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    #[serde(default = "default_jitter_pct")]
    pub jitter_pct: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default = "default_enabled_channels")]
    pub enabled: Vec<String>,
    /// Hour of day (UTC) used by the deterministic send-time strategy.
    #[serde(default = "default_send_hour_utc")]
    pub send_hour_utc: u32,
    #[serde(default = "default_from_email")]
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

// Default functions
fn default_node_id() -> String {
    "cadence-01".to_string()
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_max_concurrent_dispatches() -> usize {
    16
}
fn default_base_delay_secs() -> u64 {
    60
}
fn default_max_delay_secs() -> u64 {
    86_400
}
fn default_jitter_pct() -> f64 {
    0.2
}
fn default_max_attempts() -> u32 {
    5
}
fn default_enabled_channels() -> Vec<String> {
    vec![
        "email".to_string(),
        "social".to_string(),
        "video".to_string(),
        "analytics".to_string(),
        "webhook".to_string(),
    ]
}
fn default_send_hour_utc() -> u32 {
    9
}
fn default_from_email() -> String {
    "outreach@cadence.local".to_string()
}
fn default_from_name() -> String {
    "Cadence".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_concurrent_dispatches: default_max_concurrent_dispatches(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            jitter_pct: default_jitter_pct(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_channels(),
            send_hour_utc: default_send_hour_utc(),
            from_email: default_from_email(),
            from_name: default_from_name(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            scheduler: SchedulerConfig::default(),
            retry: RetryConfig::default(),
            channels: ChannelsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("CADENCE")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Fail fast on values the runtime cannot operate with.
    pub fn validate(&self) -> Result<(), crate::error::CadenceError> {
        if self.retry.max_attempts == 0 {
            return Err(crate::error::CadenceError::Config(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.retry.jitter_pct) {
            return Err(crate::error::CadenceError::Config(
                "retry.jitter_pct must be in [0, 1)".into(),
            ));
        }
        if self.channels.send_hour_utc > 23 {
            return Err(crate::error::CadenceError::Config(
                "channels.send_hour_utc must be 0-23".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_retry_policy() {
        let config = AppConfig::default();
        assert_eq!(config.retry.base_delay_secs, 60);
        assert_eq!(config.retry.max_delay_secs, 86_400);
        assert_eq!(config.retry.max_attempts, 5);
        assert!((config.retry.jitter_pct - 0.2).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.channels.send_hour_utc = 24;
        assert!(config.validate().is_err());
    }
}
