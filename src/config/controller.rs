//! # Controller Configuration
//!
//! Operator settings loaded from environment variables.

use crate::constants::{
    DEFAULT_BACKOFF_MAX_MINUTES, DEFAULT_BACKOFF_MIN_MINUTES, DEFAULT_HTTP_TIMEOUT_SECS,
    DEFAULT_METRICS_PORT, DEFAULT_RESYNC_INTERVAL_SECS, DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
    DEFAULT_WEBHOOK_PORT,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// What the webhook answers when a create or update cannot be mutated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Deny the request with the error message
    #[default]
    Fail,
    /// Allow the request unchanged
    Ignore,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "ignore" => Ok(Self::Ignore),
            other => Err(format!("unknown admission failure policy '{other}'")),
        }
    }
}

/// Operator configuration
///
/// All settings have defaults and can be overridden via environment variables.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Port of the metrics and health server
    pub metrics_port: u16,
    /// Port of the admission webhook
    pub webhook_port: u16,
    /// PEM certificate chain served by the webhook; plain HTTP when unset
    pub webhook_tls_cert: Option<PathBuf>,
    pub webhook_tls_key: Option<PathBuf>,
    /// Timed re-check of a converged gateway (seconds)
    pub resync_interval_secs: u64,
    /// Timeout of every outbound configuration or OIDC call (seconds)
    pub http_timeout_secs: u64,
    pub failure_policy: FailurePolicy,
    /// Namespace to watch; all namespaces when unset
    pub watch_namespace: Option<String>,
    pub backoff_min_minutes: u64,
    pub backoff_max_minutes: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            webhook_port: DEFAULT_WEBHOOK_PORT,
            webhook_tls_cert: None,
            webhook_tls_key: None,
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            failure_policy: FailurePolicy::default(),
            watch_namespace: None,
            backoff_min_minutes: DEFAULT_BACKOFF_MIN_MINUTES,
            backoff_max_minutes: DEFAULT_BACKOFF_MAX_MINUTES,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            webhook_port: env_var_or_default("WEBHOOK_PORT", DEFAULT_WEBHOOK_PORT),
            webhook_tls_cert: env_var_optional("WEBHOOK_TLS_CERT").map(PathBuf::from),
            webhook_tls_key: env_var_optional("WEBHOOK_TLS_KEY").map(PathBuf::from),
            resync_interval_secs: env_var_or_default(
                "RESYNC_INTERVAL_SECS",
                DEFAULT_RESYNC_INTERVAL_SECS,
            ),
            http_timeout_secs: env_var_or_default("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS),
            failure_policy: env_var_or_default("ADMISSION_FAILURE_POLICY", FailurePolicy::Fail),
            watch_namespace: env_var_optional("WATCH_NAMESPACE"),
            backoff_min_minutes: env_var_or_default(
                "BACKOFF_MIN_MINUTES",
                DEFAULT_BACKOFF_MIN_MINUTES,
            ),
            backoff_max_minutes: env_var_or_default(
                "BACKOFF_MAX_MINUTES",
                DEFAULT_BACKOFF_MAX_MINUTES,
            ),
            watch_restart_delay_after_end_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            ),
        }
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: FromStr>(key: &str, default: T) -> T
where
    <T as FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read a non-empty environment variable
fn env_var_optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_policy_parsing() {
        assert_eq!("fail".parse::<FailurePolicy>(), Ok(FailurePolicy::Fail));
        assert_eq!(" Ignore ".parse::<FailurePolicy>(), Ok(FailurePolicy::Ignore));
        assert!("open".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.metrics_port, 5000);
        assert_eq!(config.webhook_port, 8443);
        assert_eq!(config.http_timeout(), Duration::from_secs(20));
        assert_eq!(config.resync_interval(), Duration::from_secs(60));
        assert_eq!(config.failure_policy, FailurePolicy::Fail);
        assert!(config.watch_namespace.is_none());
    }
}
