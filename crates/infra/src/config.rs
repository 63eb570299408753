//! Runtime configuration of the isolation layer.
//!
//! Values come from `TENANTGUARD_*` environment variables; anything unset
//! falls back to [`IsolationConfig::default`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rows::ForeignFilterMode;

pub const ENV_PREFIX: &str = "TENANTGUARD_";

/// Longest impersonation grant an operator can be issued (one day).
pub const MAX_IMPERSONATION_MINUTES: i64 = 24 * 60;
/// Audit entries are kept for at most a century.
pub const MAX_AUDIT_RETENTION_DAYS: i64 = 36_500;
pub const MAX_EVALUATION_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationConfig {
    /// Reject a new tenant whose name is already taken.
    pub unique_tenant_names: bool,
    /// What a read does when its filter names another tenant.
    pub foreign_filter_mode: ForeignFilterMode,
    /// Upper bound on a single authorization evaluation.
    pub evaluation_timeout_ms: u64,
    pub impersonation_max_minutes: i64,
    /// Buckets without a tenant namespace. Read-only for every role.
    pub public_buckets: Vec<String>,
    pub public_base_url: String,
    /// Purge-and-verify attempts before a deletion is reported as failed.
    pub purge_retries: u32,
    pub sweep_interval_secs: u64,
    pub audit_retention_days: i64,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            unique_tenant_names: false,
            foreign_filter_mode: ForeignFilterMode::EmptyResult,
            evaluation_timeout_ms: 250,
            impersonation_max_minutes: 60,
            public_buckets: vec!["public-assets".to_string()],
            public_base_url: "https://files.localhost".to_string(),
            purge_retries: 3,
            sweep_interval_secs: 300,
            audit_retention_days: 365,
        }
    }
}

impl IsolationConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Load from an explicit set of `(key, value)` pairs.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut cfg = Self::default();

        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();
            let invalid = |reason: &str| ConfigError::Invalid {
                key: key.as_ref().to_string(),
                value: value.to_string(),
                reason: reason.to_string(),
            };

            match name {
                "UNIQUE_TENANT_NAMES" => cfg.unique_tenant_names = parse_bool(value).ok_or_else(|| invalid("expected true/false"))?,
                "FOREIGN_FILTER_MODE" => {
                    cfg.foreign_filter_mode = match value {
                        "empty" => ForeignFilterMode::EmptyResult,
                        "reject" => ForeignFilterMode::Reject,
                        _ => return Err(invalid("expected 'empty' or 'reject'")),
                    }
                }
                "EVALUATION_TIMEOUT_MS" => {
                    cfg.evaluation_timeout_ms = parse_positive(value)
                        .filter(|v| *v <= MAX_EVALUATION_TIMEOUT_MS)
                        .ok_or_else(|| invalid("expected 1..=60000"))?
                }
                "IMPERSONATION_MAX_MINUTES" => {
                    cfg.impersonation_max_minutes = parse_bounded(value, MAX_IMPERSONATION_MINUTES)
                        .filter(|v| chrono::Duration::try_minutes(*v).is_some())
                        .ok_or_else(|| invalid("expected 1..=1440"))?
                }
                "PUBLIC_BUCKETS" => {
                    cfg.public_buckets = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                }
                "PUBLIC_BASE_URL" => {
                    if value.is_empty() {
                        return Err(invalid("must not be empty"));
                    }
                    cfg.public_base_url = value.trim_end_matches('/').to_string();
                }
                "PURGE_RETRIES" => {
                    cfg.purge_retries = parse_positive(value)
                        .and_then(|v| u32::try_from(v).ok())
                        .ok_or_else(|| invalid("expected a positive integer"))?
                }
                "SWEEP_INTERVAL_SECS" => cfg.sweep_interval_secs = parse_positive(value).ok_or_else(|| invalid("expected a positive integer"))?,
                "AUDIT_RETENTION_DAYS" => {
                    cfg.audit_retention_days = parse_bounded(value, MAX_AUDIT_RETENTION_DAYS)
                        .filter(|v| chrono::Duration::try_days(*v).is_some())
                        .ok_or_else(|| invalid("expected 1..=36500"))?
                }
                // Other crates read their own TENANTGUARD_* keys.
                _ => {}
            }
        }

        Ok(cfg)
    }

    // Accessors clamp so a hand-built or deserialized config stays in range.

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_millis(self.evaluation_timeout_ms.clamp(1, MAX_EVALUATION_TIMEOUT_MS))
    }

    pub fn impersonation_max_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.impersonation_max_minutes.clamp(1, MAX_IMPERSONATION_MINUTES))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn audit_retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.audit_retention_days.clamp(1, MAX_AUDIT_RETENTION_DAYS))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_positive(value: &str) -> Option<u64> {
    value.parse::<u64>().ok().filter(|v| *v > 0)
}

fn parse_bounded(value: &str, max: i64) -> Option<i64> {
    value.parse::<i64>().ok().filter(|v| (1..=max).contains(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_used_when_nothing_is_set() {
        let cfg = IsolationConfig::from_vars(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(cfg, IsolationConfig::default());
        assert_eq!(cfg.foreign_filter_mode, ForeignFilterMode::EmptyResult);
    }

    #[test]
    fn prefixed_variables_override_defaults() {
        let cfg = IsolationConfig::from_vars([
            ("TENANTGUARD_UNIQUE_TENANT_NAMES", "true"),
            ("TENANTGUARD_FOREIGN_FILTER_MODE", "reject"),
            ("TENANTGUARD_PUBLIC_BUCKETS", "public-assets, brand"),
            ("TENANTGUARD_PUBLIC_BASE_URL", "https://cdn.example.com/"),
            ("TENANTGUARD_PURGE_RETRIES", "5"),
            ("UNRELATED", "whatever"),
        ])
        .unwrap();

        assert!(cfg.unique_tenant_names);
        assert_eq!(cfg.foreign_filter_mode, ForeignFilterMode::Reject);
        assert_eq!(cfg.public_buckets, vec!["public-assets", "brand"]);
        assert_eq!(cfg.public_base_url, "https://cdn.example.com");
        assert_eq!(cfg.purge_retries, 5);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = IsolationConfig::from_vars([("TENANTGUARD_EVALUATION_TIMEOUT_MS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key, .. } if key == "TENANTGUARD_EVALUATION_TIMEOUT_MS"));
    }

    #[test]
    fn out_of_range_durations_are_rejected() {
        for (key, value) in [
            ("TENANTGUARD_AUDIT_RETENTION_DAYS", "9999999999999999"),
            ("TENANTGUARD_AUDIT_RETENTION_DAYS", "36501"),
            ("TENANTGUARD_IMPERSONATION_MAX_MINUTES", "9223372036854775807"),
            ("TENANTGUARD_IMPERSONATION_MAX_MINUTES", "-5"),
            ("TENANTGUARD_EVALUATION_TIMEOUT_MS", "18446744073709551615"),
        ] {
            let err = IsolationConfig::from_vars([(key, value)]).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { key: k, .. } if k == key), "{key}={value}");
        }
    }

    #[test]
    fn hand_built_configs_never_overflow() {
        let cfg = IsolationConfig {
            audit_retention_days: i64::MAX,
            impersonation_max_minutes: i64::MAX,
            evaluation_timeout_ms: u64::MAX,
            ..IsolationConfig::default()
        };
        assert_eq!(cfg.audit_retention(), chrono::Duration::days(MAX_AUDIT_RETENTION_DAYS));
        assert_eq!(cfg.impersonation_max_duration(), chrono::Duration::minutes(MAX_IMPERSONATION_MINUTES));
        assert_eq!(cfg.evaluation_timeout(), Duration::from_millis(MAX_EVALUATION_TIMEOUT_MS));
        let _cutoff = chrono::Utc::now() - cfg.audit_retention();
    }
}
