//! Runtime configuration for the reconciliation engine and provider client.
//!
//! Values come from environment variables (optionally seeded from a `.env`
//! file by the CLI). Every lookup goes through a closure so tests can supply
//! their own variables without touching the process environment.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sync::RetryPolicy;
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_CONTAINER_ID: &str = "primary";
const DEFAULT_NAMESPACE: &str = "agenda";
const DEFAULT_PRIVATE_PROPERTY_KEY: &str = "agenda_item_id";
const DEFAULT_TIMEZONE: &str = "UTC";
const DEFAULT_DURATION_MIN: u32 = 60;
const DEFAULT_PROVIDER_URL: &str = "https://www.googleapis.com/calendar/v3";
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings that shape how items are mirrored into the remote container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Remote container (calendar) that holds mirrored objects
    pub container_id: String,
    /// Prefix and domain of the correlation UID
    pub correlation_namespace: String,
    /// Private property name carrying the local item id
    pub private_property_key: String,
    /// Time zone name sent with event start/end
    pub timezone: String,
    /// Event length used when an item has no duration
    pub default_duration_min: u32,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            container_id: DEFAULT_CONTAINER_ID.to_string(),
            correlation_namespace: DEFAULT_NAMESPACE.to_string(),
            private_property_key: DEFAULT_PRIVATE_PROPERTY_KEY.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            default_duration_min: DEFAULT_DURATION_MIN,
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let correlation_namespace =
            value_or_default(&lookup, "AGENDA_CORRELATION_NAMESPACE", DEFAULT_NAMESPACE);
        if !correlation_namespace
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.')
        {
            return Err(ConfigError::Invalid(
                "AGENDA_CORRELATION_NAMESPACE may only contain letters, digits, '-', '_' or '.'"
                    .to_string(),
            ));
        }

        let retry = RetryPolicy {
            max_attempts: parse_or_default(
                &lookup,
                "AGENDA_MAX_SYNC_ATTEMPTS",
                defaults.retry.max_attempts,
            )?,
            base_delay_secs: parse_or_default(
                &lookup,
                "AGENDA_RETRY_BASE_SECS",
                defaults.retry.base_delay_secs,
            )?,
            max_delay_secs: parse_or_default(
                &lookup,
                "AGENDA_RETRY_MAX_SECS",
                defaults.retry.max_delay_secs,
            )?,
        };
        if retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "AGENDA_MAX_SYNC_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if retry.max_delay_secs < retry.base_delay_secs {
            return Err(ConfigError::Invalid(
                "AGENDA_RETRY_MAX_SECS must not be smaller than AGENDA_RETRY_BASE_SECS"
                    .to_string(),
            ));
        }

        Ok(Self {
            container_id: value_or_default(&lookup, "AGENDA_CALENDAR_ID", DEFAULT_CONTAINER_ID),
            correlation_namespace,
            private_property_key: value_or_default(
                &lookup,
                "AGENDA_PRIVATE_PROPERTY_KEY",
                DEFAULT_PRIVATE_PROPERTY_KEY,
            ),
            timezone: value_or_default(&lookup, "AGENDA_TIMEZONE", DEFAULT_TIMEZONE),
            default_duration_min: parse_or_default(
                &lookup,
                "AGENDA_DEFAULT_DURATION_MIN",
                DEFAULT_DURATION_MIN,
            )?,
            retry,
        })
    }
}

/// Connection settings for the HTTP calendar provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_base_url: String,
    pub access_token: String,
    pub timeout: Duration,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ProviderConfig")
            .field("api_base_url", &self.api_base_url)
            .field("access_token", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_base_url = value_or_default(&lookup, "AGENDA_PROVIDER_URL", DEFAULT_PROVIDER_URL);
        if !is_http_url(&api_base_url) {
            return Err(ConfigError::Invalid(
                "AGENDA_PROVIDER_URL must start with http:// or https://".to_string(),
            ));
        }

        let access_token = normalize_text_option(lookup("AGENDA_PROVIDER_TOKEN"))
            .ok_or(ConfigError::MissingVar("AGENDA_PROVIDER_TOKEN"))?;

        let timeout_secs = parse_or_default(
            &lookup,
            "AGENDA_PROVIDER_TIMEOUT_SECS",
            DEFAULT_PROVIDER_TIMEOUT_SECS,
        )?;

        Ok(Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            access_token,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn value_or_default(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: &str,
) -> String {
    normalize_text_option(lookup(name)).unwrap_or_else(|| default.to_string())
}

fn parse_or_default<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    normalize_text_option(lookup(name)).map_or(Ok(default), |raw| {
        raw.parse::<T>()
            .map_err(|_| ConfigError::Invalid(format!("{name} must be a number, got '{raw}'")))
    })
}
