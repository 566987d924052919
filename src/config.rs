//! Runtime configuration, read once from the environment at startup.

use anyhow::{bail, Context, Result};
use std::env;
use std::time::Duration;

use crate::client::{Credentials, DEFAULT_BASE_URL};

pub const DEFAULT_POLL_MINUTES: u64 = 30;
/// One week.
pub const MAX_POLL_MINUTES: u64 = 7 * 24 * 60;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_ENTRY_ID: &str = "bessa_lunch";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3001";

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub credentials: Credentials,
    pub venue_id: u64,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    /// Prefix for sensor unique ids
    pub entry_id: String,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .with_context(|| format!("{} must be set", key))
        };

        let email = required("BESSA_EMAIL")?;
        // Passwords are taken verbatim; surrounding whitespace may be significant.
        let password = lookup("BESSA_PASSWORD")
            .filter(|value| !value.is_empty())
            .context("BESSA_PASSWORD must be set")?;
        let venue_id = required("BESSA_VENUE_ID")?
            .parse::<u64>()
            .context("BESSA_VENUE_ID must be a positive integer")?;

        let poll_minutes = match lookup("BESSA_POLL_INTERVAL_MINUTES") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .context("BESSA_POLL_INTERVAL_MINUTES must be an integer")?,
            None => DEFAULT_POLL_MINUTES,
        };
        if poll_minutes == 0 {
            bail!("BESSA_POLL_INTERVAL_MINUTES must be at least 1");
        }
        if poll_minutes > MAX_POLL_MINUTES {
            bail!(
                "BESSA_POLL_INTERVAL_MINUTES is too large: {} (at most {})",
                poll_minutes,
                MAX_POLL_MINUTES
            );
        }

        let timeout_secs = match lookup("BESSA_REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .context("BESSA_REQUEST_TIMEOUT_SECS must be an integer")?,
            None => DEFAULT_TIMEOUT_SECS,
        };
        if timeout_secs == 0 {
            bail!("BESSA_REQUEST_TIMEOUT_SECS must be at least 1");
        }

        Ok(Self {
            base_url: lookup("BESSA_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            credentials: Credentials::new(email, password),
            venue_id,
            poll_interval: Duration::from_secs(poll_minutes * 60),
            request_timeout: Duration::from_secs(timeout_secs),
            entry_id: lookup("BESSA_ENTRY_ID").unwrap_or_else(|| DEFAULT_ENTRY_ID.to_string()),
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        })
    }
}
