//! Account sync tunables

use crate::{Error, Result};
use std::str::FromStr;
use std::time::Duration;

/// Transactions requested per history page
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Delay between two polls of the same account (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

/// Storage key prefix for persisted account statuses
pub const ACCOUNT_KEY_PREFIX: &str = "account_";

/// Storage key prefix for persisted transaction bodies
pub const TRANSACTION_KEY_PREFIX: &str = "tx_";

/// Decimal width of a zero-padded logical time (`u64::MAX` has 20 digits)
pub const LT_PAD_WIDTH: usize = 20;

/// Polling and paging configuration for one account driver
#[derive(Debug, Clone, PartialEq)]
pub struct SyncParams {
    /// Maximum transactions fetched per page
    pub page_size: usize,
    /// Sleep between two iterations of the poll loop
    pub poll_interval: Duration,
    /// Consecutive "remote lost its history" observations required before
    /// local history is cleared
    pub history_clear_confirmations: u32,
    /// Number of sync events retained for diagnostics
    pub event_history: usize,
}

impl Default for SyncParams {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            history_clear_confirmations: 1,
            event_history: 64,
        }
    }
}

impl SyncParams {
    /// Defaults with `TONHUB_SYNC_*` environment overrides applied
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var::<usize, _>(&lookup, "TONHUB_SYNC_PAGE_SIZE")? {
            self.page_size = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "TONHUB_SYNC_POLL_INTERVAL_MS")? {
            self.poll_interval = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<u32, _>(&lookup, "TONHUB_SYNC_CLEAR_CONFIRMATIONS")? {
            self.history_clear_confirmations = v;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values the sync loop cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::InvalidValue {
                name: "page_size".to_string(),
                value: "0".to_string(),
            });
        }
        if self.history_clear_confirmations == 0 {
            return Err(Error::InvalidValue {
                name: "history_clear_confirmations".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

/// Retry/backoff configuration for remote fetches
#[derive(Debug, Clone, PartialEq)]
pub struct RetryParams {
    /// Maximum attempts per operation (`None` retries forever)
    pub max_attempts: Option<u32>,
    /// Give up once this much time has passed since the first attempt
    pub max_elapsed: Option<Duration>,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for a single delay
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Add up to 25% random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryParams {
    fn default() -> Self {
        Self {
            max_attempts: None,
            max_elapsed: None,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryParams {
    /// A bounded policy, mostly useful for tools and tests
    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            ..Default::default()
        }
    }

    /// Defaults with `TONHUB_RETRY_*` environment overrides applied
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var::<u32, _>(&lookup, "TONHUB_RETRY_MAX_ATTEMPTS")? {
            // 0 keeps the unbounded policy
            self.max_attempts = (v > 0).then_some(v);
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "TONHUB_RETRY_INITIAL_BACKOFF_MS")? {
            self.initial_backoff = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "TONHUB_RETRY_MAX_BACKOFF_MS")? {
            self.max_backoff = Duration::from_millis(v);
        }
        if self.multiplier < 1.0 || !self.multiplier.is_finite() {
            return Err(Error::InvalidValue {
                name: "multiplier".to_string(),
                value: self.multiplier.to_string(),
            });
        }
        Ok(self)
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::InvalidValue {
                name: name.to_string(),
                value: raw,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_sync_defaults() {
        let params = SyncParams::default();
        assert_eq!(params.page_size, 100);
        assert_eq!(params.poll_interval, Duration::from_secs(5));
        assert_eq!(params.history_clear_confirmations, 1);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_sync_overrides() {
        let params = SyncParams::default()
            .with_overrides(lookup(&[
                ("TONHUB_SYNC_PAGE_SIZE", "16"),
                ("TONHUB_SYNC_POLL_INTERVAL_MS", "30000"),
                ("TONHUB_SYNC_CLEAR_CONFIRMATIONS", "3"),
            ]))
            .unwrap();
        assert_eq!(params.page_size, 16);
        assert_eq!(params.poll_interval, Duration::from_secs(30));
        assert_eq!(params.history_clear_confirmations, 3);
    }

    #[test]
    fn test_sync_override_rejects_garbage() {
        let err = SyncParams::default()
            .with_overrides(lookup(&[("TONHUB_SYNC_PAGE_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));

        let err = SyncParams::default()
            .with_overrides(lookup(&[("TONHUB_SYNC_PAGE_SIZE", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("page_size"));
    }

    #[test]
    fn test_retry_defaults_retry_forever() {
        let retry = RetryParams::default();
        assert_eq!(retry.max_attempts, None);
        assert_eq!(retry.max_elapsed, None);
        assert_eq!(RetryParams::bounded(3).max_attempts, Some(3));
    }

    #[test]
    fn test_retry_overrides() {
        let retry = RetryParams::default()
            .with_overrides(lookup(&[
                ("TONHUB_RETRY_MAX_ATTEMPTS", "7"),
                ("TONHUB_RETRY_INITIAL_BACKOFF_MS", "10"),
                ("TONHUB_RETRY_MAX_BACKOFF_MS", "100"),
            ]))
            .unwrap();
        assert_eq!(retry.max_attempts, Some(7));
        assert_eq!(retry.initial_backoff, Duration::from_millis(10));
        assert_eq!(retry.max_backoff, Duration::from_millis(100));

        let unbounded = RetryParams::bounded(4)
            .with_overrides(lookup(&[("TONHUB_RETRY_MAX_ATTEMPTS", "0")]))
            .unwrap();
        assert_eq!(unbounded.max_attempts, None);
    }
}
