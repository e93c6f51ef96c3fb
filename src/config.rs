//! Environment configuration
//!
//! Values come from the process environment (optionally seeded from a
//! `.env` file by the binary). Unset values fall back to defaults; malformed
//! values are rejected.

use crate::error::HistoryError;
use crate::Result;
use std::env;
use std::time::Duration;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryConfig {
    /// Upper bound on a single model call; `None` waits indefinitely
    pub turn_timeout: Option<Duration>,
    /// Upper bound on a compaction pass (summarizer calls included)
    pub summarize_timeout: Option<Duration>,
    /// Postgres connection string; in-memory storage when absent
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            turn_timeout: None,
            summarize_timeout: None,
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl HistoryConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let database_url = read("DATABASE_URL").or_else(|| read("POSTGRES_URL"));

        let max_connections = match read("HISTORY_DB_MAX_CONNECTIONS") {
            Some(raw) => parse_number::<u32>("HISTORY_DB_MAX_CONNECTIONS", &raw)?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        if max_connections == 0 {
            return Err(HistoryError::ConfigError(
                "HISTORY_DB_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            turn_timeout: read_seconds(&read, "HISTORY_TURN_TIMEOUT_SECS")?,
            summarize_timeout: read_seconds(&read, "HISTORY_SUMMARIZE_TIMEOUT_SECS")?,
            database_url,
            max_connections,
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse::<T>().map_err(|_| {
        HistoryError::ConfigError(format!("{} must be a non-negative integer, got {:?}", key, raw))
    })
}

/// Seconds as a timeout; `0` means no timeout
fn read_seconds<F>(read: &F, key: &str) -> Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    match read(key) {
        Some(raw) => {
            let secs = parse_number::<u64>(key, &raw)?;
            Ok((secs > 0).then(|| Duration::from_secs(secs)))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<HistoryConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        HistoryConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        assert_eq!(config_from(&[]).unwrap(), HistoryConfig::default());
    }

    #[test]
    fn test_reads_all_values() {
        let config = config_from(&[
            ("POSTGRES_URL", "postgres://localhost/history"),
            ("HISTORY_DB_MAX_CONNECTIONS", "12"),
            ("HISTORY_TURN_TIMEOUT_SECS", "30"),
            ("HISTORY_SUMMARIZE_TIMEOUT_SECS", "0"),
        ])
        .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/history"));
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.turn_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.summarize_timeout, None);
    }

    #[test]
    fn test_database_url_takes_precedence() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://primary/db"),
            ("POSTGRES_URL", "postgres://secondary/db"),
        ])
        .unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://primary/db"));
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = config_from(&[("DATABASE_URL", "  "), ("HISTORY_TURN_TIMEOUT_SECS", "")]).unwrap();
        assert_eq!(config.database_url, None);
        assert_eq!(config.turn_timeout, None);
    }

    #[test]
    fn test_rejects_malformed_values() {
        let err = config_from(&[("HISTORY_TURN_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(matches!(err, HistoryError::ConfigError(_)));

        let err = config_from(&[("HISTORY_DB_MAX_CONNECTIONS", "0")]).unwrap_err();
        assert!(matches!(err, HistoryError::ConfigError(_)));
    }
}
