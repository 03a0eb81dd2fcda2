//! Configuration loading and representation.
//!
//! Values come from the process environment (`from_env`) or from any lookup
//! function (`from_lookup`), which keeps tests free of global env mutation.

use std::time::Duration;

use thiserror::Error;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Postgres connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

/// Which stock store backs the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Postgres(DatabaseConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLedgerConfig {
    pub store: StoreBackend,
}

impl Default for StockLedgerConfig {
    fn default() -> Self {
        Self {
            store: StoreBackend::InMemory,
        }
    }
}

impl StockLedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from a key lookup.
    ///
    /// - `STOCKLEDGER_STORE`: `memory` (default) or `postgres`
    /// - `USE_PERSISTENT_STORES=true`: shorthand for `postgres`
    /// - `DATABASE_URL`: required for `postgres`
    /// - `DATABASE_MAX_CONNECTIONS`, `DATABASE_ACQUIRE_TIMEOUT_SECS`: pool tuning
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let persistent = parse_or("USE_PERSISTENT_STORES", lookup("USE_PERSISTENT_STORES"), false)?;

        let backend = match lookup("STOCKLEDGER_STORE") {
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "memory" | "in-memory" | "in_memory" => "memory",
                "postgres" | "postgresql" => "postgres",
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "STOCKLEDGER_STORE",
                        value: raw,
                        reason: "expected `memory` or `postgres`".to_string(),
                    });
                }
            },
            None if persistent => "postgres",
            None => "memory",
        };

        let store = if backend == "postgres" {
            let url = lookup("DATABASE_URL")
                .filter(|u| !u.trim().is_empty())
                .ok_or(ConfigError::Missing("DATABASE_URL"))?;
            let max_connections = parse_or(
                "DATABASE_MAX_CONNECTIONS",
                lookup("DATABASE_MAX_CONNECTIONS"),
                DEFAULT_MAX_CONNECTIONS,
            )?;
            if max_connections == 0 {
                return Err(ConfigError::Invalid {
                    key: "DATABASE_MAX_CONNECTIONS",
                    value: "0".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            let timeout_secs = parse_or(
                "DATABASE_ACQUIRE_TIMEOUT_SECS",
                lookup("DATABASE_ACQUIRE_TIMEOUT_SECS"),
                DEFAULT_ACQUIRE_TIMEOUT_SECS,
            )?;

            StoreBackend::Postgres(DatabaseConfig {
                url,
                max_connections,
                acquire_timeout: Duration::from_secs(timeout_secs),
            })
        } else {
            StoreBackend::InMemory
        };

        Ok(Self { store })
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}
