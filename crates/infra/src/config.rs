//! Process configuration read from the environment.
//!
//! | Variable                   | Default        |
//! |----------------------------|----------------|
//! | `DATABASE_URL`             | unset: in-memory store |
//! | `DATABASE_MAX_CONNECTIONS` | `10`           |
//! | `LISTEN_ADDR`              | `0.0.0.0:8080` |
//! | `TX_ATTEMPTS`              | `3`            |
//! | `TX_TIMEOUT_MS`            | unset: no deadline |

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::tx::DEFAULT_ATTEMPTS;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is not valid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub listen_addr: SocketAddr,
    pub tx_attempts: i64,
    pub tx_timeout: Option<Duration>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL");

        let max_connections = match get("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "DATABASE_MAX_CONNECTIONS",
                        reason: format!("expected a positive integer, got {raw:?}"),
                    })
                }
            },
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let listen_addr = get("LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .trim()
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                var: "LISTEN_ADDR",
                reason: e.to_string(),
            })?;

        // A bad attempt count only degrades retry behaviour, so it falls back
        // instead of refusing to start.
        let tx_attempts = match get("TX_ATTEMPTS") {
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(n) if n > 0 => n,
                _ => {
                    warn!(value = %raw, default = DEFAULT_ATTEMPTS, "ignoring invalid TX_ATTEMPTS");
                    i64::from(DEFAULT_ATTEMPTS)
                }
            },
            None => i64::from(DEFAULT_ATTEMPTS),
        };

        let tx_timeout = match get("TX_TIMEOUT_MS") {
            Some(raw) => {
                let ms = raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                    var: "TX_TIMEOUT_MS",
                    reason: e.to_string(),
                })?;
                (ms > 0).then(|| Duration::from_millis(ms))
            }
            None => None,
        };

        Ok(Self {
            database_url,
            max_connections,
            listen_addr,
            tx_attempts,
            tx_timeout,
        })
    }
}
