//! Process configuration, read from environment variables.
//!
//! | variable                   | default        |
//! |----------------------------|----------------|
//! | `EPRO_BIND_ADDR`           | `0.0.0.0:8080` |
//! | `DATABASE_URL`             | unset: in-memory store |
//! | `EPRO_DB_MAX_CONNECTIONS`  | `5`            |
//! | `EPRO_ATTACHMENT_ROOT`     | `./media`      |

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_ATTACHMENT_ROOT: &str = "./media";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is not valid: '{value}' ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Postgres connection string; `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub attachment_root: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = parse(
            "EPRO_BIND_ADDR",
            get("EPRO_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        )?;

        let db_max_connections = match get("EPRO_DB_MAX_CONNECTIONS") {
            Some(value) => {
                let n: u32 = parse("EPRO_DB_MAX_CONNECTIONS", value.clone())?;
                if n == 0 {
                    return Err(ConfigError::Invalid {
                        name: "EPRO_DB_MAX_CONNECTIONS",
                        value,
                        reason: "must be at least 1".to_string(),
                    });
                }
                n
            }
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            bind_addr,
            database_url: get("DATABASE_URL"),
            db_max_connections,
            attachment_root: PathBuf::from(
                get("EPRO_ATTACHMENT_ROOT").unwrap_or_else(|| DEFAULT_ATTACHMENT_ROOT.to_string()),
            ),
        })
    }
}

fn parse<T>(name: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_select_in_memory_store() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(cfg.database_url, None);
        assert_eq!(cfg.db_max_connections, 5);
        assert_eq!(cfg.attachment_root, PathBuf::from("./media"));
    }

    #[test]
    fn reads_every_variable() {
        let cfg = config(&[
            ("EPRO_BIND_ADDR", "127.0.0.1:9000"),
            ("DATABASE_URL", "postgres://epro@localhost/epro"),
            ("EPRO_DB_MAX_CONNECTIONS", "20"),
            ("EPRO_ATTACHMENT_ROOT", "/var/lib/epro"),
        ])
        .unwrap();
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://epro@localhost/epro"));
        assert_eq!(cfg.db_max_connections, 20);
        assert_eq!(cfg.attachment_root, PathBuf::from("/var/lib/epro"));
    }

    #[test]
    fn blank_database_url_is_unset() {
        let cfg = config(&[("DATABASE_URL", "  ")]).unwrap();
        assert_eq!(cfg.database_url, None);
    }

    #[test]
    fn invalid_numbers_are_errors() {
        for bad in ["many", "-1", "0"] {
            let err = config(&[("EPRO_DB_MAX_CONNECTIONS", bad)]).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::Invalid { name: "EPRO_DB_MAX_CONNECTIONS", .. }
            ));
        }
        assert!(config(&[("EPRO_BIND_ADDR", "localhost")]).is_err());
    }
}
