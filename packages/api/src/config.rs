use std::fmt;
use std::str::FromStr;
use tracing::Level;

pub const DEFAULT_SHOWDOWN_COMMAND: &str = "node pokemon-showdown simulate-battle";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    DynamoDb,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Missing(name) => write!(f, "{} must be set", name),
            ConfigError::Invalid { name, value } => {
                write!(f, "{} has an unsupported value: {}", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage: StorageBackend,
    pub state_table: String,
    pub log_table: String,
    pub token_secret: String,
    pub showdown_command: String,
    pub log_level: Level,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source. Table names are
    /// only required for the DynamoDB backend.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage = match lookup("STORAGE").as_deref() {
            None | Some("dynamodb") => StorageBackend::DynamoDb,
            Some("memory") => StorageBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "STORAGE",
                    value: other.to_string(),
                })
            }
        };

        let table = |name: &'static str| match storage {
            StorageBackend::DynamoDb => lookup(name).ok_or(ConfigError::Missing(name)),
            StorageBackend::Memory => Ok(lookup(name).unwrap_or_default()),
        };
        let state_table = table("MATCH_STATE_TABLE")?;
        let log_table = table("MATCH_LOG_TABLE")?;

        let token_secret = lookup("MATCH_TOKEN_SECRET")
            .filter(|secret| !secret.is_empty())
            .ok_or(ConfigError::Missing("MATCH_TOKEN_SECRET"))?;

        let log_level = match lookup("LOG_LEVEL") {
            Some(value) => Level::from_str(&value).map_err(|_| ConfigError::Invalid {
                name: "LOG_LEVEL",
                value,
            })?,
            None => Level::INFO,
        };

        Ok(AppConfig {
            storage,
            state_table,
            log_table,
            token_secret,
            showdown_command: lookup("SHOWDOWN_COMMAND")
                .unwrap_or_else(|| DEFAULT_SHOWDOWN_COMMAND.to_string()),
            log_level,
        })
    }
}
