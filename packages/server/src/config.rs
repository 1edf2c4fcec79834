//! Server settings from the environment.

use std::path::PathBuf;

use runclub_map_sheet::SheetError;

/// Errors reading server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `PORT` is not a valid port number.
    #[error("Invalid PORT value: {value}")]
    InvalidPort {
        /// The offending value.
        value: String,
    },

    /// The spreadsheet settings are incomplete.
    #[error(transparent)]
    Sheet(#[from] SheetError),
}

/// Where to listen and what to serve besides the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind.
    pub bind_addr: String,
    /// Port to bind.
    pub port: u16,
    /// Built frontend to serve at `/`, if any.
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 8080,
            static_dir: None,
        }
    }
}

impl ServerConfig {
    /// Reads `BIND_ADDR`, `PORT` and `STATIC_DIR`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPort`] if `PORT` is set but not a
    /// port number.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`Self::from_env`], reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPort`] if `PORT` is set but not a
    /// port number.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = match non_empty("PORT") {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort { value })?,
            None => defaults.port,
        };

        Ok(Self {
            bind_addr: non_empty("BIND_ADDR").unwrap_or(defaults.bind_addr),
            port,
            static_dir: non_empty("STATIC_DIR").map(PathBuf::from),
        })
    }
}
