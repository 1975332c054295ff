use std::{env, net::SocketAddr, time::Duration};

use thiserror::Error;

use crate::clients::BackendConfig;

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

/// Where the collaborators live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    /// Product backend over HTTP.
    Http,
    /// プロセス内ストア。再起動で消える。
    Memory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    http_bind: SocketAddr,
    backend_mode: BackendMode,
    backend_base_url: Option<String>,
    backend_service_token: Option<String>,
    backend_connect_timeout: Duration,
    backend_total_timeout: Duration,
    crawl_timeout: Duration,
    user_id: i64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// Reads and validates the `SHIELD_*` environment.
    ///
    /// # Errors
    /// [`ConfigError::Missing`] when `SHIELD_BACKEND_BASE_URL` is unset in
    /// `http` mode, [`ConfigError::Invalid`] when a value does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_bind = parse_socket_addr("SHIELD_HTTP_BIND", "0.0.0.0:9010")?;
        let backend_mode = parse_backend_mode("SHIELD_BACKEND_MODE")?;
        let backend_base_url = match backend_mode {
            BackendMode::Http => Some(env_var("SHIELD_BACKEND_BASE_URL")?),
            BackendMode::Memory => optional_var("SHIELD_BACKEND_BASE_URL"),
        };
        let backend_service_token = optional_var("SHIELD_BACKEND_SERVICE_TOKEN");
        let backend_connect_timeout = parse_duration_ms("SHIELD_BACKEND_CONNECT_TIMEOUT_MS", 3_000)?;
        let backend_total_timeout = parse_duration_ms("SHIELD_BACKEND_TOTAL_TIMEOUT_MS", 30_000)?;
        let crawl_timeout = parse_duration_secs("SHIELD_CRAWL_TIMEOUT_SECS", 600)?;
        let user_id = parse_i64("SHIELD_USER_ID", 1)?;

        Ok(Self {
            http_bind,
            backend_mode,
            backend_base_url,
            backend_service_token,
            backend_connect_timeout,
            backend_total_timeout,
            crawl_timeout,
            user_id,
        })
    }

    /// In-memory configuration with defaults, bound to `http_bind`.
    #[must_use]
    pub fn memory(http_bind: SocketAddr) -> Self {
        Self {
            http_bind,
            backend_mode: BackendMode::Memory,
            backend_base_url: None,
            backend_service_token: None,
            backend_connect_timeout: Duration::from_millis(3_000),
            backend_total_timeout: Duration::from_millis(30_000),
            crawl_timeout: Duration::from_secs(600),
            user_id: 1,
        }
    }

    #[must_use]
    pub fn http_bind(&self) -> SocketAddr {
        self.http_bind
    }

    #[must_use]
    pub fn backend_mode(&self) -> BackendMode {
        self.backend_mode
    }

    #[must_use]
    pub fn backend_base_url(&self) -> Option<&str> {
        self.backend_base_url.as_deref()
    }

    #[must_use]
    pub fn backend_service_token(&self) -> Option<&str> {
        self.backend_service_token.as_deref()
    }

    #[must_use]
    pub fn backend_connect_timeout(&self) -> Duration {
        self.backend_connect_timeout
    }

    #[must_use]
    pub fn backend_total_timeout(&self) -> Duration {
        self.backend_total_timeout
    }

    #[must_use]
    pub fn crawl_timeout(&self) -> Duration {
        self.crawl_timeout
    }

    #[must_use]
    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    /// Client settings, present only in `http` mode.
    #[must_use]
    pub fn backend(&self) -> Option<BackendConfig> {
        if self.backend_mode != BackendMode::Http {
            return None;
        }
        self.backend_base_url.as_ref().map(|base_url| BackendConfig {
            base_url: base_url.clone(),
            service_token: self.backend_service_token.clone(),
            user_id: self.user_id,
            connect_timeout: self.backend_connect_timeout,
            total_timeout: self.backend_total_timeout,
        })
    }
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn optional_var(name: &'static str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_socket_addr(name: &'static str, default: &str) -> Result<SocketAddr, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());

    raw.parse().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_backend_mode(name: &'static str) -> Result<BackendMode, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| "http".to_string());
    match raw.trim().to_ascii_lowercase().as_str() {
        "http" => Ok(BackendMode::Http),
        "memory" => Ok(BackendMode::Memory),
        other => Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("expected `http` or `memory`, got `{other}`"),
        }),
    }
}

fn parse_duration_secs(name: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    let value = parse_u64(name, default_secs)?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("must be greater than zero"),
        });
    }
    Ok(Duration::from_secs(value))
}

fn parse_duration_ms(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    let ms = parse_u64(name, default_ms)?;
    Ok(Duration::from_millis(ms))
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim().parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_i64(name: &'static str, default: i64) -> Result<i64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim().parse::<i64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}
