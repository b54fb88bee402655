//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use domain::RuntimeConfig;
use projections::{EngineConfig, ProjectionErrorPolicy};

use crate::error::AppError;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(AppError::Config(format!(
                "LOG_FORMAT must be `text` or `json`, got `{other}`"
            ))),
        }
    }
}

/// Runtime configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `COMMAND_MAX_ATTEMPTS` — attempts before `Contention` (default: `5`)
/// - `COMMAND_RETRY_BACKOFF_MS` — base delay between attempts (default: `5`)
/// - `COMMAND_TIMEOUT_MS` — caller-side command timeout (default: none)
/// - `PROJECTION_ERROR_POLICY` — `halt` or `skip` (default: `halt`)
/// - `PROJECTION_BACKOFF_BASE_MS` / `PROJECTION_BACKOFF_MAX_MS` — outage
///   backoff (default: `50` / `5000`)
/// - `BUS_PAGE_SIZE` — events per store read (default: `256`)
/// - `QUERY_TIMEOUT_MS` — query timeout (default: none)
/// - `DATABASE_URL` — PostgreSQL event store; in-memory when unset
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `text` or `json` (default: `text`)
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub runtime: RuntimeConfig,
    pub engine: EngineConfig,
    pub query_timeout: Option<Duration>,
    pub database_url: Option<String>,
    pub log_filter: String,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeConfig::default(),
            engine: EngineConfig::default(),
            query_timeout: None,
            database_url: None,
            log_filter: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup. Unset or blank keys
    /// keep their defaults; malformed values are rejected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let runtime = RuntimeConfig {
            max_attempts: parse(&get, "COMMAND_MAX_ATTEMPTS")?
                .unwrap_or(defaults.runtime.max_attempts),
            retry_backoff: millis(&get, "COMMAND_RETRY_BACKOFF_MS")?
                .unwrap_or(defaults.runtime.retry_backoff),
            command_timeout: millis(&get, "COMMAND_TIMEOUT_MS")?,
        };
        if runtime.max_attempts == 0 {
            return Err(AppError::Config(
                "COMMAND_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        let error_policy = match get("PROJECTION_ERROR_POLICY") {
            Some(value) => value
                .parse::<ProjectionErrorPolicy>()
                .map_err(|e| AppError::Config(e.to_string()))?,
            None => defaults.engine.error_policy,
        };
        let engine = EngineConfig {
            error_policy,
            backoff_base: millis(&get, "PROJECTION_BACKOFF_BASE_MS")?
                .unwrap_or(defaults.engine.backoff_base),
            backoff_max: millis(&get, "PROJECTION_BACKOFF_MAX_MS")?
                .unwrap_or(defaults.engine.backoff_max),
            page_size: parse(&get, "BUS_PAGE_SIZE")?.unwrap_or(defaults.engine.page_size),
        };

        let log_format = match get("LOG_FORMAT") {
            Some(value) => value.parse()?,
            None => defaults.log_format,
        };

        Ok(Self {
            runtime,
            engine,
            query_timeout: millis(&get, "QUERY_TIMEOUT_MS")?,
            database_url: get("DATABASE_URL"),
            log_filter: get("RUST_LOG").unwrap_or(defaults.log_filter),
            log_format,
        })
    }
}

fn parse<T, F>(get: &F, key: &str) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|e| AppError::Config(format!("{key}: {e}")))
        })
        .transpose()
}

fn millis<F>(get: &F, key: &str) -> Result<Option<Duration>, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(parse::<u64, F>(get, key)?.map(Duration::from_millis))
}
