//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! - `HOST` - Bind address (default: 0.0.0.0)
//! - `PORT` - Listen port (default: 8000)
//! - `API_KEY` - Geoapify API key (required unless running offline)
//! - `GEOCODE_URL` - Geocoding endpoint (default: Geoapify search)
//! - `GEOCODE_TIMEOUT_SECS` - Outbound geocode timeout (default: 10)
//! - `DATABASE_URL` - `PostgreSQL` URL; otherwise the separate `POSTGRES_USER`,
//!   `POSTGRES_PASSWORD`, `POSTGRES_HOST`, `PGPORT` and `POSTGRES_DB` values.
//!   Without either, cities are kept in memory.
//! - `REDIS_URL` - Redis URL; otherwise `redis://{REDIS_HOST}`. Without
//!   either, the proximity cache is kept in memory.
//! - `NEAR_CACHE_TTL_SECS` - Nearest-query cache lifetime (default: 86400)

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgConnectOptions;
use thiserror::Error;

use crate::cache::DEFAULT_NEAREST_TTL;
use crate::geocode::{DEFAULT_GEOCODE_TIMEOUT, DEFAULT_GEOCODE_URL};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Where the city table lives.
#[derive(Debug, Clone)]
pub enum DatabaseConfig {
    /// A full `DATABASE_URL` (may contain a password).
    Url(SecretString),
    /// The split `POSTGRES_*` variables, passed to the driver one by one so
    /// no part needs URL escaping.
    Parts {
        host: String,
        port: u16,
        username: String,
        password: SecretString,
        database: String,
    },
}

impl DatabaseConfig {
    /// Driver connection options.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if `DATABASE_URL` does not parse.
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        match self {
            Self::Url(url) => url.expose_secret().parse::<PgConnectOptions>().map_err(|e| {
                ConfigError::InvalidEnvVar("DATABASE_URL".into(), e.to_string())
            }),
            Self::Parts {
                host,
                port,
                username,
                password,
                database,
            } => Ok(PgConnectOptions::new()
                .host(host)
                .port(*port)
                .username(username)
                .password(password.expose_secret())
                .database(database)),
        }
    }
}

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// `None` selects the offline built-in geocoder.
    pub api_key: Option<SecretString>,
    pub geocode_url: String,
    pub geocode_timeout: Duration,
    /// `None` selects the in-memory store.
    pub database: Option<DatabaseConfig>,
    /// `None` selects the in-memory cache.
    pub redis_url: Option<String>,
    pub near_cache_ttl: Duration,
}

impl Config {
    /// Load from the process environment.
    ///
    /// With `offline` set, `API_KEY` is not required and is ignored.
    pub fn from_env(offline: bool) -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars, offline)
    }

    /// Load from an explicit variable map.
    pub fn from_vars(vars: &HashMap<String, String>, offline: bool) -> Result<Self, ConfigError> {
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let host = get("HOST").unwrap_or("0.0.0.0").to_string();
        let port = parse_var(get("PORT"), "PORT", 8000u16)?;

        let api_key = if offline {
            None
        } else {
            let key = get("API_KEY").ok_or_else(|| ConfigError::MissingEnvVar("API_KEY".into()))?;
            Some(SecretString::from(key))
        };

        let geocode_url = get("GEOCODE_URL").unwrap_or(DEFAULT_GEOCODE_URL).to_string();
        let geocode_timeout = Duration::from_secs(parse_var(
            get("GEOCODE_TIMEOUT_SECS"),
            "GEOCODE_TIMEOUT_SECS",
            DEFAULT_GEOCODE_TIMEOUT.as_secs(),
        )?);
        if geocode_timeout.is_zero() {
            return Err(ConfigError::InvalidEnvVar(
                "GEOCODE_TIMEOUT_SECS".into(),
                "must be greater than zero".into(),
            ));
        }

        let database = match get("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig::Url(SecretString::from(url))),
            None => postgres_from_parts(&get)?,
        };
        if let Some(database) = &database {
            database.connect_options()?;
        }

        let redis_url = get("REDIS_URL")
            .map(str::to_string)
            .or_else(|| get("REDIS_HOST").map(|host| format!("redis://{}", host)));

        let near_cache_ttl = Duration::from_secs(parse_var(
            get("NEAR_CACHE_TTL_SECS"),
            "NEAR_CACHE_TTL_SECS",
            DEFAULT_NEAREST_TTL.as_secs(),
        )?);

        Ok(Self {
            host,
            port,
            api_key,
            geocode_url,
            geocode_timeout,
            database,
            redis_url,
            near_cache_ttl,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T: std::str::FromStr>(
    raw: Option<&str>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    match raw {
        Some(v) => v
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}

/// The split `POSTGRES_*` variables, if `POSTGRES_HOST` is set.
fn postgres_from_parts<'a>(
    get: &impl Fn(&str) -> Option<&'a str>,
) -> Result<Option<DatabaseConfig>, ConfigError> {
    let Some(host) = get("POSTGRES_HOST") else {
        return Ok(None);
    };
    let require = |key: &str| {
        get(key)
            .map(str::to_string)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    };

    Ok(Some(DatabaseConfig::Parts {
        host: host.to_string(),
        port: parse_var(get("PGPORT"), "PGPORT", 5432u16)?,
        username: require("POSTGRES_USER")?,
        password: SecretString::from(require("POSTGRES_PASSWORD")?),
        database: require("POSTGRES_DB")?,
    }))
}
