//! Environment-driven configuration
//!
//! `AuthConfig::from_env()` is a thin wrapper over `from_vars`, which
//! takes a plain map so tests never have to mutate process environment.

use chrono::Duration;
use jsonwebtoken::Algorithm;
use secrecy::SecretString;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::jwt;

pub const DEFAULT_ALGORITHM: Algorithm = Algorithm::HS256;
pub const DEFAULT_ROTATION_GRACE_PERIOD_SECONDS: i64 = 3600;
pub const DEFAULT_ACCESS_TOKEN_EXPIRE_MINUTES: i64 = 30;
pub const DEFAULT_REFRESH_TOKEN_EXPIRE_DAYS: i64 = 7;
pub const DEFAULT_CLOCK_SKEW_SECONDS: i64 = 300;

/// Configuration parsing errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unsupported JWT algorithm: '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("JWT_KEYS is not a JSON object of string secrets: {0}")]
    InvalidKeyMap(String),

    #[error("Invalid value for {name}: '{value}'")]
    InvalidNumber { name: &'static str, value: String },
}

/// Parsed engine configuration.
///
/// Key presence is deliberately not validated here: a dangling
/// `ACTIVE_JWT_KID` only fails once something tries to sign with it.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub algorithm: Algorithm,
    /// Symmetric keys by kid, from `JWT_KEYS`.
    pub keys: HashMap<String, SecretString>,
    /// Initially active kid, from `ACTIVE_JWT_KID`.
    pub active_kid: Option<String>,
    /// Legacy single-secret fallback, from `JWT_SECRET_KEY`.
    pub secret_key: Option<SecretString>,
    pub private_key_path: Option<PathBuf>,
    pub public_key_path: Option<PathBuf>,
    pub rotation_grace_period: Duration,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub clock_skew: Duration,
}

impl AuthConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&std::env::vars().collect())
    }

    /// Load from an explicit variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let algorithm = match non_empty(vars, "JWT_ALGORITHM") {
            Some(name) => jwt::parse_algorithm(name)
                .ok_or_else(|| ConfigError::UnsupportedAlgorithm(name.to_string()))?,
            None => DEFAULT_ALGORITHM,
        };

        let keys = match non_empty(vars, "JWT_KEYS") {
            Some(raw) => serde_json::from_str::<HashMap<String, String>>(raw)
                .map_err(|e| ConfigError::InvalidKeyMap(e.to_string()))?
                .into_iter()
                .map(|(kid, secret)| (kid, SecretString::from(secret)))
                .collect(),
            None => HashMap::new(),
        };

        let grace_seconds = parse_number(
            vars,
            "JWT_ROTATION_GRACE_PERIOD_SECONDS",
            DEFAULT_ROTATION_GRACE_PERIOD_SECONDS,
        )?;
        let access_minutes = parse_number(
            vars,
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            DEFAULT_ACCESS_TOKEN_EXPIRE_MINUTES,
        )?;
        let refresh_days = parse_number(
            vars,
            "REFRESH_TOKEN_EXPIRE_DAYS",
            DEFAULT_REFRESH_TOKEN_EXPIRE_DAYS,
        )?;
        let skew_seconds =
            parse_number(vars, "JWT_CLOCK_SKEW_SECONDS", DEFAULT_CLOCK_SKEW_SECONDS)?;

        Ok(AuthConfig {
            algorithm,
            keys,
            active_kid: non_empty(vars, "ACTIVE_JWT_KID").map(str::to_string),
            secret_key: non_empty(vars, "JWT_SECRET_KEY").map(SecretString::from),
            private_key_path: non_empty(vars, "JWT_PRIVATE_KEY_PATH").map(PathBuf::from),
            public_key_path: non_empty(vars, "JWT_PUBLIC_KEY_PATH").map(PathBuf::from),
            rotation_grace_period: duration_seconds(
                "JWT_ROTATION_GRACE_PERIOD_SECONDS",
                grace_seconds,
            )?,
            access_token_ttl: duration_seconds(
                "ACCESS_TOKEN_EXPIRE_MINUTES",
                access_minutes.saturating_mul(60),
            )?,
            refresh_token_ttl: duration_seconds(
                "REFRESH_TOKEN_EXPIRE_DAYS",
                refresh_days.saturating_mul(86_400),
            )?,
            clock_skew: duration_seconds("JWT_CLOCK_SKEW_SECONDS", skew_seconds)?,
        })
    }
}

/// An empty env value is treated the same as an unset one.
fn non_empty<'a>(vars: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    vars.get(name).map(String::as_str).filter(|v| !v.is_empty())
}

fn parse_number(
    vars: &HashMap<String, String>,
    name: &'static str,
    default: i64,
) -> Result<i64, ConfigError> {
    match non_empty(vars, name) {
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|v| *v >= 0)
            .ok_or_else(|| ConfigError::InvalidNumber {
                name,
                value: raw.to_string(),
            }),
        None => Ok(default),
    }
}

fn duration_seconds(name: &'static str, seconds: i64) -> Result<Duration, ConfigError> {
    Duration::try_seconds(seconds).ok_or_else(|| ConfigError::InvalidNumber {
        name,
        value: seconds.to_string(),
    })
}
