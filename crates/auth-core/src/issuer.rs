//! Token issuance
//!
//! Builds the payload, stamps the reserved claims, and signs with the
//! active key. Misconfiguration surfaces here as a hard error before any
//! token is produced; issuance never signs with an empty secret.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::Header;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::claims::TokenType;
use crate::config::{
    AuthConfig, DEFAULT_ACCESS_TOKEN_EXPIRE_MINUTES, DEFAULT_REFRESH_TOKEN_EXPIRE_DAYS,
};
use crate::errors::AuthError;
use crate::service::KeyService;

/// Issues access and refresh tokens against a shared [`KeyService`].
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    keys: KeyService,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    /// Issuer with the stock TTLs (30-minute access, 7-day refresh).
    #[must_use]
    pub fn new(keys: KeyService) -> Self {
        TokenIssuer {
            keys,
            access_ttl: Duration::minutes(DEFAULT_ACCESS_TOKEN_EXPIRE_MINUTES),
            refresh_ttl: Duration::days(DEFAULT_REFRESH_TOKEN_EXPIRE_DAYS),
        }
    }

    /// Issuer with TTLs taken from configuration.
    #[must_use]
    pub fn from_config(keys: KeyService, config: &AuthConfig) -> Self {
        TokenIssuer {
            keys,
            access_ttl: config.access_token_ttl,
            refresh_ttl: config.refresh_token_ttl,
        }
    }

    /// Sign an access token for `subject` with the default TTL.
    pub fn create_access_token(&self, subject: &str) -> Result<String, AuthError> {
        self.create_access_token_at(subject, Map::new(), None, Utc::now())
    }

    /// Sign an access token carrying extra claims and an optional TTL
    /// override.
    pub fn create_access_token_with(
        &self,
        subject: &str,
        extra_claims: Map<String, Value>,
        ttl: Option<Duration>,
    ) -> Result<String, AuthError> {
        self.create_access_token_at(subject, extra_claims, ttl, Utc::now())
    }

    /// Deterministic-time variant for tests.
    pub fn create_access_token_at(
        &self,
        subject: &str,
        extra_claims: Map<String, Value>,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        self.issue_at(
            subject,
            TokenType::Access,
            ttl.unwrap_or(self.access_ttl),
            extra_claims,
            now,
        )
    }

    /// Sign a refresh token for `subject`.
    pub fn create_refresh_token(&self, subject: &str) -> Result<String, AuthError> {
        self.create_refresh_token_at(subject, Utc::now())
    }

    /// Deterministic-time variant for tests.
    pub fn create_refresh_token_at(
        &self,
        subject: &str,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        self.issue_at(subject, TokenType::Refresh, self.refresh_ttl, Map::new(), now)
    }

    fn issue_at(
        &self,
        subject: &str,
        token_type: TokenType,
        ttl: Duration,
        mut payload: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let state = self.keys.read();
        let key = state.store.get_active()?;
        if key.is_empty() {
            return Err(AuthError::EmptySecret);
        }
        let encoding = key.encoding().ok_or(AuthError::EmptySecret)?;

        let iat = now.timestamp();
        let exp = (now + ttl).timestamp();

        // Reserved claims are written last so collisions in extra
        // claims always lose.
        payload.insert("sub".to_string(), Value::from(subject));
        payload.insert("iat".to_string(), Value::from(iat));
        payload.insert("exp".to_string(), Value::from(exp));
        payload.insert("jti".to_string(), Value::from(Uuid::new_v4().to_string()));
        payload.insert("type".to_string(), Value::from(token_type.as_str()));

        let mut header = Header::new(key.algorithm());
        header.kid = Some(key.kid().to_string());

        let token = jsonwebtoken::encode(&header, &payload, encoding)
            .map_err(|e| AuthError::Crypto(format!("JWT signing failed: {e}")))?;

        tracing::debug!(
            target: "auth.issuer",
            kid = key.kid(),
            token_type = token_type.as_str(),
            exp,
            "token issued"
        );
        Ok(token)
    }
}
