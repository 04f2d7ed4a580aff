//! Token verification
//!
//! Staged pipeline: parse, resolve the signing key, check retirement,
//! verify the signature, validate claims, then a re-sign comparison as a
//! final tamper check. Each stage rejects with exactly one error kind so
//! callers can pattern-match. The whole pipeline runs under a single
//! read guard, so a concurrent rotation is observed either entirely
//! before or entirely after a given verification.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::claims::Claims;
use crate::config::{AuthConfig, DEFAULT_CLOCK_SKEW_SECONDS};
use crate::errors::AuthError;
use crate::jwt;
use crate::keystore::{Key, KeyStore};
use crate::service::KeyService;

/// Verifies tokens against a shared [`KeyService`].
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    keys: KeyService,
    clock_skew: Duration,
}

impl TokenVerifier {
    /// Verifier with the stock clock-skew tolerance.
    #[must_use]
    pub fn new(keys: KeyService) -> Self {
        TokenVerifier {
            keys,
            clock_skew: Duration::seconds(DEFAULT_CLOCK_SKEW_SECONDS),
        }
    }

    /// Verifier with the skew tolerance taken from configuration.
    #[must_use]
    pub fn from_config(keys: KeyService, config: &AuthConfig) -> Self {
        TokenVerifier {
            keys,
            clock_skew: config.clock_skew,
        }
    }

    /// Verify a token and return its claims.
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        self.decode_at(token, Utc::now())
    }

    /// Deterministic-time variant for tests.
    pub fn decode_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let result = self.decode_inner(token, now);
        if let Err(err) = &result {
            // Kind only; claim values never reach the log.
            tracing::debug!(target: "auth.verifier", error = %err, "token rejected");
        }
        result
    }

    fn decode_inner(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let segments = jwt::split_token(token)?;
        let header = jwt::decode_header(&segments)?;
        let header_kid = header.kid.as_deref().filter(|kid| !kid.is_empty());

        let state = self.keys.read();
        let key = resolve_key(&state.store, header_kid)?;

        // Retirement is judged before any signature work: a key past its
        // grace deadline must not validate anything, not even a token it
        // genuinely signed.
        if let Some(kid) = header_kid {
            if state.retirement.is_expired(kid, now) {
                return Err(AuthError::RetiredKey(kid.to_string()));
            }
        }

        // The header names the algorithm; the key pins it. Any mismatch
        // (including "none") means the token cannot have been produced
        // by this key.
        if header.alg != jwt::algorithm_name(key.algorithm()) {
            return Err(AuthError::InvalidSignature);
        }

        let signing_input = segments.signing_input();
        let valid = jsonwebtoken::crypto::verify(
            segments.signature,
            signing_input.as_bytes(),
            key.decoding(),
            key.algorithm(),
        )
        .map_err(|_| AuthError::InvalidSignature)?;
        if !valid {
            return Err(AuthError::InvalidSignature);
        }

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(segments.payload)
            .map_err(|_| AuthError::MalformedToken)?;
        let payload: Value =
            serde_json::from_slice(&payload_bytes).map_err(|_| AuthError::MalformedToken)?;
        let map = match payload {
            Value::Object(map) => map,
            _ => return Err(AuthError::MalformedToken),
        };

        let exp = map
            .get("exp")
            .and_then(Value::as_i64)
            .ok_or(AuthError::MissingClaims("exp"))?;
        if now.timestamp() > exp {
            return Err(AuthError::ExpiredSignature);
        }
        if let Some(nbf) = map.get("nbf").and_then(Value::as_i64) {
            if now.timestamp() < nbf {
                return Err(AuthError::ImmatureSignature);
            }
        }
        if let Some(iat) = map.get("iat").and_then(Value::as_i64) {
            jwt::validate_iat_at(iat, self.clock_skew.num_seconds(), now.timestamp())?;
        }
        if !map.get("sub").and_then(Value::as_str).is_some_and(|s| !s.is_empty()) {
            return Err(AuthError::MissingClaims("sub"));
        }
        if !map.get("jti").and_then(Value::as_str).is_some_and(|s| !s.is_empty()) {
            return Err(AuthError::MissingClaims("jti"));
        }

        // Final tamper check: re-sign the exact bytes we verified and
        // compare signatures. Skipped only on verify-only deployments
        // that hold no private half.
        if let Some(encoding) = key.encoding() {
            let expected =
                jsonwebtoken::crypto::sign(signing_input.as_bytes(), encoding, key.algorithm())
                    .map_err(|e| AuthError::Crypto(format!("re-sign check failed: {e}")))?;
            if expected != segments.signature {
                return Err(AuthError::InvalidSignature);
            }
        }

        serde_json::from_value(Value::Object(map)).map_err(|_| AuthError::MalformedToken)
    }
}

/// Pick the verifying key: an exact kid match when the store knows the
/// kid, otherwise the active key, otherwise the sole configured key.
/// The fallbacks keep kid-less legacy tokens verifiable; tokens whose
/// unknown kid was never a real key then fail on signature, which is the
/// honest outcome.
fn resolve_key<'a>(store: &'a KeyStore, header_kid: Option<&str>) -> Result<&'a Key, AuthError> {
    header_kid
        .and_then(|kid| store.get(kid))
        .or_else(|| store.active())
        .or_else(|| store.single_key())
        .ok_or(AuthError::MisconfiguredActiveKey)
}
