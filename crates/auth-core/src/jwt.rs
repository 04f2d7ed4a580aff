//! Wire-level JWT helpers
//!
//! Segment splitting, unverified header inspection, algorithm names, and
//! temporal sanity checks shared by the issuer and verifier. Nothing in
//! this module verifies a signature; callers must treat everything
//! extracted here as untrusted routing data.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::Algorithm;
use serde::Deserialize;

use crate::errors::AuthError;

/// Maximum accepted token size in bytes.
///
/// Anything larger is rejected before base64 or JSON work to bound the
/// cost of garbage input.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// The three dot-separated base64url segments of a compact JWT.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TokenSegments<'a> {
    pub header: &'a str,
    pub payload: &'a str,
    pub signature: &'a str,
}

impl TokenSegments<'_> {
    /// The exact byte sequence the signature covers.
    pub(crate) fn signing_input(&self) -> String {
        format!("{}.{}", self.header, self.payload)
    }
}

/// Unverified JOSE header fields the engine routes on.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenHeader {
    pub alg: String,
    #[serde(default)]
    pub kid: Option<String>,
}

/// Split a compact token into its segments without decoding anything.
///
/// Enforces the size limit and the exactly-three-segments shape.
pub(crate) fn split_token(token: &str) -> Result<TokenSegments<'_>, AuthError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "auth.jwt",
            size = token.len(),
            limit = MAX_JWT_SIZE_BYTES,
            "rejecting oversized token"
        );
        return Err(AuthError::MalformedToken);
    }

    let mut parts = token.split('.');
    let header = parts.next().ok_or(AuthError::MalformedToken)?;
    let payload = parts.next().ok_or(AuthError::MalformedToken)?;
    let signature = parts.next().ok_or(AuthError::MalformedToken)?;
    if parts.next().is_some() || header.is_empty() || payload.is_empty() {
        return Err(AuthError::MalformedToken);
    }

    Ok(TokenSegments {
        header,
        payload,
        signature,
    })
}

/// Decode the header segment into its routing fields.
pub(crate) fn decode_header(segments: &TokenSegments<'_>) -> Result<TokenHeader, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segments.header)
        .map_err(|_| AuthError::MalformedToken)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::MalformedToken)
}

/// Extract the kid from a token's header without verifying the signature.
///
/// Used to route key lookup before any cryptographic work. An empty kid
/// is treated as absent.
pub fn extract_kid(token: &str) -> Result<Option<String>, AuthError> {
    let segments = split_token(token)?;
    let header = decode_header(&segments)?;
    Ok(header.kid.filter(|kid| !kid.is_empty()))
}

/// Reject an iat more than `skew_seconds` in the future of `now_ts`.
///
/// A future-dated iat means clock trouble or a forged token; within the
/// tolerance it is ordinary cross-host clock drift.
pub(crate) fn validate_iat_at(iat: i64, skew_seconds: i64, now_ts: i64) -> Result<(), AuthError> {
    if iat > now_ts + skew_seconds {
        tracing::debug!(
            target: "auth.jwt",
            iat,
            now = now_ts,
            skew_seconds,
            "rejecting token with future iat"
        );
        return Err(AuthError::ImmatureSignature);
    }
    Ok(())
}

/// Parse an algorithm name from configuration.
///
/// Only the HMAC and RSA families are supported; `None` for anything
/// else, including `none`.
pub fn parse_algorithm(name: &str) -> Option<Algorithm> {
    match name {
        "HS256" => Some(Algorithm::HS256),
        "HS384" => Some(Algorithm::HS384),
        "HS512" => Some(Algorithm::HS512),
        "RS256" => Some(Algorithm::RS256),
        "RS384" => Some(Algorithm::RS384),
        "RS512" => Some(Algorithm::RS512),
        _ => None,
    }
}

/// Canonical name for a supported algorithm.
pub fn algorithm_name(algorithm: Algorithm) -> &'static str {
    match algorithm {
        Algorithm::HS256 => "HS256",
        Algorithm::HS384 => "HS384",
        Algorithm::HS512 => "HS512",
        Algorithm::RS256 => "RS256",
        Algorithm::RS384 => "RS384",
        Algorithm::RS512 => "RS512",
        // Remaining variants are unreachable: parse_algorithm never
        // produces them and Key construction rejects them.
        _ => "unsupported",
    }
}

/// True for the RSA family (asymmetric, publishable public half).
pub(crate) fn is_rsa(algorithm: Algorithm) -> bool {
    matches!(
        algorithm,
        Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn b64(json: &str) -> String {
        URL_SAFE_NO_PAD.encode(json.as_bytes())
    }

    #[test]
    fn split_accepts_three_segments() {
        let token = format!("{}.{}.sig", b64("{}"), b64("{}"));
        let segments = split_token(&token).unwrap();
        assert_eq!(segments.signature, "sig");
        assert_eq!(
            segments.signing_input(),
            format!("{}.{}", b64("{}"), b64("{}"))
        );
    }

    #[test]
    fn split_rejects_wrong_segment_counts() {
        assert!(matches!(
            split_token("only.two"),
            Err(AuthError::MalformedToken)
        ));
        assert!(matches!(
            split_token("a.b.c.d"),
            Err(AuthError::MalformedToken)
        ));
        assert!(matches!(split_token(""), Err(AuthError::MalformedToken)));
    }

    #[test]
    fn split_rejects_oversized_tokens() {
        let token = format!("{}.{}.sig", b64("{}"), "A".repeat(MAX_JWT_SIZE_BYTES));
        assert!(matches!(
            split_token(&token),
            Err(AuthError::MalformedToken)
        ));
    }

    #[test]
    fn extract_kid_reads_header_without_verification() {
        let token = format!(
            "{}.{}.unverified-signature",
            b64(r#"{"alg":"HS256","kid":"2024-06"}"#),
            b64("{}")
        );
        assert_eq!(extract_kid(&token).unwrap(), Some("2024-06".to_string()));
    }

    #[test]
    fn extract_kid_treats_missing_and_empty_as_absent() {
        let no_kid = format!("{}.{}.sig", b64(r#"{"alg":"HS256"}"#), b64("{}"));
        assert_eq!(extract_kid(&no_kid).unwrap(), None);

        let empty_kid = format!("{}.{}.sig", b64(r#"{"alg":"HS256","kid":""}"#), b64("{}"));
        assert_eq!(extract_kid(&empty_kid).unwrap(), None);
    }

    #[test]
    fn extract_kid_rejects_garbage_header() {
        let token = format!("not-base64!.{}.sig", b64("{}"));
        assert!(matches!(
            extract_kid(&token),
            Err(AuthError::MalformedToken)
        ));
    }

    #[test]
    fn iat_within_skew_is_accepted() {
        let now = 1_700_000_000;
        assert!(validate_iat_at(now, 300, now).is_ok());
        assert!(validate_iat_at(now + 300, 300, now).is_ok());
        assert!(validate_iat_at(now - 10_000, 300, now).is_ok());
    }

    #[test]
    fn iat_beyond_skew_is_rejected() {
        let now = 1_700_000_000;
        assert!(matches!(
            validate_iat_at(now + 301, 300, now),
            Err(AuthError::ImmatureSignature)
        ));
    }

    #[test]
    fn algorithm_names_round_trip() {
        for name in ["HS256", "HS384", "HS512", "RS256", "RS384", "RS512"] {
            let alg = parse_algorithm(name).unwrap();
            assert_eq!(algorithm_name(alg), name);
        }
    }

    #[test]
    fn unsupported_algorithms_do_not_parse() {
        assert!(parse_algorithm("none").is_none());
        assert!(parse_algorithm("ES256").is_none());
        assert!(parse_algorithm("hs256").is_none());
        assert!(parse_algorithm("").is_none());
    }
}
