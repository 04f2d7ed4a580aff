//! Error types for the token engine
//!
//! Misconfiguration variants indicate a deployment defect and must be
//! treated as fatal by callers (fail closed, never issue a bad token).
//! Verification variants are expected runtime conditions that map to
//! an unauthenticated response at the service edge.

use thiserror::Error;

/// Errors produced by key management, issuance, and verification.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The configured active kid is unset or absent from the key store.
    #[error("Active signing key is not configured or not present in the key store")]
    MisconfiguredActiveKey,

    /// The resolved signing key carries no usable key material.
    #[error("Signing key material is empty")]
    EmptySecret,

    /// The algorithm name is not in the supported HS*/RS* family.
    #[error("Unsupported JWT algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The key that signed this token is past its rotation grace deadline.
    #[error("Signing key '{0}' has been retired")]
    RetiredKey(String),

    /// The token's exp claim is in the past.
    #[error("Token has expired")]
    ExpiredSignature,

    /// The token's nbf is in the future, or its iat exceeds clock-skew
    /// tolerance.
    #[error("Token is not yet valid")]
    ImmatureSignature,

    /// Signature verification failed, or the header alg does not match the
    /// resolved key.
    #[error("Token signature is invalid")]
    InvalidSignature,

    /// Wrong segment count, oversized token, or undecodable header/payload.
    #[error("Token is malformed")]
    MalformedToken,

    /// A required claim is absent from the payload.
    #[error("Required claim '{0}' is missing")]
    MissingClaims(&'static str),

    /// Key material failed to parse, or a signing operation failed.
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),
}

impl AuthError {
    /// True for deployment defects that must abort the caller rather than
    /// map to an unauthenticated response.
    #[must_use]
    pub fn is_misconfiguration(&self) -> bool {
        matches!(
            self,
            AuthError::MisconfiguredActiveKey
                | AuthError::EmptySecret
                | AuthError::UnsupportedAlgorithm(_)
                | AuthError::Crypto(_)
        )
    }
}
