//! Signing-key rotation and JWT verification engine
//!
//! The auth core of the portfolio backend: issues access/refresh tokens
//! under an active signing key, rotates keys with zero downtime by
//! trusting retired keys through a bounded grace period, and verifies
//! tokens with a staged, single-error-kind pipeline.
//!
//! Modules:
//! - `config` - environment-driven configuration (`JWT_*` variables)
//! - `errors` - `AuthError`, split between fatal misconfiguration and
//!   recoverable verification failures
//! - `jwt` - wire-level helpers (segments, header inspection, algorithms)
//! - `claims` - the token payload model with log-safe Debug
//! - `keystore` - keys by kid plus the active-signer designation
//! - `retirement` - grace deadlines for retired kids
//! - `service` - the shared `KeyService` handle and rotation
//! - `issuer` - access/refresh token issuance
//! - `verifier` - the verification pipeline
//!
//! ```no_run
//! use auth_core::{AuthConfig, KeyService, TokenIssuer, TokenVerifier};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::from_env()?;
//! let keys = KeyService::from_config(&config)?;
//! let issuer = TokenIssuer::from_config(keys.clone(), &config);
//! let verifier = TokenVerifier::from_config(keys, &config);
//!
//! let token = issuer.create_access_token("user-42")?;
//! let claims = verifier.decode(&token)?;
//! assert_eq!(claims.sub, "user-42");
//! # Ok(())
//! # }
//! ```

pub mod claims;
pub mod config;
pub mod errors;
pub mod issuer;
pub mod jwt;
pub mod keystore;
pub mod retirement;
pub mod service;
pub mod verifier;

pub use claims::{Claims, TokenType};
pub use config::{AuthConfig, ConfigError};
pub use errors::AuthError;
pub use issuer::TokenIssuer;
pub use keystore::{Key, KeyMaterial, KeyStore};
pub use retirement::RetirementTracker;
pub use service::{KeyService, VerifyingKey};
pub use verifier::TokenVerifier;
