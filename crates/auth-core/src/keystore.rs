//! Signing-key registry
//!
//! `Key` couples raw material with the derived `jsonwebtoken` handles,
//! built eagerly at construction so replacing a key in the store swaps
//! signing and verifying state in one move. `KeyStore` is the plain data
//! structure; locking lives in [`crate::service::KeyService`].

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use secrecy::{ExposeSecret, SecretBox};
use std::collections::HashMap;
use std::fmt;

use crate::errors::AuthError;
use crate::jwt;

/// Raw key material. Secret halves are wrapped in `SecretBox` so they
/// are zeroized on drop and never appear in Debug output.
pub enum KeyMaterial {
    /// Shared secret for the HS* family.
    Hmac(SecretBox<Vec<u8>>),
    /// PEM-encoded RSA keypair. `private_pem` is absent on verify-only
    /// deployments. The public half is a `String` because PEM is ASCII;
    /// non-UTF-8 bytes mean corruption and are rejected up front.
    Rsa {
        private_pem: Option<SecretBox<Vec<u8>>>,
        public_pem: String,
    },
}

impl KeyMaterial {
    /// Wrap an HMAC shared secret.
    #[must_use]
    pub fn hmac(secret: &[u8]) -> Self {
        KeyMaterial::Hmac(SecretBox::new(Box::new(secret.to_vec())))
    }

    /// Wrap an RSA keypair; pass `None` for verify-only nodes.
    #[must_use]
    pub fn rsa(private_pem: Option<Vec<u8>>, public_pem: String) -> Self {
        KeyMaterial::Rsa {
            private_pem: private_pem.map(|pem| SecretBox::new(Box::new(pem))),
            public_pem,
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            KeyMaterial::Hmac(secret) => secret.expose_secret().is_empty(),
            KeyMaterial::Rsa { public_pem, .. } => public_pem.is_empty(),
        }
    }
}

// SecretBox is not Clone; rebuild from the exposed bytes.
impl Clone for KeyMaterial {
    fn clone(&self) -> Self {
        match self {
            KeyMaterial::Hmac(secret) => {
                KeyMaterial::Hmac(SecretBox::new(Box::new(secret.expose_secret().clone())))
            }
            KeyMaterial::Rsa {
                private_pem,
                public_pem,
            } => KeyMaterial::Rsa {
                private_pem: private_pem
                    .as_ref()
                    .map(|pem| SecretBox::new(Box::new(pem.expose_secret().clone()))),
                public_pem: public_pem.clone(),
            },
        }
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMaterial::Hmac(_) => f.write_str("KeyMaterial::Hmac([REDACTED])"),
            KeyMaterial::Rsa { private_pem, .. } => f
                .debug_struct("KeyMaterial::Rsa")
                .field("private_pem", &private_pem.as_ref().map(|_| "[REDACTED]"))
                .field("public_pem", &"<pem>")
                .finish(),
        }
    }
}

/// A signing key: identifier, algorithm, material, and the derived
/// `jsonwebtoken` handles.
pub struct Key {
    kid: String,
    algorithm: Algorithm,
    material: KeyMaterial,
    decoding: DecodingKey,
    encoding: Option<EncodingKey>,
}

impl Key {
    /// Build a key, deriving the encoding/decoding handles up front.
    ///
    /// Fails with [`AuthError::UnsupportedAlgorithm`] outside the HS*/RS*
    /// families and [`AuthError::Crypto`] when material and algorithm
    /// disagree or a PEM does not parse.
    pub fn new(
        kid: impl Into<String>,
        material: KeyMaterial,
        algorithm: Algorithm,
    ) -> Result<Self, AuthError> {
        let kid = kid.into();
        match (&material, jwt::is_rsa(algorithm)) {
            (KeyMaterial::Hmac(secret), false) => {
                if !matches!(
                    algorithm,
                    Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
                ) {
                    return Err(AuthError::UnsupportedAlgorithm(format!("{algorithm:?}")));
                }
                let bytes = secret.expose_secret();
                let decoding = DecodingKey::from_secret(bytes);
                let encoding = Some(EncodingKey::from_secret(bytes));
                Ok(Key {
                    kid,
                    algorithm,
                    material,
                    decoding,
                    encoding,
                })
            }
            (
                KeyMaterial::Rsa {
                    private_pem,
                    public_pem,
                },
                true,
            ) => {
                let decoding = DecodingKey::from_rsa_pem(public_pem.as_bytes()).map_err(|e| {
                    AuthError::Crypto(format!("invalid RSA public key for kid '{kid}': {e}"))
                })?;
                let encoding = match private_pem {
                    Some(pem) => Some(EncodingKey::from_rsa_pem(pem.expose_secret()).map_err(
                        |e| {
                            AuthError::Crypto(format!(
                                "invalid RSA private key for kid '{kid}': {e}"
                            ))
                        },
                    )?),
                    None => None,
                };
                Ok(Key {
                    kid,
                    algorithm,
                    material,
                    decoding,
                    encoding,
                })
            }
            (KeyMaterial::Hmac(_), true) => Err(AuthError::Crypto(format!(
                "kid '{kid}': HMAC secret cannot back an RSA algorithm"
            ))),
            (KeyMaterial::Rsa { .. }, false) => Err(AuthError::Crypto(format!(
                "kid '{kid}': RSA keypair cannot back an HMAC algorithm"
            ))),
        }
    }

    /// Shorthand for an HS* key from a shared secret.
    pub fn from_secret(
        kid: impl Into<String>,
        secret: &[u8],
        algorithm: Algorithm,
    ) -> Result<Self, AuthError> {
        Key::new(kid, KeyMaterial::hmac(secret), algorithm)
    }

    /// Shorthand for an RS* key from PEM bytes, rejecting non-UTF-8
    /// public PEMs as corrupted.
    pub fn from_rsa_pem(
        kid: impl Into<String>,
        private_pem: Option<&[u8]>,
        public_pem: &[u8],
        algorithm: Algorithm,
    ) -> Result<Self, AuthError> {
        let kid = kid.into();
        let public_pem = String::from_utf8(public_pem.to_vec()).map_err(|_| {
            AuthError::Crypto(format!("RSA public key for kid '{kid}' is not valid UTF-8"))
        })?;
        Key::new(
            kid,
            KeyMaterial::rsa(private_pem.map(<[u8]>::to_vec), public_pem),
            algorithm,
        )
    }

    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// True when the key has no usable material and must never sign.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.material.is_empty()
    }

    /// The public PEM half, for RSA keys only.
    #[must_use]
    pub fn public_key_pem(&self) -> Option<&str> {
        match &self.material {
            KeyMaterial::Rsa { public_pem, .. } => Some(public_pem.as_str()),
            KeyMaterial::Hmac(_) => None,
        }
    }

    pub(crate) fn decoding(&self) -> &DecodingKey {
        &self.decoding
    }

    pub(crate) fn encoding(&self) -> Option<&EncodingKey> {
        self.encoding.as_ref()
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("material", &"[REDACTED]")
            .field("can_sign", &self.encoding.is_some())
            .finish()
    }
}

/// Keys indexed by kid plus the active-signer designation.
///
/// `set_active` does not validate presence: a dangling active kid is a
/// deployment defect that surfaces as `MisconfiguredActiveKey` at
/// signing time, not at load time.
#[derive(Debug, Default)]
pub struct KeyStore {
    keys: HashMap<String, Key>,
    active_kid: Option<String>,
}

impl KeyStore {
    #[must_use]
    pub fn new() -> Self {
        KeyStore::default()
    }

    #[must_use]
    pub fn get(&self, kid: &str) -> Option<&Key> {
        self.keys.get(kid)
    }

    /// The key currently designated for signing, if its kid resolves.
    #[must_use]
    pub fn active(&self) -> Option<&Key> {
        self.active_kid.as_deref().and_then(|kid| self.keys.get(kid))
    }

    /// The active key, or `MisconfiguredActiveKey` when unset/dangling.
    pub fn get_active(&self) -> Result<&Key, AuthError> {
        self.active().ok_or(AuthError::MisconfiguredActiveKey)
    }

    #[must_use]
    pub fn active_kid(&self) -> Option<&str> {
        self.active_kid.as_deref()
    }

    /// Insert or replace a key under its own kid.
    pub fn upsert(&mut self, key: Key) {
        self.keys.insert(key.kid().to_string(), key);
    }

    pub fn set_active(&mut self, kid: impl Into<String>) {
        self.active_kid = Some(kid.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = &Key> {
        self.keys.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The sole configured key, if there is exactly one. Fallback for
    /// single-key deployments that never set an active kid.
    pub(crate) fn single_key(&self) -> Option<&Key> {
        if self.keys.len() == 1 {
            self.keys.values().next()
        } else {
            None
        }
    }
}
