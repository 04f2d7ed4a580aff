//! Shared key-management handle
//!
//! `KeyService` owns the single lock over the key store and the
//! retirement tracker, so rotation swaps the active signer and starts the
//! old key's grace clock in one atomic step, and no reader can observe an
//! active kid without its key. Every time-dependent operation has an
//! `*_at(now)` variant so tests never sleep.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::Algorithm;
use secrecy::ExposeSecret;
use std::fs;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::AuthConfig;
use crate::errors::AuthError;
use crate::jwt;
use crate::keystore::{Key, KeyMaterial, KeyStore};
use crate::retirement::RetirementTracker;

/// Everything guarded by the one lock.
#[derive(Debug, Default)]
pub(crate) struct KeyState {
    pub(crate) store: KeyStore,
    pub(crate) retirement: RetirementTracker,
}

/// A publishable verifying key: kid, algorithm, and the public PEM half.
/// Symmetric keys are never published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyingKey {
    pub kid: String,
    pub algorithm: Algorithm,
    pub public_key_pem: String,
}

/// Cloneable handle to the shared key state. Clones share the same
/// underlying store, so a rotation through one handle is visible to all.
#[derive(Debug, Clone)]
pub struct KeyService {
    inner: Arc<RwLock<KeyState>>,
    default_grace: Duration,
}

impl Default for KeyService {
    fn default() -> Self {
        KeyService::new()
    }
}

impl KeyService {
    /// An empty service with the stock one-hour grace period. The first
    /// `rotate` call seeds the initial key.
    #[must_use]
    pub fn new() -> Self {
        KeyService {
            inner: Arc::new(RwLock::new(KeyState::default())),
            default_grace: Duration::seconds(crate::config::DEFAULT_ROTATION_GRACE_PERIOD_SECONDS),
        }
    }

    /// Seed the store from configuration.
    ///
    /// Symmetric mode loads `JWT_KEYS` (falling back to the legacy
    /// `JWT_SECRET_KEY` under kid `default`); RSA mode reads the PEM
    /// files once, here. When no active kid is configured but exactly one
    /// key is present, that key becomes active.
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let mut store = KeyStore::new();

        if jwt::is_rsa(config.algorithm) {
            let public_path = config.public_key_path.as_ref().ok_or_else(|| {
                AuthError::Crypto("JWT_PUBLIC_KEY_PATH is required for RS* algorithms".to_string())
            })?;
            let public_pem = fs::read(public_path).map_err(|e| {
                AuthError::Crypto(format!("failed to read '{}': {e}", public_path.display()))
            })?;
            let private_pem = match &config.private_key_path {
                Some(path) => Some(fs::read(path).map_err(|e| {
                    AuthError::Crypto(format!("failed to read '{}': {e}", path.display()))
                })?),
                None => None,
            };
            let kid = config
                .active_kid
                .clone()
                .unwrap_or_else(|| "default".to_string());
            store.upsert(Key::from_rsa_pem(
                kid,
                private_pem.as_deref(),
                &public_pem,
                config.algorithm,
            )?);
        } else {
            for (kid, secret) in &config.keys {
                store.upsert(Key::from_secret(
                    kid.clone(),
                    secret.expose_secret().as_bytes(),
                    config.algorithm,
                )?);
            }
            if store.is_empty() {
                if let Some(secret) = &config.secret_key {
                    store.upsert(Key::from_secret(
                        "default",
                        secret.expose_secret().as_bytes(),
                        config.algorithm,
                    )?);
                }
            }
        }

        if let Some(kid) = &config.active_kid {
            store.set_active(kid.clone());
        } else {
            let sole = store.single_key().map(|key| key.kid().to_string());
            if let Some(kid) = sole {
                store.set_active(kid);
            }
        }

        tracing::info!(
            target: "auth.keys",
            keys = store.len(),
            active_kid = store.active_kid().unwrap_or("<none>"),
            algorithm = jwt::algorithm_name(config.algorithm),
            "key store loaded"
        );

        Ok(KeyService {
            inner: Arc::new(RwLock::new(KeyState {
                store,
                retirement: RetirementTracker::new(),
            })),
            default_grace: config.rotation_grace_period,
        })
    }

    // Lock poisoning is recovered rather than propagated: state mutation
    // happens on owned values before insertion, so a panicking writer
    // cannot leave the maps half-written.
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, KeyState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, KeyState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rotate using the configured default grace period.
    pub fn rotate(
        &self,
        new_kid: &str,
        material: KeyMaterial,
        algorithm: Algorithm,
    ) -> Result<(), AuthError> {
        self.rotate_at(new_kid, material, algorithm, self.default_grace, Utc::now())
    }

    /// Rotate with an explicit grace period.
    pub fn rotate_with_grace(
        &self,
        new_kid: &str,
        material: KeyMaterial,
        algorithm: Algorithm,
        grace_period: Duration,
    ) -> Result<(), AuthError> {
        self.rotate_at(new_kid, material, algorithm, grace_period, Utc::now())
    }

    /// Make `new_kid` the active signer and start the previous active
    /// kid's grace clock at `now + grace_period`.
    ///
    /// Rotating to the kid that is already active is a no-op for
    /// retirement: the key never distrusts itself. Key construction
    /// happens before the write lock is taken, so a bad PEM or an
    /// unsupported algorithm leaves the store untouched.
    pub fn rotate_at(
        &self,
        new_kid: &str,
        material: KeyMaterial,
        algorithm: Algorithm,
        grace_period: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let key = Key::new(new_kid, material, algorithm)?;

        let mut state = self.write();
        let old_kid = state.store.active_kid().map(str::to_string);
        state.store.upsert(key);
        state.store.set_active(new_kid);

        // Rotating back to a previously retired kid reinstates it; its
        // stale deadline must not outlive its return to active duty.
        if state.retirement.clear(new_kid).is_some() {
            tracing::info!(
                target: "auth.keys",
                kid = new_kid,
                "previously retired key reinstated as active signer"
            );
        }

        let retire_at = now + grace_period;
        if let Some(old) = &old_kid {
            if old != new_kid {
                state.retirement.mark(old.clone(), retire_at);
            }
        }

        tracing::info!(
            target: "auth.keys",
            new_kid,
            old_kid = old_kid.as_deref().unwrap_or("<none>"),
            grace_seconds = grace_period.num_seconds(),
            retire_at = %retire_at,
            "signing key rotated"
        );
        Ok(())
    }

    /// Verifying keys publishable right now.
    #[must_use]
    pub fn get_verifying_keys(&self) -> Vec<VerifyingKey> {
        self.get_verifying_keys_at(Utc::now())
    }

    /// Verifying keys publishable at `now`: every RSA key whose kid is
    /// not past its grace deadline. Sorted by kid for stable output.
    #[must_use]
    pub fn get_verifying_keys_at(&self, now: DateTime<Utc>) -> Vec<VerifyingKey> {
        let state = self.read();
        let mut keys: Vec<VerifyingKey> = state
            .store
            .iter()
            .filter(|key| !state.retirement.is_expired(key.kid(), now))
            .filter_map(|key| {
                key.public_key_pem().map(|pem| VerifyingKey {
                    kid: key.kid().to_string(),
                    algorithm: key.algorithm(),
                    public_key_pem: pem.to_string(),
                })
            })
            .collect();
        keys.sort_by(|a, b| a.kid.cmp(&b.kid));
        keys
    }

    /// Drop retirement entries whose grace deadline is already past.
    /// Never called implicitly; a pruned kid becomes unknown, not
    /// rejected.
    pub fn prune_retired_at(&self, now: DateTime<Utc>) -> usize {
        self.write().retirement.prune_expired(now)
    }

    #[must_use]
    pub fn active_kid(&self) -> Option<String> {
        self.read().store.active_kid().map(str::to_string)
    }

    /// The grace deadline for a kid, if it has been retired.
    #[must_use]
    pub fn retirement_deadline(&self, kid: &str) -> Option<DateTime<Utc>> {
        self.read().retirement.retire_at(kid)
    }

    #[must_use]
    pub fn key_count(&self) -> usize {
        self.read().store.len()
    }
}
