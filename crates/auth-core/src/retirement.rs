//! Retired-key grace tracking
//!
//! Maps each retired kid to the instant its grace period ends. A kid is
//! trusted through the deadline itself; only strictly after it do tokens
//! under that kid start failing with `RetiredKey`. Absence means "not
//! known to be retired", so unknown kids are judged on their signature
//! alone.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Grace deadlines for retired signing keys.
///
/// Entries are never removed implicitly; call [`prune_expired`] from an
/// operator path if the map must be bounded. Note that pruning makes the
/// kid unknown again rather than rejected.
///
/// [`prune_expired`]: RetirementTracker::prune_expired
#[derive(Debug, Default)]
pub struct RetirementTracker {
    retired: HashMap<String, DateTime<Utc>>,
}

impl RetirementTracker {
    #[must_use]
    pub fn new() -> Self {
        RetirementTracker::default()
    }

    /// Record (or move) the grace deadline for a kid.
    pub fn mark(&mut self, kid: impl Into<String>, retire_at: DateTime<Utc>) {
        let kid = kid.into();
        tracing::debug!(
            target: "auth.keys",
            kid = %kid,
            retire_at = %retire_at,
            "marking key retired"
        );
        self.retired.insert(kid, retire_at);
    }

    /// True only when the kid is tracked and `now` is strictly past its
    /// deadline.
    #[must_use]
    pub fn is_expired(&self, kid: &str, now: DateTime<Utc>) -> bool {
        match self.retired.get(kid) {
            Some(retire_at) => now > *retire_at,
            None => false,
        }
    }

    /// The grace deadline for a kid, if it is tracked.
    #[must_use]
    pub fn retire_at(&self, kid: &str) -> Option<DateTime<Utc>> {
        self.retired.get(kid).copied()
    }

    /// Forget a kid's retirement entirely, returning its former
    /// deadline. Used when a retired kid becomes the active signer
    /// again: a key cannot be both the designated signer and retired.
    pub fn clear(&mut self, kid: &str) -> Option<DateTime<Utc>> {
        self.retired.remove(kid)
    }

    /// Drop entries whose deadline is strictly before `now`; returns how
    /// many were removed.
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.retired.len();
        self.retired.retain(|_, retire_at| *retire_at >= now);
        before - self.retired.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.retired.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.retired.is_empty()
    }
}
