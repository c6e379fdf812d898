//! # Account Lock Guard
//!
//! The gate every mutating operation passes before it is allowed to touch
//! money. An account lock is subject-scoped (the user), distinct from the
//! wallet-level lock inside the ledger: the guard stops a user at the
//! front door, the wallet lock stops one specific balance.
//!
//! ## Lifecycle
//!
//! ```text
//!    UNLOCKED ──(threshold breach / admin)──► LOCKED
//!    LOCKED ──(expiry / explicit unlock)────► UNLOCKED
//! ```
//!
//! Re-locking an already-locked subject overwrites the expiry and reason
//! rather than stacking a second lock. Expired locks are released lazily
//! on the next query (and by the node's maintenance sweep); released locks
//! move to an append-only history for audit.
//!
//! A small allow-list of routes bypasses the gate so a locked user can
//! still reach support.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::config::LOCK_BYPASS_ROUTES;

// ---------------------------------------------------------------------------
// AccountLock
// ---------------------------------------------------------------------------

/// One lock on a subject, active or historical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLock {
    /// The locked subject (user id).
    pub subject_id: Uuid,

    /// Why the subject was locked.
    pub reason: String,

    /// When the lock was applied. Re-locks keep the original instant.
    pub locked_at: DateTime<Utc>,

    /// When the lock self-releases. `None` means indefinite -- only an
    /// explicit unlock clears it.
    pub expires_at: Option<DateTime<Utc>>,

    /// Who released the lock (admin handle or `"system:expiry"`),
    /// populated when it moves to history.
    pub unlocked_by: Option<String>,

    /// When the lock was released.
    pub unlocked_at: Option<DateTime<Utc>>,
}

impl AccountLock {
    /// Returns `true` if the lock is past its expiry as of `now`.
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expiry) if expiry <= now)
    }
}

// ---------------------------------------------------------------------------
// AccountLockGuard
// ---------------------------------------------------------------------------

/// Concurrent lock store consulted before every mutating operation.
///
/// Process-wide singleton. The authentication layer calls
/// [`check`](Self::check); the abuse tracker and the admin interface call
/// [`lock`](Self::lock) / [`unlock`](Self::unlock).
pub struct AccountLockGuard {
    /// At most one active lock per subject.
    active: DashMap<Uuid, AccountLock>,

    /// Released locks, retained for audit.
    history: RwLock<Vec<AccountLock>>,

    /// Routes a locked subject may still reach.
    bypass_routes: HashSet<String>,
}

impl AccountLockGuard {
    /// Creates a guard with the default bypass allow-list.
    pub fn new() -> Self {
        Self::with_bypass_routes(LOCK_BYPASS_ROUTES.iter().map(|r| r.to_string()))
    }

    /// Creates a guard with a custom bypass allow-list.
    pub fn with_bypass_routes(routes: impl IntoIterator<Item = String>) -> Self {
        Self {
            active: DashMap::new(),
            history: RwLock::new(Vec::new()),
            bypass_routes: routes.into_iter().collect(),
        }
    }

    /// Locks a subject, or overwrites the expiry/reason of an existing
    /// lock. `duration: None` locks indefinitely.
    ///
    /// Returns a snapshot of the applied lock.
    pub fn lock(
        &self,
        subject_id: Uuid,
        reason: &str,
        duration: Option<Duration>,
    ) -> AccountLock {
        let now = Utc::now();
        let expires_at = duration.map(|d| now + d);

        let mut entry = self.active.entry(subject_id).or_insert_with(|| AccountLock {
            subject_id,
            reason: reason.to_string(),
            locked_at: now,
            expires_at,
            unlocked_by: None,
            unlocked_at: None,
        });

        // Re-lock: keep the original locked_at, overwrite the rest.
        entry.reason = reason.to_string();
        entry.expires_at = expires_at;
        let snapshot = entry.clone();
        drop(entry);

        tracing::warn!(
            subject_id = %subject_id,
            reason = reason,
            expires_at = ?snapshot.expires_at,
            "account locked"
        );
        snapshot
    }

    /// Explicitly releases a subject's lock.
    ///
    /// Returns the released lock, or `None` if the subject wasn't locked.
    pub fn unlock(&self, subject_id: Uuid, unlocked_by: &str) -> Option<AccountLock> {
        let (_, mut lock) = self.active.remove(&subject_id)?;
        lock.unlocked_by = Some(unlocked_by.to_string());
        lock.unlocked_at = Some(Utc::now());
        self.history.write().push(lock.clone());

        tracing::info!(subject_id = %subject_id, by = unlocked_by, "account unlocked");
        Some(lock)
    }

    /// Returns the subject's active lock, releasing it lazily if expired.
    pub fn active_lock(&self, subject_id: Uuid) -> Option<AccountLock> {
        let now = Utc::now();
        let expired = match self.active.get(&subject_id) {
            Some(lock) if lock.is_expired(now) => true,
            Some(lock) => return Some(lock.clone()),
            None => return None,
        };

        if expired {
            // Move to history outside the map reference to avoid holding
            // a shard guard across the history lock.
            if let Some((_, mut lock)) = self.active.remove(&subject_id) {
                lock.unlocked_by = Some("system:expiry".to_string());
                lock.unlocked_at = Some(now);
                self.history.write().push(lock);
            }
        }
        None
    }

    /// Returns `true` if the subject currently has an active lock.
    pub fn is_locked(&self, subject_id: Uuid) -> bool {
        self.active_lock(subject_id).is_some()
    }

    /// Gate check for a mutating request.
    ///
    /// `Ok(())` if the subject is unlocked or the route is on the bypass
    /// allow-list; otherwise the active lock, so the caller can surface
    /// the reason and unlock time.
    pub fn check(&self, subject_id: Uuid, route: &str) -> Result<(), AccountLock> {
        if self.bypass_routes.contains(route) {
            return Ok(());
        }
        match self.active_lock(subject_id) {
            Some(lock) => Err(lock),
            None => Ok(()),
        }
    }

    /// Releases every expired lock. Returns how many were released.
    /// Called by the node's maintenance loop; equivalent to the lazy
    /// release in [`active_lock`](Self::active_lock), just eager.
    pub fn release_expired(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<Uuid> = self
            .active
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| *entry.key())
            .collect();

        let mut released = 0;
        for subject_id in expired {
            if let Some((_, mut lock)) = self.active.remove(&subject_id) {
                lock.unlocked_by = Some("system:expiry".to_string());
                lock.unlocked_at = Some(now);
                self.history.write().push(lock);
                released += 1;
            }
        }
        released
    }

    /// Returns the number of active locks.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Returns a snapshot of the released-lock history.
    pub fn history(&self) -> Vec<AccountLock> {
        self.history.read().clone()
    }
}

impl Default for AccountLockGuard {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
