//! # Idempotency Registry
//!
//! Financial clients retry. Networks drop responses, mobile apps resubmit
//! on timeout, and load balancers deliver the same POST twice. The registry
//! guarantees that a retried mutating request produces exactly one
//! financial effect: the first arrival executes, every identical retry
//! replays the stored outcome.
//!
//! ## The Race That Matters
//!
//! Two identical retries can arrive within milliseconds of each other. A
//! read-then-write registry lets both observe "key absent" and both
//! execute -- the textbook double-spend. [`IdempotencyRegistry::begin`] is
//! therefore a **single atomic conditional insert** through the `DashMap`
//! entry API: exactly one caller wins the vacant slot, the loser sees the
//! winner's in-flight record. This race is the explicit target of the
//! burst tests in `tests/e2e.rs`.
//!
//! ## Key Reuse
//!
//! A key resubmitted with a *different* request fingerprint is a client
//! bug, never silently accepted: the caller gets a non-retryable conflict
//! and no mutation runs.
//!
//! Records carry a TTL and are swept by the node's maintenance loop; all
//! window arithmetic uses registry-generated timestamps, never
//! client-supplied ones.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::IdempotencyConfig;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by [`IdempotencyRegistry::begin`].
#[derive(Debug, Error)]
pub enum IdempotencyError {
    /// The same request is still executing. Transient: the caller should
    /// report "processing" and let the client poll or retry shortly.
    #[error("request with key {key} is still in flight")]
    InFlight {
        /// The contended idempotency key.
        key: String,
    },

    /// The key was reused with a different request payload. A client bug;
    /// non-retryable, and no mutation runs.
    #[error("idempotency key {key} was reused with a different payload")]
    KeyConflict {
        /// The misused idempotency key.
        key: String,
    },
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Lifecycle state of an idempotency record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdempotencyStatus {
    /// The first arrival is still executing.
    InFlight,
    /// The mutation completed; the stored payload is the success result.
    Completed,
    /// The mutation was rejected; the stored payload is the failure.
    Failed,
}

/// One stored (actor, key) outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// The authenticated actor the key is scoped to. Two actors using the
    /// same key string never collide.
    pub actor_id: Uuid,

    /// The client-supplied idempotency key.
    pub key: String,

    /// Blake3 fingerprint (hex) of the canonical request payload. Detects
    /// key reuse with a different request.
    pub fingerprint: String,

    /// The stored outcome, present once finalized.
    pub payload: Option<serde_json::Value>,

    /// Lifecycle state.
    pub status: IdempotencyStatus,

    /// When the first arrival claimed this key. Registry-generated.
    pub created_at: DateTime<Utc>,

    /// When this record becomes eligible for garbage collection.
    pub expires_at: DateTime<Utc>,
}

/// Outcome of [`IdempotencyRegistry::begin`].
#[derive(Debug, Clone)]
pub enum BeginOutcome {
    /// This caller won the slot and must execute the mutation, then call
    /// [`IdempotencyRegistry::end`] (or
    /// [`IdempotencyRegistry::abandon`] on a retryable infrastructure
    /// failure).
    Fresh,
    /// The key already resolved; re-serve the stored outcome and run no
    /// side effects.
    Replay(IdempotencyRecord),
}

// ---------------------------------------------------------------------------
// IdempotencyRegistry
// ---------------------------------------------------------------------------

/// Concurrent (actor, key) -> outcome store.
///
/// Process-wide singleton, injected where needed so tests build isolated
/// instances.
pub struct IdempotencyRegistry {
    /// Records keyed by the (actor, key) unique pair.
    records: DashMap<(Uuid, String), IdempotencyRecord>,

    /// Tunables.
    config: IdempotencyConfig,
}

impl IdempotencyRegistry {
    /// Creates an empty registry with the given configuration.
    pub fn new(config: IdempotencyConfig) -> Self {
        Self {
            records: DashMap::new(),
            config,
        }
    }

    /// Claims a key or replays its stored outcome.
    ///
    /// Single atomic conditional insert -- never read-then-write:
    ///
    /// - vacant slot ⇒ an `InFlight` record is inserted and the caller
    ///   gets [`BeginOutcome::Fresh`];
    /// - matching fingerprint, finalized ⇒ [`BeginOutcome::Replay`];
    /// - matching fingerprint, still in flight ⇒
    ///   [`IdempotencyError::InFlight`];
    /// - different fingerprint ⇒ [`IdempotencyError::KeyConflict`].
    ///
    /// An expired record is replaced as if the slot were vacant.
    pub fn begin(
        &self,
        actor_id: Uuid,
        key: &str,
        fingerprint: &str,
    ) -> Result<BeginOutcome, IdempotencyError> {
        let now = Utc::now();
        let fresh_record = IdempotencyRecord {
            actor_id,
            key: key.to_string(),
            fingerprint: fingerprint.to_string(),
            payload: None,
            status: IdempotencyStatus::InFlight,
            created_at: now,
            expires_at: now + self.config.record_ttl,
        };

        match self.records.entry((actor_id, key.to_string())) {
            Entry::Vacant(vacant) => {
                vacant.insert(fresh_record);
                Ok(BeginOutcome::Fresh)
            }
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get();

                // A record past its TTL no longer guards anything; the
                // slot is treated as vacant.
                if existing.expires_at <= now {
                    occupied.insert(fresh_record);
                    return Ok(BeginOutcome::Fresh);
                }

                if existing.fingerprint != fingerprint {
                    return Err(IdempotencyError::KeyConflict {
                        key: key.to_string(),
                    });
                }

                match existing.status {
                    IdempotencyStatus::InFlight => Err(IdempotencyError::InFlight {
                        key: key.to_string(),
                    }),
                    IdempotencyStatus::Completed | IdempotencyStatus::Failed => {
                        Ok(BeginOutcome::Replay(existing.clone()))
                    }
                }
            }
        }
    }

    /// Finalizes a claimed key with the mutation's outcome.
    ///
    /// Upserts: if the record was swept between `begin` and `end` (a TTL
    /// far shorter than a mutation would be a misconfiguration), the
    /// finalized record is stored anyway so later retries replay it.
    pub fn end(
        &self,
        actor_id: Uuid,
        key: &str,
        payload: serde_json::Value,
        status: IdempotencyStatus,
    ) {
        debug_assert!(
            status != IdempotencyStatus::InFlight,
            "end() finalizes; it cannot set InFlight"
        );
        let now = Utc::now();
        match self.records.entry((actor_id, key.to_string())) {
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                record.payload = Some(payload);
                record.status = status;
            }
            Entry::Vacant(vacant) => {
                tracing::warn!(key = key, "finalizing an idempotency record that was swept");
                vacant.insert(IdempotencyRecord {
                    actor_id,
                    key: key.to_string(),
                    fingerprint: String::new(),
                    payload: Some(payload),
                    status,
                    created_at: now,
                    expires_at: now + self.config.record_ttl,
                });
            }
        }
    }

    /// Releases a claimed key without storing an outcome.
    ///
    /// Used when the mutation failed with a retryable infrastructure error
    /// (lock timeout): nothing was written, so the retry with the same key
    /// must get a fresh execution, not an in-flight rejection.
    pub fn abandon(&self, actor_id: Uuid, key: &str) {
        self.records.remove(&(actor_id, key.to_string()));
    }

    /// Looks up a record without claiming anything.
    pub fn get(&self, actor_id: Uuid, key: &str) -> Option<IdempotencyRecord> {
        self.records
            .get(&(actor_id, key.to_string()))
            .map(|r| r.clone())
    }

    /// Garbage-collects records past their TTL. Returns how many were
    /// removed. Intended to be called periodically by the node's
    /// maintenance loop.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| record.expires_at > now);
        before - self.records.len()
    }

    /// Returns the number of live records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the registry holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for IdempotencyRegistry {
    fn default() -> Self {
        Self::new(IdempotencyConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
