//! # Mutation Processor
//!
//! The sanctioned pipeline for every mutating financial request:
//!
//! ```text
//! request ──► lock guard ──► idempotency begin ──► ledger engine ──► idempotency end
//!              (reject          (replay stored        (limits inside      (persist
//!               if locked)       outcome)              the atomic          outcome)
//!                                                      section)
//! ```
//!
//! The processor owns the coordination, not the rules: the guard decides
//! who may ask, the registry decides whether this request already ran,
//! and the engine decides whether the money moves. Business failures are
//! finalized into the registry so a retry replays the rejection instead
//! of re-executing it; a lock timeout abandons the claim so the retry --
//! with the **same** key -- gets a fresh execution.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, ErrorCode};
use crate::guard::lockout::AccountLockGuard;
use crate::idempotency::{BeginOutcome, IdempotencyRegistry, IdempotencyStatus};
use crate::ledger::engine::{LedgerEngine, LedgerError};
use crate::ledger::transaction::Transaction;
use crate::request::MutationRequest;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// A successful mutation, fresh or replayed.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    /// The journal row the mutation produced (or originally produced,
    /// for a replay).
    pub transaction: Transaction,

    /// `true` when this outcome was served from the idempotency registry
    /// instead of executing. The response body is otherwise identical to
    /// the original.
    pub replayed: bool,
}

/// The serialized form of an outcome stored in the idempotency registry.
#[derive(Debug, Serialize, Deserialize)]
struct StoredResult {
    /// Present for completed mutations.
    transaction: Option<Transaction>,
    /// Present for rejected mutations.
    error_code: Option<ErrorCode>,
    /// Present for rejected mutations.
    error_message: Option<String>,
}

impl StoredResult {
    fn completed(transaction: &Transaction) -> Self {
        Self {
            transaction: Some(transaction.clone()),
            error_code: None,
            error_message: None,
        }
    }

    fn failed(error: &CoreError) -> Self {
        Self {
            transaction: None,
            error_code: Some(error.code()),
            error_message: Some(error.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// MutationProcessor
// ---------------------------------------------------------------------------

/// Coordinates the guard, registry, and engine for one deployment.
///
/// Clone-free: share via `Arc`. All three collaborators are injected so
/// tests assemble isolated pipelines.
pub struct MutationProcessor {
    ledger: Arc<LedgerEngine>,
    registry: Arc<IdempotencyRegistry>,
    guard: Arc<AccountLockGuard>,
}

impl MutationProcessor {
    /// Wires a processor from its collaborators.
    pub fn new(
        ledger: Arc<LedgerEngine>,
        registry: Arc<IdempotencyRegistry>,
        guard: Arc<AccountLockGuard>,
    ) -> Self {
        Self {
            ledger,
            registry,
            guard,
        }
    }

    /// Runs one mutating request through the full pipeline.
    ///
    /// # Errors
    ///
    /// Everything in the [`CoreError`] taxonomy. Only
    /// [`ErrorCode::LockTimeout`] is retryable, and the retry must carry
    /// the same idempotency key.
    pub fn process(&self, request: &MutationRequest) -> Result<MutationOutcome, CoreError> {
        request.validate()?;

        let key = request
            .idempotency_key
            .as_deref()
            .ok_or(CoreError::IdempotencyKeyMissing)?;

        // Gate: a locked subject is turned away before any other work.
        if let Err(lock) = self.guard.check(request.actor_id, request.kind.route()) {
            return Err(CoreError::AccountLocked {
                reason: lock.reason,
                unlock_at: lock.expires_at,
            });
        }

        let fingerprint = request.fingerprint();
        match self.registry.begin(request.actor_id, key, &fingerprint)? {
            BeginOutcome::Replay(record) => {
                tracing::debug!(
                    actor_id = %request.actor_id,
                    key = key,
                    "serving stored idempotent outcome"
                );
                Self::replay(record.payload)
            }
            BeginOutcome::Fresh => self.execute(request, key),
        }
    }

    /// Executes a fresh mutation and finalizes the registry record.
    fn execute(&self, request: &MutationRequest, key: &str) -> Result<MutationOutcome, CoreError> {
        let result = self.ledger.apply_mutation(
            request.wallet_id,
            request.kind.entry_type(),
            request.amount.clone(),
            request.kind.category(),
            &request.reference,
        );

        match result {
            Ok(transaction) => {
                let stored = serde_json::to_value(StoredResult::completed(&transaction))
                    .map_err(|e| CoreError::Internal(format!("serializing outcome: {}", e)))?;
                self.registry
                    .end(request.actor_id, key, stored, IdempotencyStatus::Completed);
                Ok(MutationOutcome {
                    transaction,
                    replayed: false,
                })
            }
            Err(LedgerError::LockTimeout { wallet_id }) => {
                // Infrastructure failure: nothing executed, so release the
                // claim. The caller retries with the same key and gets a
                // fresh run.
                self.registry.abandon(request.actor_id, key);
                Err(LedgerError::LockTimeout { wallet_id }.into())
            }
            Err(ledger_error) => {
                let core_error: CoreError = ledger_error.into();
                match serde_json::to_value(StoredResult::failed(&core_error)) {
                    Ok(stored) => self.registry.end(
                        request.actor_id,
                        key,
                        stored,
                        IdempotencyStatus::Failed,
                    ),
                    Err(e) => {
                        // Storage of the failure is best-effort; losing it
                        // means a retry re-runs the same rejection.
                        tracing::error!(error = %e, "failed to store rejection outcome");
                        self.registry.abandon(request.actor_id, key);
                    }
                }
                Err(core_error)
            }
        }
    }

    /// Reconstructs an outcome from a stored registry payload.
    fn replay(payload: Option<serde_json::Value>) -> Result<MutationOutcome, CoreError> {
        let payload = payload
            .ok_or_else(|| CoreError::Internal("stored outcome has no payload".to_string()))?;
        let stored: StoredResult = serde_json::from_value(payload)
            .map_err(|e| CoreError::Internal(format!("decoding stored outcome: {}", e)))?;

        if let Some(transaction) = stored.transaction {
            return Ok(MutationOutcome {
                transaction,
                replayed: true,
            });
        }

        Err(CoreError::ReplayedFailure {
            code: stored.error_code.unwrap_or(ErrorCode::Internal),
            message: stored
                .error_message
                .unwrap_or_else(|| "stored failure had no message".to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
