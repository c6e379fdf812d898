//! # Error Taxonomy
//!
//! One closed vocabulary for everything that can go wrong in the core.
//! Module-level errors ([`LedgerError`], [`IdempotencyError`],
//! [`RequestError`]) stay rich and structured; this module folds them into
//! the [`CoreError`] surface the platform speaks, with a stable
//! [`ErrorCode`] per failure class and a single question callers actually
//! ask: *may I retry this?*
//!
//! Business-rule failures carry actionable detail verbatim (which window,
//! when it resets, why the account is locked). Only infrastructure
//! failures are retryable, and only by the original caller with the same
//! idempotency key -- nothing inside the core ever retries on its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::idempotency::IdempotencyError;
use crate::ledger::engine::LedgerError;
use crate::ledger::wallet::WalletError;
use crate::request::RequestError;

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Stable machine-readable failure classes.
///
/// These strings are API surface: clients branch on them, dashboards group
/// by them. Renaming one is a breaking change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Malformed or out-of-bounds input. Local, never auto-retried.
    Validation,
    /// The debit exceeds the spendable balance. Not retryable.
    InsufficientFunds,
    /// A tier spending window was breached. Not retryable until the
    /// window resets.
    LimitExceeded,
    /// The subject or wallet is locked.
    AccountLocked,
    /// A mutating endpoint was called without an idempotency key.
    IdempotencyKeyMissing,
    /// The same key was reused with a different payload. A client bug.
    IdempotencyKeyConflict,
    /// The same request is still executing; poll or retry shortly.
    RequestInFlight,
    /// The per-wallet lock could not be acquired in time. Retryable with
    /// the **same** idempotency key.
    LockTimeout,
    /// Unexpected failure. Logged with full context; no mutation was left
    /// half-applied.
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::LimitExceeded => "LIMIT_EXCEEDED",
            Self::AccountLocked => "ACCOUNT_LOCKED",
            Self::IdempotencyKeyMissing => "IDEMPOTENCY_KEY_MISSING",
            Self::IdempotencyKeyConflict => "IDEMPOTENCY_KEY_CONFLICT",
            Self::RequestInFlight => "REQUEST_IN_FLIGHT",
            Self::LockTimeout => "LOCK_TIMEOUT",
            Self::Internal => "INTERNAL_ERROR",
        };
        write!(f, "{}", code)
    }
}

// ---------------------------------------------------------------------------
// CoreError
// ---------------------------------------------------------------------------

/// The error surface of the wallet core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Boundary validation failed.
    #[error(transparent)]
    Validation(#[from] RequestError),

    /// A ledger operation was rejected.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The idempotency registry rejected the claim.
    #[error(transparent)]
    Idempotency(#[from] IdempotencyError),

    /// A mutating endpoint was called without an idempotency key.
    #[error("idempotency key is required on mutating endpoints")]
    IdempotencyKeyMissing,

    /// The actor's account is locked.
    #[error("account locked: {reason}")]
    AccountLocked {
        /// Why the account was locked.
        reason: String,
        /// When the lock self-releases, if it does.
        unlock_at: Option<DateTime<Utc>>,
    },

    /// A stored failure replayed from the idempotency registry. Identical
    /// in code and message to the original rejection; this variant *is*
    /// the replay marker.
    #[error("{message}")]
    ReplayedFailure {
        /// The original failure's code.
        code: ErrorCode,
        /// The original failure's message.
        message: String,
    },

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns the stable failure class for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::Validation,
            Self::Ledger(e) => match e {
                LedgerError::Wallet(WalletError::InsufficientFunds { .. }) => {
                    ErrorCode::InsufficientFunds
                }
                LedgerError::Wallet(WalletError::Locked { .. }) => ErrorCode::AccountLocked,
                LedgerError::Wallet(WalletError::Overflow { .. })
                | LedgerError::Wallet(WalletError::CurrencyMismatch { .. }) => {
                    ErrorCode::Validation
                }
                LedgerError::LimitExceeded { .. } => ErrorCode::LimitExceeded,
                LedgerError::LockTimeout { .. } => ErrorCode::LockTimeout,
                LedgerError::WalletNotFound(_)
                | LedgerError::DuplicateReference(_)
                | LedgerError::ReferenceNotFound(_)
                | LedgerError::NotReversible { .. }
                | LedgerError::ZeroAmount => ErrorCode::Validation,
            },
            Self::Idempotency(IdempotencyError::InFlight { .. }) => ErrorCode::RequestInFlight,
            Self::Idempotency(IdempotencyError::KeyConflict { .. }) => {
                ErrorCode::IdempotencyKeyConflict
            }
            Self::IdempotencyKeyMissing => ErrorCode::IdempotencyKeyMissing,
            Self::AccountLocked { .. } => ErrorCode::AccountLocked,
            Self::ReplayedFailure { code, .. } => *code,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Returns `true` if the original caller may retry this request.
    ///
    /// Only infrastructure failures qualify, and the retry must reuse the
    /// same idempotency key so an in-doubt first attempt replays instead
    /// of double-executing.
    pub fn is_retryable(&self) -> bool {
        matches!(self.code(), ErrorCode::LockTimeout)
    }

    /// Returns `true` if this error is a replay of a stored outcome.
    pub fn is_replayed(&self) -> bool {
        matches!(self, Self::ReplayedFailure { .. })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn codes_render_stably() {
        assert_eq!(ErrorCode::Validation.to_string(), "VALIDATION_ERROR");
        assert_eq!(ErrorCode::InsufficientFunds.to_string(), "INSUFFICIENT_FUNDS");
        assert_eq!(ErrorCode::LimitExceeded.to_string(), "LIMIT_EXCEEDED");
        assert_eq!(ErrorCode::LockTimeout.to_string(), "LOCK_TIMEOUT");
        assert_eq!(
            ErrorCode::IdempotencyKeyConflict.to_string(),
            "IDEMPOTENCY_KEY_CONFLICT"
        );
    }

    #[test]
    fn insufficient_funds_maps_through() {
        let err: CoreError = LedgerError::Wallet(WalletError::InsufficientFunds {
            wallet_id: Uuid::new_v4(),
            available: 100,
            requested: 500,
        })
        .into();
        assert_eq!(err.code(), ErrorCode::InsufficientFunds);
        assert!(!err.is_retryable());
    }

    #[test]
    fn only_lock_timeout_is_retryable() {
        let timeout: CoreError = LedgerError::LockTimeout {
            wallet_id: Uuid::new_v4(),
        }
        .into();
        assert!(timeout.is_retryable());

        let conflict: CoreError = IdempotencyError::KeyConflict {
            key: "k".to_string(),
        }
        .into();
        assert!(!conflict.is_retryable());

        let missing = CoreError::IdempotencyKeyMissing;
        assert!(!missing.is_retryable());
    }

    #[test]
    fn replayed_failure_preserves_the_original_code() {
        let err = CoreError::ReplayedFailure {
            code: ErrorCode::InsufficientFunds,
            message: "insufficient funds: available 100, requested 500".to_string(),
        };
        assert_eq!(err.code(), ErrorCode::InsufficientFunds);
        assert!(err.is_replayed());
        assert!(!err.is_retryable());
    }

    #[test]
    fn business_detail_survives_verbatim() {
        let err: CoreError = LedgerError::LimitExceeded {
            wallet_id: Uuid::new_v4(),
            window: crate::limits::LimitWindow::Daily,
            limit: 50_000,
            attempted: 50_001,
            resets_at: None,
        }
        .into();
        let message = err.to_string();
        assert!(message.contains("daily"));
        assert!(message.contains("50000"));
        assert!(message.contains("50001"));
    }

    #[test]
    fn error_code_serde_roundtrip() {
        let json = serde_json::to_string(&ErrorCode::LimitExceeded).unwrap();
        let recovered: ErrorCode = serde_json::from_str(&json).unwrap();
        assert_eq!(recovered, ErrorCode::LimitExceeded);
    }
}
