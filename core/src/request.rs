//! # Request Boundary
//!
//! The HTTP layer deals in loosely-typed payloads; the core does not.
//! Before a mutating request is allowed anywhere near the ledger it is
//! validated into the closed set of variants below. Anything that doesn't
//! fit is a validation error at the boundary, not a surprise inside the
//! critical section.
//!
//! The canonical request fingerprint also lives here: the blake3 hash of
//! the request's JSON form, excluding the idempotency key itself. Two
//! requests with the same key but different fingerprints are a key-reuse
//! bug and are rejected by the idempotency registry.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{MAX_IDEMPOTENCY_KEY_LENGTH, MAX_REFERENCE_LENGTH};
use crate::ledger::transaction::{EntryType, TransactionCategory};
use crate::money::{Amount, Currency};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Validation failures at the request boundary. Local, never retried.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Zero-amount mutations are a caller bug.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// An idempotency key was supplied but empty.
    #[error("idempotency key must not be empty")]
    EmptyIdempotencyKey,

    /// The idempotency key exceeds the storage bound.
    #[error("idempotency key exceeds {max} bytes (got {got})")]
    IdempotencyKeyTooLong {
        /// The configured maximum.
        max: usize,
        /// The rejected key's length.
        got: usize,
    },

    /// The transaction reference is empty.
    #[error("transaction reference must not be empty")]
    EmptyReference,

    /// The transaction reference exceeds the storage bound.
    #[error("transaction reference exceeds {max} bytes (got {got})")]
    ReferenceTooLong {
        /// The configured maximum.
        max: usize,
        /// The rejected reference's length.
        got: usize,
    },
}

// ---------------------------------------------------------------------------
// MutationKind
// ---------------------------------------------------------------------------

/// The closed set of mutating operations the platform supports.
///
/// Each variant carries only what the ledger needs to categorize the
/// journal row; provider-specific detail (biller payloads, bank routing)
/// stays in the feature modules that own it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MutationKind {
    /// Peer transfer: debit this wallet in favor of another platform user.
    Transfer {
        /// The receiving wallet.
        counterparty: Uuid,
    },
    /// Bill payment (electricity, TV, airtime, data).
    BillPayment {
        /// Platform biller identifier.
        biller_code: String,
    },
    /// Withdrawal to an external bank account.
    Withdrawal {
        /// Opaque destination handle resolved upstream.
        destination: String,
    },
    /// Deposit from an external funding source.
    Deposit {
        /// Opaque source handle resolved upstream.
        source: String,
    },
    /// Conversion from this wallet's currency into a platform token.
    TokenConversion {
        /// The currency being bought.
        target_currency: Currency,
    },
}

impl MutationKind {
    /// Which direction this operation moves the wallet's balance.
    pub fn entry_type(&self) -> EntryType {
        match self {
            Self::Deposit { .. } => EntryType::Credit,
            Self::Transfer { .. }
            | Self::BillPayment { .. }
            | Self::Withdrawal { .. }
            | Self::TokenConversion { .. } => EntryType::Debit,
        }
    }

    /// The journal category for this operation.
    pub fn category(&self) -> TransactionCategory {
        match self {
            Self::Transfer { .. } => TransactionCategory::Transfer,
            Self::BillPayment { .. } => TransactionCategory::BillPayment,
            Self::Withdrawal { .. } => TransactionCategory::Withdrawal,
            Self::Deposit { .. } => TransactionCategory::Deposit,
            Self::TokenConversion { .. } => TransactionCategory::TokenConversion,
        }
    }

    /// The route name the lock guard gates on.
    pub fn route(&self) -> &'static str {
        match self {
            Self::Transfer { .. } => "wallet/transfer",
            Self::BillPayment { .. } => "wallet/bill-payment",
            Self::Withdrawal { .. } => "wallet/withdraw",
            Self::Deposit { .. } => "wallet/deposit",
            Self::TokenConversion { .. } => "wallet/convert",
        }
    }
}

// ---------------------------------------------------------------------------
// MutationRequest
// ---------------------------------------------------------------------------

/// A fully-typed mutating request, as handed to the processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRequest {
    /// The authenticated actor, resolved upstream.
    pub actor_id: Uuid,

    /// The wallet being mutated.
    pub wallet_id: Uuid,

    /// What the actor is doing.
    pub kind: MutationKind,

    /// How much.
    pub amount: Amount,

    /// Caller-supplied unique transaction reference.
    pub reference: String,

    /// Client-supplied idempotency key. Mandatory on every mutating
    /// endpoint; `None` is a hard rejection in the processor.
    pub idempotency_key: Option<String>,
}

/// The fields that define a request's identity for fingerprinting.
///
/// The idempotency key is deliberately excluded: the fingerprint exists to
/// detect the *same key* carrying a *different request*.
#[derive(Serialize)]
struct FingerprintView<'a> {
    actor_id: &'a Uuid,
    wallet_id: &'a Uuid,
    kind: &'a MutationKind,
    amount: &'a Amount,
    reference: &'a str,
}

impl MutationRequest {
    /// Validates boundary constraints.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.amount.is_zero() {
            return Err(RequestError::ZeroAmount);
        }
        if let Some(key) = &self.idempotency_key {
            if key.is_empty() {
                return Err(RequestError::EmptyIdempotencyKey);
            }
            if key.len() > MAX_IDEMPOTENCY_KEY_LENGTH {
                return Err(RequestError::IdempotencyKeyTooLong {
                    max: MAX_IDEMPOTENCY_KEY_LENGTH,
                    got: key.len(),
                });
            }
        }
        if self.reference.is_empty() {
            return Err(RequestError::EmptyReference);
        }
        if self.reference.len() > MAX_REFERENCE_LENGTH {
            return Err(RequestError::ReferenceTooLong {
                max: MAX_REFERENCE_LENGTH,
                got: self.reference.len(),
            });
        }
        Ok(())
    }

    /// Computes the canonical blake3 fingerprint, hex-encoded.
    ///
    /// Serialization of a struct is field-ordered, so the same request
    /// always produces the same bytes regardless of how the client
    /// ordered its JSON.
    pub fn fingerprint(&self) -> String {
        let view = FingerprintView {
            actor_id: &self.actor_id,
            wallet_id: &self.wallet_id,
            kind: &self.kind,
            amount: &self.amount,
            reference: &self.reference,
        };
        let bytes = serde_json::to_vec(&view).expect("fingerprint view serializes");
        hex::encode(blake3::hash(&bytes).as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
