//! Journal row types for the wallet ledger.
//!
//! A [`Transaction`] is the immutable record of one balance-affecting
//! mutation. Rows are created only by the ledger engine, inside the same
//! atomic section as the balance write. Once a row reaches `Completed` or
//! `Failed` its monetary fields never change; the single permitted
//! lifecycle transition after that point is `Completed -> Reversed`, made
//! by the reversal operation while it appends the compensating row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::money::Amount;

// ---------------------------------------------------------------------------
// EntryType
// ---------------------------------------------------------------------------

/// Which direction a journal row moves the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    /// Balance increases.
    Credit,
    /// Balance decreases.
    Debit,
}

impl EntryType {
    /// Returns the opposite direction, used when building compensating rows.
    pub fn inverse(&self) -> EntryType {
        match self {
            Self::Credit => Self::Debit,
            Self::Debit => Self::Credit,
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credit => write!(f, "CREDIT"),
            Self::Debit => write!(f, "DEBIT"),
        }
    }
}

// ---------------------------------------------------------------------------
// TransactionStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a journal row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Created but not yet settled. Short-lived in this core: every
    /// mutation settles inside its atomic section.
    Pending,
    /// Settled successfully. Monetary fields are frozen.
    Completed,
    /// Rejected by a business rule. Recorded for audit; the balance
    /// was never touched.
    Failed,
    /// A completed row that was later compensated by a reversal row.
    Reversed,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Reversed => write!(f, "REVERSED"),
        }
    }
}

// ---------------------------------------------------------------------------
// TransactionCategory
// ---------------------------------------------------------------------------

/// The product feature a journal row belongs to.
///
/// The ledger treats every category identically -- a debit is a debit.
/// The category exists so statements, disputes, and reconciliation can
/// tell an airtime purchase from a peer transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionCategory {
    /// Peer-to-peer transfer between platform wallets.
    Transfer,
    /// Bill payment (electricity, TV, airtime, data).
    BillPayment,
    /// Withdrawal to an external bank account.
    Withdrawal,
    /// Deposit from an external funding source.
    Deposit,
    /// Conversion between a fiat wallet and a platform token.
    TokenConversion,
    /// Compensating row written by a reversal.
    Reversal,
}

impl fmt::Display for TransactionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transfer => write!(f, "Transfer"),
            Self::BillPayment => write!(f, "BillPayment"),
            Self::Withdrawal => write!(f, "Withdrawal"),
            Self::Deposit => write!(f, "Deposit"),
            Self::TokenConversion => write!(f, "TokenConversion"),
            Self::Reversal => write!(f, "Reversal"),
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// One immutable journal row.
///
/// Invariant: for completed rows, `balance_after` equals `balance_before`
/// plus (credit) or minus (debit) `amount.value`, exactly. Failed rows
/// record `balance_after == balance_before` because the balance was never
/// touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Row identifier.
    pub id: Uuid,

    /// The wallet this row belongs to.
    pub wallet_id: Uuid,

    /// Caller-supplied unique reference, bound to the idempotency key of
    /// the request that produced this row.
    pub reference: String,

    /// Direction of the mutation.
    pub entry: EntryType,

    /// The mutation amount.
    pub amount: Amount,

    /// Spendable balance immediately before this row was applied.
    pub balance_before: u64,

    /// Spendable balance immediately after.
    pub balance_after: u64,

    /// Lifecycle state.
    pub status: TransactionStatus,

    /// Product feature that produced this row.
    pub category: TransactionCategory,

    /// For reversal rows: the row being compensated.
    pub reversed_from: Option<Uuid>,

    /// For failed rows: why the mutation was rejected.
    pub failure_reason: Option<String>,

    /// When the row was created. Store-generated, never client-supplied.
    pub created_at: DateTime<Utc>,

    /// When the row settled (completed or failed).
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Checks the balance arithmetic invariant.
    ///
    /// Used by tests and by the engine's debug assertions; a row that
    /// fails this check must never be appended to the journal.
    pub fn invariant_holds(&self) -> bool {
        match self.status {
            TransactionStatus::Failed => self.balance_after == self.balance_before,
            _ => match self.entry {
                EntryType::Credit => self
                    .balance_before
                    .checked_add(self.amount.value)
                    .map(|b| b == self.balance_after)
                    .unwrap_or(false),
                EntryType::Debit => self
                    .balance_before
                    .checked_sub(self.amount.value)
                    .map(|b| b == self.balance_after)
                    .unwrap_or(false),
            },
        }
    }

    /// Returns `true` once the row has settled and its monetary fields
    /// are frozen.
    pub fn is_final(&self) -> bool {
        !matches!(self.status, TransactionStatus::Pending)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
