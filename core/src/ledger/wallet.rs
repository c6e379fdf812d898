//! # Wallet State
//!
//! A [`Wallet`] is a single-currency balance owned by one platform user,
//! together with the spend counters and lock flags the rest of the core
//! keys off. It is deliberately a dumb data holder with invariant-guarding
//! mutators: every mutation goes through the [ledger engine]'s per-wallet
//! serializing section, so the struct itself carries no synchronization.
//!
//! ## Balance Model
//!
//! `balance` is the spendable figure -- what a debit is checked against.
//! `ledger_balance` is the book figure derived from settled journal rows.
//! Because every mutation in this core settles inside its atomic section,
//! the two move in lockstep; they are kept as separate fields so that a
//! future holds/pending-settlement feature splits them without a migration.
//!
//! [ledger engine]: super::engine::LedgerEngine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::limits::{KycTier, SpendState, effective_spend};
use crate::money::Currency;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while mutating a wallet's balance.
#[derive(Debug, Error)]
pub enum WalletError {
    /// Attempted to debit more than the available balance.
    #[error(
        "insufficient funds: available {available}, requested {requested} (wallet {wallet_id})"
    )]
    InsufficientFunds {
        /// The wallet that was being debited.
        wallet_id: Uuid,
        /// The spendable balance at the time of the attempt.
        available: u64,
        /// The amount that was requested.
        requested: u64,
    },

    /// Arithmetic overflow during a credit.
    ///
    /// Nobody holds 18.4 quintillion kobo. This is either a bug or an attack.
    #[error("balance overflow: current {current}, credit {credit} (wallet {wallet_id})")]
    Overflow {
        /// The wallet that was being credited.
        wallet_id: Uuid,
        /// The balance before the failed credit.
        current: u64,
        /// The amount that caused the overflow.
        credit: u64,
    },

    /// The wallet is locked and cannot process mutations.
    #[error("wallet {wallet_id} is locked: {reason}")]
    Locked {
        /// The locked wallet.
        wallet_id: Uuid,
        /// Why it was locked.
        reason: String,
    },

    /// The mutation's currency does not match the wallet's denomination.
    #[error("currency mismatch: wallet {wallet_id} holds {wallet_currency}, got {requested}")]
    CurrencyMismatch {
        /// The target wallet.
        wallet_id: Uuid,
        /// The wallet's denomination.
        wallet_currency: Currency,
        /// The denomination of the rejected mutation.
        requested: Currency,
    },
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

/// A single-currency wallet owned by one platform user.
///
/// Created at wallet-open time, never hard-deleted. All fields are private:
/// the ledger engine is the only writer, and it reaches the mutators below
/// while holding the wallet's serializing lock.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Wallet {
    /// Wallet identifier.
    id: Uuid,

    /// The user who owns this wallet.
    owner_id: Uuid,

    /// Spendable balance in currency minor units. Never negative by
    /// construction -- debits are checked before they are applied.
    balance: u64,

    /// Book balance derived from settled journal rows.
    ledger_balance: u64,

    /// The wallet's denomination. Fixed at open time.
    currency: Currency,

    /// Identity-verification tier gating this wallet's spending limits.
    kyc_tier: KycTier,

    /// Total debits since the last daily rollover. Meaningful only
    /// relative to `last_reset_at`.
    daily_spent: u64,

    /// Total debits since the last monthly rollover.
    monthly_spent: u64,

    /// When the spend counters were last persisted.
    last_reset_at: DateTime<Utc>,

    /// If `true`, all mutations are rejected.
    is_locked: bool,

    /// Why the wallet is locked, when it is.
    locked_reason: Option<String>,

    /// When this wallet was opened.
    created_at: DateTime<Utc>,
}

impl Wallet {
    /// Opens a new empty wallet.
    pub fn new(owner_id: Uuid, currency: Currency, kyc_tier: KycTier) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            balance: 0,
            ledger_balance: 0,
            currency,
            kyc_tier,
            daily_spent: 0,
            monthly_spent: 0,
            last_reset_at: now,
            is_locked: false,
            locked_reason: None,
            created_at: now,
        }
    }

    /// Returns the wallet identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the owning user's identifier.
    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    /// Returns the spendable balance in minor units.
    pub fn balance(&self) -> u64 {
        self.balance
    }

    /// Returns the book balance in minor units.
    pub fn ledger_balance(&self) -> u64 {
        self.ledger_balance
    }

    /// Returns the wallet's denomination.
    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    /// Returns the wallet's KYC tier.
    pub fn kyc_tier(&self) -> KycTier {
        self.kyc_tier
    }

    /// Returns when this wallet was opened.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns `true` if the wallet is locked.
    pub fn is_locked(&self) -> bool {
        self.is_locked
    }

    /// Returns the lock reason, if the wallet is locked.
    pub fn locked_reason(&self) -> Option<&str> {
        self.locked_reason.as_deref()
    }

    /// Returns the raw spend counters for limit checks.
    pub fn spend_state(&self) -> SpendState {
        SpendState {
            daily_spent: self.daily_spent,
            monthly_spent: self.monthly_spent,
            last_reset_at: self.last_reset_at,
        }
    }

    // -----------------------------------------------------------------------
    // Mutators -- called only by the ledger engine, under the wallet lock
    // -----------------------------------------------------------------------

    /// Persists the lazy window rollover as of `now`.
    ///
    /// Counters whose window boundary has passed are zeroed and
    /// `last_reset_at` advances to `now`. Idempotent within a window.
    pub(crate) fn roll_windows(&mut self, now: DateTime<Utc>) {
        let (daily, monthly) = effective_spend(&self.spend_state(), now);
        self.daily_spent = daily;
        self.monthly_spent = monthly;
        self.last_reset_at = now;
    }

    /// Adds a completed debit to the spend counters.
    ///
    /// Must be called after [`roll_windows`](Self::roll_windows) inside the
    /// same atomic section as the balance write.
    pub(crate) fn record_spend(&mut self, amount: u64) {
        self.daily_spent = self.daily_spent.saturating_add(amount);
        self.monthly_spent = self.monthly_spent.saturating_add(amount);
    }

    /// Credits the wallet.
    ///
    /// # Errors
    ///
    /// [`WalletError::Overflow`] if the credit would exceed `u64::MAX`.
    pub(crate) fn credit(&mut self, amount: u64) -> Result<u64, WalletError> {
        let new_balance = self
            .balance
            .checked_add(amount)
            .ok_or(WalletError::Overflow {
                wallet_id: self.id,
                current: self.balance,
                credit: amount,
            })?;
        self.balance = new_balance;
        self.ledger_balance = self.ledger_balance.saturating_add(amount);
        Ok(new_balance)
    }

    /// Debits the wallet.
    ///
    /// # Errors
    ///
    /// [`WalletError::InsufficientFunds`] if `amount` exceeds the balance.
    pub(crate) fn debit(&mut self, amount: u64) -> Result<u64, WalletError> {
        if self.balance < amount {
            return Err(WalletError::InsufficientFunds {
                wallet_id: self.id,
                available: self.balance,
                requested: amount,
            });
        }
        self.balance -= amount;
        self.ledger_balance = self.ledger_balance.saturating_sub(amount);
        Ok(self.balance)
    }

    /// Rejects mutations in foreign denominations.
    pub(crate) fn check_currency(&self, requested: &Currency) -> Result<(), WalletError> {
        if &self.currency != requested {
            return Err(WalletError::CurrencyMismatch {
                wallet_id: self.id,
                wallet_currency: self.currency.clone(),
                requested: requested.clone(),
            });
        }
        Ok(())
    }

    /// Rejects mutations while the wallet-level lock is set.
    pub(crate) fn check_unlocked(&self) -> Result<(), WalletError> {
        if self.is_locked {
            return Err(WalletError::Locked {
                wallet_id: self.id,
                reason: self
                    .locked_reason
                    .clone()
                    .unwrap_or_else(|| "no reason recorded".to_string()),
            });
        }
        Ok(())
    }

    /// Sets the wallet-level lock.
    pub(crate) fn set_locked(&mut self, reason: &str) {
        self.is_locked = true;
        self.locked_reason = Some(reason.to_string());
    }

    /// Clears the wallet-level lock.
    pub(crate) fn set_unlocked(&mut self) {
        self.is_locked = false;
        self.locked_reason = None;
    }

    /// Raises the wallet's KYC tier after an off-core verification flow.
    pub(crate) fn set_kyc_tier(&mut self, tier: KycTier) {
        self.kyc_tier = tier;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
