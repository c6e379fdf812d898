//! # Ledger Engine -- Atomic Balance Mutation
//!
//! The engine is the only sanctioned writer of wallet balances. Every
//! feature module (transfers, bill payments, conversions) funnels through
//! [`LedgerEngine::apply_mutation`]; nothing else in the platform is allowed
//! to move money.
//!
//! ## Concurrency
//!
//! - Each wallet lives in its own `Arc<Mutex<Wallet>>` slot inside a
//!   `DashMap`. A mutation acquires the wallet's mutex with a bounded
//!   `try_lock_for`; two simultaneous debits on one wallet can never
//!   interleave, and a timeout surfaces as a retryable error instead of an
//!   unbounded queue.
//! - The lazy spend-window rollover, the limit check, the spend increment,
//!   the balance write, and the journal append all happen while the wallet
//!   mutex is held. There is no check-then-act gap for two requests to
//!   slip through.
//! - References are reserved through a single atomic `DashMap` entry
//!   insert, closing the race where two requests with the same reference
//!   both observe "absent".
//!
//! ## Failure Semantics
//!
//! Business-rule rejections (insufficient funds, limit exceeded, locked
//! wallet, currency mismatch) are journaled as `Failed` rows with the
//! balance untouched, then surfaced as non-retryable errors. A lock
//! timeout journals nothing and releases the reference reservation so the
//! caller can retry with the **same** idempotency key. Once a mutation is
//! inside its critical section it always runs to completion -- commit or
//! recorded failure -- and is never left half-applied.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::limits::{self, KycTier, LimitDecision, LimitWindow};
use crate::money::{Amount, Currency};

use super::transaction::{EntryType, Transaction, TransactionCategory, TransactionStatus};
use super::wallet::{Wallet, WalletError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The target wallet does not exist.
    #[error("wallet {0} not found")]
    WalletNotFound(Uuid),

    /// A wallet-level check failed (insufficient funds, overflow,
    /// locked wallet, currency mismatch).
    #[error(transparent)]
    Wallet(#[from] WalletError),

    /// A debit breached one of the tier's spending windows.
    #[error(
        "{window} limit exceeded: limit {limit}, attempted {attempted} (wallet {wallet_id})"
    )]
    LimitExceeded {
        /// The wallet that was denied.
        wallet_id: Uuid,
        /// The window that was breached.
        window: LimitWindow,
        /// The ceiling for that window.
        limit: u64,
        /// What the window's spend would have become.
        attempted: u64,
        /// When the window resets, if it ever does.
        resets_at: Option<DateTime<Utc>>,
    },

    /// The per-wallet serializing lock could not be acquired inside the
    /// configured bound. Retryable; retry with the same idempotency key.
    #[error("timed out waiting for wallet {wallet_id} lock")]
    LockTimeout {
        /// The contended wallet.
        wallet_id: Uuid,
    },

    /// A journal row with this reference already exists.
    #[error("duplicate transaction reference: {0}")]
    DuplicateReference(String),

    /// No journal row carries this reference.
    #[error("unknown transaction reference: {0}")]
    ReferenceNotFound(String),

    /// The referenced row is not in a reversible state.
    #[error("transaction {reference} is not reversible (status {status})")]
    NotReversible {
        /// The reference of the row that was targeted.
        reference: String,
        /// Its current status.
        status: TransactionStatus,
    },

    /// Zero-amount mutations are a caller bug, not a no-op.
    #[error("zero-amount mutations are not permitted")]
    ZeroAmount,
}

// ---------------------------------------------------------------------------
// LedgerEngine
// ---------------------------------------------------------------------------

/// Thread-safe wallet store plus append-only transaction journal.
///
/// Modeled as a process-wide singleton: construct once at startup, share
/// via `Arc`, inject into the components that need it so tests can build
/// their own isolated instances.
pub struct LedgerEngine {
    /// Wallet slots. The `Arc<Mutex<..>>` per slot is the serializing
    /// primitive scoped to the wallet identifier.
    wallets: DashMap<Uuid, Arc<Mutex<Wallet>>>,

    /// Append-only journal. Rows are immutable once settled, except for
    /// the `Completed -> Reversed` transition made by [`reverse`].
    ///
    /// [`reverse`]: Self::reverse
    journal: RwLock<Vec<Transaction>>,

    /// Unique-reference index: reference -> journal row id. Reserved
    /// atomically before the critical section begins.
    references: DashMap<String, Uuid>,

    /// Tunables.
    config: LedgerConfig,
}

impl LedgerEngine {
    /// Creates an empty engine with the given configuration.
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            wallets: DashMap::new(),
            journal: RwLock::new(Vec::new()),
            references: DashMap::new(),
            config,
        }
    }

    // -----------------------------------------------------------------------
    // Wallet lifecycle
    // -----------------------------------------------------------------------

    /// Opens a new wallet and returns a snapshot of it.
    pub fn open_wallet(&self, owner_id: Uuid, currency: Currency, tier: KycTier) -> Wallet {
        let wallet = Wallet::new(owner_id, currency, tier);
        let snapshot = wallet.clone();
        self.wallets.insert(wallet.id(), Arc::new(Mutex::new(wallet)));
        tracing::info!(wallet_id = %snapshot.id(), owner_id = %owner_id, "wallet opened");
        snapshot
    }

    /// Returns a point-in-time snapshot of a wallet.
    pub fn wallet_snapshot(&self, wallet_id: Uuid) -> Option<Wallet> {
        let slot = self.wallets.get(&wallet_id)?;
        let wallet = slot.lock();
        Some(wallet.clone())
    }

    /// Returns a wallet's spendable balance.
    pub fn get_balance(&self, wallet_id: Uuid) -> Result<u64, LedgerError> {
        let slot = self
            .wallets
            .get(&wallet_id)
            .ok_or(LedgerError::WalletNotFound(wallet_id))?;
        let balance = slot.lock().balance();
        Ok(balance)
    }

    /// Sets the wallet-level lock. Admin/compliance path.
    pub fn lock_wallet(&self, wallet_id: Uuid, reason: &str) -> Result<(), LedgerError> {
        let slot = self
            .wallets
            .get(&wallet_id)
            .ok_or(LedgerError::WalletNotFound(wallet_id))?;
        slot.lock().set_locked(reason);
        tracing::warn!(wallet_id = %wallet_id, reason = reason, "wallet locked");
        Ok(())
    }

    /// Clears the wallet-level lock.
    pub fn unlock_wallet(&self, wallet_id: Uuid) -> Result<(), LedgerError> {
        let slot = self
            .wallets
            .get(&wallet_id)
            .ok_or(LedgerError::WalletNotFound(wallet_id))?;
        slot.lock().set_unlocked();
        tracing::info!(wallet_id = %wallet_id, "wallet unlocked");
        Ok(())
    }

    /// Raises a wallet's KYC tier after an off-core verification flow.
    pub fn upgrade_tier(&self, wallet_id: Uuid, tier: KycTier) -> Result<(), LedgerError> {
        let slot = self
            .wallets
            .get(&wallet_id)
            .ok_or(LedgerError::WalletNotFound(wallet_id))?;
        slot.lock().set_kyc_tier(tier);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Applies one atomic balance mutation and returns the journal row.
    ///
    /// Preconditions: the amount is non-zero, the wallet exists and is
    /// unlocked, and a debit is covered by the balance and the tier's
    /// spending windows. The spend-window rollover and increment execute
    /// inside the same critical section as the balance write.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::LockTimeout`] -- retryable; nothing was written.
    /// - Every other variant is a non-retryable rejection. Business-rule
    ///   rejections additionally journal a `Failed` row for audit.
    pub fn apply_mutation(
        &self,
        wallet_id: Uuid,
        entry: EntryType,
        amount: Amount,
        category: TransactionCategory,
        reference: &str,
    ) -> Result<Transaction, LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }

        let slot = self
            .wallets
            .get(&wallet_id)
            .ok_or(LedgerError::WalletNotFound(wallet_id))?
            .clone();

        // Reserve the reference before entering the critical section. A
        // single atomic insert -- two requests carrying the same reference
        // cannot both observe "absent".
        match self.references.entry(reference.to_string()) {
            Entry::Occupied(_) => {
                return Err(LedgerError::DuplicateReference(reference.to_string()));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Uuid::nil());
            }
        }

        let mut wallet = match slot.try_lock_for(self.config.lock_timeout) {
            Some(guard) => guard,
            None => {
                // Nothing was written; free the reference so the retry
                // (same idempotency key) is not rejected as a duplicate.
                self.references.remove(reference);
                tracing::warn!(wallet_id = %wallet_id, "wallet lock timeout");
                return Err(LedgerError::LockTimeout { wallet_id });
            }
        };

        // ---- critical section -------------------------------------------
        let now = Utc::now();

        if let Err(e) = wallet.check_currency(&amount.currency) {
            return Err(self.reject(&wallet, entry, &amount, category, reference, e.into(), now));
        }
        if let Err(e) = wallet.check_unlocked() {
            return Err(self.reject(&wallet, entry, &amount, category, reference, e.into(), now));
        }

        // Persist the lazy window rollover, then gate debits on the tier
        // ceilings while we still hold the lock.
        wallet.roll_windows(now);

        if entry == EntryType::Debit {
            let decision =
                limits::check_limit(wallet.kyc_tier(), &wallet.spend_state(), amount.value, now);
            if let LimitDecision::Denied {
                window,
                limit,
                attempted,
                resets_at,
            } = decision
            {
                let err = LedgerError::LimitExceeded {
                    wallet_id,
                    window,
                    limit,
                    attempted,
                    resets_at,
                };
                return Err(self.reject(&wallet, entry, &amount, category, reference, err, now));
            }
        }

        let balance_before = wallet.balance();
        let mutated = match entry {
            EntryType::Credit => wallet.credit(amount.value),
            EntryType::Debit => wallet.debit(amount.value),
        };
        let balance_after = match mutated {
            Ok(b) => b,
            Err(e) => {
                return Err(self.reject(&wallet, entry, &amount, category, reference, e.into(), now));
            }
        };

        if entry == EntryType::Debit {
            wallet.record_spend(amount.value);
        }

        let tx = Transaction {
            id: Uuid::new_v4(),
            wallet_id,
            reference: reference.to_string(),
            entry,
            amount,
            balance_before,
            balance_after,
            status: TransactionStatus::Completed,
            category,
            reversed_from: None,
            failure_reason: None,
            created_at: now,
            completed_at: Some(now),
        };
        debug_assert!(tx.invariant_holds());

        self.references.insert(reference.to_string(), tx.id);
        self.journal.write().push(tx.clone());
        // ---- end critical section (wallet guard drops here) -------------

        tracing::debug!(
            wallet_id = %wallet_id,
            reference = reference,
            entry = %tx.entry,
            amount = %tx.amount,
            balance_after = balance_after,
            "mutation applied"
        );
        Ok(tx)
    }

    /// Journals a `Failed` row for a business-rule rejection and passes the
    /// error through. The balance was never touched; the row records what
    /// was attempted and why it bounced.
    fn reject(
        &self,
        wallet: &Wallet,
        entry: EntryType,
        amount: &Amount,
        category: TransactionCategory,
        reference: &str,
        error: LedgerError,
        now: DateTime<Utc>,
    ) -> LedgerError {
        let balance = wallet.balance();
        let tx = Transaction {
            id: Uuid::new_v4(),
            wallet_id: wallet.id(),
            reference: reference.to_string(),
            entry,
            amount: amount.clone(),
            balance_before: balance,
            balance_after: balance,
            status: TransactionStatus::Failed,
            category,
            reversed_from: None,
            failure_reason: Some(error.to_string()),
            created_at: now,
            completed_at: Some(now),
        };

        self.references.insert(reference.to_string(), tx.id);
        self.journal.write().push(tx);

        tracing::info!(
            wallet_id = %wallet.id(),
            reference = reference,
            error = %error,
            "mutation rejected"
        );
        error
    }

    // -----------------------------------------------------------------------
    // Reversal
    // -----------------------------------------------------------------------

    /// Reverses a completed mutation by appending a compensating row.
    ///
    /// The original row's monetary fields are untouched; its status makes
    /// the single permitted transition `Completed -> Reversed`. The
    /// compensating row carries the inverse entry type, the category
    /// [`TransactionCategory::Reversal`], a `<reference>/rev` reference,
    /// and a link back to the original.
    ///
    /// Spend counters are deliberately **not** refunded: a reversed debit
    /// does not hand back limit headroom. Conservative, and it keeps the
    /// counters monotonic within a window.
    pub fn reverse(&self, reference: &str) -> Result<Transaction, LedgerError> {
        let original_id = self
            .references
            .get(reference)
            .map(|r| *r.value())
            .ok_or_else(|| LedgerError::ReferenceNotFound(reference.to_string()))?;

        let original = self
            .journal
            .read()
            .iter()
            .find(|tx| tx.id == original_id)
            .cloned()
            .ok_or_else(|| LedgerError::ReferenceNotFound(reference.to_string()))?;

        let slot = self
            .wallets
            .get(&original.wallet_id)
            .ok_or(LedgerError::WalletNotFound(original.wallet_id))?
            .clone();

        let mut wallet = slot
            .try_lock_for(self.config.lock_timeout)
            .ok_or(LedgerError::LockTimeout {
                wallet_id: original.wallet_id,
            })?;

        // ---- critical section -------------------------------------------
        // Re-check the status under the wallet lock: two concurrent
        // reversals of the same row serialize here, and the loser sees
        // `Reversed`.
        let current_status = self
            .journal
            .read()
            .iter()
            .find(|tx| tx.id == original_id)
            .map(|tx| tx.status)
            .unwrap_or(TransactionStatus::Failed);
        if current_status != TransactionStatus::Completed {
            return Err(LedgerError::NotReversible {
                reference: reference.to_string(),
                status: current_status,
            });
        }

        let rev_reference = format!("{}/rev", reference);
        match self.references.entry(rev_reference.clone()) {
            Entry::Occupied(_) => {
                return Err(LedgerError::DuplicateReference(rev_reference));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Uuid::nil());
            }
        }

        let now = Utc::now();
        let inverse = original.entry.inverse();
        let balance_before = wallet.balance();
        let balance_after = match inverse {
            EntryType::Credit => wallet.credit(original.amount.value),
            EntryType::Debit => wallet.debit(original.amount.value),
        };
        let balance_after = match balance_after {
            Ok(b) => b,
            Err(e) => {
                // The compensation itself cannot be applied (e.g. the funds
                // from a reversed credit were already spent). No partial
                // write: release the reservation and surface the error.
                self.references.remove(&rev_reference);
                return Err(e.into());
            }
        };

        let compensating = Transaction {
            id: Uuid::new_v4(),
            wallet_id: original.wallet_id,
            reference: rev_reference.clone(),
            entry: inverse,
            amount: original.amount.clone(),
            balance_before,
            balance_after,
            status: TransactionStatus::Completed,
            category: TransactionCategory::Reversal,
            reversed_from: Some(original.id),
            failure_reason: None,
            created_at: now,
            completed_at: Some(now),
        };
        debug_assert!(compensating.invariant_holds());

        {
            let mut journal = self.journal.write();
            if let Some(row) = journal.iter_mut().find(|tx| tx.id == original_id) {
                row.status = TransactionStatus::Reversed;
            }
            journal.push(compensating.clone());
        }
        self.references.insert(rev_reference, compensating.id);
        // ---- end critical section ---------------------------------------

        tracing::info!(
            wallet_id = %original.wallet_id,
            reference = reference,
            "mutation reversed"
        );
        Ok(compensating)
    }

    // -----------------------------------------------------------------------
    // Journal access
    // -----------------------------------------------------------------------

    /// Returns all journal rows for a wallet, oldest first.
    pub fn transactions_for(&self, wallet_id: Uuid) -> Vec<Transaction> {
        self.journal
            .read()
            .iter()
            .filter(|tx| tx.wallet_id == wallet_id)
            .cloned()
            .collect()
    }

    /// Looks up a journal row by its unique reference.
    pub fn transaction_by_reference(&self, reference: &str) -> Option<Transaction> {
        let id = *self.references.get(reference)?.value();
        self.journal.read().iter().find(|tx| tx.id == id).cloned()
    }

    /// Recomputes a wallet's balance by folding its journal.
    ///
    /// Counts rows that were actually applied: `Completed` rows and
    /// `Reversed` rows (whose effect is undone by their compensating
    /// `Completed` row). `Pending` and `Failed` rows never touched the
    /// balance and are skipped. The result must equal
    /// [`get_balance`](Self::get_balance) -- the ledger is reconstructable.
    pub fn replay_balance(&self, wallet_id: Uuid) -> u64 {
        let journal = self.journal.read();
        let mut balance: i128 = 0;
        for tx in journal.iter().filter(|tx| tx.wallet_id == wallet_id) {
            match tx.status {
                TransactionStatus::Completed | TransactionStatus::Reversed => match tx.entry {
                    EntryType::Credit => balance += tx.amount.value as i128,
                    EntryType::Debit => balance -= tx.amount.value as i128,
                },
                TransactionStatus::Pending | TransactionStatus::Failed => {}
            }
        }
        debug_assert!(balance >= 0, "journal replay produced a negative balance");
        balance.max(0) as u64
    }

    /// Returns the number of open wallets.
    pub fn wallet_count(&self) -> usize {
        self.wallets.len()
    }

    /// Returns the number of journal rows.
    pub fn journal_len(&self) -> usize {
        self.journal.read().len()
    }
}

impl Default for LedgerEngine {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;

    fn engine() -> LedgerEngine {
        LedgerEngine::default()
    }

    fn funded_wallet(engine: &LedgerEngine, tier: KycTier, amount: u64) -> Uuid {
        let wallet = engine.open_wallet(Uuid::new_v4(), Currency::NGN, tier);
        engine
            .apply_mutation(
                wallet.id(),
                EntryType::Credit,
                Amount::new(amount, Currency::NGN),
                TransactionCategory::Deposit,
                &format!("fund-{}", wallet.id()),
            )
            .expect("funding deposit");
        wallet.id()
    }

    fn ngn(value: u64) -> Amount {
        Amount::new(value, Currency::NGN)
    }

    // -- Basic mutation -----------------------------------------------------

    #[test]
    fn credit_then_debit_updates_balance() {
        let engine = engine();
        let id = funded_wallet(&engine, KycTier::Tier2, 10_000);

        let tx = engine
            .apply_mutation(id, EntryType::Debit, ngn(4_000), TransactionCategory::Transfer, "t-1")
            .unwrap();

        assert_eq!(tx.balance_before, 10_000);
        assert_eq!(tx.balance_after, 6_000);
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert!(tx.invariant_holds());
        assert_eq!(engine.get_balance(id).unwrap(), 6_000);
    }

    #[test]
    fn zero_amount_rejected_without_journal_row() {
        let engine = engine();
        let id = funded_wallet(&engine, KycTier::Tier2, 1_000);
        let before = engine.journal_len();

        let result =
            engine.apply_mutation(id, EntryType::Debit, ngn(0), TransactionCategory::Transfer, "z-1");
        assert!(matches!(result, Err(LedgerError::ZeroAmount)));
        assert_eq!(engine.journal_len(), before);
    }

    #[test]
    fn unknown_wallet_rejected() {
        let engine = engine();
        let result = engine.apply_mutation(
            Uuid::new_v4(),
            EntryType::Credit,
            ngn(100),
            TransactionCategory::Deposit,
            "w-1",
        );
        assert!(matches!(result, Err(LedgerError::WalletNotFound(_))));
    }

    #[test]
    fn insufficient_funds_journals_failed_row() {
        let engine = engine();
        let id = funded_wallet(&engine, KycTier::Tier2, 100);

        let result =
            engine.apply_mutation(id, EntryType::Debit, ngn(500), TransactionCategory::Transfer, "t-1");
        assert!(matches!(
            result,
            Err(LedgerError::Wallet(WalletError::InsufficientFunds { .. }))
        ));

        // Balance untouched, failure recorded.
        assert_eq!(engine.get_balance(id).unwrap(), 100);
        let failed = engine.transaction_by_reference("t-1").unwrap();
        assert_eq!(failed.status, TransactionStatus::Failed);
        assert_eq!(failed.balance_before, failed.balance_after);
        assert!(failed.failure_reason.is_some());
    }

    #[test]
    fn duplicate_reference_rejected() {
        let engine = engine();
        let id = funded_wallet(&engine, KycTier::Tier2, 10_000);

        engine
            .apply_mutation(id, EntryType::Debit, ngn(100), TransactionCategory::Transfer, "dup")
            .unwrap();
        let result =
            engine.apply_mutation(id, EntryType::Debit, ngn(100), TransactionCategory::Transfer, "dup");
        assert!(matches!(result, Err(LedgerError::DuplicateReference(_))));
        assert_eq!(engine.get_balance(id).unwrap(), 9_900);
    }

    #[test]
    fn currency_mismatch_rejected() {
        let engine = engine();
        let id = funded_wallet(&engine, KycTier::Tier2, 1_000);

        let result = engine.apply_mutation(
            id,
            EntryType::Debit,
            Amount::new(100, Currency::USD),
            TransactionCategory::Transfer,
            "fx-1",
        );
        assert!(matches!(
            result,
            Err(LedgerError::Wallet(WalletError::CurrencyMismatch { .. }))
        ));
        assert_eq!(engine.get_balance(id).unwrap(), 1_000);
    }

    #[test]
    fn locked_wallet_rejects_mutations() {
        let engine = engine();
        let id = funded_wallet(&engine, KycTier::Tier2, 1_000);
        engine.lock_wallet(id, "compliance hold").unwrap();

        let result =
            engine.apply_mutation(id, EntryType::Debit, ngn(100), TransactionCategory::Transfer, "l-1");
        assert!(matches!(
            result,
            Err(LedgerError::Wallet(WalletError::Locked { .. }))
        ));

        engine.unlock_wallet(id).unwrap();
        assert!(engine
            .apply_mutation(id, EntryType::Debit, ngn(100), TransactionCategory::Transfer, "l-2")
            .is_ok());
    }

    // -- Limits inside the critical section ----------------------------------

    #[test]
    fn debit_over_single_transaction_limit_denied() {
        let engine = engine();
        let id = funded_wallet(&engine, KycTier::Tier0, 50_000);

        // Tier0 single-transaction ceiling is 10_000.
        let result =
            engine.apply_mutation(id, EntryType::Debit, ngn(10_001), TransactionCategory::Transfer, "s-1");
        match result {
            Err(LedgerError::LimitExceeded { window, limit, .. }) => {
                assert_eq!(window, LimitWindow::SingleTransaction);
                assert_eq!(limit, 10_000);
            }
            other => panic!("expected limit denial, got {:?}", other.map(|t| t.status)),
        }
        assert_eq!(engine.get_balance(id).unwrap(), 50_000);
    }

    #[test]
    fn daily_limit_denial_leaves_spend_unchanged() {
        let engine = engine();
        let id = funded_wallet(&engine, KycTier::Tier0, 200_000);

        // Fill the daily window to 49_999 with five debits under the
        // single-transaction ceiling.
        for (i, chunk) in [10_000u64, 10_000, 10_000, 10_000, 9_999].iter().enumerate() {
            engine
                .apply_mutation(
                    id,
                    EntryType::Debit,
                    ngn(*chunk),
                    TransactionCategory::BillPayment,
                    &format!("fill-{}", i),
                )
                .unwrap();
        }
        let spent_before = engine.wallet_snapshot(id).unwrap().spend_state().daily_spent;
        assert_eq!(spent_before, 49_999);

        // A debit of 2 would land on 50_001 -- denied, and the counter
        // must not move.
        let result =
            engine.apply_mutation(id, EntryType::Debit, ngn(2), TransactionCategory::Transfer, "d-1");
        match result {
            Err(LedgerError::LimitExceeded { window, attempted, .. }) => {
                assert_eq!(window, LimitWindow::Daily);
                assert_eq!(attempted, 50_001);
            }
            other => panic!("expected daily denial, got {:?}", other.map(|t| t.status)),
        }
        let snapshot = engine.wallet_snapshot(id).unwrap();
        assert_eq!(snapshot.spend_state().daily_spent, 49_999);

        // Exactly filling the window is still allowed.
        assert!(engine
            .apply_mutation(id, EntryType::Debit, ngn(1), TransactionCategory::Transfer, "d-2")
            .is_ok());
    }

    #[test]
    fn credits_bypass_spending_limits() {
        let engine = engine();
        let wallet = engine.open_wallet(Uuid::new_v4(), Currency::NGN, KycTier::Tier0);

        // 1_000_000 is far over every Tier0 debit ceiling; deposits are
        // not spend and must pass.
        let tx = engine
            .apply_mutation(
                wallet.id(),
                EntryType::Credit,
                ngn(1_000_000),
                TransactionCategory::Deposit,
                "big-deposit",
            )
            .unwrap();
        assert_eq!(tx.balance_after, 1_000_000);
        assert_eq!(engine.wallet_snapshot(wallet.id()).unwrap().spend_state().daily_spent, 0);
    }

    #[test]
    fn tier_upgrade_unlocks_headroom() {
        let engine = engine();
        let id = funded_wallet(&engine, KycTier::Tier0, 100_000);

        assert!(engine
            .apply_mutation(id, EntryType::Debit, ngn(50_000), TransactionCategory::Withdrawal, "u-1")
            .is_err());

        engine.upgrade_tier(id, KycTier::Tier2).unwrap();
        assert!(engine
            .apply_mutation(id, EntryType::Debit, ngn(50_000), TransactionCategory::Withdrawal, "u-2")
            .is_ok());
    }

    // -- Reversal -------------------------------------------------------------

    #[test]
    fn reverse_debit_restores_balance() {
        let engine = engine();
        let id = funded_wallet(&engine, KycTier::Tier2, 10_000);

        let original = engine
            .apply_mutation(id, EntryType::Debit, ngn(4_000), TransactionCategory::Transfer, "r-1")
            .unwrap();
        assert_eq!(engine.get_balance(id).unwrap(), 6_000);

        let compensating = engine.reverse("r-1").unwrap();
        assert_eq!(compensating.entry, EntryType::Credit);
        assert_eq!(compensating.amount.value, 4_000);
        assert_eq!(compensating.reversed_from, Some(original.id));
        assert_eq!(compensating.category, TransactionCategory::Reversal);
        assert_eq!(compensating.reference, "r-1/rev");
        assert_eq!(engine.get_balance(id).unwrap(), 10_000);

        // The original row flipped to Reversed; its monetary fields are intact.
        let flipped = engine.transaction_by_reference("r-1").unwrap();
        assert_eq!(flipped.status, TransactionStatus::Reversed);
        assert_eq!(flipped.balance_before, original.balance_before);
        assert_eq!(flipped.balance_after, original.balance_after);
    }

    #[test]
    fn double_reversal_rejected() {
        let engine = engine();
        let id = funded_wallet(&engine, KycTier::Tier2, 10_000);

        engine
            .apply_mutation(id, EntryType::Debit, ngn(1_000), TransactionCategory::Transfer, "rr-1")
            .unwrap();
        engine.reverse("rr-1").unwrap();

        let result = engine.reverse("rr-1");
        assert!(matches!(
            result,
            Err(LedgerError::NotReversible {
                status: TransactionStatus::Reversed,
                ..
            })
        ));
        assert_eq!(engine.get_balance(id).unwrap(), 10_000);
    }

    #[test]
    fn failed_row_is_not_reversible() {
        let engine = engine();
        let id = funded_wallet(&engine, KycTier::Tier2, 100);

        let _ = engine.apply_mutation(id, EntryType::Debit, ngn(500), TransactionCategory::Transfer, "f-1");
        let result = engine.reverse("f-1");
        assert!(matches!(result, Err(LedgerError::NotReversible { .. })));
    }

    #[test]
    fn reverse_unknown_reference_rejected() {
        let engine = engine();
        assert!(matches!(
            engine.reverse("ghost"),
            Err(LedgerError::ReferenceNotFound(_))
        ));
    }

    #[test]
    fn reversed_credit_requires_unspent_funds() {
        let engine = engine();
        let wallet = engine.open_wallet(Uuid::new_v4(), Currency::NGN, KycTier::Tier2);
        engine
            .apply_mutation(
                wallet.id(),
                EntryType::Credit,
                ngn(1_000),
                TransactionCategory::Deposit,
                "dep-1",
            )
            .unwrap();
        // Spend most of the deposit, then try to claw it back.
        engine
            .apply_mutation(wallet.id(), EntryType::Debit, ngn(900), TransactionCategory::Transfer, "sp-1")
            .unwrap();

        let result = engine.reverse("dep-1");
        assert!(matches!(
            result,
            Err(LedgerError::Wallet(WalletError::InsufficientFunds { .. }))
        ));
        // Nothing moved; the deposit row is still Completed.
        assert_eq!(engine.get_balance(wallet.id()).unwrap(), 100);
        assert_eq!(
            engine.transaction_by_reference("dep-1").unwrap().status,
            TransactionStatus::Completed
        );
    }

    // -- Journal replay -------------------------------------------------------

    #[test]
    fn replay_reproduces_balance() {
        let engine = engine();
        let id = funded_wallet(&engine, KycTier::Tier2, 50_000);

        engine
            .apply_mutation(id, EntryType::Debit, ngn(7_000), TransactionCategory::BillPayment, "p-1")
            .unwrap();
        engine
            .apply_mutation(id, EntryType::Credit, ngn(2_500), TransactionCategory::Deposit, "p-2")
            .unwrap();
        let _ = engine.apply_mutation(id, EntryType::Debit, ngn(999_999), TransactionCategory::Transfer, "p-3");
        engine
            .apply_mutation(id, EntryType::Debit, ngn(500), TransactionCategory::Transfer, "p-4")
            .unwrap();
        engine.reverse("p-4").unwrap();

        let live = engine.get_balance(id).unwrap();
        assert_eq!(live, 45_500);
        assert_eq!(engine.replay_balance(id), live);
    }

    #[test]
    fn transactions_for_returns_only_that_wallet() {
        let engine = engine();
        let a = funded_wallet(&engine, KycTier::Tier2, 1_000);
        let b = funded_wallet(&engine, KycTier::Tier2, 1_000);

        engine
            .apply_mutation(a, EntryType::Debit, ngn(100), TransactionCategory::Transfer, "a-1")
            .unwrap();

        let a_rows = engine.transactions_for(a);
        let b_rows = engine.transactions_for(b);
        assert_eq!(a_rows.len(), 2); // funding + debit
        assert_eq!(b_rows.len(), 1); // funding only
        assert!(a_rows.iter().all(|tx| tx.wallet_id == a));
    }

    // -- Concurrency ----------------------------------------------------------

    #[test]
    fn concurrent_debits_never_oversell() {
        use std::sync::Arc;
        use std::thread;

        let engine = Arc::new(LedgerEngine::default());
        let id = funded_wallet(&engine, KycTier::Tier3, 1_000);

        // 10 threads each try to debit 300; only 3 can fit in 1_000.
        let mut handles = vec![];
        for i in 0..10 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                engine.apply_mutation(
                    id,
                    EntryType::Debit,
                    Amount::new(300, Currency::NGN),
                    TransactionCategory::Withdrawal,
                    &format!("c-{}", i),
                )
            }));
        }

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = results.iter().filter(|r| r.is_ok()).count();

        assert_eq!(successes, 3);
        assert_eq!(engine.get_balance(id).unwrap(), 100);
        assert_eq!(engine.replay_balance(id), 100);
    }

    #[test]
    fn concurrent_mixed_mutations_keep_journal_consistent() {
        use std::sync::Arc;
        use std::thread;

        let engine = Arc::new(LedgerEngine::default());
        let id = funded_wallet(&engine, KycTier::Tier3, 100_000);

        let mut handles = vec![];
        for i in 0..8 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                for j in 0..25 {
                    let entry = if j % 2 == 0 { EntryType::Debit } else { EntryType::Credit };
                    let _ = engine.apply_mutation(
                        id,
                        entry,
                        Amount::new(50, Currency::NGN),
                        TransactionCategory::Transfer,
                        &format!("m-{}-{}", i, j),
                    );
                }
            }));
        }
        for h in handles {
            h.join().expect("thread panicked");
        }

        // Whatever interleaving happened, the journal must replay to the
        // live balance and every settled row must satisfy the invariant.
        assert_eq!(engine.replay_balance(id), engine.get_balance(id).unwrap());
        for tx in engine.transactions_for(id) {
            assert!(tx.invariant_holds(), "row {} violates invariant", tx.id);
        }
    }
}
