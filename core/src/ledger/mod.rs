//! # Ledger Module — Wallets & the Transaction Journal
//!
//! Where money lives. Every balance on the platform passes through this
//! module, and the engine is the only code allowed to move it.
//!
//! ## Architecture
//!
//! ```text
//! wallet.rs      — wallet state: balance, spend counters, lock flags
//! transaction.rs — immutable journal rows and their lifecycle
//! engine.rs      — per-wallet serialized mutation, reversal, replay
//! ```
//!
//! ## Design Principles
//!
//! 1. **All amounts are `u64` in minor units.** No floating point. No
//!    decimals in arithmetic. Display formatting is someone else's job.
//!
//! 2. **The journal is append-only.** A settled row's monetary fields
//!    never change; corrections are compensating rows, and the full
//!    balance is re-derivable by folding the journal.
//!
//! 3. **One mutex per wallet.** Serialization is scoped to the wallet
//!    identifier, so unrelated wallets never contend.
//!
//! 4. **Serializable state.** Every struct here derives `Serialize` and
//!    `Deserialize` so wallet state can be persisted, shipped to an audit
//!    sink, or snapshotted in tests.

pub mod engine;
pub mod transaction;
pub mod wallet;

pub use engine::{LedgerEngine, LedgerError};
pub use transaction::{EntryType, Transaction, TransactionCategory, TransactionStatus};
pub use wallet::{Wallet, WalletError};
