//! # Tier-Based Spending Limits
//!
//! Every wallet carries a KYC tier, and every tier defines three independent
//! ceilings: a single-transaction limit, a rolling daily limit, and a rolling
//! monthly limit. This module is pure policy -- it never touches a wallet,
//! never takes a lock, and never reads a clock. Callers pass `now` in, which
//! is what makes the window arithmetic testable without sleeping.
//!
//! ## Rolling Windows
//!
//! Spend counters are *lazily* reset: there is no scheduler that zeroes them
//! at midnight. Instead, [`effective_spend`] computes what the counters are
//! worth *right now* as a pure function of `(last_reset_at, now)`. If the UTC
//! calendar day has rolled over since the counters were last touched, the
//! daily figure counts as zero; the month boundary is evaluated independently
//! of the day boundary. The ledger engine persists the rolled-over values
//! inside the same atomic section as the balance write, so two concurrent
//! debits can never both pass a check before either increments spend-to-date.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// KycTier
// ---------------------------------------------------------------------------

/// Identity-verification level gating wallet spending limits.
///
/// Tiers are strictly ordered: a higher tier never has a lower ceiling.
/// Tier 3 is fully verified and effectively unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KycTier {
    /// Unverified: phone number only.
    Tier0,
    /// Basic: government ID captured.
    Tier1,
    /// Enhanced: ID verified plus proof of address.
    Tier2,
    /// Full: enhanced due diligence complete. No platform-imposed ceilings.
    Tier3,
}

impl fmt::Display for KycTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tier0 => write!(f, "TIER_0"),
            Self::Tier1 => write!(f, "TIER_1"),
            Self::Tier2 => write!(f, "TIER_2"),
            Self::Tier3 => write!(f, "TIER_3"),
        }
    }
}

/// Sentinel meaning "no ceiling". Using `u64::MAX` keeps every comparison
/// branch-free: `spent + amount` can never exceed it without first hitting
/// the overflow checks in the ledger.
pub const UNLIMITED: u64 = u64::MAX;

/// The three ceilings a tier defines, in currency minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    /// Maximum total debits per rolling UTC day.
    pub daily: u64,
    /// Maximum total debits per rolling UTC month.
    pub monthly: u64,
    /// Maximum value of any single debit.
    pub single_transaction: u64,
}

impl KycTier {
    /// Returns the limit table row for this tier.
    pub fn limits(&self) -> TierLimits {
        match self {
            Self::Tier0 => TierLimits {
                daily: 50_000,
                monthly: 200_000,
                single_transaction: 10_000,
            },
            Self::Tier1 => TierLimits {
                daily: 300_000,
                monthly: 1_000_000,
                single_transaction: 100_000,
            },
            Self::Tier2 => TierLimits {
                daily: 5_000_000,
                monthly: 20_000_000,
                single_transaction: 1_000_000,
            },
            Self::Tier3 => TierLimits {
                daily: UNLIMITED,
                monthly: UNLIMITED,
                single_transaction: UNLIMITED,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Spend windows
// ---------------------------------------------------------------------------

/// Which ceiling a denied debit ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitWindow {
    /// The per-transaction ceiling. Never resets -- split the payment.
    SingleTransaction,
    /// The rolling UTC-day ceiling.
    Daily,
    /// The rolling UTC-month ceiling.
    Monthly,
}

impl fmt::Display for LimitWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleTransaction => write!(f, "single-transaction"),
            Self::Daily => write!(f, "daily"),
            Self::Monthly => write!(f, "monthly"),
        }
    }
}

/// A wallet's spend counters as last persisted.
///
/// The raw values are only meaningful relative to `last_reset_at`; run them
/// through [`effective_spend`] before comparing against limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendState {
    /// Total debits recorded since the last daily rollover.
    pub daily_spent: u64,
    /// Total debits recorded since the last monthly rollover.
    pub monthly_spent: u64,
    /// When the counters were last persisted.
    pub last_reset_at: DateTime<Utc>,
}

/// Computes the counters' current worth under lazy rollover.
///
/// Returns `(daily, monthly)`. A counter whose window boundary has passed
/// since `last_reset_at` counts as zero; the two boundaries are evaluated
/// independently (a day can roll without the month rolling, and on the 1st
/// of a month both roll at once).
pub fn effective_spend(state: &SpendState, now: DateTime<Utc>) -> (u64, u64) {
    let day_rolled = now.date_naive() != state.last_reset_at.date_naive();
    let month_rolled = (now.year(), now.month())
        != (state.last_reset_at.year(), state.last_reset_at.month());

    let daily = if day_rolled { 0 } else { state.daily_spent };
    let monthly = if month_rolled { 0 } else { state.monthly_spent };
    (daily, monthly)
}

/// Returns when the given window next resets, relative to `now`.
///
/// Daily resets at the next UTC midnight; monthly on the first of the next
/// month. The single-transaction ceiling never resets, so it has no
/// reset instant.
pub fn next_reset(window: LimitWindow, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match window {
        LimitWindow::SingleTransaction => None,
        LimitWindow::Daily => {
            let tomorrow = now.date_naive() + Duration::days(1);
            Some(Utc.from_utc_datetime(&tomorrow.and_hms_opt(0, 0, 0).expect("midnight exists")))
        }
        LimitWindow::Monthly => {
            let (year, month) = if now.month() == 12 {
                (now.year() + 1, 1)
            } else {
                (now.year(), now.month() + 1)
            };
            let first = chrono::NaiveDate::from_ymd_opt(year, month, 1)
                .expect("first of month exists");
            Some(Utc.from_utc_datetime(&first.and_hms_opt(0, 0, 0).expect("midnight exists")))
        }
    }
}

// ---------------------------------------------------------------------------
// LimitDecision
// ---------------------------------------------------------------------------

/// Outcome of a limit check. Pure data -- conversion into an error happens
/// at the ledger layer so the denial detail survives verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitDecision {
    /// The debit fits inside every window.
    Allowed,
    /// The debit breaches a window.
    Denied {
        /// The first window (in check order) that the debit breaches.
        window: LimitWindow,
        /// The ceiling for that window.
        limit: u64,
        /// What the window's spend would have become.
        attempted: u64,
        /// When the window resets, if it ever does.
        resets_at: Option<DateTime<Utc>>,
    },
}

impl LimitDecision {
    /// Returns `true` for [`LimitDecision::Allowed`].
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Checks a proposed debit against a tier's ceilings.
///
/// Check order is single-transaction, then daily, then monthly -- the
/// narrowest window first, so the caller learns about the constraint that
/// is cheapest to work around. Uses saturating adds: a proposal that would
/// overflow `u64` is by definition over every real-world limit.
pub fn check_limit(
    tier: KycTier,
    state: &SpendState,
    amount: u64,
    now: DateTime<Utc>,
) -> LimitDecision {
    let limits = tier.limits();
    let (daily, monthly) = effective_spend(state, now);

    if amount > limits.single_transaction {
        return LimitDecision::Denied {
            window: LimitWindow::SingleTransaction,
            limit: limits.single_transaction,
            attempted: amount,
            resets_at: None,
        };
    }

    let daily_would_be = daily.saturating_add(amount);
    if daily_would_be > limits.daily {
        return LimitDecision::Denied {
            window: LimitWindow::Daily,
            limit: limits.daily,
            attempted: daily_would_be,
            resets_at: next_reset(LimitWindow::Daily, now),
        };
    }

    let monthly_would_be = monthly.saturating_add(amount);
    if monthly_would_be > limits.monthly {
        return LimitDecision::Denied {
            window: LimitWindow::Monthly,
            limit: limits.monthly,
            attempted: monthly_would_be,
            resets_at: next_reset(LimitWindow::Monthly, now),
        };
    }

    LimitDecision::Allowed
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
