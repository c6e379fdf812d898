//! # Core Configuration & Constants
//!
//! Every tunable and magic number in the wallet core lives here. If you're
//! hardcoding a threshold somewhere else, you're doing it wrong and you owe
//! the team coffee.
//!
//! Policy values that operations may legitimately want to override at
//! deploy time (abuse thresholds, lock durations, TTLs) are grouped into
//! config structs with sensible `Default` impls. Tests substitute their own
//! values; the node binary maps CLI flags onto them.

use chrono::Duration;
use std::time::Duration as StdDuration;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Core library version, surfaced by the node binary.
pub const CORE_VERSION: &str = "0.1.0";

/// Maximum accepted length of a client-supplied idempotency key, in bytes.
/// Long enough for a UUID plus client prefix, short enough to bound storage.
pub const MAX_IDEMPOTENCY_KEY_LENGTH: usize = 128;

/// Maximum accepted length of a transaction reference.
pub const MAX_REFERENCE_LENGTH: usize = 64;

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// How long a mutation will wait for a wallet's serializing lock before
/// giving up with a retryable timeout. Contention on a single wallet beyond
/// this bound means the caller should back off and retry with the same
/// idempotency key rather than queue indefinitely.
pub const WALLET_LOCK_TIMEOUT: StdDuration = StdDuration::from_millis(2_000);

/// Tunable parameters for the ledger engine.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Bounded wait for the per-wallet mutex.
    pub lock_timeout: StdDuration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout: WALLET_LOCK_TIMEOUT,
        }
    }
}

// ---------------------------------------------------------------------------
// Idempotency
// ---------------------------------------------------------------------------

/// Default retention for idempotency records. A client that retries a
/// request more than a day later is not retrying -- it is replaying, and
/// gets a fresh execution.
pub const IDEMPOTENCY_RECORD_TTL_HOURS: i64 = 24;

/// Tunable parameters for the idempotency registry.
#[derive(Debug, Clone)]
pub struct IdempotencyConfig {
    /// Time-to-live for finalized and in-flight records.
    pub record_ttl: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            record_ttl: Duration::hours(IDEMPOTENCY_RECORD_TTL_HOURS),
        }
    }
}

// ---------------------------------------------------------------------------
// Abuse Defense
// ---------------------------------------------------------------------------

/// Default number of rate-limit violations inside the trailing window that
/// trips an automatic account lock.
pub const ABUSE_VIOLATION_THRESHOLD: usize = 10;

/// Default trailing window over which violations are counted, in minutes.
pub const ABUSE_WINDOW_MINUTES: i64 = 60;

/// Default duration of an automatically-applied account lock, in hours.
/// Admin-applied locks may pass any duration, including indefinite.
pub const ABUSE_LOCK_HOURS: i64 = 24;

/// Tunable parameters for the abuse tracker.
///
/// Exact thresholds are operational policy, not protocol: fraud teams tune
/// them per deployment. Defaults are deliberately conservative.
#[derive(Debug, Clone)]
pub struct AbuseConfig {
    /// Violations inside `window` that trigger an automatic lock.
    pub violation_threshold: usize,

    /// Trailing window over which violations are counted.
    pub window: Duration,

    /// How long an automatic lock lasts.
    pub lock_duration: Duration,
}

impl Default for AbuseConfig {
    fn default() -> Self {
        Self {
            violation_threshold: ABUSE_VIOLATION_THRESHOLD,
            window: Duration::minutes(ABUSE_WINDOW_MINUTES),
            lock_duration: Duration::hours(ABUSE_LOCK_HOURS),
        }
    }
}

// ---------------------------------------------------------------------------
// Lock Guard
// ---------------------------------------------------------------------------

/// Routes a locked account may still reach. A locked-out user must always
/// be able to contact support, otherwise the lock is a dead end.
pub const LOCK_BYPASS_ROUTES: &[&str] = &["support/contact"];

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
