//! # Guard Module — Abuse Defense
//!
//! Everything that stands between an abusive client and the ledger lives
//! here. The ledger enforces *financial* invariants; the guard enforces
//! *behavioral* ones — who is allowed to ask at all.
//!
//! ## Architecture
//!
//! ```text
//! geo.rs     — pure IP -> city/country lookup, no mutable state
//! abuse.rs   — violation log, daily aggregates, lock-threshold trigger
//! lockout.rs — account lock store, the gate before every mutation
//! ```
//!
//! The dependency order is strict: the geo resolver knows nothing about
//! violations, the abuse tracker calls into the lock guard, and the lock
//! guard knows nothing about either — it just answers "may this subject
//! mutate?".

pub mod abuse;
pub mod geo;
pub mod lockout;

pub use abuse::{AbuseTracker, DailyEndpointMetric, RateLimitViolation, ViolationReport};
pub use geo::{GeoLocation, GeoResolver, StaticGeoResolver};
pub use lockout::{AccountLock, AccountLockGuard};
