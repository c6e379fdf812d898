// Copyright (c) 2026 Vela Labs. MIT License.
// See LICENSE for details.

//! # Vela Wallet Core
//!
//! The concurrency-safe monetary heart of the Vela platform: a wallet
//! ledger that guarantees exactly-once financial effect under concurrent
//! and duplicated requests, plus the abuse-defense machinery that decides
//! who gets to ask in the first place.
//!
//! Money code has exactly one job: be boring under pressure. Every design
//! decision here optimizes for "two identical retries arrive in the same
//! millisecond" over "looks elegant in a diagram".
//!
//! ## Architecture
//!
//! The modules mirror the actual concerns of a wallet backend, leaves
//! first:
//!
//! - **money** — integer minor-unit amounts. Floats never touch a balance.
//! - **limits** — pure tier-limit policy over lazily-reset rolling windows.
//! - **ledger** — wallets, the append-only journal, and the engine that
//!   serializes every mutation per wallet.
//! - **idempotency** — (actor, key) outcome store with an atomic
//!   conditional-insert claim.
//! - **guard** — geolocation, violation tracking, and the account lock
//!   gate.
//! - **request** — the typed boundary loose payloads must pass before
//!   they reach any of the above.
//! - **processor** — the one sanctioned pipeline tying it all together.
//! - **config** — constants and deploy-time tunables.
//! - **error** — the closed failure taxonomy and its retry semantics.
//!
//! ## Design Philosophy
//!
//! 1. Correctness over throughput; a wallet mutex held a little long beats
//!    a double-spend explained to an auditor.
//! 2. Atomic primitives, not read-then-write. If a check and its effect
//!    aren't in one critical section, they're two different features.
//! 3. Every public API is documented. If it touches money, it has tests.
//!    Plural.

pub mod config;
pub mod error;
pub mod guard;
pub mod idempotency;
pub mod ledger;
pub mod limits;
pub mod money;
pub mod processor;
pub mod request;

pub use error::{CoreError, ErrorCode};
pub use processor::{MutationOutcome, MutationProcessor};
