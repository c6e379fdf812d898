//! # Abuse Tracker
//!
//! Aggregates rate-limit violations fed in by the throttling layer and
//! decides when a subject has crossed the line from "noisy" to "locked".
//!
//! Each violation is appended to an immutable log, enriched with
//! best-effort geolocation (a miss is logged at debug and never blocks --
//! abuse defense must not depend on a lookup table), and rolled into a
//! per-(date, endpoint) daily aggregate. After every recorded violation
//! the tracker re-counts the subject's violations inside the trailing
//! window and, at or over the threshold, applies an account lock through
//! the [lock guard].
//!
//! Violation timestamps are generated here, not taken from the request:
//! window arithmetic must tolerate client clock skew.
//!
//! [lock guard]: super::lockout::AccountLockGuard

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AbuseConfig;

use super::geo::GeoResolver;
use super::lockout::{AccountLock, AccountLockGuard};

// ---------------------------------------------------------------------------
// ViolationReport
// ---------------------------------------------------------------------------

/// What the rate-limiting layer hands us when it throttles a request.
#[derive(Debug, Clone)]
pub struct ViolationReport {
    /// The authenticated user, when the request carried one. Anonymous
    /// probes still get logged and aggregated.
    pub user_id: Option<Uuid>,

    /// Source IP of the throttled request.
    pub ip: String,

    /// The endpoint that was hit.
    pub endpoint: String,

    /// HTTP method of the throttled request.
    pub method: String,

    /// The rate limit that was breached (requests per window).
    pub limit: u32,

    /// How many requests the client had made when it was throttled.
    pub hit_count: u32,
}

// ---------------------------------------------------------------------------
// RateLimitViolation
// ---------------------------------------------------------------------------

/// One appended violation row, geo-enriched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitViolation {
    /// Row identifier.
    pub id: Uuid,
    /// The violating user, if authenticated.
    pub user_id: Option<Uuid>,
    /// Source IP.
    pub ip: String,
    /// Endpoint that was throttled.
    pub endpoint: String,
    /// HTTP method.
    pub method: String,
    /// Resolved country, when the IP was in the geo table.
    pub country: Option<String>,
    /// Resolved city.
    pub city: Option<String>,
    /// The breached limit.
    pub limit: u32,
    /// Requests made when throttled.
    pub hit_count: u32,
    /// When the violation was recorded. Tracker-generated.
    pub created_at: DateTime<Utc>,
}

/// Per-(date, endpoint) aggregate, upserted on every violation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyEndpointMetric {
    /// UTC date of the aggregate bucket.
    pub date: NaiveDate,
    /// The endpoint the bucket counts.
    pub endpoint: String,
    /// Violations recorded in this bucket.
    pub count: u64,
    /// When the bucket was last touched.
    pub last_seen: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// AbuseTracker
// ---------------------------------------------------------------------------

/// Violation log, daily aggregates, and the lock trigger.
///
/// Process-wide singleton; the geo resolver and lock guard are injected
/// so tests substitute fakes.
pub struct AbuseTracker {
    /// Append-only violation log.
    violations: RwLock<Vec<RateLimitViolation>>,

    /// Daily per-endpoint aggregates.
    metrics: DashMap<(NaiveDate, String), DailyEndpointMetric>,

    /// Best-effort IP enrichment.
    geo: Arc<dyn GeoResolver>,

    /// Where threshold breaches are escalated.
    guard: Arc<AccountLockGuard>,

    /// Thresholds and durations.
    config: AbuseConfig,
}

impl AbuseTracker {
    /// Creates a tracker wired to the given resolver and lock guard.
    pub fn new(geo: Arc<dyn GeoResolver>, guard: Arc<AccountLockGuard>, config: AbuseConfig) -> Self {
        Self {
            violations: RwLock::new(Vec::new()),
            metrics: DashMap::new(),
            geo,
            guard,
            config,
        }
    }

    /// Records one throttled request.
    ///
    /// Appends the geo-enriched violation, upserts the daily aggregate,
    /// then re-evaluates the subject against the lock threshold. Returns
    /// the stored row and the lock, if this violation tripped one.
    pub fn record_violation(
        &self,
        report: ViolationReport,
    ) -> (RateLimitViolation, Option<AccountLock>) {
        let now = Utc::now();

        // Best-effort enrichment. The resolver is pure and cheap; an
        // unknown IP is just an absent location.
        let location = self.geo.resolve(&report.ip);
        if location.is_none() {
            tracing::debug!(ip = %report.ip, "no geolocation for violating ip");
        }

        let violation = RateLimitViolation {
            id: Uuid::new_v4(),
            user_id: report.user_id,
            ip: report.ip,
            endpoint: report.endpoint.clone(),
            method: report.method,
            country: location.as_ref().map(|l| l.country.clone()),
            city: location.map(|l| l.city),
            limit: report.limit,
            hit_count: report.hit_count,
            created_at: now,
        };

        self.violations.write().push(violation.clone());

        // Daily aggregate upsert.
        self.metrics
            .entry((now.date_naive(), report.endpoint))
            .and_modify(|metric| {
                metric.count += 1;
                metric.last_seen = now;
            })
            .or_insert_with(|| DailyEndpointMetric {
                date: now.date_naive(),
                endpoint: violation.endpoint.clone(),
                count: 1,
                last_seen: now,
            });

        tracing::info!(
            user_id = ?violation.user_id,
            endpoint = %violation.endpoint,
            country = ?violation.country,
            "rate limit violation recorded"
        );

        let lock = violation.user_id.and_then(|user| self.check_and_lock(user));
        (violation, lock)
    }

    /// Counts the subject's violations inside the trailing window and
    /// locks at/over the threshold.
    ///
    /// Returns the applied lock, or `None` if the subject is under the
    /// threshold or already locked.
    pub fn check_and_lock(&self, user_id: Uuid) -> Option<AccountLock> {
        let now = Utc::now();
        let count = self.violations_in_window(user_id, now);

        if count < self.config.violation_threshold {
            return None;
        }
        if self.guard.is_locked(user_id) {
            // Already locked; don't extend the sentence on every extra
            // violation that races in before the client backs off.
            return None;
        }

        let reason = format!(
            "{} rate limit violations within {} minutes",
            count,
            self.config.window.num_minutes()
        );
        tracing::warn!(user_id = %user_id, count = count, "abuse threshold breached");
        Some(self.guard.lock(user_id, &reason, Some(self.config.lock_duration)))
    }

    /// Counts a subject's violations inside the trailing window ending at
    /// `now`.
    pub fn violations_in_window(&self, user_id: Uuid, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.config.window;
        self.violations
            .read()
            .iter()
            .filter(|v| v.user_id == Some(user_id) && v.created_at > cutoff)
            .count()
    }

    /// Returns the daily aggregate for a (date, endpoint) bucket.
    pub fn metric(&self, date: NaiveDate, endpoint: &str) -> Option<DailyEndpointMetric> {
        self.metrics
            .get(&(date, endpoint.to_string()))
            .map(|m| m.clone())
    }

    /// Returns the total number of recorded violations.
    pub fn violation_count(&self) -> usize {
        self.violations.read().len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::geo::{GeoLocation, StaticGeoResolver};
    use chrono::Duration;

    /// Resolver that always fails, for exercising the never-blocks path.
    struct BlindResolver;

    impl GeoResolver for BlindResolver {
        fn resolve(&self, _ip: &str) -> Option<GeoLocation> {
            None
        }
    }

    fn tracker_with(config: AbuseConfig) -> (AbuseTracker, Arc<AccountLockGuard>) {
        let guard = Arc::new(AccountLockGuard::new());
        let tracker = AbuseTracker::new(
            Arc::new(StaticGeoResolver::builtin()),
            Arc::clone(&guard),
            config,
        );
        (tracker, guard)
    }

    fn report(user: Option<Uuid>, ip: &str, endpoint: &str) -> ViolationReport {
        ViolationReport {
            user_id: user,
            ip: ip.to_string(),
            endpoint: endpoint.to_string(),
            method: "POST".to_string(),
            limit: 60,
            hit_count: 61,
        }
    }

    // -- Recording and enrichment ---------------------------------------------

    #[test]
    fn violation_is_appended_and_enriched() {
        let (tracker, _) = tracker_with(AbuseConfig::default());
        let user = Uuid::new_v4();

        let (violation, lock) =
            tracker.record_violation(report(Some(user), "105.112.1.1", "/wallet/transfer"));

        assert_eq!(violation.user_id, Some(user));
        assert_eq!(violation.country.as_deref(), Some("NG"));
        assert_eq!(violation.city.as_deref(), Some("Lagos"));
        assert!(lock.is_none());
        assert_eq!(tracker.violation_count(), 1);
    }

    #[test]
    fn geolocation_failure_never_blocks_recording() {
        let guard = Arc::new(AccountLockGuard::new());
        let tracker =
            AbuseTracker::new(Arc::new(BlindResolver), Arc::clone(&guard), AbuseConfig::default());

        let (violation, _) =
            tracker.record_violation(report(Some(Uuid::new_v4()), "10.0.0.1", "/wallet/transfer"));

        assert!(violation.country.is_none());
        assert!(violation.city.is_none());
        assert_eq!(tracker.violation_count(), 1);
    }

    #[test]
    fn anonymous_violations_are_logged_but_never_lock() {
        let config = AbuseConfig {
            violation_threshold: 1,
            ..Default::default()
        };
        let (tracker, guard) = tracker_with(config);

        for _ in 0..5 {
            let (_, lock) = tracker.record_violation(report(None, "8.8.8.8", "/auth/login"));
            assert!(lock.is_none());
        }
        assert_eq!(tracker.violation_count(), 5);
        assert_eq!(guard.active_count(), 0);
    }

    // -- Daily aggregates -------------------------------------------------------

    #[test]
    fn daily_metric_upserts_per_endpoint() {
        let (tracker, _) = tracker_with(AbuseConfig::default());
        let today = Utc::now().date_naive();

        tracker.record_violation(report(None, "8.8.8.8", "/wallet/transfer"));
        tracker.record_violation(report(None, "8.8.8.8", "/wallet/transfer"));
        tracker.record_violation(report(None, "8.8.8.8", "/auth/login"));

        assert_eq!(tracker.metric(today, "/wallet/transfer").unwrap().count, 2);
        assert_eq!(tracker.metric(today, "/auth/login").unwrap().count, 1);
        assert!(tracker.metric(today, "/never-hit").is_none());
    }

    // -- Threshold and locking ---------------------------------------------------

    #[test]
    fn threshold_breach_locks_the_subject() {
        let config = AbuseConfig {
            violation_threshold: 3,
            window: Duration::minutes(60),
            lock_duration: Duration::hours(24),
        };
        let (tracker, guard) = tracker_with(config);
        let user = Uuid::new_v4();

        let (_, first) = tracker.record_violation(report(Some(user), "8.8.8.8", "/w"));
        let (_, second) = tracker.record_violation(report(Some(user), "8.8.8.8", "/w"));
        assert!(first.is_none());
        assert!(second.is_none());
        assert!(!guard.is_locked(user));

        // Third violation crosses the threshold.
        let (_, third) = tracker.record_violation(report(Some(user), "8.8.8.8", "/w"));
        let lock = third.expect("third violation should lock");
        assert!(lock.reason.contains("3 rate limit violations"));
        assert!(lock.expires_at.is_some());
        assert!(guard.is_locked(user));
    }

    #[test]
    fn violations_by_other_users_do_not_count() {
        let config = AbuseConfig {
            violation_threshold: 2,
            ..Default::default()
        };
        let (tracker, guard) = tracker_with(config);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        tracker.record_violation(report(Some(alice), "8.8.8.8", "/w"));
        tracker.record_violation(report(Some(bob), "8.8.8.8", "/w"));

        assert!(!guard.is_locked(alice));
        assert!(!guard.is_locked(bob));
    }

    #[test]
    fn already_locked_subject_is_not_relocked() {
        let config = AbuseConfig {
            violation_threshold: 1,
            ..Default::default()
        };
        let (tracker, guard) = tracker_with(config);
        let user = Uuid::new_v4();

        let (_, first) = tracker.record_violation(report(Some(user), "8.8.8.8", "/w"));
        let original_expiry = first.expect("first violation locks at threshold 1").expires_at;

        // Further violations while locked must not extend the expiry.
        let (_, second) = tracker.record_violation(report(Some(user), "8.8.8.8", "/w"));
        assert!(second.is_none());
        let active = guard.check(user, "wallet/transfer").unwrap_err();
        assert_eq!(active.expires_at, original_expiry);
    }

    #[test]
    fn window_counting_is_trailing() {
        let (tracker, _) = tracker_with(AbuseConfig::default());
        let user = Uuid::new_v4();

        tracker.record_violation(report(Some(user), "8.8.8.8", "/w"));
        tracker.record_violation(report(Some(user), "8.8.8.8", "/w"));

        let now = Utc::now();
        assert_eq!(tracker.violations_in_window(user, now), 2);
        // Viewed from two hours in the future, the 60-minute window is empty.
        assert_eq!(tracker.violations_in_window(user, now + Duration::hours(2)), 0);
    }

    #[test]
    fn overridden_threshold_is_respected() {
        // The same scenario under a stricter policy locks earlier.
        let strict = AbuseConfig {
            violation_threshold: 1,
            window: Duration::minutes(5),
            lock_duration: Duration::minutes(30),
        };
        let (tracker, guard) = tracker_with(strict);
        let user = Uuid::new_v4();

        let (_, lock) = tracker.record_violation(report(Some(user), "8.8.8.8", "/w"));
        assert!(lock.is_some());
        assert!(guard.is_locked(user));
    }
}
