//! # IP Geolocation Resolver
//!
//! Pure IPv4 -> (country, city) lookup over an in-memory sorted range
//! table. No mutable state, no network calls, no databases to corrupt.
//! A lookup either finds a range or it doesn't -- failure is an absent
//! value, never an error that could block the violation-recording path
//! this resolver enriches.
//!
//! The built-in table is a seed covering the platform's major markets;
//! deployments load a full GeoIP dataset through
//! [`StaticGeoResolver::with_entries`]. Tests substitute the
//! [`GeoResolver`] trait with fakes.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

// ---------------------------------------------------------------------------
// GeoLocation
// ---------------------------------------------------------------------------

/// A resolved city/country pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// ISO 3166-1 alpha-2 country code.
    pub country: String,
    /// City name as recorded in the range table.
    pub city: String,
}

// ---------------------------------------------------------------------------
// GeoResolver
// ---------------------------------------------------------------------------

/// Pure IP lookup. Implementations must be cheap and infallible --
/// `None` means "unknown", and unknown is always acceptable.
pub trait GeoResolver: Send + Sync {
    /// Resolves an IP string to a location, or `None` if the address is
    /// unparseable, private, or not covered by the table.
    fn resolve(&self, ip: &str) -> Option<GeoLocation>;
}

// ---------------------------------------------------------------------------
// StaticGeoResolver
// ---------------------------------------------------------------------------

/// One contiguous IPv4 range mapped to a location. Half-open on neither
/// end: `start..=end` inclusive.
#[derive(Debug, Clone)]
struct GeoRange {
    start: u32,
    end: u32,
    country: String,
    city: String,
}

/// Range-table resolver backed by a sorted `Vec`.
///
/// Lookup is a binary search on the range start followed by a single
/// bound check -- O(log n) with no allocation.
pub struct StaticGeoResolver {
    /// Ranges sorted by `start`, non-overlapping.
    ranges: Vec<GeoRange>,
}

impl StaticGeoResolver {
    /// Builds a resolver from `(cidr, country, city)` entries.
    ///
    /// Entries with malformed CIDR notation are skipped with a warning --
    /// a bad row in a geo dataset must not take down the process.
    pub fn with_entries(entries: &[(&str, &str, &str)]) -> Self {
        let mut ranges: Vec<GeoRange> = entries
            .iter()
            .filter_map(|(cidr, country, city)| {
                let (start, end) = match parse_cidr(cidr) {
                    Some(bounds) => bounds,
                    None => {
                        tracing::warn!(cidr = cidr, "skipping malformed geo range");
                        return None;
                    }
                };
                Some(GeoRange {
                    start,
                    end,
                    country: country.to_string(),
                    city: city.to_string(),
                })
            })
            .collect();
        ranges.sort_by_key(|r| r.start);
        Self { ranges }
    }

    /// Returns the seed table covering the platform's major markets.
    pub fn builtin() -> Self {
        Self::with_entries(&[
            ("41.58.0.0/16", "NG", "Lagos"),
            ("41.203.64.0/18", "NG", "Abuja"),
            ("102.89.0.0/16", "NG", "Lagos"),
            ("105.112.0.0/12", "NG", "Lagos"),
            ("197.210.0.0/16", "NG", "Port Harcourt"),
            ("154.160.0.0/13", "GH", "Accra"),
            ("196.201.208.0/20", "KE", "Nairobi"),
            ("41.90.0.0/15", "KE", "Mombasa"),
            ("8.8.8.0/24", "US", "Mountain View"),
            ("81.2.69.0/24", "GB", "London"),
        ])
    }

    /// Returns the number of ranges in the table.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Returns `true` if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl GeoResolver for StaticGeoResolver {
    fn resolve(&self, ip: &str) -> Option<GeoLocation> {
        let addr: Ipv4Addr = ip.parse().ok()?;

        // Private, loopback, and link-local space carries no geography.
        if addr.is_private() || addr.is_loopback() || addr.is_link_local() {
            return None;
        }

        let needle = u32::from(addr);
        let idx = self.ranges.partition_point(|r| r.start <= needle);
        let candidate = self.ranges.get(idx.checked_sub(1)?)?;

        if needle <= candidate.end {
            Some(GeoLocation {
                country: candidate.country.clone(),
                city: candidate.city.clone(),
            })
        } else {
            None
        }
    }
}

/// Parses `a.b.c.d/prefix` into inclusive `(start, end)` bounds.
fn parse_cidr(cidr: &str) -> Option<(u32, u32)> {
    let (base, prefix) = cidr.split_once('/')?;
    let addr: Ipv4Addr = base.parse().ok()?;
    let prefix: u32 = prefix.parse().ok()?;
    if prefix > 32 {
        return None;
    }

    let base = u32::from(addr);
    let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    let start = base & mask;
    let end = start | !mask;
    Some((start, end))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cidr_bounds() {
        let (start, end) = parse_cidr("10.0.0.0/8").unwrap();
        assert_eq!(start, u32::from(Ipv4Addr::new(10, 0, 0, 0)));
        assert_eq!(end, u32::from(Ipv4Addr::new(10, 255, 255, 255)));

        let (start, end) = parse_cidr("8.8.8.0/24").unwrap();
        assert_eq!(start, u32::from(Ipv4Addr::new(8, 8, 8, 0)));
        assert_eq!(end, u32::from(Ipv4Addr::new(8, 8, 8, 255)));
    }

    #[test]
    fn parse_cidr_rejects_garbage() {
        assert!(parse_cidr("not-an-ip/8").is_none());
        assert!(parse_cidr("10.0.0.0").is_none());
        assert!(parse_cidr("10.0.0.0/33").is_none());
    }

    #[test]
    fn resolves_known_ranges() {
        let resolver = StaticGeoResolver::builtin();

        let lagos = resolver.resolve("105.112.10.20").unwrap();
        assert_eq!(lagos.country, "NG");
        assert_eq!(lagos.city, "Lagos");

        let accra = resolver.resolve("154.161.4.9").unwrap();
        assert_eq!(accra.country, "GH");

        let london = resolver.resolve("81.2.69.160").unwrap();
        assert_eq!(london.city, "London");
    }

    #[test]
    fn unknown_ip_resolves_to_none() {
        let resolver = StaticGeoResolver::builtin();
        assert!(resolver.resolve("203.0.113.7").is_none());
    }

    #[test]
    fn private_and_loopback_resolve_to_none() {
        let resolver = StaticGeoResolver::builtin();
        assert!(resolver.resolve("10.1.2.3").is_none());
        assert!(resolver.resolve("192.168.0.1").is_none());
        assert!(resolver.resolve("127.0.0.1").is_none());
    }

    #[test]
    fn unparseable_input_resolves_to_none() {
        let resolver = StaticGeoResolver::builtin();
        assert!(resolver.resolve("not an ip").is_none());
        assert!(resolver.resolve("").is_none());
        // IPv6 is out of table scope for now.
        assert!(resolver.resolve("2001:db8::1").is_none());
    }

    #[test]
    fn range_boundaries_are_inclusive() {
        let resolver = StaticGeoResolver::with_entries(&[("100.0.0.0/24", "NG", "Lagos")]);
        assert!(resolver.resolve("100.0.0.0").is_some());
        assert!(resolver.resolve("100.0.0.255").is_some());
        assert!(resolver.resolve("100.0.1.0").is_none());
        assert!(resolver.resolve("99.255.255.255").is_none());
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let resolver =
            StaticGeoResolver::with_entries(&[("bogus/99", "XX", "Nowhere"), ("8.8.8.0/24", "US", "MV")]);
        assert_eq!(resolver.len(), 1);
        assert!(resolver.resolve("8.8.8.8").is_some());
    }

    #[test]
    fn custom_table_overrides_builtin() {
        let resolver = StaticGeoResolver::with_entries(&[("203.0.113.0/24", "KE", "Nairobi")]);
        let hit = resolver.resolve("203.0.113.50").unwrap();
        assert_eq!(hit.country, "KE");
    }
}
