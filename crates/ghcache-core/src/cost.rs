//! Per-call cost accounting.

use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Counters describing what one call cost at each tier.
///
/// Costs are additive: fan-out and pagination merge the costs of every
/// nested call. The observed rate-limit budget merges by minimum.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cost {
    /// Local ephemeral cache hits.
    pub local_hits: u64,
    /// Local ephemeral cache misses.
    pub local_misses: u64,
    /// Metadata store reads.
    pub metadata_gets: u64,
    /// Metadata store writes.
    pub metadata_sets: u64,
    /// Metadata store expiry updates.
    pub metadata_expires: u64,
    /// Body store reads that found a body.
    pub body_hits: u64,
    /// Body store reads that found nothing.
    pub body_misses: u64,
    /// Body store writes.
    pub body_sets: u64,
    /// Body store expiry updates.
    pub body_expires: u64,
    /// Remote calls made.
    pub remote_calls: u64,
    /// Remote calls answered with "not modified".
    pub remote_not_modified: u64,
    /// Remote calls avoided by serving from cache.
    pub remote_avoided: u64,
    /// Background refreshes started.
    pub background_refreshes: u64,
    /// Background refreshes skipped because another worker holds the claim.
    pub background_skipped: u64,
    /// Shared store operations that failed and were degraded around.
    pub store_errors: u64,
    /// Lowest remaining rate-limit budget observed.
    pub rate_limit_remaining: Option<u64>,
}

impl Cost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge another cost into this one.
    pub fn merge(&mut self, other: &Cost) {
        self.local_hits += other.local_hits;
        self.local_misses += other.local_misses;
        self.metadata_gets += other.metadata_gets;
        self.metadata_sets += other.metadata_sets;
        self.metadata_expires += other.metadata_expires;
        self.body_hits += other.body_hits;
        self.body_misses += other.body_misses;
        self.body_sets += other.body_sets;
        self.body_expires += other.body_expires;
        self.remote_calls += other.remote_calls;
        self.remote_not_modified += other.remote_not_modified;
        self.remote_avoided += other.remote_avoided;
        self.background_refreshes += other.background_refreshes;
        self.background_skipped += other.background_skipped;
        self.store_errors += other.store_errors;
        if let Some(remaining) = other.rate_limit_remaining {
            self.observe_rate_limit(remaining);
        }
    }

    /// Record a remaining rate-limit budget reported by the remote.
    pub fn observe_rate_limit(&mut self, remaining: u64) {
        self.rate_limit_remaining = Some(match self.rate_limit_remaining {
            Some(current) => current.min(remaining),
            None => remaining,
        });
    }

    /// Total shared store operations issued.
    pub fn store_operations(&self) -> u64 {
        self.metadata_gets
            + self.metadata_sets
            + self.metadata_expires
            + self.body_hits
            + self.body_misses
            + self.body_sets
            + self.body_expires
    }
}

impl AddAssign<&Cost> for Cost {
    fn add_assign(&mut self, rhs: &Cost) {
        self.merge(rhs);
    }
}

impl AddAssign for Cost {
    fn add_assign(&mut self, rhs: Cost) {
        self.merge(&rhs);
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(mut self, rhs: Cost) -> Cost {
        self.merge(&rhs);
        self
    }
}

impl Sum for Cost {
    fn sum<I: Iterator<Item = Cost>>(iter: I) -> Self {
        iter.fold(Cost::default(), Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_adds_counters() {
        let mut a = Cost {
            remote_calls: 2,
            body_hits: 1,
            ..Default::default()
        };
        let b = Cost {
            remote_calls: 3,
            local_hits: 4,
            ..Default::default()
        };
        a += &b;
        assert_eq!(a.remote_calls, 5);
        assert_eq!(a.body_hits, 1);
        assert_eq!(a.local_hits, 4);
    }

    #[test]
    fn test_rate_limit_merges_by_minimum() {
        let mut a = Cost::new();
        a.observe_rate_limit(4000);
        let mut b = Cost::new();
        b.observe_rate_limit(120);

        let merged = a.clone() + b;
        assert_eq!(merged.rate_limit_remaining, Some(120));

        // Absent budgets never erase an observed one.
        let merged = a + Cost::new();
        assert_eq!(merged.rate_limit_remaining, Some(4000));
    }

    #[test]
    fn test_sum() {
        let total: Cost = (0..3)
            .map(|_| Cost {
                remote_calls: 1,
                ..Default::default()
            })
            .sum();
        assert_eq!(total.remote_calls, 3);
    }
}
