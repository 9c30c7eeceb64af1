//! Background refresh bookkeeping.

use dashmap::DashSet;
use ghcache_core::{CacheKey, EngineConfig};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// How long a refresh claim on a collection of `pages` pages stays valid.
///
/// Covers the settle delay, one round trip per page and a margin that grows
/// with the page count. Single resources count as one page.
pub(crate) fn claim_window(config: &EngineConfig, pages: u32) -> chrono::Duration {
    let round_trips = config.round_trip_estimate() * pages.max(1);
    let margin = config.claim_margin() + config.claim_margin_per_page() * pages;
    let window: Duration = config.settle_delay() + round_trips + margin;
    chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX)
}

/// Tracks refreshes started by this process.
///
/// The in-flight set stops duplicate refreshes of one key before the shared
/// store claim is even attempted. Handles are kept so callers can await
/// outstanding refreshes.
#[derive(Default)]
pub(crate) struct RefreshTracker {
    in_flight: Arc<DashSet<CacheKey>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

/// Membership of one key in the in-flight set, released on drop.
///
/// Held by the refresh task so a panicking refresh still frees its key.
pub(crate) struct InFlight {
    in_flight: Arc<DashSet<CacheKey>>,
    key: CacheKey,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}

impl RefreshTracker {
    /// Mark `key` as refreshing. Returns `None` if it already was.
    pub fn try_begin(&self, key: &CacheKey) -> Option<InFlight> {
        self.in_flight.insert(key.clone()).then(|| InFlight {
            in_flight: self.in_flight.clone(),
            key: key.clone(),
        })
    }

    #[cfg(test)]
    pub fn is_refreshing(&self, key: &CacheKey) -> bool {
        self.in_flight.contains(key)
    }

    pub fn track(&self, handle: JoinHandle<()>) {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Number of refresh tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        let handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.iter().filter(|h| !h.is_finished()).count()
    }

    pub fn drain(&self) -> Vec<JoinHandle<()>> {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *handles)
    }
}
