//! Sliding-window rule in its minimum-interval form.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::key::RuleKey;
use super::rule::RateLimitRule;

type LastAccepted = Arc<Mutex<Option<DateTime<Utc>>>>;

/// Requires at least `minimum_interval` between consecutive accepted
/// requests for the same client and resource.
///
/// A denied request leaves the stored time untouched, so hammering a key
/// does not extend its lockout. Timestamps earlier than the last accepted
/// one yield a negative elapsed time and are denied.
pub struct SlidingWindowRule {
    /// Minimum spacing between accepted requests
    minimum_interval: TimeDelta,
    /// Latest accepted request time indexed by rule key
    last_accepted: DashMap<RuleKey, LastAccepted>,
}

impl SlidingWindowRule {
    /// Create a new sliding-window rule.
    pub fn new(minimum_interval: TimeDelta) -> Self {
        Self {
            minimum_interval,
            last_accepted: DashMap::new(),
        }
    }

    /// Get the minimum interval between accepted requests.
    pub fn minimum_interval(&self) -> TimeDelta {
        self.minimum_interval
    }

    /// Get the number of keys this rule has observed.
    pub fn tracked_keys(&self) -> usize {
        self.last_accepted.len()
    }

    /// Get the latest accepted request time for a key.
    pub fn last_accepted(&self, client_token: &str, resource: &str) -> Option<DateTime<Utc>> {
        self.last_accepted
            .get(&RuleKey::new(client_token, resource))
            .and_then(|slot| {
                let last = *slot.lock();
                last
            })
    }

    fn slot_for(&self, key: RuleKey) -> LastAccepted {
        if let Some(slot) = self.last_accepted.get(&key) {
            return slot.value().clone();
        }

        match self.last_accepted.entry(key) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                debug!(key = %entry.key(), "Tracking new sliding window key");
                entry.insert(Arc::new(Mutex::new(None))).value().clone()
            }
        }
    }
}

impl RateLimitRule for SlidingWindowRule {
    fn can_proceed(&self, client_token: &str, resource: &str, request_time: DateTime<Utc>) -> bool {
        let slot = self.slot_for(RuleKey::new(client_token, resource));
        let mut last = slot.lock();

        let allowed = match *last {
            Some(previous) => request_time.signed_duration_since(previous) >= self.minimum_interval,
            None => true,
        };

        if allowed {
            *last = Some(request_time);
        }

        trace!(
            client = client_token,
            resource = resource,
            allowed = allowed,
            "Sliding window evaluated"
        );

        allowed
    }
}
