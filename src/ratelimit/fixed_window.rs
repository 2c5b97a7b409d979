//! Fixed-window rule: a bounded number of requests per trailing window.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::key::RuleKey;
use super::rule::RateLimitRule;

type RequestLog = Arc<Mutex<VecDeque<DateTime<Utc>>>>;

/// Allows at most `max_requests` per client and resource inside the
/// trailing window `[request_time - span, request_time]`.
///
/// The window is re-evaluated on every call rather than aligned to
/// calendar buckets. Each key has its own lock, so requests for different
/// keys never contend.
///
/// A rule with `max_requests == 0` or a non-positive `span` denies every
/// request and records nothing.
pub struct FixedWindowRule {
    /// Maximum accepted requests inside one window
    max_requests: usize,
    /// Length of the trailing window
    span: TimeDelta,
    /// Accepted request times indexed by rule key
    logs: DashMap<RuleKey, RequestLog>,
}

impl FixedWindowRule {
    /// Create a new fixed-window rule.
    pub fn new(max_requests: usize, span: TimeDelta) -> Self {
        Self {
            max_requests,
            span,
            logs: DashMap::new(),
        }
    }

    /// Get the maximum number of requests per window.
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Get the window span.
    pub fn span(&self) -> TimeDelta {
        self.span
    }

    /// Get the number of keys this rule has observed.
    pub fn tracked_keys(&self) -> usize {
        self.logs.len()
    }

    /// Get the number of accepted requests currently stored for a key.
    pub fn recorded(&self, client_token: &str, resource: &str) -> usize {
        self.logs
            .get(&RuleKey::new(client_token, resource))
            .map(|log| {
                let len = log.lock().len();
                len
            })
            .unwrap_or(0)
    }

    fn is_degenerate(&self) -> bool {
        self.max_requests == 0 || self.span <= TimeDelta::zero()
    }

    /// Get or lazily create the request log for a key.
    ///
    /// The map guard is released before the caller locks the log.
    fn log_for(&self, key: RuleKey) -> RequestLog {
        if let Some(log) = self.logs.get(&key) {
            return log.value().clone();
        }

        match self.logs.entry(key) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                debug!(key = %entry.key(), "Creating new request log");
                entry.insert(Arc::new(Mutex::new(VecDeque::new()))).value().clone()
            }
        }
    }
}

impl RateLimitRule for FixedWindowRule {
    fn can_proceed(&self, client_token: &str, resource: &str, request_time: DateTime<Utc>) -> bool {
        if self.is_degenerate() {
            trace!(
                max_requests = self.max_requests,
                span_ms = self.span.num_milliseconds(),
                "Degenerate fixed window denies request"
            );
            return false;
        }

        let key = RuleKey::new(client_token, resource);
        let log = self.log_for(key);
        let mut log = log.lock();

        // Pruning and the count-then-append happen under the same lock.
        if let Some(cutoff) = request_time.checked_sub_signed(self.span) {
            log.retain(|timestamp| *timestamp >= cutoff);
        }

        let allowed = log.len() < self.max_requests;
        if allowed {
            log.push_back(request_time);
        }

        trace!(
            client = client_token,
            resource = resource,
            in_window = log.len(),
            allowed = allowed,
            "Fixed window evaluated"
        );

        allowed
    }
}
