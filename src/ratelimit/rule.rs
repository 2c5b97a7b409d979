//! The rule abstraction shared by every rate limiting algorithm.

use std::sync::Arc;

use chrono::{DateTime, Utc};

/// A decision unit answering whether a client may access a resource at a
/// given instant.
///
/// Implementations keep their own keyed state and must be safe to call
/// from many threads at once. Calling `can_proceed` may record the
/// request, so a rule is not a pure predicate.
pub trait RateLimitRule: Send + Sync {
    /// Decide whether the request may proceed, recording it if accepted.
    fn can_proceed(&self, client_token: &str, resource: &str, request_time: DateTime<Utc>) -> bool;
}

/// A rule shared between the coordinator and any composites holding it.
pub type SharedRule = Arc<dyn RateLimitRule>;

/// Evaluate rules in order, stopping at the first denial.
///
/// Rules after a denial are never invoked and record nothing.
pub(crate) fn evaluate_all(
    rules: &[SharedRule],
    client_token: &str,
    resource: &str,
    request_time: DateTime<Utc>,
) -> bool {
    rules
        .iter()
        .all(|rule| rule.can_proceed(client_token, resource, request_time))
}
