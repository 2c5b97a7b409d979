//! The limiter coordinator: region rules first, then resource rules.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, trace, warn};

use super::rule::{evaluate_all, SharedRule};
use crate::error::{GatekeeperError, Result};

/// Rule lists are replaced wholesale on registration, so readers can hold
/// a snapshot without keeping a map guard.
type RuleList = Arc<Vec<SharedRule>>;

/// Coordinates rate limiting rules scoped by client region and by resource.
///
/// Every client must be registered to a region before it is checked.
/// A check runs all rules of the client's region, then all rules of the
/// requested resource, stopping at the first denial. The coordinator keeps
/// no timing state of its own; that lives in the rules.
///
/// This struct is thread-safe and can be shared across threads.
#[derive(Default)]
pub struct RateLimiter {
    /// Rules indexed by resource
    resource_rules: DashMap<String, RuleList>,
    /// Rules indexed by region
    region_rules: DashMap<String, RuleList>,
    /// Region assignment indexed by client token
    client_regions: DashMap<String, String>,
}

impl RateLimiter {
    /// Create an empty rate limiter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule to the rules of `resource`.
    ///
    /// Rules are not deduplicated; adding the same rule twice evaluates it twice.
    pub fn add_rule(&self, resource: &str, rule: SharedRule) {
        append_rule(&self.resource_rules, resource, rule);
        debug!(resource = resource, "Resource rule added");
    }

    /// Append a rule to the rules of `region`.
    pub fn add_region_rule(&self, region: &str, rule: SharedRule) {
        append_rule(&self.region_rules, region, rule);
        debug!(region = region, "Region rule added");
    }

    /// Assign a client to a region, replacing any previous assignment.
    ///
    /// The region does not need any rules registered.
    pub fn register_client_region(&self, client_token: &str, region: &str) {
        let previous = self
            .client_regions
            .insert(client_token.to_string(), region.to_string());
        debug!(
            client = client_token,
            region = region,
            previous = ?previous,
            "Client region registered"
        );
    }

    /// Decide whether a client may access a resource at `request_time`.
    ///
    /// Returns [`GatekeeperError::InvalidClientState`] if the client has no
    /// region or a blank one; no rule is evaluated in that case.
    pub fn can_proceed(
        &self,
        client_token: &str,
        resource: &str,
        request_time: DateTime<Utc>,
    ) -> Result<bool> {
        let region = self.valid_region(client_token)?;

        trace!(
            client = client_token,
            region = %region,
            resource = resource,
            "Checking admission"
        );

        let region_rules = snapshot(&self.region_rules, &region);
        if !evaluate_all(&region_rules, client_token, resource, request_time) {
            debug!(
                client = client_token,
                region = %region,
                resource = resource,
                phase = "region",
                "Request denied"
            );
            return Ok(false);
        }

        let resource_rules = snapshot(&self.resource_rules, resource);
        if !evaluate_all(&resource_rules, client_token, resource, request_time) {
            debug!(
                client = client_token,
                region = %region,
                resource = resource,
                phase = "resource",
                "Request denied"
            );
            return Ok(false);
        }

        Ok(true)
    }

    /// Get the region a client is registered to.
    pub fn client_region(&self, client_token: &str) -> Option<String> {
        self.client_regions
            .get(client_token)
            .map(|region| region.value().clone())
    }

    /// Get the number of registered clients.
    pub fn client_count(&self) -> usize {
        self.client_regions.len()
    }

    /// Get the number of rules registered for a resource.
    pub fn resource_rule_count(&self, resource: &str) -> usize {
        snapshot(&self.resource_rules, resource).len()
    }

    /// Get the number of rules registered for a region.
    pub fn region_rule_count(&self, region: &str) -> usize {
        snapshot(&self.region_rules, region).len()
    }

    fn valid_region(&self, client_token: &str) -> Result<String> {
        match self.client_region(client_token) {
            Some(region) if !region.trim().is_empty() => Ok(region),
            _ => {
                warn!(client = client_token, "Client has no valid region assigned");
                Err(GatekeeperError::InvalidClientState {
                    client_token: client_token.to_string(),
                })
            }
        }
    }
}

fn append_rule(rules: &DashMap<String, RuleList>, scope: &str, rule: SharedRule) {
    let mut list = rules.entry(scope.to_string()).or_default();
    // Clones the list only if a reader still holds the old snapshot.
    Arc::make_mut(list.value_mut()).push(rule);
}

fn snapshot(rules: &DashMap<String, RuleList>, scope: &str) -> RuleList {
    rules
        .get(scope)
        .map(|list| list.value().clone())
        .unwrap_or_default()
}
