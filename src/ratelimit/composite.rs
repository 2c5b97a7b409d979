//! Composite rule: logical AND over child rules.

use chrono::{DateTime, Utc};
use tracing::trace;

use super::rule::{evaluate_all, RateLimitRule, SharedRule};

/// Allows a request only if every child rule allows it.
///
/// Children are evaluated in construction order and evaluation stops at
/// the first denial. Rules after the denying one are never invoked, so
/// they neither accept nor record the request. Rules evaluated before the
/// denial keep whatever they recorded.
#[derive(Default)]
pub struct CompositeRule {
    rules: Vec<SharedRule>,
}

impl CompositeRule {
    /// Create a composite from an ordered collection of rules.
    pub fn new(rules: impl IntoIterator<Item = SharedRule>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
        }
    }

    /// Append a rule to the end of the evaluation order.
    pub fn push(&mut self, rule: SharedRule) {
        self.rules.push(rule);
    }

    /// Get the number of child rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the composite has no children (and therefore allows everything).
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RateLimitRule for CompositeRule {
    fn can_proceed(&self, client_token: &str, resource: &str, request_time: DateTime<Utc>) -> bool {
        let allowed = evaluate_all(&self.rules, client_token, resource, request_time);
        trace!(children = self.rules.len(), allowed = allowed, "Composite evaluated");
        allowed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ratelimit::rule::testing::StaticRule;
    use crate::ratelimit::{FixedWindowRule, SlidingWindowRule};
    use chrono::{TimeDelta, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_empty_composite_allows() {
        let composite = CompositeRule::default();
        assert!(composite.is_empty());
        assert!(composite.can_proceed("client", "api/x", start()));
    }

    #[test]
    fn test_all_children_allow() {
        let composite = CompositeRule::new([
            StaticRule::allow() as SharedRule,
            StaticRule::allow() as SharedRule,
        ]);
        assert_eq!(composite.len(), 2);
        assert!(composite.can_proceed("client", "api/x", start()));
    }

    #[test]
    fn test_any_denial_denies_regardless_of_position() {
        for deny_at in 0..3 {
            let rules: Vec<SharedRule> = (0..3)
                .map(|i| {
                    if i == deny_at {
                        StaticRule::deny() as SharedRule
                    } else {
                        StaticRule::allow() as SharedRule
                    }
                })
                .collect();
            let composite = CompositeRule::new(rules);
            assert!(!composite.can_proceed("client", "api/x", start()));
        }
    }

    #[test]
    fn test_short_circuit_skips_later_rules() {
        let denying = StaticRule::deny();
        let later = StaticRule::allow();
        let mut composite = CompositeRule::default();
        composite.push(denying.clone());
        composite.push(later.clone());

        assert!(!composite.can_proceed("client", "api/x", start()));
        assert_eq!(denying.calls(), 1);
        assert_eq!(later.calls(), 0);
    }

    #[test]
    fn test_earlier_rules_keep_their_records_on_later_denial() {
        let fixed = Arc::new(FixedWindowRule::new(5, TimeDelta::minutes(1)));
        let sliding = Arc::new(SlidingWindowRule::new(TimeDelta::seconds(10)));
        let composite = CompositeRule::new([fixed.clone() as SharedRule, sliding.clone() as SharedRule]);
        let t = start();

        assert!(composite.can_proceed("client", "api/x", t));
        assert!(!composite.can_proceed("client", "api/x", t + TimeDelta::seconds(1)));

        // The fixed window recorded both attempts; the sliding window only the first.
        assert_eq!(fixed.recorded("client", "api/x"), 2);
        assert_eq!(sliding.last_accepted("client", "api/x"), Some(t));
    }

    #[test]
    fn test_denial_by_first_child_leaves_second_untouched() {
        let sliding = Arc::new(SlidingWindowRule::new(TimeDelta::seconds(10)));
        let fixed = Arc::new(FixedWindowRule::new(5, TimeDelta::minutes(1)));
        let composite = CompositeRule::new([sliding.clone() as SharedRule, fixed.clone() as SharedRule]);
        let t = start();

        assert!(composite.can_proceed("client", "api/x", t));
        assert!(!composite.can_proceed("client", "api/x", t + TimeDelta::seconds(1)));
        assert_eq!(fixed.recorded("client", "api/x"), 1);
    }
}
