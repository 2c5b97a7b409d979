//! Rate limiting rules and the coordinator that dispatches to them.

mod composite;
mod fixed_window;
mod key;
mod limiter;
mod rule;
mod sliding_window;

pub use composite::CompositeRule;
pub use fixed_window::FixedWindowRule;
pub use key::RuleKey;
pub use limiter::RateLimiter;
pub use rule::{RateLimitRule, SharedRule};
pub use sliding_window::SlidingWindowRule;
