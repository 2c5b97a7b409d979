//! Configuration management for Gatekeeper.
//!
//! A configuration file describes logging, the rules attached to each
//! region and resource, and an initial set of client region assignments.
//! [`GatekeeperConfig::build_limiter`] turns it into a ready [`RateLimiter`].

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{GatekeeperError, Result};
use crate::ratelimit::{CompositeRule, FixedWindowRule, RateLimiter, SharedRule, SlidingWindowRule};

/// Main configuration for Gatekeeper.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Rules applied to every client of a region, keyed by region
    #[serde(default)]
    pub regions: HashMap<String, Vec<RuleConfig>>,

    /// Rules applied to a resource, keyed by resource
    #[serde(default)]
    pub resources: HashMap<String, Vec<RuleConfig>>,

    /// Initial client region assignments, keyed by client token
    #[serde(default)]
    pub clients: HashMap<String, String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log filter, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// A single rule definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleConfig {
    /// At most `max_requests` per trailing window of `span` units
    FixedWindow {
        max_requests: usize,
        span: i64,
        #[serde(default)]
        unit: TimeUnit,
    },
    /// At least `min_interval` units between accepted requests
    SlidingWindow {
        min_interval: i64,
        #[serde(default)]
        unit: TimeUnit,
    },
    /// All nested rules must allow the request
    Composite {
        #[serde(default)]
        rules: Vec<RuleConfig>,
    },
}

/// Time unit for rule spans and intervals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Millisecond,
    #[default]
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Get the length of one unit in milliseconds.
    pub fn as_millis(&self) -> i64 {
        match self {
            TimeUnit::Millisecond => 1,
            TimeUnit::Second => 1_000,
            TimeUnit::Minute => 60_000,
            TimeUnit::Hour => 3_600_000,
            TimeUnit::Day => 86_400_000,
        }
    }

    /// Convert an amount of this unit to a signed duration.
    pub fn to_delta(&self, amount: i64) -> Result<TimeDelta> {
        amount
            .checked_mul(self.as_millis())
            .and_then(TimeDelta::try_milliseconds)
            .ok_or_else(|| {
                GatekeeperError::Config(format!("Duration of {} {:?} is out of range", amount, self))
            })
    }
}

impl RuleConfig {
    /// Construct the rule this definition describes.
    pub fn build(&self) -> Result<SharedRule> {
        match self {
            RuleConfig::FixedWindow {
                max_requests,
                span,
                unit,
            } => {
                let span = unit.to_delta(*span)?;
                if *max_requests == 0 || span <= TimeDelta::zero() {
                    warn!(
                        max_requests = max_requests,
                        span_ms = span.num_milliseconds(),
                        "Fixed window rule will deny every request"
                    );
                }
                Ok(Arc::new(FixedWindowRule::new(*max_requests, span)))
            }
            RuleConfig::SlidingWindow { min_interval, unit } => {
                let interval = unit.to_delta(*min_interval)?;
                if interval < TimeDelta::zero() {
                    warn!(
                        min_interval_ms = interval.num_milliseconds(),
                        "Negative sliding window interval only rejects out-of-order requests"
                    );
                }
                Ok(Arc::new(SlidingWindowRule::new(interval)))
            }
            RuleConfig::Composite { rules } => {
                let children = rules
                    .iter()
                    .map(RuleConfig::build)
                    .collect::<Result<Vec<_>>>()?;
                Ok(Arc::new(CompositeRule::new(children)))
            }
        }
    }
}

impl GatekeeperConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| GatekeeperError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Build a rate limiter with every configured rule and client registered.
    pub fn build_limiter(&self) -> Result<RateLimiter> {
        let limiter = RateLimiter::new();

        for (region, rules) in &self.regions {
            for rule in rules {
                limiter.add_region_rule(region, rule.build()?);
            }
        }

        for (resource, rules) in &self.resources {
            for rule in rules {
                limiter.add_rule(resource, rule.build()?);
            }
        }

        for (client, region) in &self.clients {
            limiter.register_client_region(client, region);
        }

        info!(
            regions = self.regions.len(),
            resources = self.resources.len(),
            clients = self.clients.len(),
            "Rate limiter configured"
        );

        Ok(limiter)
    }
}
