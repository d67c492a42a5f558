//! # Subscription Configuration
//!
//! Timing and capacity knobs for a subscription, plus the signature
//! verification policy.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::SubscriptionError;

/// Default interval between group-key requests and before a gap is reported.
pub const DEFAULT_PROPAGATION_TIMEOUT_MS: u64 = 5_000;

/// Default interval between repeated gap reports.
pub const DEFAULT_RESEND_TIMEOUT_MS: u64 = 5_000;

/// Default capacity of a chain's out-of-order buffer.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 10_000;

/// Default number of gap reports before a gap is abandoned.
pub const DEFAULT_MAX_GAP_REQUESTS: u32 = 10;

/// Default number of requests sent for one group key.
pub const MAX_NB_GROUP_KEY_REQUESTS: u32 = 10;

/// Subscription configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Delay before a gap is first reported; also the group-key retry interval.
    pub propagation_timeout_ms: u64,

    /// Interval between repeated reports of the same gap.
    pub resend_timeout_ms: u64,

    /// Skip a gap instead of stalling when a chain's buffer overflows.
    pub skip_gaps_on_full_queue: bool,

    /// Capacity of each chain's out-of-order buffer.
    pub max_queue_size: usize,

    /// Gap reports per gap before giving up.
    pub max_gap_requests: u32,

    /// Group-key requests per key before giving up.
    pub max_group_key_requests: u32,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            propagation_timeout_ms: DEFAULT_PROPAGATION_TIMEOUT_MS,
            resend_timeout_ms: DEFAULT_RESEND_TIMEOUT_MS,
            skip_gaps_on_full_queue: true,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            max_gap_requests: DEFAULT_MAX_GAP_REQUESTS,
            max_group_key_requests: MAX_NB_GROUP_KEY_REQUESTS,
        }
    }
}

impl SubscriptionConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SD_PROPAGATION_TIMEOUT_MS` (default: 5000)
    /// - `SD_RESEND_TIMEOUT_MS` (default: 5000)
    /// - `SD_SKIP_GAPS_ON_FULL_QUEUE` (default: true)
    /// - `SD_MAX_QUEUE_SIZE` (default: 10000)
    /// - `SD_MAX_GAP_REQUESTS` (default: 10)
    /// - `SD_MAX_GROUP_KEY_REQUESTS` (default: 10)
    ///
    /// Unparsable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            propagation_timeout_ms: env_parse("SD_PROPAGATION_TIMEOUT_MS")
                .unwrap_or(defaults.propagation_timeout_ms),
            resend_timeout_ms: env_parse("SD_RESEND_TIMEOUT_MS")
                .unwrap_or(defaults.resend_timeout_ms),
            skip_gaps_on_full_queue: env::var("SD_SKIP_GAPS_ON_FULL_QUEUE")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.skip_gaps_on_full_queue),
            max_queue_size: env_parse("SD_MAX_QUEUE_SIZE").unwrap_or(defaults.max_queue_size),
            max_gap_requests: env_parse("SD_MAX_GAP_REQUESTS")
                .unwrap_or(defaults.max_gap_requests),
            max_group_key_requests: env_parse("SD_MAX_GROUP_KEY_REQUESTS")
                .unwrap_or(defaults.max_group_key_requests),
        }
    }

    /// Create a config for testing (short timers, small buffers).
    pub fn for_testing() -> Self {
        Self {
            propagation_timeout_ms: 100,
            resend_timeout_ms: 100,
            skip_gaps_on_full_queue: true,
            max_queue_size: 16,
            max_gap_requests: DEFAULT_MAX_GAP_REQUESTS,
            max_group_key_requests: MAX_NB_GROUP_KEY_REQUESTS,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), SubscriptionError> {
        // Validate timeouts
        if self.propagation_timeout_ms == 0 {
            return Err(SubscriptionError::InvalidConfig(
                "propagation_timeout_ms cannot be 0".into(),
            ));
        }
        if self.resend_timeout_ms == 0 {
            return Err(SubscriptionError::InvalidConfig(
                "resend_timeout_ms cannot be 0".into(),
            ));
        }

        // Validate limits
        if self.max_queue_size == 0 {
            return Err(SubscriptionError::InvalidConfig(
                "max_queue_size cannot be 0".into(),
            ));
        }
        if self.max_gap_requests == 0 {
            return Err(SubscriptionError::InvalidConfig(
                "max_gap_requests cannot be 0".into(),
            ));
        }
        if self.max_group_key_requests == 0 {
            return Err(SubscriptionError::InvalidConfig(
                "max_group_key_requests cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Propagation timeout as a `Duration`.
    pub fn propagation_timeout(&self) -> Duration {
        Duration::from_millis(self.propagation_timeout_ms)
    }

    /// Resend timeout as a `Duration`.
    pub fn resend_timeout(&self) -> Duration {
        Duration::from_millis(self.resend_timeout_ms)
    }
}

/// When publisher signatures are checked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignatureVerificationPolicy {
    /// Every message must carry a valid signature.
    Always,
    /// Signatures are never checked.
    Never,
    /// Signed messages are checked; unsigned ones pass unless the stream requires signing.
    #[default]
    Auto,
}

/// Signature verification configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Verification policy.
    pub policy: SignatureVerificationPolicy,
    /// Lifetime of cached stream metadata, in seconds.
    pub stream_cache_ttl_secs: u64,
    /// Lifetime of cached publisher sets, in seconds.
    pub publisher_cache_ttl_secs: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            policy: SignatureVerificationPolicy::Auto,
            stream_cache_ttl_secs: 15 * 60,
            publisher_cache_ttl_secs: 30 * 60,
        }
    }
}

impl VerificationConfig {
    /// Builder method: set the policy.
    pub fn with_policy(mut self, policy: SignatureVerificationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stream metadata TTL as a `Duration`.
    pub fn stream_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.stream_cache_ttl_secs)
    }

    /// Publisher set TTL as a `Duration`.
    pub fn publisher_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.publisher_cache_ttl_secs)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}
