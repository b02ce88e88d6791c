//! Cache configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What happens to an entry once its last reference is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Entries stay cached until evicted explicitly.
    #[default]
    Manual,
    /// Entries are evicted as soon as their reference count drops to zero.
    Eager,
    /// Unreferenced entries are evicted after being idle for `after`.
    Idle {
        #[serde(with = "humantime_serde")]
        after: Duration,
    },
}

/// Resource cache settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub eviction: EvictionPolicy,
    /// Applied to every `acquire` that does not pick its own timeout.
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Option<Duration>,
}
