//! Time-series cache configuration.

use serde::{Deserialize, Serialize};

/// Defaults applied to newly created compressed caches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Frames covered by one column when the producer does not say.
    #[serde(default = "default_resolution")]
    pub default_resolution: u32,
    /// Capacity of each cache's change-notification channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_resolution: default_resolution(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_resolution() -> u32 {
    512
}

fn default_event_capacity() -> usize {
    256
}
