//! Change notifications published by a cache.

use annot_core::types::CacheId;
use serde::Serialize;

/// Default capacity of a cache's notification channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// What changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheEventKind {
    /// Anything may have changed; redraw everything.
    Changed,
    /// Only frames in `[start, end)` changed.
    ChangedWithin { start: i64, end: i64 },
    /// The completion percentage moved.
    CompletionChanged,
    /// The producer finished; the cache is complete.
    Ready,
}

/// A notification from one cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheEvent {
    pub cache: CacheId,
    #[serde(flatten)]
    pub kind: CacheEventKind,
}
