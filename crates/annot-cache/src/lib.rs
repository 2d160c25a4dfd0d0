//! # annot-cache
//!
//! A dense grid of `f32` columns over time, as produced by feature
//! extraction plugins. Columns that repeat long runs of a nearby column are
//! stored truncated and expanded transparently on read. Writers and readers
//! may run on different threads; change notifications go out over a
//! broadcast channel.

pub mod column;
pub mod dense;
pub mod error;
pub mod events;
pub mod export;
pub mod log_scale;

pub use column::{ColumnStore, MAX_TRUNCATION_DISTANCE, Truncation};
pub use dense::CompressedDenseCache;
pub use error::CacheError;
pub use events::{CacheEvent, CacheEventKind};
