//! The compressed dense three-dimensional cache.
//!
//! Columns are indexed by time (each covers `resolution` frames) and hold
//! one value per bin. Readers take a shared lock; `set_column` and the
//! notifying setters take an exclusive one.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use annot_core::config::cache::CacheConfig;
use annot_core::types::CacheId;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::column::ColumnStore;
use crate::events::{CacheEvent, CacheEventKind, DEFAULT_EVENT_CAPACITY};
use crate::log_scale::should_use_log_scale;

/// Columns sampled by [`CompressedDenseCache::should_use_log_value_scale`].
const LOG_SCALE_SAMPLE_STRIDE: usize = 10;
const LOG_SCALE_SAMPLES: usize = 10;

#[derive(Debug)]
pub(crate) struct DenseState {
    pub(crate) store: ColumnStore,
    pub(crate) sample_rate: f64,
    pub(crate) resolution: u32,
    pub(crate) start_frame: i64,
    pub(crate) minimum: f32,
    pub(crate) maximum: f32,
    have_extents: bool,
    notify_on_add: bool,
    /// Window starts written since the last ranged notification.
    touched: Option<(i64, i64)>,
    completion: u8,
    unit: String,
    pub(crate) bin_names: Vec<String>,
    bin_values: Vec<f32>,
    bin_value_unit: String,
}

impl DenseState {
    pub(crate) fn column(&self, index: usize) -> Vec<f32> {
        self.store.get(index).unwrap_or_default()
    }

    pub(crate) fn true_end_frame(&self) -> i64 {
        let resolution = i64::from(self.resolution);
        resolution * self.store.width() as i64 + (resolution - 1)
    }
}

/// Thread-safe, losslessly compressed grid of `f32` values.
#[derive(Debug)]
pub struct CompressedDenseCache {
    id: CacheId,
    state: RwLock<DenseState>,
    events: broadcast::Sender<CacheEvent>,
}

impl CompressedDenseCache {
    /// Creates an empty cache.
    ///
    /// With `notify_on_add` unset the cache starts in bulk-fill mode: writes
    /// are coalesced until [`set_completion`](Self::set_completion) reports
    /// progress or reaches 100.
    pub fn new(sample_rate: f64, resolution: u32, bin_count: usize, notify_on_add: bool) -> Self {
        Self::with_event_capacity(sample_rate, resolution, bin_count, notify_on_add, DEFAULT_EVENT_CAPACITY)
    }

    /// Creates an empty cache using configured defaults for resolution and
    /// notification capacity.
    pub fn from_config(config: &CacheConfig, sample_rate: f64, bin_count: usize, notify_on_add: bool) -> Self {
        Self::with_event_capacity(
            sample_rate,
            config.default_resolution,
            bin_count,
            notify_on_add,
            config.event_capacity,
        )
    }

    fn with_event_capacity(
        sample_rate: f64,
        resolution: u32,
        bin_count: usize,
        notify_on_add: bool,
        capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        let id = CacheId::new();
        debug!(cache = %id, sample_rate, resolution, bin_count, notify_on_add, "Created dense cache");
        Self {
            id,
            state: RwLock::new(DenseState {
                store: ColumnStore::new(bin_count),
                sample_rate,
                resolution: resolution.max(1),
                start_frame: 0,
                minimum: 0.0,
                maximum: 0.0,
                have_extents: false,
                notify_on_add,
                touched: None,
                completion: 100,
                unit: String::new(),
                bin_names: Vec::new(),
                bin_values: Vec::new(),
                bin_value_unit: String::new(),
            }),
            events,
        }
    }

    /// Identifier carried on every event.
    pub fn id(&self) -> CacheId {
        self.id
    }

    /// Receives subsequent change notifications. A receiver that falls more
    /// than the channel capacity behind loses the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, DenseState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, DenseState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, kind: CacheEventKind) {
        trace!(cache = %self.id, ?kind, "Cache event");
        // No subscribers is fine.
        let _ = self.events.send(CacheEvent { cache: self.id, kind });
    }

    // Geometry

    pub fn sample_rate(&self) -> f64 {
        self.read().sample_rate
    }

    pub fn start_frame(&self) -> i64 {
        self.read().start_frame
    }

    pub fn set_start_frame(&self, frame: i64) {
        self.write().start_frame = frame;
    }

    /// Frames per column.
    pub fn resolution(&self) -> u32 {
        self.read().resolution
    }

    pub fn set_resolution(&self, resolution: u32) {
        self.write().resolution = resolution.max(1);
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.read().store.width()
    }

    /// Number of bins per column.
    pub fn height(&self) -> usize {
        self.read().store.height()
    }

    pub fn set_height(&self, bin_count: usize) {
        self.write().store.set_height(bin_count);
    }

    /// Last frame covered by the final column.
    pub fn true_end_frame(&self) -> i64 {
        self.read().true_end_frame()
    }

    // Values

    /// Smallest finite value stored so far, or as last set.
    pub fn minimum_level(&self) -> f32 {
        self.read().minimum
    }

    pub fn set_minimum_level(&self, level: f32) {
        self.write().minimum = level;
    }

    /// Largest finite value stored so far, or as last set.
    pub fn maximum_level(&self) -> f32 {
        self.read().maximum
    }

    pub fn set_maximum_level(&self, level: f32) {
        self.write().maximum = level;
    }

    pub fn value_unit(&self) -> String {
        self.read().unit.clone()
    }

    pub fn set_value_unit(&self, unit: impl Into<String>) {
        self.write().unit = unit.into();
    }

    /// The fully expanded column at `index`, or empty past the end.
    pub fn column(&self, index: usize) -> Vec<f32> {
        self.read().column(index)
    }

    /// The value at `(index, bin)`, or the minimum level when either is
    /// out of range.
    pub fn value_at(&self, index: usize, bin: usize) -> f32 {
        let state = self.read();
        state
            .store
            .get(index)
            .and_then(|c| c.get(bin).copied())
            .unwrap_or(state.minimum)
    }

    /// Floats physically held, across all columns.
    pub fn stored_value_count(&self) -> usize {
        self.read().store.stored_total()
    }

    /// Writes the column at `index`, widening the extents with its finite
    /// values and notifying according to the completion state.
    pub fn set_column(&self, index: usize, values: &[f32]) {
        let kind = {
            let mut state = self.write();

            let mut extents_changed = false;
            for &value in values.iter().filter(|v| v.is_finite()) {
                if !state.have_extents || value < state.minimum {
                    state.minimum = value;
                    extents_changed = true;
                }
                if !state.have_extents || value > state.maximum {
                    state.maximum = value;
                    extents_changed = true;
                }
                state.have_extents = true;
            }

            state.store.set(index, values.to_vec());

            let resolution = i64::from(state.resolution);
            let window_start = index as i64 * resolution;

            if state.notify_on_add {
                Some(if extents_changed {
                    CacheEventKind::Changed
                } else {
                    CacheEventKind::ChangedWithin {
                        start: window_start,
                        end: window_start + resolution,
                    }
                })
            } else if extents_changed {
                state.touched = None;
                Some(CacheEventKind::Changed)
            } else {
                state.touched = Some(match state.touched {
                    Some((min, max)) => (min.min(window_start), max.max(window_start)),
                    None => (window_start, window_start),
                });
                None
            }
        };

        if let Some(kind) = kind {
            self.emit(kind);
        }
    }

    // Bins

    /// Name of bin `n`, or empty.
    pub fn bin_name(&self, n: usize) -> String {
        self.read().bin_names.get(n).cloned().unwrap_or_default()
    }

    pub fn bin_names(&self) -> Vec<String> {
        self.read().bin_names.clone()
    }

    /// Names bin `n`, padding earlier unnamed bins with empty names.
    pub fn set_bin_name(&self, n: usize, name: impl Into<String>) {
        {
            let mut state = self.write();
            if state.bin_names.len() <= n {
                state.bin_names.resize(n + 1, String::new());
            }
            state.bin_names[n] = name.into();
        }
        self.emit(CacheEventKind::Changed);
    }

    pub fn set_bin_names(&self, names: Vec<String>) {
        self.write().bin_names = names;
        self.emit(CacheEventKind::Changed);
    }

    pub fn has_bin_values(&self) -> bool {
        !self.read().bin_values.is_empty()
    }

    /// Value associated with bin `n` (e.g. its centre frequency), or 0.
    pub fn bin_value(&self, n: usize) -> f32 {
        self.read().bin_values.get(n).copied().unwrap_or(0.0)
    }

    pub fn set_bin_values(&self, values: Vec<f32>) {
        self.write().bin_values = values;
    }

    pub fn bin_value_unit(&self) -> String {
        self.read().bin_value_unit.clone()
    }

    pub fn set_bin_value_unit(&self, unit: impl Into<String>) {
        self.write().bin_value_unit = unit.into();
    }

    /// Whether the stored values are better displayed on a log scale,
    /// judged from every 10th of the first 100 columns averaged per bin.
    pub fn should_use_log_value_scale(&self) -> bool {
        let state = self.read();

        let mut sums: Vec<f64> = Vec::new();
        let mut counts: Vec<usize> = Vec::new();
        for index in (0..LOG_SCALE_SAMPLES).map(|i| i * LOG_SCALE_SAMPLE_STRIDE) {
            let Some(column) = state.store.get(index) else {
                continue;
            };
            if column.len() > sums.len() {
                sums.resize(column.len(), 0.0);
                counts.resize(column.len(), 0);
            }
            for (bin, value) in column.iter().enumerate() {
                sums[bin] += f64::from(*value);
                counts[bin] += 1;
            }
        }

        if sums.is_empty() {
            return false;
        }
        let averages: Vec<f64> = sums
            .iter()
            .zip(&counts)
            .map(|(sum, &n)| if n > 0 { sum / n as f64 } else { *sum })
            .collect();
        should_use_log_scale(&averages)
    }

    // Completion

    /// Percentage of the cache the producer has filled.
    pub fn completion(&self) -> u8 {
        self.read().completion
    }

    /// Whether the producer has finished.
    pub fn is_ready(&self) -> bool {
        self.completion() >= 100
    }

    /// Records producer progress. Reaching 100 switches to per-write
    /// notification for good and announces readiness. Below 100 in bulk
    /// mode, `update` flushes the coalesced range of writes.
    pub fn set_completion(&self, completion: u8, update: bool) {
        let completion = completion.min(100);
        let events: Vec<CacheEventKind> = {
            let mut state = self.write();
            if state.completion == completion {
                return;
            }
            state.completion = completion;

            if completion == 100 {
                state.notify_on_add = true;
                debug!(cache = %self.id, "Dense cache complete");
                vec![CacheEventKind::Changed, CacheEventKind::Ready]
            } else if !state.notify_on_add {
                match (update, state.touched.take()) {
                    (true, Some((min, max))) => vec![CacheEventKind::ChangedWithin {
                        start: min,
                        end: max + i64::from(state.resolution),
                    }],
                    (_, touched) => {
                        state.touched = touched;
                        vec![CacheEventKind::CompletionChanged]
                    }
                }
            } else {
                vec![CacheEventKind::CompletionChanged]
            }
        };

        for kind in events {
            self.emit(kind);
        }
    }
}
