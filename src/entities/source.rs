//! Frame sources: immutable per-frame timing plus on-demand decode.
//!
//! The engine never parses containers. A source is anything that can answer
//! "how long is frame N" and "give me the pixels of frame N". Timing is fixed
//! when the source is built; [`Durations`] normalizes it so the player never
//! has to special-case degenerate input (zero frames, zero delays, NaN).

use log::debug;
use std::fmt;
use std::sync::Arc;

use crate::entities::Frame;
use crate::error::SourceError;

/// Delays shorter than this are treated as missing
pub const MIN_FRAME_DURATION: f64 = 0.01;

/// Delay substituted for missing or too-short delays
pub const DEFAULT_FRAME_DURATION: f64 = 0.1;

/// Normalized per-frame durations in seconds.
///
/// Invariants (enforced at construction):
/// - at least one entry
/// - every entry is finite and `>= MIN_FRAME_DURATION`
#[derive(Debug, Clone, PartialEq)]
pub struct Durations {
    values: Vec<f64>,
    total: f64,
}

impl Durations {
    /// Normalize raw delays for a source with `frame_count` frames.
    ///
    /// Short, negative and non-finite delays become [`DEFAULT_FRAME_DURATION`].
    /// The list is padded or truncated to `frame_count`; a zero frame count
    /// yields a single default-length frame.
    pub fn normalize(raw: Vec<f64>, frame_count: usize) -> Self {
        let target_len = frame_count.max(1);
        let raw_len = raw.len();

        let mut values: Vec<f64> = raw
            .into_iter()
            .map(|d| {
                if d.is_finite() && d >= MIN_FRAME_DURATION {
                    d
                } else {
                    DEFAULT_FRAME_DURATION
                }
            })
            .collect();
        values.resize(target_len, DEFAULT_FRAME_DURATION);

        if raw_len != target_len {
            debug!(
                "Durations normalized: {} delays for {} frames",
                raw_len, target_len
            );
        }

        let total = values.iter().sum();
        Self { values, total }
    }

    /// Every frame gets the same delay
    pub fn uniform(frame_count: usize, delay: f64) -> Self {
        Self::normalize(vec![delay; frame_count], frame_count)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Duration of frame `index` (panics if out of range, like slice indexing)
    pub fn get(&self, index: usize) -> f64 {
        self.values[index]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always false: normalization guarantees at least one frame
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sum of all durations
    pub fn total(&self) -> f64 {
        self.total
    }
}

/// Capability consumed by the player.
///
/// `decode` must be idempotent and safe to call from a worker thread; it may
/// be slow. Returning `None` marks the frame as undecodable.
pub trait FrameSource: Send + Sync {
    /// Point-to-pixel scale of decoded frames
    fn scale(&self) -> f32 {
        1.0
    }

    fn durations(&self) -> &Durations;

    fn frame_count(&self) -> usize {
        self.durations().len()
    }

    fn total_duration(&self) -> f64 {
        self.durations().total()
    }

    fn decode(&self, index: usize) -> Option<Frame>;
}

/// Shared handle to an externally owned source
pub type SharedSource = Arc<dyn FrameSource>;

/// Identity comparison for shared sources (same allocation, ignoring vtables)
pub fn same_source(a: &SharedSource, b: &SharedSource) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

// ============================================================================
// MemorySource
// ============================================================================

/// Source backed by frames that are already in memory
pub struct MemorySource {
    frames: Vec<Frame>,
    durations: Durations,
    scale: f32,
}

impl MemorySource {
    /// Build from decoded frames and their delays (seconds).
    ///
    /// Delays are normalized against the frame count; an empty frame list is
    /// rejected.
    pub fn new(frames: Vec<Frame>, delays: Vec<f64>) -> Result<Self, SourceError> {
        if frames.is_empty() {
            return Err(SourceError::Empty);
        }
        let durations = Durations::normalize(delays, frames.len());
        Ok(Self {
            frames,
            durations,
            scale: 1.0,
        })
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }
}

impl FrameSource for MemorySource {
    fn scale(&self) -> f32 {
        self.scale
    }

    fn durations(&self) -> &Durations {
        &self.durations
    }

    fn decode(&self, index: usize) -> Option<Frame> {
        self.frames
            .get(index)
            .map(|f| f.clone().with_scale(self.scale))
    }
}

impl fmt::Debug for MemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySource")
            .field("frames", &self.frames.len())
            .field("total", &self.durations.total())
            .finish()
    }
}

// ============================================================================
// FnSource
// ============================================================================

/// Source whose decode step is an arbitrary closure.
///
/// Useful for procedural animations and for hosts that keep their own decoder.
pub struct FnSource<F> {
    durations: Durations,
    scale: f32,
    decode: F,
}

impl<F> FnSource<F>
where
    F: Fn(usize) -> Option<Frame> + Send + Sync,
{
    /// One frame per delay; an empty delay list yields a single default frame.
    pub fn new(delays: Vec<f64>, decode: F) -> Self {
        let count = delays.len();
        Self {
            durations: Durations::normalize(delays, count),
            scale: 1.0,
            decode,
        }
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }
}

impl<F> FrameSource for FnSource<F>
where
    F: Fn(usize) -> Option<Frame> + Send + Sync,
{
    fn scale(&self) -> f32 {
        self.scale
    }

    fn durations(&self) -> &Durations {
        &self.durations
    }

    fn decode(&self, index: usize) -> Option<Frame> {
        (self.decode)(index).map(|f| f.with_scale(self.scale))
    }
}
