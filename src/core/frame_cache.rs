//! Bounded frame cache shared between the tick context and the decode worker.
//!
//! Structure: `HashMap<usize, CacheEntry>` behind one `Mutex`
//! - Key: frame index of the attached source
//! - Value: decoded frame or a `Failed` sentinel (never retried)
//!
//! Locking rules:
//! - Critical sections are a map lookup or insert, nothing more
//! - Decoding happens outside the lock, always
//!
//! # Generations
//!
//! Every [`FrameCache::reset`] bumps a generation counter under the same lock
//! that guards the map. Preload jobs carry the generation they were started
//! with in a [`JobTicket`]; stores from an older generation are dropped, so a
//! job still decoding for a replaced source can never leak its frames into the
//! new source's cache.

use log::{debug, trace};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::entities::Frame;

/// Cached state of one frame index
#[derive(Debug, Clone)]
pub enum CacheEntry {
    Decoded(Frame),
    /// Decode returned no image; kept so the index is never decoded again
    Failed,
}

impl CacheEntry {
    pub fn frame(&self) -> Option<&Frame> {
        match self {
            CacheEntry::Decoded(frame) => Some(frame),
            CacheEntry::Failed => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CacheEntry::Failed)
    }
}

/// Cache statistics for monitoring hit rate
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    failures: AtomicU64,
}

impl CacheStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Decodes that produced a `Failed` sentinel
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.hits() + self.misses()
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 { 0.0 } else { self.hits() as f64 / total as f64 }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
    }
}

/// Permission for a background job to write into the cache.
///
/// Valid while the cache generation is unchanged and the job has not been
/// cancelled.
#[derive(Debug, Clone)]
pub struct JobTicket {
    generation: u64,
    cancelled: Arc<AtomicBool>,
}

impl JobTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<usize, CacheEntry>,
    /// Number of frames in the attached source; indices >= capacity are refused
    capacity: usize,
    generation: u64,
}

/// Frame cache for one player
#[derive(Debug, Default)]
pub struct FrameCache {
    state: Mutex<CacheState>,
    stats: CacheStats,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every entry, start a new generation sized for `frame_count` frames.
    ///
    /// Returns the new generation.
    pub fn reset(&self, frame_count: usize) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let dropped = state.entries.len();
        state.entries.clear();
        state.capacity = frame_count;
        state.generation += 1;
        self.stats.reset();
        debug!(
            "FrameCache reset: generation={} capacity={} (dropped {} entries)",
            state.generation, frame_count, dropped
        );
        state.generation
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).generation
    }

    /// Issue a ticket for the current generation
    pub fn ticket(&self, cancelled: Arc<AtomicBool>) -> JobTicket {
        JobTicket {
            generation: self.generation(),
            cancelled,
        }
    }

    /// Look up a frame index, recording hit/miss statistics.
    ///
    /// `None` means absent: the only outcome that warrants preloading.
    pub fn lookup(&self, index: usize) -> Option<CacheEntry> {
        let result = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.entries.get(&index).cloned()
        };

        if result.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        result
    }

    /// Presence check without touching statistics
    pub fn contains(&self, index: usize) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .contains_key(&index)
    }

    /// Insert for the current generation (tick context)
    pub fn insert(&self, index: usize, entry: CacheEntry) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Self::put(&mut state, &self.stats, index, entry)
    }

    /// Insert on behalf of a background job.
    ///
    /// Refused when the ticket is cancelled or belongs to an older generation.
    pub fn store(&self, ticket: &JobTicket, index: usize, entry: CacheEntry) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.generation != ticket.generation || ticket.is_cancelled() {
            trace!(
                "Store refused for frame {} (ticket gen {}, cache gen {})",
                index, ticket.generation, state.generation
            );
            return false;
        }
        Self::put(&mut state, &self.stats, index, entry)
    }

    fn put(state: &mut CacheState, stats: &CacheStats, index: usize, entry: CacheEntry) -> bool {
        if index >= state.capacity {
            return false;
        }
        if entry.is_failed() {
            stats.record_failure();
        }
        state.entries.insert(index, entry);
        true
    }

    /// Keep only indices `center ..= center + window` (mod frame count).
    pub fn trim_around(&self, center: usize, window: usize) -> usize {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let count = state.capacity;
        if count == 0 {
            return 0;
        }
        let before = state.entries.len();
        state
            .entries
            .retain(|&idx, _| within_window(idx, center, window, count));
        let removed = before - state.entries.len();
        debug!(
            "FrameCache trimmed around {} (window {}): removed {}, kept {}",
            center,
            window,
            removed,
            state.entries.len()
        );
        removed
    }

    /// Number of entries (decoded and failed)
    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of frames the cache is sized for
    pub fn capacity(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).capacity
    }

    /// True when every index of the source has an entry
    pub fn is_full(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.len() >= state.capacity
    }

    /// Sorted list of cached indices
    pub fn indices(&self) -> Vec<usize> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<usize> = state.entries.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Bytes held by decoded frames
    pub fn mem(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .entries
            .values()
            .filter_map(CacheEntry::frame)
            .map(Frame::mem)
            .sum()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

/// Is `idx` one of `center, center+1, ..., center+window` modulo `count`?
pub fn within_window(idx: usize, center: usize, window: usize, count: usize) -> bool {
    if window + 1 >= count {
        return true;
    }
    let distance = (idx + count - center % count) % count;
    distance <= window
}
