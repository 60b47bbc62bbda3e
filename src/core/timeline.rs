//! Timeline math: elapsed time <-> frame index.
//!
//! Pure functions over a precomputed prefix-sum array. Every seek and every
//! tick in the player goes through here; nothing else maps time to frames.
//!
//! # Conventions
//!
//! - `prefix_sum(i)` is the cumulative duration of frames `0..=i`
//!   (i.e. the end time of frame `i`).
//! - Frame `i` covers `[prefix_sum(i-1), prefix_sum(i))`, with
//!   `prefix_sum(-1) = 0`.
//! - Times wrap modulo the total duration; indices wrap modulo frame count.

use crate::entities::Durations;

/// Frame timing for one attached source
#[derive(Debug, Clone)]
pub struct Timeline {
    durations: Vec<f64>,
    /// prefix[i] = end time of frame i
    prefix: Vec<f64>,
    total: f64,
}

impl Timeline {
    pub fn new(durations: &Durations) -> Self {
        let durations = durations.as_slice().to_vec();
        let prefix: Vec<f64> = durations
            .iter()
            .scan(0.0, |acc, d| {
                *acc += d;
                Some(*acc)
            })
            .collect();
        let total = prefix.last().copied().unwrap_or(0.0);
        Self {
            durations,
            prefix,
            total,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.durations.len()
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    /// Duration of frame `index`
    pub fn duration(&self, index: usize) -> f64 {
        self.durations[index]
    }

    /// Cumulative duration of frames `0..=index`
    pub fn prefix_sum(&self, index: usize) -> f64 {
        self.prefix[index]
    }

    /// Wrap any time into `[0, total)`. Non-finite input maps to 0.
    pub fn wrap_time(&self, t: f64) -> f64 {
        if !t.is_finite() || self.total <= 0.0 {
            return 0.0;
        }
        let wrapped = t - (t / self.total).floor() * self.total;
        // Rounding can land exactly on `total` (or a hair past it)
        if wrapped >= self.total || wrapped < 0.0 {
            0.0
        } else {
            wrapped
        }
    }

    /// Wrap any (possibly negative) index into `[0, frame_count)`
    pub fn wrap_index(&self, index: i64) -> usize {
        index.rem_euclid(self.frame_count() as i64) as usize
    }

    /// Smallest `i` with `prefix_sum(i) > wrap(t)`
    pub fn index_for_time(&self, t: f64) -> usize {
        let t = self.wrap_time(t);
        let idx = self.prefix.partition_point(|&end| end <= t);
        idx.min(self.frame_count() - 1)
    }

    /// Start time of frame `index` (`prefix_sum(index - 1)`, 0 for index 0)
    pub fn time_for_frame_start(&self, index: usize) -> f64 {
        if index == 0 { 0.0 } else { self.prefix[index - 1] }
    }

    /// End time of frame `index` (same as `prefix_sum(index)`)
    pub fn frame_end(&self, index: usize) -> f64 {
        self.prefix[index]
    }

    /// Move `current` forward by `delta_real * speed`, wrapping at the end
    pub fn advance(&self, current: f64, delta_real: f64, speed: f64) -> f64 {
        self.wrap_time(current + delta_real * speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline(delays: &[f64]) -> Timeline {
        Timeline::new(&Durations::normalize(delays.to_vec(), delays.len()))
    }

    /// Reference implementation: linear scan over cumulative sums
    fn linear_index(tl: &Timeline, t: f64) -> usize {
        let t = tl.wrap_time(t);
        let mut acc = 0.0;
        for i in 0..tl.frame_count() {
            acc += tl.duration(i);
            if t < acc {
                return i;
            }
        }
        tl.frame_count() - 1
    }

    #[test]
    fn test_prefix_sums() {
        let tl = timeline(&[0.1, 0.2, 0.1]);
        assert_eq!(tl.frame_count(), 3);
        assert!((tl.total() - 0.4).abs() < 1e-12);
        assert!((tl.prefix_sum(0) - 0.1).abs() < 1e-12);
        assert!((tl.prefix_sum(1) - 0.3).abs() < 1e-12);
        assert_eq!(tl.time_for_frame_start(0), 0.0);
        assert!((tl.time_for_frame_start(2) - 0.3).abs() < 1e-12);
        assert_eq!(tl.frame_end(1), tl.prefix_sum(1));
    }

    #[test]
    fn test_index_for_time_example() {
        let tl = timeline(&[0.1, 0.2, 0.1]);
        assert_eq!(tl.index_for_time(0.0), 0);
        assert_eq!(tl.index_for_time(0.05), 0);
        assert_eq!(tl.index_for_time(0.25), 1);
        assert_eq!(tl.index_for_time(0.35), 2);
        assert_eq!(tl.index_for_time(0.3999), 2);
    }

    #[test]
    fn test_index_for_time_boundaries() {
        let tl = timeline(&[0.1, 0.2, 0.1]);
        // A frame's end time belongs to the next frame
        assert_eq!(tl.index_for_time(tl.prefix_sum(0)), 1);
        assert_eq!(tl.index_for_time(tl.prefix_sum(1)), 2);
        // Total wraps to the start
        assert_eq!(tl.index_for_time(tl.total()), 0);
    }

    #[test]
    fn test_index_matches_interval_property() {
        let tl = timeline(&[0.05, 0.12, 0.3, 0.01, 0.07, 0.2]);
        let steps = 2000;
        for k in 0..steps {
            let t = tl.total() * k as f64 / steps as f64;
            let i = tl.index_for_time(t);
            assert!(tl.time_for_frame_start(i) <= t, "t={} i={}", t, i);
            assert!(t < tl.prefix_sum(i), "t={} i={}", t, i);
            assert_eq!(i, linear_index(&tl, t), "binary search diverged at t={}", t);
        }
    }

    #[test]
    fn test_wrap_time() {
        let tl = timeline(&[0.1, 0.2, 0.1]);
        assert_eq!(tl.wrap_time(0.4), 0.0);
        assert!((tl.wrap_time(0.9) - 0.1).abs() < 1e-9);
        assert!((tl.wrap_time(-0.1) - 0.3).abs() < 1e-9);
        assert_eq!(tl.wrap_time(f64::NAN), 0.0);
        assert_eq!(tl.wrap_time(f64::INFINITY), 0.0);
        for t in [0.0, 0.39999999, 4.0, -7.3, 1e6] {
            let w = tl.wrap_time(t);
            assert!((0.0..tl.total()).contains(&w), "wrap({}) = {}", t, w);
        }
    }

    #[test]
    fn test_wrap_index() {
        let tl = timeline(&[0.1; 5]);
        assert_eq!(tl.wrap_index(0), 0);
        assert_eq!(tl.wrap_index(5), 0);
        assert_eq!(tl.wrap_index(7), 2);
        assert_eq!(tl.wrap_index(-1), 4);
        assert_eq!(tl.wrap_index(-6), 4);
    }

    #[test]
    fn test_advance() {
        let tl = timeline(&[0.1, 0.2, 0.1]);
        assert!((tl.advance(0.0, 0.1, 1.0) - 0.1).abs() < 1e-12);
        assert!((tl.advance(0.1, 0.05, 2.0) - 0.2).abs() < 1e-12);
        assert!((tl.advance(0.35, 0.1, 1.0) - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_single_frame() {
        let tl = timeline(&[0.5]);
        assert_eq!(tl.index_for_time(0.0), 0);
        assert_eq!(tl.index_for_time(0.49), 0);
        assert_eq!(tl.index_for_time(12.3), 0);
        assert_eq!(tl.wrap_index(3), 0);
    }
}
