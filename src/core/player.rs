//! Playback state machine: decides which frame to show on every tick.
//!
//! The player owns the per-source cache and preloader, holds the timeline of
//! the attached source and pushes frames to a [`FrameSink`]. Everything here
//! runs on the tick context; worker threads only ever touch the cache.
//!
//! # Timing Model
//!
//! `elapsed` is playback time within one loop of the animation
//! (`0 <= elapsed < total`). Each tick adds `delta * speed` and wraps.
//!
//! # Frame Selection
//!
//! With skip-frames enabled (default) the frame is whatever the timeline says
//! for the new time, even if that jumps several frames ahead. With it disabled
//! playback advances at most one frame per tick and time is clamped into the
//! displayed frame's interval.
//!
//! A cache miss freezes playback: the frame and (mostly) the time are held
//! until the frame is decoded, so the animation waits for the decoder instead
//! of skipping holes. A frame that failed to decode is not a miss; playback
//! continues past it and the previous image stays on screen.
//!
//! # States
//!
//! - **Idle**: no source
//! - **Paused**: source attached, ticks ignored (single-frame sources are
//!   always paused)
//! - **Playing**: source attached, ticks advance time

use log::{debug, info, trace, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::clock::{ClockRegistration, FrameClock};
use super::frame_cache::{CacheEntry, CacheStats, FrameCache};
use super::preloader::{PreloadRequest, Preloader, window_indices};
use super::timeline::Timeline;
use super::workers::Workers;
use crate::entities::{Frame, FrameSource, SharedSource, same_source};
use crate::error::PlayerError;
use crate::settings::PlayerSettings;

/// Frames preloaded ahead of the playhead
pub const DEFAULT_PRELOAD_WINDOW: usize = 2;

/// Receives the player's output on the tick context
pub trait FrameSink: Send {
    /// A new frame should be displayed
    fn on_frame(&mut self, frame: &Frame, index: usize, elapsed: f64);

    /// The source was detached; clear the display
    fn on_stopped(&mut self);

    /// Playback time moved (every tick that advances time, every seek)
    fn on_elapsed(&mut self, _elapsed: f64) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Paused,
    Playing,
}

/// Player shared between the host and a [`FrameClock`]
pub type SharedPlayer = Arc<Mutex<Player>>;

/// Outcome of frame selection for one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Step {
    /// Move to `index`, set time, look the frame up
    Advance { index: usize, elapsed: f64 },
    /// Keep the frame, set time; look the frame up again if `lookup`
    Hold { elapsed: f64, lookup: bool },
    /// Keep frame and time, retry the pending lookup
    Retry,
}

/// Pick the next step given the current frame, the candidate time `next`
/// and whether the current frame is still missing.
pub(crate) fn select_step(timeline: &Timeline, current: usize, next: f64, miss: bool, skip_frames: bool) -> Step {
    if skip_frames {
        let target = timeline.index_for_time(next);
        match (target == current, miss) {
            (false, false) => Step::Advance {
                index: target,
                elapsed: next,
            },
            (true, miss) => Step::Hold {
                elapsed: next,
                lookup: miss,
            },
            (false, true) => Step::Retry,
        }
    } else {
        // Compare against the frame's own interval; `next` may have wrapped
        let advance = next >= timeline.frame_end(current) || next < timeline.time_for_frame_start(current);
        match (advance, miss) {
            (false, miss) => Step::Hold {
                elapsed: next,
                lookup: miss,
            },
            (true, true) => Step::Retry,
            (true, false) => {
                let index = timeline.wrap_index(current as i64 + 1);
                let start = timeline.time_for_frame_start(index);
                let end = timeline.frame_end(index);
                Step::Advance {
                    index,
                    elapsed: next.clamp(start, end),
                }
            }
        }
    }
}

struct Attached {
    source: SharedSource,
    timeline: Timeline,
}

/// Frame-playback engine for one animated image
pub struct Player {
    attached: Option<Attached>,
    cache: Arc<FrameCache>,
    preloader: Preloader,
    sink: Box<dyn FrameSink>,
    clock: Option<ClockRegistration>,

    frame_index: usize,
    elapsed: f64,
    paused: bool,
    /// Current frame has no cache entry yet
    miss: bool,
    current: Option<Frame>,

    speed: f64,
    skip_frames: bool,
    preload_window: usize,
    autoplay: bool,
}

impl Player {
    /// Player decoding on the process-wide worker pool
    pub fn new(sink: impl FrameSink + 'static) -> Self {
        Self::with_workers(sink, Workers::shared())
    }

    pub fn with_workers(sink: impl FrameSink + 'static, workers: Arc<Workers>) -> Self {
        let cache = Arc::new(FrameCache::new());
        let preloader = Preloader::new(Arc::clone(&cache), workers);
        Self {
            attached: None,
            cache,
            preloader,
            sink: Box::new(sink),
            clock: None,
            frame_index: 0,
            elapsed: 0.0,
            paused: true,
            miss: true,
            current: None,
            speed: 1.0,
            skip_frames: true,
            preload_window: DEFAULT_PRELOAD_WINDOW,
            autoplay: true,
        }
    }

    pub fn into_shared(self) -> SharedPlayer {
        Arc::new(Mutex::new(self))
    }

    /// Register `player` with `clock`; ticks flow while a source is attached.
    pub fn bind_clock(player: &SharedPlayer, clock: &FrameClock) {
        let registration = clock.register(player);
        let mut guard = player.lock().unwrap_or_else(|e| e.into_inner());
        registration.set_enabled(guard.attached.is_some());
        guard.clock = Some(registration);
    }

    // ========================================================================
    // Source lifecycle
    // ========================================================================

    /// Attach `source` and start playback from frame 0.
    ///
    /// Attaching the already-attached source is a no-op unless `restart_if_same`.
    /// The first frame is decoded synchronously so something is on screen
    /// immediately; the rest of the window is preloaded in the background.
    pub fn attach(&mut self, source: SharedSource, restart_if_same: bool) {
        let same = self
            .attached
            .as_ref()
            .is_some_and(|current| same_source(&current.source, &source));
        if same && !restart_if_same {
            trace!("attach: source already attached, ignoring");
            return;
        }

        self.preloader.cancel();
        let frame_count = source.frame_count();
        self.cache.reset(frame_count);
        let timeline = Timeline::new(source.durations());

        info!(
            "Attached source: {} frames, {:.3}s loop",
            frame_count,
            timeline.total()
        );

        self.frame_index = 0;
        self.elapsed = 0.0;
        self.miss = true;
        self.current = None;

        match source.decode(0) {
            Some(frame) => {
                self.cache.insert(0, CacheEntry::Decoded(frame.clone()));
                self.sink.on_frame(&frame, 0, 0.0);
                self.current = Some(frame);
            }
            None => {
                warn!("First frame failed to decode");
                self.cache.insert(0, CacheEntry::Failed);
            }
        }

        self.paused = frame_count < 2 || !self.autoplay;
        self.attached = Some(Attached {
            source: Arc::clone(&source),
            timeline,
        });
        if let Some(clock) = &self.clock {
            clock.set_enabled(true);
        }
        self.sink.on_elapsed(0.0);

        self.preloader.start(PreloadRequest {
            source,
            start: 0,
            window: self.preload_window,
            load_immediately: false,
        });
    }

    /// Replace the source; `replay` restarts even when it is the same one
    pub fn set_source(&mut self, source: Option<SharedSource>, replay: bool) {
        match source {
            Some(source) => self.attach(source, replay),
            None => self.detach(),
        }
    }

    /// Drop the source and return to Idle
    pub fn detach(&mut self) {
        if self.attached.is_none() {
            return;
        }
        if let Some(clock) = &self.clock {
            clock.set_enabled(false);
        }
        self.preloader.cancel();
        self.cache.reset(0);

        self.attached = None;
        self.frame_index = 0;
        self.elapsed = 0.0;
        self.paused = true;
        self.miss = true;
        self.current = None;

        info!("Source detached");
        self.sink.on_stopped();
    }

    /// Swap the output target; returns the previous sink
    pub fn replace_sink(&mut self, sink: impl FrameSink + 'static) -> Box<dyn FrameSink> {
        std::mem::replace(&mut self.sink, Box::new(sink))
    }

    // ========================================================================
    // Controls (take effect on the next tick)
    // ========================================================================

    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume playback. Ignored without a source or for single-frame sources.
    pub fn resume(&mut self) {
        match &self.attached {
            Some(a) if a.timeline.frame_count() >= 2 => self.paused = false,
            _ => trace!("resume ignored: nothing to play"),
        }
    }

    pub fn set_paused(&mut self, paused: bool) {
        if paused {
            self.pause();
        } else {
            self.resume();
        }
    }

    pub fn set_speed(&mut self, speed: f64) -> Result<(), PlayerError> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(PlayerError::InvalidSpeed(speed));
        }
        self.speed = speed;
        Ok(())
    }

    pub fn set_skip_frames_enabled(&mut self, enabled: bool) {
        self.skip_frames = enabled;
    }

    pub fn set_preload_window(&mut self, window: usize) {
        self.preload_window = window;
    }

    /// Whether attaching starts playing right away
    pub fn set_autoplay(&mut self, autoplay: bool) {
        self.autoplay = autoplay;
    }

    pub fn apply_settings(&mut self, settings: &PlayerSettings) {
        if let Err(e) = self.set_speed(settings.speed) {
            warn!("Ignoring setting: {}", e);
        }
        self.skip_frames = settings.skip_frames;
        self.preload_window = settings.preload_window;
        self.autoplay = settings.autoplay;
        debug!(
            "Player settings applied: speed={} skip_frames={} preload_window={} autoplay={}",
            self.speed, self.skip_frames, self.preload_window, self.autoplay
        );
    }

    // ========================================================================
    // Seeking
    // ========================================================================

    /// Jump to time `t` (wrapped into the loop); the frame under it is shown
    /// as soon as it is available.
    pub fn seek_to_time(&mut self, t: f64) {
        let Some(a) = &self.attached else {
            return;
        };
        let t = a.timeline.wrap_time(t);
        let index = a.timeline.index_for_time(t);
        self.seek(index, t);
    }

    /// Jump to the start of frame `index` (wrapped, negative counts back)
    pub fn seek_to_frame(&mut self, index: i64) {
        let Some(a) = &self.attached else {
            return;
        };
        let index = a.timeline.wrap_index(index);
        let t = a.timeline.time_for_frame_start(index);
        self.seek(index, t);
    }

    fn seek(&mut self, index: usize, elapsed: f64) {
        // A single frame never moves, so its time stays at zero
        let single = self.attached.as_ref().is_some_and(|a| a.timeline.frame_count() < 2);
        let elapsed = if single { 0.0 } else { elapsed };
        trace!("Seek to frame {} ({:.3}s)", index, elapsed);
        self.frame_index = index;
        self.elapsed = elapsed;
        self.miss = true;
        self.sink.on_elapsed(elapsed);
        self.update(elapsed, true);
    }

    // ========================================================================
    // Tick context
    // ========================================================================

    /// Clock callback: `delta` seconds of real time passed since the last tick.
    pub fn on_tick(&mut self, delta: f64) {
        self.poll_preload();

        if self.paused {
            return;
        }
        let Some(a) = &self.attached else {
            return;
        };
        if a.timeline.frame_count() < 2 {
            self.paused = true;
            return;
        }
        if !delta.is_finite() || delta < 0.0 {
            warn!("Ignoring tick with invalid delta {}", delta);
            return;
        }
        let next = a.timeline.advance(self.elapsed, delta, self.speed);
        self.update(next, false);
    }

    /// Deliver frames for completed load-immediately jobs.
    ///
    /// Called by `on_tick` (also while paused); hosts without a clock can
    /// call it directly after a seek.
    pub fn poll_preload(&mut self) {
        for notice in self.preloader.drain_notices() {
            let current = self.attached.is_some()
                && notice.generation == self.cache.generation()
                && notice.index == self.frame_index
                && self.miss;
            if !current {
                trace!("Dropping stale preload notice for frame {}", notice.index);
                continue;
            }
            self.show(notice.index);
        }
    }

    fn update(&mut self, next: f64, load_immediately: bool) {
        let Some(a) = &self.attached else {
            return;
        };
        let before = self.elapsed;
        let step = select_step(&a.timeline, self.frame_index, next, self.miss, self.skip_frames);

        match step {
            Step::Advance { index, elapsed } => {
                self.frame_index = index;
                self.elapsed = elapsed;
                self.show(index);
            }
            Step::Hold { elapsed, lookup } => {
                self.elapsed = elapsed;
                if lookup {
                    self.show(self.frame_index);
                }
            }
            Step::Retry => self.show(self.frame_index),
        }

        if self.elapsed != before {
            self.sink.on_elapsed(self.elapsed);
        }
        self.preload(load_immediately);
    }

    /// Look `index` up and emit it if decoded
    fn show(&mut self, index: usize) {
        match self.cache.lookup(index) {
            Some(CacheEntry::Decoded(frame)) => {
                self.miss = false;
                self.sink.on_frame(&frame, index, self.elapsed);
                self.current = Some(frame);
            }
            Some(CacheEntry::Failed) => {
                self.miss = false;
                trace!("Frame {} failed to decode, holding previous image", index);
            }
            None => {
                self.miss = true;
                trace!("Frame {} not cached yet", index);
            }
        }
    }

    /// Start a preload job when the window around the playhead has holes.
    ///
    /// A running job is left alone unless `load_immediately` (seek), which
    /// always replaces it with one starting at the new position while the
    /// cache is not full.
    fn preload(&mut self, load_immediately: bool) {
        let Some(a) = &self.attached else {
            return;
        };
        if self.cache.is_full() {
            return;
        }
        if !load_immediately {
            if self.preloader.is_running() {
                return;
            }
            let frame_count = a.timeline.frame_count();
            let holes = window_indices(self.frame_index, self.preload_window, frame_count)
                .into_iter()
                .any(|i| !self.cache.contains(i));
            if !holes {
                return;
            }
        }
        let request = PreloadRequest {
            source: Arc::clone(&a.source),
            start: self.frame_index,
            window: self.preload_window,
            load_immediately,
        };
        self.preloader.start(request);
    }

    // ========================================================================
    // Memory
    // ========================================================================

    /// Evict decoded frames outside the preload window
    pub fn on_memory_pressure(&mut self) {
        if self.attached.is_none() {
            return;
        }
        let removed = self.cache.trim_around(self.frame_index, self.preload_window);
        info!("Memory pressure: evicted {} frames", removed);
    }

    /// Host went to background; same trim as memory pressure
    pub fn on_background(&mut self) {
        if self.attached.is_none() {
            return;
        }
        let removed = self.cache.trim_around(self.frame_index, self.preload_window);
        debug!("Background: evicted {} frames", removed);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> PlaybackState {
        match (&self.attached, self.paused) {
            (None, _) => PlaybackState::Idle,
            (Some(_), true) => PlaybackState::Paused,
            (Some(_), false) => PlaybackState::Playing,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn skip_frames_enabled(&self) -> bool {
        self.skip_frames
    }

    pub fn preload_window(&self) -> usize {
        self.preload_window
    }

    pub fn autoplay(&self) -> bool {
        self.autoplay
    }

    /// Last frame handed to the sink
    pub fn current_frame(&self) -> Option<&Frame> {
        self.current.as_ref()
    }

    pub fn frame_count(&self) -> usize {
        self.attached.as_ref().map_or(0, |a| a.timeline.frame_count())
    }

    /// Loop length in seconds (0 when idle)
    pub fn total_duration(&self) -> f64 {
        self.attached.as_ref().map_or(0.0, |a| a.timeline.total())
    }

    pub fn source(&self) -> Option<&SharedSource> {
        self.attached.as_ref().map(|a| &a.source)
    }

    pub fn cache(&self) -> &Arc<FrameCache> {
        &self.cache
    }

    pub fn cache_stats(&self) -> &CacheStats {
        self.cache.stats()
    }

    pub fn is_preloading(&self) -> bool {
        self.preloader.is_running()
    }

    pub fn preload_jobs_started(&self) -> u64 {
        self.preloader.jobs_started()
    }

    /// Block until the outstanding preload job finishes (not for the tick context)
    pub fn wait_for_preload(&self, timeout: Duration) -> bool {
        self.preloader.wait_idle(timeout)
    }

    pub fn clock_enabled(&self) -> bool {
        self.clock.as_ref().is_some_and(|c| c.is_enabled())
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        // Leave the clock first so no tick can arrive mid-teardown
        drop(self.clock.take());
        self.preloader.cancel();
        self.cache.reset(0);
        if self.attached.take().is_some() {
            self.sink.on_stopped();
        }
        trace!("Player dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::preloader::PreloadNotice;
    use crate::core::test_util::{RecordingSink, SinkEvent, TestSource, wait_until};
    use crate::entities::Durations;

    const WAIT: Duration = Duration::from_secs(5);

    fn player() -> (Player, RecordingSink) {
        let sink = RecordingSink::new();
        let player = Player::with_workers(sink.clone(), Arc::new(Workers::new(1)));
        (player, sink)
    }

    fn attach(player: &mut Player, source: &Arc<TestSource>) {
        player.attach(Arc::clone(source) as SharedSource, false);
    }

    /// Attach and wait until the initial window is cached
    fn attach_warm(player: &mut Player, source: &Arc<TestSource>) {
        attach(player, source);
        assert!(player.wait_for_preload(WAIT));
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn timeline(delays: &[f64]) -> Timeline {
        Timeline::new(&Durations::normalize(delays.to_vec(), delays.len()))
    }

    #[test]
    fn test_select_step_skip_frames() {
        let tl = timeline(&[0.1; 5]);
        assert_eq!(
            select_step(&tl, 0, 0.31, false, true),
            Step::Advance {
                index: 3,
                elapsed: 0.31
            }
        );
        assert_eq!(
            select_step(&tl, 0, 0.05, false, true),
            Step::Hold {
                elapsed: 0.05,
                lookup: false
            }
        );
        assert_eq!(
            select_step(&tl, 0, 0.05, true, true),
            Step::Hold {
                elapsed: 0.05,
                lookup: true
            }
        );
        assert_eq!(select_step(&tl, 0, 0.31, true, true), Step::Retry);
    }

    #[test]
    fn test_select_step_strict() {
        let tl = timeline(&[0.1; 5]);
        assert_eq!(
            select_step(&tl, 0, 0.31, false, false),
            Step::Advance {
                index: 1,
                elapsed: 0.2
            }
        );
        assert_eq!(
            select_step(&tl, 0, 0.05, true, false),
            Step::Hold {
                elapsed: 0.05,
                lookup: true
            }
        );
        assert_eq!(select_step(&tl, 0, 0.31, true, false), Step::Retry);

        // Wrap from the last frame back to 0
        assert_eq!(
            select_step(&tl, 4, 0.05, false, false),
            Step::Advance {
                index: 0,
                elapsed: 0.05
            }
        );
    }

    #[test]
    fn test_attach_emits_first_frame() {
        let (mut player, sink) = player();
        assert_eq!(player.state(), PlaybackState::Idle);

        let source = Arc::new(TestSource::new(3));
        attach(&mut player, &source);
        assert_eq!(
            sink.events(),
            vec![SinkEvent::Frame {
                tag: 1,
                index: 0,
                elapsed: 0.0
            }]
        );
        assert_eq!(player.state(), PlaybackState::Playing);
        assert_eq!(player.frame_index(), 0);
        assert!(player.cache().contains(0));
        assert!(approx(player.total_duration(), 0.3));

        assert!(player.wait_for_preload(WAIT));
        assert_eq!(player.cache().indices(), vec![0, 1, 2]);
        assert_eq!(source.decode_count(0), 1);
    }

    #[test]
    fn test_single_frame_source_stays_paused() {
        let (mut player, sink) = player();
        let source = Arc::new(TestSource::new(1));
        attach(&mut player, &source);
        assert_eq!(player.state(), PlaybackState::Paused);

        player.resume();
        assert!(player.is_paused());
        player.on_tick(1.0);
        assert_eq!(player.elapsed(), 0.0);
        assert_eq!(sink.frames(), vec![0]);
    }

    #[test]
    fn test_autoplay_disabled_attaches_paused() {
        let (mut player, _sink) = player();
        player.set_autoplay(false);
        attach(&mut player, &Arc::new(TestSource::new(3)));
        assert_eq!(player.state(), PlaybackState::Paused);
        player.resume();
        assert_eq!(player.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_attach_same_source() {
        let (mut player, sink) = player();
        let source = Arc::new(TestSource::new(3));
        attach_warm(&mut player, &source);
        player.seek_to_frame(2);
        assert_eq!(player.preload_jobs_started(), 1);

        attach(&mut player, &source);
        assert_eq!(player.frame_index(), 2);
        assert_eq!(player.preload_jobs_started(), 1);

        player.attach(Arc::clone(&source) as SharedSource, true);
        assert_eq!(player.frame_index(), 0);
        assert_eq!(sink.frames(), vec![0, 2, 0]);
    }

    #[test]
    fn test_seek_examples() {
        let (mut player, sink) = player();
        let source = Arc::new(TestSource::with_delays(vec![0.1, 0.2, 0.1]));
        attach_warm(&mut player, &source);
        sink.clear();

        player.seek_to_time(0.25);
        assert_eq!(player.frame_index(), 1);
        assert!(approx(player.elapsed(), 0.25));

        player.seek_to_frame(2);
        assert_eq!(player.frame_index(), 2);
        assert!(approx(player.elapsed(), 0.3));

        player.seek_to_time(player.total_duration());
        assert_eq!(player.frame_index(), 0);
        assert_eq!(player.elapsed(), 0.0);

        player.seek_to_frame(-1);
        assert_eq!(player.frame_index(), 2);
        player.seek_to_frame(4);
        assert_eq!(player.frame_index(), 1);

        assert_eq!(sink.frames(), vec![1, 2, 0, 2, 1]);
        assert!(sink.elapsed_reports().len() >= 5);
    }

    #[test]
    fn test_skip_frames_jumps_in_one_emission() {
        let (mut player, sink) = player();
        player.set_preload_window(4);
        let source = Arc::new(TestSource::new(5));
        attach_warm(&mut player, &source);

        player.on_tick(0.01);
        sink.clear();
        player.on_tick(0.3);
        assert_eq!(sink.frames(), vec![3]);
        assert_eq!(player.frame_index(), 3);
        assert!(approx(player.elapsed(), 0.31));
    }

    #[test]
    fn test_strict_mode_advances_one_frame() {
        let (mut player, sink) = player();
        player.set_preload_window(4);
        player.set_skip_frames_enabled(false);
        let source = Arc::new(TestSource::new(5));
        attach_warm(&mut player, &source);

        player.on_tick(0.01);
        sink.clear();
        player.on_tick(0.3);
        assert_eq!(sink.frames(), vec![1]);
        assert_eq!(player.frame_index(), 1);
        assert!(approx(player.elapsed(), 0.2));
    }

    #[test]
    fn test_strict_mode_wraps_to_first_frame() {
        let (mut player, _sink) = player();
        player.set_preload_window(4);
        player.set_skip_frames_enabled(false);
        let source = Arc::new(TestSource::new(5));
        attach_warm(&mut player, &source);

        player.seek_to_frame(4);
        player.on_tick(0.15);
        assert_eq!(player.frame_index(), 0);
        assert!((player.elapsed() - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_miss_holds_frame_and_time() {
        let (mut player, sink) = player();
        let source = Arc::new(TestSource::new(5).gated(&[1]));
        attach(&mut player, &source);

        player.on_tick(0.01);
        player.on_tick(0.1);
        assert_eq!(player.frame_index(), 1);
        let held = player.elapsed();
        assert!(approx(held, 0.11));

        // Still missing: neither frame nor time move
        player.on_tick(0.1);
        player.on_tick(0.1);
        assert_eq!(player.frame_index(), 1);
        assert_eq!(player.elapsed(), held);
        assert_eq!(sink.frames(), vec![0, 0]);

        source.open_gate();
        assert!(player.wait_for_preload(WAIT));
        player.on_tick(0.01);
        assert_eq!(sink.frames(), vec![0, 0, 1]);
    }

    #[test]
    fn test_failed_frame_keeps_previous_image() {
        let (mut player, sink) = player();
        player.set_preload_window(3);
        let source = Arc::new(TestSource::new(4).failing(&[2]));
        attach_warm(&mut player, &source);

        player.on_tick(0.01);
        player.on_tick(0.1);
        assert_eq!(player.frame_index(), 1);

        player.on_tick(0.1);
        assert_eq!(player.frame_index(), 2);
        let shown = player.current_frame().and_then(|f| f.first_pixel());
        assert_eq!(shown, Some([1, 1, 0, 255]));

        player.on_tick(0.1);
        assert_eq!(player.frame_index(), 3);
        for _ in 0..10 {
            player.on_tick(0.1);
        }
        assert_eq!(source.decode_count(2), 1);
        assert!(!sink.frames().contains(&2));
        assert!(player.cache_stats().failures() >= 1);
    }

    #[test]
    fn test_replacing_source_discards_old_frames() {
        let (mut player, sink) = player();
        let first = Arc::new(TestSource::new(4).gated(&[1]).tagged(1));
        attach(&mut player, &first);
        assert!(wait_until(WAIT, || first.decode_count(1) == 1));

        let second = Arc::new(TestSource::new(3).tagged(2));
        attach(&mut player, &second);
        first.open_gate();
        assert!(player.wait_for_preload(WAIT));
        assert!(wait_until(WAIT, || first.finished_count() == 2));

        for index in player.cache().indices() {
            let entry = player.cache().lookup(index);
            let tag = entry
                .as_ref()
                .and_then(|e| e.frame())
                .and_then(|f| f.first_pixel())
                .map(|px| px[0]);
            assert_eq!(tag, Some(2), "frame {} belongs to the old source", index);
        }
        assert_eq!(first.decode_count(2), 0);
        assert_eq!(player.preload_jobs_started(), 2);
        assert_eq!(
            sink.events().last(),
            Some(&SinkEvent::Frame {
                tag: 2,
                index: 0,
                elapsed: 0.0
            })
        );
    }

    #[test]
    fn test_detach_emits_stopped() {
        let (mut player, sink) = player();
        attach_warm(&mut player, &Arc::new(TestSource::new(3)));
        player.detach();

        assert_eq!(sink.events().last(), Some(&SinkEvent::Stopped));
        assert_eq!(player.state(), PlaybackState::Idle);
        assert!(player.cache().is_empty());
        assert!(player.current_frame().is_none());

        player.on_tick(0.5);
        player.seek_to_frame(1);
        player.detach();
        assert_eq!(sink.events().iter().filter(|e| **e == SinkEvent::Stopped).count(), 1);
    }

    #[test]
    fn test_pause_freezes_time() {
        let (mut player, _sink) = player();
        attach_warm(&mut player, &Arc::new(TestSource::new(3)));

        player.pause();
        player.on_tick(0.15);
        assert_eq!(player.elapsed(), 0.0);

        player.set_paused(false);
        player.on_tick(0.05);
        assert!(approx(player.elapsed(), 0.05));
    }

    #[test]
    fn test_speed() {
        let (mut player, _sink) = player();
        attach_warm(&mut player, &Arc::new(TestSource::new(3)));

        assert_eq!(player.set_speed(0.0), Err(PlayerError::InvalidSpeed(0.0)));
        assert!(player.set_speed(f64::NAN).is_err());
        assert!(player.set_speed(-1.0).is_err());
        assert_eq!(player.speed(), 1.0);

        player.on_tick(0.0);
        player.set_speed(2.0).unwrap();
        player.on_tick(0.05);
        assert!(approx(player.elapsed(), 0.1));
        assert_eq!(player.frame_index(), 1);
    }

    #[test]
    fn test_invalid_delta_ignored() {
        let (mut player, _sink) = player();
        attach_warm(&mut player, &Arc::new(TestSource::new(3)));
        player.on_tick(-0.1);
        player.on_tick(f64::INFINITY);
        assert_eq!(player.elapsed(), 0.0);
    }

    #[test]
    fn test_memory_pressure_trims_outside_window() {
        let (mut player, _sink) = player();
        player.set_preload_window(9);
        attach_warm(&mut player, &Arc::new(TestSource::new(10)));
        assert!(player.cache().is_full());

        player.set_preload_window(2);
        player.on_memory_pressure();
        assert_eq!(player.cache().indices(), vec![0, 1, 2]);

        player.seek_to_frame(8);
        assert!(player.wait_for_preload(WAIT));
        player.on_background();
        assert_eq!(player.cache().indices(), vec![0, 8, 9]);
    }

    #[test]
    fn test_memory_pressure_drops_failed_outside_window() {
        let (mut player, _sink) = player();
        player.set_preload_window(9);
        attach_warm(&mut player, &Arc::new(TestSource::new(10).failing(&[5, 7])));
        assert!(player.cache().is_full());

        player.set_preload_window(2);
        player.on_memory_pressure();
        assert_eq!(player.cache().indices(), vec![0, 1, 2]);
    }

    #[test]
    fn test_single_frame_seek_pins_time() {
        let (mut player, _sink) = player();
        attach(&mut player, &Arc::new(TestSource::new(1)));

        player.seek_to_time(0.05);
        assert_eq!(player.elapsed(), 0.0);
        assert_eq!(player.frame_index(), 0);

        player.seek_to_frame(3);
        assert_eq!(player.elapsed(), 0.0);
        assert_eq!(player.frame_index(), 0);
    }

    #[test]
    fn test_seek_while_paused_delivers_on_poll() {
        let (mut player, sink) = player();
        let source = Arc::new(TestSource::new(5).gated(&[3]));
        attach_warm(&mut player, &source);
        player.pause();

        player.seek_to_frame(3);
        assert_eq!(player.frame_index(), 3);
        assert!(player.is_preloading());

        source.open_gate();
        assert!(player.wait_for_preload(WAIT));
        sink.clear();
        player.on_tick(0.0);
        assert_eq!(sink.frames(), vec![3]);
        assert!(approx(player.elapsed(), 0.3));

        // Delivered once
        player.on_tick(0.0);
        assert_eq!(sink.frames(), vec![3]);
    }

    #[test]
    fn test_stale_notices_ignored() {
        let (mut player, sink) = player();
        player.set_preload_window(4);
        attach_warm(&mut player, &Arc::new(TestSource::new(5)));
        player.on_tick(0.01);
        sink.clear();

        let notifier = player.preloader.notifier();
        let generation = player.cache().generation();
        let notice = |generation, index| PreloadNotice { generation, index };
        notifier.send(notice(generation, 3)).unwrap();
        notifier.send(notice(generation - 1, 0)).unwrap();
        // Current frame already shown
        notifier.send(notice(generation, 0)).unwrap();

        player.pause();
        player.on_tick(0.0);
        assert!(sink.frames().is_empty());
    }

    #[test]
    fn test_replace_sink() {
        let (mut player, first) = player();
        let second = RecordingSink::new();
        attach_warm(&mut player, &Arc::new(TestSource::new(3)));
        player.on_tick(0.0);

        let _old = player.replace_sink(second.clone());
        player.on_tick(0.15);
        assert_eq!(first.frames(), vec![0, 0]);
        assert_eq!(second.frames(), vec![1]);
    }

    #[test]
    fn test_apply_settings() {
        let (mut player, _sink) = player();
        let settings = PlayerSettings {
            speed: 0.5,
            skip_frames: false,
            preload_window: 7,
            autoplay: false,
            ..PlayerSettings::default()
        };
        player.apply_settings(&settings);
        assert_eq!(player.speed(), 0.5);
        assert!(!player.skip_frames_enabled());
        assert_eq!(player.preload_window(), 7);
        assert!(!player.autoplay());

        let bad = PlayerSettings {
            speed: -3.0,
            ..settings
        };
        player.apply_settings(&bad);
        assert_eq!(player.speed(), 0.5);
    }

    #[test]
    fn test_drop_stops_sink() {
        let (mut player, sink) = player();
        attach(&mut player, &Arc::new(TestSource::new(3)));
        drop(player);
        assert_eq!(sink.events().last(), Some(&SinkEvent::Stopped));
    }
}
