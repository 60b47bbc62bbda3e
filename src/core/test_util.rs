//! Shared fixtures for engine tests: an instrumented source and a recording sink.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::core::player::FrameSink;
use crate::entities::{Durations, Frame, FrameSource};

/// Poll `cond` every millisecond until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
}

/// Source with scripted behavior.
///
/// Frame `i` is a 1x1 pixel `[tag, i, 0, 255]`. Gated indices block inside
/// `decode` until [`TestSource::open_gate`] is called; failing indices decode
/// to `None`.
pub struct TestSource {
    durations: Durations,
    tag: u8,
    gated: HashSet<usize>,
    failing: HashSet<usize>,
    gate_open: AtomicBool,
    started: Mutex<Vec<usize>>,
    finished: AtomicUsize,
}

impl TestSource {
    /// `count` frames of 0.1s each
    pub fn new(count: usize) -> Self {
        Self::with_delays(vec![0.1; count])
    }

    pub fn with_delays(delays: Vec<f64>) -> Self {
        let count = delays.len();
        Self {
            durations: Durations::normalize(delays, count),
            tag: 1,
            gated: HashSet::new(),
            failing: HashSet::new(),
            gate_open: AtomicBool::new(false),
            started: Mutex::new(Vec::new()),
            finished: AtomicUsize::new(0),
        }
    }

    pub fn tagged(mut self, tag: u8) -> Self {
        self.tag = tag;
        self
    }

    pub fn gated(mut self, indices: &[usize]) -> Self {
        self.gated.extend(indices.iter().copied());
        self
    }

    pub fn failing(mut self, indices: &[usize]) -> Self {
        self.failing.extend(indices.iter().copied());
        self
    }

    pub fn open_gate(&self) {
        self.gate_open.store(true, Ordering::SeqCst);
    }

    pub fn tag(&self) -> u8 {
        self.tag
    }

    /// The frame this source produces for `index`
    pub fn frame(&self, index: usize) -> Frame {
        Frame::solid(1, 1, [self.tag, index as u8, 0, 255])
    }

    /// Indices whose decode has started, in call order
    pub fn decoded(&self) -> Vec<usize> {
        self.started.lock().unwrap().clone()
    }

    pub fn decode_count(&self, index: usize) -> usize {
        self.started.lock().unwrap().iter().filter(|&&i| i == index).count()
    }

    /// Decodes that have returned
    pub fn finished_count(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

impl FrameSource for TestSource {
    fn durations(&self) -> &Durations {
        &self.durations
    }

    fn decode(&self, index: usize) -> Option<Frame> {
        self.started.lock().unwrap().push(index);
        if self.gated.contains(&index) {
            let opened = wait_until(Duration::from_secs(10), || {
                self.gate_open.load(Ordering::SeqCst)
            });
            assert!(opened, "gate for frame {} never opened", index);
        }
        let result = (!self.failing.contains(&index)).then(|| self.frame(index));
        self.finished.fetch_add(1, Ordering::SeqCst);
        result
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Frame { tag: u8, index: usize, elapsed: f64 },
    Stopped,
}

/// Sink that records everything the player emits
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SinkEvent>>>,
    elapsed: Arc<Mutex<Vec<f64>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Indices of emitted frames, in order
    pub fn frames(&self) -> Vec<usize> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Frame { index, .. } => Some(index),
                SinkEvent::Stopped => None,
            })
            .collect()
    }

    pub fn elapsed_reports(&self) -> Vec<f64> {
        self.elapsed.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
        self.elapsed.lock().unwrap().clear();
    }
}

impl FrameSink for RecordingSink {
    fn on_frame(&mut self, frame: &Frame, index: usize, elapsed: f64) {
        let px = frame.first_pixel().unwrap_or_default();
        assert_eq!(px[1] as usize, index, "emitted pixels do not match index");
        self.events.lock().unwrap().push(SinkEvent::Frame {
            tag: px[0],
            index,
            elapsed,
        });
    }

    fn on_stopped(&mut self) {
        self.events.lock().unwrap().push(SinkEvent::Stopped);
    }

    fn on_elapsed(&mut self, elapsed: f64) {
        self.elapsed.lock().unwrap().push(elapsed);
    }
}
