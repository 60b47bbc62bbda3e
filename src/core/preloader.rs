//! Preloader: decodes a window of frames ahead of the playhead.
//!
//! At most one job is outstanding per player. Starting a job cancels the
//! previous one cooperatively: the running job checks its flag between
//! decodes (never mid-decode) and the cache refuses stores from cancelled or
//! stale tickets, so partially useful work is simply discarded.
//!
//! # Load-immediately notices
//!
//! A seek wants its target on screen as soon as it is decoded, not one tick
//! later. Jobs started with `load_immediately` send a [`PreloadNotice`] once
//! their first index is resolved. The notice travels over a channel and is
//! consumed on the tick context via [`Preloader::drain_notices`]; the worker
//! never touches player state.

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, trace};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use super::frame_cache::{CacheEntry, FrameCache, JobTicket};
use super::workers::Workers;
use crate::entities::{FrameSource, SharedSource};

/// First index of a load-immediately job has been resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreloadNotice {
    /// Cache generation the job ran against
    pub generation: u64,
    pub index: usize,
}

/// Parameters of one preload job
#[derive(Clone)]
pub struct PreloadRequest {
    pub source: SharedSource,
    pub start: usize,
    /// Frames ahead of `start` to decode (window covers `start..=start+window`)
    pub window: usize,
    pub load_immediately: bool,
}

/// Indices `start ..= start + window` modulo `frame_count`, in decode order.
///
/// A window that reaches past the last frame wraps to the beginning; a window
/// larger than the source yields every index once.
pub fn window_indices(start: usize, window: usize, frame_count: usize) -> Vec<usize> {
    if frame_count == 0 {
        return Vec::new();
    }
    let len = window.saturating_add(1).min(frame_count);
    let start = start % frame_count;
    (0..len).map(|k| (start + k) % frame_count).collect()
}

struct ActiveJob {
    cancelled: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

/// Sets the finished flag however the job ends (including never running)
struct FinishGuard(Arc<AtomicBool>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Single-job preloader owned by a player
pub struct Preloader {
    workers: Arc<Workers>,
    cache: Arc<FrameCache>,
    active: Option<ActiveJob>,
    notice_tx: Sender<PreloadNotice>,
    notice_rx: Receiver<PreloadNotice>,
    jobs_started: u64,
}

impl Preloader {
    pub fn new(cache: Arc<FrameCache>, workers: Arc<Workers>) -> Self {
        let (notice_tx, notice_rx) = unbounded();
        Self {
            workers,
            cache,
            active: None,
            notice_tx,
            notice_rx,
            jobs_started: 0,
        }
    }

    /// Start a job, cancelling the outstanding one first.
    pub fn start(&mut self, request: PreloadRequest) {
        self.cancel();

        let frame_count = request.source.frame_count();
        let indices = window_indices(request.start, request.window, frame_count);

        let cancelled = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let ticket = self.cache.ticket(Arc::clone(&cancelled));

        self.jobs_started += 1;
        debug!(
            "Preload job #{} (gen {}): start={} window={} indices={:?} immediate={}",
            self.jobs_started,
            ticket.generation(),
            request.start,
            request.window,
            indices,
            request.load_immediately
        );

        let job = PreloadJob {
            source: request.source,
            cache: Arc::clone(&self.cache),
            ticket,
            indices,
            load_immediately: request.load_immediately,
            notice_tx: self.notice_tx.clone(),
            _finish: FinishGuard(Arc::clone(&finished)),
        };
        self.active = Some(ActiveJob {
            cancelled,
            finished,
        });
        self.workers.execute(move || job.run());
    }

    /// Cancel the outstanding job, if any. The job stops at its next check.
    pub fn cancel(&mut self) {
        if let Some(job) = self.active.take() {
            job.cancelled.store(true, Ordering::Release);
            trace!("Preload job cancelled");
        }
    }

    /// True while the most recently started job has not finished
    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|job| !job.finished.load(Ordering::Acquire))
    }

    /// Total jobs started over the preloader's lifetime
    pub fn jobs_started(&self) -> u64 {
        self.jobs_started
    }

    /// Take all pending notices (tick context)
    pub fn drain_notices(&self) -> Vec<PreloadNotice> {
        self.notice_rx.try_iter().collect()
    }

    /// Block until the current job finishes or `timeout` elapses.
    ///
    /// Returns false on timeout. Meant for hosts that want a warm cache before
    /// playback and for tests; never call it from the tick context.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_running() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }

    #[cfg(test)]
    pub(crate) fn notifier(&self) -> Sender<PreloadNotice> {
        self.notice_tx.clone()
    }
}

impl Drop for Preloader {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct PreloadJob {
    source: SharedSource,
    cache: Arc<FrameCache>,
    ticket: JobTicket,
    indices: Vec<usize>,
    load_immediately: bool,
    notice_tx: Sender<PreloadNotice>,
    _finish: FinishGuard,
}

impl PreloadJob {
    fn run(self) {
        for (pos, &index) in self.indices.iter().enumerate() {
            if self.ticket.is_cancelled() {
                trace!("Preload job stopped before frame {}", index);
                return;
            }

            // Re-check every time: a trim may have removed entries since start
            if !self.cache.contains(index) {
                let entry = match self.source.decode(index) {
                    Some(frame) => CacheEntry::Decoded(frame),
                    None => {
                        debug!("Frame {} failed to decode, caching sentinel", index);
                        CacheEntry::Failed
                    }
                };
                if !self.cache.store(&self.ticket, index, entry) {
                    trace!("Preload job discarded frame {} (cancelled or stale)", index);
                    return;
                }
                trace!("Preloaded frame {}", index);
            }

            if pos == 0 && self.load_immediately && !self.ticket.is_cancelled() {
                let _ = self.notice_tx.send(PreloadNotice {
                    generation: self.ticket.generation(),
                    index,
                });
            }
        }
    }
}
