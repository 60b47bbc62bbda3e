//! Background thread pool for decode jobs (the worker context).
//!
//! Jobs are plain closures pushed onto a crossbeam channel; idle workers block
//! on `recv()` instead of polling. Cancellation is not handled here: each
//! preload job carries its own flag and checks it between decodes.

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{error, trace};
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Process-wide pool used by players that were not given one explicitly
static SHARED: Lazy<Arc<Workers>> = Lazy::new(|| Arc::new(Workers::new(default_threads())));

/// Recommended pool size: half the cores, at least one (decode must not
/// starve the host's render thread).
pub fn default_threads() -> usize {
    (num_cpus::get() / 2).max(1)
}

/// Decode worker pool
///
/// # Example
/// ```ignore
/// let workers = Workers::new(2);
/// workers.execute(move || {
///     let frame = source.decode(index);
/// });
/// ```
pub struct Workers {
    sender: Option<Sender<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl Workers {
    /// Spawn `num_threads` workers (at least one).
    pub fn new(num_threads: usize) -> Self {
        let num_threads = num_threads.max(1);
        let (sender, receiver) = unbounded::<Job>();

        let mut handles = Vec::with_capacity(num_threads);
        for worker_id in 0..num_threads {
            let receiver: Receiver<Job> = receiver.clone();
            let spawned = thread::Builder::new()
                .name(format!("flick-worker-{}", worker_id))
                .spawn(move || {
                    trace!("Worker {} started", worker_id);
                    // Ends when every sender is dropped
                    while let Ok(job) = receiver.recv() {
                        job();
                    }
                    trace!("Worker {} stopped", worker_id);
                });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => error!("Failed to spawn worker thread {}: {}", worker_id, e),
            }
        }

        trace!("Workers initialized: {} threads", handles.len());

        Self {
            sender: Some(sender),
            handles,
        }
    }

    /// Process-wide pool sized by [`default_threads`]
    pub fn shared() -> Arc<Workers> {
        Arc::clone(&SHARED)
    }

    /// Number of live worker threads
    pub fn threads(&self) -> usize {
        self.handles.len()
    }

    /// Queue a closure for execution on a worker thread.
    ///
    /// If no worker thread could be spawned the job runs inline.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.handles.is_empty() {
            f();
            return;
        }
        if let Some(sender) = &self.sender {
            if let Err(e) = sender.send(Box::new(f)) {
                // Receivers only disappear during shutdown
                trace!("Job dropped, workers shutting down");
                drop(e);
            }
        }
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        let num_threads = self.handles.len();
        trace!("Workers shutting down ({} threads)...", num_threads);

        // Closing the channel lets workers drain queued jobs and exit
        self.sender.take();

        // Jobs check their cancel flags between decodes, so this is short.
        // The timeout covers a single stuck decode.
        let deadline = Instant::now() + Duration::from_millis(500);

        let handles = std::mem::take(&mut self.handles);
        for handle in handles {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Shutdown timeout reached, detaching remaining workers");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }

        trace!("All {} workers stopped gracefully", num_threads);
    }
}
