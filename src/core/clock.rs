//! Periodic clock driving player ticks (the tick context).
//!
//! The clock fires at `refresh_hz / frame_interval` and calls
//! [`Player::on_tick`] with the measured time since the previous tick.
//!
//! Ownership: the clock only holds `Weak` handles. A player keeps its
//! [`ClockRegistration`] as a field; dropping the registration (which happens
//! first thing in `Player::drop`) removes the player from the clock, so a tick
//! can never reach a player that is being torn down.

use log::{debug, trace};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant};

use super::player::{Player, SharedPlayer};

struct Target {
    id: u64,
    player: Weak<Mutex<Player>>,
    enabled: Arc<AtomicBool>,
}

struct ClockShared {
    targets: Mutex<Vec<Target>>,
    next_id: AtomicU64,
    refresh_hz: f64,
    frame_interval: AtomicU32,
    running: AtomicBool,
}

impl ClockShared {
    fn period(&self) -> Duration {
        let interval = self.frame_interval.load(Ordering::Relaxed).max(1) as f64;
        Duration::from_secs_f64(interval / self.refresh_hz)
    }

    fn tick_all(&self, delta: f64) {
        // Collect strong handles first: never hold the target list while
        // locking a player (a player's drop re-enters the list).
        let players: Vec<SharedPlayer> = {
            let mut targets = self.targets.lock().unwrap_or_else(|e| e.into_inner());
            targets.retain(|t| t.player.strong_count() > 0);
            targets
                .iter()
                .filter(|t| t.enabled.load(Ordering::Acquire))
                .filter_map(|t| t.player.upgrade())
                .collect()
        };

        for player in &players {
            player
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .on_tick(delta);
        }
    }

    fn unregister(&self, id: u64) {
        let mut targets = self.targets.lock().unwrap_or_else(|e| e.into_inner());
        targets.retain(|t| t.id != id);
        trace!("Clock target {} unregistered ({} left)", id, targets.len());
    }
}

/// Scoped membership of one player in a [`FrameClock`].
///
/// Dropping it unregisters the player. While disabled (no source attached)
/// the clock skips the player without forgetting it.
pub struct ClockRegistration {
    id: u64,
    enabled: Arc<AtomicBool>,
    clock: Weak<ClockShared>,
}

impl ClockRegistration {
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

impl Drop for ClockRegistration {
    fn drop(&mut self) {
        if let Some(clock) = self.clock.upgrade() {
            clock.unregister(self.id);
        }
    }
}

/// Display-refresh driven clock
pub struct FrameClock {
    shared: Arc<ClockShared>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FrameClock {
    /// Clock without a thread; the host calls [`FrameClock::tick`] from its
    /// own refresh callback.
    pub fn manual(refresh_hz: f64, frame_interval: u32) -> Self {
        let refresh_hz = if refresh_hz.is_finite() && refresh_hz > 0.0 {
            refresh_hz
        } else {
            60.0
        };
        Self {
            shared: Arc::new(ClockShared {
                targets: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                refresh_hz,
                frame_interval: AtomicU32::new(frame_interval.max(1)),
                running: AtomicBool::new(false),
            }),
            handle: None,
        }
    }

    /// Clock ticking on its own thread at `refresh_hz / frame_interval`
    pub fn start(refresh_hz: f64, frame_interval: u32) -> std::io::Result<Self> {
        let mut clock = Self::manual(refresh_hz, frame_interval);
        clock.shared.running.store(true, Ordering::Release);

        let shared = Arc::clone(&clock.shared);
        let handle = thread::Builder::new()
            .name("flick-clock".to_string())
            .spawn(move || {
                let mut last = Instant::now();
                while shared.running.load(Ordering::Acquire) {
                    thread::park_timeout(shared.period());
                    if !shared.running.load(Ordering::Acquire) {
                        break;
                    }
                    let now = Instant::now();
                    let delta = now.duration_since(last).as_secs_f64();
                    last = now;
                    shared.tick_all(delta);
                }
                trace!("Clock thread stopped");
            })?;

        debug!(
            "FrameClock started: {} Hz / {} = {:.2} ms period",
            clock.shared.refresh_hz,
            clock.frame_interval(),
            clock.period().as_secs_f64() * 1000.0
        );
        clock.handle = Some(handle);
        Ok(clock)
    }

    /// Add a player; keep the returned registration alive for as long as the
    /// player should receive ticks.
    pub fn register(&self, player: &SharedPlayer) -> ClockRegistration {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let enabled = Arc::new(AtomicBool::new(true));
        self.shared
            .targets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Target {
                id,
                player: Arc::downgrade(player),
                enabled: Arc::clone(&enabled),
            });
        trace!("Clock target {} registered", id);
        ClockRegistration {
            id,
            enabled,
            clock: Arc::downgrade(&self.shared),
        }
    }

    /// Deliver one tick of `delta` seconds to every enabled player
    pub fn tick(&self, delta: f64) {
        self.shared.tick_all(delta);
    }

    /// Tick every `n` display refreshes (n >= 1)
    pub fn set_frame_interval(&self, n: u32) {
        self.shared.frame_interval.store(n.max(1), Ordering::Relaxed);
    }

    pub fn frame_interval(&self) -> u32 {
        self.shared.frame_interval.load(Ordering::Relaxed)
    }

    pub fn refresh_hz(&self) -> f64 {
        self.shared.refresh_hz
    }

    /// Time between ticks
    pub fn period(&self) -> Duration {
        self.shared.period()
    }

    /// Live registrations
    pub fn registered(&self) -> usize {
        self.shared
            .targets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Stop the clock thread (no-op for manual clocks)
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for FrameClock {
    fn drop(&mut self) {
        self.stop();
    }
}
