//! Host-side image view with an attached animation player.
//!
//! `AnimatedView` plays the role of an image widget: it owns a player as a
//! field and a [`Surface`] the player draws into. The player's sink writes
//! into the surface; it does not reference the view, so dropping the view
//! tears the player down (clock unregistered, preload cancelled, cache freed).

use log::trace;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use crate::core::{FrameClock, FrameSink, Player, SharedPlayer, Workers};
use crate::entities::{Frame, SharedSource};
use crate::settings::PlayerSettings;

/// Counters accumulated by a [`Surface`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewStats {
    /// Frames handed to the surface
    pub frames_shown: u64,
    /// Distinct frame indices ever shown
    pub distinct_frames: usize,
    /// Times the surface was cleared by a stop
    pub stops: u64,
    /// Last reported playback time
    pub elapsed: f64,
}

#[derive(Debug, Default)]
struct SurfaceState {
    image: Option<Frame>,
    index: Option<usize>,
    shown: u64,
    seen: BTreeSet<usize>,
    stops: u64,
    elapsed: f64,
}

/// What is currently on screen
#[derive(Debug, Clone, Default)]
pub struct Surface {
    state: Arc<Mutex<SurfaceState>>,
}

impl Surface {
    pub fn image(&self) -> Option<Frame> {
        self.lock().image.clone()
    }

    pub fn index(&self) -> Option<usize> {
        self.lock().index
    }

    pub fn stats(&self) -> ViewStats {
        let state = self.lock();
        ViewStats {
            frames_shown: state.shown,
            distinct_frames: state.seen.len(),
            stops: state.stops,
            elapsed: state.elapsed,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Player output wired to a surface
struct SurfaceSink(Surface);

impl FrameSink for SurfaceSink {
    fn on_frame(&mut self, frame: &Frame, index: usize, elapsed: f64) {
        let mut state = self.0.lock();
        state.image = Some(frame.clone());
        state.index = Some(index);
        state.shown += 1;
        state.seen.insert(index);
        state.elapsed = elapsed;
        trace!("Surface shows frame {} ({}x{})", index, frame.width(), frame.height());
    }

    fn on_stopped(&mut self) {
        let mut state = self.0.lock();
        state.image = None;
        state.index = None;
        state.stops += 1;
    }

    fn on_elapsed(&mut self, elapsed: f64) {
        self.0.lock().elapsed = elapsed;
    }
}

/// Image view that plays animated sources
pub struct AnimatedView {
    player: SharedPlayer,
    surface: Surface,
}

impl AnimatedView {
    /// View decoding on the process-wide worker pool
    pub fn new() -> Self {
        Self::with_workers(Workers::shared())
    }

    pub fn with_workers(workers: Arc<Workers>) -> Self {
        let surface = Surface::default();
        let player = Player::with_workers(SurfaceSink(surface.clone()), workers).into_shared();
        Self { player, surface }
    }

    /// Show `source` (None clears the view); `replay` restarts the same source
    pub fn set_animated_image(&self, source: Option<SharedSource>, replay: bool) {
        self.with_player(|p| p.set_source(source, replay));
    }

    /// Let `clock` drive playback
    pub fn bind_clock(&self, clock: &FrameClock) {
        Player::bind_clock(&self.player, clock);
    }

    pub fn apply_settings(&self, settings: &PlayerSettings) {
        self.with_player(|p| p.apply_settings(settings));
    }

    /// Run `f` with the player locked
    pub fn with_player<R>(&self, f: impl FnOnce(&mut Player) -> R) -> R {
        let mut player = self.player.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut player)
    }

    pub fn player(&self) -> &SharedPlayer {
        &self.player
    }

    /// Currently displayed image
    pub fn image(&self) -> Option<Frame> {
        self.surface.image()
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn stats(&self) -> ViewStats {
        self.surface.stats()
    }
}

impl Default for AnimatedView {
    fn default() -> Self {
        Self::new()
    }
}
