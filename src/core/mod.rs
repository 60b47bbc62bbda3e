//! Playback engine: timeline math, frame cache, preloader, player, clock.
//!
//! Independent of any display; frames leave through [`player::FrameSink`].

pub mod clock;
pub mod frame_cache;
pub mod memory;
pub mod player;
pub mod preloader;
pub mod timeline;
pub mod workers;

#[cfg(test)]
pub(crate) mod test_util;

pub use clock::{ClockRegistration, FrameClock};
pub use frame_cache::{CacheEntry, CacheStats, FrameCache};
pub use memory::{MemoryWatch, PressureTrigger};
pub use player::{DEFAULT_PRELOAD_WINDOW, FrameSink, PlaybackState, Player, SharedPlayer};
pub use preloader::{PreloadNotice, PreloadRequest, Preloader};
pub use timeline::Timeline;
pub use workers::Workers;
