//! FLICK - Animated image playback engine
//!
//! Plays a sequence of frames with per-frame delays: maps elapsed time to
//! frames, keeps a bounded cache of decoded frames and preloads ahead of the
//! playhead on background workers.

// Core engine (timeline, cache, preloader, player, clock)
pub mod core;

// Frames and sources
pub mod entities;
pub mod error;

// Host and app modules
pub mod cli;
pub mod paths;
pub mod settings;
pub mod view;

pub use core::{FrameClock, FrameSink, PlaybackState, Player, SharedPlayer};
pub use entities::{FnSource, Frame, FrameSource, MemorySource, SequenceSource, SharedSource};
pub use error::{PlayerError, SourceError};
pub use settings::PlayerSettings;
pub use view::AnimatedView;
