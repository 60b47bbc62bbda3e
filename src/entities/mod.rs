//! Data handed to the engine by its hosts: decoded frames and frame sources.

pub mod frame;
pub mod loader;
pub mod source;

pub use frame::Frame;
pub use loader::SequenceSource;
pub use source::{
    DEFAULT_FRAME_DURATION, Durations, FnSource, FrameSource, MIN_FRAME_DURATION, MemorySource,
    SharedSource, same_source,
};
