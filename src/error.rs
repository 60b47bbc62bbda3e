//! Typed errors for the library surface.
//!
//! Decode failures and preload cancellation are not errors:
//! a frame that fails to decode is cached as a sentinel, and a cancelled
//! job simply stops.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("source has no frames")]
    Empty,

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum PlayerError {
    #[error("playback speed must be finite and > 0, got {0}")]
    InvalidSpeed(f64),
}
