//! Image sequence source: one image file per frame, decoded lazily.
//!
//! Frame files are opened through the `image` crate only when the preloader
//! asks for them, so attaching a long sequence costs a directory listing,
//! not a full decode.

use log::debug;
use std::path::{Path, PathBuf};

use super::frame::Frame;
use super::source::{Durations, FrameSource};
use crate::error::SourceError;

/// File extensions picked up by [`SequenceSource::from_dir`]
pub const SEQUENCE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "tif", "tiff", "tga", "bmp"];

/// Ordered list of image files played as an animation
#[derive(Debug)]
pub struct SequenceSource {
    paths: Vec<PathBuf>,
    durations: Durations,
    scale: f32,
}

impl SequenceSource {
    /// Build from explicit paths, every frame lasting `delay` seconds.
    pub fn from_paths(paths: Vec<PathBuf>, delay: f64) -> Result<Self, SourceError> {
        if paths.is_empty() {
            return Err(SourceError::Empty);
        }
        let durations = Durations::uniform(paths.len(), delay);
        debug!(
            "SequenceSource: {} frames, {:.3}s total",
            paths.len(),
            durations.total()
        );
        Ok(Self {
            paths,
            durations,
            scale: 1.0,
        })
    }

    /// Build from every image file in `dir`, sorted by file name.
    pub fn from_dir(dir: &Path, delay: f64) -> Result<Self, SourceError> {
        let entries = std::fs::read_dir(dir).map_err(|source| SourceError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && has_sequence_extension(p))
            .collect();
        paths.sort();

        Self::from_paths(paths, delay)
    }

    /// Override per-frame delays (normalized against the file count)
    pub fn with_delays(mut self, delays: Vec<f64>) -> Self {
        self.durations = Durations::normalize(delays, self.paths.len());
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl FrameSource for SequenceSource {
    fn scale(&self) -> f32 {
        self.scale
    }

    fn durations(&self) -> &Durations {
        &self.durations
    }

    fn decode(&self, index: usize) -> Option<Frame> {
        let path = self.paths.get(index)?;
        match image::open(path) {
            Ok(img) => Some(Frame::new(img.to_rgba8(), self.scale)),
            Err(e) => {
                debug!("Decode failed for {}: {}", path.display(), e);
                None
            }
        }
    }
}

fn has_sequence_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            SEQUENCE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
