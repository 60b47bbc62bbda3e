//! Decoded raster frame handed from sources to the cache and the host.
//!
//! **Why**: Decoded frames travel between the worker context (decode), the
//! cache, and the tick context (emission). The pixel buffer is shared behind an
//! `Arc` so every hop is a pointer copy, never a pixel copy.
//!
//! Pixels are always 8-bit RGBA. Sources decoding other formats convert on
//! their side of the [`FrameSource`](super::FrameSource) boundary.

use image::RgbaImage;
use std::sync::Arc;

/// Immutable decoded frame (cheap to clone)
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<RgbaImage>,
    scale: f32,
}

impl Frame {
    /// Wrap a decoded image. `scale` is the source's point-to-pixel ratio.
    pub fn new(image: RgbaImage, scale: f32) -> Self {
        Self {
            image: Arc::new(image),
            scale,
        }
    }

    /// Frame filled with a single RGBA color
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self::new(RgbaImage::from_pixel(width, height, image::Rgba(rgba)), 1.0)
    }

    /// Same pixels, different scale
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Raw RGBA bytes, row-major
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// RGBA value of the top-left pixel (handy for identifying test frames)
    pub fn first_pixel(&self) -> Option<[u8; 4]> {
        self.pixels()
            .get(..4)
            .map(|px| [px[0], px[1], px[2], px[3]])
    }

    /// Memory footprint of the pixel buffer in bytes
    pub fn mem(&self) -> usize {
        self.image.as_raw().len()
    }

    /// True when both frames share the same pixel buffer
    pub fn ptr_eq(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}
