//! Captured video frames.
//!
//! - `Frame`: RGB8 pixel buffer plus dimensions, sequence number and capture time.
//!
//! Pixel data sits behind an `Arc` so a frame can be published to the render
//! worker and still be handed to the pose estimator without copying. Frames are
//! immutable once captured.

use anyhow::{anyhow, Result};
use std::sync::Arc;

use crate::clock::Timestamp;

/// Bytes per RGB8 pixel.
pub const CHANNELS: usize = 3;

#[derive(Clone, Debug)]
pub struct Frame {
    pixels: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    /// Capture-order sequence number assigned by the source.
    pub seq: u64,
    pub captured_at: Timestamp,
}

impl Frame {
    /// Wraps an RGB8 buffer. Fails when the buffer does not match the dimensions.
    pub fn new(
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        seq: u64,
        captured_at: Timestamp,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * CHANNELS;
        if pixels.len() != expected {
            return Err(anyhow!(
                "frame {} has {} bytes, expected {} for {}x{} rgb",
                seq,
                pixels.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            pixels: pixels.into(),
            width,
            height,
            seq,
            captured_at,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    /// True when both frames share the same pixel allocation.
    pub fn same_pixels(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}
