//! # Capture boundary
//!
//! Camera access lives outside this crate. Capture backends implement [`FrameSource`] and hand
//! over one packed frame at a time.

use anyhow::Result;
use std::time::Duration;

/// A frame received from a capture backend.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapturedFrame {
    /// Packed NV21 bytes, `width * height * 3 / 2` of them.
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    /// Capture time, relative to an arbitrary but fixed origin.
    pub timestamp: Duration,
}

/// Source of camera frames.
pub trait FrameSource {
    /// Frame sizes the device can deliver, in order of preference.
    fn supported_sizes(&self) -> Vec<(usize, usize)>;

    /// Select the capture size.
    ///
    /// Called once before the first frame is requested, with one of the supported sizes.
    fn set_size(&mut self, width: usize, height: usize) -> Result<()>;

    /// Fetch the next frame in the stream.
    ///
    /// Skips `skip_frames` frames before returning one, so that a consumer that fell behind
    /// catches up with the stream instead of queueing stale frames. Returns `Ok(None)` once the
    /// stream has ended, and `Err` when the device fails.
    fn next_frame(&mut self, skip_frames: usize) -> Result<Option<CapturedFrame>>;

    /// Get the framerate of the stream.
    ///
    /// This will return `Some(framerate)` if it is known. On realtime streams it may
    /// not always be known. In such cases, `None` is returned.
    fn get_framerate(&self) -> Option<f64>;
}

/// Pick the advertised size whose pixel count is nearest to `target_pixels`.
///
/// Ties are resolved in favour of the size listed first. Returns `None` on an empty list.
pub fn negotiate_size(sizes: &[(usize, usize)], target_pixels: usize) -> Option<(usize, usize)> {
    sizes
        .iter()
        .copied()
        .enumerate()
        .min_by_key(|&(i, (w, h))| ((w * h).abs_diff(target_pixels), i))
        .map(|(_, size)| size)
}
