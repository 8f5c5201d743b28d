//! Raw NV21 frame stream.

use lumaflow::prelude::v1::*;
use lumaflow::utils::read_full;
use std::io::Read;
use std::time::Duration;

/// Reads back-to-back NV21 frames of a fixed size.
///
/// The stream carries no timing information, so frames are timestamped at a nominal rate.
pub struct RawFrameSource<R> {
    reader: R,
    width: usize,
    height: usize,
    fps: f64,
    realtime: bool,
    index: u64,
    buf: Vec<u8>,
}

impl<R: Read> RawFrameSource<R> {
    /// Create a new source.
    ///
    /// # Arguments
    ///
    /// * `reader` - stream of raw frames.
    /// * `width` - frame width in pixels.
    /// * `height` - frame height in pixels.
    /// * `fps` - nominal frame rate used for timestamps.
    /// * `realtime` - whether frames may be dropped when processing falls behind.
    pub fn new(reader: R, width: usize, height: usize, fps: f64, realtime: bool) -> Result<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(anyhow!("invalid frame rate: {}", fps));
        }

        Ok(Self {
            reader,
            width,
            height,
            fps,
            realtime,
            index: 0,
            buf: vec![0; FrameBuffer::expected_len(width, height)],
        })
    }

    fn read_next(&mut self) -> Result<bool> {
        let ret = read_full(&mut self.reader, &mut self.buf)?;
        if ret {
            self.index += 1;
        }
        Ok(ret)
    }
}

impl<R: Read> FrameSource for RawFrameSource<R> {
    fn supported_sizes(&self) -> Vec<(usize, usize)> {
        vec![(self.width, self.height)]
    }

    fn set_size(&mut self, width: usize, height: usize) -> Result<()> {
        if (width, height) == (self.width, self.height) {
            Ok(())
        } else {
            Err(anyhow!(
                "raw stream is {}x{}, cannot switch to {}x{}",
                self.width,
                self.height,
                width,
                height
            ))
        }
    }

    fn next_frame(&mut self, skip_frames: usize) -> Result<Option<CapturedFrame>> {
        for _ in 0..skip_frames {
            if !self.read_next()? {
                return Ok(None);
            }
        }

        if !self.read_next()? {
            return Ok(None);
        }

        Ok(Some(CapturedFrame {
            data: self.buf.clone(),
            width: self.width,
            height: self.height,
            timestamp: Duration::from_secs_f64((self.index - 1) as f64 / self.fps),
        }))
    }

    /// Offline streams report no framerate, so that every frame gets processed.
    fn get_framerate(&self) -> Option<f64> {
        self.realtime.then(|| self.fps)
    }
}
