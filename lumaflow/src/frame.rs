//! # Planar frame decoding
//!
//! Camera frames arrive as NV21 buffers: a full resolution luma (Y) plane followed by a half
//! resolution plane of interleaved V/U chroma pairs. The flow engine only ever needs the luma
//! plane, the colour decode exists for previews.

use crate::error::{FlowError, Result};
use crate::raster::Raster;
use bytemuck::{Pod, Zeroable};

/// RGBA colour structure.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct RGBA {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl RGBA {
    /// Convert from a slice containing `[r, g, b]` elements.
    pub fn from_rgb_slice(rgb: &[u8]) -> Self {
        Self {
            r: rgb[0],
            g: rgb[1],
            b: rgb[2],
            a: 255,
        }
    }

    /// Opaque grey of given brightness.
    pub fn grey(v: u8) -> Self {
        Self::from_rgb_slice(&[v, v, v])
    }
}

/// Borrowed packed luma/chroma frame.
///
/// The length is validated on construction, so a `FrameBuffer` always holds exactly
/// `width * height * 3 / 2` bytes.
#[derive(Clone, Copy, Debug)]
pub struct FrameBuffer<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
}

impl<'a> FrameBuffer<'a> {
    /// Wrap a raw frame.
    ///
    /// # Arguments
    ///
    /// * `data` - packed NV21 bytes.
    /// * `width` - luma plane width.
    /// * `height` - luma plane height.
    pub fn new(data: &'a [u8], width: usize, height: usize) -> Result<Self> {
        let expected = Self::expected_len(width, height);

        if data.len() != expected {
            return Err(FlowError::FrameLength {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Number of bytes a `width x height` frame occupies.
    pub fn expected_len(width: usize, height: usize) -> usize {
        width * height * 3 / 2
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// The luma plane, `width * height` bytes.
    pub fn luma(&self) -> &'a [u8] {
        &self.data[..self.width * self.height]
    }

    /// The interleaved V/U chroma plane.
    pub fn chroma(&self) -> &'a [u8] {
        &self.data[self.width * self.height..]
    }

    fn decimated_dim(&self, downscale: usize) -> Result<(usize, usize)> {
        if downscale == 0 || self.width % downscale != 0 || self.height % downscale != 0 {
            return Err(FlowError::Downscale {
                factor: downscale,
                width: self.width,
                height: self.height,
            });
        }

        Ok((self.width / downscale, self.height / downscale))
    }

    /// Decode the luma plane into a grayscale raster.
    ///
    /// Output cell `(i, j)` is the luma byte at `(i * downscale, j * downscale)`. Skipped pixels
    /// are not averaged in.
    pub fn decode_luma(&self, downscale: usize) -> Result<Raster<u8>> {
        let (w, h) = self.decimated_dim(downscale)?;
        let luma = self.luma();
        let stride = self.width;

        Ok(Raster::from_fn(w, h, |i, j| {
            luma[j * downscale * stride + i * downscale]
        }))
    }

    /// Decode the frame into RGBA for display.
    ///
    /// Uses the BT.601 integer approximation. Each 2x2 luma block shares one V/U pair, which is
    /// looked up for the exact source pixel that gets sampled, so downscaling never reads chroma
    /// belonging to a different block.
    pub fn decode_rgba(&self, downscale: usize) -> Result<Raster<RGBA>> {
        let (w, h) = self.decimated_dim(downscale)?;
        let luma = self.luma();
        let chroma = self.chroma();
        let stride = self.width;
        // Odd sized frames lack chroma for their last pixels, treat it as neutral.
        let chroma_at = |idx: usize| chroma.get(idx).copied().unwrap_or(128);

        Ok(Raster::from_fn(w, h, |i, j| {
            let (x, y) = (i * downscale, j * downscale);
            let uvp = (y >> 1) * stride + (x & !1);
            yuv_to_rgba(luma[y * stride + x], chroma_at(uvp + 1), chroma_at(uvp))
        }))
    }
}

/// Convert a single Y/U/V triple to an opaque RGBA pixel.
pub fn yuv_to_rgba(y: u8, u: u8, v: u8) -> RGBA {
    const MAX: i32 = 0x3ffff;

    let y = (y as i32 - 16).max(0);
    let u = u as i32 - 128;
    let v = v as i32 - 128;

    let y1192 = 1192 * y;
    let r = (y1192 + 1634 * v).clamp(0, MAX);
    let g = (y1192 - 833 * v - 400 * u).clamp(0, MAX);
    let b = (y1192 + 2066 * u).clamp(0, MAX);

    RGBA {
        r: (r >> 10) as u8,
        g: (g >> 10) as u8,
        b: (b >> 10) as u8,
        a: 255,
    }
}

/// Decode the luma plane of a raw frame.
///
/// Shorthand for [`FrameBuffer::new`] followed by [`FrameBuffer::decode_luma`].
pub fn decode(raw: &[u8], width: usize, height: usize, downscale: usize) -> Result<Raster<u8>> {
    FrameBuffer::new(raw, width, height)?.decode_luma(downscale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn frame(width: usize, height: usize, luma: impl Fn(usize, usize) -> u8) -> Vec<u8> {
        let mut data = vec![128u8; FrameBuffer::expected_len(width, height)];
        for y in 0..height {
            for x in 0..width {
                data[y * width + x] = luma(x, y);
            }
        }
        data
    }

    #[test]
    fn constant_luma() {
        let data = frame(8, 4, |_, _| 77);

        let full = decode(&data, 8, 4, 1).unwrap();
        assert_eq!(full.dim(), (8, 4));
        assert!(full.as_slice().iter().all(|&v| v == 77));

        let quarter = decode(&data, 8, 4, 2).unwrap();
        assert_eq!(quarter.dim(), (4, 2));
        assert!(quarter.as_slice().iter().all(|&v| v == 77));
    }

    #[test]
    fn point_sampled() {
        let data = frame(8, 8, |x, y| (y * 8 + x) as u8);
        let r = decode(&data, 8, 8, 4).unwrap();
        assert_eq!(r.as_slice(), &[0, 4, 32, 36]);
    }

    #[test]
    fn chroma_ignored() {
        let mut data = frame(4, 4, |_, _| 10);
        data[16..].iter_mut().for_each(|b| *b = 255);
        let r = decode(&data, 4, 4, 1).unwrap();
        assert!(r.as_slice().iter().all(|&v| v == 10));
    }

    #[test]
    fn wrong_length() {
        let data = vec![0u8; 4 * 4];
        let err = decode(&data, 4, 4, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert_eq!(
            err,
            FlowError::FrameLength {
                width: 4,
                height: 4,
                expected: 24,
                actual: 16
            }
        );
    }

    #[test]
    fn bad_downscale() {
        let data = frame(6, 4, |_, _| 0);
        for factor in [0, 4] {
            let err = decode(&data, 6, 4, factor).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Format);
        }
        assert!(decode(&data, 6, 4, 2).is_ok());
    }

    #[test]
    fn neutral_chroma_is_grey() {
        assert_eq!(yuv_to_rgba(16, 128, 128), RGBA::grey(0));
        assert_eq!(yuv_to_rgba(0, 128, 128), RGBA::grey(0));
        assert_eq!(yuv_to_rgba(128, 128, 128), RGBA::grey(130));
        assert_eq!(yuv_to_rgba(255, 128, 128), RGBA::grey(255));
    }

    #[test]
    fn chroma_per_block() {
        // Blue-ish chroma for the top right block, neutral elsewhere.
        let mut data = frame(4, 4, |_, _| 128);
        // V/U pair for block (1, 0)
        data[16 + 2] = 128;
        data[16 + 3] = 255;

        let rgba = FrameBuffer::new(&data, 4, 4)
            .unwrap()
            .decode_rgba(1)
            .unwrap();

        assert_eq!(rgba.get(0, 0), RGBA::grey(130));
        assert_eq!(rgba.get(1, 1), RGBA::grey(130));
        for (x, y) in [(2, 0), (3, 0), (2, 1), (3, 1)] {
            let px = rgba.get(x, y);
            assert!(px.b > px.r, "{:?}", px);
        }
        assert_eq!(rgba.get(2, 2), RGBA::grey(130));

        // The decimated decode picks the chroma of the sampled source pixel.
        let small = FrameBuffer::new(&data, 4, 4)
            .unwrap()
            .decode_rgba(2)
            .unwrap();
        assert_eq!(small.dim(), (2, 2));
        assert!(small.get(1, 0).b > small.get(1, 0).r);
        assert_eq!(small.get(0, 0), RGBA::grey(130));
    }
}
