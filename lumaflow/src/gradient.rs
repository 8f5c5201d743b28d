//! # Brightness derivatives
//!
//! Spatial and temporal derivatives are estimated over 2x2 pixel blocks spanning both frames, so
//! derivative rasters are one row and one column smaller than the grayscale input.

use crate::error::{FlowError, Result};
use crate::executor::{Executor, SequentialExecutor};
use crate::raster::Raster;

/// Horizontal, vertical and temporal brightness derivatives.
#[derive(Clone, Debug, PartialEq)]
pub struct GradientTriple {
    pub(crate) ex: Raster<f32>,
    pub(crate) ey: Raster<f32>,
    pub(crate) et: Raster<f32>,
}

impl GradientTriple {
    /// Create zeroed derivative rasters for a `width x height` grayscale input.
    pub fn for_input(width: usize, height: usize) -> Self {
        let (w, h) = (width.saturating_sub(1), height.saturating_sub(1));
        Self {
            ex: Raster::from_elem(w, h, 0.0),
            ey: Raster::from_elem(w, h, 0.0),
            et: Raster::from_elem(w, h, 0.0),
        }
    }

    /// Assemble a triple from precomputed derivatives.
    pub fn from_components(ex: Raster<f32>, ey: Raster<f32>, et: Raster<f32>) -> Result<Self> {
        ex.ensure_same_dim(&ey)?;
        ex.ensure_same_dim(&et)?;
        Ok(Self { ex, ey, et })
    }

    /// Get width and height of the derivative rasters.
    pub fn dim(&self) -> (usize, usize) {
        self.ex.dim()
    }

    /// Horizontal derivative, brightness per pixel.
    pub fn ex(&self) -> &Raster<f32> {
        &self.ex
    }

    /// Vertical derivative, brightness per pixel.
    pub fn ey(&self) -> &Raster<f32> {
        &self.ey
    }

    /// Temporal derivative, brightness per second.
    pub fn et(&self) -> &Raster<f32> {
        &self.et
    }
}

/// Compute derivatives of a single output row `j`.
///
/// Reads grayscale rows `j` and `j + 1` of both frames. Sums are taken in integers before
/// division, so results are exact for 8-bit input.
pub(crate) fn gradient_row(
    prev: &Raster<u8>,
    curr: &Raster<u8>,
    fps: f32,
    j: usize,
    ex: &mut [f32],
    ey: &mut [f32],
    et: &mut [f32],
) {
    let (p0, p1) = (prev.row(j), prev.row(j + 1));
    let (c0, c1) = (curr.row(j), curr.row(j + 1));

    for i in 0..ex.len() {
        // a b
        // c d
        let [pa, pb, pc, pd] = [p0[i], p0[i + 1], p1[i], p1[i + 1]].map(i32::from);
        let [ca, cb, cc, cd] = [c0[i], c0[i + 1], c1[i], c1[i + 1]].map(i32::from);

        let dx = (cb + pb + cd + pd) - (ca + pa + cc + pc);
        let dy = (cc + pc + cd + pd) - (ca + pa + cb + pb);
        let dt = (ca + cb + cc + cd) - (pa + pb + pc + pd);

        ex[i] = dx as f32 / 4.0;
        ey[i] = dy as f32 / 4.0;
        et[i] = fps * (dt as f32 / 4.0);
    }
}

fn check_inputs(prev: &Raster<u8>, curr: &Raster<u8>) -> Result<()> {
    prev.ensure_same_dim(curr)?;

    let (w, h) = prev.dim();
    if w < 2 || h < 2 {
        return Err(FlowError::RasterTooSmall(w, h));
    }

    Ok(())
}

/// Compute brightness derivatives into preallocated rasters.
///
/// # Arguments
///
/// * `executor` - backend running the pass.
/// * `prev` - grayscale raster of the previous frame.
/// * `curr` - grayscale raster of the current frame.
/// * `fps` - instantaneous frame rate, scales the temporal derivative to per-second units.
/// * `out` - derivative rasters, sized for the input via [`GradientTriple::for_input`].
pub fn compute_gradients_into(
    executor: &dyn Executor,
    prev: &Raster<u8>,
    curr: &Raster<u8>,
    fps: f32,
    out: &mut GradientTriple,
) -> Result<()> {
    check_inputs(prev, curr)?;

    let (w, h) = prev.dim();
    if out.dim() != (w - 1, h - 1) {
        return Err(FlowError::DimensionMismatch {
            left: (w - 1, h - 1),
            right: out.dim(),
        });
    }

    executor.run_gradients(prev, curr, fps, out);

    Ok(())
}

/// Compute brightness derivatives using the given executor.
pub fn compute_gradients_with(
    executor: &dyn Executor,
    prev: &Raster<u8>,
    curr: &Raster<u8>,
    fps: f32,
) -> Result<GradientTriple> {
    check_inputs(prev, curr)?;
    let (w, h) = prev.dim();
    let mut out = GradientTriple::for_input(w, h);
    compute_gradients_into(executor, prev, curr, fps, &mut out)?;
    Ok(out)
}

/// Compute brightness derivatives on the calling thread.
pub fn compute_gradients(
    prev: &Raster<u8>,
    curr: &Raster<u8>,
    fps: f32,
) -> Result<GradientTriple> {
    compute_gradients_with(&SequentialExecutor, prev, curr, fps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn identical_frames() {
        let r = Raster::from_fn(5, 4, |x, y| (x * 13 + y * 7) as u8);
        let g = compute_gradients(&r, &r, 30.0).unwrap();
        assert_eq!(g.dim(), (4, 3));
        assert!(g.et().as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn uniform_brightening() {
        let fps = 24.5;
        let prev = Raster::from_elem(6, 5, 100u8);
        let curr = Raster::from_elem(6, 5, 112u8);
        let g = compute_gradients(&prev, &curr, fps).unwrap();

        assert!(g.et().as_slice().iter().all(|&v| v == fps * 12.0));
        assert!(g.ex().as_slice().iter().all(|&v| v == 0.0));
        assert!(g.ey().as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn spatial_ramps() {
        let horizontal = Raster::from_fn(4, 4, |x, _| (x * 10) as u8);
        let g = compute_gradients(&horizontal, &horizontal, 30.0).unwrap();
        assert!(g.ex().as_slice().iter().all(|&v| v == 10.0));
        assert!(g.ey().as_slice().iter().all(|&v| v == 0.0));

        let vertical = Raster::from_fn(4, 4, |_, y| (y * 3) as u8);
        let g = compute_gradients(&vertical, &vertical, 30.0).unwrap();
        assert!(g.ex().as_slice().iter().all(|&v| v == 0.0));
        assert!(g.ey().as_slice().iter().all(|&v| v == 3.0));
    }

    #[test]
    fn single_block() {
        // prev: 0 0 / 0 0, curr: 0 8 / 0 0
        let prev = Raster::from_elem(2, 2, 0u8);
        let curr = Raster::new(2, 2, vec![0, 8, 0, 0]).unwrap();
        let g = compute_gradients(&prev, &curr, 2.0).unwrap();
        assert_eq!(g.ex().as_slice(), &[2.0]);
        assert_eq!(g.ey().as_slice(), &[-2.0]);
        assert_eq!(g.et().as_slice(), &[4.0]);
    }

    #[test]
    fn mismatched_inputs() {
        let a = Raster::from_elem(4, 4, 0u8);
        let b = Raster::from_elem(4, 3, 0u8);
        let err = compute_gradients(&a, &b, 30.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);

        let tiny = Raster::from_elem(1, 4, 0u8);
        assert_eq!(
            compute_gradients(&tiny, &tiny, 30.0),
            Err(FlowError::RasterTooSmall(1, 4))
        );

        let mut out = GradientTriple::for_input(5, 5);
        let err = compute_gradients_into(&SequentialExecutor, &a, &a, 30.0, &mut out).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
    }
}
