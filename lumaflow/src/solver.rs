//! # Horn–Schunck relaxation
//!
//! The velocity field is refined by a fixed number of relaxation sweeps. Every sweep is two full
//! raster passes: neighbour averages of the current field, then the gradient-constrained update
//! that reads only those averages.

use crate::error::{FlowError, Result};
use crate::executor::{Executor, SequentialExecutor};
use crate::gradient::GradientTriple;
use crate::raster::Raster;
use nalgebra as na;

/// Default regularization weight.
pub const DEFAULT_LAMBDA: f32 = 5.0;

/// Default number of relaxation sweeps per frame.
pub const DEFAULT_ITERATIONS: usize = 4;

/// Dense optical flow velocity field.
///
/// Holds horizontal (`u`) and vertical (`v`) velocity per cell, in cells per second. The temporal
/// derivative is scaled by the frame rate, so the field does not depend on the capture interval.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowField {
    pub(crate) u: Raster<f32>,
    pub(crate) v: Raster<f32>,
}

impl FlowField {
    /// Create a zero velocity field.
    ///
    /// # Arguments
    ///
    /// * `width` - width of the field.
    /// * `height` - height of the field.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            u: Raster::from_elem(width, height, 0.0),
            v: Raster::from_elem(width, height, 0.0),
        }
    }

    /// Create a field from its velocity components.
    pub fn from_components(u: Raster<f32>, v: Raster<f32>) -> Result<Self> {
        u.ensure_same_dim(&v)?;
        Ok(Self { u, v })
    }

    /// Get width and height of the field.
    pub fn dim(&self) -> (usize, usize) {
        self.u.dim()
    }

    pub fn u(&self) -> &Raster<f32> {
        &self.u
    }

    pub fn v(&self) -> &Raster<f32> {
        &self.v
    }

    /// Get motion at coordinates.
    ///
    /// # Arguments
    ///
    /// * `x` - horizontal coordinate.
    /// * `y` - vertical coordinate.
    pub fn get_motion(&self, x: usize, y: usize) -> na::Vector2<f32> {
        na::Vector2::new(self.u.get(x, y), self.v.get(x, y))
    }

    /// Iterate every element of the field.
    ///
    /// The resulting iterator yields `(x, y, motion)` entries.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, na::Vector2<f32>)> + '_ {
        self.u
            .iter()
            .zip(self.v.as_slice())
            .map(|((x, y, u), &v)| (x, y, na::Vector2::new(u, v)))
    }

    /// Iterate every element of the field as motion entries.
    ///
    /// Positions are normalised to the 0-1 range, motion stays in raw units.
    pub fn motion_iter(&self) -> impl Iterator<Item = MotionEntry> + '_ {
        let (width, height) = self.dim();
        self.iter().map(move |(x, y, motion)| {
            (
                na::Point2::new(x as f32 / width as f32, y as f32 / height as f32),
                motion,
            )
        })
    }

    /// Overwrite the field with the velocities of `other`, which must have the same dimensions.
    pub(crate) fn copy_from(&mut self, other: &FlowField) {
        self.u.as_mut_slice().copy_from_slice(other.u.as_slice());
        self.v.as_mut_slice().copy_from_slice(other.v.as_slice());
    }

    /// Reset every velocity to zero.
    pub(crate) fn clear(&mut self) {
        self.u.as_mut_slice().fill(0.0);
        self.v.as_mut_slice().fill(0.0);
    }

    fn ensure_dim(&self, dim: (usize, usize)) -> Result<()> {
        if self.dim() != dim {
            Err(FlowError::DimensionMismatch {
                left: dim,
                right: self.dim(),
            })
        } else {
            Ok(())
        }
    }
}

/// Neighbour average buffers of the relaxation passes.
#[derive(Clone, Debug)]
pub struct RelaxScratch {
    u_avg: Raster<f32>,
    v_avg: Raster<f32>,
}

impl RelaxScratch {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            u_avg: Raster::from_elem(width, height, 0.0),
            v_avg: Raster::from_elem(width, height, 0.0),
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.u_avg.dim()
    }
}

/// Pair containing coordinates and motion at them.
pub type MotionEntry = (na::Point2<f32>, na::Vector2<f32>);

/// Average of the in-bounds axis-aligned neighbours for row `j`.
///
/// Corners use 2 neighbours, edges 3. A cell without any neighbour keeps its own value.
pub(crate) fn average_row(field: &Raster<f32>, j: usize, out: &mut [f32]) {
    let (width, height) = field.dim();
    let row = field.row(j);
    let up = (j > 0).then(|| field.row(j - 1));
    let down = (j + 1 < height).then(|| field.row(j + 1));

    for (i, out) in out.iter_mut().enumerate() {
        let mut sum = 0f32;
        let mut count = 0u8;

        if i > 0 {
            sum += row[i - 1];
            count += 1;
        }
        if let Some(up) = up {
            sum += up[i];
            count += 1;
        }
        if i + 1 < width {
            sum += row[i + 1];
            count += 1;
        }
        if let Some(down) = down {
            sum += down[i];
            count += 1;
        }

        *out = if count > 0 { sum / count as f32 } else { row[i] };
    }
}

/// Gradient-constrained update of one row.
#[allow(clippy::too_many_arguments)]
pub(crate) fn update_row(
    ex: &[f32],
    ey: &[f32],
    et: &[f32],
    u_avg: &[f32],
    v_avg: &[f32],
    lambda: f32,
    u: &mut [f32],
    v: &mut [f32],
) {
    for i in 0..u.len() {
        let (ex, ey) = (ex[i], ey[i]);
        let adjustment =
            (ex * u_avg[i] + ey * v_avg[i] + et[i]) / (1.0 + lambda * (ex * ex + ey * ey));
        u[i] = u_avg[i] - ex * adjustment;
        v[i] = v_avg[i] - ey * adjustment;
    }
}

/// Horn–Schunck flow solver with a fixed sweep budget.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HornSchunck {
    /// Regularization weight.
    pub lambda: f32,
    /// Number of relaxation sweeps. Convergence is never checked.
    pub iterations: usize,
}

impl Default for HornSchunck {
    fn default() -> Self {
        Self {
            lambda: DEFAULT_LAMBDA,
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl HornSchunck {
    pub fn new(lambda: f32, iterations: usize) -> Self {
        Self { lambda, iterations }
    }

    /// Relax `field` in place.
    ///
    /// Allocates the neighbour average buffers for this call only. Use
    /// [`relax_with`](Self::relax_with) to reuse them across frames.
    pub fn relax(
        &self,
        executor: &dyn Executor,
        gradients: &GradientTriple,
        field: &mut FlowField,
    ) -> Result<()> {
        let (w, h) = gradients.dim();
        self.relax_with(executor, gradients, field, &mut RelaxScratch::new(w, h))
    }

    /// Relax `field` in place, using preallocated average buffers.
    ///
    /// # Arguments
    ///
    /// * `executor` - backend running the average and update passes.
    /// * `gradients` - brightness derivatives of the frame pair.
    /// * `field` - starting estimate, replaced by the relaxed field.
    /// * `scratch` - average buffers sized like the gradients.
    pub fn relax_with(
        &self,
        executor: &dyn Executor,
        gradients: &GradientTriple,
        field: &mut FlowField,
        scratch: &mut RelaxScratch,
    ) -> Result<()> {
        field.ensure_dim(gradients.dim())?;
        scratch.u_avg.ensure_same_dim(&field.u)?;

        let RelaxScratch { u_avg, v_avg } = scratch;

        for _ in 0..self.iterations {
            executor.run_average(&field.u, u_avg);
            executor.run_average(&field.v, v_avg);
            executor.run_update(gradients, self.lambda, u_avg, v_avg, field);
        }

        Ok(())
    }

    /// Solve for the velocity field.
    ///
    /// Starts from `seed` when given, and from a zero field otherwise.
    pub fn solve(
        &self,
        executor: &dyn Executor,
        gradients: &GradientTriple,
        seed: Option<FlowField>,
    ) -> Result<FlowField> {
        let (w, h) = gradients.dim();
        let mut field = seed.unwrap_or_else(|| FlowField::new(w, h));
        self.relax(executor, gradients, &mut field)?;
        Ok(field)
    }
}

/// Solve for the velocity field on the calling thread.
///
/// # Arguments
///
/// * `gradients` - brightness derivatives of the frame pair.
/// * `iterations` - number of relaxation sweeps.
/// * `lambda` - regularization weight.
/// * `seed` - optional starting field, must match the gradient dimensions.
pub fn solve(
    gradients: &GradientTriple,
    iterations: usize,
    lambda: f32,
    seed: Option<FlowField>,
) -> Result<FlowField> {
    HornSchunck::new(lambda, iterations).solve(&SequentialExecutor, gradients, seed)
}
