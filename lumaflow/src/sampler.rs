//! # Sparse flow sampling
//!
//! Converts the dense field into a handful of smoothed, polar velocity samples for display.

use crate::error::{FlowError, Result};
use crate::solver::FlowField;
use nalgebra as na;

/// Default multiplier applied to sample magnitudes.
pub const DEFAULT_ARROW_SCALE: f32 = 5.0;

/// Smoothed velocity at a single point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowSample {
    /// Requested sample position, in field cells.
    pub position: na::Point2<f32>,
    /// Velocity averaged over the 3x3 neighbourhood.
    pub velocity: na::Vector2<f32>,
    /// Scaled length of `velocity`.
    pub magnitude: f32,
    /// Direction of `velocity`, in degrees.
    pub angle: f32,
}

/// Samples a flow field at arbitrary points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowSampler {
    /// Magnitude multiplier, turns raw velocity into display length.
    pub scale: f32,
}

impl Default for FlowSampler {
    fn default() -> Self {
        Self {
            scale: DEFAULT_ARROW_SCALE,
        }
    }
}

impl FlowSampler {
    pub fn new(scale: f32) -> Self {
        Self { scale }
    }

    /// Sample the field at a single point.
    ///
    /// The point is truncated to a cell, and velocities of the in-bounds cells of the 3x3 window
    /// around it are averaged.
    ///
    /// # Arguments
    ///
    /// * `field` - field to sample.
    /// * `x` - horizontal cell coordinate.
    /// * `y` - vertical cell coordinate.
    pub fn sample_point(&self, field: &FlowField, x: f32, y: f32) -> Result<FlowSample> {
        let (width, height) = field.dim();

        let out_of_bounds = || FlowError::OutOfBounds {
            x,
            y,
            width,
            height,
        };

        if !x.is_finite() || !y.is_finite() {
            return Err(out_of_bounds());
        }

        let (cx, cy) = (x.trunc() as isize, y.trunc() as isize);

        let mut sum = na::Vector2::zeros();
        let mut count = 0usize;

        for oy in -1..=1 {
            for ox in -1..=1 {
                if let (Some(u), Some(v)) = (
                    field.u().get_checked(cx + ox, cy + oy),
                    field.v().get_checked(cx + ox, cy + oy),
                ) {
                    sum += na::Vector2::new(u, v);
                    count += 1;
                }
            }
        }

        if count == 0 {
            return Err(out_of_bounds());
        }

        let velocity = sum / count as f32;

        Ok(FlowSample {
            position: na::Point2::new(x, y),
            velocity,
            magnitude: self.scale * velocity.magnitude(),
            angle: velocity.y.atan2(velocity.x).to_degrees(),
        })
    }

    /// Sample the field at every point.
    ///
    /// Fails on the first point whose neighbourhood lies entirely outside the field.
    pub fn sample(&self, field: &FlowField, points: &[(f32, f32)]) -> Result<Vec<FlowSample>> {
        points
            .iter()
            .map(|&(x, y)| self.sample_point(field, x, y))
            .collect()
    }
}

/// Sample a field with the given magnitude scale.
pub fn sample(field: &FlowField, points: &[(f32, f32)], scale: f32) -> Result<Vec<FlowSample>> {
    FlowSampler::new(scale).sample(field, points)
}

/// Evenly spaced grid of sample points.
///
/// Points sit at the centres of `columns x rows` equally sized tiles, using integer tile sizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct SampleGrid {
    pub columns: usize,
    pub rows: usize,
}

impl Default for SampleGrid {
    fn default() -> Self {
        Self {
            columns: 4,
            rows: 3,
        }
    }
}

impl SampleGrid {
    /// Compute grid points for a `width x height` field, row by row.
    pub fn points(&self, width: usize, height: usize) -> Vec<(f32, f32)> {
        fn axis(len: usize, n: usize) -> impl Iterator<Item = usize> {
            let (offset, step) = if n > 0 {
                (len / (2 * n), len / n)
            } else {
                (0, 0)
            };
            (0..n).map(move |k| offset + k * step)
        }

        axis(height, self.rows)
            .flat_map(|y| axis(width, self.columns).map(move |x| (x as f32, y as f32)))
            .collect()
    }
}
