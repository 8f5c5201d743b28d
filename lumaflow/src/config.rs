//! # Pipeline configuration

use crate::error::FlowError;
use crate::executor::ExecutorKind;
use crate::properties::{Properties, PropertyMut};
use crate::sampler::{FlowSampler, SampleGrid, DEFAULT_ARROW_SCALE};
use crate::solver::{HornSchunck, DEFAULT_ITERATIONS, DEFAULT_LAMBDA};
use anyhow::anyhow;

/// Tunable parameters of a [`Pipeline`](crate::pipeline::Pipeline).
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PipelineConfig {
    /// Approximate capture resolution, in pixels.
    pub target_pixel_count: usize,
    /// Spatial decimation applied after capture.
    pub downscale_factor: usize,
    /// Regularization weight of the solver.
    pub lambda: f32,
    /// Relaxation sweeps per frame.
    pub iterations: usize,
    /// Sample magnitude multiplier.
    pub arrow_scale: f32,
    /// Seed every solve with the previous frame's field instead of zero.
    pub warm_start: bool,
    pub executor: ExecutorKind,
    /// Sample grid columns.
    pub sample_columns: usize,
    /// Sample grid rows.
    pub sample_rows: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_pixel_count: 240 * 320,
            downscale_factor: 4,
            lambda: DEFAULT_LAMBDA,
            iterations: DEFAULT_ITERATIONS,
            arrow_scale: DEFAULT_ARROW_SCALE,
            warm_start: false,
            executor: ExecutorKind::default(),
            sample_columns: 4,
            sample_rows: 3,
        }
    }
}

impl PipelineConfig {
    /// Check that the configuration is usable.
    ///
    /// Whether the downscale factor divides the frame size is only known once frames arrive, so
    /// this just rejects a zero factor and a negative or non-finite lambda.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.downscale_factor == 0 {
            return Err(FlowError::Downscale {
                factor: 0,
                width: 0,
                height: 0,
            }
            .into());
        }

        if !self.lambda.is_finite() || self.lambda < 0.0 {
            return Err(anyhow!("lambda must be a non-negative number, got {}", self.lambda));
        }

        Ok(())
    }

    /// Solver described by this configuration.
    pub fn solver(&self) -> HornSchunck {
        HornSchunck::new(self.lambda, self.iterations)
    }

    pub fn sampler(&self) -> FlowSampler {
        FlowSampler::new(self.arrow_scale)
    }

    pub fn grid(&self) -> SampleGrid {
        SampleGrid {
            columns: self.sample_columns,
            rows: self.sample_rows,
        }
    }
}

impl Properties for PipelineConfig {
    fn props_mut(&mut self) -> Vec<(&str, PropertyMut<'_>)> {
        vec![
            ("Lambda", PropertyMut::float(&mut self.lambda, 0.0, 1000.0)),
            ("Iterations", PropertyMut::usize(&mut self.iterations, 0, 256)),
            ("Downscale", PropertyMut::usize(&mut self.downscale_factor, 1, 64)),
            ("Arrow scale", PropertyMut::float(&mut self.arrow_scale, 0.0, 1000.0)),
            ("Warm start", PropertyMut::bool(&mut self.warm_start)),
            ("Sample columns", PropertyMut::usize(&mut self.sample_columns, 0, 64)),
            ("Sample rows", PropertyMut::usize(&mut self.sample_rows, 0, 64)),
        ]
    }
}
