//! # Pass executors
//!
//! Every raster-wide pass of the pipeline is data parallel: each output row depends only on a
//! small neighbourhood of the previous pass. Executors decide how rows are scheduled. All of them
//! run the same row kernels, so results do not depend on the executor chosen.

use crate::gradient::{gradient_row, GradientTriple};
use crate::raster::Raster;
use crate::solver::{average_row, update_row, FlowField};

/// Backend running the parallelisable passes.
///
/// Callers validate dimensions before dispatching. Implementations may assume every raster
/// handed to them is correctly sized, and must not return before the whole pass is complete.
pub trait Executor: Send + Sync {
    /// Compute brightness derivatives of `prev` and `curr` into `out`.
    fn run_gradients(
        &self,
        prev: &Raster<u8>,
        curr: &Raster<u8>,
        fps: f32,
        out: &mut GradientTriple,
    );

    /// Write the neighbour average of every cell of `field` into `out`.
    fn run_average(&self, field: &Raster<f32>, out: &mut Raster<f32>);

    /// Overwrite `field` with the gradient-constrained update of the averages.
    fn run_update(
        &self,
        gradients: &GradientTriple,
        lambda: f32,
        u_avg: &Raster<f32>,
        v_avg: &Raster<f32>,
        field: &mut FlowField,
    );

    /// Human readable name of the executor.
    fn name(&self) -> &'static str;
}

/// Runs every pass on the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialExecutor;

impl Executor for SequentialExecutor {
    fn run_gradients(
        &self,
        prev: &Raster<u8>,
        curr: &Raster<u8>,
        fps: f32,
        out: &mut GradientTriple,
    ) {
        let width = out.dim().0.max(1);
        let GradientTriple { ex, ey, et } = out;

        ex.as_mut_slice()
            .chunks_exact_mut(width)
            .zip(ey.as_mut_slice().chunks_exact_mut(width))
            .zip(et.as_mut_slice().chunks_exact_mut(width))
            .enumerate()
            .for_each(|(j, ((ex, ey), et))| gradient_row(prev, curr, fps, j, ex, ey, et));
    }

    fn run_average(&self, field: &Raster<f32>, out: &mut Raster<f32>) {
        let width = out.width().max(1);
        out.as_mut_slice()
            .chunks_exact_mut(width)
            .enumerate()
            .for_each(|(j, out)| average_row(field, j, out));
    }

    fn run_update(
        &self,
        gradients: &GradientTriple,
        lambda: f32,
        u_avg: &Raster<f32>,
        v_avg: &Raster<f32>,
        field: &mut FlowField,
    ) {
        let width = field.dim().0.max(1);
        let FlowField { u, v } = field;

        u.as_mut_slice()
            .chunks_exact_mut(width)
            .zip(v.as_mut_slice().chunks_exact_mut(width))
            .enumerate()
            .for_each(|(j, (u, v))| {
                update_row(
                    gradients.ex.row(j),
                    gradients.ey.row(j),
                    gradients.et.row(j),
                    u_avg.row(j),
                    v_avg.row(j),
                    lambda,
                    u,
                    v,
                )
            });
    }

    fn name(&self) -> &'static str {
        "sequential"
    }
}

/// Splits every pass by rows across the global `rayon` thread pool.
#[cfg(feature = "parallel")]
#[derive(Clone, Copy, Debug, Default)]
pub struct RayonExecutor;

#[cfg(feature = "parallel")]
impl Executor for RayonExecutor {
    fn run_gradients(
        &self,
        prev: &Raster<u8>,
        curr: &Raster<u8>,
        fps: f32,
        out: &mut GradientTriple,
    ) {
        use rayon::prelude::*;

        let width = out.dim().0.max(1);
        let GradientTriple { ex, ey, et } = out;

        ex.as_mut_slice()
            .par_chunks_exact_mut(width)
            .zip(ey.as_mut_slice().par_chunks_exact_mut(width))
            .zip(et.as_mut_slice().par_chunks_exact_mut(width))
            .enumerate()
            .for_each(|(j, ((ex, ey), et))| gradient_row(prev, curr, fps, j, ex, ey, et));
    }

    fn run_average(&self, field: &Raster<f32>, out: &mut Raster<f32>) {
        use rayon::prelude::*;

        let width = out.width().max(1);
        out.as_mut_slice()
            .par_chunks_exact_mut(width)
            .enumerate()
            .for_each(|(j, out)| average_row(field, j, out));
    }

    fn run_update(
        &self,
        gradients: &GradientTriple,
        lambda: f32,
        u_avg: &Raster<f32>,
        v_avg: &Raster<f32>,
        field: &mut FlowField,
    ) {
        use rayon::prelude::*;

        let width = field.dim().0.max(1);
        let FlowField { u, v } = field;

        u.as_mut_slice()
            .par_chunks_exact_mut(width)
            .zip(v.as_mut_slice().par_chunks_exact_mut(width))
            .enumerate()
            .for_each(|(j, (u, v))| {
                update_row(
                    gradients.ex.row(j),
                    gradients.ey.row(j),
                    gradients.et.row(j),
                    u_avg.row(j),
                    v_avg.row(j),
                    lambda,
                    u,
                    v,
                )
            });
    }

    fn name(&self) -> &'static str {
        "rayon"
    }
}

/// Executor selection, as stored in configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ExecutorKind {
    /// Run on the calling thread.
    #[default]
    Sequential,
    /// Split passes across worker threads.
    Parallel,
}

impl ExecutorKind {
    /// Instantiate the executor.
    ///
    /// Without the `parallel` feature, `Parallel` falls back to the sequential executor.
    pub fn create(self) -> Box<dyn Executor> {
        match self {
            Self::Sequential => Box::new(SequentialExecutor),
            #[cfg(feature = "parallel")]
            Self::Parallel => Box::new(RayonExecutor),
            #[cfg(not(feature = "parallel"))]
            Self::Parallel => {
                log::warn!("built without the `parallel` feature, using the sequential executor");
                Box::new(SequentialExecutor)
            }
        }
    }
}
