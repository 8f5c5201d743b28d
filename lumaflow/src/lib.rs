//! # Luma Flow
//!
//! Dense optical flow for live camera streams. Frames are decoded down to a grayscale raster,
//! compared against the previous one and turned into a per-pixel velocity field with a fixed
//! number of Horn–Schunck relaxation sweeps. A sparse grid of smoothed samples is extracted from
//! the field for display.
//!
//! The easiest way to use the library is to import its prelude:
//!
//! ```
//! use lumaflow::prelude::v1::*;
//! use std::time::Duration;
//!
//! fn frame(luma: u8, ms: u64) -> CapturedFrame {
//!     let (width, height) = (16, 16);
//!     let mut data = vec![128; width * height * 3 / 2];
//!     data[..width * height].fill(100);
//!     data[0] = luma;
//!     CapturedFrame { data, width, height, timestamp: Duration::from_millis(ms) }
//! }
//!
//! # fn main() -> Result<()> {
//! let mut pipeline = Pipeline::new(PipelineConfig::default())?;
//!
//! assert!(pipeline.process_frame(&frame(100, 0))?.is_empty());
//!
//! let samples = pipeline.process_frame(&frame(150, 33))?;
//! assert_eq!(samples.len(), 12);
//! assert!(samples[0].magnitude > 0.0);
//! # Ok(())
//! # }
//! ```
//!
//! You may need [`nalgebra`](https://crates.io/crates/nalgebra) to make use of the functionality.

pub mod capture;
pub mod config;
pub mod error;
pub mod executor;
pub mod frame;
pub mod gradient;
pub mod pipeline;
pub mod properties;
pub mod raster;
pub mod sampler;
pub mod solver;
pub mod utils;

pub mod prelude {
    pub mod v1 {
        pub use crate::{
            capture::{negotiate_size, CapturedFrame, FrameSource},
            config::PipelineConfig,
            error::{ErrorKind, FlowError},
            executor::{Executor, ExecutorKind, SequentialExecutor},
            frame::{decode, FrameBuffer, RGBA},
            gradient::{compute_gradients, GradientTriple},
            pipeline::{Pipeline, PipelineStats},
            properties::{BoundedProp, Properties, Property, PropertyMut},
            raster::Raster,
            sampler::{sample, FlowSample, FlowSampler, SampleGrid},
            solver::{solve, FlowField, HornSchunck, MotionEntry, RelaxScratch},
        };
        pub use anyhow::{anyhow, Error, Result};
    }
}
