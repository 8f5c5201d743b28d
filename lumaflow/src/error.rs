//! # Flow pipeline errors

use thiserror::Error;

/// Coarse classification of a [`FlowError`].
///
/// Every kind is recoverable at frame granularity: the frame is skipped and the pipeline state is
/// left as it was before the call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Input buffer does not match the declared planar layout.
    Format,
    /// Rasters that must share dimensions do not.
    DimensionMismatch,
    /// Sample neighbourhood lies entirely outside the field.
    OutOfBounds,
    /// Non-positive time between two frames.
    DegenerateTiming,
}

/// An error produced by the flow pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    /// Frame buffer length does not match `width * height * 3 / 2`.
    #[error("frame buffer is {actual} bytes, expected {expected} for {width}x{height}")]
    FrameLength {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },

    /// Downscale factor is zero or does not evenly divide the frame.
    #[error("downscale factor {factor} does not evenly divide {width}x{height}")]
    Downscale {
        factor: usize,
        width: usize,
        height: usize,
    },

    /// Raster data length does not match its dimensions.
    #[error("raster data length ({0}) does not match the raster size ({1})")]
    RasterLength(usize, usize),

    /// Two rasters expected to share dimensions do not.
    #[error("dimensions {left:?} and {right:?} differ")]
    DimensionMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },

    /// Raster is too small to take finite differences over.
    #[error("raster of {0}x{1} is too small, need at least 2x2")]
    RasterTooSmall(usize, usize),

    /// Sample point has no cell of its 3x3 window inside the field.
    #[error("sample point ({x}, {y}) lies outside the {width}x{height} field")]
    OutOfBounds {
        x: f32,
        y: f32,
        width: usize,
        height: usize,
    },

    /// Elapsed time between frames is zero or negative.
    #[error("elapsed time of {0} s between frames is not positive")]
    DegenerateTiming(f64),
}

impl FlowError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FrameLength { .. } | Self::Downscale { .. } | Self::RasterLength(..) => {
                ErrorKind::Format
            }
            Self::DimensionMismatch { .. } | Self::RasterTooSmall(..) => {
                ErrorKind::DimensionMismatch
            }
            Self::OutOfBounds { .. } => ErrorKind::OutOfBounds,
            Self::DegenerateTiming(_) => ErrorKind::DegenerateTiming,
        }
    }
}

/// Result type of the flow pipeline.
pub type Result<T> = std::result::Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        let e = FlowError::Downscale {
            factor: 3,
            width: 8,
            height: 8,
        };
        assert_eq!(e.kind(), ErrorKind::Format);
        assert_eq!(FlowError::RasterTooSmall(1, 4).kind(), ErrorKind::DimensionMismatch);
        assert_eq!(FlowError::DegenerateTiming(0.0).kind(), ErrorKind::DegenerateTiming);
    }

    #[test]
    fn message() {
        let e = FlowError::FrameLength {
            width: 4,
            height: 2,
            expected: 12,
            actual: 8,
        };
        assert_eq!(e.to_string(), "frame buffer is 8 bytes, expected 12 for 4x2");
    }
}
