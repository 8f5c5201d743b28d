//! # Fixed size 2D rasters

use crate::error::{FlowError, Result};

/// Row-major 2D grid of scalar samples.
///
/// Rasters are created by the stage that produces them and read by the next stage. The only
/// raster mutated after construction is the velocity field, during relaxation.
#[derive(Clone, Debug, PartialEq)]
pub struct Raster<T> {
    data: Vec<T>,
    width: usize,
    height: usize,
}

impl<T> Raster<T> {
    /// Create a raster from row-major data.
    ///
    /// # Arguments
    ///
    /// * `width` - number of columns.
    /// * `height` - number of rows.
    /// * `data` - samples, `width * height` of them.
    pub fn new(width: usize, height: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != width * height {
            return Err(FlowError::RasterLength(data.len(), width * height));
        }

        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Create a raster by evaluating `f(x, y)` at every cell.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let data = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();

        Self {
            data,
            width,
            height,
        }
    }

    /// Get width and height of the raster.
    pub fn dim(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Get the samples in row-major order.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Get a single row.
    pub fn row(&self, y: usize) -> &[T] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    /// Iterate over rows, top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        // chunks_exact panics on zero, and a zero-width raster has no rows to yield.
        self.data.chunks_exact(self.width.max(1))
    }

    /// Fail with `DimensionMismatch` unless `other` has the same dimensions.
    pub fn ensure_same_dim<U>(&self, other: &Raster<U>) -> Result<()> {
        if self.dim() != other.dim() {
            Err(FlowError::DimensionMismatch {
                left: self.dim(),
                right: other.dim(),
            })
        } else {
            Ok(())
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

impl<T: Copy> Raster<T> {
    /// Create a raster with every cell set to `value`.
    pub fn from_elem(width: usize, height: usize, value: T) -> Self {
        Self {
            data: vec![value; width * height],
            width,
            height,
        }
    }

    /// Get the sample at column `x`, row `y`.
    ///
    /// # Panics
    ///
    /// If the coordinates are out of bounds.
    pub fn get(&self, x: usize, y: usize) -> T {
        assert!(x < self.width && y < self.height);
        self.data[y * self.width + x]
    }

    /// Get the sample at signed coordinates, or `None` when outside the raster.
    pub fn get_checked(&self, x: isize, y: isize) -> Option<T> {
        if x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height {
            Some(self.data[y as usize * self.width + x as usize])
        } else {
            None
        }
    }

    /// Set the sample at column `x`, row `y`.
    #[cfg(test)]
    pub(crate) fn set(&mut self, x: usize, y: usize, value: T) {
        assert!(x < self.width && y < self.height);
        self.data[y * self.width + x] = value;
    }

    /// Iterate every cell, yielding `(x, y, value)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        let width = self.width;
        self.data
            .iter()
            .enumerate()
            .map(move |(i, &v)| (i % width, i / width, v))
    }
}
