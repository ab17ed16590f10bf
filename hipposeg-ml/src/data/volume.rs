//! Dense 3D volumes stored row-major as `[depth, height, width]`.
//!
//! Depth is the first axis of the source scan; every depth index addresses one
//! contiguous 2D slice, which is what the slice-wise trainer consumes.

use crate::error::MlError;

/// A dense 3D grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume<T> {
    shape: [usize; 3],
    data: Vec<T>,
}

/// Normalised scan intensities.
pub type ImageVolume = Volume<f32>;

/// Per-voxel class labels.
pub type LabelVolume = Volume<u8>;

impl<T: Copy + Default> Volume<T> {
    pub fn new(shape: [usize; 3], data: Vec<T>) -> Result<Self, MlError> {
        let expected = shape.iter().product::<usize>();
        if data.len() != expected {
            return Err(MlError::invalid_input(format!(
                "volume buffer holds {} voxels, shape {:?} needs {}",
                data.len(),
                shape,
                expected
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn zeros(shape: [usize; 3]) -> Self {
        Self {
            shape,
            data: vec![T::default(); shape.iter().product()],
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn depth(&self) -> usize {
        self.shape[0]
    }

    /// Number of voxels in one depth slice.
    pub fn slice_len(&self) -> usize {
        self.shape[1] * self.shape[2]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn offset(&self, d: usize, y: usize, z: usize) -> usize {
        (d * self.shape[1] + y) * self.shape[2] + z
    }

    pub fn get(&self, d: usize, y: usize, z: usize) -> Option<T> {
        if d >= self.shape[0] || y >= self.shape[1] || z >= self.shape[2] {
            return None;
        }
        Some(self.data[self.offset(d, y, z)])
    }

    pub fn set(&mut self, d: usize, y: usize, z: usize, value: T) {
        let offset = self.offset(d, y, z);
        self.data[offset] = value;
    }

    /// Borrow depth slice `d` as a row-major `[height, width]` buffer.
    pub fn slice(&self, d: usize) -> &[T] {
        let len = self.slice_len();
        &self.data[d * len..(d + 1) * len]
    }

    pub fn slice_mut(&mut self, d: usize) -> &mut [T] {
        let len = self.slice_len();
        &mut self.data[d * len..(d + 1) * len]
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    /// Zero-pad the two in-slice axes to `y_shape` x `z_shape`, keeping depth.
    ///
    /// Content is anchored at the origin. A volume already larger than the
    /// target on either axis is rejected rather than cropped.
    pub fn reshape_padded(&self, y_shape: usize, z_shape: usize) -> Result<Self, MlError> {
        let [depth, height, width] = self.shape;
        if height > y_shape || width > z_shape {
            return Err(MlError::dataset(format!(
                "volume of shape {:?} does not fit into {}x{} patches",
                self.shape, y_shape, z_shape
            )));
        }

        let mut padded = Self::zeros([depth, y_shape, z_shape]);
        for d in 0..depth {
            for y in 0..height {
                let src = self.offset(d, y, 0);
                let dst = padded.offset(d, y, 0);
                padded.data[dst..dst + width].copy_from_slice(&self.data[src..src + width]);
            }
        }
        Ok(padded)
    }
}

impl Volume<f32> {
    /// Rescale intensities to `[0, 1]`. A constant volume becomes all zeros.
    pub fn normalize_min_max(&mut self) {
        let (min, max) = self
            .data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = max - min;
        if !range.is_finite() || range <= 0.0 {
            self.data.iter_mut().for_each(|v| *v = 0.0);
            return;
        }
        self.data.iter_mut().for_each(|v| *v = (*v - min) / range);
    }
}

impl Volume<u8> {
    /// Number of voxels carrying a non-background label.
    pub fn foreground_count(&self) -> usize {
        self.data.iter().filter(|&&v| v > 0).count()
    }
}
