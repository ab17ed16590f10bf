//! 2D slice view of a set of volumes, the unit the trainer batches over.

use crate::data::dataset::VolumeSample;
use crate::error::MlError;

/// One depth slice of a scan with its labels.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceSample {
    /// Row-major `[height, width]` intensities.
    pub image: Vec<f32>,
    /// Row-major `[height, width]` labels.
    pub seg: Vec<u8>,
}

/// All depth slices of the volumes it was built from, flattened into one list.
#[derive(Debug, Clone, Default)]
pub struct SliceDataset {
    slices: Vec<SliceSample>,
    height: usize,
    width: usize,
}

impl SliceDataset {
    /// Slice every volume along depth. All volumes must share in-slice dimensions.
    pub fn from_volumes(volumes: &[VolumeSample]) -> Result<Self, MlError> {
        let (height, width) = volumes
            .first()
            .map(|v| {
                let [_, h, w] = v.image.shape();
                (h, w)
            })
            .unwrap_or((0, 0));

        if let Some(odd) = volumes.iter().find(|v| {
            let [_, h, w] = v.image.shape();
            (h, w) != (height, width)
        }) {
            return Err(MlError::dataset(format!(
                "{}: slice shape {:?} differs from {height}x{width}",
                odd.filename,
                &odd.image.shape()[1..]
            )));
        }

        let slices = volumes
            .iter()
            .flat_map(|volume| {
                (0..volume.depth()).map(move |d| SliceSample {
                    image: volume.image.slice(d).to_vec(),
                    seg: volume.seg.slice(d).to_vec(),
                })
            })
            .collect();

        Ok(Self {
            slices,
            height,
            width,
        })
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SliceSample> {
        self.slices.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SliceSample> {
        self.slices.iter()
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }
}
