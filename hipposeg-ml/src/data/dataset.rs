//! In-memory collection of labelled scans.

use crate::data::volume::{ImageVolume, LabelVolume};
use crate::error::MlError;

/// One scan with its segmentation.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeSample {
    /// Intensities normalised to `[0, 1]`.
    pub image: ImageVolume,
    /// Class labels: 0 background, 1 anterior, 2 posterior hippocampus.
    pub seg: LabelVolume,
    pub filename: String,
}

impl VolumeSample {
    pub fn new(
        image: ImageVolume,
        seg: LabelVolume,
        filename: impl Into<String>,
    ) -> Result<Self, MlError> {
        let filename = filename.into();
        if image.shape() != seg.shape() {
            return Err(MlError::dataset(format!(
                "{filename}: image shape {:?} does not match label shape {:?}",
                image.shape(),
                seg.shape()
            )));
        }
        Ok(Self {
            image,
            seg,
            filename,
        })
    }

    pub fn depth(&self) -> usize {
        self.image.depth()
    }
}

/// Ordered, indexable set of scans.
#[derive(Debug, Clone, Default)]
pub struct HippocampusDataset {
    samples: Vec<VolumeSample>,
}

impl HippocampusDataset {
    pub fn new(samples: Vec<VolumeSample>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&VolumeSample> {
        self.samples.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VolumeSample> {
        self.samples.iter()
    }

    /// Total number of depth slices across all scans.
    pub fn slice_count(&self) -> usize {
        self.samples.iter().map(VolumeSample::depth).sum()
    }

    /// Consume the dataset, moving out the samples at `indices` in the given order.
    ///
    /// Every index must be in range and appear at most once.
    pub fn take(self, indices: &[usize]) -> Result<Vec<VolumeSample>, MlError> {
        Ok(self.partition(&[indices])?.pop().unwrap_or_default())
    }

    /// Partition the dataset into groups, one per index list, consuming it.
    pub fn partition(self, groups: &[&[usize]]) -> Result<Vec<Vec<VolumeSample>>, MlError> {
        let mut slots: Vec<Option<VolumeSample>> = self.samples.into_iter().map(Some).collect();
        groups
            .iter()
            .map(|indices| {
                indices
                    .iter()
                    .map(|&i| {
                        slots.get_mut(i).and_then(Option::take).ok_or_else(|| {
                            MlError::invalid_input(format!(
                                "sample index {i} is out of range or selected twice"
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect()
    }
}

impl FromIterator<VolumeSample> for HippocampusDataset {
    fn from_iter<I: IntoIterator<Item = VolumeSample>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
