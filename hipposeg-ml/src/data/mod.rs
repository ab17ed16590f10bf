//! Scan data: volumes, datasets, NIfTI loading and slice views.

pub mod dataset;
pub mod loader;
pub mod slices;
pub mod volume;

pub use dataset::{HippocampusDataset, VolumeSample};
pub use loader::{DatasetLoader, NiftiLoader, load_hippocampus_data};
pub use slices::{SliceDataset, SliceSample};
pub use volume::{ImageVolume, LabelVolume, Volume};
