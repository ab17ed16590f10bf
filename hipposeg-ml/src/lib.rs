//! # hipposeg-ml: hippocampus segmentation training pipeline
//!
//! Loads labelled 3D volumes, partitions them into train / validation / test
//! subsets, trains a slice-wise voxel classifier, scores the test volumes and
//! writes a `results.json` report.
//!
//! The training and inference work sits behind [`ExperimentRunner`]; the
//! driver in [`pipeline`] only orchestrates.

pub mod config;
pub mod error;
pub mod persistence;

pub mod data;
pub mod split;
pub mod training;

pub mod pipeline;
pub mod report;

// Re-exports
pub use config::{Config, ConfigOverrides, load_config, write_default_config};
pub use data::{DatasetLoader, HippocampusDataset, NiftiLoader, VolumeSample};
pub use error::MlError;
pub use pipeline::{PipelineOptions, PipelineOutcome, run_pipeline};
pub use report::{ResultsReport, attach_config, write_results};
pub use split::{Split, SplitSizes, build_split, build_split_seeded};
pub use training::{ExperimentOptions, ExperimentRunner, SegmentationExperiment};
