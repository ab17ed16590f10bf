//! Training infrastructure: model, optimizer, callbacks, checkpoints and the experiment runner.

pub mod callbacks;
pub mod checkpoint;
pub mod experiment;
pub mod inference;
pub mod metrics;
pub mod model;
pub mod optimizer;

pub use checkpoint::CheckpointManager;
pub use experiment::{ExperimentOptions, ExperimentRunner, SegmentationExperiment, TrainingStatus};
pub use inference::InferenceAgent;
pub use metrics::{OverlapCounts, TestReport, TrainingMetrics, VolumeStats, dice3d, jaccard3d};
pub use model::VoxelClassifier;
pub use optimizer::Adam;
