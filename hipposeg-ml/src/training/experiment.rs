//! Experiment runners: the training/inference seam and the baseline implementation.

use crate::config::Config;
use crate::data::dataset::{HippocampusDataset, VolumeSample};
use crate::data::slices::{SliceDataset, SliceSample};
use crate::error::MlError;
use crate::persistence::write_json_file;
use crate::split::Split;
use crate::training::callbacks::{
    AnomalyDetectionCallback, CallbackAction, CheckpointCallback, EarlyStoppingCallback,
    ReduceLrOnPlateauCallback, TrainingCallback,
};
use crate::training::checkpoint::{CheckpointManager, load_model};
use crate::training::inference::InferenceAgent;
use crate::training::metrics::{OverlapCounts, TestReport, TrainingMetrics, VolumeStats};
use crate::training::model::{NUM_CLASSES, VoxelClassifier, balanced_class_weights};
use crate::training::optimizer::Adam;
use chrono::{DateTime, Local, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

pub const MODEL_FILE_NAME: &str = "model";
pub const METRICS_FILE_NAME: &str = "training_metrics.json";
pub const RECORD_FILE_NAME: &str = "experiment.json";

/// Owner of the training loop and test-time inference.
///
/// Implementations receive the dataset by value at construction and keep only
/// what they need from it.
pub trait ExperimentRunner {
    /// Train for the configured number of epochs.
    fn run(&mut self) -> Result<(), MlError>;

    /// Run inference over the test split and return aggregate metrics.
    fn run_test(&mut self) -> Result<Map<String, Value>, MlError>;

    /// Directory where run artifacts and `results.json` go.
    fn out_dir(&self) -> &Path;

    /// Replace the model parameters with previously saved ones, skipping training.
    fn load_model_parameters(&mut self, path: &Path) -> Result<(), MlError>;
}

/// Training status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    Pending,
    Running,
    Completed,
    Stopped,
    Failed,
    Loaded,
}

/// Persistent summary of one experiment, written to `experiment.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub id: String,
    pub name: String,
    pub status: TrainingStatus,
    pub train_volumes: usize,
    pub val_volumes: usize,
    pub test_volumes: usize,
    pub seed: Option<u64>,
    pub checkpoint_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Knobs of the baseline runner that are not part of the run configuration.
#[derive(Debug, Clone)]
pub struct ExperimentOptions {
    /// Seed for batch shuffling; OS entropy when unset.
    pub seed: Option<u64>,
    pub early_stopping_patience: Option<usize>,
    pub lr_patience: usize,
    pub lr_factor: f64,
    pub min_lr: f64,
    pub anomaly_threshold: f64,
    /// Save an intermediate checkpoint every N epochs.
    pub checkpoint_every: Option<usize>,
    pub max_checkpoints: usize,
    /// Weight classes by inverse frequency in the training split.
    pub class_balanced: bool,
}

impl Default for ExperimentOptions {
    fn default() -> Self {
        Self {
            seed: None,
            early_stopping_patience: None,
            lr_patience: 2,
            lr_factor: 0.5,
            min_lr: 1e-6,
            anomaly_threshold: 3.0,
            checkpoint_every: None,
            max_checkpoints: 5,
            class_balanced: true,
        }
    }
}

/// `<test_results_dir>/<YYYY-MM-DD_HHMM>_<name>`
pub fn output_dir_name(config: &Config, now: DateTime<Local>) -> PathBuf {
    config
        .test_results_dir
        .join(format!("{}_{}", now.format("%Y-%m-%d_%H%M"), config.name))
}

/// Baseline slice-wise segmentation experiment.
pub struct SegmentationExperiment {
    config: Config,
    options: ExperimentOptions,
    out_dir: PathBuf,
    train: SliceDataset,
    val: SliceDataset,
    test: Vec<VolumeSample>,
    model: VoxelClassifier,
    class_weights: [f64; NUM_CLASSES],
    rng: StdRng,
    checkpoints: CheckpointManager,
    metrics: TrainingMetrics,
    record: ExperimentRecord,
}

impl SegmentationExperiment {
    /// Build loaders from `split`, consuming `dataset`, and create the output directory.
    pub fn new(
        config: &Config,
        split: Split,
        dataset: HippocampusDataset,
        options: ExperimentOptions,
    ) -> Result<Self, MlError> {
        let out_dir = output_dir_name(config, Local::now());
        Self::with_out_dir(config, split, dataset, options, out_dir)
    }

    /// Same as [`SegmentationExperiment::new`] with an explicit output directory.
    pub fn with_out_dir(
        config: &Config,
        split: Split,
        dataset: HippocampusDataset,
        options: ExperimentOptions,
        out_dir: PathBuf,
    ) -> Result<Self, MlError> {
        if split.train.is_empty() {
            return Err(MlError::training("train split is empty"));
        }

        let mut groups = dataset
            .partition(&[&split.train, &split.val, &split.test])?
            .into_iter();
        let (Some(train_volumes), Some(val_volumes), Some(test)) =
            (groups.next(), groups.next(), groups.next())
        else {
            return Err(MlError::training("dataset partition returned too few groups"));
        };

        let train = SliceDataset::from_volumes(&train_volumes)?;
        let val = SliceDataset::from_volumes(&val_volumes)?;
        if train.is_empty() {
            return Err(MlError::training("train volumes contain no slices"));
        }
        if !val.is_empty() && (val.height(), val.width()) != (train.height(), train.width()) {
            return Err(MlError::dataset(format!(
                "validation slices are {}x{}, training slices {}x{}",
                val.height(),
                val.width(),
                train.height(),
                train.width()
            )));
        }

        let class_weights = if options.class_balanced {
            balanced_class_weights(train.iter().map(|s| s.seg.as_slice()))
        } else {
            [1.0; NUM_CLASSES]
        };

        std::fs::create_dir_all(&out_dir)?;
        info!(
            out_dir = %out_dir.display(),
            train_slices = train.len(),
            val_slices = val.len(),
            test_volumes = test.len(),
            "Experiment prepared"
        );
        debug!(?class_weights, "Class weights");

        let now = Utc::now();
        let record = ExperimentRecord {
            id: uuid::Uuid::new_v4().to_string(),
            name: config.name.clone(),
            status: TrainingStatus::Pending,
            train_volumes: train_volumes.len(),
            val_volumes: val_volumes.len(),
            test_volumes: test.len(),
            seed: options.seed,
            checkpoint_path: None,
            created_at: now,
            updated_at: now,
            notes: None,
        };

        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            config: config.clone(),
            checkpoints: CheckpointManager::new(out_dir.clone(), options.max_checkpoints),
            options,
            out_dir,
            train,
            val,
            test,
            model: VoxelClassifier::new(),
            class_weights,
            rng,
            metrics: TrainingMetrics::default(),
            record,
        })
    }

    pub fn metrics(&self) -> &TrainingMetrics {
        &self.metrics
    }

    pub fn record(&self) -> &ExperimentRecord {
        &self.record
    }

    pub fn model(&self) -> &VoxelClassifier {
        &self.model
    }

    fn callbacks(&self) -> Vec<Box<dyn TrainingCallback>> {
        let mut callbacks: Vec<Box<dyn TrainingCallback>> = vec![
            Box::new(AnomalyDetectionCallback::new(
                self.options.anomaly_threshold,
                5,
            )),
            Box::new(ReduceLrOnPlateauCallback::new(
                self.config.learning_rate,
                self.options.lr_patience,
                self.options.lr_factor,
                self.options.min_lr,
            )),
        ];
        if let Some(patience) = self.options.early_stopping_patience {
            callbacks.push(Box::new(EarlyStoppingCallback::new(patience, 0.0)));
        }
        if let Some(every) = self.options.checkpoint_every.filter(|&n| n > 0) {
            callbacks.push(Box::new(CheckpointCallback::new(every)));
        }
        callbacks
    }

    fn set_status(&mut self, status: TrainingStatus) -> Result<(), MlError> {
        self.record.status = status;
        self.record.updated_at = Utc::now();
        write_json_file(&self.out_dir.join(RECORD_FILE_NAME), &self.record)?;
        Ok(())
    }

    fn train_epochs(&mut self) -> Result<TrainingStatus, MlError> {
        let (height, width) = (self.train.height(), self.train.width());
        let mut optimizer = Adam::new(self.config.learning_rate, self.model.parameter_count());
        let mut callbacks = self.callbacks();
        let started = Instant::now();
        let mut order: Vec<usize> = (0..self.train.len()).collect();

        for epoch in 1..=self.config.n_epochs {
            order.shuffle(&mut self.rng);

            let mut loss_sum = 0.0;
            let mut batches = 0usize;
            for batch in order.chunks(self.config.batch_size) {
                let slices: Vec<&SliceSample> =
                    batch.iter().filter_map(|&i| self.train.get(i)).collect();
                let step = self
                    .model
                    .loss_and_gradient(&slices, height, width, &self.class_weights);
                optimizer.step(self.model.parameters_mut(), &step.gradient);
                loss_sum += step.loss;
                batches += 1;
            }
            let train_loss = loss_sum / batches.max(1) as f64;

            let val_loss = if self.val.is_empty() {
                None
            } else {
                let slices: Vec<&SliceSample> = self.val.iter().collect();
                Some(self.model.loss(&slices, height, width, &self.class_weights))
            };

            self.metrics.record_epoch(train_loss, val_loss);
            self.metrics.add_custom_metric("learning_rate", optimizer.lr());
            info!(
                epoch,
                epochs = self.config.n_epochs,
                train_loss,
                val_loss = ?val_loss,
                lr = optimizer.lr(),
                "Epoch complete"
            );

            let mut stop = false;
            for callback in callbacks.iter_mut() {
                match callback.on_epoch_end(epoch, &self.metrics) {
                    CallbackAction::Continue => {}
                    CallbackAction::Stop => {
                        warn!(epoch, callback = callback.name(), "Training stopped early");
                        stop = true;
                        break;
                    }
                    CallbackAction::Checkpoint => {
                        self.checkpoints.save(
                            &format!("model_epoch_{epoch}"),
                            epoch,
                            self.metrics.monitored_loss(),
                            &self.model,
                        )?;
                    }
                    CallbackAction::SetLearningRate(lr) => {
                        info!(epoch, lr, "Reducing learning rate");
                        optimizer.set_lr(lr);
                    }
                }
            }

            self.metrics.total_training_time_secs = started.elapsed().as_secs_f64();
            if stop {
                return Ok(TrainingStatus::Stopped);
            }
        }

        Ok(TrainingStatus::Completed)
    }
}

impl ExperimentRunner for SegmentationExperiment {
    fn run(&mut self) -> Result<(), MlError> {
        info!(
            name = %self.config.name,
            epochs = self.config.n_epochs,
            batch_size = self.config.batch_size,
            lr = self.config.learning_rate,
            "Experiment started"
        );
        self.set_status(TrainingStatus::Running)?;

        let outcome = self.train_epochs().and_then(|status| {
            self.model
                .validate()
                .map(|()| status)
                .map_err(|e| MlError::training(format!("training diverged: {e}")))
        });
        let status = match outcome {
            Ok(status) => status,
            Err(e) => {
                self.record.notes = Some(e.to_string());
                self.set_status(TrainingStatus::Failed)?;
                return Err(e);
            }
        };

        let checkpoint = self.checkpoints.save(
            MODEL_FILE_NAME,
            self.metrics.epochs_completed,
            self.metrics.monitored_loss(),
            &self.model,
        )?;
        write_json_file(&self.out_dir.join(METRICS_FILE_NAME), &self.metrics)?;
        self.record.checkpoint_path = Some(checkpoint.path);
        self.set_status(status)?;

        info!(
            epochs = self.metrics.epochs_completed,
            best_epoch = ?self.metrics.best_epoch,
            best_loss = ?self.metrics.best_loss,
            secs = self.metrics.total_training_time_secs,
            "Training complete"
        );
        Ok(())
    }

    fn run_test(&mut self) -> Result<Map<String, Value>, MlError> {
        info!(volumes = self.test.len(), "Testing");
        let agent = InferenceAgent::new(&self.model);

        let mut volume_stats = Vec::with_capacity(self.test.len());
        for sample in &self.test {
            let prediction = agent.infer_volume(&sample.image);
            let counts = OverlapCounts::between(&prediction, &sample.seg)?;
            let stats = VolumeStats::new(&sample.filename, &counts);
            info!(
                file = %stats.filename,
                dice = stats.dice,
                jaccard = stats.jaccard,
                "Volume scored"
            );
            volume_stats.push(stats);
        }

        let report = TestReport::from_volume_stats(volume_stats);
        info!(
            mean_dice = ?report.overall.mean_dice,
            mean_jaccard = ?report.overall.mean_jaccard,
            "Testing complete"
        );
        report.into_json_map()
    }

    fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    fn load_model_parameters(&mut self, path: &Path) -> Result<(), MlError> {
        self.model = load_model(path)?;
        self.record.checkpoint_path = Some(path.to_path_buf());
        self.set_status(TrainingStatus::Loaded)?;
        info!(path = %path.display(), "Loaded model parameters");
        Ok(())
    }
}
