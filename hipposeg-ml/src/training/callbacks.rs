//! Training callbacks: early stopping, anomaly detection, learning-rate decay, checkpointing.

use crate::training::metrics::TrainingMetrics;
use serde::{Deserialize, Serialize};

/// Action a callback can request.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackAction {
    Continue,
    Stop,
    Checkpoint,
    SetLearningRate(f64),
}

/// Trait for training callbacks.
pub trait TrainingCallback: Send + Sync {
    /// Called at the end of each epoch with epoch number and current metrics.
    fn on_epoch_end(&mut self, epoch: usize, metrics: &TrainingMetrics) -> CallbackAction;

    fn name(&self) -> &'static str;
}

/// Early stopping callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarlyStoppingCallback {
    pub patience: usize,
    pub min_delta: f64,
    #[serde(skip)]
    counter: usize,
    #[serde(skip)]
    best_loss: Option<f64>,
}

impl EarlyStoppingCallback {
    pub fn new(patience: usize, min_delta: f64) -> Self {
        Self {
            patience,
            min_delta,
            counter: 0,
            best_loss: None,
        }
    }

    pub fn observe(&mut self, loss: f64) -> CallbackAction {
        match self.best_loss {
            None => {
                self.best_loss = Some(loss);
                CallbackAction::Continue
            }
            Some(best) => {
                if loss < best - self.min_delta {
                    self.best_loss = Some(loss);
                    self.counter = 0;
                    CallbackAction::Continue
                } else {
                    self.counter += 1;
                    if self.counter >= self.patience {
                        CallbackAction::Stop
                    } else {
                        CallbackAction::Continue
                    }
                }
            }
        }
    }
}

impl TrainingCallback for EarlyStoppingCallback {
    fn on_epoch_end(&mut self, _epoch: usize, metrics: &TrainingMetrics) -> CallbackAction {
        self.observe(metrics.monitored_loss().unwrap_or(f64::MAX))
    }

    fn name(&self) -> &'static str {
        "early_stopping"
    }
}

/// Stops training on NaN/Inf or a loss spike above `threshold` x the recent mean.
#[derive(Debug, Clone)]
pub struct AnomalyDetectionCallback {
    pub threshold: f64,
    window: Vec<f64>,
    window_size: usize,
}

impl AnomalyDetectionCallback {
    pub fn new(threshold: f64, window_size: usize) -> Self {
        Self {
            threshold,
            window: Vec::new(),
            window_size,
        }
    }

    pub fn observe(&mut self, loss: f64) -> CallbackAction {
        if loss.is_nan() || loss.is_infinite() {
            return CallbackAction::Stop;
        }

        self.window.push(loss);
        if self.window.len() > self.window_size {
            self.window.remove(0);
        }

        if self.window.len() >= 3 {
            let mean = self.window.iter().sum::<f64>() / self.window.len() as f64;
            if loss > mean * self.threshold {
                return CallbackAction::Stop;
            }
        }

        CallbackAction::Continue
    }
}

impl TrainingCallback for AnomalyDetectionCallback {
    fn on_epoch_end(&mut self, _epoch: usize, metrics: &TrainingMetrics) -> CallbackAction {
        self.observe(metrics.loss_history.last().copied().unwrap_or(0.0))
    }

    fn name(&self) -> &'static str {
        "anomaly_detection"
    }
}

/// Multiplies the learning rate by `factor` after `patience` epochs without improvement.
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateauCallback {
    pub patience: usize,
    pub factor: f64,
    pub min_lr: f64,
    current_lr: f64,
    counter: usize,
    best_loss: Option<f64>,
}

impl ReduceLrOnPlateauCallback {
    pub fn new(initial_lr: f64, patience: usize, factor: f64, min_lr: f64) -> Self {
        Self {
            patience,
            factor,
            min_lr,
            current_lr: initial_lr,
            counter: 0,
            best_loss: None,
        }
    }

    pub fn current_lr(&self) -> f64 {
        self.current_lr
    }

    pub fn observe(&mut self, loss: f64) -> CallbackAction {
        if self.best_loss.is_none_or(|best| loss < best) {
            self.best_loss = Some(loss);
            self.counter = 0;
            return CallbackAction::Continue;
        }

        self.counter += 1;
        if self.counter < self.patience {
            return CallbackAction::Continue;
        }
        self.counter = 0;

        let reduced = (self.current_lr * self.factor).max(self.min_lr);
        if reduced < self.current_lr {
            self.current_lr = reduced;
            CallbackAction::SetLearningRate(reduced)
        } else {
            CallbackAction::Continue
        }
    }
}

impl TrainingCallback for ReduceLrOnPlateauCallback {
    fn on_epoch_end(&mut self, _epoch: usize, metrics: &TrainingMetrics) -> CallbackAction {
        match metrics.monitored_loss() {
            Some(loss) => self.observe(loss),
            None => CallbackAction::Continue,
        }
    }

    fn name(&self) -> &'static str {
        "reduce_lr_on_plateau"
    }
}

/// Requests a checkpoint every `frequency` epochs.
#[derive(Debug, Clone)]
pub struct CheckpointCallback {
    /// Checkpoint every `frequency` epochs.
    pub frequency: usize,
    epoch_counter: usize,
}

impl CheckpointCallback {
    pub fn new(frequency: usize) -> Self {
        Self {
            frequency,
            epoch_counter: 0,
        }
    }

    pub fn tick(&mut self) -> CallbackAction {
        self.epoch_counter += 1;
        if self.epoch_counter >= self.frequency {
            self.epoch_counter = 0;
            CallbackAction::Checkpoint
        } else {
            CallbackAction::Continue
        }
    }
}

impl TrainingCallback for CheckpointCallback {
    fn on_epoch_end(&mut self, _epoch: usize, _metrics: &TrainingMetrics) -> CallbackAction {
        self.tick()
    }

    fn name(&self) -> &'static str {
        "checkpoint"
    }
}
