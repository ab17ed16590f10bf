//! Training history and segmentation overlap metrics.

use crate::data::volume::LabelVolume;
use crate::error::MlError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Per-epoch training history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub epochs_completed: usize,
    pub loss_history: Vec<f64>,
    pub val_loss_history: Vec<f64>,
    pub custom_metrics: BTreeMap<String, Vec<f64>>,
    pub best_epoch: Option<usize>,
    pub best_loss: Option<f64>,
    pub total_training_time_secs: f64,
}

impl TrainingMetrics {
    pub fn record_epoch(&mut self, loss: f64, val_loss: Option<f64>) {
        self.loss_history.push(loss);
        if let Some(vl) = val_loss {
            self.val_loss_history.push(vl);
        }
        self.epochs_completed += 1;

        let check_loss = val_loss.unwrap_or(loss);
        if self.best_loss.is_none_or(|best| check_loss < best) {
            self.best_loss = Some(check_loss);
            self.best_epoch = Some(self.epochs_completed);
        }
    }

    pub fn add_custom_metric(&mut self, name: &str, value: f64) {
        self.custom_metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    /// Loss used for model selection: validation when available, else training.
    pub fn monitored_loss(&self) -> Option<f64> {
        self.val_loss_history
            .last()
            .or(self.loss_history.last())
            .copied()
    }
}

/// Voxel-level confusion counts of foreground (label > 0) against ground truth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlapCounts {
    pub true_positive: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_negative: usize,
}

impl OverlapCounts {
    pub fn between(prediction: &LabelVolume, truth: &LabelVolume) -> Result<Self, MlError> {
        if prediction.shape() != truth.shape() {
            return Err(MlError::invalid_input(format!(
                "prediction shape {:?} does not match ground truth {:?}",
                prediction.shape(),
                truth.shape()
            )));
        }

        let mut counts = Self::default();
        for (&p, &t) in prediction.data().iter().zip(truth.data()) {
            match (p > 0, t > 0) {
                (true, true) => counts.true_positive += 1,
                (true, false) => counts.false_positive += 1,
                (false, true) => counts.false_negative += 1,
                (false, false) => counts.true_negative += 1,
            }
        }
        Ok(counts)
    }

    /// `2|A∩B| / (|A| + |B|)`; two empty masks agree perfectly.
    pub fn dice(&self) -> f64 {
        let denominator = 2 * self.true_positive + self.false_positive + self.false_negative;
        if denominator == 0 {
            return 1.0;
        }
        2.0 * self.true_positive as f64 / denominator as f64
    }

    /// `|A∩B| / |A∪B|`; two empty masks agree perfectly.
    pub fn jaccard(&self) -> f64 {
        let union = self.true_positive + self.false_positive + self.false_negative;
        if union == 0 {
            return 1.0;
        }
        self.true_positive as f64 / union as f64
    }

    /// Undefined when the ground truth has no foreground.
    pub fn sensitivity(&self) -> Option<f64> {
        let positives = self.true_positive + self.false_negative;
        (positives > 0).then(|| self.true_positive as f64 / positives as f64)
    }

    /// Undefined when the ground truth has no background.
    pub fn specificity(&self) -> Option<f64> {
        let negatives = self.true_negative + self.false_positive;
        (negatives > 0).then(|| self.true_negative as f64 / negatives as f64)
    }
}

pub fn dice3d(prediction: &LabelVolume, truth: &LabelVolume) -> Result<f64, MlError> {
    Ok(OverlapCounts::between(prediction, truth)?.dice())
}

pub fn jaccard3d(prediction: &LabelVolume, truth: &LabelVolume) -> Result<f64, MlError> {
    Ok(OverlapCounts::between(prediction, truth)?.jaccard())
}

/// Scores for one test volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeStats {
    pub filename: String,
    pub dice: f64,
    pub jaccard: f64,
    pub sensitivity: Option<f64>,
    pub specificity: Option<f64>,
}

impl VolumeStats {
    pub fn new(filename: impl Into<String>, counts: &OverlapCounts) -> Self {
        Self {
            filename: filename.into(),
            dice: counts.dice(),
            jaccard: counts.jaccard(),
            sensitivity: counts.sensitivity(),
            specificity: counts.specificity(),
        }
    }
}

/// Means across test volumes; `None` when no volume contributed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallStats {
    pub mean_dice: Option<f64>,
    pub mean_jaccard: Option<f64>,
    pub mean_sensitivity: Option<f64>,
    pub mean_specificity: Option<f64>,
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Output of a test run: per-volume scores plus their means.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    pub volume_stats: Vec<VolumeStats>,
    pub overall: OverallStats,
}

impl TestReport {
    pub fn from_volume_stats(volume_stats: Vec<VolumeStats>) -> Self {
        let overall = OverallStats {
            mean_dice: mean(volume_stats.iter().map(|s| s.dice)),
            mean_jaccard: mean(volume_stats.iter().map(|s| s.jaccard)),
            mean_sensitivity: mean(volume_stats.iter().filter_map(|s| s.sensitivity)),
            mean_specificity: mean(volume_stats.iter().filter_map(|s| s.specificity)),
        };
        Self {
            volume_stats,
            overall,
        }
    }

    /// Render as the JSON object the report writer extends.
    pub fn into_json_map(self) -> Result<Map<String, Value>, MlError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(MlError::invalid_input(format!(
                "test report serialized to non-object {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::volume::Volume;

    fn labels(data: Vec<u8>) -> LabelVolume {
        let n = data.len();
        Volume::new([1, 1, n], data).unwrap()
    }

    #[test]
    fn test_training_metrics() {
        let mut metrics = TrainingMetrics::default();
        metrics.record_epoch(0.5, Some(0.6));
        metrics.record_epoch(0.3, Some(0.4));
        metrics.record_epoch(0.2, Some(0.45));
        assert_eq!(metrics.epochs_completed, 3);
        assert_eq!(metrics.best_epoch, Some(2));
        assert_eq!(metrics.best_loss, Some(0.4));
        assert_eq!(metrics.monitored_loss(), Some(0.45));
    }

    #[test]
    fn test_dice_and_jaccard() {
        // classes differ but both are foreground
        let prediction = labels(vec![1, 1, 0, 0, 2]);
        let truth = labels(vec![2, 0, 1, 0, 1]);
        let counts = OverlapCounts::between(&prediction, &truth).unwrap();
        assert_eq!(counts.true_positive, 2);
        assert_eq!(counts.false_positive, 1);
        assert_eq!(counts.false_negative, 1);
        assert_eq!(counts.true_negative, 1);
        assert!((counts.dice() - 4.0 / 6.0).abs() < 1e-12);
        assert!((counts.jaccard() - 0.5).abs() < 1e-12);
        assert_eq!(counts.sensitivity(), Some(2.0 / 3.0));
        assert_eq!(counts.specificity(), Some(0.5));
    }

    #[test]
    fn test_empty_masks_agree() {
        let empty = labels(vec![0, 0, 0]);
        assert_eq!(dice3d(&empty, &empty).unwrap(), 1.0);
        assert_eq!(jaccard3d(&empty, &empty).unwrap(), 1.0);
        let counts = OverlapCounts::between(&empty, &empty).unwrap();
        assert_eq!(counts.sensitivity(), None);
    }

    #[test]
    fn test_shape_mismatch() {
        let a = labels(vec![0, 1]);
        let b = labels(vec![0, 1, 1]);
        assert!(dice3d(&a, &b).is_err());
    }

    #[test]
    fn test_report_json_shape() {
        let full = OverlapCounts {
            true_positive: 4,
            ..Default::default()
        };
        let miss = OverlapCounts {
            false_negative: 4,
            true_negative: 4,
            ..Default::default()
        };
        let report = TestReport::from_volume_stats(vec![
            VolumeStats::new("a.nii.gz", &full),
            VolumeStats::new("b.nii.gz", &miss),
        ]);
        assert_eq!(report.overall.mean_dice, Some(0.5));
        assert_eq!(report.overall.mean_specificity, Some(1.0));

        let map = report.into_json_map().unwrap();
        let keys: Vec<_> = map.keys().cloned().collect();
        assert_eq!(keys, vec!["volume_stats", "overall"]);
        assert_eq!(map["volume_stats"][0]["filename"], "a.nii.gz");
        assert_eq!(map["volume_stats"][0]["specificity"], Value::Null);
    }

    #[test]
    fn test_report_without_volumes() {
        let report = TestReport::from_volume_stats(Vec::new());
        assert_eq!(report.overall, OverallStats::default());
    }
}
