//! Baseline voxel classifier.
//!
//! Multinomial logistic regression over a handful of per-voxel features taken
//! from the voxel's own slice. Every voxel is classified independently; the
//! model is trained with class-weighted cross-entropy.

use crate::data::slices::SliceSample;
use crate::error::MlError;
use serde::{Deserialize, Serialize};

/// Background, anterior and posterior hippocampus.
pub const NUM_CLASSES: usize = 3;

/// Bias, intensity, 3x3 neighbourhood mean, squared intensity.
pub const NUM_FEATURES: usize = 4;

type Features = [f64; NUM_FEATURES];

/// Feature vectors for every voxel of a row-major `[height, width]` slice.
pub fn slice_features(image: &[f32], height: usize, width: usize) -> Vec<Features> {
    let mut features = Vec::with_capacity(image.len());
    for y in 0..height {
        for x in 0..width {
            let value = f64::from(image[y * width + x]);

            let mut sum = 0.0;
            let mut count = 0.0;
            for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                    sum += f64::from(image[ny * width + nx]);
                    count += 1.0;
                }
            }

            features.push([1.0, value, sum / count, value * value]);
        }
    }
    features
}

/// Class probabilities for one voxel, computed with a max-shifted softmax.
fn softmax(logits: &[f64; NUM_CLASSES]) -> [f64; NUM_CLASSES] {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut probs = [0.0; NUM_CLASSES];
    let mut total = 0.0;
    for (p, &l) in probs.iter_mut().zip(logits) {
        *p = (l - max).exp();
        total += *p;
    }
    probs.iter_mut().for_each(|p| *p /= total);
    probs
}

/// Weighted mean cross-entropy and its gradient over a batch of slices.
#[derive(Debug, Clone)]
pub struct LossAndGradient {
    pub loss: f64,
    pub gradient: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoxelClassifier {
    classes: usize,
    features: usize,
    /// Row-major `[classes, features]`.
    weights: Vec<f64>,
}

impl Default for VoxelClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl VoxelClassifier {
    /// Zero-initialised model; predicts a uniform distribution until trained.
    pub fn new() -> Self {
        Self {
            classes: NUM_CLASSES,
            features: NUM_FEATURES,
            weights: vec![0.0; NUM_CLASSES * NUM_FEATURES],
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.weights.len()
    }

    pub fn parameters(&self) -> &[f64] {
        &self.weights
    }

    pub fn parameters_mut(&mut self) -> &mut [f64] {
        &mut self.weights
    }

    /// Check that deserialized parameters match this build's layout.
    pub fn validate(&self) -> Result<(), MlError> {
        if self.classes != NUM_CLASSES || self.features != NUM_FEATURES {
            return Err(MlError::model(format!(
                "parameter layout {}x{} does not match expected {}x{}",
                self.classes, self.features, NUM_CLASSES, NUM_FEATURES
            )));
        }
        if self.weights.len() != NUM_CLASSES * NUM_FEATURES {
            return Err(MlError::model(format!(
                "expected {} weights, found {}",
                NUM_CLASSES * NUM_FEATURES,
                self.weights.len()
            )));
        }
        if self.weights.iter().any(|w| !w.is_finite()) {
            return Err(MlError::model("parameters contain non-finite values"));
        }
        Ok(())
    }

    fn logits(&self, x: &Features) -> [f64; NUM_CLASSES] {
        let mut logits = [0.0; NUM_CLASSES];
        for (c, logit) in logits.iter_mut().enumerate() {
            let row = &self.weights[c * NUM_FEATURES..(c + 1) * NUM_FEATURES];
            *logit = row.iter().zip(x).map(|(w, v)| w * v).sum();
        }
        logits
    }

    /// Class-weighted mean cross-entropy and gradient over every voxel in `slices`.
    pub fn loss_and_gradient(
        &self,
        slices: &[&SliceSample],
        height: usize,
        width: usize,
        class_weights: &[f64; NUM_CLASSES],
    ) -> LossAndGradient {
        let mut gradient = vec![0.0; self.weights.len()];
        let mut loss = 0.0;
        let mut weight_total = 0.0;

        for slice in slices {
            let features = slice_features(&slice.image, height, width);
            for (x, &label) in features.iter().zip(&slice.seg) {
                let target = usize::from(label).min(NUM_CLASSES - 1);
                let weight = class_weights[target];
                if weight == 0.0 {
                    continue;
                }
                let probs = softmax(&self.logits(x));
                loss -= weight * probs[target].max(f64::MIN_POSITIVE).ln();
                weight_total += weight;

                for (c, &p) in probs.iter().enumerate() {
                    let delta = weight * (p - if c == target { 1.0 } else { 0.0 });
                    for (f, &v) in x.iter().enumerate() {
                        gradient[c * NUM_FEATURES + f] += delta * v;
                    }
                }
            }
        }

        if weight_total > 0.0 {
            loss /= weight_total;
            gradient.iter_mut().for_each(|g| *g /= weight_total);
        }
        LossAndGradient { loss, gradient }
    }

    /// Weighted mean cross-entropy without the gradient.
    pub fn loss(
        &self,
        slices: &[&SliceSample],
        height: usize,
        width: usize,
        class_weights: &[f64; NUM_CLASSES],
    ) -> f64 {
        self.loss_and_gradient(slices, height, width, class_weights)
            .loss
    }

    /// Most likely class for every voxel of a slice.
    pub fn predict_slice(&self, image: &[f32], height: usize, width: usize) -> Vec<u8> {
        slice_features(image, height, width)
            .iter()
            .map(|x| {
                let logits = self.logits(x);
                let mut best = 0;
                for c in 1..NUM_CLASSES {
                    if logits[c] > logits[best] {
                        best = c;
                    }
                }
                best as u8
            })
            .collect()
    }
}

/// Inverse-frequency class weights normalised so present classes average to 1.
///
/// Classes that never occur get weight 0.
pub fn balanced_class_weights<'a>(
    labels: impl IntoIterator<Item = &'a [u8]>,
) -> [f64; NUM_CLASSES] {
    let mut counts = [0usize; NUM_CLASSES];
    for slice in labels {
        for &label in slice {
            counts[usize::from(label).min(NUM_CLASSES - 1)] += 1;
        }
    }

    let total: usize = counts.iter().sum();
    let present = counts.iter().filter(|&&c| c > 0).count();
    let mut weights = [0.0; NUM_CLASSES];
    if total == 0 {
        return [1.0; NUM_CLASSES];
    }
    for (w, &c) in weights.iter_mut().zip(&counts) {
        if c > 0 {
            *w = total as f64 / (present as f64 * c as f64);
        }
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_features_neighbourhood() {
        let image = [0.0, 1.0, 0.0, 0.0];
        let features = slice_features(&image, 2, 2);
        assert_eq!(features.len(), 4);
        assert_eq!(features[1], [1.0, 1.0, 0.25, 1.0]);
        assert_eq!(features[0][0], 1.0);
    }

    #[test]
    fn test_untrained_model_loss_is_log_classes() {
        let model = VoxelClassifier::new();
        let slice = SliceSample {
            image: vec![0.3, 0.7],
            seg: vec![0, 2],
        };
        let loss = model.loss(&[&slice], 1, 2, &[1.0; NUM_CLASSES]);
        assert!((loss - (NUM_CLASSES as f64).ln()).abs() < 1e-9);
    }

    #[test]
    fn test_zero_weight_voxels_are_ignored() {
        let model = VoxelClassifier::new();
        let slice = SliceSample {
            image: vec![0.3],
            seg: vec![1],
        };
        let result = model.loss_and_gradient(&[&slice], 1, 1, &[1.0, 0.0, 1.0]);
        assert_eq!(result.loss, 0.0);
        assert!(result.gradient.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_predict_slice_follows_weights() {
        let mut model = VoxelClassifier::new();
        // class 2 logit grows with intensity
        model.parameters_mut()[2 * NUM_FEATURES + 1] = 10.0;
        model.parameters_mut()[2 * NUM_FEATURES] = -5.0;
        let prediction = model.predict_slice(&[0.1, 0.9], 1, 2);
        assert_eq!(prediction, vec![0, 2]);
    }

    #[test]
    fn test_validate_layout() {
        assert!(VoxelClassifier::new().validate().is_ok());
        let broken: VoxelClassifier =
            serde_json::from_str(r#"{"classes":3,"features":4,"weights":[0.0]}"#).unwrap();
        assert!(matches!(broken.validate(), Err(MlError::Model(_))));
    }

    #[test]
    fn test_balanced_class_weights() {
        let labels: Vec<u8> = vec![0, 0, 0, 1];
        let weights = balanced_class_weights([labels.as_slice()]);
        assert!((weights[0] - 4.0 / 6.0).abs() < 1e-12);
        assert!((weights[1] - 2.0).abs() < 1e-12);
        assert_eq!(weights[2], 0.0);
    }
}
