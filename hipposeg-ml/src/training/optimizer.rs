//! Adam optimizer over a flat parameter vector.

#[derive(Debug, Clone)]
pub struct Adam {
    lr: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    m: Vec<f64>,
    v: Vec<f64>,
    t: i32,
}

impl Adam {
    pub fn new(lr: f64, parameter_count: usize) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            m: vec![0.0; parameter_count],
            v: vec![0.0; parameter_count],
            t: 0,
        }
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }

    pub fn set_lr(&mut self, lr: f64) {
        self.lr = lr;
    }

    /// Apply one bias-corrected update. `params` and `grad` must match the
    /// length the optimizer was built for.
    pub fn step(&mut self, params: &mut [f64], grad: &[f64]) {
        debug_assert_eq!(params.len(), self.m.len());
        debug_assert_eq!(grad.len(), self.m.len());

        self.t = self.t.saturating_add(1);
        let bias1 = 1.0 - self.beta1.powi(self.t);
        let bias2 = 1.0 - self.beta2.powi(self.t);

        for (i, (p, &g)) in params.iter_mut().zip(grad).enumerate() {
            self.m[i] = self.beta1 * self.m[i] + (1.0 - self.beta1) * g;
            self.v[i] = self.beta2 * self.v[i] + (1.0 - self.beta2) * g * g;
            let m_hat = self.m[i] / bias1;
            let v_hat = self.v[i] / bias2;
            *p -= self.lr * m_hat / (v_hat.sqrt() + self.epsilon);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::slices::SliceSample;
    use crate::training::model::{NUM_CLASSES, VoxelClassifier};

    #[test]
    fn test_first_step_moves_by_lr() {
        let mut adam = Adam::new(0.1, 2);
        let mut params = [1.0, -1.0];
        adam.step(&mut params, &[0.5, -2.0]);
        assert!((params[0] - 0.9).abs() < 1e-6);
        assert!((params[1] + 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_training_reduces_loss_on_separable_slices() {
        let slice = SliceSample {
            image: vec![0.05, 0.1, 0.9, 0.95, 0.5, 0.45],
            seg: vec![0, 0, 2, 2, 1, 1],
        };
        let batch = [&slice];
        let weights = [1.0; NUM_CLASSES];
        let mut model = VoxelClassifier::new();
        let mut adam = Adam::new(0.05, model.parameter_count());

        let initial = model.loss(&batch, 1, 6, &weights);
        for _ in 0..300 {
            let step = model.loss_and_gradient(&batch, 1, 6, &weights);
            adam.step(model.parameters_mut(), &step.gradient);
        }
        let trained = model.loss(&batch, 1, 6, &weights);
        assert!(trained < initial * 0.8, "loss {initial} -> {trained}");
    }
}
