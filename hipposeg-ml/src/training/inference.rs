//! Whole-volume inference, one depth slice at a time.

use crate::data::volume::{ImageVolume, LabelVolume, Volume};
use crate::training::model::VoxelClassifier;

pub struct InferenceAgent<'a> {
    model: &'a VoxelClassifier,
}

impl<'a> InferenceAgent<'a> {
    pub fn new(model: &'a VoxelClassifier) -> Self {
        Self { model }
    }

    /// Predict a label for every voxel of an already-padded volume.
    pub fn infer_volume(&self, image: &ImageVolume) -> LabelVolume {
        let [depth, height, width] = image.shape();
        let mut prediction = Volume::zeros(image.shape());
        for d in 0..depth {
            let labels = self.model.predict_slice(image.slice(d), height, width);
            prediction.slice_mut(d).copy_from_slice(&labels);
        }
        prediction
    }
}
