//! Dataset loading from NIfTI scans.
//!
//! Expected layout under the dataset root:
//!
//! ```text
//! <root>/images/hippocampus_001.nii.gz
//! <root>/labels/hippocampus_001.nii.gz
//! ```

use crate::data::dataset::{HippocampusDataset, VolumeSample};
use crate::data::volume::{ImageVolume, LabelVolume, Volume};
use crate::error::MlError;
use nifti::{NiftiObject, NiftiVolume, RandomAccessNiftiVolume, ReaderOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Highest class id a label volume may carry.
pub const MAX_LABEL: u8 = 2;

/// Source of a labelled dataset, cropped to `y_shape` x `z_shape` slices.
pub trait DatasetLoader {
    fn load(
        &self,
        root_dir: &Path,
        y_shape: usize,
        z_shape: usize,
    ) -> Result<HippocampusDataset, MlError>;
}

/// Reads `.nii` / `.nii.gz` image and label pairs.
#[derive(Debug, Clone, Default)]
pub struct NiftiLoader;

impl DatasetLoader for NiftiLoader {
    fn load(
        &self,
        root_dir: &Path,
        y_shape: usize,
        z_shape: usize,
    ) -> Result<HippocampusDataset, MlError> {
        load_hippocampus_data(root_dir, y_shape, z_shape)
    }
}

/// Load every image/label pair under `root_dir`, normalised and padded.
pub fn load_hippocampus_data(
    root_dir: &Path,
    y_shape: usize,
    z_shape: usize,
) -> Result<HippocampusDataset, MlError> {
    let image_dir = root_dir.join("images");
    let label_dir = root_dir.join("labels");
    if !image_dir.is_dir() {
        return Err(MlError::not_found(format!(
            "image directory {}",
            image_dir.display()
        )));
    }
    if !label_dir.is_dir() {
        return Err(MlError::not_found(format!(
            "label directory {}",
            label_dir.display()
        )));
    }

    let files = list_nifti_files(&image_dir)?;
    if files.is_empty() {
        return Err(MlError::dataset(format!(
            "no NIfTI volumes found in {}",
            image_dir.display()
        )));
    }

    let mut samples = Vec::with_capacity(files.len());
    for filename in files {
        let mut image = read_volume(&image_dir.join(&filename))?;
        let seg = read_labels(&label_path(root_dir, &filename))?;
        if image.shape() != seg.shape() {
            return Err(MlError::dataset(format!(
                "{filename}: image shape {:?} does not match label shape {:?}",
                image.shape(),
                seg.shape()
            )));
        }

        image.normalize_min_max();
        let image = image.reshape_padded(y_shape, z_shape)?;
        let seg = seg.reshape_padded(y_shape, z_shape)?;
        debug!(file = %filename, depth = image.depth(), "Loaded volume");
        samples.push(VolumeSample::new(image, seg, filename)?);
    }

    let dataset = HippocampusDataset::new(samples);
    info!(
        volumes = dataset.len(),
        slices = dataset.slice_count(),
        "Processed dataset"
    );
    Ok(dataset)
}

/// NIfTI file names in `dir`, sorted, skipping dotfiles.
fn list_nifti_files(dir: &Path) -> Result<Vec<String>, MlError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        if name.ends_with(".nii") || name.ends_with(".nii.gz") {
            files.push(name);
        }
    }
    files.sort();
    Ok(files)
}

fn read_labels(path: &Path) -> Result<LabelVolume, MlError> {
    if !path.exists() {
        return Err(MlError::not_found(format!("label volume {}", path.display())));
    }
    let raw = read_volume(path)?;
    let shape = raw.shape();
    let labels = raw
        .into_data()
        .into_iter()
        .map(|v| {
            let class = v.round();
            if !(0.0..=f32::from(MAX_LABEL)).contains(&class) {
                return Err(MlError::dataset(format!(
                    "{}: label value {v} outside 0..={MAX_LABEL}",
                    path.display()
                )));
            }
            Ok(class as u8)
        })
        .collect::<Result<Vec<u8>, MlError>>()?;
    Volume::new(shape, labels)
}

/// Read a 3D scan into a depth-major volume. Trailing singleton axes are allowed.
fn read_volume(path: &Path) -> Result<ImageVolume, MlError> {
    let object = ReaderOptions::new().read_file(path)?;
    let volume = object.volume();
    let dim = volume.dim();
    if dim.len() < 3 || dim.iter().skip(3).any(|&d| d != 1) {
        return Err(MlError::dataset(format!(
            "{}: expected a 3D volume, got dimensions {:?}",
            path.display(),
            dim
        )));
    }

    let shape = [dim[0] as usize, dim[1] as usize, dim[2] as usize];
    let mut out = Volume::zeros(shape);
    let mut coords = vec![0u16; dim.len()];
    for d in 0..dim[0] {
        for y in 0..dim[1] {
            for z in 0..dim[2] {
                coords[0] = d;
                coords[1] = y;
                coords[2] = z;
                let value = volume.get_f32(&coords)?;
                out.set(d as usize, y as usize, z as usize, value);
            }
        }
    }
    Ok(out)
}

/// Path of the label volume paired with an image file name.
pub fn label_path(root_dir: &Path, filename: &str) -> PathBuf {
    root_dir.join("labels").join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_nifti_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.nii.gz", "a.nii", "._a.nii", "notes.txt", "c.nii.gz.bak"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.nii")).unwrap();
        let files = list_nifti_files(dir.path()).unwrap();
        assert_eq!(files, vec!["a.nii".to_string(), "b.nii.gz".to_string()]);
    }

    #[test]
    fn test_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_hippocampus_data(dir.path(), 8, 8);
        assert!(matches!(result, Err(MlError::NotFound(_))));

        std::fs::create_dir(dir.path().join("images")).unwrap();
        std::fs::create_dir(dir.path().join("labels")).unwrap();
        let result = load_hippocampus_data(dir.path(), 8, 8);
        assert!(matches!(result, Err(MlError::Dataset(_))));
    }

    #[test]
    fn test_label_path() {
        assert_eq!(
            label_path(Path::new("/data"), "x.nii.gz"),
            PathBuf::from("/data/labels/x.nii.gz")
        );
    }
}
