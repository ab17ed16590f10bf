//! Loading hand-written single-file NIfTI-1 volumes.

use hipposeg_ml::MlError;
use hipposeg_ml::data::{DatasetLoader, NiftiLoader, load_hippocampus_data};
use pretty_assertions::assert_eq;
use std::path::Path;

/// Minimal little-endian `.nii` with float32 voxels, first axis fastest.
fn nifti_bytes(dim: [u16; 3], voxels: &[f32]) -> Vec<u8> {
    assert_eq!(voxels.len(), dim.iter().map(|&d| d as usize).product::<usize>());

    let mut header = vec![0u8; 348];
    header[0..4].copy_from_slice(&348i32.to_le_bytes());
    let dims: [i16; 8] = [3, dim[0] as i16, dim[1] as i16, dim[2] as i16, 1, 1, 1, 1];
    for (i, d) in dims.iter().enumerate() {
        header[40 + 2 * i..42 + 2 * i].copy_from_slice(&d.to_le_bytes());
    }
    header[70..72].copy_from_slice(&16i16.to_le_bytes()); // float32
    header[72..74].copy_from_slice(&32i16.to_le_bytes());
    for i in 0..8 {
        header[76 + 4 * i..80 + 4 * i].copy_from_slice(&1.0f32.to_le_bytes());
    }
    header[108..112].copy_from_slice(&352.0f32.to_le_bytes());
    header[112..116].copy_from_slice(&1.0f32.to_le_bytes());
    header[344..348].copy_from_slice(b"n+1\0");

    let mut bytes = header;
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    for v in voxels {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Voxels in file order for a volume defined by `f(d, y, z)`.
fn voxels(dim: [u16; 3], f: impl Fn(usize, usize, usize) -> f32) -> Vec<f32> {
    let mut out = Vec::new();
    for z in 0..dim[2] as usize {
        for y in 0..dim[1] as usize {
            for d in 0..dim[0] as usize {
                out.push(f(d, y, z));
            }
        }
    }
    out
}

fn write_pair(root: &Path, name: &str, dim: [u16; 3], labels: &[f32]) {
    std::fs::create_dir_all(root.join("images")).unwrap();
    std::fs::create_dir_all(root.join("labels")).unwrap();
    let image = voxels(dim, |d, y, z| (d * 100 + y * 10 + z) as f32);
    std::fs::write(root.join("images").join(name), nifti_bytes(dim, &image)).unwrap();
    std::fs::write(root.join("labels").join(name), nifti_bytes(dim, labels)).unwrap();
}

#[test]
fn test_load_normalises_and_pads() {
    let dir = tempfile::tempdir().unwrap();
    let dim = [2, 2, 3];
    let labels = voxels(dim, |_, y, z| if y == 1 && z > 0 { 1.0 } else { 0.0 });
    write_pair(dir.path(), "hippocampus_001.nii", dim, &labels);

    let dataset = NiftiLoader.load(dir.path(), 4, 4).unwrap();
    assert_eq!(dataset.len(), 1);
    let sample = dataset.get(0).unwrap();
    assert_eq!(sample.filename, "hippocampus_001.nii");
    assert_eq!(sample.image.shape(), [2, 4, 4]);
    assert_eq!(sample.seg.shape(), [2, 4, 4]);

    // min 0 at (0,0,0), max 112 at (1,1,2)
    assert_eq!(sample.image.get(0, 0, 0), Some(0.0));
    assert_eq!(sample.image.get(1, 1, 2), Some(1.0));
    assert_eq!(sample.image.get(1, 3, 3), Some(0.0));
    assert_eq!(sample.seg.get(0, 1, 2), Some(1));
    assert_eq!(sample.seg.get(0, 1, 3), Some(0));
    assert_eq!(sample.seg.foreground_count(), 4);
}

#[test]
fn test_load_sorts_volumes_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let dim = [1, 2, 2];
    let labels = vec![0.0; 4];
    write_pair(dir.path(), "hippocampus_010.nii", dim, &labels);
    write_pair(dir.path(), "hippocampus_002.nii", dim, &labels);

    let dataset = load_hippocampus_data(dir.path(), 2, 2).unwrap();
    let names: Vec<_> = dataset.iter().map(|s| s.filename.as_str()).collect();
    assert_eq!(names, vec!["hippocampus_002.nii", "hippocampus_010.nii"]);
    assert_eq!(dataset.slice_count(), 2);
}

#[test]
fn test_volume_larger_than_patch_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let dim = [1, 3, 3];
    write_pair(dir.path(), "big.nii", dim, &[0.0; 9]);

    let result = load_hippocampus_data(dir.path(), 2, 2);
    assert!(matches!(result, Err(MlError::Dataset(_))));
}

#[test]
fn test_out_of_range_label_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let dim = [1, 1, 2];
    write_pair(dir.path(), "bad.nii", dim, &[0.0, 3.0]);

    let result = load_hippocampus_data(dir.path(), 2, 2);
    assert!(matches!(result, Err(MlError::Dataset(_))));
}

#[test]
fn test_missing_label_file() {
    let dir = tempfile::tempdir().unwrap();
    let dim = [1, 1, 2];
    write_pair(dir.path(), "a.nii", dim, &[0.0, 1.0]);
    std::fs::remove_file(dir.path().join("labels").join("a.nii")).unwrap();

    let result = load_hippocampus_data(dir.path(), 2, 2);
    assert!(matches!(result, Err(MlError::NotFound(_))));
}

#[test]
fn test_empty_image_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("images")).unwrap();
    std::fs::create_dir_all(dir.path().join("labels")).unwrap();

    let result = load_hippocampus_data(dir.path(), 2, 2);
    assert!(matches!(result, Err(MlError::Dataset(_))));
}
