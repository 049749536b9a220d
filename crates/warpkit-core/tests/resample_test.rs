use std::sync::Arc;

use burn::tensor::Tensor;
use burn_ndarray::NdArray;
use warpkit_core::array::{AllocationTracker, AxisLayout, TaggedTensor};
use warpkit_core::interpolation::{FillPolicy, InterpolationMethod};
use warpkit_core::transform::{compose, Identity, Rotation90, SharedTransform, Transform, Translation};
use warpkit_core::{Resampler, TransformError};

type B = NdArray<f32>;

fn ones_4x4() -> TaggedTensor<B> {
    TaggedTensor::spatial_only(vec![1.0; 16], &[4, 4], &Default::default()).unwrap()
}

fn far_shift() -> Translation<B> {
    Translation::from_offsets(&[10.0, 10.0], &Default::default())
}

#[test]
fn test_identity_resample_is_bit_identical() {
    let device = Default::default();
    let values: Vec<f32> = (0..60).map(|v| (v as f32 * 0.37).sin() * 5.0).collect();
    let image = TaggedTensor::<B>::from_floats(values.clone(), &[1, 3, 4, 5], AxisLayout::FULL, &device).unwrap();
    for method in [InterpolationMethod::Linear, InterpolationMethod::Nearest] {
        let out = Resampler::new()
            .with_method(method)
            .resample(&image, Some(&Identity::new()))
            .unwrap();
        assert_eq!(out.shape(), vec![1, 3, 4, 5]);
        assert_eq!(out.to_vec().unwrap(), values);
    }
}

#[test]
fn test_zero_fill_outside() {
    let out = Resampler::new().resample(&ones_4x4(), Some(&far_shift())).unwrap();
    assert_eq!(out.shape(), vec![4, 4]);
    assert_eq!(out.to_vec().unwrap(), vec![0.0; 16]);
}

#[test]
fn test_constant_fill_outside() {
    let out = Resampler::new()
        .with_fill(FillPolicy::Constant(0.5))
        .resample(&ones_4x4(), Some(&far_shift()))
        .unwrap();
    assert_eq!(out.to_vec().unwrap(), vec![0.5; 16]);
}

#[test]
fn test_nearest_and_background_fill() {
    let device = Default::default();
    let values: Vec<f32> = (0..16).map(|v| v as f32).collect();
    let image = TaggedTensor::<B>::spatial_only(values, &[4, 4], &device).unwrap();

    let nearest = Resampler::new()
        .with_fill(FillPolicy::Nearest)
        .resample(&image, Some(&far_shift()))
        .unwrap();
    // Everything clamps to the last voxel.
    assert_eq!(nearest.to_vec().unwrap(), vec![15.0; 16]);

    let background = Resampler::new()
        .with_fill(FillPolicy::Background)
        .resample(&image, Some(&far_shift()))
        .unwrap();
    // Corners are 0, 3, 12 and 15; the lower median is 3.
    assert_eq!(background.to_vec().unwrap(), vec![3.0; 16]);
}

#[test]
fn test_batch_broadcasting() {
    let device = Default::default();
    let image = TaggedTensor::<B>::from_floats((0..16).map(|v| v as f32).collect(), &[1, 4, 4], AxisLayout::BATCH, &device)
        .unwrap();
    let shifts = Translation::<B>::new(Tensor::from_floats([[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]], &device));
    let out = Resampler::new().resample(&image, Some(&shifts)).unwrap();
    assert_eq!(out.shape(), vec![3, 4, 4]);
    let values = out.to_vec().unwrap();
    assert_eq!(values[0], 0.0);
    assert_eq!(values[16], 4.0);
    assert_eq!(values[32], 1.0);

    let pair = TaggedTensor::<B>::from_floats(vec![0.0; 32], &[2, 4, 4], AxisLayout::BATCH, &device).unwrap();
    assert!(matches!(
        Resampler::new().resample(&pair, Some(&shifts)),
        Err(TransformError::BatchMismatch { .. })
    ));
}

#[test]
fn test_rotation_transposes_output() {
    let device = Default::default();
    let image = TaggedTensor::<B>::spatial_only((0..6).map(|v| v as f32).collect(), &[2, 3], &device).unwrap();
    let turn = Rotation90::new(0, 1, Some(vec![3, 2])).unwrap();
    let out = Resampler::<B>::new().resample(&image, Some(&turn)).unwrap();
    assert_eq!(out.shape(), vec![3, 2]);
}

#[test]
fn test_composition_resamples_once_per_run() {
    let device = Default::default();
    let tracker = Arc::new(AllocationTracker::new());
    let image = TaggedTensor::<B>::spatial_only((0..16).map(|v| v as f32).collect(), &[4, 4], &device).unwrap();
    let chain = compose(vec![
        Arc::new(Translation::from_offsets(&[1.0, 0.0], &device)) as SharedTransform<B>,
        Arc::new(Translation::from_offsets(&[-1.0, 0.0], &device)),
    ])
    .unwrap();
    let out = Resampler::new()
        .with_tracker(tracker.clone())
        .resample(&image, Some(&chain))
        .unwrap();
    assert_eq!(out.to_vec().unwrap(), image.to_vec().unwrap());
    // One grid and one output.
    assert_eq!(tracker.allocations(), 2);
    assert_eq!(chain.reshape().apply(&[4, 4]).unwrap(), vec![4, 4]);
}
