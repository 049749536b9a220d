use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use rayon::prelude::*;

use super::layout::AxisLayout;
use super::tagged::TaggedTensor;
use super::tracker::AllocationTracker;

/// Generate the coordinate grid of a spatial shape.
///
/// Returns an array with a channel axis of size `shape.len()` and the given
/// spatial shape: channel `d` holds, for every voxel, its index along
/// spatial axis `d`. There is no batch axis.
///
/// # Arguments
/// * `shape` - The spatial shape `[S0, S1, ...]`
/// * `device` - The device to create the tensor on
pub fn coordinate_grid<B: Backend>(shape: &[usize], device: &B::Device) -> TaggedTensor<B> {
    tracked_coordinate_grid(shape, device, None)
}

/// Same as [`coordinate_grid`], recording the allocation in `tracker`.
pub fn tracked_coordinate_grid<B: Backend>(
    shape: &[usize],
    device: &B::Device,
    tracker: Option<&AllocationTracker>,
) -> TaggedTensor<B> {
    let ndim = shape.len();
    let total: usize = shape.iter().product();

    let mut values = vec![0.0f32; ndim * total];
    if total > 0 {
        values
            .par_chunks_mut(total)
            .enumerate()
            .for_each(|(axis, channel)| {
                let stride: usize = shape[axis + 1..].iter().product();
                let size = shape[axis];
                for (voxel, value) in channel.iter_mut().enumerate() {
                    *value = ((voxel / stride) % size) as f32;
                }
            });
    }
    if let Some(tracker) = tracker {
        tracker.record(values.len());
    }

    let data = Tensor::<B, 3>::from_data(TensorData::new(values, Shape::new([1, ndim, total])), device);
    TaggedTensor::from_parts(data, shape.to_vec(), AxisLayout::CHANNEL)
}

/// Row-major strides of a spatial shape.
pub fn strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_grid_2d() {
        let device = Default::default();
        let grid = coordinate_grid::<TestBackend>(&[2, 3], &device);
        assert_eq!(grid.shape(), vec![2, 2, 3]);
        assert!(!grid.has_batch());

        let values = grid.to_vec().unwrap();
        // Axis 0 index per voxel, then axis 1 index per voxel.
        assert_eq!(&values[..6], &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        assert_eq!(&values[6..], &[0.0, 1.0, 2.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_grid_records_allocation() {
        let device = Default::default();
        let tracker = AllocationTracker::new();
        let _ = tracked_coordinate_grid::<TestBackend>(&[4, 4, 4], &device, Some(&tracker));
        assert_eq!(tracker.allocations(), 1);
        assert_eq!(tracker.elements(), 3 * 64);
    }

    #[test]
    fn test_strides() {
        assert_eq!(strides(&[4, 5, 6]), vec![30, 6, 1]);
        assert_eq!(strides(&[7]), vec![1]);
        assert!(strides(&[]).is_empty());
    }
}
