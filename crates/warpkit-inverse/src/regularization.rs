//! Bending energy regularization for displacement fields.
//!
//! Penalizes the squared Laplacian of the displacement, which keeps the
//! solved inverse smooth where the fit term alone is ambiguous:
//!
//! R(u) = mean |∇²u|²
//!
//! The Laplacian is a sum of one-dimensional second differences, one per
//! spatial axis, so fields of any dimensionality are handled the same way.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Discrete Laplacian of a `[batch, channels, voxels]` field laid out over
/// the spatial shape `grid`.
///
/// Each axis contributes `u[i - 1] - 2 u[i] + u[i + 1]` on its interior and
/// zero on its two boundary slices. Axes shorter than three samples
/// contribute nothing.
pub fn laplacian<B: Backend>(field: Tensor<B, 3>, grid: &[usize]) -> Tensor<B, 3> {
    let [batch, channels, voxels] = field.dims();
    let device = field.device();
    let mut total = Tensor::zeros([batch, channels, voxels], &device);

    for (axis, &size) in grid.iter().enumerate() {
        if size < 3 {
            continue;
        }
        let outer = grid[..axis].iter().product::<usize>();
        let inner = grid[axis + 1..].iter().product::<usize>();
        let lines: Tensor<B, 4> = field.clone().reshape([batch * channels, outer, size, inner]);

        let lower = lines.clone().narrow(2, 0, size - 2);
        let center = lines.clone().narrow(2, 1, size - 2);
        let upper = lines.narrow(2, 2, size - 2);
        let second = lower + upper - center.mul_scalar(2.0);

        // Pad back to original size
        let zeros = Tensor::<B, 4>::zeros([batch * channels, outer, 1, inner], &device);
        let padded = Tensor::cat(vec![zeros.clone(), second, zeros], 2);
        total = total + padded.reshape([batch, channels, voxels]);
    }
    total
}

/// Bending energy regularizer.
#[derive(Clone, Debug)]
pub struct BendingEnergy {
    weight: f64,
}

impl BendingEnergy {
    /// Create a new bending energy regularizer.
    ///
    /// # Arguments
    /// * `weight` - The weight (scaling factor) for this regularizer.
    pub fn new(weight: f64) -> Self {
        Self { weight }
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Weighted energy of a `[batch, channels, voxels]` displacement over
    /// the spatial shape `grid`, as a one-element tensor.
    pub fn compute_loss<B: Backend>(&self, displacement: Tensor<B, 3>, grid: &[usize]) -> Tensor<B, 1> {
        laplacian(displacement, grid)
            .powf_scalar(2.0)
            .mean()
            .mul_scalar(self.weight)
    }
}

impl Default for BendingEnergy {
    fn default() -> Self {
        Self::new(0.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{ElementConversion, TensorData};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn field_from(values: Vec<f32>, channels: usize) -> Tensor<TestBackend, 3> {
        let voxels = values.len() / channels;
        Tensor::from_data(TensorData::new(values, [1, channels, voxels]), &Default::default())
    }

    #[test]
    fn test_linear_field_has_no_bending() {
        // u(x, y) = 0.5 x - 0.25 y on a 4x5 grid, both components
        let mut values = Vec::new();
        for _ in 0..2 {
            for x in 0..4 {
                for y in 0..5 {
                    values.push(0.5 * x as f32 - 0.25 * y as f32);
                }
            }
        }
        let loss = BendingEnergy::new(1.0).compute_loss(field_from(values, 2), &[4, 5]);
        assert!(loss.into_scalar().elem::<f32>().abs() < 1e-10);
    }

    #[test]
    fn test_quadratic_field_interior() {
        // u(x) = x^2 along one axis of length 5: second difference is 2
        let values: Vec<f32> = (0..5).map(|x| (x * x) as f32).collect();
        let lap = laplacian(field_from(values, 1), &[5]);
        let out = lap.into_data().to_vec::<f32>().unwrap();
        assert_eq!(out, vec![0.0, 2.0, 2.0, 2.0, 0.0]);
    }

    #[test]
    fn test_axes_are_summed() {
        // u(x, y) = x^2 + y^2 on a 3x3 grid: only the center is interior
        let mut values = Vec::new();
        for x in 0..3 {
            for y in 0..3 {
                values.push((x * x + y * y) as f32);
            }
        }
        let lap = laplacian(field_from(values, 1), &[3, 3]);
        let out = lap.into_data().to_vec::<f32>().unwrap();
        assert_eq!(out[4], 4.0);
        // Edge midpoints are interior along one axis only
        assert_eq!(out[1], 2.0);
        assert_eq!(out[0], 0.0);
    }

    #[test]
    fn test_short_axes_are_skipped() {
        let values = vec![1.0, 5.0, 2.0, 7.0];
        let lap = laplacian(field_from(values, 1), &[2, 2]);
        assert_eq!(lap.into_data().to_vec::<f32>().unwrap(), vec![0.0; 4]);
    }

    #[test]
    fn test_weight_scales_loss() {
        let values: Vec<f32> = (0..5).map(|x| (x * x) as f32).collect();
        let loss = BendingEnergy::new(0.5).compute_loss(field_from(values, 1), &[5]);
        // mean of [0, 4, 4, 4, 0] is 2.4
        assert!((loss.into_scalar().elem::<f32>() - 1.2).abs() < 1e-5);
    }
}
