//! Boundary handling and the choice of interpolator.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Shape, Tensor, TensorData};
use serde::{Deserialize, Serialize};

use crate::array::strides;

/// What a sample outside the source grid reads.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum FillPolicy {
    /// Zero.
    #[default]
    Zero,
    /// The lower median of the source's corner voxels, per batch instance
    /// and channel.
    Background,
    /// The nearest voxel inside the grid.
    Nearest,
    /// A fixed value.
    Constant(f32),
}

/// A fill policy resolved against concrete source values.
#[derive(Debug, Clone)]
pub enum FillValue<B: Backend> {
    Zero,
    Nearest,
    /// `[batch, channel, 1]`, broadcast over samples.
    Value(Tensor<B, 3>),
}

impl FillPolicy {
    /// Resolve the policy for `values: [batch, channel, voxels]` laid out
    /// over `spatial`.
    pub fn resolve<B: Backend>(&self, values: &Tensor<B, 3>, spatial: &[usize]) -> FillValue<B> {
        match *self {
            FillPolicy::Zero => FillValue::Zero,
            FillPolicy::Nearest => FillValue::Nearest,
            FillPolicy::Constant(v) => {
                let [batch, channel, _] = values.dims();
                FillValue::Value(Tensor::ones([batch, channel, 1], &values.device()).mul_scalar(v))
            }
            FillPolicy::Background => FillValue::Value(corner_median(values, spatial)),
        }
    }
}

/// Lower median of the `2^ndim` corner voxels, `[batch, channel, 1]`.
fn corner_median<B: Backend>(values: &Tensor<B, 3>, spatial: &[usize]) -> Tensor<B, 3> {
    let strides = strides(spatial);
    let count = 1usize << spatial.len();
    let corners: Vec<i64> = (0..count)
        .map(|corner| {
            spatial
                .iter()
                .zip(&strides)
                .enumerate()
                .map(|(axis, (&size, &stride))| {
                    let index = if corner >> axis & 1 == 1 { size.saturating_sub(1) } else { 0 };
                    (index * stride) as i64
                })
                .sum()
        })
        .collect();
    let index = Tensor::<B, 1, Int>::from_data(TensorData::new(corners, Shape::new([count])), &values.device());
    values
        .clone()
        .select(2, index)
        .sort(2)
        .narrow(2, (count - 1) / 2, 1)
}

/// Interpolation scheme used by the resampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InterpolationMethod {
    #[default]
    Linear,
    Nearest,
}
