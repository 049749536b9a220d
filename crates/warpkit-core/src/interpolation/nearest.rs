//! Nearest neighbor interpolation implementation.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use super::fill::FillPolicy;
use super::trait_::{align, CornerReader, Interpolator};
use crate::error::Result;

/// Nearest Neighbor Interpolator.
///
/// Performs nearest neighbor interpolation. Each coordinate is read at
/// `floor(y + 0.5)`, so halves round up.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NearestNeighborInterpolator;

impl NearestNeighborInterpolator {
    /// Create a new nearest neighbor interpolator.
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Interpolator<B> for NearestNeighborInterpolator {
    fn interpolate(
        &self,
        values: Tensor<B, 3>,
        spatial: &[usize],
        coords: Tensor<B, 3>,
        fill: FillPolicy,
    ) -> Result<Tensor<B, 3>> {
        let (values, coords) = align(values, spatial, coords)?;
        if spatial.is_empty() {
            return Ok(values);
        }
        let fill = fill.resolve(&values, spatial);
        let index: Vec<Tensor<B, 3>> = (0..spatial.len())
            .map(|axis| coords.clone().narrow(1, axis, 1).add_scalar(0.5).floor())
            .collect();
        Ok(CornerReader::new(&values, spatial, &fill).read(&index))
    }
}
