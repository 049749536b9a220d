//! Interpolation types and operations.
//!
//! This module provides interpolation traits and implementations
//! for sampling values at continuous coordinates.

pub mod fill;
pub mod linear;
pub mod nearest;
pub mod trait_;

pub use fill::{FillPolicy, FillValue, InterpolationMethod};
pub use linear::LinearInterpolator;
pub use nearest::NearestNeighborInterpolator;
pub use trait_::Interpolator;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::error::Result;

impl InterpolationMethod {
    /// The interpolator implementing this method.
    pub fn interpolator<B: Backend>(&self) -> Box<dyn Interpolator<B>> {
        match self {
            InterpolationMethod::Linear => Box::new(LinearInterpolator::new()),
            InterpolationMethod::Nearest => Box::new(NearestNeighborInterpolator::new()),
        }
    }
}

/// Sample `values` laid out over `spatial` at `coords` with the given
/// method and fill.
pub fn sample<B: Backend>(
    values: Tensor<B, 3>,
    spatial: &[usize],
    coords: Tensor<B, 3>,
    method: InterpolationMethod,
    fill: FillPolicy,
) -> Result<Tensor<B, 3>> {
    method.interpolator::<B>().interpolate(values, spatial, coords, fill)
}
