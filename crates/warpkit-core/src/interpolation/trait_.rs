//! Interpolator trait for sampling values at continuous coordinates.
//!
//! This module defines the core Interpolator trait that all interpolation
//! methods implement, along with the corner gather they share.

use std::fmt::Debug;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::fill::{FillPolicy, FillValue};
use crate::array::strides;
use crate::error::{Result, TransformError};
use crate::transform::trait_::broadcast_batch;

/// Interpolator trait for sampling values at continuous coordinates.
///
/// # Type Parameters
/// * `B` - The Burn backend
pub trait Interpolator<B: Backend>: Debug {
    /// Interpolate values at continuous voxel coordinates.
    ///
    /// # Arguments
    /// * `values` - Source `[batch, channel, voxels]`, row-major over `spatial`
    /// * `spatial` - Spatial shape of the source
    /// * `coords` - Sample positions `[batch, ndim, samples]`
    /// * `fill` - What out-of-grid reads produce
    ///
    /// # Returns
    /// Tensor of sampled values `[batch, channel, samples]`
    fn interpolate(
        &self,
        values: Tensor<B, 3>,
        spatial: &[usize],
        coords: Tensor<B, 3>,
        fill: FillPolicy,
    ) -> Result<Tensor<B, 3>>;

    /// Derivative of the interpolated values with respect to each
    /// coordinate, `[batch, ndim * channel, samples]` ordered axis-major.
    fn derivative(
        &self,
        _values: Tensor<B, 3>,
        _spatial: &[usize],
        _coords: Tensor<B, 3>,
        _fill: FillPolicy,
    ) -> Result<Tensor<B, 3>> {
        Err(TransformError::unsupported(format!(
            "{:?} does not provide derivatives",
            self
        )))
    }
}

/// Give `values` and `coords` a common batch size and check that the
/// coordinates cover every spatial axis.
pub(crate) fn align<B: Backend>(
    values: Tensor<B, 3>,
    spatial: &[usize],
    coords: Tensor<B, 3>,
) -> Result<(Tensor<B, 3>, Tensor<B, 3>)> {
    let [value_batch, _, voxels] = values.dims();
    let [coord_batch, ndim, _] = coords.dims();
    if ndim != spatial.len() || voxels != spatial.iter().product::<usize>() {
        return Err(TransformError::shape(
            format!("coordinates with {} channels", spatial.len()),
            &[coord_batch, ndim],
        ));
    }
    let batch = match (value_batch, coord_batch) {
        (a, b) if a == b => a,
        (1, b) => b,
        (a, 1) => a,
        (a, b) => return Err(TransformError::batch_mismatch(a, b)),
    };
    Ok((broadcast_batch(values, batch)?, broadcast_batch(coords, batch)?))
}

/// Reads the source at integer voxel positions through its flattened
/// storage.
pub(crate) struct CornerReader<'a, B: Backend> {
    values: &'a Tensor<B, 3>,
    spatial: &'a [usize],
    strides: Vec<usize>,
    fill: &'a FillValue<B>,
}

impl<'a, B: Backend> CornerReader<'a, B> {
    pub(crate) fn new(values: &'a Tensor<B, 3>, spatial: &'a [usize], fill: &'a FillValue<B>) -> Self {
        Self {
            values,
            spatial,
            strides: strides(spatial),
            fill,
        }
    }

    /// Values at one integer position per sample, `[batch, channel,
    /// samples]`, with out-of-grid reads replaced according to the fill.
    /// `index` holds one `[batch, 1, samples]` tensor per spatial axis.
    pub(crate) fn read(&self, index: &[Tensor<B, 3>]) -> Tensor<B, 3> {
        let channels = self.values.dims()[1];
        let mut inside: Option<Tensor<B, 3>> = None;
        let mut flat = None;
        for ((position, &size), &stride) in index.iter().zip(self.spatial).zip(&self.strides) {
            let upper = size as f32 - 1.0;
            if !matches!(self.fill, FillValue::Nearest) {
                let valid = position.clone().greater_elem(-0.5).float() * position.clone().lower_elem(upper + 0.5).float();
                inside = Some(match inside {
                    Some(mask) => mask * valid,
                    None => valid,
                });
            }
            let offset = position.clone().clamp(0.0, upper).int().mul_scalar(stride as i64);
            flat = Some(match flat {
                Some(sum) => sum + offset,
                None => offset,
            });
        }
        let Some(flat) = flat else {
            return self.values.clone();
        };
        let gathered = self.values.clone().gather(2, flat.repeat_dim(1, channels));
        match (self.fill, inside) {
            (FillValue::Value(fill), Some(mask)) => {
                gathered * mask.clone() + fill.clone() * mask.neg().add_scalar(1.0)
            }
            (FillValue::Zero, Some(mask)) => gathered * mask,
            _ => gathered,
        }
    }
}
