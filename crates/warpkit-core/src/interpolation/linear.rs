//! Linear interpolation implementation.
//!
//! This module provides N-linear interpolation over the `2^ndim` corners of
//! the cell containing each sample, and its analytic derivative.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use super::fill::FillPolicy;
use super::trait_::{align, CornerReader, Interpolator};
use crate::error::Result;

/// Linear Interpolator.
///
/// Performs linear interpolation (bilinear for 2D, trilinear for 3D, and so
/// on for any dimensionality).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LinearInterpolator;

impl LinearInterpolator {
    /// Create a new linear interpolator.
    pub fn new() -> Self {
        Self
    }
}

/// Per-axis cell origin and fractional offset, `[batch, 1, samples]` each.
fn split_cells<B: Backend>(coords: &Tensor<B, 3>) -> (Vec<Tensor<B, 3>>, Vec<Tensor<B, 3>>) {
    (0..coords.dims()[1])
        .map(|axis| {
            let y = coords.clone().narrow(1, axis, 1);
            let base = y.clone().floor();
            let frac = y - base.clone();
            (base, frac)
        })
        .unzip()
}

fn corner_index<B: Backend>(base: &[Tensor<B, 3>], corner: usize) -> Vec<Tensor<B, 3>> {
    base.iter()
        .enumerate()
        .map(|(axis, b)| if corner >> axis & 1 == 1 { b.clone().add_scalar(1.0) } else { b.clone() })
        .collect()
}

/// Product of the per-axis weights of `corner`, leaving out `skip`.
fn corner_weight<B: Backend>(frac: &[Tensor<B, 3>], corner: usize, skip: Option<usize>) -> Tensor<B, 3> {
    let [batch, _, samples] = frac[0].dims();
    frac.iter()
        .enumerate()
        .filter(|(axis, _)| Some(*axis) != skip)
        .fold(Tensor::ones([batch, 1, samples], &frac[0].device()), |acc, (axis, f)| {
            let w = if corner >> axis & 1 == 1 { f.clone() } else { f.clone().neg().add_scalar(1.0) };
            acc * w
        })
}

impl<B: Backend> Interpolator<B> for LinearInterpolator {
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
        let reader = CornerReader::new(&values, spatial, &fill);
        let (base, frac) = split_cells(&coords);

        let mut output: Option<Tensor<B, 3>> = None;
        for corner in 0..(1usize << spatial.len()) {
            let term = reader.read(&corner_index(&base, corner)) * corner_weight(&frac, corner, None);
            output = Some(match output {
                Some(sum) => sum + term,
                None => term,
            });
        }
        Ok(output.unwrap_or(values))
    }

    fn derivative(
        &self,
        values: Tensor<B, 3>,
        spatial: &[usize],
        coords: Tensor<B, 3>,
        fill: FillPolicy,
    ) -> Result<Tensor<B, 3>> {
        let (values, coords) = align(values, spatial, coords)?;
        let fill = fill.resolve(&values, spatial);
        let reader = CornerReader::new(&values, spatial, &fill);
        let (base, frac) = split_cells(&coords);
        let corners: Vec<Tensor<B, 3>> = (0..(1usize << spatial.len()))
            .map(|corner| reader.read(&corner_index(&base, corner)))
            .collect();

        let per_axis: Vec<Tensor<B, 3>> = (0..spatial.len())
            .map(|axis| {
                corners
                    .iter()
                    .enumerate()
                    .map(|(corner, value)| {
                        let weight = corner_weight(&frac, corner, Some(axis));
                        let term = value.clone() * weight;
                        if corner >> axis & 1 == 1 {
                            term
                        } else {
                            term.neg()
                        }
                    })
                    .reduce(|a, b| a + b)
                    .unwrap_or_else(|| values.clone().zeros_like())
            })
            .collect();
        Ok(Tensor::cat(per_axis, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn image() -> Tensor<TestBackend, 3> {
        // 2x3 image holding 10 * row + col.
        Tensor::from_floats([[[0.0, 1.0, 2.0, 10.0, 11.0, 12.0]]], &Default::default())
    }

    #[test]
    fn test_linear_interpolation_2d() {
        let device = Default::default();
        let coords = Tensor::<TestBackend, 3>::from_floats([[[0.5, 1.0, 0.0], [1.5, 2.0, 0.25]]], &device);
        let out = LinearInterpolator::new()
            .interpolate(image(), &[2, 3], coords, FillPolicy::Zero)
            .unwrap()
            .into_data();
        let values = out.as_slice::<f32>().unwrap();
        assert!((values[0] - 6.5).abs() < 1e-5);
        assert!((values[1] - 12.0).abs() < 1e-5);
        assert!((values[2] - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_linear_fill_outside() {
        let device = Default::default();
        let coords = Tensor::<TestBackend, 3>::from_floats([[[-5.0, 9.0], [0.0, 1.0]]], &device);
        let zero = LinearInterpolator::new()
            .interpolate(image(), &[2, 3], coords.clone(), FillPolicy::Zero)
            .unwrap()
            .into_data();
        assert_eq!(zero.as_slice::<f32>().unwrap(), &[0.0, 0.0]);

        let nearest = LinearInterpolator::new()
            .interpolate(image(), &[2, 3], coords.clone(), FillPolicy::Nearest)
            .unwrap()
            .into_data();
        assert_eq!(nearest.as_slice::<f32>().unwrap(), &[0.0, 11.0]);

        let constant = LinearInterpolator::new()
            .interpolate(image(), &[2, 3], coords, FillPolicy::Constant(-1.0))
            .unwrap()
            .into_data();
        assert_eq!(constant.as_slice::<f32>().unwrap(), &[-1.0, -1.0]);
    }

    #[test]
    fn test_linear_derivative_of_ramp() {
        let device = Default::default();
        let coords = Tensor::<TestBackend, 3>::from_floats([[[0.5], [0.5]]], &device);
        let out = LinearInterpolator::new()
            .derivative(image(), &[2, 3], coords, FillPolicy::Zero)
            .unwrap();
        assert_eq!(out.dims(), [1, 2, 1]);
        let values = out.into_data();
        let values = values.as_slice::<f32>().unwrap();
        assert!((values[0] - 10.0).abs() < 1e-5);
        assert!((values[1] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_linear_batch_mismatch() {
        let device = Default::default();
        let values = Tensor::<TestBackend, 3>::zeros([2, 1, 6], &device);
        let coords = Tensor::<TestBackend, 3>::zeros([3, 2, 4], &device);
        assert!(LinearInterpolator::new()
            .interpolate(values, &[2, 3], coords, FillPolicy::Zero)
            .is_err());
    }
}
