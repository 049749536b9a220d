//! Rescale transform implementation.
//!
//! Multiplies coordinates by a uniform or per-axis factor. With
//! `resize_image` the transform also announces that a resampled image
//! changes size by `1 / scale`, so that the whole field of view survives.

use std::sync::Arc;

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

use super::matrix::{homogeneous, orient};
use super::record::{ParamRecord, TransformRecord};
use super::trait_::{
    broadcast_batch, prepare_coordinates, resolve_ndim, Orientation, SharedTransform, Transform, TransformKind,
};
use crate::array::TaggedTensor;
use crate::error::{Result, TransformError};
use crate::reshape::ReshapeDescriptor;

/// Scale Transform.
///
/// `scale` is `[batch, 1]` for a uniform factor, which fits any
/// dimensionality, or `[batch, ndim]` for one factor per axis.
#[derive(Debug, Clone)]
pub struct Rescale<B: Backend> {
    scale: Tensor<B, 2>,
    resize_image: bool,
    reshape: ReshapeDescriptor,
    orientation: Orientation,
}

impl<B: Backend> Rescale<B> {
    /// Create a new rescale transform.
    ///
    /// # Errors
    /// `InvalidParameter` for a zero factor, or when `resize_image` is set
    /// and the batch instances disagree (an image can only take one size).
    pub fn new(scale: Tensor<B, 2>, resize_image: bool) -> Result<Self> {
        let reshape = reshape_for(&scale, resize_image)?;
        Ok(Self {
            scale,
            resize_image,
            reshape,
            orientation: Orientation::TargetToSource,
        })
    }

    /// The same factor along every axis.
    pub fn uniform(factor: f32, device: &B::Device) -> Result<Self> {
        Self::per_axis(&[factor], device)
    }

    /// One factor per axis.
    pub fn per_axis(factors: &[f32], device: &B::Device) -> Result<Self> {
        let data = TensorData::new(factors.to_vec(), Shape::new([1, factors.len()]));
        Self::new(Tensor::from_data(data, device), true)
    }

    pub fn scale(&self) -> Tensor<B, 2> {
        self.scale.clone()
    }

    pub fn resize_image(&self) -> bool {
        self.resize_image
    }

    fn is_uniform(&self) -> bool {
        self.scale.dims()[1] == 1
    }

    pub fn from_record(record: &TransformRecord, device: &B::Device) -> Result<Self> {
        let scale = record.param("scale")?.to_tensor::<B, 2>(device)?;
        let mut rescale = Self::new(scale, record.flag("resize_image"))?;
        rescale.orientation = record.orientation;
        Ok(rescale)
    }
}

/// Shape change implied by the factors: `1 / scale` per axis.
fn reshape_for<B: Backend>(scale: &Tensor<B, 2>, resize_image: bool) -> Result<ReshapeDescriptor> {
    let [batch, columns] = scale.dims();
    let values = scale
        .clone()
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| TransformError::data(format!("{:?}", e)))?;
    if values.iter().any(|&v| v == 0.0 || !v.is_finite()) {
        return Err(TransformError::invalid("rescale factors must be finite and non-zero"));
    }
    if !resize_image {
        return Ok(ReshapeDescriptor::identity());
    }
    let first = &values[..columns];
    if (1..batch).any(|b| &values[b * columns..(b + 1) * columns] != first) {
        return Err(TransformError::invalid(
            "resize_image needs the same factors for every batch instance",
        ));
    }
    let inverse: Vec<f64> = first.iter().map(|&v| 1.0 / v as f64).collect();
    Ok(if columns == 1 {
        ReshapeDescriptor::uniform(inverse[0])
    } else {
        ReshapeDescriptor::per_axis(inverse)
    })
}

impl<B: Backend> Transform<B> for Rescale<B> {
    fn kind(&self) -> TransformKind {
        TransformKind::Rescale
    }

    fn ndim(&self) -> Option<usize> {
        if self.is_uniform() {
            None
        } else {
            Some(self.scale.dims()[1])
        }
    }

    fn batch_size(&self) -> Option<usize> {
        Some(self.scale.dims()[0])
    }

    fn orientation(&self) -> Orientation {
        self.orientation
    }

    fn reshape(&self) -> ReshapeDescriptor {
        self.reshape.clone()
    }

    fn apply(&self, x: &TaggedTensor<B>) -> Result<TaggedTensor<B>> {
        let x = prepare_coordinates(x, self.ndim(), self.batch_size())?;
        let s = broadcast_batch(self.scale.clone(), x.batch_size())?;
        x.with_data(x.tensor() * s.unsqueeze_dim::<3>(2))
    }

    fn affine_matrix(&self, ndim: Option<usize>, device: &B::Device) -> Result<Option<Tensor<B, 3>>> {
        let Some(n) = resolve_ndim(self.ndim(), ndim)? else {
            return Ok(None);
        };
        let [batch, _] = self.scale.dims();
        let scale = self.scale.clone().to_device(device);
        let factors = if self.is_uniform() { scale.repeat_dim(1, n) } else { scale };
        let eye = Tensor::<B, 2>::eye(n, device).unsqueeze_dim::<3>(0).repeat_dim(0, batch);
        let linear = eye * factors.unsqueeze_dim::<3>(1);
        let matrix = homogeneous(linear, Tensor::zeros([batch, n], device));
        orient(matrix, self.orientation).map(Some)
    }

    fn inverse(&self) -> Result<Option<SharedTransform<B>>> {
        let mut inverse = Self::new(self.scale.clone().recip(), self.resize_image)?;
        inverse.orientation = self.orientation;
        Ok(Some(Arc::new(inverse)))
    }

    fn reoriented(&self, orientation: Orientation) -> SharedTransform<B> {
        Arc::new(Self {
            orientation,
            ..self.clone()
        })
    }

    fn record(&self) -> Result<TransformRecord> {
        Ok(
            TransformRecord::new(TransformKind::Rescale, self.ndim(), self.batch_size(), self.orientation)
                .with_param(ParamRecord::from_tensor("scale", &self.scale)?)
                .with_param(ParamRecord::scalars("resize_image", vec![self.resize_image as u8 as f32]))
                .with_reshape(self.reshape.clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::coordinate_grid;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_uniform_rescale_any_ndim() {
        let device = Default::default();
        let rescale = Rescale::<TestBackend>::uniform(2.0, &device).unwrap();
        assert_eq!(rescale.ndim(), None);

        let grid = coordinate_grid::<TestBackend>(&[2, 2, 2], &device);
        let out = rescale.apply(&grid).unwrap();
        let expected: Vec<f32> = grid.to_vec().unwrap().iter().map(|v| v * 2.0).collect();
        assert_eq!(out.to_vec().unwrap(), expected);
        assert_eq!(rescale.reshape().apply(&[8, 6, 4]).unwrap(), vec![4, 3, 2]);
    }

    #[test]
    fn test_per_axis_matrix() {
        let device = Default::default();
        let rescale = Rescale::<TestBackend>::per_axis(&[2.0, 0.5], &device).unwrap();
        let m = rescale.affine_matrix(None, &device).unwrap().unwrap().into_data();
        assert_eq!(m.as_slice::<f32>().unwrap(), &[2.0, 0.0, 0.0, 0.0, 0.5, 0.0, 0.0, 0.0, 1.0]);
        assert_eq!(rescale.reshape().apply(&[4, 4]).unwrap(), vec![2, 8]);
    }

    #[test]
    fn test_rescale_without_resize() {
        let device = Default::default();
        let scale = Tensor::<TestBackend, 2>::from_floats([[2.0], [4.0]], &device);
        let rescale = Rescale::new(scale, false).unwrap();
        assert!(rescale.reshape().is_identity());
    }

    #[test]
    fn test_rescale_rejects_invalid_factors() {
        let device = Default::default();
        assert!(matches!(
            Rescale::<TestBackend>::uniform(0.0, &device),
            Err(TransformError::InvalidParameter(_))
        ));
        let scale = Tensor::<TestBackend, 2>::from_floats([[2.0], [4.0]], &device);
        assert!(matches!(Rescale::new(scale, true), Err(TransformError::InvalidParameter(_))));
    }

    #[test]
    fn test_rescale_inverse() {
        let device = Default::default();
        let rescale = Rescale::<TestBackend>::per_axis(&[2.0, 4.0], &device).unwrap();
        let inverse = rescale.inverse().unwrap().unwrap();
        let grid = coordinate_grid::<TestBackend>(&[3, 3], &device);
        let back = inverse.apply(&rescale.apply(&grid).unwrap()).unwrap();
        assert_eq!(back.to_vec().unwrap(), grid.to_vec().unwrap());
        assert_eq!(inverse.reshape().apply(&[2, 2]).unwrap(), vec![4, 8]);
    }
}
