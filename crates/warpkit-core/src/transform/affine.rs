//! Affine transform implementation.
//!
//! This module provides a batched affine transform held as homogeneous
//! matrices, plus the helpers shared with the other matrix-backed
//! transforms.

use std::sync::Arc;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::matrix::{
    affine_2d_matrix, apply_matrix, homogeneous, invert, orient, quaternion_matrix, stretch_translation,
};
use super::record::{ParamRecord, TransformRecord};
use super::trait_::{
    broadcast_batch, prepare_coordinates, resolve_ndim, Orientation, SharedTransform, Transform, TransformKind,
};
use crate::array::TaggedTensor;
use crate::error::{Result, TransformError};

/// Affine Transform (Linear transformation + Translation).
///
/// Holds `[batch, ndim + 1, ndim + 1]` homogeneous matrices and maps
/// `x -> A x + t`.
#[derive(Debug, Clone)]
pub struct Affine<B: Backend> {
    matrix: Tensor<B, 3>,
    orientation: Orientation,
}

impl<B: Backend> Affine<B> {
    /// Create a new affine transform.
    ///
    /// # Arguments
    /// * `matrix` - Tensor of shape `[batch, ndim + 1, ndim + 1]`
    pub fn new(matrix: Tensor<B, 3>) -> Result<Self> {
        check_homogeneous(&matrix)?;
        Ok(Self {
            matrix,
            orientation: Orientation::TargetToSource,
        })
    }

    /// Build from a linear part `[batch, ndim, ndim]` and a translation
    /// `[batch, ndim]`.
    pub fn from_parts(linear: Tensor<B, 3>, translation: Tensor<B, 2>) -> Result<Self> {
        let [batch, rows, cols] = linear.dims();
        let [t_batch, t_len] = translation.dims();
        if rows != cols || t_len != rows || t_batch != batch {
            return Err(TransformError::shape(
                format!("linear [{}, n, n] with translation [{}, n]", batch, batch),
                &[batch, rows, cols, t_batch, t_len],
            ));
        }
        Self::new(homogeneous(linear, translation))
    }

    /// 2-D affine from `(t1, t2, theta, s1, s2, rho1, rho2)` parameters,
    /// optionally with a centre; see [`affine_2d_matrix`].
    pub fn from_2d_params(params: Tensor<B, 2>) -> Result<Self> {
        Self::new(affine_2d_matrix(params)?)
    }

    /// 3-D rigid motion from quaternion parameters; see
    /// [`quaternion_matrix`].
    pub fn from_quaternion(params: Tensor<B, 2>) -> Result<Self> {
        Self::new(quaternion_matrix(params)?)
    }

    /// Multiply the translation column by `factor`, so an optimizer sees
    /// translations on the scale of the linear block.
    pub fn with_translation_stretch(mut self, factor: f32) -> Self {
        self.matrix = stretch_translation(self.matrix, factor);
        self
    }

    /// The homogeneous matrices as constructed.
    pub fn matrix(&self) -> Tensor<B, 3> {
        self.matrix.clone()
    }

    pub fn from_record(record: &TransformRecord, device: &B::Device) -> Result<Self> {
        let mut affine = Self::new(record.param("matrix")?.to_tensor::<B, 3>(device)?)?;
        affine.orientation = record.orientation;
        Ok(affine)
    }
}

/// Require square `[batch, n + 1, n + 1]` matrices with `n >= 1`.
pub(crate) fn check_homogeneous<B: Backend>(matrix: &Tensor<B, 3>) -> Result<()> {
    let [batch, rows, cols] = matrix.dims();
    if rows != cols || rows < 2 {
        return Err(TransformError::shape("[batch, ndim + 1, ndim + 1]", &[batch, rows, cols]));
    }
    Ok(())
}

/// Apply homogeneous matrices to a coordinate array, broadcasting batches.
pub(crate) fn apply_homogeneous<B: Backend>(matrix: &Tensor<B, 3>, x: &TaggedTensor<B>) -> Result<TaggedTensor<B>> {
    let [batch, size, _] = matrix.dims();
    let x = prepare_coordinates(x, Some(size - 1), Some(batch))?;
    let matrix = broadcast_batch(matrix.clone().to_device(&x.device()), x.batch_size())?;
    x.with_data(apply_matrix(matrix, x.tensor()))
}

impl<B: Backend> Transform<B> for Affine<B> {
    fn kind(&self) -> TransformKind {
        TransformKind::Affine
    }

    fn ndim(&self) -> Option<usize> {
        Some(self.matrix.dims()[1] - 1)
    }

    fn batch_size(&self) -> Option<usize> {
        Some(self.matrix.dims()[0])
    }

    fn orientation(&self) -> Orientation {
        self.orientation
    }

    fn apply(&self, x: &TaggedTensor<B>) -> Result<TaggedTensor<B>> {
        apply_homogeneous(&self.matrix, x)
    }

    fn affine_matrix(&self, ndim: Option<usize>, device: &B::Device) -> Result<Option<Tensor<B, 3>>> {
        resolve_ndim(Transform::<B>::ndim(self), ndim)?;
        orient(self.matrix.clone().to_device(device), self.orientation).map(Some)
    }

    fn inverse(&self) -> Result<Option<SharedTransform<B>>> {
        Ok(Some(Arc::new(Self {
            matrix: invert(self.matrix.clone())?,
            orientation: self.orientation,
        })))
    }

    fn reoriented(&self, orientation: Orientation) -> SharedTransform<B> {
        Arc::new(Self {
            matrix: self.matrix.clone(),
            orientation,
        })
    }

    fn record(&self) -> Result<TransformRecord> {
        Ok(TransformRecord::new(
            TransformKind::Affine,
            Transform::<B>::ndim(self),
            Transform::<B>::batch_size(self),
            self.orientation,
        )
        .with_param(ParamRecord::from_tensor("matrix", &self.matrix)?))
    }
}
