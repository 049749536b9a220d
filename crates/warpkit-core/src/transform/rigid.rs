//! Rigid transform implementation.
//!
//! Rotation about a centre followed by a translation:
//! `T(x) = R (x - c) + c + t`. Rotations come from an angle in 2-D, from an
//! axis and an angle in 3-D (Rodrigues' formula), or from an orthonormal
//! matrix in any dimension.

use std::sync::Arc;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::affine::{apply_homogeneous, check_homogeneous};
use super::matrix::{homogeneous, invert, orient, stretch_translation, to_host};
use super::record::{ParamRecord, TransformRecord};
use super::trait_::{resolve_ndim, Orientation, SharedTransform, Transform, TransformKind};
use super::translation::check_columns;
use crate::array::TaggedTensor;
use crate::error::{Result, TransformError};

const ORTHONORMAL_TOLERANCE: f64 = 1e-4;

/// Rigid Transform (Rotation + Translation).
#[derive(Debug, Clone)]
pub struct Rigid<B: Backend> {
    matrix: Tensor<B, 3>,
    orientation: Orientation,
}

impl<B: Backend> Rigid<B> {
    /// 2-D rigid transform.
    ///
    /// # Arguments
    /// * `angle` - Tensor of shape `[batch]`, radians
    /// * `translation` - Tensor of shape `[batch, 2]`
    /// * `center` - Optional tensor of shape `[batch, 2]`; the origin if `None`
    pub fn from_angle(angle: Tensor<B, 1>, translation: Tensor<B, 2>, center: Option<Tensor<B, 2>>) -> Result<Self> {
        check_columns("translation", &translation, 2)?;
        let [batch] = angle.dims();
        let theta = angle.reshape([batch, 1]);
        let (cos, sin) = (theta.clone().cos(), theta.sin());
        let rotation = Tensor::cat(vec![cos.clone(), sin.clone(), sin.neg(), cos], 1).reshape([batch, 2, 2]);
        Self::assemble(rotation, translation, center)
    }

    /// 3-D rigid transform from an axis and an angle.
    ///
    /// # Arguments
    /// * `axis` - Tensor of shape `[batch, 3]`, normalised here
    /// * `angle` - Tensor of shape `[batch]`, radians
    /// * `translation` - Tensor of shape `[batch, 3]`
    /// * `center` - Optional tensor of shape `[batch, 3]`
    pub fn from_axis_angle(
        axis: Tensor<B, 2>,
        angle: Tensor<B, 1>,
        translation: Tensor<B, 2>,
        center: Option<Tensor<B, 2>>,
    ) -> Result<Self> {
        check_columns("axis", &axis, 3)?;
        check_columns("translation", &translation, 3)?;
        let [batch, _] = axis.dims();
        let device = axis.device();
        let norm = (axis.clone() * axis.clone()).sum_dim(1).sqrt().clamp_min(1e-12);
        let k = axis / norm;
        let component = |i: usize| k.clone().narrow(1, i, 1);
        let (kx, ky, kz) = (component(0), component(1), component(2));
        let zero = Tensor::<B, 2>::zeros([batch, 1], &device);
        let skew = Tensor::cat(
            vec![
                zero.clone(),
                kz.clone().neg(),
                ky.clone(),
                kz,
                zero.clone(),
                kx.clone().neg(),
                ky.neg(),
                kx,
                zero,
            ],
            1,
        )
        .reshape([batch, 3, 3]);

        let theta = angle.reshape([batch, 1, 1]);
        let eye = Tensor::<B, 2>::eye(3, &device).unsqueeze_dim::<3>(0).repeat_dim(0, batch);
        let rotation = eye
            + skew.clone() * theta.clone().sin()
            + skew.clone().matmul(skew) * theta.cos().neg().add_scalar(1.0);
        Self::assemble(rotation, translation, center)
    }

    /// Wrap homogeneous matrices whose linear block is orthonormal.
    pub fn from_matrix(matrix: Tensor<B, 3>) -> Result<Self> {
        check_homogeneous(&matrix)?;
        for (b, m) in to_host(matrix.clone())?.iter().enumerate() {
            let n = m.nrows() - 1;
            let linear = m.view((0, 0), (n, n));
            let gram = linear.transpose() * linear;
            let deviation = (gram - nalgebra::DMatrix::<f64>::identity(n, n)).abs().max();
            if deviation > ORTHONORMAL_TOLERANCE {
                return Err(TransformError::invalid(format!(
                    "batch {} is not a rigid matrix (orthonormality error {:e})",
                    b, deviation
                )));
            }
        }
        Ok(Self {
            matrix,
            orientation: Orientation::TargetToSource,
        })
    }

    fn assemble(rotation: Tensor<B, 3>, translation: Tensor<B, 2>, center: Option<Tensor<B, 2>>) -> Result<Self> {
        let [batch, n, _] = rotation.dims();
        let offset = match center {
            Some(center) => {
                check_columns("center", &center, n)?;
                let rotated = rotation.clone().matmul(center.clone().unsqueeze_dim::<3>(2)).reshape([batch, n]);
                translation + center - rotated
            }
            None => translation,
        };
        Ok(Self {
            matrix: homogeneous(rotation, offset),
            orientation: Orientation::TargetToSource,
        })
    }

    pub fn matrix(&self) -> Tensor<B, 3> {
        self.matrix.clone()
    }

    /// Multiply the translation column by `factor`; the rotation is kept.
    pub fn with_translation_stretch(mut self, factor: f32) -> Self {
        self.matrix = stretch_translation(self.matrix, factor);
        self
    }

    pub fn from_record(record: &TransformRecord, device: &B::Device) -> Result<Self> {
        let mut rigid = Self::from_matrix(record.param("matrix")?.to_tensor::<B, 3>(device)?)?;
        rigid.orientation = record.orientation;
        Ok(rigid)
    }
}

impl<B: Backend> Transform<B> for Rigid<B> {
    fn kind(&self) -> TransformKind {
        TransformKind::Rigid
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
        let mut inverse = Self::from_matrix(invert(self.matrix.clone())?)?;
        inverse.orientation = self.orientation;
        Ok(Some(Arc::new(inverse)))
    }

    fn reoriented(&self, orientation: Orientation) -> SharedTransform<B> {
        Arc::new(Self {
            matrix: self.matrix.clone(),
            orientation,
        })
    }

    fn record(&self) -> Result<TransformRecord> {
        Ok(TransformRecord::new(
            TransformKind::Rigid,
            Transform::<B>::ndim(self),
            Transform::<B>::batch_size(self),
            self.orientation,
        )
        .with_param(ParamRecord::from_tensor("matrix", &self.matrix)?))
    }
}
