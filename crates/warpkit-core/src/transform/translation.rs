//! Translation transform implementation.

use std::sync::Arc;

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

use super::matrix::{homogeneous, identity_matrix, orient};
use super::record::{ParamRecord, TransformRecord};
use super::trait_::{
    broadcast_batch, prepare_coordinates, resolve_ndim, Orientation, SharedTransform, Transform, TransformKind,
};
use crate::array::TaggedTensor;
use crate::error::{Result, TransformError};

/// Translates coordinates by a fixed offset per batch instance.
#[derive(Debug, Clone)]
pub struct Translation<B: Backend> {
    translation: Tensor<B, 2>,
    orientation: Orientation,
}

impl<B: Backend> Translation<B> {
    /// Create a new translation transform.
    ///
    /// # Arguments
    /// * `translation` - Tensor of shape `[batch, ndim]`
    pub fn new(translation: Tensor<B, 2>) -> Self {
        Self {
            translation,
            orientation: Orientation::TargetToSource,
        }
    }

    /// A single, unbatched offset.
    pub fn from_offsets(offsets: &[f32], device: &B::Device) -> Self {
        let data = TensorData::new(offsets.to_vec(), Shape::new([1, offsets.len()]));
        Self::new(Tensor::from_data(data, device))
    }

    /// Get the translation vectors `[batch, ndim]`.
    pub fn translation(&self) -> Tensor<B, 2> {
        self.translation.clone()
    }

    pub fn from_record(record: &TransformRecord, device: &B::Device) -> Result<Self> {
        let translation = record.param("translation")?.to_tensor::<B, 2>(device)?;
        Ok(Self {
            translation,
            orientation: record.orientation,
        })
    }
}

impl<B: Backend> Transform<B> for Translation<B> {
    fn kind(&self) -> TransformKind {
        TransformKind::Translation
    }

    fn ndim(&self) -> Option<usize> {
        Some(self.translation.dims()[1])
    }

    fn batch_size(&self) -> Option<usize> {
        Some(self.translation.dims()[0])
    }

    fn orientation(&self) -> Orientation {
        self.orientation
    }

    fn apply(&self, x: &TaggedTensor<B>) -> Result<TaggedTensor<B>> {
        let x = prepare_coordinates(x, self.ndim(), self.batch_size())?;
        let t = broadcast_batch(self.translation.clone(), x.batch_size())?;
        x.with_data(x.tensor() + t.unsqueeze_dim::<3>(2))
    }

    fn affine_matrix(&self, ndim: Option<usize>, device: &B::Device) -> Result<Option<Tensor<B, 3>>> {
        let [batch, n] = self.translation.dims();
        resolve_ndim(Some(n), ndim)?;
        let linear = identity_matrix::<B>(batch, n, device).narrow(1, 0, n).narrow(2, 0, n);
        let matrix = homogeneous(linear, self.translation.clone().to_device(device));
        orient(matrix, self.orientation).map(Some)
    }

    fn inverse(&self) -> Result<Option<SharedTransform<B>>> {
        Ok(Some(Arc::new(Self {
            translation: self.translation.clone().neg(),
            orientation: self.orientation,
        })))
    }

    fn reoriented(&self, orientation: Orientation) -> SharedTransform<B> {
        Arc::new(Self {
            translation: self.translation.clone(),
            orientation,
        })
    }

    fn record(&self) -> Result<TransformRecord> {
        Ok(
            TransformRecord::new(TransformKind::Translation, self.ndim(), self.batch_size(), self.orientation)
                .with_param(ParamRecord::from_tensor("translation", &self.translation)?),
        )
    }
}

/// Reject a parameter tensor whose trailing axis does not hold `ndim`
/// values.
pub(crate) fn check_columns<B: Backend>(name: &str, tensor: &Tensor<B, 2>, expected: usize) -> Result<()> {
    let [batch, columns] = tensor.dims();
    if columns != expected {
        return Err(TransformError::shape(format!("{}: [batch, {}]", name, expected), &[batch, columns]));
    }
    Ok(())
}
