//! Orientation-flipped view of a transform.

use std::sync::Arc;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::matrix::invert;
use super::record::TransformRecord;
use super::trait_::{Orientation, SharedTransform, Transform, TransformKind};
use crate::array::TaggedTensor;
use crate::error::Result;
use crate::reshape::ReshapeDescriptor;

/// Presents a transform as if it mapped the other way.
///
/// The view applies the inner transform unchanged and only reports the
/// opposite orientation. Using a transform this way in place of its
/// inverse is an approximation that only holds for near-identity maps.
#[derive(Debug, Clone)]
pub struct OrientationFlippedView<B: Backend> {
    inner: SharedTransform<B>,
}

impl<B: Backend> OrientationFlippedView<B> {
    pub fn new(inner: SharedTransform<B>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &SharedTransform<B> {
        &self.inner
    }
}

impl<B: Backend> Transform<B> for OrientationFlippedView<B> {
    fn kind(&self) -> TransformKind {
        TransformKind::OrientationFlipped
    }

    fn ndim(&self) -> Option<usize> {
        self.inner.ndim()
    }

    fn batch_size(&self) -> Option<usize> {
        self.inner.batch_size()
    }

    fn orientation(&self) -> Orientation {
        self.inner.orientation().flipped()
    }

    fn reshape(&self) -> ReshapeDescriptor {
        self.inner.reshape()
    }

    fn is_coordinate(&self) -> bool {
        self.inner.is_coordinate()
    }

    fn apply(&self, x: &TaggedTensor<B>) -> Result<TaggedTensor<B>> {
        self.inner.apply(x)
    }

    fn affine_matrix(&self, ndim: Option<usize>, device: &B::Device) -> Result<Option<Tensor<B, 3>>> {
        // Same mapping, opposite orientation: the inner matrix inverted.
        self.inner.affine_matrix(ndim, device)?.map(invert).transpose()
    }

    fn inverse(&self) -> Result<Option<SharedTransform<B>>> {
        Ok(self
            .inner
            .inverse()?
            .map(|inverse| Arc::new(Self::new(inverse)) as SharedTransform<B>))
    }

    fn reoriented(&self, orientation: Orientation) -> SharedTransform<B> {
        if orientation == self.inner.orientation() {
            self.inner.clone()
        } else {
            Arc::new(self.clone())
        }
    }

    fn record(&self) -> Result<TransformRecord> {
        Ok(TransformRecord::new(
            TransformKind::OrientationFlipped,
            self.ndim(),
            self.batch_size(),
            self.orientation(),
        )
        .with_child(self.inner.record()?))
    }
}
