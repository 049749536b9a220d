use std::sync::Arc;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::matrix::identity_matrix;
use super::record::TransformRecord;
use super::trait_::{prepare_coordinates, Orientation, SharedTransform, Transform, TransformKind};
use crate::array::TaggedTensor;
use crate::error::Result;

/// Leaves coordinates unchanged. Works for any dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    orientation: Orientation,
}

impl Identity {
    pub fn new() -> Self {
        Self {
            orientation: Orientation::TargetToSource,
        }
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Transform<B> for Identity {
    fn kind(&self) -> TransformKind {
        TransformKind::Identity
    }

    fn ndim(&self) -> Option<usize> {
        None
    }

    fn batch_size(&self) -> Option<usize> {
        None
    }

    fn orientation(&self) -> Orientation {
        self.orientation
    }

    fn apply(&self, x: &TaggedTensor<B>) -> Result<TaggedTensor<B>> {
        prepare_coordinates(x, None, None)
    }

    fn affine_matrix(&self, ndim: Option<usize>, device: &B::Device) -> Result<Option<Tensor<B, 3>>> {
        // Without a dimensionality there is no matrix size to pick
        Ok(ndim.map(|n| identity_matrix::<B>(1, n, device)))
    }

    fn inverse(&self) -> Result<Option<SharedTransform<B>>> {
        Ok(Some(Arc::new(*self)))
    }

    fn reoriented(&self, orientation: Orientation) -> SharedTransform<B> {
        Arc::new(Self { orientation })
    }

    fn record(&self) -> Result<TransformRecord> {
        Ok(TransformRecord::new(TransformKind::Identity, None, None, self.orientation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::coordinate_grid;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_identity_keeps_coordinates() {
        let device = Default::default();
        let grid = coordinate_grid::<TestBackend>(&[3, 4], &device);
        let out = Transform::<TestBackend>::apply(&Identity::new(), &grid).unwrap();
        assert_eq!(out.shape(), vec![1, 2, 3, 4]);
        assert_eq!(out.to_vec().unwrap(), grid.to_vec().unwrap());
    }

    #[test]
    fn test_identity_matrix_needs_ndim() {
        let device = Default::default();
        let identity = Identity::new();
        assert!(Transform::<TestBackend>::affine_matrix(&identity, None, &device).unwrap().is_none());
        let m = Transform::<TestBackend>::affine_matrix(&identity, Some(2), &device).unwrap().unwrap();
        assert_eq!(m.dims(), [1, 3, 3]);
    }
}
