//! Displacement field transform implementation.
//!
//! This module provides a dense displacement field transform where each
//! voxel of a grid has its own displacement vector.

use std::sync::Arc;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::record::{ParamRecord, TransformRecord};
use super::trait_::{broadcast_batch, prepare_coordinates, Orientation, SharedTransform, Transform, TransformKind};
use crate::array::TaggedTensor;
use crate::error::{Result, TransformError};
use crate::interpolation::{sample, FillPolicy, InterpolationMethod};

/// Dense displacement field transform.
///
/// Maps `x -> x + u(x)`. On the field's own grid `u` is read directly;
/// anywhere else it is interpolated linearly with [`FillPolicy::Nearest`].
///
/// Points beyond the grid therefore take the displacement of the closest
/// boundary voxel rather than zero, so a field never tears at its edge.
/// Inverses fitted by `warpkit-inverse` assume the same fill.
///
/// # Type Parameters
/// * `B` - The Burn backend
#[derive(Debug, Clone)]
pub struct DenseDisplacementField<B: Backend> {
    /// Displacements `[batch, ndim, voxels]`
    displacement: Tensor<B, 3>,
    /// Spatial shape of the grid the displacements live on
    grid: Vec<usize>,
    orientation: Orientation,
}

impl<B: Backend> DenseDisplacementField<B> {
    /// Create a displacement field from an array with a channel axis of one
    /// displacement component per spatial axis.
    pub fn new(field: TaggedTensor<B>) -> Result<Self> {
        if !field.has_channel() {
            return Err(TransformError::shape("[batch?, ndim, spatial...] displacement field", &field.shape()));
        }
        Self::from_tensor(field.tensor(), field.spatial_shape().to_vec())
    }

    /// Create a displacement field from `[batch, ndim, voxels]` storage.
    ///
    /// # Arguments
    /// * `displacement` - Displacements, `ndim` equal to `grid.len()`
    /// * `grid` - Spatial shape `[S0, S1, ...]`
    pub fn from_tensor(displacement: Tensor<B, 3>, grid: Vec<usize>) -> Result<Self> {
        let [batch, ndim, voxels] = displacement.dims();
        if ndim != grid.len() || voxels != grid.iter().product::<usize>() {
            return Err(TransformError::shape(
                format!("[batch, {}, {}]", grid.len(), grid.iter().product::<usize>()),
                &[batch, ndim, voxels],
            ));
        }
        Ok(Self {
            displacement,
            grid,
            orientation: Orientation::TargetToSource,
        })
    }

    /// Create a zero displacement field for the given spatial shape.
    pub fn zeros(grid: &[usize], device: &B::Device) -> Self {
        let voxels = grid.iter().product::<usize>();
        Self {
            displacement: Tensor::zeros([1, grid.len(), voxels], device),
            grid: grid.to_vec(),
            orientation: Orientation::TargetToSource,
        }
    }

    /// Sample any transform's displacement on a grid.
    pub fn from_transform(transform: &dyn Transform<B>, grid: &[usize], device: &B::Device) -> Result<Self> {
        let mut field = Self::new(transform.displacement_field(grid, device)?)?;
        field.orientation = transform.orientation();
        Ok(field)
    }

    /// The same field with another orientation label.
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Get the displacement field `[batch, ndim, voxels]`.
    pub fn displacement(&self) -> Tensor<B, 3> {
        self.displacement.clone()
    }

    pub fn grid(&self) -> &[usize] {
        &self.grid
    }

    pub fn from_record(record: &TransformRecord, device: &B::Device) -> Result<Self> {
        let displacement = record.param("displacement")?.to_tensor::<B, 3>(device)?;
        let grid = record.param("grid")?.to_indices();
        let mut field = Self::from_tensor(displacement, grid)?;
        field.orientation = record.orientation;
        Ok(field)
    }
}

impl<B: Backend> Transform<B> for DenseDisplacementField<B> {
    fn kind(&self) -> TransformKind {
        TransformKind::DenseDisplacementField
    }

    fn ndim(&self) -> Option<usize> {
        Some(self.grid.len())
    }

    fn batch_size(&self) -> Option<usize> {
        Some(self.displacement.dims()[0])
    }

    fn orientation(&self) -> Orientation {
        self.orientation
    }

    fn apply(&self, x: &TaggedTensor<B>) -> Result<TaggedTensor<B>> {
        let x = prepare_coordinates(x, self.ndim(), self.batch_size())?;
        let offsets = if x.spatial_shape() == self.grid.as_slice() {
            broadcast_batch(self.displacement.clone(), x.batch_size())?
        } else {
            sample(
                self.displacement.clone(),
                &self.grid,
                x.tensor(),
                InterpolationMethod::Linear,
                FillPolicy::Nearest,
            )?
        };
        x.with_data(x.tensor() + offsets)
    }

    fn reoriented(&self, orientation: Orientation) -> SharedTransform<B> {
        Arc::new(Self {
            orientation,
            ..self.clone()
        })
    }

    fn record(&self) -> Result<TransformRecord> {
        Ok(TransformRecord::new(
            TransformKind::DenseDisplacementField,
            self.ndim(),
            self.batch_size(),
            self.orientation,
        )
        .with_param(ParamRecord::from_tensor("displacement", &self.displacement)?)
        .with_param(ParamRecord::indices("grid", &self.grid)))
    }
}
