//! Transform trait for coordinate and image transformations.
//!
//! This module defines the contract every transform implements, the
//! orientation and kind tags it carries, and the seam through which a
//! numerical inverse can be plugged in.

use std::fmt;
use std::sync::Arc;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use super::composed::ComposedTransform;
use super::record::TransformRecord;
use crate::array::{coordinate_grid, TaggedTensor};
use crate::error::{Result, TransformError};
use crate::reshape::ReshapeDescriptor;

/// Shared handle to a transform. Compositions hold these and never copy the
/// transforms themselves.
pub type SharedTransform<B> = Arc<dyn Transform<B>>;

/// Which way a transform maps coordinates.
///
/// Resampling gathers values, so it needs `TargetToSource` transforms: for a
/// target voxel they give the source coordinate to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    SourceToTarget,
    TargetToSource,
}

impl Orientation {
    pub fn flipped(self) -> Self {
        match self {
            Orientation::SourceToTarget => Orientation::TargetToSource,
            Orientation::TargetToSource => Orientation::SourceToTarget,
        }
    }

    pub fn is_target_to_source(self) -> bool {
        matches!(self, Orientation::TargetToSource)
    }
}

/// How a composition interprets its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvaluationMode {
    /// The input holds coordinates along its channel axis.
    Coordinate,
    /// The input is sampled image content.
    Image,
}

/// Structural kind of a transform, used to rebuild it from a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransformKind {
    Identity,
    Translation,
    Rescale,
    Reflection,
    Permutation,
    Rotation90,
    Rotation180,
    Rotation270,
    Rigid,
    Affine,
    PolyAffine,
    LocallyAffine,
    FreeFormDeformation,
    DenseDisplacementField,
    Normalize,
    OrientationFlipped,
    Composed,
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Transform trait.
///
/// Coordinate transforms map arrays whose channel axis holds one coordinate
/// per spatial dimension; image transforms act on sampled content. Every
/// implementation validates axis roles, inserts a missing batch axis and
/// broadcasts batch sizes of 1.
///
/// # Type Parameters
/// * `B` - The Burn backend
pub trait Transform<B: Backend>: fmt::Debug {
    fn kind(&self) -> TransformKind;

    /// Spatial dimensionality, when fixed by the parameters.
    fn ndim(&self) -> Option<usize>;

    /// Number of parameter instances, when fixed by the parameters.
    fn batch_size(&self) -> Option<usize>;

    fn orientation(&self) -> Orientation;

    /// How the transform changes an image's shape.
    fn reshape(&self) -> ReshapeDescriptor {
        ReshapeDescriptor::identity()
    }

    /// True for coordinate transforms, false for intensity transforms.
    fn is_coordinate(&self) -> bool {
        true
    }

    /// Apply the transform.
    ///
    /// # Arguments
    /// * `x` - Coordinates `[batch?, ndim, spatial...]` for coordinate
    ///   transforms, an image for image transforms
    fn apply(&self, x: &TaggedTensor<B>) -> Result<TaggedTensor<B>>;

    /// Homogeneous `[batch, ndim + 1, ndim + 1]` matrix of a linear
    /// transform on `device`, oriented like the transform itself. `Ok(None)`
    /// for non-linear transforms.
    fn affine_matrix(&self, _ndim: Option<usize>, _device: &B::Device) -> Result<Option<Tensor<B, 3>>> {
        Ok(None)
    }

    /// Closed-form inverse. `Ok(None)` when none exists; a singular linear
    /// map is an error.
    fn inverse(&self) -> Result<Option<SharedTransform<B>>> {
        Ok(None)
    }

    /// The same transform with another orientation.
    fn reoriented(&self, orientation: Orientation) -> SharedTransform<B>;

    /// Structural decomposition for external serializers.
    fn record(&self) -> Result<TransformRecord>;

    fn as_composed(&self) -> Option<&ComposedTransform<B>> {
        None
    }

    /// Displacement `apply(grid) - grid` over a grid of the given shape.
    fn displacement_field(&self, shape: &[usize], device: &B::Device) -> Result<TaggedTensor<B>> {
        let grid = coordinate_grid::<B>(shape, device);
        let mapped = self.apply(&grid)?;
        let offsets = mapped.tensor() - grid.tensor();
        mapped.with_data(offsets)
    }
}

/// Produces an approximate inverse of a transform that has no closed form.
pub trait InverseSolver<B: Backend>: fmt::Debug {
    /// Approximate the inverse of `transform` on a grid of shape `grid`.
    fn solve(&self, transform: &dyn Transform<B>, grid: &[usize], device: &B::Device) -> Result<SharedTransform<B>>;
}

/// Check a requested dimensionality against the transform's own.
pub(crate) fn resolve_ndim(own: Option<usize>, requested: Option<usize>) -> Result<Option<usize>> {
    match (own, requested) {
        (Some(own), Some(requested)) if own != requested => {
            Err(TransformError::dimension_mismatch(own, requested))
        }
        (Some(own), _) => Ok(Some(own)),
        (None, requested) => Ok(requested),
    }
}

/// Batch size of combining a transform of batch `own` with an input of
/// batch `input`. A batch of 1 broadcasts.
pub(crate) fn combined_batch(own: Option<usize>, input: usize) -> Result<usize> {
    match own {
        None | Some(1) => Ok(input),
        Some(own) if input == 1 || input == own => Ok(own),
        Some(own) => Err(TransformError::batch_mismatch(own, input)),
    }
}

/// Repeat a singleton leading axis to `n`.
pub(crate) fn broadcast_batch<B: Backend, const D: usize>(tensor: Tensor<B, D>, n: usize) -> Result<Tensor<B, D>> {
    let batch = tensor.dims()[0];
    if batch == n {
        Ok(tensor)
    } else if batch == 1 {
        Ok(tensor.repeat_dim(0, n))
    } else {
        Err(TransformError::batch_mismatch(n, batch))
    }
}

/// Validate a coordinate array and give it a batch axis sized for a
/// transform of dimensionality `ndim` and batch size `batch`.
pub(crate) fn prepare_coordinates<B: Backend>(
    x: &TaggedTensor<B>,
    ndim: Option<usize>,
    batch: Option<usize>,
) -> Result<TaggedTensor<B>> {
    let expected = || match ndim {
        Some(n) => format!("[batch?, {}, spatial...] with a channel axis", n),
        None => "[batch?, ndim, spatial...] with a channel axis".to_string(),
    };
    if !x.has_channel() {
        return Err(TransformError::shape(expected(), &x.shape()));
    }
    if let Some(n) = ndim {
        if x.channels() != n {
            return Err(TransformError::shape(expected(), &x.shape()));
        }
    }
    let target = combined_batch(batch, x.batch_size())?;
    x.clone().repeat_batch(target)
}
