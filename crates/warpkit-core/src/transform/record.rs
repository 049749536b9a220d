//! Structural decomposition of transforms.
//!
//! A [`TransformRecord`] carries everything an external serializer needs to
//! rebuild a transform: its kind, dimensionality, batch size, orientation,
//! reshape metadata, named numeric parameters and, for wrappers and
//! compositions, the records of the wrapped transforms. The container format
//! itself is left to the caller.

use std::sync::Arc;

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use serde::{Deserialize, Serialize};

use super::affine::Affine;
use super::bspline::FreeFormDeformation;
use super::composed::ComposedTransform;
use super::displacement_field::DenseDisplacementField;
use super::flipped::OrientationFlippedView;
use super::identity::Identity;
use super::intensity::Normalize;
use super::permutation::AxisPermutation;
use super::poly_affine::{LocallyAffine, PolyAffine};
use super::reflection::AxisReflection;
use super::rescale::Rescale;
use super::rigid::Rigid;
use super::rotation::{Rotation180, Rotation270, Rotation90};
use super::trait_::{EvaluationMode, Orientation, SharedTransform, TransformKind};
use super::translation::Translation;
use crate::error::{Result, TransformError};
use crate::reshape::ReshapeDescriptor;

/// A named numeric parameter, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamRecord {
    pub name: String,
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl ParamRecord {
    /// Capture a tensor.
    pub fn from_tensor<B: Backend, const D: usize>(name: &str, tensor: &Tensor<B, D>) -> Result<Self> {
        let shape = tensor.dims().to_vec();
        let values = tensor
            .clone()
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| TransformError::data(format!("{:?}", e)))?;
        Ok(Self {
            name: name.to_string(),
            shape,
            values,
        })
    }

    /// A flat list of numbers.
    pub fn scalars(name: &str, values: Vec<f32>) -> Self {
        Self {
            name: name.to_string(),
            shape: vec![values.len()],
            values,
        }
    }

    /// A flat list of indices or sizes.
    pub fn indices(name: &str, values: &[usize]) -> Self {
        Self::scalars(name, values.iter().map(|&v| v as f32).collect())
    }

    /// Rebuild the tensor.
    pub fn to_tensor<B: Backend, const D: usize>(&self, device: &B::Device) -> Result<Tensor<B, D>> {
        let dims: [usize; D] = self
            .shape
            .as_slice()
            .try_into()
            .map_err(|_| TransformError::shape(format!("{} axes for '{}'", D, self.name), &self.shape))?;
        Ok(Tensor::from_data(
            TensorData::new(self.values.clone(), Shape::new(dims)),
            device,
        ))
    }

    /// The values read back as indices or sizes.
    pub fn to_indices(&self) -> Vec<usize> {
        self.values.iter().map(|&v| v.round().max(0.0) as usize).collect()
    }
}

/// Structural decomposition of a transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformRecord {
    pub kind: TransformKind,
    pub ndim: Option<usize>,
    pub batch_size: Option<usize>,
    pub orientation: Orientation,
    pub reshape: ReshapeDescriptor,
    pub params: Vec<ParamRecord>,
    pub children: Vec<TransformRecord>,
    pub mode: Option<EvaluationMode>,
}

impl TransformRecord {
    pub fn new(kind: TransformKind, ndim: Option<usize>, batch_size: Option<usize>, orientation: Orientation) -> Self {
        Self {
            kind,
            ndim,
            batch_size,
            orientation,
            reshape: ReshapeDescriptor::identity(),
            params: Vec::new(),
            children: Vec::new(),
            mode: None,
        }
    }

    pub fn with_param(mut self, param: ParamRecord) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_reshape(mut self, reshape: ReshapeDescriptor) -> Self {
        self.reshape = reshape;
        self
    }

    pub fn with_child(mut self, child: TransformRecord) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_mode(mut self, mode: Option<EvaluationMode>) -> Self {
        self.mode = mode;
        self
    }

    /// Look up a required parameter.
    pub fn param(&self, name: &str) -> Result<&ParamRecord> {
        self.optional_param(name)
            .ok_or_else(|| TransformError::invalid(format!("{} record lacks parameter '{}'", self.kind, name)))
    }

    pub fn optional_param(&self, name: &str) -> Option<&ParamRecord> {
        self.params.iter().find(|p| p.name == name)
    }

    /// A boolean flag stored as a one-element parameter.
    pub fn flag(&self, name: &str) -> bool {
        self.optional_param(name)
            .and_then(|p| p.values.first())
            .is_some_and(|&v| v != 0.0)
    }

    /// Rebuild the transform this record describes.
    pub fn restore<B: Backend>(&self, device: &B::Device) -> Result<SharedTransform<B>> {
        let transform: SharedTransform<B> = match self.kind {
            TransformKind::Identity => Arc::new(Identity::new()),
            TransformKind::Translation => Arc::new(Translation::<B>::from_record(self, device)?),
            TransformKind::Rescale => Arc::new(Rescale::<B>::from_record(self, device)?),
            TransformKind::Reflection => Arc::new(AxisReflection::from_record(self)?),
            TransformKind::Permutation => Arc::new(AxisPermutation::from_record(self)?),
            TransformKind::Rotation90 => Arc::new(Rotation90::from_record(self)?),
            TransformKind::Rotation180 => Arc::new(Rotation180::from_record(self)?),
            TransformKind::Rotation270 => Arc::new(Rotation270::from_record(self)?),
            TransformKind::Rigid => Arc::new(Rigid::<B>::from_record(self, device)?),
            TransformKind::Affine => Arc::new(Affine::<B>::from_record(self, device)?),
            TransformKind::PolyAffine => Arc::new(PolyAffine::<B>::from_record(self, device)?),
            TransformKind::LocallyAffine => Arc::new(LocallyAffine::<B>::from_record(self, device)?),
            TransformKind::FreeFormDeformation => Arc::new(FreeFormDeformation::<B>::from_record(self, device)?),
            TransformKind::DenseDisplacementField => {
                Arc::new(DenseDisplacementField::<B>::from_record(self, device)?)
            }
            TransformKind::Normalize => Arc::new(Normalize::from_record(self)?),
            TransformKind::OrientationFlipped => {
                let inner = self
                    .children
                    .first()
                    .ok_or_else(|| TransformError::invalid("flipped view record has no child"))?
                    .restore::<B>(device)?;
                return Ok(Arc::new(OrientationFlippedView::new(inner)));
            }
            TransformKind::Composed => {
                let elements = self
                    .children
                    .iter()
                    .map(|child| child.restore::<B>(device))
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(ComposedTransform::new(elements)?.with_mode(self.mode)?)
            }
        };
        if transform.orientation() != self.orientation {
            Ok(transform.reoriented(self.orientation))
        } else {
            Ok(transform)
        }
    }
}
