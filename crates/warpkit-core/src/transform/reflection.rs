//! Axis reflection.

use std::sync::Arc;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use nalgebra::DMatrix;

use super::matrix::from_host;
use super::record::{ParamRecord, TransformRecord};
use super::trait_::{prepare_coordinates, resolve_ndim, Orientation, SharedTransform, Transform, TransformKind};
use crate::array::TaggedTensor;
use crate::error::{Result, TransformError};

/// Flips coordinates along a set of spatial axes: `x_d -> m_d - x_d`.
///
/// With an extent, `m_d = extent[d] - 1` and the flip maps a grid of that
/// shape onto itself. Without one, `m_d` is the largest coordinate found
/// along the axis in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisReflection {
    dims: Vec<usize>,
    extent: Option<Vec<usize>>,
    orientation: Orientation,
}

impl AxisReflection {
    pub fn new(dims: Vec<usize>, extent: Option<Vec<usize>>) -> Result<Self> {
        if let Some(extent) = &extent {
            check_axes(&dims, extent.len())?;
        }
        Ok(Self {
            dims,
            extent,
            orientation: Orientation::TargetToSource,
        })
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn extent(&self) -> Option<&[usize]> {
        self.extent.as_deref()
    }

    pub fn from_record(record: &TransformRecord) -> Result<Self> {
        let dims = record.param("dims")?.to_indices();
        let extent = record.optional_param("extent").map(|p| p.to_indices());
        let mut reflection = Self::new(dims, extent)?;
        reflection.orientation = record.orientation;
        Ok(reflection)
    }
}

/// Fail when an axis index is out of range for `ndim` axes.
pub(crate) fn check_axes(axes: &[usize], ndim: usize) -> Result<()> {
    match axes.iter().find(|&&axis| axis >= ndim) {
        Some(axis) => Err(TransformError::invalid(format!(
            "axis {} out of range for {} dimensions",
            axis, ndim
        ))),
        None => Ok(()),
    }
}

/// Largest coordinate along `axis` as a `[batch, 1, 1]` tensor: the fixed
/// `extent[axis] - 1` when an extent is known, else the data maximum.
pub(crate) fn upper_bound<B: Backend>(coords: &Tensor<B, 3>, axis: usize, extent: Option<&[usize]>) -> Tensor<B, 3> {
    match extent {
        Some(extent) => {
            let batch = coords.dims()[0];
            Tensor::<B, 3>::ones([batch, 1, 1], &coords.device()).mul_scalar(extent[axis] as f32 - 1.0)
        }
        None => coords.clone().narrow(1, axis, 1).max_dim(2),
    }
}

/// The `[batch, 1, voxels]` slices of every channel.
pub(crate) fn split_channels<B: Backend>(coords: &Tensor<B, 3>) -> Vec<Tensor<B, 3>> {
    (0..coords.dims()[1]).map(|c| coords.clone().narrow(1, c, 1)).collect()
}

/// Require a coordinate array whose channels cover `axes`.
pub(crate) fn check_channels<B: Backend>(x: &TaggedTensor<B>, axes: &[usize]) -> Result<()> {
    check_axes(axes, x.channels())
        .map_err(|_| TransformError::shape(format!("more than {} channels", axes.iter().max().copied().unwrap_or(0)), &x.shape()))
}

impl<B: Backend> Transform<B> for AxisReflection {
    fn kind(&self) -> TransformKind {
        TransformKind::Reflection
    }

    fn ndim(&self) -> Option<usize> {
        self.extent.as_ref().map(Vec::len)
    }

    fn batch_size(&self) -> Option<usize> {
        None
    }

    fn orientation(&self) -> Orientation {
        self.orientation
    }

    fn apply(&self, x: &TaggedTensor<B>) -> Result<TaggedTensor<B>> {
        let x = prepare_coordinates(x, Transform::<B>::ndim(self), None)?;
        check_channels(&x, &self.dims)?;
        let coords = x.tensor();
        let mut channels = split_channels(&coords);
        for &axis in &self.dims {
            let bound = upper_bound(&coords, axis, self.extent.as_deref());
            channels[axis] = bound - channels[axis].clone();
        }
        x.with_data(Tensor::cat(channels, 1))
    }

    fn affine_matrix(&self, ndim: Option<usize>, device: &B::Device) -> Result<Option<Tensor<B, 3>>> {
        let n = resolve_ndim(Transform::<B>::ndim(self), ndim)?;
        let (Some(n), Some(extent)) = (n, self.extent.as_ref()) else {
            return Ok(None);
        };
        let mut m = DMatrix::<f64>::identity(n + 1, n + 1);
        for &axis in &self.dims {
            m[(axis, axis)] = -1.0;
            m[(axis, n)] = extent[axis] as f64 - 1.0;
        }
        // Self-inverse, so both orientations share the matrix.
        Ok(Some(from_host::<B>(&[m], device)))
    }

    fn inverse(&self) -> Result<Option<SharedTransform<B>>> {
        Ok(Some(Arc::new(self.clone())))
    }

    fn reoriented(&self, orientation: Orientation) -> SharedTransform<B> {
        Arc::new(Self {
            orientation,
            ..self.clone()
        })
    }

    fn record(&self) -> Result<TransformRecord> {
        let mut record = TransformRecord::new(
            TransformKind::Reflection,
            Transform::<B>::ndim(self),
            None,
            self.orientation,
        )
        .with_param(ParamRecord::indices("dims", &self.dims));
        if let Some(extent) = &self.extent {
            record = record.with_param(ParamRecord::indices("extent", extent));
        }
        Ok(record)
    }
}
