//! B-Spline transform implementation.
//!
//! This module provides a cubic B-spline free-form deformation over a
//! regular control grid of any dimensionality.

use std::sync::Arc;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::record::{ParamRecord, TransformRecord};
use super::trait_::{prepare_coordinates, Orientation, SharedTransform, Transform, TransformKind};
use crate::array::TaggedTensor;
use crate::error::{Result, TransformError};
use crate::interpolation::trait_::{align, CornerReader};
use crate::interpolation::FillValue;

/// B-Spline Transform (Free-form deformation).
///
/// Uses a grid of control points to define a smooth deformation field.
/// A point `x` sits at control-grid position `u = (x - origin) / spacing`;
/// its displacement blends the `4^ndim` control points around `u` with
/// cubic B-spline weights. Control indices past the grid are clamped.
#[derive(Debug, Clone)]
pub struct FreeFormDeformation<B: Backend> {
    /// Control point displacements `[batch, ndim, control points]`
    offsets: Tensor<B, 3>,
    /// Control point grid dimensions
    control_shape: Vec<usize>,
    /// Voxel position of the first control point
    origin: Vec<f32>,
    /// Voxel distance between control points
    spacing: Vec<f32>,
    orientation: Orientation,
}

impl<B: Backend> FreeFormDeformation<B> {
    /// Create a new B-Spline transform.
    ///
    /// # Arguments
    /// * `offsets` - Control point displacements `[batch, ndim, prod(control_shape)]`
    /// * `control_shape` - Number of control points along each dimension
    /// * `origin` - Voxel position of control point zero
    /// * `spacing` - Voxel distance between neighbouring control points
    pub fn new(offsets: Tensor<B, 3>, control_shape: Vec<usize>, origin: Vec<f32>, spacing: Vec<f32>) -> Result<Self> {
        let [batch, ndim, count] = offsets.dims();
        let n = control_shape.len();
        if ndim != n || count != control_shape.iter().product::<usize>() || origin.len() != n || spacing.len() != n {
            return Err(TransformError::shape(
                format!("[batch, {}, {}] offsets with {} origin and spacing values", n, control_shape.iter().product::<usize>(), n),
                &[batch, ndim, count],
            ));
        }
        if spacing.iter().any(|&s| !(s > 0.0)) {
            return Err(TransformError::invalid("control point spacing must be positive"));
        }
        Ok(Self {
            offsets,
            control_shape,
            origin,
            spacing,
            orientation: Orientation::TargetToSource,
        })
    }

    /// Control grid spread evenly over an image grid, corner to corner.
    pub fn covering(offsets: Tensor<B, 3>, control_shape: Vec<usize>, image_shape: &[usize]) -> Result<Self> {
        let spacing = control_shape
            .iter()
            .zip(image_shape)
            .map(|(&c, &s)| s.saturating_sub(1) as f32 / c.saturating_sub(1).max(1) as f32)
            .map(|s| if s > 0.0 { s } else { 1.0 })
            .collect();
        let origin = vec![0.0; control_shape.len()];
        Self::new(offsets, control_shape, origin, spacing)
    }

    pub fn offsets(&self) -> Tensor<B, 3> {
        self.offsets.clone()
    }

    pub fn control_shape(&self) -> &[usize] {
        &self.control_shape
    }

    pub fn from_record(record: &TransformRecord, device: &B::Device) -> Result<Self> {
        let mut ffd = Self::new(
            record.param("offsets")?.to_tensor::<B, 3>(device)?,
            record.param("control_shape")?.to_indices(),
            record.param("origin")?.values.clone(),
            record.param("spacing")?.values.clone(),
        )?;
        ffd.orientation = record.orientation;
        Ok(ffd)
    }
}

/// Compute Cubic B-Spline basis functions for `u` in `[0, 1)`.
fn bspline_basis<B: Backend>(u: Tensor<B, 3>) -> [Tensor<B, 3>; 4] {
    let one_minus_u = u.clone().neg().add_scalar(1.0);
    let u2 = u.clone() * u.clone();
    let u3 = u2.clone() * u.clone();

    // B0 = (1-u)^3 / 6
    let b0 = one_minus_u.clone() * one_minus_u.clone() * one_minus_u / 6.0;
    // B1 = (3u^3 - 6u^2 + 4) / 6
    let b1 = (u3.clone().mul_scalar(3.0) - u2.clone().mul_scalar(6.0)).add_scalar(4.0) / 6.0;
    // B2 = (-3u^3 + 3u^2 + 3u + 1) / 6
    let b2 = (u3.clone().mul_scalar(-3.0) + u2.mul_scalar(3.0) + u.mul_scalar(3.0)).add_scalar(1.0) / 6.0;
    // B3 = u^3 / 6
    let b3 = u3 / 6.0;

    [b0, b1, b2, b3]
}

impl<B: Backend> Transform<B> for FreeFormDeformation<B> {
    fn kind(&self) -> TransformKind {
        TransformKind::FreeFormDeformation
    }

    fn ndim(&self) -> Option<usize> {
        Some(self.control_shape.len())
    }

    fn batch_size(&self) -> Option<usize> {
        Some(self.offsets.dims()[0])
    }

    fn orientation(&self) -> Orientation {
        self.orientation
    }

    fn apply(&self, x: &TaggedTensor<B>) -> Result<TaggedTensor<B>> {
        let x = prepare_coordinates(x, self.ndim(), self.batch_size())?;
        let (offsets, coords) = align(self.offsets.clone(), &self.control_shape, x.tensor())?;
        let n = self.control_shape.len();

        let mut base = Vec::with_capacity(n);
        let mut basis = Vec::with_capacity(n);
        for axis in 0..n {
            let u = coords
                .clone()
                .narrow(1, axis, 1)
                .sub_scalar(self.origin[axis])
                .div_scalar(self.spacing[axis]);
            let cell = u.clone().floor();
            basis.push(bspline_basis(u - cell.clone()));
            base.push(cell);
        }

        let fill = FillValue::Nearest;
        let reader = CornerReader::new(&offsets, &self.control_shape, &fill);
        let mut displacement: Option<Tensor<B, 3>> = None;
        for neighbour in 0..4usize.pow(n as u32) {
            let mut index = Vec::with_capacity(n);
            let mut weight: Option<Tensor<B, 3>> = None;
            for axis in 0..n {
                let k = neighbour / 4usize.pow(axis as u32) % 4;
                index.push(base[axis].clone().add_scalar(k as f32 - 1.0));
                let w = basis[axis][k].clone();
                weight = Some(match weight {
                    Some(acc) => acc * w,
                    None => w,
                });
            }
            let Some(weight) = weight else { break };
            let term = reader.read(&index) * weight;
            displacement = Some(match displacement {
                Some(sum) => sum + term,
                None => term,
            });
        }
        match displacement {
            Some(displacement) => x.with_data(x.tensor() + displacement),
            None => Ok(x),
        }
    }

    fn reoriented(&self, orientation: Orientation) -> SharedTransform<B> {
        Arc::new(Self {
            orientation,
            ..self.clone()
        })
    }

    fn record(&self) -> Result<TransformRecord> {
        Ok(TransformRecord::new(
            TransformKind::FreeFormDeformation,
            self.ndim(),
            self.batch_size(),
            self.orientation,
        )
        .with_param(ParamRecord::from_tensor("offsets", &self.offsets)?)
        .with_param(ParamRecord::indices("control_shape", &self.control_shape))
        .with_param(ParamRecord::scalars("origin", self.origin.clone()))
        .with_param(ParamRecord::scalars("spacing", self.spacing.clone())))
    }
}
