//! Quarter-turn rotations in a plane spanned by two spatial axes.

use std::sync::Arc;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use nalgebra::DMatrix;

use super::matrix::{from_host, orient};
use super::record::{ParamRecord, TransformRecord};
use super::reflection::{check_axes, check_channels, split_channels, upper_bound};
use super::trait_::{prepare_coordinates, resolve_ndim, Orientation, SharedTransform, Transform, TransformKind};
use crate::array::TaggedTensor;
use crate::error::{Result, TransformError};
use crate::reshape::ReshapeDescriptor;

/// Rotation by `TURNS` quarter turns from `dim1` towards `dim2`.
///
/// With `m_k` the largest coordinate along `dim_k` (`extent[dim_k] - 1`
/// when an extent is given, else read from the input):
///
/// * one turn maps `(x1, x2)` to `(m2 - x2, x1)`
/// * two turns map `(x1, x2)` to `(m1 - x1, m2 - x2)`
/// * three turns map `(x1, x2)` to `(x2, m1 - x1)`
///
/// The extent describes the grid the input coordinates live on. With
/// `resize_image` an odd number of turns swaps the two axes of a
/// resampled image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarterTurn<const TURNS: u8> {
    dim1: usize,
    dim2: usize,
    extent: Option<Vec<usize>>,
    resize_image: bool,
    orientation: Orientation,
}

pub type Rotation90 = QuarterTurn<1>;
pub type Rotation180 = QuarterTurn<2>;
pub type Rotation270 = QuarterTurn<3>;

impl<const TURNS: u8> QuarterTurn<TURNS> {
    pub fn new(dim1: usize, dim2: usize, extent: Option<Vec<usize>>) -> Result<Self> {
        if dim1 == dim2 {
            return Err(TransformError::invalid(format!("rotation plane needs two axes, got {} twice", dim1)));
        }
        if let Some(extent) = &extent {
            check_axes(&[dim1, dim2], extent.len())?;
        }
        Ok(Self {
            dim1,
            dim2,
            extent,
            resize_image: true,
            orientation: Orientation::TargetToSource,
        })
    }

    /// Whether a resampled image swaps its two axes. Defaults to true.
    pub fn with_resize_image(mut self, resize_image: bool) -> Self {
        self.resize_image = resize_image;
        self
    }

    pub fn axes(&self) -> (usize, usize) {
        (self.dim1, self.dim2)
    }

    pub fn extent(&self) -> Option<&[usize]> {
        self.extent.as_deref()
    }

    fn swaps_axes(&self) -> bool {
        TURNS % 2 == 1
    }

    /// The extent seen by the inverse: the rotated grid's shape.
    fn rotated_extent(&self) -> Option<Vec<usize>> {
        self.extent.clone().map(|mut extent| {
            if self.swaps_axes() {
                extent.swap(self.dim1, self.dim2);
            }
            extent
        })
    }

    fn kind_tag() -> TransformKind {
        match TURNS {
            1 => TransformKind::Rotation90,
            2 => TransformKind::Rotation180,
            _ => TransformKind::Rotation270,
        }
    }

    fn inverse_with<const INVERSE: u8>(&self) -> QuarterTurn<INVERSE> {
        QuarterTurn {
            dim1: self.dim1,
            dim2: self.dim2,
            extent: self.rotated_extent(),
            resize_image: self.resize_image,
            orientation: self.orientation,
        }
    }

    pub fn from_record(record: &TransformRecord) -> Result<Self> {
        let axes = record.param("axes")?.to_indices();
        let [dim1, dim2] = axes[..] else {
            return Err(TransformError::invalid("rotation record needs two axes"));
        };
        let extent = record.optional_param("extent").map(|p| p.to_indices());
        let mut rotation = Self::new(dim1, dim2, extent)?.with_resize_image(record.flag("resize_image"));
        rotation.orientation = record.orientation;
        Ok(rotation)
    }
}

impl<B: Backend, const TURNS: u8> Transform<B> for QuarterTurn<TURNS> {
    fn kind(&self) -> TransformKind {
        Self::kind_tag()
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

    fn reshape(&self) -> ReshapeDescriptor {
        if self.resize_image && self.swaps_axes() {
            ReshapeDescriptor::swap(self.dim1, self.dim2)
        } else {
            ReshapeDescriptor::identity()
        }
    }

    fn apply(&self, x: &TaggedTensor<B>) -> Result<TaggedTensor<B>> {
        let x = prepare_coordinates(x, Transform::<B>::ndim(self), None)?;
        check_channels(&x, &[self.dim1, self.dim2])?;
        let coords = x.tensor();
        let extent = self.extent.as_deref();
        let mut channels = split_channels(&coords);
        let x1 = channels[self.dim1].clone();
        let x2 = channels[self.dim2].clone();
        let (y1, y2) = match TURNS {
            1 => (upper_bound(&coords, self.dim2, extent) - x2, x1),
            2 => (
                upper_bound(&coords, self.dim1, extent) - x1,
                upper_bound(&coords, self.dim2, extent) - x2,
            ),
            _ => (x2, upper_bound(&coords, self.dim1, extent) - x1),
        };
        channels[self.dim1] = y1;
        channels[self.dim2] = y2;
        x.with_data(Tensor::cat(channels, 1))
    }

    fn affine_matrix(&self, ndim: Option<usize>, device: &B::Device) -> Result<Option<Tensor<B, 3>>> {
        let n = resolve_ndim(Transform::<B>::ndim(self), ndim)?;
        let (Some(n), Some(extent)) = (n, self.extent.as_ref()) else {
            return Ok(None);
        };
        let (d1, d2) = (self.dim1, self.dim2);
        let m1 = extent[d1] as f64 - 1.0;
        let m2 = extent[d2] as f64 - 1.0;
        let mut m = DMatrix::<f64>::identity(n + 1, n + 1);
        m[(d1, d1)] = 0.0;
        m[(d2, d2)] = 0.0;
        match TURNS {
            1 => {
                m[(d1, d2)] = -1.0;
                m[(d1, n)] = m2;
                m[(d2, d1)] = 1.0;
            }
            2 => {
                m[(d1, d1)] = -1.0;
                m[(d1, n)] = m1;
                m[(d2, d2)] = -1.0;
                m[(d2, n)] = m2;
            }
            _ => {
                m[(d1, d2)] = 1.0;
                m[(d2, d1)] = -1.0;
                m[(d2, n)] = m1;
            }
        }
        orient(from_host::<B>(&[m], device), self.orientation).map(Some)
    }

    fn inverse(&self) -> Result<Option<SharedTransform<B>>> {
        let inverse: SharedTransform<B> = match TURNS {
            1 => Arc::new(self.inverse_with::<3>()),
            2 => Arc::new(self.inverse_with::<2>()),
            _ => Arc::new(self.inverse_with::<1>()),
        };
        Ok(Some(inverse))
    }

    fn reoriented(&self, orientation: Orientation) -> SharedTransform<B> {
        Arc::new(Self {
            orientation,
            ..self.clone()
        })
    }

    fn record(&self) -> Result<TransformRecord> {
        let mut record = TransformRecord::new(Self::kind_tag(), Transform::<B>::ndim(self), None, self.orientation)
            .with_param(ParamRecord::indices("axes", &[self.dim1, self.dim2]))
            .with_param(ParamRecord::scalars("resize_image", vec![self.resize_image as u8 as f32]))
            .with_reshape(Transform::<B>::reshape(self));
        if let Some(extent) = &self.extent {
            record = record.with_param(ParamRecord::indices("extent", extent));
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::coordinate_grid;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn apply<T: Transform<TestBackend>>(t: &T, x: &TaggedTensor<TestBackend>) -> Vec<f32> {
        t.apply(x).unwrap().to_vec().unwrap()
    }

    #[test]
    fn test_rotation90() {
        let device = Default::default();
        let rotation = Rotation90::new(0, 1, Some(vec![2, 3])).unwrap();
        let grid = coordinate_grid::<TestBackend>(&[2, 3], &device);
        let values = apply(&rotation, &grid);
        // (x1, x2) -> (2 - x2, x1)
        assert_eq!(&values[..6], &[2.0, 1.0, 0.0, 2.0, 1.0, 0.0]);
        assert_eq!(&values[6..], &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        assert_eq!(Transform::<TestBackend>::reshape(&rotation).apply(&[2, 3]).unwrap(), vec![3, 2]);
    }

    #[test]
    fn test_rotation_inverses() {
        let device = Default::default();
        let grid = coordinate_grid::<TestBackend>(&[2, 3, 4], &device);
        let turns: Vec<SharedTransform<TestBackend>> = vec![
            Arc::new(Rotation90::new(1, 2, Some(vec![2, 3, 4])).unwrap()),
            Arc::new(Rotation180::new(0, 2, Some(vec![2, 3, 4])).unwrap()),
            Arc::new(Rotation270::new(0, 1, Some(vec![2, 3, 4])).unwrap()),
            Arc::new(Rotation90::new(0, 1, None).unwrap()),
        ];
        for rotation in turns {
            let inverse = rotation.inverse().unwrap().unwrap();
            let back = inverse.apply(&rotation.apply(&grid).unwrap()).unwrap();
            assert_eq!(back.to_vec().unwrap(), grid.to_vec().unwrap(), "{:?}", rotation);
        }
    }

    #[test]
    fn test_rotation_matrix_matches_apply() {
        let device = Default::default();
        let rotation = Rotation270::new(0, 1, Some(vec![3, 4])).unwrap();
        let grid = coordinate_grid::<TestBackend>(&[3, 4], &device);
        let m = Transform::<TestBackend>::affine_matrix(&rotation, None, &device).unwrap().unwrap();
        let via_matrix = super::super::matrix::apply_matrix(m, grid.tensor());
        let via_matrix: Vec<f32> = via_matrix.into_data().to_vec().unwrap();
        assert_eq!(via_matrix, apply(&rotation, &grid));
    }

    #[test]
    fn test_rotation180_keeps_shape() {
        let rotation = Rotation180::new(0, 1, None).unwrap();
        assert!(Transform::<TestBackend>::reshape(&rotation).is_identity());
        assert!(Rotation90::new(1, 1, None).is_err());
    }
}
