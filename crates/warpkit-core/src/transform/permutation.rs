//! Axis permutation.

use std::sync::Arc;

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Shape, Tensor, TensorData};
use nalgebra::DMatrix;

use super::matrix::{from_host, orient};
use super::record::{ParamRecord, TransformRecord};
use super::trait_::{prepare_coordinates, resolve_ndim, Orientation, SharedTransform, Transform, TransformKind};
use crate::array::TaggedTensor;
use crate::error::{Result, TransformError};
use crate::reshape::ReshapeDescriptor;

/// Reorders coordinate axes: output axis `i` reads input axis `perm[i]`.
///
/// One permutation per batch instance. With `resize_image` the permutation
/// must be the same for every instance, and a resampled image has its
/// axes rearranged to match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisPermutation {
    perms: Vec<Vec<usize>>,
    resize_image: bool,
    orientation: Orientation,
}

impl AxisPermutation {
    pub fn new(perm: Vec<usize>) -> Result<Self> {
        Self::batched(vec![perm], true)
    }

    pub fn batched(perms: Vec<Vec<usize>>, resize_image: bool) -> Result<Self> {
        let n = perms
            .first()
            .map(Vec::len)
            .ok_or_else(|| TransformError::invalid("permutation needs at least one batch instance"))?;
        for perm in &perms {
            let mut seen = vec![false; n];
            let valid = perm.len() == n && perm.iter().all(|&axis| axis < n && !std::mem::replace(&mut seen[axis], true));
            if !valid {
                return Err(TransformError::invalid(format!("{:?} is not a permutation of 0..{}", perm, n)));
            }
        }
        if resize_image && perms.iter().any(|perm| perm != &perms[0]) {
            return Err(TransformError::invalid(
                "resize_image needs the same permutation for every batch instance",
            ));
        }
        Ok(Self {
            perms,
            resize_image,
            orientation: Orientation::TargetToSource,
        })
    }

    pub fn permutations(&self) -> &[Vec<usize>] {
        &self.perms
    }

    fn n(&self) -> usize {
        self.perms[0].len()
    }

    pub fn from_record(record: &TransformRecord) -> Result<Self> {
        let param = record.param("perms")?;
        let n = param.shape.last().copied().unwrap_or(0).max(1);
        let perms = param.to_indices().chunks(n).map(<[usize]>::to_vec).collect();
        let mut permutation = Self::batched(perms, record.flag("resize_image"))?;
        permutation.orientation = record.orientation;
        Ok(permutation)
    }
}

fn argsort(perm: &[usize]) -> Vec<usize> {
    let mut inverse = vec![0; perm.len()];
    for (i, &axis) in perm.iter().enumerate() {
        inverse[axis] = i;
    }
    inverse
}

fn index_tensor<B: Backend>(perm: &[usize], device: &B::Device) -> Tensor<B, 1, Int> {
    let values: Vec<i64> = perm.iter().map(|&axis| axis as i64).collect();
    Tensor::from_data(TensorData::new(values, Shape::new([perm.len()])), device)
}

impl<B: Backend> Transform<B> for AxisPermutation {
    fn kind(&self) -> TransformKind {
        TransformKind::Permutation
    }

    fn ndim(&self) -> Option<usize> {
        Some(self.n())
    }

    fn batch_size(&self) -> Option<usize> {
        Some(self.perms.len())
    }

    fn orientation(&self) -> Orientation {
        self.orientation
    }

    fn reshape(&self) -> ReshapeDescriptor {
        if self.resize_image {
            // Target axis `j` spans the source axis that lands on it.
            ReshapeDescriptor::from_permutation(&argsort(&self.perms[0]))
        } else {
            ReshapeDescriptor::identity()
        }
    }

    fn apply(&self, x: &TaggedTensor<B>) -> Result<TaggedTensor<B>> {
        let batch = self.perms.len();
        let x = prepare_coordinates(x, Some(self.n()), Some(batch))?;
        let coords = x.tensor();
        let device = coords.device();
        let permuted = if batch == 1 {
            coords.select(1, index_tensor::<B>(&self.perms[0], &device))
        } else {
            let parts = (0..batch)
                .map(|b| {
                    coords
                        .clone()
                        .narrow(0, b, 1)
                        .select(1, index_tensor::<B>(&self.perms[b], &device))
                })
                .collect();
            Tensor::cat(parts, 0)
        };
        x.with_data(permuted)
    }

    fn affine_matrix(&self, ndim: Option<usize>, device: &B::Device) -> Result<Option<Tensor<B, 3>>> {
        let n = self.n();
        resolve_ndim(Some(n), ndim)?;
        let matrices: Vec<DMatrix<f64>> = self
            .perms
            .iter()
            .map(|perm| {
                let mut m = DMatrix::<f64>::zeros(n + 1, n + 1);
                for (i, &axis) in perm.iter().enumerate() {
                    m[(i, axis)] = 1.0;
                }
                m[(n, n)] = 1.0;
                m
            })
            .collect();
        orient(from_host::<B>(&matrices, device), self.orientation).map(Some)
    }

    fn inverse(&self) -> Result<Option<SharedTransform<B>>> {
        let mut inverse = Self::batched(self.perms.iter().map(|p| argsort(p)).collect(), self.resize_image)?;
        inverse.orientation = self.orientation;
        Ok(Some(Arc::new(inverse)))
    }

    fn reoriented(&self, orientation: Orientation) -> SharedTransform<B> {
        Arc::new(Self {
            orientation,
            ..self.clone()
        })
    }

    fn record(&self) -> Result<TransformRecord> {
        let flat: Vec<f32> = self.perms.iter().flatten().map(|&axis| axis as f32).collect();
        Ok(TransformRecord::new(
            TransformKind::Permutation,
            Some(self.n()),
            Some(self.perms.len()),
            self.orientation,
        )
        .with_param(ParamRecord {
            name: "perms".to_string(),
            shape: vec![self.perms.len(), self.n()],
            values: flat,
        })
        .with_param(ParamRecord::scalars("resize_image", vec![self.resize_image as u8 as f32]))
        .with_reshape(Transform::<B>::reshape(self)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::coordinate_grid;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_permutation_reorders_channels() {
        let device = Default::default();
        let permutation = AxisPermutation::new(vec![1, 0]).unwrap();
        let grid = coordinate_grid::<TestBackend>(&[2, 3], &device);
        let out = Transform::<TestBackend>::apply(&permutation, &grid).unwrap();
        let values = out.to_vec().unwrap();
        assert_eq!(&values[..6], &[0.0, 1.0, 2.0, 0.0, 1.0, 2.0]);
        assert_eq!(&values[6..], &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_permutation_reshape_and_inverse() {
        let device = Default::default();
        let permutation = AxisPermutation::new(vec![2, 0, 1]).unwrap();
        // Target axis j spans source axis perm^-1[j].
        assert_eq!(
            Transform::<TestBackend>::reshape(&permutation).apply(&[2, 3, 4]).unwrap(),
            vec![3, 4, 2]
        );
        let grid = coordinate_grid::<TestBackend>(&[2, 3, 4], &device);
        let inverse = Transform::<TestBackend>::inverse(&permutation).unwrap().unwrap();
        let back = inverse
            .apply(&Transform::<TestBackend>::apply(&permutation, &grid).unwrap())
            .unwrap();
        assert_eq!(back.to_vec().unwrap(), grid.to_vec().unwrap());
    }

    #[test]
    fn test_batched_permutation() {
        let device = Default::default();
        let permutation = AxisPermutation::batched(vec![vec![0, 1], vec![1, 0]], false).unwrap();
        let grid = coordinate_grid::<TestBackend>(&[1, 2], &device);
        let out = Transform::<TestBackend>::apply(&permutation, &grid).unwrap();
        assert_eq!(out.shape(), vec![2, 2, 1, 2]);
        assert_eq!(out.to_vec().unwrap(), vec![0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_invalid_permutation() {
        assert!(AxisPermutation::new(vec![0, 0]).is_err());
        assert!(AxisPermutation::new(vec![0, 2]).is_err());
        assert!(AxisPermutation::batched(vec![vec![0, 1], vec![1, 0]], true).is_err());
    }
}
