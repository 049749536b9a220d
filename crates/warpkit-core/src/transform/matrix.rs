//! Batched homogeneous-matrix helpers.
//!
//! Matrices are `[batch, n + 1, n + 1]` tensors. Products stay on the
//! device; inverses and determinants of these small matrices are computed on
//! the host with nalgebra.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use nalgebra::DMatrix;

use super::trait_::Orientation;
use crate::error::{Result, TransformError};

const SINGULAR_EPSILON: f64 = 1e-12;

/// Identity matrices `[batch, n + 1, n + 1]`.
pub fn identity_matrix<B: Backend>(batch: usize, ndim: usize, device: &B::Device) -> Tensor<B, 3> {
    Tensor::<B, 2>::eye(ndim + 1, device)
        .unsqueeze_dim::<3>(0)
        .repeat_dim(0, batch)
}

/// Assemble `[[A, t], [0, 1]]` from `linear: [batch, n, n]` and
/// `translation: [batch, n]`.
pub fn homogeneous<B: Backend>(linear: Tensor<B, 3>, translation: Tensor<B, 2>) -> Tensor<B, 3> {
    let [batch, n, _] = linear.dims();
    let device = linear.device();
    let top = Tensor::cat(vec![linear, translation.unsqueeze_dim::<3>(2)], 2);
    let bottom = Tensor::cat(
        vec![
            Tensor::<B, 3>::zeros([batch, 1, n], &device),
            Tensor::<B, 3>::ones([batch, 1, 1], &device),
        ],
        2,
    );
    Tensor::cat(vec![top, bottom], 1)
}

/// The linear block `[batch, n, n]` and translation column `[batch, n, 1]`.
pub fn split_homogeneous<B: Backend>(matrix: Tensor<B, 3>) -> (Tensor<B, 3>, Tensor<B, 3>) {
    let [batch, size, _] = matrix.dims();
    let n = size - 1;
    let linear = matrix.clone().slice([0..batch, 0..n, 0..n]);
    let translation = matrix.slice([0..batch, 0..n, n..size]);
    (linear, translation)
}

/// Apply homogeneous matrices to coordinates `[batch, n, voxels]`.
pub fn apply_matrix<B: Backend>(matrix: Tensor<B, 3>, coords: Tensor<B, 3>) -> Tensor<B, 3> {
    let (linear, translation) = split_homogeneous(matrix);
    linear.matmul(coords) + translation
}

/// Multiply the translation column `matrix[.., :n, n]` by `factor`.
pub fn stretch_translation<B: Backend>(matrix: Tensor<B, 3>, factor: f32) -> Tensor<B, 3> {
    let [batch, size, _] = matrix.dims();
    let n = size - 1;
    let mut scale = vec![1.0f32; size * size];
    for row in 0..n {
        scale[row * size + n] = factor;
    }
    let scale = Tensor::<B, 3>::from_data(TensorData::new(scale, [1, size, size]), &matrix.device());
    matrix * scale.repeat_dim(0, batch)
}

/// Copy matrices to the host.
pub fn to_host<B: Backend>(matrix: Tensor<B, 3>) -> Result<Vec<DMatrix<f64>>> {
    let [batch, rows, cols] = matrix.dims();
    let values = matrix
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| TransformError::data(format!("{:?}", e)))?;
    Ok((0..batch)
        .map(|b| {
            let start = b * rows * cols;
            DMatrix::from_row_iterator(rows, cols, values[start..start + rows * cols].iter().map(|&v| v as f64))
        })
        .collect())
}

/// Upload host matrices as a `[batch, rows, cols]` tensor.
pub fn from_host<B: Backend>(matrices: &[DMatrix<f64>], device: &B::Device) -> Tensor<B, 3> {
    let (rows, cols) = matrices.first().map(|m| m.shape()).unwrap_or((0, 0));
    let mut values = Vec::with_capacity(matrices.len() * rows * cols);
    for m in matrices {
        for r in 0..rows {
            for c in 0..cols {
                values.push(m[(r, c)] as f32);
            }
        }
    }
    Tensor::from_data(TensorData::new(values, Shape::new([matrices.len(), rows, cols])), device)
}

/// Determinant of every matrix in the batch.
pub fn determinants<B: Backend>(matrix: Tensor<B, 3>) -> Result<Vec<f64>> {
    Ok(to_host(matrix)?.into_iter().map(|m| m.determinant()).collect())
}

/// Invert every matrix in the batch, failing on a singular one.
pub fn invert<B: Backend>(matrix: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
    let device = matrix.device();
    let inverses = to_host(matrix)?
        .into_iter()
        .enumerate()
        .map(|(b, m)| {
            let det = m.determinant();
            if !det.is_finite() || det.abs() < SINGULAR_EPSILON {
                return Err(TransformError::singular(format!(
                    "batch {} has determinant {:e}",
                    b, det
                )));
            }
            m.try_inverse()
                .ok_or_else(|| TransformError::singular(format!("batch {} has no inverse", b)))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(from_host(&inverses, &device))
}

/// Orient the matrix of a target-to-source mapping: returned as is for
/// `TargetToSource`, inverted for `SourceToTarget`.
pub fn orient<B: Backend>(matrix: Tensor<B, 3>, orientation: Orientation) -> Result<Tensor<B, 3>> {
    match orientation {
        Orientation::TargetToSource => Ok(matrix),
        Orientation::SourceToTarget => invert(matrix),
    }
}

/// Homogeneous 2-D matrices `[batch, 3, 3]` from affine parameters.
///
/// `params` is `[batch, 7]` holding `(t1, t2, theta, s1, s2, rho1, rho2)`
/// (translation, rotation, scale, shear) or `[batch, 9]` holding
/// `(t1, t2, c1, c2, theta, s1, s2, rho1, rho2)` with a centre `c`.
pub fn affine_2d_matrix<B: Backend>(params: Tensor<B, 2>) -> Result<Tensor<B, 3>> {
    let [batch, count] = params.dims();
    let column = |i: usize| params.clone().narrow(1, i, 1);
    let (t1, t2, c1, c2, offset) = match count {
        7 => {
            let zeros = Tensor::<B, 2>::zeros([batch, 1], &params.device());
            (column(0), column(1), zeros.clone(), zeros, 2)
        }
        9 => (column(0), column(1), column(2), column(3), 4),
        _ => {
            return Err(TransformError::shape("[batch, 7] or [batch, 9]", &[batch, count]));
        }
    };
    let theta = column(offset);
    let s1 = column(offset + 1);
    let s2 = column(offset + 2);
    let rho1 = column(offset + 3);
    let rho2 = column(offset + 4);
    let (cos, sin) = (theta.clone().cos(), theta.sin());

    let shear = rho1.clone() * rho2.clone() + 1.0;
    let a = shear.clone() * s1.clone() * cos.clone() + rho1.clone() * s2.clone() * sin.clone();
    let b = (shear * s1.clone() * sin.clone()).neg() + rho1 * s2.clone() * cos.clone();
    let c = rho2.clone() * s1.clone() * cos.clone() + s2.clone() * sin.clone();
    let d = (rho2 * s1 * sin).neg() + s2 * cos;

    let tx = t1 - a.clone() * c1.clone() - b.clone() * c2.clone() + c1.clone();
    let ty = t2 - c.clone() * c1.clone() - d.clone() * c2.clone() + c2;
    let linear = Tensor::cat(vec![a, b, c, d], 1).reshape([batch, 2, 2]);
    let translation = Tensor::cat(vec![tx, ty], 1);
    Ok(homogeneous(linear, translation))
}

/// Homogeneous 3-D matrices `[batch, 4, 4]` from quaternion parameters
/// `[batch, 6]` holding `(qb, qc, qd, px, py, pz)`; the scalar part is
/// `sqrt(1 - qb^2 - qc^2 - qd^2)`.
pub fn quaternion_matrix<B: Backend>(params: Tensor<B, 2>) -> Result<Tensor<B, 3>> {
    let [batch, count] = params.dims();
    if count != 6 {
        return Err(TransformError::shape("[batch, 6]", &[batch, count]));
    }
    let column = |i: usize| params.clone().narrow(1, i, 1);
    let (b, c, d) = (column(0), column(1), column(2));
    let a = (b.clone() * b.clone() + c.clone() * c.clone() + d.clone() * d.clone())
        .neg()
        .add_scalar(1.0)
        .clamp_min(0.0)
        .sqrt();
    let sq = |t: &Tensor<B, 2>| t.clone() * t.clone();
    let prod = |x: &Tensor<B, 2>, y: &Tensor<B, 2>| (x.clone() * y.clone()).mul_scalar(2.0);

    let r11 = sq(&a) + sq(&b) - sq(&c) - sq(&d);
    let r12 = prod(&b, &c) - prod(&a, &d);
    let r13 = prod(&b, &d) + prod(&a, &c);
    let r21 = prod(&b, &c) + prod(&a, &d);
    let r22 = sq(&a) + sq(&c) - sq(&b) - sq(&d);
    let r23 = prod(&c, &d) - prod(&a, &b);
    let r31 = prod(&b, &d) - prod(&a, &c);
    let r32 = prod(&c, &d) + prod(&a, &b);
    let r33 = sq(&a) + sq(&d) - sq(&c) - sq(&b);

    let linear = Tensor::cat(vec![r11, r12, r13, r21, r22, r23, r31, r32, r33], 1).reshape([batch, 3, 3]);
    let translation = params.narrow(1, 3, 3);
    Ok(homogeneous(linear, translation))
}

/// Quaternion parameters `[batch, 6]` of rigid homogeneous matrices
/// `[batch, 4, 4]`; the inverse of [`quaternion_matrix`].
pub fn matrix_quaternion<B: Backend>(matrix: Tensor<B, 3>) -> Result<Tensor<B, 2>> {
    let [batch, rows, cols] = matrix.dims();
    if rows != 4 || cols != 4 {
        return Err(TransformError::shape("[batch, 4, 4]", &[batch, rows, cols]));
    }
    let device = matrix.device();
    let mut values = Vec::with_capacity(batch * 6);
    for m in to_host(matrix)? {
        let trace = m[(0, 0)] + m[(1, 1)] + m[(2, 2)];
        let a2 = (1.0 + trace) / 4.0;
        let b2 = (a2 - (m[(1, 1)] + m[(2, 2)]) / 2.0).max(0.0);
        let c2 = (a2 - (m[(2, 2)] + m[(0, 0)]) / 2.0).max(0.0);
        let d2 = (a2 - (m[(0, 0)] + m[(1, 1)]) / 2.0).max(0.0);
        let sign = |v: f64| if v < 0.0 { -1.0 } else { 1.0 };
        values.push((sign(m[(2, 1)] - m[(1, 2)]) * b2.sqrt()) as f32);
        values.push((sign(m[(0, 2)] - m[(2, 0)]) * c2.sqrt()) as f32);
        values.push((sign(m[(1, 0)] - m[(0, 1)]) * d2.sqrt()) as f32);
        values.push(m[(0, 3)] as f32);
        values.push(m[(1, 3)] as f32);
        values.push(m[(2, 3)] as f32);
    }
    Ok(Tensor::from_data(TensorData::new(values, Shape::new([batch, 6])), &device))
}
