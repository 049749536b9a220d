//! Convenience operations on shared transforms.

use std::sync::Arc;

use burn::tensor::backend::Backend;

use super::composed::ComposedTransform;
use super::flipped::OrientationFlippedView;
use super::trait_::{EvaluationMode, InverseSolver, Orientation, SharedTransform, TransformKind};
use crate::error::{Result, TransformError};

/// The closed-form inverse of `transform`, or one computed by `solver` on a
/// grid of shape `grid` when there is none.
pub fn force_inverse<B: Backend>(
    transform: &SharedTransform<B>,
    grid: &[usize],
    device: &B::Device,
    solver: Option<&dyn InverseSolver<B>>,
) -> Result<SharedTransform<B>> {
    if let Some(inverse) = transform.inverse()? {
        return Ok(inverse);
    }
    match solver {
        Some(solver) => {
            tracing::debug!(kind = %transform.kind(), ?grid, "solving for a numerical inverse");
            solver.solve(transform.as_ref(), grid, device)
        }
        None => Err(TransformError::unsupported(format!(
            "{} has no closed-form inverse and no inverse solver is configured",
            transform.kind()
        ))),
    }
}

/// `transform` seen with its orientation flipped. Flipping a flipped view
/// gives back the wrapped transform.
pub fn fake_inverse<B: Backend>(transform: &SharedTransform<B>) -> SharedTransform<B> {
    if transform.kind() == TransformKind::OrientationFlipped {
        transform.reoriented(transform.orientation().flipped())
    } else {
        Arc::new(OrientationFlippedView::new(transform.clone()))
    }
}

/// Extension methods for [`SharedTransform`].
pub trait TransformExt<B: Backend> {
    /// `self` followed by `next` on an image.
    fn compose_with(&self, next: SharedTransform<B>) -> Result<ComposedTransform<B>>;

    /// Use the transform in place of its inverse by flipping its
    /// orientation. Only accurate for transforms close to the identity.
    fn fake_inverse(&self) -> SharedTransform<B>;

    /// One-element composition that always evaluates on coordinates.
    fn as_coordinate_transform(&self) -> Result<ComposedTransform<B>>;

    /// One-element composition that always evaluates on images.
    fn as_image_transform(&self) -> Result<ComposedTransform<B>>;

    /// The same transform labelled [`Orientation::SourceToTarget`].
    fn forward(&self) -> SharedTransform<B>;

    /// The same transform labelled [`Orientation::TargetToSource`].
    fn backward(&self) -> SharedTransform<B>;

    /// See [`force_inverse`].
    fn force_inverse(
        &self,
        grid: &[usize],
        device: &B::Device,
        solver: Option<&dyn InverseSolver<B>>,
    ) -> Result<SharedTransform<B>>;
}

impl<B: Backend> TransformExt<B> for SharedTransform<B> {
    fn compose_with(&self, next: SharedTransform<B>) -> Result<ComposedTransform<B>> {
        ComposedTransform::new(vec![self.clone(), next])
    }

    fn fake_inverse(&self) -> SharedTransform<B> {
        fake_inverse(self)
    }

    fn as_coordinate_transform(&self) -> Result<ComposedTransform<B>> {
        ComposedTransform::new(vec![self.clone()])?.with_mode(Some(EvaluationMode::Coordinate))
    }

    fn as_image_transform(&self) -> Result<ComposedTransform<B>> {
        ComposedTransform::new(vec![self.clone()])?.with_mode(Some(EvaluationMode::Image))
    }

    fn forward(&self) -> SharedTransform<B> {
        match self.orientation() {
            Orientation::SourceToTarget => self.clone(),
            Orientation::TargetToSource => self.reoriented(Orientation::SourceToTarget),
        }
    }

    fn backward(&self) -> SharedTransform<B> {
        match self.orientation() {
            Orientation::TargetToSource => self.clone(),
            Orientation::SourceToTarget => self.reoriented(Orientation::TargetToSource),
        }
    }

    fn force_inverse(
        &self,
        grid: &[usize],
        device: &B::Device,
        solver: Option<&dyn InverseSolver<B>>,
    ) -> Result<SharedTransform<B>> {
        force_inverse(self, grid, device, solver)
    }
}
