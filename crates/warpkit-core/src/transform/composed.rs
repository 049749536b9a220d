//! Composition of transforms.
//!
//! A [`ComposedTransform`] holds a flat list of shared transforms and keeps
//! track of what the whole chain looks like from outside: its
//! dimensionality, batch size, reshape metadata and whether every element
//! acts on coordinates. It evaluates either on coordinates or on an image.

use std::sync::Arc;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use super::affine::Affine;
use super::ext::{fake_inverse, force_inverse};
use super::flipped::OrientationFlippedView;
use super::matrix::invert;
use super::record::TransformRecord;
use super::trait_::{
    broadcast_batch, resolve_ndim, EvaluationMode, InverseSolver, Orientation, SharedTransform, Transform,
    TransformKind,
};
use crate::array::TaggedTensor;
use crate::error::{Result, TransformError};
use crate::filter::resample::{ResampleOptions, Resampler};
use crate::reshape::ReshapeDescriptor;

/// What [`ComposedTransform::invert`] does with elements that have no
/// closed-form inverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InversePolicy {
    /// Fail with `Unsupported`.
    Exact,
    /// Substitute the element's orientation-flipped view and log a warning.
    #[default]
    AllowApproximate,
}

/// An ordered chain of transforms evaluated as one.
///
/// Elements are listed in the order they act on an image. On coordinates
/// they are applied last to first, so `[A, B]` maps `x` to `A(B(x))`.
#[derive(Debug, Clone)]
pub struct ComposedTransform<B: Backend> {
    elements: Vec<SharedTransform<B>>,
    mode: Option<EvaluationMode>,
    ndim: Option<usize>,
    batch_size: Option<usize>,
    reshape: ReshapeDescriptor,
    solver: Option<Arc<dyn InverseSolver<B>>>,
    resample: ResampleOptions,
}

impl<B: Backend> ComposedTransform<B> {
    /// Compose transforms, flattening nested compositions.
    ///
    /// Fails when two elements disagree on their dimensionality, or on a
    /// batch size larger than one.
    pub fn new(elements: Vec<SharedTransform<B>>) -> Result<Self> {
        let mut flat: Vec<SharedTransform<B>> = Vec::with_capacity(elements.len());
        for element in elements {
            match element.as_composed() {
                Some(nested) => flat.extend(nested.elements.iter().cloned()),
                None => flat.push(element),
            }
        }

        let mut ndim = None;
        let mut batch_size = None;
        for element in &flat {
            if let Some(n) = element.ndim() {
                ndim = resolve_ndim(ndim, Some(n))?;
            }
            if let Some(b) = element.batch_size() {
                batch_size = match batch_size {
                    None | Some(1) => Some(b),
                    Some(own) if b == 1 || b == own => Some(own),
                    Some(own) => return Err(TransformError::batch_mismatch(own, b)),
                };
            }
        }

        let descriptors: Vec<ReshapeDescriptor> = flat.iter().map(|e| e.reshape()).collect();
        let reshape = ReshapeDescriptor::compose_all(&descriptors);

        Ok(Self {
            elements: flat,
            mode: None,
            ndim,
            batch_size,
            reshape,
            solver: None,
            resample: ResampleOptions::default(),
        })
    }

    /// Fix the evaluation mode. Coordinate mode needs every element to be
    /// a coordinate transform.
    pub fn with_mode(mut self, mode: Option<EvaluationMode>) -> Result<Self> {
        if mode == Some(EvaluationMode::Coordinate) {
            self.require_spatial()?;
        }
        self.mode = mode;
        Ok(self)
    }

    /// Invert forward elements numerically when they have no closed form.
    pub fn with_inverse_solver(mut self, solver: Arc<dyn InverseSolver<B>>) -> Self {
        self.solver = Some(solver);
        self
    }

    /// Interpolation settings used in image mode.
    pub fn with_resample_options(mut self, options: ResampleOptions) -> Self {
        self.resample = options;
        self
    }

    pub fn elements(&self) -> &[SharedTransform<B>] {
        &self.elements
    }

    pub fn mode(&self) -> Option<EvaluationMode> {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// True when every element is a coordinate transform.
    pub fn is_fully_spatial(&self) -> bool {
        self.elements.iter().all(|e| e.is_coordinate())
    }

    fn require_spatial(&self) -> Result<()> {
        if self.is_fully_spatial() {
            Ok(())
        } else {
            Err(TransformError::unsupported(
                "coordinate evaluation of a chain containing image transforms",
            ))
        }
    }

    /// Same elements and settings, different list.
    fn rebuilt(&self, elements: Vec<SharedTransform<B>>) -> Result<Self> {
        let mut composed = Self::new(elements)?.with_mode(self.mode)?;
        composed.solver = self.solver.clone();
        composed.resample = self.resample.clone();
        Ok(composed)
    }

    /// Decide how to read `x`.
    ///
    /// An explicit mode wins, then the configured one. Otherwise an input
    /// without a channel axis is an image, and an input whose channel count
    /// differs from the chain's dimensionality too. When the channel count
    /// and the spatial rank both equal the dimensionality the input is
    /// ambiguous and the chain decides: coordinates if every element is a
    /// coordinate transform.
    pub fn resolve_mode(&self, x: &TaggedTensor<B>, explicit: Option<EvaluationMode>) -> EvaluationMode {
        if let Some(mode) = explicit.or(self.mode) {
            return mode;
        }
        if !x.has_channel() {
            return EvaluationMode::Image;
        }
        if let Some(n) = self.ndim {
            if x.channels() != n {
                return EvaluationMode::Image;
            }
            if x.n_space() != n {
                return EvaluationMode::Coordinate;
            }
        }
        if self.is_fully_spatial() {
            EvaluationMode::Coordinate
        } else {
            EvaluationMode::Image
        }
    }

    /// Evaluate the chain on `x` in the given or resolved mode.
    pub fn apply_with_mode(&self, x: &TaggedTensor<B>, mode: Option<EvaluationMode>) -> Result<TaggedTensor<B>> {
        let mode = self.resolve_mode(x, mode);
        tracing::debug!(?mode, elements = self.elements.len(), shape = ?x.shape(), "evaluating composition");
        match mode {
            EvaluationMode::Coordinate => self.apply_coordinates(x),
            EvaluationMode::Image => self.apply_image(x),
        }
    }

    fn apply_coordinates(&self, x: &TaggedTensor<B>) -> Result<TaggedTensor<B>> {
        self.require_spatial()?;
        let device = x.device();
        let mut y = x.clone();
        for element in self.elements.iter().rev() {
            let element = if element.orientation().is_target_to_source() {
                element.clone()
            } else {
                force_inverse(element, x.spatial_shape(), &device, self.solver.as_deref())?
            };
            y = element.apply(&y)?;
        }
        Ok(y.restore_layout(x.layout()))
    }

    fn apply_image(&self, x: &TaggedTensor<B>) -> Result<TaggedTensor<B>> {
        let original = x.layout();
        let mut image = x.clone().with_roles(self.ndim)?;
        let mut run: Vec<SharedTransform<B>> = Vec::new();
        for element in &self.elements {
            if !element.is_coordinate() {
                image = self.resample_run(image, &mut run)?;
                image = element.apply(&image)?;
            } else if element.orientation().is_target_to_source() {
                run.push(element.clone());
            } else {
                // Forward elements resample alone, after whatever is pending
                image = self.resample_run(image, &mut run)?;
                let view = self.backward_view(element, image.spatial_shape(), &image.device())?;
                image = Resampler::with_options(self.resample.clone()).resample(&image, Some(view.as_ref()))?;
            }
        }
        let image = self.resample_run(image, &mut run)?;
        Ok(image.restore_layout(original))
    }

    /// A forward element as something the resampler can pull through.
    fn backward_view(
        &self,
        element: &SharedTransform<B>,
        grid: &[usize],
        device: &B::Device,
    ) -> Result<SharedTransform<B>> {
        match force_inverse(element, grid, device, self.solver.as_deref()) {
            Ok(inverse) => Ok(inverse.reoriented(Orientation::TargetToSource)),
            Err(TransformError::Unsupported(_)) => {
                tracing::warn!(
                    kind = %element.kind(),
                    "no inverse available, resampling through the flipped transform instead"
                );
                Ok(fake_inverse(element))
            }
            Err(e) => Err(e),
        }
    }

    /// Resample `image` through the pending coordinate elements.
    fn resample_run(&self, image: TaggedTensor<B>, run: &mut Vec<SharedTransform<B>>) -> Result<TaggedTensor<B>> {
        if run.is_empty() {
            return Ok(image);
        }
        let chain = Self::new(std::mem::take(run))?.with_mode(Some(EvaluationMode::Coordinate))?;
        Resampler::with_options(self.resample.clone()).resample(&image, Some(&chain))
    }

    /// The inverse chain: element inverses in reverse order.
    ///
    /// Coordinate elements without a closed-form inverse are replaced by
    /// their flipped view under [`InversePolicy::AllowApproximate`]; image
    /// elements without one always fail.
    pub fn invert(&self, policy: InversePolicy) -> Result<Self> {
        let mut inverses = Vec::with_capacity(self.elements.len());
        for element in self.elements.iter().rev() {
            match element.inverse()? {
                Some(inverse) => inverses.push(inverse),
                None if element.is_coordinate() && policy == InversePolicy::AllowApproximate => {
                    tracing::warn!(kind = %element.kind(), "approximating inverse by flipping orientation");
                    inverses.push(fake_inverse(element));
                }
                None => {
                    return Err(TransformError::unsupported(format!(
                        "{} has no closed-form inverse",
                        element.kind()
                    )))
                }
            }
        }
        self.rebuilt(inverses)
    }

    /// Merge runs of consecutive linear elements into single [`Affine`]s
    /// whose matrices live on `device`.
    pub fn fold_affine(&self, device: &B::Device) -> Result<Self> {
        let mut folded: Vec<SharedTransform<B>> = Vec::with_capacity(self.elements.len());
        let mut current: Option<Tensor<B, 3>> = None;
        for element in &self.elements {
            let matrix = if element.is_coordinate() {
                element.affine_matrix(self.ndim, device)?
            } else {
                None
            };
            match matrix {
                Some(matrix) => {
                    current = Some(match current.take() {
                        Some(acc) => batched_matmul(acc, matrix)?,
                        None => matrix,
                    });
                }
                None => {
                    if let Some(acc) = current.take() {
                        folded.push(Arc::new(Affine::new(acc)?));
                    }
                    folded.push(element.clone());
                }
            }
        }
        if let Some(acc) = current {
            folded.push(Arc::new(Affine::new(acc)?));
        }
        self.rebuilt(folded)
    }

    /// Express the chain between world coordinates: `source_affine` maps
    /// source voxels to world, `target_affine` target voxels to world.
    pub fn to_world_space(&self, source_affine: Tensor<B, 3>, target_affine: Tensor<B, 3>) -> Result<Self> {
        let to_target_voxels = invert(target_affine)?;
        self.sandwich(source_affine, to_target_voxels)
    }

    /// The opposite of [`Self::to_world_space`]: turn a chain between world
    /// coordinates into one between voxel coordinates.
    pub fn to_image_space(&self, source_affine: Tensor<B, 3>, target_affine: Tensor<B, 3>) -> Result<Self> {
        let from_source_world = invert(source_affine)?;
        self.sandwich(from_source_world, target_affine)
    }

    fn sandwich(&self, outer: Tensor<B, 3>, inner: Tensor<B, 3>) -> Result<Self> {
        let elements: Vec<SharedTransform<B>> = vec![
            Arc::new(Affine::new(outer)?),
            Arc::new(self.clone()),
            Arc::new(Affine::new(inner)?),
        ];
        self.rebuilt(elements)?.with_mode(Some(EvaluationMode::Coordinate))
    }
}

/// `a @ b` with a singleton batch on either side broadcast.
fn batched_matmul<B: Backend>(a: Tensor<B, 3>, b: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
    let b = b.to_device(&a.device());
    let [batch_a, ..] = a.dims();
    let [batch_b, ..] = b.dims();
    let batch = batch_a.max(batch_b);
    Ok(broadcast_batch(a, batch)?.matmul(broadcast_batch(b, batch)?))
}

/// Compose transforms into one chain.
pub fn compose<B: Backend>(elements: impl IntoIterator<Item = SharedTransform<B>>) -> Result<ComposedTransform<B>> {
    ComposedTransform::new(elements.into_iter().collect())
}

impl<B: Backend> Transform<B> for ComposedTransform<B> {
    fn kind(&self) -> TransformKind {
        TransformKind::Composed
    }

    fn ndim(&self) -> Option<usize> {
        self.ndim
    }

    fn batch_size(&self) -> Option<usize> {
        self.batch_size
    }

    fn orientation(&self) -> Orientation {
        if self.is_fully_spatial() {
            Orientation::TargetToSource
        } else {
            Orientation::SourceToTarget
        }
    }

    fn reshape(&self) -> ReshapeDescriptor {
        self.reshape.clone()
    }

    fn is_coordinate(&self) -> bool {
        self.is_fully_spatial()
    }

    fn apply(&self, x: &TaggedTensor<B>) -> Result<TaggedTensor<B>> {
        self.apply_with_mode(x, None)
    }

    /// Product of the element matrices when every element is linear.
    fn affine_matrix(&self, ndim: Option<usize>, device: &B::Device) -> Result<Option<Tensor<B, 3>>> {
        let ndim = resolve_ndim(self.ndim, ndim)?;
        if !self.is_fully_spatial() {
            return Ok(None);
        }
        let mut product: Option<Tensor<B, 3>> = None;
        for element in &self.elements {
            let Some(matrix) = element.affine_matrix(ndim, device)? else {
                return Ok(None);
            };
            product = Some(match product {
                Some(acc) => batched_matmul(acc, matrix)?,
                None => matrix,
            });
        }
        Ok(product)
    }

    fn inverse(&self) -> Result<Option<SharedTransform<B>>> {
        match self.invert(InversePolicy::Exact) {
            Ok(inverse) => Ok(Some(Arc::new(inverse))),
            Err(TransformError::Unsupported(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn reoriented(&self, orientation: Orientation) -> SharedTransform<B> {
        let this: SharedTransform<B> = Arc::new(self.clone());
        if orientation == self.orientation() {
            this
        } else {
            Arc::new(OrientationFlippedView::new(this))
        }
    }

    fn record(&self) -> Result<TransformRecord> {
        let mut record = TransformRecord::new(TransformKind::Composed, self.ndim, self.batch_size, self.orientation())
            .with_reshape(self.reshape.clone())
            .with_mode(self.mode);
        for element in &self.elements {
            record = record.with_child(element.record()?);
        }
        Ok(record)
    }

    fn as_composed(&self) -> Option<&ComposedTransform<B>> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{coordinate_grid, AxisLayout};
    use crate::transform::displacement_field::DenseDisplacementField;
    use crate::transform::intensity::Normalize;
    use crate::transform::rescale::Rescale;
    use crate::transform::rotation::Rotation90;
    use crate::transform::translation::Translation;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn shift(offsets: &[f32]) -> SharedTransform<TestBackend> {
        Arc::new(Translation::from_offsets(offsets, &Default::default()))
    }

    fn assert_close(a: &[f32], b: &[f32]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-4, "{} != {}", x, y);
        }
    }

    #[test]
    fn test_flattening() {
        let inner = compose(vec![shift(&[1.0, 0.0]), shift(&[0.0, 1.0])]).unwrap();
        let outer = compose(vec![Arc::new(inner) as SharedTransform<TestBackend>, shift(&[2.0, 2.0])]).unwrap();
        assert_eq!(outer.len(), 3);
        assert!(outer.elements().iter().all(|e| e.kind() == TransformKind::Translation));
        assert_eq!(outer.ndim(), Some(2));
    }

    #[test]
    fn test_dimension_and_batch_checks() {
        let mismatch = compose(vec![shift(&[1.0, 0.0]), shift(&[1.0, 0.0, 0.0])]);
        assert!(matches!(mismatch, Err(TransformError::DimensionMismatch { .. })));

        let device = Default::default();
        let two: SharedTransform<TestBackend> = Arc::new(Translation::new(Tensor::zeros([2, 2], &device)));
        let three: SharedTransform<TestBackend> = Arc::new(Translation::new(Tensor::zeros([3, 2], &device)));
        let chain = compose(vec![two.clone(), shift(&[1.0, 1.0])]).unwrap();
        assert_eq!(chain.batch_size(), Some(2));
        assert!(matches!(compose(vec![two, three]), Err(TransformError::BatchMismatch { .. })));
    }

    #[test]
    fn test_reshape_folds_left_to_right() {
        let device = Default::default();
        let down: SharedTransform<TestBackend> =
            Arc::new(Rescale::new(Tensor::from_floats([[2.0, 1.0]], &device), true).unwrap());
        let turn: SharedTransform<TestBackend> = Arc::new(Rotation90::new(0, 1, None).unwrap());
        let chain = compose(vec![down, turn]).unwrap();
        assert_eq!(chain.reshape().apply(&[8, 6]).unwrap(), vec![6, 4]);
    }

    #[test]
    fn test_coordinate_order() {
        let device = Default::default();
        let scale: SharedTransform<TestBackend> =
            Arc::new(Rescale::new(Tensor::from_floats([[2.0]], &device), false).unwrap());
        let chain = compose(vec![scale, shift(&[1.0, 1.0])]).unwrap();
        let point = TaggedTensor::<TestBackend>::from_floats(vec![1.0, 2.0], &[2, 1], AxisLayout::CHANNEL, &device)
            .unwrap();
        let out = chain.apply_with_mode(&point, Some(EvaluationMode::Coordinate)).unwrap();
        // Translation first, then scaling.
        assert_eq!(out.to_vec().unwrap(), vec![4.0, 6.0]);
        assert_eq!(out.shape(), vec![2, 1]);
    }

    #[test]
    fn test_mode_resolution() {
        let device = Default::default();
        let chain = compose(vec![shift(&[1.0, 1.0])]).unwrap();
        let image = TaggedTensor::<TestBackend>::spatial_only(vec![0.0; 16], &[4, 4], &device).unwrap();
        assert_eq!(chain.resolve_mode(&image, None), EvaluationMode::Image);

        let grid = coordinate_grid::<TestBackend>(&[4, 4], &device);
        assert_eq!(chain.resolve_mode(&grid, None), EvaluationMode::Coordinate);

        let rgb = TaggedTensor::<TestBackend>::from_floats(vec![0.0; 48], &[3, 4, 4], AxisLayout::CHANNEL, &device)
            .unwrap();
        assert_eq!(chain.resolve_mode(&rgb, None), EvaluationMode::Image);
        assert_eq!(
            chain.resolve_mode(&rgb, Some(EvaluationMode::Coordinate)),
            EvaluationMode::Coordinate
        );

        let mixed = compose(vec![
            shift(&[1.0, 1.0]),
            Arc::new(Normalize::with_range(0.0, 1.0).unwrap()) as SharedTransform<TestBackend>,
        ])
        .unwrap();
        assert_eq!(mixed.resolve_mode(&grid, None), EvaluationMode::Image);
        assert!(mixed.clone().with_mode(Some(EvaluationMode::Coordinate)).is_err());
        assert!(mixed.apply_with_mode(&grid, Some(EvaluationMode::Coordinate)).is_err());
    }

    #[test]
    fn test_image_mode_resamples_runs() {
        let device = Default::default();
        let values: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let image = TaggedTensor::<TestBackend>::spatial_only(values, &[4, 4], &device).unwrap();
        let chain = compose(vec![
            shift(&[1.0, 0.0]),
            Arc::new(Normalize::with_range(0.0, 15.0).unwrap()) as SharedTransform<TestBackend>,
        ])
        .unwrap();
        let out = chain.apply(&image).unwrap();
        assert_eq!(out.shape(), vec![4, 4]);
        let out = out.to_vec().unwrap();
        // Row 0 reads row 1 (4..8), then everything is divided by 15.
        assert_close(&out[..4], &[4.0 / 15.0, 5.0 / 15.0, 6.0 / 15.0, 7.0 / 15.0]);
        assert_close(&out[12..], &[0.0; 4]);
    }

    #[test]
    fn test_forward_element_in_image_mode() {
        let device = Default::default();
        let values: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let image = TaggedTensor::<TestBackend>::spatial_only(values, &[4, 4], &device).unwrap();
        let forward = shift(&[1.0, 0.0]).reoriented(Orientation::SourceToTarget);
        let out = compose(vec![forward]).unwrap().apply(&image).unwrap().to_vec().unwrap();
        // Pushing forward by one row: row 1 now holds row 0.
        assert_close(&out[4..8], &[0.0, 1.0, 2.0, 3.0]);
        assert_close(&out[..4], &[0.0; 4]);
    }

    #[test]
    fn test_forward_element_is_not_fused_with_its_neighbours() {
        let device = Default::default();
        let ramp = TaggedTensor::<TestBackend>::spatial_only(vec![0.0, 4.0, 0.0, 4.0, 0.0, 4.0], &[6], &device)
            .unwrap();
        // Half a voxel back, then half a voxel forward: fused they cancel,
        // resampled separately each pass averages neighbours.
        let chain = compose(vec![shift(&[0.5]), shift(&[0.5]).reoriented(Orientation::SourceToTarget)]).unwrap();
        let out = chain
            .apply_with_mode(&ramp, Some(EvaluationMode::Image))
            .unwrap()
            .to_vec()
            .unwrap();
        assert_ne!(out, vec![0.0, 4.0, 0.0, 4.0, 0.0, 4.0]);
        assert_close(&out[1..5], &[2.0; 4]);
    }

    #[test]
    fn test_invert_policies() {
        let device = Default::default();
        let field: SharedTransform<TestBackend> = Arc::new(DenseDisplacementField::zeros(&[3, 3], &device));
        let chain = compose(vec![shift(&[1.0, 2.0]), field]).unwrap();

        assert!(matches!(
            chain.invert(InversePolicy::Exact),
            Err(TransformError::Unsupported(_))
        ));
        assert!(chain.inverse().unwrap().is_none());

        let approximate = chain.invert(InversePolicy::default()).unwrap();
        assert_eq!(approximate.elements()[0].kind(), TransformKind::OrientationFlipped);
        assert_eq!(approximate.elements()[1].kind(), TransformKind::Translation);

        let grid = coordinate_grid::<TestBackend>(&[3, 3], &device);
        let exact = compose(vec![shift(&[1.0, 2.0]), shift(&[-3.0, 0.5])]).unwrap();
        let inverse = exact.inverse().unwrap().unwrap();
        let back = inverse.apply(&exact.apply(&grid).unwrap()).unwrap();
        assert_close(&back.to_vec().unwrap(), &grid.to_vec().unwrap());
    }

    #[test]
    fn test_fold_affine_keeps_non_linear_elements() {
        let device = Default::default();
        let offsets = Tensor::<TestBackend, 3>::ones([1, 2, 16], &device).mul_scalar(0.25);
        let field: SharedTransform<TestBackend> =
            Arc::new(DenseDisplacementField::from_tensor(offsets, vec![4, 4]).unwrap());
        let scale: SharedTransform<TestBackend> =
            Arc::new(Rescale::new(Tensor::from_floats([[0.5, 2.0]], &device), false).unwrap());
        let chain = compose(vec![shift(&[1.0, 0.0]), scale, field, shift(&[0.0, -1.0])]).unwrap();

        let folded = chain.fold_affine(&device).unwrap();
        let kinds: Vec<TransformKind> = folded.elements().iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![TransformKind::Affine, TransformKind::DenseDisplacementField, TransformKind::Affine]
        );

        let grid = coordinate_grid::<TestBackend>(&[4, 4], &device);
        assert_close(
            &folded.apply(&grid).unwrap().to_vec().unwrap(),
            &chain.apply(&grid).unwrap().to_vec().unwrap(),
        );
    }

    #[test]
    fn test_world_space_sandwich() {
        let device = Default::default();
        let chain = compose(vec![shift(&[1.0, 0.0])]).unwrap();
        let spacing = Tensor::<TestBackend, 3>::from_floats([[[2.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 1.0]]], &device);
        let world = chain.to_world_space(spacing.clone(), spacing.clone()).unwrap();
        assert_eq!(world.mode(), Some(EvaluationMode::Coordinate));

        let point = TaggedTensor::<TestBackend>::from_floats(vec![4.0, 6.0], &[2, 1], AxisLayout::CHANNEL, &device)
            .unwrap();
        // World (4, 6) is voxel (2, 3), shifted to (3, 3), back to world (6, 6).
        assert_close(&world.apply(&point).unwrap().to_vec().unwrap(), &[6.0, 6.0]);

        let back = world.to_image_space(spacing.clone(), spacing).unwrap();
        let voxel = TaggedTensor::<TestBackend>::from_floats(vec![2.0, 3.0], &[2, 1], AxisLayout::CHANNEL, &device)
            .unwrap();
        assert_close(&back.apply(&voxel).unwrap().to_vec().unwrap(), &[3.0, 3.0]);
    }

    #[test]
    fn test_record_keeps_children_and_mode() {
        let chain = compose(vec![shift(&[1.0, 0.0]), shift(&[0.0, 1.0])])
            .unwrap()
            .with_mode(Some(EvaluationMode::Coordinate))
            .unwrap();
        let record = chain.record().unwrap();
        assert_eq!(record.kind, TransformKind::Composed);
        assert_eq!(record.children.len(), 2);
        assert_eq!(record.mode, Some(EvaluationMode::Coordinate));
    }
}
