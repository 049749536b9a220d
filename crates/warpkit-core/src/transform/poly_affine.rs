//! Region-weighted blends of affine transforms.
//!
//! Both transforms here combine one homogeneous matrix per region, with
//! weights derived from caller-supplied distance maps sampled on a region
//! grid. Computing those maps is the caller's business.

use std::sync::Arc;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::matrix::{apply_matrix, invert, stretch_translation};
use super::record::{ParamRecord, TransformRecord};
use super::trait_::{broadcast_batch, prepare_coordinates, Orientation, SharedTransform, Transform, TransformKind};
use crate::array::{coordinate_grid, TaggedTensor};
use crate::error::{Result, TransformError};
use crate::interpolation::{sample, FillPolicy, InterpolationMethod};

/// Number of squarings used to integrate the velocity field.
pub const DEFAULT_SQUARINGS: usize = 6;
/// Exponent of the inverse-distance weights.
pub const DEFAULT_ORDER: f32 = 2.0;

const WEIGHT_EPSILON: f32 = 1e-5;

/// Common batch size of two leading axes where 1 broadcasts.
fn unify_batch(a: usize, b: usize) -> Result<usize> {
    match (a, b) {
        (a, b) if a == b => Ok(a),
        (1, b) => Ok(b),
        (a, 1) => Ok(a),
        (a, b) => Err(TransformError::batch_mismatch(a, b)),
    }
}

/// Region matrices, distance maps and the grid they live on.
#[derive(Debug, Clone)]
struct Regions<B: Backend> {
    /// `[batch, regions, ndim + 1, ndim + 1]`
    matrices: Tensor<B, 4>,
    /// `[batch, regions, voxels]`
    distances: Tensor<B, 3>,
    grid: Vec<usize>,
}

impl<B: Backend> Regions<B> {
    fn new(matrices: Tensor<B, 4>, distances: Tensor<B, 3>, grid: Vec<usize>) -> Result<Self> {
        let [matrix_batch, regions, rows, cols] = matrices.dims();
        if rows != cols || rows < 2 || regions == 0 {
            return Err(TransformError::shape(
                "[batch, regions, ndim + 1, ndim + 1]",
                &[matrix_batch, regions, rows, cols],
            ));
        }
        let [distance_batch, count, voxels] = distances.dims();
        if count != regions || voxels != grid.iter().product::<usize>() || rows - 1 != grid.len() {
            return Err(TransformError::shape(
                format!(
                    "{} distance maps over a {}-D grid of {} voxels",
                    regions,
                    rows - 1,
                    grid.iter().product::<usize>()
                ),
                &[distance_batch, count, voxels],
            ));
        }
        let batch = unify_batch(matrix_batch, distance_batch)?;
        Ok(Self {
            matrices: broadcast_batch(matrices, batch)?,
            distances: broadcast_batch(distances, batch)?,
            grid,
        })
    }

    fn ndim(&self) -> usize {
        self.grid.len()
    }

    fn batch(&self) -> usize {
        self.matrices.dims()[0]
    }

    fn count(&self) -> usize {
        self.matrices.dims()[1]
    }

    /// Matrices after `f` has run over the flattened
    /// `[batch * regions, ndim + 1, ndim + 1]` stack.
    fn map_matrices(&self, f: impl FnOnce(Tensor<B, 3>) -> Result<Tensor<B, 3>>) -> Result<Tensor<B, 4>> {
        let [batch, regions, size, _] = self.matrices.dims();
        let flat = f(self.matrices.clone().reshape([batch * regions, size, size]))?;
        Ok(flat.reshape([batch, regions, size, size]))
    }

    /// Matrices of region `r`, `[batch, ndim + 1, ndim + 1]`.
    fn region(matrices: &Tensor<B, 4>, r: usize) -> Tensor<B, 3> {
        let [batch, _, size, _] = matrices.dims();
        matrices.clone().narrow(1, r, 1).reshape([batch, size, size])
    }

    /// Normalised inverse-distance weights `[batch, regions, 1, voxels]`.
    fn weights(&self, order: f32, offset: f32) -> Tensor<B, 4> {
        let raw = self
            .distances
            .clone()
            .add_scalar(offset)
            .clamp_min(0.0)
            .powf_scalar(order)
            .add_scalar(WEIGHT_EPSILON)
            .recip();
        let total = raw.clone().sum_dim(1);
        (raw / total).unsqueeze_dim::<4>(2)
    }

    /// Every region matrix applied to the grid, `[batch, regions, ndim,
    /// voxels]`, together with the grid itself `[batch, ndim, voxels]`.
    fn mapped_grid(&self) -> (Tensor<B, 4>, Tensor<B, 3>) {
        let [batch, regions, size, _] = self.matrices.dims();
        let grid = coordinate_grid::<B>(&self.grid, &self.matrices.device()).tensor();
        let [_, n, voxels] = grid.dims();
        let flat = self.matrices.clone().reshape([batch * regions, size, size]);
        let mapped = apply_matrix(flat, grid.clone().repeat_dim(0, batch * regions));
        (mapped.reshape([batch, regions, n, voxels]), grid.repeat_dim(0, batch))
    }

    fn records(&self) -> Result<Vec<ParamRecord>> {
        Ok(vec![
            ParamRecord::from_tensor("matrices", &self.matrices)?,
            ParamRecord::from_tensor("distances", &self.distances)?,
            ParamRecord::indices("grid", &self.grid),
        ])
    }

    fn from_record(record: &TransformRecord, device: &B::Device) -> Result<Self> {
        Self::new(
            record.param("matrices")?.to_tensor::<B, 4>(device)?,
            record.param("distances")?.to_tensor::<B, 3>(device)?,
            record.param("grid")?.to_indices(),
        )
    }
}

/// Scalar parameter of a record, or `default` when absent.
fn scalar(record: &TransformRecord, name: &str, default: f32) -> f32 {
    record
        .optional_param(name)
        .and_then(|p| p.values.first().copied())
        .unwrap_or(default)
}

/// Log-Euclidean style polyaffine transform.
///
/// The velocity `D(g) = sum_i w_i(g) M_i g - g` on the region grid is
/// integrated by scaling and squaring into a displacement field, which is
/// then interpolated at the input coordinates. The inverse integrates the
/// negated velocity. Every batch carries its own region matrices and
/// distance maps.
#[derive(Debug, Clone)]
pub struct PolyAffine<B: Backend> {
    regions: Regions<B>,
    order: f32,
    offset: f32,
    squarings: usize,
    negated: bool,
    /// Integrated displacement `[batch, ndim, voxels]` on the region grid.
    field: Tensor<B, 3>,
    orientation: Orientation,
}

impl<B: Backend> PolyAffine<B> {
    /// Create a single-batch polyaffine transform with the default weight
    /// order and number of squarings.
    ///
    /// # Arguments
    /// * `matrices` - Region matrices `[regions, ndim + 1, ndim + 1]`
    /// * `distances` - Distance of every grid voxel to each region `[regions, voxels]`
    /// * `grid` - Spatial shape of the region grid
    pub fn new(matrices: Tensor<B, 3>, distances: Tensor<B, 2>, grid: Vec<usize>) -> Result<Self> {
        Self::batched(matrices.unsqueeze_dim::<4>(0), distances.unsqueeze_dim::<3>(0), grid)
    }

    /// Batched form of [`Self::new`].
    ///
    /// # Arguments
    /// * `matrices` - `[batch, regions, ndim + 1, ndim + 1]`
    /// * `distances` - `[batch, regions, voxels]`; a batch of 1 is shared
    /// * `grid` - Spatial shape of the region grid
    pub fn batched(matrices: Tensor<B, 4>, distances: Tensor<B, 3>, grid: Vec<usize>) -> Result<Self> {
        Self::build(
            Regions::new(matrices, distances, grid)?,
            DEFAULT_ORDER,
            1.0,
            DEFAULT_SQUARINGS,
            false,
        )
    }

    /// Use another exponent for the inverse-distance weights.
    pub fn with_order(self, order: f32) -> Result<Self> {
        Self::build(self.regions, order, self.offset, self.squarings, self.negated)
    }

    /// Use another number of squarings; zero applies the velocity once.
    pub fn with_squarings(self, squarings: usize) -> Result<Self> {
        Self::build(self.regions, self.order, self.offset, squarings, self.negated)
    }

    /// Multiply the translation column of every region matrix by `factor`.
    /// Optimizers use this to put translations on the scale of the linear
    /// block.
    pub fn with_translation_stretch(self, factor: f32) -> Result<Self> {
        let matrices = self.regions.map_matrices(|m| Ok(stretch_translation(m, factor)))?;
        let regions = Regions {
            matrices,
            ..self.regions
        };
        let mut poly = Self::build(regions, self.order, self.offset, self.squarings, self.negated)?;
        poly.orientation = self.orientation;
        Ok(poly)
    }

    fn build(regions: Regions<B>, order: f32, offset: f32, squarings: usize, negated: bool) -> Result<Self> {
        let field = integrate(&regions, order, offset, squarings, negated)?;
        Ok(Self {
            regions,
            order,
            offset,
            squarings,
            negated,
            field,
            orientation: Orientation::TargetToSource,
        })
    }

    pub fn squarings(&self) -> usize {
        self.squarings
    }

    /// Region matrices, `[batch, regions, ndim + 1, ndim + 1]`.
    pub fn matrices(&self) -> Tensor<B, 4> {
        self.regions.matrices.clone()
    }

    /// The integrated displacement on the region grid, `[batch, ndim, voxels]`.
    pub fn field(&self) -> Tensor<B, 3> {
        self.field.clone()
    }

    pub fn from_record(record: &TransformRecord, device: &B::Device) -> Result<Self> {
        let mut poly = Self::build(
            Regions::from_record(record, device)?,
            scalar(record, "order", DEFAULT_ORDER),
            scalar(record, "offset", 1.0),
            scalar(record, "squarings", DEFAULT_SQUARINGS as f32).round().max(0.0) as usize,
            record.flag("negated"),
        )?;
        poly.orientation = record.orientation;
        Ok(poly)
    }
}

/// Velocity on the region grid, integrated by scaling and squaring.
fn integrate<B: Backend>(
    regions: &Regions<B>,
    order: f32,
    offset: f32,
    squarings: usize,
    negated: bool,
) -> Result<Tensor<B, 3>> {
    let weights = regions.weights(order, offset);
    let (mapped, grid) = regions.mapped_grid();
    let [batch, n, voxels] = grid.dims();
    let blended = (mapped * weights).sum_dim(1).reshape([batch, n, voxels]);
    let mut velocity = blended - grid.clone();
    if negated {
        velocity = velocity.neg();
    }

    let mut field = velocity.div_scalar(2f32.powi(squarings as i32));
    for _ in 0..squarings {
        let displaced = grid.clone() + field.clone();
        let composed = sample(
            field.clone(),
            &regions.grid,
            displaced,
            InterpolationMethod::Linear,
            FillPolicy::Nearest,
        )?;
        field = field + composed;
    }
    Ok(field)
}

/// `x + u(x)` with `u` interpolated from a `[batch, ndim, voxels]` field on
/// `grid`.
fn displace<B: Backend>(x: &TaggedTensor<B>, field: &Tensor<B, 3>, grid: &[usize]) -> Result<TaggedTensor<B>> {
    let x = prepare_coordinates(x, Some(grid.len()), Some(field.dims()[0]))?;
    let offsets = if x.spatial_shape() == grid {
        broadcast_batch(field.clone().to_device(&x.device()), x.batch_size())?
    } else {
        sample(
            field.clone().to_device(&x.device()),
            grid,
            x.tensor(),
            InterpolationMethod::Linear,
            FillPolicy::Nearest,
        )?
    };
    x.with_data(x.tensor() + offsets)
}

impl<B: Backend> Transform<B> for PolyAffine<B> {
    fn kind(&self) -> TransformKind {
        TransformKind::PolyAffine
    }

    fn ndim(&self) -> Option<usize> {
        Some(self.regions.ndim())
    }

    fn batch_size(&self) -> Option<usize> {
        Some(self.regions.batch())
    }

    fn orientation(&self) -> Orientation {
        self.orientation
    }

    fn apply(&self, x: &TaggedTensor<B>) -> Result<TaggedTensor<B>> {
        displace(x, &self.field, &self.regions.grid)
    }

    fn inverse(&self) -> Result<Option<SharedTransform<B>>> {
        let mut inverse = Self::build(
            self.regions.clone(),
            self.order,
            self.offset,
            self.squarings,
            !self.negated,
        )?;
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
        let mut record =
            TransformRecord::new(TransformKind::PolyAffine, self.ndim(), self.batch_size(), self.orientation);
        for param in self.regions.records()? {
            record = record.with_param(param);
        }
        Ok(record
            .with_param(ParamRecord::scalars("order", vec![self.order]))
            .with_param(ParamRecord::scalars("offset", vec![self.offset]))
            .with_param(ParamRecord::scalars("squarings", vec![self.squarings as f32]))
            .with_param(ParamRecord::scalars("negated", vec![self.negated as u8 as f32])))
    }
}

/// Locally affine transform.
///
/// Inside region `i` (mask 1) a point moves by `M_i` alone; elsewhere the
/// region matrices are blended with inverse-distance weights:
/// `sum_i w_i M_i x * (1 - sum_i mask_i) + sum_i mask_i M_i x`.
#[derive(Debug, Clone)]
pub struct LocallyAffine<B: Backend> {
    regions: Regions<B>,
    /// `[batch, regions, voxels]`, 1 inside a region and 0 outside
    masks: Tensor<B, 3>,
    order: f32,
    orientation: Orientation,
}

impl<B: Backend> LocallyAffine<B> {
    /// Create a single-batch locally affine transform.
    ///
    /// # Arguments
    /// * `matrices` - Region matrices `[regions, ndim + 1, ndim + 1]`
    /// * `masks` - Region masks `[regions, voxels]`
    /// * `distances` - Distance of every grid voxel to each region `[regions, voxels]`
    /// * `grid` - Spatial shape of the region grid
    pub fn new(matrices: Tensor<B, 3>, masks: Tensor<B, 2>, distances: Tensor<B, 2>, grid: Vec<usize>) -> Result<Self> {
        Self::batched(
            matrices.unsqueeze_dim::<4>(0),
            masks.unsqueeze_dim::<3>(0),
            distances.unsqueeze_dim::<3>(0),
            grid,
        )
    }

    /// Batched form of [`Self::new`]: matrices `[batch, regions, ndim + 1,
    /// ndim + 1]`, masks and distances `[batch, regions, voxels]`. A batch
    /// of 1 in any of them is shared.
    pub fn batched(
        matrices: Tensor<B, 4>,
        masks: Tensor<B, 3>,
        distances: Tensor<B, 3>,
        grid: Vec<usize>,
    ) -> Result<Self> {
        let batch = unify_batch(matrices.dims()[0], masks.dims()[0])?;
        let regions = Regions::new(broadcast_batch(matrices, batch)?, distances, grid)?;
        let [batch, count, voxels] = regions.distances.dims();
        let [_, mask_count, mask_voxels] = masks.dims();
        if (mask_count, mask_voxels) != (count, voxels) {
            return Err(TransformError::shape(
                format!("masks shaped like the distance maps {:?}", [batch, count, voxels]),
                &masks.dims(),
            ));
        }
        Ok(Self {
            regions,
            masks: broadcast_batch(masks, batch)?,
            order: DEFAULT_ORDER,
            orientation: Orientation::TargetToSource,
        })
    }

    pub fn with_order(mut self, order: f32) -> Self {
        self.order = order;
        self
    }

    pub fn from_record(record: &TransformRecord, device: &B::Device) -> Result<Self> {
        let regions = Regions::from_record(record, device)?;
        let masks = record.param("masks")?.to_tensor::<B, 3>(device)?;
        let mut local = Self::batched(regions.matrices, masks, regions.distances, regions.grid)?;
        local.order = scalar(record, "order", DEFAULT_ORDER);
        local.orientation = record.orientation;
        Ok(local)
    }

    /// A `[batch, regions, voxels]` map on the region grid sampled at the
    /// input points, `[batch, regions, samples]`.
    fn sample_maps(&self, map: Tensor<B, 3>, coords: &Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        sample(
            map.to_device(&coords.device()),
            &self.regions.grid,
            coords.clone(),
            InterpolationMethod::Linear,
            FillPolicy::Nearest,
        )
    }
}

impl<B: Backend> Transform<B> for LocallyAffine<B> {
    fn kind(&self) -> TransformKind {
        TransformKind::LocallyAffine
    }

    fn ndim(&self) -> Option<usize> {
        Some(self.regions.ndim())
    }

    fn batch_size(&self) -> Option<usize> {
        Some(self.regions.batch())
    }

    fn orientation(&self) -> Orientation {
        self.orientation
    }

    fn apply(&self, x: &TaggedTensor<B>) -> Result<TaggedTensor<B>> {
        let x = prepare_coordinates(x, self.ndim(), self.batch_size())?;
        let coords = x.tensor();
        let [batch, n, samples] = coords.dims();
        let weights = self.regions.weights(self.order, 0.0);
        let [own_batch, regions, _, voxels] = weights.dims();

        let weights = self.sample_maps(weights.reshape([own_batch, regions, voxels]), &coords)?;
        let masks = self.sample_maps(self.masks.clone(), &coords)?;

        // [batch, regions, ndim, samples]
        let matrices = self.regions.matrices.clone().to_device(&coords.device());
        let mapped = (0..regions)
            .map(|r| Ok(apply_matrix(broadcast_batch(Regions::region(&matrices, r), batch)?, coords.clone())))
            .collect::<Result<Vec<Tensor<B, 3>>>>()?;
        let mapped = Tensor::stack::<4>(mapped, 1);

        let weights = weights.unsqueeze_dim::<4>(2);
        let masks = masks.unsqueeze_dim::<4>(2);
        let blended = (mapped.clone() * weights).sum_dim(1).reshape([batch, n, samples]);
        let inside = (mapped * masks.clone()).sum_dim(1).reshape([batch, n, samples]);
        let coverage = masks.sum_dim(1).reshape([batch, 1, samples]);
        let out = blended * coverage.neg().add_scalar(1.0) + inside;
        x.with_data(out)
    }

    /// A single-step polyaffine of the inverted matrices, with each
    /// region's mask and distance map carried along by its inverse.
    fn inverse(&self) -> Result<Option<SharedTransform<B>>> {
        let inverted = self.regions.map_matrices(invert)?;
        let (batch, regions) = (self.regions.batch(), self.regions.count());
        let grid = &self.regions.grid;
        let device = inverted.device();
        let lattice = coordinate_grid::<B>(grid, &device).tensor().repeat_dim(0, batch);
        let voxels = lattice.dims()[2];

        let mut distances = Vec::with_capacity(regions);
        for r in 0..regions {
            let sources = apply_matrix(Regions::region(&inverted, r), lattice.clone());
            let pull = |map: &Tensor<B, 3>, method| {
                sample(map.clone().narrow(1, r, 1), grid, sources.clone(), method, FillPolicy::Nearest)
            };
            let distance = pull(&self.regions.distances, InterpolationMethod::Linear)?;
            let mask = pull(&self.masks, InterpolationMethod::Nearest)?;
            // Zero distance inside the warped region pins the blend to it.
            distances.push((distance * mask.neg().add_scalar(1.0)).reshape([batch, 1, voxels]));
        }
        let distances = Tensor::cat(distances, 1);

        let mut poly = PolyAffine::build(Regions::new(inverted, distances, grid.clone())?, self.order, 0.0, 0, false)?;
        poly.orientation = self.orientation;
        Ok(Some(Arc::new(poly)))
    }

    fn reoriented(&self, orientation: Orientation) -> SharedTransform<B> {
        Arc::new(Self {
            orientation,
            ..self.clone()
        })
    }

    fn record(&self) -> Result<TransformRecord> {
        let mut record =
            TransformRecord::new(TransformKind::LocallyAffine, self.ndim(), self.batch_size(), self.orientation);
        for param in self.regions.records()? {
            record = record.with_param(param);
        }
        Ok(record
            .with_param(ParamRecord::from_tensor("masks", &self.masks)?)
            .with_param(ParamRecord::scalars("order", vec![self.order])))
    }
}
