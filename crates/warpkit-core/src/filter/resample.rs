//! Resample image filter.
//!
//! This module provides the [`Resampler`], which evaluates a transform on a
//! coordinate grid of the target space and reads the source image at the
//! resulting positions.

use std::sync::Arc;

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};
use serde::{Deserialize, Serialize};

use crate::array::{tracked_coordinate_grid, AllocationTracker, TaggedTensor};
use crate::error::{Result, TransformError};
use crate::interpolation::{FillPolicy, InterpolationMethod};
use crate::transform::trait_::{Orientation, SharedTransform, Transform};

const RANGE_EPSILON: f32 = 1e-6;

/// Resampling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampleOptions {
    /// Interpolation method.
    pub method: InterpolationMethod,
    /// What reads outside the source produce.
    pub fill: FillPolicy,
    /// Spatial shape of the output; derived from the transform's reshape
    /// descriptor when absent.
    pub target_shape: Option<Vec<usize>>,
    /// Return the derivative of the interpolation instead of the values.
    pub derivative: bool,
}

impl Default for ResampleOptions {
    fn default() -> Self {
        Self {
            method: InterpolationMethod::Linear,
            fill: FillPolicy::Zero,
            target_shape: None,
            derivative: false,
        }
    }
}

impl ResampleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, method: InterpolationMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_fill(mut self, fill: FillPolicy) -> Self {
        self.fill = fill;
        self
    }
}

/// Where the resampled values are read for.
#[derive(Debug, Clone)]
pub enum TargetSpace<B: Backend> {
    /// A regular grid of the given spatial shape.
    Grid(Vec<usize>),
    /// Source positions with a channel axis of size `ndim`, read as given.
    Coordinates(TaggedTensor<B>),
}

/// Resample image filter.
///
/// The transform maps target coordinates to source coordinates; a
/// `SourceToTarget` transform is resampled through its closed-form inverse.
///
/// # Type Parameters
/// * `B` - The Burn backend
#[derive(Debug, Clone)]
pub struct Resampler<B: Backend> {
    options: ResampleOptions,
    target_coordinates: Option<TaggedTensor<B>>,
    tracker: Option<Arc<AllocationTracker>>,
}

impl<B: Backend> Default for Resampler<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Resampler<B> {
    /// Create a resampler with linear interpolation and zero fill.
    pub fn new() -> Self {
        Self::with_options(ResampleOptions::default())
    }

    pub fn with_options(options: ResampleOptions) -> Self {
        Self {
            options,
            target_coordinates: None,
            tracker: None,
        }
    }

    pub fn options(&self) -> &ResampleOptions {
        &self.options
    }

    /// Set the interpolation method.
    pub fn with_method(mut self, method: InterpolationMethod) -> Self {
        self.options.method = method;
        self
    }

    /// Set the fill policy for reads outside the source.
    pub fn with_fill(mut self, fill: FillPolicy) -> Self {
        self.options.fill = fill;
        self
    }

    /// Resample onto a grid of this spatial shape.
    pub fn with_target_shape(mut self, shape: Vec<usize>) -> Self {
        self.options.target_shape = Some(shape);
        self
    }

    /// Sample the source directly at these coordinates. The transform is
    /// not applied to them. Takes precedence over a target shape.
    pub fn with_target_coordinates(mut self, coordinates: TaggedTensor<B>) -> Self {
        self.target_coordinates = Some(coordinates);
        self
    }

    /// Return the derivative of the interpolation with respect to the
    /// sample coordinates instead of the values.
    pub fn with_derivative(mut self, derivative: bool) -> Self {
        self.options.derivative = derivative;
        self
    }

    /// Record grid and output allocations in `tracker`.
    pub fn with_tracker(mut self, tracker: Arc<AllocationTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Resample `image` through `transform`, or through the identity when
    /// no transform is given.
    ///
    /// # Arguments
    /// * `image` - Source array `[batch?, channel?, spatial...]`
    /// * `transform` - Mapping from target to source coordinates
    ///
    /// # Returns
    /// The resampled array, keeping the role axes the caller supplied
    pub fn resample(&self, image: &TaggedTensor<B>, transform: Option<&dyn Transform<B>>) -> Result<TaggedTensor<B>> {
        let backward: Option<SharedTransform<B>> = match transform {
            Some(t) if !t.orientation().is_target_to_source() => {
                let inverse = t.inverse()?.ok_or_else(|| {
                    TransformError::unsupported(format!(
                        "forward-mapped resampling through a {} without a closed-form inverse",
                        t.kind()
                    ))
                })?;
                Some(inverse.reoriented(Orientation::TargetToSource))
            }
            _ => None,
        };
        let transform = match &backward {
            Some(inverse) => Some(inverse.as_ref()),
            None => transform,
        };

        let original = image.layout();
        let ndim = transform.and_then(|t| t.ndim());
        let source = image.clone().with_roles(ndim)?;
        let ndim = source.n_space();
        let device = source.device();

        let coords = match self.target_space(&source, transform)? {
            TargetSpace::Coordinates(coords) => coords,
            TargetSpace::Grid(shape) => {
                let grid = tracked_coordinate_grid::<B>(&shape, &device, self.tracker.as_deref());
                match transform {
                    Some(t) => t.apply(&grid)?,
                    None => grid,
                }
            }
        };
        if coords.channels() != ndim {
            return Err(TransformError::shape(format!("{} coordinate channels", ndim), &coords.shape()));
        }

        tracing::debug!(
            source = ?source.shape(),
            target = ?coords.spatial_shape(),
            method = ?self.options.method,
            derivative = self.options.derivative,
            "resampling"
        );

        let values = source.tensor();
        let interpolator = self.options.method.interpolator::<B>();
        let out = if self.options.derivative {
            interpolator.derivative(values, source.spatial_shape(), coords.tensor(), self.options.fill)?
        } else {
            let sampled = interpolator.interpolate(values.clone(), source.spatial_shape(), coords.tensor(), self.options.fill)?;
            clamp_to_range(sampled, &values)
        };
        if let Some(tracker) = &self.tracker {
            tracker.record(out.dims().iter().product());
        }

        let resampled = TaggedTensor::new(out, coords.spatial_shape().to_vec(), source.layout())?;
        Ok(resampled.restore_layout(original))
    }

    /// Resample with a transform that maps source coordinates forward.
    ///
    /// Only `TargetToSource` transforms are supported; they are routed to
    /// [`Self::resample`]. Scattering values forward is not implemented.
    pub fn resample_forward(&self, image: &TaggedTensor<B>, transform: &dyn Transform<B>) -> Result<TaggedTensor<B>> {
        if transform.orientation().is_target_to_source() {
            return self.resample(image, Some(transform));
        }
        Err(TransformError::unsupported("scatter resampling of a source-to-target transform"))
    }

    /// Sample positions for an explicit coordinate array, or the shape of
    /// the output grid.
    fn target_space(&self, source: &TaggedTensor<B>, transform: Option<&dyn Transform<B>>) -> Result<TargetSpace<B>> {
        let ndim = source.n_space();
        if let Some(coordinates) = &self.target_coordinates {
            return Ok(TargetSpace::Coordinates(coordinates.clone().to_device(&source.device())));
        }
        if let Some(shape) = &self.options.target_shape {
            if shape.len() != ndim {
                return Err(TransformError::shape(format!("{}D target shape", ndim), shape));
            }
            return Ok(TargetSpace::Grid(shape.clone()));
        }
        let shape = match transform {
            Some(t) => t.reshape().apply(source.spatial_shape())?,
            None => source.spatial_shape().to_vec(),
        };
        Ok(TargetSpace::Grid(shape))
    }
}

/// Clamp to the value range of `reference`, widened to include `[0, 1]`.
fn clamp_to_range<B: Backend>(sampled: Tensor<B, 3>, reference: &Tensor<B, 3>) -> Tensor<B, 3> {
    if reference.dims().iter().product::<usize>() == 0 {
        return sampled;
    }
    let min = reference.clone().min().into_scalar().elem::<f32>();
    let max = reference.clone().max().into_scalar().elem::<f32>();
    let low = if min > -RANGE_EPSILON { 0.0 } else { min };
    let high = if max < 1.0 + RANGE_EPSILON { 1.0 } else { max };
    sampled.clamp(low, high)
}
