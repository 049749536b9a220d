//! Intensity transforms.
//!
//! These act on sampled image content rather than on coordinates, so they
//! are never evaluated in coordinate mode.

use std::sync::Arc;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::record::{ParamRecord, TransformRecord};
use super::trait_::{Orientation, SharedTransform, Transform, TransformKind};
use crate::array::TaggedTensor;
use crate::error::{Result, TransformError};

/// Lower and upper percentiles used when no fixed range is given.
const PERCENTILES: (f32, f32) = (0.025, 0.975);

/// Maps an intensity range onto `[0, 1]`.
///
/// The range is either fixed or taken per batch instance and channel from
/// the 2.5th and 97.5th percentiles of the input.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalize {
    range: Option<(f32, f32)>,
    clamp: bool,
    inverted: bool,
    orientation: Orientation,
}

impl Normalize {
    /// Normalize with percentiles computed from the data.
    pub fn from_percentiles() -> Self {
        Self {
            range: None,
            clamp: true,
            inverted: false,
            orientation: Orientation::SourceToTarget,
        }
    }

    /// Normalize a fixed `[low, high]` range.
    pub fn with_range(low: f32, high: f32) -> Result<Self> {
        if !(high > low) {
            return Err(TransformError::invalid(format!("empty intensity range [{}, {}]", low, high)));
        }
        Ok(Self {
            range: Some((low, high)),
            ..Self::from_percentiles()
        })
    }

    /// Whether values outside the range are clamped to `[0, 1]`.
    pub fn with_clamp(mut self, clamp: bool) -> Self {
        self.clamp = clamp;
        self
    }

    pub fn range(&self) -> Option<(f32, f32)> {
        self.range
    }

    pub fn from_record(record: &TransformRecord) -> Result<Self> {
        let range = match record.optional_param("range") {
            Some(p) if p.values.len() == 2 => Some((p.values[0], p.values[1])),
            Some(p) => return Err(TransformError::shape("2 range values", &p.shape)),
            None => None,
        };
        Ok(Self {
            range,
            clamp: record.flag("clamp"),
            inverted: record.flag("inverted"),
            orientation: record.orientation,
        })
    }

    /// Per-instance `[low, high]`, `[batch, channel, 1]` each.
    fn bounds<B: Backend>(&self, values: &Tensor<B, 3>) -> (Tensor<B, 3>, Tensor<B, 3>) {
        let [batch, channel, voxels] = values.dims();
        match self.range {
            Some((low, high)) => {
                let ones = Tensor::<B, 3>::ones([batch, channel, 1], &values.device());
                (ones.clone().mul_scalar(low), ones.mul_scalar(high))
            }
            None => {
                let sorted = values.clone().sort(2);
                let last = voxels.saturating_sub(1) as f32;
                let at = |q: f32| sorted.clone().narrow(2, (q * last).round() as usize, 1);
                (at(PERCENTILES.0), at(PERCENTILES.1))
            }
        }
    }
}

impl<B: Backend> Transform<B> for Normalize {
    fn kind(&self) -> TransformKind {
        TransformKind::Normalize
    }

    fn ndim(&self) -> Option<usize> {
        None
    }

    fn batch_size(&self) -> Option<usize> {
        None
    }

    fn orientation(&self) -> Orientation {
        self.orientation
    }

    fn is_coordinate(&self) -> bool {
        false
    }

    fn apply(&self, x: &TaggedTensor<B>) -> Result<TaggedTensor<B>> {
        let original = x.layout();
        let x = x.clone().with_roles(None)?;
        let values = x.tensor();
        if values.dims()[2] == 0 {
            return Ok(x.restore_layout(original));
        }
        let (low, high) = self.bounds(&values);
        let width = (high - low.clone()).clamp_min(1e-12);
        let out = if self.inverted {
            values * width + low
        } else {
            let scaled = (values - low) / width;
            if self.clamp {
                scaled.clamp(0.0, 1.0)
            } else {
                scaled
            }
        };
        Ok(x.with_data(out)?.restore_layout(original))
    }

    fn inverse(&self) -> Result<Option<SharedTransform<B>>> {
        if self.range.is_none() {
            return Ok(None);
        }
        Ok(Some(Arc::new(Self {
            inverted: !self.inverted,
            clamp: false,
            ..self.clone()
        })))
    }

    fn reoriented(&self, orientation: Orientation) -> SharedTransform<B> {
        Arc::new(Self {
            orientation,
            ..self.clone()
        })
    }

    fn record(&self) -> Result<TransformRecord> {
        let mut record = TransformRecord::new(TransformKind::Normalize, None, None, self.orientation)
            .with_param(ParamRecord::scalars("clamp", vec![self.clamp as u8 as f32]))
            .with_param(ParamRecord::scalars("inverted", vec![self.inverted as u8 as f32]));
        if let Some((low, high)) = self.range {
            record = record.with_param(ParamRecord::scalars("range", vec![low, high]));
        }
        Ok(record)
    }
}
