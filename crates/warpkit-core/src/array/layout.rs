//! Axis roles of tagged arrays.
//!
//! Arrays handed to transforms and to the resampler may carry a batch axis,
//! a channel axis, both or neither. When the caller does not tag them, the
//! roles are inferred from the rank alone by [`infer_roles`], which is the
//! single place where the priority rules live.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TransformError};

/// Which of the two leading role axes an array carries.
///
/// Tagged axes are always stored first: batch, then channel, then the
/// spatial axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AxisLayout {
    /// An axis of independent instances.
    pub batch: bool,
    /// An axis of channels; for coordinate arrays it indexes the spatial
    /// dimension a value belongs to.
    pub channel: bool,
}

impl AxisLayout {
    /// Only spatial axes.
    pub const SPATIAL: Self = Self { batch: false, channel: false };
    /// Batch axis followed by spatial axes.
    pub const BATCH: Self = Self { batch: true, channel: false };
    /// Channel axis followed by spatial axes.
    pub const CHANNEL: Self = Self { batch: false, channel: true };
    /// Batch and channel axes followed by spatial axes.
    pub const FULL: Self = Self { batch: true, channel: true };

    /// Number of role axes present.
    pub fn role_axes(&self) -> usize {
        self.batch as usize + self.channel as usize
    }
}

/// How to turn an array into the canonical `[batch, channel, spatial...]`
/// layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisPlan {
    /// Both role axes are already present.
    Ready,
    /// Insert a singleton batch axis.
    InsertBatch,
    /// Insert a singleton channel axis.
    InsertChannel,
    /// Insert singleton batch and channel axes.
    InsertBoth,
    /// The first untagged axis becomes the batch axis. When a channel axis
    /// is already tagged the new batch axis sits right after it and is
    /// moved to the front.
    PromoteBatch { insert_channel: bool },
    /// The first untagged axis after the batch axis becomes the channel axis.
    PromoteChannel,
    /// The first two untagged axes become batch and channel.
    PromoteBoth,
}

/// Decide the role of every axis of an array of the given full `rank`.
///
/// `present` lists the role axes the caller already tagged and `ndim` the
/// spatial dimensionality expected by the consumer, when known.
///
/// | ndim | rank | tagged | plan |
/// |------|------|--------|------|
/// | unknown | any | any | insert whatever is missing |
/// | n | n | none | insert both |
/// | n | n + 1 | none | leading axis is the batch, insert channel |
/// | n | n + 1 | one of them | insert the other |
/// | n | n + 2 | any | assign the untagged leading axes by elimination |
///
/// Every other combination is contradictory and fails with a shape error.
pub fn infer_roles(rank: usize, present: AxisLayout, ndim: Option<usize>) -> Result<AxisPlan> {
    let missing = || match (present.batch, present.channel) {
        (true, true) => AxisPlan::Ready,
        (true, false) => AxisPlan::InsertChannel,
        (false, true) => AxisPlan::InsertBatch,
        (false, false) => AxisPlan::InsertBoth,
    };
    let Some(n) = ndim else {
        if rank < present.role_axes() {
            return Err(rank_error(rank, present, None));
        }
        return Ok(missing());
    };

    if rank == n {
        if present.role_axes() > 0 {
            return Err(rank_error(rank, present, ndim));
        }
        return Ok(AxisPlan::InsertBoth);
    }
    if rank == n + 1 {
        return match (present.batch, present.channel) {
            (false, false) => Ok(AxisPlan::PromoteBatch { insert_channel: true }),
            (true, true) => Err(rank_error(rank, present, ndim)),
            _ => Ok(missing()),
        };
    }
    if rank == n + 2 {
        return Ok(match (present.batch, present.channel) {
            (true, true) => AxisPlan::Ready,
            (false, true) => AxisPlan::PromoteBatch { insert_channel: false },
            (true, false) => AxisPlan::PromoteChannel,
            (false, false) => AxisPlan::PromoteBoth,
        });
    }
    Err(rank_error(rank, present, ndim))
}

fn rank_error(rank: usize, present: AxisLayout, ndim: Option<usize>) -> TransformError {
    let expected = match ndim {
        Some(n) => format!("rank {} to {} for {}D data", n, n + 2, n),
        None => format!("rank of at least {}", present.role_axes()),
    };
    TransformError::Shape {
        expected: format!("{} (batch tagged: {}, channel tagged: {})", expected, present.batch, present.channel),
        actual: vec![rank],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_ndim_inserts_missing() {
        assert_eq!(infer_roles(3, AxisLayout::SPATIAL, None).unwrap(), AxisPlan::InsertBoth);
        assert_eq!(infer_roles(3, AxisLayout::BATCH, None).unwrap(), AxisPlan::InsertChannel);
        assert_eq!(infer_roles(3, AxisLayout::CHANNEL, None).unwrap(), AxisPlan::InsertBatch);
        assert_eq!(infer_roles(3, AxisLayout::FULL, None).unwrap(), AxisPlan::Ready);
        assert!(infer_roles(1, AxisLayout::FULL, None).is_err());
    }

    #[test]
    fn test_exact_rank() {
        assert_eq!(infer_roles(2, AxisLayout::SPATIAL, Some(2)).unwrap(), AxisPlan::InsertBoth);
        assert!(infer_roles(3, AxisLayout::CHANNEL, Some(3)).is_err());
    }

    #[test]
    fn test_rank_plus_one() {
        assert_eq!(
            infer_roles(3, AxisLayout::SPATIAL, Some(2)).unwrap(),
            AxisPlan::PromoteBatch { insert_channel: true }
        );
        assert_eq!(infer_roles(3, AxisLayout::CHANNEL, Some(2)).unwrap(), AxisPlan::InsertBatch);
        assert_eq!(infer_roles(3, AxisLayout::BATCH, Some(2)).unwrap(), AxisPlan::InsertChannel);
        assert!(infer_roles(3, AxisLayout::FULL, Some(2)).is_err());
    }

    #[test]
    fn test_rank_plus_two() {
        assert_eq!(infer_roles(4, AxisLayout::FULL, Some(2)).unwrap(), AxisPlan::Ready);
        assert_eq!(
            infer_roles(4, AxisLayout::CHANNEL, Some(2)).unwrap(),
            AxisPlan::PromoteBatch { insert_channel: false }
        );
        assert_eq!(infer_roles(4, AxisLayout::BATCH, Some(2)).unwrap(), AxisPlan::PromoteChannel);
        assert_eq!(infer_roles(4, AxisLayout::SPATIAL, Some(2)).unwrap(), AxisPlan::PromoteBoth);
    }

    #[test]
    fn test_out_of_range_rank() {
        assert!(infer_roles(1, AxisLayout::SPATIAL, Some(2)).is_err());
        assert!(infer_roles(5, AxisLayout::SPATIAL, Some(2)).is_err());
    }
}
