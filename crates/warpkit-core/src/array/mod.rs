//! Tagged arrays, axis-role inference and coordinate grids.
//!
//! Every array that flows through transforms and the resampler is a
//! [`TaggedTensor`]: a `[batch, channel, voxels]` burn tensor plus the
//! spatial shape and the set of role axes the caller actually supplied.

pub mod grid;
pub mod layout;
pub mod tagged;
pub mod tracker;

pub use grid::{coordinate_grid, strides, tracked_coordinate_grid};
pub use layout::{infer_roles, AxisLayout, AxisPlan};
pub use tagged::TaggedTensor;
pub use tracker::AllocationTracker;
