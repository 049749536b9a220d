//! Coordinate-transform algebra and resampling for N-dimensional
//! registration.
//!
//! Transforms map coordinate arrays (a channel axis of one coordinate per
//! spatial dimension) and compose into chains that can be evaluated on
//! coordinates or used to resample images.

pub mod array;
pub mod error;
pub mod filter;
pub mod interpolation;
pub mod reshape;
pub mod transform;

pub use array::{coordinate_grid, AllocationTracker, AxisLayout, TaggedTensor};
pub use error::{Result, TransformError};
pub use filter::{ResampleOptions, Resampler};
pub use interpolation::{FillPolicy, InterpolationMethod};
pub use reshape::ReshapeDescriptor;
pub use transform::{compose, ComposedTransform, EvaluationMode, Orientation, SharedTransform, Transform};
