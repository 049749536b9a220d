//! Image filters.

pub mod resample;

pub use resample::{ResampleOptions, Resampler, TargetSpace};
