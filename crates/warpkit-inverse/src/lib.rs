//! Numerical inversion for warpkit transforms.
//!
//! Transforms such as dense displacement fields and free-form deformations
//! have no closed-form inverse. [`NumericInverse`] fits one on a grid with
//! burn autodiff and plugs into the core through
//! [`warpkit_core::transform::InverseSolver`].

pub mod error;
pub mod numeric;
pub mod regularization;

pub use error::{InverseError, Result};
pub use numeric::{InverseReport, NumericInverse, NumericInverseConfig, StopReason};
pub use regularization::BendingEnergy;
