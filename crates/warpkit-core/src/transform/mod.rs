//! Transform types and operations.
//!
//! This module provides the transform contract, every elementary
//! transform, and the composition machinery that chains them.

pub mod trait_;
pub mod matrix;
pub mod record;
pub mod identity;
pub mod translation;
pub mod rescale;
pub mod reflection;
pub mod rotation;
pub mod permutation;
pub mod rigid;
pub mod affine;
pub mod poly_affine;
pub mod bspline;
pub mod displacement_field;
pub mod intensity;
pub mod flipped;
pub mod composed;
pub mod ext;

pub use trait_::{EvaluationMode, InverseSolver, Orientation, SharedTransform, Transform, TransformKind};
pub use record::{ParamRecord, TransformRecord};
pub use identity::Identity;
pub use translation::Translation;
pub use rescale::Rescale;
pub use reflection::AxisReflection;
pub use rotation::{QuarterTurn, Rotation180, Rotation270, Rotation90};
pub use permutation::AxisPermutation;
pub use rigid::Rigid;
pub use affine::Affine;
pub use poly_affine::{LocallyAffine, PolyAffine};
pub use bspline::FreeFormDeformation;
pub use displacement_field::DenseDisplacementField;
pub use intensity::Normalize;
pub use flipped::OrientationFlippedView;
pub use composed::{compose, ComposedTransform, InversePolicy};
pub use ext::{fake_inverse, force_inverse, TransformExt};
