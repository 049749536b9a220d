//! Numerical inversion of coordinate transforms.
//!
//! A transform `T` without a closed-form inverse is inverted on a grid by
//! fitting a dense displacement field `v` such that `x + u(x) + v(x + u(x))`
//! lands back on `x` for every grid point `x`, where `u` is the displacement
//! of `T`. The fit starts from `v = -u`, which is exact for translations,
//! and is refined with Adam on the squared residual plus a bending penalty.

use std::fmt;
use std::sync::Arc;

use burn::config::Config;
use burn::module::{Module, Param};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};
use warpkit_core::array::coordinate_grid;
use warpkit_core::interpolation::{sample, FillPolicy, InterpolationMethod};
use warpkit_core::transform::{DenseDisplacementField, InverseSolver, SharedTransform, Transform};

use crate::error::{InverseError, Result as InverseResult};
use crate::regularization::BendingEnergy;

/// Configuration for [`NumericInverse`].
#[derive(Config, Debug, PartialEq)]
pub struct NumericInverseConfig {
    /// Upper bound on optimizer steps
    #[config(default = 400)]
    pub max_iterations: usize,
    /// Adam learning rate
    #[config(default = 1e-2)]
    pub learning_rate: f64,
    /// Iterations without a strict loss decrease before giving up
    #[config(default = 6)]
    pub patience: usize,
    /// Loss below which the fit counts as converged
    #[config(default = 1e-3)]
    pub tolerance: f64,
    /// Weight of the bending penalty
    #[config(default = 0.1)]
    pub smoothness_weight: f64,
}

impl NumericInverseConfig {
    /// Check every field, returning the first violation.
    pub fn validate(&self) -> InverseResult<()> {
        if self.max_iterations == 0 {
            return Err(InverseError::invalid_configuration("max_iterations must be positive"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(InverseError::invalid_configuration(format!(
                "learning_rate must be positive and finite, got {}",
                self.learning_rate
            )));
        }
        if self.patience == 0 {
            return Err(InverseError::invalid_configuration("patience must be positive"));
        }
        if self.tolerance.is_nan() || self.tolerance < 0.0 {
            return Err(InverseError::invalid_configuration(format!(
                "tolerance must be non-negative, got {}",
                self.tolerance
            )));
        }
        if self.smoothness_weight.is_nan() || self.smoothness_weight < 0.0 {
            return Err(InverseError::invalid_configuration(format!(
                "smoothness_weight must be non-negative, got {}",
                self.smoothness_weight
            )));
        }
        Ok(())
    }
}

/// Why the optimization loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The loss fell below the tolerance.
    Converged,
    /// The loss stopped decreasing for `patience` iterations.
    Plateau,
    /// The iteration budget ran out.
    MaxIterations,
    /// The loss became NaN or infinite.
    NonFinite,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StopReason::Converged => "converged",
            StopReason::Plateau => "plateau",
            StopReason::MaxIterations => "max iterations",
            StopReason::NonFinite => "non-finite loss",
        };
        f.write_str(name)
    }
}

/// Quality signal of a numerical inversion.
#[derive(Debug, Clone, PartialEq)]
pub struct InverseReport {
    /// Number of loss evaluations
    pub iterations: usize,
    /// Loss of the initial guess
    pub initial_loss: f64,
    /// Loss of the returned field, the lowest one seen
    pub final_loss: f64,
    pub stop_reason: StopReason,
}

/// Counts consecutive iterations without a strict loss decrease.
#[derive(Debug, Clone)]
struct PlateauDetector {
    patience: usize,
    stalled: usize,
    previous: Option<f64>,
}

impl PlateauDetector {
    fn new(patience: usize) -> Self {
        Self {
            patience,
            stalled: 0,
            previous: None,
        }
    }

    /// Record a loss; true once `patience` losses in a row failed to
    /// improve on their predecessor.
    fn observe(&mut self, loss: f64) -> bool {
        match self.previous {
            Some(previous) if loss < previous => self.stalled = 0,
            Some(_) => self.stalled += 1,
            None => {}
        }
        self.previous = Some(loss);
        self.stalled >= self.patience
    }
}

/// Trainable state: the displacement of the inverse field.
#[derive(Module, Debug)]
struct InverseField<B: Backend> {
    displacement: Param<Tensor<B, 3>>,
}

/// Iterative inverse solver backed by burn autodiff and Adam.
#[derive(Debug, Clone, Default)]
pub struct NumericInverse {
    config: NumericInverseConfig,
}

impl Default for NumericInverseConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl NumericInverse {
    pub fn new(config: NumericInverseConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NumericInverseConfig {
        &self.config
    }

    /// Fit a displacement field approximating the inverse of `transform`
    /// on a grid of shape `grid`.
    ///
    /// The returned field is the lowest-loss iterate and carries the
    /// transform's orientation. A poor fit is not an error; inspect the
    /// [`InverseReport`].
    ///
    /// # Arguments
    /// * `transform` - Coordinate transform to invert
    /// * `grid` - Spatial shape the inverse is sampled on
    /// * `device` - Device for the solver state
    pub fn invert<B: AutodiffBackend>(
        &self,
        transform: &dyn Transform<B>,
        grid: &[usize],
        device: &B::Device,
    ) -> InverseResult<(DenseDisplacementField<B>, InverseReport)> {
        self.config.validate()?;
        if !transform.is_coordinate() {
            return Err(InverseError::unsupported_transform(format!(
                "{} does not map coordinates",
                transform.kind()
            )));
        }

        let offsets = transform.displacement_field(grid, device)?.tensor().detach();
        let [batch, _, _] = offsets.dims();
        let identity = coordinate_grid::<B>(grid, device).tensor().repeat_dim(0, batch);
        let mapped = identity.clone() + offsets.clone();

        let regularizer = BendingEnergy::new(self.config.smoothness_weight);
        let mut model = InverseField {
            displacement: Param::from_tensor(offsets.neg().require_grad()),
        };
        let mut optimizer = AdamConfig::new().init::<B, InverseField<B>>();
        let mut plateau = PlateauDetector::new(self.config.patience);

        let mut initial_loss = None;
        let mut best: Option<(Tensor<B, 3>, f64)> = None;
        let mut iterations = 0;
        let mut stop_reason = StopReason::MaxIterations;

        while iterations < self.config.max_iterations {
            let state = model.displacement.val();
            let pulled_back = sample(
                state.clone(),
                grid,
                mapped.clone(),
                InterpolationMethod::Linear,
                FillPolicy::Nearest,
            )?;
            let residual = mapped.clone() + pulled_back - identity.clone();
            let fit = residual.powf_scalar(2.0).sum_dim(1).mean();
            let loss = fit + regularizer.compute_loss(state.clone(), grid);

            let value = loss.clone().into_scalar().elem::<f32>() as f64;
            iterations += 1;
            initial_loss.get_or_insert(value);

            if !value.is_finite() {
                tracing::warn!(iteration = iterations, "numerical inverse diverged");
                stop_reason = StopReason::NonFinite;
                break;
            }
            if best.as_ref().map_or(true, |(_, lowest)| value < *lowest) {
                best = Some((state.detach(), value));
            }

            if iterations % 50 == 1 {
                tracing::info!("Iteration {}: Loss {:.6}", iterations, value);
            }
            if value < self.config.tolerance {
                stop_reason = StopReason::Converged;
                break;
            }
            if plateau.observe(value) {
                stop_reason = StopReason::Plateau;
                break;
            }

            // Backward pass
            let grads = loss.backward();
            let grads_params = GradientsParams::from_grads(grads, &model);
            model = optimizer.step(self.config.learning_rate, model, grads_params);
        }

        let (displacement, final_loss) = match best {
            Some(found) => found,
            None => (model.displacement.val().detach(), f64::NAN),
        };
        let report = InverseReport {
            iterations,
            initial_loss: initial_loss.unwrap_or(f64::NAN),
            final_loss,
            stop_reason,
        };
        tracing::debug!(
            iterations = report.iterations,
            final_loss = report.final_loss,
            stop_reason = %report.stop_reason,
            "numerical inverse finished"
        );

        let field = DenseDisplacementField::from_tensor(displacement, grid.to_vec())?
            .with_orientation(transform.orientation());
        Ok((field, report))
    }
}

impl<B: AutodiffBackend> InverseSolver<B> for NumericInverse {
    fn solve(
        &self,
        transform: &dyn Transform<B>,
        grid: &[usize],
        device: &B::Device,
    ) -> warpkit_core::Result<SharedTransform<B>> {
        let (field, report) = self.invert(transform, grid, device)?;
        if report.stop_reason != StopReason::Converged {
            tracing::warn!(
                kind = %transform.kind(),
                final_loss = report.final_loss,
                stop_reason = %report.stop_reason,
                "numerical inverse did not reach the tolerance"
            );
        }
        Ok(Arc::new(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NumericInverseConfig::new();
        assert_eq!(config.max_iterations, 400);
        assert_eq!(config.learning_rate, 1e-2);
        assert_eq!(config.patience, 6);
        assert_eq!(config.tolerance, 1e-3);
        assert_eq!(config.smoothness_weight, 0.1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let zero_patience = NumericInverseConfig::new().with_patience(0);
        assert!(matches!(zero_patience.validate(), Err(InverseError::InvalidConfiguration(_))));
        let negative_rate = NumericInverseConfig::new().with_learning_rate(-1.0);
        assert!(negative_rate.validate().is_err());
        let nan_weight = NumericInverseConfig::new().with_smoothness_weight(f64::NAN);
        assert!(nan_weight.validate().is_err());
    }

    #[test]
    fn test_plateau_needs_consecutive_stalls() {
        let mut plateau = PlateauDetector::new(3);
        assert!(!plateau.observe(1.0));
        assert!(!plateau.observe(1.0));
        assert!(!plateau.observe(1.5));
        // A strict decrease resets the count
        assert!(!plateau.observe(0.5));
        assert!(!plateau.observe(0.5));
        assert!(!plateau.observe(0.6));
        assert!(plateau.observe(0.7));
    }

    #[test]
    fn test_stop_reason_display() {
        assert_eq!(StopReason::Plateau.to_string(), "plateau");
        assert_eq!(StopReason::NonFinite.to_string(), "non-finite loss");
    }
}
