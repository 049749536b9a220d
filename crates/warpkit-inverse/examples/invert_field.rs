//! Invert a free-form deformation numerically and check the round trip.
//!
//! Usage:
//!   cargo run --example invert_field

use std::sync::Arc;

use burn::backend::Autodiff;
use burn::tensor::{ElementConversion, Tensor, TensorData};
use burn_ndarray::NdArray;
use warpkit_core::array::coordinate_grid;
use warpkit_core::interpolation::{sample, FillPolicy, InterpolationMethod};
use warpkit_core::transform::{FreeFormDeformation, SharedTransform, Transform};
use warpkit_inverse::{NumericInverse, NumericInverseConfig};

type Backend = Autodiff<NdArray<f32>>;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let device = Default::default();
    let grid = [24, 24];

    // 4x4 control points with a gentle outward push along the first axis
    let mut offsets = vec![0.0f32; 2 * 16];
    for (i, value) in offsets.iter_mut().take(16).enumerate() {
        let row = (i / 4) as f32;
        *value = 0.4 * (row - 1.5);
    }
    let coefficients = Tensor::<Backend, 3>::from_data(TensorData::new(offsets, [1, 2, 16]), &device);
    let warp: SharedTransform<Backend> =
        Arc::new(FreeFormDeformation::covering(coefficients, vec![4, 4], &grid)?);

    let solver = NumericInverse::new(NumericInverseConfig::new().with_smoothness_weight(0.05));
    let (inverse, report) = solver.invert(warp.as_ref(), &grid, &device)?;
    println!(
        "stopped after {} iterations ({}): loss {:.6} -> {:.6}",
        report.iterations, report.stop_reason, report.initial_loss, report.final_loss
    );

    // Read the inverse at the warped positions, not on its own grid
    let identity = coordinate_grid::<Backend>(&grid, &device).tensor();
    let warped = warp.apply(&coordinate_grid(&grid, &device))?.tensor();
    let pulled_back = sample(
        inverse.displacement(),
        &grid,
        warped.clone(),
        InterpolationMethod::Linear,
        FillPolicy::Nearest,
    )?;
    let worst = (warped + pulled_back - identity)
        .abs()
        .max()
        .into_scalar()
        .elem::<f32>();
    println!("worst round-trip error: {:.4} voxels", worst);

    Ok(())
}
