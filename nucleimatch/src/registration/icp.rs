//! Iterative closest point refinement.

use glam::{DMat4, DVec3};
use rayon::prelude::*;

use crate::error::Result;
use crate::geometry::{apply_affine, mean_residual};
use crate::progress::{Checkpoint, Stage};
use crate::registration::config::TransformKind;
use crate::registration::transform::fit;

/// Result of ICP refinement.
#[derive(Debug, Clone, PartialEq)]
pub struct IcpResult {
    /// Cumulative transform, to be applied after the one `moving` was given in.
    pub transform: DMat4,
    /// Mean nearest-neighbor distance after each iteration.
    pub residuals: Vec<f64>,
}

/// Index of the nearest `fixed` point for every `moving` point (brute force).
///
/// Ties keep the lowest index.
pub fn nearest_neighbors(moving: &[DVec3], fixed: &[DVec3]) -> Vec<usize> {
    moving
        .par_iter()
        .map(|m| {
            let mut best = 0;
            let mut best_d2 = f64::INFINITY;
            for (j, f) in fixed.iter().enumerate() {
                let d2 = m.distance_squared(*f);
                if d2 < best_d2 {
                    best_d2 = d2;
                    best = j;
                }
            }
            best
        })
        .collect()
}

/// Refines the alignment of `moving` onto `fixed` for exactly `iterations` rounds.
///
/// Every round matches each moving point to its nearest fixed point, fits
/// `kind` to those pairs, moves the cloud, and left-composes the step:
/// `A_icp ← A_step · A_icp`. Empty clouds give the identity.
pub fn perform_icp(
    moving: &[DVec3],
    fixed: &[DVec3],
    iterations: usize,
    kind: TransformKind,
    checkpoint: &Checkpoint,
) -> Result<IcpResult> {
    let mut result = IcpResult {
        transform: DMat4::IDENTITY,
        residuals: Vec::with_capacity(iterations),
    };
    if moving.is_empty() || fixed.is_empty() {
        return Ok(result);
    }

    let mut current = moving.to_vec();
    for iteration in 0..iterations {
        checkpoint.step(iteration, iterations, Stage::Icp)?;

        let matched: Vec<DVec3> = nearest_neighbors(&current, fixed)
            .into_iter()
            .map(|j| fixed[j])
            .collect();
        let step = fit(kind, &current, &matched)?;
        current = apply_affine(&current, &step);
        result.transform = step * result.transform;

        let residual = mean_residual(&current, &matched).unwrap_or(0.0);
        tracing::debug!(iteration, residual, "ICP iteration");
        result.residuals.push(residual);
    }
    checkpoint.step(iterations, iterations, Stage::Icp)?;

    Ok(result)
}
