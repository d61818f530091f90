//! 3-D shape-context descriptors.
//!
//! Each point gets a histogram of its neighbors expressed in a local frame:
//! z points away from the cloud centroid, x is a global principal axis projected
//! orthogonal to z, and y = z × x. PCA cannot fix the sign of that axis, so
//! descriptors are built once per candidate reference axis and matching tries
//! every combination.

use std::f64::consts::PI;

use glam::DVec3;
use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::error::Result;
use crate::geometry::{centroid, mean_distance, principal_frame, PrincipalFrame};
use crate::progress::{Checkpoint, Stage};
use crate::registration::config::{ShapeContextConfig, VariantStrategy};

/// Projections shorter than this are treated as parallel / coincident.
const FRAME_EPSILON: f64 = 1e-9;

/// Global direction used as the local x reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceAxis {
    /// First principal axis `x0`.
    First,
    /// `-x0`.
    FirstMirrored,
    /// Second principal axis `x1`.
    Second,
    /// `-x1`.
    SecondMirrored,
}

impl ReferenceAxis {
    pub fn direction(self, frame: &PrincipalFrame) -> DVec3 {
        match self {
            ReferenceAxis::First => frame.axes[0],
            ReferenceAxis::FirstMirrored => -frame.axes[0],
            ReferenceAxis::Second => frame.axes[1],
            ReferenceAxis::SecondMirrored => -frame.axes[1],
        }
    }
}

/// Reference axes tried on the moving and fixed side for a strategy.
pub fn variant_axes(strategy: VariantStrategy) -> (Vec<ReferenceAxis>, Vec<ReferenceAxis>) {
    let moving = vec![ReferenceAxis::First, ReferenceAxis::FirstMirrored];
    let fixed = match strategy {
        VariantStrategy::Mirrored => moving.clone(),
        VariantStrategy::Extended => vec![
            ReferenceAxis::First,
            ReferenceAxis::FirstMirrored,
            ReferenceAxis::Second,
            ReferenceAxis::SecondMirrored,
        ],
    };
    (moving, fixed)
}

/// One descriptor per point, all built against the same reference axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptors {
    pub axis: ReferenceAxis,
    pub histograms: Vec<Vec<f64>>,
}

impl Descriptors {
    pub fn len(&self) -> usize {
        self.histograms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histograms.is_empty()
    }
}

/// `r_bins` radial edges spaced logarithmically from `r_inner` to `r_outer`.
pub fn radial_edges(config: &ShapeContextConfig) -> Vec<f64> {
    let n = config.r_bins;
    if n == 1 {
        return vec![config.r_outer];
    }
    let (lo, hi) = (config.r_inner.log10(), config.r_outer.log10());
    (0..n)
        .map(|i| 10f64.powf(lo + (hi - lo) * i as f64 / (n - 1) as f64))
        .collect()
}

/// Flat histogram index of a neighbor at normalized radius `r`, polar angle
/// `theta` in `[0, π]` and azimuth `phi` in `[0, 2π)`.
///
/// The radial bin is the first edge exceeding `r`; anything beyond the last
/// edge lands in the outermost ring.
pub fn bin_index(r: f64, theta: f64, phi: f64, edges: &[f64], config: &ShapeContextConfig) -> usize {
    let r_index = edges
        .iter()
        .position(|&edge| r < edge)
        .unwrap_or(config.r_bins - 1);
    let theta_index =
        ((theta / (PI / config.theta_bins as f64)).floor().max(0.0) as usize).min(config.theta_bins - 1);
    let phi_index =
        ((phi / (2.0 * PI / config.phi_bins as f64)).floor().max(0.0) as usize).min(config.phi_bins - 1);
    r_index * config.theta_bins * config.phi_bins + theta_index * config.phi_bins + phi_index
}

/// Normalized histogram of neighbors given in local frame coordinates.
///
/// Sums to 1, or is all zeros when there are no neighbors. A neighbor at the
/// origin counts in the first ring with `theta = phi = 0`.
pub fn shape_context(local: &[DVec3], mean_distance: f64, config: &ShapeContextConfig) -> Vec<f64> {
    let edges = radial_edges(config);
    let mut histogram = vec![0.0; config.len()];

    for q in local {
        let r = q.length();
        let index = if r == 0.0 {
            0
        } else {
            let theta = (q.z / r).clamp(-1.0, 1.0).acos();
            let mut phi = q.y.atan2(q.x);
            if phi < 0.0 {
                phi += 2.0 * PI;
            }
            bin_index(r / mean_distance, theta, phi, &edges, config)
        };
        histogram[index] += 1.0;
    }

    let total: f64 = histogram.iter().sum();
    if total > 0.0 {
        histogram.iter_mut().for_each(|v| *v /= total);
    }
    histogram
}

/// Orthonormal local frame `(x, y, z)` of `point`.
fn local_frame(point: DVec3, center: DVec3, reference: DVec3, frame: &PrincipalFrame) -> [DVec3; 3] {
    let z = (point - center)
        .try_normalize()
        .unwrap_or(frame.axes[2]);

    let candidates = [reference, frame.axes[0], frame.axes[1], frame.axes[2]];
    let x = candidates
        .iter()
        .map(|&axis| axis - z * axis.dot(z))
        .find(|projected| projected.length() > FRAME_EPSILON)
        .map(DVec3::normalize)
        .unwrap_or_else(|| z.any_orthonormal_vector());

    let y = z.cross(x).normalize();
    [x, y, z]
}

/// Descriptors of every point against one reference axis.
pub fn descriptors_for_axis(
    points: &[DVec3],
    center: DVec3,
    mean_distance: f64,
    frame: &PrincipalFrame,
    axis: ReferenceAxis,
    config: &ShapeContextConfig,
) -> Descriptors {
    let reference = axis.direction(frame);
    let histograms = points
        .par_iter()
        .enumerate()
        .map(|(i, &p)| {
            let [x, y, z] = local_frame(p, center, reference, frame);
            let local: Vec<DVec3> = points
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, &q)| {
                    let d = q - p;
                    DVec3::new(d.dot(x), d.dot(y), d.dot(z))
                })
                .collect();
            shape_context(&local, mean_distance, config)
        })
        .collect();
    Descriptors { axis, histograms }
}

/// Descriptors for `x0` and `-x0` given the cloud's centroid and mean pairwise distance.
pub fn build_descriptors(
    center: DVec3,
    mean_distance: f64,
    points: &[DVec3],
    config: &ShapeContextConfig,
) -> Result<(Descriptors, Descriptors)> {
    let frame = principal_frame(points)?;
    Ok((
        descriptors_for_axis(points, center, mean_distance, &frame, ReferenceAxis::First, config),
        descriptors_for_axis(
            points,
            center,
            mean_distance,
            &frame,
            ReferenceAxis::FirstMirrored,
            config,
        ),
    ))
}

/// Descriptors of a cloud for each of `axes`, one checkpoint per axis.
pub fn descriptor_variants(
    points: &[DVec3],
    axes: &[ReferenceAxis],
    config: &ShapeContextConfig,
    checkpoint: &Checkpoint,
) -> Result<Vec<Descriptors>> {
    let center = centroid(points).unwrap_or(DVec3::ZERO);
    let spread = mean_distance(points)?;
    let frame = principal_frame(points)?;

    let mut variants = Vec::with_capacity(axes.len());
    for (i, &axis) in axes.iter().enumerate() {
        checkpoint.step(i, axes.len(), Stage::Descriptors)?;
        variants.push(descriptors_for_axis(
            points, center, spread, &frame, axis, config,
        ));
    }
    Ok(variants)
}

/// Chi-square-like distance `0.5 × Σ (a − b)² / (a + b)` over bins that differ.
pub fn unary_distance(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let sum: f64 = a
        .iter()
        .zip(b)
        .filter(|(x, y)| x != y && **x + **y > 0.0)
        .map(|(x, y)| (x - y).powi(2) / (x + y))
        .sum();
    0.5 * sum
}

/// `moving.len() × fixed.len()` matrix of descriptor distances.
pub fn cost_matrix(moving: &Descriptors, fixed: &Descriptors) -> DMatrix<f64> {
    let data: Vec<f64> = moving
        .histograms
        .par_iter()
        .flat_map_iter(|a| fixed.histograms.iter().map(move |b| unary_distance(a, b)))
        .collect();
    DMatrix::from_row_slice(moving.len(), fixed.len(), &data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::approx_eq;

    #[test]
    fn test_radial_edges_are_log_spaced() {
        let edges = radial_edges(&ShapeContextConfig::default());
        assert_eq!(edges.len(), 5);
        assert!(approx_eq(edges[0], 0.125, 1e-12));
        assert!(approx_eq(edges[2], 0.5, 1e-12));
        assert!(approx_eq(edges[4], 2.0, 1e-12));
    }

    #[test]
    fn test_bin_index_layout_and_overflow() {
        let config = ShapeContextConfig::default();
        let edges = radial_edges(&config);
        assert_eq!(bin_index(0.0, 0.0, 0.0, &edges, &config), 0);
        // Second ring, second theta bin, third phi bin.
        let theta = PI / 6.0 + 0.01;
        let phi = 2.0 * (2.0 * PI / 12.0) + 0.01;
        assert_eq!(bin_index(0.2, theta, phi, &edges, &config), 72 + 12 + 2);
        // Beyond r_outer stays in the last ring; theta = π and phi ≈ 2π clamp.
        assert_eq!(bin_index(50.0, PI, 2.0 * PI, &edges, &config), 359);
    }

    #[test]
    fn test_shape_context_normalizes_and_handles_no_neighbors() {
        let config = ShapeContextConfig::default();
        let empty = shape_context(&[], 1.0, &config);
        assert_eq!(empty.len(), 360);
        assert!(empty.iter().all(|&v| v == 0.0));

        let local = [DVec3::new(0.0, 0.0, 0.1), DVec3::new(1.0, 0.0, 0.0), DVec3::ZERO];
        let histogram = shape_context(&local, 1.0, &config);
        assert!(approx_eq(histogram.iter().sum::<f64>(), 1.0, 1e-12));
        // The on-axis neighbor and the coincident one both land in bin 0.
        assert!(approx_eq(histogram[0], 2.0 / 3.0, 1e-12));
    }

    #[test]
    fn test_unary_distance_guards_empty_bins() {
        let a = [0.0, 0.5, 0.5, 0.0];
        let b = [0.0, 0.5, 0.0, 0.5];
        assert_eq!(unary_distance(&a, &a), 0.0);
        assert!(approx_eq(unary_distance(&a, &b), 0.5, 1e-12));
        assert_eq!(unary_distance(&[0.0; 4], &[0.0; 4]), 0.0);
    }

    #[test]
    fn test_descriptors_are_rotation_invariant() {
        let points = crate::testing::spaced_cloud(30, DVec3::new(300.0, 120.0, 60.0), 15.0, 3);
        let rotation = glam::DQuat::from_axis_angle(DVec3::new(0.3, -0.5, 1.0).normalize(), 0.9);
        let rotated: Vec<DVec3> = points.iter().map(|&p| rotation * p).collect();

        let config = ShapeContextConfig::default();
        let axes = [ReferenceAxis::First, ReferenceAxis::FirstMirrored];
        let a = descriptor_variants(&points, &axes[..1], &config, &Checkpoint::default()).unwrap();
        let b = descriptor_variants(&rotated, &axes, &config, &Checkpoint::default()).unwrap();

        // One of the two sign choices reproduces the original descriptors.
        let best = b
            .iter()
            .map(|variant| {
                a[0].histograms
                    .iter()
                    .zip(&variant.histograms)
                    .map(|(x, y)| unary_distance(x, y))
                    .sum::<f64>()
            })
            .fold(f64::INFINITY, f64::min);
        assert!(best < 1e-6, "best total distance {best}");
    }

    #[test]
    fn test_cost_matrix_shape_and_diagonal() {
        let points = crate::testing::spaced_cloud(12, DVec3::splat(100.0), 10.0, 5);
        let center = centroid(&points).unwrap();
        let spread = mean_distance(&points).unwrap();
        let (plus, minus) =
            build_descriptors(center, spread, &points, &ShapeContextConfig::default()).unwrap();
        assert_eq!(plus.axis, ReferenceAxis::First);
        assert_eq!(minus.axis, ReferenceAxis::FirstMirrored);

        let cost = cost_matrix(&plus, &plus);
        assert_eq!(cost.shape(), (12, 12));
        for i in 0..12 {
            assert_eq!(cost[(i, i)], 0.0);
        }
    }
}
