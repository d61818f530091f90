//! Greedy non-maximum suppression of overlapping sphere detections.

use std::f64::consts::PI;

use crate::blob_detection::Detection;
use crate::error::Result;
use crate::progress::{Checkpoint, Stage};

const CHECKPOINT_INTERVAL: usize = 256;

#[inline]
pub fn sphere_volume(radius: f64) -> f64 {
    4.0 / 3.0 * PI * radius.powi(3)
}

/// Volume shared by two spheres of radii `r1`, `r2` whose centers are `d` apart.
///
/// Piecewise, checked in order: a negative distance returns 0, full containment
/// (which includes `d == 0`) returns the inner sphere's volume, no overlap
/// (`d >= r1 + r2`) returns 0, anything else uses the lens formula.
pub fn sphere_intersection(r1: f64, r2: f64, d: f64) -> f64 {
    if d < 0.0 {
        0.0
    } else if r1 + d <= r2 {
        sphere_volume(r1)
    } else if r2 + d <= r1 {
        sphere_volume(r2)
    } else if d >= r1 + r2 {
        0.0
    } else {
        let sum = r1 + r2;
        let diff = r1 - r2;
        PI * (sum - d).powi(2) * (d * d + 2.0 * d * sum - 3.0 * diff * diff) / (12.0 * d)
    }
}

/// Keeps the strongest detections, dropping any that overlap a kept one by more
/// than `overlap_fraction` of the smaller sphere's volume.
///
/// Detections are visited by ascending response; equal responses keep their
/// input order. Spheres have radius `√3 × scale` and distances weight Z by
/// `anisotropy`.
pub fn suppress_intersecting_spheres(
    candidates: &[Detection],
    anisotropy: f64,
    overlap_fraction: f64,
    checkpoint: &Checkpoint,
) -> Result<Vec<Detection>> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| candidates[a].response.total_cmp(&candidates[b].response));

    let mut alive = vec![true; order.len()];
    let mut kept = Vec::new();

    for (pos, &i) in order.iter().enumerate() {
        if pos % CHECKPOINT_INTERVAL == 0 {
            checkpoint.step(pos, order.len(), Stage::Suppression)?;
        }
        if !alive[pos] {
            continue;
        }
        let head = &candidates[i];
        kept.push(*head);

        let radius_i = head.sphere_radius();
        let volume_i = sphere_volume(radius_i);

        for (other_pos, &j) in order.iter().enumerate().skip(pos + 1) {
            if !alive[other_pos] {
                continue;
            }
            let other = &candidates[j];
            let radius_j = other.sphere_radius();
            let volume_j = sphere_volume(radius_j);
            let smaller = volume_i.min(volume_j);

            let d = head.anisotropic_distance(other, anisotropy);
            let intersection = if d != 0.0 {
                sphere_intersection(radius_i, radius_j, d)
            } else {
                smaller
            };
            if intersection > overlap_fraction * smaller {
                alive[other_pos] = false;
            }
        }
    }
    checkpoint.step(order.len(), order.len(), Stage::Suppression)?;

    tracing::debug!(
        candidates = candidates.len(),
        kept = kept.len(),
        "suppressed intersecting spheres"
    );
    Ok(kept)
}
