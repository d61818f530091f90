//! Synthetic volumes and point clouds shared by unit tests.

use common::Buffer3;
use glam::DVec3;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Volume with one paraboloid blob per center: `100 − d²` wherever `d² <= radius_sq`.
pub fn parabolic_blobs(
    shape: (usize, usize, usize),
    centers: &[(usize, usize, usize)],
    radius_sq: usize,
) -> Buffer3<f32> {
    let (depth, height, width) = shape;
    let mut volume = Buffer3::new_default(depth, height, width);
    for z in 0..depth {
        for y in 0..height {
            for x in 0..width {
                for &(cz, cy, cx) in centers {
                    let d2 = z.abs_diff(cz).pow(2) + y.abs_diff(cy).pow(2) + x.abs_diff(cx).pow(2);
                    if d2 <= radius_sq {
                        volume[(z, y, x)] = 100.0 - d2 as f32;
                    }
                }
            }
        }
    }
    volume
}

/// Random points inside `[0, extent)` with pairwise distances of at least `min_spacing`.
///
/// Gives up after a bounded number of draws, so the result may hold fewer than `n` points.
pub fn spaced_cloud(n: usize, extent: DVec3, min_spacing: f64, seed: u64) -> Vec<DVec3> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut points: Vec<DVec3> = Vec::with_capacity(n);
    let mut attempts = 0;
    while points.len() < n && attempts < n * 1000 {
        attempts += 1;
        let p = DVec3::new(
            rng.random_range(0.0..extent.x),
            rng.random_range(0.0..extent.y),
            rng.random_range(0.0..extent.z),
        );
        if points.iter().all(|q| q.distance(p) >= min_spacing) {
            points.push(p);
        }
    }
    points
}

pub fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() < eps
}
