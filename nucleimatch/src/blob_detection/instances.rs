//! Conversions between detections and instance-label volumes.

use std::collections::BTreeMap;

use common::Buffer3;
use glam::DVec3;

use crate::blob_detection::Detection;
use crate::error::Result;
use crate::geometry::PointCloud;
use crate::progress::{Checkpoint, Stage};

/// Paints each detection's sphere into a label volume of the given `(depth, height, width)`.
///
/// Detection `i` gets label `i + 1` (0 is background). A voxel belongs to a
/// detection when `‖(anisotropy·dz, dy, dx)‖ <= √3 × scale`; later detections
/// overwrite earlier ones. Spheres are clipped to the volume.
pub fn rasterize_instances(
    shape: (usize, usize, usize),
    detections: &[Detection],
    anisotropy: f64,
) -> Buffer3<u32> {
    let (depth, height, width) = shape;
    let mut mask = Buffer3::new_default(depth, height, width);
    if mask.is_empty() {
        return mask;
    }

    let clip = |lo: f64, hi: f64, len: usize| -> Option<(usize, usize)> {
        let lo = lo.round().max(0.0);
        let hi = hi.round().min(len as f64 - 1.0);
        (lo <= hi).then_some((lo as usize, hi as usize))
    };

    for (idx, det) in detections.iter().enumerate() {
        let radius = det.sphere_radius();
        let label = idx as u32 + 1;

        let Some((z0, z1)) = clip(det.z - radius / anisotropy, det.z + radius / anisotropy, depth)
        else {
            continue;
        };
        let Some((y0, y1)) = clip(det.y - radius, det.y + radius, height) else {
            continue;
        };
        let Some((x0, x1)) = clip(det.x - radius, det.x + radius, width) else {
            continue;
        };

        for z in z0..=z1 {
            let dz = anisotropy * (z as f64 - det.z);
            for y in y0..=y1 {
                let dy = y as f64 - det.y;
                for x in x0..=x1 {
                    let dx = x as f64 - det.x;
                    if (dz * dz + dy * dy + dx * dx).sqrt() <= radius {
                        mask[(z, y, x)] = label;
                    }
                }
            }
        }
    }

    mask
}

/// Centroid, id and size of every labelled object in an instance volume.
///
/// Ids are the label values in ascending order, positions the mean voxel
/// coordinate (z, y, x), sizes `anisotropy × voxel count`. Label 0 is background.
pub fn centroids_from_labels(
    labels: &Buffer3<u32>,
    anisotropy: f64,
    checkpoint: &Checkpoint,
) -> Result<PointCloud> {
    let mut sums: BTreeMap<u32, (DVec3, usize)> = BTreeMap::new();
    let (depth, height, width) = labels.shape();

    for z in 0..depth {
        checkpoint.step(z, depth, Stage::Centroids)?;
        let plane = labels.plane(z);
        for y in 0..height {
            for x in 0..width {
                let label = plane[y * width + x];
                if label == 0 {
                    continue;
                }
                let entry = sums.entry(label).or_insert((DVec3::ZERO, 0));
                entry.0 += DVec3::new(z as f64, y as f64, x as f64);
                entry.1 += 1;
            }
        }
    }
    checkpoint.step(depth, depth, Stage::Centroids)?;

    let mut points = Vec::with_capacity(sums.len());
    let mut ids = Vec::with_capacity(sums.len());
    let mut sizes = Vec::with_capacity(sums.len());
    for (label, (sum, count)) in sums {
        points.push(sum / count as f64);
        ids.push(label as i64);
        sizes.push(anisotropy * count as f64);
    }
    tracing::info!(objects = points.len(), "extracted label centroids");

    PointCloud::new(points).with_ids(ids)?.with_sizes(sizes)
}
