//! Scale-space blob (nucleus) detection in 3-D volumes.
//!
//! # Pipeline
//!
//! 1. **Scale space**: scale-normalized anisotropic LoG per tested scale
//! 2. **Local minima**: voxels `<=` their 3×3×3×3 (scale, z, y, x) neighborhood
//! 3. **Threshold**: Otsu over the minima responses, tightened by a multiplier
//! 4. **Suppression**: greedy removal of spheres overlapping a stronger one
//!
//! Bright blobs give negative LoG responses, so the most negative response is
//! the most confident detection.

#[cfg(test)]
mod tests;

pub mod config;
pub mod instances;
pub mod laplacian;
pub mod scale_space;
pub mod suppression;
pub mod threshold;

use common::{Buffer3, CancelToken};
use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::progress::{Checkpoint, ProgressCallback};

pub use config::{DetectionConfig, ScaleRange};
pub use instances::{centroids_from_labels, rasterize_instances};
pub use scale_space::{local_minima, sphere_log, ScaleStack};
pub use suppression::{sphere_intersection, sphere_volume, suppress_intersecting_spheres};
pub use threshold::threshold_otsu;

/// A candidate sphere found at one LoG scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// LoG scale that responded. The sphere radius is `√3 × scale`.
    pub scale: f64,
    pub z: f64,
    pub y: f64,
    pub x: f64,
    /// Scale-normalized LoG response at the detection.
    pub response: f32,
}

impl Detection {
    /// Position in (z, y, x) voxel order.
    #[inline]
    pub fn position(&self) -> DVec3 {
        DVec3::new(self.z, self.y, self.x)
    }

    /// Isotropic-equivalent radius of the blob.
    #[inline]
    pub fn sphere_radius(&self) -> f64 {
        3f64.sqrt() * self.scale
    }

    /// `(scale, z, y, x)` row.
    #[inline]
    pub fn row(&self) -> [f64; 4] {
        [self.scale, self.z, self.y, self.x]
    }

    /// Distance to `other` with the Z offset multiplied by `anisotropy`.
    #[inline]
    pub fn anisotropic_distance(&self, other: &Detection, anisotropy: f64) -> f64 {
        let dz = anisotropy * (self.z - other.z);
        let dy = self.y - other.y;
        let dx = self.x - other.x;
        (dz * dz + dy * dy + dx * dx).sqrt()
    }
}

/// Diagnostic counters of one detection run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub scales: usize,
    pub local_minima: usize,
    pub thresholded: usize,
    pub suppressed: usize,
}

/// Everything a detection run produces.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// Thresholded local minima, in (scale, z, y, x) scan order.
    pub raw: Vec<Detection>,
    /// Detections left after overlap suppression, strongest first.
    pub detections: Vec<Detection>,
    /// Scale-normalized LoG responses.
    pub log_stack: ScaleStack<f32>,
    /// Local minima of `log_stack`.
    pub minima: ScaleStack<bool>,
    /// Otsu (or configured) threshold before the multiplier is applied.
    pub threshold: f32,
    pub diagnostics: Diagnostics,
}

impl DetectionResult {
    /// Positions of the suppressed detections as a point cloud with ids `1..=n`.
    pub fn point_cloud(&self) -> crate::geometry::PointCloud {
        crate::geometry::PointCloud::numbered(
            self.detections.iter().map(Detection::position).collect(),
        )
    }
}

/// Thresholded minima as detections: `response < cutoff` and a local minimum.
pub fn peaks_subset(
    log_stack: &ScaleStack<f32>,
    minima: &ScaleStack<bool>,
    cutoff: f32,
) -> Vec<Detection> {
    let mut peaks = Vec::new();
    for (k, (level, mask)) in log_stack.levels().iter().zip(minima.levels()).enumerate() {
        let scale = log_stack.scales()[k] as f64;
        for (i, (&response, &is_min)) in level.data().iter().zip(mask.data()).enumerate() {
            if is_min && response < cutoff {
                let (z, y, x) = level.coords_of(i);
                peaks.push(Detection {
                    scale,
                    z: z as f64,
                    y: y as f64,
                    x: x as f64,
                    response,
                });
            }
        }
    }
    peaks
}

/// Multi-scale LoG blob detector.
#[derive(Debug, Default)]
pub struct BlobDetector {
    config: DetectionConfig,
    checkpoint: Checkpoint,
}

impl BlobDetector {
    pub fn new() -> Self {
        Self::from_config(DetectionConfig::default())
    }

    pub fn from_config(config: DetectionConfig) -> Self {
        config.validate();
        Self {
            config,
            checkpoint: Checkpoint::default(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.checkpoint.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.checkpoint.cancel = cancel;
        self
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Runs the full pipeline over a (z, y, x) volume.
    ///
    /// Finding nothing is a valid outcome and returns empty detection lists.
    pub fn detect(&self, volume: &Buffer3<f32>) -> Result<DetectionResult> {
        let scales = self.config.scales.scales();
        let anisotropy = self.config.anisotropy;

        let log_stack = sphere_log(volume, &scales, anisotropy, &self.checkpoint)?;
        let minima = local_minima(&log_stack);

        let minima_values: Vec<f32> = log_stack
            .levels()
            .iter()
            .zip(minima.levels())
            .flat_map(|(level, mask)| {
                level
                    .data()
                    .iter()
                    .zip(mask.data())
                    .filter(|(_, m)| **m)
                    .map(|(&v, _)| v)
            })
            .collect();

        let threshold = match self.config.threshold {
            Some(t) => t,
            None => threshold_otsu(&minima_values).unwrap_or(0.0),
        };
        let cutoff = self.config.threshold_multiplier * threshold;

        let raw = peaks_subset(&log_stack, &minima, cutoff);
        let detections = suppress_intersecting_spheres(
            &raw,
            anisotropy,
            self.config.overlap_fraction,
            &self.checkpoint,
        )?;

        let diagnostics = Diagnostics {
            scales: scales.len(),
            local_minima: minima_values.len(),
            thresholded: raw.len(),
            suppressed: detections.len(),
        };
        if detections.is_empty() {
            tracing::warn!(?diagnostics, threshold, "no blobs found");
        } else {
            tracing::info!(?diagnostics, threshold, "blob detection finished");
        }

        Ok(DetectionResult {
            raw,
            detections,
            log_stack,
            minima,
            threshold,
            diagnostics,
        })
    }
}

/// Convenience wrapper: detect spheres with the given scales and anisotropy.
pub fn find_spheres(
    volume: &Buffer3<f32>,
    scales: ScaleRange,
    anisotropy: f64,
) -> Result<DetectionResult> {
    BlobDetector::from_config(DetectionConfig {
        scales,
        anisotropy,
        ..DetectionConfig::default()
    })
    .detect(volume)
}
