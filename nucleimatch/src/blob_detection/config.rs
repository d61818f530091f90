//! Configuration for scale-space blob detection.

use serde::{Deserialize, Serialize};

/// Half-open range of integer LoG scales, `start..stop` by `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleRange {
    pub start: u32,
    pub stop: u32,
    pub step: u32,
}

impl ScaleRange {
    pub fn new(start: u32, stop: u32, step: u32) -> Self {
        Self { start, stop, step }
    }

    /// Scales for nucleus radii from `min_radius` up to `max_radius`.
    ///
    /// A blob of LoG scale `s` has radius `√3·s`, so the bounds are
    /// `round(radius / √3)`, clamped to at least 1. The upper bound stays exclusive.
    pub fn from_radii(min_radius: f64, max_radius: f64, step: u32) -> Self {
        let to_scale = |r: f64| ((r / 3f64.sqrt()).round().max(1.0)) as u32;
        Self::new(to_scale(min_radius), to_scale(max_radius), step)
    }

    pub fn scales(&self) -> Vec<u32> {
        if self.step == 0 {
            return Vec::new();
        }
        (self.start..self.stop).step_by(self.step as usize).collect()
    }

    pub fn validate(&self) {
        assert!(self.step > 0, "scale step must be positive");
        assert!(self.start >= 1, "scales must start at 1 or above");
    }
}

impl Default for ScaleRange {
    fn default() -> Self {
        Self::new(1, 10, 1)
    }
}

/// Blob detection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// LoG scales to test.
    pub scales: ScaleRange,
    /// Z spacing divided by X/Y spacing. Divides the Z sigma.
    pub anisotropy: f64,
    /// Fixed threshold on the LoG response. Otsu over the local minima when unset.
    pub threshold: Option<f32>,
    /// Candidates must respond below `threshold_multiplier × threshold`.
    /// Plain Otsu keeps too few nuclei, hence the 0.2 default.
    pub threshold_multiplier: f32,
    /// Overlap, as a fraction of the smaller sphere's volume, above which
    /// the weaker of two detections is suppressed.
    pub overlap_fraction: f64,
}

impl DetectionConfig {
    pub fn validate(&self) {
        self.scales.validate();
        assert!(
            self.anisotropy > 0.0 && self.anisotropy.is_finite(),
            "anisotropy must be positive"
        );
        assert!(
            self.threshold_multiplier.is_finite(),
            "threshold_multiplier must be finite"
        );
        assert!(
            (0.0..=1.0).contains(&self.overlap_fraction),
            "overlap_fraction must be in [0, 1]"
        );
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            scales: ScaleRange::default(),
            anisotropy: 5.0,
            threshold: None,
            threshold_multiplier: 0.2,
            overlap_fraction: 0.05,
        }
    }
}
