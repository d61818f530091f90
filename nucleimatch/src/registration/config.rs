//! Configuration types for point-set registration.

use serde::{Deserialize, Serialize};

// =============================================================================
// Transform model
// =============================================================================

/// Transform model fitted by RANSAC, supervised estimation and ICP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransformKind {
    /// Full 3-D affine map (12 degrees of freedom).
    #[default]
    Affine,
    /// Uniform scale, rotation and translation.
    Similarity,
    /// Rotation and translation.
    Rigid,
}

impl TransformKind {
    /// Smallest number of non-degenerate correspondences that determine the model.
    pub fn min_points(self) -> usize {
        match self {
            TransformKind::Affine => 4,
            TransformKind::Similarity | TransformKind::Rigid => 3,
        }
    }
}

/// Which descriptor sign variants are compared during unsupervised matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VariantStrategy {
    /// Moving `±x0` against fixed `±x0`: 4 combinations.
    #[default]
    Mirrored,
    /// Moving `±x0` against fixed `±x0, ±x1`: 8 combinations.
    Extended,
}

// =============================================================================
// Shape context
// =============================================================================

/// Histogram layout of the shape-context descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeContextConfig {
    pub r_bins: usize,
    pub theta_bins: usize,
    pub phi_bins: usize,
    /// Innermost radial edge, in units of the cloud's mean pairwise distance.
    pub r_inner: f64,
    /// Outermost radial edge. Farther neighbors fall in the last ring.
    pub r_outer: f64,
}

impl ShapeContextConfig {
    /// Number of histogram bins per descriptor.
    pub fn len(&self) -> usize {
        self.r_bins * self.theta_bins * self.phi_bins
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn validate(&self) {
        assert!(self.r_bins > 0, "r_bins must be positive");
        assert!(self.theta_bins > 0, "theta_bins must be positive");
        assert!(self.phi_bins > 0, "phi_bins must be positive");
        assert!(
            self.r_inner > 0.0 && self.r_inner < self.r_outer,
            "radial bounds must satisfy 0 < r_inner < r_outer"
        );
    }
}

impl Default for ShapeContextConfig {
    fn default() -> Self {
        Self {
            r_bins: 5,
            theta_bins: 6,
            phi_bins: 12,
            r_inner: 0.125,
            r_outer: 2.0,
        }
    }
}

// =============================================================================
// RANSAC / ICP
// =============================================================================

/// Fewest correspondences a RANSAC trial may draw, whatever the transform kind.
pub const MIN_RANSAC_SAMPLES: usize = 4;

/// RANSAC configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    /// Correspondences drawn per trial, at least [`MIN_RANSAC_SAMPLES`].
    pub min_samples: usize,
    /// Number of trials. There is no early termination.
    pub trials: usize,
    /// Inlier distance. Derived from nucleus sizes when unset.
    pub inlier_threshold: Option<f64>,
    /// Random seed for reproducibility (None for random).
    pub seed: Option<u64>,
}

impl RansacConfig {
    pub fn validate(&self) {
        assert!(
            self.min_samples >= MIN_RANSAC_SAMPLES,
            "min_samples must be at least {MIN_RANSAC_SAMPLES}"
        );
        assert!(self.trials > 0, "trials must be positive");
        if let Some(threshold) = self.inlier_threshold {
            assert!(
                threshold >= 0.0 && threshold.is_finite(),
                "inlier_threshold must be finite and non-negative"
            );
        }
    }
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            min_samples: 4,
            trials: 4000,
            inlier_threshold: None,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcpConfig {
    /// Fixed number of refinement iterations (no convergence test).
    pub iterations: usize,
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self { iterations: 50 }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Complete registration settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    pub transform_kind: TransformKind,
    pub variants: VariantStrategy,
    pub shape_context: ShapeContextConfig,
    pub ransac: RansacConfig,
    pub icp: IcpConfig,
}

impl RegistrationConfig {
    pub fn validate(&self) {
        self.shape_context.validate();
        self.ransac.validate();
    }
}
