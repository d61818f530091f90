//! Point-set registration between two nucleus detections.
//!
//! # Pipeline
//!
//! 1. **Descriptors** - shape contexts of both clouds, one set per reference axis sign
//! 2. **Matching** - Hungarian assignment on descriptor distances, per variant pair
//! 3. **RANSAC** - robust coarse transform per variant pair; most inliers wins
//! 4. **ICP** - fixed number of nearest-neighbor refinements
//!
//! In supervised mode, caller-supplied keypoint pairs replace steps 1-3.
//!
//! The final transform is `icp · coarse`, applied to moving points as
//! column vectors `[z, y, x, 1]`.


pub mod assignment;
pub mod config;
pub mod icp;
pub mod ransac;
pub mod shape_context;
pub mod transform;

use common::CancelToken;
use glam::{DMat3, DMat4, DVec3};

use crate::error::{Error, Result};
use crate::geometry::{apply_affine, principal_frame, PointCloud};
use crate::progress::{Checkpoint, ProgressCallback, Stage};

pub use assignment::linear_sum_assignment;
pub use config::{
    IcpConfig, RansacConfig, RegistrationConfig, ShapeContextConfig, TransformKind,
    VariantStrategy, MIN_RANSAC_SAMPLES,
};
pub use icp::{nearest_neighbors, perform_icp, IcpResult};
pub use ransac::{count_inliers, do_ransac, RansacResult};
pub use shape_context::{
    build_descriptors, cost_matrix, descriptor_variants, unary_distance, Descriptors,
    ReferenceAxis,
};
pub use transform::{fit, fit_affine, fit_rigid, fit_similarity};

/// RANSAC inlier distance used when neither sizes nor a threshold are available.
pub const DEFAULT_INLIER_THRESHOLD: f64 = 16.0;

/// How the coarse transform is obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum EstimationMode {
    /// Shape-context matching followed by RANSAC.
    Unsupervised,
    /// Manually identified pairs `moving_keypoints[i] ↔ fixed_keypoints[i]`.
    Supervised {
        moving_keypoints: Vec<DVec3>,
        fixed_keypoints: Vec<DVec3>,
    },
}

/// Descriptor variant pair that produced the winning coarse transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantChoice {
    pub moving: ReferenceAxis,
    pub fixed: ReferenceAxis,
    /// Position in enumeration order (moving-major).
    pub index: usize,
}

/// Output of a registration run.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationResult {
    /// Shape-context (or keypoint) transform.
    pub coarse: DMat4,
    /// ICP refinement, applied after `coarse`.
    pub icp: DMat4,
    /// `icp · coarse`.
    pub transform: DMat4,
    /// Inliers of the coarse transform.
    pub inliers: usize,
    /// Inlier distance that was used.
    pub inlier_threshold: f64,
    /// Winning variant pair; `None` for supervised or empty input.
    pub variant: Option<VariantChoice>,
    /// ICP mean residual after each iteration.
    pub residuals: Vec<f64>,
}

impl RegistrationResult {
    fn identity(inlier_threshold: f64) -> Self {
        Self {
            coarse: DMat4::IDENTITY,
            icp: DMat4::IDENTITY,
            transform: DMat4::IDENTITY,
            inliers: 0,
            inlier_threshold,
            variant: None,
            residuals: Vec::new(),
        }
    }
}

/// RANSAC inlier distance derived from nucleus sizes.
///
/// `0.5 × (mean_size_moving^(1/3) + mean_size_fixed^(1/3))` when both clouds
/// carry sizes, otherwise [`DEFAULT_INLIER_THRESHOLD`].
pub fn default_inlier_threshold(moving: &PointCloud, fixed: &PointCloud) -> f64 {
    match (moving.mean_size(), fixed.mean_size()) {
        (Some(m), Some(f)) => 0.5 * (m.cbrt() + f.cbrt()),
        _ => DEFAULT_INLIER_THRESHOLD,
    }
}

/// Coarse alignment mapping the principal frame of `moving` onto that of `fixed`.
///
/// Axis signs are only fixed up to the PCA convention, so this is a starting
/// point rather than a registration.
pub fn principal_alignment(moving: &[DVec3], fixed: &[DVec3]) -> Result<DMat4> {
    let m = principal_frame(moving)?;
    let f = principal_frame(fixed)?;

    // Rows of `to_frame` are moving's axes; columns of `from_frame` are fixed's.
    let to_frame = DMat3::from_cols(m.axes[0], m.axes[1], m.axes[2]).transpose();
    let from_frame = DMat3::from_cols(f.axes[0], f.axes[1], f.axes[2]);
    let rotation = from_frame * to_frame;

    let mut a = DMat4::from_mat3(rotation);
    a.w_axis = (f.centroid - rotation * m.centroid).extend(1.0);
    Ok(a)
}

/// Estimates the transform aligning a moving cloud onto a fixed cloud.
#[derive(Debug, Default)]
pub struct Registrator {
    config: RegistrationConfig,
    checkpoint: Checkpoint,
}

impl Registrator {
    pub fn new(config: RegistrationConfig) -> Self {
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

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// Runs coarse estimation and ICP.
    ///
    /// An empty moving or fixed cloud yields the identity with zero inliers.
    pub fn estimate(
        &self,
        moving: &PointCloud,
        fixed: &PointCloud,
        mode: &EstimationMode,
    ) -> Result<RegistrationResult> {
        let threshold = self
            .config
            .ransac
            .inlier_threshold
            .unwrap_or_else(|| default_inlier_threshold(moving, fixed));

        if moving.is_empty() || fixed.is_empty() {
            tracing::warn!(
                moving = moving.len(),
                fixed = fixed.len(),
                "empty point cloud, returning identity"
            );
            return Ok(RegistrationResult::identity(threshold));
        }

        let (coarse, inliers, variant) = match mode {
            EstimationMode::Unsupervised => {
                let (ransac, variant) = self.match_shape_contexts(moving, fixed, threshold)?;
                (ransac.transform, ransac.inliers, Some(variant))
            }
            EstimationMode::Supervised {
                moving_keypoints,
                fixed_keypoints,
            } => {
                let (coarse, inliers) =
                    self.fit_keypoints(moving_keypoints, fixed_keypoints, threshold)?;
                (coarse, inliers, None)
            }
        };

        let moved = apply_affine(moving.points(), &coarse);
        let icp = perform_icp(
            &moved,
            fixed.points(),
            self.config.icp.iterations,
            self.config.transform_kind,
            &self.checkpoint,
        )?;

        tracing::info!(
            inliers,
            threshold,
            final_residual = icp.residuals.last().copied(),
            "registration finished"
        );

        Ok(RegistrationResult {
            coarse,
            icp: icp.transform,
            transform: icp.transform * coarse,
            inliers,
            inlier_threshold: threshold,
            variant,
            residuals: icp.residuals,
        })
    }

    /// Shape-context matching and RANSAC over every variant pair.
    fn match_shape_contexts(
        &self,
        moving: &PointCloud,
        fixed: &PointCloud,
        threshold: f64,
    ) -> Result<(RansacResult, VariantChoice)> {
        let min_samples = self.config.ransac.min_samples;
        if moving.len() < min_samples || fixed.len() < min_samples {
            return Err(Error::InsufficientSamples {
                required: min_samples,
                moving: moving.len(),
                fixed: fixed.len(),
            });
        }

        let (moving_axes, fixed_axes) = shape_context::variant_axes(self.config.variants);
        let sc = &self.config.shape_context;
        let moving_variants =
            descriptor_variants(moving.points(), &moving_axes, sc, &self.checkpoint)?;
        let fixed_variants =
            descriptor_variants(fixed.points(), &fixed_axes, sc, &self.checkpoint)?;

        let combinations = moving_variants.len() * fixed_variants.len();
        let mut best: Option<(RansacResult, VariantChoice)> = None;
        let mut index = 0;

        for m in &moving_variants {
            for f in &fixed_variants {
                self.checkpoint.step(index, combinations, Stage::Matching)?;

                let pairs = linear_sum_assignment(&cost_matrix(m, f))?;
                let (matched_moving, matched_fixed): (Vec<DVec3>, Vec<DVec3>) = pairs
                    .iter()
                    .map(|&(i, j)| (moving.points()[i], fixed.points()[j]))
                    .unzip();

                let ransac = do_ransac(
                    &matched_moving,
                    &matched_fixed,
                    self.config.transform_kind,
                    &self.config.ransac,
                    threshold,
                    &self.checkpoint,
                )?;
                tracing::debug!(
                    moving_axis = ?m.axis,
                    fixed_axis = ?f.axis,
                    inliers = ransac.inliers,
                    "variant evaluated"
                );

                let choice = VariantChoice {
                    moving: m.axis,
                    fixed: f.axis,
                    index,
                };
                let improves = best
                    .as_ref()
                    .is_none_or(|(b, _)| ransac.inliers > b.inliers);
                if improves {
                    best = Some((ransac, choice));
                }
                index += 1;
            }
        }
        self.checkpoint
            .step(combinations, combinations, Stage::Matching)?;

        best.ok_or(Error::InsufficientPoints {
            required: min_samples,
            found: 0,
        })
    }

    /// Coarse transform from keypoint pairs, with their inlier count.
    fn fit_keypoints(
        &self,
        moving_keypoints: &[DVec3],
        fixed_keypoints: &[DVec3],
        threshold: f64,
    ) -> Result<(DMat4, usize)> {
        if moving_keypoints.len() != fixed_keypoints.len() {
            return Err(Error::LengthMismatch {
                what: "keypoints",
                left: moving_keypoints.len(),
                right: fixed_keypoints.len(),
            });
        }
        let required = self.config.transform_kind.min_points();
        if moving_keypoints.len() < required {
            return Err(Error::InsufficientPoints {
                required,
                found: moving_keypoints.len(),
            });
        }

        let coarse = fit(self.config.transform_kind, moving_keypoints, fixed_keypoints)?;
        let inliers = count_inliers(moving_keypoints, fixed_keypoints, &coarse, threshold);
        Ok((coarse, inliers))
    }
}
