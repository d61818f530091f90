//! RANSAC over a fixed set of putative correspondences.
//!
//! Each trial draws `min_samples` distinct pairs, fits the
//! transform model to them, and counts the pairs the fit brings within the
//! inlier distance. The model with the most inliers wins; the first one seen
//! keeps a tie.

use glam::{DMat4, DVec3};
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{Error, Result};
use crate::progress::{Checkpoint, Stage};
use crate::registration::config::{RansacConfig, TransformKind};
use crate::registration::transform::fit;

/// Trials between progress / cancellation checkpoints.
const CHECKPOINT_INTERVAL: usize = 100;

/// Result of RANSAC estimation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RansacResult {
    /// Best transformation found, identity when no trial produced an inlier.
    pub transform: DMat4,
    /// Number of pairs within the inlier distance under `transform`.
    pub inliers: usize,
}

/// Robustly fits `kind` to the pairs `(moving[i], fixed[i])`.
///
/// `error` is the inlier distance (inclusive). Fails with
/// [`Error::InsufficientSamples`] when there are fewer pairs than
/// `config.min_samples`, and with [`Error::DegenerateFit`] when no sample
/// could be fitted at all.
pub fn do_ransac(
    moving: &[DVec3],
    fixed: &[DVec3],
    kind: TransformKind,
    config: &RansacConfig,
    error: f64,
    checkpoint: &Checkpoint,
) -> Result<RansacResult> {
    if moving.len() != fixed.len() {
        return Err(Error::LengthMismatch {
            what: "correspondences",
            left: moving.len(),
            right: fixed.len(),
        });
    }
    let n = moving.len();
    let min_samples = config.min_samples;
    if n < min_samples || min_samples == 0 {
        return Err(Error::InsufficientSamples {
            required: min_samples.max(1),
            moving: moving.len(),
            fixed: fixed.len(),
        });
    }

    let mut rng: ChaCha8Rng = match config.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_os_rng(),
    };

    let mut best = RansacResult {
        transform: DMat4::IDENTITY,
        inliers: 0,
    };
    let mut failed_fits = 0;
    let mut sample_moving: Vec<DVec3> = Vec::with_capacity(min_samples);
    let mut sample_fixed: Vec<DVec3> = Vec::with_capacity(min_samples);

    for trial in 0..config.trials {
        if trial % CHECKPOINT_INTERVAL == 0 {
            checkpoint.step(trial, config.trials, Stage::Ransac)?;
        }

        sample_moving.clear();
        sample_fixed.clear();
        for i in index::sample(&mut rng, n, min_samples) {
            sample_moving.push(moving[i]);
            sample_fixed.push(fixed[i]);
        }

        let transform = match fit(kind, &sample_moving, &sample_fixed) {
            Ok(t) => t,
            Err(e) => {
                failed_fits += 1;
                tracing::trace!(trial, error = %e, "RANSAC sample rejected");
                continue;
            }
        };

        let inliers = count_inliers(moving, fixed, &transform, error);
        if inliers > best.inliers {
            best = RansacResult { transform, inliers };
        }
    }
    checkpoint.step(config.trials, config.trials, Stage::Ransac)?;

    if config.trials > 0 && failed_fits == config.trials {
        tracing::warn!(trials = config.trials, ?kind, "every RANSAC sample was degenerate");
        return Err(Error::DegenerateFit("every RANSAC sample was degenerate"));
    }
    if failed_fits > 0 {
        tracing::debug!(failed_fits, trials = config.trials, "degenerate RANSAC samples skipped");
    }

    tracing::debug!(
        pairs = n,
        inliers = best.inliers,
        trials = config.trials,
        "RANSAC finished"
    );
    Ok(best)
}

/// Number of pairs with `‖transform(moving[i]) − fixed[i]‖ <= error`.
pub fn count_inliers(moving: &[DVec3], fixed: &[DVec3], transform: &DMat4, error: f64) -> usize {
    moving
        .iter()
        .zip(fixed)
        .filter(|(m, f)| transform.transform_point3(**m).distance(**f) <= error)
        .count()
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;
    use crate::geometry::{apply_affine, mat4_from_rows};
    use crate::testing::spaced_cloud;

    fn seeded(seed: u64, trials: usize) -> RansacConfig {
        RansacConfig {
            min_samples: 4,
            trials,
            inlier_threshold: None,
            seed: Some(seed),
        }
    }

    fn truth() -> DMat4 {
        mat4_from_rows([
            [0.95, -0.1, 0.05, 10.0],
            [0.08, 1.02, -0.04, -20.0],
            [-0.03, 0.06, 0.98, 5.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// Correct pairs followed by `outliers` pairs with shuffled targets.
    fn contaminated(outliers: usize) -> (Vec<DVec3>, Vec<DVec3>) {
        let moving = spaced_cloud(40, DVec3::new(200.0, 200.0, 100.0), 10.0, 21);
        let mut fixed = apply_affine(&moving, &truth());
        let n = fixed.len();
        if outliers > 0 {
            fixed[n - outliers..].rotate_left(1);
        }
        (moving, fixed)
    }

    #[test]
    fn test_recovers_transform_despite_outliers() {
        let (moving, fixed) = contaminated(10);
        let result = do_ransac(
            &moving,
            &fixed,
            TransformKind::Affine,
            &seeded(5, 500),
            1.0,
            &Checkpoint::default(),
        )
        .unwrap();

        assert_eq!(result.inliers, moving.len() - 10);
        let moved = apply_affine(&moving[..30], &result.transform);
        for (m, f) in moved.iter().zip(&fixed[..30]) {
            assert!(m.distance(*f) < 1e-6);
        }
    }

    #[test]
    fn test_inliers_never_decrease_with_threshold() {
        let (moving, mut fixed) = contaminated(15);
        // Perturb the targets so inlier counts change gradually.
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        for f in &mut fixed {
            *f += DVec3::new(
                rng.random_range(-3.0..3.0),
                rng.random_range(-3.0..3.0),
                rng.random_range(-3.0..3.0),
            );
        }

        let mut previous = 0;
        for error in [0.5, 1.0, 2.0, 4.0, 8.0, 16.0, 64.0] {
            let result = do_ransac(
                &moving,
                &fixed,
                TransformKind::Affine,
                &seeded(42, 300),
                error,
                &Checkpoint::default(),
            )
            .unwrap();
            assert!(result.inliers >= previous, "error {error}");
            previous = result.inliers;
        }
    }

    #[test]
    fn test_too_few_pairs_fail_fast() {
        let points = vec![DVec3::ZERO, DVec3::X, DVec3::Y];
        let err = do_ransac(
            &points,
            &points,
            TransformKind::Affine,
            &seeded(0, 10),
            1.0,
            &Checkpoint::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientSamples {
                required: 4,
                moving: 3,
                fixed: 3
            }
        ));
    }

    #[test]
    fn test_cancellation_stops_trials() {
        let (moving, fixed) = contaminated(0);
        let checkpoint = Checkpoint::default();
        checkpoint.cancel.cancel();
        let result = do_ransac(
            &moving,
            &fixed,
            TransformKind::Rigid,
            &seeded(1, 1000),
            1.0,
            &checkpoint,
        );
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_all_degenerate_samples_is_an_error() {
        let moving = vec![DVec3::new(5.0, 5.0, 5.0); 12];
        let fixed = spaced_cloud(12, DVec3::splat(100.0), 10.0, 4);
        let err = do_ransac(
            &moving,
            &fixed,
            TransformKind::Similarity,
            &seeded(3, 50),
            1.0,
            &Checkpoint::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::DegenerateFit(_)));
    }

    #[test]
    fn test_coplanar_affine_fits_within_the_plane() {
        let moving: Vec<DVec3> = spaced_cloud(25, DVec3::new(1.0, 150.0, 150.0), 12.0, 8)
            .into_iter()
            .map(|p| DVec3::new(0.0, p.y, p.z))
            .collect();
        let fixed = apply_affine(&moving, &truth());

        let result = do_ransac(
            &moving,
            &fixed,
            TransformKind::Affine,
            &seeded(11, 100),
            1e-3,
            &Checkpoint::default(),
        )
        .unwrap();
        assert_eq!(result.inliers, moving.len());
        assert_ne!(result.transform, DMat4::IDENTITY);
    }
}
