//! Example: Detect nuclei in two synthetic volumes and register them
//!
//! Renders Gaussian nuclei into a moving volume, moves the same nuclei by a
//! known similarity transform into a fixed volume, then runs detection and
//! unsupervised registration on both.
//!
//! Output:
//! ```text
//! target/register_synthetic/
//!   pipeline.yaml
//!   moving_detections.txt
//!   fixed_detections.txt
//!   transform.txt
//!   nucleimatch.<date>.log
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --release --example register_synthetic [pipeline.yaml]
//! ```

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use common::log_setup::setup_logging;
use common::Buffer3;
use glam::{DMat3, DMat4, DQuat, DVec3};
use nucleimatch::prelude::*;
use nucleimatch::{mat4_rows, Progress};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Volume shape in (z, y, x).
const SHAPE: (usize, usize, usize) = (48, 112, 112);

/// Number of nuclei to render.
const NUCLEI: usize = 40;

/// Gaussian sigma of a rendered nucleus, in voxels.
const NUCLEUS_SIGMA: f64 = 2.0;

fn main() -> anyhow::Result<()> {
    let out_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("target")
        .join("register_synthetic");
    setup_logging("info", Some(&out_dir)).context("logging setup")?;

    let config = match std::env::args().nth(1) {
        Some(path) => PipelineConfig::load(Path::new(&path))
            .with_context(|| format!("loading {path}"))?,
        None => demo_config(),
    };
    config.validate();
    config.save(&out_dir.join("pipeline.yaml"))?;

    let truth = ground_truth();
    let centers = nucleus_centers(NUCLEI, 7);
    let moved: Vec<DVec3> = centers.iter().map(|&c| truth.transform_point3(c)).collect();
    let moving_volume = render(&centers);
    let fixed_volume = render(&moved);

    let start = Instant::now();
    let moving = detect(&config.moving, &moving_volume)?;
    let fixed = detect(&config.fixed, &fixed_volume)?;
    tracing::info!(
        moving = moving.detections.len(),
        fixed = fixed.detections.len(),
        elapsed_ms = start.elapsed().as_millis(),
        "detection complete"
    );

    save_detections(
        &out_dir.join("moving_detections.txt"),
        &moving.detections,
        config.moving.anisotropy,
    )?;
    save_detections(
        &out_dir.join("fixed_detections.txt"),
        &fixed.detections,
        config.fixed.anisotropy,
    )?;

    let progress = ProgressCallback::new(std::sync::Arc::new(|p: Progress| {
        if p.current == p.total {
            tracing::debug!(stage = ?p.stage, "stage done");
        }
    }));
    let start = Instant::now();
    let result = Registrator::new(config.registration.clone())
        .with_progress(progress)
        .estimate(
            &moving.point_cloud(),
            &fixed.point_cloud(),
            &EstimationMode::Unsupervised,
        )?;
    tracing::info!(
        inliers = result.inliers,
        variant = ?result.variant,
        elapsed_ms = start.elapsed().as_millis(),
        "registration complete"
    );

    save_transform(&out_dir.join("transform.txt"), &result.transform)?;

    println!("\nEstimated transform (z, y, x, 1):");
    for row in mat4_rows(&result.transform) {
        println!("  {:>9.3} {:>9.3} {:>9.3} {:>9.3}", row[0], row[1], row[2], row[3]);
    }
    println!("\nGround truth:");
    for row in mat4_rows(&truth) {
        println!("  {:>9.3} {:>9.3} {:>9.3} {:>9.3}", row[0], row[1], row[2], row[3]);
    }

    let error = centers
        .iter()
        .map(|&c| result.transform.transform_point3(c).distance(truth.transform_point3(c)))
        .fold(0.0, f64::max);
    println!("\nMax displacement error over nuclei: {error:.3} voxels");

    Ok(())
}

fn demo_config() -> PipelineConfig {
    let detection = DetectionConfig {
        scales: ScaleRange::new(2, 5, 1),
        ..DetectionConfig::default()
    };
    let mut config = PipelineConfig {
        moving: detection.clone(),
        fixed: detection,
        ..PipelineConfig::default()
    };
    config.registration.transform_kind = TransformKind::Similarity;
    config.registration.ransac.inlier_threshold = Some(3.0);
    config.registration.ransac.seed = Some(1);
    config
}

/// Small rotation about z plus a shift, keeping nuclei inside the volume.
fn ground_truth() -> DMat4 {
    let rotation = DMat3::from_quat(DQuat::from_rotation_x(0.25));
    let center = DVec3::new(SHAPE.0 as f64, SHAPE.1 as f64, SHAPE.2 as f64) * 0.5;
    let shift = DVec3::new(0.0, 3.0, -2.0);
    let mut truth = DMat4::from_mat3(rotation);
    truth.w_axis = (center - rotation * center + shift).extend(1.0);
    truth
}

/// Centers at least 8 voxels apart, away from the volume border.
fn nucleus_centers(n: usize, seed: u64) -> Vec<DVec3> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let margin = 14.0;
    let mut centers: Vec<DVec3> = Vec::with_capacity(n);
    for _ in 0..n * 1000 {
        if centers.len() == n {
            break;
        }
        let c = DVec3::new(
            rng.random_range(margin..SHAPE.0 as f64 - margin),
            rng.random_range(margin..SHAPE.1 as f64 - margin),
            rng.random_range(margin..SHAPE.2 as f64 - margin),
        );
        if centers.iter().all(|q| q.distance(c) >= 8.0) {
            centers.push(c);
        }
    }
    centers
}

fn render(centers: &[DVec3]) -> Buffer3<f32> {
    let (depth, height, width) = SHAPE;
    let mut volume = Buffer3::new_default(depth, height, width);
    let two_sigma_sq = 2.0 * NUCLEUS_SIGMA * NUCLEUS_SIGMA;
    for i in 0..volume.len() {
        let (z, y, x) = volume.coords_of(i);
        let p = DVec3::new(z as f64, y as f64, x as f64);
        let value: f64 = centers
            .iter()
            .map(|c| (-p.distance_squared(*c) / two_sigma_sq).exp())
            .sum();
        volume.data_mut()[i] = (100.0 * value) as f32;
    }
    volume
}

fn detect(config: &DetectionConfig, volume: &Buffer3<f32>) -> Result<DetectionResult> {
    BlobDetector::from_config(config.clone()).detect(volume)
}
