use std::sync::{Arc, Mutex};

use common::{Buffer3, CancelToken};
use glam::DVec3;

use super::*;
use crate::error::Error;
use crate::progress::{Progress, Stage};
use crate::testing::parabolic_blobs;

fn isotropic(scales: ScaleRange) -> DetectionConfig {
    DetectionConfig {
        scales,
        anisotropy: 1.0,
        ..DetectionConfig::default()
    }
}

fn assert_near_one_of(detections: &[Detection], centers: &[DVec3], tolerance: f64) {
    for det in detections {
        let nearest = centers
            .iter()
            .map(|c| c.distance(det.position()))
            .fold(f64::INFINITY, f64::min);
        assert!(
            nearest <= tolerance,
            "detection {:?} is {nearest} from every center",
            det.position()
        );
    }
}

#[test]
fn test_two_small_blobs_are_found() {
    let volume = parabolic_blobs((40, 40, 40), &[(12, 12, 12), (28, 28, 28)], 20);
    let result = BlobDetector::from_config(isotropic(ScaleRange::new(1, 5, 1)))
        .detect(&volume)
        .unwrap();

    assert_eq!(result.detections.len(), 2);
    assert_near_one_of(
        &result.detections,
        &[DVec3::splat(12.0), DVec3::splat(28.0)],
        1.5,
    );
    assert!(result.raw.len() >= result.detections.len());
    assert!(result.threshold < 0.0);
    assert_eq!(result.diagnostics.scales, 4);
    assert_eq!(result.diagnostics.suppressed, 2);
}

#[test]
#[cfg_attr(debug_assertions, ignore)]
fn test_two_blobs_in_large_volume() {
    let volume = parabolic_blobs((100, 100, 100), &[(30, 30, 30), (75, 75, 75)], 20);
    let result = find_spheres(&volume, ScaleRange::new(1, 10, 1), 1.0).unwrap();

    assert_eq!(result.detections.len(), 2);
    assert_near_one_of(
        &result.detections,
        &[DVec3::splat(30.0), DVec3::splat(75.0)],
        1.5,
    );
}

#[test]
fn test_detections_are_ordered_by_response() {
    let volume = parabolic_blobs((40, 40, 40), &[(12, 12, 12), (28, 28, 28)], 20);
    let result = BlobDetector::from_config(isotropic(ScaleRange::new(1, 5, 1)))
        .detect(&volume)
        .unwrap();

    for pair in result.detections.windows(2) {
        assert!(pair[0].response <= pair[1].response);
    }
    for det in &result.detections {
        assert!(det.response < 0.0);
    }
}

#[test]
fn test_empty_volume_yields_no_detections() {
    let volume = Buffer3::new_default(16, 16, 16);
    let result = BlobDetector::from_config(isotropic(ScaleRange::new(1, 3, 1)))
        .detect(&volume)
        .unwrap();

    assert!(result.raw.is_empty());
    assert!(result.detections.is_empty());
    assert_eq!(result.threshold, 0.0);
    assert!(result.point_cloud().is_empty());
}

#[test]
fn test_fixed_threshold_overrides_otsu() {
    let volume = parabolic_blobs((40, 40, 40), &[(12, 12, 12)], 20);
    let config = DetectionConfig {
        threshold: Some(-1.0e9),
        ..isotropic(ScaleRange::new(1, 5, 1))
    };
    let result = BlobDetector::from_config(config).detect(&volume).unwrap();

    assert_eq!(result.threshold, -1.0e9);
    assert!(result.detections.is_empty());
}

#[test]
fn test_point_cloud_numbers_detections_from_one() {
    let volume = parabolic_blobs((40, 40, 40), &[(12, 12, 12), (28, 28, 28)], 20);
    let result = BlobDetector::from_config(isotropic(ScaleRange::new(1, 5, 1)))
        .detect(&volume)
        .unwrap();

    let cloud = result.point_cloud();
    assert_eq!(cloud.len(), result.detections.len());
    assert_eq!(cloud.ids(), Some(&[1, 2][..]));
    assert_eq!(cloud.points()[0], result.detections[0].position());
}

#[test]
fn test_cancelled_detection_fails() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let volume = parabolic_blobs((12, 12, 12), &[(6, 6, 6)], 4);
    let err = BlobDetector::new()
        .with_cancel(cancel)
        .detect(&volume)
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

#[test]
fn test_progress_reports_each_scale() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback = ProgressCallback::new(Arc::new(move |p: Progress| {
        sink.lock().unwrap().push(p);
    }));

    let volume = parabolic_blobs((12, 12, 12), &[(6, 6, 6)], 4);
    BlobDetector::from_config(isotropic(ScaleRange::new(1, 4, 1)))
        .with_progress(callback)
        .detect(&volume)
        .unwrap();

    let seen = seen.lock().unwrap();
    let scale_steps: Vec<usize> = seen
        .iter()
        .filter(|p| p.stage == Stage::ScaleSpace)
        .map(|p| p.current)
        .collect();
    assert_eq!(scale_steps, vec![0, 1, 2, 3]);
    assert!(seen.iter().any(|p| p.stage == Stage::Suppression));
}

#[test]
fn test_peaks_subset_requires_minimum_and_cutoff() {
    let level = Buffer3::new(1, 1, 3, vec![-5.0f32, -1.0, -5.0]);
    let mask = Buffer3::new(1, 1, 3, vec![true, true, false]);
    let log_stack = ScaleStack::new(vec![2], vec![level]);
    let minima = ScaleStack::new(vec![2], vec![mask]);

    let peaks = peaks_subset(&log_stack, &minima, -2.0);
    assert_eq!(peaks.len(), 1);
    assert_eq!(peaks[0].row(), [2.0, 0.0, 0.0, 0.0]);
    assert_eq!(peaks[0].response, -5.0);
}

#[test]
fn test_detection_geometry() {
    let a = Detection {
        scale: 2.0,
        z: 1.0,
        y: 0.0,
        x: 0.0,
        response: -1.0,
    };
    let b = Detection {
        z: 0.0,
        y: 3.0,
        ..a
    };
    assert!((a.sphere_radius() - 2.0 * 3f64.sqrt()).abs() < 1e-12);
    assert!((a.anisotropic_distance(&b, 4.0) - 5.0).abs() < 1e-12);
}

#[test]
fn test_scale_range_from_radii() {
    let range = ScaleRange::from_radii(3.0, 15.0, 1);
    assert_eq!(range, ScaleRange::new(2, 9, 1));
    assert_eq!(range.scales(), (2..9).collect::<Vec<_>>());

    let tiny = ScaleRange::from_radii(0.1, 0.2, 1);
    assert_eq!(tiny.start, 1);
    assert!(tiny.scales().is_empty());
}

#[test]
fn test_config_partial_json_keeps_defaults() {
    let config: DetectionConfig = serde_json::from_str(r#"{ "anisotropy": 2.5 }"#).unwrap();
    assert_eq!(config.anisotropy, 2.5);
    assert_eq!(config.threshold_multiplier, 0.2);
    assert_eq!(config.overlap_fraction, 0.05);
    assert_eq!(config.scales, ScaleRange::default());
}

#[test]
#[should_panic(expected = "scale step must be positive")]
fn test_zero_scale_step_is_rejected() {
    BlobDetector::from_config(isotropic(ScaleRange::new(1, 5, 0)));
}

#[test]
#[should_panic(expected = "anisotropy must be positive")]
fn test_non_positive_anisotropy_is_rejected() {
    BlobDetector::from_config(DetectionConfig {
        anisotropy: 0.0,
        ..DetectionConfig::default()
    });
}
