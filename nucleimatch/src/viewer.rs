//! Boundary to an interactive viewer that displays point layers.
//!
//! The library never owns a viewer; callers pass one in explicitly.

use glam::{DMat4, DVec3};

use crate::blob_detection::Detection;
use crate::geometry::{apply_affine, PointCloud};

/// Point-layer capability of an external viewer.
pub trait Viewer {
    /// Adds or replaces the points layer `name`. `sizes` are point diameters.
    fn add_points(&mut self, name: &str, points: &[DVec3], sizes: &[f64]);

    /// Points of layer `name`, if it exists.
    fn layer_data(&self, name: &str) -> Option<Vec<DVec3>>;
}

/// Name of the points layer shown over image layer `image`.
pub fn points_layer_name(image: &str) -> String {
    format!("points-{image}")
}

/// Shows detections over image layer `image` with diameter `2√3 × scale`.
pub fn publish_detections<V: Viewer + ?Sized>(viewer: &mut V, image: &str, detections: &[Detection]) {
    let points: Vec<DVec3> = detections.iter().map(Detection::position).collect();
    let sizes: Vec<f64> = detections.iter().map(|d| 2.0 * d.sphere_radius()).collect();
    viewer.add_points(&points_layer_name(image), &points, &sizes);
}

/// Shows `moving` mapped by `transform` as layer `name`, keeping the given point size.
pub fn publish_transformed<V: Viewer + ?Sized>(
    viewer: &mut V,
    name: &str,
    moving: &PointCloud,
    transform: &DMat4,
    size: f64,
) {
    let points = apply_affine(moving.points(), transform);
    let sizes = vec![size; points.len()];
    viewer.add_points(name, &points, &sizes);
}

/// Point cloud of a layer previously published by [`publish_detections`].
pub fn detections_from_layer<V: Viewer + ?Sized>(viewer: &V, image: &str) -> Option<PointCloud> {
    viewer
        .layer_data(&points_layer_name(image))
        .map(PointCloud::numbered)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[derive(Default)]
    struct RecordingViewer {
        layers: HashMap<String, (Vec<DVec3>, Vec<f64>)>,
    }

    impl Viewer for RecordingViewer {
        fn add_points(&mut self, name: &str, points: &[DVec3], sizes: &[f64]) {
            self.layers
                .insert(name.to_string(), (points.to_vec(), sizes.to_vec()));
        }

        fn layer_data(&self, name: &str) -> Option<Vec<DVec3>> {
            self.layers.get(name).map(|(points, _)| points.clone())
        }
    }

    #[test]
    fn test_publish_detections_sizes_and_layer_name() {
        let mut viewer = RecordingViewer::default();
        let detections = [Detection {
            scale: 3.0,
            z: 1.0,
            y: 2.0,
            x: 3.0,
            response: -4.0,
        }];
        publish_detections(&mut viewer, "nuclei", &detections);

        let (points, sizes) = &viewer.layers["points-nuclei"];
        assert_eq!(points, &vec![DVec3::new(1.0, 2.0, 3.0)]);
        assert!((sizes[0] - 6.0 * 3f64.sqrt()).abs() < 1e-12);

        let cloud = detections_from_layer(&viewer, "nuclei").unwrap();
        assert_eq!(cloud.ids(), Some(&[1][..]));
        assert!(detections_from_layer(&viewer, "other").is_none());
    }

    #[test]
    fn test_publish_transformed_moves_points() {
        let mut viewer = RecordingViewer::default();
        let cloud = PointCloud::new(vec![DVec3::ZERO, DVec3::ONE]);
        let shift = DMat4::from_translation(DVec3::new(0.0, 0.0, 5.0));
        let dyn_viewer: &mut dyn Viewer = &mut viewer;
        publish_transformed(dyn_viewer, "moved", &cloud, &shift, 4.0);

        let data = viewer.layer_data("moved").unwrap();
        assert_eq!(data, vec![DVec3::new(0.0, 0.0, 5.0), DVec3::new(1.0, 1.0, 6.0)]);
        assert_eq!(viewer.layers["moved"].1, vec![4.0, 4.0]);
    }
}
