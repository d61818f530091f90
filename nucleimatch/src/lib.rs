//! Nucleimatch - nuclei detection and point-set registration for 3-D microscopy.
//!
//! This library provides:
//! - Multi-scale Laplacian-of-Gaussian blob detection with Otsu thresholding
//!   and overlap suppression
//! - Shape-context descriptors, Hungarian matching and RANSAC for coarse
//!   alignment of two nucleus clouds
//! - ICP refinement with affine, similarity or rigid fits
//! - Plain-text export of detections and transforms
//!
//! Coordinates are `(z, y, x)` throughout; transforms are 4×4 matrices
//! applied to column vectors `[z, y, x, 1]`.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use nucleimatch::prelude::*;
//!
//! let moving = BlobDetector::new().detect(&moving_volume)?.point_cloud();
//! let fixed = BlobDetector::new().detect(&fixed_volume)?.point_cloud();
//!
//! let result = Registrator::new(RegistrationConfig::default())
//!     .estimate(&moving, &fixed, &EstimationMode::Unsupervised)?;
//! save_transform(Path::new("transform.txt"), &result.transform)?;
//! ```

pub mod blob_detection;
pub mod config;
pub mod error;
pub mod export;
pub mod geometry;
pub mod progress;
pub mod registration;
pub mod viewer;

#[cfg(test)]
pub mod testing;

pub mod prelude;

// ============================================================================
// Errors and progress
// ============================================================================

pub use error::{Error, Result};
pub use progress::{Checkpoint, Progress, ProgressCallback, Stage};

// ============================================================================
// Geometry
// ============================================================================

pub use geometry::{
    apply_affine, centroid, mat4_from_rows, mat4_rows, mean_distance, principal_frame,
    PointCloud, PrincipalFrame,
};

// ============================================================================
// Blob detection
// ============================================================================

pub use blob_detection::{
    // Main API
    find_spheres,
    peaks_subset,
    BlobDetector,
    // Results
    Detection,
    DetectionConfig,
    DetectionResult,
    Diagnostics as DetectionDiagnostics,
    ScaleRange,
};

// ============================================================================
// Registration
// ============================================================================

pub use registration::{
    // Configuration
    IcpConfig,
    RansacConfig,
    RegistrationConfig,
    ShapeContextConfig,
    TransformKind,
    VariantStrategy,
    // Main API
    default_inlier_threshold,
    principal_alignment,
    EstimationMode,
    Registrator,
    // Results
    RegistrationResult,
    VariantChoice,
};

// ============================================================================
// Pipeline, export and viewer
// ============================================================================

pub use config::PipelineConfig;
pub use export::{
    load_points, load_transform, save_detections, save_transform, ColumnOrder,
    DETECTIONS_HEADER,
};
pub use viewer::{publish_detections, Viewer};
