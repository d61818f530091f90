//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use nucleimatch::prelude::*;
//! ```

// Detection
pub use crate::{BlobDetector, Detection, DetectionConfig, DetectionResult, ScaleRange};

// Registration
pub use crate::{
    EstimationMode, PointCloud, RegistrationConfig, RegistrationResult, Registrator,
    TransformKind,
};

// Pipeline and IO
pub use crate::{
    load_points, load_transform, save_detections, save_transform, ColumnOrder, Error,
    PipelineConfig, ProgressCallback, Result,
};
