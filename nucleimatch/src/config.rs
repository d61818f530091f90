//! Combined settings of a detection-plus-registration run.

use std::path::Path;

use common::config::{load, save, ConfigResult};
use serde::{Deserialize, Serialize};

use crate::blob_detection::DetectionConfig;
use crate::registration::RegistrationConfig;

/// Settings for detecting nuclei in both volumes and registering them.
///
/// Missing sections fall back to their defaults, so a file may configure
/// only what differs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub moving: DetectionConfig,
    pub fixed: DetectionConfig,
    pub registration: RegistrationConfig,
}

impl PipelineConfig {
    /// Loads a YAML or JSON file, picked by extension.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        load(path)
    }

    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        save(self, path)
    }

    pub fn validate(&self) {
        self.moving.validate();
        self.fixed.validate();
        self.registration.validate();
    }
}
