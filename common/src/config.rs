//! YAML / JSON (de)serialization of configuration files.
//!
//! The format is picked from the file extension, so a pipeline can be driven
//! by either `settings.yaml` or `settings.json` without further flags.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to get file extension")]
    MissingFileExtension,
    #[error("Unsupported file extension for file: {0}")]
    UnsupportedFileExtension(String),
    #[error("YAML serialization failed")]
    Yaml(#[from] serde_yml::Error),
    #[error("JSON serialization failed")]
    Json(#[from] serde_json::Error),
    #[error("Config file IO failed")]
    Io(#[from] std::io::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileFormat {
    Yaml,
    Json,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .ok_or(ConfigError::MissingFileExtension)?;

        match extension.as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::UnsupportedFileExtension(
                path.display().to_string(),
            )),
        }
    }
}

pub fn serialize<T: Serialize>(value: &T, format: FileFormat) -> ConfigResult<String> {
    Ok(match format {
        FileFormat::Yaml => serde_yml::to_string(value)?,
        FileFormat::Json => serde_json::to_string_pretty(value)?,
    })
}

pub fn deserialize<T: DeserializeOwned>(serialized: &str, format: FileFormat) -> ConfigResult<T> {
    Ok(match format {
        FileFormat::Yaml => serde_yml::from_str(serialized)?,
        FileFormat::Json => serde_json::from_str(serialized)?,
    })
}

pub fn load<T: DeserializeOwned>(path: &Path) -> ConfigResult<T> {
    let format = FileFormat::from_path(path)?;
    let text = std::fs::read_to_string(path)?;
    let value = deserialize(&text, format)?;
    tracing::debug!(path = %path.display(), ?format, "loaded config");
    Ok(value)
}

pub fn save<T: Serialize>(value: &T, path: &Path) -> ConfigResult<()> {
    let format = FileFormat::from_path(path)?;
    std::fs::write(path, serialize(value, format)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_output_path;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Settings {
        trials: usize,
        threshold: Option<f64>,
        name: String,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                trials: 4000,
                threshold: None,
                name: "default".to_string(),
            }
        }
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(
            FileFormat::from_path(Path::new("a/b.YAML")).unwrap(),
            FileFormat::Yaml
        );
        assert_eq!(
            FileFormat::from_path(Path::new("b.yml")).unwrap(),
            FileFormat::Yaml
        );
        assert_eq!(
            FileFormat::from_path(Path::new("b.json")).unwrap(),
            FileFormat::Json
        );
        assert!(matches!(
            FileFormat::from_path(Path::new("b")),
            Err(ConfigError::MissingFileExtension)
        ));
        assert!(matches!(
            FileFormat::from_path(Path::new("b.toml")),
            Err(ConfigError::UnsupportedFileExtension(_))
        ));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let settings: Settings = deserialize("trials: 10\n", FileFormat::Yaml).unwrap();
        assert_eq!(settings.trials, 10);
        assert_eq!(settings.name, "default");

        let settings: Settings = deserialize(r#"{"threshold": 2.5}"#, FileFormat::Json).unwrap();
        assert_eq!(settings.trials, 4000);
        assert_eq!(settings.threshold, Some(2.5));
    }

    #[test]
    fn save_then_load_both_formats() {
        let settings = Settings {
            trials: 12,
            threshold: Some(15.0),
            name: "run".to_string(),
        };
        for file in ["config_roundtrip.yaml", "config_roundtrip.json"] {
            let path = test_output_path(file);
            save(&settings, &path).unwrap();
            let loaded: Settings = load(&path).unwrap();
            assert_eq!(loaded, settings);
        }
    }

    #[test]
    fn malformed_input_is_an_error() {
        let result: ConfigResult<Settings> = deserialize("{not json", FileFormat::Json);
        assert!(matches!(result, Err(ConfigError::Json(_))));
    }
}
