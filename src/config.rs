//! Session settings, loadable from a TOML file.
//!
//! ```toml
//! [models]
//! reference_color = [1.0, 0.0, 0.0]
//! comparison_color = [0.0, 0.0, 1.0]
//!
//! [comparison]
//! voxel_spacing_mm = 0.5
//!
//! [distance_map]
//! preset = "ColdToHotRainbow"
//! range = { min = 0.0, max = 10.0 }
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::io::DEFAULT_COLOR;
use crate::processing::comparison::{DEFAULT_MAX_GRID_DIM, DEFAULT_VOXEL_SPACING_MM};
use crate::texture::colormap::{ColorMapPreset, ScalarRange};

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub models: ModelSettings,
    pub comparison: ComparisonSettings,
    pub distance_map: DistanceMapSettings,
    pub output: OutputSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelSettings {
    pub reference_color: [f64; 3],
    pub comparison_color: [f64; 3],
    pub visible: bool,
    /// Initial opacity in percent.
    pub opacity_percent: f64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            reference_color: DEFAULT_COLOR,
            comparison_color: DEFAULT_COLOR,
            visible: true,
            opacity_percent: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComparisonSettings {
    pub voxel_spacing_mm: f64,
    pub max_grid_dim: usize,
}

impl Default for ComparisonSettings {
    fn default() -> Self {
        Self {
            voxel_spacing_mm: DEFAULT_VOXEL_SPACING_MM,
            max_grid_dim: DEFAULT_MAX_GRID_DIM,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DistanceMapSettings {
    pub preset: ColorMapPreset,
    pub signed: bool,
    /// Fixed color range; fitted to the data when absent.
    pub range: Option<ScalarRange>,
    pub show_legend: bool,
}

impl Default for DistanceMapSettings {
    fn default() -> Self {
        Self {
            preset: ColorMapPreset::default(),
            signed: false,
            range: None,
            show_legend: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSettings {
    pub directory: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let spacing = self.comparison.voxel_spacing_mm;
        if !(spacing.is_finite() && spacing > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "comparison.voxel_spacing_mm must be positive, got {}",
                spacing
            )));
        }
        if self.comparison.max_grid_dim < 3 {
            return Err(ConfigError::Invalid(
                "comparison.max_grid_dim must be at least 3".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.models.opacity_percent) {
            return Err(ConfigError::Invalid(format!(
                "models.opacity_percent must be within [0, 100], got {}",
                self.models.opacity_percent
            )));
        }
        for color in [self.models.reference_color, self.models.comparison_color] {
            if color.iter().any(|c| !(0.0..=1.0).contains(c)) {
                return Err(ConfigError::Invalid(format!(
                    "model colors are RGB in [0, 1], got {:?}",
                    color
                )));
            }
        }
        if let Some(range) = self.distance_map.range {
            ScalarRange::new(range.min, range.max)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_defaults_match_original_module() {
        let config = Config::default();
        assert_eq!(config.models.reference_color, [1.0, 0.0, 0.0]);
        assert!(config.models.visible);
        assert_eq!(config.models.opacity_percent, 100.0);
        assert_eq!(config.output.directory, PathBuf::from("output"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [models]
            comparison_color = [0.0, 0.0, 1.0]

            [distance_map]
            preset = "Grey"
            range = { min = 0.0, max = 10.0 }
            "#,
        )
        .unwrap();
        assert_eq!(config.models.comparison_color, [0.0, 0.0, 1.0]);
        assert_eq!(config.models.reference_color, [1.0, 0.0, 0.0]);
        assert_eq!(config.distance_map.preset, ColorMapPreset::Grey);
        assert_eq!(config.distance_map.range, Some(ScalarRange { min: 0.0, max: 10.0 }));
        assert_eq!(config.comparison.voxel_spacing_mm, DEFAULT_VOXEL_SPACING_MM);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = Config::from_toml_str("[models]\ncolour = [1.0, 0.0, 0.0]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            Config::from_toml_str("[comparison]\nvoxel_spacing_mm = 0.0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml_str("[distance_map]\nrange = { min = 5.0, max = 1.0 }\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml_str("[models]\nopacity_percent = 150.0\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        assert!(matches!(
            Config::from_file("no/such/config.toml"),
            Err(ConfigError::Read { .. })
        ));
    }
}
