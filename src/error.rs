use std::path::PathBuf;
use thiserror::Error;

/// Failures while bringing a surface model into the session.
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("model not found in path: {}", .0.display())]
    NotFound(PathBuf),

    #[error("unsupported surface format '{extension}' for {}", .path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("failed to read {}: {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("surface {} contains no triangles", .0.display())]
    Empty(PathBuf),
}

#[derive(Debug, Error, PartialEq)]
pub enum DistanceMapError {
    #[error("invalid scalar range [{min}, {max}]: min must not exceed max")]
    InvalidRange { min: f64, max: f64 },

    #[error("scalar range bounds must be finite, got [{min}, {max}]")]
    NonFinite { min: f64, max: f64 },

    #[error("unknown color map preset '{0}'")]
    UnknownPreset(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
