//! Marker sizing configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Physical side length assumed for every marker unless configured otherwise.
pub const DEFAULT_MARKER_SIZE_MM: f32 = 30.0;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("default marker size must be finite and > 0 mm (got {size_mm})")]
    InvalidMarkerSize { size_mm: f32 },
}

fn default_marker_size_mm() -> f32 {
    DEFAULT_MARKER_SIZE_MM
}

/// How markers are sized for pose solving.
///
/// Either every marker has the same side length, or an external layout file
/// describes marker sizes and rigid groupings; markers the layout does not
/// mention still use the default size. The layout file format belongs to the
/// detector and is not read here.
///
/// Changes apply to the next estimation run, never to one in progress.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerConfig {
    #[serde(default = "default_marker_size_mm")]
    default_marker_size_mm: f32,
    #[serde(default)]
    layout_path: Option<PathBuf>,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            default_marker_size_mm: DEFAULT_MARKER_SIZE_MM,
            layout_path: None,
        }
    }
}

impl MarkerConfig {
    #[inline]
    pub fn default_marker_size_mm(&self) -> f32 {
        self.default_marker_size_mm
    }

    pub fn layout_path(&self) -> Option<&Path> {
        self.layout_path.as_deref()
    }

    /// `true` exactly when a layout file is configured.
    #[inline]
    pub fn use_layout_file(&self) -> bool {
        self.layout_path.is_some()
    }

    pub fn set_default_size(&mut self, size_mm: f32) -> Result<(), ConfigError> {
        check_size(size_mm)?;
        self.default_marker_size_mm = size_mm;
        Ok(())
    }

    /// Use the layout file at `path`. The file is only opened when the
    /// detector is configured, so a bad path surfaces there.
    pub fn load_layout(&mut self, path: impl Into<PathBuf>) {
        self.layout_path = Some(path.into());
    }

    /// Back to 30 mm markers and no layout file.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Check values that may have come from a deserialized file.
    pub fn validated(self) -> Result<Self, ConfigError> {
        check_size(self.default_marker_size_mm)?;
        Ok(self)
    }
}

fn check_size(size_mm: f32) -> Result<(), ConfigError> {
    if !size_mm.is_finite() || size_mm <= 0.0 {
        return Err(ConfigError::InvalidMarkerSize { size_mm });
    }
    Ok(())
}
