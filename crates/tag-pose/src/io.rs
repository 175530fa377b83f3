//! JSON configuration and report helpers for offline pose estimation.

use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use tag_pose_core::{CameraIdentity, Intrinsics, IntrinsicsTable, Resolution};
use tag_pose_estimate::{
    ConfigError, EstimateOutcome, LoopLimits, MarkerConfig, PoseRecord, TargetSelector,
    DEFAULT_MARKER_SIZE_MM,
};

#[derive(thiserror::Error, Debug)]
pub enum TagPoseIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn default_marker_size_mm() -> f32 {
    DEFAULT_MARKER_SIZE_MM
}

/// Configuration for an estimation run over a recorded session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateConfig {
    /// Recording to replay (see [`crate::replay::Recording`]).
    pub recording_path: String,
    #[serde(default)]
    pub camera: CameraIdentity,
    #[serde(default)]
    pub resolution: Resolution,
    /// Marker id to look for; all markers of the first non-empty frame when unset.
    #[serde(default)]
    pub target: Option<u32>,
    #[serde(default = "default_marker_size_mm")]
    pub marker_size_mm: f32,
    #[serde(default)]
    pub layout_path: Option<String>,
    #[serde(default)]
    pub limits: LoopLimits,
    /// Replaces the built-in focal length table.
    #[serde(default)]
    pub intrinsics: Option<IntrinsicsTable>,
    #[serde(default)]
    pub output_path: Option<String>,
}

impl EstimateConfig {
    /// Minimal config for `recording_path` with every other field at its default.
    pub fn new(recording_path: impl Into<String>) -> Self {
        Self {
            recording_path: recording_path.into(),
            camera: CameraIdentity::default(),
            resolution: Resolution::default(),
            target: None,
            marker_size_mm: DEFAULT_MARKER_SIZE_MM,
            layout_path: None,
            limits: LoopLimits::default(),
            intrinsics: None,
            output_path: None,
        }
    }

    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, TagPoseIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), TagPoseIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Resolve the output report path.
    pub fn output_path(&self) -> PathBuf {
        self.output_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("tag_pose_report.json"))
    }

    /// Make relative input paths relative to `base` (usually the config's directory).
    pub fn resolve_paths(&mut self, base: &Path) {
        let rebase = |p: &mut String| {
            if Path::new(p.as_str()).is_relative() {
                *p = base.join(p.as_str()).to_string_lossy().into_owned();
            }
        };
        rebase(&mut self.recording_path);
        if let Some(layout) = self.layout_path.as_mut() {
            rebase(layout);
        }
    }

    pub fn target(&self) -> TargetSelector {
        self.target.into()
    }

    /// Build the marker configuration described by this config.
    pub fn build_marker_config(&self) -> Result<MarkerConfig, ConfigError> {
        let mut config = MarkerConfig::default();
        config.set_default_size(self.marker_size_mm)?;
        if let Some(layout) = &self.layout_path {
            config.load_layout(layout);
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateReport {
    pub config_path: String,
    pub recording_path: String,
    pub camera: CameraIdentity,
    pub resolution: Resolution,
    #[serde(default)]
    pub target: Option<u32>,
    #[serde(default)]
    pub intrinsics: Option<Intrinsics>,
    #[serde(default)]
    pub frames_consumed: u64,
    #[serde(default)]
    pub malformed_detections: usize,
    #[serde(default)]
    pub records: Vec<PoseRecord>,
    #[serde(default)]
    pub error: Option<String>,
}

impl EstimateReport {
    /// Build an empty report for a run of `config`.
    pub fn new(config_path: impl Into<String>, config: &EstimateConfig) -> Self {
        Self {
            config_path: config_path.into(),
            recording_path: config.recording_path.clone(),
            camera: config.camera,
            resolution: config.resolution,
            target: config.target,
            intrinsics: None,
            frames_consumed: 0,
            malformed_detections: 0,
            records: Vec::new(),
            error: None,
        }
    }

    pub fn set_outcome(&mut self, outcome: EstimateOutcome) {
        self.intrinsics = Some(outcome.intrinsics);
        self.frames_consumed = outcome.frames_consumed;
        self.malformed_detections = outcome.malformed;
        self.records = outcome.records;
        self.error = None;
    }

    pub fn set_error(&mut self, err: impl ToString) {
        self.error = Some(err.to_string());
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, TagPoseIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), TagPoseIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
