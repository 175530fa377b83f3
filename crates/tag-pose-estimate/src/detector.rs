//! Capability interface of the external marker detector.

use nalgebra::Matrix3;
use std::collections::BTreeMap;
use std::path::PathBuf;

use tag_pose_core::{FrameView, Intrinsics, RawTransform};

use crate::MarkerConfig;

/// Detector output for one frame: marker name (e.g. `"tag_17"`) to transform,
/// translation in millimetres.
pub type Detections = BTreeMap<String, RawTransform>;

#[derive(thiserror::Error, Debug)]
pub enum DetectorError {
    #[error("failed to read marker layout {path}: {reason}")]
    Layout { path: PathBuf, reason: String },
    #[error("marker estimation failed: {0}")]
    Estimate(String),
}

/// Everything a detector needs before it can estimate poses.
///
/// Distortion is always absent: frames are assumed rectified by the camera.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectorSetup {
    pub intrinsics: Intrinsics,
    pub camera_matrix: Matrix3<f32>,
    /// Size applied to every marker the layout does not describe.
    pub default_marker_size_mm: f32,
    pub layout_path: Option<PathBuf>,
}

impl DetectorSetup {
    pub fn new(intrinsics: Intrinsics, config: &MarkerConfig) -> Self {
        Self {
            intrinsics,
            camera_matrix: intrinsics.camera_matrix(),
            default_marker_size_mm: config.default_marker_size_mm(),
            layout_path: config.layout_path().map(PathBuf::from),
        }
    }

    #[inline]
    pub fn frame_size(&self) -> (u32, u32) {
        self.intrinsics.frame_size()
    }
}

/// A fiducial marker detector with pose solving.
///
/// `configure` is called at the start of every estimation run, so an
/// implementation may rebuild its internal state from scratch there.
pub trait MarkerDetector {
    /// Apply frame size, calibration and marker sizing.
    ///
    /// Layout files are read here; a missing or malformed file fails this call.
    fn configure(&mut self, setup: &DetectorSetup) -> Result<(), DetectorError>;

    /// Detect markers in `frame` and solve their poses.
    fn estimate(&mut self, frame: &FrameView<'_>) -> Result<Detections, DetectorError>;
}

impl<D: MarkerDetector + ?Sized> MarkerDetector for Box<D> {
    fn configure(&mut self, setup: &DetectorSetup) -> Result<(), DetectorError> {
        (**self).configure(setup)
    }

    fn estimate(&mut self, frame: &FrameView<'_>) -> Result<Detections, DetectorError> {
        (**self).estimate(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tag_pose_core::{CameraIdentity, IntrinsicsTable, Resolution};

    #[test]
    fn setup_carries_config_and_synthetic_matrix() {
        let intr = IntrinsicsTable::default()
            .lookup(CameraIdentity::Primary, Resolution::Low)
            .expect("lookup");
        let mut cfg = MarkerConfig::default();
        cfg.set_default_size(45.0).expect("size");
        cfg.load_layout("layout.yml");

        let setup = DetectorSetup::new(intr, &cfg);
        assert_eq!(setup.frame_size(), (320, 240));
        assert_eq!(setup.camera_matrix, intr.camera_matrix());
        assert_eq!(setup.camera_matrix[(0, 2)], 160.0);
        assert_eq!(setup.default_marker_size_mm, 45.0);
        assert_eq!(setup.layout_path, Some(PathBuf::from("layout.yml")));
    }
}
