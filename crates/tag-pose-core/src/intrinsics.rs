//! Camera presets and the calibrated intrinsics table.
//!
//! Focal lengths are measured per camera module and per resolution. They do
//! not scale linearly with the frame size, so the table is an explicit list of
//! entries rather than a formula.

use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which head camera a session is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CameraIdentity {
    /// Forehead camera, service index 0.
    #[serde(alias = "top")]
    Primary,
    /// Mouth camera, service index 1.
    #[serde(alias = "bottom")]
    #[default]
    Secondary,
}

impl CameraIdentity {
    /// Map a service camera index (0 = top, 1 = bottom).
    pub fn from_index(index: i32) -> Result<Self, IntrinsicsError> {
        match index {
            0 => Ok(Self::Primary),
            1 => Ok(Self::Secondary),
            _ => Err(IntrinsicsError::UnsupportedCamera { index }),
        }
    }

    /// Camera index understood by the camera service.
    #[inline]
    pub fn index(self) -> i32 {
        match self {
            Self::Primary => 0,
            Self::Secondary => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Primary => "top",
            Self::Secondary => "bottom",
        }
    }
}

impl fmt::Display for CameraIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Supported capture resolutions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// 320x240.
    #[serde(alias = "qvga", alias = "320x240")]
    #[default]
    Low,
    /// 640x480.
    #[serde(alias = "vga", alias = "640x480")]
    High,
}

impl Resolution {
    /// Map a preset index (0 = 320x240, 1 = 640x480).
    pub fn from_index(index: i32) -> Result<Self, IntrinsicsError> {
        match index {
            0 => Ok(Self::Low),
            1 => Ok(Self::High),
            _ => Err(IntrinsicsError::UnsupportedResolution { index }),
        }
    }

    /// Preset index, the inverse of [`Resolution::from_index`].
    #[inline]
    pub fn index(self) -> i32 {
        match self {
            Self::Low => 0,
            Self::High => 1,
        }
    }

    /// Resolution code understood by the camera service (QVGA = 1, VGA = 2).
    #[inline]
    pub fn service_code(self) -> i32 {
        match self {
            Self::Low => 1,
            Self::High => 2,
        }
    }

    /// Frame size in pixels as `(width, height)`.
    #[inline]
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Low => (320, 240),
            Self::High => (640, 480),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = self.dimensions();
        write!(f, "{w}x{h}")
    }
}

/// Pinhole parameters used for pose solving.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub width: u32,
    pub height: u32,
    /// Focal length in pixels (same on both axes).
    pub focal_length: f32,
}

impl Intrinsics {
    /// Synthetic camera matrix `[[f, 0, w/2], [0, f, h/2], [0, 0, 1]]`.
    pub fn camera_matrix(&self) -> Matrix3<f32> {
        let f = self.focal_length;
        let cx = self.width as f32 / 2.0;
        let cy = self.height as f32 / 2.0;
        Matrix3::new(f, 0.0, cx, 0.0, f, cy, 0.0, 0.0, 1.0)
    }

    #[inline]
    pub fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Errors raised by intrinsics and preset lookups.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum IntrinsicsError {
    #[error("unsupported camera resolution index {index} (0 = 320x240, 1 = 640x480)")]
    UnsupportedResolution { index: i32 },
    #[error("unsupported camera index {index} (0 = top, 1 = bottom)")]
    UnsupportedCamera { index: i32 },
    #[error("no calibrated focal length for {camera} camera at {resolution}")]
    MissingEntry {
        camera: CameraIdentity,
        resolution: Resolution,
    },
    #[error("focal length for {camera} camera at {resolution} must be > 0")]
    InvalidFocalLength {
        camera: CameraIdentity,
        resolution: Resolution,
    },
}

/// One calibrated table row.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicsEntry {
    pub camera: CameraIdentity,
    pub resolution: Resolution,
    pub focal_length: f32,
}

/// Calibrated focal lengths keyed by `(camera, resolution)`.
///
/// The default table carries the head-camera calibration; a custom table can
/// be deserialized from JSON (`{"entries": [...]}`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicsTable {
    entries: Vec<IntrinsicsEntry>,
}

impl Default for IntrinsicsTable {
    fn default() -> Self {
        use CameraIdentity::{Primary, Secondary};
        use Resolution::{High, Low};

        let entry = |camera, resolution, focal_length| IntrinsicsEntry {
            camera,
            resolution,
            focal_length,
        };
        Self {
            entries: vec![
                entry(Primary, Low, 280.0),
                entry(Secondary, Low, 275.0),
                entry(Primary, High, 380.0),
                entry(Secondary, High, 400.0),
            ],
        }
    }
}

impl IntrinsicsTable {
    /// Build a table from explicit entries. Later duplicates override earlier ones.
    pub fn from_entries(
        entries: impl IntoIterator<Item = IntrinsicsEntry>,
    ) -> Result<Self, IntrinsicsError> {
        let mut table = Self {
            entries: Vec::new(),
        };
        for e in entries {
            if !e.focal_length.is_finite() || e.focal_length <= 0.0 {
                return Err(IntrinsicsError::InvalidFocalLength {
                    camera: e.camera,
                    resolution: e.resolution,
                });
            }
            table
                .entries
                .retain(|x| !(x.camera == e.camera && x.resolution == e.resolution));
            table.entries.push(e);
        }
        Ok(table)
    }

    pub fn entries(&self) -> &[IntrinsicsEntry] {
        &self.entries
    }

    /// Resolve intrinsics for a camera at a resolution preset.
    pub fn lookup(
        &self,
        camera: CameraIdentity,
        resolution: Resolution,
    ) -> Result<Intrinsics, IntrinsicsError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.camera == camera && e.resolution == resolution)
            .ok_or(IntrinsicsError::MissingEntry { camera, resolution })?;
        let (width, height) = resolution.dimensions();
        Ok(Intrinsics {
            width,
            height,
            focal_length: entry.focal_length,
        })
    }

    /// Same as [`IntrinsicsTable::lookup`], starting from a raw resolution index.
    pub fn lookup_index(
        &self,
        camera: CameraIdentity,
        resolution_index: i32,
    ) -> Result<Intrinsics, IntrinsicsError> {
        self.lookup(camera, Resolution::from_index(resolution_index)?)
    }
}
