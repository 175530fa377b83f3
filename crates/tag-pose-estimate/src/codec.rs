//! Pose records: the fixed 17-float output consumed by robot control code.

use nalgebra::{Matrix3, Matrix4, Vector3};
use serde::{Deserialize, Serialize};

use tag_pose_core::{RawTransform, MM_PER_M};

/// Prefix of detector marker names; the remainder is the numeric id.
pub const MARKER_NAME_PREFIX: &str = "tag_";

/// Marker id followed by the 16 entries of the row-major 4x4 transform.
pub const POSE_RECORD_LEN: usize = 17;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed detection name '{name}' (expected 'tag_<id>')")]
    MalformedDetectionName { name: String },
}

/// `[id, m00, m01, m02, tx, m10, m11, m12, ty, m20, m21, m22, tz, 0, 0, 0, 1]`,
/// translation in metres.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoseRecord([f32; POSE_RECORD_LEN]);

impl PoseRecord {
    /// Assemble a record from an id and a transform already in metres.
    pub fn new(marker_id: u32, transform_m: &Matrix4<f32>) -> Self {
        let mut values = [0.0f32; POSE_RECORD_LEN];
        values[0] = marker_id as f32;
        for i in 0..4 {
            for j in 0..4 {
                values[1 + i * 4 + j] = transform_m[(i, j)];
            }
        }
        Self(values)
    }

    /// Record for an already parsed id and a millimetre transform.
    pub fn from_raw(marker_id: u32, transform_mm: &RawTransform) -> Self {
        let mut m = transform_mm.to_homogeneous();
        for i in 0..3 {
            m[(i, 3)] /= MM_PER_M;
        }
        Self::new(marker_id, &m)
    }

    /// Id read back from the first float. Exact only up to 2^24.
    #[inline]
    pub fn marker_id(&self) -> u32 {
        self.0[0] as u32
    }

    #[inline]
    pub fn values(&self) -> &[f32; POSE_RECORD_LEN] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.0.to_vec()
    }

    /// The 4x4 transform, translation in metres.
    pub fn transform(&self) -> Matrix4<f32> {
        Matrix4::from_row_slice(&self.0[1..])
    }

    pub fn rotation(&self) -> Matrix3<f32> {
        self.transform().fixed_view::<3, 3>(0, 0).into_owned()
    }

    pub fn translation_m(&self) -> Vector3<f32> {
        Vector3::new(self.0[4], self.0[8], self.0[12])
    }
}

impl From<PoseRecord> for Vec<f32> {
    fn from(record: PoseRecord) -> Self {
        record.to_vec()
    }
}

/// Extract the numeric id from a detector marker name such as `"tag_17"`.
///
/// Only plain decimal digits after the prefix are accepted, and the value
/// must fit in a `u32`; larger numbers are reported as malformed.
pub fn parse_marker_id(name: &str) -> Result<u32, CodecError> {
    let malformed = || CodecError::MalformedDetectionName {
        name: name.to_string(),
    };
    let digits = name.strip_prefix(MARKER_NAME_PREFIX).ok_or_else(malformed)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    digits.parse().map_err(|_| malformed())
}

/// Convert one raw detection into a [`PoseRecord`].
///
/// The rotation block is copied unchanged and the translation column is
/// converted from millimetres to metres.
pub fn encode(name: &str, transform: &RawTransform) -> Result<PoseRecord, CodecError> {
    let id = parse_marker_id(name)?;
    Ok(PoseRecord::from_raw(id, transform))
}
