use nalgebra::{Matrix4, Vector3};
use serde::{Deserialize, Serialize};

/// Millimetres per metre.
pub const MM_PER_M: f32 = 1000.0;

/// Rigid transform as returned by a marker detector, translation in millimetres.
///
/// Detectors report either the full homogeneous 4x4 matrix or only its top
/// 3x4 block; both are rows of `[r0, r1, r2, t]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTransform {
    Homogeneous([[f32; 4]; 4]),
    Affine([[f32; 4]; 3]),
}

impl RawTransform {
    /// Full 4x4 matrix; a 3x4 block gets the implicit `[0, 0, 0, 1]` bottom row.
    pub fn to_homogeneous(&self) -> Matrix4<f32> {
        let mut m = Matrix4::identity();
        let rows: &[[f32; 4]] = match self {
            Self::Homogeneous(rows) => rows,
            Self::Affine(rows) => rows,
        };
        for (i, row) in rows.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                m[(i, j)] = *v;
            }
        }
        m
    }

    /// Translation column, in millimetres.
    pub fn translation_mm(&self) -> Vector3<f32> {
        let m = self.to_homogeneous();
        Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)])
    }

    /// Build a transform from a 4x4 matrix (translation in millimetres).
    pub fn from_matrix(m: &Matrix4<f32>) -> Self {
        let mut rows = [[0.0f32; 4]; 4];
        for (i, row) in rows.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = m[(i, j)];
            }
        }
        Self::Homogeneous(rows)
    }
}
