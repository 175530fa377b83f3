//! Core types for fiducial tag pose estimation.
//!
//! This crate is intentionally small and free of any camera transport or
//! marker decoding. It holds the vocabulary shared by the session, detector
//! and estimation crates:
//! - camera identities and resolution presets,
//! - the calibrated intrinsics table and the synthetic camera matrix,
//! - frame buffers as delivered by the camera service,
//! - raw detector transforms (3x4 or 4x4, millimetres).

mod frame;
mod intrinsics;
mod logger;
mod transform;

pub use frame::{ColorSpace, FieldOfView, FrameBuffer, FrameError, FrameView, Timestamp};
pub use intrinsics::{
    CameraIdentity, Intrinsics, IntrinsicsEntry, IntrinsicsError, IntrinsicsTable, Resolution,
};
pub use transform::{RawTransform, MM_PER_M};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, init_with_levels};
