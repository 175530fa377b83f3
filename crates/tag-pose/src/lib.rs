//! High-level facade crate for the `tag-pose-*` workspace.
//!
//! This crate provides:
//! - re-exports of the core, camera and estimation crates,
//! - [`TagPoseModule`], the command surface remote callers use,
//! - a replay harness ([`replay`]) that runs the whole pipeline from a
//!   recorded session, and the JSON config/report types used by the
//!   `tag-pose` CLI ([`io`]).
//!
//! ## Quickstart
//!
//! ```no_run
//! use tag_pose::replay::Recording;
//! use tag_pose::TagPoseModule;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (camera, detector) = Recording::load_json("session.json")?.into_replay();
//! let mut module = TagPoseModule::new(camera, detector);
//! module.subscribe_camera()?;
//! for record in module.estimate_pos_given_tag(8)? {
//!     println!("{:?}", record.values());
//! }
//! module.unsubscribe_camera()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `tag_pose::core`: camera presets, intrinsics table, frames, raw transforms.
//! - `tag_pose::camera`: camera service trait and session lifecycle.
//! - `tag_pose::estimate`: marker config, detector trait, loop, pose records.

pub use tag_pose_camera as camera;
pub use tag_pose_core as core;
pub use tag_pose_estimate as estimate;

pub use tag_pose_camera::{CameraError, CameraService, CameraSession};
pub use tag_pose_core::{CameraIdentity, Intrinsics, IntrinsicsTable, Resolution};
pub use tag_pose_estimate::{
    MarkerConfig, MarkerDetector, PoseEstimationLoop, PoseRecord, TargetSelector,
};

pub mod io;
mod module;
pub mod replay;

pub use module::TagPoseModule;

/// Errors produced by [`TagPoseModule`] commands.
#[derive(thiserror::Error, Debug)]
pub enum ModuleError {
    #[error(transparent)]
    Intrinsics(#[from] tag_pose_core::IntrinsicsError),

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Config(#[from] tag_pose_estimate::ConfigError),

    #[error(transparent)]
    Estimate(#[from] tag_pose_estimate::EstimateError),
}
