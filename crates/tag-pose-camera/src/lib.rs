//! Camera subscription lifecycle.
//!
//! The camera service itself (device access, transport, frame delivery) is an
//! external collaborator described by [`CameraService`]. [`CameraSession`]
//! owns one subscription against it and enforces the
//! `Closed -> Opening -> Open -> Closed` lifecycle plus the one-frame-in-flight
//! rule.

mod error;
mod service;
mod session;

pub use error::CameraError;
pub use service::{CameraEndpoint, CameraService, SubscribeRequest, SubscriptionHandle};
pub use session::{CameraSession, Frame, SessionSettings, SessionState};

pub use tag_pose_core::{CameraIdentity, ColorSpace, FrameBuffer, Resolution};
