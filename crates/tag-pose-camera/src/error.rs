use tag_pose_core::{CameraIdentity, FrameError};

use crate::SessionState;

/// Errors returned by camera sessions and camera services.
#[derive(thiserror::Error, Debug)]
pub enum CameraError {
    #[error("unable to open or start the {camera} camera")]
    CameraUnavailable { camera: CameraIdentity },

    #[error("cannot {op} while the session is {state}")]
    InvalidState {
        op: &'static str,
        state: SessionState,
    },

    #[error("a frame is still held; release it before requesting the next one")]
    FrameOutstanding,

    #[error("camera stream ended")]
    StreamEnded,

    #[error("camera service error: {0}")]
    Service(String),

    #[error(transparent)]
    Frame(#[from] FrameError),
}
