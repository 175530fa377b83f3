//! Tag pose estimation on top of a camera session.
//!
//! Current focus:
//! - marker sizing configuration (uniform size or an external layout file),
//! - a pluggable [`MarkerDetector`] configured from intrinsics and sizing,
//! - the blocking estimation loop that stops on the first qualifying frame,
//! - conversion of raw detections into fixed 17-float [`PoseRecord`]s.
//!
//! Marker decoding and pose solving are not implemented here; they sit
//! behind [`MarkerDetector`].

mod codec;
mod config;
mod detector;
mod estimator;

pub use codec::{
    encode, parse_marker_id, CodecError, PoseRecord, MARKER_NAME_PREFIX, POSE_RECORD_LEN,
};
pub use config::{ConfigError, MarkerConfig, DEFAULT_MARKER_SIZE_MM};
pub use detector::{Detections, DetectorError, DetectorSetup, MarkerDetector};
pub use estimator::{
    EstimateError, EstimateOutcome, LoopLimits, PoseEstimationLoop, TargetSelector,
};

pub use tag_pose_core::{IntrinsicsTable, RawTransform};
