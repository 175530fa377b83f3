//! The blocking estimation loop.
//!
//! One run resolves intrinsics for the session's camera and resolution,
//! configures the detector, then pulls frames until one of them yields a
//! qualifying detection:
//! - with a target marker, the first frame containing that marker,
//! - with [`TargetSelector::Any`], the first frame containing any marker.
//!
//! Every frame is released before the next one is requested. Detections whose
//! name does not carry a numeric id are logged and dropped; they never stop
//! the loop.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tag_pose_camera::{CameraError, CameraService, CameraSession};
use tag_pose_core::{Intrinsics, IntrinsicsError, IntrinsicsTable};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    parse_marker_id, DetectorError, DetectorSetup, MarkerConfig, MarkerDetector, PoseRecord,
};

/// Which markers a run is looking for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSelector {
    /// Stop on the first frame with any marker and return all of them.
    #[default]
    Any,
    /// Stop on the first frame containing this marker id and return only it.
    Marker(u32),
}

impl TargetSelector {
    #[inline]
    pub fn accepts(self, marker_id: u32) -> bool {
        match self {
            Self::Any => true,
            Self::Marker(id) => id == marker_id,
        }
    }
}

impl From<Option<u32>> for TargetSelector {
    fn from(value: Option<u32>) -> Self {
        value.map_or(Self::Any, Self::Marker)
    }
}

impl fmt::Display for TargetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any tag"),
            Self::Marker(id) => write!(f, "tag {id}"),
        }
    }
}

/// Optional bounds on a run. Both unset (the default) means block until found.
///
/// The timeout is checked between frames; a frame request that blocks inside
/// the camera service is not interrupted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopLimits {
    #[serde(default)]
    pub max_frames: Option<u64>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl LoopLimits {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_max_frames(mut self, frames: u64) -> Self {
        self.max_frames = Some(frames);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Errors that abort an estimation run.
#[derive(thiserror::Error, Debug)]
pub enum EstimateError {
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Intrinsics(#[from] IntrinsicsError),
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error("no qualifying detection within {frames} frames")]
    FrameLimitReached { frames: u64 },
    #[error("no qualifying detection after {elapsed:?}")]
    TimedOut { elapsed: Duration },
}

/// Result of a successful run.
#[derive(Clone, Debug, PartialEq)]
pub struct EstimateOutcome {
    pub records: Vec<PoseRecord>,
    /// Frames pulled from the session, including the qualifying one.
    pub frames_consumed: u64,
    /// Detections dropped because their name had no numeric id.
    pub malformed: usize,
    pub intrinsics: Intrinsics,
}

/// Drives a [`MarkerDetector`] over frames from a [`CameraSession`].
///
/// The loop owns the detector; the caller keeps the session and the marker
/// configuration and lends them to each run.
pub struct PoseEstimationLoop<D> {
    detector: D,
    table: IntrinsicsTable,
    limits: LoopLimits,
}

impl<D: MarkerDetector> PoseEstimationLoop<D> {
    pub fn new(detector: D) -> Self {
        Self {
            detector,
            table: IntrinsicsTable::default(),
            limits: LoopLimits::default(),
        }
    }

    pub fn with_table(mut self, table: IntrinsicsTable) -> Self {
        self.table = table;
        self
    }

    pub fn with_limits(mut self, limits: LoopLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn set_limits(&mut self, limits: LoopLimits) {
        self.limits = limits;
    }

    pub fn limits(&self) -> LoopLimits {
        self.limits
    }

    pub fn table(&self) -> &IntrinsicsTable {
        &self.table
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    /// Run until a qualifying frame is seen and return its pose records.
    pub fn run<S: CameraService>(
        &mut self,
        session: &mut CameraSession<S>,
        config: &MarkerConfig,
        target: TargetSelector,
    ) -> Result<Vec<PoseRecord>, EstimateError> {
        Ok(self.run_with_outcome(session, config, target)?.records)
    }

    /// Same as [`PoseEstimationLoop::run`], with frame accounting.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip(self, session, config),
            fields(camera = %session.camera(), resolution = %session.resolution())
        )
    )]
    pub fn run_with_outcome<S: CameraService>(
        &mut self,
        session: &mut CameraSession<S>,
        config: &MarkerConfig,
        target: TargetSelector,
    ) -> Result<EstimateOutcome, EstimateError> {
        if !session.is_open() {
            return Err(CameraError::InvalidState {
                op: "estimate poses",
                state: session.state(),
            }
            .into());
        }

        let intrinsics = self.table.lookup(session.camera(), session.resolution())?;
        let setup = DetectorSetup::new(intrinsics, config);
        self.detector.configure(&setup)?;
        info!(
            "looking for {target} on the {} camera (f={} px, {}x{})",
            session.camera(),
            intrinsics.focal_length,
            intrinsics.width,
            intrinsics.height
        );

        let started = Instant::now();
        let timeout = self.limits.timeout();
        let mut frames_consumed = 0u64;
        let mut malformed = 0usize;

        loop {
            if let Some(max) = self.limits.max_frames {
                if frames_consumed >= max {
                    return Err(EstimateError::FrameLimitReached { frames: max });
                }
            }
            if let Some(timeout) = timeout {
                let elapsed = started.elapsed();
                if elapsed >= timeout {
                    return Err(EstimateError::TimedOut { elapsed });
                }
            }

            let frame = session.next_frame()?;
            frames_consumed += 1;
            let buffer = frame.buffer();
            if (buffer.width(), buffer.height()) != intrinsics.frame_size() {
                warn!(
                    "frame #{} is {}x{}, intrinsics assume {}x{}",
                    frame.seq(),
                    buffer.width(),
                    buffer.height(),
                    intrinsics.width,
                    intrinsics.height
                );
            }
            let detections = self.detector.estimate(&buffer.view());
            session.release_frame(frame);
            let detections = detections?;

            let mut records = Vec::new();
            for (name, transform) in &detections {
                match parse_marker_id(name) {
                    Ok(id) if target.accepts(id) => {
                        records.push(PoseRecord::from_raw(id, transform));
                    }
                    Ok(_) => {}
                    Err(err) => {
                        malformed += 1;
                        warn!("dropping detection: {err}");
                    }
                }
            }

            debug!(
                "frame {frames_consumed}: {} detections, {} kept",
                detections.len(),
                records.len()
            );
            if !records.is_empty() {
                info!(
                    "found {} pose(s) after {frames_consumed} frame(s)",
                    records.len()
                );
                return Ok(EstimateOutcome {
                    records,
                    frames_consumed,
                    malformed,
                    intrinsics,
                });
            }
        }
    }
}
