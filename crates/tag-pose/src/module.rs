//! Command surface for remote callers.
//!
//! [`TagPoseModule`] bundles one camera session, one marker configuration and
//! one estimation loop, and exposes them as the flat list of commands a robot
//! behaviour calls. Each command delegates to the owning component and logs a
//! one-line summary.

use std::path::PathBuf;

use log::info;
use tag_pose_camera::{CameraEndpoint, CameraService, CameraSession};
use tag_pose_core::{CameraIdentity, Resolution};
use tag_pose_estimate::{
    EstimateOutcome, MarkerConfig, MarkerDetector, PoseEstimationLoop, PoseRecord, TargetSelector,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::ModuleError;

/// A camera session, marker configuration and estimation loop for one camera.
///
/// For several cameras, build several modules; nothing is shared between them.
pub struct TagPoseModule<S: CameraService, D: MarkerDetector> {
    session: CameraSession<S>,
    config: MarkerConfig,
    estimator: PoseEstimationLoop<D>,
}

impl<S: CameraService, D: MarkerDetector> TagPoseModule<S, D> {
    pub fn new(service: S, detector: D) -> Self {
        Self::from_parts(
            CameraSession::new(service),
            MarkerConfig::default(),
            PoseEstimationLoop::new(detector),
        )
    }

    pub fn from_parts(
        session: CameraSession<S>,
        config: MarkerConfig,
        estimator: PoseEstimationLoop<D>,
    ) -> Self {
        Self {
            session,
            config,
            estimator,
        }
    }

    pub fn session(&self) -> &CameraSession<S> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut CameraSession<S> {
        &mut self.session
    }

    pub fn config(&self) -> &MarkerConfig {
        &self.config
    }

    pub fn estimator(&self) -> &PoseEstimationLoop<D> {
        &self.estimator
    }

    pub fn estimator_mut(&mut self) -> &mut PoseEstimationLoop<D> {
        &mut self.estimator
    }

    /// Subscribe through the broker at `host:port`. Camera 0 is top, 1 is bottom.
    pub fn subscribe_camera_remote(
        &mut self,
        host: &str,
        port: u16,
        camera_index: i32,
    ) -> Result<(), ModuleError> {
        let camera = CameraIdentity::from_index(camera_index)?;
        let endpoint = CameraEndpoint::new(host, port);
        self.subscribe_at(&endpoint, camera)
    }

    /// Subscribe through the broker on the robot itself.
    pub fn subscribe_camera_local(&mut self, camera_index: i32) -> Result<(), ModuleError> {
        let camera = CameraIdentity::from_index(camera_index)?;
        self.subscribe_at(&CameraEndpoint::default(), camera)
    }

    /// Subscribe to the bottom camera on the robot itself.
    pub fn subscribe_camera(&mut self) -> Result<(), ModuleError> {
        self.subscribe_at(&CameraEndpoint::default(), CameraIdentity::Secondary)
    }

    fn subscribe_at(
        &mut self,
        endpoint: &CameraEndpoint,
        camera: CameraIdentity,
    ) -> Result<(), ModuleError> {
        self.session.connect(endpoint)?;
        let settings = self.session.settings().clone();
        self.session.subscribe(
            camera,
            settings.resolution,
            settings.color_space,
            settings.frame_rate,
        )?;
        info!("subscribed {camera} camera at {endpoint}");
        Ok(())
    }

    pub fn unsubscribe_camera(&mut self) -> Result<(), ModuleError> {
        self.session.unsubscribe()?;
        info!("unsubscribed camera");
        Ok(())
    }

    /// Use 640x480 from the next subscription on.
    pub fn set_camera_resolution_640x480(&mut self) -> Result<(), ModuleError> {
        self.set_camera_resolution(Resolution::High)
    }

    /// Use 320x240 (the default) from the next subscription on.
    pub fn set_camera_resolution_320x240(&mut self) -> Result<(), ModuleError> {
        self.set_camera_resolution(Resolution::Low)
    }

    fn set_camera_resolution(&mut self, resolution: Resolution) -> Result<(), ModuleError> {
        self.session.set_resolution(resolution)?;
        info!("camera resolution set to {resolution}");
        Ok(())
    }

    /// Default marker side length in millimetres (30 mm unless changed).
    pub fn set_default_tag_size(&mut self, size_mm: f32) -> Result<(), ModuleError> {
        self.config.set_default_size(size_mm)?;
        info!("default tag size set to {size_mm} mm");
        Ok(())
    }

    /// Use a marker layout file for the following estimations.
    pub fn read_tag_configuration(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        info!("using tag configuration {}", path.display());
        self.config.load_layout(path);
    }

    /// 30 mm markers, no layout file.
    pub fn reset_tag_settings(&mut self) {
        self.config.reset();
        info!("tag settings reset");
    }

    /// Pose records for every tag visible in the first frame that shows any.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self)))]
    pub fn estimate_pos_all_tags(&mut self) -> Result<Vec<PoseRecord>, ModuleError> {
        let records = self
            .estimator
            .run(&mut self.session, &self.config, TargetSelector::Any)?;
        info!("estimated position of {} visible tag(s)", records.len());
        Ok(records)
    }

    /// Pose record(s) of `tag_id` from the first frame that shows it.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self)))]
    pub fn estimate_pos_given_tag(&mut self, tag_id: u32) -> Result<Vec<PoseRecord>, ModuleError> {
        let records =
            self.estimator
                .run(&mut self.session, &self.config, TargetSelector::Marker(tag_id))?;
        info!("estimated position of tag {tag_id}");
        Ok(records)
    }

    /// Run one estimation and keep the frame accounting.
    pub fn estimate(&mut self, target: TargetSelector) -> Result<EstimateOutcome, ModuleError> {
        let outcome = self
            .estimator
            .run_with_outcome(&mut self.session, &self.config, target)?;
        info!(
            "found {target} after {} frame(s), {} record(s)",
            outcome.frames_consumed,
            outcome.records.len()
        );
        Ok(outcome)
    }
}
