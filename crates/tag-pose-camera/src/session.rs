use serde::{Deserialize, Serialize};
use std::fmt;

use log::{debug, info, warn};
use tag_pose_core::{CameraIdentity, ColorSpace, FrameBuffer, Resolution};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{CameraEndpoint, CameraError, CameraService, SubscribeRequest, SubscriptionHandle};

/// Lifecycle of a camera subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    /// Subscription issued, device not started yet.
    Opening,
    Open,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Opening => "opening",
            Self::Open => "open",
        })
    }
}

fn default_client_name() -> String {
    "cam".to_string()
}

fn default_frame_rate() -> u32 {
    30
}

/// Subscription parameters remembered between subscriptions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default)]
    pub camera: CameraIdentity,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub color_space: ColorSpace,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
}

impl Default for SessionSettings {
    /// Bottom camera, 320x240, BGR, 30 fps.
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            camera: CameraIdentity::default(),
            resolution: Resolution::default(),
            color_space: ColorSpace::default(),
            frame_rate: default_frame_rate(),
        }
    }
}

impl SessionSettings {
    fn request(&self) -> SubscribeRequest {
        SubscribeRequest {
            client_name: self.client_name.clone(),
            camera: self.camera,
            resolution: self.resolution,
            color_space: self.color_space,
            frame_rate: self.frame_rate,
        }
    }
}

/// A frame borrowed from the camera service.
///
/// Give it back with [`CameraSession::release_frame`] before asking for the
/// next one. Dropping it without releasing leaks the service-side buffer and
/// blocks further `next_frame` calls on the session.
#[derive(Debug)]
#[must_use = "frames must be handed back with CameraSession::release_frame"]
pub struct Frame {
    seq: u64,
    buffer: FrameBuffer,
}

impl Frame {
    /// Position of this frame in the session, starting at 1.
    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    #[inline]
    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }
}

/// One subscription to an external camera service.
///
/// Not synchronized: a single caller drives subscribe, frame pulls and
/// unsubscribe sequentially.
pub struct CameraSession<S: CameraService> {
    service: S,
    settings: SessionSettings,
    state: SessionState,
    handle: Option<SubscriptionHandle>,
    outstanding: Option<u64>,
    frames_served: u64,
}

impl<S: CameraService> CameraSession<S> {
    /// Closed session with default settings.
    pub fn new(service: S) -> Self {
        Self::with_settings(service, SessionSettings::default())
    }

    pub fn with_settings(service: S, settings: SessionSettings) -> Self {
        Self {
            service,
            settings,
            state: SessionState::Closed,
            handle: None,
            outstanding: None,
            frames_served: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    #[inline]
    pub fn camera(&self) -> CameraIdentity {
        self.settings.camera
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.settings.resolution
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Service-side handle of the live subscription.
    pub fn handle(&self) -> Option<&SubscriptionHandle> {
        self.handle.as_ref()
    }

    /// Frames handed out since the session was created.
    #[inline]
    pub fn frames_served(&self) -> u64 {
        self.frames_served
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    fn require(&self, op: &'static str, expected: SessionState) -> Result<(), CameraError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CameraError::InvalidState {
                op,
                state: self.state,
            })
        }
    }

    /// Point the service at a broker. Only allowed while closed.
    pub fn connect(&mut self, endpoint: &CameraEndpoint) -> Result<(), CameraError> {
        self.require("connect", SessionState::Closed)?;
        self.service.connect(endpoint)?;
        debug!("camera service bound to {endpoint}");
        Ok(())
    }

    /// Subscribe to `camera` and start streaming.
    ///
    /// On any failure the session stays `Closed`; a subscription the service
    /// already issued is torn down again.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip(self, camera, resolution),
            fields(camera = %camera, resolution = %resolution)
        )
    )]
    pub fn subscribe(
        &mut self,
        camera: CameraIdentity,
        resolution: Resolution,
        color_space: ColorSpace,
        frame_rate: u32,
    ) -> Result<(), CameraError> {
        self.require("subscribe", SessionState::Closed)?;
        self.settings.camera = camera;
        self.settings.resolution = resolution;
        self.settings.color_space = color_space;
        self.settings.frame_rate = frame_rate;
        self.open()
    }

    /// Subscribe again with the remembered settings, e.g. after [`CameraSession::set_resolution`].
    pub fn resubscribe(&mut self) -> Result<(), CameraError> {
        self.require("subscribe", SessionState::Closed)?;
        self.open()
    }

    fn open(&mut self) -> Result<(), CameraError> {
        let request = self.settings.request();
        self.state = SessionState::Opening;

        let handle = match self.service.subscribe(&request) {
            Ok(handle) => handle,
            Err(err) => {
                self.state = SessionState::Closed;
                return Err(err);
            }
        };

        let camera = request.camera;
        if !self.service.open_camera(camera) || !self.service.start_camera(camera) {
            warn!("unable to initialise video capture on the {camera} camera");
            self.service.unsubscribe(&handle);
            self.state = SessionState::Closed;
            return Err(CameraError::CameraUnavailable { camera });
        }

        info!(
            "subscribed {camera} camera at {} as '{handle}'",
            request.resolution
        );
        self.handle = Some(handle);
        self.outstanding = None;
        self.state = SessionState::Open;
        Ok(())
    }

    /// Change the resolution used by the next subscription.
    ///
    /// The service only applies a resolution at subscription time, so this is
    /// rejected while a subscription is live.
    pub fn set_resolution(&mut self, resolution: Resolution) -> Result<(), CameraError> {
        self.require("change resolution", SessionState::Closed)?;
        self.settings.resolution = resolution;
        debug!("next subscription will use {resolution}");
        Ok(())
    }

    /// Block until the service delivers the next frame.
    pub fn next_frame(&mut self) -> Result<Frame, CameraError> {
        self.require("request a frame", SessionState::Open)?;
        if self.outstanding.is_some() {
            return Err(CameraError::FrameOutstanding);
        }
        let handle = self.handle.as_ref().ok_or(CameraError::InvalidState {
            op: "request a frame",
            state: self.state,
        })?;
        let buffer = self.service.get_frame(handle)?;
        self.frames_served += 1;
        self.outstanding = Some(self.frames_served);
        debug!(
            "frame #{} ({}x{})",
            self.frames_served,
            buffer.width(),
            buffer.height()
        );
        Ok(Frame {
            seq: self.frames_served,
            buffer,
        })
    }

    /// Return a frame obtained from [`CameraSession::next_frame`].
    pub fn release_frame(&mut self, frame: Frame) {
        if self.outstanding != Some(frame.seq) {
            warn!("frame #{} does not belong to the live subscription", frame.seq);
            return;
        }
        if let Some(handle) = &self.handle {
            self.service.release_frame(handle);
        }
        self.outstanding = None;
    }

    /// Drop the subscription. A frame still held by the caller is released first.
    pub fn unsubscribe(&mut self) -> Result<(), CameraError> {
        self.require("unsubscribe", SessionState::Open)?;
        self.close();
        Ok(())
    }

    fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            if self.outstanding.take().is_some() {
                self.service.release_frame(&handle);
            }
            self.service.unsubscribe(&handle);
            info!("unsubscribed '{handle}'");
        }
        self.state = SessionState::Closed;
    }
}

impl<S: CameraService> Drop for CameraSession<S> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<S: CameraService> fmt::Debug for CameraSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraSession")
            .field("settings", &self.settings)
            .field("state", &self.state)
            .field("handle", &self.handle)
            .field("outstanding", &self.outstanding)
            .finish()
    }
}
