//! Capability interface of the external camera service.

use serde::{Deserialize, Serialize};
use std::fmt;

use tag_pose_core::{CameraIdentity, ColorSpace, FrameBuffer, Resolution};

use crate::CameraError;

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9559
}

/// Address of the broker hosting the camera service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraEndpoint {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for CameraEndpoint {
    /// The service running on the robot itself.
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl CameraEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for CameraEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Arguments of a `subscribe` call, in service terms.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub client_name: String,
    pub camera: CameraIdentity,
    pub resolution: Resolution,
    pub color_space: ColorSpace,
    pub frame_rate: u32,
}

/// Opaque client handle issued by the service on subscription.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(String);

impl SubscriptionHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The remote video-device service.
///
/// All calls are blocking. Implementations are not expected to be shared
/// between threads; a [`crate::CameraSession`] is their only caller.
pub trait CameraService {
    /// Bind to the broker at `endpoint`. Services without a transport accept any endpoint.
    fn connect(&mut self, endpoint: &CameraEndpoint) -> Result<(), CameraError> {
        let _ = endpoint;
        Ok(())
    }

    fn subscribe(&mut self, request: &SubscribeRequest) -> Result<SubscriptionHandle, CameraError>;

    /// Power up the device. `false` means the device refused.
    fn open_camera(&mut self, camera: CameraIdentity) -> bool;

    /// Start streaming. `false` means the device refused.
    fn start_camera(&mut self, camera: CameraIdentity) -> bool;

    /// Block until the next frame for `handle` is available.
    fn get_frame(&mut self, handle: &SubscriptionHandle) -> Result<FrameBuffer, CameraError>;

    /// Hand the last frame returned by `get_frame` back to the service.
    fn release_frame(&mut self, handle: &SubscriptionHandle);

    fn unsubscribe(&mut self, handle: &SubscriptionHandle);
}

impl<S: CameraService + ?Sized> CameraService for Box<S> {
    fn connect(&mut self, endpoint: &CameraEndpoint) -> Result<(), CameraError> {
        (**self).connect(endpoint)
    }

    fn subscribe(&mut self, request: &SubscribeRequest) -> Result<SubscriptionHandle, CameraError> {
        (**self).subscribe(request)
    }

    fn open_camera(&mut self, camera: CameraIdentity) -> bool {
        (**self).open_camera(camera)
    }

    fn start_camera(&mut self, camera: CameraIdentity) -> bool {
        (**self).start_camera(camera)
    }

    fn get_frame(&mut self, handle: &SubscriptionHandle) -> Result<FrameBuffer, CameraError> {
        (**self).get_frame(handle)
    }

    fn release_frame(&mut self, handle: &SubscriptionHandle) {
        (**self).release_frame(handle)
    }

    fn unsubscribe(&mut self, handle: &SubscriptionHandle) {
        (**self).unsubscribe(handle)
    }
}
