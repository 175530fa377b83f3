//! Offline replay of a recorded session.
//!
//! A recording is a JSON list of frames, each with the detector output seen
//! on that frame and optionally the image itself:
//!
//! ```json
//! {"frames": [
//!   {"detections": {}},
//!   {"image": "frame_0002.png", "detections": {"tag_8": [[1,0,0,10],[0,1,0,20],[0,0,1,30]]}}
//! ]}
//! ```
//!
//! [`ReplayCamera`] serves one frame per entry and ends the stream after the
//! last one; [`ReplayDetector`] returns the recorded detections in the same
//! order. The pair stays in step as long as every frame is passed to the
//! detector exactly once, which is what the estimation loop does.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use tag_pose_camera::{
    CameraEndpoint, CameraError, CameraService, SubscribeRequest, SubscriptionHandle,
};
use tag_pose_core::{CameraIdentity, FrameBuffer, FrameView, Timestamp};
use tag_pose_estimate::{Detections, DetectorError, DetectorSetup, MarkerDetector};

use crate::io::TagPoseIoError;

/// One recorded frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    /// Image file for this frame; a blank frame is served when absent.
    #[serde(default)]
    pub image: Option<PathBuf>,
    #[serde(default)]
    pub detections: Detections,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    #[serde(default)]
    pub frames: Vec<RecordedFrame>,
}

impl Recording {
    /// Load a recording; relative image paths are resolved against its directory.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, TagPoseIoError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let mut rec: Self = serde_json::from_str(&raw)?;
        if let Some(dir) = path.parent() {
            for frame in &mut rec.frames {
                if let Some(img) = frame.image.as_mut() {
                    if img.is_relative() {
                        *img = dir.join(&*img);
                    }
                }
            }
        }
        Ok(rec)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), TagPoseIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Split into a camera service and a detector that replay this recording.
    pub fn into_replay(self) -> (ReplayCamera, ReplayDetector) {
        let (images, detections): (Vec<_>, VecDeque<_>) = self
            .frames
            .into_iter()
            .map(|f| (f.image, f.detections))
            .unzip();
        (ReplayCamera::new(images), ReplayDetector::new(detections))
    }
}

/// Counters kept by [`ReplayCamera`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub subscriptions: usize,
    pub unsubscriptions: usize,
    pub frames_served: usize,
    pub frames_released: usize,
}

/// Camera service backed by a recording.
#[derive(Debug)]
pub struct ReplayCamera {
    images: Vec<Option<PathBuf>>,
    cursor: usize,
    active: Option<(SubscriptionHandle, SubscribeRequest)>,
    endpoint: Option<CameraEndpoint>,
    available: bool,
    stats: ReplayStats,
}

impl ReplayCamera {
    pub fn new(images: Vec<Option<PathBuf>>) -> Self {
        Self {
            images,
            cursor: 0,
            active: None,
            endpoint: None,
            available: true,
            stats: ReplayStats::default(),
        }
    }

    /// Make the device refuse (or accept again) to open.
    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    pub fn stats(&self) -> ReplayStats {
        self.stats
    }

    pub fn endpoint(&self) -> Option<&CameraEndpoint> {
        self.endpoint.as_ref()
    }

    /// Frames not served yet.
    pub fn remaining(&self) -> usize {
        self.images.len().saturating_sub(self.cursor)
    }

    fn active_request(&self, handle: &SubscriptionHandle) -> Result<&SubscribeRequest, CameraError> {
        match &self.active {
            Some((h, req)) if h == handle => Ok(req),
            _ => Err(CameraError::Service(format!("unknown subscriber '{handle}'"))),
        }
    }
}

impl CameraService for ReplayCamera {
    fn connect(&mut self, endpoint: &CameraEndpoint) -> Result<(), CameraError> {
        self.endpoint = Some(endpoint.clone());
        Ok(())
    }

    fn subscribe(&mut self, request: &SubscribeRequest) -> Result<SubscriptionHandle, CameraError> {
        if self.active.is_some() {
            return Err(CameraError::Service("replay camera already subscribed".into()));
        }
        self.stats.subscriptions += 1;
        let handle =
            SubscriptionHandle::new(format!("{}_{}", request.client_name, self.stats.subscriptions));
        self.active = Some((handle.clone(), request.clone()));
        Ok(handle)
    }

    fn open_camera(&mut self, _camera: CameraIdentity) -> bool {
        self.available
    }

    fn start_camera(&mut self, _camera: CameraIdentity) -> bool {
        self.available
    }

    fn get_frame(&mut self, handle: &SubscriptionHandle) -> Result<FrameBuffer, CameraError> {
        let request = self.active_request(handle)?.clone();
        let Some(image) = self.images.get(self.cursor) else {
            return Err(CameraError::StreamEnded);
        };
        let timestamp = Timestamp {
            sec: self.cursor as u64,
            usec: 0,
        };
        let frame = match image {
            Some(path) => load_image_frame(path, &request, timestamp)?,
            None => {
                let (w, h) = request.resolution.dimensions();
                FrameBuffer::blank(w, h, request.color_space, request.camera, timestamp)?
            }
        };
        self.cursor += 1;
        self.stats.frames_served += 1;
        Ok(frame)
    }

    fn release_frame(&mut self, _handle: &SubscriptionHandle) {
        self.stats.frames_released += 1;
    }

    fn unsubscribe(&mut self, handle: &SubscriptionHandle) {
        if self.active_request(handle).is_ok() {
            self.active = None;
            self.stats.unsubscriptions += 1;
        }
    }
}

#[cfg(feature = "image")]
fn load_image_frame(
    path: &Path,
    request: &SubscribeRequest,
    timestamp: Timestamp,
) -> Result<FrameBuffer, CameraError> {
    use tag_pose_core::{ColorSpace, FieldOfView};

    let img = ::image::ImageReader::open(path)
        .map_err(|e| load_error(path, e))?
        .decode()
        .map_err(|e| load_error(path, e))?;

    let (w, h) = request.resolution.dimensions();
    if (img.width(), img.height()) != (w, h) {
        return Err(CameraError::Service(format!(
            "{} is {}x{}, subscription expects {w}x{h}",
            path.display(),
            img.width(),
            img.height()
        )));
    }

    let data = match request.color_space {
        ColorSpace::Y => img.to_luma8().into_raw(),
        ColorSpace::Rgb => img.to_rgb8().into_raw(),
        ColorSpace::Bgr => {
            let mut data = img.to_rgb8().into_raw();
            for px in data.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
            data
        }
        ColorSpace::Yuv422 => {
            return Err(CameraError::Service(
                "replay does not produce YUV422 frames".into(),
            ))
        }
    };
    Ok(FrameBuffer::new(
        w,
        h,
        request.color_space,
        timestamp,
        data,
        request.camera,
        FieldOfView::default(),
    )?)
}

#[cfg(feature = "image")]
fn load_error(path: &Path, err: impl std::fmt::Display) -> CameraError {
    CameraError::Service(format!("failed to load {}: {err}", path.display()))
}

#[cfg(not(feature = "image"))]
fn load_image_frame(
    path: &Path,
    _request: &SubscribeRequest,
    _timestamp: Timestamp,
) -> Result<FrameBuffer, CameraError> {
    Err(CameraError::Service(format!(
        "cannot load {}: built without the `image` feature",
        path.display()
    )))
}

/// Detector returning recorded detections, one entry per frame.
#[derive(Debug, Default)]
pub struct ReplayDetector {
    frames: VecDeque<Detections>,
    setup: Option<DetectorSetup>,
}

impl ReplayDetector {
    pub fn new(frames: VecDeque<Detections>) -> Self {
        Self {
            frames,
            setup: None,
        }
    }

    /// Setup applied by the last `configure` call.
    pub fn setup(&self) -> Option<&DetectorSetup> {
        self.setup.as_ref()
    }
}

impl MarkerDetector for ReplayDetector {
    /// Layout files are only checked for readability; their contents do not
    /// change recorded poses.
    fn configure(&mut self, setup: &DetectorSetup) -> Result<(), DetectorError> {
        if let Some(path) = &setup.layout_path {
            fs::read_to_string(path).map_err(|e| DetectorError::Layout {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        }
        self.setup = Some(setup.clone());
        Ok(())
    }

    fn estimate(&mut self, frame: &FrameView<'_>) -> Result<Detections, DetectorError> {
        let setup = self
            .setup
            .as_ref()
            .ok_or_else(|| DetectorError::Estimate("detector used before configure".into()))?;
        let (w, h) = setup.frame_size();
        if (frame.width, frame.height) != (w as usize, h as usize) {
            return Err(DetectorError::Estimate(format!(
                "frame is {}x{}, detector configured for {w}x{h}",
                frame.width, frame.height
            )));
        }
        if frame
            .pixel(frame.width.saturating_sub(1), frame.height.saturating_sub(1))
            .is_none()
        {
            return Err(DetectorError::Estimate(format!(
                "frame data holds {} bytes, too short for {w}x{h}x{}",
                frame.data.len(),
                frame.channels
            )));
        }
        let detections = self.frames.pop_front().unwrap_or_default();
        debug!("replayed {} detection(s)", detections.len());
        Ok(detections)
    }
}
