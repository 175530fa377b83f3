//! Frame buffers as delivered by the camera service.

use serde::{Deserialize, Serialize};

use crate::CameraIdentity;

/// Pixel layouts the camera service can deliver.
///
/// Only the layouts the estimator consumes are listed; the numeric codes are
/// the ones the camera service expects at subscription time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ColorSpace {
    /// Single-channel luminance.
    Y,
    /// Packed YUV 4:2:2, two bytes per pixel.
    Yuv422,
    Rgb,
    #[default]
    Bgr,
}

impl ColorSpace {
    #[inline]
    pub fn service_code(self) -> i32 {
        match self {
            Self::Y => 0,
            Self::Yuv422 => 9,
            Self::Rgb => 11,
            Self::Bgr => 13,
        }
    }

    /// Bytes per pixel.
    #[inline]
    pub fn channels(self) -> u32 {
        match self {
            Self::Y => 1,
            Self::Yuv422 => 2,
            Self::Rgb | Self::Bgr => 3,
        }
    }
}

/// Capture time reported by the camera service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    pub sec: u64,
    pub usec: u32,
}

/// Angular extent of the frame, in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldOfView {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid frame buffer length (expected {expected} bytes, got {got})")]
    InvalidBufferLength { expected: usize, got: usize },

    #[error("invalid frame dimensions (width={width}, height={height}, channels={channels})")]
    InvalidDimensions {
        width: u32,
        height: u32,
        channels: u32,
    },
}

/// Owned frame: the twelve fields of a service image, in service order.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    channels: u32,
    color_space: ColorSpace,
    timestamp: Timestamp,
    data: Vec<u8>,
    camera: CameraIdentity,
    fov: FieldOfView,
}

impl FrameBuffer {
    /// Validate and wrap raw service fields.
    ///
    /// `data` must be row-major and exactly `width * height * channels` bytes.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        width: u32,
        height: u32,
        color_space: ColorSpace,
        timestamp: Timestamp,
        data: Vec<u8>,
        camera: CameraIdentity,
        fov: FieldOfView,
    ) -> Result<Self, FrameError> {
        let channels = color_space.channels();
        let expected = expected_len(width, height, channels).ok_or(
            FrameError::InvalidDimensions {
                width,
                height,
                channels,
            },
        )?;
        if data.len() != expected {
            return Err(FrameError::InvalidBufferLength {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            color_space,
            timestamp,
            data,
            camera,
            fov,
        })
    }

    /// All-zero frame of the given size, mostly useful for stubs.
    pub fn blank(
        width: u32,
        height: u32,
        color_space: ColorSpace,
        camera: CameraIdentity,
        timestamp: Timestamp,
    ) -> Result<Self, FrameError> {
        let channels = color_space.channels();
        let len = expected_len(width, height, channels).ok_or(FrameError::InvalidDimensions {
            width,
            height,
            channels,
        })?;
        Self::new(
            width,
            height,
            color_space,
            timestamp,
            vec![0; len],
            camera,
            FieldOfView::default(),
        )
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn channels(&self) -> u32 {
        self.channels
    }

    #[inline]
    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    #[inline]
    pub fn camera(&self) -> CameraIdentity {
        self.camera
    }

    #[inline]
    pub fn fov(&self) -> FieldOfView {
        self.fov
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Borrowed pixel view handed to detectors.
    pub fn view(&self) -> FrameView<'_> {
        FrameView {
            width: self.width as usize,
            height: self.height as usize,
            channels: self.channels as usize,
            color_space: self.color_space,
            data: &self.data,
        }
    }
}

/// Borrowed, row-major pixel data.
#[derive(Clone, Copy, Debug)]
pub struct FrameView<'a> {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub color_space: ColorSpace,
    pub data: &'a [u8], // len = w*h*channels
}

impl FrameView<'_> {
    /// Pixel at `(x, y)`, or `None` outside the frame.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = (y * self.width + x) * self.channels;
        self.data.get(start..start + self.channels)
    }
}

fn expected_len(width: u32, height: u32, channels: u32) -> Option<usize> {
    if width == 0 || height == 0 {
        return None;
    }
    let w = usize::try_from(width).ok()?;
    let h = usize::try_from(height).ok()?;
    w.checked_mul(h)?.checked_mul(channels as usize)
}
