use std::fmt;

use anyhow::Error;
use thiserror::Error;

/// Raw BGR frame captured from a camera device.
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

impl Frame {
    /// True when the device handed back no pixels at all.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() || self.width <= 0 || self.height <= 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
}

/// How a capture device is addressed: a device node path or a bare index.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DeviceId {
    Path(String),
    Index(i32),
}

impl DeviceId {
    /// Conventional Linux device node for `index`.
    pub fn video_path(index: u32) -> Self {
        DeviceId::Path(format!("/dev/video{index}"))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceId::Path(path) => f.write_str(path),
            DeviceId::Index(index) => write!(f, "#{index}"),
        }
    }
}

/// Preferred capture subsystem when opening a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Backend {
    /// The platform's own capture API (V4L2 on Linux).
    PlatformNative,
    /// Let the capture library pick whatever backend works.
    Generic,
}

impl Backend {
    pub fn label(self) -> &'static str {
        match self {
            Backend::PlatformNative => "native",
            Backend::Generic => "generic",
        }
    }
}

/// A device reported by a [`DeviceLister`](crate::DeviceLister).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceCandidate {
    pub id: DeviceId,
    pub declared_name: String,
    pub backend_hint: Option<Backend>,
}

/// Settings requested from a device before the first read.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaptureSettings {
    pub fourcc: [char; 4],
    pub width: i32,
    pub height: i32,
    pub fps: f64,
    pub buffer_size: i32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            fourcc: ['M', 'J', 'P', 'G'],
            width: 640,
            height: 480,
            fps: 30.0,
            buffer_size: 1,
        }
    }
}

/// Values the device reported back after configuration. Drivers are free to
/// ignore requests, so these may differ from [`CaptureSettings`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NegotiatedSettings {
    pub width: f64,
    pub height: f64,
    pub fps: f64,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {id}")]
    Open { id: DeviceId },
    #[error("video source {id} did not report itself open")]
    NotOpened { id: DeviceId },
    #[error("video source returned an empty frame")]
    EmptyFrame,
    #[error(transparent)]
    Backend(#[from] Error),
}
