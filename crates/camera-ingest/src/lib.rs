//! Camera discovery and acquisition.
//!
//! [`CameraAcquirer`] turns "whatever video devices this host has" into one
//! open, validated [`CameraHandle`]. Enumeration, opening, and sleeping sit
//! behind [`DeviceLister`], [`DeviceOpener`], and [`Clock`] so the state
//! machine runs unchanged against fakes.

mod acquire;
#[cfg(feature = "opencv")]
mod camera;
mod clock;
mod device;
mod discovery;
#[cfg(any(test, feature = "stub-devices"))]
pub mod stub;
mod types;

pub use acquire::{
    AcquireConfig, AcquireError, Attempt, CameraAcquirer, DeviceRejected, NoCameraFound, Strategy,
};
#[cfg(feature = "opencv")]
pub use camera::{OpenCvDevice, OpenCvOpener};
pub use clock::{Clock, SystemClock};
pub use device::{CameraHandle, CaptureDevice, DeviceOpener};
pub use discovery::{
    DEFAULT_DENY_KEYWORDS, DenyList, DeviceGroup, DeviceLister, DiscoveryError, V4l2CtlLister,
    group_by_name, parse_v4l2_listing,
};
pub use types::{
    Backend, CaptureError, CaptureSettings, DeviceCandidate, DeviceId, Frame, FrameFormat,
    NegotiatedSettings,
};
