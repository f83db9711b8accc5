//! Capture device seams and the owned camera handle.

use tracing::debug;

use crate::types::{
    Backend, CaptureError, CaptureSettings, DeviceId, Frame, NegotiatedSettings,
};

/// A live capture device as seen by the acquirer and the frame pipeline.
pub trait CaptureDevice: Send {
    /// Whether the underlying library considers the device open.
    fn is_opened(&self) -> bool;

    /// Apply `settings` and return what the device reports afterwards.
    fn configure(&mut self, settings: &CaptureSettings) -> Result<NegotiatedSettings, CaptureError>;

    /// Grab one frame. `Ok(None)` means the read produced nothing.
    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Close the device. Called at most once per device by this crate.
    fn release(&mut self);
}

/// Opens devices by identifier and backend.
pub trait DeviceOpener {
    type Device: CaptureDevice;

    fn open(&self, id: &DeviceId, backend: Backend) -> Result<Self::Device, CaptureError>;
}

/// A validated, open device exclusively owned by one stream session.
///
/// The device is released exactly once: either through [`CameraHandle::close`]
/// or when the handle is dropped.
pub struct CameraHandle<D: CaptureDevice> {
    device: D,
    id: DeviceId,
    backend: Backend,
    settings: CaptureSettings,
    negotiated: NegotiatedSettings,
    released: bool,
}

impl<D: CaptureDevice> CameraHandle<D> {
    pub(crate) fn new(
        device: D,
        id: DeviceId,
        backend: Backend,
        settings: CaptureSettings,
        negotiated: NegotiatedSettings,
    ) -> Self {
        Self {
            device,
            id,
            backend,
            settings,
            negotiated,
            released: false,
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn negotiated(&self) -> &NegotiatedSettings {
        &self.negotiated
    }

    /// Read the next frame. Empty reads are reported as
    /// [`CaptureError::EmptyFrame`] so callers never see a blank frame.
    pub fn read(&mut self) -> Result<Frame, CaptureError> {
        match self.device.read_frame()? {
            Some(frame) if !frame.is_empty() => Ok(frame),
            _ => Err(CaptureError::EmptyFrame),
        }
    }

    /// Release the device now instead of at drop time.
    pub fn close(self) {
        drop(self);
    }

    fn release_once(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.device.release();
        debug!(device = %self.id, "camera released");
    }
}

impl<D: CaptureDevice> Drop for CameraHandle<D> {
    fn drop(&mut self) {
        self.release_once();
    }
}
