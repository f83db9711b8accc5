//! OpenCV-backed capture devices.

use chrono::Utc;
use opencv::{
    core::{self, MatTraitConstManual},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
};
use tracing::warn;

use crate::{
    device::{CaptureDevice, DeviceOpener},
    types::{
        Backend, CaptureError, CaptureSettings, DeviceId, Frame, FrameFormat, NegotiatedSettings,
    },
};

/// Opens devices through `videoio::VideoCapture`.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenCvOpener;

/// A `VideoCapture` plus a reusable read buffer.
pub struct OpenCvDevice {
    cap: VideoCapture,
    frame: Mat,
    converted: Mat,
}

/// Map a backend hint onto the OpenCV API preference for this platform.
fn api_preference(backend: Backend) -> i32 {
    match backend {
        Backend::Generic => videoio::CAP_ANY,
        #[cfg(target_os = "linux")]
        Backend::PlatformNative => videoio::CAP_V4L2,
        #[cfg(target_os = "windows")]
        Backend::PlatformNative => videoio::CAP_DSHOW,
        #[cfg(target_os = "macos")]
        Backend::PlatformNative => videoio::CAP_AVFOUNDATION,
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        Backend::PlatformNative => videoio::CAP_ANY,
    }
}

impl DeviceOpener for OpenCvOpener {
    type Device = OpenCvDevice;

    fn open(&self, id: &DeviceId, backend: Backend) -> Result<OpenCvDevice, CaptureError> {
        let api = api_preference(backend);
        let cap = match id {
            DeviceId::Path(path) => VideoCapture::from_file(path, api),
            DeviceId::Index(index) => VideoCapture::new(*index, api),
        }
        .map_err(|err| {
            warn!(device = %id, backend = backend.label(), "camera-ingest: open failed: {err}");
            CaptureError::Open { id: id.clone() }
        })?;

        Ok(OpenCvDevice {
            cap,
            frame: Mat::default(),
            converted: Mat::default(),
        })
    }
}

impl CaptureDevice for OpenCvDevice {
    fn is_opened(&self) -> bool {
        self.cap.is_opened().unwrap_or(false)
    }

    fn configure(&mut self, settings: &CaptureSettings) -> Result<NegotiatedSettings, CaptureError> {
        let [a, b, c, d] = settings.fourcc;
        let fourcc =
            videoio::VideoWriter::fourcc(a, b, c, d).map_err(|e| CaptureError::Backend(e.into()))?;
        // Drivers reject individual properties all the time; a refusal is not
        // fatal, the warm-up reads decide whether the device is usable.
        let _ = self.cap.set(videoio::CAP_PROP_FOURCC, fourcc as f64);
        let _ = self.cap.set(videoio::CAP_PROP_FRAME_WIDTH, settings.width as f64);
        let _ = self.cap.set(videoio::CAP_PROP_FRAME_HEIGHT, settings.height as f64);
        let _ = self.cap.set(videoio::CAP_PROP_FPS, settings.fps);
        let _ = self.cap.set(videoio::CAP_PROP_BUFFERSIZE, settings.buffer_size as f64);

        Ok(NegotiatedSettings {
            width: self.cap.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or_default(),
            height: self.cap.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or_default(),
            fps: self.cap.get(videoio::CAP_PROP_FPS).unwrap_or_default(),
        })
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        let grabbed = self
            .cap
            .read(&mut self.frame)
            .map_err(|e| CaptureError::Backend(e.into()))?;
        if !grabbed || self.frame.empty() {
            return Ok(None);
        }

        let size = self
            .frame
            .size()
            .map_err(|e| CaptureError::Backend(e.into()))?;
        if size.width <= 0 || size.height <= 0 {
            return Ok(None);
        }

        let working = match self.frame.channels() {
            3 => &self.frame,
            1 => {
                imgproc::cvt_color_def(&self.frame, &mut self.converted, imgproc::COLOR_GRAY2BGR)
                    .map_err(|e| CaptureError::Backend(e.into()))?;
                &self.converted
            }
            4 => {
                imgproc::cvt_color_def(&self.frame, &mut self.converted, imgproc::COLOR_BGRA2BGR)
                    .map_err(|e| CaptureError::Backend(e.into()))?;
                &self.converted
            }
            other => {
                return Err(CaptureError::Backend(anyhow::anyhow!(
                    "unsupported channel count {other}"
                )));
            }
        };

        let data = if working.is_continuous() {
            working
                .data_bytes()
                .map_err(|e| CaptureError::Backend(e.into()))?
                .to_vec()
        } else {
            let mut packed = core::Mat::default();
            working
                .copy_to(&mut packed)
                .map_err(|e| CaptureError::Backend(e.into()))?;
            packed
                .data_bytes()
                .map_err(|e| CaptureError::Backend(e.into()))?
                .to_vec()
        };

        Ok(Some(Frame {
            data,
            width: size.width,
            height: size.height,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Bgr8,
        }))
    }

    fn release(&mut self) {
        if let Err(err) = self.cap.release() {
            warn!("camera-ingest: release failed: {err}");
        }
    }
}
