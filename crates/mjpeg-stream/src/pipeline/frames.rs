//! The per-frame capture → annotate → encode → frame loop.

use std::{iter::FusedIterator, time::Instant};

use camera_ingest::{CameraHandle, CaptureDevice, DeviceId, Frame};
use tracing::{debug, warn};

use crate::pipeline::{
    annotation::{frame_to_image, highlight_dark_regions, overlay_fps},
    encoding::{EncodeError, encode_jpeg},
    fps::StreamState,
    multipart::FrameChunk,
};

/// Knobs for the per-frame work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineSettings {
    /// JPEG quality, 1-100. Low values trade fidelity for latency.
    pub jpeg_quality: u8,
    /// Luma at or below which a pixel counts as dark.
    pub dark_threshold: u8,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: 60,
            dark_threshold: 40,
        }
    }
}

/// Lazy, unbounded sequence of multipart chunks from one camera session.
///
/// The pipeline owns the camera handle. The device is released as soon as a
/// capture fails, or when the pipeline is dropped, whichever comes first.
/// Once it has returned `None` it keeps returning `None`.
pub struct FramePipeline<D: CaptureDevice> {
    handle: Option<CameraHandle<D>>,
    settings: PipelineSettings,
    state: StreamState,
    frames_emitted: u64,
    frames_dropped: u64,
}

impl<D: CaptureDevice> FramePipeline<D> {
    pub fn new(handle: CameraHandle<D>, settings: PipelineSettings) -> Self {
        Self {
            handle: Some(handle),
            settings,
            state: StreamState::new(Instant::now()),
            frames_emitted: 0,
            frames_dropped: 0,
        }
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    /// Frames captured but discarded because they could not be encoded.
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Device currently held, `None` once the capture has ended.
    pub fn device(&self) -> Option<&DeviceId> {
        self.handle.as_ref().map(CameraHandle::id)
    }

    fn render(&self, frame: &Frame) -> Result<FrameChunk, EncodeError> {
        let encode_start = Instant::now();
        let mut image = frame_to_image(frame)?;
        overlay_fps(&mut image, self.state.display_fps());
        highlight_dark_regions(&mut image, self.settings.dark_threshold);
        let jpeg = encode_jpeg(&image, self.settings.jpeg_quality)?;
        metrics::histogram!("stream_encode_seconds").record(encode_start.elapsed().as_secs_f64());
        Ok(FrameChunk::jpeg(&jpeg))
    }
}

impl<D: CaptureDevice> Iterator for FramePipeline<D> {
    type Item = FrameChunk;

    fn next(&mut self) -> Option<FrameChunk> {
        loop {
            let handle = self.handle.as_mut()?;
            let frame = match handle.read() {
                Ok(frame) => frame,
                Err(err) => {
                    if let Some(handle) = self.handle.take() {
                        warn!(
                            device = %handle.id(),
                            frames = self.frames_emitted,
                            "capture failed, ending stream: {err}"
                        );
                        handle.close();
                    }
                    return None;
                }
            };

            let fps = self.state.tick(Instant::now());
            metrics::gauge!("stream_fps").set(fps);

            match self.render(&frame) {
                Ok(chunk) => {
                    self.frames_emitted += 1;
                    metrics::counter!("stream_frames_total").increment(1);
                    if self.frames_emitted % 30 == 0 {
                        debug!(
                            frame = self.frames_emitted,
                            fps = format_args!("{fps:.1}"),
                            bytes = chunk.len(),
                            "stream heartbeat"
                        );
                    }
                    return Some(chunk);
                }
                Err(err) => {
                    self.frames_dropped += 1;
                    metrics::counter!("stream_encode_errors_total").increment(1);
                    warn!(frame_ts = frame.timestamp_ms, "dropping frame: {err}");
                }
            }
        }
    }
}

impl<D: CaptureDevice> FusedIterator for FramePipeline<D> {}
