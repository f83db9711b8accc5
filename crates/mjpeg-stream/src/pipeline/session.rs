//! One subscriber's acquisition + pipeline run, on its own blocking thread.

use std::io;

use camera_ingest::{AcquireError, CameraAcquirer, Clock, DeviceLister, DeviceOpener};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::pipeline::{
    frames::{FramePipeline, PipelineSettings},
    multipart::FrameChunk,
    status::SharedStatus,
    telemetry,
};

/// Chunks buffered between the capture thread and the HTTP writer.
pub const SESSION_QUEUE_DEPTH: usize = 2;

/// How a session came to an end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Acquisition gave up; a diagnostic part was offered to the sink.
    NoCamera,
    /// The device stopped delivering frames.
    CaptureEnded,
    /// The subscriber went away, either mid-stream or while the camera was
    /// still being acquired.
    Cancelled,
}

/// Where a session delivers its chunks.
pub trait ChunkSink {
    /// Hand over one chunk; `false` means the subscriber is gone.
    fn send(&mut self, chunk: FrameChunk) -> bool;

    /// Whether the subscriber is already gone, checked while no chunk is
    /// ready (during acquisition).
    fn is_closed(&self) -> bool {
        false
    }
}

impl<F: FnMut(FrameChunk) -> bool> ChunkSink for F {
    fn send(&mut self, chunk: FrameChunk) -> bool {
        self(chunk)
    }
}

struct ChannelSink(mpsc::Sender<FrameChunk>);

impl ChunkSink for ChannelSink {
    fn send(&mut self, chunk: FrameChunk) -> bool {
        self.0.blocking_send(chunk).is_ok()
    }

    fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

/// Acquire a camera and push chunks into `sink` until capture fails or the
/// sink refuses a chunk. Acquisition stops early once the sink reports it is
/// closed. The device is released before this returns.
pub fn run_session<L, O, C, S>(
    acquirer: &CameraAcquirer<L, O, C>,
    settings: PipelineSettings,
    status: &SharedStatus,
    mut sink: S,
) -> SessionOutcome
where
    L: DeviceLister,
    O: DeviceOpener,
    C: Clock,
    S: ChunkSink,
{
    let (handle, device) = match acquirer.acquire_until(|| sink.is_closed()) {
        Ok(found) => found,
        Err(AcquireError::Cancelled { sweeps, .. }) => {
            info!(sweeps, "subscriber left before a camera was acquired");
            status.session_ended(None);
            return SessionOutcome::Cancelled;
        }
        Err(AcquireError::NoCamera(err)) => {
            let message = err.to_string();
            error!("{message}");
            status.session_ended(Some(message.clone()));
            sink.send(FrameChunk::text(&message));
            return SessionOutcome::NoCamera;
        }
    };

    let device = device.to_string();
    info!(%device, "streaming");
    status.session_started(&device);

    let mut pipeline = FramePipeline::new(handle, settings);
    let outcome = loop {
        let Some(chunk) = pipeline.next() else {
            break SessionOutcome::CaptureEnded;
        };
        if !sink.send(chunk) {
            break SessionOutcome::Cancelled;
        }
        status.frame_sent(pipeline.state().smoothed_fps, pipeline.frames_dropped());
    };
    let sent = pipeline.frames_emitted();
    drop(pipeline);

    let error = match outcome {
        SessionOutcome::CaptureEnded => Some(format!("capture from {device} ended")),
        _ => None,
    };
    status.session_ended(error);
    info!(%device, frames = sent, ?outcome, "session finished");
    outcome
}

/// Run [`run_session`] on a dedicated thread, returning the chunk receiver.
///
/// `guard` lives on the thread and is dropped after the device is released,
/// which is what lets a device gate permit follow the camera's lifetime.
pub fn spawn_session<L, O, C, G>(
    acquirer: CameraAcquirer<L, O, C>,
    settings: PipelineSettings,
    status: SharedStatus,
    guard: G,
) -> io::Result<mpsc::Receiver<FrameChunk>>
where
    L: DeviceLister + Send + 'static,
    O: DeviceOpener + Send + 'static,
    C: Clock + Send + 'static,
    G: Send + 'static,
{
    let (tx, rx) = mpsc::channel(SESSION_QUEUE_DEPTH);
    telemetry::spawn_thread("stream-session", move || {
        let _guard = guard;
        let _span = tracing::info_span!("stream.session").entered();
        metrics::gauge!("stream_sessions_active").increment(1.0);

        run_session(&acquirer, settings, &status, ChannelSink(tx));

        metrics::gauge!("stream_sessions_active").decrement(1.0);
    })?;
    Ok(rx)
}
