//! Capture-to-multipart streaming pipeline.
//!
//! The module is split into focused submodules:
//! - `config`: CLI configuration parsing.
//! - `frames`: The capture → annotate → encode iterator.
//! - `session`: One subscriber's acquisition and pipeline on its own thread.
//! - `annotation`: FPS badge and dark-region outlines.
//! - `encoding`: JPEG encoding.
//! - `multipart`: `multipart/x-mixed-replace` framing.
//! - `fps`: Smoothed frame-rate tracking.
//! - `status`: Shared snapshot served over HTTP.
//! - `telemetry`: Tracing subscriber, Prometheus recorder, thread spawning.

pub use annotation::{
    dark_mask, find_dark_regions, frame_to_image, highlight_dark_regions, overlay_fps,
};
pub use config::{StreamCliArgs, StreamConfig, TelemetryOptions};
pub use encoding::{EncodeError, encode_jpeg};
pub use fps::StreamState;
pub use frames::{FramePipeline, PipelineSettings};
pub use multipart::{BOUNDARY, CONTENT_TYPE, FrameChunk};
pub use session::{ChunkSink, SESSION_QUEUE_DEPTH, SessionOutcome, run_session, spawn_session};
pub use status::{SharedStatus, StreamStatus};

mod annotation;
mod config;
mod encoding;
mod fps;
mod frames;
mod multipart;
mod session;
mod status;
pub mod telemetry;
