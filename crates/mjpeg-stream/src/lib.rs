//! Turns an acquired camera into an endless `multipart/x-mixed-replace`
//! stream of annotated JPEG frames.

pub mod pipeline;

pub use pipeline::{
    ChunkSink, FrameChunk, FramePipeline, PipelineSettings, SessionOutcome, SharedStatus, StreamCliArgs,
    StreamConfig, StreamStatus, run_session, spawn_session,
};
