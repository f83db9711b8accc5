//! Configuration parsing for the streamer.
//!
//! This module owns translation of CLI arguments (and their `CAMSTREAM_*`
//! environment fallbacks) into a `StreamConfig` which the acquirer, the
//! pipeline, and the server use without re-parsing flags.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{Context, Result, bail};
use camera_ingest::{AcquireConfig, CaptureSettings, DenyList};
use clap::Args;

use crate::pipeline::frames::PipelineSettings;

// Unprivileged port; binding 80 needs root or CAP_NET_BIND_SERVICE.
const DEFAULT_BIND: &str = "0.0.0.0:8080";

#[derive(Clone, Debug)]
/// Canonical configuration shared by every stage.
pub struct StreamConfig {
    /// Address the HTTP server listens on.
    pub bind: SocketAddr,
    /// Pause before the server starts so boot-time devices can settle.
    pub startup_delay: Duration,
    /// Acquisition tunables, including the capture settings requested.
    pub acquire: AcquireConfig,
    /// Per-frame annotation and encoding knobs.
    pub pipeline: PipelineSettings,
    /// How long a new subscriber waits for the camera before a 503.
    pub session_wait: Duration,
    /// Telemetry and instrumentation options.
    pub telemetry: TelemetryOptions,
}

#[derive(Clone, Debug, Default)]
/// Optional telemetry knobs for tracing.
pub struct TelemetryOptions {
    /// Write a Chrome trace JSON file capturing session and acquisition spans.
    pub chrome_trace_path: Option<PathBuf>,
}

/// CLI arguments for the streamer.
#[derive(Debug, Default, Args)]
pub struct StreamCliArgs {
    /// Listen address.
    #[arg(long = "bind", env = "CAMSTREAM_BIND", value_name = "ADDR")]
    pub bind: Option<String>,
    /// Seconds to wait before starting the server.
    #[arg(long = "startup-delay-secs", env = "CAMSTREAM_STARTUP_DELAY_SECS", value_name = "SECS")]
    pub startup_delay_secs: Option<u64>,
    /// Requested capture width in pixels.
    #[arg(long = "width", env = "CAMSTREAM_WIDTH", value_name = "PX")]
    pub width: Option<i32>,
    /// Requested capture height in pixels.
    #[arg(long = "height", env = "CAMSTREAM_HEIGHT", value_name = "PX")]
    pub height: Option<i32>,
    /// Requested capture frame rate.
    #[arg(long = "fps", env = "CAMSTREAM_FPS", value_name = "FPS")]
    pub fps: Option<f64>,
    /// JPEG quality used by the encoder (1-100).
    #[arg(long = "jpeg-quality", env = "CAMSTREAM_JPEG_QUALITY", value_name = "QUALITY")]
    pub jpeg_quality: Option<u8>,
    /// Luma at or below which pixels are outlined as dark.
    #[arg(long = "dark-threshold", env = "CAMSTREAM_DARK_THRESHOLD", value_name = "LUMA")]
    pub dark_threshold: Option<u8>,
    /// Acquisition sweeps before giving up.
    #[arg(long = "max-attempts", env = "CAMSTREAM_MAX_ATTEMPTS", value_name = "N")]
    pub max_attempts: Option<u32>,
    /// Delay between acquisition sweeps.
    #[arg(long = "retry-delay-ms", env = "CAMSTREAM_RETRY_DELAY_MS", value_name = "MS")]
    pub retry_delay_ms: Option<u64>,
    /// Reads a freshly opened device gets to produce a frame.
    #[arg(long = "warmup-reads", env = "CAMSTREAM_WARMUP_READS", value_name = "N")]
    pub warmup_reads: Option<u32>,
    /// Extra device-name keyword to skip during enumeration (repeatable).
    #[arg(
        long = "deny-keyword",
        env = "CAMSTREAM_DENY_KEYWORDS",
        value_name = "KEYWORD",
        value_delimiter = ','
    )]
    pub deny_keywords: Vec<String>,
    /// How long a subscriber waits for the camera to free up.
    #[arg(long = "session-wait-ms", env = "CAMSTREAM_SESSION_WAIT_MS", value_name = "MS")]
    pub session_wait_ms: Option<u64>,
    /// Write a Chrome trace JSON to the given path.
    #[arg(long = "chrome-trace", env = "CAMSTREAM_CHROME_TRACE", value_name = "PATH")]
    pub chrome_trace: Option<PathBuf>,
}

impl TryFrom<StreamCliArgs> for StreamConfig {
    type Error = anyhow::Error;

    fn try_from(args: StreamCliArgs) -> Result<Self> {
        let bind_text = args.bind.as_deref().unwrap_or(DEFAULT_BIND);
        let bind: SocketAddr = bind_text
            .parse()
            .with_context(|| format!("--bind expects <ip>:<port>, got {bind_text:?}"))?;

        let defaults = CaptureSettings::default();
        let width = args.width.unwrap_or(defaults.width);
        let height = args.height.unwrap_or(defaults.height);
        if width <= 0 || height <= 0 {
            bail!("Capture width and height must be positive integers");
        }
        let fps = args.fps.unwrap_or(defaults.fps);
        if !fps.is_finite() || fps <= 0.0 {
            bail!("--fps must be a positive number");
        }

        let pipeline_defaults = PipelineSettings::default();
        let jpeg_quality = args.jpeg_quality.unwrap_or(pipeline_defaults.jpeg_quality);
        if !(1..=100).contains(&jpeg_quality) {
            bail!("--jpeg-quality must be an integer between 1 and 100");
        }
        let pipeline = PipelineSettings {
            jpeg_quality,
            dark_threshold: args.dark_threshold.unwrap_or(pipeline_defaults.dark_threshold),
        };

        let acquire_defaults = AcquireConfig::default();
        let max_attempts = args.max_attempts.unwrap_or(acquire_defaults.max_attempts);
        if max_attempts == 0 {
            bail!("--max-attempts must be at least 1");
        }
        let warmup_reads = args.warmup_reads.unwrap_or(acquire_defaults.warmup_reads);
        if warmup_reads == 0 {
            bail!("--warmup-reads must be at least 1");
        }
        let retry_delay = args
            .retry_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(acquire_defaults.retry_delay);

        let acquire = AcquireConfig {
            max_attempts,
            retry_delay,
            warmup_reads,
            deny: DenyList::with_extra(&args.deny_keywords),
            settings: CaptureSettings {
                width,
                height,
                fps,
                ..defaults
            },
            ..acquire_defaults
        };

        Ok(Self {
            bind,
            startup_delay: Duration::from_secs(args.startup_delay_secs.unwrap_or(0)),
            acquire,
            pipeline,
            session_wait: Duration::from_millis(args.session_wait_ms.unwrap_or(5_000)),
            telemetry: TelemetryOptions {
                chrome_trace_path: args.chrome_trace,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = StreamConfig::try_from(StreamCliArgs::default()).unwrap();
        assert_eq!(config.bind, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.startup_delay, Duration::ZERO);
        assert_eq!(config.acquire.max_attempts, 10);
        assert_eq!(config.acquire.retry_delay, Duration::from_secs(3));
        assert_eq!(config.acquire.warmup_reads, 3);
        assert_eq!(config.acquire.settings, CaptureSettings::default());
        assert_eq!(config.pipeline, PipelineSettings::default());
        assert_eq!(config.session_wait, Duration::from_secs(5));
        assert!(config.telemetry.chrome_trace_path.is_none());
    }

    #[test]
    fn overrides_flow_into_acquire_config() {
        let args = StreamCliArgs {
            bind: Some("127.0.0.1:9000".into()),
            width: Some(1280),
            height: Some(720),
            max_attempts: Some(2),
            retry_delay_ms: Some(250),
            deny_keywords: vec!["Loopback".into()],
            jpeg_quality: Some(80),
            ..Default::default()
        };
        let config = StreamConfig::try_from(args).unwrap();
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.acquire.settings.width, 1280);
        assert_eq!(config.acquire.settings.fourcc, ['M', 'J', 'P', 'G']);
        assert_eq!(config.acquire.settings.buffer_size, 1);
        assert_eq!(config.acquire.retry_delay, Duration::from_millis(250));
        assert!(config.acquire.deny.is_denied("v4l2 loopback device"));
        assert!(config.acquire.deny.is_denied("bcm2835-codec-decode"));
        assert_eq!(config.pipeline.jpeg_quality, 80);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let cases = [
            StreamCliArgs {
                jpeg_quality: Some(0),
                ..Default::default()
            },
            StreamCliArgs {
                max_attempts: Some(0),
                ..Default::default()
            },
            StreamCliArgs {
                warmup_reads: Some(0),
                ..Default::default()
            },
            StreamCliArgs {
                width: Some(-1),
                ..Default::default()
            },
            StreamCliArgs {
                bind: Some("not an address".into()),
                ..Default::default()
            },
        ];
        for args in cases {
            assert!(StreamConfig::try_from(args).is_err());
        }
    }
}
