mod cli;
mod gate;
mod html;
mod server;

use std::{io, thread};

use anyhow::{Context, Result};
use camera_ingest::{CameraAcquirer, OpenCvOpener, SystemClock, V4l2CtlLister};
use clap::Parser;
use mjpeg_stream::{SharedStatus, StreamConfig, pipeline::telemetry};
use tracing::info;

use crate::server::ServerState;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    let list_only = cli.list_devices;
    let config = StreamConfig::try_from(cli.stream)?;

    if list_only {
        return cli::list_devices(&V4l2CtlLister, &config.acquire.deny, &mut io::stdout().lock());
    }

    let _telemetry = telemetry::enter_runtime(&config.telemetry)?;
    telemetry::init_metrics_recorder()?;

    if !config.startup_delay.is_zero() {
        info!(
            secs = config.startup_delay.as_secs(),
            "waiting for devices to settle before serving"
        );
        thread::sleep(config.startup_delay);
    }

    let acquirer = CameraAcquirer::new(
        V4l2CtlLister,
        OpenCvOpener,
        SystemClock,
        config.acquire.clone(),
    );
    let state = ServerState::new(
        acquirer,
        config.pipeline,
        SharedStatus::new(),
        config.session_wait,
    );

    actix_web::rt::System::new()
        .block_on(server::serve(config.bind, state))
        .context("camstream server exited with an error")
}
