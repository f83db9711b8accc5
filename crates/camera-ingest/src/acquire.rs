//! Camera acquisition: discovery strategies, open+validate, and sweep retries.
//!
//! One sweep walks three strategies in order and stops at the first device
//! that opens and delivers a frame:
//! - filtered enumeration through a [`DeviceLister`],
//! - probing `/dev/video0..N` with the native then generic backend,
//! - bare indices with the generic backend.
//!
//! Sweeps repeat with a fixed delay so devices that enumerate late after boot
//! are still picked up. Diagnostics go out as tracing events and metrics;
//! control flow only ever sees `Result`s.

use std::{collections::BTreeSet, time::Duration};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    clock::Clock,
    device::{CameraHandle, CaptureDevice, DeviceOpener},
    discovery::{DenyList, DeviceLister, group_by_name},
    types::{Backend, CaptureError, CaptureSettings, DeviceId},
};

/// Tunables for [`CameraAcquirer`].
#[derive(Clone, Debug)]
pub struct AcquireConfig {
    /// Number of full sweeps before giving up.
    pub max_attempts: u32,
    /// Pause between sweeps.
    pub retry_delay: Duration,
    /// Reads attempted on a freshly opened device before rejecting it.
    pub warmup_reads: u32,
    /// Pause between warm-up reads.
    pub warmup_delay: Duration,
    /// Number of `/dev/videoN` paths probed by the path strategy.
    pub probe_paths: u32,
    /// Number of bare indices tried by the index strategy.
    pub probe_indices: i32,
    pub deny: DenyList,
    pub settings: CaptureSettings,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            retry_delay: Duration::from_secs(3),
            warmup_reads: 3,
            warmup_delay: Duration::from_millis(100),
            probe_paths: 10,
            probe_indices: 10,
            deny: DenyList::default(),
            settings: CaptureSettings::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    FilteredEnumeration,
    PathProbe,
    IndexFallback,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [
        Strategy::FilteredEnumeration,
        Strategy::PathProbe,
        Strategy::IndexFallback,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Strategy::FilteredEnumeration => "enumeration",
            Strategy::PathProbe => "path-probe",
            Strategy::IndexFallback => "index-fallback",
        }
    }
}

/// One open attempt planned by a strategy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attempt {
    pub id: DeviceId,
    pub backend: Backend,
}

/// Why a single candidate was not accepted.
#[derive(Debug, Error)]
pub enum DeviceRejected {
    #[error("open failed: {0}")]
    Open(#[source] CaptureError),
    #[error("device did not report itself open")]
    NotOpened,
    #[error("configuration failed: {0}")]
    Configure(#[source] CaptureError),
    #[error("no frame after {reads} warm-up read(s)")]
    WarmUp { reads: u32 },
}

impl DeviceRejected {
    pub fn reason(&self) -> &'static str {
        match self {
            DeviceRejected::Open(_) => "open",
            DeviceRejected::NotOpened => "not-opened",
            DeviceRejected::Configure(_) => "configure",
            DeviceRejected::WarmUp { .. } => "warm-up",
        }
    }
}

/// Every strategy failed in every sweep.
#[derive(Debug, Error)]
#[error(
    "no camera found after {sweeps} sweep(s); tried {}. {remediation}",
    format_tried(.tried)
)]
pub struct NoCameraFound {
    pub sweeps: u32,
    pub tried: Vec<String>,
    pub remediation: &'static str,
}

impl NoCameraFound {
    fn new(sweeps: u32, tried: Vec<String>) -> Self {
        Self {
            sweeps,
            tried,
            remediation: REMEDIATION,
        }
    }
}

/// Why [`CameraAcquirer::acquire_until`] returned without a camera.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error(transparent)]
    NoCamera(#[from] NoCameraFound),
    /// The caller lost interest before a device validated.
    #[error("acquisition cancelled after {sweeps} complete sweep(s)")]
    Cancelled { sweeps: u32, tried: Vec<String> },
}

const REMEDIATION: &str = "Check that a camera is connected, that /dev/video* is readable by \
this user (video group), that no other process holds the device, and that \
`v4l2-ctl --list-devices` shows it.";

fn format_tried(tried: &[String]) -> String {
    if tried.is_empty() {
        "nothing".to_string()
    } else {
        tried.join(", ")
    }
}

/// Finds and opens a working camera.
#[derive(Clone)]
pub struct CameraAcquirer<L, O, C> {
    lister: L,
    opener: O,
    clock: C,
    config: AcquireConfig,
}

impl<L, O, C> CameraAcquirer<L, O, C>
where
    L: DeviceLister,
    O: DeviceOpener,
    C: Clock,
{
    pub fn new(lister: L, opener: O, clock: C, config: AcquireConfig) -> Self {
        Self {
            lister,
            opener,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &AcquireConfig {
        &self.config
    }

    /// Run sweeps until a device validates or the attempt budget is spent.
    pub fn acquire(&self) -> Result<(CameraHandle<O::Device>, DeviceId), NoCameraFound> {
        self.acquire_until(|| false).map_err(|err| match err {
            AcquireError::NoCamera(err) => err,
            AcquireError::Cancelled { sweeps, tried } => NoCameraFound::new(sweeps, tried),
        })
    }

    /// Like [`CameraAcquirer::acquire`], but gives up as soon as `cancelled`
    /// returns true. It is polled before every sweep and every open attempt,
    /// and again after each inter-sweep delay.
    pub fn acquire_until(
        &self,
        cancelled: impl Fn() -> bool,
    ) -> Result<(CameraHandle<O::Device>, DeviceId), AcquireError> {
        let max_attempts = self.config.max_attempts.max(1);
        let _span = tracing::info_span!("camera.acquire", max_attempts).entered();
        let mut tried = BTreeSet::new();
        let stop = |sweep: u32, tried: BTreeSet<String>| {
            info!(sweep, "acquisition cancelled");
            AcquireError::Cancelled {
                sweeps: sweep,
                tried: tried.into_iter().collect(),
            }
        };

        for sweep in 1..=max_attempts {
            if sweep > 1 {
                info!(
                    sweep,
                    delay_ms = self.config.retry_delay.as_millis() as u64,
                    "no camera yet; retrying after delay"
                );
                if cancelled() {
                    return Err(stop(sweep - 1, tried));
                }
                self.clock.sleep(self.config.retry_delay);
            }
            if cancelled() {
                return Err(stop(sweep - 1, tried));
            }
            metrics::counter!("camera_acquire_sweeps_total").increment(1);
            let _sweep_span = tracing::info_span!("camera.sweep", sweep).entered();

            for strategy in Strategy::ALL {
                for attempt in self.plan(strategy) {
                    if cancelled() {
                        return Err(stop(sweep - 1, tried));
                    }
                    tried.insert(attempt.id.to_string());
                    match self.open_and_validate(&attempt) {
                        Ok(handle) => {
                            info!(
                                device = %attempt.id,
                                backend = attempt.backend.label(),
                                strategy = strategy.label(),
                                sweep,
                                "camera accepted"
                            );
                            return Ok((handle, attempt.id));
                        }
                        Err(rejected) => {
                            metrics::counter!(
                                "camera_device_rejected_total",
                                "reason" => rejected.reason()
                            )
                            .increment(1);
                            debug!(
                                device = %attempt.id,
                                backend = attempt.backend.label(),
                                strategy = strategy.label(),
                                reason = rejected.reason(),
                                "camera rejected: {rejected}"
                            );
                        }
                    }
                }
            }
            warn!(sweep, max_attempts, "sweep exhausted without a usable camera");
        }

        metrics::counter!("camera_acquire_failures_total").increment(1);
        Err(AcquireError::NoCamera(NoCameraFound::new(
            max_attempts,
            tried.into_iter().collect(),
        )))
    }

    /// Attempts a strategy would make right now, in order.
    pub fn plan(&self, strategy: Strategy) -> Vec<Attempt> {
        match strategy {
            Strategy::FilteredEnumeration => self.plan_enumeration(),
            Strategy::PathProbe => (0..self.config.probe_paths)
                .flat_map(|index| {
                    let id = DeviceId::video_path(index);
                    [
                        Attempt {
                            id: id.clone(),
                            backend: Backend::PlatformNative,
                        },
                        Attempt {
                            id,
                            backend: Backend::Generic,
                        },
                    ]
                })
                .collect(),
            Strategy::IndexFallback => (0..self.config.probe_indices)
                .map(|index| Attempt {
                    id: DeviceId::Index(index),
                    backend: Backend::Generic,
                })
                .collect(),
        }
    }

    fn plan_enumeration(&self) -> Vec<Attempt> {
        let listed = match self.lister.list() {
            Ok(listed) => listed,
            Err(err) => {
                warn!("device listing unavailable: {err}");
                return Vec::new();
            }
        };

        let mut attempts = Vec::new();
        for group in group_by_name(listed) {
            if let Some(keyword) = self.config.deny.matched(&group.declared_name) {
                debug!(
                    name = %group.declared_name,
                    keyword,
                    nodes = group.candidates.len(),
                    "skipping non-camera device"
                );
                continue;
            }
            debug!(
                name = %group.declared_name,
                nodes = group.candidates.len(),
                "considering device"
            );
            for candidate in group.candidates {
                let preferred = candidate.backend_hint.unwrap_or(Backend::Generic);
                attempts.push(Attempt {
                    id: candidate.id.clone(),
                    backend: preferred,
                });
                if preferred != Backend::Generic {
                    attempts.push(Attempt {
                        id: candidate.id,
                        backend: Backend::Generic,
                    });
                }
            }
        }
        attempts
    }

    /// Open a device, apply settings before any read, and require a frame
    /// within the warm-up budget.
    fn open_and_validate(
        &self,
        attempt: &Attempt,
    ) -> Result<CameraHandle<O::Device>, DeviceRejected> {
        let mut device = self
            .opener
            .open(&attempt.id, attempt.backend)
            .map_err(DeviceRejected::Open)?;

        if !device.is_opened() {
            device.release();
            return Err(DeviceRejected::NotOpened);
        }
        debug!(device = %attempt.id, backend = attempt.backend.label(), "device opened");

        let negotiated = match device.configure(&self.config.settings) {
            Ok(negotiated) => negotiated,
            Err(err) => {
                device.release();
                return Err(DeviceRejected::Configure(err));
            }
        };
        info!(
            device = %attempt.id,
            width = negotiated.width,
            height = negotiated.height,
            fps = negotiated.fps,
            "camera negotiated {}x{} @ {} fps",
            negotiated.width,
            negotiated.height,
            negotiated.fps
        );

        let reads = self.config.warmup_reads.max(1);
        for read in 1..=reads {
            match device.read_frame() {
                Ok(Some(frame)) if !frame.is_empty() => {
                    return Ok(CameraHandle::new(
                        device,
                        attempt.id.clone(),
                        attempt.backend,
                        self.config.settings,
                        negotiated,
                    ));
                }
                Ok(_) => debug!(device = %attempt.id, read, "warm-up read returned no frame"),
                Err(err) => debug!(device = %attempt.id, read, "warm-up read failed: {err}"),
            }
            if read < reads {
                self.clock.sleep(self.config.warmup_delay);
            }
        }

        warn!(device = %attempt.id, reads, "device opened but produced no frames");
        device.release();
        Err(DeviceRejected::WarmUp { reads })
    }
}
