//! Synthetic devices for tests and hardware-free runs.
//!
//! Everything here records what the acquirer and the pipeline did to it, so
//! callers can assert on opens, releases, and sleeps.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use crate::{
    clock::Clock,
    device::{CaptureDevice, DeviceOpener},
    discovery::{DeviceLister, DiscoveryError},
    types::{
        Backend, CaptureError, CaptureSettings, DeviceCandidate, DeviceId, Frame, FrameFormat,
        NegotiatedSettings,
    },
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A solid BGR frame.
pub fn solid_frame(width: i32, height: i32, bgr: [u8; 3]) -> Frame {
    let pixels = (width.max(0) * height.max(0)) as usize;
    Frame {
        data: bgr.repeat(pixels),
        width,
        height,
        timestamp_ms: 0,
        format: FrameFormat::Bgr8,
    }
}

/// Lister returning a fixed set of `/dev/videoN` nodes.
#[derive(Clone, Debug, Default)]
pub struct StubLister {
    candidates: Vec<DeviceCandidate>,
}

impl StubLister {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add `/dev/video{index}` under `name`.
    pub fn with_device(mut self, index: u32, name: &str) -> Self {
        self.candidates.push(DeviceCandidate {
            id: DeviceId::video_path(index),
            declared_name: name.to_owned(),
            backend_hint: Some(Backend::PlatformNative),
        });
        self
    }
}

impl DeviceLister for StubLister {
    fn list(&self) -> Result<Vec<DeviceCandidate>, DiscoveryError> {
        Ok(self.candidates.clone())
    }
}

/// How a stub device behaves once opened.
#[derive(Clone, Debug)]
pub struct StubScript {
    frame: Frame,
    /// Reads after which every read fails.
    fail_after: Option<u32>,
    /// Every n-th read yields a frame whose buffer does not match its geometry.
    corrupt_every: Option<u32>,
}

impl StubScript {
    /// Streams `frame` forever.
    pub fn streaming(frame: Frame) -> Self {
        Self {
            frame,
            fail_after: None,
            corrupt_every: None,
        }
    }

    /// Stop delivering frames after `reads` successful reads (warm-up included).
    pub fn fail_after(mut self, reads: u32) -> Self {
        self.fail_after = Some(reads);
        self
    }

    /// Make every `n`-th read a truncated frame.
    pub fn corrupt_every(mut self, n: u32) -> Self {
        self.corrupt_every = Some(n.max(1));
        self
    }
}

#[derive(Debug, Default)]
struct Ledger {
    opened: Vec<(DeviceId, Backend)>,
    released: HashMap<DeviceId, u32>,
    reads: HashMap<DeviceId, u32>,
}

/// Opener serving [`StubScript`]s keyed by device identifier.
#[derive(Clone, Debug, Default)]
pub struct StubOpener {
    scripts: Arc<HashMap<DeviceId, StubScript>>,
    ledger: Arc<Mutex<Ledger>>,
}

impl StubOpener {
    pub fn new(scripts: impl IntoIterator<Item = (DeviceId, StubScript)>) -> Self {
        Self {
            scripts: Arc::new(scripts.into_iter().collect()),
            ledger: Arc::default(),
        }
    }

    pub fn opened(&self) -> Vec<(DeviceId, Backend)> {
        lock(&self.ledger).opened.clone()
    }

    pub fn releases(&self, id: &DeviceId) -> u32 {
        lock(&self.ledger).released.get(id).copied().unwrap_or(0)
    }

    pub fn reads(&self, id: &DeviceId) -> u32 {
        lock(&self.ledger).reads.get(id).copied().unwrap_or(0)
    }
}

impl DeviceOpener for StubOpener {
    type Device = StubDevice;

    fn open(&self, id: &DeviceId, backend: Backend) -> Result<StubDevice, CaptureError> {
        lock(&self.ledger).opened.push((id.clone(), backend));
        let script = self
            .scripts
            .get(id)
            .cloned()
            .ok_or_else(|| CaptureError::Open { id: id.clone() })?;
        Ok(StubDevice {
            id: id.clone(),
            script,
            reads: 0,
            ledger: self.ledger.clone(),
        })
    }
}

#[derive(Debug)]
pub struct StubDevice {
    id: DeviceId,
    script: StubScript,
    reads: u32,
    ledger: Arc<Mutex<Ledger>>,
}

impl CaptureDevice for StubDevice {
    fn is_opened(&self) -> bool {
        true
    }

    fn configure(&mut self, settings: &CaptureSettings) -> Result<NegotiatedSettings, CaptureError> {
        Ok(NegotiatedSettings {
            width: f64::from(self.script.frame.width),
            height: f64::from(self.script.frame.height),
            fps: settings.fps,
        })
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.script.fail_after.is_some_and(|limit| self.reads >= limit) {
            return Ok(None);
        }
        self.reads += 1;
        *lock(&self.ledger).reads.entry(self.id.clone()).or_default() += 1;

        let mut frame = self.script.frame.clone();
        if self.script.corrupt_every.is_some_and(|n| self.reads % n == 0) {
            frame.data.truncate(frame.data.len() / 2);
        }
        Ok(Some(frame))
    }

    fn release(&mut self) {
        *lock(&self.ledger).released.entry(self.id.clone()).or_default() += 1;
    }
}

/// Clock that returns immediately and remembers what it was asked to sleep.
#[derive(Clone, Debug, Default)]
pub struct InstantClock {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl InstantClock {
    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }
}

impl Clock for InstantClock {
    fn sleep(&self, duration: Duration) {
        lock(&self.sleeps).push(duration);
    }
}
