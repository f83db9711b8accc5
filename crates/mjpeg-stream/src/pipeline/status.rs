//! Shared, JSON-serialisable view of what the streamer is doing.

use std::sync::{Arc, Mutex};

use serde::Serialize;

/// Snapshot served at `/status`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StreamStatus {
    /// A session currently holds a device.
    pub streaming: bool,
    /// Device held by the current (or most recent) session.
    pub device: Option<String>,
    /// Smoothed frame rate of the current session.
    pub fps: f64,
    /// Frames delivered by the current (or most recent) session.
    pub frames_sent: u64,
    /// Frames that session captured but could not encode.
    pub frames_dropped: u64,
    /// Sessions that acquired a device since startup.
    pub sessions_started: u64,
    /// Most recent session-ending error, cleared when a device is acquired.
    pub last_error: Option<String>,
}

/// Status handle shared between sessions and the HTTP layer.
#[derive(Clone, Debug, Default)]
pub struct SharedStatus(Arc<Mutex<StreamStatus>>);

impl SharedStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StreamStatus {
        self.0
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub(crate) fn session_started(&self, device: &str) {
        self.update(|status| {
            status.streaming = true;
            status.device = Some(device.to_owned());
            status.fps = 0.0;
            status.frames_sent = 0;
            status.frames_dropped = 0;
            status.sessions_started += 1;
            status.last_error = None;
        });
    }

    pub(crate) fn frame_sent(&self, fps: f64, dropped: u64) {
        self.update(|status| {
            status.fps = fps;
            status.frames_sent += 1;
            status.frames_dropped = dropped;
        });
    }

    pub(crate) fn session_ended(&self, error: Option<String>) {
        self.update(|status| {
            status.streaming = false;
            status.fps = 0.0;
            if error.is_some() {
                status.last_error = error;
            }
        });
    }

    fn update(&self, apply: impl FnOnce(&mut StreamStatus)) {
        let mut guard = match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        apply(&mut guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_lifecycle_updates_snapshot() {
        let status = SharedStatus::new();
        status.session_ended(Some("no camera".into()));
        assert_eq!(status.snapshot().last_error.as_deref(), Some("no camera"));

        status.session_started("/dev/video0");
        status.frame_sent(29.5, 0);
        status.frame_sent(29.9, 1);
        let snap = status.snapshot();
        assert!(snap.streaming);
        assert_eq!(snap.device.as_deref(), Some("/dev/video0"));
        assert_eq!(snap.frames_sent, 2);
        assert_eq!(snap.frames_dropped, 1);
        assert_eq!(snap.sessions_started, 1);
        assert_eq!(snap.last_error, None);

        status.session_ended(None);
        let snap = status.snapshot();
        assert!(!snap.streaming);
        assert_eq!(snap.fps, 0.0);
        assert_eq!(snap.device.as_deref(), Some("/dev/video0"));
        assert_eq!(snap.frames_sent, 2);

        status.session_started("/dev/video2");
        status.frame_sent(15.0, 0);
        let snap = status.snapshot();
        assert_eq!(snap.device.as_deref(), Some("/dev/video2"));
        assert_eq!(snap.frames_sent, 1);
        assert_eq!(snap.frames_dropped, 0);
        assert_eq!(snap.sessions_started, 2);
    }

    #[test]
    fn serialises_as_flat_json() {
        let json = serde_json::to_value(StreamStatus::default()).unwrap();
        assert_eq!(json["streaming"], false);
        assert!(json["device"].is_null());
        assert_eq!(json["frames_sent"], 0);
    }
}
