//! Serialises access to the camera across subscribers.

use std::{sync::Arc, time::Duration};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Single-permit gate. Whoever holds the permit owns the camera.
#[derive(Clone, Debug)]
pub(crate) struct DeviceGate {
    permits: Arc<Semaphore>,
    wait: Duration,
}

impl DeviceGate {
    pub(crate) fn new(wait: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
            wait,
        }
    }

    /// Wait up to the configured time for the camera; `None` on timeout.
    pub(crate) async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        let permit = tokio::time::timeout(self.wait, self.permits.clone().acquire_owned()).await;
        permit.ok()?.ok()
    }

    /// Seconds a rejected subscriber is told to back off.
    pub(crate) fn retry_after_secs(&self) -> u64 {
        self.wait.as_secs_f64().ceil().max(1.0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn second_caller_times_out_until_the_first_lets_go() {
        let gate = DeviceGate::new(Duration::from_millis(20));
        let first = gate.acquire().await.unwrap();
        assert!(gate.acquire().await.is_none());

        drop(first);
        assert!(gate.acquire().await.is_some());
    }

    #[test]
    fn retry_after_rounds_up_to_whole_seconds() {
        assert_eq!(DeviceGate::new(Duration::from_millis(20)).retry_after_secs(), 1);
        assert_eq!(DeviceGate::new(Duration::from_millis(5_001)).retry_after_secs(), 6);
    }
}
