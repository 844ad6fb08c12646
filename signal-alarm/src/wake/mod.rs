//! Keeping the device awake and getting the user's attention.
//!
//! Every operation here is best effort. A missing or refused capability is
//! logged and skipped; nothing in this module fails the alarm.

pub mod desktop;

#[cfg(test)]
pub(crate) mod fake;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::audio::{AudioOutputManager, ToneSpec};
use crate::engine::SessionId;
use crate::error::CapabilityError;
use crate::signal::Signal;
use crate::tracing::prelude::*;

/// Vibrate, pause, vibrate, pause, vibrate.
pub const VIBRATION_PATTERN: &[Duration] = &[
    Duration::from_millis(500),
    Duration::from_millis(200),
    Duration::from_millis(500),
    Duration::from_millis(200),
    Duration::from_millis(500),
];

/// A held screen-wake reservation.
pub trait WakeReservation: Send {
    fn release(self: Box<Self>) -> Result<(), CapabilityError>;
}

pub type WakeLock = Box<dyn WakeReservation>;

/// A notification that stays up until the user interacts with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmNotification {
    pub title: String,
    pub body: String,
    pub require_interaction: bool,
}

impl AlarmNotification {
    pub fn for_signal(signal: &Signal) -> Self {
        Self {
            title: format!("Signal: {} {}", signal.asset, signal.direction),
            body: format!(
                "{} {} is due. Open the alarm to dismiss.",
                signal.asset, signal.direction
            ),
            require_interaction: true,
        }
    }
}

/// Platform adapter for wake and attention capabilities.
#[async_trait]
pub trait WakePlatform: Send + Sync {
    async fn request_wake_lock(&self) -> Result<WakeLock, CapabilityError>;

    fn vibrate(&self, pattern: &[Duration]) -> Result<(), CapabilityError>;

    /// Bring the alarm surface to the foreground.
    fn focus(&self) -> Result<(), CapabilityError>;

    async fn notify(&self, notification: &AlarmNotification) -> Result<(), CapabilityError>;
}

/// How many force-wake effects took hold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForceWakeReport {
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct WakeController {
    platform: Arc<dyn WakePlatform>,
    audio: AudioOutputManager,
}

impl WakeController {
    pub fn new(platform: Arc<dyn WakePlatform>, audio: AudioOutputManager) -> Self {
        Self { platform, audio }
    }

    /// Request a screen-wake reservation. Never fails; `None` means the
    /// alarm rings without one.
    pub async fn acquire(&self) -> Option<WakeLock> {
        match self.platform.request_wake_lock().await {
            Ok(lock) => {
                debug!("Wake lock acquired");
                Some(lock)
            }
            Err(e) => {
                log_capability_error("wake lock", &e);
                None
            }
        }
    }

    /// Release `reservation`. No-op on `None`.
    pub fn release(&self, reservation: Option<WakeLock>) {
        let Some(lock) = reservation else {
            return;
        };
        match lock.release() {
            Ok(()) => debug!("Wake lock released"),
            Err(e) => warn!(error = %e, "Failed to release wake lock"),
        }
    }

    /// Vibrate, focus, notify and start a near-silent tone, each on its own.
    pub async fn force_wake(&self, session: SessionId, signal: &Signal) -> ForceWakeReport {
        let notification = AlarmNotification::for_signal(signal);

        let (vibrate, focus, notify, tone) = futures::join!(
            async { self.platform.vibrate(VIBRATION_PATTERN) },
            async { self.platform.focus() },
            self.platform.notify(&notification),
            async {
                self.audio
                    .play_tone(session, ToneSpec::NEAR_SILENT)
                    .map(|_| ())
            },
        );

        let mut report = ForceWakeReport::default();
        for (effect, result) in [
            ("vibration", vibrate),
            ("focus", focus),
            ("notification", notify),
            ("silent tone", tone),
        ] {
            match result {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    report.failed += 1;
                    log_capability_error(effect, &e);
                }
            }
        }

        debug!(
            succeeded = report.succeeded,
            failed = report.failed,
            "Force wake finished"
        );
        report
    }
}

fn log_capability_error(effect: &str, error: &CapabilityError) {
    match error {
        CapabilityError::Unsupported(_) => debug!(effect, error = %error, "Capability unavailable"),
        CapabilityError::PermissionDenied { .. } | CapabilityError::Transient { .. } => {
            warn!(effect, error = %error, "Capability failed")
        }
    }
}
