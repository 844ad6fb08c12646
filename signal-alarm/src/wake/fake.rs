//! In-memory wake platform for tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{AlarmNotification, WakeLock, WakePlatform, WakeReservation};
use crate::error::{Capability, CapabilityError};

#[derive(Debug, Clone, Copy, Default)]
pub(crate) enum LockBehavior {
    #[default]
    Grant,
    Deny,
    Unsupported,
    /// Grant after the given delay.
    Slow(Duration),
}

#[derive(Debug, Default)]
struct State {
    held: usize,
    released: usize,
    notifications: Vec<AlarmNotification>,
    attention_disabled: bool,
}

#[derive(Debug, Default)]
pub(crate) struct FakeWakePlatform {
    lock: LockBehavior,
    state: Arc<Mutex<State>>,
}

impl FakeWakePlatform {
    pub fn with_lock(lock: LockBehavior) -> Self {
        Self {
            lock,
            ..Self::default()
        }
    }

    /// Make vibration, focus and notification all fail.
    pub fn disable_attention(&self) {
        self.state.lock().attention_disabled = true;
    }

    pub fn locks_held(&self) -> usize {
        self.state.lock().held
    }

    pub fn locks_released(&self) -> usize {
        self.state.lock().released
    }

    pub fn notifications(&self) -> Vec<AlarmNotification> {
        self.state.lock().notifications.clone()
    }
}

#[async_trait]
impl WakePlatform for FakeWakePlatform {
    async fn request_wake_lock(&self) -> Result<WakeLock, CapabilityError> {
        match self.lock {
            LockBehavior::Grant => {}
            LockBehavior::Deny => {
                return Err(CapabilityError::PermissionDenied {
                    capability: Capability::WakeLock,
                    reason: "denied by test".into(),
                });
            }
            LockBehavior::Unsupported => {
                return Err(CapabilityError::Unsupported(Capability::WakeLock));
            }
            LockBehavior::Slow(delay) => tokio::time::sleep(delay).await,
        }

        self.state.lock().held += 1;
        Ok(Box::new(FakeReservation {
            state: self.state.clone(),
        }))
    }

    fn vibrate(&self, _pattern: &[Duration]) -> Result<(), CapabilityError> {
        if self.state.lock().attention_disabled {
            return Err(CapabilityError::Unsupported(Capability::Vibration));
        }
        Ok(())
    }

    fn focus(&self) -> Result<(), CapabilityError> {
        if self.state.lock().attention_disabled {
            return Err(CapabilityError::Unsupported(Capability::Focus));
        }
        Ok(())
    }

    async fn notify(&self, notification: &AlarmNotification) -> Result<(), CapabilityError> {
        let mut state = self.state.lock();
        if state.attention_disabled {
            return Err(CapabilityError::PermissionDenied {
                capability: Capability::Notification,
                reason: "denied by test".into(),
            });
        }
        state.notifications.push(notification.clone());
        Ok(())
    }
}

struct FakeReservation {
    state: Arc<Mutex<State>>,
}

impl WakeReservation for FakeReservation {
    fn release(self: Box<Self>) -> Result<(), CapabilityError> {
        let mut state = self.state.lock();
        state.held -= 1;
        state.released += 1;
        Ok(())
    }
}
