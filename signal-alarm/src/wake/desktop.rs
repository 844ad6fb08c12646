//! Linux desktop wake adapter.
//!
//! The wake lock is a `systemd-inhibit` child blocking idle and sleep for as
//! long as it runs; releasing the lock kills the child. Notifications go
//! through `notify-send` with critical urgency and no expiry, which desktop
//! notification daemons keep on screen until the user dismisses them.
//! There is no vibration motor or window to focus on a desktop, so those
//! report [`CapabilityError::Unsupported`].

use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use super::{AlarmNotification, WakeLock, WakePlatform, WakeReservation};
use crate::error::{Capability, CapabilityError};

const INHIBIT_PROGRAM: &str = "systemd-inhibit";
const NOTIFY_PROGRAM: &str = "notify-send";

/// An inhibitor that exits this quickly was refused.
const INHIBIT_SETTLE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct DesktopWakePlatform {
    notifications: bool,
}

impl DesktopWakePlatform {
    pub fn new(notifications: bool) -> Self {
        Self { notifications }
    }
}

fn spawn_error(capability: Capability, err: io::Error) -> CapabilityError {
    match err.kind() {
        io::ErrorKind::NotFound => CapabilityError::Unsupported(capability),
        io::ErrorKind::PermissionDenied => CapabilityError::PermissionDenied {
            capability,
            reason: err.to_string(),
        },
        _ => CapabilityError::transient("process", err),
    }
}

#[async_trait]
impl WakePlatform for DesktopWakePlatform {
    async fn request_wake_lock(&self) -> Result<WakeLock, CapabilityError> {
        let mut child = Command::new(INHIBIT_PROGRAM)
            .args([
                "--what=idle:sleep",
                "--who=signal-alarm",
                "--why=Signal alarm ringing",
                "--mode=block",
                "sleep",
                "infinity",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(Capability::WakeLock, e))?;

        let settled = tokio::time::timeout(INHIBIT_SETTLE, child.wait()).await;
        match settled {
            Err(_) => Ok(Box::new(InhibitorReservation { child })),
            Ok(Ok(status)) => Err(CapabilityError::PermissionDenied {
                capability: Capability::WakeLock,
                reason: format!("inhibitor exited with {status}"),
            }),
            Ok(Err(e)) => Err(CapabilityError::transient("inhibitor", e)),
        }
    }

    fn vibrate(&self, _pattern: &[Duration]) -> Result<(), CapabilityError> {
        Err(CapabilityError::Unsupported(Capability::Vibration))
    }

    fn focus(&self) -> Result<(), CapabilityError> {
        Err(CapabilityError::Unsupported(Capability::Focus))
    }

    async fn notify(&self, notification: &AlarmNotification) -> Result<(), CapabilityError> {
        if !self.notifications {
            return Err(CapabilityError::Unsupported(Capability::Notification));
        }

        let mut command = Command::new(NOTIFY_PROGRAM);
        command.args(["--app-name=signal-alarm", "--urgency=critical"]);
        if notification.require_interaction {
            command.arg("--expire-time=0");
        }

        let output = command
            .arg(&notification.title)
            .arg(&notification.body)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| spawn_error(Capability::Notification, e))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(CapabilityError::transient(
                "notification",
                String::from_utf8_lossy(&output.stderr).trim(),
            ))
        }
    }
}

struct InhibitorReservation {
    child: Child,
}

impl WakeReservation for InhibitorReservation {
    fn release(mut self: Box<Self>) -> Result<(), CapabilityError> {
        self.child
            .start_kill()
            .map_err(|e| CapabilityError::transient("inhibitor", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_unsupported() {
        let err = spawn_error(
            Capability::WakeLock,
            io::Error::from(io::ErrorKind::NotFound),
        );
        assert!(matches!(
            err,
            CapabilityError::Unsupported(Capability::WakeLock)
        ));
    }

    #[test]
    fn desktop_cannot_vibrate_or_focus() {
        let platform = DesktopWakePlatform::new(true);
        assert!(platform.vibrate(&[Duration::from_millis(100)]).is_err());
        assert!(platform.focus().is_err());
    }

    #[tokio::test]
    async fn disabled_notifications_are_unsupported() {
        let platform = DesktopWakePlatform::new(false);
        let notification = AlarmNotification {
            title: "t".into(),
            body: "b".into(),
            require_interaction: true,
        };
        assert!(matches!(
            platform.notify(&notification).await,
            Err(CapabilityError::Unsupported(Capability::Notification))
        ));
    }
}
