//! Background keep-alive.
//!
//! A second, redundant driver for the engine's trigger evaluation. The
//! engine's own interval is the authority; the keep-alive exists so polling
//! continues when the engine's timer is starved or the host is throttled.
//! [`IntervalKeepAlive`] nudges the engine once per second and additionally
//! in the middle of every signal's firing window.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::signal::{AntidelaySeconds, Signal};
use crate::tracing::prelude::*;
use crate::trigger;

/// Reported state of a keep-alive collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeepAliveStatus {
    pub is_active: bool,
}

#[async_trait]
pub trait KeepAlive: Send + Sync {
    async fn start(&self);

    async fn stop(&self);

    fn status(&self) -> KeepAliveStatus;

    /// Arrange a wake-up at each signal's trigger instant.
    async fn schedule_all_notifications(&self, signals: &[Signal], antidelay: AntidelaySeconds);
}

/// Request for an out-of-band trigger evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nudge {
    /// Regular keep-alive heartbeat.
    Heartbeat,
    /// A scheduled signal is due.
    Scheduled,
}

const HEARTBEAT: Duration = Duration::from_secs(1);

#[derive(Default)]
struct Running {
    heartbeat: Option<CancellationToken>,
    schedule: Option<CancellationToken>,
}

/// Keep-alive built from tokio timers.
pub struct IntervalKeepAlive {
    nudge_tx: mpsc::Sender<Nudge>,
    running: Mutex<Running>,
}

impl IntervalKeepAlive {
    pub fn new(nudge_tx: mpsc::Sender<Nudge>) -> Self {
        Self {
            nudge_tx,
            running: Mutex::new(Running::default()),
        }
    }
}

#[async_trait]
impl KeepAlive for IntervalKeepAlive {
    async fn start(&self) {
        let mut running = self.running.lock();
        if running.heartbeat.is_some() {
            return;
        }

        let token = CancellationToken::new();
        tokio::spawn(heartbeat(self.nudge_tx.clone(), token.clone()));
        running.heartbeat = Some(token);
        info!("Background keep-alive started");
    }

    async fn stop(&self) {
        let mut running = self.running.lock();
        if let Some(token) = running.heartbeat.take() {
            token.cancel();
            info!("Background keep-alive stopped");
        }
        if let Some(token) = running.schedule.take() {
            token.cancel();
        }
    }

    fn status(&self) -> KeepAliveStatus {
        KeepAliveStatus {
            is_active: self.running.lock().heartbeat.is_some(),
        }
    }

    async fn schedule_all_notifications(&self, signals: &[Signal], antidelay: AntidelaySeconds) {
        let token = CancellationToken::new();
        let now = OffsetDateTime::now_utc();
        let mut scheduled = 0;

        for signal in signals {
            // Drift between the wall clock and the timer clock must not
            // land the nudge before the window opens.
            let Some(target) = trigger::window_midpoint(signal, antidelay) else {
                continue;
            };
            let delay = target - now;
            if delay.is_negative() {
                continue;
            }
            let Ok(delay) = Duration::try_from(delay) else {
                continue;
            };

            let tx = self.nudge_tx.clone();
            let token = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {
                        let _ = tx.send(Nudge::Scheduled).await;
                    }
                }
            });
            scheduled += 1;
        }

        if let Some(previous) = self.running.lock().schedule.replace(token) {
            previous.cancel();
        }
        debug!(scheduled, "Scheduled trigger wake-ups");
    }
}

async fn heartbeat(tx: mpsc::Sender<Nudge>, token: CancellationToken) {
    let mut interval = tokio::time::interval(HEARTBEAT);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                if tx.send(Nudge::Heartbeat).await.is_err() {
                    debug!("Keep-alive receiver closed");
                    break;
                }
            }
        }
    }
}
