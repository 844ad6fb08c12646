//! The ring lifecycle state machine.
//!
//! # State Machine
//!
//! ```text
//!               due ∧ ¬fired                    dismiss
//!  Idle ─────────────────────────► Ringing ────────────────► Idle
//!                                   │   ▲
//!                                   └───┘
//!                              due ∧ ¬fired
//!                           (joins the session)
//! ```
//!
//! - **Idle:** nothing is ringing. Every poll tick evaluates the signal list.
//! - **Ringing:** at least one signal fired and the user has not dismissed
//!   it. Further due signals join the current session: their sound starts
//!   alongside the existing one and they are marked fired, but the
//!   displayed signal stays the first one.
//!
//! # Ordering
//!
//! Entering `Ringing` is synchronous: the identity is marked fired and the
//! view is published before any resource is requested, so a slow or failing
//! wake lock or audio start can never make the next tick fire the same signal
//! again. Resource acquisition then runs in spawned tasks. Each task is
//! tagged with the [`SessionId`] it was started for; when it completes, the
//! engine keeps the resource only if that session is still ringing and
//! releases it otherwise. Dismissal therefore never waits on I/O.
//!
//! The engine runs as a single task ([`AlarmEngine::run`]). Its poll
//! interval is re-armed whenever the signal list or antidelay changes and
//! dropped entirely while the list is empty.

mod clock;
mod handle;

pub use clock::{Clock, ManualClock, SystemClock};
pub use handle::{EngineCommand, EngineHandle};

use std::future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api_client::types::AlarmView;
use crate::audio::{AudioBackend, AudioOutputManager, Playback};
use crate::error::CapabilityError;
use crate::keepalive::{KeepAlive, Nudge};
use crate::registry::DeduplicationRegistry;
use crate::signal::{AntidelaySeconds, Signal};
use crate::store::SignalSource;
use crate::tracing::prelude::*;
use crate::trigger::{self, EVALUATION_WINDOW};
use crate::wake::{ForceWakeReport, WakeController, WakeLock, WakePlatform};

/// How long the dismiss control shows as pressed.
pub const DISMISS_FEEDBACK: Duration = Duration::from_millis(200);

const COMMAND_CHANNEL_SIZE: usize = 16;
const EVENT_CHANNEL_SIZE: usize = 64;

/// Identifies one ring session, from trigger to dismissal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingState {
    Idle,
    Ringing,
}

/// Lifecycle notifications for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmEvent {
    /// `signal` started ringing.
    Fired(Signal),
    /// The user dismissed a session that had `signals` ringing.
    Dismissed { signals: usize },
}

/// Tunables the engine starts with.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub antidelay: AntidelaySeconds,
    /// Custom alarm sound; the default tone plays when absent.
    pub custom_sound: Option<Bytes>,
    pub poll_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            antidelay: AntidelaySeconds::ZERO,
            custom_sound: None,
            poll_interval: EVALUATION_WINDOW,
        }
    }
}

/// Collaborators the engine drives.
pub struct EngineParts {
    pub clock: Arc<dyn Clock>,
    pub audio: Arc<dyn AudioBackend>,
    pub wake: Arc<dyn WakePlatform>,
    pub keepalive: Arc<dyn KeepAlive>,
    pub source: Arc<dyn SignalSource>,
    /// Out-of-band evaluation requests, typically from the keep-alive.
    pub nudge_rx: mpsc::Receiver<Nudge>,
}

struct RingSession {
    id: SessionId,
    signals: Vec<Signal>,
    wake_lock: Option<WakeLock>,
}

/// Result of a spawned acquisition task.
enum Completion {
    WakeLock {
        session: SessionId,
        lock: Option<WakeLock>,
    },
    Audio {
        session: SessionId,
        asset: String,
        result: Result<Playback, CapabilityError>,
    },
    ForceWake {
        session: SessionId,
        report: ForceWakeReport,
    },
    Persisted {
        asset: String,
        result: crate::error::Result<()>,
    },
}

pub struct AlarmEngine {
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
    signals: Vec<Signal>,
    registry: DeduplicationRegistry,
    session: Option<RingSession>,
    next_session: u64,
    audio: AudioOutputManager,
    wake: WakeController,
    keepalive: Arc<dyn KeepAlive>,
    source: Arc<dyn SignalSource>,
    in_flight: JoinSet<Completion>,
    poll: Option<Interval>,
    pressed_until: Option<Instant>,
    cmd_rx: mpsc::Receiver<EngineCommand>,
    nudge_rx: mpsc::Receiver<Nudge>,
    view_tx: watch::Sender<AlarmView>,
    events_tx: broadcast::Sender<AlarmEvent>,
}

impl AlarmEngine {
    pub fn new(settings: EngineSettings, parts: EngineParts) -> (Self, EngineHandle) {
        let audio = AudioOutputManager::new(parts.audio);
        let wake = WakeController::new(parts.wake, audio.clone());

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (view_tx, view_rx) = watch::channel(AlarmView {
            antidelay_secs: settings.antidelay,
            ..AlarmView::default()
        });
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        let handle = EngineHandle {
            cmd_tx,
            view_rx,
            events_tx: events_tx.clone(),
        };

        let engine = Self {
            clock: parts.clock,
            settings,
            signals: Vec::new(),
            registry: DeduplicationRegistry::new(),
            session: None,
            next_session: 1,
            audio,
            wake,
            keepalive: parts.keepalive,
            source: parts.source,
            in_flight: JoinSet::new(),
            poll: None,
            pressed_until: None,
            cmd_rx,
            nudge_rx: parts.nudge_rx,
            view_tx,
            events_tx,
        };

        (engine, handle)
    }

    /// Load the stored signals and run until `cancellation` fires.
    pub async fn run(mut self, cancellation: CancellationToken) {
        match self.source.signals().await {
            Ok(signals) => self.set_signals(signals).await,
            Err(e) => {
                error!(error = %e, "Failed to load signals, starting with an empty list");
                self.set_signals(Vec::new()).await;
            }
        }

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    break;
                }
                Some(command) = self.cmd_rx.recv() => {
                    self.handle_command(command).await;
                }
                Some(nudge) = self.nudge_rx.recv() => {
                    trace!(?nudge, "Keep-alive nudge");
                    self.tick();
                }
                _ = next_poll(&mut self.poll) => {
                    self.tick();
                }
                Some(joined) = self.in_flight.join_next() => {
                    self.on_joined(joined);
                }
                _ = sleep_until(self.pressed_until) => {
                    self.pressed_until = None;
                    self.publish();
                }
            }
        }

        self.shutdown().await;
    }

    pub fn state(&self) -> RingState {
        if self.session.is_some() {
            RingState::Ringing
        } else {
            RingState::Idle
        }
    }

    async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Dismiss { reply } => {
                self.dismiss();
                let _ = reply.send(self.view());
            }
            EngineCommand::SetAntidelay { antidelay, reply } => {
                self.set_antidelay(antidelay).await;
                let _ = reply.send(self.view());
            }
            EngineCommand::SetSignals { signals, reply } => {
                self.set_signals(signals).await;
                let _ = reply.send(self.view());
            }
        }
    }

    /// Evaluate every signal against the clock and ring the due ones.
    pub fn tick(&mut self) {
        let now = self.clock.now();
        let antidelay = self.settings.antidelay;

        let due: Vec<Signal> = self
            .signals
            .iter()
            .filter(|s| trigger::should_fire(s, now, antidelay))
            .filter(|s| !self.registry.has(&s.identity()))
            .cloned()
            .collect();

        for signal in due {
            self.ring(signal);
        }
    }

    fn ring(&mut self, signal: Signal) {
        if !self.registry.mark(signal.identity()) {
            return;
        }

        let session = match &mut self.session {
            Some(current) => {
                info!(
                    asset = %signal.asset,
                    direction = %signal.direction,
                    session = current.id.0,
                    "Signal joined ringing alarm"
                );
                current.signals.push(signal.clone());
                current.id
            }
            None => {
                let id = SessionId(self.next_session);
                self.next_session += 1;
                info!(
                    asset = %signal.asset,
                    direction = %signal.direction,
                    session = id.0,
                    "Alarm ringing"
                );
                self.audio.open_session(id);
                self.session = Some(RingSession {
                    id,
                    signals: vec![signal.clone()],
                    wake_lock: None,
                });
                self.start_wake(id, &signal);
                id
            }
        };

        self.publish();
        let _ = self.events_tx.send(AlarmEvent::Fired(signal.clone()));

        self.start_audio(session, &signal);
        self.persist_triggered(signal);
    }

    fn start_wake(&mut self, session: SessionId, signal: &Signal) {
        let wake = self.wake.clone();
        self.in_flight.spawn(async move {
            let lock = wake.acquire().await;
            Completion::WakeLock { session, lock }
        });

        let wake = self.wake.clone();
        let signal = signal.clone();
        self.in_flight.spawn(async move {
            let report = wake.force_wake(session, &signal).await;
            Completion::ForceWake { session, report }
        });
    }

    fn start_audio(&mut self, session: SessionId, signal: &Signal) {
        let audio = self.audio.clone();
        let custom = self.settings.custom_sound.clone();
        let asset = signal.asset.clone();
        self.in_flight.spawn(async move {
            let result = audio.play(session, custom).await;
            Completion::Audio {
                session,
                asset,
                result,
            }
        });
    }

    fn persist_triggered(&mut self, signal: Signal) {
        let source = self.source.clone();
        self.in_flight.spawn(async move {
            let result = source.mark_triggered(&signal).await;
            Completion::Persisted {
                asset: signal.asset,
                result,
            }
        });
    }

    /// Ring off: silence everything and release the wake lock.
    ///
    /// Idempotent, and effective even while acquisitions for the session
    /// are still in flight.
    pub fn dismiss(&mut self) {
        self.pressed_until = Some(Instant::now() + DISMISS_FEEDBACK);

        let session = self.session.take();
        let report = self.audio.stop_all();

        match session {
            Some(session) => {
                self.wake.release(session.wake_lock);
                info!(
                    session = session.id.0,
                    signals = session.signals.len(),
                    media_stopped = report.media_stopped,
                    tones_closed = report.tones_closed,
                    "Alarm dismissed"
                );
                let _ = self.events_tx.send(AlarmEvent::Dismissed {
                    signals: session.signals.len(),
                });
            }
            None => debug!("Dismiss with no alarm ringing"),
        }

        self.publish();
    }

    /// Replace the governing signal list.
    pub async fn set_signals(&mut self, signals: Vec<Signal>) {
        self.registry.retain_members(&signals);

        let now = self.clock.now();
        let missed = signals
            .iter()
            .filter(|s| trigger::is_missed(s, now, self.settings.antidelay))
            .count();
        if missed > 0 {
            info!(missed, "Some signals are already past their trigger time");
        }

        self.signals = signals;
        info!(count = self.signals.len(), "Signal list updated");

        if self.signals.is_empty() {
            if self.keepalive.status().is_active {
                self.keepalive.stop().await;
            }
        } else {
            if !self.keepalive.status().is_active {
                self.keepalive.start().await;
            }
            self.keepalive
                .schedule_all_notifications(&self.signals, self.settings.antidelay)
                .await;
        }

        self.rearm();
        self.publish();
    }

    /// Change the antidelay. Signals that already fired stay fired.
    pub async fn set_antidelay(&mut self, antidelay: AntidelaySeconds) {
        info!(
            previous = %self.settings.antidelay,
            antidelay = %antidelay,
            "Antidelay changed"
        );
        self.settings.antidelay = antidelay;

        if !self.signals.is_empty() {
            self.keepalive
                .schedule_all_notifications(&self.signals, antidelay)
                .await;
        }

        self.rearm();
        self.publish();
    }

    fn rearm(&mut self) {
        self.poll = if self.signals.is_empty() {
            None
        } else {
            let mut interval = tokio::time::interval(self.settings.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            Some(interval)
        };
    }

    fn on_joined(&mut self, joined: Result<Completion, JoinError>) {
        match joined {
            Ok(completion) => self.on_completion(completion),
            Err(e) if e.is_cancelled() => {}
            Err(e) => error!(error = %e, "Alarm task failed"),
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::WakeLock { session, lock } => match &mut self.session {
                Some(current) if current.id == session && current.wake_lock.is_none() => {
                    current.wake_lock = lock;
                }
                _ => {
                    if lock.is_some() {
                        debug!(session = session.0, "Wake lock arrived after dismissal");
                    }
                    self.wake.release(lock);
                }
            },
            Completion::Audio {
                session,
                asset,
                result,
            } => match result {
                Ok(Playback::Started) => debug!(session = session.0, %asset, "Alarm sound started"),
                Ok(Playback::Discarded) => {
                    debug!(session = session.0, %asset, "Alarm sound discarded after dismissal")
                }
                Err(e) => warn!(
                    session = session.0,
                    %asset,
                    error = %e,
                    "Alarm sound failed to start, ringing silently"
                ),
            },
            Completion::ForceWake { session, report } => {
                trace!(session = session.0, ?report, "Force wake completed");
            }
            Completion::Persisted { asset, result } => {
                if let Err(e) = result {
                    warn!(%asset, error = %e, "Failed to persist triggered signal");
                }
            }
        }
    }

    /// Wait for every in-flight acquisition to finish and apply it.
    pub async fn settle(&mut self) {
        while let Some(joined) = self.in_flight.join_next().await {
            self.on_joined(joined);
        }
    }

    async fn shutdown(&mut self) {
        info!("Alarm engine shutting down");
        self.dismiss();
        self.settle().await;
        if self.keepalive.status().is_active {
            self.keepalive.stop().await;
        }
    }

    pub fn view(&self) -> AlarmView {
        let ringing_signals = self
            .session
            .as_ref()
            .map(|s| s.signals.clone())
            .unwrap_or_default();

        AlarmView {
            ringing: self.session.is_some(),
            signal: ringing_signals.first().cloned(),
            ringing_signals,
            dismiss_pressed: self.pressed_until.is_some(),
            antidelay_secs: self.settings.antidelay,
        }
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.view());
    }
}

async fn next_poll(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}
