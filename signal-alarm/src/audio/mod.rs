//! Audio output for ringing alarms.
//!
//! The [`AudioOutputManager`] resolves which sound to play, asks the
//! platform [`AudioBackend`] for a handle, and records every handle it hands
//! out in a tracking collection shared with the engine. Dismissal goes
//! through [`AudioOutputManager::stop_all`], which is the only way the
//! engine can guarantee silence after the user presses "ring off".
//!
//! Handles are tagged with the ring session they were started for. A handle
//! that finishes decoding after its session was dismissed is stopped on the
//! spot instead of being tracked, so a slow decode cannot leave a sound
//! playing with nobody left to stop it.

pub mod terminal;

#[cfg(test)]
pub(crate) mod fake;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::engine::SessionId;
use crate::error::CapabilityError;
use crate::tracing::prelude::*;

/// A decoded media payload that can be played and rewound.
pub trait PlayableAudio: Send {
    fn play(&mut self) -> Result<(), CapabilityError>;

    /// Pause and rewind to the start.
    fn stop(&mut self) -> Result<(), CapabilityError>;
}

/// A synthesized oscillator tone.
pub trait ToneContext: Send {
    fn start(&mut self) -> Result<(), CapabilityError>;

    /// Close the context. Closing an already-closed context succeeds.
    fn close(&mut self) -> Result<(), CapabilityError>;
}

/// Oscillator parameters for a synthesized tone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneSpec {
    pub frequency_hz: f32,
    /// Linear gain, 0.0 to 1.0.
    pub gain: f32,
}

impl ToneSpec {
    /// Default alarm tone when no custom sound is configured.
    pub const ALARM: Self = Self {
        frequency_hz: 880.0,
        gain: 0.8,
    };

    /// Inaudible tone used to keep the audio device awake.
    pub const NEAR_SILENT: Self = Self {
        frequency_hz: 20.0,
        gain: 0.001,
    };

    pub fn is_audible(&self) -> bool {
        self.gain >= 0.01
    }
}

/// Platform adapter producing audio handles.
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Decode a custom sound payload into a playable handle.
    async fn decode(&self, payload: Bytes) -> Result<Box<dyn PlayableAudio>, CapabilityError>;

    /// Create an oscillator context for `spec`.
    fn tone(&self, spec: ToneSpec) -> Result<Box<dyn ToneContext>, CapabilityError>;

    /// Stop any media the platform still has playing, tracked or not.
    ///
    /// Returns how many were still playing.
    fn sweep_stray_media(&self) -> usize;
}

/// Outcome of starting a sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    /// Playing and tracked for the session.
    Started,
    /// The session ended before playback could start; the handle was
    /// stopped and dropped.
    Discarded,
}

/// Summary of a [`stop_all`](AudioOutputManager::stop_all) call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopReport {
    pub media_stopped: usize,
    pub tones_closed: usize,
    pub failures: usize,
    pub strays_swept: usize,
}

#[derive(Default)]
struct LiveAudio {
    session: Option<SessionId>,
    media: Vec<Box<dyn PlayableAudio>>,
    tones: Vec<Box<dyn ToneContext>>,
}

/// Resolves, starts and tracks alarm audio.
///
/// Cheap to clone; clones share the same tracking collection.
#[derive(Clone)]
pub struct AudioOutputManager {
    backend: Arc<dyn AudioBackend>,
    live: Arc<Mutex<LiveAudio>>,
}

impl AudioOutputManager {
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            backend,
            live: Arc::new(Mutex::new(LiveAudio::default())),
        }
    }

    /// Accept handles for `session` from now on.
    pub fn open_session(&self, session: SessionId) {
        self.live.lock().session = Some(session);
    }

    /// Start the alarm sound for `session`.
    ///
    /// A custom payload is decoded and played as media. Without one, or if
    /// decoding fails, the default tone is synthesized instead so the alarm
    /// is not left silent.
    pub async fn play(
        &self,
        session: SessionId,
        custom: Option<Bytes>,
    ) -> Result<Playback, CapabilityError> {
        if let Some(payload) = custom {
            match self.backend.decode(payload).await {
                Ok(handle) => return self.adopt_media(session, handle),
                Err(e) => {
                    warn!(error = %e, "Custom sound unavailable, falling back to default tone");
                }
            }
        }

        self.play_tone(session, ToneSpec::ALARM)
    }

    /// Start a synthesized tone for `session`.
    pub fn play_tone(
        &self,
        session: SessionId,
        spec: ToneSpec,
    ) -> Result<Playback, CapabilityError> {
        let mut tone = self.backend.tone(spec)?;
        let mut live = self.live.lock();

        if live.session != Some(session) {
            debug!(?session, "Session ended before tone started, closing");
            let _ = tone.close();
            return Ok(Playback::Discarded);
        }

        if let Err(e) = tone.start() {
            let _ = tone.close();
            return Err(e);
        }

        live.tones.push(tone);
        Ok(Playback::Started)
    }

    fn adopt_media(
        &self,
        session: SessionId,
        mut handle: Box<dyn PlayableAudio>,
    ) -> Result<Playback, CapabilityError> {
        let mut live = self.live.lock();

        if live.session != Some(session) {
            debug!(?session, "Session ended before media started, stopping");
            let _ = handle.stop();
            return Ok(Playback::Discarded);
        }

        if let Err(e) = handle.play() {
            let _ = handle.stop();
            return Err(e);
        }

        live.media.push(handle);
        Ok(Playback::Started)
    }

    /// Silence everything.
    ///
    /// Stops and rewinds every tracked media handle, closes every tracked
    /// tone, then sweeps the backend for strays. Each resource is handled on
    /// its own so one failure does not keep the rest playing. Safe to call
    /// repeatedly.
    pub fn stop_all(&self) -> StopReport {
        let (media, tones) = {
            let mut live = self.live.lock();
            live.session = None;
            (
                std::mem::take(&mut live.media),
                std::mem::take(&mut live.tones),
            )
        };

        let mut report = StopReport::default();

        for mut handle in media {
            match handle.stop() {
                Ok(()) => report.media_stopped += 1,
                Err(e) => {
                    report.failures += 1;
                    warn!(error = %e, "Failed to stop media handle");
                }
            }
        }

        for mut tone in tones {
            match tone.close() {
                Ok(()) => report.tones_closed += 1,
                Err(e) => {
                    report.failures += 1;
                    warn!(error = %e, "Failed to close tone context");
                }
            }
        }

        report.strays_swept = self.backend.sweep_stray_media();
        if report.strays_swept > 0 {
            warn!(count = report.strays_swept, "Stopped untracked media");
        }

        report
    }

    /// Number of tracked handles and contexts.
    pub fn live_count(&self) -> usize {
        let live = self.live.lock();
        live.media.len() + live.tones.len()
    }
}
