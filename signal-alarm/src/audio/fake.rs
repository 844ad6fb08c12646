//! In-memory audio backend for tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::{AudioBackend, PlayableAudio, ToneContext, ToneSpec};
use crate::error::CapabilityError;

#[derive(Debug, Default)]
struct State {
    media_playing: usize,
    tones_started: usize,
    tones_open: usize,
    strays: usize,
    fail_decode: bool,
    fail_start: bool,
    fail_stop: bool,
    decode_delay: Option<Duration>,
}

/// Counts what is playing so tests can assert silence.
#[derive(Debug, Default)]
pub(crate) struct FakeAudioBackend {
    state: Arc<Mutex<State>>,
}

impl FakeAudioBackend {
    pub fn fail_decode(&self) {
        self.state.lock().fail_decode = true;
    }

    pub fn fail_start(&self) {
        self.state.lock().fail_start = true;
    }

    pub fn fail_stop(&self) {
        self.state.lock().fail_stop = true;
    }

    pub fn delay_decode(&self, delay: Duration) {
        self.state.lock().decode_delay = Some(delay);
    }

    pub fn add_stray(&self) {
        self.state.lock().strays += 1;
    }

    pub fn media_playing(&self) -> usize {
        self.state.lock().media_playing
    }

    pub fn tones_started(&self) -> usize {
        self.state.lock().tones_started
    }

    pub fn tones_open(&self) -> usize {
        self.state.lock().tones_open
    }
}

#[async_trait]
impl AudioBackend for FakeAudioBackend {
    async fn decode(&self, _payload: Bytes) -> Result<Box<dyn PlayableAudio>, CapabilityError> {
        let (fail, delay) = {
            let state = self.state.lock();
            (state.fail_decode, state.decode_delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if fail {
            return Err(CapabilityError::transient("decoder", "unrecognized format"));
        }

        Ok(Box::new(FakeMedia {
            state: self.state.clone(),
            playing: false,
        }))
    }

    fn tone(&self, _spec: ToneSpec) -> Result<Box<dyn ToneContext>, CapabilityError> {
        self.state.lock().tones_open += 1;
        Ok(Box::new(FakeTone {
            state: self.state.clone(),
            open: true,
        }))
    }

    fn sweep_stray_media(&self) -> usize {
        std::mem::take(&mut self.state.lock().strays)
    }
}

struct FakeMedia {
    state: Arc<Mutex<State>>,
    playing: bool,
}

impl PlayableAudio for FakeMedia {
    fn play(&mut self) -> Result<(), CapabilityError> {
        let mut state = self.state.lock();
        if state.fail_start {
            return Err(CapabilityError::transient("media", "playback refused"));
        }
        if !self.playing {
            self.playing = true;
            state.media_playing += 1;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CapabilityError> {
        let mut state = self.state.lock();
        if state.fail_stop {
            return Err(CapabilityError::transient("media", "pause failed"));
        }
        if self.playing {
            self.playing = false;
            state.media_playing -= 1;
        }
        Ok(())
    }
}

struct FakeTone {
    state: Arc<Mutex<State>>,
    open: bool,
}

impl ToneContext for FakeTone {
    fn start(&mut self) -> Result<(), CapabilityError> {
        let mut state = self.state.lock();
        if state.fail_start {
            return Err(CapabilityError::transient("oscillator", "context suspended"));
        }
        state.tones_started += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), CapabilityError> {
        if self.open {
            self.open = false;
            self.state.lock().tones_open -= 1;
        }
        Ok(())
    }
}
