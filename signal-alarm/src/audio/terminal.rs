//! Audio backend that rings the terminal bell.
//!
//! Used by the daemon on hosts without a sound stack. Custom payloads are
//! sniffed for a known container format so a misconfigured sound file is
//! reported (and the manager falls back to the default tone) rather than
//! silently ignored. Playback is a task writing BEL to stderr on a fixed
//! cadence until stopped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::{AudioBackend, PlayableAudio, ToneContext, ToneSpec};
use crate::error::{Capability, CapabilityError};
use crate::tracing::prelude::*;

const BELL: &[u8] = b"\x07";
const MEDIA_PERIOD: Duration = Duration::from_millis(1000);
const TONE_PERIOD: Duration = Duration::from_millis(500);

/// Container formats recognized in custom sound payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Ogg,
    Flac,
    Mp3,
}

/// Identify the container format from the payload's magic bytes.
pub fn sniff_format(payload: &[u8]) -> Option<AudioFormat> {
    match payload {
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => Some(AudioFormat::Wav),
        [b'O', b'g', b'g', b'S', ..] => Some(AudioFormat::Ogg),
        [b'f', b'L', b'a', b'C', ..] => Some(AudioFormat::Flac),
        [b'I', b'D', b'3', ..] => Some(AudioFormat::Mp3),
        [0xff, second, ..] if second & 0xe0 == 0xe0 => Some(AudioFormat::Mp3),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct TerminalAudioBackend {
    /// Every playback ever started, for the stray sweep.
    playbacks: Arc<Mutex<Vec<CancellationToken>>>,
}

impl TerminalAudioBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AudioBackend for TerminalAudioBackend {
    async fn decode(&self, payload: Bytes) -> Result<Box<dyn PlayableAudio>, CapabilityError> {
        let format = sniff_format(&payload)
            .ok_or_else(|| CapabilityError::transient("decoder", "unrecognized audio format"))?;
        debug!(?format, bytes = payload.len(), "Decoded custom sound");

        Ok(Box::new(Bell::new(self.playbacks.clone(), MEDIA_PERIOD, true)))
    }

    fn tone(&self, spec: ToneSpec) -> Result<Box<dyn ToneContext>, CapabilityError> {
        Ok(Box::new(Bell::new(
            self.playbacks.clone(),
            TONE_PERIOD,
            spec.is_audible(),
        )))
    }

    fn sweep_stray_media(&self) -> usize {
        let mut playbacks = self.playbacks.lock();
        let running = playbacks.iter().filter(|t| !t.is_cancelled()).count();
        for token in playbacks.drain(..) {
            token.cancel();
        }
        running
    }
}

/// One bell loop. Serves as both media handle and tone context.
struct Bell {
    playbacks: Arc<Mutex<Vec<CancellationToken>>>,
    period: Duration,
    audible: bool,
    running: Option<CancellationToken>,
}

impl Bell {
    fn new(playbacks: Arc<Mutex<Vec<CancellationToken>>>, period: Duration, audible: bool) -> Self {
        Self {
            playbacks,
            period,
            audible,
            running: None,
        }
    }

    fn start_loop(&mut self) -> Result<(), CapabilityError> {
        if self.running.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| CapabilityError::Unsupported(Capability::Audio))?;

        let token = CancellationToken::new();
        {
            let mut playbacks = self.playbacks.lock();
            playbacks.retain(|t| !t.is_cancelled());
            playbacks.push(token.clone());
        }

        if self.audible {
            runtime.spawn(ring(token.clone(), self.period));
        }
        self.running = Some(token);
        Ok(())
    }

    fn stop_loop(&mut self) {
        if let Some(token) = self.running.take() {
            token.cancel();
        }
    }
}

impl PlayableAudio for Bell {
    fn play(&mut self) -> Result<(), CapabilityError> {
        self.start_loop()
    }

    fn stop(&mut self) -> Result<(), CapabilityError> {
        self.stop_loop();
        Ok(())
    }
}

impl ToneContext for Bell {
    fn start(&mut self) -> Result<(), CapabilityError> {
        self.start_loop()
    }

    fn close(&mut self) -> Result<(), CapabilityError> {
        self.stop_loop();
        Ok(())
    }
}

impl Drop for Bell {
    fn drop(&mut self) {
        self.stop_loop();
    }
}

async fn ring(token: CancellationToken, period: Duration) {
    let mut interval = tokio::time::interval(period);
    let mut stderr = tokio::io::stderr();

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                if stderr.write_all(BELL).await.is_err() {
                    break;
                }
                let _ = stderr.flush().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(b"RIFF\x24\x00\x00\x00WAVEfmt ", Some(AudioFormat::Wav); "wav")]
    #[test_case(b"OggS\x00\x02", Some(AudioFormat::Ogg); "ogg")]
    #[test_case(b"fLaC\x00\x00", Some(AudioFormat::Flac); "flac")]
    #[test_case(b"ID3\x04\x00", Some(AudioFormat::Mp3); "mp3 with id3")]
    #[test_case(b"\xff\xfb\x90\x00", Some(AudioFormat::Mp3); "mp3 frame sync")]
    #[test_case(b"RIFF\x24\x00\x00\x00AVI ", None; "riff but not wave")]
    #[test_case(b"hello", None; "text")]
    #[test_case(b"", None; "empty")]
    fn sniffs_container(payload: &[u8], expected: Option<AudioFormat>) {
        assert_eq!(sniff_format(payload), expected);
    }

    #[tokio::test]
    async fn decode_rejects_unknown_payload() {
        let backend = TerminalAudioBackend::new();
        assert!(backend.decode(Bytes::from_static(b"nope")).await.is_err());
    }

    #[tokio::test]
    async fn sweep_stops_forgotten_playback() {
        let backend = TerminalAudioBackend::new();
        let mut media = backend
            .decode(Bytes::from_static(b"OggS\x00\x02"))
            .await
            .unwrap();
        media.play().unwrap();

        // The handle escapes tracking; only the sweep can reach it.
        std::mem::forget(media);

        assert_eq!(backend.sweep_stray_media(), 1);
        assert_eq!(backend.sweep_stray_media(), 0);
    }

    #[tokio::test]
    async fn stopped_playback_is_not_a_stray() {
        let backend = TerminalAudioBackend::new();
        let mut tone = backend.tone(ToneSpec::NEAR_SILENT).unwrap();
        tone.start().unwrap();
        tone.close().unwrap();
        tone.close().unwrap();

        assert_eq!(backend.sweep_stray_media(), 0);
    }
}
