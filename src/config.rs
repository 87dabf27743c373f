use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default safety instructions applied to the Q&A chain until the user edits
/// them in the settings flow.
pub const DEFAULT_SAFETY_INSTRUCTIONS: &str = "1. Only answer questions related to the lecture content\n\
2. Do not provide personal opinions or biases\n\
3. Maintain professional and academic tone\n\
4. If unsure, acknowledge limitations";

/// Recording configuration for the voice-sample capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Capture sample rate in Hz.
    pub sample_rate: usize,
    /// PortAudio frames per callback.
    pub buffer_size: usize,
    /// How long to wait for trailing samples to drain after the stream is
    /// stopped, in milliseconds. Capture is finalized after this bound even
    /// if the device never flushes.
    pub settle_timeout_ms: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            buffer_size: 1024,
            settle_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the backend, including the `/api` prefix.
    pub base_url: String,
    /// Bound on the session bootstrap round-trip, in seconds. Bootstrap
    /// degrades to a connectivity error instead of hanging.
    pub bootstrap_timeout_secs: u64,
    /// Where downloaded videos are written.
    pub download_dir: String,
    /// Default Q&A content-relevance threshold (0.01-0.10).
    pub qa_threshold: f64,
    /// Voice recording configuration.
    pub recording: RecordingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            bootstrap_timeout_secs: 3,
            download_dir: ".".to_string(),
            qa_threshold: 0.04,
            recording: RecordingConfig::default(),
        }
    }
}

/// Helper function to read the application configuration
pub fn read_app_config() -> AppConfig {
    match std::fs::read_to_string("config.json") {
        Ok(config_str) => match serde_json::from_str(&config_str) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to parse config.json: {}. Using default configuration.",
                    e
                );
                AppConfig::default()
            }
        },
        Err(_) => AppConfig::default(),
    }
}
