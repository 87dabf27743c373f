pub mod api_client;
pub mod artifact;
pub mod config;
pub mod download;
pub mod error;
pub mod progress;
pub mod qa;
pub mod recording;
pub mod session;
pub mod upload;

// Re-export key components for easier access
pub use api_client::ApiClient;
pub use artifact::{AudioArtifact, DocumentArtifact};
pub use config::{read_app_config, AppConfig};
pub use error::{Error, Result};
pub use progress::{decode_progress, PipelineStage, ProgressEvent, StageTracker};
pub use qa::{QaClient, QaSettings, SettingsStore};
pub use recording::VoiceRecorder;
pub use session::SessionManager;
pub use upload::{RunHandle, UploadRequest, Uploader, VoiceCredentials, VoiceSource, VoiceTrack};
