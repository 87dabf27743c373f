use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use tracing::{debug, info};

use crate::api_client::{server_error_message, ApiClient};
use crate::artifact::{AudioArtifact, DocumentArtifact};
use crate::error::{Error, Result};

/// Acknowledgment marker the backend returns on a successful upload. The
/// misspelling is the server's; it is matched exactly.
const UPLOAD_ACK: &str = "successfuly uploaded";

/// Which kind of voice sample a custom-voice run carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceSource {
    Upload,
    Record,
}

impl VoiceSource {
    pub fn as_str(self) -> &'static str {
        match self {
            VoiceSource::Upload => "upload",
            VoiceSource::Record => "record",
        }
    }
}

/// Play.ht credential pair required for voice cloning.
#[derive(Debug, Clone)]
pub struct VoiceCredentials {
    pub api_key: String,
    pub user_id: String,
}

impl VoiceCredentials {
    fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.user_id.is_empty()
    }
}

/// Voice selection for a run. `Custom` carries everything the cloning path
/// needs; the artifact stays optional here so a half-filled form fails local
/// validation instead of panicking at assembly time.
#[derive(Debug, Clone)]
pub enum VoiceTrack {
    Default,
    Custom {
        artifact: Option<AudioArtifact>,
        source: VoiceSource,
        credentials: VoiceCredentials,
    },
}

/// The unit of work submitted to start a pipeline run.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub document: DocumentArtifact,
    pub voice: VoiceTrack,
}

/// One field of the multipart payload. Kept as data so the payload shape is
/// decided by a single exhaustive match and can be checked without a network.
#[derive(Debug)]
pub enum FormField {
    Text {
        name: &'static str,
        value: String,
    },
    File {
        name: &'static str,
        file_name: String,
        media_type: String,
        bytes: Vec<u8>,
    },
}

impl FormField {
    pub fn name(&self) -> &'static str {
        match self {
            FormField::Text { name, .. } => name,
            FormField::File { name, .. } => name,
        }
    }
}

impl UploadRequest {
    /// Local validation, run before any request is constructed. Order
    /// matters: missing audio is reported before missing credentials.
    pub fn validate(&self) -> Result<()> {
        if let VoiceTrack::Custom {
            artifact,
            credentials,
            ..
        } = &self.voice
        {
            if artifact.is_none() {
                return Err(Error::Validation("No audio file found.".to_string()));
            }
            if !credentials.is_complete() {
                return Err(Error::Validation(
                    "Please set your playht key and id.".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Flattens the request into multipart fields. The default track never
    /// produces voice-related fields; the server distinguishes "no custom
    /// fields sent" from "custom fields sent but empty".
    pub fn multipart_fields(self) -> Vec<FormField> {
        let mut fields = vec![FormField::File {
            name: "pdf_file",
            file_name: self.document.file_name,
            media_type: "application/pdf".to_string(),
            bytes: self.document.bytes,
        }];
        match self.voice {
            VoiceTrack::Default => {
                fields.push(FormField::Text {
                    name: "voice_type",
                    value: "default".to_string(),
                });
            }
            VoiceTrack::Custom {
                artifact,
                source,
                credentials,
            } => {
                fields.push(FormField::Text {
                    name: "voice_type",
                    value: "custom".to_string(),
                });
                // validate() guarantees the artifact is present by the time
                // a request is assembled.
                if let Some(artifact) = artifact {
                    fields.push(FormField::File {
                        name: "audio_file",
                        file_name: artifact.file_name,
                        media_type: artifact.media_type,
                        bytes: artifact.bytes,
                    });
                }
                fields.push(FormField::Text {
                    name: "voice_source",
                    value: source.as_str().to_string(),
                });
                fields.push(FormField::Text {
                    name: "playht_api_key",
                    value: credentials.api_key,
                });
                fields.push(FormField::Text {
                    name: "playht_user_id",
                    value: credentials.user_id,
                });
            }
        }
        fields
    }

    fn into_form(self) -> Result<Form> {
        let mut form = Form::new();
        for field in self.multipart_fields() {
            form = match field {
                FormField::Text { name, value } => form.text(name, value),
                FormField::File {
                    name,
                    file_name,
                    media_type,
                    bytes,
                } => {
                    let part = Part::bytes(bytes)
                        .file_name(file_name)
                        .mime_str(&media_type)
                        .map_err(|e| Error::Validation(format!("invalid media type: {}", e)))?;
                    form.part(name, part)
                }
            };
        }
        Ok(form)
    }
}

/// Handle for one started pipeline run. Not `Clone`: the progress monitor
/// consumes it, so a second channel for the same run cannot be opened.
#[derive(Debug)]
pub struct RunHandle {
    pub(crate) api: ApiClient,
}

/// Builds and submits the upload request that starts a pipeline run.
pub struct Uploader {
    api: ApiClient,
    session_established: Arc<AtomicBool>,
}

impl Uploader {
    pub fn new(api: ApiClient, session_established: Arc<AtomicBool>) -> Self {
        Self {
            api,
            session_established,
        }
    }

    /// Validates locally, submits the multipart payload in a single request,
    /// and hands back a [`RunHandle`] once the server acknowledges. Does not
    /// open the progress channel itself.
    pub async fn submit(&self, request: UploadRequest) -> Result<RunHandle> {
        request.validate()?;

        debug!(document = %request.document.file_name, "submitting upload");
        let response = self
            .api
            .post_multipart("/upload_file", request.into_form()?)
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            // Session cookie no longer carries a key; force re-setup.
            self.session_established.store(false, Ordering::Relaxed);
            return Err(Error::SessionExpired);
        }
        if !response.status().is_success() {
            return Err(Error::UploadRejected(server_error_message(response).await));
        }

        let body: serde_json::Value = response.json().await?;
        if let Some(error) = body.get("error").and_then(|e| e.as_str()) {
            return Err(Error::UploadRejected(error.to_string()));
        }
        match body.get("msg").and_then(|m| m.as_str()) {
            Some(msg) if msg == UPLOAD_ACK => {
                info!("upload acknowledged, run started");
                Ok(RunHandle {
                    api: self.api.clone(),
                })
            }
            _ => Err(Error::ProtocolViolation(
                "missing upload acknowledgment".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> DocumentArtifact {
        DocumentArtifact {
            bytes: vec![0x25, 0x50, 0x44, 0x46],
            file_name: "lecture.pdf".to_string(),
        }
    }

    fn voice_sample() -> AudioArtifact {
        AudioArtifact {
            bytes: vec![1, 2, 3],
            media_type: "audio/mpeg".to_string(),
            file_name: "voice.mp3".to_string(),
        }
    }

    fn credentials() -> VoiceCredentials {
        VoiceCredentials {
            api_key: "pk".to_string(),
            user_id: "uid".to_string(),
        }
    }

    #[test]
    fn custom_without_audio_fails_before_credentials() {
        let request = UploadRequest {
            document: document(),
            voice: VoiceTrack::Custom {
                artifact: None,
                source: VoiceSource::Record,
                credentials: VoiceCredentials {
                    api_key: String::new(),
                    user_id: String::new(),
                },
            },
        };
        match request.validate() {
            Err(Error::Validation(msg)) => assert_eq!(msg, "No audio file found."),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn custom_with_incomplete_credentials_fails() {
        let request = UploadRequest {
            document: document(),
            voice: VoiceTrack::Custom {
                artifact: Some(voice_sample()),
                source: VoiceSource::Upload,
                credentials: VoiceCredentials {
                    api_key: "pk".to_string(),
                    user_id: String::new(),
                },
            },
        };
        match request.validate() {
            Err(Error::Validation(msg)) => {
                assert_eq!(msg, "Please set your playht key and id.")
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn default_voice_payload_has_no_voice_fields() {
        let request = UploadRequest {
            document: document(),
            voice: VoiceTrack::Default,
        };
        assert!(request.validate().is_ok());
        let names: Vec<_> = request
            .multipart_fields()
            .iter()
            .map(|f| f.name())
            .collect();
        assert_eq!(names, vec!["pdf_file", "voice_type"]);
    }

    #[test]
    fn custom_voice_payload_carries_all_fields() {
        let request = UploadRequest {
            document: document(),
            voice: VoiceTrack::Custom {
                artifact: Some(voice_sample()),
                source: VoiceSource::Record,
                credentials: credentials(),
            },
        };
        assert!(request.validate().is_ok());
        let fields = request.multipart_fields();
        let names: Vec<_> = fields.iter().map(|f| f.name()).collect();
        assert_eq!(
            names,
            vec![
                "pdf_file",
                "voice_type",
                "audio_file",
                "voice_source",
                "playht_api_key",
                "playht_user_id"
            ]
        );
        let source = fields.iter().find_map(|f| match f {
            FormField::Text { name, value } if *name == "voice_source" => Some(value.clone()),
            _ => None,
        });
        assert_eq!(source.as_deref(), Some("record"));
    }
}
