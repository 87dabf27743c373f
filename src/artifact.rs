use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// An opaque binary payload with its declared media type and filename.
/// Artifacts are moved between components, never copied implicitly.
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    pub bytes: Vec<u8>,
    pub media_type: String,
    pub file_name: String,
}

/// The slide deck submitted to start a pipeline run.
#[derive(Debug, Clone)]
pub struct DocumentArtifact {
    pub bytes: Vec<u8>,
    pub file_name: String,
}

impl DocumentArtifact {
    /// Loads a slide deck from disk. The backend only accepts PDF decks, so
    /// the extension is checked here before any bytes travel.
    pub fn from_pdf_path(path: &Path) -> Result<Self> {
        if path.extension().and_then(|e| e.to_str()) != Some("pdf") {
            return Err(Error::Validation(
                "Only PDF files are allowed".to_string(),
            ));
        }
        let bytes = fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("slides.pdf")
            .to_string();
        Ok(Self { bytes, file_name })
    }
}

impl AudioArtifact {
    /// Loads a previously chosen voice sample from disk.
    pub fn from_mp3_path(path: &Path) -> Result<Self> {
        if path.extension().and_then(|e| e.to_str()) != Some("mp3") {
            return Err(Error::Validation(
                "Voice samples must be MP3 files".to_string(),
            ));
        }
        let bytes = fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("voice.mp3")
            .to_string();
        Ok(Self {
            bytes,
            media_type: "audio/mpeg".to_string(),
            file_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_pdf_document() {
        let err = DocumentArtifact::from_pdf_path(Path::new("deck.pptx")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn rejects_non_mp3_voice_sample() {
        let err = AudioArtifact::from_mp3_path(Path::new("voice.ogg")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
