use thiserror::Error;

/// Failures surfaced by the client. Every variant maps to a single message
/// shown to the user; none of them are fatal to the process and no network
/// call is retried automatically.
#[derive(Debug, Error)]
pub enum Error {
    /// Local pre-request validation failure; the user must correct input.
    #[error("{0}")]
    Validation(String),

    /// The backend answered 401; the session cookie no longer carries a key.
    #[error("API key not set. Please set your API key first.")]
    SessionExpired,

    /// The upload was refused server-side; message passed through verbatim.
    #[error("{0}")]
    UploadRejected(String),

    /// The Q&A backend reported an error for this question.
    #[error("{0}")]
    AnswerError(String),

    /// The settings update was refused; committed settings stay unchanged.
    #[error("{0}")]
    SettingsRejected(String),

    /// The response had an unexpected shape (missing ack marker, empty
    /// extracted video location, non-JSON body where JSON was promised).
    #[error("invalid response from server: {0}")]
    ProtocolViolation(String),

    /// No capture device, or the platform denied microphone access.
    #[error("microphone unavailable: {0}")]
    DeviceUnavailable(String),

    /// The progress channel dropped before a terminal message arrived.
    #[error("{0}")]
    ChannelFailure(String),

    /// `ask` was called with a blank question; no request was sent.
    #[error("Question cannot be empty")]
    EmptyQuestion,

    /// The backend could not be reached during session bootstrap.
    #[error("Failed to connect to server. Make sure the backend is running")]
    Connectivity,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
