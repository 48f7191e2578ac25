use actionreel_core::{Error, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Already recording")]
    AlreadyRecording,

    #[error("Not recording")]
    NotRecording,

    #[error("Failed to spawn capture thread: {0}")]
    Spawn(std::io::Error),

    #[error("Capture thread panicked")]
    CaptureThreadPanicked,

    #[error("Replay already running for: {0}")]
    ReplayActive(String),

    #[error("Replay task ended abnormally: {0}")]
    ReplayTask(String),

    #[error("No action group named: {0}")]
    GroupNotFound(String),

    #[error("An active group is already named: {0}")]
    NameTaken(String),

    #[error("Could not safely apply edits: parsed {parsed} of {original} actions")]
    EditRejected { original: usize, parsed: usize },

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type RecorderResult<T> = std::result::Result<T, RecorderError>;

impl From<RecorderError> for Error {
    fn from(e: RecorderError) -> Self {
        match e {
            RecorderError::EditRejected { original, parsed } => {
                Error::parse_rejected(original, parsed)
            }
            RecorderError::ReplayActive(name) => Error::already_running(&name),
            RecorderError::GroupNotFound(name) => Error::group_not_found(&name),
            RecorderError::NotRecording => Error::new(ErrorCode::NotRecording, "Not recording"),
            RecorderError::Storage(inner) => Error::storage(format!("{:#}", inner)),
            other => Error::new(ErrorCode::Unknown, other.to_string()),
        }
    }
}
