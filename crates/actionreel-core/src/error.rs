//! Structured errors, serializable so the CLI can hand them to callers as JSON

use serde::{Deserialize, Serialize};
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// An edit was refused because applying it would drop most of a recording.
    ParseRejected,
    /// The input-synthesis backend is gone; nothing further can be replayed.
    SynthUnavailable,
    ActionFailed,
    AlreadyRunning,
    NotRecording,
    GroupNotFound,
    Storage,
    NotImplemented,
    Unknown,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            suggestions: Vec::new(),
            context: None,
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn parse_rejected(original: usize, parsed: usize) -> Self {
        Self::new(
            ErrorCode::ParseRejected,
            format!(
                "Could not safely apply edits: only {} of {} actions parsed",
                parsed, original
            ),
        )
        .with_suggestions(vec![
            "Keep one action per line in the exported format".to_string(),
            "Re-export the group and edit a fresh copy".to_string(),
        ])
        .with_context(serde_json::json!({ "original": original, "parsed": parsed }))
    }

    pub fn synth_unavailable(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::SynthUnavailable, reason)
    }

    pub fn action_failed(action: &str, reason: &str) -> Self {
        Self::new(
            ErrorCode::ActionFailed,
            format!("{} failed: {}", action, reason),
        )
    }

    pub fn already_running(group: &str) -> Self {
        Self::new(
            ErrorCode::AlreadyRunning,
            format!("Replay already running for: {}", group),
        )
    }

    pub fn group_not_found(name: &str) -> Self {
        Self::new(ErrorCode::GroupNotFound, format!("No action group named: {}", name))
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Storage, message)
    }

    /// True when the failure means the backend itself is gone, not just one event.
    pub fn is_fatal(&self) -> bool {
        self.code == ErrorCode::SynthUnavailable
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for Error {}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Self::new(ErrorCode::Unknown, e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorCode::Storage, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_code_in_screaming_case() {
        let e = Error::parse_rejected(100, 3);
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["code"], "PARSE_REJECTED");
        assert_eq!(json["context"]["original"], 100);
        assert!(!e.suggestions.is_empty());
    }

    #[test]
    fn only_synth_unavailable_is_fatal() {
        assert!(Error::synth_unavailable("gone").is_fatal());
        assert!(!Error::action_failed("press", "busy").is_fatal());
    }
}
