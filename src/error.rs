use std::path::PathBuf;
use thiserror::Error;

use crate::session::SessionState;

#[derive(Error, Debug)]
pub enum PosecamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl PosecamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Capture origin failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// The origin could not be opened; fatal to `start`
    #[error("Source '{descriptor}' is unavailable: {details}")]
    Unavailable { descriptor: String, details: String },

    /// A frame could not be read from an open origin
    #[error("Failed to read from source '{descriptor}': {details}")]
    ReadFailure { descriptor: String, details: String },
}

impl SourceError {
    pub fn unavailable(descriptor: impl ToString, details: impl Into<String>) -> Self {
        Self::Unavailable {
            descriptor: descriptor.to_string(),
            details: details.into(),
        }
    }

    pub fn read_failure(descriptor: impl ToString, details: impl Into<String>) -> Self {
        Self::ReadFailure {
            descriptor: descriptor.to_string(),
            details: details.into(),
        }
    }
}

/// Per-frame analyzer failures. Never fatal to a session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Invalid frame: {details}")]
    InvalidFrame { details: String },

    #[error("Frame processing failed: {details}")]
    FrameProcessing { details: String },
}

/// Failures while persisting a finished session
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExportError {
    #[error("Session has no frames; nothing was exported")]
    EmptySession,

    /// The video is unusable; `report` is set when the report was still written
    #[error("Failed to write video '{}': {details}", path.display())]
    VideoWriteFailure {
        path: PathBuf,
        details: String,
        report: Option<PathBuf>,
    },

    /// The video at `video` was written and is usable; the report is not
    #[error("Failed to write report '{}' (video '{}' was written): {details}", path.display(), video.display())]
    ReportWriteFailure {
        path: PathBuf,
        video: PathBuf,
        details: String,
    },
}

impl ExportError {
    pub fn video_failure(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        Self::VideoWriteFailure {
            path: path.into(),
            details: details.into(),
            report: None,
        }
    }

    /// Artifact that is usable despite the failure, if any
    pub fn usable_artifact(&self) -> Option<&PathBuf> {
        match self {
            ExportError::ReportWriteFailure { video, .. } => Some(video),
            ExportError::VideoWriteFailure { report, .. } => report.as_ref(),
            ExportError::EmptySession => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PosecamError>;
