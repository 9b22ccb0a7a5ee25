//! Session export.
//!
//! At finish the pipeline moves its buffers into a [`SessionRecording`] and
//! hands it to a [`SessionExporter`]. [`ExportCoordinator`] writes a video
//! and a CSV report that share the session id in their file names.

mod coordinator;
mod encode;
mod metadata;
#[cfg(feature = "overlay")]
mod overlay;
mod report;

pub use coordinator::ExportCoordinator;
pub use encode::{encoder_for, MjpegEncoder, Mp4Encoder, VideoEncoder};
pub use metadata::SessionMetadata;
#[cfg(feature = "overlay")]
pub use overlay::OverlayRenderer;
pub use report::{field_headers, report_columns, write_report};

use std::path::PathBuf;
use std::time::SystemTime;

use crate::analysis::Measurement;
use crate::error::ExportError;
use crate::frame::Frame;
use crate::session::SessionId;

/// Everything a finished session produced, moved out of the pipeline
#[derive(Debug)]
pub struct SessionRecording {
    pub session_id: SessionId,
    /// Display form of the source descriptor
    pub source: String,
    pub started_at: SystemTime,
    pub finished_at: SystemTime,
    pub frames: Vec<Frame>,
    /// Index-aligned with `frames`
    pub measurements: Vec<Measurement>,
}

impl SessionRecording {
    pub fn missing_measurements(&self) -> usize {
        self.measurements.iter().filter(|m| m.is_missing()).count()
    }
}

/// Paths of a successful export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedArtifacts {
    /// Id in the artifact names; suffixed when the session's own names were
    /// already taken in the output directory
    pub session_id: SessionId,
    pub video: PathBuf,
    pub report: PathBuf,
    pub metadata: Option<PathBuf>,
    pub frames_written: usize,
    pub rows_written: usize,
}

/// Persists a finished session. Blocking.
pub trait SessionExporter: Send {
    fn export(&mut self, recording: SessionRecording) -> Result<ExportedArtifacts, ExportError>;
}
