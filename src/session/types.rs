use std::fmt;

use super::SessionId;
use crate::error::{AnalysisError, ExportError, SourceError};
use crate::export::ExportedArtifacts;
use crate::frame::Frame;

/// Pipeline lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Finishing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Active => "active",
            SessionState::Finishing => "finishing",
        };
        f.write_str(name)
    }
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum FinishReason {
    Requested,
    EndOfStream,
    ReadFailure(SourceError),
    FrameLimit,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishReason::Requested => f.write_str("finish requested"),
            FinishReason::EndOfStream => f.write_str("end of stream"),
            FinishReason::ReadFailure(e) => write!(f, "read failure ({})", e),
            FinishReason::FrameLimit => f.write_str("frame limit reached"),
        }
    }
}

/// Non-fatal analyzer failure for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameWarning {
    pub frame_index: usize,
    pub error: AnalysisError,
}

impl fmt::Display for FrameWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame {}: {}", self.frame_index, self.error)
    }
}

/// Latest buffered frame, for display
#[derive(Debug, Clone)]
pub struct FrameUpdate {
    pub frame_index: usize,
    pub frame: Frame,
    pub warning: Option<FrameWarning>,
}

#[derive(Debug)]
pub enum TickOutcome {
    Frame(FrameUpdate),
    /// The session ended during this tick and has been exported
    Finished(SessionReport),
}

/// Outcome of a finished session
#[derive(Debug)]
pub struct SessionReport {
    pub session_id: SessionId,
    pub reason: FinishReason,
    pub frames: usize,
    pub missing_measurements: usize,
    pub export: Result<ExportedArtifacts, ExportError>,
}

impl SessionReport {
    pub fn is_exported(&self) -> bool {
        self.export.is_ok()
    }
}

/// Counters for the current session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_buffered: usize,
    pub analysis_failures: usize,
    pub read_failures: usize,
}
