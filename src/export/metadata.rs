use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::SessionRecording;

/// JSON sidecar describing an exported session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionMetadata {
    pub session_id: String,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub frame_count: usize,
    pub missing_measurements: usize,
    pub fps: u32,
    pub video_format: String,
    pub video: PathBuf,
    pub report: PathBuf,
}

impl SessionMetadata {
    pub fn from_recording(
        recording: &SessionRecording,
        fps: u32,
        video_format: &str,
        video: &Path,
        report: &Path,
    ) -> Self {
        Self {
            session_id: recording.session_id.to_string(),
            source: recording.source.clone(),
            started_at: DateTime::<Utc>::from(recording.started_at),
            finished_at: DateTime::<Utc>::from(recording.finished_at),
            frame_count: recording.frames.len(),
            missing_measurements: recording.missing_measurements(),
            fps,
            video_format: video_format.to_string(),
            video: video.to_path_buf(),
            report: report.to_path_buf(),
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        file.write_all(json.as_bytes())?;
        debug!("Saved metadata to {}", path.display());
        Ok(())
    }
}
