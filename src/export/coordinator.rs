use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use super::encode::{encoder_for, VideoEncoder};
use super::metadata::SessionMetadata;
#[cfg(feature = "overlay")]
use super::overlay::OverlayRenderer;
use super::report::write_report;
use super::{ExportedArtifacts, SessionExporter, SessionRecording};
use crate::config::PosecamConfig;
use crate::error::{ExportError, Result};
use crate::frame::Frame;
use crate::session::SessionId;

/// Writes `video_<id>.<ext>` and `data_<id>.csv` (plus an optional
/// `session_<id>.json`) into one output directory
pub struct ExportCoordinator {
    output_dir: PathBuf,
    fps: u32,
    encoder: Box<dyn VideoEncoder>,
    #[cfg(feature = "overlay")]
    overlay: Option<OverlayRenderer>,
    save_metadata: bool,
}

impl ExportCoordinator {
    pub fn new(output_dir: impl Into<PathBuf>, fps: u32, encoder: Box<dyn VideoEncoder>) -> Self {
        Self {
            output_dir: output_dir.into(),
            fps: fps.max(1),
            encoder,
            #[cfg(feature = "overlay")]
            overlay: None,
            save_metadata: false,
        }
    }

    #[cfg(feature = "overlay")]
    pub fn with_overlay(mut self, overlay: OverlayRenderer) -> Self {
        self.overlay = Some(overlay);
        self
    }

    pub fn with_metadata(mut self, save_metadata: bool) -> Self {
        self.save_metadata = save_metadata;
        self
    }

    /// Build the coordinator described by the `[export]` section
    pub fn from_config(config: &PosecamConfig) -> Result<Self> {
        let export = &config.export;
        let coordinator = Self::new(
            &export.path,
            config.session.cadence_fps,
            encoder_for(export),
        )
        .with_metadata(export.save_metadata);

        #[cfg(feature = "overlay")]
        let coordinator = if export.overlay {
            let timezone = crate::session::resolve_timezone(&config.session.timezone);
            let overlay = OverlayRenderer::load(
                Path::new(&export.overlay_font_path),
                export.overlay_font_size,
                timezone,
            )?;
            coordinator.with_overlay(overlay)
        } else {
            coordinator
        };

        #[cfg(not(feature = "overlay"))]
        if export.overlay {
            warn!("Overlay requested but the overlay feature is disabled; exporting plain frames");
        }

        Ok(coordinator)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn video_path(&self, session_id: &SessionId) -> PathBuf {
        self.output_dir
            .join(format!("video_{}.{}", session_id, self.encoder.extension()))
    }

    pub fn report_path(&self, session_id: &SessionId) -> PathBuf {
        self.output_dir.join(format!("data_{}.csv", session_id))
    }

    pub fn metadata_path(&self, session_id: &SessionId) -> PathBuf {
        self.output_dir.join(format!("session_{}.json", session_id))
    }

    /// `session_id`, or the first suffixed form of it whose artifact names
    /// are all free in the output directory
    fn artifact_id(&self, session_id: &SessionId) -> SessionId {
        let taken = |id: &SessionId| {
            [self.video_path(id), self.report_path(id), self.metadata_path(id)]
                .iter()
                .any(|path| path.symlink_metadata().is_ok())
        };
        if !taken(session_id) {
            return session_id.clone();
        }

        let mut suffix = 1;
        let mut candidate = session_id.with_suffix(suffix);
        while taken(&candidate) {
            suffix += 1;
            candidate = session_id.with_suffix(suffix);
        }
        warn!(
            "Artifacts for session {} already exist in {}; writing them as {}",
            session_id,
            self.output_dir.display(),
            candidate
        );
        candidate
    }

    fn prepare_frames<'a>(&self, frames: &'a [Frame]) -> std::borrow::Cow<'a, [Frame]> {
        #[cfg(feature = "overlay")]
        if let Some(overlay) = &self.overlay {
            return std::borrow::Cow::Owned(
                frames
                    .iter()
                    .enumerate()
                    .map(|(index, frame)| overlay.render(frame, index))
                    .collect(),
            );
        }
        std::borrow::Cow::Borrowed(frames)
    }
}

impl SessionExporter for ExportCoordinator {
    fn export(&mut self, recording: SessionRecording) -> std::result::Result<ExportedArtifacts, ExportError> {
        if recording.frames.is_empty() {
            info!("Session {} has no frames; skipping export", recording.session_id);
            return Err(ExportError::EmptySession);
        }

        if let Err(e) = std::fs::create_dir_all(&self.output_dir) {
            return Err(ExportError::video_failure(
                self.video_path(&recording.session_id),
                format!(
                    "Failed to create output directory {}: {}",
                    self.output_dir.display(),
                    e
                ),
            ));
        }

        // Existing files from another run are never overwritten
        let artifact_id = self.artifact_id(&recording.session_id);
        let video_path = self.video_path(&artifact_id);
        let report_path = self.report_path(&artifact_id);

        info!(
            "Exporting session {}: {} frames, {} missing measurements",
            recording.session_id,
            recording.frames.len(),
            recording.missing_measurements()
        );

        let frames = self.prepare_frames(&recording.frames);
        let video_result = self.encoder.encode(&frames, self.fps, &video_path);
        drop(frames);

        // The report is written even when the video failed
        let report_result = write_report(&report_path, &recording.frames, &recording.measurements);

        let (frames_written, rows_written) = match (video_result, report_result) {
            (Ok(frames_written), Ok(rows_written)) => (frames_written, rows_written),
            (Err(video_error), report_result) => {
                error!("Video export failed: {}", video_error);
                let report = match report_result {
                    Ok(_) => Some(report_path),
                    Err(e) => {
                        error!("Report export failed: {}", e);
                        None
                    }
                };
                return Err(match video_error {
                    ExportError::VideoWriteFailure { path, details, .. } => {
                        ExportError::VideoWriteFailure {
                            path,
                            details,
                            report,
                        }
                    }
                    other => other,
                });
            }
            (Ok(_), Err(e)) => {
                error!("Report export failed: {}", e);
                return Err(ExportError::ReportWriteFailure {
                    path: report_path,
                    video: video_path,
                    details: e.to_string(),
                });
            }
        };

        let metadata = if self.save_metadata {
            let path = self.metadata_path(&artifact_id);
            let metadata = SessionMetadata::from_recording(
                &recording,
                self.fps,
                self.encoder.extension(),
                &video_path,
                &report_path,
            );
            match metadata.save(&path) {
                Ok(()) => Some(path),
                Err(e) => {
                    warn!("Failed to write session metadata {}: {}", path.display(), e);
                    None
                }
            }
        } else {
            None
        };

        info!(
            "Session {} exported: {} and {}",
            recording.session_id,
            video_path.display(),
            report_path.display()
        );

        Ok(ExportedArtifacts {
            session_id: artifact_id,
            video: video_path,
            report: report_path,
            metadata,
            frames_written,
            rows_written,
        })
    }
}
