use chrono_tz::Tz;
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

use super::id::resolve_timezone;
use super::types::{
    FinishReason, FrameUpdate, FrameWarning, SessionReport, SessionState, SessionStats, TickOutcome,
};
use super::SessionId;
use crate::analysis::{FrameAnalyzer, Measurement};
use crate::config::SessionConfig;
use crate::error::{ExportError, PosecamError, Result};
use crate::export::{SessionExporter, SessionRecording};
use crate::frame::Frame;
use crate::source::{FrameSource, SourceDescriptor, SourceOpener};
use crate::transform::TransformState;

/// Buffers and source of the active session
struct Session {
    id: SessionId,
    started_at: SystemTime,
    descriptor: SourceDescriptor,
    source: Box<dyn FrameSource>,
    transform: TransformState,
    frames: Vec<Frame>,
    /// Index-aligned with `frames`
    measurements: Vec<Measurement>,
}

enum Lifecycle {
    Idle,
    Active(Box<Session>),
    /// Only observable while `finish` hands buffers to the exporter
    Finishing,
}

/// Acquire → transform → analyze → accumulate, one frame per `tick`.
///
/// The pipeline has no timer of its own; a driver calls [`tick`] at the
/// acquisition cadence and [`finish`] exports the session synchronously.
///
/// [`tick`]: SessionPipeline::tick
/// [`finish`]: SessionPipeline::finish
pub struct SessionPipeline {
    config: SessionConfig,
    timezone: Tz,
    opener: Box<dyn SourceOpener>,
    analyzer: Box<dyn FrameAnalyzer>,
    exporter: Box<dyn SessionExporter>,
    lifecycle: Lifecycle,
    last_base_id: Option<SessionId>,
    id_collisions: u32,
    stats: SessionStats,
}

impl SessionPipeline {
    pub fn new(
        config: SessionConfig,
        opener: Box<dyn SourceOpener>,
        analyzer: Box<dyn FrameAnalyzer>,
        exporter: Box<dyn SessionExporter>,
    ) -> Self {
        let timezone = resolve_timezone(&config.timezone);
        Self {
            config,
            timezone,
            opener,
            analyzer,
            exporter,
            lifecycle: Lifecycle::Idle,
            last_base_id: None,
            id_collisions: 0,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        match self.lifecycle {
            Lifecycle::Idle => SessionState::Idle,
            Lifecycle::Active(_) => SessionState::Active,
            Lifecycle::Finishing => SessionState::Finishing,
        }
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        match &self.lifecycle {
            Lifecycle::Active(session) => Some(&session.id),
            _ => None,
        }
    }

    pub fn transform_state(&self) -> Option<TransformState> {
        match &self.lifecycle {
            Lifecycle::Active(session) => Some(session.transform),
            _ => None,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.buffered_frames().len()
    }

    /// Frames buffered by the active session, in acquisition order
    pub fn buffered_frames(&self) -> &[Frame] {
        match &self.lifecycle {
            Lifecycle::Active(session) => &session.frames,
            _ => &[],
        }
    }

    pub fn measurement_count(&self) -> usize {
        match &self.lifecycle {
            Lifecycle::Active(session) => session.measurements.len(),
            _ => 0,
        }
    }

    /// Counters of the active session, or of the last one once idle
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Open `descriptor` and begin a new session.
    ///
    /// An active session is torn down first: its source is closed and its
    /// buffers are discarded without export. On failure the pipeline is idle.
    pub fn start(&mut self, descriptor: &SourceDescriptor) -> Result<SessionId> {
        if let Lifecycle::Active(mut previous) =
            std::mem::replace(&mut self.lifecycle, Lifecycle::Idle)
        {
            warn!(
                "Discarding session {} ({} frames) to start {}",
                previous.id,
                previous.frames.len(),
                descriptor
            );
            previous.source.close();
        }

        let source = self.opener.open(descriptor).map_err(|e| {
            error!("Failed to open source {}: {}", descriptor, e);
            e
        })?;

        self.analyzer.reset();
        self.stats = SessionStats::default();

        let started_at = SystemTime::now();
        let id = self.next_session_id(started_at);
        info!("Session {} started from {}", id, descriptor);

        self.lifecycle = Lifecycle::Active(Box::new(Session {
            id: id.clone(),
            started_at,
            descriptor: descriptor.clone(),
            source,
            transform: TransformState::default(),
            frames: Vec::new(),
            measurements: Vec::new(),
        }));

        Ok(id)
    }

    /// Acquire, transform, analyze and buffer one frame.
    ///
    /// End of stream, a read failure or the configured frame limit finish
    /// the session during the tick and return [`TickOutcome::Finished`].
    pub fn tick(&mut self) -> Result<TickOutcome> {
        let state = self.state();
        let Lifecycle::Active(session) = &mut self.lifecycle else {
            return Err(PosecamError::InvalidState {
                operation: "tick",
                state,
            });
        };

        let limit = self.config.max_session_frames;
        let reason = if limit > 0 && session.frames.len() >= limit {
            FinishReason::FrameLimit
        } else {
            match session.source.read() {
                Ok(Some(raw)) => {
                    let update =
                        accumulate(session, raw, self.analyzer.as_mut(), &mut self.stats);
                    return Ok(TickOutcome::Frame(update));
                }
                Ok(None) => {
                    if session.descriptor.is_live() {
                        warn!("Session {} camera stream ended", session.id);
                    }
                    FinishReason::EndOfStream
                }
                Err(e) => {
                    warn!("Session {} source read failed: {}", session.id, e);
                    self.stats.read_failures += 1;
                    FinishReason::ReadFailure(e)
                }
            }
        };

        info!("Session {} auto-finishing: {}", session.id, reason);
        self.finish_active(reason)
            .map(TickOutcome::Finished)
            .ok_or(PosecamError::InvalidState {
                operation: "tick",
                state,
            })
    }

    pub fn toggle_mirror(&mut self) -> Result<TransformState> {
        self.update_transform("toggle mirror", TransformState::toggle_mirror)
    }

    pub fn toggle_rotate(&mut self) -> Result<TransformState> {
        self.update_transform("toggle rotation", TransformState::toggle_rotate)
    }

    /// Close the source and export the session.
    ///
    /// Returns `None` when no session is active; the exporter is not invoked.
    /// Otherwise the pipeline is idle afterwards whatever the export outcome.
    pub fn finish(&mut self) -> Option<SessionReport> {
        let report = self.finish_active(FinishReason::Requested);
        if report.is_none() {
            debug!("Finish requested while {}; nothing to export", self.state());
        }
        report
    }

    fn update_transform(
        &mut self,
        operation: &'static str,
        toggle: fn(&mut TransformState),
    ) -> Result<TransformState> {
        let state = self.state();
        match &mut self.lifecycle {
            Lifecycle::Active(session) => {
                toggle(&mut session.transform);
                info!("Session {} transform: {}", session.id, session.transform);
                Ok(session.transform)
            }
            _ => Err(PosecamError::InvalidState { operation, state }),
        }
    }

    fn finish_active(&mut self, reason: FinishReason) -> Option<SessionReport> {
        let mut session = match std::mem::replace(&mut self.lifecycle, Lifecycle::Finishing) {
            Lifecycle::Active(session) => session,
            other => {
                self.lifecycle = other;
                return None;
            }
        };

        session.source.close();

        let Session {
            id,
            started_at,
            descriptor,
            frames,
            measurements,
            ..
        } = *session;

        let recording = SessionRecording {
            session_id: id.clone(),
            source: descriptor.to_string(),
            started_at,
            finished_at: SystemTime::now(),
            frames,
            measurements,
        };
        let frame_count = recording.frames.len();
        let missing_measurements = recording.missing_measurements();

        info!(
            "Finishing session {} ({}): {} frames, {} missing measurements",
            id, reason, frame_count, missing_measurements
        );

        let export = self.exporter.export(recording);
        match &export {
            Ok(artifacts) => info!(
                "Session {} exported to {} and {}",
                id,
                artifacts.video.display(),
                artifacts.report.display()
            ),
            Err(ExportError::EmptySession) => info!("Session {} had no frames to export", id),
            Err(e) => error!("Session {} export failed: {}", id, e),
        }

        self.lifecycle = Lifecycle::Idle;

        Some(SessionReport {
            session_id: id,
            reason,
            frames: frame_count,
            missing_measurements,
            export,
        })
    }

    /// Time-based id, suffixed when it repeats the previous session's
    fn next_session_id(&mut self, started_at: SystemTime) -> SessionId {
        let base = SessionId::from_time(started_at, &self.timezone);
        if self.last_base_id.as_ref() == Some(&base) {
            self.id_collisions += 1;
            base.with_suffix(self.id_collisions)
        } else {
            self.id_collisions = 0;
            self.last_base_id = Some(base.clone());
            base
        }
    }
}

/// Transform and analyze `raw`, appending exactly one frame and one
/// measurement to the session
fn accumulate(
    session: &mut Session,
    raw: Frame,
    analyzer: &mut dyn FrameAnalyzer,
    stats: &mut SessionStats,
) -> FrameUpdate {
    let frame_index = session.frames.len();
    let transformed = session.transform.apply(&raw);

    let (frame, measurement, warning) = match analyzer.analyze(&transformed) {
        Ok(analysis) => (
            analysis.annotated,
            Measurement::Recorded(analysis.record),
            None,
        ),
        Err(error) => {
            warn!(
                "Session {} analysis failed for frame {}: {}",
                session.id, frame_index, error
            );
            stats.analysis_failures += 1;
            let measurement = Measurement::Missing {
                reason: error.to_string(),
            };
            (
                transformed,
                measurement,
                Some(FrameWarning { frame_index, error }),
            )
        }
    };

    session.frames.push(frame.clone());
    session.measurements.push(measurement);
    stats.frames_buffered = session.frames.len();

    debug!(
        "Session {} buffered frame {} (source id {})",
        session.id, frame_index, raw.id
    );

    FrameUpdate {
        frame_index,
        frame,
        warning,
    }
}

impl Drop for SessionPipeline {
    fn drop(&mut self) {
        if let Lifecycle::Active(session) = &mut self.lifecycle {
            debug!("Closing source of unfinished session {}", session.id);
            session.source.close();
        }
    }
}
