use super::*;
use crate::analysis::{Analysis, FrameAnalyzer, MeasurementRecord};
use crate::config::SessionConfig;
use crate::error::{AnalysisError, ExportError, PosecamError, SourceError};
use crate::export::{
    ExportCoordinator, ExportedArtifacts, MjpegEncoder, SessionExporter, SessionRecording,
};
use crate::frame::Frame;
use crate::source::{FrameSource, SourceDescriptor, SourceOpener, SyntheticSource};
use crate::transform::TransformState;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const WIDTH: u32 = 24;
const HEIGHT: u32 = 16;

type EventLog = Arc<Mutex<Vec<String>>>;

fn synthetic(frames: u64) -> SyntheticSource {
    SyntheticSource::new(frames, WIDTH, HEIGHT, Duration::from_millis(40))
}

/// Synthetic source that records closes and can fail after `fail_after` reads
struct LoggedSource {
    inner: SyntheticSource,
    log: EventLog,
    fail_after: Option<u64>,
}

impl FrameSource for LoggedSource {
    fn descriptor(&self) -> &SourceDescriptor {
        self.inner.descriptor()
    }

    fn read(&mut self) -> Result<Option<Frame>, SourceError> {
        if self.fail_after == Some(self.inner.frames_produced()) {
            return Err(SourceError::read_failure(self.descriptor(), "device unplugged"));
        }
        self.inner.read()
    }

    fn close(&mut self) {
        if self.inner.is_open() {
            self.log
                .lock()
                .unwrap()
                .push(format!("close:{}", self.inner.descriptor()));
        }
        self.inner.close();
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}

/// Opens `stub://N` sources; any file path is unavailable
struct TestOpener {
    log: EventLog,
    fail_after: Option<u64>,
}

impl SourceOpener for TestOpener {
    fn open(&mut self, descriptor: &SourceDescriptor) -> Result<Box<dyn FrameSource>, SourceError> {
        match descriptor {
            SourceDescriptor::Synthetic { frames } => {
                self.log.lock().unwrap().push(format!("open:{}", descriptor));
                Ok(Box::new(LoggedSource {
                    inner: synthetic(*frames),
                    log: self.log.clone(),
                    fail_after: self.fail_after,
                }))
            }
            _ => Err(SourceError::unavailable(descriptor, "no such device")),
        }
    }
}

/// Passes frames through unchanged; fails on the listed call indices
struct StubAnalyzer {
    calls: usize,
    fail_on: Vec<usize>,
    resets: Arc<Mutex<usize>>,
}

impl FrameAnalyzer for StubAnalyzer {
    fn analyze(&mut self, frame: &Frame) -> Result<Analysis, AnalysisError> {
        let call = self.calls;
        self.calls += 1;
        if self.fail_on.contains(&call) {
            return Err(AnalysisError::FrameProcessing {
                details: "no pose found".to_string(),
            });
        }
        let record = MeasurementRecord::new()
            .with("source_id", frame.id as f64)
            .with("knee_angle", 90.0 + call as f64);
        Ok(Analysis::new(frame.clone(), record))
    }

    fn reset(&mut self) {
        self.calls = 0;
        *self.resets.lock().unwrap() += 1;
    }
}

/// Records what it was asked to export without touching the filesystem
struct CountingExporter {
    exports: Arc<Mutex<Vec<(SessionId, usize, usize)>>>,
}

impl SessionExporter for CountingExporter {
    fn export(&mut self, recording: SessionRecording) -> Result<ExportedArtifacts, ExportError> {
        self.exports.lock().unwrap().push((
            recording.session_id.clone(),
            recording.frames.len(),
            recording.measurements.len(),
        ));
        if recording.frames.is_empty() {
            return Err(ExportError::EmptySession);
        }
        Ok(ExportedArtifacts {
            session_id: recording.session_id,
            video: "video.mjpeg".into(),
            report: "data.csv".into(),
            metadata: None,
            frames_written: recording.frames.len(),
            rows_written: recording.measurements.len(),
        })
    }
}

struct Harness {
    pipeline: SessionPipeline,
    log: EventLog,
    exports: Arc<Mutex<Vec<(SessionId, usize, usize)>>>,
    resets: Arc<Mutex<usize>>,
}

fn harness_with(config: SessionConfig, fail_on: Vec<usize>, fail_after: Option<u64>) -> Harness {
    let log = EventLog::default();
    let exports = Arc::new(Mutex::new(Vec::new()));
    let resets = Arc::new(Mutex::new(0));
    let pipeline = SessionPipeline::new(
        config,
        Box::new(TestOpener {
            log: log.clone(),
            fail_after,
        }),
        Box::new(StubAnalyzer {
            calls: 0,
            fail_on,
            resets: resets.clone(),
        }),
        Box::new(CountingExporter {
            exports: exports.clone(),
        }),
    );
    Harness {
        pipeline,
        log,
        exports,
        resets,
    }
}

fn harness() -> Harness {
    harness_with(SessionConfig::default(), Vec::new(), None)
}

fn stub(frames: u64) -> SourceDescriptor {
    SourceDescriptor::Synthetic { frames }
}

/// Pipeline exporting MJPEG + CSV into `dir`
fn exporting_pipeline(dir: &Path, fail_on: Vec<usize>) -> SessionPipeline {
    SessionPipeline::new(
        SessionConfig::default(),
        Box::new(TestOpener {
            log: EventLog::default(),
            fail_after: None,
        }),
        Box::new(StubAnalyzer {
            calls: 0,
            fail_on,
            resets: Arc::default(),
        }),
        Box::new(ExportCoordinator::new(dir, 30, Box::new(MjpegEncoder::new(85)))),
    )
}

/// Tick until the session ends, collecting warnings
fn run_to_end(pipeline: &mut SessionPipeline) -> (SessionReport, Vec<FrameWarning>) {
    let mut warnings = Vec::new();
    for _ in 0..1000 {
        match pipeline.tick().unwrap() {
            TickOutcome::Frame(update) => warnings.extend(update.warning),
            TickOutcome::Finished(report) => return (report, warnings),
        }
    }
    panic!("session never finished");
}

fn count_jpeg_markers(bytes: &[u8]) -> usize {
    bytes.windows(3).filter(|w| w == &[0xFF, 0xD8, 0xFF]).count()
}

fn report_rows(path: &Path) -> Vec<csv::StringRecord> {
    csv::Reader::from_path(path)
        .unwrap()
        .records()
        .map(|r| r.unwrap())
        .collect()
}

#[test]
fn test_operations_require_active_session() {
    let mut h = harness();
    assert_eq!(h.pipeline.state(), SessionState::Idle);

    assert!(matches!(
        h.pipeline.tick(),
        Err(PosecamError::InvalidState {
            operation: "tick",
            state: SessionState::Idle
        })
    ));
    assert!(matches!(
        h.pipeline.toggle_mirror(),
        Err(PosecamError::InvalidState { .. })
    ));
    assert!(matches!(
        h.pipeline.toggle_rotate(),
        Err(PosecamError::InvalidState { .. })
    ));
    assert!(h.pipeline.session_id().is_none());
    assert!(h.pipeline.transform_state().is_none());
}

#[test]
fn test_finish_while_idle_does_not_export() {
    let mut h = harness();
    assert!(h.pipeline.finish().is_none());
    assert!(h.exports.lock().unwrap().is_empty());

    // Also after a session has already finished
    h.pipeline.start(&stub(1)).unwrap();
    assert!(h.pipeline.finish().is_some());
    assert!(h.pipeline.finish().is_none());
    assert_eq!(h.exports.lock().unwrap().len(), 1);
}

#[test]
fn test_frames_and_measurements_stay_aligned() {
    let mut h = harness_with(SessionConfig::default(), vec![1, 3], None);
    h.pipeline.start(&stub(6)).unwrap();

    for expected in 1..=6 {
        match h.pipeline.tick().unwrap() {
            TickOutcome::Frame(update) => assert_eq!(update.frame_index, expected - 1),
            TickOutcome::Finished(_) => panic!("finished early"),
        }
        assert_eq!(h.pipeline.frame_count(), expected);
        assert_eq!(h.pipeline.measurement_count(), expected);
    }

    let stats = h.pipeline.stats();
    assert_eq!(stats.frames_buffered, 6);
    assert_eq!(stats.analysis_failures, 2);
}

#[test]
fn test_toggles_only_affect_later_frames() {
    let mut h = harness();
    h.pipeline.start(&stub(4)).unwrap();
    h.pipeline.tick().unwrap();
    h.pipeline.tick().unwrap();

    let before: Vec<u64> = h
        .pipeline
        .buffered_frames()
        .iter()
        .map(Frame::checksum)
        .collect();

    assert_eq!(
        h.pipeline.toggle_mirror().unwrap(),
        TransformState::new(true, false)
    );
    h.pipeline.tick().unwrap();
    assert_eq!(
        h.pipeline.toggle_rotate().unwrap(),
        TransformState::new(true, true)
    );
    h.pipeline.tick().unwrap();

    let frames = h.pipeline.buffered_frames();
    let after: Vec<u64> = frames[..2].iter().map(Frame::checksum).collect();
    assert_eq!(before, after);

    // Later frames carry the transform that was current when they were read
    let mut reference = synthetic(4);
    let raw: Vec<Frame> = std::iter::from_fn(|| reference.read().unwrap()).collect();
    assert_eq!(frames[0].checksum(), raw[0].checksum());
    assert_eq!(
        frames[2].checksum(),
        TransformState::new(true, false).apply(&raw[2]).checksum()
    );
    assert_eq!(
        frames[3].checksum(),
        TransformState::new(true, true).apply(&raw[3]).checksum()
    );
}

#[test]
fn test_failed_analysis_buffers_transformed_frame() {
    let mut h = harness_with(SessionConfig::default(), vec![1], None);
    h.pipeline.start(&stub(3)).unwrap();
    h.pipeline.tick().unwrap();
    h.pipeline.toggle_mirror().unwrap();

    let update = match h.pipeline.tick().unwrap() {
        TickOutcome::Frame(update) => update,
        TickOutcome::Finished(_) => panic!("finished early"),
    };
    assert_eq!(update.frame_index, 1);
    assert!(update.warning.is_some());

    let mut reference = synthetic(3);
    let raw: Vec<Frame> = std::iter::from_fn(|| reference.read().unwrap()).collect();
    let mirrored = TransformState::new(true, false).apply(&raw[1]);
    assert_ne!(mirrored.checksum(), raw[1].checksum());

    // Both the buffered frame and the previewed one are the mirrored frame
    assert_eq!(h.pipeline.buffered_frames()[1].checksum(), mirrored.checksum());
    assert_eq!(update.frame.checksum(), mirrored.checksum());
    assert_eq!(h.pipeline.measurement_count(), 2);

    let report = h.pipeline.finish().unwrap();
    assert_eq!(report.missing_measurements, 1);
}

#[test]
fn test_start_while_active_closes_previous_source_first() {
    let mut h = harness();
    let first = h.pipeline.start(&stub(3)).unwrap();
    h.pipeline.toggle_mirror().unwrap();
    h.pipeline.tick().unwrap();

    let second = h.pipeline.start(&stub(4)).unwrap();

    assert_eq!(
        *h.log.lock().unwrap(),
        vec!["open:stub://3", "close:stub://3", "open:stub://4"]
    );
    assert_ne!(first, second);
    assert_eq!(h.pipeline.session_id(), Some(&second));
    assert_eq!(h.pipeline.frame_count(), 0);
    assert_eq!(h.pipeline.transform_state(), Some(TransformState::default()));
    assert_eq!(*h.resets.lock().unwrap(), 2);
    // The discarded session was never exported
    assert!(h.exports.lock().unwrap().is_empty());
}

#[test]
fn test_unavailable_source_leaves_pipeline_idle() {
    let mut h = harness();
    h.pipeline.start(&stub(3)).unwrap();

    let result = h.pipeline.start(&SourceDescriptor::file("missing.mp4"));

    assert!(matches!(
        result,
        Err(PosecamError::Source(SourceError::Unavailable { .. }))
    ));
    assert_eq!(h.pipeline.state(), SessionState::Idle);
    assert_eq!(
        *h.log.lock().unwrap(),
        vec!["open:stub://3", "close:stub://3"]
    );
}

#[test]
fn test_end_of_stream_auto_finishes() {
    let mut h = harness();
    let id = h.pipeline.start(&stub(3)).unwrap();

    let (report, warnings) = run_to_end(&mut h.pipeline);

    assert!(warnings.is_empty());
    assert_eq!(report.session_id, id);
    assert_eq!(report.reason, FinishReason::EndOfStream);
    assert_eq!(report.frames, 3);
    assert!(report.is_exported());
    assert_eq!(h.pipeline.state(), SessionState::Idle);
    assert_eq!(*h.exports.lock().unwrap(), vec![(id, 3, 3)]);
    assert!(h.log.lock().unwrap().contains(&"close:stub://3".to_string()));
}

#[test]
fn test_read_failure_auto_finishes_with_buffered_frames() {
    let mut h = harness_with(SessionConfig::default(), Vec::new(), Some(2));
    h.pipeline.start(&stub(10)).unwrap();

    let (report, _) = run_to_end(&mut h.pipeline);

    assert!(matches!(
        report.reason,
        FinishReason::ReadFailure(SourceError::ReadFailure { .. })
    ));
    assert_eq!(report.frames, 2);
    assert_eq!(h.pipeline.stats().read_failures, 1);
    assert_eq!(h.pipeline.state(), SessionState::Idle);
    assert!(matches!(
        h.pipeline.tick(),
        Err(PosecamError::InvalidState { .. })
    ));
}

#[test]
fn test_frame_limit_auto_finishes() {
    let config = SessionConfig {
        max_session_frames: 2,
        ..SessionConfig::default()
    };
    let mut h = harness_with(config, Vec::new(), None);
    h.pipeline.start(&stub(10)).unwrap();

    let (report, _) = run_to_end(&mut h.pipeline);

    assert_eq!(report.reason, FinishReason::FrameLimit);
    assert_eq!(report.frames, 2);
}

#[test]
fn test_restart_assigns_distinct_ids() {
    let mut h = harness();
    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(h.pipeline.start(&stub(1)).unwrap());
        h.pipeline.finish();
    }
    assert_ne!(ids[0], ids[1]);
    assert_ne!(ids[1], ids[2]);
    assert_ne!(ids[0], ids[2]);
}

#[test]
fn test_five_frame_session_exports_video_and_report() {
    let temp_dir = TempDir::new().unwrap();
    let mut pipeline = exporting_pipeline(temp_dir.path(), Vec::new());
    let id = pipeline.start(&stub(5)).unwrap();

    let (report, warnings) = run_to_end(&mut pipeline);

    assert!(warnings.is_empty());
    let artifacts = report.export.unwrap();
    assert_eq!(artifacts.session_id, id);
    assert_eq!(
        artifacts.video.file_name().unwrap().to_string_lossy(),
        format!("video_{}.mjpeg", id)
    );
    assert_eq!(
        artifacts.report.file_name().unwrap().to_string_lossy(),
        format!("data_{}.csv", id)
    );

    let video = std::fs::read(&artifacts.video).unwrap();
    assert_eq!(count_jpeg_markers(&video), 5);

    let rows = report_rows(&artifacts.report);
    assert_eq!(rows.len(), 5);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(&row[0], i.to_string().as_str());
        assert_eq!(&row[2], "ok");
    }
}

#[test]
fn test_analyzer_failure_yields_sentinel_row() {
    let temp_dir = TempDir::new().unwrap();
    let mut pipeline = exporting_pipeline(temp_dir.path(), vec![2]);
    pipeline.start(&stub(5)).unwrap();

    let (report, warnings) = run_to_end(&mut pipeline);

    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].frame_index, 2);
    assert_eq!(report.missing_measurements, 1);

    let artifacts = report.export.unwrap();
    assert_eq!(
        count_jpeg_markers(&std::fs::read(&artifacts.video).unwrap()),
        5
    );

    let rows = report_rows(&artifacts.report);
    assert_eq!(rows.len(), 5);
    assert_eq!(&rows[2][0], "2");
    assert_eq!(&rows[2][2], "missing");
    assert!(rows[2][rows[2].len() - 1].contains("no pose found"));
    assert_eq!(&rows[3][2], "ok");
}

#[test]
fn test_finish_without_frames_is_empty_session() {
    let temp_dir = TempDir::new().unwrap();
    let output = temp_dir.path().join("sessions");
    let mut pipeline = exporting_pipeline(&output, Vec::new());
    pipeline.start(&stub(5)).unwrap();

    let report = pipeline.finish().unwrap();

    assert_eq!(report.reason, FinishReason::Requested);
    assert_eq!(report.frames, 0);
    assert!(matches!(report.export, Err(ExportError::EmptySession)));
    assert!(!output.exists());
    assert_eq!(pipeline.state(), SessionState::Idle);
}
