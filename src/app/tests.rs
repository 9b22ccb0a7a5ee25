use super::*;
use crate::config::{PosecamConfig, VideoFormat};
use crate::error::{PosecamError, SourceError};
use crate::session::FinishReason;
use crate::source::SourceDescriptor;
use crossterm::event::{KeyCode, KeyModifiers};
use std::time::Duration;
use tempfile::TempDir;

fn create_test_config(output: &TempDir) -> PosecamConfig {
    let mut config = PosecamConfig::default();
    config.camera.resolution = (32, 24);
    config.session.cadence_fps = 200;
    config.export.path = output.path().to_string_lossy().to_string();
    config.export.video_format = VideoFormat::Mjpeg;
    config.export.overlay = false;
    config.export.save_metadata = true;
    config
}

fn create_driver(config: &PosecamConfig) -> SessionDriver {
    let pipeline = build_pipeline(config).unwrap();
    SessionDriver::new(pipeline, config.session.cadence_fps)
}

#[test]
fn test_key_bindings() {
    let key = |code| keyboard_input::command_for_key(code, KeyModifiers::NONE);

    assert_eq!(key(KeyCode::Char('m')), Some(SessionCommand::ToggleMirror));
    assert_eq!(key(KeyCode::Char('r')), Some(SessionCommand::ToggleRotate));
    assert_eq!(key(KeyCode::Enter), Some(SessionCommand::Finish));
    assert_eq!(key(KeyCode::Char('f')), Some(SessionCommand::Finish));
    assert_eq!(key(KeyCode::Esc), Some(SessionCommand::Quit));
    assert_eq!(key(KeyCode::Char(' ')), None);
    assert_eq!(key(KeyCode::Char('c')), None);
}

#[test]
fn test_ctrl_c_quits_in_raw_mode() {
    assert_eq!(
        keyboard_input::command_for_key(KeyCode::Char('c'), KeyModifiers::CONTROL),
        Some(SessionCommand::Quit)
    );
    // Other control chords are not commands
    assert_eq!(
        keyboard_input::command_for_key(KeyCode::Char('m'), KeyModifiers::CONTROL),
        None
    );
}

#[test]
fn test_driver_cadence() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = create_test_config(&temp_dir);
    config.session.cadence_fps = 25;
    assert_eq!(create_driver(&config).cadence(), Duration::from_millis(40));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_driver_runs_synthetic_session_to_completion() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir);
    let driver = create_driver(&config);

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        driver.run(SourceDescriptor::Synthetic { frames: 6 }),
    )
    .await
    .expect("driver timed out")
    .unwrap();

    assert_eq!(report.reason, FinishReason::EndOfStream);
    assert_eq!(report.frames, 6);

    let artifacts = report.export.unwrap();
    assert!(artifacts.video.starts_with(temp_dir.path()));
    assert!(artifacts.video.is_file());
    assert!(artifacts.report.is_file());
    assert!(artifacts.metadata.unwrap().is_file());
    assert_eq!(artifacts.rows_written, 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_commands_toggle_and_finish() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir);
    let driver = create_driver(&config);
    let commands = driver.command_sender();
    let mut preview = driver.subscribe_preview();

    let handle = tokio::spawn(driver.run(SourceDescriptor::Synthetic { frames: 100_000 }));

    // Wait for a frame so the session is known to be active
    tokio::time::timeout(Duration::from_secs(5), preview.changed())
        .await
        .expect("no preview frame")
        .unwrap();
    assert!(preview.borrow().is_some());

    commands.send(SessionCommand::ToggleMirror).await.unwrap();
    commands.send(SessionCommand::ToggleRotate).await.unwrap();
    commands.send(SessionCommand::Finish).await.unwrap();

    let report = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("driver timed out")
        .unwrap()
        .unwrap();

    assert_eq!(report.reason, FinishReason::Requested);
    assert!(report.frames >= 1);
    assert!(report.frames < 100_000);
    assert!(report.is_exported());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancellation_finishes_session() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir);
    let driver = create_driver(&config);
    let token = driver.cancellation_token();
    let mut preview = driver.subscribe_preview();

    let handle = tokio::spawn(driver.run(SourceDescriptor::Synthetic { frames: 100_000 }));
    preview.changed().await.unwrap();
    token.cancel();

    let report = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("driver timed out")
        .unwrap()
        .unwrap();

    assert_eq!(report.reason, FinishReason::Requested);
    assert!(report.frames >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unavailable_source_fails_run() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir);
    let driver = create_driver(&config);

    let missing = temp_dir.path().join("missing.mp4");
    let result = driver.run(SourceDescriptor::file(missing)).await;

    assert!(matches!(
        result,
        Err(PosecamError::Source(SourceError::Unavailable { .. }))
    ));
}
