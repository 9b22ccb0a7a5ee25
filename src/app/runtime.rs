use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::block_in_place;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::SessionCommand;
use crate::error::{PosecamError, Result};
use crate::frame::Frame;
use crate::session::{SessionPipeline, SessionReport, TickOutcome};
use crate::source::SourceDescriptor;

const COMMAND_CAPACITY: usize = 32;

/// Runs one session: ticks the pipeline at the cadence, applies commands,
/// and finishes on request, cancellation or end of stream.
///
/// Ticks and the final export block the calling worker, so the driver must
/// run on a multi-threaded runtime.
pub struct SessionDriver {
    pipeline: SessionPipeline,
    cadence: Duration,
    command_tx: mpsc::Sender<SessionCommand>,
    command_rx: mpsc::Receiver<SessionCommand>,
    preview_tx: watch::Sender<Option<Frame>>,
    cancellation_token: CancellationToken,
}

impl SessionDriver {
    pub fn new(pipeline: SessionPipeline, cadence_fps: u32) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (preview_tx, _) = watch::channel(None);
        Self {
            pipeline,
            cadence: Duration::from_secs(1) / cadence_fps.max(1),
            command_tx,
            command_rx,
            preview_tx,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn command_sender(&self) -> mpsc::Sender<SessionCommand> {
        self.command_tx.clone()
    }

    /// Latest annotated frame, for a display
    pub fn subscribe_preview(&self) -> watch::Receiver<Option<Frame>> {
        self.preview_tx.subscribe()
    }

    /// Cancelling the token finishes the session, as a finish command would
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn cadence(&self) -> Duration {
        self.cadence
    }

    /// Start a session from `descriptor` and drive it to completion
    pub async fn run(mut self, descriptor: SourceDescriptor) -> Result<SessionReport> {
        let session_id = self.pipeline.start(&descriptor)?;
        info!(
            "Driving session {} every {:?}",
            session_id, self.cadence
        );

        let mut ticker = interval(self.cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = self.cancellation_token.cancelled() => {
                    info!("Cancellation requested; finishing session {}", session_id);
                    return self.finish();
                }

                Some(command) = self.command_rx.recv() => {
                    if let Some(report) = self.apply(command)? {
                        return Ok(report);
                    }
                }

                _ = ticker.tick() => {
                    match block_in_place(|| self.pipeline.tick())? {
                        TickOutcome::Frame(update) => {
                            if let Some(warning) = &update.warning {
                                warn!("Measurement missing for {}", warning);
                            }
                            self.preview_tx.send_replace(Some(update.frame));
                        }
                        TickOutcome::Finished(report) => return Ok(report),
                    }
                }
            }
        }
    }

    fn apply(&mut self, command: SessionCommand) -> Result<Option<SessionReport>> {
        debug!("Applying command: {}", command);
        match command {
            SessionCommand::ToggleMirror => {
                let transform = self.pipeline.toggle_mirror()?;
                info!("Transform now {}", transform);
                Ok(None)
            }
            SessionCommand::ToggleRotate => {
                let transform = self.pipeline.toggle_rotate()?;
                info!("Transform now {}", transform);
                Ok(None)
            }
            SessionCommand::Finish | SessionCommand::Quit => self.finish().map(Some),
        }
    }

    fn finish(&mut self) -> Result<SessionReport> {
        block_in_place(|| self.pipeline.finish())
            .ok_or_else(|| PosecamError::system("No active session to finish"))
    }
}
