use crate::error::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::SessionCommand;

/// Map a key to a session command.
///
/// Raw mode swallows SIGINT, so Ctrl+C arrives here as a key and quits.
pub fn command_for_key(code: KeyCode, modifiers: KeyModifiers) -> Option<SessionCommand> {
    if modifiers.contains(KeyModifiers::CONTROL) {
        return match code {
            KeyCode::Char('c') | KeyCode::Char('C') => Some(SessionCommand::Quit),
            _ => None,
        };
    }
    match code {
        KeyCode::Char('m') | KeyCode::Char('M') => Some(SessionCommand::ToggleMirror),
        KeyCode::Char('r') | KeyCode::Char('R') => Some(SessionCommand::ToggleRotate),
        KeyCode::Char('f') | KeyCode::Char('F') | KeyCode::Enter => Some(SessionCommand::Finish),
        KeyCode::Char('q') | KeyCode::Esc => Some(SessionCommand::Quit),
        _ => None,
    }
}

/// Raw-mode terminal reader that forwards key presses as session commands
pub struct KeyboardInputHandler {
    commands: mpsc::Sender<SessionCommand>,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(commands: mpsc::Sender<SessionCommand>) -> Self {
        Self {
            commands,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keyboard input on a blocking task
    pub async fn start(&self) -> Result<()> {
        info!("Keyboard controls: m = mirror, r = rotate, f/Enter = finish, q/Esc/Ctrl+C = quit");

        let commands = self.commands.clone();
        let cancellation_token = self.cancellation_token.clone();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            debug!("Raw mode enabled - keyboard handler active");

            loop {
                if cancellation_token.is_cancelled() {
                    debug!("Keyboard input handler stopping");
                    break;
                }

                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        // Only handle key press events (not release)
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }

                        let Some(command) = command_for_key(key_event.code, key_event.modifiers) else {
                            debug!("Key pressed: {:?}", key_event.code);
                            continue;
                        };

                        info!("Key {:?} pressed - {}", key_event.code, command);
                        if commands.blocking_send(command).is_err() {
                            debug!("Session driver gone; keyboard handler exiting");
                            break;
                        }
                        if command == SessionCommand::Quit {
                            break;
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            } else {
                debug!("Raw mode disabled");
            }

            debug!("Keyboard input handler task exited");
        });

        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // Give the task a moment to clean up and disable raw mode
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Ensure raw mode is disabled even if the task didn't clean up properly
        let _ = disable_raw_mode();

        Ok(())
    }
}
