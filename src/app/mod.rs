//! Async driver around the synchronous session pipeline.

pub mod keyboard_input;

mod runtime;
mod signals;
mod startup;
mod types;

#[cfg(test)]
mod tests;

pub use keyboard_input::KeyboardInputHandler;
pub use runtime::SessionDriver;
pub use signals::spawn_signal_handlers;
pub use startup::build_pipeline;
pub use types::SessionCommand;
