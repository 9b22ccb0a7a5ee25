//! Session lifecycle: `Idle → Active → Finishing → Idle`.

mod id;
mod pipeline;
#[cfg(test)]
mod tests;
mod types;

pub use id::{resolve_timezone, SessionId};
pub use pipeline::SessionPipeline;
pub use types::{
    FinishReason, FrameUpdate, FrameWarning, SessionReport, SessionState, SessionStats, TickOutcome,
};
