pub mod analysis;
pub mod app;
pub mod config;
pub mod error;
pub mod export;
pub mod frame;
pub mod session;
pub mod source;
pub mod transform;

pub use analysis::{Analysis, FrameAnalyzer, Measurement, MeasurementRecord, MotionAnalyzer};
pub use app::{build_pipeline, KeyboardInputHandler, SessionCommand, SessionDriver};
pub use config::PosecamConfig;
pub use error::{AnalysisError, ExportError, PosecamError, Result, SourceError};
pub use export::{ExportCoordinator, ExportedArtifacts, SessionExporter, SessionRecording};
pub use frame::Frame;
pub use session::{
    FinishReason, FrameWarning, SessionId, SessionPipeline, SessionReport, SessionState,
    TickOutcome,
};
pub use source::{FrameSource, SourceDescriptor, SourceOpener};
pub use transform::TransformState;
