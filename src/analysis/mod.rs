//! Analyzer boundary.
//!
//! The session pipeline treats the analyzer as an opaque, fallible
//! capability: one frame in, one annotated frame and one
//! [`MeasurementRecord`] out. [`MotionAnalyzer`] is the built-in
//! implementation; pose estimators plug in through [`FrameAnalyzer`].

mod motion;
mod record;

pub use motion::MotionAnalyzer;
pub use record::{Measurement, MeasurementRecord};

use crate::error::AnalysisError;
use crate::frame::Frame;

/// Result of analyzing one frame
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Frame with the analyzer's drawings applied
    pub annotated: Frame,
    pub record: MeasurementRecord,
}

impl Analysis {
    pub fn new(annotated: Frame, record: MeasurementRecord) -> Self {
        Self { annotated, record }
    }
}

pub trait FrameAnalyzer: Send {
    fn analyze(&mut self, frame: &Frame) -> Result<Analysis, AnalysisError>;

    /// Drop per-session state before a new session starts
    fn reset(&mut self) {}
}
