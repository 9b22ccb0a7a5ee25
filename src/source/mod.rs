//! Capture origins.
//!
//! A [`FrameSource`] owns one open capture resource (camera pipeline,
//! decoded file, or synthetic generator). Sources are created through a
//! [`SourceOpener`] so the session pipeline can be driven by test doubles.

#[cfg(all(target_os = "linux", feature = "camera"))]
mod gst;
mod synthetic;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::config::CameraConfig;
use crate::error::SourceError;
use crate::frame::Frame;

#[cfg(all(target_os = "linux", feature = "camera"))]
pub use gst::GstFrameSource;
pub use synthetic::SyntheticSource;

/// Where frames come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// Live device; `None` selects the configured default
    Live { index: Option<u32> },
    /// Local video file
    File(PathBuf),
    /// Generated frames, `stub://<count>`
    Synthetic { frames: u64 },
}

impl SourceDescriptor {
    pub fn default_camera() -> Self {
        Self::Live { index: None }
    }

    pub fn file<P: Into<PathBuf>>(path: P) -> Self {
        Self::File(path.into())
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live { .. })
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live { index: None } => write!(f, "camera"),
            Self::Live { index: Some(index) } => write!(f, "camera:{}", index),
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Synthetic { frames } => write!(f, "stub://{}", frames),
        }
    }
}

impl FromStr for SourceDescriptor {
    type Err = SourceError;

    /// Accepts `camera`, `camera:<index>`, `stub://<frames>` or a local path
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.is_empty() {
            return Err(SourceError::unavailable(value, "empty source descriptor"));
        }

        if value == "camera" {
            return Ok(Self::default_camera());
        }

        if let Some(index) = value.strip_prefix("camera:") {
            let index = index.parse::<u32>().map_err(|_| {
                SourceError::unavailable(value, format!("invalid camera index '{}'", index))
            })?;
            return Ok(Self::Live { index: Some(index) });
        }

        if let Some(frames) = value.strip_prefix("stub://") {
            let frames = frames.parse::<u64>().map_err(|_| {
                SourceError::unavailable(value, format!("invalid synthetic frame count '{}'", frames))
            })?;
            return Ok(Self::Synthetic { frames });
        }

        if value.contains("://") {
            return Err(SourceError::unavailable(
                value,
                "only local files are supported (no URL schemes)",
            ));
        }

        Ok(Self::File(PathBuf::from(value)))
    }
}

/// An open capture resource.
///
/// `read` distinguishes end-of-stream (`Ok(None)`) from a failed read
/// (`Err`). `close` must be idempotent; implementations also close on drop.
pub trait FrameSource: Send {
    fn descriptor(&self) -> &SourceDescriptor;

    /// Next frame, `Ok(None)` at end-of-stream
    fn read(&mut self) -> Result<Option<Frame>, SourceError>;

    /// Release the underlying resource
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Factory turning descriptors into open sources
pub trait SourceOpener: Send {
    fn open(&mut self, descriptor: &SourceDescriptor) -> Result<Box<dyn FrameSource>, SourceError>;
}

/// Opener used by the binary: GStreamer for camera and file origins,
/// [`SyntheticSource`] for `stub://`
pub struct DefaultSourceOpener {
    camera: CameraConfig,
    frame_interval: Duration,
}

impl DefaultSourceOpener {
    pub fn new(camera: CameraConfig, cadence_fps: u32) -> Self {
        let frame_interval = Duration::from_secs(1) / cadence_fps.max(1);
        Self {
            camera,
            frame_interval,
        }
    }

    #[cfg(all(target_os = "linux", feature = "camera"))]
    fn open_live(&self, descriptor: &SourceDescriptor, index: u32) -> Result<Box<dyn FrameSource>, SourceError> {
        let source = GstFrameSource::open_live(
            descriptor.clone(),
            index,
            self.camera.resolution,
            Duration::from_millis(self.camera.read_timeout_ms),
        )?;
        Ok(Box::new(source))
    }

    #[cfg(not(all(target_os = "linux", feature = "camera")))]
    fn open_live(&self, descriptor: &SourceDescriptor, _index: u32) -> Result<Box<dyn FrameSource>, SourceError> {
        Err(SourceError::unavailable(
            descriptor,
            "live capture requires the camera feature on Linux",
        ))
    }

    #[cfg(all(target_os = "linux", feature = "camera"))]
    fn open_file(&self, descriptor: &SourceDescriptor, path: &Path) -> Result<Box<dyn FrameSource>, SourceError> {
        let source = GstFrameSource::open_file(
            descriptor.clone(),
            path,
            Duration::from_millis(self.camera.read_timeout_ms),
        )?;
        Ok(Box::new(source))
    }

    #[cfg(not(all(target_os = "linux", feature = "camera")))]
    fn open_file(&self, descriptor: &SourceDescriptor, _path: &Path) -> Result<Box<dyn FrameSource>, SourceError> {
        Err(SourceError::unavailable(
            descriptor,
            "file decoding requires the camera feature on Linux",
        ))
    }
}

impl SourceOpener for DefaultSourceOpener {
    fn open(&mut self, descriptor: &SourceDescriptor) -> Result<Box<dyn FrameSource>, SourceError> {
        info!("Opening source {}", descriptor);
        match descriptor {
            SourceDescriptor::Live { index } => {
                self.open_live(descriptor, index.unwrap_or(self.camera.index))
            }
            SourceDescriptor::File(path) => {
                validate_local_file(descriptor, path)?;
                self.open_file(descriptor, path)
            }
            SourceDescriptor::Synthetic { frames } => {
                let (width, height) = self.camera.resolution;
                Ok(Box::new(SyntheticSource::new(
                    *frames,
                    width,
                    height,
                    self.frame_interval,
                )))
            }
        }
    }
}

fn validate_local_file(descriptor: &SourceDescriptor, path: &Path) -> Result<(), SourceError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| SourceError::unavailable(descriptor, format!("cannot access file: {}", e)))?;
    if !metadata.is_file() {
        return Err(SourceError::unavailable(descriptor, "not a regular file"));
    }
    Ok(())
}
