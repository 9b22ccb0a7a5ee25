use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PosecamConfig {
    pub camera: CameraConfig,
    pub session: SessionConfig,
    pub analyzer: AnalyzerConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Default live device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_camera_index")]
    pub index: u32,

    /// Requested capture resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// How long a single read may block before it counts as a failure
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    /// Tick cadence; also the frame rate of exported video
    #[serde(default = "default_cadence_fps")]
    pub cadence_fps: u32,

    /// Auto-finish once this many frames are buffered (0 = unlimited)
    #[serde(default = "default_max_session_frames")]
    pub max_session_frames: usize,

    /// Timezone used for session identifiers and overlay timestamps
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AnalyzerConfig {
    /// Delta threshold for motion detection
    #[serde(default = "default_delta_threshold")]
    pub delta_threshold: u32,

    /// Minimum region area (pixels) reported as motion
    #[serde(default = "default_contour_area")]
    pub contour_minimum_area: f64,

    /// Gaussian blur sigma applied before differencing
    #[serde(default = "default_blur_sigma")]
    pub blur_sigma: f32,

    /// Background model learning rate (0..1)
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,

    /// Draw the motion bounding box onto annotated frames
    #[serde(default = "default_draw_annotations")]
    pub draw_annotations: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    /// H.264 in MP4 via GStreamer
    Mp4,
    /// Concatenated JPEG frames
    Mjpeg,
}

impl VideoFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Mjpeg => "mjpeg",
        }
    }

    fn as_str(&self) -> &'static str {
        self.extension()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExportConfig {
    /// Output directory for session artifacts
    #[serde(default = "default_export_path")]
    pub path: String,

    /// Container/codec for the exported video
    #[serde(default = "default_video_format")]
    pub video_format: VideoFormat,

    /// JPEG quality for MJPEG export (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Target bitrate for MP4 export
    #[serde(default = "default_bitrate_kbps")]
    pub bitrate_kbps: u32,

    /// Burn frame index and timestamp into exported frames
    #[serde(default = "default_overlay")]
    pub overlay: bool,

    /// Path to TrueType font file for the overlay
    #[serde(default = "default_overlay_font_path")]
    pub overlay_font_path: String,

    /// Font size for the overlay
    #[serde(default = "default_overlay_font_size")]
    pub overlay_font_size: f32,

    /// Write a JSON metadata sidecar next to the artifacts
    #[serde(default = "default_save_metadata")]
    pub save_metadata: bool,
}

impl PosecamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("posecam.toml")
    }

    /// Load configuration from a specific file path.
    ///
    /// Environment overrides use the `POSECAM_` prefix and `__` between
    /// nested keys, e.g. `POSECAM_EXPORT__VIDEO_FORMAT=mjpeg`.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.index", default_camera_index())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.read_timeout_ms", default_read_timeout_ms())?
            .set_default("session.cadence_fps", default_cadence_fps())?
            .set_default(
                "session.max_session_frames",
                default_max_session_frames() as u64,
            )?
            .set_default("session.timezone", default_timezone())?
            .set_default("analyzer.delta_threshold", default_delta_threshold())?
            .set_default("analyzer.contour_minimum_area", default_contour_area())?
            .set_default("analyzer.blur_sigma", default_blur_sigma() as f64)?
            .set_default("analyzer.learning_rate", default_learning_rate() as f64)?
            .set_default("analyzer.draw_annotations", default_draw_annotations())?
            .set_default("export.path", default_export_path())?
            .set_default("export.video_format", default_video_format().as_str())?
            .set_default("export.jpeg_quality", default_jpeg_quality() as u64)?
            .set_default("export.bitrate_kbps", default_bitrate_kbps())?
            .set_default("export.overlay", default_overlay())?
            .set_default("export.overlay_font_path", default_overlay_font_path())?
            .set_default(
                "export.overlay_font_size",
                default_overlay_font_size() as f64,
            )?
            .set_default("export.save_metadata", default_save_metadata())?
            .add_source(File::with_name(&path_str).required(false))
            .add_source(
                Environment::with_prefix("POSECAM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: PosecamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.read_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Camera read_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.session.cadence_fps == 0 || self.session.cadence_fps > 240 {
            return Err(ConfigError::Message(
                "Session cadence_fps must be between 1 and 240".to_string(),
            ));
        }

        if self.session.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(ConfigError::Message(format!(
                "Unknown session timezone '{}'",
                self.session.timezone
            )));
        }

        if self.analyzer.delta_threshold > 255 {
            return Err(ConfigError::Message(
                "Analyzer delta_threshold must be at most 255".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.analyzer.learning_rate) {
            return Err(ConfigError::Message(
                "Analyzer learning_rate must be within 0..=1".to_string(),
            ));
        }

        if self.analyzer.blur_sigma <= 0.0 {
            return Err(ConfigError::Message(
                "Analyzer blur_sigma must be greater than 0".to_string(),
            ));
        }

        if self.export.path.trim().is_empty() {
            return Err(ConfigError::Message(
                "Export path must not be empty".to_string(),
            ));
        }

        if self.export.jpeg_quality == 0 || self.export.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "Export jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        if self.export.overlay && self.export.overlay_font_size <= 0.0 {
            return Err(ConfigError::Message(
                "Export overlay_font_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for PosecamConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                index: default_camera_index(),
                resolution: default_camera_resolution(),
                read_timeout_ms: default_read_timeout_ms(),
            },
            session: SessionConfig::default(),
            analyzer: AnalyzerConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cadence_fps: default_cadence_fps(),
            max_session_frames: default_max_session_frames(),
            timezone: default_timezone(),
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            delta_threshold: default_delta_threshold(),
            contour_minimum_area: default_contour_area(),
            blur_sigma: default_blur_sigma(),
            learning_rate: default_learning_rate(),
            draw_annotations: default_draw_annotations(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            path: default_export_path(),
            video_format: default_video_format(),
            jpeg_quality: default_jpeg_quality(),
            bitrate_kbps: default_bitrate_kbps(),
            overlay: default_overlay(),
            overlay_font_path: default_overlay_font_path(),
            overlay_font_size: default_overlay_font_size(),
            save_metadata: default_save_metadata(),
        }
    }
}

// Default value functions
fn default_camera_index() -> u32 {
    0
}
fn default_camera_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_cadence_fps() -> u32 {
    30
}
fn default_max_session_frames() -> usize {
    0
}
fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_delta_threshold() -> u32 {
    25
}
fn default_contour_area() -> f64 {
    500.0
}
fn default_blur_sigma() -> f32 {
    2.0
}
fn default_learning_rate() -> f32 {
    0.05
}
fn default_draw_annotations() -> bool {
    true
}

fn default_export_path() -> String {
    "output".to_string()
}
#[cfg(all(target_os = "linux", feature = "video_encoding"))]
fn default_video_format() -> VideoFormat {
    VideoFormat::Mp4
}
#[cfg(not(all(target_os = "linux", feature = "video_encoding")))]
fn default_video_format() -> VideoFormat {
    VideoFormat::Mjpeg
}
fn default_jpeg_quality() -> u8 {
    90
}
fn default_bitrate_kbps() -> u32 {
    4000
}
fn default_overlay() -> bool {
    false
}
fn default_overlay_font_path() -> String {
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".to_string()
}
fn default_overlay_font_size() -> f32 {
    20.0
}
fn default_save_metadata() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = PosecamConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.cadence_fps, 30);
        assert_eq!(config.export.path, "output");
    }

    #[test]
    fn test_config_validation() {
        let mut config = PosecamConfig::default();
        config.session.cadence_fps = 0;
        assert!(config.validate().is_err());

        config.session.cadence_fps = 30;
        config.export.jpeg_quality = 0;
        assert!(config.validate().is_err());

        config.export.jpeg_quality = 80;
        config.session.timezone = "Mars/Olympus_Mons".to_string();
        assert!(config.validate().is_err());

        config.session.timezone = "Europe/Moscow".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[session]
cadence_fps = 15
max_session_frames = 900

[export]
path = "/tmp/posecam-sessions"
video_format = "mjpeg"
"#
        )
        .unwrap();

        let config = PosecamConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.session.cadence_fps, 15);
        assert_eq!(config.session.max_session_frames, 900);
        assert_eq!(config.export.path, "/tmp/posecam-sessions");
        assert_eq!(config.export.video_format, VideoFormat::Mjpeg);
        // Untouched sections keep their defaults
        assert_eq!(config.analyzer.delta_threshold, 25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = PosecamConfig::load_from_file("/nonexistent/posecam.toml").unwrap();
        assert_eq!(config.camera.resolution, (640, 480));
        assert_eq!(config.export.video_format, default_video_format());
    }

    #[test]
    fn test_video_format_extension() {
        assert_eq!(VideoFormat::Mp4.extension(), "mp4");
        assert_eq!(VideoFormat::Mjpeg.extension(), "mjpeg");
    }
}
