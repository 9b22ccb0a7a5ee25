use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::config::{ExportConfig, VideoFormat};
use crate::error::ExportError;
use crate::frame::Frame;

/// Writes an ordered frame sequence to a video file
pub trait VideoEncoder: Send {
    /// File extension of the produced container
    fn extension(&self) -> &str;

    /// Encode `frames` at `fps`, returning the number of frames written
    fn encode(&mut self, frames: &[Frame], fps: u32, path: &Path) -> Result<usize, ExportError>;
}

/// Build the encoder selected in configuration
pub fn encoder_for(config: &ExportConfig) -> Box<dyn VideoEncoder> {
    match config.video_format {
        VideoFormat::Mp4 => Box::new(Mp4Encoder::new(config.bitrate_kbps)),
        VideoFormat::Mjpeg => Box::new(MjpegEncoder::new(config.jpeg_quality)),
    }
}

/// Motion-JPEG stream: one baseline JPEG per frame, concatenated.
///
/// Raw MJPEG carries no timing; players assume a rate, the nominal one is
/// recorded in the session metadata.
pub struct MjpegEncoder {
    quality: u8,
}

impl MjpegEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl VideoEncoder for MjpegEncoder {
    fn extension(&self) -> &str {
        VideoFormat::Mjpeg.extension()
    }

    fn encode(&mut self, frames: &[Frame], fps: u32, path: &Path) -> Result<usize, ExportError> {
        info!(
            "Encoding {} frames to MJPEG {} (nominal {} fps)",
            frames.len(),
            path.display(),
            fps
        );

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| {
                ExportError::video_failure(path, format!("Failed to create video file: {}", e))
            })?;
        let mut writer = BufWriter::new(file);

        for (index, frame) in frames.iter().enumerate() {
            let image = frame.to_rgb_image().ok_or_else(|| {
                ExportError::video_failure(
                    path,
                    format!("Frame {} has an invalid pixel buffer", index),
                )
            })?;

            JpegEncoder::new_with_quality(&mut writer, self.quality)
                .encode(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)
                .map_err(|e| {
                    ExportError::video_failure(path, format!("Failed to encode frame {}: {}", index, e))
                })?;

            if index % 30 == 0 && index > 0 {
                debug!("Encoded {} frames", index);
            }
        }

        writer.flush().map_err(|e| {
            ExportError::video_failure(path, format!("Failed to flush video file: {}", e))
        })?;

        info!("MJPEG encoding completed: {} frames", frames.len());
        Ok(frames.len())
    }
}

/// H.264/MP4 through a GStreamer `appsrc` pipeline
pub struct Mp4Encoder {
    #[cfg_attr(not(all(target_os = "linux", feature = "video_encoding")), allow(dead_code))]
    bitrate_kbps: u32,
}

impl Mp4Encoder {
    pub fn new(bitrate_kbps: u32) -> Self {
        Self { bitrate_kbps }
    }
}

#[cfg(not(all(target_os = "linux", feature = "video_encoding")))]
impl VideoEncoder for Mp4Encoder {
    fn extension(&self) -> &str {
        VideoFormat::Mp4.extension()
    }

    fn encode(&mut self, _frames: &[Frame], _fps: u32, path: &Path) -> Result<usize, ExportError> {
        Err(ExportError::video_failure(
            path,
            "MP4 encoding not available on this platform (requires the video_encoding feature on Linux)",
        ))
    }
}

#[cfg(all(target_os = "linux", feature = "video_encoding"))]
impl VideoEncoder for Mp4Encoder {
    fn extension(&self) -> &str {
        VideoFormat::Mp4.extension()
    }

    fn encode(&mut self, frames: &[Frame], fps: u32, path: &Path) -> Result<usize, ExportError> {
        gst_mp4::encode(frames, fps, self.bitrate_kbps, path)
    }
}

#[cfg(all(target_os = "linux", feature = "video_encoding"))]
mod gst_mp4 {
    use gstreamer::prelude::*;
    use gstreamer::Pipeline;
    use gstreamer_app::AppSrc;
    use gstreamer_video::{VideoFormat as GstVideoFormat, VideoInfo};
    use std::path::Path;
    use tracing::{debug, info};

    use crate::error::ExportError;
    use crate::frame::Frame;

    /// Upper bound on waiting for the muxer to finalize the file
    const EOS_TIMEOUT_SECS: u64 = 30;

    pub(super) fn encode(
        frames: &[Frame],
        fps: u32,
        bitrate_kbps: u32,
        path: &Path,
    ) -> Result<usize, ExportError> {
        let fail = |details: String| ExportError::video_failure(path, details);

        let first = frames
            .first()
            .ok_or_else(|| fail("No frames to encode".to_string()))?;
        let (width, height) = (first.width(), first.height());

        // filesink truncates
        if path.symlink_metadata().is_ok() {
            return Err(fail("Video file already exists".to_string()));
        }

        gstreamer::init().map_err(|e| fail(format!("Failed to initialize GStreamer: {}", e)))?;

        {
            use libc::{setpriority, PRIO_PROCESS};
            let _ = unsafe { setpriority(PRIO_PROCESS as u32, 0, 10) };
        }

        let video_info = VideoInfo::builder(GstVideoFormat::Rgb, width, height)
            .fps(gstreamer::Fraction::new(fps as i32, 1))
            .build()
            .map_err(|e| fail(format!("Invalid video format: {}", e)))?;
        let caps = video_info
            .to_caps()
            .map_err(|e| fail(format!("Failed to build caps: {}", e)))?;

        let pipeline_desc = format!(
            "appsrc name=src format=time is-live=false ! \
             videoconvert ! video/x-raw,format=I420 ! \
             x264enc speed-preset=medium bitrate={} key-int-max={} ! \
             video/x-h264,profile=high ! \
             h264parse ! \
             mp4mux faststart=true ! \
             filesink name=sink",
            bitrate_kbps,
            fps * 2
        );

        info!("Creating GStreamer MP4 pipeline for {}", path.display());
        debug!("Pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| fail(format!("Failed to create pipeline: {}", e)))?
            .downcast::<Pipeline>()
            .map_err(|_| fail("Failed to downcast to Pipeline".to_string()))?;

        let appsrc = pipeline
            .by_name("src")
            .ok_or_else(|| fail("Failed to get appsrc element".to_string()))?
            .downcast::<AppSrc>()
            .map_err(|_| fail("Failed to downcast to AppSrc".to_string()))?;
        appsrc.set_caps(Some(&caps));
        appsrc.set_property("format", gstreamer::Format::Time);

        let filesink = pipeline
            .by_name("sink")
            .ok_or_else(|| fail("Failed to get filesink element".to_string()))?;
        filesink.set_property("location", path.to_string_lossy().to_string());

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| fail(format!("Failed to start pipeline: {}", e)))?;

        let result = push_frames(&appsrc, frames, &video_info, fps)
            .and_then(|count| wait_for_eos(&pipeline, &appsrc).map(|_| count));

        let _ = pipeline.set_state(gstreamer::State::Null);

        let count = result.map_err(fail)?;
        info!("GStreamer MP4 encoding completed: {} frames", count);
        Ok(count)
    }

    fn push_frames(
        appsrc: &AppSrc,
        frames: &[Frame],
        video_info: &VideoInfo,
        fps: u32,
    ) -> Result<usize, String> {
        let stride = video_info.stride()[0] as usize;
        let frame_ns = 1_000_000_000u64 / fps.max(1) as u64;

        for (index, frame) in frames.iter().enumerate() {
            if frame.width() != video_info.width() || frame.height() != video_info.height() {
                return Err(format!(
                    "Frame {} is {}x{}, expected {}x{}",
                    index,
                    frame.width(),
                    frame.height(),
                    video_info.width(),
                    video_info.height()
                ));
            }

            let mut data = vec![0u8; video_info.size()];
            for (y, row) in frame.rows().enumerate() {
                let start = y * stride;
                data[start..start + row.len()].copy_from_slice(row);
            }

            let mut buffer = gstreamer::Buffer::from_mut_slice(data);
            {
                let buffer_ref = buffer
                    .get_mut()
                    .ok_or_else(|| "Buffer is not writable".to_string())?;
                buffer_ref.set_pts(gstreamer::ClockTime::from_nseconds(index as u64 * frame_ns));
                buffer_ref.set_duration(gstreamer::ClockTime::from_nseconds(frame_ns));
            }

            appsrc
                .push_buffer(buffer)
                .map_err(|e| format!("Failed to push frame {}: {:?}", index, e))?;

            if index % 30 == 0 && index > 0 {
                debug!("Encoded {} frames", index);
            }
        }

        Ok(frames.len())
    }

    fn wait_for_eos(pipeline: &Pipeline, appsrc: &AppSrc) -> Result<(), String> {
        appsrc
            .end_of_stream()
            .map_err(|e| format!("Failed to signal EOS: {:?}", e))?;

        let bus = pipeline
            .bus()
            .ok_or_else(|| "Pipeline has no bus".to_string())?;
        for msg in bus.iter_timed(gstreamer::ClockTime::from_seconds(EOS_TIMEOUT_SECS)) {
            match msg.view() {
                gstreamer::MessageView::Eos(..) => return Ok(()),
                gstreamer::MessageView::Error(err) => {
                    return Err(format!(
                        "Video encoding error: {} ({})",
                        err.error(),
                        err.debug().unwrap_or_default()
                    ));
                }
                _ => {}
            }
        }

        Err(format!(
            "Timed out after {}s waiting for the encoder to finish",
            EOS_TIMEOUT_SECS
        ))
    }
}
