use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use super::{FrameSource, SourceDescriptor};
use crate::error::SourceError;
use crate::frame::Frame;

/// How long `open` waits for the pipeline to reach PLAYING
const STATE_CHANGE_TIMEOUT_SECS: u64 = 5;

/// GStreamer-backed camera or file source delivering packed RGB frames
pub struct GstFrameSource {
    descriptor: SourceDescriptor,
    pipeline: Option<Pipeline>,
    appsink: Option<AppSink>,
    read_timeout: Duration,
    next_id: u64,
}

impl GstFrameSource {
    /// Open `/dev/video<index>` scaled to `resolution`
    pub fn open_live(
        descriptor: SourceDescriptor,
        index: u32,
        resolution: (u32, u32),
        read_timeout: Duration,
    ) -> Result<Self, SourceError> {
        let (width, height) = resolution;
        let pipeline_desc = format!(
            "v4l2src device=/dev/video{} do-timestamp=true ! \
             videoconvert ! videoscale ! \
             video/x-raw,format=RGB,width={},height={} ! \
             appsink name=sink sync=false max-buffers=2 drop=true enable-last-sample=false",
            index, width, height
        );
        Self::launch(descriptor, &pipeline_desc, None, read_timeout)
    }

    /// Decode a local video file
    pub fn open_file(
        descriptor: SourceDescriptor,
        path: &Path,
        read_timeout: Duration,
    ) -> Result<Self, SourceError> {
        let pipeline_desc = "filesrc name=src ! decodebin ! videoconvert ! \
             video/x-raw,format=RGB ! \
             appsink name=sink sync=false max-buffers=4 drop=false enable-last-sample=false";
        Self::launch(descriptor, pipeline_desc, Some(path), read_timeout)
    }

    fn launch(
        descriptor: SourceDescriptor,
        pipeline_desc: &str,
        location: Option<&Path>,
        read_timeout: Duration,
    ) -> Result<Self, SourceError> {
        gstreamer::init().map_err(|e| {
            SourceError::unavailable(&descriptor, format!("Failed to initialize GStreamer: {}", e))
        })?;

        info!("Creating GStreamer source pipeline for {}", descriptor);
        debug!("Pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(pipeline_desc)
            .map_err(|e| {
                SourceError::unavailable(&descriptor, format!("Failed to create pipeline: {}", e))
            })?
            .downcast::<Pipeline>()
            .map_err(|_| SourceError::unavailable(&descriptor, "Failed to downcast to Pipeline"))?;

        if let Some(path) = location {
            let filesrc = pipeline
                .by_name("src")
                .ok_or_else(|| SourceError::unavailable(&descriptor, "Failed to get filesrc element"))?;
            filesrc.set_property("location", path.to_string_lossy().to_string());
        }

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| SourceError::unavailable(&descriptor, "Failed to get appsink element"))?
            .downcast::<AppSink>()
            .map_err(|_| SourceError::unavailable(&descriptor, "Failed to downcast to AppSink"))?;

        pipeline.set_state(gstreamer::State::Playing).map_err(|e| {
            let _ = pipeline.set_state(gstreamer::State::Null);
            SourceError::unavailable(&descriptor, format!("Failed to start pipeline: {}", e))
        })?;

        let (result, _, _) =
            pipeline.state(gstreamer::ClockTime::from_seconds(STATE_CHANGE_TIMEOUT_SECS));
        if let Err(e) = result {
            let details = pop_bus_error(&pipeline).unwrap_or_else(|| e.to_string());
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(SourceError::unavailable(&descriptor, details));
        }

        info!("GStreamer source {} is playing", descriptor);
        Ok(Self {
            descriptor,
            pipeline: Some(pipeline),
            appsink: Some(appsink),
            read_timeout,
            next_id: 0,
        })
    }

    fn sample_to_frame(&self, sample: &gstreamer::Sample) -> Result<Frame, SourceError> {
        let caps = sample
            .caps()
            .ok_or_else(|| SourceError::read_failure(&self.descriptor, "Sample has no caps"))?;
        let info = VideoInfo::from_caps(caps).map_err(|e| {
            SourceError::read_failure(&self.descriptor, format!("Unsupported caps: {}", e))
        })?;
        let buffer = sample
            .buffer()
            .ok_or_else(|| SourceError::read_failure(&self.descriptor, "No buffer in sample"))?;
        let map = buffer.map_readable().map_err(|e| {
            SourceError::read_failure(&self.descriptor, format!("Failed to map buffer: {}", e))
        })?;

        Ok(Frame::with_stride(
            self.next_id,
            SystemTime::now(),
            map.as_slice().to_vec(),
            info.width(),
            info.height(),
            info.stride()[0] as usize,
        ))
    }
}

impl FrameSource for GstFrameSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn read(&mut self) -> Result<Option<Frame>, SourceError> {
        let (Some(pipeline), Some(appsink)) = (&self.pipeline, &self.appsink) else {
            return Err(SourceError::read_failure(&self.descriptor, "source is closed"));
        };

        let timeout = gstreamer::ClockTime::from_mseconds(self.read_timeout.as_millis() as u64);
        match appsink.try_pull_sample(timeout) {
            Some(sample) => {
                let frame = self.sample_to_frame(&sample)?;
                self.next_id += 1;
                Ok(Some(frame))
            }
            None if appsink.is_eos() => {
                info!("End of stream on {} after {} frames", self.descriptor, self.next_id);
                Ok(None)
            }
            None => {
                let details = pop_bus_error(pipeline)
                    .unwrap_or_else(|| format!("no frame within {:?}", self.read_timeout));
                warn!("Read failure on {}: {}", self.descriptor, details);
                Err(SourceError::read_failure(&self.descriptor, details))
            }
        }
    }

    fn close(&mut self) {
        self.appsink = None;
        if let Some(pipeline) = self.pipeline.take() {
            debug!("Stopping GStreamer source pipeline for {}", self.descriptor);
            if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
                warn!("Failed to stop GStreamer pipeline cleanly: {}", e);
            }
            info!("Closed source {}", self.descriptor);
        }
    }

    fn is_open(&self) -> bool {
        self.pipeline.is_some()
    }
}

impl Drop for GstFrameSource {
    fn drop(&mut self) {
        self.close();
    }
}

fn pop_bus_error(pipeline: &Pipeline) -> Option<String> {
    let bus = pipeline.bus()?;
    let msg = bus.pop_filtered(&[gstreamer::MessageType::Error])?;
    match msg.view() {
        gstreamer::MessageView::Error(err) => Some(format!(
            "{} ({})",
            err.error(),
            err.debug().unwrap_or_default()
        )),
        _ => None,
    }
}
