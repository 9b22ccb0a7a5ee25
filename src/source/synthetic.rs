use std::time::{Duration, SystemTime};
use tracing::{debug, info};

use super::{FrameSource, SourceDescriptor};
use crate::error::SourceError;
use crate::frame::Frame;

/// Deterministic generated frames, for tests and dry runs.
///
/// Each frame is a gradient with a bright square that moves one step per
/// frame, so motion analysis has something to find and no two frames (or
/// mirrored/rotated variants) are identical.
pub struct SyntheticSource {
    descriptor: SourceDescriptor,
    total_frames: u64,
    width: u32,
    height: u32,
    frame_interval: Duration,
    base_time: SystemTime,
    next_id: u64,
    open: bool,
}

impl SyntheticSource {
    pub fn new(total_frames: u64, width: u32, height: u32, frame_interval: Duration) -> Self {
        info!(
            "SyntheticSource: {} frames at {}x{} (synthetic)",
            total_frames, width, height
        );
        Self {
            descriptor: SourceDescriptor::Synthetic {
                frames: total_frames,
            },
            total_frames,
            width,
            height,
            frame_interval,
            base_time: SystemTime::now(),
            next_id: 0,
            open: true,
        }
    }

    pub fn frames_produced(&self) -> u64 {
        self.next_id
    }

    fn generate_pixels(&self, frame_id: u64) -> Vec<u8> {
        let (width, height) = (self.width as u64, self.height as u64);
        let square = (width.min(height) / 4).max(1);
        let travel = width.saturating_sub(square).max(1);
        let square_x = (frame_id * 3) % travel;
        let square_y = height.saturating_sub(square) / 2;

        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                let inside = x >= square_x
                    && x < square_x + square
                    && y >= square_y
                    && y < square_y + square;
                if inside {
                    pixels.extend_from_slice(&[250, 250, 250]);
                } else {
                    pixels.push(((x * 255) / width.max(1)) as u8 / 2);
                    pixels.push(((y * 255) / height.max(1)) as u8 / 2);
                    pixels.push(((frame_id + x + y) % 64) as u8);
                }
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn read(&mut self) -> Result<Option<Frame>, SourceError> {
        if !self.open || self.next_id >= self.total_frames {
            return Ok(None);
        }

        let id = self.next_id;
        self.next_id += 1;

        let timestamp = self.base_time + self.frame_interval * id as u32;
        debug!("SyntheticSource: produced frame {}", id);
        Ok(Some(Frame::new(
            id,
            timestamp,
            self.generate_pixels(id),
            self.width,
            self.height,
        )))
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            debug!("SyntheticSource: closed after {} frames", self.next_id);
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
