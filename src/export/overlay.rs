use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use image::Rgb;
use imageproc::drawing::{draw_text_mut, text_size};
use rusttype::{Font, Scale};
use std::path::Path;
use tracing::debug;

use crate::error::{PosecamError, Result};
use crate::frame::Frame;

/// Burns the frame index and capture time into exported frames
pub struct OverlayRenderer {
    font: Font<'static>,
    scale: Scale,
    font_size: f32,
    timezone: Tz,
}

impl OverlayRenderer {
    pub fn load(font_path: &Path, font_size: f32, timezone: Tz) -> Result<Self> {
        let font_data = std::fs::read(font_path).map_err(|e| {
            PosecamError::component(
                "export",
                format!("Failed to read font file '{}': {}", font_path.display(), e),
            )
        })?;

        let font = Font::try_from_vec(font_data).ok_or_else(|| {
            PosecamError::component(
                "export",
                format!("Failed to parse font file '{}'", font_path.display()),
            )
        })?;

        debug!(
            "Loaded overlay font {} (size {})",
            font_path.display(),
            font_size
        );

        Ok(Self {
            font,
            scale: Scale::uniform(font_size),
            font_size,
            timezone,
        })
    }

    /// Text drawn for the frame at `index`
    pub fn label(&self, frame: &Frame, index: usize) -> String {
        let datetime = DateTime::<Utc>::from(frame.timestamp).with_timezone(&self.timezone);
        format!(
            "#{:05} {}",
            index,
            datetime.format("%Y-%m-%d %H:%M:%S%.3f %Z")
        )
    }

    /// Copy of `frame` with the label drawn bottom-left on a darkened box.
    /// Frames with an unusable buffer are returned unchanged.
    pub fn render(&self, frame: &Frame, index: usize) -> Frame {
        let Some(mut img) = frame.to_rgb_image() else {
            return frame.clone();
        };

        let text = self.label(frame, index);
        let x: u32 = 10;
        let y: u32 = img.height().saturating_sub((self.font_size * 1.5) as u32);
        let (text_width, text_height) = text_size(self.scale, &self.font, &text);

        for dy in 0..(text_height.max(0) as u32 + 10) {
            for dx in 0..(text_width.max(0) as u32 + 10) {
                let px = x.saturating_sub(5) + dx;
                let py = y.saturating_sub(5) + dy;
                if px < img.width() && py < img.height() {
                    let pixel = img.get_pixel(px, py);
                    img.put_pixel(px, py, Rgb([pixel[0] / 3, pixel[1] / 3, pixel[2] / 3]));
                }
            }
        }

        draw_text_mut(
            &mut img,
            Rgb([255, 255, 255]),
            x as i32,
            y as i32,
            self.scale,
            &self.font,
            &text,
        );

        Frame::from_rgb_image(frame, img)
    }
}
