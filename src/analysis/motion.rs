use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use imageproc::{
    contrast::threshold,
    distance_transform::Norm,
    drawing::draw_hollow_rect_mut,
    filter::gaussian_blur_f32,
    morphology::{dilate, erode},
    rect::Rect,
    region_labelling::{connected_components, Connectivity},
};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::{Analysis, FrameAnalyzer, MeasurementRecord};
use crate::config::AnalyzerConfig;
use crate::error::AnalysisError;
use crate::frame::Frame;

const ANNOTATION_COLOR: Rgb<u8> = Rgb([255, 48, 48]);

/// Background-subtraction motion analyzer.
///
/// Every record carries the same fields (`motion_detected`, `motion_area`,
/// `motion_fraction`, `centroid_x`, `centroid_y`, `bbox_x`, `bbox_y`,
/// `bbox_width`, `bbox_height`) so the exported report has a stable schema.
pub struct MotionAnalyzer {
    config: AnalyzerConfig,
    background_model: Option<GrayImage>,
    pub(crate) frame_count: u64,
}

/// Largest connected region of changed pixels
#[derive(Debug, Clone, Copy, PartialEq)]
struct MotionRegion {
    area: u64,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    sum_x: u64,
    sum_y: u64,
}

impl MotionRegion {
    fn new(x: u32, y: u32) -> Self {
        Self {
            area: 0,
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            sum_x: 0,
            sum_y: 0,
        }
    }

    fn add(&mut self, x: u32, y: u32) {
        self.area += 1;
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.sum_x += x as u64;
        self.sum_y += y as u64;
    }

    fn centroid(&self) -> (f64, f64) {
        let area = self.area.max(1) as f64;
        (self.sum_x as f64 / area, self.sum_y as f64 / area)
    }

    fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }
}

impl MotionAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        info!("Initializing motion analyzer with config: {:?}", config);
        Self {
            config,
            background_model: None,
            frame_count: 0,
        }
    }

    pub(crate) fn background_initialized(&self) -> bool {
        self.background_model.is_some()
    }

    /// Find the largest changed region against the background model.
    /// Returns `None` while the background is being (re)initialized.
    fn detect_motion(&mut self, gray_image: &GrayImage) -> Option<MotionRegion> {
        let blurred = if self.config.blur_sigma > 0.0 {
            gaussian_blur_f32(gray_image, self.config.blur_sigma)
        } else {
            gray_image.clone()
        };

        let background = match self.background_model.as_ref() {
            Some(background) if background.dimensions() == blurred.dimensions() => background,
            Some(background) => {
                warn!(
                    "Frame size changed from {:?} to {:?}; resetting background model",
                    background.dimensions(),
                    blurred.dimensions()
                );
                self.background_model = Some(blurred);
                self.frame_count += 1;
                return None;
            }
            None => {
                info!("Initializing background model with first frame");
                self.background_model = Some(blurred);
                self.frame_count = 1;
                return None;
            }
        };

        let diff_image = calculate_frame_difference(background, &blurred);

        let threshold_value = self.config.delta_threshold.min(255) as u8;
        let binary_mask = threshold(&diff_image, threshold_value);

        // Morphological opening to drop speckle noise
        let kernel_size = 1u8;
        let cleaned_mask = dilate(
            &erode(&binary_mask, Norm::LInf, kernel_size),
            Norm::LInf,
            kernel_size,
        );

        let components = connected_components(&cleaned_mask, Connectivity::Eight, Luma([0u8]));
        let region = largest_region(&components);

        self.update_background_model(&blurred);
        self.frame_count += 1;

        region
    }

    /// Update background model using simple running average
    fn update_background_model(&mut self, current_frame: &GrayImage) {
        if let Some(ref mut background) = self.background_model {
            let learning_rate = self.config.learning_rate;

            for (bg_pixel, curr_pixel) in background.pixels_mut().zip(current_frame.pixels()) {
                let bg_val = bg_pixel[0] as f32;
                let curr_val = curr_pixel[0] as f32;
                bg_pixel[0] = (bg_val * (1.0 - learning_rate) + curr_val * learning_rate) as u8;
            }
        }
    }

    fn build_record(&self, region: Option<&MotionRegion>, pixel_count: u64) -> MeasurementRecord {
        let Some(region) = region else {
            return [
                "motion_detected",
                "motion_area",
                "motion_fraction",
                "centroid_x",
                "centroid_y",
                "bbox_x",
                "bbox_y",
                "bbox_width",
                "bbox_height",
            ]
            .into_iter()
            .fold(MeasurementRecord::new(), |record, name| record.with(name, 0.0));
        };

        let detected = region.area as f64 > self.config.contour_minimum_area;
        let (centroid_x, centroid_y) = region.centroid();
        MeasurementRecord::new()
            .with("motion_detected", if detected { 1.0 } else { 0.0 })
            .with("motion_area", region.area as f64)
            .with("motion_fraction", region.area as f64 / pixel_count.max(1) as f64)
            .with("centroid_x", centroid_x)
            .with("centroid_y", centroid_y)
            .with("bbox_x", region.min_x as f64)
            .with("bbox_y", region.min_y as f64)
            .with("bbox_width", region.width() as f64)
            .with("bbox_height", region.height() as f64)
    }
}

impl FrameAnalyzer for MotionAnalyzer {
    fn analyze(&mut self, frame: &Frame) -> Result<Analysis, AnalysisError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(AnalysisError::InvalidFrame {
                details: format!("frame {} is empty", frame.id),
            });
        }

        let rgb_image = frame.to_rgb_image().ok_or_else(|| AnalysisError::InvalidFrame {
            details: format!(
                "frame {} buffer of {} bytes does not fit {}x{} with stride {}",
                frame.id,
                frame.data().len(),
                frame.width(),
                frame.height(),
                frame.stride()
            ),
        })?;

        let gray_image = rgb24_to_gray(&rgb_image);
        let region = self.detect_motion(&gray_image);
        let pixel_count = frame.width() as u64 * frame.height() as u64;
        let record = self.build_record(region.as_ref(), pixel_count);

        let detected = record.get("motion_detected") == Some(1.0);
        debug!(
            "Frame {}: motion {} (area {:.0})",
            frame.id,
            if detected { "detected" } else { "none" },
            record.get("motion_area").unwrap_or_default()
        );

        let annotated = match region {
            Some(region) if detected && self.config.draw_annotations => {
                let mut canvas = rgb_image;
                draw_region(&mut canvas, &region);
                Frame::from_rgb_image(frame, canvas)
            }
            _ => frame.clone(),
        };

        Ok(Analysis::new(annotated, record))
    }

    fn reset(&mut self) {
        debug!("Resetting motion analyzer background model");
        self.background_model = None;
        self.frame_count = 0;
    }
}

/// Convert RGB24 frame to grayscale
fn rgb24_to_gray(rgb_image: &RgbImage) -> GrayImage {
    let (width, height) = rgb_image.dimensions();
    let mut gray_image = GrayImage::new(width, height);
    for (x, y, rgb) in rgb_image.enumerate_pixels() {
        let gray_value =
            (0.299 * rgb[0] as f32 + 0.587 * rgb[1] as f32 + 0.114 * rgb[2] as f32) as u8;
        gray_image.put_pixel(x, y, Luma([gray_value]));
    }
    gray_image
}

/// Calculate frame difference between background and current frame
fn calculate_frame_difference(background: &GrayImage, current: &GrayImage) -> GrayImage {
    let (width, height) = background.dimensions();
    let mut diff_image = GrayImage::new(width, height);

    for (x, y, bg_pixel) in background.enumerate_pixels() {
        if let Some(curr_pixel) = current.get_pixel_checked(x, y) {
            let diff = (bg_pixel[0] as i16 - curr_pixel[0] as i16).unsigned_abs() as u8;
            diff_image.put_pixel(x, y, Luma([diff]));
        }
    }

    diff_image
}

fn largest_region(components: &ImageBuffer<Luma<u32>, Vec<u32>>) -> Option<MotionRegion> {
    let mut regions: HashMap<u32, MotionRegion> = HashMap::new();

    for (x, y, pixel) in components.enumerate_pixels() {
        let label = pixel[0];
        if label > 0 {
            regions
                .entry(label)
                .or_insert_with(|| MotionRegion::new(x, y))
                .add(x, y);
        }
    }

    regions.into_values().max_by_key(|region| region.area)
}

/// Two-pixel outline around the region
fn draw_region(canvas: &mut RgbImage, region: &MotionRegion) {
    let outer = Rect::at(region.min_x as i32, region.min_y as i32)
        .of_size(region.width(), region.height());
    draw_hollow_rect_mut(canvas, outer, ANNOTATION_COLOR);

    if region.width() > 2 && region.height() > 2 {
        let inner = Rect::at(region.min_x as i32 + 1, region.min_y as i32 + 1)
            .of_size(region.width() - 2, region.height() - 2);
        draw_hollow_rect_mut(canvas, inner, ANNOTATION_COLOR);
    }
}
