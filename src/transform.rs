use image::imageops;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::frame::Frame;

/// Geometric transform applied to every frame before analysis.
///
/// Mirroring and a 180 degree rotation commute, so the order in which
/// they are applied is not observable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformState {
    /// Flip horizontally
    pub mirror: bool,
    /// Rotate by 180 degrees
    pub rotate180: bool,
}

impl TransformState {
    pub fn new(mirror: bool, rotate180: bool) -> Self {
        Self { mirror, rotate180 }
    }

    pub fn toggle_mirror(&mut self) {
        self.mirror = !self.mirror;
    }

    pub fn toggle_rotate(&mut self) {
        self.rotate180 = !self.rotate180;
    }

    pub fn is_identity(&self) -> bool {
        !self.mirror && !self.rotate180
    }

    /// Apply the current state to `frame`.
    ///
    /// The identity state hands back the same pixel buffer. A frame whose
    /// buffer does not match its dimensions is passed through untouched so
    /// the analyzer can report it.
    pub fn apply(&self, frame: &Frame) -> Frame {
        if self.is_identity() {
            return frame.clone();
        }

        let Some(mut image) = frame.to_rgb_image() else {
            warn!(
                "Frame {} has an invalid buffer ({}x{}, stride {}); skipping transform",
                frame.id,
                frame.width(),
                frame.height(),
                frame.stride()
            );
            return frame.clone();
        };

        if self.mirror {
            imageops::flip_horizontal_in_place(&mut image);
        }
        if self.rotate180 {
            imageops::rotate180_in_place(&mut image);
        }

        Frame::from_rgb_image(frame, image)
    }
}

impl fmt::Display for TransformState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mirror={} rotate180={}", self.mirror, self.rotate180)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    /// 3x2 frame where every pixel is distinct
    fn asymmetric_frame() -> Frame {
        let data = (0u8..18).collect::<Vec<_>>();
        Frame::new(7, SystemTime::now(), data, 3, 2)
    }

    fn pixel(frame: &Frame, x: usize, y: usize) -> [u8; 3] {
        let start = y * frame.stride() + x * 3;
        let d = frame.data();
        [d[start], d[start + 1], d[start + 2]]
    }

    #[test]
    fn test_identity_shares_buffer() {
        let frame = asymmetric_frame();
        let out = TransformState::default().apply(&frame);
        assert!(out.shares_pixels_with(&frame));
    }

    #[test]
    fn test_mirror_flips_columns() {
        let frame = asymmetric_frame();
        let out = TransformState::new(true, false).apply(&frame);
        assert_eq!(pixel(&out, 0, 0), pixel(&frame, 2, 0));
        assert_eq!(pixel(&out, 2, 1), pixel(&frame, 0, 1));
        assert_eq!(out.id, frame.id);
        assert_eq!(out.timestamp, frame.timestamp);
    }

    #[test]
    fn test_rotate180_reverses_pixels() {
        let frame = asymmetric_frame();
        let out = TransformState::new(false, true).apply(&frame);
        assert_eq!(pixel(&out, 0, 0), pixel(&frame, 2, 1));
        assert_eq!(pixel(&out, 2, 1), pixel(&frame, 0, 0));
        assert_eq!((out.width(), out.height()), (3, 2));
    }

    #[test]
    fn test_transforms_are_involutions() {
        let frame = asymmetric_frame();
        for state in [TransformState::new(true, false), TransformState::new(false, true)] {
            let twice = state.apply(&state.apply(&frame));
            assert_eq!(twice.checksum(), frame.checksum(), "{}", state);
        }
    }

    #[test]
    fn test_mirror_and_rotate_commute() {
        let frame = asymmetric_frame();
        let mirror = TransformState::new(true, false);
        let rotate = TransformState::new(false, true);

        let mirror_then_rotate = rotate.apply(&mirror.apply(&frame));
        let rotate_then_mirror = mirror.apply(&rotate.apply(&frame));
        let combined = TransformState::new(true, true).apply(&frame);

        assert_eq!(mirror_then_rotate.checksum(), rotate_then_mirror.checksum());
        assert_eq!(combined.checksum(), mirror_then_rotate.checksum());
    }

    #[test]
    fn test_strided_frame_is_packed_by_transform() {
        let data = vec![
            1, 1, 1, 2, 2, 2, 0, 0, //
            3, 3, 3, 4, 4, 4, 0, 0,
        ];
        let frame = Frame::with_stride(0, SystemTime::now(), data, 2, 2, 8);
        let out = TransformState::new(true, false).apply(&frame);
        assert_eq!(out.stride(), 6);
        assert_eq!(out.data(), &[2, 2, 2, 1, 1, 1, 4, 4, 4, 3, 3, 3]);
    }

    #[test]
    fn test_toggles() {
        let mut state = TransformState::default();
        state.toggle_mirror();
        state.toggle_rotate();
        assert_eq!(state, TransformState::new(true, true));
        state.toggle_mirror();
        assert_eq!(state, TransformState::new(false, true));
        assert!(!state.is_identity());
    }
}
