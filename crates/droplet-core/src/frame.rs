use ndarray::{s, Array2, Array3, ArrayD, Axis, Slice};
use serde::{Deserialize, Serialize};

use crate::consts::{LUMINANCE_B, LUMINANCE_G, LUMINANCE_R, U8_MAX};
use crate::error::{DetectorError, Result};

/// A single ROI capture as delivered by a camera backend.
///
/// Pixel data is 8-bit, shape = (height, width) for mono frames or
/// (height, width, channels) for interleaved color frames. The shape is
/// not checked at construction: the detector validates it where it matters.
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: ArrayD<u8>,
    pub metadata: FrameMetadata,
}

#[derive(Clone, Debug, Default)]
pub struct FrameMetadata {
    pub frame_index: usize,
    pub timestamp_us: Option<u64>,
}

impl Frame {
    pub fn new(data: ArrayD<u8>) -> Self {
        Self {
            data,
            metadata: FrameMetadata::default(),
        }
    }

    pub fn mono(data: Array2<u8>) -> Self {
        Self::new(data.into_dyn())
    }

    pub fn rgb(data: Array3<u8>) -> Self {
        Self::new(data.into_dyn())
    }

    pub fn with_index(mut self, frame_index: usize) -> Self {
        self.metadata.frame_index = frame_index;
        self
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn height(&self) -> usize {
        self.shape().first().copied().unwrap_or(0)
    }

    pub fn width(&self) -> usize {
        self.shape().get(1).copied().unwrap_or(0)
    }

    /// A frame must hold at least one pixel and have two or more dimensions.
    pub fn validate(&self) -> Result<()> {
        if self.data.ndim() < 2 {
            return Err(DetectorError::InvalidFrame(format!(
                "expected at least 2 dimensions, got shape {:?}",
                self.shape()
            )));
        }
        if self.data.is_empty() {
            return Err(DetectorError::InvalidFrame(format!(
                "empty frame with shape {:?}",
                self.shape()
            )));
        }
        Ok(())
    }

    /// Convert to single-channel intensity in [0.0, 1.0].
    ///
    /// 3- and 4-channel frames are treated as RGB(A) and reduced with BT.601
    /// luminance weights; any other channel count is averaged.
    pub fn to_intensity(&self) -> Result<Array2<f32>> {
        self.validate()?;
        match self.data.ndim() {
            2 => {
                let view = self
                    .data
                    .view()
                    .into_dimensionality::<ndarray::Ix2>()
                    .map_err(|e| DetectorError::InvalidFrame(e.to_string()))?;
                Ok(view.mapv(|v| v as f32 / U8_MAX))
            }
            3 => {
                let (h, w, c) = (self.shape()[0], self.shape()[1], self.shape()[2]);
                let mut out = Array2::<f32>::zeros((h, w));
                for row in 0..h {
                    for col in 0..w {
                        let px = self.data.slice(s![row, col, ..]);
                        out[[row, col]] = match c {
                            1 => px[0] as f32,
                            3 | 4 => {
                                LUMINANCE_R * px[0] as f32
                                    + LUMINANCE_G * px[1] as f32
                                    + LUMINANCE_B * px[2] as f32
                            }
                            _ => px.iter().map(|&v| v as f32).sum::<f32>() / c as f32,
                        } / U8_MAX;
                    }
                }
                Ok(out)
            }
            n => Err(DetectorError::InvalidFrame(format!(
                "unsupported frame with {n} dimensions (shape {:?})",
                self.shape()
            ))),
        }
    }
}

/// Region of interest in full-sensor pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build a ROI from untrusted signed values, rejecting negative
    /// positions and non-positive sizes.
    pub fn from_signed(x: i64, y: i64, width: i64, height: i64) -> Result<Self> {
        let invalid = |reason: &str| DetectorError::InvalidRoi {
            x,
            y,
            width,
            height,
            reason: reason.to_string(),
        };
        if width <= 0 || height <= 0 {
            return Err(invalid("width and height must be positive"));
        }
        if x < 0 || y < 0 {
            return Err(invalid("position must be non-negative"));
        }
        let fits = |v: i64| u32::try_from(v).ok();
        match (fits(x), fits(y), fits(width), fits(height)) {
            (Some(x), Some(y), Some(w), Some(h)) => Ok(Self::new(x, y, w, h)),
            _ => Err(invalid("value out of range")),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(DetectorError::InvalidRoi {
                x: self.x as i64,
                y: self.y as i64,
                width: self.width as i64,
                height: self.height as i64,
                reason: "width and height must be positive".into(),
            });
        }
        Ok(())
    }

    /// Check that the ROI lies inside a sensor of the given size.
    pub fn validate_for_sensor(&self, sensor_width: usize, sensor_height: usize) -> Result<()> {
        self.validate()?;
        let right = self.x as usize + self.width as usize;
        let bottom = self.y as usize + self.height as usize;
        if right > sensor_width || bottom > sensor_height {
            return Err(DetectorError::InvalidRoi {
                x: self.x as i64,
                y: self.y as i64,
                width: self.width as i64,
                height: self.height as i64,
                reason: format!("exceeds sensor bounds {sensor_width}x{sensor_height}"),
            });
        }
        Ok(())
    }

    /// Cut this ROI out of a full-sensor frame (2-D or interleaved 3-D).
    pub fn extract(&self, full: &ArrayD<u8>) -> Result<ArrayD<u8>> {
        if full.ndim() < 2 {
            return Err(DetectorError::InvalidFrame(format!(
                "cannot crop frame with shape {:?}",
                full.shape()
            )));
        }
        self.validate_for_sensor(full.shape()[1], full.shape()[0])?;
        let rows = self.y as usize..(self.y + self.height) as usize;
        let cols = self.x as usize..(self.x + self.width) as usize;
        let cropped = full
            .slice_axis(Axis(0), Slice::from(rows))
            .slice_axis(Axis(1), Slice::from(cols))
            .to_owned();
        Ok(cropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    #[test]
    fn test_validate_rejects_one_dimensional() {
        let frame = Frame::new(Array1::<u8>::zeros(10).into_dyn());
        assert!(frame.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty() {
        let frame = Frame::mono(Array2::<u8>::zeros((0, 5)));
        assert!(frame.validate().is_err());
    }

    #[test]
    fn test_rgb_luminance() {
        let mut data = Array3::<u8>::zeros((1, 2, 3));
        data[[0, 0, 0]] = 255;
        data[[0, 1, 0]] = 255;
        data[[0, 1, 1]] = 255;
        data[[0, 1, 2]] = 255;
        let gray = Frame::rgb(data).to_intensity().unwrap();
        assert!((gray[[0, 0]] - LUMINANCE_R).abs() < 1e-6);
        assert!((gray[[0, 1]] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_roi_from_signed_rejects_negative() {
        assert!(Roi::from_signed(-1, 0, 10, 10).is_err());
        assert!(Roi::from_signed(0, 0, 0, 10).is_err());
        assert_eq!(Roi::from_signed(1, 2, 3, 4).unwrap(), Roi::new(1, 2, 3, 4));
    }

    #[test]
    fn test_extract_crops_rows_and_columns() {
        let full = Array2::from_shape_fn((6, 8), |(r, c)| (r * 10 + c) as u8).into_dyn();
        let roi = Roi::new(2, 1, 3, 2);
        let cropped = roi.extract(&full).unwrap();
        assert_eq!(cropped.shape(), &[2, 3]);
        assert_eq!(cropped[[0, 0]], 12);
        assert_eq!(cropped[[1, 2]], 24);
        assert!(Roi::new(6, 0, 3, 2).extract(&full).is_err());
    }
}
