//! Frame sources the detector can be fed from.
//!
//! The detection pipeline only sees [`Frame`]s; everything about exposure,
//! strobe timing and hardware lives behind [`FrameSource`].

pub mod image_seq;
pub mod ser;
pub mod synthetic;

use crate::config::Calibration;
use crate::error::{DetectorError, Result};
use crate::frame::{Frame, Roi};

pub use image_seq::ImageSequenceCamera;
pub use ser::SerCamera;
pub use synthetic::{SyntheticCamera, SyntheticConfig};

/// Contract between a camera backend and the detector.
pub trait FrameSource: Send {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Full sensor size as (width, height).
    fn sensor_size(&self) -> (usize, usize);

    /// Currently configured region of interest, if any.
    fn roi(&self) -> Option<Roi>;

    /// Configure a software ROI, cropped from full frames.
    fn set_roi(&mut self, roi: Roi) -> Result<()>;

    fn clear_roi(&mut self);

    /// Capture a full-sensor frame. `Ok(None)` means the source is exhausted.
    fn capture_frame(&mut self) -> Result<Option<Frame>>;

    /// Capture a frame restricted to `roi`.
    fn frame_roi(&mut self, roi: &Roi) -> Result<Option<Frame>> {
        let Some(full) = self.capture_frame()? else {
            return Ok(None);
        };
        let data = roi.extract(&full.data)?;
        Ok(Some(Frame {
            data,
            metadata: full.metadata,
        }))
    }

    /// Let the sensor read out only `roi`. Backends without the capability
    /// report [`DetectorError::Unsupported`].
    fn set_hardware_roi(&mut self, _roi: Roi) -> Result<()> {
        Err(DetectorError::Unsupported(format!(
            "hardware ROI on {}",
            self.name()
        )))
    }

    /// Per-camera calibration, overriding the configured one when present.
    fn calibration(&self) -> Option<Calibration> {
        None
    }

    /// Total number of frames for finite sources.
    fn frame_count(&self) -> Option<usize> {
        None
    }
}

/// Check a ROI against a source's sensor.
pub(crate) fn check_roi(roi: &Roi, sensor: (usize, usize)) -> Result<()> {
    roi.validate_for_sensor(sensor.0, sensor.1)
}
