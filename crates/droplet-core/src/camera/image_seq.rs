use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::Calibration;
use crate::error::{DetectorError, Result};
use crate::frame::{Frame, Roi};
use crate::io::image_io::{has_image_extension, load_image};

use super::{check_roi, FrameSource};

/// Plays back a directory of still images in lexical file-name order.
pub struct ImageSequenceCamera {
    files: Vec<PathBuf>,
    sensor: (usize, usize),
    roi: Option<Roi>,
    calibration: Option<Calibration>,
    cursor: usize,
}

impl ImageSequenceCamera {
    /// Scan `dir` for images. The first image fixes the sensor size.
    pub fn open(dir: &Path) -> Result<Self> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && has_image_extension(p))
            .collect();
        files.sort();
        Self::from_files(files)
    }

    pub fn from_files(files: Vec<PathBuf>) -> Result<Self> {
        let first = files.first().ok_or_else(|| {
            DetectorError::InvalidFrame("image sequence contains no images".into())
        })?;
        let first_image = load_image(first)?;
        let sensor = (first_image.width(), first_image.height());
        debug!(images = files.len(), width = sensor.0, height = sensor.1, "Opened image sequence");
        Ok(Self {
            files,
            sensor,
            roi: None,
            calibration: None,
            cursor: 0,
        })
    }

    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = Some(calibration);
        self
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

impl FrameSource for ImageSequenceCamera {
    fn name(&self) -> &str {
        "image-sequence"
    }

    fn sensor_size(&self) -> (usize, usize) {
        self.sensor
    }

    fn roi(&self) -> Option<Roi> {
        self.roi
    }

    fn set_roi(&mut self, roi: Roi) -> Result<()> {
        check_roi(&roi, self.sensor)?;
        self.roi = Some(roi);
        Ok(())
    }

    fn clear_roi(&mut self) {
        self.roi = None;
    }

    fn capture_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(None);
        };
        let index = self.cursor;
        self.cursor += 1;
        let frame = load_image(path)?.with_index(index);
        if (frame.width(), frame.height()) != self.sensor {
            warn!(
                path = %path.display(),
                width = frame.width(),
                height = frame.height(),
                "Image size differs from the first image in the sequence"
            );
        }
        Ok(Some(frame))
    }

    fn calibration(&self) -> Option<Calibration> {
        self.calibration
    }

    fn frame_count(&self) -> Option<usize> {
        Some(self.files.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::save_image;
    use ndarray::Array2;

    #[test]
    fn test_sequence_order_and_end() {
        let dir = tempfile::tempdir().unwrap();
        for (name, level) in [("b.png", 20u8), ("a.png", 10), ("c.png", 30)] {
            let frame = Frame::mono(Array2::from_elem((8, 12), level));
            save_image(&frame, &dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut cam = ImageSequenceCamera::open(dir.path()).unwrap();
        assert_eq!(cam.sensor_size(), (12, 8));
        assert_eq!(cam.frame_count(), Some(3));

        let levels: Vec<u8> = std::iter::from_fn(|| cam.capture_frame().unwrap())
            .map(|f| f.data[[0, 0]])
            .collect();
        assert_eq!(levels, vec![10, 20, 30]);
    }

    #[test]
    fn test_empty_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageSequenceCamera::open(dir.path()).is_err());
    }
}
