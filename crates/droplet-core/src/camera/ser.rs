use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::Calibration;
use crate::error::Result;
use crate::frame::{Frame, Roi};
use crate::io::SerReader;

use super::{check_roi, FrameSource};

/// Replays a SER recording as if it were a live camera.
pub struct SerCamera {
    path: PathBuf,
    reader: SerReader,
    roi: Option<Roi>,
    calibration: Option<Calibration>,
    cursor: usize,
    looping: bool,
}

impl SerCamera {
    pub fn open(path: &Path) -> Result<Self> {
        let reader = SerReader::open(path)?;
        debug!(
            path = %path.display(),
            frames = reader.frame_count(),
            width = reader.width(),
            height = reader.height(),
            "Opened SER recording"
        );
        Ok(Self {
            path: path.to_path_buf(),
            reader,
            roi: None,
            calibration: None,
            cursor: 0,
            looping: false,
        })
    }

    /// Restart from the first frame when the recording runs out.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = Some(calibration);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

impl FrameSource for SerCamera {
    fn name(&self) -> &str {
        "ser"
    }

    fn sensor_size(&self) -> (usize, usize) {
        (self.reader.width(), self.reader.height())
    }

    fn roi(&self) -> Option<Roi> {
        self.roi
    }

    fn set_roi(&mut self, roi: Roi) -> Result<()> {
        check_roi(&roi, self.sensor_size())?;
        self.roi = Some(roi);
        Ok(())
    }

    fn clear_roi(&mut self) {
        self.roi = None;
    }

    fn capture_frame(&mut self) -> Result<Option<Frame>> {
        let total = self.reader.frame_count();
        if self.cursor >= total {
            if !self.looping || total == 0 {
                return Ok(None);
            }
            self.cursor = 0;
        }
        let frame = self.reader.read_frame(self.cursor)?;
        self.cursor += 1;
        Ok(Some(frame))
    }

    fn calibration(&self) -> Option<Calibration> {
        self.calibration
    }

    fn frame_count(&self) -> Option<usize> {
        if self.looping {
            None
        } else {
            Some(self.reader.frame_count())
        }
    }
}
