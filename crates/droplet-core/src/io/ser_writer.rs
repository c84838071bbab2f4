use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{DetectorError, Result};
use crate::frame::Frame;
use crate::io::ser::{SerColor, SerHeader, SER_HEADER_SIZE, SER_MAGIC};

/// Writes 8-bit mono or RGB recordings in SER format.
///
/// The frame count in the header is patched on [`SerWriter::finalize`], so
/// the number of frames does not need to be known up front.
pub struct SerWriter {
    writer: BufWriter<File>,
    header: SerHeader,
    timestamps: Vec<u64>,
}

impl SerWriter {
    pub fn create(path: &Path, width: u32, height: u32, color: SerColor) -> Result<Self> {
        let header = SerHeader::new_8bit(width, height, color, 0);
        let mut writer = BufWriter::new(File::create(path)?);
        write_header(&mut writer, &header)?;
        Ok(Self {
            writer,
            header,
            timestamps: Vec::new(),
        })
    }

    pub fn frames_written(&self) -> u32 {
        self.header.frame_count
    }

    /// Append a frame matching the writer's geometry and colour layout.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let planes = self.header.planes_per_pixel();
        let expected: &[usize] = if planes == 1 {
            &[self.header.height as usize, self.header.width as usize]
        } else {
            &[self.header.height as usize, self.header.width as usize, 3]
        };
        if frame.shape() != expected {
            return Err(DetectorError::InvalidFrame(format!(
                "expected shape {expected:?} for this recording, got {:?}",
                frame.shape()
            )));
        }

        if self.header.color() == SerColor::Bgr {
            for row in 0..frame.height() {
                for col in 0..frame.width() {
                    let px = |ch: usize| frame.data[[row, col, ch]];
                    self.writer.write_all(&[px(2), px(1), px(0)])?;
                }
            }
        } else {
            for &v in frame.data.iter() {
                self.writer.write_all(&[v])?;
            }
        }
        if let Some(ts) = frame.metadata.timestamp_us {
            self.timestamps.push(ts);
        }
        self.header.frame_count += 1;
        Ok(())
    }

    /// Write the timestamp trailer (only when every frame had one) and patch
    /// the header frame count.
    pub fn finalize(mut self) -> Result<()> {
        if !self.timestamps.is_empty() && self.timestamps.len() == self.header.frame_count as usize
        {
            for ts in &self.timestamps {
                self.writer.write_all(&ts.to_le_bytes())?;
            }
        }
        self.writer.flush()?;
        let mut file = self
            .writer
            .into_inner()
            .map_err(|e| DetectorError::Io(e.into_error()))?;
        file.seek(SeekFrom::Start(FRAME_COUNT_OFFSET))?;
        file.write_all(&(self.header.frame_count as i32).to_le_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// Byte offset of the FrameCount field.
const FRAME_COUNT_OFFSET: u64 = 14 + 4 * 6;

fn write_header(w: &mut impl Write, header: &SerHeader) -> Result<()> {
    w.write_all(SER_MAGIC)?;
    // LuID
    w.write_all(&0i32.to_le_bytes())?;
    w.write_all(&header.color_id.to_le_bytes())?;
    // 0 = little-endian (Siril convention)
    let le_flag: i32 = if header.little_endian { 0 } else { 1 };
    w.write_all(&le_flag.to_le_bytes())?;
    w.write_all(&(header.width as i32).to_le_bytes())?;
    w.write_all(&(header.height as i32).to_le_bytes())?;
    w.write_all(&(header.pixel_depth as i32).to_le_bytes())?;
    w.write_all(&(header.frame_count as i32).to_le_bytes())?;
    write_fixed_string(w, &header.observer, 40)?;
    write_fixed_string(w, &header.instrument, 40)?;
    write_fixed_string(w, &header.telescope, 40)?;
    w.write_all(&header.date_time.to_le_bytes())?;
    w.write_all(&header.date_time_utc.to_le_bytes())?;

    debug_assert_eq!(
        14 + 4 + 4 + 4 + 4 + 4 + 4 + 4 + 40 + 40 + 40 + 8 + 8,
        SER_HEADER_SIZE
    );
    Ok(())
}

fn write_fixed_string(w: &mut impl Write, s: &str, len: usize) -> Result<()> {
    let bytes = s.as_bytes();
    let n = bytes.len().min(len);
    w.write_all(&bytes[..n])?;
    w.write_all(&vec![0u8; len - n])?;
    Ok(())
}
