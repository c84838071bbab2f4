use std::fs::File;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use memmap2::Mmap;
use ndarray::{Array2, Array3};

use crate::error::{DetectorError, Result};
use crate::frame::{Frame, FrameMetadata};

pub const SER_HEADER_SIZE: usize = 178;
pub const SER_MAGIC: &[u8; 14] = b"LUCAM-RECORDER";

/// Colour layouts this reader can decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SerColor {
    Mono,
    /// Raw Bayer mosaic, decoded as a mono intensity plane.
    Bayer,
    Rgb,
    Bgr,
}

impl std::fmt::Display for SerColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mono => write!(f, "Mono"),
            Self::Bayer => write!(f, "Bayer (as mono)"),
            Self::Rgb => write!(f, "RGB"),
            Self::Bgr => write!(f, "BGR"),
        }
    }
}

/// SER file header (178 bytes).
#[derive(Clone, Debug)]
pub struct SerHeader {
    pub color_id: i32,
    pub little_endian: bool,
    pub width: u32,
    pub height: u32,
    pub pixel_depth: u32,
    pub frame_count: u32,
    pub observer: String,
    pub instrument: String,
    pub telescope: String,
    pub date_time: u64,
    pub date_time_utc: u64,
}

impl SerHeader {
    /// Header for an 8-bit recording of the given geometry.
    pub fn new_8bit(width: u32, height: u32, color: SerColor, frame_count: u32) -> Self {
        let color_id = match color {
            SerColor::Mono | SerColor::Bayer => 0,
            SerColor::Rgb => 100,
            SerColor::Bgr => 101,
        };
        Self {
            color_id,
            little_endian: true,
            width,
            height,
            pixel_depth: 8,
            frame_count,
            observer: String::new(),
            instrument: String::new(),
            telescope: String::new(),
            date_time: 0,
            date_time_utc: 0,
        }
    }

    /// Bytes per pixel plane (1 for 8-bit, 2 for 9-16 bit).
    pub fn bytes_per_pixel_plane(&self) -> usize {
        if self.pixel_depth <= 8 {
            1
        } else {
            2
        }
    }

    /// Number of planes per pixel (1 for mono/bayer, 3 for RGB/BGR).
    pub fn planes_per_pixel(&self) -> usize {
        match self.color() {
            SerColor::Rgb | SerColor::Bgr => 3,
            SerColor::Mono | SerColor::Bayer => 1,
        }
    }

    /// Total bytes per frame, or `None` on overflow.
    pub fn frame_byte_size(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.bytes_per_pixel_plane() * self.planes_per_pixel())
    }

    pub fn color(&self) -> SerColor {
        match self.color_id {
            8..=19 => SerColor::Bayer,
            100 => SerColor::Rgb,
            101 => SerColor::Bgr,
            _ => SerColor::Mono,
        }
    }
}

/// Memory-mapped SER file reader producing 8-bit frames.
pub struct SerReader {
    mmap: Mmap,
    frame_size: usize,
    pub header: SerHeader,
}

impl SerReader {
    /// Open a SER file and parse its header.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the file is opened read-only and only read through the map.
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < SER_HEADER_SIZE {
            return Err(DetectorError::InvalidSer(
                "File too small for SER header".into(),
            ));
        }
        if &mmap[0..14] != SER_MAGIC {
            return Err(DetectorError::InvalidSer(
                "Missing LUCAM-RECORDER magic".into(),
            ));
        }

        let header = parse_header(&mmap[..SER_HEADER_SIZE])?;
        let frame_size = header
            .frame_byte_size()
            .ok_or_else(|| DetectorError::InvalidSer("Frame size overflows".into()))?;

        let expected = frame_size
            .checked_mul(header.frame_count as usize)
            .and_then(|v| v.checked_add(SER_HEADER_SIZE))
            .ok_or_else(|| DetectorError::InvalidSer("Data size overflows".into()))?;
        if mmap.len() < expected {
            return Err(DetectorError::InvalidSer(format!(
                "File truncated: expected at least {} bytes, got {}",
                expected,
                mmap.len()
            )));
        }

        Ok(Self {
            mmap,
            frame_size,
            header,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.header.frame_count as usize
    }

    pub fn width(&self) -> usize {
        self.header.width as usize
    }

    pub fn height(&self) -> usize {
        self.header.height as usize
    }

    /// Raw bytes of a single frame (zero-copy from the map).
    pub fn frame_raw(&self, index: usize) -> Result<&[u8]> {
        let count = self.frame_count();
        if index >= count {
            return Err(DetectorError::FrameIndexOutOfRange {
                index,
                total: count,
            });
        }
        let offset = SER_HEADER_SIZE + index * self.frame_size;
        Ok(&self.mmap[offset..offset + self.frame_size])
    }

    /// Read one frame. Deeper samples are scaled to 8 bits; colour frames
    /// are returned as (height, width, 3) in RGB order.
    pub fn read_frame(&self, index: usize) -> Result<Frame> {
        let raw = self.frame_raw(index)?;
        let (h, w) = (self.height(), self.width());
        let sampler = Sampler {
            bytes_per_sample: self.header.bytes_per_pixel_plane(),
            bit_depth: self.header.pixel_depth,
            little_endian: self.header.little_endian,
        };

        let data = match self.header.color() {
            SerColor::Mono | SerColor::Bayer => {
                Array2::from_shape_fn((h, w), |(row, col)| sampler.get(raw, row * w + col))
                    .into_dyn()
            }
            color @ (SerColor::Rgb | SerColor::Bgr) => {
                Array3::from_shape_fn((h, w, 3), |(row, col, ch)| {
                    let plane = if color == SerColor::Bgr { 2 - ch } else { ch };
                    sampler.get(raw, (row * w + col) * 3 + plane)
                })
                .into_dyn()
            }
        };

        Ok(Frame {
            data,
            metadata: FrameMetadata {
                frame_index: index,
                timestamp_us: self.read_timestamp(index),
            },
        })
    }

    /// Per-frame timestamp from the optional trailer.
    fn read_timestamp(&self, index: usize) -> Option<u64> {
        let trailer_offset = SER_HEADER_SIZE + self.frame_size * self.frame_count();
        let ts_offset = trailer_offset + index * 8;
        let bytes = self.mmap.get(ts_offset..ts_offset + 8)?;
        Some(u64::from_le_bytes(bytes.try_into().ok()?))
    }

    /// Iterator over all frames.
    pub fn frames(&self) -> impl Iterator<Item = Result<Frame>> + '_ {
        (0..self.frame_count()).map(move |i| self.read_frame(i))
    }
}

/// Decodes one sample to 8 bits.
struct Sampler {
    bytes_per_sample: usize,
    bit_depth: u32,
    little_endian: bool,
}

impl Sampler {
    fn get(&self, raw: &[u8], sample_index: usize) -> u8 {
        let idx = sample_index * self.bytes_per_sample;
        if self.bytes_per_sample == 1 {
            return raw[idx];
        }
        let pair = [raw[idx], raw[idx + 1]];
        let v = if self.little_endian {
            u16::from_le_bytes(pair)
        } else {
            u16::from_be_bytes(pair)
        };
        let shift = self.bit_depth.clamp(8, 16) - 8;
        (v >> shift).min(255) as u8
    }
}

fn parse_header(buf: &[u8]) -> Result<SerHeader> {
    let mut cursor = std::io::Cursor::new(&buf[14..]);

    let _lu_id = cursor.read_i32::<LittleEndian>()?;
    let color_id = cursor.read_i32::<LittleEndian>()?;
    let le_flag = cursor.read_i32::<LittleEndian>()?;
    let width = cursor.read_i32::<LittleEndian>()?;
    let height = cursor.read_i32::<LittleEndian>()?;
    let pixel_depth = cursor.read_i32::<LittleEndian>()?;
    let frame_count = cursor.read_i32::<LittleEndian>()?;

    let observer = read_fixed_string(&buf[42..82]);
    let instrument = read_fixed_string(&buf[82..122]);
    let telescope = read_fixed_string(&buf[122..162]);

    let mut cursor = std::io::Cursor::new(&buf[162..]);
    let date_time = cursor.read_u64::<LittleEndian>()?;
    let date_time_utc = cursor.read_u64::<LittleEndian>()?;

    if width <= 0 || height <= 0 {
        return Err(DetectorError::InvalidSer(format!(
            "Invalid dimensions {width}x{height}"
        )));
    }
    if !(1..=16).contains(&pixel_depth) {
        return Err(DetectorError::InvalidSer(format!(
            "Unsupported pixel depth {pixel_depth}"
        )));
    }
    if frame_count < 0 {
        return Err(DetectorError::InvalidSer(format!(
            "Negative frame count {frame_count}"
        )));
    }

    // A zero flag is little-endian in practice (Siril convention).
    let little_endian = le_flag != 1;

    Ok(SerHeader {
        color_id,
        little_endian,
        width: width as u32,
        height: height as u32,
        pixel_depth: pixel_depth as u32,
        frame_count: frame_count as u32,
        observer,
        instrument,
        telescope,
        date_time,
        date_time_utc,
    })
}

fn read_fixed_string(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}
