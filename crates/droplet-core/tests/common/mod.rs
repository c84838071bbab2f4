#![allow(dead_code)]

use std::time::{Duration, Instant};

use ndarray::Array2;

use droplet_core::camera::synthetic::draw_ellipse;
use droplet_core::config::DetectionConfig;
use droplet_core::frame::Frame;
use droplet_core::io::ser::SER_HEADER_SIZE;

/// Build a SER file header for mono 8-bit frames.
///
/// Returns a `Vec<u8>` containing just the 178-byte header.
/// Append frame pixel data after calling this function.
pub fn build_ser_header(width: u32, height: u32, num_frames: usize) -> Vec<u8> {
    build_ser_header_full(width, height, 8, num_frames, 0)
}

/// Build a SER file header with configurable bit depth and color mode.
///
/// `color_id`: 0=MONO, 8..=19=BAYER, 100=RGB, 101=BGR
pub fn build_ser_header_full(
    width: u32,
    height: u32,
    bit_depth: u32,
    num_frames: usize,
    color_id: i32,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SER_HEADER_SIZE);

    // Magic (14 bytes)
    buf.extend_from_slice(b"LUCAM-RECORDER");
    // LuID
    buf.extend_from_slice(&0i32.to_le_bytes());
    buf.extend_from_slice(&color_id.to_le_bytes());
    // LittleEndian = 0 (little-endian per Siril convention)
    buf.extend_from_slice(&0i32.to_le_bytes());
    buf.extend_from_slice(&(width as i32).to_le_bytes());
    buf.extend_from_slice(&(height as i32).to_le_bytes());
    buf.extend_from_slice(&(bit_depth as i32).to_le_bytes());
    buf.extend_from_slice(&(num_frames as i32).to_le_bytes());
    // Observer, Instrument, Telescope (40 bytes each)
    buf.extend_from_slice(&[0u8; 120]);
    // DateTime, DateTimeUTC
    buf.extend_from_slice(&0u64.to_le_bytes());
    buf.extend_from_slice(&0u64.to_le_bytes());

    assert_eq!(buf.len(), SER_HEADER_SIZE);
    buf
}

/// Build a complete synthetic mono 8-bit SER file with the given frame data.
pub fn build_ser_with_frames(width: u32, height: u32, frames: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = build_ser_header(width, height, frames.len());
    for frame in frames {
        buf.extend_from_slice(frame);
    }
    buf
}

/// Write a SER buffer to a temporary file and return the temp file handle.
///
/// The file stays alive as long as the returned `NamedTempFile` is not dropped.
pub fn write_test_ser(data: &[u8]) -> tempfile::NamedTempFile {
    use std::io::Write;
    let mut f = tempfile::NamedTempFile::new().expect("create temp file");
    f.write_all(data).expect("write SER data");
    f.flush().expect("flush");
    f
}

/// Black mono frame with one white axis-aligned ellipse.
pub fn ellipse_frame(width: usize, height: usize, cx: f64, cy: f64, a: f64, b: f64) -> Frame {
    let mut data = Array2::<u8>::zeros((height, width));
    draw_ellipse(&mut data, cx, cy, a, b, 255);
    Frame::mono(data)
}

pub const SCENE_WIDTH: usize = 400;
pub const SCENE_HEIGHT: usize = 60;
pub const SEMI_MAJOR: f64 = 30.0;
pub const SEMI_MINOR: f64 = 10.0;
pub const WARM_UP_FRAMES: usize = 30;
pub const STEP_PX: f64 = 5.0;
const START_X: f64 = 60.0;

/// Frame `k` (1-based) of the moving-ellipse scene: static for the warm-up
/// frames, then shifted by `STEP_PX` per frame.
pub fn scene_frame(k: usize) -> Frame {
    let shift = k.saturating_sub(WARM_UP_FRAMES) as f64 * STEP_PX;
    ellipse_frame(
        SCENE_WIDTH,
        SCENE_HEIGHT,
        START_X + shift,
        SCENE_HEIGHT as f64 / 2.0,
        SEMI_MAJOR,
        SEMI_MINOR,
    )
    .with_index(k)
}

/// Scene frames from which the moving ellipse no longer overlaps the
/// background ghost left at its start position.
pub fn first_separated_frame() -> usize {
    WARM_UP_FRAMES + (2.0 * SEMI_MAJOR / STEP_PX).ceil() as usize + 2
}

/// Defaults sized for the moving-ellipse scene.
pub fn scene_config() -> DetectionConfig {
    DetectionConfig {
        background_frames: WARM_UP_FRAMES,
        min_area: 100.0,
        max_area: 5_000.0,
        min_aspect_ratio: 1.5,
        max_aspect_ratio: 6.0,
        ..DetectionConfig::default()
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
