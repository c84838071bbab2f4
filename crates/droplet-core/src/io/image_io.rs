use std::path::Path;

use image::{DynamicImage, GrayImage, RgbImage};
use ndarray::{Array2, Array3};

use crate::error::{DetectorError, Result};
use crate::frame::Frame;

/// Extensions picked up when scanning image directories.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["png", "tif", "tiff", "bmp", "jpg"];

/// Load an image as an 8-bit frame. Grayscale images become 2-D frames,
/// everything else is converted to RGB.
pub fn load_image(path: &Path) -> Result<Frame> {
    let img = image::open(path)?;
    let frame = match img {
        DynamicImage::ImageLuma8(gray) => {
            let (w, h) = gray.dimensions();
            let data = Array2::from_shape_vec((h as usize, w as usize), gray.into_raw())
                .map_err(|e| DetectorError::InvalidFrame(e.to_string()))?;
            Frame::mono(data)
        }
        DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLumaA16(_) => {
            let gray = img.to_luma8();
            let (w, h) = gray.dimensions();
            let data = Array2::from_shape_vec((h as usize, w as usize), gray.into_raw())
                .map_err(|e| DetectorError::InvalidFrame(e.to_string()))?;
            Frame::mono(data)
        }
        other => {
            let rgb = other.to_rgb8();
            let (w, h) = rgb.dimensions();
            let data = Array3::from_shape_vec((h as usize, w as usize, 3), rgb.into_raw())
                .map_err(|e| DetectorError::InvalidFrame(e.to_string()))?;
            Frame::rgb(data)
        }
    };
    Ok(frame)
}

/// Save a mono or RGB frame; the format follows the file extension.
pub fn save_image(frame: &Frame, path: &Path) -> Result<()> {
    frame.validate()?;
    let (h, w) = (frame.height() as u32, frame.width() as u32);
    let pixels: Vec<u8> = frame.data.iter().copied().collect();
    let size_error = || DetectorError::InvalidFrame(format!("shape {:?}", frame.shape()));

    match frame.shape() {
        [_, _] => GrayImage::from_raw(w, h, pixels)
            .ok_or_else(size_error)?
            .save(path)?,
        [_, _, 3] => RgbImage::from_raw(w, h, pixels)
            .ok_or_else(size_error)?
            .save(path)?,
        other => {
            return Err(DetectorError::InvalidFrame(format!(
                "cannot save frame with shape {other:?}"
            )))
        }
    }
    Ok(())
}

pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
