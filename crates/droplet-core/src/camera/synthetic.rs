use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::Calibration;
use crate::error::Result;
use crate::frame::{Frame, FrameMetadata, Roi};

use super::{check_roi, FrameSource};

/// Parameters of the simulated microfluidic channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub width: usize,
    pub height: usize,
    /// Centre row of the channel.
    pub channel_center_y: f64,
    /// Channel height; walls are drawn at its edges.
    pub channel_height: f64,
    /// Droplet semi-axes along and across the flow.
    pub droplet_semi_major: f64,
    pub droplet_semi_minor: f64,
    /// Distance between consecutive droplets along the flow.
    pub spacing: f64,
    /// Flow speed in pixels per frame.
    pub speed: f64,
    /// Maximum perpendicular jitter of each droplet.
    pub jitter: f64,
    pub background_level: u8,
    pub droplet_level: u8,
    pub wall_level: u8,
    /// Uniform noise amplitude (+/-) in 8-bit units.
    pub noise: u8,
    /// Static specks stuck in the channel, as (x, y).
    pub debris: Vec<(f64, f64)>,
    pub seed: u64,
    /// Stop after this many frames; unlimited when `None`.
    pub frame_limit: Option<usize>,
    pub frame_interval_us: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 240,
            channel_center_y: 120.0,
            channel_height: 60.0,
            droplet_semi_major: 20.0,
            droplet_semi_minor: 12.0,
            spacing: 140.0,
            speed: 6.0,
            jitter: 1.5,
            background_level: 20,
            droplet_level: 210,
            wall_level: 90,
            noise: 0,
            debris: Vec::new(),
            seed: 7,
            frame_limit: None,
            frame_interval_us: 10_000,
        }
    }
}

/// Deterministic simulated camera: bright droplets travelling along +x
/// through a horizontal channel, over a static background.
pub struct SyntheticCamera {
    config: SyntheticConfig,
    roi: Option<Roi>,
    hardware_roi: bool,
    calibration: Option<Calibration>,
    frame_index: usize,
    noise_rng: ChaCha8Rng,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticConfig) -> Self {
        let noise_rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            config,
            roi: None,
            hardware_roi: false,
            calibration: None,
            frame_index: 0,
            noise_rng,
        }
    }

    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = Some(calibration);
        self
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    /// Default ROI: the channel plus a small margin, full width.
    pub fn channel_roi(&self) -> Roi {
        let margin = 10.0;
        let top = (self.config.channel_center_y - self.config.channel_height / 2.0 - margin)
            .max(0.0) as u32;
        let bottom = (self.config.channel_center_y + self.config.channel_height / 2.0 + margin)
            .min(self.config.height as f64) as u32;
        Roi::new(0, top, self.config.width as u32, bottom.saturating_sub(top).max(1))
    }

    /// Centres of the droplets visible at `frame_index`, in sensor coordinates.
    pub fn droplet_centers(&self, frame_index: usize) -> Vec<(f64, f64)> {
        let cfg = &self.config;
        let travelled = frame_index as f64 * cfg.speed;
        let a = cfg.droplet_semi_major;
        let spacing = cfg.spacing.max(1.0);

        // Droplet k enters at x = -a when travelled == k * spacing.
        let newest = (travelled / spacing).floor() as i64;
        let mut centers = Vec::new();
        let mut k = newest;
        while k >= 0 {
            let x = travelled - k as f64 * spacing - a;
            if x - a > cfg.width as f64 {
                break;
            }
            centers.push((x, cfg.channel_center_y + self.jitter_for(k as u64)));
            k -= 1;
        }
        centers
    }

    fn jitter_for(&self, droplet: u64) -> f64 {
        if self.config.jitter <= 0.0 {
            return 0.0;
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed ^ droplet.wrapping_mul(0x9E37_79B9));
        rng.gen_range(-self.config.jitter..=self.config.jitter)
    }

    fn render(&mut self, region: Roi) -> Array2<u8> {
        let cfg = &self.config;
        let (x0, y0) = (region.x as f64, region.y as f64);
        let (h, w) = (region.height as usize, region.width as usize);
        let mut data = Array2::from_elem((h, w), cfg.background_level);

        let wall_top = (cfg.channel_center_y - cfg.channel_height / 2.0).round();
        let wall_bottom = (cfg.channel_center_y + cfg.channel_height / 2.0).round();
        for (row, mut line) in data.rows_mut().into_iter().enumerate() {
            let y = y0 + row as f64;
            if (y - wall_top).abs() < 1.0 || (y - wall_bottom).abs() < 1.0 {
                line.fill(cfg.wall_level);
            }
        }

        for &(dx, dy) in &cfg.debris {
            draw_ellipse(&mut data, dx - x0, dy - y0, 2.0, 2.0, cfg.droplet_level);
        }
        let centers = self.droplet_centers(self.frame_index);
        let cfg = &self.config;
        for (cx, cy) in centers {
            draw_ellipse(
                &mut data,
                cx - x0,
                cy - y0,
                cfg.droplet_semi_major,
                cfg.droplet_semi_minor,
                cfg.droplet_level,
            );
        }

        if cfg.noise > 0 {
            let amp = cfg.noise as i16;
            for v in data.iter_mut() {
                let n: i16 = self.noise_rng.gen_range(-amp..=amp);
                *v = (*v as i16 + n).clamp(0, 255) as u8;
            }
        }
        data
    }

    fn next_frame(&mut self, region: Roi) -> Option<Frame> {
        if self
            .config
            .frame_limit
            .is_some_and(|limit| self.frame_index >= limit)
        {
            return None;
        }
        let data = self.render(region);
        let metadata = FrameMetadata {
            frame_index: self.frame_index,
            timestamp_us: Some(self.frame_index as u64 * self.config.frame_interval_us),
        };
        self.frame_index += 1;
        Some(Frame {
            data: data.into_dyn(),
            metadata,
        })
    }

    fn full_sensor(&self) -> Roi {
        Roi::new(0, 0, self.config.width as u32, self.config.height as u32)
    }
}

impl FrameSource for SyntheticCamera {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn sensor_size(&self) -> (usize, usize) {
        (self.config.width, self.config.height)
    }

    fn roi(&self) -> Option<Roi> {
        self.roi
    }

    fn set_roi(&mut self, roi: Roi) -> Result<()> {
        check_roi(&roi, self.sensor_size())?;
        self.roi = Some(roi);
        self.hardware_roi = false;
        Ok(())
    }

    fn clear_roi(&mut self) {
        self.roi = None;
        self.hardware_roi = false;
    }

    fn capture_frame(&mut self) -> Result<Option<Frame>> {
        let region = match (self.hardware_roi, self.roi) {
            (true, Some(roi)) => roi,
            _ => self.full_sensor(),
        };
        Ok(self.next_frame(region))
    }

    fn frame_roi(&mut self, roi: &Roi) -> Result<Option<Frame>> {
        check_roi(roi, self.sensor_size())?;
        // Rendering straight into the region is equivalent to cropping.
        Ok(self.next_frame(*roi))
    }

    fn set_hardware_roi(&mut self, roi: Roi) -> Result<()> {
        check_roi(&roi, self.sensor_size())?;
        self.roi = Some(roi);
        self.hardware_roi = true;
        Ok(())
    }

    fn calibration(&self) -> Option<Calibration> {
        self.calibration
    }

    fn frame_count(&self) -> Option<usize> {
        self.config.frame_limit
    }
}

/// Fill the axis-aligned ellipse with centre `(cx, cy)` and semi-axes
/// `(a, b)`; pixels outside the image are skipped.
pub fn draw_ellipse(data: &mut Array2<u8>, cx: f64, cy: f64, a: f64, b: f64, value: u8) {
    let (h, w) = data.dim();
    if a <= 0.0 || b <= 0.0 {
        return;
    }
    let r0 = (cy - b).floor().max(0.0) as usize;
    let r1 = ((cy + b).ceil() + 1.0).clamp(0.0, h as f64) as usize;
    let c0 = (cx - a).floor().max(0.0) as usize;
    let c1 = ((cx + a).ceil() + 1.0).clamp(0.0, w as f64) as usize;
    for row in r0..r1 {
        for col in c0..c1 {
            let nx = (col as f64 - cx) / a;
            let ny = (row as f64 - cy) / b;
            if nx * nx + ny * ny <= 1.0 {
                data[[row, col]] = value;
            }
        }
    }
}
