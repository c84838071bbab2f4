use ndarray::Array2;

use crate::config::{ChannelBand, DetectionConfig};

use super::contour::{find_external_contours, Contour};

/// Mask to candidate droplet contours, filtered by area, aspect ratio and
/// an optional channel band.
#[derive(Clone, Debug)]
pub struct Segmenter {
    min_area: f64,
    max_area: f64,
    min_aspect_ratio: f64,
    max_aspect_ratio: f64,
    band_margin: f64,
}

impl Segmenter {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            min_area: config.min_area,
            max_area: config.max_area,
            min_aspect_ratio: config.min_aspect_ratio,
            max_aspect_ratio: config.max_aspect_ratio,
            band_margin: config.channel_band_margin as f64,
        }
    }

    pub fn apply_config(&mut self, config: &DetectionConfig) {
        *self = Self::new(config);
    }

    /// External contours passing every filter. `channel_band` is in mask
    /// rows; a contour passes it when its bounding-box centre lies within
    /// the band widened by the configured margin.
    pub fn detect(&self, mask: &Array2<bool>, channel_band: Option<ChannelBand>) -> Vec<Contour> {
        find_external_contours(mask)
            .into_iter()
            .filter(|c| self.accepts(c, channel_band))
            .collect()
    }

    fn accepts(&self, contour: &Contour, channel_band: Option<ChannelBand>) -> bool {
        let area = contour.area();
        if area < self.min_area || area > self.max_area {
            return false;
        }

        let bbox = contour.bounding_box();
        let aspect = bbox.aspect_ratio();
        if aspect < self.min_aspect_ratio || aspect > self.max_aspect_ratio {
            return false;
        }

        if let Some((y_min, y_max)) = channel_band {
            let (_, cy) = bbox.center();
            if cy < y_min as f64 - self.band_margin || cy > y_max as f64 + self.band_margin {
                return false;
            }
        }
        true
    }
}
