use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{Calibration, DetectionConfig};
use crate::error::Result;

use super::contour::{BoundingBox, Contour};

/// Geometry of one detected droplet.
///
/// Pixel lengths are offset-corrected; micrometre values are the corrected
/// pixel values times `um_per_px`. Area and centroid are never corrected.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DropletMetrics {
    pub area_px: f64,
    pub area_um2: f64,
    pub bounding_box: BoundingBox,
    pub centroid: (f64, f64),
    pub aspect_ratio: f64,
    pub major_axis_px: f64,
    pub major_axis_um: f64,
    pub equivalent_diameter_px: f64,
    pub equivalent_diameter_um: f64,
}

impl DropletMetrics {
    pub fn radius_px(&self) -> f64 {
        self.equivalent_diameter_px / 2.0
    }

    pub fn radius_um(&self) -> f64 {
        self.equivalent_diameter_um / 2.0
    }

    /// Shorter bounding-box side, the droplet height across the channel.
    pub fn minor_extent_px(&self) -> f64 {
        self.bounding_box.width.min(self.bounding_box.height) as f64
    }
}

/// Diameter of the circle with the given area.
pub fn equivalent_diameter(area: f64) -> f64 {
    (4.0 * area / std::f64::consts::PI).sqrt()
}

/// Apply a radius offset to a diameter, clamping the radius at zero.
pub fn correct_diameter(diameter: f64, radius_offset_px: f64) -> f64 {
    (diameter / 2.0 + radius_offset_px).max(0.0) * 2.0
}

#[derive(Clone, Debug)]
pub struct Measurer {
    min_contour_points: usize,
}

impl Measurer {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            min_contour_points: config.min_contour_points,
        }
    }

    pub fn apply_config(&mut self, config: &DetectionConfig) {
        self.min_contour_points = config.min_contour_points;
    }

    /// Metrics for every contour with a non-zero area. Contours whose
    /// moments cannot be computed are skipped.
    pub fn measure(&self, contours: &[Contour], calibration: &Calibration) -> Vec<DropletMetrics> {
        contours
            .iter()
            .filter_map(|c| match self.measure_one(c, calibration) {
                Ok(m) => m,
                Err(e) => {
                    debug!(points = c.len(), error = %e, "Skipping contour");
                    None
                }
            })
            .collect()
    }

    fn measure_one(
        &self,
        contour: &Contour,
        calibration: &Calibration,
    ) -> Result<Option<DropletMetrics>> {
        let area = contour.area();
        if area == 0.0 {
            return Ok(None);
        }

        let bounding_box = contour.bounding_box();
        let centroid = contour.centroid()?;
        let bbox_major = bounding_box.width.max(bounding_box.height) as f64;
        let major_raw = if contour.len() >= self.min_contour_points {
            contour
                .fit_ellipse()
                .map(|e| e.major_axis)
                .unwrap_or(bbox_major)
        } else {
            bbox_major
        };

        let offset = calibration.radius_offset_px;
        let scale = calibration.um_per_px;
        let major_axis_px = correct_diameter(major_raw, offset);
        let equivalent_diameter_px = correct_diameter(equivalent_diameter(area), offset);

        Ok(Some(DropletMetrics {
            area_px: area,
            area_um2: area * scale * scale,
            bounding_box,
            centroid,
            aspect_ratio: bounding_box.aspect_ratio(),
            major_axis_px,
            major_axis_um: major_axis_px * scale,
            equivalent_diameter_px,
            equivalent_diameter_um: equivalent_diameter_px * scale,
        }))
    }
}
