use ndarray::Array2;
use tracing::debug;

use crate::config::DetectionConfig;
use crate::consts::U8_MAX;

use super::contour::Contour;

/// Centroids reported in the previous frame. Replaced wholesale every
/// frame; no identity is kept beyond one step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CentroidHistory {
    centroids: Vec<(f64, f64)>,
}

impl CentroidHistory {
    pub fn replace(&mut self, centroids: Vec<(f64, f64)>) {
        self.centroids = centroids;
    }

    pub fn clear(&mut self) {
        self.centroids.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.centroids.len()
    }

    pub fn as_slice(&self) -> &[(f64, f64)] {
        &self.centroids
    }
}

/// Whether the rejector has anything to compare against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectorState {
    /// No previous centroids: everything passes and seeds the history.
    Cold,
    /// Contours must have moved downstream relative to a previous centroid.
    Warm,
}

/// Drops contours that have not moved along the flow (+x) since the
/// previous frame, such as debris stuck to the channel.
///
/// Two rules are available: centroid matching against the previous
/// frame's droplets ([`ArtifactRejector::filter`]), or the intensity change
/// under each centroid ([`ArtifactRejector::filter_by_frame_difference`]).
#[derive(Clone, Debug)]
pub struct ArtifactRejector {
    min_motion: f64,
    max_perp_drift: f64,
    accept_entering: bool,
    use_frame_diff: bool,
    /// In [0, 1] intensity units.
    frame_diff_threshold: f32,
    previous_frame: Option<Array2<f32>>,
}

impl ArtifactRejector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            min_motion: config.min_motion,
            max_perp_drift: config.max_perp_drift,
            accept_entering: config.accept_entering,
            use_frame_diff: config.use_frame_diff,
            frame_diff_threshold: config.frame_diff_threshold / U8_MAX,
            previous_frame: None,
        }
    }

    /// Take over new parameters, keeping the previous frame.
    pub fn apply_config(&mut self, config: &DetectionConfig) {
        let previous_frame = self.previous_frame.take();
        *self = Self::new(config);
        self.previous_frame = previous_frame;
    }

    /// Whether [`ArtifactRejector::filter_by_frame_difference`] is the
    /// active rule.
    pub fn uses_frame_difference(&self) -> bool {
        self.use_frame_diff
    }

    /// Forget the previous frame.
    pub fn reset(&mut self) {
        self.previous_frame = None;
    }

    pub fn state(previous: &CentroidHistory) -> RejectorState {
        if previous.is_empty() {
            RejectorState::Cold
        } else {
            RejectorState::Warm
        }
    }

    /// Keep a contour when some previous centroid lies within
    /// `max_perp_drift` across the flow and more than `min_motion` behind
    /// it along the flow. With `accept_entering`, contours with no previous
    /// centroid nearby are kept as well. Contours without a centroid are
    /// skipped.
    pub fn filter(&self, contours: Vec<Contour>, previous: &CentroidHistory) -> Vec<Contour> {
        if Self::state(previous) == RejectorState::Cold {
            return contours;
        }

        contours
            .into_iter()
            .filter(|contour| match contour.centroid() {
                Ok(centroid) => {
                    self.moved_downstream(centroid, previous)
                        || (self.accept_entering && self.is_untracked(centroid, previous))
                }
                Err(e) => {
                    debug!(error = %e, "Skipping contour without centroid");
                    false
                }
            })
            .collect()
    }

    fn moved_downstream(&self, (cx, cy): (f64, f64), previous: &CentroidHistory) -> bool {
        previous.as_slice().iter().any(|&(px, py)| {
            (cy - py).abs() < self.max_perp_drift && cx - px > self.min_motion
        })
    }

    /// No previous centroid within twice the drift bound on either axis.
    fn is_untracked(&self, (cx, cy): (f64, f64), previous: &CentroidHistory) -> bool {
        let reach = 2.0 * self.max_perp_drift;
        !previous
            .as_slice()
            .iter()
            .any(|&(px, py)| (cx - px).abs() < reach && (cy - py).abs() < reach)
    }

    /// Keep contours whose centroid pixel changed by more than the frame
    /// difference threshold since the previous frame. The first frame, or
    /// the first after a shape change, passes everything. `gray` becomes
    /// the previous frame either way.
    pub fn filter_by_frame_difference(
        &mut self,
        contours: Vec<Contour>,
        gray: &Array2<f32>,
    ) -> Vec<Contour> {
        let previous = match self.previous_frame.replace(gray.clone()) {
            Some(previous) if previous.dim() == gray.dim() => previous,
            _ => return contours,
        };

        let threshold = self.frame_diff_threshold;
        let (height, width) = gray.dim();
        contours
            .into_iter()
            .filter(|contour| match contour.centroid() {
                Ok((cx, cy)) => {
                    if cx < 0.0 || cy < 0.0 {
                        return false;
                    }
                    let (col, row) = (cx as usize, cy as usize);
                    row < height
                        && col < width
                        && (gray[[row, col]] - previous[[row, col]]).abs() > threshold
                }
                Err(e) => {
                    debug!(error = %e, "Skipping contour without centroid");
                    false
                }
            })
            .collect()
    }
}

