use serde::{Deserialize, Deserializer, Serialize};

use crate::consts::{
    DEFAULT_BACKGROUND_FRAMES, DEFAULT_HISTOGRAM_BINS, DEFAULT_HISTOGRAM_WINDOW,
    DEFAULT_RAW_LOG_CAPACITY, MIN_ELLIPSE_POINTS,
};
use crate::error::{DetectorError, Result};

/// How the static scene is removed before thresholding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundMethod {
    /// Absolute difference against a per-pixel median of warm-up frames.
    #[default]
    Static,
    /// Subtract a heavily blurred copy of the frame; no warm-up.
    Highpass,
}

/// Method used to turn the corrected intensity into a binary mask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMethod {
    /// Otsu's method: maximizes between-class variance on the frame histogram.
    #[default]
    Otsu,
    /// Local mean over a square block plus a constant offset.
    Adaptive,
}

/// Morphological clean-up applied to the mask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MorphOperation {
    #[default]
    Open,
    Close,
    /// Opening followed by closing.
    Both,
}

impl std::fmt::Display for BackgroundMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static => write!(f, "Static"),
            Self::Highpass => write!(f, "High-pass"),
        }
    }
}

impl std::fmt::Display for ThresholdMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Otsu => write!(f, "Otsu"),
            Self::Adaptive => write!(f, "Adaptive"),
        }
    }
}

impl std::fmt::Display for MorphOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::Close => write!(f, "Close"),
            Self::Both => write!(f, "Open + Close"),
        }
    }
}

/// Per-camera mapping from pixels to micrometres plus the radius bias
/// introduced by thresholding.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub um_per_px: f64,
    pub radius_offset_px: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            um_per_px: 1.0,
            radius_offset_px: 0.0,
        }
    }
}

impl Calibration {
    /// Unit label used in histogram payloads.
    pub fn unit(&self) -> &'static str {
        if self.um_per_px != 1.0 {
            "um"
        } else {
            "px"
        }
    }
}

/// Horizontal channel band in ROI-local rows: `(y_min, y_max)`.
pub type ChannelBand = (u32, u32);

/// Tunable parameters of the detection pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    // Preprocessing
    pub background_method: BackgroundMethod,
    /// Frames accumulated before the static background median is computed.
    pub background_frames: usize,
    /// Odd kernel size of the high-pass blur.
    #[serde(alias = "gaussian_blur_kernel", deserialize_with = "kernel_size")]
    pub blur_kernel_size: usize,
    pub threshold_method: ThresholdMethod,
    /// Odd block size of the adaptive threshold.
    pub adaptive_block_size: usize,
    /// Adaptive offset, in 8-bit intensity units.
    #[serde(alias = "adaptive_C")]
    pub adaptive_c: f32,
    /// Odd size of the elliptical structuring element.
    #[serde(deserialize_with = "kernel_size")]
    pub morph_kernel_size: usize,
    pub morph_operation: MorphOperation,

    // Segmentation
    pub min_area: f64,
    pub max_area: f64,
    pub min_aspect_ratio: f64,
    pub max_aspect_ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_band: Option<ChannelBand>,
    pub channel_band_margin: u32,

    // Artifact rejection
    /// Minimum downstream (x) displacement between frames, in pixels.
    pub min_motion: f64,
    /// Maximum perpendicular (y) drift between frames, in pixels.
    pub max_perp_drift: f64,
    /// Also keep contours with no previous centroid nearby, i.e. droplets
    /// entering the field of view while others are being tracked.
    pub accept_entering: bool,
    /// Keep only contours whose centroid changed by more than
    /// `frame_diff_threshold` since the previous frame, instead of
    /// matching centroids.
    pub use_frame_diff: bool,
    /// Frame difference threshold, in 8-bit intensity units.
    pub frame_diff_threshold: f32,

    // Measurement
    pub min_contour_points: usize,

    // Histogram / log
    pub histogram_window_size: usize,
    pub histogram_bins: usize,
    pub raw_log_capacity: usize,

    // Calibration
    #[serde(alias = "pixel_ratio")]
    pub um_per_px: f64,
    pub radius_offset_px: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            background_method: BackgroundMethod::default(),
            background_frames: DEFAULT_BACKGROUND_FRAMES,
            blur_kernel_size: 11,
            threshold_method: ThresholdMethod::default(),
            adaptive_block_size: 11,
            adaptive_c: 2.0,
            morph_kernel_size: 3,
            morph_operation: MorphOperation::default(),
            min_area: 20.0,
            max_area: 5000.0,
            min_aspect_ratio: 0.5,
            max_aspect_ratio: 3.0,
            channel_band: None,
            channel_band_margin: 10,
            min_motion: 0.5,
            max_perp_drift: 5.0,
            accept_entering: false,
            use_frame_diff: false,
            frame_diff_threshold: 30.0,
            min_contour_points: MIN_ELLIPSE_POINTS,
            histogram_window_size: DEFAULT_HISTOGRAM_WINDOW,
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
            raw_log_capacity: DEFAULT_RAW_LOG_CAPACITY,
            um_per_px: 1.0,
            radius_offset_px: 0.0,
        }
    }
}

const MAX_HISTOGRAM_WINDOW: usize = 100_000;
const MAX_HISTOGRAM_BINS: usize = 1_000;

impl DetectionConfig {
    /// Named parameter sets for common droplet regimes.
    pub fn preset(name: &str) -> Option<Self> {
        let base = Self::default();
        match name {
            "default" => Some(base),
            "small_droplets" => Some(Self {
                min_area: 10.0,
                max_area: 1000.0,
                min_aspect_ratio: 1.2,
                max_aspect_ratio: 8.0,
                ..base
            }),
            "large_droplets" => Some(Self {
                min_area: 100.0,
                max_area: 10_000.0,
                min_aspect_ratio: 2.0,
                max_aspect_ratio: 15.0,
                ..base
            }),
            "high_density" => Some(Self {
                min_area: 20.0,
                max_area: 5000.0,
                min_aspect_ratio: 1.5,
                max_aspect_ratio: 10.0,
                morph_kernel_size: 5,
                ..base
            }),
            _ => None,
        }
    }

    pub const PRESETS: [&'static str; 4] =
        ["default", "small_droplets", "large_droplets", "high_density"];

    pub fn calibration(&self) -> Calibration {
        Calibration {
            um_per_px: self.um_per_px,
            radius_offset_px: self.radius_offset_px,
        }
    }

    pub fn set_calibration(&mut self, calibration: Calibration) {
        self.um_per_px = calibration.um_per_px;
        self.radius_offset_px = calibration.radius_offset_px;
    }

    /// Check every rule and report all violations at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.background_frames < 1 {
            errors.push("background_frames must be >= 1".to_string());
        }
        check_odd_kernel(&mut errors, "blur_kernel_size", self.blur_kernel_size, 3);
        check_odd_kernel(&mut errors, "adaptive_block_size", self.adaptive_block_size, 3);
        check_odd_kernel(&mut errors, "morph_kernel_size", self.morph_kernel_size, 1);
        if !self.adaptive_c.is_finite() {
            errors.push("adaptive_c must be finite".to_string());
        }

        if !(self.min_area >= 0.0) {
            errors.push("min_area must be >= 0".to_string());
        }
        if !(self.max_area > self.min_area) {
            errors.push("max_area must be > min_area".to_string());
        }
        if !(self.min_aspect_ratio > 0.0) {
            errors.push("min_aspect_ratio must be > 0".to_string());
        }
        if !(self.max_aspect_ratio > self.min_aspect_ratio) {
            errors.push("max_aspect_ratio must be > min_aspect_ratio".to_string());
        }
        if let Some((y_min, y_max)) = self.channel_band {
            if y_min >= y_max {
                errors.push(format!(
                    "channel_band must satisfy y_min < y_max (got {y_min}..{y_max})"
                ));
            }
        }

        if !(self.min_motion >= 0.0) {
            errors.push("min_motion must be >= 0".to_string());
        }
        if !(self.max_perp_drift >= 0.0) {
            errors.push("max_perp_drift must be >= 0".to_string());
        }
        if !(0.0..=255.0).contains(&self.frame_diff_threshold) {
            errors.push("frame_diff_threshold must be in 0..=255".to_string());
        }
        if self.min_contour_points < MIN_ELLIPSE_POINTS {
            errors.push(format!("min_contour_points must be >= {MIN_ELLIPSE_POINTS}"));
        }

        if !(1..=MAX_HISTOGRAM_WINDOW).contains(&self.histogram_window_size) {
            errors.push(format!(
                "histogram_window_size must be in 1..={MAX_HISTOGRAM_WINDOW}"
            ));
        }
        if !(1..=MAX_HISTOGRAM_BINS).contains(&self.histogram_bins) {
            errors.push(format!("histogram_bins must be in 1..={MAX_HISTOGRAM_BINS}"));
        }
        if self.raw_log_capacity < 1 {
            errors.push("raw_log_capacity must be >= 1".to_string());
        }

        if !(self.um_per_px > 0.0 && self.um_per_px.is_finite()) {
            errors.push("um_per_px must be a positive finite number".to_string());
        }
        if !self.radius_offset_px.is_finite() {
            errors.push("radius_offset_px must be finite".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DetectorError::InvalidConfig(errors))
        }
    }

    /// True when switching to `other` requires the background model to be rebuilt.
    pub fn background_changed(&self, other: &Self) -> bool {
        self.background_method != other.background_method
            || self.background_frames != other.background_frames
            || self.blur_kernel_size != other.blur_kernel_size
    }

    /// True when switching to `other` requires new histogram windows.
    pub fn histogram_shape_changed(&self, other: &Self) -> bool {
        self.histogram_window_size != other.histogram_window_size
            || self.histogram_bins != other.histogram_bins
    }
}

fn check_odd_kernel(errors: &mut Vec<String>, name: &str, value: usize, min: usize) {
    if value < min || value % 2 == 0 {
        errors.push(format!("{name} must be odd and >= {min} (got {value})"));
    }
}

/// Kernel sizes are written as `n`, or as a square `[n, n]` by older
/// profiles.
#[derive(Deserialize)]
#[serde(untagged)]
enum KernelSizeRepr {
    Single(usize),
    Square([usize; 2]),
}

impl KernelSizeRepr {
    fn into_size<E: serde::de::Error>(self) -> std::result::Result<usize, E> {
        match self {
            Self::Single(n) => Ok(n),
            Self::Square([h, w]) if h == w => Ok(h),
            Self::Square([h, w]) => Err(E::custom(format!(
                "kernel size must be square, got [{h}, {w}]"
            ))),
        }
    }
}

fn kernel_size<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<usize, D::Error> {
    KernelSizeRepr::deserialize(deserializer)?.into_size()
}

fn optional_kernel_size<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<usize>, D::Error> {
    Option::<KernelSizeRepr>::deserialize(deserializer)?
        .map(KernelSizeRepr::into_size)
        .transpose()
}

/// Partial update of a [`DetectionConfig`]. Absent fields keep their
/// current value; unknown keys are rejected.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigPatch {
    pub background_method: Option<BackgroundMethod>,
    pub background_frames: Option<usize>,
    #[serde(alias = "gaussian_blur_kernel", deserialize_with = "optional_kernel_size")]
    pub blur_kernel_size: Option<usize>,
    pub threshold_method: Option<ThresholdMethod>,
    pub adaptive_block_size: Option<usize>,
    #[serde(alias = "adaptive_C")]
    pub adaptive_c: Option<f32>,
    #[serde(deserialize_with = "optional_kernel_size")]
    pub morph_kernel_size: Option<usize>,
    pub morph_operation: Option<MorphOperation>,
    pub min_area: Option<f64>,
    pub max_area: Option<f64>,
    pub min_aspect_ratio: Option<f64>,
    pub max_aspect_ratio: Option<f64>,
    pub channel_band: Option<ChannelBand>,
    /// Remove a previously configured channel band.
    pub clear_channel_band: Option<bool>,
    pub channel_band_margin: Option<u32>,
    pub min_motion: Option<f64>,
    pub max_perp_drift: Option<f64>,
    pub accept_entering: Option<bool>,
    pub use_frame_diff: Option<bool>,
    pub frame_diff_threshold: Option<f32>,
    pub min_contour_points: Option<usize>,
    pub histogram_window_size: Option<usize>,
    pub histogram_bins: Option<usize>,
    pub raw_log_capacity: Option<usize>,
    #[serde(alias = "pixel_ratio")]
    pub um_per_px: Option<f64>,
    pub radius_offset_px: Option<f64>,
}

macro_rules! patch_fields {
    ($patch:expr, $target:expr, $($field:ident),+ $(,)?) => {
        $(
            if let Some(v) = $patch.$field {
                $target.$field = v;
            }
        )+
    };
}

impl ConfigPatch {
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(|e| {
            DetectorError::InvalidConfig(vec![format!("malformed config update: {e}")])
        })
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply on top of `base` and validate. `base` is left untouched, so a
    /// rejected patch changes nothing.
    pub fn apply(&self, base: &DetectionConfig) -> Result<DetectionConfig> {
        let mut next = base.clone();
        patch_fields!(
            self,
            next,
            background_method,
            background_frames,
            blur_kernel_size,
            threshold_method,
            adaptive_block_size,
            adaptive_c,
            morph_kernel_size,
            morph_operation,
            min_area,
            max_area,
            min_aspect_ratio,
            max_aspect_ratio,
            channel_band_margin,
            min_motion,
            max_perp_drift,
            accept_entering,
            use_frame_diff,
            frame_diff_threshold,
            min_contour_points,
            histogram_window_size,
            histogram_bins,
            raw_log_capacity,
            um_per_px,
            radius_offset_px,
        );
        if self.clear_channel_band == Some(true) {
            next.channel_band = None;
        }
        if let Some(band) = self.channel_band {
            next.channel_band = Some(band);
        }
        next.validate()?;
        Ok(next)
    }
}
