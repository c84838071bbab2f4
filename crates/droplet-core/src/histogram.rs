//! Sliding-window histograms and summary statistics of droplet metrics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::consts::EMPTY_HISTOGRAM_RANGE;
use crate::detection::DropletMetrics;
use crate::error::{DetectorError, Result};
use crate::ring_buffer::RingBuffer;

/// Tracked droplet metric.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Major axis, the droplet length along the channel.
    Width,
    /// Shorter bounding-box side.
    Height,
    /// Equivalent diameter.
    Diameter,
    Area,
}

impl Metric {
    pub const ALL: [Metric; 4] = [Metric::Width, Metric::Height, Metric::Diameter, Metric::Area];

    pub fn key(&self) -> &'static str {
        match self {
            Self::Width => "width",
            Self::Height => "height",
            Self::Diameter => "diameter",
            Self::Area => "area",
        }
    }

    fn value(&self, m: &DropletMetrics) -> f64 {
        match self {
            Self::Width => m.major_axis_px,
            Self::Height => m.minor_extent_px(),
            Self::Diameter => m.equivalent_diameter_px,
            Self::Area => m.area_px,
        }
    }
}

impl std::str::FromStr for Metric {
    type Err = DetectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "width" => Ok(Self::Width),
            "height" => Ok(Self::Height),
            "diameter" => Ok(Self::Diameter),
            "area" => Ok(Self::Area),
            other => Err(DetectorError::UnknownMetric(other.to_string())),
        }
    }
}

/// Summary statistics of one metric, in calibrated units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricStatistics {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub mode: f64,
    pub count: usize,
}

/// Statistics of every metric plus the unit they are expressed in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistogramStatistics {
    pub count: usize,
    pub unit: String,
    pub pixel_ratio: f64,
    pub width: MetricStatistics,
    pub height: MetricStatistics,
    pub diameter: MetricStatistics,
    pub area: MetricStatistics,
}

impl HistogramStatistics {
    pub fn get(&self, metric: Metric) -> &MetricStatistics {
        match metric {
            Metric::Width => &self.width,
            Metric::Height => &self.height,
            Metric::Diameter => &self.diameter,
            Metric::Area => &self.area,
        }
    }
}

/// Binned counts of one metric, in pixel units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricHistogram {
    pub counts: Vec<u64>,
    pub bins: Vec<f64>,
    /// `(rounded value, count)` pairs sorted by value.
    pub bars: Vec<(f64, u64)>,
}

/// Full snapshot returned to API clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistogramPayload {
    pub histograms: BTreeMap<Metric, MetricHistogram>,
    pub statistics: HistogramStatistics,
    pub pixel_ratio: f64,
    pub unit: String,
    pub count: usize,
}

/// One fixed-capacity window per metric.
#[derive(Clone, Debug)]
pub struct DropletHistogram {
    window_size: usize,
    bins: usize,
    pixel_ratio: f64,
    windows: [RingBuffer<f64>; 4],
}

impl DropletHistogram {
    pub fn new(window_size: usize, bins: usize, pixel_ratio: f64) -> Self {
        Self {
            window_size,
            bins: bins.max(1),
            pixel_ratio,
            windows: std::array::from_fn(|_| RingBuffer::new(window_size)),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn pixel_ratio(&self) -> f64 {
        self.pixel_ratio
    }

    pub fn set_pixel_ratio(&mut self, pixel_ratio: f64) {
        self.pixel_ratio = pixel_ratio;
    }

    pub fn unit(&self) -> &'static str {
        if self.pixel_ratio != 1.0 {
            "um"
        } else {
            "px"
        }
    }

    /// Number of droplets currently in the window.
    pub fn len(&self) -> usize {
        self.windows[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows[0].is_empty()
    }

    /// Replace the windows with empty ones of a new shape. Stored values
    /// are discarded.
    pub fn reconfigure(&mut self, window_size: usize, bins: usize) {
        info!(
            window_size,
            bins,
            discarded = self.len(),
            "Histogram reconfigured"
        );
        *self = Self::new(window_size, bins, self.pixel_ratio);
    }

    pub fn clear(&mut self) {
        for w in &mut self.windows {
            w.clear();
        }
    }

    pub fn update(&mut self, metrics: &[DropletMetrics]) {
        for m in metrics {
            for metric in Metric::ALL {
                self.window_mut(metric).push(metric.value(m));
            }
        }
    }

    /// Raw pixel values of one metric, oldest first.
    pub fn values(&self, metric: Metric) -> Vec<f64> {
        self.window(metric).to_vec()
    }

    /// `(bin_edges, counts)` over the stored range, with `bins + 1` edges.
    /// An empty window yields evenly spaced edges over a fixed default range
    /// and zero counts.
    pub fn get_histogram(&self, metric: Metric) -> (Vec<f64>, Vec<u64>) {
        let window = self.window(metric);
        if window.is_empty() {
            let (lo, hi) = EMPTY_HISTOGRAM_RANGE;
            return (linspace(lo, hi, self.bins + 1), vec![0; self.bins]);
        }

        let (mut lo, mut hi) = window
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }

        let edges = linspace(lo, hi, self.bins + 1);
        let mut counts = vec![0u64; self.bins];
        let span = hi - lo;
        for &v in window.iter() {
            let idx = (((v - lo) / span) * self.bins as f64) as usize;
            counts[idx.min(self.bins - 1)] += 1;
        }
        (edges, counts)
    }

    /// `(rounded value, count)` pairs of one metric, sorted by value.
    pub fn get_bars(&self, metric: Metric) -> Vec<(f64, u64)> {
        rounded_counts(self.window(metric))
            .into_iter()
            .map(|(v, c)| (v as f64, c))
            .collect()
    }

    pub fn get_statistics(&self) -> HistogramStatistics {
        let ratio = self.pixel_ratio;
        let stats = |metric: Metric| {
            let scale = if metric == Metric::Area {
                ratio * ratio
            } else {
                ratio
            };
            metric_statistics(self.window(metric), scale)
        };
        HistogramStatistics {
            count: self.len(),
            unit: self.unit().to_string(),
            pixel_ratio: ratio,
            width: stats(Metric::Width),
            height: stats(Metric::Height),
            diameter: stats(Metric::Diameter),
            area: stats(Metric::Area),
        }
    }

    pub fn snapshot(&self) -> HistogramPayload {
        let histograms = Metric::ALL
            .iter()
            .map(|&metric| {
                let (bins, counts) = self.get_histogram(metric);
                (
                    metric,
                    MetricHistogram {
                        counts,
                        bins,
                        bars: self.get_bars(metric),
                    },
                )
            })
            .collect();
        HistogramPayload {
            histograms,
            statistics: self.get_statistics(),
            pixel_ratio: self.pixel_ratio,
            unit: self.unit().to_string(),
            count: self.len(),
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self.snapshot())?)
    }

    fn window(&self, metric: Metric) -> &RingBuffer<f64> {
        &self.windows[metric as usize]
    }

    fn window_mut(&mut self, metric: Metric) -> &mut RingBuffer<f64> {
        &mut self.windows[metric as usize]
    }
}

fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![lo; n];
    }
    let step = (hi - lo) / (n - 1) as f64;
    (0..n)
        .map(|i| if i == n - 1 { hi } else { lo + step * i as f64 })
        .collect()
}

/// Counts of values rounded to the nearest integer, sorted by value.
fn rounded_counts(window: &RingBuffer<f64>) -> BTreeMap<i64, u64> {
    let mut counts = BTreeMap::new();
    for &v in window.iter() {
        *counts.entry(v.round() as i64).or_insert(0) += 1;
    }
    counts
}

/// Statistics of `values * scale`. The mode is the most frequent rounded
/// pixel value (smallest on ties), then scaled.
fn metric_statistics(window: &RingBuffer<f64>, scale: f64) -> MetricStatistics {
    if window.is_empty() {
        return MetricStatistics::default();
    }
    let n = window.len() as f64;
    let scaled: Vec<f64> = window.iter().map(|&v| v * scale).collect();
    let mean = scaled.iter().sum::<f64>() / n;
    let var = scaled.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let min = scaled.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scaled.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut best: Option<(i64, u64)> = None;
    for (value, count) in rounded_counts(window) {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((value, count));
        }
    }
    let mode = best.map_or(0.0, |(v, _)| v as f64 * scale);

    MetricStatistics {
        mean,
        std: var.sqrt(),
        min,
        max,
        mode,
        count: window.len(),
    }
}
