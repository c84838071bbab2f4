use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::consts::TIMING_MAX_SAMPLES;
use crate::detection::{Stage, StageObserver};
use crate::ring_buffer::RingBuffer;

/// Rolling summary of one stage, in milliseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub p95: f64,
    pub p99: f64,
    pub count: usize,
}

impl StageSummary {
    fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let var = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Self {
            mean,
            std: var.sqrt(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
            count: samples.len(),
        }
    }
}

/// Linear-interpolated percentile of sorted samples.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Last [`TIMING_MAX_SAMPLES`] durations of every pipeline stage.
#[derive(Clone, Debug)]
pub struct StageTimings {
    samples: BTreeMap<Stage, RingBuffer<f64>>,
}

impl Default for StageTimings {
    fn default() -> Self {
        Self::new(TIMING_MAX_SAMPLES)
    }
}

impl StageTimings {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: Stage::ALL
                .iter()
                .map(|&stage| (stage, RingBuffer::new(max_samples)))
                .collect(),
        }
    }

    pub fn record(&mut self, stage: Stage, elapsed: Duration) {
        if let Some(buf) = self.samples.get_mut(&stage) {
            buf.push(elapsed.as_secs_f64() * 1000.0);
        }
    }

    pub fn count(&self, stage: Stage) -> usize {
        self.samples.get(&stage).map_or(0, |b| b.len())
    }

    pub fn clear(&mut self) {
        self.samples.values_mut().for_each(RingBuffer::clear);
    }

    pub fn stage_summary(&self, stage: Stage) -> StageSummary {
        self.samples
            .get(&stage)
            .map(|b| StageSummary::from_samples(&b.to_vec()))
            .unwrap_or_default()
    }

    /// Summary of every stage keyed by [`Stage::key`]. Stages without
    /// samples report zeros.
    pub fn summary(&self) -> BTreeMap<String, StageSummary> {
        Stage::ALL
            .iter()
            .map(|&stage| (stage.key().to_string(), self.stage_summary(stage)))
            .collect()
    }
}

/// Collects stage durations of a single frame so the shared timings lock
/// is taken once per frame.
#[derive(Default)]
pub(crate) struct FrameTimings {
    pub(crate) entries: Vec<(Stage, Duration)>,
}

impl StageObserver for FrameTimings {
    fn stage_finished(&mut self, stage: Stage, elapsed: Duration) {
        self.entries.push((stage, elapsed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_summary_statistics() {
        let mut timings = StageTimings::new(100);
        for ms in 1..=5u64 {
            timings.record(Stage::Segmentation, Duration::from_millis(ms));
        }
        let s = timings.stage_summary(Stage::Segmentation);
        assert_eq!(s.count, 5);
        assert_relative_eq!(s.mean, 3.0, epsilon = 1e-9);
        assert_relative_eq!(s.min, 1.0, epsilon = 1e-9);
        assert_relative_eq!(s.max, 5.0, epsilon = 1e-9);
        assert_relative_eq!(s.std, 2.0f64.sqrt(), epsilon = 1e-9);
        assert_relative_eq!(s.p95, 4.8, epsilon = 1e-9);
    }

    #[test]
    fn test_empty_stages_report_zero() {
        let timings = StageTimings::default();
        let summary = timings.summary();
        assert_eq!(summary.len(), Stage::ALL.len());
        assert_eq!(summary["total_per_frame"], StageSummary::default());
    }

    #[test]
    fn test_window_is_bounded() {
        let mut timings = StageTimings::new(3);
        for ms in 0..10 {
            timings.record(Stage::Measurement, Duration::from_millis(ms));
        }
        assert_eq!(timings.count(Stage::Measurement), 3);
        assert_relative_eq!(timings.stage_summary(Stage::Measurement).min, 7.0, epsilon = 1e-9);
        timings.clear();
        assert_eq!(timings.count(Stage::Measurement), 0);
    }
}
