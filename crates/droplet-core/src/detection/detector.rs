use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::config::{Calibration, ChannelBand, DetectionConfig};
use crate::error::Result;
use crate::frame::Frame;

use super::artifact::{ArtifactRejector, CentroidHistory};
use super::background::BackgroundPhase;
use super::measure::{DropletMetrics, Measurer};
use super::preprocess::Preprocessor;
use super::segment::Segmenter;

/// Processing stage, used for timing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Preprocessing,
    Segmentation,
    ArtifactRejection,
    Measurement,
    HistogramUpdate,
    TotalPerFrame,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Preprocessing,
        Stage::Segmentation,
        Stage::ArtifactRejection,
        Stage::Measurement,
        Stage::HistogramUpdate,
        Stage::TotalPerFrame,
    ];

    /// Key used in performance payloads.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Preprocessing => "preprocessing",
            Self::Segmentation => "segmentation",
            Self::ArtifactRejection => "artifact_rejection",
            Self::Measurement => "measurement",
            Self::HistogramUpdate => "histogram_update",
            Self::TotalPerFrame => "total_per_frame",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Preprocessing => write!(f, "Preprocessing"),
            Self::Segmentation => write!(f, "Segmentation"),
            Self::ArtifactRejection => write!(f, "Artifact rejection"),
            Self::Measurement => write!(f, "Measurement"),
            Self::HistogramUpdate => write!(f, "Histogram update"),
            Self::TotalPerFrame => write!(f, "Total per frame"),
        }
    }
}

/// Receives per-stage durations from [`DropletDetector::process_frame_with`].
///
/// All methods have default no-op implementations.
pub trait StageObserver {
    fn stage_finished(&mut self, _stage: Stage, _elapsed: Duration) {}
}

/// Observer that ignores every event.
pub struct NoOpObserver;
impl StageObserver for NoOpObserver {}

/// Detector lifecycle. `Uninitialized` only until the first frame; any
/// shape change or explicit reset afterwards returns to `WarmingUp`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorState {
    Uninitialized,
    WarmingUp,
    Ready,
}

impl From<BackgroundPhase> for DetectorState {
    fn from(phase: BackgroundPhase) -> Self {
        match phase {
            BackgroundPhase::Uninitialized => Self::Uninitialized,
            BackgroundPhase::WarmingUp => Self::WarmingUp,
            BackgroundPhase::Ready => Self::Ready,
        }
    }
}

impl std::fmt::Display for DetectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::WarmingUp => write!(f, "warming up"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

/// Runs preprocessing, segmentation, artifact rejection and measurement
/// on each frame, in that order.
#[derive(Clone, Debug)]
pub struct DropletDetector {
    preprocessor: Preprocessor,
    segmenter: Segmenter,
    rejector: ArtifactRejector,
    measurer: Measurer,
    history: CentroidHistory,
    calibration: Calibration,
    channel_band: Option<ChannelBand>,
    last_shape: Option<(usize, usize)>,
    frames_processed: u64,
    started: bool,
}

impl DropletDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            preprocessor: Preprocessor::new(config),
            segmenter: Segmenter::new(config),
            rejector: ArtifactRejector::new(config),
            measurer: Measurer::new(config),
            history: CentroidHistory::default(),
            calibration: config.calibration(),
            channel_band: config.channel_band,
            last_shape: None,
            frames_processed: 0,
            started: false,
        }
    }

    /// Switch to a new configuration between frames.
    pub fn apply_config(&mut self, config: &DetectionConfig) {
        self.preprocessor.apply_config(config);
        self.segmenter.apply_config(config);
        self.rejector.apply_config(config);
        self.measurer.apply_config(config);
        self.calibration = config.calibration();
        self.channel_band = config.channel_band;
    }

    pub fn state(&self) -> DetectorState {
        match self.preprocessor.background_phase() {
            BackgroundPhase::Uninitialized if self.started => DetectorState::WarmingUp,
            phase => phase.into(),
        }
    }

    /// Frames accumulated and required before detections start.
    pub fn warm_up_progress(&self) -> (usize, usize) {
        self.preprocessor.warm_up_progress()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    /// Return to warm-up and forget the centroid history.
    pub fn reset(&mut self) {
        self.preprocessor.reset();
        self.rejector.reset();
        self.history.clear();
        self.last_shape = None;
        self.frames_processed = 0;
        self.started = true;
        info!("Detector reset");
    }

    /// Build the static background from the given frames so detection can
    /// start with the next frame.
    pub fn initialize_background(&mut self, frames: &[Frame]) -> Result<()> {
        self.preprocessor.seed_background(frames)?;
        self.rejector.reset();
        self.history.clear();
        self.started = true;
        self.last_shape = frames.first().map(|f| (f.height(), f.width()));
        Ok(())
    }

    pub fn process_frame(&mut self, frame: &Frame) -> Vec<DropletMetrics> {
        self.process_frame_with(frame, &mut NoOpObserver)
    }

    /// Process one frame, reporting stage timings to `observer`.
    ///
    /// Never fails: a frame that cannot be processed is logged with its
    /// index and yields no detections.
    pub fn process_frame_with(
        &mut self,
        frame: &Frame,
        observer: &mut dyn StageObserver,
    ) -> Vec<DropletMetrics> {
        self.frames_processed += 1;
        self.started = true;
        match self.try_process_frame(frame, observer) {
            Ok(metrics) => metrics,
            Err(e) => {
                error!(
                    frame = frame.metadata.frame_index,
                    shape = ?frame.shape(),
                    error = %e,
                    "Frame processing failed"
                );
                Vec::new()
            }
        }
    }

    fn try_process_frame(
        &mut self,
        frame: &Frame,
        observer: &mut dyn StageObserver,
    ) -> Result<Vec<DropletMetrics>> {
        frame.validate()?;
        let shape = (frame.height(), frame.width());
        if self.last_shape != Some(shape) {
            self.history.clear();
            self.last_shape = Some(shape);
        }

        let start = Instant::now();
        let mask = self.preprocessor.try_process(frame)?;
        observer.stage_finished(Stage::Preprocessing, start.elapsed());

        if !self.preprocessor.is_ready() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let contours = self.segmenter.detect(&mask, self.channel_band);
        observer.stage_finished(Stage::Segmentation, start.elapsed());

        let start = Instant::now();
        let moving = if self.rejector.uses_frame_difference() {
            let gray = frame.to_intensity()?;
            self.rejector.filter_by_frame_difference(contours, &gray)
        } else {
            self.rejector.filter(contours, &self.history)
        };
        observer.stage_finished(Stage::ArtifactRejection, start.elapsed());

        let start = Instant::now();
        let metrics = self.measurer.measure(&moving, &self.calibration);
        observer.stage_finished(Stage::Measurement, start.elapsed());

        self.history
            .replace(metrics.iter().map(|m| m.centroid).collect());
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    #[derive(Default)]
    struct Recorder(Vec<Stage>);
    impl StageObserver for Recorder {
        fn stage_finished(&mut self, stage: Stage, _elapsed: Duration) {
            self.0.push(stage);
        }
    }

    fn blank(h: usize, w: usize) -> Frame {
        Frame::mono(Array2::<u8>::zeros((h, w)))
    }

    #[test]
    fn test_state_machine() {
        let config = DetectionConfig {
            background_frames: 2,
            ..DetectionConfig::default()
        };
        let mut detector = DropletDetector::new(&config);
        assert_eq!(detector.state(), DetectorState::Uninitialized);
        detector.process_frame(&blank(10, 10));
        assert_eq!(detector.state(), DetectorState::WarmingUp);
        detector.process_frame(&blank(10, 10));
        assert_eq!(detector.state(), DetectorState::Ready);
        detector.process_frame(&blank(12, 10));
        assert_eq!(detector.state(), DetectorState::WarmingUp);
        detector.reset();
        assert_eq!(detector.state(), DetectorState::WarmingUp);
        detector.process_frame(&blank(10, 10));
        assert_eq!(detector.state(), DetectorState::WarmingUp);
    }

    #[test]
    fn test_bad_frame_yields_nothing() {
        let mut detector = DropletDetector::new(&DetectionConfig::default());
        let bad = Frame::new(Array1::<u8>::zeros(4).into_dyn());
        assert!(detector.process_frame(&bad).is_empty());
        assert_eq!(detector.frames_processed(), 1);
    }

    #[test]
    fn test_stage_order_when_ready() {
        let config = DetectionConfig {
            background_frames: 2,
            ..DetectionConfig::default()
        };
        let mut detector = DropletDetector::new(&config);
        let mut recorder = Recorder::default();
        detector.process_frame_with(&blank(8, 8), &mut recorder);
        assert_eq!(recorder.0, vec![Stage::Preprocessing]);

        let mut recorder = Recorder::default();
        detector.process_frame_with(&blank(8, 8), &mut recorder);
        assert_eq!(
            recorder.0,
            vec![
                Stage::Preprocessing,
                Stage::Segmentation,
                Stage::ArtifactRejection,
                Stage::Measurement
            ]
        );
    }

    #[test]
    fn test_initialize_background() {
        let mut detector = DropletDetector::new(&DetectionConfig::default());
        detector.initialize_background(&[blank(6, 6), blank(6, 6)]).unwrap();
        assert_eq!(detector.state(), DetectorState::Ready);
    }
}
