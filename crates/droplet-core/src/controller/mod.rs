//! Real-time detection controller.
//!
//! A camera thread hands frames to [`DetectionController::add_frame`]; a
//! single processing thread pulls them from a two-slot drop-oldest queue,
//! runs the [`DropletDetector`] and folds the results into the histogram,
//! the raw measurement log and the stage timings. Everything else on the
//! controller is a snapshot read or a validated mutation.

pub mod command;
pub mod queue;
pub mod raw_log;
pub mod timing;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::camera::FrameSource;
use crate::config::{Calibration, ConfigPatch, DetectionConfig};
use crate::consts::{
    FRAME_QUEUE_CAPACITY, QUEUE_POLL_TIMEOUT_MS, RATE_WINDOW_SECS, STOP_JOIN_TIMEOUT_MS,
    THROUGHPUT_LOG_INTERVAL,
};
use crate::detection::{DetectorState, DropletDetector, Stage};
use crate::error::{DetectorError, Result};
use crate::frame::{Frame, Roi};
use crate::histogram::{DropletHistogram, HistogramPayload, HistogramStatistics};
use crate::profile::{self, ProfileLayout};

pub use command::{CommandResponse, ControllerCommand};
pub use queue::FrameQueue;
pub use raw_log::{ExportFormat, RawMeasurementLog, RawRecord, RAW_COLUMNS};
pub use timing::{StageSummary, StageTimings};

use timing::FrameTimings;

/// Snapshot answered to status requests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub running: bool,
    pub frame_count: u64,
    pub droplet_count_total: u64,
    pub processing_rate_hz: f64,
    pub detector_state: String,
    pub roi: Option<Roi>,
}

/// Histogram statistics plus controller counters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControllerStatistics {
    #[serde(flatten)]
    pub histogram: HistogramStatistics,
    pub frame_count: u64,
    pub droplet_count_total: u64,
    pub processing_rate_hz: f64,
}

/// Frames per second over a fixed window.
#[derive(Debug)]
struct RateEstimator {
    window_start: Instant,
    frames: u64,
    rate_hz: f64,
}

impl RateEstimator {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
            rate_hz: 0.0,
        }
    }

    fn tick(&mut self) {
        self.frames += 1;
        let elapsed = self.window_start.elapsed().as_secs_f64();
        if elapsed >= RATE_WINDOW_SECS {
            self.rate_hz = self.frames as f64 / elapsed;
            self.frames = 0;
            self.window_start = Instant::now();
        }
    }

    /// Rate of the last completed window. Once the current window has run
    /// past its length without closing, the frames seen so far over the
    /// time elapsed, so a stalled stream decays to zero.
    fn rate_hz(&self) -> f64 {
        let elapsed = self.window_start.elapsed().as_secs_f64();
        if elapsed > RATE_WINDOW_SECS {
            self.frames as f64 / elapsed
        } else {
            self.rate_hz
        }
    }
}

/// Everything the processing thread writes and API readers observe.
/// Kept under one lock so `reset()` and a frame update never interleave.
struct Measurements {
    histogram: DropletHistogram,
    raw_log: RawMeasurementLog,
    timings: StageTimings,
    frame_count: u64,
    droplet_count_total: u64,
    rate: RateEstimator,
    detector_state: DetectorState,
}

impl Measurements {
    fn new(config: &DetectionConfig) -> Self {
        Self {
            histogram: DropletHistogram::new(
                config.histogram_window_size,
                config.histogram_bins,
                config.um_per_px,
            ),
            raw_log: RawMeasurementLog::new(config.raw_log_capacity),
            timings: StageTimings::default(),
            frame_count: 0,
            droplet_count_total: 0,
            rate: RateEstimator::new(),
            detector_state: DetectorState::Uninitialized,
        }
    }

    fn clear(&mut self) {
        self.histogram.clear();
        self.raw_log.clear();
        self.timings.clear();
        self.frame_count = 0;
        self.droplet_count_total = 0;
        self.rate = RateEstimator::new();
        self.detector_state = DetectorState::WarmingUp;
    }

    /// Bring histogram and log capacities in line with `next`.
    fn apply_config(&mut self, previous: &DetectionConfig, next: &DetectionConfig) {
        if previous.histogram_shape_changed(next) {
            self.histogram
                .reconfigure(next.histogram_window_size, next.histogram_bins);
        }
        self.histogram.set_pixel_ratio(next.um_per_px);
        self.raw_log.set_capacity(next.raw_log_capacity);
    }
}

struct Shared {
    running: AtomicBool,
    /// Bumped by `reset()`; results computed under an older epoch are dropped.
    epoch: AtomicU64,
    config: RwLock<Arc<DetectionConfig>>,
    measurements: Mutex<Measurements>,
    queue: FrameQueue,
    pending_background: Mutex<Option<Vec<Frame>>>,
    camera_calibration: Mutex<Option<Calibration>>,
    roi: Mutex<Option<Roi>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl Shared {
    fn config(&self) -> Arc<DetectionConfig> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the live configuration, adapting the measurement buffers.
    fn install_config(&self, next: DetectionConfig) -> Arc<DetectionConfig> {
        let next = Arc::new(next);
        let mut slot = self.config.write().unwrap_or_else(PoisonError::into_inner);
        lock(&self.measurements).apply_config(&slot, &next);
        *slot = Arc::clone(&next);
        next
    }

    fn process(
        &self,
        detector: &mut DropletDetector,
        frame: &Frame,
        epoch: u64,
        stop: &AtomicBool,
    ) {
        let mut frame_timings = FrameTimings::default();
        let total = Instant::now();
        let metrics = detector.process_frame_with(frame, &mut frame_timings);

        let mut m = lock(&self.measurements);
        if stop.load(Ordering::Acquire) {
            debug!(frame = frame.metadata.frame_index, "Discarding result of a stopped session");
            return;
        }
        if self.epoch.load(Ordering::Acquire) != epoch {
            debug!(frame = frame.metadata.frame_index, "Discarding result computed before reset");
            return;
        }

        let hist_start = Instant::now();
        m.histogram.update(&metrics);
        frame_timings
            .entries
            .push((Stage::HistogramUpdate, hist_start.elapsed()));
        frame_timings
            .entries
            .push((Stage::TotalPerFrame, total.elapsed()));

        let frame_id = m.frame_count;
        m.raw_log.extend_from_metrics(&metrics, now_ms(), frame_id);
        for (stage, elapsed) in frame_timings.entries {
            m.timings.record(stage, elapsed);
        }
        m.frame_count += 1;
        m.droplet_count_total += metrics.len() as u64;
        m.rate.tick();
        m.detector_state = detector.state();

        if m.frame_count % THROUGHPUT_LOG_INTERVAL == 0 {
            debug!(
                frames = m.frame_count,
                droplets = m.droplet_count_total,
                rate_hz = format!("{:.2}", m.rate.rate_hz()),
                "Processing throughput"
            );
        }
    }
}

/// Runs until this session's `stop` flag is set. The flag belongs to one
/// session only, so a thread detached by a timed-out `stop()` never
/// resumes when a later `start()` sets `running` again.
fn processing_loop(shared: Arc<Shared>, mut detector: DropletDetector, stop: Arc<AtomicBool>) {
    info!("Processing loop started");
    let poll = Duration::from_millis(QUEUE_POLL_TIMEOUT_MS);
    let mut epoch = shared.epoch.load(Ordering::Acquire);
    let mut config = shared.config();

    while !stop.load(Ordering::Acquire) {
        sync_epoch(&shared, &mut detector, &mut epoch);

        let latest = shared.config();
        if !Arc::ptr_eq(&latest, &config) {
            detector.apply_config(&latest);
            config = latest;
        }

        if let Some(frames) = lock(&shared.pending_background).take() {
            match detector.initialize_background(&frames) {
                Ok(()) => info!(frames = frames.len(), "Background initialized"),
                Err(e) => error!(error = %e, "Background initialization failed"),
            }
        }

        let Some(frame) = shared.queue.pop_timeout(poll) else {
            continue;
        };
        // A reset may have landed while waiting on the queue.
        sync_epoch(&shared, &mut detector, &mut epoch);
        shared.process(&mut detector, &frame, epoch, &stop);
    }
    info!("Processing loop stopped");
}

fn sync_epoch(shared: &Shared, detector: &mut DropletDetector, epoch: &mut u64) {
    let current = shared.epoch.load(Ordering::Acquire);
    if current != *epoch {
        detector.reset();
        *epoch = current;
    }
}

/// Processing thread of one start/stop cycle.
struct Session {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

/// Owns one detector, one histogram and one raw measurement log, and the
/// thread that feeds them.
pub struct DetectionController {
    shared: Arc<Shared>,
    session: Mutex<Option<Session>>,
}

impl DetectionController {
    pub fn new(config: DetectionConfig) -> Result<Self> {
        config.validate()?;
        let shared = Shared {
            running: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            measurements: Mutex::new(Measurements::new(&config)),
            config: RwLock::new(Arc::new(config)),
            queue: FrameQueue::new(FRAME_QUEUE_CAPACITY),
            pending_background: Mutex::new(None),
            camera_calibration: Mutex::new(None),
            roi: Mutex::new(None),
        };
        Ok(Self {
            shared: Arc::new(shared),
            session: Mutex::new(None),
        })
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<DetectionConfig> {
        self.shared.config()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// ROI the running session was started with.
    pub fn roi(&self) -> Option<Roi> {
        *lock(&self.shared.roi)
    }

    /// Start processing frames from `camera`.
    ///
    /// Fails with [`DetectorError::AlreadyRunning`] when a session is active
    /// and with [`DetectorError::RoiNotConfigured`] when the camera has no ROI.
    pub fn start(&self, camera: &dyn FrameSource) -> Result<()> {
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Detection already running");
            return Err(DetectorError::AlreadyRunning);
        }

        match self.spawn(camera) {
            Ok(roi) => {
                info!(roi = ?roi, camera = camera.name(), "Droplet detection started");
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                error!(error = %e, "Failed to start droplet detection");
                Err(e)
            }
        }
    }

    fn spawn(&self, camera: &dyn FrameSource) -> Result<Roi> {
        let roi = camera.roi().ok_or(DetectorError::RoiNotConfigured)?;
        let (sensor_w, sensor_h) = camera.sensor_size();
        roi.validate_for_sensor(sensor_w, sensor_h)?;

        let camera_calibration = camera.calibration();
        *lock(&self.shared.camera_calibration) = camera_calibration;
        let config = match camera_calibration {
            Some(calibration) if calibration != self.config().calibration() => {
                let mut next = (*self.config()).clone();
                next.set_calibration(calibration);
                info!(
                    um_per_px = calibration.um_per_px,
                    radius_offset_px = calibration.radius_offset_px,
                    "Using camera calibration"
                );
                self.shared.install_config(next)
            }
            _ => self.config(),
        };

        self.shared.queue.clear();
        *lock(&self.shared.roi) = Some(roi);

        let detector = DropletDetector::new(&config);
        let shared = Arc::clone(&self.shared);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("droplet-detection".into())
            .spawn(move || processing_loop(shared, detector, thread_stop))
            .map_err(|e| DetectorError::ThreadSpawn(e.to_string()))?;
        *lock(&self.session) = Some(Session { handle, stop });
        Ok(roi)
    }

    /// Stop the processing thread. Calling it when stopped does nothing.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(Session { handle, stop }) = lock(&self.session).take() {
            stop.store(true, Ordering::Release);
            let deadline = Instant::now() + Duration::from_millis(STOP_JOIN_TIMEOUT_MS);
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
            }
            if handle.is_finished() {
                if handle.join().is_err() {
                    error!("Processing thread panicked");
                }
            } else {
                warn!(
                    timeout_ms = STOP_JOIN_TIMEOUT_MS,
                    "Processing thread did not stop in time; detaching it"
                );
            }
        }

        let dropped = self.shared.queue.clear();
        *lock(&self.shared.roi) = None;
        info!(pending_dropped = dropped, "Droplet detection stopped");
    }

    /// Flush histograms, log, timings and counters, and send the detector
    /// back to warm-up. Works whether or not detection is running.
    pub fn reset(&self) {
        {
            let mut m = lock(&self.shared.measurements);
            self.shared.epoch.fetch_add(1, Ordering::AcqRel);
            m.clear();
        }
        self.shared.queue.clear();
        info!("Detector reset");
    }

    /// Queue a frame for processing.
    ///
    /// Returns whether the frame was accepted. Invalid frames and frames
    /// arriving while stopped are dropped and logged, never reported as
    /// errors, so the camera thread is never disturbed.
    pub fn add_frame(&self, frame: Frame) -> bool {
        if !self.is_running() {
            debug!(
                frame = frame.metadata.frame_index,
                reason = %DetectorError::NotRunning,
                "Dropping frame"
            );
            return false;
        }
        if let Err(e) = frame.validate() {
            warn!(
                frame = frame.metadata.frame_index,
                shape = ?frame.shape(),
                error = %e,
                "Dropping invalid frame"
            );
            return false;
        }
        self.shared.queue.push(frame);
        true
    }

    /// Seed the static background model with `frames`. Applied by the
    /// processing thread before the next frame, or right after `start()`.
    pub fn initialize_background(&self, frames: Vec<Frame>) -> Result<()> {
        let first = frames
            .first()
            .ok_or_else(|| DetectorError::InvalidFrame("no background frames given".into()))?;
        let shape = (first.height(), first.width());
        for frame in &frames {
            frame.validate()?;
            if (frame.height(), frame.width()) != shape {
                return Err(DetectorError::InvalidFrame(format!(
                    "background frame {} has shape {:?}, expected {:?}",
                    frame.metadata.frame_index,
                    frame.shape(),
                    shape
                )));
            }
        }
        info!(frames = frames.len(), "Queued background initialization");
        *lock(&self.shared.pending_background) = Some(frames);
        Ok(())
    }

    /// Frames queued but not yet picked up by the processing thread.
    pub fn pending_frames(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn status(&self) -> ControllerStatus {
        let m = lock(&self.shared.measurements);
        ControllerStatus {
            running: self.is_running(),
            frame_count: m.frame_count,
            droplet_count_total: m.droplet_count_total,
            processing_rate_hz: self.rate_hz(&m),
            detector_state: m.detector_state.to_string(),
            roi: self.roi(),
        }
    }

    /// Zero while stopped.
    fn rate_hz(&self, m: &Measurements) -> f64 {
        if self.is_running() {
            (m.rate.rate_hz() * 100.0).round() / 100.0
        } else {
            0.0
        }
    }

    pub fn histogram(&self) -> HistogramPayload {
        lock(&self.shared.measurements).histogram.snapshot()
    }

    /// Histogram payload as JSON, for the web layer.
    pub fn histogram_json(&self) -> Result<serde_json::Value> {
        lock(&self.shared.measurements).histogram.to_json()
    }

    pub fn statistics(&self) -> ControllerStatistics {
        let m = lock(&self.shared.measurements);
        ControllerStatistics {
            histogram: m.histogram.get_statistics(),
            frame_count: m.frame_count,
            droplet_count_total: m.droplet_count_total,
            processing_rate_hz: self.rate_hz(&m),
        }
    }

    /// Per-stage timing summary in milliseconds.
    pub fn performance(&self) -> BTreeMap<String, StageSummary> {
        lock(&self.shared.measurements).timings.summary()
    }

    /// Number of records in the raw measurement log.
    pub fn raw_log_len(&self) -> usize {
        lock(&self.shared.measurements).raw_log.len()
    }

    pub fn raw_records(&self) -> Vec<RawRecord> {
        lock(&self.shared.measurements).raw_log.records()
    }

    /// Export the raw measurement log as `csv` or `txt`. `Ok(None)` when no
    /// measurement was recorded yet.
    pub fn export(&self, format: &str) -> Result<Option<String>> {
        let format: ExportFormat = format.parse()?;
        Ok(lock(&self.shared.measurements).raw_log.export(format))
    }

    /// Apply a partial update. Invalid updates are rejected as a whole.
    pub fn update_config(&self, patch: &ConfigPatch) -> Result<Arc<DetectionConfig>> {
        let next = patch.apply(&self.config())?;
        let next = self.shared.install_config(next);
        info!(?patch, "Configuration updated");
        Ok(next)
    }

    /// Replace the configuration with a profile from disk. While running,
    /// a camera calibration keeps precedence over the profile's.
    pub fn load_profile(&self, path: &Path) -> Result<Arc<DetectionConfig>> {
        let mut next = profile::load_profile(path)?;
        if self.is_running() {
            if let Some(calibration) = *lock(&self.shared.camera_calibration) {
                next.set_calibration(calibration);
            }
        }
        Ok(self.shared.install_config(next))
    }

    pub fn save_profile(&self, path: &Path, layout: ProfileLayout) -> Result<()> {
        profile::save_profile(&self.config(), path, layout)
    }
}

impl Drop for DetectionController {
    fn drop(&mut self) {
        self.stop();
    }
}
