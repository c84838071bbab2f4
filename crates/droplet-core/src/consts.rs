/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// ITU-R BT.601 luminance coefficient for the red channel.
pub const LUMINANCE_R: f32 = 0.299;

/// ITU-R BT.601 luminance coefficient for the green channel.
pub const LUMINANCE_G: f32 = 0.587;

/// ITU-R BT.601 luminance coefficient for the blue channel.
pub const LUMINANCE_B: f32 = 0.114;

/// Full-scale value of an 8-bit sample.
pub const U8_MAX: f32 = 255.0;

/// Number of histogram bins for Otsu's thresholding.
pub const OTSU_HISTOGRAM_BINS: usize = 256;

/// Capacity of the frame queue between the camera and the processing thread.
pub const FRAME_QUEUE_CAPACITY: usize = 2;

/// How long the processing thread waits on the queue before re-checking flags.
pub const QUEUE_POLL_TIMEOUT_MS: u64 = 100;

/// Upper bound for joining the processing thread in `stop()`.
pub const STOP_JOIN_TIMEOUT_MS: u64 = 5_000;

/// Samples kept per pipeline stage for timing statistics.
pub const TIMING_MAX_SAMPLES: usize = 1_000;

/// Window over which the processing rate (Hz) is estimated.
pub const RATE_WINDOW_SECS: f64 = 1.0;

/// Throughput is logged every this many processed frames.
pub const THROUGHPUT_LOG_INTERVAL: u64 = 100;

/// Default number of frames accumulated for the static background median.
pub const DEFAULT_BACKGROUND_FRAMES: usize = 30;

/// Default sliding-window size of each histogram metric.
pub const DEFAULT_HISTOGRAM_WINDOW: usize = 2_000;

/// Default histogram bin count.
pub const DEFAULT_HISTOGRAM_BINS: usize = 40;

/// Default capacity of the raw measurement log.
pub const DEFAULT_RAW_LOG_CAPACITY: usize = 10_000;

/// Minimum contour points before an ellipse fit is attempted.
pub const MIN_ELLIPSE_POINTS: usize = 5;

/// Histogram edges used when a metric window is still empty.
pub const EMPTY_HISTOGRAM_RANGE: (f64, f64) = (0.0, 100.0);
