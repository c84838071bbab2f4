use ndarray::Array2;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

/// Lifecycle phase of the background model, for status reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackgroundPhase {
    Uninitialized,
    WarmingUp,
    Ready,
}

impl std::fmt::Display for BackgroundPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::WarmingUp => write!(f, "warming up"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

/// Background state, tagged with the frame shape it was built against.
#[derive(Clone, Debug)]
enum BackgroundState {
    Uninitialized,
    WarmingUp {
        shape: (usize, usize),
        frames: Vec<Array2<f32>>,
    },
    Ready {
        shape: (usize, usize),
        reference: Array2<f32>,
    },
}

/// Static background reference: the per-pixel median of the first
/// `required` frames of a given shape.
#[derive(Clone, Debug)]
pub struct BackgroundModel {
    state: BackgroundState,
    required: usize,
}

impl BackgroundModel {
    pub fn new(required: usize) -> Self {
        Self {
            state: BackgroundState::Uninitialized,
            required: required.max(1),
        }
    }

    pub fn required(&self) -> usize {
        self.required
    }

    pub fn phase(&self) -> BackgroundPhase {
        match self.state {
            BackgroundState::Uninitialized => BackgroundPhase::Uninitialized,
            BackgroundState::WarmingUp { .. } => BackgroundPhase::WarmingUp,
            BackgroundState::Ready { .. } => BackgroundPhase::Ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, BackgroundState::Ready { .. })
    }

    /// Frames accumulated towards the current warm-up.
    pub fn collected(&self) -> usize {
        match &self.state {
            BackgroundState::Uninitialized => 0,
            BackgroundState::WarmingUp { frames, .. } => frames.len(),
            BackgroundState::Ready { .. } => self.required,
        }
    }

    pub fn reset(&mut self) {
        self.state = BackgroundState::Uninitialized;
    }

    /// Change the warm-up length; the model is rebuilt from scratch.
    pub fn set_required(&mut self, required: usize) {
        self.required = required.max(1);
        self.reset();
    }

    /// Build the reference immediately from the given frames.
    ///
    /// Frames whose shape differs from the first one are ignored.
    pub fn seed(&mut self, frames: &[Array2<f32>]) {
        let Some(first) = frames.first() else {
            return;
        };
        let shape = first.dim();
        let same: Vec<&Array2<f32>> = frames.iter().filter(|f| f.dim() == shape).collect();
        let reference = median_of(&same);
        info!(frames = same.len(), ?shape, "Background model seeded");
        self.state = BackgroundState::Ready { shape, reference };
    }

    /// Feed one frame. Returns `|frame - reference|` once the model is
    /// ready, `None` while warming up. The frame that completes the warm-up
    /// is consumed by it and yields `None` as well.
    ///
    /// A frame of a different shape restarts the warm-up with that frame.
    pub fn correct(&mut self, gray: &Array2<f32>) -> Option<Array2<f32>> {
        let shape = gray.dim();

        let current_shape = match &self.state {
            BackgroundState::Uninitialized => None,
            BackgroundState::WarmingUp { shape, .. } | BackgroundState::Ready { shape, .. } => {
                Some(*shape)
            }
        };
        if let Some(previous) = current_shape {
            if previous != shape {
                warn!(
                    ?previous,
                    current = ?shape,
                    "Frame shape changed, rebuilding background model"
                );
                self.reset();
            }
        }

        match &mut self.state {
            BackgroundState::Ready { reference, .. } => {
                let mut diff = gray - &*reference;
                diff.mapv_inplace(f32::abs);
                Some(diff)
            }
            BackgroundState::WarmingUp { frames, .. } => {
                frames.push(gray.clone());
                if frames.len() >= self.required {
                    let refs: Vec<&Array2<f32>> = frames.iter().collect();
                    let reference = median_of(&refs);
                    info!(frames = refs.len(), ?shape, "Background model ready");
                    self.state = BackgroundState::Ready { shape, reference };
                }
                None
            }
            BackgroundState::Uninitialized => {
                let frames = vec![gray.clone()];
                if self.required <= 1 {
                    info!(frames = 1, ?shape, "Background model ready");
                    self.state = BackgroundState::Ready {
                        shape,
                        reference: gray.clone(),
                    };
                } else {
                    self.state = BackgroundState::WarmingUp { shape, frames };
                }
                None
            }
        }
    }
}

/// Per-pixel median across frames of identical shape.
///
/// Uses `select_nth_unstable` for O(n) selection and parallelizes over rows
/// for large frames.
pub fn median_of(frames: &[&Array2<f32>]) -> Array2<f32> {
    let Some(first) = frames.first() else {
        return Array2::zeros((0, 0));
    };
    let (h, w) = first.dim();
    let n = frames.len();

    let median_row = |row: usize, out: &mut [f32]| {
        let mut values = vec![0.0f32; n];
        for (col, result) in out.iter_mut().enumerate() {
            for (i, frame) in frames.iter().enumerate() {
                values[i] = frame[[row, col]];
            }
            *result = compute_median(&mut values);
        }
    };

    let mut result = Array2::<f32>::zeros((h, w));
    if h * w >= PARALLEL_PIXEL_THRESHOLD && n > 1 {
        result
            .axis_iter_mut(ndarray::Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(row, mut out)| {
                let mut buf = vec![0.0f32; w];
                median_row(row, &mut buf);
                for (dst, v) in out.iter_mut().zip(buf) {
                    *dst = v;
                }
            });
    } else {
        let mut buf = vec![0.0f32; w];
        for row in 0..h {
            median_row(row, &mut buf);
            for (col, &v) in buf.iter().enumerate() {
                result[[row, col]] = v;
            }
        }
    }
    result
}

fn compute_median(values: &mut [f32]) -> f32 {
    let n = values.len();
    if n == 1 {
        values[0]
    } else if n % 2 == 1 {
        *values.select_nth_unstable_by(n / 2, |a, b| a.total_cmp(b)).1
    } else {
        let mid = n / 2;
        values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
        values[..mid].select_nth_unstable_by(mid - 1, |a, b| a.total_cmp(b));
        (values[mid - 1] + values[mid]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warm_up_then_ready() {
        let mut model = BackgroundModel::new(3);
        let frame = Array2::from_elem((4, 4), 0.5f32);
        assert!(model.correct(&frame).is_none());
        assert_eq!(model.phase(), BackgroundPhase::WarmingUp);
        assert!(model.correct(&frame).is_none());
        // Completing frame is consumed by the warm-up.
        assert!(model.correct(&frame).is_none());
        assert!(model.is_ready());
        let diff = model.correct(&frame).unwrap();
        assert!(diff.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_median_rejects_outlier() {
        let a = Array2::from_elem((2, 2), 0.1f32);
        let b = Array2::from_elem((2, 2), 0.9f32);
        let median = median_of(&[&a, &a, &b]);
        assert!(median.iter().all(|&v| (v - 0.1).abs() < 1e-6));
        let even = median_of(&[&a, &b]);
        assert!((even[[0, 0]] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_shape_change_restarts_warm_up() {
        let mut model = BackgroundModel::new(2);
        let small = Array2::from_elem((4, 4), 0.2f32);
        model.correct(&small);
        model.correct(&small);
        assert!(model.is_ready());

        let large = Array2::from_elem((6, 5), 0.2f32);
        assert!(model.correct(&large).is_none());
        assert_eq!(model.phase(), BackgroundPhase::WarmingUp);
        assert_eq!(model.collected(), 1);
        assert!(model.correct(&large).is_none());
        assert!(model.correct(&large).is_some());
    }

    #[test]
    fn test_seed_makes_ready() {
        let mut model = BackgroundModel::new(30);
        let frame = Array2::from_elem((3, 3), 0.3f32);
        model.seed(&[frame.clone(), frame.clone()]);
        assert!(model.is_ready());
        let mut bright = frame.clone();
        bright[[1, 1]] = 0.8;
        let diff = model.correct(&bright).unwrap();
        assert!((diff[[1, 1]] - 0.5).abs() < 1e-6);
    }
}
