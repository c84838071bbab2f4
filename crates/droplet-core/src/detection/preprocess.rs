use ndarray::Array2;
use tracing::warn;

use crate::config::{BackgroundMethod, DetectionConfig, MorphOperation, ThresholdMethod};
use crate::error::Result;
use crate::filters::gaussian_blur::gaussian_blur_kernel;
use crate::frame::Frame;

use super::background::{BackgroundModel, BackgroundPhase};
use super::morphology::{apply_morphology, StructuringElement};
use super::threshold::apply_threshold;

/// Frame to binary foreground mask: background correction, thresholding
/// and morphological clean-up.
///
/// Owns the background model; it lives on whichever thread calls
/// [`Preprocessor::process`].
#[derive(Clone, Debug)]
pub struct Preprocessor {
    background_method: BackgroundMethod,
    blur_kernel_size: usize,
    threshold_method: ThresholdMethod,
    adaptive_block_size: usize,
    adaptive_c: f32,
    morph_operation: MorphOperation,
    element: StructuringElement,
    background: BackgroundModel,
}

impl Preprocessor {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            background_method: config.background_method,
            blur_kernel_size: config.blur_kernel_size,
            threshold_method: config.threshold_method,
            adaptive_block_size: config.adaptive_block_size,
            adaptive_c: config.adaptive_c,
            morph_operation: config.morph_operation,
            element: StructuringElement::ellipse(config.morph_kernel_size),
            background: BackgroundModel::new(config.background_frames),
        }
    }

    /// Take over new parameters. The background model is only rebuilt when
    /// a background parameter changed; the structuring element only when
    /// its size changed.
    pub fn apply_config(&mut self, config: &DetectionConfig) {
        let background_changed = self.background_method != config.background_method
            || self.background.required() != config.background_frames.max(1);
        if background_changed {
            self.background.set_required(config.background_frames);
        }
        if self.element.size() != config.morph_kernel_size.max(1) {
            self.element = StructuringElement::ellipse(config.morph_kernel_size);
        }
        self.background_method = config.background_method;
        self.blur_kernel_size = config.blur_kernel_size;
        self.threshold_method = config.threshold_method;
        self.adaptive_block_size = config.adaptive_block_size;
        self.adaptive_c = config.adaptive_c;
        self.morph_operation = config.morph_operation;
    }

    /// Whether masks produced now reflect real foreground.
    pub fn is_ready(&self) -> bool {
        match self.background_method {
            BackgroundMethod::Static => self.background.is_ready(),
            BackgroundMethod::Highpass => true,
        }
    }

    pub fn background_phase(&self) -> BackgroundPhase {
        match self.background_method {
            BackgroundMethod::Static => self.background.phase(),
            BackgroundMethod::Highpass => BackgroundPhase::Ready,
        }
    }

    /// Frames accumulated and required for the static background.
    pub fn warm_up_progress(&self) -> (usize, usize) {
        (self.background.collected(), self.background.required())
    }

    /// Drop the background so it is rebuilt from the next frames.
    pub fn reset(&mut self) {
        self.background.reset();
    }

    /// Build the static background from the given frames right away.
    pub fn seed_background(&mut self, frames: &[Frame]) -> Result<()> {
        let grays = frames
            .iter()
            .map(Frame::to_intensity)
            .collect::<Result<Vec<_>>>()?;
        self.background.seed(&grays);
        Ok(())
    }

    /// Never fails: malformed frames are logged and produce an all-zero mask.
    pub fn process(&mut self, frame: &Frame) -> Array2<bool> {
        match self.try_process(frame) {
            Ok(mask) => mask,
            Err(e) => {
                warn!(
                    frame = frame.metadata.frame_index,
                    error = %e,
                    "Preprocessing failed, returning empty mask"
                );
                Array2::from_elem((frame.height(), frame.width()), false)
            }
        }
    }

    pub fn try_process(&mut self, frame: &Frame) -> Result<Array2<bool>> {
        let gray = frame.to_intensity()?;
        let corrected = match self.background_method {
            BackgroundMethod::Static => match self.background.correct(&gray) {
                Some(diff) => diff,
                None => return Ok(Array2::from_elem(gray.dim(), false)),
            },
            BackgroundMethod::Highpass => {
                let blurred = gaussian_blur_kernel(&gray, self.blur_kernel_size);
                let mut high = gray - &blurred;
                high.mapv_inplace(|v| v.max(0.0));
                high
            }
        };

        let mask = apply_threshold(
            &corrected,
            self.threshold_method,
            self.adaptive_block_size,
            self.adaptive_c,
        );
        Ok(apply_morphology(&mask, &self.element, self.morph_operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    fn frame_with_square(offset: usize) -> Frame {
        let mut data = Array2::<u8>::zeros((20, 40));
        for r in 6..14 {
            for c in offset..offset + 8 {
                data[[r, c]] = 220;
            }
        }
        Frame::mono(data)
    }

    #[test]
    fn test_static_warm_up_yields_empty_masks() {
        let config = DetectionConfig {
            background_frames: 3,
            ..DetectionConfig::default()
        };
        let mut pre = Preprocessor::new(&config);
        for _ in 0..3 {
            let mask = pre.process(&frame_with_square(5));
            assert!(mask.iter().all(|&v| !v));
        }
        assert!(pre.is_ready());
        let mask = pre.process(&frame_with_square(25));
        assert!(mask[[10, 28]], "moved square should be foreground");
    }

    #[test]
    fn test_highpass_needs_no_warm_up() {
        let config = DetectionConfig {
            background_method: BackgroundMethod::Highpass,
            ..DetectionConfig::default()
        };
        let mut pre = Preprocessor::new(&config);
        assert!(pre.is_ready());
        // A spot smaller than the blur kernel survives the high-pass whole.
        let mut data = Array2::<u8>::zeros((20, 40));
        for r in 8..12 {
            for c in 16..20 {
                data[[r, c]] = 220;
            }
        }
        let mask = pre.process(&Frame::mono(data));
        assert!(mask[[9, 17]]);
        assert!(mask[[10, 18]]);
        assert!(!mask[[1, 1]]);
    }

    #[test]
    fn test_malformed_frame_returns_empty_mask() {
        let mut pre = Preprocessor::new(&DetectionConfig::default());
        let frame = Frame::new(Array1::<u8>::zeros(5).into_dyn());
        let mask = pre.process(&frame);
        assert!(mask.iter().all(|&v| !v));
    }

    #[test]
    fn test_apply_config_keeps_background_when_unrelated() {
        let config = DetectionConfig {
            background_frames: 1,
            ..DetectionConfig::default()
        };
        let mut pre = Preprocessor::new(&config);
        pre.process(&frame_with_square(5));
        assert!(pre.is_ready());
        pre.apply_config(&DetectionConfig {
            min_area: 50.0,
            ..config.clone()
        });
        assert!(pre.is_ready());
        pre.apply_config(&DetectionConfig {
            background_frames: 4,
            ..config
        });
        assert!(!pre.is_ready());
    }
}
