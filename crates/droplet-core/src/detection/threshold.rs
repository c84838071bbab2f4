use ndarray::Array2;

use crate::config::ThresholdMethod;
use crate::consts::{OTSU_HISTOGRAM_BINS, U8_MAX};

/// Binarize a background-corrected intensity image.
///
/// `adaptive_c` is expressed in 8-bit units and rescaled to the [0, 1]
/// intensity range used internally.
pub fn apply_threshold(
    data: &Array2<f32>,
    method: ThresholdMethod,
    block_size: usize,
    adaptive_c: f32,
) -> Array2<bool> {
    match method {
        ThresholdMethod::Otsu => {
            let t = otsu_threshold(data);
            data.mapv(|v| v >= t)
        }
        ThresholdMethod::Adaptive => adaptive_threshold(data, block_size, adaptive_c / U8_MAX),
    }
}

/// Otsu's thresholding: the value maximizing between-class variance.
///
/// Pixels `>=` the returned value are foreground. A flat image has no
/// separating value and yields infinity, so nothing is foreground.
pub fn otsu_threshold(data: &Array2<f32>) -> f32 {
    let bins = OTSU_HISTOGRAM_BINS;
    let mut histogram = vec![0u64; bins];

    for &v in data.iter() {
        let bin = ((v.clamp(0.0, 1.0) * (bins - 1) as f32) as usize).min(bins - 1);
        histogram[bin] += 1;
    }

    let total = data.len() as f64;
    let sum_all: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();

    let mut weight_bg = 0.0f64;
    let mut sum_bg = 0.0f64;
    let mut best_variance = 0.0f64;
    let mut best_bin = None;

    for (i, &count) in histogram.iter().enumerate() {
        weight_bg += count as f64;
        if weight_bg == 0.0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0.0 {
            break;
        }
        sum_bg += i as f64 * count as f64;
        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (sum_all - sum_bg) / weight_fg;
        let between_variance = weight_bg * weight_fg * (mean_bg - mean_fg).powi(2);

        if between_variance > best_variance {
            best_variance = between_variance;
            best_bin = Some(i);
        }
    }

    match best_bin {
        Some(bin) => (bin + 1) as f32 / (bins - 1) as f32,
        None => f32::INFINITY,
    }
}

/// Local threshold: a pixel is foreground when it exceeds the mean of its
/// `block_size` x `block_size` neighbourhood by more than `offset`.
///
/// The neighbourhood is clipped at the image border; the box sums come
/// from a summed-area table so the cost does not depend on the block size.
pub fn adaptive_threshold(data: &Array2<f32>, block_size: usize, offset: f32) -> Array2<bool> {
    let (h, w) = data.dim();
    let integral = integral_image(data);
    let r = block_size / 2;

    Array2::from_shape_fn((h, w), |(row, col)| {
        let r0 = row.saturating_sub(r);
        let c0 = col.saturating_sub(r);
        let r1 = (row + r + 1).min(h);
        let c1 = (col + r + 1).min(w);
        let sum = integral[[r1, c1]] - integral[[r0, c1]] - integral[[r1, c0]] + integral[[r0, c0]];
        let count = ((r1 - r0) * (c1 - c0)) as f64;
        let mean = (sum / count) as f32;
        data[[row, col]] > mean + offset
    })
}

/// Summed-area table with a leading zero row and column.
fn integral_image(data: &Array2<f32>) -> Array2<f64> {
    let (h, w) = data.dim();
    let mut integral = Array2::<f64>::zeros((h + 1, w + 1));
    for row in 0..h {
        let mut row_sum = 0.0f64;
        for col in 0..w {
            row_sum += data[[row, col]] as f64;
            integral[[row + 1, col + 1]] = integral[[row, col + 1]] + row_sum;
        }
    }
    integral
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otsu_separates_bimodal() {
        let data = Array2::from_shape_fn((10, 10), |(r, _)| if r < 5 { 0.1 } else { 0.8 });
        let t = otsu_threshold(&data);
        assert!(t > 0.1 && t < 0.8, "threshold {t}");
    }

    #[test]
    fn test_otsu_flat_image_has_no_foreground() {
        let data = Array2::<f32>::zeros((8, 8));
        let mask = apply_threshold(&data, ThresholdMethod::Otsu, 11, 2.0);
        assert!(mask.iter().all(|&v| !v));
    }

    #[test]
    fn test_adaptive_marks_local_peak() {
        let mut data = Array2::from_elem((15, 15), 0.2f32);
        data[[7, 7]] = 0.9;
        let mask = adaptive_threshold(&data, 5, 0.01);
        assert!(mask[[7, 7]]);
        assert_eq!(mask.iter().filter(|&&v| v).count(), 1);
    }

    #[test]
    fn test_integral_image_totals() {
        let data = Array2::from_elem((3, 4), 1.0f32);
        let integral = integral_image(&data);
        assert_eq!(integral[[3, 4]], 12.0);
        assert_eq!(integral[[1, 1]], 1.0);
    }
}
