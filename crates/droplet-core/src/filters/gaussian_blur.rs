use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

/// Sigma implied by an odd kernel size when none is given explicitly
/// (the usual `0.3 * ((k - 1) / 2 - 1) + 0.8` rule).
pub fn sigma_for_kernel(kernel_size: usize) -> f32 {
    0.3 * ((kernel_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Blur with a separable Gaussian of the given odd kernel size.
pub fn gaussian_blur_kernel(data: &Array2<f32>, kernel_size: usize) -> Array2<f32> {
    let radius = kernel_size / 2;
    if radius == 0 {
        return data.clone();
    }
    let kernel = make_gaussian_kernel(sigma_for_kernel(kernel_size), radius);
    let row_pass = convolve(data, &kernel, Pass::Rows);
    convolve(&row_pass, &kernel, Pass::Cols)
}

fn make_gaussian_kernel(sigma: f32, radius: usize) -> Vec<f32> {
    let size = 2 * radius + 1;
    let s2 = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..size)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-x * x / s2).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

#[derive(Clone, Copy)]
enum Pass {
    Rows,
    Cols,
}

/// One 1-D pass with clamped (replicated) borders.
fn convolve(data: &Array2<f32>, kernel: &[f32], pass: Pass) -> Array2<f32> {
    let (h, w) = data.dim();
    let radius = kernel.len() as isize / 2;

    let sample = |row: usize, col: usize| -> f32 {
        kernel
            .iter()
            .enumerate()
            .map(|(ki, &kv)| {
                let offset = ki as isize - radius;
                let v = match pass {
                    Pass::Rows => {
                        let c = (col as isize + offset).clamp(0, w as isize - 1) as usize;
                        data[[row, c]]
                    }
                    Pass::Cols => {
                        let r = (row as isize + offset).clamp(0, h as isize - 1) as usize;
                        data[[r, col]]
                    }
                };
                v * kv
            })
            .sum()
    };

    let mut result = Array2::<f32>::zeros((h, w));
    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        result
            .axis_iter_mut(ndarray::Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(row, mut out)| {
                for col in 0..w {
                    out[col] = sample(row, col);
                }
            });
    } else {
        for row in 0..h {
            for col in 0..w {
                result[[row, col]] = sample(row, col);
            }
        }
    }
    result
}
