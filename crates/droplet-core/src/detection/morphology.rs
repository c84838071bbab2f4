use ndarray::Array2;

use crate::config::MorphOperation;

/// Elliptical structuring element stored as (row, col) offsets from its centre.
///
/// Size 3 yields a cross; larger sizes approach a disc.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructuringElement {
    size: usize,
    offsets: Vec<(isize, isize)>,
}

impl StructuringElement {
    pub fn ellipse(size: usize) -> Self {
        let size = size.max(1);
        let r = (size / 2) as isize;
        let c = (size / 2) as f64;
        let inv_r2 = if r > 0 { 1.0 / (r * r) as f64 } else { 0.0 };

        let mut offsets = Vec::new();
        for i in 0..size as isize {
            let dy = i - r;
            let dx = (c * (((r * r - dy * dy) as f64) * inv_r2).sqrt()).round() as isize;
            let j1 = (r - dx).max(0);
            let j2 = (r + dx + 1).min(size as isize);
            for j in j1..j2 {
                offsets.push((dy, j - r));
            }
        }
        Self { size, offsets }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

/// Apply the configured clean-up: opening removes speckle, closing fills
/// pinholes, `Both` does opening then closing.
pub fn apply_morphology(
    mask: &Array2<bool>,
    element: &StructuringElement,
    operation: MorphOperation,
) -> Array2<bool> {
    match operation {
        MorphOperation::Open => opening(mask, element),
        MorphOperation::Close => closing(mask, element),
        MorphOperation::Both => closing(&opening(mask, element), element),
    }
}

/// Erosion followed by dilation.
pub fn opening(mask: &Array2<bool>, element: &StructuringElement) -> Array2<bool> {
    dilate(&erode(mask, element), element)
}

/// Dilation followed by erosion.
pub fn closing(mask: &Array2<bool>, element: &StructuringElement) -> Array2<bool> {
    erode(&dilate(mask, element), element)
}

/// A pixel stays set only if every in-bounds pixel under the element is set.
/// Pixels outside the image do not erode the border.
pub fn erode(mask: &Array2<bool>, element: &StructuringElement) -> Array2<bool> {
    let (h, w) = mask.dim();
    Array2::from_shape_fn((h, w), |(row, col)| {
        mask[[row, col]]
            && element.offsets.iter().all(|&(dr, dc)| {
                neighbour(row, col, dr, dc, h, w).map_or(true, |(r, c)| mask[[r, c]])
            })
    })
}

/// A pixel becomes set if any in-bounds pixel under the element is set.
pub fn dilate(mask: &Array2<bool>, element: &StructuringElement) -> Array2<bool> {
    let (h, w) = mask.dim();
    Array2::from_shape_fn((h, w), |(row, col)| {
        element.offsets.iter().any(|&(dr, dc)| {
            neighbour(row, col, dr, dc, h, w).is_some_and(|(r, c)| mask[[r, c]])
        })
    })
}

fn neighbour(
    row: usize,
    col: usize,
    dr: isize,
    dc: isize,
    h: usize,
    w: usize,
) -> Option<(usize, usize)> {
    let r = row as isize + dr;
    let c = col as isize + dc;
    if r < 0 || c < 0 || r >= h as isize || c >= w as isize {
        None
    } else {
        Some((r as usize, c as usize))
    }
}
