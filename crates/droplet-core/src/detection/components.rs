use ndarray::Array2;

/// Statistics for a single connected component.
#[derive(Clone, Debug)]
pub struct ComponentStats {
    /// Final label of this component in the label image.
    pub label: u32,
    /// Number of pixels in the component.
    pub area: usize,
    /// Bounding box: (min_row, max_row, min_col, max_col).
    pub bbox: (usize, usize, usize, usize),
    /// First pixel in raster order; always on the outer border.
    pub first: (usize, usize),
}

/// Connected component labeling of a binary mask.
#[derive(Clone, Debug)]
pub struct Labeling {
    /// 0 for background, otherwise the component's label.
    pub labels: Array2<u32>,
    /// Components in raster order of their first pixel.
    pub components: Vec<ComponentStats>,
}

/// Two-pass labeling with union-find and 8-connectivity (upper-left, upper,
/// upper-right and left neighbours are merged in the first pass).
pub fn connected_components(mask: &Array2<bool>) -> Labeling {
    let (h, w) = mask.dim();
    let mut labels = Array2::<u32>::zeros((h, w));
    if h == 0 || w == 0 {
        return Labeling {
            labels,
            components: Vec::new(),
        };
    }

    let mut next_label: u32 = 1;
    // Index 0 unused; labels start at 1.
    let mut parent: Vec<u32> = vec![0; h * w / 2 + 2];

    for row in 0..h {
        for col in 0..w {
            if !mask[[row, col]] {
                continue;
            }

            let mut neighbours = [0u32; 4];
            if col > 0 {
                neighbours[0] = labels[[row, col - 1]];
            }
            if row > 0 {
                if col > 0 {
                    neighbours[1] = labels[[row - 1, col - 1]];
                }
                neighbours[2] = labels[[row - 1, col]];
                if col + 1 < w {
                    neighbours[3] = labels[[row - 1, col + 1]];
                }
            }

            let smallest = neighbours.iter().copied().filter(|&l| l > 0).min();
            match smallest {
                None => {
                    if next_label as usize >= parent.len() {
                        parent.resize(parent.len() * 2, 0);
                    }
                    parent[next_label as usize] = next_label;
                    labels[[row, col]] = next_label;
                    next_label += 1;
                }
                Some(min) => {
                    labels[[row, col]] = min;
                    for &l in neighbours.iter().filter(|&&l| l > 0 && l != min) {
                        union(&mut parent, min, l);
                    }
                }
            }
        }
    }

    for i in 1..next_label as usize {
        parent[i] = find(&parent, i as u32);
    }

    // Second pass: resolve labels, compact them in raster order, collect stats.
    let mut compact = vec![0u32; next_label as usize];
    let mut components: Vec<ComponentStats> = Vec::new();

    for row in 0..h {
        for col in 0..w {
            let lbl = labels[[row, col]];
            if lbl == 0 {
                continue;
            }
            let root = parent[lbl as usize] as usize;
            if compact[root] == 0 {
                components.push(ComponentStats {
                    label: components.len() as u32 + 1,
                    area: 0,
                    bbox: (row, row, col, col),
                    first: (row, col),
                });
                compact[root] = components.len() as u32;
            }
            let final_label = compact[root];
            labels[[row, col]] = final_label;

            let entry = &mut components[final_label as usize - 1];
            entry.area += 1;
            entry.bbox.0 = entry.bbox.0.min(row);
            entry.bbox.1 = entry.bbox.1.max(row);
            entry.bbox.2 = entry.bbox.2.min(col);
            entry.bbox.3 = entry.bbox.3.max(col);
        }
    }

    Labeling { labels, components }
}

fn find(parent: &[u32], mut x: u32) -> u32 {
    while parent[x as usize] != x {
        x = parent[x as usize];
    }
    x
}

fn union(parent: &mut [u32], a: u32, b: u32) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        let (small, big) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[big as usize] = small;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from(rows: &[&str]) -> Array2<bool> {
        let h = rows.len();
        let w = rows[0].len();
        Array2::from_shape_fn((h, w), |(r, c)| rows[r].as_bytes()[c] == b'#')
    }

    #[test]
    fn test_diagonal_pixels_are_connected() {
        let mask = mask_from(&["#..", ".#.", "..#"]);
        let labeling = connected_components(&mask);
        assert_eq!(labeling.components.len(), 1);
        assert_eq!(labeling.components[0].area, 3);
    }

    #[test]
    fn test_u_shape_merges() {
        let mask = mask_from(&["#.#", "#.#", "###"]);
        let labeling = connected_components(&mask);
        assert_eq!(labeling.components.len(), 1);
        assert_eq!(labeling.components[0].area, 7);
        assert_eq!(labeling.labels[[0, 2]], labeling.labels[[0, 0]]);
    }

    #[test]
    fn test_separate_blobs_in_raster_order() {
        let mask = mask_from(&["....##", "##....", "##...."]);
        let labeling = connected_components(&mask);
        assert_eq!(labeling.components.len(), 2);
        assert_eq!(labeling.components[0].first, (0, 4));
        assert_eq!(labeling.components[1].first, (1, 0));
        assert_eq!(labeling.components[1].bbox, (1, 2, 0, 1));
        assert_eq!(labeling.labels[[2, 1]], 2);
    }

    #[test]
    fn test_empty_mask() {
        let mask = Array2::from_elem((4, 4), false);
        assert!(connected_components(&mask).components.is_empty());
    }
}
