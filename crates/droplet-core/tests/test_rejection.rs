use approx::assert_abs_diff_eq;
use ndarray::Array2;

use droplet_core::config::DetectionConfig;
use droplet_core::detection::{ArtifactRejector, CentroidHistory, Contour, DropletDetector, Point};
use droplet_core::frame::Frame;

fn square_at(x: i32, y: i32) -> Contour {
    Contour::new(vec![
        Point::new(x - 2, y - 2),
        Point::new(x + 2, y - 2),
        Point::new(x + 2, y + 2),
        Point::new(x - 2, y + 2),
    ])
}

fn history(centroids: &[(f64, f64)]) -> CentroidHistory {
    let mut history = CentroidHistory::default();
    history.replace(centroids.to_vec());
    history
}

fn frame_diff_config() -> DetectionConfig {
    DetectionConfig {
        use_frame_diff: true,
        ..DetectionConfig::default()
    }
}

/// Intensity image with 5x5 bright blocks centred on `centres`.
fn blocks(height: usize, width: usize, centres: &[(usize, usize)]) -> Array2<f32> {
    let mut gray = Array2::<f32>::zeros((height, width));
    for &(x, y) in centres {
        for row in y - 2..=y + 2 {
            for col in x - 2..=x + 2 {
                gray[[row, col]] = 1.0;
            }
        }
    }
    gray
}

#[test]
fn test_cold_passes_everything() {
    let rejector = ArtifactRejector::new(&DetectionConfig::default());
    let out = rejector.filter(
        vec![square_at(10, 10), square_at(50, 10)],
        &CentroidHistory::default(),
    );
    assert_eq!(out.len(), 2);
}

#[test]
fn test_static_contour_rejected() {
    let rejector = ArtifactRejector::new(&DetectionConfig::default());
    assert!(rejector
        .filter(vec![square_at(10, 10)], &history(&[(10.0, 10.0)]))
        .is_empty());
}

#[test]
fn test_downstream_motion_accepted() {
    let rejector = ArtifactRejector::new(&DetectionConfig::default());
    let previous = history(&[(10.0, 10.0)]);
    assert_eq!(rejector.filter(vec![square_at(15, 11)], &previous).len(), 1);
    // Upstream motion and large perpendicular drift are both rejected.
    assert!(rejector.filter(vec![square_at(5, 10)], &previous).is_empty());
    assert!(rejector.filter(vec![square_at(15, 20)], &previous).is_empty());
}

#[test]
fn test_entering_droplet_accepted_when_enabled() {
    let strict = ArtifactRejector::new(&DetectionConfig::default());
    let lenient = ArtifactRejector::new(&DetectionConfig {
        accept_entering: true,
        ..DetectionConfig::default()
    });
    let previous = history(&[(100.0, 10.0)]);

    let entering = || vec![square_at(5, 10)];
    assert!(strict.filter(entering(), &previous).is_empty());
    assert_eq!(lenient.filter(entering(), &previous).len(), 1);
    // Still static debris when it sits on a previous centroid.
    assert!(lenient.filter(vec![square_at(100, 10)], &previous).is_empty());
}

#[test]
fn test_degenerate_contour_skipped() {
    let rejector = ArtifactRejector::new(&DetectionConfig::default());
    let line = Contour::new(vec![Point::new(3, 0), Point::new(8, 0)]);
    assert!(rejector.filter(vec![line], &history(&[(0.0, 0.0)])).is_empty());
}

#[test]
fn test_frame_difference_rejects_static_debris() {
    let mut rejector = ArtifactRejector::new(&frame_diff_config());
    assert!(rejector.uses_frame_difference());

    // First frame: nothing to compare against.
    let first = blocks(40, 60, &[(10, 10), (30, 20)]);
    let out = rejector.filter_by_frame_difference(vec![square_at(10, 10), square_at(30, 20)], &first);
    assert_eq!(out.len(), 2);

    // Debris stays, the droplet moves 8 px downstream.
    let second = blocks(40, 60, &[(10, 10), (38, 20)]);
    let out = rejector.filter_by_frame_difference(vec![square_at(10, 10), square_at(38, 20)], &second);
    assert_eq!(out.len(), 1);
    let (cx, cy) = out[0].centroid().unwrap();
    assert_abs_diff_eq!(cx, 38.0, epsilon = 1e-9);
    assert_abs_diff_eq!(cy, 20.0, epsilon = 1e-9);
}

#[test]
fn test_frame_difference_threshold_and_shape_change() {
    let mut rejector = ArtifactRejector::new(&DetectionConfig {
        frame_diff_threshold: 200.0,
        ..frame_diff_config()
    });
    let dim = Array2::<f32>::from_elem((20, 20), 0.2);
    let brighter = Array2::<f32>::from_elem((20, 20), 0.6);
    rejector.filter_by_frame_difference(vec![square_at(10, 10)], &dim);
    // A change of about 100 in 8-bit units stays under the threshold.
    assert!(rejector
        .filter_by_frame_difference(vec![square_at(10, 10)], &brighter)
        .is_empty());

    // A new frame shape starts over and passes everything.
    let resized = Array2::<f32>::zeros((30, 30));
    assert_eq!(
        rejector
            .filter_by_frame_difference(vec![square_at(10, 10)], &resized)
            .len(),
        1
    );

    // Centroids outside the frame are rejected.
    assert!(rejector
        .filter_by_frame_difference(vec![square_at(40, 10)], &resized)
        .is_empty());
}

/// 9x9 bright blocks on black, as an 8-bit frame.
fn block_frame(centres: &[(usize, usize)]) -> Frame {
    let mut data = Array2::<u8>::zeros((40, 80));
    for &(x, y) in centres {
        for row in y - 4..=y + 4 {
            for col in x - 4..=x + 4 {
                data[[row, col]] = 255;
            }
        }
    }
    Frame::mono(data)
}

#[test]
fn test_detector_uses_frame_difference_when_enabled() {
    let config = DetectionConfig {
        background_frames: 1,
        ..frame_diff_config()
    };
    let mut detector = DropletDetector::new(&config);

    // Black background, then debris plus a droplet that moves 12 px.
    assert!(detector.process_frame(&block_frame(&[])).is_empty());
    assert_eq!(detector.process_frame(&block_frame(&[(10, 10), (30, 25)])).len(), 2);
    let metrics = detector.process_frame(&block_frame(&[(10, 10), (42, 25)]));
    assert_eq!(metrics.len(), 1);
    assert!((metrics[0].centroid.0 - 42.0).abs() < 1.0, "{metrics:?}");
}
