use approx::assert_abs_diff_eq;

use droplet_core::detection::{BoundingBox, DropletMetrics};
use droplet_core::histogram::{DropletHistogram, Metric, MetricStatistics};

fn metrics(major: f64, w: u32, h: u32, area: f64) -> DropletMetrics {
    DropletMetrics {
        area_px: area,
        area_um2: area,
        bounding_box: BoundingBox {
            x: 0,
            y: 0,
            width: w,
            height: h,
        },
        centroid: (0.0, 0.0),
        aspect_ratio: w.max(h) as f64 / w.min(h).max(1) as f64,
        major_axis_px: major,
        major_axis_um: major,
        equivalent_diameter_px: major / 2.0,
        equivalent_diameter_um: major / 2.0,
    }
}

#[test]
fn test_empty_histogram_uses_default_range() {
    let hist = DropletHistogram::new(10, 4, 1.0);
    let (edges, counts) = hist.get_histogram(Metric::Width);
    assert_eq!(edges, vec![0.0, 25.0, 50.0, 75.0, 100.0]);
    assert_eq!(counts, vec![0; 4]);
    let stats = hist.get_statistics();
    assert_eq!(stats.count, 0);
    assert_eq!(stats.width, MetricStatistics::default());
}

#[test]
fn test_histogram_counts_include_max() {
    let mut hist = DropletHistogram::new(10, 2, 1.0);
    hist.update(&[metrics(10.0, 10, 4, 30.0), metrics(20.0, 20, 5, 60.0)]);
    let (edges, counts) = hist.get_histogram(Metric::Width);
    assert_eq!(edges, vec![10.0, 15.0, 20.0]);
    assert_eq!(counts, vec![1, 1]);
    let (_, heights) = hist.get_histogram(Metric::Height);
    assert_eq!(heights.iter().sum::<u64>(), 2);
}

#[test]
fn test_single_value_histogram() {
    let mut hist = DropletHistogram::new(10, 2, 1.0);
    hist.update(&[metrics(7.0, 7, 3, 10.0)]);
    let (edges, counts) = hist.get_histogram(Metric::Width);
    assert_eq!(edges, vec![6.5, 7.0, 7.5]);
    assert_eq!(counts, vec![0, 1]);
}

#[test]
fn test_window_evicts_oldest() {
    let mut hist = DropletHistogram::new(3, 5, 1.0);
    for i in 0..5 {
        hist.update(&[metrics(i as f64, 4, 2, 1.0)]);
    }
    assert_eq!(hist.len(), 3);
    assert_eq!(hist.values(Metric::Width), vec![2.0, 3.0, 4.0]);
}

#[test]
fn test_statistics_are_scaled() {
    let mut hist = DropletHistogram::new(10, 5, 2.0);
    hist.update(&[
        metrics(10.0, 10, 4, 30.0),
        metrics(10.2, 10, 4, 30.0),
        metrics(14.0, 14, 6, 50.0),
    ]);
    let stats = hist.get_statistics();
    assert_eq!(stats.unit, "um");
    assert_eq!(stats.count, 3);
    assert_abs_diff_eq!(stats.width.min, 20.0);
    assert_abs_diff_eq!(stats.width.max, 28.0);
    assert_abs_diff_eq!(stats.width.mode, 20.0);
    // Area scales with the square of the ratio.
    assert_abs_diff_eq!(stats.area.min, 120.0);
    assert_abs_diff_eq!(stats.height.mode, 8.0);
}

#[test]
fn test_bars_sorted() {
    let mut hist = DropletHistogram::new(10, 5, 1.0);
    hist.update(&[
        metrics(12.4, 12, 4, 30.0),
        metrics(9.6, 10, 4, 30.0),
        metrics(10.3, 10, 4, 30.0),
    ]);
    assert_eq!(hist.get_bars(Metric::Width), vec![(10.0, 2), (12.0, 1)]);
}

#[test]
fn test_reconfigure_discards() {
    let mut hist = DropletHistogram::new(10, 5, 1.0);
    hist.update(&[metrics(10.0, 10, 4, 30.0)]);
    hist.reconfigure(20, 8);
    assert!(hist.is_empty());
    assert_eq!(hist.bins(), 8);
    assert_eq!(hist.window_size(), 20);
}

#[test]
fn test_to_json_shape() {
    let mut hist = DropletHistogram::new(10, 5, 1.0);
    hist.update(&[metrics(10.0, 10, 4, 30.0)]);
    let json = hist.to_json().unwrap();
    assert_eq!(json["unit"], "px");
    assert_eq!(json["count"], 1);
    assert_eq!(json["histograms"]["width"]["counts"].as_array().unwrap().len(), 5);
    assert_eq!(json["histograms"]["area"]["bins"].as_array().unwrap().len(), 6);
    assert!(json["statistics"]["diameter"]["mean"].is_number());
}

#[test]
fn test_unknown_metric() {
    assert!("volume".parse::<Metric>().is_err());
    assert_eq!("area".parse::<Metric>().unwrap(), Metric::Area);
}
