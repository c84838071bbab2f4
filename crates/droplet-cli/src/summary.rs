use std::collections::BTreeMap;
use std::time::Duration;

use console::Style;
use droplet_core::config::DetectionConfig;
use droplet_core::controller::{ControllerStatistics, ControllerStatus, StageSummary};
use droplet_core::frame::Roi;
use droplet_core::histogram::{Metric, MetricStatistics};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
        }
    }
}

pub fn print_run_header(config: &DetectionConfig, source: &str, roi: &Roi) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Droplet Detection"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(17)));
    println!();

    println!("  {:<14}{}", s.label.apply_to("Source"), s.method.apply_to(source));
    println!(
        "  {:<14}{}",
        s.label.apply_to("ROI"),
        s.value.apply_to(format!(
            "{}x{} at ({}, {})",
            roi.width, roi.height, roi.x, roi.y
        ))
    );
    println!();

    println!("  {}", s.header.apply_to("Preprocessing"));
    println!(
        "    {:<14}{}",
        s.label.apply_to("Background"),
        s.method.apply_to(format!(
            "{} ({} frames)",
            config.background_method, config.background_frames
        ))
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("Threshold"),
        s.method.apply_to(config.threshold_method)
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("Morphology"),
        s.method.apply_to(format!(
            "{} ({}px)",
            config.morph_operation, config.morph_kernel_size
        ))
    );
    println!();

    println!("  {}", s.header.apply_to("Filters"));
    println!(
        "    {:<14}{}",
        s.label.apply_to("Area"),
        s.value.apply_to(format!("{} .. {} px", config.min_area, config.max_area))
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("Aspect"),
        s.value.apply_to(format!(
            "{} .. {}",
            config.min_aspect_ratio, config.max_aspect_ratio
        ))
    );
    match config.channel_band {
        Some((y_min, y_max)) => println!(
            "    {:<14}{}",
            s.label.apply_to("Channel"),
            s.value.apply_to(format!(
                "rows {y_min} .. {y_max} (+/- {})",
                config.channel_band_margin
            ))
        ),
        None => println!(
            "    {:<14}{}",
            s.label.apply_to("Channel"),
            s.disabled.apply_to("whole ROI")
        ),
    }
    if config.accept_entering {
        println!(
            "    {:<14}{}",
            s.label.apply_to("Entering"),
            s.method.apply_to("accepted")
        );
    }
    if config.use_frame_diff {
        println!(
            "    {:<14}{}",
            s.label.apply_to("Rejection"),
            s.method.apply_to(format!(
                "frame difference (> {})",
                config.frame_diff_threshold
            ))
        );
    }
    println!();

    println!(
        "  {:<14}{}",
        s.header.apply_to("Calibration"),
        s.value.apply_to(format!(
            "{} um/px, radius offset {} px",
            config.um_per_px, config.radius_offset_px
        ))
    );
    println!();
}

pub fn print_run_summary(
    status: &ControllerStatus,
    stats: &ControllerStatistics,
    performance: &BTreeMap<String, StageSummary>,
    frames_pumped: usize,
    elapsed: Duration,
) {
    let s = Styles::new();
    let secs = elapsed.as_secs_f64();

    println!();
    println!("  {}", s.header.apply_to("Session"));
    println!(
        "    {:<14}{}",
        s.label.apply_to("Frames"),
        s.value.apply_to(format!(
            "{} processed / {} sent",
            status.frame_count, frames_pumped
        ))
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("Droplets"),
        s.value.apply_to(status.droplet_count_total)
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("Throughput"),
        s.value.apply_to(format!(
            "{:.1} fps",
            status.frame_count as f64 / secs.max(f64::EPSILON)
        ))
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("Detector"),
        s.method.apply_to(&status.detector_state)
    );
    println!();

    let hist = &stats.histogram;
    if hist.count == 0 {
        println!(
            "  {:<14}{}",
            s.header.apply_to("Statistics"),
            s.disabled.apply_to("no droplets measured")
        );
        println!();
    } else {
        println!(
            "  {}",
            s.header.apply_to(format!(
                "Statistics ({} droplets, {})",
                hist.count, hist.unit
            ))
        );
        println!(
            "    {:<14}{:>10}{:>10}{:>10}{:>10}{:>10}",
            "",
            s.label.apply_to("mean"),
            s.label.apply_to("std"),
            s.label.apply_to("min"),
            s.label.apply_to("max"),
            s.label.apply_to("mode")
        );
        for metric in Metric::ALL {
            print_metric_row(&s, metric.key(), hist.get(metric));
        }
        println!();
    }

    println!("  {}", s.header.apply_to("Stage timings (ms)"));
    println!(
        "    {:<20}{:>10}{:>10}{:>10}",
        "",
        s.label.apply_to("mean"),
        s.label.apply_to("p95"),
        s.label.apply_to("max")
    );
    for (stage, summary) in performance {
        if summary.count == 0 {
            continue;
        }
        println!(
            "    {:<20}{:>10.3}{:>10.3}{:>10.3}",
            s.label.apply_to(stage),
            summary.mean,
            summary.p95,
            summary.max
        );
    }
    println!();
}

fn print_metric_row(s: &Styles, name: &str, m: &MetricStatistics) {
    println!(
        "    {:<14}{:>10.2}{:>10.2}{:>10.2}{:>10.2}{:>10.2}",
        s.label.apply_to(name),
        m.mean,
        m.std,
        m.min,
        m.max,
        m.mode
    );
}
