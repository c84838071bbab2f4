use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Args;
use droplet_core::camera::{
    FrameSource, ImageSequenceCamera, SerCamera, SyntheticCamera, SyntheticConfig,
};
use droplet_core::config::DetectionConfig;
use droplet_core::controller::{DetectionController, ExportFormat};
use droplet_core::frame::Roi;
use droplet_core::profile::{load_profile, ProfileLayout};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use crate::summary::{print_run_header, print_run_summary};

/// How long to wait for the detector to take one frame in lockstep mode.
const FRAME_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Args)]
pub struct RunArgs {
    /// SER file or image directory; a synthetic channel when omitted
    pub input: Option<PathBuf>,

    /// Detection profile (JSON or TOML, flat or nested)
    #[arg(long)]
    pub profile: Option<PathBuf>,

    /// Built-in preset, used when no profile is given
    #[arg(long, default_value = "default")]
    pub preset: String,

    /// Number of frames to process
    #[arg(long, default_value = "300")]
    pub frames: usize,

    /// Region of interest as x,y,width,height (defaults: channel for the
    /// synthetic source, full sensor otherwise)
    #[arg(long, value_parser = parse_roi)]
    pub roi: Option<Roi>,

    /// Replay a SER file from the start when it runs out
    #[arg(long = "loop")]
    pub looping: bool,

    /// Micrometres per pixel
    #[arg(long)]
    pub um_per_px: Option<f64>,

    /// Radius correction in pixels added to every droplet
    #[arg(long)]
    pub radius_offset: Option<f64>,

    /// Also count droplets entering the view while others are tracked
    #[arg(long)]
    pub accept_entering: bool,

    /// Push frames at source speed; the queue drops the oldest when the
    /// detector falls behind
    #[arg(long)]
    pub realtime: bool,

    /// Export raw measurements (format from the extension: .csv or .txt)
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Save the active profile after the run
    #[arg(long)]
    pub save_profile: Option<PathBuf>,

    /// Save the profile in the nested `droplet_detection` layout
    #[arg(long)]
    pub nested: bool,

    /// Print statistics as JSON instead of the summary
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &RunArgs) -> Result<()> {
    let config = build_config(args)?;
    let (mut camera, default_roi) = open_source(args.input.as_deref(), args.looping)?;
    let roi = args.roi.unwrap_or(default_roi);
    camera
        .set_roi(roi)
        .with_context(|| format!("ROI {roi:?} does not fit the source"))?;

    let controller = DetectionController::new(config)?;
    if !args.json {
        print_run_header(&controller.config(), camera.name(), &roi);
    }

    let total = camera
        .frame_count()
        .map_or(args.frames, |n| n.min(args.frames));
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg:12} [{bar:40}] {pos}/{len} {per_sec}")?
            .progress_chars("=> "),
    );
    pb.set_message("Detecting");

    controller.start(camera.as_ref())?;
    let started = Instant::now();
    let pumped = pump_frames(&controller, camera.as_mut(), &roi, total, args.realtime, &pb);
    drain(&controller);
    controller.stop();
    let elapsed = started.elapsed();
    let pumped = pumped?;
    pb.finish_with_message("Done");

    let processed = controller.status().frame_count as usize;
    if processed < pumped {
        warn!(
            sent = pumped,
            processed,
            "Detector fell behind; the oldest queued frames were dropped"
        );
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&controller.statistics())?);
    } else {
        print_run_summary(
            &controller.status(),
            &controller.statistics(),
            &controller.performance(),
            pumped,
            elapsed,
        );
    }

    if let Some(ref path) = args.export {
        export_measurements(&controller, path)?;
    }
    if let Some(ref path) = args.save_profile {
        let layout = if args.nested {
            ProfileLayout::Nested
        } else {
            ProfileLayout::Flat
        };
        controller
            .save_profile(path, layout)
            .with_context(|| format!("Failed to save profile to {}", path.display()))?;
        println!("Profile saved to {}", path.display());
    }

    Ok(())
}

fn build_config(args: &RunArgs) -> Result<DetectionConfig> {
    let mut config = if let Some(ref path) = args.profile {
        load_profile(path).with_context(|| format!("Invalid profile {}", path.display()))?
    } else {
        match DetectionConfig::preset(&args.preset) {
            Some(config) => config,
            None => bail!(
                "Unknown preset '{}'. Available: {}",
                args.preset,
                DetectionConfig::PRESETS.join(", ")
            ),
        }
    };

    if let Some(um_per_px) = args.um_per_px {
        config.um_per_px = um_per_px;
    }
    if let Some(offset) = args.radius_offset {
        config.radius_offset_px = offset;
    }
    if args.accept_entering {
        config.accept_entering = true;
    }
    config.validate()?;
    Ok(config)
}

/// Open the frame source together with its default ROI: the channel for
/// the synthetic source, the full sensor otherwise.
fn open_source(input: Option<&Path>, looping: bool) -> Result<(Box<dyn FrameSource>, Roi)> {
    let camera: Box<dyn FrameSource> = match input {
        None => {
            let camera = SyntheticCamera::new(SyntheticConfig::default());
            let roi = camera.channel_roi();
            return Ok((Box::new(camera), roi));
        }
        Some(path) if path.is_dir() => Box::new(
            ImageSequenceCamera::open(path)
                .with_context(|| format!("Failed to read images from {}", path.display()))?,
        ),
        Some(path) => Box::new(
            SerCamera::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?
                .looping(looping),
        ),
    };
    let (w, h) = camera.sensor_size();
    Ok((camera, Roi::new(0, 0, w as u32, h as u32)))
}

/// Feed up to `total` frames. Unless `realtime` is set, each frame is
/// handed over only once the previous one was processed, so offline
/// replays never lose frames to the drop-oldest queue.
fn pump_frames(
    controller: &DetectionController,
    camera: &mut dyn FrameSource,
    roi: &Roi,
    total: usize,
    realtime: bool,
    pb: &ProgressBar,
) -> Result<usize> {
    let mut pumped = 0;
    while pumped < total {
        let Some(frame) = camera.frame_roi(roi)? else {
            break;
        };
        let target = controller.status().frame_count + 1;
        if !controller.add_frame(frame) {
            bail!("Detector rejected frame {pumped}");
        }
        pumped += 1;
        pb.inc(1);

        if !realtime && !wait_for(|| controller.status().frame_count >= target) {
            bail!("Frame {pumped} was not processed within {FRAME_TIMEOUT:?}");
        }
    }
    Ok(pumped)
}

/// Let the processing thread take whatever is still queued.
fn drain(controller: &DetectionController) {
    wait_for(|| controller.pending_frames() == 0);
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + FRAME_TIMEOUT;
    while !condition() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    true
}

fn export_measurements(controller: &DetectionController, path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("csv");
    let format: ExportFormat = extension.parse()?;
    match controller.export(extension)? {
        Some(body) => {
            std::fs::write(path, body)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "{} measurements exported to {} ({})",
                controller.raw_log_len(),
                path.display(),
                format.extension()
            );
        }
        None => println!("No droplets measured; nothing exported"),
    }
    Ok(())
}

fn parse_roi(s: &str) -> std::result::Result<Roi, String> {
    let values: Vec<i64> = s
        .split(',')
        .map(|v| v.trim().parse::<i64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| format!("invalid ROI '{s}': {e}"))?;
    match *values.as_slice() {
        [x, y, w, h] => Roi::from_signed(x, y, w, h).map_err(|e| e.to_string()),
        _ => Err(format!("ROI needs x,y,width,height, got '{s}'")),
    }
}
