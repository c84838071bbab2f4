use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use droplet_core::camera::{FrameSource, SyntheticCamera, SyntheticConfig};
use droplet_core::io::{save_image, SerColor, SerWriter};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Args)]
pub struct SimulateArgs {
    /// Output SER file, or a directory with --png
    pub output: PathBuf,

    /// Number of frames to render
    #[arg(long, default_value = "300")]
    pub frames: usize,

    /// Sensor width in pixels
    #[arg(long, default_value = "640")]
    pub width: usize,

    /// Sensor height in pixels
    #[arg(long, default_value = "240")]
    pub height: usize,

    /// Flow speed in pixels per frame
    #[arg(long, default_value = "6")]
    pub speed: f64,

    /// Distance between droplets in pixels
    #[arg(long, default_value = "140")]
    pub spacing: f64,

    /// Droplet semi-axes along and across the flow, e.g. "20,12"
    #[arg(long, default_value = "20,12")]
    pub droplet: String,

    /// Uniform noise amplitude in 8-bit units
    #[arg(long, default_value = "0")]
    pub noise: u8,

    /// Number of static debris specks in the channel
    #[arg(long, default_value = "0")]
    pub debris: usize,

    /// Random seed
    #[arg(long, default_value = "7")]
    pub seed: u64,

    /// Write a PNG sequence instead of a SER file
    #[arg(long)]
    pub png: bool,
}

pub fn run(args: &SimulateArgs) -> Result<()> {
    let config = build_config(args)?;
    let (width, height) = (config.width, config.height);
    let mut camera = SyntheticCamera::new(config);

    let pb = ProgressBar::new(args.frames as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg:12} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    pb.set_message("Rendering");

    if args.png {
        std::fs::create_dir_all(&args.output)
            .with_context(|| format!("Failed to create {}", args.output.display()))?;
        while let Some(frame) = camera.capture_frame()? {
            let path = args
                .output
                .join(format!("frame_{:05}.png", frame.metadata.frame_index));
            save_image(&frame, &path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            pb.inc(1);
        }
    } else {
        let mut writer = SerWriter::create(&args.output, width as u32, height as u32, SerColor::Mono)
            .with_context(|| format!("Failed to create {}", args.output.display()))?;
        while let Some(frame) = camera.capture_frame()? {
            writer.write_frame(&frame)?;
            pb.inc(1);
        }
        writer.finalize()?;
    }

    pb.finish_with_message("Done");
    println!(
        "\n{} synthetic frames ({}x{}) saved to {}",
        args.frames,
        width,
        height,
        args.output.display()
    );
    Ok(())
}

fn build_config(args: &SimulateArgs) -> Result<SyntheticConfig> {
    let axes: Vec<f64> = args
        .droplet
        .split(',')
        .map(|s| s.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .with_context(|| format!("Invalid droplet size '{}'", args.droplet))?;
    let &[semi_major, semi_minor] = axes.as_slice() else {
        bail!("Droplet size needs two values, got '{}'", args.droplet);
    };

    let defaults = SyntheticConfig::default();
    let channel_center_y = args.height as f64 / 2.0;
    let channel_height = (semi_minor * 5.0).min(args.height as f64 - 2.0);

    // Debris spread evenly along the channel, alternating above and below
    // the centre line.
    let debris = (0..args.debris)
        .map(|i| {
            let x = (i as f64 + 0.5) * args.width as f64 / args.debris as f64;
            let side = if i % 2 == 0 { -1.0 } else { 1.0 };
            (x, channel_center_y + side * channel_height / 4.0)
        })
        .collect();

    Ok(SyntheticConfig {
        width: args.width,
        height: args.height,
        channel_center_y,
        channel_height,
        droplet_semi_major: semi_major,
        droplet_semi_minor: semi_minor,
        spacing: args.spacing,
        speed: args.speed,
        noise: args.noise,
        debris,
        seed: args.seed,
        frame_limit: Some(args.frames),
        ..defaults
    })
}
