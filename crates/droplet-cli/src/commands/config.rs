use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use droplet_core::config::DetectionConfig;
use droplet_core::profile::{render_profile, save_profile, ProfileFormat, ProfileLayout};

#[derive(Args)]
pub struct ConfigArgs {
    /// Built-in preset: default, small_droplets, large_droplets, high_density
    #[arg(long, default_value = "default")]
    pub preset: String,

    /// Write the nested `droplet_detection` layout
    #[arg(long)]
    pub nested: bool,

    /// Print TOML instead of JSON (files follow their extension)
    #[arg(long)]
    pub toml: bool,

    /// Write profile to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Print or save a detection profile built from a preset.
pub fn run(args: &ConfigArgs) -> Result<()> {
    let Some(config) = DetectionConfig::preset(&args.preset) else {
        bail!(
            "Unknown preset '{}'. Available: {}",
            args.preset,
            DetectionConfig::PRESETS.join(", ")
        );
    };
    let layout = if args.nested {
        ProfileLayout::Nested
    } else {
        ProfileLayout::Flat
    };

    if let Some(ref path) = args.output {
        save_profile(&config, path, layout)
            .with_context(|| format!("Failed to write profile to {}", path.display()))?;
        println!("Profile '{}' saved to {}", args.preset, path.display());
    } else {
        let format = if args.toml {
            ProfileFormat::Toml
        } else {
            ProfileFormat::Json
        };
        println!("{}", render_profile(&config, layout, format)?);
    }

    Ok(())
}
