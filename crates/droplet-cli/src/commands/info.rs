use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use droplet_core::io::SerReader;

#[derive(Args)]
pub struct InfoArgs {
    /// Input SER file
    pub file: PathBuf,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let reader = SerReader::open(&args.file)
        .with_context(|| format!("Failed to open {}", args.file.display()))?;
    let header = &reader.header;

    println!("File:        {}", args.file.display());
    println!("Frames:      {}", reader.frame_count());
    println!("Dimensions:  {}x{}", header.width, header.height);
    println!("Bit depth:   {}", header.pixel_depth);
    println!("Color mode:  {}", header.color());

    if !header.observer.is_empty() {
        println!("Observer:    {}", header.observer);
    }
    if !header.telescope.is_empty() {
        println!("Telescope:   {}", header.telescope);
    }
    if !header.instrument.is_empty() {
        println!("Instrument:  {}", header.instrument);
    }

    let frame_bytes = header.frame_byte_size().unwrap_or(0);
    let total_mb = (frame_bytes * reader.frame_count()) as f64 / (1024.0 * 1024.0);
    println!("Data size:   {:.1} MB", total_mb);

    if reader.frame_count() > 1 {
        let first = reader.read_frame(0)?.metadata.timestamp_us;
        let last = reader.read_frame(reader.frame_count() - 1)?.metadata.timestamp_us;
        if let (Some(first), Some(last)) = (first, last) {
            let span_s = last.saturating_sub(first) as f64 / 1e6;
            let fps = (reader.frame_count() - 1) as f64 / span_s.max(f64::EPSILON);
            println!("Duration:    {:.2} s ({:.1} fps)", span_s, fps);
        }
    }

    Ok(())
}
