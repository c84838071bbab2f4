mod commands;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "droplet", about = "Droplet detection for microfluidic channels")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect droplets from a synthetic, SER or image-sequence source
    Run(commands::run::RunArgs),
    /// Print or save a detection profile
    Config(commands::config::ConfigArgs),
    /// Show SER file metadata
    Info(commands::info::InfoArgs),
    /// Render a synthetic droplet recording
    Simulate(commands::simulate::SimulateArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Config(args) => commands::config::run(args),
        Commands::Info(args) => commands::info::run(args),
        Commands::Simulate(args) => commands::simulate::run(args),
    }
}
