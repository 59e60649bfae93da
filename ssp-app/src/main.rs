//! SSP Client
//!
//! Subscribes to a sensor streaming process, projects every depth frame
//! through the lookup table and keeps the latest colored point cloud.

mod app;

use clap::Parser;
use std::path::PathBuf;

/// SSP Client - streamed depth to point cloud
#[derive(Parser, Debug)]
#[command(name = "ssp-client")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// JSON config file (PascalCase keys)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Streaming host, overrides `Host`
    #[arg(long)]
    host: Option<String>,

    /// Streaming port, overrides `HostPort`
    #[arg(short, long)]
    port: Option<u16>,

    /// Lookup table asset name, overrides `LutName`
    #[arg(long)]
    lut: Option<String>,

    /// Run the projection on the GPU
    #[arg(long)]
    gpu: bool,

    /// Number of ticks to run (0 runs until the stream ends)
    #[arg(short, long, default_value_t = 0)]
    ticks: u64,

    /// Delay between ticks in milliseconds
    #[arg(long, default_value_t = 16)]
    tick_interval_ms: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    app::init_logging();

    let args = Args::parse();
    app::run(args)
}
