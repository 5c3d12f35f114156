// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand, ValueEnum};
use kinect_bridge::backends::BridgeType;
use kinect_bridge::config::Config;
use kinect_bridge::sensor::ColorFormat;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "kinect-bridge")]
#[command(about = "Kinect v2 sensor tool over the Kinect Common Bridge")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Bridge implementation (overrides the configuration file)
    #[arg(short, long, global = true, value_enum)]
    backend: Option<BackendArg>,

    /// Configuration file (default: ~/.config/kinect-bridge/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Emulated,
    Native,
}

impl From<BackendArg> for BridgeType {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Emulated => BridgeType::Emulated,
            BackendArg::Native => BridgeType::Native,
        }
    }
}

/// Image source selectable for capture
#[derive(Clone, Copy, ValueEnum)]
pub enum SourceArg {
    BodyIndex,
    Depth,
    Infrared,
    LongIr,
    Color,
}

/// Color pixel format selectable for capture
#[derive(Clone, Copy, ValueEnum)]
pub enum ColorFormatArg {
    Rgba,
    Bgra,
    Yuy2,
}

impl From<ColorFormatArg> for ColorFormat {
    fn from(arg: ColorFormatArg) -> Self {
        match arg {
            ColorFormatArg::Rgba => ColorFormat::Rgba,
            ColorFormatArg::Bgra => ColorFormat::Bgra,
            ColorFormatArg::Yuy2 => ColorFormat::Yuy2,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Wait until a sensor can be opened, then close it again
    Connect {
        /// Give up after this many attempts (0 = until Ctrl+C)
        #[arg(short, long)]
        attempts: Option<u32>,
    },

    /// Show frame descriptions, audio format and readiness
    Info,

    /// Acquire frames from one image source
    Capture {
        /// Image source
        #[arg(value_enum, default_value = "depth")]
        source: SourceArg,

        /// Number of frames to acquire
        #[arg(short, long, default_value = "1")]
        frames: u32,

        /// Pixel format for the color source
        #[arg(long, value_enum, default_value = "bgra")]
        format: ColorFormatArg,

        /// Save the last frame as PNG (a directory gets a timestamped name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Read blocks from the microphone array
    Audio {
        /// Number of reads
        #[arg(short, long, default_value = "10")]
        reads: u32,
    },

    /// Project a camera-space point (metres) into depth and color space
    Map {
        #[arg(allow_negative_numbers = true)]
        x: f32,
        #[arg(allow_negative_numbers = true)]
        y: f32,
        #[arg(allow_negative_numbers = true)]
        z: f32,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=kinect_bridge=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    let mut config = match cli.config.as_deref() {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(backend) = cli.backend {
        config.backend = backend.into();
    }

    match cli.command {
        Commands::Connect { attempts } => cli::connect(&config, attempts),
        Commands::Info => cli::info(&config),
        Commands::Capture {
            source,
            frames,
            format,
            output,
        } => cli::capture(&config, source, format.into(), frames, output),
        Commands::Audio { reads } => cli::audio(&config, reads),
        Commands::Map { x, y, z } => cli::map(&config, x, y, z),
    }
}
