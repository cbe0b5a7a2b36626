//! Command line arguments.

use clap::{Parser, ValueEnum};
use log::LevelFilter;

/// Log levels accepted on the command line.
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// Rendering algorithm selection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Algo {
    /// Normal-shading preview
    Debug,
    /// Path tracing with next-event estimation
    Pt,
    /// Progressive photon mapping
    Ppm,
}

/// Command line arguments.
#[derive(Parser)]
#[command(name = "lumo")]
#[command(about = "A physically-based offline renderer", version)]
pub struct Args {
    /// Image width in pixels
    #[arg(long, alias = "sx", default_value_t = 1080)]
    pub width: usize,

    /// Image height in pixels
    #[arg(long, alias = "sy", default_value_t = 720)]
    pub height: usize,

    /// Output file path (.png for 8-bit with gamma correction, .exr for
    /// linear float)
    #[arg(short, long, default_value = "render.exr")]
    pub output: String,

    /// Number of samples per pixel (0 = unlimited)
    #[arg(short, long, default_value_t = 0)]
    pub samples: usize,

    /// Render time budget in seconds (0 = unlimited)
    #[arg(short, long, default_value_t = 0.0)]
    pub time: f64,

    /// Rendering algorithm
    #[arg(short, long, value_enum, default_value = "debug")]
    pub algo: Algo,

    /// Logging level
    #[arg(long, default_value = "info")]
    pub log_level: LogLevel,

    /// Built-in scene to render (cornell, spheres, caustic)
    pub scene: String,
}
