//! Command-line argument definitions for the flowchart CLI.
//!
//! This module defines the [`Args`] structure parsed from the command line
//! using [`clap`]. Arguments control input/output paths, configuration file
//! selection, what gets written, and logging verbosity.

use clap::{Parser, ValueEnum};

/// What the CLI writes to the output file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Laid out nodes and routed relations, ready to draw
    #[default]
    Frame,
    /// The chart as a flat, ordered element list
    Export,
    /// The registered element types
    Types,
}

/// Command-line arguments for the flowchart tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input JSON file
    #[arg(help = "Path to a JSON array of element descriptors")]
    pub input: String,

    /// Path to the output JSON file
    #[arg(short, long, default_value = "out.json")]
    pub output: String,

    /// Path to configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<String>,

    /// What to write
    #[arg(short, long, value_enum, default_value_t = OutputMode::Frame)]
    pub mode: OutputMode,

    /// Measure labels with this system font instead of a fixed advance
    #[arg(long)]
    pub font: Option<String>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
