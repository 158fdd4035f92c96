//! Flowchart CLI library
//!
//! This module contains the core CLI logic for the flowchart tool: it loads
//! a descriptor file into a chart, lays it out, and writes the requested
//! JSON document.

pub mod error_adapter;

mod args;
mod config;

pub use args::{Args, OutputMode};

use std::fs;

use log::info;
use serde_json::Value;

use flowchart::{FlowChart, FlowchartError, draw::FontMeasurer};

/// Run the flowchart CLI application
///
/// # Errors
///
/// Returns `FlowchartError` for:
/// - File I/O errors
/// - Configuration loading errors
/// - Malformed JSON input
/// - Element validation errors
pub fn run(args: &Args) -> Result<(), FlowchartError> {
    info!(
        input_path = args.input,
        output_path = args.output;
        "Processing chart"
    );

    let app_config = config::load_config(args.config.as_ref())?;

    let source = fs::read_to_string(&args.input)?;
    let data: Value = serde_json::from_str(&source)?;

    let mut chart = FlowChart::new(app_config)?;
    if let Some(family) = &args.font {
        chart = chart.with_measurer(FontMeasurer::new(family.as_str()));
    }
    chart.reset_data(Some(data))?;

    let json = match args.mode {
        OutputMode::Frame => serde_json::to_string_pretty(&chart.frame())?,
        OutputMode::Export => serde_json::to_string_pretty(&chart.export_data()?)?,
        OutputMode::Types => serde_json::to_string_pretty(&chart.export_types(false))?,
    };

    fs::write(&args.output, json)?;

    info!(output_file = args.output, mode:? = args.mode; "Chart written successfully");

    Ok(())
}
