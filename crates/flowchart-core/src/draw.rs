//! Drawing metadata handed from the engine to a renderer.
//!
//! Nothing in here paints. The types describe strokes, path geometry and
//! text extents so that any renderer can reproduce the engine's output.

mod path;
mod stroke;
mod text;

pub use path::PathCommand;
pub use stroke::{StrokeDefinition, StrokeStyle};
pub use text::{FixedWidthMeasurer, FontMeasurer, TextMeasure};
