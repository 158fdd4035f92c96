//! Stroke and line-style definitions for relation lines.
//!
//! # Overview
//!
//! - [`StrokeStyle`]: line pattern (solid, dashed, dotted)
//! - [`StrokeDefinition`]: color, width and style of one line
//!
//! Dash patterns scale with the stroke width so that thick dashed lines keep
//! the same proportions as thin ones:
//!
//! | Style    | `stroke-dasharray`      |
//! |----------|-------------------------|
//! | `solid`  | none                    |
//! | `dashed` | `width*4 width*2`       |
//! | `dotted` | `width width`           |

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::color::Color;

// =============================================================================
// Type Definitions
// =============================================================================

/// The line pattern of a stroke.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StrokeStyle {
    /// Continuous line.
    #[default]
    Solid,
    /// Long dashes.
    Dashed,
    /// Dots, one stroke width apart.
    Dotted,
}

impl FromStr for StrokeStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "solid" => Ok(Self::Solid),
            "dashed" => Ok(Self::Dashed),
            "dotted" => Ok(Self::Dotted),
            _ => Err(format!(
                "invalid line style `{s}`, expected one of: solid, dashed, dotted"
            )),
        }
    }
}

impl fmt::Display for StrokeStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Solid => "solid",
            Self::Dashed => "dashed",
            Self::Dotted => "dotted",
        })
    }
}

impl StrokeStyle {
    /// Returns the dash and gap lengths for a stroke of the given width, or
    /// `None` for a continuous line.
    ///
    /// # Examples
    ///
    /// ```
    /// use flowchart_core::draw::StrokeStyle;
    ///
    /// assert_eq!(StrokeStyle::Solid.dash_array(2.0), None);
    /// assert_eq!(StrokeStyle::Dashed.dash_array(2.0), Some([8.0, 4.0]));
    /// assert_eq!(StrokeStyle::Dotted.dash_array(2.0), Some([2.0, 2.0]));
    /// ```
    pub fn dash_array(self, width: f32) -> Option<[f32; 2]> {
        match self {
            Self::Solid => None,
            Self::Dashed => Some([width * 4.0, width * 2.0]),
            Self::Dotted => Some([width, width]),
        }
    }

    /// Returns the `stroke-dasharray` attribute value for the given width.
    pub fn to_svg_value(self, width: f32) -> Option<String> {
        self.dash_array(width)
            .map(|[dash, gap]| format!("{dash} {gap}"))
    }
}

/// Color, width and pattern of a single line.
///
/// # Examples
///
/// ```
/// use flowchart_core::color::Color;
/// use flowchart_core::draw::{StrokeDefinition, StrokeStyle};
///
/// let stroke = StrokeDefinition::new(Color::new("#333").unwrap(), 2.0)
///     .with_style(StrokeStyle::Dashed);
/// assert_eq!(stroke.dash_array(), Some([8.0, 4.0]));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrokeDefinition {
    color: Color,
    width: f32,
    style: StrokeStyle,
}

impl StrokeDefinition {
    /// Creates a solid stroke.
    pub fn new(color: Color, width: f32) -> Self {
        Self {
            color,
            width,
            style: StrokeStyle::Solid,
        }
    }

    /// Returns a copy with the given style.
    pub fn with_style(mut self, style: StrokeStyle) -> Self {
        self.style = style;
        self
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn style(&self) -> StrokeStyle {
        self.style
    }

    /// Dash pattern for this stroke's style and width.
    pub fn dash_array(&self) -> Option<[f32; 2]> {
        self.style.dash_array(self.width)
    }
}

impl Default for StrokeDefinition {
    fn default() -> Self {
        Self::new(Color::default(), 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stroke_style_from_str() {
        assert_eq!("solid".parse::<StrokeStyle>(), Ok(StrokeStyle::Solid));
        assert_eq!("dashed".parse::<StrokeStyle>(), Ok(StrokeStyle::Dashed));
        assert_eq!("dotted".parse::<StrokeStyle>(), Ok(StrokeStyle::Dotted));
        assert!("wavy".parse::<StrokeStyle>().is_err());
    }

    #[test]
    fn test_stroke_style_dash_array_scales_with_width() {
        assert_eq!(StrokeStyle::Dashed.dash_array(1.0), Some([4.0, 2.0]));
        assert_eq!(StrokeStyle::Dashed.dash_array(3.0), Some([12.0, 6.0]));
        assert_eq!(StrokeStyle::Dotted.dash_array(3.0), Some([3.0, 3.0]));
        assert_eq!(StrokeStyle::Solid.dash_array(3.0), None);
    }

    #[test]
    fn test_stroke_style_svg_value() {
        assert_eq!(StrokeStyle::Dashed.to_svg_value(1.0).as_deref(), Some("4 2"));
        assert_eq!(StrokeStyle::Solid.to_svg_value(1.0), None);
    }

    #[test]
    fn test_stroke_definition_defaults() {
        let stroke = StrokeDefinition::default();
        assert_eq!(stroke.width(), 1.0);
        assert_eq!(stroke.style(), StrokeStyle::Solid);
        assert_eq!(stroke.dash_array(), None);
    }
}
