//! Path commands for relation lines.
//!
//! Routes are produced as a list of absolute [`PathCommand`]s. They can be
//! encoded as SVG path data with [`PathCommand::to_svg_data`] or consumed
//! directly by a renderer that draws its own curves.

use serde::Serialize;
use svg::node::{Value, element::path::Data};

use crate::geometry::Point;

/// One absolute path drawing command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PathCommand {
    /// Start a new subpath at `to`.
    MoveTo { to: Point },
    /// Straight segment to `to`.
    LineTo { to: Point },
    /// Quadratic Bezier segment through `control` ending at `to`.
    QuadTo { control: Point, to: Point },
    /// Elliptical arc with equal radii ending at `to`.
    ArcTo {
        radius: f32,
        large_arc: bool,
        sweep: bool,
        to: Point,
    },
}

impl PathCommand {
    /// End point of this command.
    pub fn end(&self) -> Point {
        match self {
            Self::MoveTo { to }
            | Self::LineTo { to }
            | Self::QuadTo { to, .. }
            | Self::ArcTo { to, .. } => *to,
        }
    }

    /// Encodes a command list as the value of an SVG `d` attribute.
    ///
    /// # Examples
    ///
    /// ```
    /// use flowchart_core::draw::PathCommand;
    /// use flowchart_core::geometry::Point;
    ///
    /// let d = PathCommand::to_svg_data(&[
    ///     PathCommand::MoveTo { to: Point::new(0.0, 0.0) },
    ///     PathCommand::LineTo { to: Point::new(10.0, 0.0) },
    /// ]);
    /// assert!(d.starts_with('M'));
    /// assert!(d.contains('L'));
    /// ```
    pub fn to_svg_data(commands: &[PathCommand]) -> String {
        let data = commands.iter().fold(Data::new(), |data, command| match *command {
            Self::MoveTo { to } => data.move_to(vec![to.x(), to.y()]),
            Self::LineTo { to } => data.line_to(vec![to.x(), to.y()]),
            Self::QuadTo { control, to } => {
                data.quadratic_curve_to(vec![control.x(), control.y(), to.x(), to.y()])
            }
            Self::ArcTo {
                radius,
                large_arc,
                sweep,
                to,
            } => data.elliptical_arc_to(vec![
                radius,
                radius,
                0.0,
                if large_arc { 1.0 } else { 0.0 },
                if sweep { 1.0 } else { 0.0 },
                to.x(),
                to.y(),
            ]),
        });
        Value::from(data).to_string()
    }
}
