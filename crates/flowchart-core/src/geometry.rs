//! Geometric primitives for diagram layout and routing.
//!
//! This module provides the value types used throughout the flowchart engine
//! for positions, sizes, bounding boxes and node sides.
//!
//! # Overview
//!
//! - [`Point`] - A 2D coordinate in diagram space
//! - [`Size`] - Width and height dimensions
//! - [`Bounds`] - A rectangular box defined by minimum and maximum coordinates
//! - [`Insets`] - Padding values for four sides
//! - [`Side`] - One of the four sides of a node box
//!
//! # Coordinate System
//!
//! The coordinate system is the SVG one:
//!
//! ```text
//!   (0,0) ────────► +X (left → right)
//!     │
//!     │
//!     ▼
//!    +Y (top → bottom)
//! ```

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize, Serializer, ser::SerializeStruct};

/// A 2D point in diagram coordinate space.
///
/// # Examples
///
/// ```
/// # use flowchart_core::geometry::Point;
/// let p1 = Point::new(10.0, 20.0);
/// let p2 = Point::new(5.0, 5.0);
///
/// let mid = p1.midpoint(p2);
/// assert_eq!(mid.x(), 7.5);
/// assert_eq!(mid.y(), 12.5);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Point {
    x: f32,
    y: f32,
}

impl Point {
    /// Creates a new point with the specified coordinates
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Returns the x-coordinate of the point
    pub fn x(self) -> f32 {
        self.x
    }

    /// Returns the y-coordinate of the point
    pub fn y(self) -> f32 {
        self.y
    }

    /// Creates a new point with the specified x-coordinate
    pub fn with_x(mut self, x: f32) -> Self {
        self.x = x;
        self
    }

    /// Creates a new point with the specified y-coordinate
    pub fn with_y(mut self, y: f32) -> Self {
        self.y = y;
        self
    }

    /// Checks if both x and y coordinates are zero
    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    /// Adds another point to this point, returning a new point.
    pub fn add_point(self, other: Point) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    /// Subtracts another point from this point, returning a new point
    pub fn sub_point(self, other: Point) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }

    /// Calculates the midpoint between this point and another point
    pub fn midpoint(self, other: Point) -> Self {
        Self {
            x: (self.x + other.x) / 2.0,
            y: (self.y + other.y) / 2.0,
        }
    }

    /// Euclidean distance to another point.
    pub fn distance(self, other: Point) -> f32 {
        self.sub_point(other).hypot()
    }

    /// Calculates the hypotenuse (Euclidean distance from origin)
    pub fn hypot(self) -> f32 {
        self.x.hypot(self.y)
    }

    /// Rounds both coordinates down to whole pixels.
    ///
    /// Anchors and control points are floored so that a route recomputed
    /// from persisted offsets lands on the same pixel grid.
    ///
    /// ```
    /// # use flowchart_core::geometry::Point;
    /// let p = Point::new(10.7, -3.2).floor();
    /// assert_eq!(p, Point::new(10.0, -4.0));
    /// ```
    pub fn floor(self) -> Self {
        Self {
            x: self.x.floor(),
            y: self.y.floor(),
        }
    }

    /// Returns a new point with absolute values of both coordinates
    pub fn abs(self) -> Self {
        Self {
            x: self.x.abs(),
            y: self.y.abs(),
        }
    }
}

/// Represents the dimensions of an element with width and height
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Size {
    width: f32,
    height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Returns the width dimension of this size
    pub fn width(self) -> f32 {
        self.width
    }

    /// Returns the height dimension of this size
    pub fn height(self) -> f32 {
        self.height
    }

    /// Returns a new Size with the maximum width and height between this size and another
    pub fn max(self, other: Size) -> Self {
        Self {
            width: self.width.max(other.width),
            height: self.height.max(other.height),
        }
    }

    /// Returns a new Size with padding added to both width and height
    pub fn add_padding(self, insets: Insets) -> Self {
        Self {
            width: self.width + insets.horizontal_sum(),
            height: self.height + insets.vertical_sum(),
        }
    }

    /// Returns true if both width and height are zero
    pub fn is_zero(self) -> bool {
        self.width == 0.0 && self.height == 0.0
    }
}

/// A rectangular bounding box with minimum and maximum coordinates.
///
/// Intersection is inclusive: two boxes that share an edge intersect.
///
/// ```
/// # use flowchart_core::geometry::{Bounds, Point, Size};
/// let a = Bounds::new_from_top_left(Point::new(0.0, 0.0), Size::new(10.0, 10.0));
/// let b = Bounds::new_from_top_left(Point::new(10.0, 0.0), Size::new(10.0, 10.0));
/// let c = Bounds::new_from_top_left(Point::new(11.0, 0.0), Size::new(10.0, 10.0));
/// assert!(a.intersects(&b));
/// assert!(!a.intersects(&c));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bounds {
    min_x: f32,
    min_y: f32,
    max_x: f32,
    max_y: f32,
}

impl Bounds {
    /// Creates a new bounds from a top-left point and a size
    pub fn new_from_top_left(top_left: Point, size: Size) -> Self {
        Self {
            min_x: top_left.x,
            min_y: top_left.y,
            max_x: top_left.x + size.width,
            max_y: top_left.y + size.height,
        }
    }

    /// Returns the minimum x-coordinate (left edge)
    pub fn min_x(self) -> f32 {
        self.min_x
    }

    /// Returns the minimum y-coordinate (top edge)
    pub fn min_y(self) -> f32 {
        self.min_y
    }

    /// Returns the maximum x-coordinate (right edge)
    pub fn max_x(self) -> f32 {
        self.max_x
    }

    /// Returns the maximum y-coordinate (bottom edge)
    pub fn max_y(self) -> f32 {
        self.max_y
    }

    /// Returns the center point of the bounds
    pub fn center(self) -> Point {
        Point::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Returns the width of the bounds
    pub fn width(self) -> f32 {
        self.max_x - self.min_x
    }

    /// Returns the height of the bounds
    pub fn height(self) -> f32 {
        self.max_y - self.min_y
    }

    /// Returns the top-left corner as a Point
    pub fn min_point(self) -> Point {
        Point {
            x: self.min_x,
            y: self.min_y,
        }
    }

    /// Converts bounds to a Size object
    pub fn to_size(self) -> Size {
        Size {
            width: self.width(),
            height: self.height(),
        }
    }

    /// Merges two bounds into the smallest bounds that contains both.
    ///
    /// ```
    /// # use flowchart_core::geometry::{Bounds, Point, Size};
    /// let header = Bounds::new_from_top_left(Point::new(0.0, 0.0), Size::new(100.0, 30.0));
    /// let content = Bounds::new_from_top_left(Point::new(10.0, 40.0), Size::new(120.0, 80.0));
    ///
    /// let combined = header.merge(&content);
    /// assert_eq!(combined.width(), 130.0);
    /// assert_eq!(combined.height(), 120.0);
    /// ```
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Moves the bounds by the specified offset.
    pub fn translate(&self, offset: Point) -> Self {
        Self {
            min_x: self.min_x + offset.x,
            min_y: self.min_y + offset.y,
            max_x: self.max_x + offset.x,
            max_y: self.max_y + offset.y,
        }
    }

    /// Returns true if the two boxes overlap or touch.
    pub fn intersects(&self, other: &Self) -> bool {
        !(other.max_x < self.min_x
            || other.min_x > self.max_x
            || other.max_y < self.min_y
            || other.min_y > self.max_y)
    }

    /// Returns the midpoint of the given side.
    pub fn side_center(self, side: Side) -> Point {
        let center = self.center();
        match side {
            Side::Top => center.with_y(self.min_y),
            Side::Right => center.with_x(self.max_x),
            Side::Bottom => center.with_y(self.max_y),
            Side::Left => center.with_x(self.min_x),
        }
    }
}

impl Serialize for Bounds {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Bounds", 4)?;
        state.serialize_field("left", &self.min_x)?;
        state.serialize_field("top", &self.min_y)?;
        state.serialize_field("width", &self.width())?;
        state.serialize_field("height", &self.height())?;
        state.end()
    }
}

/// Represents spacing around an element with potentially different values for each side
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Insets {
    top: f32,
    right: f32,
    bottom: f32,
    left: f32,
}

impl Insets {
    /// Creates new insets with specified values for each side
    pub fn new(top: f32, right: f32, bottom: f32, left: f32) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    /// Creates insets with one value for top/bottom and another for left/right
    pub fn symmetric(vertical: f32, horizontal: f32) -> Self {
        Self::new(vertical, horizontal, vertical, horizontal)
    }

    /// Returns the sum of left and right insets
    pub fn horizontal_sum(self) -> f32 {
        self.left + self.right
    }

    /// Returns the sum of top and bottom insets
    pub fn vertical_sum(self) -> f32 {
        self.top + self.bottom
    }
}

/// One side of a node box.
///
/// Ports attach to a side and relation endpoints remember the side they
/// leave from, which decides the direction curves bulge out of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Top,
    Right,
    Bottom,
    Left,
}

impl Side {
    /// All sides in port iteration order.
    pub const ALL: [Side; 4] = [Side::Top, Side::Right, Side::Bottom, Side::Left];

    /// Returns true for the sides whose edge runs horizontally.
    pub fn is_horizontal_edge(self) -> bool {
        matches!(self, Side::Top | Side::Bottom)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Top => "top",
            Side::Right => "right",
            Side::Bottom => "bottom",
            Side::Left => "left",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top" => Ok(Side::Top),
            "right" => Ok(Side::Right),
            "bottom" => Ok(Side::Bottom),
            "left" => Ok(Side::Left),
            _ => Err(format!(
                "invalid side `{s}`, expected one of: top, right, bottom, left"
            )),
        }
    }
}

/// Rounds `value` to the nearest multiple of `grid`.
///
/// A non-positive grid disables snapping.
///
/// ```
/// # use flowchart_core::geometry::snap_to_grid;
/// assert_eq!(snap_to_grid(17.0, 5.0), 15.0);
/// assert_eq!(snap_to_grid(17.5, 5.0), 20.0);
/// assert_eq!(snap_to_grid(17.3, 0.0), 17.3);
/// ```
pub fn snap_to_grid(value: f32, grid: f32) -> f32 {
    if grid > 0.0 {
        (value / grid).round() * grid
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    #[test]
    fn test_point_operations() {
        let p1 = Point::new(10.0, 20.0);
        let p2 = Point::new(5.0, 8.0);

        assert_eq!(p1.add_point(p2), Point::new(15.0, 28.0));
        assert_eq!(p1.sub_point(p2), Point::new(5.0, 12.0));
        assert_eq!(p1.midpoint(p2), Point::new(7.5, 14.0));
        assert_eq!(p1.with_x(1.0), Point::new(1.0, 20.0));
        assert_eq!(p1.with_y(1.0), Point::new(10.0, 1.0));
        assert!(Point::default().is_zero());
    }

    #[test]
    fn test_point_distance() {
        let p1 = Point::new(0.0, 0.0);
        let p2 = Point::new(3.0, 4.0);
        assert_approx_eq!(f32, p1.distance(p2), 5.0);
        assert_approx_eq!(f32, p2.distance(p1), 5.0);
    }

    #[test]
    fn test_point_floor_negative() {
        assert_eq!(Point::new(-0.5, 0.5).floor(), Point::new(-1.0, 0.0));
    }

    #[test]
    fn test_bounds_accessors() {
        let bounds = Bounds::new_from_top_left(Point::new(10.0, 20.0), Size::new(30.0, 40.0));
        assert_eq!(bounds.min_x(), 10.0);
        assert_eq!(bounds.min_y(), 20.0);
        assert_eq!(bounds.max_x(), 40.0);
        assert_eq!(bounds.max_y(), 60.0);
        assert_eq!(bounds.width(), 30.0);
        assert_eq!(bounds.height(), 40.0);
        assert_eq!(bounds.center(), Point::new(25.0, 40.0));
        assert_eq!(bounds.to_size(), Size::new(30.0, 40.0));
    }

    #[test]
    fn test_bounds_intersects_inclusive_edges() {
        let a = Bounds::new_from_top_left(Point::new(0.0, 0.0), Size::new(10.0, 10.0));
        let touching = Bounds::new_from_top_left(Point::new(0.0, 10.0), Size::new(10.0, 10.0));
        let apart = Bounds::new_from_top_left(Point::new(0.0, 10.5), Size::new(10.0, 10.0));
        let inside = Bounds::new_from_top_left(Point::new(2.0, 2.0), Size::new(2.0, 2.0));

        assert!(a.intersects(&touching));
        assert!(touching.intersects(&a));
        assert!(!a.intersects(&apart));
        assert!(a.intersects(&inside));
        assert!(inside.intersects(&a));
    }

    #[test]
    fn test_bounds_side_center() {
        let bounds = Bounds::new_from_top_left(Point::new(0.0, 0.0), Size::new(100.0, 40.0));
        assert_eq!(bounds.side_center(Side::Top), Point::new(50.0, 0.0));
        assert_eq!(bounds.side_center(Side::Right), Point::new(100.0, 20.0));
        assert_eq!(bounds.side_center(Side::Bottom), Point::new(50.0, 40.0));
        assert_eq!(bounds.side_center(Side::Left), Point::new(0.0, 20.0));
    }

    #[test]
    fn test_bounds_translate() {
        let bounds = Bounds::new_from_top_left(Point::new(10.0, 20.0), Size::new(50.0, 30.0));
        let moved = bounds.translate(Point::new(100.0, 50.0));
        assert_eq!(moved.min_point(), Point::new(110.0, 70.0));
        assert_eq!(moved.to_size(), bounds.to_size());
    }

    #[test]
    fn test_size_padding_and_max() {
        let size = Size::new(10.0, 20.0).add_padding(Insets::symmetric(1.0, 5.0));
        assert_eq!(size, Size::new(20.0, 22.0));
        assert_eq!(size.max(Size::new(30.0, 1.0)), Size::new(30.0, 22.0));
        assert!(Size::default().is_zero());
    }

    #[test]
    fn test_side_from_str() {
        assert_eq!("top".parse::<Side>(), Ok(Side::Top));
        assert_eq!("left".parse::<Side>(), Ok(Side::Left));
        assert!("middle".parse::<Side>().is_err());
        assert_eq!(Side::Bottom.to_string(), "bottom");
    }

    #[test]
    fn test_side_order() {
        assert_eq!(
            Side::ALL,
            [Side::Top, Side::Right, Side::Bottom, Side::Left]
        );
        assert!(Side::Top.is_horizontal_edge());
        assert!(!Side::Left.is_horizontal_edge());
    }

    #[test]
    fn test_snap_to_grid() {
        assert_eq!(snap_to_grid(12.0, 5.0), 10.0);
        assert_eq!(snap_to_grid(13.0, 5.0), 15.0);
        assert_eq!(snap_to_grid(-7.0, 5.0), -5.0);
        assert_eq!(snap_to_grid(7.0, -1.0), 7.0);
    }
}
