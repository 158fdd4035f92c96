//! Relation line routing.
//!
//! [`route`] turns two port anchors and a [`LineShape`] into path commands,
//! draggable control points and a label anchor. Curved shapes read their
//! user adjustments from [`ShapeOffsets`], which is the only piece of layout
//! state a caller may write directly. Control points are floored so that a
//! route recomputed from the persisted offsets lands on the same pixels.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use flowchart_core::{
    draw::PathCommand,
    geometry::{Bounds, Point, Side, Size},
};

/// Geometry used to draw a relation line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LineShape {
    /// A single segment.
    #[default]
    Straight,
    /// An orthogonal elbow through one control point.
    Polyline,
    /// Two quadratic curves joined at the midpoint.
    #[serde(alias = "bezier")]
    Bessel,
    /// Same geometry as [`LineShape::Bessel`].
    BesselArc,
    /// A circular arc.
    Arc,
}

impl LineShape {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Straight => "straight",
            Self::Polyline => "polyline",
            Self::Bessel => "bessel",
            Self::BesselArc => "besselArc",
            Self::Arc => "arc",
        }
    }
}

impl fmt::Display for LineShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LineShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "straight" => Ok(Self::Straight),
            "polyline" => Ok(Self::Polyline),
            "bessel" | "bezier" => Ok(Self::Bessel),
            "besselArc" => Ok(Self::BesselArc),
            "arc" => Ok(Self::Arc),
            _ => Err(format!(
                "invalid line shape `{s}`, expected one of: straight, polyline, bessel, besselArc, arc"
            )),
        }
    }
}

/// User adjustments of curve control points.
///
/// `por*` are ratios of the half extent, `b*o*` are pixel offsets of the
/// three Bezier control points and `arr*` are fractions of the chord length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ShapeOffsets {
    pub por_x: f32,
    pub por_y: f32,
    pub bbo_x: f32,
    pub bbo_y: f32,
    pub bco_x: f32,
    pub bco_y: f32,
    pub beo_x: f32,
    pub beo_y: f32,
    pub arr_x: f32,
    pub arr_y: f32,
}

impl ShapeOffsets {
    pub fn is_zero(&self) -> bool {
        [
            self.por_x, self.por_y, self.bbo_x, self.bbo_y, self.bco_x, self.bco_y, self.beo_x,
            self.beo_y, self.arr_x, self.arr_y,
        ]
        .iter()
        .all(|v| *v == 0.0)
    }

    /// Overlays the offsets present in `patch`.
    pub fn merge(&mut self, patch: &ShapeOffsetsPatch) {
        let fields = [
            (&mut self.por_x, patch.por_x),
            (&mut self.por_y, patch.por_y),
            (&mut self.bbo_x, patch.bbo_x),
            (&mut self.bbo_y, patch.bbo_y),
            (&mut self.bco_x, patch.bco_x),
            (&mut self.bco_y, patch.bco_y),
            (&mut self.beo_x, patch.beo_x),
            (&mut self.beo_y, patch.beo_y),
            (&mut self.arr_x, patch.arr_x),
            (&mut self.arr_y, patch.arr_y),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                *field = value;
            }
        }
    }
}

/// A partial update of [`ShapeOffsets`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ShapeOffsetsPatch {
    pub por_x: Option<f32>,
    pub por_y: Option<f32>,
    pub bbo_x: Option<f32>,
    pub bbo_y: Option<f32>,
    pub bco_x: Option<f32>,
    pub bco_y: Option<f32>,
    pub beo_x: Option<f32>,
    pub beo_y: Option<f32>,
    pub arr_x: Option<f32>,
    pub arr_y: Option<f32>,
}

impl ShapeOffsetsPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One end of a relation line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteEnd {
    point: Point,
    side: Side,
}

impl RouteEnd {
    pub fn new(point: Point, side: Side) -> Self {
        Self {
            point: point.floor(),
            side,
        }
    }

    pub fn point(&self) -> Point {
        self.point
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Pushes `point` away from this end's side by the given extents.
    fn project(&self, dx: f32, dy: f32) -> Point {
        let p = self.point;
        match self.side {
            Side::Right => p.with_x(p.x() + dx),
            Side::Left => p.with_x(p.x() - dx),
            Side::Top => p.with_y(p.y() - dy),
            Side::Bottom => p.with_y(p.y() + dy),
        }
        .floor()
    }
}

/// Name of a draggable control point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlPointName {
    /// Polyline elbow.
    Por,
    /// Bezier begin control.
    B,
    /// Bezier centre.
    C,
    /// Bezier end control.
    E,
    /// Arc apex.
    Arr,
}

impl FromStr for ControlPointName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "por" => Ok(Self::Por),
            "b" => Ok(Self::B),
            "c" => Ok(Self::C),
            "e" => Ok(Self::E),
            "arr" => Ok(Self::Arr),
            _ => Err(format!("unknown control point `{s}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControlPoint {
    name: ControlPointName,
    point: Point,
    primary: bool,
}

impl ControlPoint {
    pub fn name(&self) -> ControlPointName {
        self.name
    }

    pub fn point(&self) -> Point {
        self.point
    }

    /// The point a user drags to reshape the whole curve.
    pub fn is_primary(&self) -> bool {
        self.primary
    }
}

/// Axis along which an arc apex moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArcAxis {
    X,
    Y,
}

/// Scale factors that convert a pixel drag into [`ShapeOffsets`] units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DragScale {
    #[default]
    None,
    Polyline {
        half_width: f32,
        half_height: f32,
    },
    Bezier,
    Arc {
        chord: f32,
        axis: ArcAxis,
    },
}

impl DragScale {
    /// Offsets that move control point `name` by `(dx, dy)` pixels.
    ///
    /// Returns `None` when the point does not belong to this shape or the
    /// drag cannot be expressed (a zero extent along the dragged axis).
    ///
    /// ```
    /// # use flowchart::route::{ControlPointName, DragScale, ShapeOffsets};
    /// let scale = DragScale::Polyline { half_width: 50.0, half_height: 20.0 };
    /// let patch = scale
    ///     .translate(&ShapeOffsets::default(), ControlPointName::Por, 25.0, -10.0)
    ///     .unwrap();
    /// assert_eq!(patch.por_x, Some(0.5));
    /// assert_eq!(patch.por_y, Some(-0.5));
    /// ```
    pub fn translate(
        &self,
        current: &ShapeOffsets,
        name: ControlPointName,
        dx: f32,
        dy: f32,
    ) -> Option<ShapeOffsetsPatch> {
        let ratio = |delta: f32, extent: f32| (extent > 0.0).then(|| delta / extent);
        let mut patch = ShapeOffsetsPatch::default();
        match (*self, name) {
            (
                Self::Polyline {
                    half_width,
                    half_height,
                },
                ControlPointName::Por,
            ) => {
                patch.por_x = ratio(dx, half_width).map(|r| current.por_x + r);
                patch.por_y = ratio(dy, half_height).map(|r| current.por_y + r);
            }
            (Self::Bezier, ControlPointName::B) => {
                patch.bbo_x = Some(current.bbo_x + dx);
                patch.bbo_y = Some(current.bbo_y + dy);
            }
            (Self::Bezier, ControlPointName::C) => {
                patch.bco_x = Some(current.bco_x + dx);
                patch.bco_y = Some(current.bco_y + dy);
            }
            (Self::Bezier, ControlPointName::E) => {
                patch.beo_x = Some(current.beo_x + dx);
                patch.beo_y = Some(current.beo_y + dy);
            }
            (Self::Arc { chord, axis }, ControlPointName::Arr) => match axis {
                ArcAxis::X => patch.arr_x = ratio(dx, chord).map(|r| current.arr_x + r),
                ArcAxis::Y => patch.arr_y = ratio(dy, chord).map(|r| current.arr_y + r),
            },
            _ => return None,
        }
        (!patch.is_empty()).then_some(patch)
    }
}

/// Everything a renderer needs to draw one relation line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    commands: Vec<PathCommand>,
    control_points: Vec<ControlPoint>,
    text_anchor: Point,
    #[serde(skip)]
    drag_scale: DragScale,
}

impl Route {
    /// Assembles a route; used by custom routing hooks.
    pub fn new(
        commands: Vec<PathCommand>,
        control_points: Vec<ControlPoint>,
        text_anchor: Point,
    ) -> Self {
        Self {
            commands,
            control_points,
            text_anchor,
            drag_scale: DragScale::None,
        }
    }

    pub fn commands(&self) -> &[PathCommand] {
        &self.commands
    }

    pub fn control_points(&self) -> &[ControlPoint] {
        &self.control_points
    }

    pub fn control_point(&self, name: ControlPointName) -> Option<Point> {
        self.control_points
            .iter()
            .find(|cp| cp.name == name)
            .map(ControlPoint::point)
    }

    /// Label position; follows the curve's primary control point.
    pub fn text_anchor(&self) -> Point {
        self.text_anchor
    }

    pub fn drag_scale(&self) -> DragScale {
        self.drag_scale
    }

    /// Box spanning the two endpoints.
    pub fn bounds(&self) -> Bounds {
        let points = self.commands.iter().map(PathCommand::end);
        let mut min = Point::new(f32::MAX, f32::MAX);
        let mut max = Point::new(f32::MIN, f32::MIN);
        for p in points {
            min = Point::new(min.x().min(p.x()), min.y().min(p.y()));
            max = Point::new(max.x().max(p.x()), max.y().max(p.y()));
        }
        if min.x() > max.x() {
            return Bounds::default();
        }
        let size = max.sub_point(min);
        Bounds::new_from_top_left(min, Size::new(size.x(), size.y()))
    }

    /// SVG path data for the commands.
    pub fn svg_path(&self) -> String {
        PathCommand::to_svg_data(&self.commands)
    }
}

/// Computes the line between `begin` and `end`.
///
/// `curvature` scales how far Bezier control points bulge out of their side,
/// as a fraction of the bounding extent.
pub fn route(
    begin: RouteEnd,
    end: RouteEnd,
    shape: LineShape,
    offsets: &ShapeOffsets,
    curvature: f32,
) -> Route {
    let b = begin.point;
    let e = end.point;
    let center = b.midpoint(e).floor();
    let width = (b.x() - e.x()).abs();
    let height = (b.y() - e.y()).abs();

    match shape {
        LineShape::Straight => Route {
            commands: vec![PathCommand::MoveTo { to: b }, PathCommand::LineTo { to: e }],
            control_points: Vec::new(),
            text_anchor: center,
            drag_scale: DragScale::None,
        },
        LineShape::Polyline => {
            let ctrl = Point::new(
                center.x() + offsets.por_x.clamp(-1.0, 1.0) * width / 2.0,
                center.y() + offsets.por_y.clamp(-1.0, 1.0) * height / 2.0,
            )
            .floor();
            let approach = |end: &RouteEnd| {
                let p = end.point;
                if end.side.is_horizontal_edge() {
                    p.with_y(ctrl.y())
                } else {
                    p.with_x(ctrl.x())
                }
            };
            Route {
                commands: vec![
                    PathCommand::MoveTo { to: b },
                    PathCommand::LineTo {
                        to: approach(&begin),
                    },
                    PathCommand::LineTo { to: ctrl },
                    PathCommand::LineTo { to: approach(&end) },
                    PathCommand::LineTo { to: e },
                ],
                control_points: vec![ControlPoint {
                    name: ControlPointName::Por,
                    point: ctrl,
                    primary: true,
                }],
                text_anchor: center.add_point(ctrl.sub_point(center)),
                drag_scale: DragScale::Polyline {
                    half_width: width / 2.0,
                    half_height: height / 2.0,
                },
            }
        }
        LineShape::Bessel | LineShape::BesselArc => {
            let dx = width * curvature / 2.0;
            let dy = height * curvature / 2.0;
            let cb = begin
                .project(dx, dy)
                .add_point(Point::new(offsets.bbo_x, offsets.bbo_y));
            let cc = center.add_point(Point::new(offsets.bco_x, offsets.bco_y));
            let ce = end
                .project(dx, dy)
                .add_point(Point::new(offsets.beo_x, offsets.beo_y));
            Route {
                commands: vec![
                    PathCommand::MoveTo { to: b },
                    PathCommand::QuadTo {
                        control: cb,
                        to: cc,
                    },
                    PathCommand::QuadTo {
                        control: ce,
                        to: e,
                    },
                ],
                control_points: vec![
                    ControlPoint {
                        name: ControlPointName::B,
                        point: cb,
                        primary: false,
                    },
                    ControlPoint {
                        name: ControlPointName::C,
                        point: cc,
                        primary: true,
                    },
                    ControlPoint {
                        name: ControlPointName::E,
                        point: ce,
                        primary: false,
                    },
                ],
                text_anchor: center.add_point(cc.sub_point(center)),
                drag_scale: DragScale::Bezier,
            }
        }
        LineShape::Arc => arc_route(b, e, center, width, height, offsets),
    }
}

fn arc_route(
    b: Point,
    e: Point,
    center: Point,
    width: f32,
    height: f32,
    offsets: &ShapeOffsets,
) -> Route {
    let chord = b.distance(e);
    let axis = if width > height { ArcAxis::Y } else { ArcAxis::X };
    let mid = b.midpoint(e);
    let mut radius = (chord / 2.0).floor();
    let mut ctrl = center;

    if offsets.arr_x != 0.0 || offsets.arr_y != 0.0 {
        // The apex slides along the perpendicular bisector of the chord.
        match axis {
            ArcAxis::X => {
                let x = center.x() + offsets.arr_x * chord;
                let dy = e.y() - b.y();
                let y = if dy == 0.0 {
                    center.y()
                } else {
                    mid.y() + (b.x() - e.x()) / dy * (x - mid.x())
                };
                ctrl = Point::new(x, y);
            }
            ArcAxis::Y => {
                let y = center.y() + offsets.arr_y * chord;
                let dx = b.x() - e.x();
                let x = if dx == 0.0 {
                    center.x()
                } else {
                    mid.x() + (y - mid.y()) * (e.y() - b.y()) / dx
                };
                ctrl = Point::new(x, y);
            }
        }
        radius = ctrl.distance(b);
    }

    let signed = match axis {
        ArcAxis::X => offsets.arr_x,
        ArcAxis::Y => -offsets.arr_y,
    };

    Route {
        commands: vec![
            PathCommand::MoveTo { to: b },
            PathCommand::ArcTo {
                radius,
                large_arc: true,
                sweep: signed >= 0.0,
                to: e,
            },
        ],
        control_points: vec![ControlPoint {
            name: ControlPointName::Arr,
            point: ctrl,
            primary: true,
        }],
        text_anchor: center.add_point(ctrl.sub_point(center)),
        drag_scale: DragScale::Arc { chord, axis },
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    fn ends() -> (RouteEnd, RouteEnd) {
        (
            RouteEnd::new(Point::new(0.0, 0.0), Side::Bottom),
            RouteEnd::new(Point::new(100.0, 40.0), Side::Top),
        )
    }

    #[test]
    fn test_line_shape_names() {
        assert_eq!("bezier".parse::<LineShape>(), Ok(LineShape::Bessel));
        assert_eq!("besselArc".parse::<LineShape>(), Ok(LineShape::BesselArc));
        assert!("curve".parse::<LineShape>().is_err());
        assert_eq!(LineShape::BesselArc.to_string(), "besselArc");
        let shape: LineShape = serde_json::from_str("\"bezier\"").unwrap();
        assert_eq!(shape, LineShape::Bessel);
    }

    #[test]
    fn test_straight_route() {
        let (b, e) = ends();
        let route = route(b, e, LineShape::Straight, &ShapeOffsets::default(), 0.8);
        assert_eq!(route.commands().len(), 2);
        assert!(route.control_points().is_empty());
        assert_eq!(route.text_anchor(), Point::new(50.0, 20.0));
        assert_eq!(route.drag_scale(), DragScale::None);
    }

    #[test]
    fn test_polyline_default_elbow_at_center() {
        let (b, e) = ends();
        let route = route(b, e, LineShape::Polyline, &ShapeOffsets::default(), 0.8);
        assert_eq!(route.control_point(ControlPointName::Por), Some(Point::new(50.0, 20.0)));
        assert_eq!(
            route.commands()[1],
            PathCommand::LineTo {
                to: Point::new(0.0, 20.0)
            }
        );
        assert_eq!(
            route.commands()[3],
            PathCommand::LineTo {
                to: Point::new(100.0, 20.0)
            }
        );
    }

    #[test]
    fn test_polyline_offsets_are_clamped() {
        let (b, e) = ends();
        let offsets = ShapeOffsets {
            por_x: 3.0,
            por_y: -0.5,
            ..ShapeOffsets::default()
        };
        let route = route(b, e, LineShape::Polyline, &offsets, 0.8);
        assert_eq!(route.control_point(ControlPointName::Por), Some(Point::new(100.0, 10.0)));
        assert_eq!(route.text_anchor(), Point::new(100.0, 10.0));
    }

    #[test]
    fn test_bezier_control_points() {
        let (b, e) = ends();
        let route = route(b, e, LineShape::Bessel, &ShapeOffsets::default(), 0.8);
        assert_eq!(route.control_point(ControlPointName::B), Some(Point::new(0.0, 16.0)));
        assert_eq!(route.control_point(ControlPointName::C), Some(Point::new(50.0, 20.0)));
        assert_eq!(route.control_point(ControlPointName::E), Some(Point::new(100.0, 24.0)));
    }

    #[test]
    fn test_bessel_arc_matches_bessel() {
        let (b, e) = ends();
        let offsets = ShapeOffsets {
            bco_x: 7.0,
            beo_y: -3.0,
            ..ShapeOffsets::default()
        };
        let a = route(b, e, LineShape::Bessel, &offsets, 0.8);
        let c = route(b, e, LineShape::BesselArc, &offsets, 0.8);
        assert_eq!(a, c);
        assert_eq!(a.text_anchor(), Point::new(57.0, 20.0));
    }

    #[test]
    fn test_arc_default_radius() {
        let b = RouteEnd::new(Point::new(0.0, 0.0), Side::Right);
        let e = RouteEnd::new(Point::new(100.0, 0.0), Side::Left);
        let route = route(b, e, LineShape::Arc, &ShapeOffsets::default(), 0.8);
        match route.commands()[1] {
            PathCommand::ArcTo {
                radius,
                large_arc,
                sweep,
                ..
            } => {
                assert_approx_eq!(f32, radius, 50.0);
                assert!(large_arc);
                assert!(sweep);
            }
            other => panic!("expected arc, got {other:?}"),
        }
        assert_eq!(
            route.drag_scale(),
            DragScale::Arc {
                chord: 100.0,
                axis: ArcAxis::Y
            }
        );
    }

    #[test]
    fn test_arc_offset_moves_apex_and_flips_sweep() {
        let b = RouteEnd::new(Point::new(0.0, 0.0), Side::Right);
        let e = RouteEnd::new(Point::new(100.0, 0.0), Side::Left);
        let offsets = ShapeOffsets {
            arr_y: 0.25,
            ..ShapeOffsets::default()
        };
        let route = route(b, e, LineShape::Arc, &offsets, 0.8);
        let apex = route.control_point(ControlPointName::Arr).unwrap();
        assert_eq!(apex, Point::new(50.0, 25.0));
        match route.commands()[1] {
            PathCommand::ArcTo { radius, sweep, .. } => {
                assert_approx_eq!(f32, radius, apex.distance(Point::new(0.0, 0.0)));
                assert!(!sweep);
            }
            other => panic!("expected arc, got {other:?}"),
        }
    }

    #[test]
    fn test_arc_vertical_chord() {
        let b = RouteEnd::new(Point::new(0.0, 0.0), Side::Bottom);
        let e = RouteEnd::new(Point::new(0.0, 80.0), Side::Top);
        let offsets = ShapeOffsets {
            arr_x: 0.5,
            ..ShapeOffsets::default()
        };
        let route = route(b, e, LineShape::Arc, &offsets, 0.8);
        assert_eq!(route.control_point(ControlPointName::Arr), Some(Point::new(40.0, 40.0)));
    }

    #[test]
    fn test_drag_translate_arc_and_bezier() {
        let scale = DragScale::Arc {
            chord: 200.0,
            axis: ArcAxis::X,
        };
        let patch = scale
            .translate(&ShapeOffsets::default(), ControlPointName::Arr, 50.0, 10.0)
            .unwrap();
        assert_eq!(patch.arr_x, Some(0.25));
        assert_eq!(patch.arr_y, None);

        let current = ShapeOffsets {
            bco_x: 2.0,
            ..ShapeOffsets::default()
        };
        let patch = DragScale::Bezier
            .translate(&current, ControlPointName::C, 3.0, 4.0)
            .unwrap();
        assert_eq!(patch.bco_x, Some(5.0));
        assert_eq!(patch.bco_y, Some(4.0));

        assert!(
            DragScale::Bezier
                .translate(&current, ControlPointName::Arr, 1.0, 1.0)
                .is_none()
        );
    }

    #[test]
    fn test_offsets_merge_and_is_zero() {
        let mut offsets = ShapeOffsets::default();
        assert!(offsets.is_zero());
        let patch: ShapeOffsetsPatch =
            serde_json::from_value(serde_json::json!({"porX": 0.5, "arrY": 0})).unwrap();
        offsets.merge(&patch);
        assert_eq!(offsets.por_x, 0.5);
        assert_eq!(offsets.arr_y, 0.0);
        assert!(!offsets.is_zero());
    }
}

#[cfg(test)]
mod proptest_tests {
    use proptest::prelude::*;

    use super::*;

    // ===================
    // Strategies
    // ===================

    fn side_strategy() -> impl Strategy<Value = Side> {
        prop_oneof![
            Just(Side::Top),
            Just(Side::Right),
            Just(Side::Bottom),
            Just(Side::Left),
        ]
    }

    fn end_strategy() -> impl Strategy<Value = RouteEnd> {
        (-500.0f32..500.0, -500.0f32..500.0, side_strategy())
            .prop_map(|(x, y, side)| RouteEnd::new(Point::new(x, y), side))
    }

    fn curved_shape_strategy() -> impl Strategy<Value = LineShape> {
        prop_oneof![
            Just(LineShape::Polyline),
            Just(LineShape::Bessel),
            Just(LineShape::BesselArc),
            Just(LineShape::Arc),
        ]
    }

    fn offsets_strategy() -> impl Strategy<Value = ShapeOffsets> {
        (
            -1.0f32..1.0,
            -1.0f32..1.0,
            -50.0f32..50.0,
            -50.0f32..50.0,
            -0.5f32..0.5,
            -0.5f32..0.5,
        )
            .prop_map(|(por_x, por_y, bco_x, bco_y, arr_x, arr_y)| ShapeOffsets {
                por_x,
                por_y,
                bco_x: bco_x.floor(),
                bco_y: bco_y.floor(),
                arr_x,
                arr_y,
                ..ShapeOffsets::default()
            })
    }

    // ===================
    // Property Test Functions
    // ===================

    /// Routing again with the same persisted offsets gives identical geometry.
    fn check_route_round_trip(
        begin: RouteEnd,
        end: RouteEnd,
        shape: LineShape,
        offsets: ShapeOffsets,
    ) -> Result<(), TestCaseError> {
        let first = route(begin, end, shape, &offsets, 0.8);
        let json = serde_json::to_string(&offsets).unwrap();
        let restored: ShapeOffsets = serde_json::from_str(&json).unwrap();
        let second = route(begin, end, shape, &restored, 0.8);
        prop_assert_eq!(first.control_points(), second.control_points());
        prop_assert_eq!(first.commands(), second.commands());
        Ok(())
    }

    /// Every route starts at the begin point and finishes at the end point.
    fn check_route_endpoints(
        begin: RouteEnd,
        end: RouteEnd,
        shape: LineShape,
        offsets: ShapeOffsets,
    ) -> Result<(), TestCaseError> {
        let route = route(begin, end, shape, &offsets, 0.8);
        prop_assert_eq!(route.commands().first().map(PathCommand::end), Some(begin.point()));
        prop_assert_eq!(route.commands().last().map(PathCommand::end), Some(end.point()));
        Ok(())
    }

    // ===================
    // Proptest Wrappers
    // ===================

    proptest! {
        #[test]
        fn route_round_trip(
            begin in end_strategy(),
            end in end_strategy(),
            shape in curved_shape_strategy(),
            offsets in offsets_strategy(),
        ) {
            check_route_round_trip(begin, end, shape, offsets)?;
        }

        #[test]
        fn route_endpoints(
            begin in end_strategy(),
            end in end_strategy(),
            shape in curved_shape_strategy(),
            offsets in offsets_strategy(),
        ) {
            check_route_endpoints(begin, end, shape, offsets)?;
        }
    }
}
