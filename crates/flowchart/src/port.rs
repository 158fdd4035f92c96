//! Port definitions and the per-type port map.
//!
//! A node type declares its ports per side. Each side entry is either a
//! count (`top = 3` creates `top1`, `top2`, `top3`), a single spec or a list
//! of specs. A spec is a number (an anonymous spacer of that width), a name,
//! or a full [`PortDefinition`].
//!
//! Repeatable ports have a `*` in their name and a `rest` capacity. They are
//! templates: a node materializes numbered instances of them on demand (see
//! [`reconcile_rest_claims`]).
//!
//! # Geometry
//!
//! Every port takes `floor((space_begin + space + space_end) * space_size)`
//! pixels along its side. The ports of a side are laid out in order and the
//! whole run is centred on the side midpoint. A port's anchor is the centre of
//! its `space` slot, on the node edge, pushed outward by the port line length.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use flowchart_core::{
    geometry::{Bounds, Point, Side, Size},
    identifier::Id,
};

use crate::{error::FlowchartError, reference::RestPattern};

// =============================================================================
// Port
// =============================================================================

/// Which way relations may flow through a port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PortDirection {
    In,
    Out,
    #[default]
    InOut,
}

/// Capacity of a repeatable port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestCapacity {
    Unlimited,
    Limited(u32),
}

impl RestCapacity {
    /// Number of instances that may exist; indices are `0..limit`.
    pub fn limit(self) -> u32 {
        match self {
            Self::Unlimited => u32::MAX,
            Self::Limited(n) => n,
        }
    }
}

/// An immutable port on one side of a node type.
#[derive(Debug, Clone, PartialEq)]
pub struct Port {
    name: Option<String>,
    side: Side,
    index: usize,
    direction: PortDirection,
    space: f32,
    space_begin: f32,
    space_end: f32,
    max_link_count: u32,
    free: bool,
    rest: Option<RestCapacity>,
    rest_min_index: u32,
    rest_initial_count: u32,
    rest_index: Option<u32>,
    placeholder: bool,
}

impl Port {
    fn from_definition(
        definition: PortDefinition,
        side: Side,
        index: usize,
    ) -> Result<Self, FlowchartError> {
        let rest = match definition.rest {
            None | Some(RestSpec::Flag(false)) => None,
            Some(RestSpec::Flag(true)) => Some(RestCapacity::Unlimited),
            Some(RestSpec::Cap(n)) => Some(RestCapacity::Limited(n)),
        };
        let name = definition.name.filter(|n| !n.is_empty());
        if rest.is_some() && name.as_deref().and_then(RestPattern::new).is_none() {
            return Err(FlowchartError::invalid_value(
                "ports",
                format!(
                    "repeatable port `{}` needs a `*` in its name",
                    name.unwrap_or_default()
                ),
            ));
        }
        let max_link_count = if rest.is_some() {
            1
        } else {
            definition.max_link_count.unwrap_or(1).max(1)
        };
        Ok(Self {
            side,
            index,
            direction: definition.direction.unwrap_or_default(),
            space: definition.space.unwrap_or(1.0),
            space_begin: definition.space_begin.unwrap_or(0.0),
            space_end: definition.space_end.unwrap_or(0.0),
            max_link_count,
            free: rest.is_none() && definition.free != Some(false),
            rest_min_index: definition.rest_min_index.unwrap_or(1),
            rest_initial_count: definition.rest_initial_count.unwrap_or(1),
            rest,
            name,
            rest_index: None,
            placeholder: false,
        })
    }

    /// Materializes instance `index` (0-based) of a repeatable port.
    ///
    /// Instances are ordinary single-link ports named after the template.
    pub fn rest_instance(&self, index: u32, placeholder: bool) -> Option<Port> {
        let pattern = self.rest_pattern()?;
        let number = index.checked_add(self.rest_min_index)?;
        Some(Port {
            name: Some(pattern.name_for(number)),
            rest: None,
            max_link_count: 1,
            rest_index: Some(index),
            placeholder,
            ..self.clone()
        })
    }

    /// Name, or `None` for anonymous spacer ports.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Position within its side.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    pub fn space(&self) -> f32 {
        self.space
    }

    pub fn max_link_count(&self) -> u32 {
        self.max_link_count
    }

    /// Whether nearest-port resolution may pick this port.
    pub fn is_free(&self) -> bool {
        self.free
    }

    /// Spacer ports have no name and cannot be linked.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
    }

    pub fn rest(&self) -> Option<RestCapacity> {
        self.rest
    }

    pub fn is_rest(&self) -> bool {
        self.rest.is_some()
    }

    pub fn rest_min_index(&self) -> u32 {
        self.rest_min_index
    }

    pub fn rest_initial_count(&self) -> u32 {
        self.rest_initial_count
    }

    /// Instance index for materialized repeatable ports.
    pub fn rest_index(&self) -> Option<u32> {
        self.rest_index
    }

    /// True for the trailing "next slot" instance of a repeatable port.
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// Name pattern of a repeatable port template.
    pub fn rest_pattern(&self) -> Option<RestPattern> {
        if self.rest.is_some() {
            self.name.as_deref().and_then(RestPattern::new)
        } else {
            None
        }
    }

    /// Number of instance indices that may exist. Bounded by the capacity
    /// and by the largest number an instance name can carry.
    pub fn rest_index_limit(&self) -> u32 {
        let nameable = (u32::MAX - self.rest_min_index).saturating_add(1);
        self.rest.map_or(0, |cap| cap.limit().min(nameable))
    }

    /// 0-based instance index that `name` refers to, if it matches this template.
    pub fn rest_index_of(&self, name: &str) -> Option<u32> {
        let number = self.rest_pattern()?.number_of(name)?;
        Some(number.saturating_sub(self.rest_min_index))
    }

    /// Pixels this port occupies along its side.
    pub fn slot_size(&self, space_size: f32) -> f32 {
        (self.space_begin * space_size).floor()
            + (self.space * space_size).floor()
            + (self.space_end * space_size).floor()
    }

    /// Builds the exported form, without geometry-only fields.
    pub fn export(&self) -> PortExport {
        PortExport {
            name: self.name.clone(),
            direction: self.direction,
            space: (self.space != 1.0).then_some(self.space),
            max_link_count: self.max_link_count,
            free: (!self.free).then_some(false),
            rest: self.rest.map(|cap| match cap {
                RestCapacity::Unlimited => RestSpec::Flag(true),
                RestCapacity::Limited(n) => RestSpec::Cap(n),
            }),
            rest_min_index: self.rest.map(|_| self.rest_min_index),
            rest_initial_count: self.rest.map(|_| self.rest_initial_count),
        }
    }
}

/// Exported port description.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortExport {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    direction: PortDirection,
    #[serde(skip_serializing_if = "Option::is_none")]
    space: Option<f32>,
    max_link_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    free: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rest: Option<RestSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rest_min_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rest_initial_count: Option<u32>,
}

impl PortExport {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

// =============================================================================
// Port templates
// =============================================================================

/// `rest` value of a port spec: `true` for unlimited or a numeric cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RestSpec {
    Flag(bool),
    Cap(u32),
}

/// Full port specification.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PortDefinition {
    name: Option<String>,
    direction: Option<PortDirection>,
    space: Option<f32>,
    #[serde(alias = "space_begin")]
    space_begin: Option<f32>,
    #[serde(alias = "space_end")]
    space_end: Option<f32>,
    #[serde(alias = "max_link_count")]
    max_link_count: Option<u32>,
    free: Option<bool>,
    rest: Option<RestSpec>,
    #[serde(alias = "rest_min_index")]
    rest_min_index: Option<u32>,
    #[serde(alias = "rest_initial_count")]
    rest_initial_count: Option<u32>,
}

impl PortDefinition {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// A repeatable port template with the given capacity.
    pub fn repeatable(name: impl Into<String>, capacity: Option<u32>) -> Self {
        Self {
            name: Some(name.into()),
            rest: Some(capacity.map_or(RestSpec::Flag(true), RestSpec::Cap)),
            ..Self::default()
        }
    }

    pub fn with_direction(mut self, direction: PortDirection) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn with_space(mut self, space: f32) -> Self {
        self.space = Some(space);
        self
    }

    pub fn with_free(mut self, free: bool) -> Self {
        self.free = Some(free);
        self
    }

    pub fn with_max_link_count(mut self, count: u32) -> Self {
        self.max_link_count = Some(count);
        self
    }

    pub fn with_rest_min_index(mut self, index: u32) -> Self {
        self.rest_min_index = Some(index);
        self
    }

    pub fn with_rest_initial_count(mut self, count: u32) -> Self {
        self.rest_initial_count = Some(count);
        self
    }
}

/// One port entry in a side list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PortSpec {
    /// Anonymous spacer of the given relative width.
    Space(f32),
    Name(String),
    Full(PortDefinition),
}

impl PortSpec {
    fn into_definition(self) -> PortDefinition {
        match self {
            Self::Space(space) => PortDefinition {
                space: Some(space),
                ..PortDefinition::default()
            },
            Self::Name(name) => PortDefinition::named(name),
            Self::Full(definition) => definition,
        }
    }
}

/// Ports of one side.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SidePorts {
    /// `n` numbered ports named after the side.
    Count(u32),
    List(Vec<PortSpec>),
    One(PortSpec),
}

impl SidePorts {
    fn into_definitions(self, side: Side) -> Vec<PortDefinition> {
        match self {
            Self::Count(n) => (1..=n)
                .map(|i| PortDefinition::named(format!("{side}{i}")))
                .collect(),
            Self::List(specs) => specs.into_iter().map(PortSpec::into_definition).collect(),
            Self::One(spec) => vec![spec.into_definition()],
        }
    }
}

/// Port declarations of a node type, by side.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PortTemplate {
    top: Option<SidePorts>,
    right: Option<SidePorts>,
    bottom: Option<SidePorts>,
    left: Option<SidePorts>,
}

impl PortTemplate {
    /// Same number of numbered ports on every side.
    pub fn uniform(count: u32) -> Self {
        Self::default()
            .with_side(Side::Top, SidePorts::Count(count))
            .with_side(Side::Right, SidePorts::Count(count))
            .with_side(Side::Bottom, SidePorts::Count(count))
            .with_side(Side::Left, SidePorts::Count(count))
    }

    pub fn with_side(mut self, side: Side, ports: SidePorts) -> Self {
        *self.side_mut(side) = Some(ports);
        self
    }

    fn side_mut(&mut self, side: Side) -> &mut Option<SidePorts> {
        match side {
            Side::Top => &mut self.top,
            Side::Right => &mut self.right,
            Side::Bottom => &mut self.bottom,
            Side::Left => &mut self.left,
        }
    }

    fn take_side(&mut self, side: Side) -> Option<SidePorts> {
        self.side_mut(side).take()
    }
}

// =============================================================================
// Ports map
// =============================================================================

/// Result of looking a port up by its raw name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PortMatch<'a> {
    Exact(&'a Port),
    /// Instance `index` of a repeatable template.
    Rest { template: &'a Port, index: u32 },
}

/// All ports of a node type.
#[derive(Debug, Clone, PartialEq)]
pub struct PortsMap {
    ports: Vec<Port>,
    by_name: IndexMap<String, usize>,
}

impl PortsMap {
    /// Builds the ports map for a template; `None` when it declares no ports.
    ///
    /// # Errors
    ///
    /// Returns [`FlowchartError::InvalidValue`] for duplicate port names and
    /// for repeatable ports without a `*` in their name.
    pub fn create(template: &PortTemplate) -> Result<Option<Self>, FlowchartError> {
        let mut template = template.clone();
        let mut ports = Vec::new();
        let mut by_name = IndexMap::new();
        for side in Side::ALL {
            let Some(side_ports) = template.take_side(side) else {
                continue;
            };
            for (index, definition) in side_ports.into_definitions(side).into_iter().enumerate() {
                let port = Port::from_definition(definition, side, index)?;
                if let Some(name) = port.name() {
                    if by_name.insert(name.to_string(), ports.len()).is_some() {
                        return Err(FlowchartError::invalid_value(
                            "ports",
                            format!("duplicate port name `{name}`"),
                        ));
                    }
                }
                ports.push(port);
            }
        }
        if ports.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self { ports, by_name }))
    }

    /// All ports, side by side in top, right, bottom, left order.
    pub fn iter(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter()
    }

    pub fn side(&self, side: Side) -> impl Iterator<Item = &Port> {
        self.ports.iter().filter(move |p| p.side == side)
    }

    pub fn get(&self, name: &str) -> Option<&Port> {
        self.by_name.get(name).map(|&i| &self.ports[i])
    }

    /// Ports eligible for nearest-port resolution.
    pub fn free_ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter().filter(|p| p.is_free() && !p.is_empty())
    }

    /// Repeatable templates.
    pub fn rest_ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter().filter(|p| p.is_rest())
    }

    /// Resolves a raw port name: an exact name wins, then the first
    /// repeatable template whose pattern matches.
    pub fn find(&self, name: &str) -> Option<PortMatch<'_>> {
        if let Some(port) = self.get(name) {
            if !port.is_rest() {
                return Some(PortMatch::Exact(port));
            }
        }
        self.rest_ports().find_map(|template| {
            template
                .rest_index_of(name)
                .map(|index| PortMatch::Rest { template, index })
        })
    }
}

// =============================================================================
// Repeatable port reconciliation
// =============================================================================

/// Where the trailing placeholder of a repeatable port goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestPlaceholder {
    /// Lowest index not yet realized.
    FirstGap,
    /// One past the highest realized index.
    #[default]
    Append,
}

/// Order in which relations claim repeatable port indices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestCollision {
    /// Relation order; a later duplicate moves to the next free index.
    #[default]
    FirstSeen,
    /// Lower requested index first; ties keep relation order.
    Numeric,
}

/// A relation endpoint asking for an instance of a repeatable port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestClaim {
    relation: Id,
    requested: u32,
}

impl RestClaim {
    pub fn new(relation: Id, requested: u32) -> Self {
        Self {
            relation,
            requested,
        }
    }
}

/// Realized instances of one repeatable port on one node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestSlots {
    realized: Vec<u32>,
    placeholder: Option<u32>,
    assignments: Vec<(Id, Option<u32>)>,
}

impl RestSlots {
    /// Realized instance indices, ascending.
    pub fn realized(&self) -> &[u32] {
        &self.realized
    }

    /// Index of the next slot to materialize, if capacity remains.
    pub fn placeholder(&self) -> Option<u32> {
        self.placeholder
    }

    /// Final index per claiming relation; `None` when capacity ran out.
    pub fn assignment(&self, relation: Id) -> Option<Option<u32>> {
        self.assignments
            .iter()
            .find(|(id, _)| *id == relation)
            .map(|(_, index)| *index)
    }

    /// The instances to draw: realized ports followed by the placeholder.
    pub fn instances(&self, template: &Port) -> Vec<Port> {
        self.realized
            .iter()
            .filter_map(|&i| template.rest_instance(i, false))
            .chain(
                self.placeholder
                    .and_then(|i| template.rest_instance(i, true)),
            )
            .collect()
    }
}

/// Assigns concrete instance indices to the relations claiming a repeatable port.
///
/// Indices referenced by relations are reserved; a claim on an index that is
/// already taken advances to the next free one. The first
/// `rest_initial_count` indices are always realized. Claims beyond the
/// capacity stay unassigned.
pub fn reconcile_rest_claims(
    template: &Port,
    claims: &[RestClaim],
    placeholder: RestPlaceholder,
    collision: RestCollision,
) -> RestSlots {
    let limit = template.rest_index_limit();

    let mut ordered: Vec<&RestClaim> = claims.iter().collect();
    if collision == RestCollision::Numeric {
        ordered.sort_by_key(|claim| claim.requested);
    }

    let mut taken = BTreeSet::new();
    let mut assignments = Vec::with_capacity(claims.len());
    for claim in ordered {
        let mut index = Some(claim.requested);
        while let Some(current) = index.filter(|i| taken.contains(i)) {
            index = current.checked_add(1);
        }
        match index.filter(|&i| i < limit) {
            Some(index) => {
                taken.insert(index);
                assignments.push((claim.relation, Some(index)));
            }
            None => assignments.push((claim.relation, None)),
        }
    }

    let mut realized: BTreeSet<u32> = (0..template.rest_initial_count().min(limit)).collect();
    realized.extend(taken.iter().copied());

    let next = match placeholder {
        RestPlaceholder::FirstGap => (0..).find(|i| !realized.contains(i)),
        RestPlaceholder::Append => realized.last().map_or(Some(0), |max| max.checked_add(1)),
    };

    RestSlots {
        realized: realized.into_iter().collect(),
        placeholder: next.filter(|&i| i < limit),
        assignments,
    }
}

// =============================================================================
// Anchors
// =============================================================================

/// Resolved attachment point of a port on a positioned node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortAnchor {
    name: String,
    side: Side,
    point: Point,
    free: bool,
    placeholder: bool,
}

impl PortAnchor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn point(&self) -> Point {
        self.point
    }

    pub fn is_free(&self) -> bool {
        self.free
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }
}

/// Total pixels the given ports take on each side, in [`Side::ALL`] order.
fn side_totals(ports: &[Port], space_size: f32) -> [f32; 4] {
    let mut totals = [0.0; 4];
    for port in ports {
        totals[port.side as usize] += port.slot_size(space_size);
    }
    totals
}

/// Minimum node size needed to fit the ports.
pub fn ports_min_size(ports: &[Port], space_size: f32) -> Size {
    let [top, right, bottom, left] = side_totals(ports, space_size);
    Size::new(top.max(bottom), left.max(right))
}

/// Computes the anchor of every named port for a node at `bounds`.
///
/// `ports` must already have repeatable templates replaced by their
/// instances and be in side order.
pub fn layout_anchors(
    ports: &[Port],
    bounds: Bounds,
    space_size: f32,
    line_length: f32,
) -> Vec<PortAnchor> {
    let totals = side_totals(ports, space_size);
    let mut offsets = [0.0f32; 4];
    let mut anchors = Vec::new();

    for port in ports {
        let side_index = port.side as usize;
        let begin = (port.space_begin * space_size).floor();
        let space = (port.space * space_size).floor();
        let along = offsets[side_index] + begin + space / 2.0 - (totals[side_index] / 2.0).floor();
        offsets[side_index] += port.slot_size(space_size);

        let Some(name) = port.name() else {
            continue;
        };
        let mid = bounds.side_center(port.side);
        let point = match port.side {
            Side::Top => Point::new(mid.x() + along, mid.y() - line_length),
            Side::Bottom => Point::new(mid.x() + along, mid.y() + line_length),
            Side::Left => Point::new(mid.x() - line_length, mid.y() + along),
            Side::Right => Point::new(mid.x() + line_length, mid.y() + along),
        };
        anchors.push(PortAnchor {
            name: name.to_string(),
            side: port.side,
            point,
            free: port.is_free(),
            placeholder: port.is_placeholder(),
        });
    }
    anchors
}

/// Anchors at the middle of each side, for nodes whose type declares no
/// ports. They are free and named after their side.
pub fn side_anchors(bounds: Bounds, line_length: f32) -> Vec<PortAnchor> {
    Side::ALL
        .into_iter()
        .map(|side| {
            let mid = bounds.side_center(side);
            let point = match side {
                Side::Top => mid.with_y(mid.y() - line_length),
                Side::Bottom => mid.with_y(mid.y() + line_length),
                Side::Left => mid.with_x(mid.x() - line_length),
                Side::Right => mid.with_x(mid.x() + line_length),
            };
            PortAnchor {
                name: side.to_string(),
                side,
                point,
                free: true,
                placeholder: false,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    fn rect_template() -> PortTemplate {
        PortTemplate::default()
            .with_side(Side::Top, SidePorts::Count(3))
            .with_side(Side::Bottom, SidePorts::Count(3))
            .with_side(Side::Left, SidePorts::Count(1))
            .with_side(Side::Right, SidePorts::Count(1))
    }

    fn repeatable(cap: Option<u32>) -> Port {
        let template = PortTemplate::default().with_side(
            Side::Right,
            SidePorts::One(PortSpec::Full(PortDefinition::repeatable("case*", cap))),
        );
        PortsMap::create(&template)
            .unwrap()
            .unwrap()
            .get("case*")
            .unwrap()
            .clone()
    }

    #[test]
    fn test_create_numbered_ports() {
        let map = PortsMap::create(&rect_template()).unwrap().unwrap();
        let names: Vec<_> = map.iter().filter_map(Port::name).collect();
        assert_eq!(
            names,
            ["top1", "top2", "top3", "right1", "bottom1", "bottom2", "bottom3", "left1"]
        );
        assert_eq!(map.get("top2").unwrap().index(), 1);
        assert_eq!(map.get("left1").unwrap().side(), Side::Left);
        assert_eq!(map.free_ports().count(), 8);
    }

    #[test]
    fn test_create_empty_template_is_none() {
        assert!(PortsMap::create(&PortTemplate::default()).unwrap().is_none());
    }

    #[test]
    fn test_port_defaults() {
        let map = PortsMap::create(&PortTemplate::uniform(1)).unwrap().unwrap();
        let port = map.get("top1").unwrap();
        assert_eq!(port.direction(), PortDirection::InOut);
        assert_eq!(port.space(), 1.0);
        assert_eq!(port.max_link_count(), 1);
        assert!(port.is_free());
        assert!(!port.is_rest());
    }

    #[test]
    fn test_spacer_and_named_specs() {
        let template: PortTemplate = serde_json::from_value(serde_json::json!({
            "left": [0.5, "in", {"name": "out", "direction": "out", "free": false, "maxLinkCount": 0}]
        }))
        .unwrap();
        let map = PortsMap::create(&template).unwrap().unwrap();
        let ports: Vec<_> = map.side(Side::Left).collect();
        assert_eq!(ports.len(), 3);
        assert!(ports[0].is_empty());
        assert_eq!(ports[1].name(), Some("in"));
        assert_eq!(ports[2].direction(), PortDirection::Out);
        assert!(!ports[2].is_free());
        assert_eq!(ports[2].max_link_count(), 1);
        assert_eq!(map.free_ports().count(), 1);
    }

    #[test]
    fn test_duplicate_port_name_rejected() {
        let template = PortTemplate::default()
            .with_side(Side::Top, SidePorts::One(PortSpec::Name("a".into())))
            .with_side(Side::Left, SidePorts::One(PortSpec::Name("a".into())));
        assert!(PortsMap::create(&template).is_err());
    }

    #[test]
    fn test_repeatable_port_requires_star() {
        let template = PortTemplate::default().with_side(
            Side::Top,
            SidePorts::One(PortSpec::Full(PortDefinition::repeatable("case", None))),
        );
        assert!(PortsMap::create(&template).is_err());
    }

    #[test]
    fn test_find_exact_before_rest() {
        let template = PortTemplate::default().with_side(
            Side::Right,
            SidePorts::List(vec![
                PortSpec::Name("case1".into()),
                PortSpec::Full(PortDefinition::repeatable("case*", None)),
            ]),
        );
        let map = PortsMap::create(&template).unwrap().unwrap();
        assert!(matches!(map.find("case1"), Some(PortMatch::Exact(_))));
        assert!(matches!(
            map.find("case4"),
            Some(PortMatch::Rest { index: 3, .. })
        ));
        assert!(map.find("other").is_none());
    }

    #[test]
    fn test_rest_instance() {
        let template = repeatable(Some(4));
        assert!(!template.is_free());
        let instance = template.rest_instance(2, false).unwrap();
        assert_eq!(instance.name(), Some("case3"));
        assert_eq!(instance.rest_index(), Some(2));
        assert!(!instance.is_rest());
        assert_eq!(instance.max_link_count(), 1);
    }

    #[test]
    fn test_reconcile_skipped_index_append() {
        let template = repeatable(Some(5));
        let claims = [
            RestClaim::new(Id::new("r0"), 0),
            RestClaim::new(Id::new("r2"), 2),
        ];
        let slots = reconcile_rest_claims(
            &template,
            &claims,
            RestPlaceholder::Append,
            RestCollision::FirstSeen,
        );
        assert_eq!(slots.realized(), &[0, 2]);
        assert_eq!(slots.placeholder(), Some(3));
    }

    #[test]
    fn test_reconcile_skipped_index_first_gap() {
        let template = repeatable(Some(5));
        let claims = [
            RestClaim::new(Id::new("r0"), 0),
            RestClaim::new(Id::new("r2"), 2),
        ];
        let slots = reconcile_rest_claims(
            &template,
            &claims,
            RestPlaceholder::FirstGap,
            RestCollision::FirstSeen,
        );
        assert_eq!(slots.realized(), &[0, 2]);
        assert_eq!(slots.placeholder(), Some(1));
    }

    #[test]
    fn test_reconcile_duplicate_first_seen() {
        let template = repeatable(None);
        let claims = [
            RestClaim::new(Id::new("late"), 1),
            RestClaim::new(Id::new("early"), 1),
            RestClaim::new(Id::new("zero"), 0),
        ];
        let slots = reconcile_rest_claims(
            &template,
            &claims,
            RestPlaceholder::Append,
            RestCollision::FirstSeen,
        );
        assert_eq!(slots.assignment(Id::new("late")), Some(Some(1)));
        assert_eq!(slots.assignment(Id::new("early")), Some(Some(2)));
        assert_eq!(slots.assignment(Id::new("zero")), Some(Some(0)));
        assert_eq!(slots.realized(), &[0, 1, 2]);
    }

    #[test]
    fn test_reconcile_duplicate_numeric() {
        let template = repeatable(None);
        let claims = [
            RestClaim::new(Id::new("n-two"), 2),
            RestClaim::new(Id::new("n-one-a"), 1),
            RestClaim::new(Id::new("n-one-b"), 1),
        ];
        let slots = reconcile_rest_claims(
            &template,
            &claims,
            RestPlaceholder::Append,
            RestCollision::Numeric,
        );
        assert_eq!(slots.assignment(Id::new("n-one-a")), Some(Some(1)));
        assert_eq!(slots.assignment(Id::new("n-one-b")), Some(Some(2)));
        assert_eq!(slots.assignment(Id::new("n-two")), Some(Some(3)));
    }

    #[test]
    fn test_reconcile_capacity_exhausted() {
        let template = repeatable(Some(2));
        let claims = [
            RestClaim::new(Id::new("c0"), 0),
            RestClaim::new(Id::new("c1"), 1),
            RestClaim::new(Id::new("c2"), 1),
        ];
        let slots = reconcile_rest_claims(
            &template,
            &claims,
            RestPlaceholder::Append,
            RestCollision::FirstSeen,
        );
        assert_eq!(slots.assignment(Id::new("c2")), Some(None));
        assert_eq!(slots.realized(), &[0, 1]);
        assert_eq!(slots.placeholder(), None);
    }

    #[test]
    fn test_reconcile_stays_within_nameable_indices() {
        let template = PortTemplate::default().with_side(
            Side::Bottom,
            SidePorts::One(PortSpec::Full(
                PortDefinition::repeatable("out*", None).with_rest_min_index(5),
            )),
        );
        let map = PortsMap::create(&template).unwrap().unwrap();
        let Some(PortMatch::Rest { template, index }) = map.find("out4294967295") else {
            panic!("out4294967295 should match the repeatable template");
        };
        assert_eq!(index, u32::MAX - 5);
        assert_eq!(template.rest_index_limit(), u32::MAX - 4);

        let claims = [RestClaim::new(Id::new("far"), index)];
        let slots = reconcile_rest_claims(
            template,
            &claims,
            RestPlaceholder::Append,
            RestCollision::FirstSeen,
        );
        assert_eq!(slots.assignment(Id::new("far")), Some(Some(index)));
        assert_eq!(slots.placeholder(), None);
        let names: Vec<String> = slots
            .instances(template)
            .iter()
            .filter_map(|p| p.name().map(str::to_string))
            .collect();
        assert_eq!(names, ["out5", "out4294967295"]);
        assert!(template.rest_instance(u32::MAX - 4, true).is_none());
    }

    #[test]
    fn test_reconcile_collision_at_last_index() {
        let template = PortTemplate::default().with_side(
            Side::Bottom,
            SidePorts::One(PortSpec::Full(
                PortDefinition::repeatable("out*", None).with_rest_min_index(0),
            )),
        );
        let map = PortsMap::create(&template).unwrap().unwrap();
        let Some(PortMatch::Rest { template, index }) = map.find("out4294967294") else {
            panic!("out4294967294 should match the repeatable template");
        };
        let claims = [
            RestClaim::new(Id::new("first"), index),
            RestClaim::new(Id::new("second"), index),
        ];
        let slots = reconcile_rest_claims(
            template,
            &claims,
            RestPlaceholder::Append,
            RestCollision::FirstSeen,
        );
        assert_eq!(slots.assignment(Id::new("first")), Some(Some(index)));
        assert_eq!(slots.assignment(Id::new("second")), Some(None));
        assert_eq!(slots.placeholder(), None);
    }

    #[test]
    fn test_reconcile_initial_count() {
        let template = repeatable(None);
        let slots = reconcile_rest_claims(
            &template,
            &[],
            RestPlaceholder::Append,
            RestCollision::FirstSeen,
        );
        assert_eq!(slots.realized(), &[0]);
        assert_eq!(slots.placeholder(), Some(1));
        let instances = slots.instances(&template);
        assert_eq!(instances.len(), 2);
        assert!(instances[1].is_placeholder());
        assert_eq!(instances[1].name(), Some("case2"));
    }

    #[test]
    fn test_min_size_from_ports() {
        let map = PortsMap::create(&rect_template()).unwrap().unwrap();
        let ports: Vec<Port> = map.iter().cloned().collect();
        let size = ports_min_size(&ports, 20.0);
        assert_approx_eq!(f32, size.width(), 60.0);
        assert_approx_eq!(f32, size.height(), 20.0);
    }

    #[test]
    fn test_anchors_are_centred_on_sides() {
        let map = PortsMap::create(&rect_template()).unwrap().unwrap();
        let ports: Vec<Port> = map.iter().cloned().collect();
        let bounds = Bounds::new_from_top_left(Point::new(0.0, 0.0), Size::new(100.0, 40.0));
        let anchors = layout_anchors(&ports, bounds, 20.0, 0.0);

        let find = |name: &str| {
            anchors
                .iter()
                .find(|a| a.name() == name)
                .map(PortAnchor::point)
                .unwrap()
        };
        assert_eq!(find("top1"), Point::new(30.0, 0.0));
        assert_eq!(find("top2"), Point::new(50.0, 0.0));
        assert_eq!(find("top3"), Point::new(70.0, 0.0));
        assert_eq!(find("bottom2"), Point::new(50.0, 40.0));
        assert_eq!(find("left1"), Point::new(0.0, 20.0));
        assert_eq!(find("right1"), Point::new(100.0, 20.0));
    }

    #[test]
    fn test_anchors_respect_line_length() {
        let map = PortsMap::create(&PortTemplate::uniform(1)).unwrap().unwrap();
        let ports: Vec<Port> = map.iter().cloned().collect();
        let bounds = Bounds::new_from_top_left(Point::new(0.0, 0.0), Size::new(40.0, 40.0));
        let anchors = layout_anchors(&ports, bounds, 20.0, 5.0);
        let top = anchors.iter().find(|a| a.side() == Side::Top).unwrap();
        let left = anchors.iter().find(|a| a.side() == Side::Left).unwrap();
        assert_eq!(top.point(), Point::new(20.0, -5.0));
        assert_eq!(left.point(), Point::new(-5.0, 20.0));
    }
}
