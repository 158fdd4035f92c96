//! Live element instances.
//!
//! An [`Element`] is built from a normalized descriptor (see
//! [`crate::types::PropTable`]). Its persisted properties live in typed prop
//! structs that serialize back to the wire format; graph links and layout
//! results are derived state that is rebuilt, never exported.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use flowchart_core::{
    draw::StrokeStyle,
    geometry::{Bounds, Point, Side, Size},
    identifier::Id,
};

use crate::{
    error::FlowchartError,
    port::RestSlots,
    route::{LineShape, Route, ShapeOffsets, ShapeOffsetsPatch},
    types::{ElementKind, ElementType},
};

fn is_false(value: &bool) -> bool {
    !*value
}

/// Properties shared by nodes and relations.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonProps {
    id: String,
    #[serde(rename = "type")]
    type_name: String,
    order: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    text: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    style: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text_style: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    class_name: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    hidden: bool,
}

/// A node position as given by a descriptor.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum NodePosition {
    Absolute {
        left: f32,
        top: f32,
    },
    Center {
        #[serde(rename = "centerLeft")]
        center_left: f32,
        #[serde(rename = "centerTop")]
        center_top: f32,
    },
    /// Beside another node, `direction` naming the side of `from`.
    Anchored { direction: Side, from: String },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeProps {
    #[serde(default, skip_serializing)]
    position: Option<NodePosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    height: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min_width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    shape_style: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    border_style: Option<StrokeStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    border_width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    border_color: Option<String>,
}

/// Which ends of a relation carry an arrow head.
///
/// On the wire this is `true` (end), `false` (none) or one of `"none"`,
/// `"begin"`, `"end"`, `"both"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "ArrowModeRepr", into = "ArrowModeRepr")]
pub enum ArrowMode {
    None,
    Begin,
    #[default]
    End,
    Both,
}

impl ArrowMode {
    pub fn has_begin(self) -> bool {
        matches!(self, Self::Begin | Self::Both)
    }

    pub fn has_end(self) -> bool {
        matches!(self, Self::End | Self::Both)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
enum ArrowModeRepr {
    Flag(bool),
    Name(String),
}

impl TryFrom<ArrowModeRepr> for ArrowMode {
    type Error = String;

    fn try_from(repr: ArrowModeRepr) -> Result<Self, Self::Error> {
        match repr {
            ArrowModeRepr::Flag(true) => Ok(Self::End),
            ArrowModeRepr::Flag(false) => Ok(Self::None),
            ArrowModeRepr::Name(name) => match name.as_str() {
                "none" => Ok(Self::None),
                "begin" => Ok(Self::Begin),
                "end" => Ok(Self::End),
                "both" => Ok(Self::Both),
                _ => Err(format!(
                    "invalid arrow mode `{name}`, expected one of: none, begin, end, both"
                )),
            },
        }
    }
}

impl From<ArrowMode> for ArrowModeRepr {
    fn from(mode: ArrowMode) -> Self {
        match mode {
            ArrowMode::None => Self::Flag(false),
            ArrowMode::End => Self::Flag(true),
            ArrowMode::Begin => Self::Name("begin".to_string()),
            ArrowMode::Both => Self::Name("both".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
struct RelationPosition {
    #[serde(default)]
    shape: ShapeOffsets,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationProps {
    from: String,
    to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    to_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    line_style: Option<StrokeStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    line_width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    line_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    line_shape: Option<LineShape>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arrow_size: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    show_arrow: Option<ArrowMode>,
    #[serde(default, skip_serializing_if = "is_false")]
    hide_arrow: bool,
    #[serde(default, skip_serializing)]
    position: Option<RelationPosition>,
}

/// A partial bounds update, as issued by `set_bounds`.
///
/// Nodes take `left`/`top`/`width`/`height`; relations take `shape`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BoundsPatch {
    pub left: Option<f32>,
    pub top: Option<f32>,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub shape: Option<ShapeOffsetsPatch>,
}

impl BoundsPatch {
    pub fn position(left: f32, top: f32) -> Self {
        Self {
            left: Some(left),
            top: Some(top),
            ..Self::default()
        }
    }

    pub fn shape(shape: ShapeOffsetsPatch) -> Self {
        Self {
            shape: Some(shape),
            ..Self::default()
        }
    }

    pub fn with_size(mut self, width: f32, height: f32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn has_position(&self) -> bool {
        self.left.is_some() || self.top.is_some()
    }
}

/// How a node got its current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSource {
    /// Given by a descriptor or `set_bounds`.
    User,
    /// Resolved from a center or anchored descriptor position.
    Resolved,
    /// Assigned by automatic layout.
    Auto,
}

/// Layout state of a node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeLayout {
    position: Option<(Point, PositionSource)>,
    pending: Option<NodePosition>,
    size: Option<Size>,
}

impl NodeLayout {
    /// Top-left corner, once known.
    pub fn position(&self) -> Option<Point> {
        self.position.map(|(p, _)| p)
    }

    pub fn source(&self) -> Option<PositionSource> {
        self.position.map(|(_, s)| s)
    }

    /// A center or anchored position that still needs the node size.
    pub fn pending(&self) -> Option<&NodePosition> {
        self.pending.as_ref()
    }

    pub fn size(&self) -> Option<Size> {
        self.size
    }

    /// Bounds; only available once both position and size are known.
    pub fn bounds(&self) -> Option<Bounds> {
        Some(Bounds::new_from_top_left(self.position()?, self.size?))
    }

    /// Floating nodes are candidates for automatic layout.
    pub fn is_floating(&self) -> bool {
        self.position.is_none() && self.pending.is_none()
    }

    pub(crate) fn set_position(&mut self, position: Point, source: PositionSource) {
        self.position = Some((position, source));
        self.pending = None;
    }

    pub(crate) fn set_size(&mut self, size: Size) {
        self.size = Some(size);
    }

    pub(crate) fn clear_position(&mut self) {
        self.position = None;
    }
}

/// Graph links of a node, rebuilt on every graph derivation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeLinks {
    parents: Vec<Id>,
    children: Vec<Id>,
    from_rels: Vec<Id>,
    to_rels: Vec<Id>,
    rest_slots: IndexMap<String, RestSlots>,
}

impl NodeLinks {
    pub fn parents(&self) -> &[Id] {
        &self.parents
    }

    pub fn children(&self) -> &[Id] {
        &self.children
    }

    /// Visible relations leaving this node.
    pub fn from_rels(&self) -> &[Id] {
        &self.from_rels
    }

    /// Visible relations entering this node.
    pub fn to_rels(&self) -> &[Id] {
        &self.to_rels
    }

    /// Reconciled instances per repeatable port template name.
    pub fn rest_slots(&self) -> &IndexMap<String, RestSlots> {
        &self.rest_slots
    }

    pub(crate) fn add_child(&mut self, child: Id, relation: Id) {
        self.children.push(child);
        self.from_rels.push(relation);
    }

    pub(crate) fn add_parent(&mut self, parent: Id, relation: Id) {
        self.parents.push(parent);
        self.to_rels.push(relation);
    }

    pub(crate) fn set_rest_slots(&mut self, template: String, slots: RestSlots) {
        self.rest_slots.insert(template, slots);
    }
}

/// Graph links of a relation, rebuilt on every graph derivation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationLinks {
    visible: bool,
    from_node: Option<Id>,
    to_node: Option<Id>,
    from_index: usize,
    to_index: usize,
    from_port: Option<String>,
    to_port: Option<String>,
}

impl RelationLinks {
    pub(crate) fn resolved(
        from_node: Id,
        to_node: Id,
        from_index: usize,
        to_index: usize,
    ) -> Self {
        Self {
            visible: true,
            from_node: Some(from_node),
            to_node: Some(to_node),
            from_index,
            to_index,
            from_port: None,
            to_port: None,
        }
    }

    /// Both endpoints exist, are visible and their ports resolved.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn from_node(&self) -> Option<Id> {
        self.from_node
    }

    pub fn to_node(&self) -> Option<Id> {
        self.to_node
    }

    /// Position among the relations leaving the source node.
    pub fn from_index(&self) -> usize {
        self.from_index
    }

    /// Position among the relations entering the target node.
    pub fn to_index(&self) -> usize {
        self.to_index
    }

    /// Concrete source port; `None` means nearest free port.
    pub fn from_port(&self) -> Option<&str> {
        self.from_port.as_deref()
    }

    pub fn to_port(&self) -> Option<&str> {
        self.to_port.as_deref()
    }

    pub(crate) fn hide(&mut self) {
        self.visible = false;
    }

    pub(crate) fn set_from_port(&mut self, port: Option<String>) {
        self.from_port = port;
    }

    pub(crate) fn set_to_port(&mut self, port: Option<String>) {
        self.to_port = port;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    props: NodeProps,
    layout: NodeLayout,
    links: NodeLinks,
}

impl Node {
    pub fn props(&self) -> &NodeProps {
        &self.props
    }

    pub fn layout(&self) -> &NodeLayout {
        &self.layout
    }

    pub fn links(&self) -> &NodeLinks {
        &self.links
    }

    pub fn width(&self) -> Option<f32> {
        self.props.width
    }

    pub fn height(&self) -> Option<f32> {
        self.props.height
    }

    pub fn min_width(&self) -> Option<f32> {
        self.props.min_width
    }

    pub fn max_width(&self) -> Option<f32> {
        self.props.max_width
    }

    pub(crate) fn layout_mut(&mut self) -> &mut NodeLayout {
        &mut self.layout
    }

    pub(crate) fn links_mut(&mut self) -> &mut NodeLinks {
        &mut self.links
    }

    pub(crate) fn props_mut(&mut self) -> &mut NodeProps {
        &mut self.props
    }
}

impl NodeProps {
    pub(crate) fn set_width(&mut self, width: Option<f32>) {
        self.width = width;
    }

    pub(crate) fn set_height(&mut self, height: Option<f32>) {
        self.height = height;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    props: RelationProps,
    offsets: ShapeOffsets,
    custom: bool,
    links: RelationLinks,
    routed: Option<RoutedLine>,
}

/// Geometry of a relation as drawn by the last pass that included it.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedLine {
    from_port: String,
    to_port: String,
    route: Route,
}

impl RoutedLine {
    pub(crate) fn new(from_port: String, to_port: String, route: Route) -> Self {
        Self {
            from_port,
            to_port,
            route,
        }
    }

    /// Port the line leaves from, explicit or nearest.
    pub fn from_port(&self) -> &str {
        &self.from_port
    }

    pub fn to_port(&self) -> &str {
        &self.to_port
    }

    pub fn route(&self) -> &Route {
        &self.route
    }
}

impl Relation {
    pub fn props(&self) -> &RelationProps {
        &self.props
    }

    /// Source node id as written in the descriptor.
    pub fn from(&self) -> &str {
        &self.props.from
    }

    pub fn to(&self) -> &str {
        &self.props.to
    }

    /// Port named by the descriptor, if any.
    pub fn from_port(&self) -> Option<&str> {
        self.props.from_port.as_deref()
    }

    pub fn to_port(&self) -> Option<&str> {
        self.props.to_port.as_deref()
    }

    pub fn line_style(&self) -> Option<StrokeStyle> {
        self.props.line_style
    }

    pub fn line_width(&self) -> Option<f32> {
        self.props.line_width
    }

    pub fn line_color(&self) -> Option<&str> {
        self.props.line_color.as_deref()
    }

    pub fn line_shape(&self) -> Option<LineShape> {
        self.props.line_shape
    }

    pub fn arrow_size(&self) -> Option<f32> {
        self.props.arrow_size
    }

    pub fn show_arrow(&self) -> Option<ArrowMode> {
        self.props.show_arrow
    }

    pub fn hide_arrow(&self) -> bool {
        self.props.hide_arrow
    }

    pub fn offsets(&self) -> &ShapeOffsets {
        &self.offsets
    }

    /// True once the user adjusted the curve.
    pub fn is_custom(&self) -> bool {
        self.custom
    }

    pub fn links(&self) -> &RelationLinks {
        &self.links
    }

    /// Geometry from the last render pass that drew this relation.
    pub fn routed(&self) -> Option<&RoutedLine> {
        self.routed.as_ref()
    }

    pub fn route(&self) -> Option<&Route> {
        self.routed.as_ref().map(RoutedLine::route)
    }

    pub(crate) fn links_mut(&mut self) -> &mut RelationLinks {
        &mut self.links
    }

    pub(crate) fn set_routed(&mut self, routed: Option<RoutedLine>) {
        self.routed = routed;
    }

    pub(crate) fn offsets_mut(&mut self) -> &mut ShapeOffsets {
        &mut self.offsets
    }

    pub(crate) fn set_custom(&mut self, custom: bool) {
        self.custom = custom;
    }

    pub(crate) fn set_endpoint(&mut self, end: Endpoint, node: String, port: Option<String>) {
        match end {
            Endpoint::From => {
                self.props.from = node;
                self.props.from_port = port;
            }
            Endpoint::To => {
                self.props.to = node;
                self.props.to_port = port;
            }
        }
    }
}

/// One end of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    From,
    To,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementBody {
    Node(Node),
    Relation(Relation),
}

/// A live node or relation.
#[derive(Debug, Clone)]
pub struct Element {
    id: Id,
    common: CommonProps,
    element_type: Arc<ElementType>,
    z_index: u32,
    body: ElementBody,
}

impl Element {
    /// Builds an element from the output of [`ElementType::normalize`].
    ///
    /// # Errors
    ///
    /// Returns [`FlowchartError::Serialization`] if the normalized record
    /// does not fit the typed properties.
    pub fn from_normalized(
        normalized: Map<String, Value>,
        element_type: Arc<ElementType>,
        z_index: u32,
    ) -> Result<Self, FlowchartError> {
        let record = Value::Object(normalized);
        let common: CommonProps = serde_json::from_value(record.clone())?;
        let body = match element_type.kind() {
            ElementKind::Node => {
                let props: NodeProps = serde_json::from_value(record)?;
                let mut layout = NodeLayout::default();
                match &props.position {
                    Some(NodePosition::Absolute { left, top }) => {
                        layout.set_position(Point::new(*left, *top), PositionSource::User);
                    }
                    Some(pending) => layout.pending = Some(pending.clone()),
                    None => {}
                }
                ElementBody::Node(Node {
                    props,
                    layout,
                    links: NodeLinks::default(),
                })
            }
            ElementKind::Relation => {
                let props: RelationProps = serde_json::from_value(record)?;
                let offsets = props
                    .position
                    .as_ref()
                    .map(|p| p.shape)
                    .unwrap_or_default();
                ElementBody::Relation(Relation {
                    custom: !offsets.is_zero(),
                    props,
                    offsets,
                    links: RelationLinks::default(),
                    routed: None,
                })
            }
        };
        Ok(Self {
            id: Id::new(&common.id),
            common,
            element_type,
            z_index,
            body,
        })
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn element_type(&self) -> &Arc<ElementType> {
        &self.element_type
    }

    pub fn type_name(&self) -> &str {
        &self.common.type_name
    }

    pub fn order(&self) -> u64 {
        self.common.order
    }

    pub fn z_index(&self) -> u32 {
        self.z_index
    }

    pub fn text(&self) -> &str {
        &self.common.text
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.common.data
    }

    pub fn style(&self) -> Option<&Map<String, Value>> {
        self.common.style.as_ref()
    }

    pub fn class_name(&self) -> Option<&str> {
        self.common.class_name.as_deref()
    }

    pub fn is_hidden(&self) -> bool {
        self.common.hidden
    }

    pub fn common(&self) -> &CommonProps {
        &self.common
    }

    pub fn body(&self) -> &ElementBody {
        &self.body
    }

    pub fn is_node(&self) -> bool {
        matches!(self.body, ElementBody::Node(_))
    }

    pub fn is_relation(&self) -> bool {
        matches!(self.body, ElementBody::Relation(_))
    }

    pub fn as_node(&self) -> Option<&Node> {
        match &self.body {
            ElementBody::Node(node) => Some(node),
            ElementBody::Relation(_) => None,
        }
    }

    pub fn as_relation(&self) -> Option<&Relation> {
        match &self.body {
            ElementBody::Relation(relation) => Some(relation),
            ElementBody::Node(_) => None,
        }
    }

    pub(crate) fn as_node_mut(&mut self) -> Option<&mut Node> {
        match &mut self.body {
            ElementBody::Node(node) => Some(node),
            ElementBody::Relation(_) => None,
        }
    }

    pub(crate) fn as_relation_mut(&mut self) -> Option<&mut Relation> {
        match &mut self.body {
            ElementBody::Relation(relation) => Some(relation),
            ElementBody::Node(_) => None,
        }
    }

    pub(crate) fn set_text(&mut self, text: String) {
        self.common.text = text;
    }

    pub(crate) fn set_hidden(&mut self, hidden: bool) {
        self.common.hidden = hidden;
    }

    pub(crate) fn set_data(&mut self, key: String, value: Value) {
        self.common.data.insert(key, value);
    }

    /// Copies derived state that must survive replacing this element's
    /// descriptor: a node keeps its position unless the new descriptor
    /// brings one.
    pub(crate) fn inherit_from(&mut self, previous: &Element) {
        self.z_index = previous.z_index;
        if let (Some(node), Some(old)) = (self.as_node_mut(), previous.as_node()) {
            if node.props.position.is_none() && node.layout.pending.is_none() {
                if let Some((position, source)) = old.layout.position {
                    node.layout.set_position(position, source);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::{PropTable, ElementKind};

    fn element(kind: ElementKind, record: Value) -> Element {
        let element_type = Arc::new(ElementType::new("t", kind, "rect", PropTable::new()));
        let Value::Object(map) = record else {
            panic!("record must be an object");
        };
        Element::from_normalized(map, element_type, 5).unwrap()
    }

    #[test]
    fn test_node_absolute_position() {
        let element = element(
            ElementKind::Node,
            json!({"id": "a", "type": "t", "order": 1, "position": {"left": 10.0, "top": 20.0}}),
        );
        let node = element.as_node().unwrap();
        assert_eq!(node.layout().position(), Some(Point::new(10.0, 20.0)));
        assert_eq!(node.layout().source(), Some(PositionSource::User));
        assert!(!node.layout().is_floating());
        assert!(node.layout().bounds().is_none());
    }

    #[test]
    fn test_node_pending_position() {
        let element = element(
            ElementKind::Node,
            json!({"id": "a", "type": "t", "order": 1, "position": {"direction": "bottom", "from": "b"}}),
        );
        let layout = element.as_node().unwrap().layout();
        assert!(layout.position().is_none());
        assert_eq!(
            layout.pending(),
            Some(&NodePosition::Anchored {
                direction: Side::Bottom,
                from: "b".to_string()
            })
        );
    }

    #[test]
    fn test_relation_offsets_mark_custom() {
        let element = element(
            ElementKind::Relation,
            json!({"id": "r", "type": "t", "order": 10001, "from": "a", "to": "b",
                   "position": {"shape": {"arrX": 0.1}}}),
        );
        let relation = element.as_relation().unwrap();
        assert!(relation.is_custom());
        assert_eq!(relation.offsets().arr_x, 0.1);
    }

    #[test]
    fn test_arrow_mode_wire_forms() {
        let mode: ArrowMode = serde_json::from_value(json!(true)).unwrap();
        assert_eq!(mode, ArrowMode::End);
        let mode: ArrowMode = serde_json::from_value(json!("both")).unwrap();
        assert!(mode.has_begin() && mode.has_end());
        assert!(serde_json::from_value::<ArrowMode>(json!("up")).is_err());
        assert_eq!(serde_json::to_value(ArrowMode::Begin).unwrap(), json!("begin"));
    }

    #[test]
    fn test_inherit_keeps_position() {
        let old = element(
            ElementKind::Node,
            json!({"id": "a", "type": "t", "order": 1, "position": {"left": 1.0, "top": 2.0}}),
        );
        let mut new = element(ElementKind::Node, json!({"id": "a", "type": "t", "order": 1}));
        new.inherit_from(&old);
        assert_eq!(
            new.as_node().unwrap().layout().position(),
            Some(Point::new(1.0, 2.0))
        );
    }
}
