//! Render passes and the render sink.
//!
//! A pass sizes nodes, lays them out, resolves relation ports and routes
//! every relation it covers. A full pass covers everything; a partial pass
//! covers a caller-supplied dirty set expanded by [`PassPlan::partial`].
//! [`build_frame`] then turns the model into a [`RenderFrame`], the only
//! thing a renderer ever sees.

use std::collections::HashMap;

use indexmap::IndexSet;
use log::{debug, trace};
use serde::Serialize;
use serde_json::{Map, Value};

use flowchart_core::{
    color::Color,
    draw::{PathCommand, StrokeDefinition, TextMeasure},
    geometry::{Bounds, Point},
    identifier::Id,
};

use crate::{
    config::AppConfig,
    element::{ArrowMode, Element, RoutedLine},
    layout::{LayoutEngine, LayoutMemo, measure_node},
    port::{PortAnchor, layout_anchors, side_anchors},
    route::{ControlPoint, RouteEnd, route},
    store::{ElementStore, expanded_ports},
};

/// Which elements a pass recomputes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassPlan {
    full: bool,
    nodes: IndexSet<Id>,
    relations: IndexSet<Id>,
}

impl PassPlan {
    /// Recompute everything.
    pub fn full() -> Self {
        Self {
            full: true,
            ..Self::default()
        }
    }

    /// Recompute `dirty` plus what routing needs to stay correct: for a
    /// dirty node its relations and their opposite endpoints, for a dirty
    /// relation its endpoint nodes. Unknown ids are ignored.
    pub fn partial(store: &ElementStore, dirty: &[Id]) -> Self {
        let mut plan = Self::default();
        for &id in dirty {
            let Some(element) = store.get(id) else {
                debug!(id:%; "Ignoring unknown dirty id");
                continue;
            };
            if let Some(node) = element.as_node() {
                plan.nodes.insert(id);
                let links = node.links();
                for &relation in links.from_rels().iter().chain(links.to_rels()) {
                    plan.relations.insert(relation);
                    if let Some(links) = store
                        .get(relation)
                        .and_then(Element::as_relation)
                        .map(|r| r.links())
                    {
                        plan.nodes.extend(links.from_node());
                        plan.nodes.extend(links.to_node());
                    }
                }
            } else if let Some(relation) = element.as_relation() {
                plan.relations.insert(id);
                plan.nodes.extend(relation.links().from_node());
                plan.nodes.extend(relation.links().to_node());
            }
        }
        plan
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn includes(&self, id: Id) -> bool {
        self.full || self.nodes.contains(&id) || self.relations.contains(&id)
    }

    /// Nodes of a partial plan, in expansion order.
    pub fn nodes(&self) -> impl Iterator<Item = Id> + '_ {
        self.nodes.iter().copied()
    }

    /// Relations of a partial plan, in expansion order.
    pub fn relations(&self) -> impl Iterator<Item = Id> + '_ {
        self.relations.iter().copied()
    }
}

/// Shared inputs of one pass.
pub struct PassContext<'a> {
    pub config: &'a AppConfig,
    pub measurer: &'a dyn TextMeasure,
}

/// Runs one pass over `store`, updating node layout, relation routes and
/// the canvas.
pub fn run_pass(
    store: &mut ElementStore,
    memo: &mut LayoutMemo,
    canvas: &mut Bounds,
    ctx: &PassContext<'_>,
    plan: &PassPlan,
) {
    let config = ctx.config;

    let to_measure: Vec<Id> = store
        .nodes()
        .iter()
        .copied()
        .filter(|&id| {
            plan.includes(id)
                || store
                    .get(id)
                    .and_then(Element::as_node)
                    .is_some_and(|n| n.layout().size().is_none())
        })
        .collect();
    for &id in &to_measure {
        let Some(element) = store.get(id) else {
            continue;
        };
        let size = measure_node(element, config.layout(), config.ports(), ctx.measurer);
        if let Some(node) = store.get_mut(id).and_then(Element::as_node_mut) {
            node.layout_mut().set_size(size);
        }
    }

    let mut engine = LayoutEngine::new(config.layout(), memo);
    if plan.is_full() {
        *canvas = engine.layout_full(store);
    } else {
        let dirty: Vec<Id> = plan.nodes().collect();
        engine.layout_partial(store, &dirty, canvas);
    }

    let mut router = Router::new(config);
    if !plan.is_full() {
        router.seed_usage(store, plan);
    }
    let relations: Vec<Id> = store
        .relations()
        .iter()
        .copied()
        .filter(|&id| plan.includes(id))
        .collect();
    let mut routed = 0;
    for &id in &relations {
        let line = router.route_relation(store, id);
        let Some(relation) = store.get_mut(id).and_then(Element::as_relation_mut) else {
            continue;
        };
        if line.is_some() {
            routed += 1;
        } else if relation.links().is_visible() {
            debug!(id:%; "No port available, hiding relation");
            relation.links_mut().hide();
        }
        relation.set_routed(line);
    }
    debug!(
        full = plan.is_full(),
        nodes = to_measure.len(),
        relations = relations.len(),
        routed;
        "Render pass finished"
    );
}

/// Port resolution and routing state of one pass.
struct Router<'a> {
    config: &'a AppConfig,
    anchors: HashMap<Id, Vec<PortAnchor>>,
    usage: HashMap<(Id, String), u32>,
}

impl<'a> Router<'a> {
    fn new(config: &'a AppConfig) -> Self {
        Self {
            config,
            anchors: HashMap::new(),
            usage: HashMap::new(),
        }
    }

    /// Counts the ports held by visible relations a partial pass keeps.
    fn seed_usage(&mut self, store: &ElementStore, plan: &PassPlan) {
        for &id in store.relations() {
            if plan.includes(id) {
                continue;
            }
            let Some(relation) = store.get(id).and_then(Element::as_relation) else {
                continue;
            };
            let links = relation.links();
            if let (true, Some(line), Some(from), Some(to)) = (
                links.is_visible(),
                relation.routed(),
                links.from_node(),
                links.to_node(),
            ) {
                self.claim(from, line.from_port());
                self.claim(to, line.to_port());
            }
        }
    }

    fn claim(&mut self, node: Id, port: &str) {
        *self.usage.entry((node, port.to_string())).or_default() += 1;
    }

    fn anchors(&mut self, store: &ElementStore, node: Id) -> &[PortAnchor] {
        let line_length = self.config.ports().line_length();
        let space_size = self.config.ports().space_size();
        self.anchors.entry(node).or_insert_with(|| {
            let Some(element) = store.get(node) else {
                return Vec::new();
            };
            let Some(bounds) = element.as_node().and_then(|n| n.layout().bounds()) else {
                return Vec::new();
            };
            if element.element_type().ports().is_none() {
                return side_anchors(bounds, line_length);
            }
            layout_anchors(&expanded_ports(element), bounds, space_size, line_length)
        })
    }

    fn capacity(store: &ElementStore, node: Id, port: &str) -> u32 {
        store
            .get(node)
            .and_then(|e| e.element_type().ports())
            .map_or(u32::MAX, |ports| {
                ports.get(port).map_or(1, |p| p.max_link_count())
            })
    }

    /// Explicit port by name, else the free port with spare capacity
    /// nearest to `target`.
    fn resolve_anchor(
        &mut self,
        store: &ElementStore,
        node: Id,
        explicit: Option<&str>,
        target: Point,
    ) -> Option<PortAnchor> {
        if let Some(name) = explicit {
            let anchor = self
                .anchors(store, node)
                .iter()
                .find(|a| a.name() == name)
                .cloned();
            if let Some(anchor) = &anchor {
                self.claim(node, anchor.name());
            }
            return anchor;
        }

        let candidates: Vec<PortAnchor> = self
            .anchors(store, node)
            .iter()
            .filter(|a| a.is_free())
            .cloned()
            .collect();
        let mut best: Option<(f32, PortAnchor)> = None;
        for anchor in candidates {
            let used = self
                .usage
                .get(&(node, anchor.name().to_string()))
                .copied()
                .unwrap_or(0);
            if used >= Self::capacity(store, node, anchor.name()) {
                continue;
            }
            let distance = anchor.point().distance(target);
            if best.as_ref().is_none_or(|(d, _)| distance < *d) {
                best = Some((distance, anchor));
            }
        }
        let (_, anchor) = best?;
        self.claim(node, anchor.name());
        Some(anchor)
    }

    fn route_relation(&mut self, store: &ElementStore, id: Id) -> Option<RoutedLine> {
        let element = store.get(id)?;
        let relation = element.as_relation()?;
        let links = relation.links();
        if !links.is_visible() {
            return None;
        }
        let from_node = links.from_node()?;
        let to_node = links.to_node()?;
        let bounds = |node: Id| store.get(node)?.as_node()?.layout().bounds();
        let target = bounds(from_node)?
            .center()
            .midpoint(bounds(to_node)?.center());

        let from = self.resolve_anchor(store, from_node, links.from_port(), target)?;
        let to = self.resolve_anchor(store, to_node, links.to_port(), target)?;
        let begin = RouteEnd::new(from.point(), from.side());
        let end = RouteEnd::new(to.point(), to.side());

        let element_type = element.element_type();
        let line = match element_type.route_hook() {
            Some(hook) => hook.route(begin, end, relation.offsets()),
            None => {
                let shape = relation
                    .line_shape()
                    .or(element_type.line_defaults().shape())
                    .unwrap_or(self.config.relation().line_shape());
                route(
                    begin,
                    end,
                    shape,
                    relation.offsets(),
                    self.config.relation().curvature(),
                )
            }
        };
        trace!(id:%, from = from.name(), to = to.name(); "Routed relation");
        Some(RoutedLine::new(
            from.name().to_string(),
            to.name().to_string(),
            line,
        ))
    }
}

/// A node as the renderer sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFrame {
    id: Id,
    #[serde(rename = "type")]
    type_name: String,
    shape: String,
    text: String,
    bounds: Bounds,
    z_index: u32,
    ports: Vec<PortAnchor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    class_name: Option<String>,
}

impl NodeFrame {
    pub fn id(&self) -> Id {
        self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn ports(&self) -> &[PortAnchor] {
        &self.ports
    }
}

/// A relation line as the renderer sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationFrame {
    id: Id,
    #[serde(rename = "type")]
    type_name: String,
    text: String,
    from: String,
    to: String,
    from_port: String,
    to_port: String,
    path: String,
    commands: Vec<PathCommand>,
    control_points: Vec<ControlPoint>,
    text_anchor: Point,
    begin_arrow: f32,
    end_arrow: f32,
    stroke: StrokeDefinition,
    #[serde(skip_serializing_if = "Option::is_none")]
    dash_array: Option<[f32; 2]>,
    z_index: u32,
    bounds: Bounds,
}

impl RelationFrame {
    pub fn id(&self) -> Id {
        self.id
    }

    pub fn from_port(&self) -> &str {
        &self.from_port
    }

    pub fn to_port(&self) -> &str {
        &self.to_port
    }

    pub fn commands(&self) -> &[PathCommand] {
        &self.commands
    }

    pub fn control_points(&self) -> &[ControlPoint] {
        &self.control_points
    }

    pub fn text_anchor(&self) -> Point {
        self.text_anchor
    }

    pub fn begin_arrow(&self) -> f32 {
        self.begin_arrow
    }

    pub fn end_arrow(&self) -> f32 {
        self.end_arrow
    }

    pub fn stroke(&self) -> &StrokeDefinition {
        &self.stroke
    }

    pub fn dash_array(&self) -> Option<[f32; 2]> {
        self.dash_array
    }
}

/// Everything visible after a pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderFrame {
    canvas: Bounds,
    nodes: Vec<NodeFrame>,
    relations: Vec<RelationFrame>,
}

impl RenderFrame {
    pub fn canvas(&self) -> Bounds {
        self.canvas
    }

    pub fn nodes(&self) -> &[NodeFrame] {
        &self.nodes
    }

    pub fn relations(&self) -> &[RelationFrame] {
        &self.relations
    }

    pub fn node(&self, id: Id) -> Option<&NodeFrame> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn relation(&self, id: Id) -> Option<&RelationFrame> {
        self.relations.iter().find(|r| r.id == id)
    }
}

/// Arrow heads of a relation.
///
/// An explicit `showArrow` wins. Otherwise relations into a `result` node
/// carry no arrow when configured so, and everything else gets an end
/// arrow. `hideArrow` and target types that hide arrows pointing at them
/// remove heads.
pub fn arrow_mode(store: &ElementStore, relation: &Element, config: &AppConfig) -> ArrowMode {
    let Some(props) = relation.as_relation() else {
        return ArrowMode::None;
    };
    if props.hide_arrow() {
        return ArrowMode::None;
    }
    let to_type = props
        .links()
        .to_node()
        .and_then(|id| store.get(id))
        .map(|e| e.element_type());
    let mode = props.show_arrow().unwrap_or_else(|| {
        let into_result = to_type.is_some_and(|t| t.name() == "result");
        if into_result && config.relation().hide_arrow_to_result() {
            ArrowMode::None
        } else {
            ArrowMode::End
        }
    });
    if to_type.is_some_and(|t| t.line_defaults().hide_arrow_to_self()) {
        return match mode {
            ArrowMode::Both | ArrowMode::Begin => ArrowMode::Begin,
            ArrowMode::End | ArrowMode::None => ArrowMode::None,
        };
    }
    mode
}

/// Collects the render sink from the current model.
pub fn build_frame(store: &ElementStore, canvas: Bounds, config: &AppConfig) -> RenderFrame {
    let ports = config.ports();
    let mut nodes = Vec::new();
    for &id in store.nodes() {
        let Some(element) = store.get(id) else {
            continue;
        };
        if element.is_hidden() {
            continue;
        }
        let Some(bounds) = element.as_node().and_then(|n| n.layout().bounds()) else {
            continue;
        };
        let anchors = if element.element_type().ports().is_some() {
            layout_anchors(
                &expanded_ports(element),
                bounds,
                ports.space_size(),
                ports.line_length(),
            )
        } else {
            Vec::new()
        };
        nodes.push(NodeFrame {
            id,
            type_name: element.type_name().to_string(),
            shape: element.element_type().shape().to_string(),
            text: element.text().to_string(),
            bounds,
            z_index: element.z_index(),
            ports: anchors,
            style: element.style().cloned(),
            class_name: element.class_name().map(str::to_string),
        });
    }

    let defaults = config.relation();
    let mut relations = Vec::new();
    for &id in store.relations() {
        let Some(element) = store.get(id) else {
            continue;
        };
        let Some(relation) = element.as_relation() else {
            continue;
        };
        let links = relation.links();
        let Some(line) = relation.routed().filter(|_| links.is_visible()) else {
            continue;
        };
        let (Some(from), Some(to)) = (links.from_node(), links.to_node()) else {
            continue;
        };
        let arrow_size = relation.arrow_size().unwrap_or(defaults.arrow_size());
        let mode = arrow_mode(store, element, config);
        let line_style = relation
            .line_style()
            .or(element.element_type().line_defaults().style())
            .unwrap_or(defaults.line_style());
        let width = relation.line_width().unwrap_or(defaults.line_width());
        let color = relation
            .line_color()
            .and_then(|c| Color::new(c).ok())
            .or_else(|| defaults.line_color().ok())
            .unwrap_or_default();
        let stroke = StrokeDefinition::new(color, width).with_style(line_style);
        let route = line.route();
        relations.push(RelationFrame {
            id,
            type_name: element.type_name().to_string(),
            text: element.text().to_string(),
            from: from.to_string(),
            to: to.to_string(),
            from_port: line.from_port().to_string(),
            to_port: line.to_port().to_string(),
            path: route.svg_path(),
            commands: route.commands().to_vec(),
            control_points: route.control_points().to_vec(),
            text_anchor: route.text_anchor(),
            begin_arrow: if mode.has_begin() { arrow_size } else { 0.0 },
            end_arrow: if mode.has_end() { arrow_size } else { 0.0 },
            dash_array: stroke.dash_array(),
            stroke,
            z_index: element.z_index(),
            bounds: route.bounds(),
        });
    }

    RenderFrame {
        canvas,
        nodes,
        relations,
    }
}
