//! Flowchart - a diagram model, tree layout and relation routing engine.
//!
//! The engine owns one in-memory chart. Callers issue discrete commands
//! through [`FlowChart`]; each command rebuilds the element graph and runs a
//! full or partial render pass. Renderers read the resulting
//! [`render::RenderFrame`] and never write geometry back except through
//! [`FlowChart::set_bounds`].

pub mod config;
pub mod element;
pub mod export;
pub mod layout;
pub mod port;
pub mod reference;
pub mod render;
pub mod route;
pub mod store;
pub mod types;

mod error;

pub use flowchart_core::{color, draw, geometry, identifier};

pub use error::FlowchartError;

use log::{debug, info, trace};
use serde_json::{Map, Value, json};

use draw::{FixedWidthMeasurer, TextMeasure};
use geometry::{Bounds, Point, Side};
use identifier::Id;

use config::AppConfig;
use element::{BoundsPatch, Element, PositionSource};
use export::TypeExport;
use layout::{LayoutMemo, initial_canvas};
use render::{PassContext, PassPlan, RenderFrame};
use route::ControlPointName;
use store::ElementStore;
use types::TypeRegistry;

/// An editable flowchart.
///
/// # Examples
///
/// ```rust,no_run
/// use flowchart::{FlowChart, config::AppConfig};
/// use serde_json::json;
///
/// let mut chart = FlowChart::new(AppConfig::default()).expect("valid config");
/// chart
///     .reset_data(Some(json!([
///         {"id": "begin", "type": "start", "text": "Start"},
///         {"id": "work", "text": "Work", "from": "begin"},
///     ])))
///     .expect("valid elements");
///
/// let frame = chart.frame();
/// println!("{}", serde_json::to_string_pretty(&frame).unwrap());
/// ```
pub struct FlowChart {
    config: AppConfig,
    registry: TypeRegistry,
    store: ElementStore,
    memo: LayoutMemo,
    canvas: Bounds,
    measurer: Box<dyn TextMeasure>,
}

impl FlowChart {
    /// Creates an empty chart.
    ///
    /// # Errors
    ///
    /// Returns an error when a configured user type is invalid.
    pub fn new(config: AppConfig) -> Result<Self, FlowchartError> {
        let registry = TypeRegistry::from_config(config.elements())?;
        let store = ElementStore::new(config.elements().id_prefix());
        let canvas = initial_canvas(config.layout().padding());
        Ok(Self {
            config,
            registry,
            store,
            memo: LayoutMemo::new(),
            canvas,
            measurer: Box::new(FixedWidthMeasurer::default()),
        })
    }

    /// Replaces the text measurer used to size nodes.
    pub fn with_measurer(mut self, measurer: impl TextMeasure + 'static) -> Self {
        self.measurer = Box::new(measurer);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn store(&self) -> &ElementStore {
        &self.store
    }

    /// Canvas bounds after the last pass.
    pub fn canvas(&self) -> Bounds {
        self.canvas
    }

    /// Tree depth computed by the last full layout, for auto-placed nodes.
    pub fn depth(&self, id: &str) -> Option<usize> {
        self.memo.depth(Id::new(id))
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.store.get(Id::new(id))
    }

    /// Nodes in order.
    pub fn nodes(&self) -> impl Iterator<Item = &Element> {
        self.store.nodes().iter().filter_map(|&id| self.store.get(id))
    }

    /// Relations in order.
    pub fn relations(&self) -> impl Iterator<Item = &Element> {
        self.store
            .relations()
            .iter()
            .filter_map(|&id| self.store.get(id))
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Adds or updates elements from one descriptor or an array of them, then
    /// renders the touched elements.
    ///
    /// # Errors
    ///
    /// Returns the first validation error. Descriptors before it stay added.
    pub fn add(&mut self, descriptors: Value) -> Result<Vec<Id>, FlowchartError> {
        let inserted = self.insert_all(descriptors)?;
        debug!(count = inserted.len(); "Added elements");
        self.render(Some(&inserted));
        Ok(inserted)
    }

    /// Deletes elements. Deleting a node also deletes the relations linked
    /// to it. Unknown ids are ignored. Returns every removed id.
    pub fn delete(&mut self, ids: &[&str]) -> Vec<Id> {
        let mut removed = Vec::new();
        for id in ids {
            removed.extend(self.store.remove(Id::new(id)));
        }
        debug!(requested = ids.len(), removed = removed.len(); "Deleted elements");
        self.render(None);
        removed
    }

    /// Moves or resizes a node, or merges shape offsets into a relation.
    ///
    /// # Errors
    ///
    /// Returns [`FlowchartError::UnknownElement`] for an unknown id and
    /// [`FlowchartError::InvalidValue`] for a negative size.
    pub fn set_bounds(&mut self, id: &str, patch: &BoundsPatch) -> Result<(), FlowchartError> {
        let id = self.lookup(id)?;
        if patch.width.is_some_and(|w| w < 0.0) || patch.height.is_some_and(|h| h < 0.0) {
            return Err(FlowchartError::invalid_value(
                "bounds",
                "width and height must not be negative",
            ));
        }
        let padding = self.config.layout().padding();
        let Some(element) = self.store.get_mut(id) else {
            return Err(FlowchartError::UnknownElement(id.to_string()));
        };
        if let Some(node) = element.as_node_mut() {
            if patch.has_position() {
                let current = node.layout().position();
                let left = patch
                    .left
                    .or(current.map(Point::x))
                    .unwrap_or(padding);
                let top = patch.top.or(current.map(Point::y)).unwrap_or(padding);
                node.layout_mut()
                    .set_position(Point::new(left, top), PositionSource::User);
            }
            if let Some(width) = patch.width {
                node.props_mut().set_width(Some(width));
            }
            if let Some(height) = patch.height {
                node.props_mut().set_height(Some(height));
            }
        } else if let Some(relation) = element.as_relation_mut() {
            if let Some(shape) = &patch.shape {
                relation.offsets_mut().merge(shape);
                let custom = !relation.offsets().is_zero();
                relation.set_custom(custom);
            }
        }
        trace!(id:%, patch:?; "Set bounds");
        self.render(Some(&[id]));
        Ok(())
    }

    /// Sets an element's label.
    ///
    /// # Errors
    ///
    /// Returns [`FlowchartError::UnknownElement`] for an unknown id.
    pub fn set_text(&mut self, id: &str, text: &str) -> Result<(), FlowchartError> {
        let id = self.lookup(id)?;
        if let Some(element) = self.store.get_mut(id) {
            if element.text() == text {
                return Ok(());
            }
            element.set_text(text.to_string());
        }
        self.render(Some(&[id]));
        Ok(())
    }

    /// Changes an element's type, keeping its id, order, properties and
    /// position.
    ///
    /// # Errors
    ///
    /// Returns [`FlowchartError::UnknownElement`] for an unknown id,
    /// [`FlowchartError::UnknownType`] for an unknown type, and
    /// [`FlowchartError::InvalidValue`] when the new type is of the other
    /// kind.
    pub fn change_type(&mut self, id: &str, type_name: &str) -> Result<(), FlowchartError> {
        let id = self.lookup(id)?;
        let new_type = self
            .registry
            .get(type_name)
            .ok_or_else(|| FlowchartError::UnknownType(type_name.to_string()))?;
        let Some(element) = self.store.get(id) else {
            return Err(FlowchartError::UnknownElement(id.to_string()));
        };
        if new_type.kind() != element.element_type().kind() {
            return Err(FlowchartError::invalid_value(
                "type",
                format!("`{type_name}` cannot replace the type of `{id}`"),
            ));
        }
        let mut descriptor = export::export_element(element, false)?;
        descriptor.insert("type".to_string(), Value::String(type_name.to_string()));
        if element.is_node() {
            descriptor.remove("position");
        }
        self.store.insert(&self.registry, descriptor)?;
        debug!(id:%, type_name; "Changed element type");
        self.render(Some(&[id]));
        Ok(())
    }

    /// Links two nodes.
    ///
    /// # Errors
    ///
    /// Returns [`FlowchartError::InvalidRelation`] when either node is
    /// missing, both ends are the same node, or a port is missing while free
    /// ports are not allowed.
    pub fn add_relation(
        &mut self,
        from: &str,
        from_port: Option<&str>,
        to: &str,
        to_port: Option<&str>,
        text: Option<&str>,
        type_name: Option<&str>,
    ) -> Result<Vec<Id>, FlowchartError> {
        for node in [from, to] {
            if !self.element(node).is_some_and(Element::is_node) {
                return Err(FlowchartError::InvalidRelation(format!(
                    "`{node}` is not a node"
                )));
            }
        }
        if from == to {
            return Err(FlowchartError::InvalidRelation(format!(
                "`{from}` cannot link to itself"
            )));
        }
        if !self.config.ports().allow_free_ports() && (from_port.is_none() || to_port.is_none()) {
            return Err(FlowchartError::InvalidRelation(
                "both ports are required".to_string(),
            ));
        }

        let mut descriptor = Map::new();
        descriptor.insert("from".to_string(), json!(from));
        descriptor.insert("to".to_string(), json!(to));
        if let Some(port) = from_port {
            descriptor.insert("fromPort".to_string(), json!(port));
        }
        if let Some(port) = to_port {
            descriptor.insert("toPort".to_string(), json!(port));
        }
        if let Some(text) = text {
            descriptor.insert("text".to_string(), json!(text));
        }
        let type_name = type_name.unwrap_or(self.config.elements().default_relation_type());
        descriptor.insert("type".to_string(), json!(type_name));
        self.add(Value::Object(descriptor))
    }

    /// Adds a node linked from `from`, optionally anchored on one side of it.
    ///
    /// # Errors
    ///
    /// Returns [`FlowchartError::UnknownElement`] when `from` is not a live
    /// node, plus any validation error of the new descriptor.
    pub fn add_node(
        &mut self,
        type_name: Option<&str>,
        from: &str,
        from_port: Option<&str>,
        text: Option<&str>,
        direction: Option<Side>,
    ) -> Result<Vec<Id>, FlowchartError> {
        if !self.element(from).is_some_and(Element::is_node) {
            return Err(FlowchartError::UnknownElement(from.to_string()));
        }
        let reference = match from_port.filter(|p| !p.is_empty()) {
            Some(port) => format!("{from}.{port}"),
            None => from.to_string(),
        };
        let type_name = type_name.unwrap_or(self.config.elements().default_node_type());
        let mut descriptor = Map::new();
        descriptor.insert("type".to_string(), json!(type_name));
        descriptor.insert("from".to_string(), json!(reference));
        if let Some(text) = text {
            descriptor.insert("text".to_string(), json!(text));
        }
        if let Some(direction) = direction {
            descriptor.insert(
                "position".to_string(),
                json!({"direction": direction, "from": from}),
            );
        }
        self.add(Value::Object(descriptor))
    }

    /// Replaces node `old_id` with a new element and points its relations
    /// at the new id.
    ///
    /// # Errors
    ///
    /// Returns [`FlowchartError::UnknownElement`] for an unknown id, plus
    /// any validation error of the new descriptor.
    pub fn replace(&mut self, old_id: &str, descriptor: Value) -> Result<Vec<Id>, FlowchartError> {
        let old = self.lookup(old_id)?;
        let Value::Object(raw) = descriptor else {
            return Err(FlowchartError::invalid_value(
                "descriptor",
                "expected an object",
            ));
        };
        let previous = self.store.detach(old);
        let inserted = match self.store.insert(&self.registry, raw) {
            Ok(inserted) => inserted,
            Err(err) => {
                if let Some(previous) = previous {
                    self.store.restore(previous);
                }
                return Err(err);
            }
        };
        let mut dirty = inserted.clone();
        if let Some(&new) = inserted.first() {
            if new != old {
                dirty.extend(self.store.retarget(old, new));
            }
        }
        debug!(old:% = old, inserted = inserted.len(); "Replaced element");
        self.render(Some(&dirty));
        Ok(inserted)
    }

    /// Stores `value` under `key` in an element's data bag.
    ///
    /// # Errors
    ///
    /// Returns [`FlowchartError::UnknownElement`] for an unknown id.
    pub fn set_data(&mut self, id: &str, key: &str, value: Value) -> Result<(), FlowchartError> {
        let id = self.lookup(id)?;
        if let Some(element) = self.store.get_mut(id) {
            element.set_data(key.to_string(), value);
        }
        Ok(())
    }

    /// Hides or shows elements. Relations touching hidden nodes are hidden
    /// too until the nodes are shown again.
    ///
    /// # Errors
    ///
    /// Returns [`FlowchartError::UnknownElement`] for the first unknown id;
    /// nothing changes in that case.
    pub fn set_hidden(&mut self, ids: &[&str], hidden: bool) -> Result<(), FlowchartError> {
        let ids = ids
            .iter()
            .map(|id| self.lookup(id))
            .collect::<Result<Vec<_>, _>>()?;
        for &id in &ids {
            if let Some(element) = self.store.get_mut(id) {
                element.set_hidden(hidden);
            }
        }
        debug!(count = ids.len(), hidden; "Changed visibility");
        self.render(None);
        Ok(())
    }

    /// Forgets every automatically assigned node position and lays the
    /// chart out again.
    pub fn reset_positions(&mut self) {
        let ids: Vec<Id> = self.store.nodes().to_vec();
        let mut reset = 0;
        for id in ids {
            let Some(node) = self.store.get_mut(id).and_then(Element::as_node_mut) else {
                continue;
            };
            if node.layout().source() == Some(PositionSource::Auto) {
                node.layout_mut().clear_position();
                reset += 1;
            }
        }
        debug!(reset; "Reset automatic positions");
        self.render(None);
    }

    /// Translates a pixel drag of a relation control point into shape
    /// offsets and applies them with [`FlowChart::set_bounds`]. Returns
    /// `false` when the point cannot be dragged on the current route.
    ///
    /// # Errors
    ///
    /// Returns [`FlowchartError::UnknownElement`] when `id` is not a live
    /// relation.
    pub fn drag_control_point(
        &mut self,
        id: &str,
        point: ControlPointName,
        dx: f32,
        dy: f32,
    ) -> Result<bool, FlowchartError> {
        let relation = self
            .element(id)
            .and_then(Element::as_relation)
            .ok_or_else(|| FlowchartError::UnknownElement(id.to_string()))?;
        let Some(route) = relation.route() else {
            return Ok(false);
        };
        let Some(patch) = route
            .drag_scale()
            .translate(relation.offsets(), point, dx, dy)
        else {
            return Ok(false);
        };
        self.set_bounds(id, &BoundsPatch::shape(patch))?;
        Ok(true)
    }

    /// Drops every element and loads `data` instead; `None` loads a single
    /// start node.
    ///
    /// # Errors
    ///
    /// Returns the first validation error. Descriptors before it stay added.
    pub fn reset_data(&mut self, data: Option<Value>) -> Result<Vec<Id>, FlowchartError> {
        let data = data.unwrap_or_else(|| json!([{"type": "start"}]));
        self.store.clear();
        let inserted = self.insert_all(data);
        self.render(None);
        let inserted = inserted?;
        info!(elements = inserted.len(); "Reset chart data");
        Ok(inserted)
    }

    // =========================================================================
    // Rendering and export
    // =========================================================================

    /// Rebuilds the graph and runs a render pass: partial over `dirty` when
    /// given, full otherwise.
    pub fn render(&mut self, dirty: Option<&[Id]>) {
        self.store.rebuild_graph(self.config.ports());
        let plan = match dirty {
            Some(dirty) => PassPlan::partial(&self.store, dirty),
            None => PassPlan::full(),
        };
        let ctx = PassContext {
            config: &self.config,
            measurer: self.measurer.as_ref(),
        };
        render::run_pass(
            &mut self.store,
            &mut self.memo,
            &mut self.canvas,
            &ctx,
            &plan,
        );
    }

    /// Everything a renderer draws.
    pub fn frame(&self) -> RenderFrame {
        render::build_frame(&self.store, self.canvas, &self.config)
    }

    /// The chart as a flat, ordered descriptor list.
    ///
    /// # Errors
    ///
    /// Returns [`FlowchartError::Serialization`] if a property fails to
    /// serialize.
    pub fn export_data(&self) -> Result<Vec<Map<String, Value>>, FlowchartError> {
        export::export_elements(&self.store, self.config.elements().export_data_to_self())
    }

    /// Registered types, for palettes and editors.
    pub fn export_types(&self, include_internal: bool) -> Vec<TypeExport> {
        export::export_types(&self.registry, include_internal)
    }

    fn lookup(&self, id: &str) -> Result<Id, FlowchartError> {
        let id = Id::new(id);
        if self.store.contains(id) {
            Ok(id)
        } else {
            Err(FlowchartError::UnknownElement(id.to_string()))
        }
    }

    fn insert_all(&mut self, descriptors: Value) -> Result<Vec<Id>, FlowchartError> {
        let items = match descriptors {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        let mut inserted = Vec::new();
        for item in items {
            let Value::Object(raw) = item else {
                return Err(FlowchartError::invalid_value(
                    "descriptor",
                    "expected an object",
                ));
            };
            inserted.extend(self.store.insert(&self.registry, raw)?);
        }
        Ok(inserted)
    }
}
