//! Element types and the type registry.
//!
//! Every element is an instance of an [`ElementType`]. A type fixes whether
//! the element is a node or a relation, how raw descriptor properties are
//! normalized (see [`PropTable`]), which ports a node offers and the visual
//! defaults a renderer falls back to.
//!
//! The [`TypeRegistry`] holds the built-in types plus any user types declared
//! in configuration. User types are composed from an existing type with
//! [`derive_type`] once, when the registry is built.

mod builtin;
mod props;

pub use props::{
    ComputeFn, NormalizeContext, Primitive, PropInput, PropRule, PropTable,
};

use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use flowchart_core::draw::StrokeStyle;

use crate::{
    config::ElementConfig,
    error::FlowchartError,
    port::{PortTemplate, PortsMap},
    route::{LineShape, Route, RouteEnd, ShapeOffsets},
};

/// Whether a type describes nodes or relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Node,
    Relation,
}

/// Custom routing for a relation type.
pub type RouteHookFn = dyn Fn(RouteEnd, RouteEnd, &ShapeOffsets) -> Route + Send + Sync;

/// Replaces the built-in router for relations of one type.
#[derive(Clone)]
pub struct RouteHook(Arc<RouteHookFn>);

impl RouteHook {
    pub fn new(hook: impl Fn(RouteEnd, RouteEnd, &ShapeOffsets) -> Route + Send + Sync + 'static) -> Self {
        Self(Arc::new(hook))
    }

    pub fn route(&self, begin: RouteEnd, end: RouteEnd, offsets: &ShapeOffsets) -> Route {
        (self.0)(begin, end, offsets)
    }
}

impl fmt::Debug for RouteHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RouteHook(..)")
    }
}

/// Size fallbacks for nodes of a type.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NodeDefaults {
    width: Option<f32>,
    height: Option<f32>,
    min_width: Option<f32>,
    max_width: Option<f32>,
}

impl NodeDefaults {
    pub fn width(&self) -> Option<f32> {
        self.width
    }

    pub fn height(&self) -> Option<f32> {
        self.height
    }

    pub fn min_width(&self) -> Option<f32> {
        self.min_width
    }

    pub fn max_width(&self) -> Option<f32> {
        self.max_width
    }
}

/// Line fallbacks for relations of a type, and arrow behavior of nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LineDefaults {
    shape: Option<LineShape>,
    style: Option<StrokeStyle>,
    hide_arrow_to_self: bool,
}

impl LineDefaults {
    pub fn shape(&self) -> Option<LineShape> {
        self.shape
    }

    pub fn style(&self) -> Option<StrokeStyle> {
        self.style
    }

    /// Relations ending at a node of this type draw no end arrow.
    pub fn hide_arrow_to_self(&self) -> bool {
        self.hide_arrow_to_self
    }
}

/// An immutable element type descriptor.
#[derive(Debug, Clone)]
pub struct ElementType {
    name: String,
    kind: ElementKind,
    shape: String,
    display_name: Option<String>,
    internal: bool,
    begin: bool,
    end: bool,
    default_text: Option<String>,
    props: Arc<PropTable>,
    ports: Option<Arc<PortsMap>>,
    node: NodeDefaults,
    line: LineDefaults,
    route_hook: Option<RouteHook>,
}

impl ElementType {
    /// Creates a bare type with the given property table.
    pub fn new(
        name: impl Into<String>,
        kind: ElementKind,
        shape: impl Into<String>,
        props: PropTable,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            shape: shape.into(),
            display_name: None,
            internal: false,
            begin: false,
            end: false,
            default_text: None,
            props: Arc::new(props),
            ports: None,
            node: NodeDefaults::default(),
            line: LineDefaults::default(),
            route_hook: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn is_node(&self) -> bool {
        self.kind == ElementKind::Node
    }

    pub fn is_relation(&self) -> bool {
        self.kind == ElementKind::Relation
    }

    /// Renderer shape name.
    pub fn shape(&self) -> &str {
        &self.shape
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Building blocks that are hidden from type export by default.
    pub fn is_internal(&self) -> bool {
        self.internal
    }

    /// Tree roots: always laid out at depth 0.
    pub fn is_begin(&self) -> bool {
        self.begin
    }

    /// Terminal nodes: laid out one depth past the deepest node.
    pub fn is_end(&self) -> bool {
        self.end
    }

    pub fn default_text(&self) -> Option<&str> {
        self.default_text.as_deref()
    }

    pub fn props(&self) -> &PropTable {
        &self.props
    }

    pub fn ports(&self) -> Option<&PortsMap> {
        self.ports.as_deref()
    }

    pub fn node_defaults(&self) -> &NodeDefaults {
        &self.node
    }

    pub fn line_defaults(&self) -> &LineDefaults {
        &self.line
    }

    pub fn route_hook(&self) -> Option<&RouteHook> {
        self.route_hook.as_ref()
    }

    /// Normalizes a raw descriptor against this type's property table.
    pub fn normalize(
        &self,
        raw: &Map<String, Value>,
        ctx: &mut dyn NormalizeContext,
    ) -> Result<Map<String, Value>, FlowchartError> {
        self.props.normalize(raw, self, ctx)
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_internal(mut self, internal: bool) -> Self {
        self.internal = internal;
        self
    }

    pub fn with_begin(mut self, begin: bool) -> Self {
        self.begin = begin;
        self
    }

    pub fn with_end(mut self, end: bool) -> Self {
        self.end = end;
        self
    }

    /// Builds and attaches the ports map for `template`.
    ///
    /// # Errors
    ///
    /// Returns an error if the template declares invalid ports.
    pub fn with_ports(mut self, template: &PortTemplate) -> Result<Self, FlowchartError> {
        self.ports = PortsMap::create(template)?.map(Arc::new);
        Ok(self)
    }

    pub fn with_size(mut self, width: Option<f32>, height: Option<f32>) -> Self {
        self.node.width = width;
        self.node.height = height;
        self
    }

    pub fn with_min_width(mut self, min_width: f32) -> Self {
        self.node.min_width = Some(min_width);
        self
    }

    pub fn with_hide_arrow_to_self(mut self, hide: bool) -> Self {
        self.line.hide_arrow_to_self = hide;
        self
    }

    pub fn with_route_hook(mut self, hook: RouteHook) -> Self {
        self.route_hook = Some(hook);
        self
    }

    /// Appends `extra` to the property table; later rules win.
    pub fn with_props(mut self, extra: &PropTable) -> Self {
        self.props = Arc::new(self.props.merged(extra));
        self
    }
}

/// A user type declaration, as read from configuration.
///
/// ```
/// # use flowchart::types::TypeDefinition;
/// let def: TypeDefinition = serde_json::from_value(serde_json::json!({
///     "name": "approve",
///     "base": "judge",
///     "display_name": "Approve?",
///     "ports": {"left": 1, "right": 1}
/// })).unwrap();
/// assert_eq!(def.name(), "approve");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TypeDefinition {
    name: String,
    base: String,
    shape: Option<String>,
    display_name: Option<String>,
    text: Option<String>,
    begin: Option<bool>,
    end: Option<bool>,
    width: Option<f32>,
    height: Option<f32>,
    min_width: Option<f32>,
    max_width: Option<f32>,
    line_shape: Option<LineShape>,
    line_style: Option<StrokeStyle>,
    hide_arrow_to_self: Option<bool>,
    ports: Option<PortTemplate>,
}

impl TypeDefinition {
    pub fn new(name: impl Into<String>, base: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: base.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_begin(mut self) -> Self {
        self.begin = Some(true);
        self
    }

    pub fn with_end(mut self) -> Self {
        self.end = Some(true);
        self
    }

    pub fn with_size(mut self, width: f32, height: f32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_line_shape(mut self, shape: LineShape) -> Self {
        self.line_shape = Some(shape);
        self
    }

    pub fn with_line_style(mut self, style: StrokeStyle) -> Self {
        self.line_style = Some(style);
        self
    }

    pub fn with_ports(mut self, ports: PortTemplate) -> Self {
        self.ports = Some(ports);
        self
    }
}

/// Composes a new type from `base` and a declaration.
///
/// Everything the declaration leaves unset is inherited, including the
/// property table and the ports. Derived types are never internal.
///
/// # Errors
///
/// Returns [`FlowchartError::InvalidValue`] for an empty or reserved name and
/// for invalid port declarations.
pub fn derive_type(
    base: &ElementType,
    overrides: &TypeDefinition,
) -> Result<ElementType, FlowchartError> {
    if overrides.name.is_empty() {
        return Err(FlowchartError::invalid_value("types", "type name is empty"));
    }
    crate::reference::validate_id(&overrides.name)?;

    let mut derived = ElementType {
        name: overrides.name.clone(),
        internal: false,
        ..base.clone()
    };
    if let Some(shape) = &overrides.shape {
        derived.shape = shape.clone();
    }
    if let Some(display_name) = &overrides.display_name {
        derived.display_name = Some(display_name.clone());
    }
    if let Some(text) = &overrides.text {
        derived.default_text = Some(text.clone());
    }
    if let Some(begin) = overrides.begin {
        derived.begin = begin;
    }
    if let Some(end) = overrides.end {
        derived.end = end;
    }
    derived.node = NodeDefaults {
        width: overrides.width.or(base.node.width),
        height: overrides.height.or(base.node.height),
        min_width: overrides.min_width.or(base.node.min_width),
        max_width: overrides.max_width.or(base.node.max_width),
    };
    derived.line = LineDefaults {
        shape: overrides.line_shape.or(base.line.shape),
        style: overrides.line_style.or(base.line.style),
        hide_arrow_to_self: overrides
            .hide_arrow_to_self
            .unwrap_or(base.line.hide_arrow_to_self),
    };
    if let Some(ports) = &overrides.ports {
        derived = derived.with_ports(ports)?;
    }
    Ok(derived)
}

/// All known element types, by name.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: IndexMap<String, Arc<ElementType>>,
    default_node: String,
    default_relation: String,
}

impl TypeRegistry {
    /// Creates an empty registry with the given fallback type names.
    pub fn new(default_node: impl Into<String>, default_relation: impl Into<String>) -> Self {
        Self {
            types: IndexMap::new(),
            default_node: default_node.into(),
            default_relation: default_relation.into(),
        }
    }

    /// Builds the registry described by `config`.
    ///
    /// Basic types are always present. The flowchart types are added when
    /// `initial_types` is set, then every user type in declaration order, so
    /// a user type may derive from one declared before it.
    ///
    /// # Errors
    ///
    /// Returns [`FlowchartError::UnknownType`] when a user type names a base
    /// that does not exist, or any error from [`derive_type`].
    pub fn from_config(config: &ElementConfig) -> Result<Self, FlowchartError> {
        let mut registry = Self::new(config.default_node_type(), config.default_relation_type());
        for element_type in builtin::basic_types()? {
            registry.register(element_type);
        }
        if config.initial_types() {
            for element_type in builtin::flowchart_types(&registry)? {
                registry.register(element_type);
            }
        }
        for definition in config.types() {
            let base = registry
                .get(definition.base())
                .ok_or_else(|| FlowchartError::UnknownType(definition.base().to_string()))?;
            let derived = derive_type(base, definition)?;
            debug!(name = derived.name(), base = definition.base(); "Registered user type");
            registry.register(derived);
        }
        Ok(registry)
    }

    /// Adds or replaces a type.
    pub fn register(&mut self, element_type: ElementType) {
        self.types
            .insert(element_type.name.clone(), Arc::new(element_type));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ElementType>> {
        self.types.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ElementType>> {
        self.types.values()
    }

    /// Resolves `name` to a type of the given kind, falling back to the
    /// configured default for that kind.
    ///
    /// # Errors
    ///
    /// Returns [`FlowchartError::UnknownType`] when neither the named type nor
    /// the fallback exists.
    pub fn resolve(
        &self,
        name: Option<&str>,
        kind: ElementKind,
    ) -> Result<Arc<ElementType>, FlowchartError> {
        if let Some(found) = name.and_then(|n| self.types.get(n)) {
            if found.kind == kind {
                return Ok(Arc::clone(found));
            }
        }
        let fallback = match kind {
            ElementKind::Node => &self.default_node,
            ElementKind::Relation => &self.default_relation,
        };
        match self.types.get(fallback) {
            Some(found) if found.kind == kind => {
                if let Some(name) = name {
                    debug!(name, fallback = fallback.as_str(); "Unknown type, using fallback");
                }
                Ok(Arc::clone(found))
            }
            _ => Err(FlowchartError::UnknownType(
                name.unwrap_or(fallback).to_string(),
            )),
        }
    }

    /// Resolves the type of a raw descriptor.
    ///
    /// A known `type` decides the kind. Otherwise a descriptor with a `to`
    /// key is a relation and anything else is a node.
    ///
    /// # Errors
    ///
    /// See [`TypeRegistry::resolve`].
    pub fn resolve_descriptor(
        &self,
        raw: &Map<String, Value>,
    ) -> Result<Arc<ElementType>, FlowchartError> {
        let name = raw.get("type").and_then(Value::as_str);
        let kind = match name.and_then(|n| self.types.get(n)) {
            Some(found) => found.kind,
            None if raw.contains_key("to") => ElementKind::Relation,
            None => ElementKind::Node,
        };
        self.resolve(name, kind)
    }
}

#[cfg(test)]
mod tests {
    use flowchart_core::geometry::Side;

    use super::*;
    use crate::port::SidePorts;

    fn registry() -> TypeRegistry {
        TypeRegistry::from_config(&ElementConfig::default()).unwrap()
    }

    #[test]
    fn test_builtin_flowchart_types() {
        let registry = registry();
        for name in [
            "action",
            "judge",
            "result",
            "connection",
            "point",
            "start",
            "stop",
            "relation",
        ] {
            let element_type = registry.get(name).unwrap();
            assert!(!element_type.is_internal(), "{name} should be public");
        }
        assert!(registry.get("rectangle").unwrap().is_internal());
        assert!(registry.get("start").unwrap().is_begin());
        assert!(registry.get("stop").unwrap().is_end());
        assert!(registry.get("relation").unwrap().is_relation());
        assert!(
            registry
                .get("connection")
                .unwrap()
                .line_defaults()
                .hide_arrow_to_self()
        );
    }

    #[test]
    fn test_action_ports() {
        let registry = registry();
        let ports = registry.get("action").unwrap().ports().unwrap();
        assert_eq!(ports.side(Side::Top).count(), 3);
        assert_eq!(ports.side(Side::Left).count(), 1);
        assert!(ports.get("bottom3").is_some());
    }

    #[test]
    fn test_resolve_falls_back_by_kind() {
        let registry = registry();
        let node = registry.resolve(Some("nope"), ElementKind::Node).unwrap();
        assert_eq!(node.name(), "action");
        let relation = registry
            .resolve(Some("action"), ElementKind::Relation)
            .unwrap();
        assert_eq!(relation.name(), "relation");
    }

    #[test]
    fn test_resolve_without_fallback_fails() {
        let config: ElementConfig = serde_json::from_value(serde_json::json!({
            "initial_types": false
        }))
        .unwrap();
        let registry = TypeRegistry::from_config(&config).unwrap();
        assert!(matches!(
            registry.resolve(Some("judge"), ElementKind::Node),
            Err(FlowchartError::UnknownType(name)) if name == "judge"
        ));
    }

    #[test]
    fn test_resolve_descriptor_kind() {
        let registry = registry();
        let raw = serde_json::json!({"from": "a", "to": "b"});
        let resolved = registry
            .resolve_descriptor(raw.as_object().unwrap())
            .unwrap();
        assert!(resolved.is_relation());

        let raw = serde_json::json!({"type": "judge", "to": "b"});
        let resolved = registry
            .resolve_descriptor(raw.as_object().unwrap())
            .unwrap();
        assert_eq!(resolved.name(), "judge");
    }

    #[test]
    fn test_user_type_derivation() {
        let config = ElementConfig::default().with_types(vec![
            TypeDefinition::new("approve", "judge")
                .with_display_name("Approve?")
                .with_ports(
                    PortTemplate::default().with_side(Side::Left, SidePorts::Count(2)),
                ),
            TypeDefinition::new("approve-wide", "approve").with_size(160.0, 60.0),
        ]);
        let registry = TypeRegistry::from_config(&config).unwrap();
        let approve = registry.get("approve").unwrap();
        assert_eq!(approve.shape(), "diamond");
        assert_eq!(approve.display_name(), Some("Approve?"));
        assert!(approve.ports().unwrap().get("left2").is_some());
        assert!(approve.ports().unwrap().get("top1").is_none());

        let wide = registry.get("approve-wide").unwrap();
        assert_eq!(wide.node_defaults().width(), Some(160.0));
        assert!(wide.ports().unwrap().get("left2").is_some());
    }

    #[test]
    fn test_user_type_unknown_base() {
        let config =
            ElementConfig::default().with_types(vec![TypeDefinition::new("x", "missing")]);
        assert!(matches!(
            TypeRegistry::from_config(&config),
            Err(FlowchartError::UnknownType(_))
        ));
    }

    #[test]
    fn test_derive_type_rejects_reserved_name() {
        let registry = registry();
        let base = registry.get("action").unwrap();
        assert!(derive_type(base, &TypeDefinition::new("a.b", "action")).is_err());
    }
}
