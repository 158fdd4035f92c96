//! Configuration types for the flowchart engine.
//!
//! All types implement [`serde::Deserialize`] so a configuration can be
//! loaded from TOML (the CLI) or JSON (embedders). Every field has a
//! default, so partial documents are fine.
//!
//! # Overview
//!
//! - [`AppConfig`] - Top-level configuration combining the sections below.
//! - [`LayoutConfig`] - Automatic layout spacing, node sizing and grid snapping.
//! - [`RelationConfig`] - Default line style, shape and arrows for relations.
//! - [`PortConfig`] - Port geometry and repeatable-port policies.
//! - [`ElementConfig`] - Default types, id generation, export and user types.
//!
//! # Example
//!
//! ```
//! # use flowchart::config::{AppConfig, LayoutDirection};
//! let config = AppConfig::default();
//! assert_eq!(config.layout().direction(), LayoutDirection::Vertical);
//! assert_eq!(config.layout().vertical_space(), 60.0);
//! assert_eq!(config.elements().default_node_type(), "action");
//! ```

use serde::Deserialize;

use flowchart_core::{color::Color, draw::StrokeStyle};

use crate::{
    port::{RestCollision, RestPlaceholder},
    route::LineShape,
    types::TypeDefinition,
};

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    layout: LayoutConfig,

    #[serde(default)]
    relation: RelationConfig,

    #[serde(default)]
    ports: PortConfig,

    #[serde(default)]
    elements: ElementConfig,
}

impl AppConfig {
    /// Creates a new [`AppConfig`] from its sections.
    pub fn new(
        layout: LayoutConfig,
        relation: RelationConfig,
        ports: PortConfig,
        elements: ElementConfig,
    ) -> Self {
        Self {
            layout,
            relation,
            ports,
            elements,
        }
    }

    /// Returns the layout configuration.
    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    /// Returns the relation line configuration.
    pub fn relation(&self) -> &RelationConfig {
        &self.relation
    }

    /// Returns the port configuration.
    pub fn ports(&self) -> &PortConfig {
        &self.ports
    }

    /// Returns the element configuration.
    pub fn elements(&self) -> &ElementConfig {
        &self.elements
    }
}

/// Main axis of the automatic tree layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutDirection {
    /// Depth grows downward; siblings are packed left to right.
    #[default]
    #[serde(alias = "vert")]
    Vertical,
    /// Depth grows rightward; siblings are packed top to bottom.
    #[serde(alias = "horz")]
    Horizontal,
}

/// Automatic layout parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    direction: LayoutDirection,
    horizontal_space: f32,
    vertical_space: f32,
    padding: f32,
    node_height: f32,
    node_min_width: f32,
    node_max_width: f32,
    text_padding: f32,
    font_size: f32,
    grid: f32,
    max_overlap_passes: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            direction: LayoutDirection::Vertical,
            horizontal_space: 80.0,
            vertical_space: 60.0,
            padding: 20.0,
            node_height: 40.0,
            node_min_width: 70.0,
            node_max_width: 200.0,
            text_padding: 10.0,
            font_size: 14.0,
            grid: 5.0,
            max_overlap_passes: 256,
        }
    }
}

impl LayoutConfig {
    pub fn direction(&self) -> LayoutDirection {
        self.direction
    }

    /// Gap between nodes along the x axis.
    pub fn horizontal_space(&self) -> f32 {
        self.horizontal_space
    }

    /// Gap between nodes along the y axis.
    pub fn vertical_space(&self) -> f32 {
        self.vertical_space
    }

    /// Canvas padding; also the origin of the first depth row/column.
    pub fn padding(&self) -> f32 {
        self.padding
    }

    pub fn node_height(&self) -> f32 {
        self.node_height
    }

    pub fn node_min_width(&self) -> f32 {
        self.node_min_width
    }

    pub fn node_max_width(&self) -> f32 {
        self.node_max_width
    }

    /// Horizontal padding added on each side of a measured label.
    pub fn text_padding(&self) -> f32 {
        self.text_padding
    }

    pub fn font_size(&self) -> f32 {
        self.font_size
    }

    /// Snap size for final node coordinates; `0` disables snapping.
    pub fn grid(&self) -> f32 {
        self.grid
    }

    /// Upper bound on overlap-resolution sweeps per layout pass.
    pub fn max_overlap_passes(&self) -> usize {
        self.max_overlap_passes
    }

    /// Returns a copy laid out along `direction`.
    pub fn with_direction(mut self, direction: LayoutDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Returns a copy with the given snap size.
    pub fn with_grid(mut self, grid: f32) -> Self {
        self.grid = grid;
        self
    }
}

/// Default appearance of relation lines.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelationConfig {
    line_style: StrokeStyle,
    line_shape: LineShape,
    line_width: f32,
    line_color: String,
    arrow_size: f32,
    curvature: f32,
    hide_arrow_to_result: bool,
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self {
            line_style: StrokeStyle::Solid,
            line_shape: LineShape::Straight,
            line_width: 1.0,
            line_color: "#333".to_string(),
            arrow_size: 8.0,
            curvature: 0.8,
            hide_arrow_to_result: true,
        }
    }
}

impl RelationConfig {
    pub fn line_style(&self) -> StrokeStyle {
        self.line_style
    }

    pub fn line_shape(&self) -> LineShape {
        self.line_shape
    }

    pub fn line_width(&self) -> f32 {
        self.line_width
    }

    /// Returns the parsed default line [`Color`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configured color string is not a CSS color.
    pub fn line_color(&self) -> Result<Color, String> {
        Color::new(&self.line_color).map_err(|err| format!("Invalid line color in config: {err}"))
    }

    pub fn arrow_size(&self) -> f32 {
        self.arrow_size
    }

    /// Bezier curvature, as a fraction of the bounding extent.
    pub fn curvature(&self) -> f32 {
        self.curvature
    }

    /// Suppresses the end arrow on relations that point at a `result` node.
    pub fn hide_arrow_to_result(&self) -> bool {
        self.hide_arrow_to_result
    }

    /// Returns a copy drawing relations with `shape` by default.
    pub fn with_line_shape(mut self, shape: LineShape) -> Self {
        self.line_shape = shape;
        self
    }
}

/// Port geometry and matching policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    space_size: f32,
    line_length: f32,
    allow_free_ports: bool,
    rest_placeholder: RestPlaceholder,
    rest_collision: RestCollision,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            space_size: 20.0,
            line_length: 0.0,
            allow_free_ports: false,
            rest_placeholder: RestPlaceholder::Append,
            rest_collision: RestCollision::FirstSeen,
        }
    }
}

impl PortConfig {
    /// Pixels per unit of port `space`.
    pub fn space_size(&self) -> f32 {
        self.space_size
    }

    /// Distance a port anchor sits outside the node edge.
    pub fn line_length(&self) -> f32 {
        self.line_length
    }

    /// Whether `add_relation` accepts endpoints without a port name.
    pub fn allow_free_ports(&self) -> bool {
        self.allow_free_ports
    }

    pub fn rest_placeholder(&self) -> RestPlaceholder {
        self.rest_placeholder
    }

    pub fn rest_collision(&self) -> RestCollision {
        self.rest_collision
    }

    pub fn with_allow_free_ports(mut self, allow: bool) -> Self {
        self.allow_free_ports = allow;
        self
    }

    pub fn with_rest_placeholder(mut self, placeholder: RestPlaceholder) -> Self {
        self.rest_placeholder = placeholder;
        self
    }

    pub fn with_rest_collision(mut self, collision: RestCollision) -> Self {
        self.rest_collision = collision;
        self
    }
}

/// Element defaults and user-declared types.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ElementConfig {
    default_node_type: String,
    default_relation_type: String,
    export_data_to_self: bool,
    id_prefix: String,
    initial_types: bool,
    types: Vec<TypeDefinition>,
}

impl Default for ElementConfig {
    fn default() -> Self {
        Self {
            default_node_type: "action".to_string(),
            default_relation_type: "relation".to_string(),
            export_data_to_self: true,
            id_prefix: "flow-".to_string(),
            initial_types: true,
            types: Vec::new(),
        }
    }
}

impl ElementConfig {
    /// Fallback type for node descriptors naming an unknown type.
    pub fn default_node_type(&self) -> &str {
        &self.default_node_type
    }

    /// Fallback type for relation descriptors naming an unknown type.
    pub fn default_relation_type(&self) -> &str {
        &self.default_relation_type
    }

    /// Whether exported descriptors flatten the `data` bag into the record.
    pub fn export_data_to_self(&self) -> bool {
        self.export_data_to_self
    }

    pub fn id_prefix(&self) -> &str {
        &self.id_prefix
    }

    /// Whether the built-in flowchart types are registered.
    pub fn initial_types(&self) -> bool {
        self.initial_types
    }

    /// User-declared types, registered after the built-in ones.
    pub fn types(&self) -> &[TypeDefinition] {
        &self.types
    }

    pub fn with_export_data_to_self(mut self, flatten: bool) -> Self {
        self.export_data_to_self = flatten;
        self
    }

    pub fn with_types(mut self, types: Vec<TypeDefinition>) -> Self {
        self.types = types;
        self
    }
}
