//! Flat element export and type export.
//!
//! [`export_elements`] reconstructs one descriptor per live element from its
//! current properties, in `order`, so that feeding the result back through
//! `reset_data` reproduces the chart. [`export_types`] describes the
//! registered types for palettes and editors.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value, json};

use flowchart_core::geometry::Side;

use crate::{
    element::{Element, ElementBody},
    error::FlowchartError,
    port::PortExport,
    store::ElementStore,
    types::{ElementType, TypeRegistry},
};

/// Exports every live element as a descriptor, sorted by `order`.
///
/// The `order` field is stripped. Nodes carry their current position as
/// `{left, top}`; relations carry `position.shape` only when the user moved
/// their control points. With `flatten_data`, the `data` bag is merged into
/// the top-level record without overwriting typed fields.
///
/// # Errors
///
/// Returns [`FlowchartError::Serialization`] if a property fails to
/// serialize.
pub fn export_elements(
    store: &ElementStore,
    flatten_data: bool,
) -> Result<Vec<Map<String, Value>>, FlowchartError> {
    let mut elements: Vec<&Element> = store.iter().collect();
    elements.sort_by_key(|e| e.order());
    elements
        .into_iter()
        .map(|element| export_element(element, flatten_data))
        .collect()
}

/// Exports a single element. See [`export_elements`].
///
/// # Errors
///
/// Returns [`FlowchartError::Serialization`] if a property fails to
/// serialize.
pub fn export_element(
    element: &Element,
    flatten_data: bool,
) -> Result<Map<String, Value>, FlowchartError> {
    let mut record = to_map(element.common())?;
    record.remove("order");

    match element.body() {
        ElementBody::Node(node) => {
            record.extend(to_map(node.props())?);
            if let Some(position) = node.layout().position() {
                record.insert(
                    "position".to_string(),
                    json!({"left": position.x(), "top": position.y()}),
                );
            } else if let Some(pending) = node.layout().pending() {
                record.insert("position".to_string(), serde_json::to_value(pending)?);
            }
        }
        ElementBody::Relation(relation) => {
            record.extend(to_map(relation.props())?);
            if relation.is_custom() {
                record.insert(
                    "position".to_string(),
                    json!({"shape": serde_json::to_value(relation.offsets())?}),
                );
            }
        }
    }

    if flatten_data {
        if let Some(Value::Object(data)) = record.remove("data") {
            for (key, value) in data {
                record.entry(key).or_insert(value);
            }
        }
    }
    Ok(record)
}

fn to_map<T: Serialize>(value: &T) -> Result<Map<String, Value>, FlowchartError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

/// Exported description of one element type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeExport {
    name: String,
    shape: String,
    is_relation: bool,
    is_node: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    ports: IndexMap<Side, Vec<PortExport>>,
}

impl TypeExport {
    fn new(element_type: &ElementType, include_internal: bool) -> Self {
        let mut ports = IndexMap::new();
        if let Some(map) = element_type.ports() {
            for side in Side::ALL {
                let side_ports: Vec<PortExport> = map
                    .side(side)
                    .filter(|port| include_internal || !port.is_empty())
                    .map(|port| port.export())
                    .collect();
                if !side_ports.is_empty() {
                    ports.insert(side, side_ports);
                }
            }
        }
        Self {
            name: element_type.name().to_string(),
            shape: element_type.shape().to_string(),
            is_relation: element_type.is_relation(),
            is_node: element_type.is_node(),
            display_name: element_type.display_name().map(str::to_string),
            ports,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ports(&self, side: Side) -> &[PortExport] {
        self.ports.get(&side).map_or(&[], Vec::as_slice)
    }
}

/// Describes the registered types. Internal building blocks and space-only
/// ports are left out unless `include_internal` is set.
pub fn export_types(registry: &TypeRegistry, include_internal: bool) -> Vec<TypeExport> {
    registry
        .iter()
        .filter(|t| include_internal || !t.is_internal())
        .map(|t| TypeExport::new(t, include_internal))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        config::ElementConfig,
        port::{PortSpec, PortTemplate, SidePorts},
        types::TypeDefinition,
    };

    fn registry() -> TypeRegistry {
        TypeRegistry::from_config(&ElementConfig::default()).unwrap()
    }

    fn store_with(registry: &TypeRegistry, descriptors: Value) -> ElementStore {
        let mut store = ElementStore::new("flow-");
        let Value::Array(items) = descriptors else {
            panic!("descriptors must be an array");
        };
        for item in items {
            let Value::Object(map) = item else {
                panic!("descriptor must be an object");
            };
            store.insert(registry, map).unwrap();
        }
        store
    }

    #[test]
    fn test_export_strips_order_and_sorts() {
        let registry = registry();
        let store = store_with(
            &registry,
            json!([
                {"id": "r", "from": "a", "to": "b"},
                {"id": "a", "text": "Start", "position": {"left": 10, "top": 20}},
                {"id": "b"},
            ]),
        );
        let exported = export_elements(&store, true).unwrap();
        let ids: Vec<&str> = exported.iter().map(|e| e["id"].as_str().unwrap()).collect();
        assert_eq!(ids, ["a", "b", "r"]);
        assert!(exported.iter().all(|e| !e.contains_key("order")));
        assert_eq!(exported[0]["position"], json!({"left": 10.0, "top": 20.0}));
        assert!(!exported[1].contains_key("position"));
        assert!(!exported[2].contains_key("position"));
    }

    #[test]
    fn test_export_flattens_data() {
        let registry = registry();
        let store = store_with(&registry, json!([{"id": "a", "owner": "ops", "text": "x"}]));
        let flat = export_elements(&store, true).unwrap();
        assert_eq!(flat[0]["owner"], json!("ops"));
        assert!(!flat[0].contains_key("data"));

        let nested = export_elements(&store, false).unwrap();
        assert_eq!(nested[0]["data"], json!({"owner": "ops"}));
    }

    #[test]
    fn test_export_custom_relation_shape() {
        let registry = registry();
        let store = store_with(
            &registry,
            json!([
                {"id": "a"},
                {"id": "b"},
                {"id": "r", "from": "a", "to": "b", "lineShape": "polyline",
                 "position": {"shape": {"porX": 0.5}}},
            ]),
        );
        let exported = export_elements(&store, true).unwrap();
        assert_eq!(exported[2]["position"]["shape"]["porX"], json!(0.5));
        assert_eq!(exported[2]["lineShape"], json!("polyline"));
    }

    #[test]
    fn test_export_types_hides_internal() {
        let registry = registry();
        let public = export_types(&registry, false);
        let names: Vec<&str> = public.iter().map(TypeExport::name).collect();
        assert!(names.contains(&"action"));
        assert!(!names.contains(&"rectangle"));

        let all = export_types(&registry, true);
        assert!(all.iter().any(|t| t.name() == "rectangle"));

        let action = public.iter().find(|t| t.name() == "action").unwrap();
        let top: Vec<_> = action.ports(Side::Top).iter().map(|p| p.name()).collect();
        assert_eq!(top, [Some("top1"), Some("top2"), Some("top3")]);
        let value = serde_json::to_value(action).unwrap();
        assert_eq!(value["isNode"], json!(true));
        assert_eq!(value["displayName"], json!("Action"));
    }

    #[test]
    fn test_export_types_drops_space_only_ports() {
        let template = PortTemplate::default().with_side(
            Side::Bottom,
            SidePorts::List(vec![
                PortSpec::Space(1.0),
                PortSpec::Name("out".to_string()),
            ]),
        );
        let config = ElementConfig::default()
            .with_types(vec![TypeDefinition::new("gate", "action").with_ports(template)]);
        let registry = TypeRegistry::from_config(&config).unwrap();

        let public = export_types(&registry, false);
        let gate = public.iter().find(|t| t.name() == "gate").unwrap();
        assert_eq!(gate.ports(Side::Bottom).len(), 1);

        let all = export_types(&registry, true);
        let gate = all.iter().find(|t| t.name() == "gate").unwrap();
        assert_eq!(gate.ports(Side::Bottom).len(), 2);
    }
}
