//! Built-in property tables and element types.

use std::str::FromStr;

use serde_json::{Value, json};

use flowchart_core::{draw::StrokeStyle, geometry::Side};

use super::{
    ElementKind, ElementType, NormalizeContext as _, Primitive, PropRule, PropTable,
    TypeDefinition, TypeRegistry, derive_type,
};
use crate::{
    element::ArrowMode,
    error::FlowchartError,
    port::{PortTemplate, SidePorts},
    reference::{parse_endpoint, validate_id},
    route::LineShape,
};

fn id_rule() -> PropRule {
    PropRule::computed(|input, ctx| {
        let id = match input.value {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => ctx.generate_id(),
        };
        validate_id(&id)?;
        Ok(Some(Value::String(id)))
    })
}

fn type_rule() -> PropRule {
    PropRule::computed(|input, _| Ok(Some(Value::String(input.element_type.name().to_string()))))
}

fn order_rule() -> PropRule {
    PropRule::computed(|input, ctx| {
        let existing = input
            .resolved
            .get("id")
            .and_then(Value::as_str)
            .and_then(|id| ctx.order_of(id));
        let order = match existing {
            Some(order) => order,
            None => ctx.next_order(input.element_type.kind()),
        };
        Ok(Some(Value::from(order)))
    })
}

fn text_rule() -> PropRule {
    PropRule::computed(|input, _| {
        let text = input
            .value
            .and_then(|v| Primitive::String.coerce(v))
            .or_else(|| input.element_type.default_text().map(Value::from));
        Ok(text)
    })
}

/// Accepts a value that parses as `T`, rejecting anything else.
fn parsed_rule<T: FromStr<Err = String> + 'static>(field: &'static str) -> PropRule {
    PropRule::computed(move |input, _| match input.value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => T::from_str(s)
            .map(|_| Some(Value::String(s.clone())))
            .map_err(|reason| FlowchartError::invalid_value(field, reason)),
        Some(other) => Err(FlowchartError::invalid_value(
            field,
            format!("expected a string, got `{other}`"),
        )),
    })
}

fn number_of(value: Option<&Value>) -> Option<f64> {
    Primitive::Float.coerce(value?)?.as_f64()
}

/// Keeps a node position only if it has one of the recognized shapes.
fn node_position_rule() -> PropRule {
    PropRule::computed(|input, _| {
        let Some(Value::Object(position)) = input.value else {
            return Ok(None);
        };
        if let (Some(left), Some(top)) = (
            number_of(position.get("left")),
            number_of(position.get("top")),
        ) {
            return Ok(Some(json!({"left": left, "top": top})));
        }
        if let (Some(left), Some(top)) = (
            number_of(position.get("centerLeft")),
            number_of(position.get("centerTop")),
        ) {
            return Ok(Some(json!({"centerLeft": left, "centerTop": top})));
        }
        let direction = position
            .get("direction")
            .and_then(Value::as_str)
            .and_then(|d| Side::from_str(d).ok());
        let from = position.get("from").and_then(Value::as_str);
        Ok(match (direction, from) {
            (Some(direction), Some(from)) => Some(json!({"direction": direction, "from": from})),
            _ => None,
        })
    })
}

fn relation_position_rule() -> PropRule {
    PropRule::computed(|input, _| {
        Ok(input
            .value
            .and_then(Value::as_object)
            .and_then(|position| position.get("shape"))
            .filter(|shape| shape.is_object())
            .map(|shape| json!({"shape": shape})))
    })
}

fn endpoint_rule(key: &'static str) -> PropRule {
    PropRule::computed(move |input, _| {
        let reference = input.value.and_then(Value::as_str).ok_or_else(|| {
            FlowchartError::InvalidRelation(format!("relation is missing `{key}`"))
        })?;
        let endpoint = parse_endpoint(reference)?;
        Ok(Some(Value::String(endpoint.node().to_string())))
    })
}

/// Explicit port name, else the `.port` suffix of the endpoint reference.
fn endpoint_port_rule(endpoint_key: &'static str) -> PropRule {
    PropRule::computed(move |input, _| {
        if let Some(port) = input.value.and_then(Value::as_str).filter(|p| !p.is_empty()) {
            return Ok(Some(Value::String(port.to_string())));
        }
        let suffix = input
            .raw
            .get(endpoint_key)
            .and_then(Value::as_str)
            .and_then(|reference| parse_endpoint(reference).ok())
            .and_then(|endpoint| endpoint.port())
            .map(|port| Value::String(port.to_string()));
        Ok(suffix)
    })
}

fn show_arrow_rule() -> PropRule {
    PropRule::computed(|input, _| match input.value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value::<ArrowMode>(value.clone())
            .map(|_| Some(value.clone()))
            .map_err(|err| FlowchartError::invalid_value("showArrow", err.to_string())),
    })
}

fn hide_arrow_rule() -> PropRule {
    PropRule::computed(|input, _| {
        if let Some(hide) = input.value.and_then(|v| Primitive::Bool.coerce(v)) {
            return Ok(Some(hide));
        }
        let zero_arrow = input
            .resolved
            .get("arrowSize")
            .and_then(Value::as_f64)
            .is_some_and(|size| size == 0.0);
        Ok(zero_arrow.then_some(Value::Bool(true)))
    })
}

/// Properties every element has.
pub(super) fn common_props() -> PropTable {
    PropTable::new()
        .with("id", id_rule())
        .with("type", type_rule())
        .with("order", order_rule())
        .with("text", text_rule())
        .with("data", PropRule::Coerce(Primitive::Object))
        .with("style", PropRule::Coerce(Primitive::Object))
        .with("textStyle", PropRule::Coerce(Primitive::Object))
        .with("className", PropRule::Coerce(Primitive::String))
        .with("hidden", PropRule::Coerce(Primitive::Bool))
}

pub(super) fn node_props() -> PropTable {
    common_props().merged(
        &PropTable::new()
            .with("isNode", PropRule::Hidden(Value::Bool(true)))
            .with("position", node_position_rule())
            .with("width", PropRule::Coerce(Primitive::Float))
            .with("height", PropRule::Coerce(Primitive::Float))
            .with("minWidth", PropRule::Coerce(Primitive::Float))
            .with("maxWidth", PropRule::Coerce(Primitive::Float))
            .with("shapeStyle", PropRule::Coerce(Primitive::Object))
            .with("borderStyle", parsed_rule::<StrokeStyle>("borderStyle"))
            .with("borderWidth", PropRule::Coerce(Primitive::Float))
            .with("borderColor", PropRule::Coerce(Primitive::String)),
    )
}

pub(super) fn relation_props() -> PropTable {
    common_props().merged(
        &PropTable::new()
            .with("isRelation", PropRule::Hidden(Value::Bool(true)))
            .with("from", endpoint_rule("from"))
            .with("to", endpoint_rule("to"))
            .with("fromPort", endpoint_port_rule("from"))
            .with("toPort", endpoint_port_rule("to"))
            .with("lineStyle", parsed_rule::<StrokeStyle>("lineStyle"))
            .with("lineWidth", PropRule::Coerce(Primitive::Float))
            .with("lineColor", PropRule::Coerce(Primitive::String))
            .with("lineShape", parsed_rule::<LineShape>("lineShape"))
            .with("arrowSize", PropRule::Coerce(Primitive::Float))
            .with("showArrow", show_arrow_rule())
            .with("hideArrow", hide_arrow_rule())
            .with("position", relation_position_rule()),
    )
}

fn box_ports() -> PortTemplate {
    PortTemplate::default()
        .with_side(Side::Top, SidePorts::Count(3))
        .with_side(Side::Right, SidePorts::Count(1))
        .with_side(Side::Bottom, SidePorts::Count(3))
        .with_side(Side::Left, SidePorts::Count(1))
}

/// Internal building blocks the public types derive from.
pub(super) fn basic_types() -> Result<Vec<ElementType>, FlowchartError> {
    let node = |name: &str, shape: &str| {
        ElementType::new(name, ElementKind::Node, shape, node_props()).with_internal(true)
    };
    Ok(vec![
        ElementType::new("relation", ElementKind::Relation, "line", relation_props())
            .with_internal(true),
        node("rectangle", "rect").with_ports(&box_ports())?,
        node("box", "box").with_ports(&box_ports())?,
        node("diamond", "diamond").with_ports(&PortTemplate::uniform(1))?,
        node("circle", "circle")
            .with_min_width(40.0)
            .with_ports(&PortTemplate::uniform(1))?,
        node("connection", "circle")
            .with_size(Some(20.0), Some(20.0))
            .with_hide_arrow_to_self(true)
            .with_ports(&PortTemplate::uniform(1))?,
        node("dot", "dot")
            .with_size(Some(16.0), Some(16.0))
            .with_ports(&PortTemplate::uniform(1))?,
    ])
}

/// The public flowchart vocabulary.
pub(super) fn flowchart_types(registry: &TypeRegistry) -> Result<Vec<ElementType>, FlowchartError> {
    let definitions = [
        TypeDefinition::new("action", "rectangle").with_display_name("Action"),
        TypeDefinition::new("judge", "diamond").with_display_name("Judge"),
        TypeDefinition::new("result", "circle").with_display_name("Result"),
        TypeDefinition::new("connection", "connection").with_display_name("Connection"),
        TypeDefinition::new("point", "dot").with_display_name("Point"),
        TypeDefinition::new("start", "box")
            .with_display_name("Start")
            .with_begin(),
        TypeDefinition::new("stop", "box")
            .with_display_name("Stop")
            .with_end(),
        TypeDefinition::new("relation", "relation").with_display_name("Relation"),
    ];
    definitions
        .iter()
        .map(|definition| {
            let base = registry
                .get(definition.base())
                .ok_or_else(|| FlowchartError::UnknownType(definition.base().to_string()))?;
            derive_type(base, definition)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::*;
    use crate::types::NormalizeContext;

    struct Fixed;

    impl NormalizeContext for Fixed {
        fn generate_id(&mut self) -> String {
            "flow-1".to_string()
        }

        fn order_of(&self, id: &str) -> Option<u64> {
            (id == "kept").then_some(3)
        }

        fn next_order(&mut self, kind: ElementKind) -> u64 {
            match kind {
                ElementKind::Node => 1,
                ElementKind::Relation => 10_001,
            }
        }
    }

    fn normalize(element_type: &ElementType, raw: Value) -> Result<Map<String, Value>, FlowchartError> {
        element_type.normalize(raw.as_object().unwrap(), &mut Fixed)
    }

    fn node_type() -> ElementType {
        ElementType::new("n", ElementKind::Node, "rect", node_props())
    }

    fn relation_type() -> ElementType {
        ElementType::new("r", ElementKind::Relation, "line", relation_props())
    }

    #[test]
    fn test_node_generated_id_and_order() {
        let out = normalize(&node_type(), json!({"text": 12})).unwrap();
        assert_eq!(out["id"], json!("flow-1"));
        assert_eq!(out["type"], json!("n"));
        assert_eq!(out["order"], json!(1));
        assert_eq!(out["text"], json!("12"));
        assert_eq!(out["isNode"], json!(true));
    }

    #[test]
    fn test_existing_id_keeps_order() {
        let out = normalize(&node_type(), json!({"id": "kept"})).unwrap();
        assert_eq!(out["order"], json!(3));
    }

    #[test]
    fn test_invalid_id_rejected() {
        assert!(matches!(
            normalize(&node_type(), json!({"id": "a.b"})),
            Err(FlowchartError::InvalidId { .. })
        ));
    }

    #[test]
    fn test_node_position_shapes() {
        let out = normalize(&node_type(), json!({"position": {"left": "10", "top": 20}})).unwrap();
        assert_eq!(out["position"], json!({"left": 10.0, "top": 20.0}));

        let out = normalize(
            &node_type(),
            json!({"position": {"direction": "right", "from": "a"}}),
        )
        .unwrap();
        assert_eq!(out["position"], json!({"direction": "right", "from": "a"}));

        let out = normalize(&node_type(), json!({"position": {"left": 1}})).unwrap();
        assert!(!out.contains_key("position"));
    }

    #[test]
    fn test_relation_endpoints() {
        let out = normalize(
            &relation_type(),
            json!({"from": "a.bottom1", "to": "b", "toPort": "top2"}),
        )
        .unwrap();
        assert_eq!(out["from"], json!("a"));
        assert_eq!(out["fromPort"], json!("bottom1"));
        assert_eq!(out["to"], json!("b"));
        assert_eq!(out["toPort"], json!("top2"));
        assert_eq!(out["order"], json!(10_001));
    }

    #[test]
    fn test_explicit_port_wins_over_suffix() {
        let out = normalize(
            &relation_type(),
            json!({"from": "a.bottom1", "fromPort": "right1", "to": "b"}),
        )
        .unwrap();
        assert_eq!(out["fromPort"], json!("right1"));
    }

    #[test]
    fn test_relation_requires_endpoints() {
        assert!(matches!(
            normalize(&relation_type(), json!({"from": "a"})),
            Err(FlowchartError::InvalidRelation(_))
        ));
    }

    #[test]
    fn test_hide_arrow_defaults_from_arrow_size() {
        let out = normalize(&relation_type(), json!({"from": "a", "to": "b", "arrowSize": 0})).unwrap();
        assert_eq!(out["hideArrow"], json!(true));
        let out = normalize(&relation_type(), json!({"from": "a", "to": "b", "arrowSize": 6})).unwrap();
        assert!(!out.contains_key("hideArrow"));
    }

    #[test]
    fn test_invalid_line_shape_rejected() {
        assert!(normalize(
            &relation_type(),
            json!({"from": "a", "to": "b", "lineShape": "zigzag"})
        )
        .is_err());
    }

    #[test]
    fn test_show_arrow_forms() {
        let out = normalize(&relation_type(), json!({"from": "a", "to": "b", "showArrow": "both"})).unwrap();
        assert_eq!(out["showArrow"], json!("both"));
        assert!(normalize(&relation_type(), json!({"from": "a", "to": "b", "showArrow": "up"})).is_err());
    }

    #[test]
    fn test_relation_position_keeps_shape() {
        let out = normalize(
            &relation_type(),
            json!({"from": "a", "to": "b", "position": {"shape": {"porX": 0.2}, "left": 3}}),
        )
        .unwrap();
        assert_eq!(out["position"], json!({"shape": {"porX": 0.2}}));
    }
}
