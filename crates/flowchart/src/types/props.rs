//! Property derivation tables.
//!
//! A [`PropTable`] maps wire property names to [`PropRule`]s and is evaluated
//! in declaration order, so a computed rule can read what earlier rules
//! already resolved. Raw keys the table does not know are merged into the
//! `data` bag.

use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use log::trace;
use serde_json::{Map, Number, Value};

use super::{ElementKind, ElementType};
use crate::error::FlowchartError;

/// Services a computed rule may need from the element store.
pub trait NormalizeContext {
    /// Returns a fresh id that is not used by any live element.
    fn generate_id(&mut self) -> String;

    /// Order of the live element with this id.
    fn order_of(&self, id: &str) -> Option<u64>;

    /// Takes the next creation order for an element of `kind`.
    fn next_order(&mut self, kind: ElementKind) -> u64;
}

/// Inputs handed to a computed rule.
pub struct PropInput<'a> {
    /// Raw value under the rule's own key.
    pub value: Option<&'a Value>,
    pub element_type: &'a ElementType,
    /// The whole raw descriptor.
    pub raw: &'a Map<String, Value>,
    /// Values resolved by the rules evaluated so far.
    pub resolved: &'a Map<String, Value>,
}

pub type ComputeFn = dyn Fn(&PropInput<'_>, &mut dyn NormalizeContext) -> Result<Option<Value>, FlowchartError>
    + Send
    + Sync;

/// Target of a primitive coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Int,
    Float,
    Bool,
    String,
    /// Shallow copy of an object.
    Object,
}

impl Primitive {
    /// Coerces `value`; `None` when it cannot be represented.
    pub fn coerce(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (_, Value::Null) => None,
            (Self::Int, Value::Number(n)) => n.as_f64().map(|f| Value::from(f.trunc() as i64)),
            (Self::Int, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            (Self::Int, Value::Bool(b)) => Some(Value::from(i64::from(*b))),
            (Self::Float, Value::Number(_)) => Some(value.clone()),
            (Self::Float, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            (Self::Bool, Value::Bool(_)) => Some(value.clone()),
            (Self::Bool, Value::String(s)) => match s.as_str() {
                "true" => Some(Value::Bool(true)),
                "false" | "" => Some(Value::Bool(false)),
                _ => None,
            },
            (Self::Bool, Value::Number(n)) => n.as_f64().map(|f| Value::Bool(f != 0.0)),
            (Self::String, Value::String(_)) => Some(value.clone()),
            (Self::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (Self::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
            (Self::Object, Value::Object(_)) => Some(value.clone()),
            _ => None,
        }
    }
}

/// How one property is derived from a raw descriptor.
#[derive(Clone)]
pub enum PropRule {
    /// A fixed internal value; never read from input and never exported.
    Hidden(Value),
    Coerce(Primitive),
    Computed(Arc<ComputeFn>),
}

impl PropRule {
    pub fn computed(
        f: impl Fn(&PropInput<'_>, &mut dyn NormalizeContext) -> Result<Option<Value>, FlowchartError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self::Computed(Arc::new(f))
    }
}

impl fmt::Debug for PropRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hidden(value) => f.debug_tuple("Hidden").field(value).finish(),
            Self::Coerce(primitive) => f.debug_tuple("Coerce").field(primitive).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Ordered property rules of a type.
#[derive(Debug, Clone, Default)]
pub struct PropTable {
    rules: IndexMap<String, PropRule>,
}

impl PropTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, rule: PropRule) -> Self {
        self.rules.insert(key.into(), rule);
        self
    }

    pub fn get(&self, key: &str) -> Option<&PropRule> {
        self.rules.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.rules.contains_key(key)
    }

    /// Keys whose values are internal constants.
    pub fn hidden_keys(&self) -> impl Iterator<Item = &str> {
        self.rules
            .iter()
            .filter(|(_, rule)| matches!(rule, PropRule::Hidden(_)))
            .map(|(key, _)| key.as_str())
    }

    /// Composes two tables. Rules of `other` replace same-named rules in
    /// place; new keys are appended.
    pub fn merged(&self, other: &PropTable) -> PropTable {
        let mut rules = self.rules.clone();
        for (key, rule) in &other.rules {
            rules.insert(key.clone(), rule.clone());
        }
        PropTable { rules }
    }

    /// Evaluates every rule against `raw`.
    ///
    /// # Errors
    ///
    /// Propagates errors raised by computed rules.
    pub fn normalize(
        &self,
        raw: &Map<String, Value>,
        element_type: &ElementType,
        ctx: &mut dyn NormalizeContext,
    ) -> Result<Map<String, Value>, FlowchartError> {
        let mut resolved = Map::new();
        for (key, rule) in &self.rules {
            let value = raw.get(key);
            let derived = match rule {
                PropRule::Hidden(constant) => Some(constant.clone()),
                PropRule::Coerce(primitive) => value.and_then(|v| {
                    let coerced = primitive.coerce(v);
                    if coerced.is_none() {
                        trace!(key = key.as_str(), value:% = v; "Dropped uncoercible value");
                    }
                    coerced
                }),
                PropRule::Computed(compute) => {
                    let input = PropInput {
                        value,
                        element_type,
                        raw,
                        resolved: &resolved,
                    };
                    compute(&input, ctx)?
                }
            };
            if let Some(derived) = derived {
                resolved.insert(key.clone(), derived);
            }
        }

        let extra: Vec<_> = raw
            .iter()
            .filter(|(key, _)| !self.rules.contains_key(key.as_str()))
            .collect();
        if !extra.is_empty() {
            let data = resolved
                .entry("data")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(data) = data {
                for (key, value) in extra {
                    data.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct Counter {
        next: u64,
    }

    impl NormalizeContext for Counter {
        fn generate_id(&mut self) -> String {
            self.next += 1;
            format!("gen-{}", self.next)
        }

        fn order_of(&self, _id: &str) -> Option<u64> {
            None
        }

        fn next_order(&mut self, _kind: ElementKind) -> u64 {
            self.next += 1;
            self.next
        }
    }

    fn table() -> PropTable {
        PropTable::new()
            .with("kind", PropRule::Hidden(json!("node")))
            .with("width", PropRule::Coerce(Primitive::Float))
            .with("count", PropRule::Coerce(Primitive::Int))
            .with(
                "double",
                PropRule::computed(|input, _| {
                    Ok(input
                        .resolved
                        .get("width")
                        .and_then(Value::as_f64)
                        .map(|w| json!(w * 2.0)))
                }),
            )
            .with("data", PropRule::Coerce(Primitive::Object))
    }

    fn element_type() -> ElementType {
        ElementType::new("test", ElementKind::Node, "rect", table())
    }

    #[test]
    fn test_primitive_coercions() {
        assert_eq!(Primitive::Int.coerce(&json!("12")), Some(json!(12)));
        assert_eq!(Primitive::Int.coerce(&json!(3.7)), Some(json!(3)));
        assert_eq!(Primitive::Float.coerce(&json!("1.5")), Some(json!(1.5)));
        assert_eq!(Primitive::Bool.coerce(&json!(0)), Some(json!(false)));
        assert_eq!(Primitive::Bool.coerce(&json!("yes")), None);
        assert_eq!(Primitive::String.coerce(&json!(5)), Some(json!("5")));
        assert_eq!(Primitive::Object.coerce(&json!([1])), None);
        assert_eq!(Primitive::String.coerce(&Value::Null), None);
    }

    #[test]
    fn test_normalize_runs_rules_in_order() {
        let element_type = element_type();
        let raw = json!({"width": "40", "count": "x", "kind": "ignored"});
        let out = element_type
            .props()
            .normalize(raw.as_object().unwrap(), &element_type, &mut Counter { next: 0 })
            .unwrap();
        assert_eq!(out["kind"], json!("node"));
        assert_eq!(out["width"], json!(40.0));
        assert_eq!(out["double"], json!(80.0));
        assert!(!out.contains_key("count"));
    }

    #[test]
    fn test_unknown_keys_merge_into_data() {
        let element_type = element_type();
        let raw = json!({"data": {"owner": "ops"}, "owner": "dev", "priority": 2});
        let out = element_type
            .props()
            .normalize(raw.as_object().unwrap(), &element_type, &mut Counter { next: 0 })
            .unwrap();
        assert_eq!(out["data"], json!({"owner": "ops", "priority": 2}));
    }

    #[test]
    fn test_merged_replaces_in_place() {
        let base = table();
        let overrides = PropTable::new()
            .with("width", PropRule::Coerce(Primitive::Int))
            .with("extra", PropRule::Coerce(Primitive::Bool));
        let merged = base.merged(&overrides);
        let keys: Vec<_> = merged.rules.keys().map(String::as_str).collect();
        assert_eq!(keys, ["kind", "width", "count", "double", "data", "extra"]);
        assert!(matches!(
            merged.get("width"),
            Some(PropRule::Coerce(Primitive::Int))
        ));
        assert_eq!(merged.hidden_keys().collect::<Vec<_>>(), ["kind"]);
    }
}
