//! The element store and graph derivation.
//!
//! [`ElementStore`] owns every live element. Graph links (parents, children,
//! relation lists, resolved ports) are derived state: [`ElementStore::rebuild_graph`]
//! throws them away and recomputes them from the raw `from`/`to` references
//! every time, bumping a generation counter that layout memoization keys on.

use std::collections::HashMap;

use indexmap::IndexMap;
use log::{debug, trace};
use serde_json::{Map, Value};

use flowchart_core::identifier::Id;

use crate::{
    config::PortConfig,
    element::{Element, Endpoint, NodeLinks, RelationLinks},
    error::FlowchartError,
    port::{Port, PortMatch, RestClaim, reconcile_rest_claims},
    reference::parse_endpoint,
    types::{ElementKind, NormalizeContext, TypeRegistry},
};

const RELATION_ORDER_OFFSET: u64 = 10_000;
const FIRST_Z_INDEX: u32 = 5;

/// Per-engine monotonic counters for ids, creation order and z-order.
#[derive(Debug, Clone)]
pub struct Sequence {
    id_prefix: String,
    next_id: u64,
    next_order: u64,
    next_z: u32,
}

impl Sequence {
    pub fn new(id_prefix: impl Into<String>) -> Self {
        Self {
            id_prefix: id_prefix.into(),
            next_id: 1,
            next_order: 1,
            next_z: FIRST_Z_INDEX,
        }
    }

    fn next_z_index(&mut self) -> u32 {
        let z = self.next_z;
        self.next_z += 1;
        z
    }
}

/// Normalization services backed by the live element set.
struct StoreContext<'a> {
    elements: &'a IndexMap<Id, Element>,
    sequence: &'a mut Sequence,
}

impl NormalizeContext for StoreContext<'_> {
    fn generate_id(&mut self) -> String {
        loop {
            let candidate = format!("{}{}", self.sequence.id_prefix, self.sequence.next_id);
            self.sequence.next_id += 1;
            if !self.elements.contains_key(&Id::new(&candidate)) {
                return candidate;
            }
        }
    }

    fn order_of(&self, id: &str) -> Option<u64> {
        self.elements.get(&Id::new(id)).map(Element::order)
    }

    fn next_order(&mut self, kind: ElementKind) -> u64 {
        let order = self.sequence.next_order;
        self.sequence.next_order += 1;
        match kind {
            ElementKind::Node => order,
            ElementKind::Relation => order + RELATION_ORDER_OFFSET,
        }
    }
}

/// Owner of all live elements.
#[derive(Debug, Clone)]
pub struct ElementStore {
    elements: IndexMap<Id, Element>,
    sequence: Sequence,
    generation: u64,
    nodes: Vec<Id>,
    relations: Vec<Id>,
}

impl ElementStore {
    pub fn new(id_prefix: impl Into<String>) -> Self {
        Self {
            elements: IndexMap::new(),
            sequence: Sequence::new(id_prefix),
            generation: 0,
            nodes: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Incremented by every graph rebuild.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn contains(&self, id: Id) -> bool {
        self.elements.contains_key(&id)
    }

    pub fn get(&self, id: Id) -> Option<&Element> {
        self.elements.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: Id) -> Option<&mut Element> {
        self.elements.get_mut(&id)
    }

    /// Elements in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    /// Node ids sorted by order, as of the last rebuild.
    pub fn nodes(&self) -> &[Id] {
        &self.nodes
    }

    /// Relation ids sorted by order, as of the last rebuild.
    pub fn relations(&self) -> &[Id] {
        &self.relations
    }

    /// Normalizes a raw descriptor and inserts the element, replacing any
    /// live element with the same id.
    ///
    /// A node descriptor carrying `from` also creates a relation from that
    /// endpoint to the new node. Returns the ids of every inserted element.
    ///
    /// # Errors
    ///
    /// Returns normalization errors (invalid id, bad values) and
    /// [`FlowchartError::UnknownType`] when no type or fallback applies.
    pub fn insert(
        &mut self,
        registry: &TypeRegistry,
        mut raw: Map<String, Value>,
    ) -> Result<Vec<Id>, FlowchartError> {
        let element_type = registry.resolve_descriptor(&raw)?;
        let link_from = if element_type.is_node() {
            raw.remove("from")
                .and_then(|v| v.as_str().map(str::to_string))
                .filter(|s| !s.is_empty())
        } else {
            None
        };

        let normalized = {
            let mut ctx = StoreContext {
                elements: &self.elements,
                sequence: &mut self.sequence,
            };
            element_type.normalize(&raw, &mut ctx)?
        };
        let z_index = self.sequence.next_z_index();
        let mut element = Element::from_normalized(normalized, element_type, z_index)?;
        let id = element.id();
        if let Some(previous) = self.elements.get(&id) {
            element.inherit_from(previous);
            debug!(id:%; "Replaced element");
        } else {
            let kind = if element.is_node() { "node" } else { "relation" };
            trace!(id:%, kind; "Inserted element");
        }
        self.elements.insert(id, element);

        let mut inserted = vec![id];
        if let Some(from) = link_from {
            let mut relation = Map::new();
            relation.insert("from".to_string(), Value::String(from));
            relation.insert("to".to_string(), Value::String(id.to_string()));
            let relation_type = registry.resolve(None, ElementKind::Relation)?;
            relation.insert(
                "type".to_string(),
                Value::String(relation_type.name().to_string()),
            );
            inserted.extend(self.insert(registry, relation)?);
        }
        Ok(inserted)
    }

    /// Removes an element. Removing a node also removes the relations
    /// linked to it by the last graph rebuild; relations that were not
    /// linked stay and remain hidden. Returns the removed ids; unknown ids
    /// remove nothing.
    pub fn remove(&mut self, id: Id) -> Vec<Id> {
        let Some(element) = self.elements.shift_remove(&id) else {
            return Vec::new();
        };
        let mut removed = vec![id];
        if let Some(node) = element.as_node() {
            let links = node.links();
            for &relation in links.from_rels().iter().chain(links.to_rels()) {
                if self.elements.shift_remove(&relation).is_some() {
                    removed.push(relation);
                }
            }
        }
        debug!(id:%, cascade = removed.len() - 1; "Removed element");
        removed
    }

    /// Removes one element without touching its relations.
    pub(crate) fn detach(&mut self, id: Id) -> Option<Element> {
        self.elements.shift_remove(&id)
    }

    /// Puts back an element taken out by [`ElementStore::detach`].
    pub(crate) fn restore(&mut self, element: Element) {
        self.elements.insert(element.id(), element);
    }

    /// Points every relation that references node `old` at `new`, keeping
    /// the port names. Returns the retargeted relations.
    pub(crate) fn retarget(&mut self, old: Id, new: Id) -> Vec<Id> {
        let old_name = old.to_string();
        let new_name = new.to_string();
        let mut touched = Vec::new();
        for element in self.elements.values_mut() {
            let id = element.id();
            let Some(relation) = element.as_relation_mut() else {
                continue;
            };
            for end in [Endpoint::From, Endpoint::To] {
                let (node, port) = match end {
                    Endpoint::From => (relation.from(), relation.from_port()),
                    Endpoint::To => (relation.to(), relation.to_port()),
                };
                if node != old_name {
                    continue;
                }
                let port = port.map(str::to_string);
                relation.set_endpoint(end, new_name.clone(), port);
                if touched.last() != Some(&id) {
                    touched.push(id);
                }
            }
        }
        debug!(old:% = old, new:% = new, relations = touched.len(); "Retargeted relations");
        touched
    }

    /// Drops every element. Counters keep running.
    pub fn clear(&mut self) {
        self.elements.clear();
        self.nodes.clear();
        self.relations.clear();
    }

    /// Ids of relations whose raw references name `node`.
    pub fn relations_referencing(&self, node: Id) -> Vec<Id> {
        let name = node.to_string();
        self.elements
            .values()
            .filter_map(|e| {
                let relation = e.as_relation()?;
                (relation.from() == name || relation.to() == name).then(|| e.id())
            })
            .collect()
    }

    /// Rederives the whole graph from raw relation references.
    ///
    /// Links are reset on every node and relation first, then each relation
    /// in order is resolved against live visible nodes. Explicit port names
    /// are resolved here, including repeatable port reconciliation; nearest
    /// ports are left for the render pass.
    pub fn rebuild_graph(&mut self, ports: &PortConfig) {
        self.generation += 1;

        let mut nodes = Vec::new();
        let mut relations = Vec::new();
        for element in self.elements.values() {
            if element.is_node() {
                nodes.push(element.id());
            } else {
                relations.push(element.id());
            }
        }
        let order_of = |id: &Id| self.elements.get(id).map_or(u64::MAX, Element::order);
        nodes.sort_by_key(order_of);
        relations.sort_by_key(order_of);

        for element in self.elements.values_mut() {
            if let Some(node) = element.as_node_mut() {
                *node.links_mut() = NodeLinks::default();
            } else if let Some(relation) = element.as_relation_mut() {
                *relation.links_mut() = RelationLinks::default();
            }
        }

        // Claims on repeatable ports, per (node, template name).
        let mut claims: IndexMap<(Id, String), Vec<RestClaim>> = IndexMap::new();
        let mut explicit: HashMap<Id, [Option<ExplicitPort>; 2]> = HashMap::new();

        for &relation_id in &relations {
            let Some(resolved) = self.resolve_relation(relation_id) else {
                continue;
            };
            let ResolvedRelation {
                from_node,
                to_node,
                from_port,
                to_port,
            } = resolved;

            for (slot, node, port) in [(0, from_node, &from_port), (1, to_node, &to_port)] {
                if let Some(ExplicitPort::Rest { template, index }) = port {
                    claims
                        .entry((node, template.clone()))
                        .or_default()
                        .push(RestClaim::new(relation_id, *index));
                }
                explicit.entry(relation_id).or_insert([None, None])[slot] = port.clone();
            }

            let from_index = self.node_links_len(from_node, |l| l.from_rels().len());
            let to_index = self.node_links_len(to_node, |l| l.to_rels().len());
            if let Some(node) = self.get_mut(from_node).and_then(Element::as_node_mut) {
                node.links_mut().add_child(to_node, relation_id);
            }
            if let Some(node) = self.get_mut(to_node).and_then(Element::as_node_mut) {
                node.links_mut().add_parent(from_node, relation_id);
            }
            if let Some(relation) = self.get_mut(relation_id).and_then(Element::as_relation_mut) {
                *relation.links_mut() =
                    RelationLinks::resolved(from_node, to_node, from_index, to_index);
            }
        }

        self.reconcile_rest_ports(&nodes, &claims, ports);

        for (relation_id, ends) in explicit {
            let mut names: [Option<String>; 2] = [None, None];
            let mut visible = true;
            for (slot, end) in ends.into_iter().enumerate() {
                match end {
                    None => {}
                    Some(ExplicitPort::Exact(name)) => names[slot] = Some(name),
                    Some(ExplicitPort::Rest { template, .. }) => {
                        let Some(relation) = self.get(relation_id).and_then(Element::as_relation)
                        else {
                            continue;
                        };
                        let node = if slot == 0 {
                            relation.links().from_node()
                        } else {
                            relation.links().to_node()
                        };
                        match node.and_then(|n| self.rest_instance_name(n, &template, relation_id)) {
                            Some(name) => names[slot] = Some(name),
                            None => visible = false,
                        }
                    }
                    Some(ExplicitPort::Unresolved) => visible = false,
                }
            }
            let Some(relation) = self.get_mut(relation_id).and_then(Element::as_relation_mut) else {
                continue;
            };
            let [from_port, to_port] = names;
            let links = relation.links_mut();
            links.set_from_port(from_port);
            links.set_to_port(to_port);
            if !visible {
                debug!(id:% = relation_id; "Relation port does not resolve");
                links.hide();
            }
        }

        self.nodes = nodes;
        self.relations = relations;
        debug!(
            generation = self.generation,
            nodes = self.nodes.len(),
            relations = self.relations.len();
            "Graph rebuilt"
        );
    }

    fn node_links_len(&self, node: Id, f: impl Fn(&NodeLinks) -> usize) -> usize {
        self.get(node)
            .and_then(Element::as_node)
            .map_or(0, |n| f(n.links()))
    }

    /// Looks up both endpoints and classifies their port names.
    fn resolve_relation(&self, relation_id: Id) -> Option<ResolvedRelation> {
        let element = self.get(relation_id)?;
        let relation = element.as_relation()?;
        if element.is_hidden() {
            return None;
        }
        let endpoint = |raw: &str, port: Option<&str>| -> Option<(Id, Option<ExplicitPort>)> {
            let reference = parse_endpoint(raw).ok()?;
            let node_id = Id::new(reference.node());
            let node = self.get(node_id)?;
            if !node.is_node() || node.is_hidden() {
                return None;
            }
            let port = port.or(reference.port()).map(|name| {
                match node.element_type().ports().and_then(|ports| ports.find(name)) {
                    Some(PortMatch::Exact(port)) => {
                        ExplicitPort::Exact(port.name().unwrap_or(name).to_string())
                    }
                    Some(PortMatch::Rest { template, index }) => ExplicitPort::Rest {
                        template: template.name().unwrap_or(name).to_string(),
                        index,
                    },
                    None => ExplicitPort::Unresolved,
                }
            });
            Some((node_id, port))
        };

        let from = endpoint(relation.from(), relation.from_port());
        let to = endpoint(relation.to(), relation.to_port());
        match (from, to) {
            (Some((from_node, from_port)), Some((to_node, to_port))) => Some(ResolvedRelation {
                from_node,
                to_node,
                from_port,
                to_port,
            }),
            _ => {
                debug!(id:% = relation_id, from = relation.from(), to = relation.to(); "Relation endpoint does not resolve");
                None
            }
        }
    }

    /// Reconciles every repeatable port of every node, claimed or not.
    fn reconcile_rest_ports(
        &mut self,
        nodes: &[Id],
        claims: &IndexMap<(Id, String), Vec<RestClaim>>,
        config: &PortConfig,
    ) {
        for &node_id in nodes {
            let Some(element) = self.elements.get_mut(&node_id) else {
                continue;
            };
            let element_type = element.element_type().clone();
            let Some(ports) = element_type.ports() else {
                continue;
            };
            let Some(node) = element.as_node_mut() else {
                continue;
            };
            for template in ports.rest_ports() {
                let Some(name) = template.name() else {
                    continue;
                };
                let node_claims = claims
                    .get(&(node_id, name.to_string()))
                    .map_or(&[][..], Vec::as_slice);
                let slots = reconcile_rest_claims(
                    template,
                    node_claims,
                    config.rest_placeholder(),
                    config.rest_collision(),
                );
                trace!(node:% = node_id, port = name, realized:? = slots.realized(); "Reconciled repeatable port");
                node.links_mut().set_rest_slots(name.to_string(), slots);
            }
        }
    }

    fn rest_instance_name(&self, node: Id, template: &str, relation: Id) -> Option<String> {
        let element = self.get(node)?;
        let port = element.element_type().ports()?.get(template)?;
        let slots = element.as_node()?.links().rest_slots().get(template)?;
        let index = slots.assignment(relation)??;
        port.rest_instance(index, false)?.name().map(str::to_string)
    }
}

/// The ports a node draws: fixed ports plus, for each repeatable template,
/// its realized instances and placeholder. Side order is preserved.
pub fn expanded_ports(element: &Element) -> Vec<Port> {
    let Some(ports) = element.element_type().ports() else {
        return Vec::new();
    };
    let slots = element.as_node().map(|n| n.links().rest_slots());
    let mut expanded = Vec::new();
    for port in ports.iter() {
        if !port.is_rest() {
            expanded.push(port.clone());
            continue;
        }
        let instances = port
            .name()
            .and_then(|name| slots.and_then(|s| s.get(name)))
            .map(|s| s.instances(port))
            .unwrap_or_default();
        expanded.extend(instances);
    }
    expanded
}

#[derive(Debug, Clone, PartialEq)]
enum ExplicitPort {
    Exact(String),
    Rest { template: String, index: u32 },
    Unresolved,
}

struct ResolvedRelation {
    from_node: Id,
    to_node: Id,
    from_port: Option<ExplicitPort>,
    to_port: Option<ExplicitPort>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::ElementConfig;

    fn registry() -> TypeRegistry {
        TypeRegistry::from_config(&ElementConfig::default()).unwrap()
    }

    fn add(store: &mut ElementStore, registry: &TypeRegistry, raw: Value) -> Vec<Id> {
        let Value::Object(map) = raw else {
            panic!("descriptor must be an object");
        };
        store.insert(registry, map).unwrap()
    }

    fn chain() -> (ElementStore, TypeRegistry) {
        let registry = registry();
        let mut store = ElementStore::new("flow-");
        add(&mut store, &registry, json!({"id": "a", "type": "start"}));
        add(&mut store, &registry, json!({"id": "b", "type": "action"}));
        add(&mut store, &registry, json!({"id": "c", "type": "stop"}));
        add(&mut store, &registry, json!({"id": "ab", "from": "a", "to": "b"}));
        add(&mut store, &registry, json!({"id": "bc", "from": "b", "to": "c"}));
        store.rebuild_graph(&PortConfig::default());
        (store, registry)
    }

    fn node_links(store: &ElementStore, id: &str) -> NodeLinks {
        store
            .get(Id::new(id))
            .and_then(Element::as_node)
            .unwrap()
            .links()
            .clone()
    }

    #[test]
    fn test_generated_ids_skip_live_ids() {
        let registry = registry();
        let mut store = ElementStore::new("flow-");
        add(&mut store, &registry, json!({"id": "flow-1"}));
        let ids = add(&mut store, &registry, json!({"text": "next"}));
        assert_eq!(ids, [Id::new("flow-2")]);
    }

    #[test]
    fn test_relations_order_after_nodes() {
        let (store, _) = chain();
        let ab = store.get(Id::new("ab")).unwrap();
        let c = store.get(Id::new("c")).unwrap();
        assert!(ab.order() > c.order());
        assert!(ab.order() > RELATION_ORDER_OFFSET);
        assert_eq!(store.nodes(), [Id::new("a"), Id::new("b"), Id::new("c")]);
    }

    #[test]
    fn test_duplicate_id_replaces_and_keeps_order() {
        let (mut store, registry) = chain();
        let before = store.get(Id::new("b")).unwrap().order();
        add(&mut store, &registry, json!({"id": "b", "type": "judge", "text": "again"}));
        assert_eq!(store.len(), 5);
        let b = store.get(Id::new("b")).unwrap();
        assert_eq!(b.order(), before);
        assert_eq!(b.type_name(), "judge");
    }

    #[test]
    fn test_rebuild_links() {
        let (store, _) = chain();
        let b = node_links(&store, "b");
        assert_eq!(b.parents(), [Id::new("a")]);
        assert_eq!(b.children(), [Id::new("c")]);
        assert_eq!(b.to_rels(), [Id::new("ab")]);
        assert_eq!(b.from_rels(), [Id::new("bc")]);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let (mut store, _) = chain();
        let first: Vec<_> = ["a", "b", "c"].iter().map(|id| node_links(&store, id)).collect();
        store.rebuild_graph(&PortConfig::default());
        let second: Vec<_> = ["a", "b", "c"].iter().map(|id| node_links(&store, id)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_remove_node_cascades() {
        let (mut store, _) = chain();
        let removed = store.remove(Id::new("b"));
        assert_eq!(removed.len(), 3);
        assert!(!store.contains(Id::new("ab")));
        assert!(!store.contains(Id::new("bc")));
        assert!(store.contains(Id::new("c")));
    }

    #[test]
    fn test_missing_endpoint_hides_relation() {
        let registry = registry();
        let mut store = ElementStore::new("flow-");
        add(&mut store, &registry, json!({"id": "a"}));
        add(&mut store, &registry, json!({"id": "r", "from": "a", "to": "ghost"}));
        store.rebuild_graph(&PortConfig::default());
        let relation = store.get(Id::new("r")).and_then(Element::as_relation).unwrap();
        assert!(!relation.links().is_visible());

        add(&mut store, &registry, json!({"id": "ghost"}));
        store.rebuild_graph(&PortConfig::default());
        let relation = store.get(Id::new("r")).and_then(Element::as_relation).unwrap();
        assert!(relation.links().is_visible());
    }

    #[test]
    fn test_unknown_port_hides_relation() {
        let registry = registry();
        let mut store = ElementStore::new("flow-");
        add(&mut store, &registry, json!({"id": "a"}));
        add(&mut store, &registry, json!({"id": "b"}));
        add(&mut store, &registry, json!({"id": "r", "from": "a.nope", "to": "b"}));
        add(&mut store, &registry, json!({"id": "s", "from": "a.bottom2", "to": "b.top1"}));
        store.rebuild_graph(&PortConfig::default());
        let r = store.get(Id::new("r")).and_then(Element::as_relation).unwrap();
        assert!(!r.links().is_visible());
        let s = store.get(Id::new("s")).and_then(Element::as_relation).unwrap();
        assert!(s.links().is_visible());
        assert_eq!(s.links().from_port(), Some("bottom2"));
        assert_eq!(s.links().to_port(), Some("top1"));
    }

    #[test]
    fn test_node_with_from_creates_relation() {
        let registry = registry();
        let mut store = ElementStore::new("flow-");
        add(&mut store, &registry, json!({"id": "a"}));
        let ids = add(&mut store, &registry, json!({"id": "b", "from": "a.bottom2"}));
        assert_eq!(ids.len(), 2);
        let relation = store.get(ids[1]).and_then(Element::as_relation).unwrap();
        assert_eq!(relation.from(), "a");
        assert_eq!(relation.from_port(), Some("bottom2"));
        assert_eq!(relation.to(), "b");
        store.rebuild_graph(&PortConfig::default());
        let relation = store.get(ids[1]).and_then(Element::as_relation).unwrap();
        assert_eq!(relation.links().from_port(), Some("bottom2"));
    }

    #[test]
    fn test_invalid_id_is_rejected() {
        let registry = registry();
        let mut store = ElementStore::new("flow-");
        let raw = json!({"id": "a.b"});
        let err = store
            .insert(&registry, raw.as_object().unwrap().clone())
            .unwrap_err();
        assert!(matches!(err, FlowchartError::InvalidId { .. }));
        assert!(store.is_empty());
    }
}
