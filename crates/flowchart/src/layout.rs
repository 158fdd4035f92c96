//! Automatic node placement.
//!
//! A full pass buckets every floating node by its depth in the tree induced
//! by first parents, packs each bucket along the cross axis and then pushes
//! overlapping nodes apart. Nodes with a center or anchored position, and
//! floating nodes touched by a partial pass, are placed individually next to
//! their anchor, their parents, or below the canvas.

use std::collections::HashMap;

use log::{debug, trace, warn};

use flowchart_core::{
    draw::TextMeasure,
    geometry::{Bounds, Insets, Point, Side, Size, snap_to_grid},
    identifier::Id,
};

use crate::{
    config::{LayoutConfig, LayoutDirection, PortConfig},
    element::{Element, NodePosition, PositionSource},
    port::ports_min_size,
    store::{ElementStore, expanded_ports},
};

/// Computes the size of a node from its properties, its type defaults, its
/// label and its ports.
///
/// Explicit widths and heights win. Otherwise the width follows the label,
/// clamped to the min/max widths, and the height is at least the configured
/// node height. Both grow to fit the ports.
pub fn measure_node(
    element: &Element,
    layout: &LayoutConfig,
    ports: &PortConfig,
    measurer: &dyn TextMeasure,
) -> Size {
    let Some(node) = element.as_node() else {
        return Size::default();
    };
    let defaults = element.element_type().node_defaults();
    let padding = layout.text_padding();
    let label = measurer
        .measure(element.text(), layout.font_size())
        .add_padding(Insets::symmetric(padding, padding));
    let port_size = ports_min_size(&expanded_ports(element), ports.space_size());

    let min_width = node
        .min_width()
        .or(defaults.min_width())
        .unwrap_or(layout.node_min_width());
    let max_width = node
        .max_width()
        .or(defaults.max_width())
        .unwrap_or(layout.node_max_width())
        .max(min_width);
    let width = match node.width().or(defaults.width()) {
        Some(width) => width,
        None => label
            .width()
            .clamp(min_width, max_width)
            .max(port_size.width()),
    };
    let height = match node.height().or(defaults.height()) {
        Some(height) => height,
        None => layout
            .node_height()
            .max(label.height())
            .max(port_size.height()),
    };
    Size::new(width.ceil(), height.ceil())
}

/// Memoized per-node layout values.
///
/// Entries are valid for one graph generation; [`LayoutMemo::sync`] drops
/// everything when the store was rebuilt since the last access.
#[derive(Debug, Clone, Default)]
pub struct LayoutMemo {
    generation: u64,
    depth: HashMap<Id, usize>,
    depth_size: HashMap<Id, f32>,
    sibling_index: HashMap<Id, usize>,
}

impl LayoutMemo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops all entries if `generation` differs from the cached one.
    pub fn sync(&mut self, generation: u64) {
        if self.generation != generation {
            self.clear();
            self.generation = generation;
        }
    }

    pub fn clear(&mut self) {
        self.depth.clear();
        self.depth_size.clear();
        self.sibling_index.clear();
    }

    /// Forgets the entries of the given nodes.
    pub fn invalidate(&mut self, ids: &[Id]) {
        for id in ids {
            self.depth.remove(id);
            self.depth_size.remove(id);
            self.sibling_index.remove(id);
        }
    }

    pub fn depth(&self, id: Id) -> Option<usize> {
        self.depth.get(&id).copied()
    }

    pub fn sibling_index(&self, id: Id) -> Option<usize> {
        self.sibling_index.get(&id).copied()
    }
}

/// One layout pass over an [`ElementStore`].
pub struct LayoutEngine<'a> {
    config: &'a LayoutConfig,
    memo: &'a mut LayoutMemo,
}

impl<'a> LayoutEngine<'a> {
    pub fn new(config: &'a LayoutConfig, memo: &'a mut LayoutMemo) -> Self {
        Self { config, memo }
    }

    fn is_horizontal(&self) -> bool {
        self.config.direction() == LayoutDirection::Horizontal
    }

    /// Spacing between depth levels.
    fn main_space(&self) -> f32 {
        if self.is_horizontal() {
            self.config.horizontal_space()
        } else {
            self.config.vertical_space()
        }
    }

    /// Spacing between nodes packed within one depth level.
    fn cross_space(&self) -> f32 {
        if self.is_horizontal() {
            self.config.vertical_space()
        } else {
            self.config.horizontal_space()
        }
    }

    /// Nominal extent of one depth level along the main axis.
    fn main_node_size(&self) -> f32 {
        if self.is_horizontal() {
            (self.config.node_min_width() + self.config.node_max_width()) / 2.0
        } else {
            self.config.node_height()
        }
    }

    fn cross_extent(&self, size: Size) -> f32 {
        if self.is_horizontal() {
            size.height()
        } else {
            size.width()
        }
    }

    /// Distance from a root along first-parent links.
    ///
    /// Begin-type nodes and nodes without parents are roots. A node reached
    /// again while following a cycle counts as a root.
    pub fn depth(&mut self, store: &ElementStore, id: Id) -> usize {
        self.depth_guarded(store, id, &mut Vec::new())
    }

    fn depth_guarded(&mut self, store: &ElementStore, id: Id, path: &mut Vec<Id>) -> usize {
        if let Some(depth) = self.memo.depth(id) {
            return depth;
        }
        if path.contains(&id) {
            return 0;
        }
        let Some(element) = store.get(id) else {
            return 0;
        };
        let first_parent = element
            .as_node()
            .and_then(|node| node.links().parents().first().copied());
        let depth = match first_parent {
            Some(parent) if !element.element_type().is_begin() => {
                path.push(id);
                let depth = self.depth_guarded(store, parent, path) + 1;
                path.pop();
                depth
            }
            _ => 0,
        };
        self.memo.depth.insert(id, depth);
        depth
    }

    /// Cross-axis room a node's subtree needs: its own extent, or the
    /// spaced sum of its next-level children if that is larger.
    pub fn depth_size(&mut self, store: &ElementStore, id: Id) -> f32 {
        if let Some(&size) = self.memo.depth_size.get(&id) {
            return size;
        }
        let own = self.cross_extent(node_size(store, id));
        let depth = self.depth(store, id);
        let children = store
            .get(id)
            .and_then(Element::as_node)
            .map(|node| node.links().children().to_vec())
            .unwrap_or_default();

        let mut children_size = 0.0;
        let mut first = true;
        for child in children {
            if self.depth(store, child) != depth + 1 {
                continue;
            }
            if !first {
                children_size += self.cross_space();
            }
            children_size += self.depth_size(store, child);
            first = false;
        }
        let size = own.max(children_size);
        self.memo.depth_size.insert(id, size);
        size
    }

    /// Lays out every visible node. Returns the canvas bounds.
    pub fn layout_full(&mut self, store: &mut ElementStore) -> Bounds {
        self.memo.clear();
        self.memo.generation = store.generation();

        let mut canvas = initial_canvas(self.config.padding());
        let nodes: Vec<Id> = store
            .nodes()
            .iter()
            .copied()
            .filter(|&id| is_visible_node(store, id))
            .collect();
        for &id in &nodes {
            if let Some(bounds) = node_bounds(store, id) {
                canvas = canvas.merge(&bounds);
            }
        }

        let floating: Vec<Id> = nodes
            .iter()
            .copied()
            .filter(|&id| {
                store
                    .get(id)
                    .and_then(Element::as_node)
                    .is_some_and(|node| node.layout().is_floating())
            })
            .collect();
        if !floating.is_empty() {
            self.place_buckets(store, &floating);
            self.resolve_overlaps(store, &floating);
            for &id in &floating {
                if let Some(bounds) = self.snap(store, id) {
                    canvas = canvas.merge(&bounds);
                }
            }
        }

        for &id in &nodes {
            self.place(store, id, &mut canvas, &mut Vec::new());
        }
        debug!(nodes = nodes.len(), floating = floating.len(); "Full layout finished");
        canvas
    }

    /// Places the given nodes that have no position yet, without
    /// re-bucketing the rest of the chart.
    pub fn layout_partial(&mut self, store: &mut ElementStore, dirty: &[Id], canvas: &mut Bounds) {
        self.memo.sync(store.generation());
        self.memo.invalidate(dirty);
        for &id in dirty {
            if is_visible_node(store, id) {
                self.place(store, id, canvas, &mut Vec::new());
                if let Some(bounds) = node_bounds(store, id) {
                    *canvas = canvas.merge(&bounds);
                }
            }
        }
        trace!(dirty = dirty.len(); "Partial layout finished");
    }

    fn place_buckets(&mut self, store: &mut ElementStore, floating: &[Id]) {
        let mut buckets: Vec<Vec<Id>> = Vec::new();
        let mut bucket_sizes: Vec<f32> = Vec::new();
        let mut ends = Vec::new();
        let mut max_depth_size = 0.0f32;

        for &id in floating {
            let is_end = store
                .get(id)
                .is_some_and(|e| e.element_type().is_end());
            if is_end {
                ends.push(id);
                continue;
            }
            let depth = self.depth(store, id);
            let size = self.depth_size(store, id);
            if buckets.len() <= depth {
                buckets.resize_with(depth + 1, Vec::new);
                bucket_sizes.resize(depth + 1, 0.0);
            }
            buckets[depth].push(id);
            bucket_sizes[depth] += size;
            max_depth_size = max_depth_size.max(size);
        }

        if !ends.is_empty() {
            let end_depth = buckets.len();
            let mut end_size = 0.0;
            for &id in &ends {
                let size = self.cross_extent(node_size(store, id));
                self.memo.depth.insert(id, end_depth);
                self.memo.depth_size.insert(id, size);
                end_size += size;
                max_depth_size = max_depth_size.max(size);
            }
            buckets.push(ends);
            bucket_sizes.push(end_size);
        }

        let padding = self.config.padding();
        let level_step = self.main_space() + self.main_node_size();
        for (depth, ids) in buckets.iter().enumerate() {
            if ids.is_empty() {
                continue;
            }
            let main = padding + depth as f32 * level_step;
            let mut cursor = padding + (max_depth_size - bucket_sizes[depth]) / 2.0;
            for &id in ids {
                let depth_size = self.depth_size(store, id);
                let cross = cursor + (depth_size - self.cross_extent(node_size(store, id))) / 2.0;
                let point = if self.is_horizontal() {
                    Point::new(main, cross)
                } else {
                    Point::new(cross, main)
                };
                trace!(id:%, depth, point:?; "Placed floating node");
                set_position(store, id, point, PositionSource::Auto);
                cursor += depth_size + self.cross_space();
            }
        }
    }

    /// Pushes later nodes along the cross axis until no two of `ids`
    /// intersect, or the configured pass limit is reached.
    fn resolve_overlaps(&mut self, store: &mut ElementStore, ids: &[Id]) {
        let limit = self.config.max_overlap_passes();
        let mut passes = 0;
        loop {
            let mut moved = false;
            for i in (0..ids.len()).rev() {
                for j in 0..i {
                    let (Some(a), Some(b)) = (node_bounds(store, ids[i]), node_bounds(store, ids[j]))
                    else {
                        continue;
                    };
                    if !a.intersects(&b) {
                        continue;
                    }
                    let shift = self.cross_space() + self.cross_extent(a.to_size());
                    let point = if self.is_horizontal() {
                        Point::new(a.min_x(), a.min_y() + shift)
                    } else {
                        Point::new(a.min_x() + shift, a.min_y())
                    };
                    set_position(store, ids[i], point, PositionSource::Auto);
                    moved = true;
                }
            }
            if !moved {
                break;
            }
            passes += 1;
            if passes >= limit {
                warn!(passes, nodes = ids.len(); "Overlap resolution did not converge, keeping last state");
                break;
            }
        }
    }

    /// Rounds a node's position to the grid and returns its bounds.
    fn snap(&self, store: &mut ElementStore, id: Id) -> Option<Bounds> {
        let element = store.get(id)?;
        let layout = element.as_node()?.layout();
        let position = layout.position()?;
        let source = layout.source().unwrap_or(PositionSource::Auto);
        let grid = self.config.grid();
        let snapped = Point::new(snap_to_grid(position.x(), grid), snap_to_grid(position.y(), grid));
        set_position(store, id, snapped, source);
        node_bounds(store, id)
    }

    /// Places one node that has no position yet and grows the canvas.
    fn place(&mut self, store: &mut ElementStore, id: Id, canvas: &mut Bounds, visiting: &mut Vec<Id>) {
        let Some(node) = store.get(id).and_then(Element::as_node) else {
            return;
        };
        if node.layout().position().is_some() {
            return;
        }
        let size = node.layout().size().unwrap_or_default();
        let pending = node.layout().pending().cloned();

        let (point, source) = match pending {
            Some(NodePosition::Center {
                center_left,
                center_top,
            }) => (
                Point::new(
                    center_left - (size.width() / 2.0).floor(),
                    center_top - (size.height() / 2.0).floor(),
                ),
                PositionSource::Resolved,
            ),
            Some(NodePosition::Anchored { direction, from }) => {
                let anchor = Id::new(&from);
                if anchor != id && !visiting.contains(&anchor) {
                    visiting.push(id);
                    self.place(store, anchor, canvas, visiting);
                    visiting.pop();
                }
                match node_bounds(store, anchor) {
                    Some(anchor_bounds) => (
                        self.beside(anchor_bounds, direction, size),
                        PositionSource::Resolved,
                    ),
                    None => (self.below_parents_or_canvas(store, id, *canvas), PositionSource::Auto),
                }
            }
            Some(NodePosition::Absolute { left, top }) => {
                (Point::new(left, top), PositionSource::User)
            }
            None => (self.below_parents_or_canvas(store, id, *canvas), PositionSource::Auto),
        };

        let grid = self.config.grid();
        let point = Point::new(snap_to_grid(point.x(), grid), snap_to_grid(point.y(), grid));
        trace!(id:%, point:?; "Placed node");
        set_position(store, id, point, source);
        if let Some(bounds) = node_bounds(store, id) {
            *canvas = canvas.merge(&bounds);
        }
    }

    /// Position next to `anchor` on its `side`.
    fn beside(&self, anchor: Bounds, side: Side, size: Size) -> Point {
        let center = anchor.center();
        let h_space = self.config.horizontal_space();
        let v_space = self.config.vertical_space();
        match side {
            Side::Top => Point::new(
                (center.x() - size.width() / 2.0).floor(),
                anchor.min_y() - v_space - size.height(),
            ),
            Side::Bottom => Point::new(
                (center.x() - size.width() / 2.0).floor(),
                anchor.max_y() + v_space,
            ),
            Side::Left => Point::new(
                anchor.min_x() - h_space - size.width(),
                (center.y() - size.height() / 2.0).floor(),
            ),
            Side::Right => Point::new(
                anchor.max_x() + h_space,
                (center.y() - size.height() / 2.0).floor(),
            ),
        }
    }

    /// Next to the union of the positioned parents, offset by the node's
    /// sibling index; below the canvas when no parent is positioned.
    fn below_parents_or_canvas(&mut self, store: &ElementStore, id: Id, canvas: Bounds) -> Point {
        let parents = store
            .get(id)
            .and_then(Element::as_node)
            .map(|node| node.links().parents().to_vec())
            .unwrap_or_default();

        let mut union: Option<Bounds> = None;
        let mut next_index = 0;
        for parent in parents {
            let Some(parent_bounds) = node_bounds(store, parent) else {
                continue;
            };
            union = Some(union.map_or(parent_bounds, |u| u.merge(&parent_bounds)));
            if self.memo.sibling_index(id).is_none() {
                let children = store
                    .get(parent)
                    .and_then(Element::as_node)
                    .map(|node| node.links().children().to_vec())
                    .unwrap_or_default();
                for child in children {
                    self.memo.sibling_index.entry(child).or_insert_with(|| {
                        let index = next_index;
                        next_index += 1;
                        index
                    });
                }
            }
        }

        let Some(parents) = union else {
            let padding = self.config.padding();
            let gap = if canvas.height() <= padding {
                0.0
            } else {
                self.config.vertical_space() - padding
            };
            return Point::new(canvas.min_x(), canvas.min_y() + canvas.height() + gap);
        };

        let index = self.memo.sibling_index(id).unwrap_or(0) as f32;
        if self.is_horizontal() {
            Point::new(
                parents.max_x() + self.config.horizontal_space(),
                parents.min_y() + index * (self.config.node_height() + self.config.vertical_space()),
            )
        } else {
            Point::new(
                parents.min_x()
                    + index * (self.config.node_min_width() + self.config.horizontal_space()),
                parents.max_y() + self.config.vertical_space(),
            )
        }
    }
}

/// Canvas before any node is placed.
pub fn initial_canvas(padding: f32) -> Bounds {
    Bounds::new_from_top_left(Point::new(padding, padding), Size::default())
}

fn is_visible_node(store: &ElementStore, id: Id) -> bool {
    store
        .get(id)
        .is_some_and(|element| element.is_node() && !element.is_hidden())
}

fn node_size(store: &ElementStore, id: Id) -> Size {
    store
        .get(id)
        .and_then(Element::as_node)
        .and_then(|node| node.layout().size())
        .unwrap_or_default()
}

fn node_bounds(store: &ElementStore, id: Id) -> Option<Bounds> {
    store.get(id)?.as_node()?.layout().bounds()
}

fn set_position(store: &mut ElementStore, id: Id, point: Point, source: PositionSource) {
    if let Some(node) = store.get_mut(id).and_then(Element::as_node_mut) {
        node.layout_mut().set_position(point, source);
    }
}
