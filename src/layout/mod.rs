use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{Display, Formatter};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::geometry::{CANVAS_HEIGHT, Delta, Point, Rect, SEPARATOR_MARGIN, Size, clamp};

pub mod document;
pub mod migrate;
pub mod persist;

use self::document::{ImportError, LayoutDocument, parse_layout_document};
use self::migrate::{MigrationRules, migrate_document};
use self::persist::KeyValueStore;

pub const LAYOUT_STORAGE_KEY: &str = "blockcanvas.layout";
pub const DEFAULT_NODE_POSITION: Point = Point { x: 100.0, y: 100.0 };
pub const DEFAULT_SEPARATOR_Y: f32 = CANVAS_HEIGHT / 2.0;

pub type NodeId = String;
pub type LabelOffset = Delta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeShape {
    #[default]
    Rect,
    Cloud,
}

impl NodeShape {
    pub fn default_size(self) -> Size {
        match self {
            Self::Rect => Size::new(140.0, 44.0),
            Self::Cloud => Size::new(160.0, 80.0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rect => "rect",
            Self::Cloud => "cloud",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMeta {
    pub label: String,
    #[serde(default)]
    pub shape: NodeShape,
}

impl NodeMeta {
    pub fn new(label: impl Into<String>, shape: NodeShape) -> Self {
        Self {
            label: label.into(),
            shape,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStyle {
    Bold,
    Solid,
    Dashed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<EdgeStyle>,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            label: None,
            style: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_style(mut self, style: EdgeStyle) -> Self {
        self.style = Some(style);
        self
    }
}

/// Identity of an edge that survives reordering: endpoints plus the occurrence
/// ordinal among edges sharing those endpoints.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeKey(String);

impl EdgeKey {
    /// Keys for a whole edge list, in order, computed in a single pass.
    pub fn for_edges(edges: &[Edge]) -> Vec<Self> {
        let mut ordinals = HashMap::<(&str, &str), usize>::new();
        edges
            .iter()
            .map(|edge| {
                let ordinal = ordinals
                    .entry((edge.from.as_str(), edge.to.as_str()))
                    .or_insert(0);
                let key = Self(format!("{}->{}#{}", edge.from, edge.to, *ordinal));
                *ordinal += 1;
                key
            })
            .collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EdgeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeView<'a> {
    pub id: &'a str,
    pub meta: &'a NodeMeta,
    pub rect: Rect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutStore {
    nodes: BTreeMap<NodeId, NodeMeta>,
    positions: BTreeMap<NodeId, Point>,
    sizes: BTreeMap<NodeId, Size>,
    edges: Vec<Edge>,
    /// `EdgeKey::for_edges(&edges)`, refreshed whenever the edge list changes.
    edge_keys: Vec<EdgeKey>,
    label_offsets: BTreeMap<EdgeKey, LabelOffset>,
    sep_y: f32,
    migration_rules: MigrationRules,
}

impl Default for LayoutStore {
    fn default() -> Self {
        let mut store = Self::empty();
        for (id, label, shape, position) in DEFAULT_NODES {
            store
                .nodes
                .insert((*id).to_owned(), NodeMeta::new(*label, *shape));
            store
                .positions
                .insert((*id).to_owned(), Point::new(position.0, position.1));
        }
        store.set_edges(default_edges());
        store.ensure_geometry();
        store
    }
}

impl LayoutStore {
    pub fn empty() -> Self {
        Self {
            nodes: BTreeMap::new(),
            positions: BTreeMap::new(),
            sizes: BTreeMap::new(),
            edges: Vec::new(),
            edge_keys: Vec::new(),
            label_offsets: BTreeMap::new(),
            sep_y: DEFAULT_SEPARATOR_Y,
            migration_rules: MigrationRules::default(),
        }
    }

    pub fn with_migration_rules(mut self, rules: MigrationRules) -> Self {
        self.migration_rules = rules;
        self
    }

    pub fn from_json(raw: &str) -> Result<Self, ImportError> {
        let mut store = Self::default();
        store.import_json(raw)?;
        Ok(store)
    }

    pub fn load(kv: &dyn KeyValueStore) -> Result<Self> {
        let raw = kv
            .get(LAYOUT_STORAGE_KEY)
            .context("failed to read persisted layout")?;
        let Some(raw) = raw else {
            debug!("no persisted layout; starting from defaults");
            return Ok(Self::default());
        };

        match Self::from_json(&raw) {
            Ok(store) => Ok(store),
            Err(error) => {
                warn!(error = %error, "persisted layout is unreadable; starting from defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, kv: &dyn KeyValueStore) -> Result<()> {
        let raw = self.to_json().context("failed to serialize layout")?;
        kv.set(LAYOUT_STORAGE_KEY, &raw)
            .context("failed to persist layout")
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains_node(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn node_meta(&self, node_id: &str) -> Option<&NodeMeta> {
        self.nodes.get(node_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeView<'_>> {
        self.nodes.iter().map(|(id, meta)| NodeView {
            id,
            meta,
            rect: self.rect(id),
        })
    }

    pub fn position(&self, node_id: &str) -> Point {
        self.positions
            .get(node_id)
            .copied()
            .unwrap_or(DEFAULT_NODE_POSITION)
    }

    pub fn size(&self, node_id: &str) -> Size {
        self.sizes.get(node_id).copied().unwrap_or_else(|| {
            self.nodes
                .get(node_id)
                .map(|meta| meta.shape)
                .unwrap_or_default()
                .default_size()
        })
    }

    pub fn rect(&self, node_id: &str) -> Rect {
        Rect::new(self.position(node_id), self.size(node_id))
    }

    /// Edge endpoints are always box centers, never border intersections.
    pub fn center(&self, node_id: &str) -> Point {
        self.rect(node_id).center()
    }

    pub fn set_position(&mut self, node_id: &str, position: Point) {
        if let Some(slot) = self.positions.get_mut(node_id) {
            *slot = position;
        } else {
            self.positions.insert(node_id.to_owned(), position);
        }
    }

    pub fn set_geometry(&mut self, node_id: &str, position: Point, size: Size) {
        self.set_position(node_id, position);
        self.sizes.insert(node_id.to_owned(), size);
    }

    pub fn set_node_label(&mut self, node_id: &str, label: &str) -> bool {
        let Some(meta) = self.nodes.get_mut(node_id) else {
            return false;
        };
        meta.label = label.to_owned();
        true
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge(&self, index: usize) -> Option<&Edge> {
        self.edges.get(index)
    }

    pub fn set_edge_label(&mut self, index: usize, label: Option<String>) -> bool {
        let Some(edge) = self.edges.get_mut(index) else {
            return false;
        };
        edge.label = label;
        true
    }

    pub fn label_offset(&self, index: usize) -> LabelOffset {
        self.edge_keys
            .get(index)
            .and_then(|key| self.label_offsets.get(key).copied())
            .unwrap_or(Delta::ZERO)
    }

    pub fn set_label_offset(&mut self, index: usize, offset: LabelOffset) -> bool {
        let Some(key) = self.edge_keys.get(index).cloned() else {
            return false;
        };
        self.label_offsets.insert(key, offset);
        true
    }

    /// Moves an edge within the edge list; label offsets follow the edge.
    pub fn move_edge(&mut self, from_index: usize, to_index: usize) -> bool {
        if from_index >= self.edges.len() || to_index >= self.edges.len() {
            return false;
        }
        let offsets = self.offsets_by_index();
        let mut previous_indices = (0..self.edges.len()).collect::<Vec<_>>();
        let mut edges = std::mem::take(&mut self.edges);
        let edge = edges.remove(from_index);
        edges.insert(to_index, edge);
        let moved = previous_indices.remove(from_index);
        previous_indices.insert(to_index, moved);
        self.set_edges(edges);

        // Ordinals among duplicate edges shift with the move, so every offset
        // is re-keyed from its pre-move index.
        self.label_offsets.clear();
        for (new_index, previous_index) in previous_indices.into_iter().enumerate() {
            let offset = offsets.get(&previous_index).copied();
            if let (Some(offset), Some(key)) = (offset, self.edge_keys.get(new_index)) {
                self.label_offsets.insert(key.clone(), offset);
            }
        }
        true
    }

    pub fn sep_y(&self) -> f32 {
        self.sep_y
    }

    pub fn set_sep_y(&mut self, sep_y: f32) {
        self.sep_y = clamp(sep_y, SEPARATOR_MARGIN, CANVAS_HEIGHT - SEPARATOR_MARGIN);
    }

    pub fn ensure_geometry(&mut self) {
        for (id, meta) in &self.nodes {
            self.positions
                .entry(id.clone())
                .or_insert(DEFAULT_NODE_POSITION);
            self.sizes
                .entry(id.clone())
                .or_insert_with(|| meta.shape.default_size());
        }
    }

    pub fn to_document(&self) -> LayoutDocument {
        let label_offsets = self
            .offsets_by_index()
            .into_iter()
            .map(|(index, offset)| (index.to_string(), offset))
            .collect();

        LayoutDocument {
            positions: self.positions.clone(),
            sizes: self.sizes.clone(),
            node_meta: Some(self.nodes.clone()),
            edge_meta: Some(self.edges.clone()),
            sep_y: Some(self.sep_y),
            label_offsets: Some(label_offsets),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.to_document())
    }

    /// Parses, migrates and merges an exported layout. Nothing is mutated
    /// unless the whole document is valid.
    pub fn import_json(&mut self, raw: &str) -> Result<(), ImportError> {
        let mut document = parse_layout_document(raw)?;
        let report = migrate_document(&mut document, &self.migration_rules);
        if !report.is_noop() {
            info!(
                renamed_nodes = report.renamed_nodes,
                rewritten_labels = report.rewritten_labels,
                rehomed_edges = report.rehomed_edges,
                normalized_edge_labels = report.normalized_edge_labels,
                "migrated legacy layout"
            );
        }
        self.apply_document(document);
        info!(
            nodes = self.nodes.len(),
            edges = self.edges.len(),
            "imported layout"
        );
        Ok(())
    }

    pub fn apply_document(&mut self, document: LayoutDocument) {
        let LayoutDocument {
            positions,
            sizes,
            node_meta,
            edge_meta,
            sep_y,
            label_offsets,
        } = document;

        self.positions = positions;
        self.sizes = sizes;
        if let Some(node_meta) = node_meta {
            self.nodes.extend(node_meta);
        }
        if let Some(edge_meta) = edge_meta {
            self.set_edges(edge_meta);
            let live = self.edge_keys.iter().collect::<HashSet<_>>();
            self.label_offsets.retain(|key, _| live.contains(key));
        }
        if let Some(sep_y) = sep_y {
            self.set_sep_y(sep_y);
        }
        if let Some(label_offsets) = label_offsets {
            let imported = label_offsets
                .into_iter()
                .filter_map(|(raw_index, offset)| {
                    let index = raw_index.trim().parse::<usize>().ok()?;
                    self.edge_keys.get(index).map(|key| (key.clone(), offset))
                })
                .collect::<Vec<_>>();
            self.label_offsets.extend(imported);
        }
        self.ensure_geometry();
    }

    fn set_edges(&mut self, edges: Vec<Edge>) {
        self.edge_keys = EdgeKey::for_edges(&edges);
        self.edges = edges;
    }

    fn offsets_by_index(&self) -> BTreeMap<usize, LabelOffset> {
        self.edge_keys
            .iter()
            .enumerate()
            .filter_map(|(index, key)| {
                self.label_offsets
                    .get(key)
                    .map(|offset| (index, *offset))
            })
            .collect()
    }
}

const DEFAULT_NODES: &[(&str, &str, NodeShape, (f32, f32))] = &[
    ("user", "Business User", NodeShape::Rect, (80.0, 120.0)),
    ("portal", "Spec Authoring Portal", NodeShape::Rect, (320.0, 120.0)),
    ("generator", "Section Generator", NodeShape::Rect, (580.0, 120.0)),
    ("llm", "LLM Provider", NodeShape::Cloud, (860.0, 100.0)),
    ("store", "Document Store", NodeShape::Rect, (320.0, 300.0)),
    ("templates", "Template Library", NodeShape::Rect, (580.0, 300.0)),
    ("renderer", "Diagram Renderer", NodeShape::Rect, (860.0, 300.0)),
];

fn default_edges() -> Vec<Edge> {
    vec![
        Edge::new("user", "portal")
            .with_label("uploads BRS")
            .with_style(EdgeStyle::Solid),
        Edge::new("portal", "generator")
            .with_label("section request")
            .with_style(EdgeStyle::Bold),
        Edge::new("generator", "llm")
            .with_label("prompt")
            .with_style(EdgeStyle::Dashed),
        Edge::new("generator", "templates").with_label("loads template"),
        Edge::new("portal", "store")
            .with_label("saves drafts")
            .with_style(EdgeStyle::Solid),
        Edge::new("portal", "renderer")
            .with_label("diagram source")
            .with_style(EdgeStyle::Dashed),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::persist::MemoryKeyValueStore;

    #[test]
    fn default_store_has_geometry_for_every_node() {
        let store = LayoutStore::default();
        assert!(store.node_count() > 0);
        for node in store.nodes() {
            assert!(store.positions.contains_key(node.id));
            assert!(store.sizes.contains_key(node.id));
        }
        assert_eq!(store.size("llm"), NodeShape::Cloud.default_size());
    }

    #[test]
    fn missing_geometry_falls_back_to_defaults() {
        let mut store = LayoutStore::empty();
        store
            .nodes
            .insert("cloudy".to_owned(), NodeMeta::new("Cloudy", NodeShape::Cloud));
        assert_eq!(store.position("cloudy"), DEFAULT_NODE_POSITION);
        assert_eq!(store.size("cloudy"), Size::new(160.0, 80.0));
        assert_eq!(store.size("unknown"), Size::new(140.0, 44.0));

        store.ensure_geometry();
        assert_eq!(store.positions.get("cloudy"), Some(&DEFAULT_NODE_POSITION));
    }

    #[test]
    fn separator_is_clamped_to_canvas_margins() {
        let mut store = LayoutStore::default();
        store.set_sep_y(5.0);
        assert_eq!(store.sep_y(), 40.0);
        store.set_sep_y(5_000.0);
        assert_eq!(store.sep_y(), 860.0);
        store.set_sep_y(300.0);
        assert_eq!(store.sep_y(), 300.0);
    }

    #[test]
    fn edge_key_distinguishes_duplicate_edges_by_ordinal() {
        let edges = vec![
            Edge::new("a", "b"),
            Edge::new("b", "c"),
            Edge::new("a", "b"),
        ];
        let keys = EdgeKey::for_edges(&edges);
        assert_eq!(
            keys.iter().map(EdgeKey::as_str).collect::<Vec<_>>(),
            vec!["a->b#0", "b->c#0", "a->b#1"]
        );
    }

    #[test]
    fn label_offsets_follow_edges_when_reordered() {
        let mut store = LayoutStore::default();
        assert!(store.set_label_offset(0, Delta::new(10.0, -20.0)));
        assert!(store.set_label_offset(2, Delta::new(5.0, 5.0)));

        assert!(store.move_edge(0, 3));

        assert_eq!(store.edge(3).map(|edge| edge.from.as_str()), Some("user"));
        assert_eq!(store.label_offset(3), Delta::new(10.0, -20.0));
        assert_eq!(store.edge(1).map(|edge| edge.to.as_str()), Some("llm"));
        assert_eq!(store.label_offset(1), Delta::new(5.0, 5.0));
        assert_eq!(store.label_offset(0), Delta::ZERO);
    }

    #[test]
    fn duplicate_edge_offsets_survive_reordering() {
        let mut store = LayoutStore::empty();
        store.set_edges(vec![Edge::new("a", "b"), Edge::new("a", "b"), Edge::new("c", "d")]);
        store.set_label_offset(0, Delta::new(1.0, 1.0));
        store.set_label_offset(1, Delta::new(2.0, 2.0));

        assert!(store.move_edge(0, 2));

        assert_eq!(store.label_offset(0), Delta::new(2.0, 2.0));
        assert_eq!(store.label_offset(2), Delta::new(1.0, 1.0));
        assert_eq!(store.label_offset(1), Delta::ZERO);
    }

    #[test]
    fn node_and_edge_label_mutations_report_unknown_targets() {
        let mut store = LayoutStore::default();
        assert!(store.set_node_label("user", "Analyst"));
        assert_eq!(store.node_meta("user").map(|meta| meta.label.as_str()), Some("Analyst"));
        assert!(!store.set_node_label("missing", "x"));

        assert!(store.set_edge_label(0, None));
        assert_eq!(store.edge(0).and_then(|edge| edge.label.clone()), None);
        assert!(!store.set_edge_label(99, Some("x".to_owned())));
    }

    #[test]
    fn save_then_load_restores_the_same_layout() {
        let kv = MemoryKeyValueStore::default();
        let mut store = LayoutStore::default();
        store.set_position("user", Point::new(40.0, 60.0));
        store.set_label_offset(1, Delta::new(0.0, 30.0));
        store.save(&kv).expect("layout should persist");

        let loaded = LayoutStore::load(&kv).expect("layout should load");
        assert_eq!(loaded, store);
    }

    #[test]
    fn load_without_persisted_layout_uses_defaults() {
        let kv = MemoryKeyValueStore::default();
        let loaded = LayoutStore::load(&kv).expect("layout should load");
        assert_eq!(loaded, LayoutStore::default());
    }

    #[test]
    fn load_with_corrupt_layout_uses_defaults() {
        let kv = MemoryKeyValueStore::default();
        kv.set(LAYOUT_STORAGE_KEY, "{not json").expect("memory store accepts writes");
        let loaded = LayoutStore::load(&kv).expect("corrupt layout should not fail load");
        assert_eq!(loaded, LayoutStore::default());
    }
}
