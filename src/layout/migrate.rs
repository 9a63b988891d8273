use std::collections::BTreeMap;

use super::document::LayoutDocument;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRename {
    pub legacy_id: &'static str,
    pub current_id: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRehome {
    pub from: &'static str,
    pub legacy_to: &'static str,
    pub to: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLabelRewrite {
    pub node_id: &'static str,
    pub legacy_label: &'static str,
    pub canonical_label: &'static str,
    pub rehome: Option<EdgeRehome>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeLabelRewrite {
    pub legacy_label: &'static str,
    pub canonical_label: &'static str,
}

/// Rule table for the load-time migration. No `current_id` or canonical text
/// may appear as a legacy key, otherwise the pass stops being idempotent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRules {
    pub node_renames: Vec<NodeRename>,
    pub label_rewrites: Vec<NodeLabelRewrite>,
    pub edge_label_rewrites: Vec<EdgeLabelRewrite>,
}

impl Default for MigrationRules {
    fn default() -> Self {
        Self {
            node_renames: vec![
                NodeRename {
                    legacy_id: "ai",
                    current_id: "llm",
                },
                NodeRename {
                    legacy_id: "frontend",
                    current_id: "portal",
                },
                NodeRename {
                    legacy_id: "localstore",
                    current_id: "store",
                },
            ],
            label_rewrites: vec![
                NodeLabelRewrite {
                    node_id: "llm",
                    legacy_label: "OpenAI",
                    canonical_label: "LLM Provider",
                    rehome: None,
                },
                NodeLabelRewrite {
                    node_id: "renderer",
                    legacy_label: "Mermaid Renderer",
                    canonical_label: "Diagram Renderer",
                    rehome: None,
                },
                NodeLabelRewrite {
                    node_id: "store",
                    legacy_label: "Local Storage",
                    canonical_label: "Document Store",
                    rehome: Some(EdgeRehome {
                        from: "generator",
                        legacy_to: "store",
                        to: "templates",
                    }),
                },
            ],
            edge_label_rewrites: vec![
                EdgeLabelRewrite {
                    legacy_label: "BRS upload",
                    canonical_label: "uploads BRS",
                },
                EdgeLabelRewrite {
                    legacy_label: "mermaid",
                    canonical_label: "diagram source",
                },
                EdgeLabelRewrite {
                    legacy_label: "reads prompts",
                    canonical_label: "loads template",
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MigrationReport {
    pub renamed_nodes: usize,
    pub rewritten_labels: usize,
    pub rehomed_edges: usize,
    pub normalized_edge_labels: usize,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

pub fn migrate_document(document: &mut LayoutDocument, rules: &MigrationRules) -> MigrationReport {
    let mut report = MigrationReport::default();

    for rename in &rules.node_renames {
        if rename_node(document, rename) {
            report.renamed_nodes += 1;
        }
    }

    for rewrite in &rules.label_rewrites {
        let rewritten = document
            .node_meta
            .as_mut()
            .and_then(|meta| meta.get_mut(rewrite.node_id))
            .filter(|meta| meta.label.trim() == rewrite.legacy_label)
            .map(|meta| meta.label = rewrite.canonical_label.to_owned())
            .is_some();
        if !rewritten {
            continue;
        }
        report.rewritten_labels += 1;

        let (Some(rehome), Some(edges)) = (&rewrite.rehome, document.edge_meta.as_mut()) else {
            continue;
        };
        for edge in edges
            .iter_mut()
            .filter(|edge| edge.from == rehome.from && edge.to == rehome.legacy_to)
        {
            edge.to = rehome.to.to_owned();
            report.rehomed_edges += 1;
        }
    }

    if let Some(edges) = document.edge_meta.as_mut() {
        for edge in edges.iter_mut() {
            let Some(label) = edge.label.as_deref() else {
                continue;
            };
            let normalized = normalize_edge_label(label, &rules.edge_label_rewrites);
            if normalized.as_deref() != Some(label) {
                edge.label = normalized;
                report.normalized_edge_labels += 1;
            }
        }
    }

    report
}

fn rename_node(document: &mut LayoutDocument, rename: &NodeRename) -> bool {
    let mut touched = false;
    touched |= rename_key(&mut document.positions, rename);
    touched |= rename_key(&mut document.sizes, rename);
    if let Some(meta) = document.node_meta.as_mut() {
        touched |= rename_key(meta, rename);
    }
    if let Some(edges) = document.edge_meta.as_mut() {
        for edge in edges.iter_mut() {
            if edge.from == rename.legacy_id {
                edge.from = rename.current_id.to_owned();
                touched = true;
            }
            if edge.to == rename.legacy_id {
                edge.to = rename.current_id.to_owned();
                touched = true;
            }
        }
    }
    touched
}

/// An entry already stored under the current id wins over the legacy one.
fn rename_key<V>(map: &mut BTreeMap<String, V>, rename: &NodeRename) -> bool {
    let Some(value) = map.remove(rename.legacy_id) else {
        return false;
    };
    map.entry(rename.current_id.to_owned()).or_insert(value);
    true
}

fn normalize_edge_label(label: &str, rewrites: &[EdgeLabelRewrite]) -> Option<String> {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return None;
    }
    let canonical = rewrites
        .iter()
        .find(|rewrite| rewrite.legacy_label == trimmed)
        .map_or(trimmed, |rewrite| rewrite.canonical_label);
    Some(canonical.to_owned())
}
