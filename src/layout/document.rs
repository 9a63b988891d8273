use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::geometry::{Point, Size};

use super::{Edge, LabelOffset, NodeId, NodeMeta};

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("layout is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("layout must be a JSON object")]
    NotAnObject,

    #[error("layout is missing required `{section}` object")]
    MissingSection { section: &'static str },

    #[error("layout has an invalid shape: {0}")]
    Shape(#[source] serde_json::Error),
}

/// Wire form of a layout. `positions` and `sizes` are required; every other
/// section is merged over the existing store only when present.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDocument {
    pub positions: BTreeMap<NodeId, Point>,
    pub sizes: BTreeMap<NodeId, Size>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_meta: Option<BTreeMap<NodeId, NodeMeta>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_edge_meta"
    )]
    pub edge_meta: Option<Vec<Edge>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sep_y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_offsets: Option<BTreeMap<String, LabelOffset>>,
}

pub fn parse_layout_document(raw: &str) -> Result<LayoutDocument, ImportError> {
    let value = serde_json::from_str::<Value>(raw).map_err(ImportError::Json)?;
    let Some(object) = value.as_object() else {
        return Err(ImportError::NotAnObject);
    };

    for section in ["positions", "sizes"] {
        if !object.get(section).is_some_and(Value::is_object) {
            return Err(ImportError::MissingSection { section });
        }
    }

    serde_json::from_value(value).map_err(ImportError::Shape)
}

fn deserialize_edge_meta<'de, D>(deserializer: D) -> Result<Option<Vec<Edge>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    coerce_edge_meta(value).map_err(serde::de::Error::custom)
}

/// Accepts `edgeMeta` as an array or as an object keyed by numeric strings.
/// Object entries are ordered by index; holes and non-numeric keys are dropped.
pub fn coerce_edge_meta(value: Value) -> Result<Option<Vec<Edge>>, String> {
    let entries = match value {
        Value::Null => return Ok(None),
        Value::Array(items) => items,
        Value::Object(map) => {
            let mut indexed = map
                .into_iter()
                .filter_map(|(key, entry)| {
                    key.trim().parse::<usize>().ok().map(|index| (index, entry))
                })
                .collect::<Vec<_>>();
            indexed.sort_by_key(|(index, _)| *index);
            indexed.into_iter().map(|(_, entry)| entry).collect()
        }
        other => {
            return Err(format!(
                "edgeMeta must be an array or an index-keyed object, got {}",
                json_kind(&other)
            ));
        }
    };

    entries
        .into_iter()
        .filter(|entry| !entry.is_null())
        .enumerate()
        .map(|(index, entry)| {
            serde_json::from_value::<Edge>(entry)
                .map_err(|error| format!("invalid edgeMeta entry {index}: {error}"))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::layout::EdgeStyle;

    #[test]
    fn rejects_invalid_json() {
        let error = parse_layout_document("{positions:").expect_err("invalid JSON should fail");
        assert!(matches!(error, ImportError::Json(_)));
    }

    #[test]
    fn rejects_non_object_layouts() {
        let error = parse_layout_document("[1, 2]").expect_err("array should fail");
        assert!(matches!(error, ImportError::NotAnObject));
    }

    #[test]
    fn requires_positions_and_sizes() {
        let error = parse_layout_document(r#"{"sizes": {}}"#).expect_err("positions required");
        assert!(matches!(
            error,
            ImportError::MissingSection {
                section: "positions"
            }
        ));

        let error = parse_layout_document(r#"{"positions": {}, "sizes": []}"#)
            .expect_err("sizes must be an object");
        assert!(matches!(error, ImportError::MissingSection { section: "sizes" }));
    }

    #[test]
    fn optional_sections_default_to_absent() {
        let document = parse_layout_document(
            r#"{"positions": {"a": {"x": 1, "y": 2}}, "sizes": {"a": {"w": 80, "h": 30}}}"#,
        )
        .expect("minimal layout should parse");

        assert_eq!(document.positions.get("a"), Some(&Point::new(1.0, 2.0)));
        assert_eq!(document.sizes.get("a"), Some(&Size::new(80.0, 30.0)));
        assert!(document.node_meta.is_none());
        assert!(document.edge_meta.is_none());
        assert!(document.sep_y.is_none());
        assert!(document.label_offsets.is_none());
    }

    #[test]
    fn edge_meta_object_is_coerced_to_ordered_array() {
        let edges = coerce_edge_meta(json!({
            "2": {"from": "c", "to": "d", "style": "dashed"},
            "0": {"from": "a", "to": "b", "label": "first"},
            "5": null,
            "name": {"from": "x", "to": "y"}
        }))
        .expect("object form should coerce")
        .expect("edges should be present");

        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].from, "a");
        assert_eq!(edges[0].label.as_deref(), Some("first"));
        assert_eq!(edges[1].to, "d");
        assert_eq!(edges[1].style, Some(EdgeStyle::Dashed));
    }

    #[test]
    fn edge_meta_array_drops_null_holes() {
        let edges = coerce_edge_meta(json!([null, {"from": "a", "to": "b"}, null]))
            .expect("array form should coerce")
            .expect("edges should be present");
        assert_eq!(edges, vec![Edge::new("a", "b")]);
    }

    #[test]
    fn edge_meta_rejects_scalars_and_bad_entries() {
        let error = coerce_edge_meta(json!("edges")).expect_err("string should fail");
        assert!(error.contains("a string"));

        let error = coerce_edge_meta(json!([{"from": "a"}])).expect_err("missing `to` fails");
        assert!(error.contains("invalid edgeMeta entry 0"));

        let error = parse_layout_document(
            r#"{"positions": {}, "sizes": {}, "edgeMeta": [{"from": "a", "to": "b", "style": "wavy"}]}"#,
        )
        .expect_err("unknown style should fail");
        assert!(matches!(error, ImportError::Shape(_)));
    }

    #[test]
    fn document_serializes_with_camel_case_sections() {
        let document = LayoutDocument {
            positions: BTreeMap::from([("a".to_owned(), Point::new(10.0, 20.0))]),
            sizes: BTreeMap::from([("a".to_owned(), Size::new(140.0, 44.0))]),
            node_meta: None,
            edge_meta: Some(vec![Edge::new("a", "a")]),
            sep_y: Some(450.0),
            label_offsets: Some(BTreeMap::from([(
                "0".to_owned(),
                LabelOffset::new(3.0, -4.0),
            )])),
        };

        let value = serde_json::to_value(&document).expect("document should serialize");
        assert_eq!(value["edgeMeta"][0]["from"], "a");
        assert!(value["edgeMeta"][0].get("label").is_none());
        assert_eq!(value["sepY"], 450.0);
        assert_eq!(value["labelOffsets"]["0"]["dx"], 3.0);
        assert!(value.get("nodeMeta").is_none());
    }
}
