use crate::canvas::viewport::ViewportState;
use crate::geometry::{CANVAS_HEIGHT, CANVAS_WIDTH};
use crate::layout::LayoutStore;
use crate::scene::{SvgElement, SvgNode};

pub mod delivery;
pub mod raster;

pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
pub const SVG_FILENAME: &str = "block-diagram.svg";
pub const PNG_FILENAME: &str = "block-diagram.png";
pub const LAYOUT_FILENAME: &str = "block-diagram-layout.json";
pub const TEST_EXPORT_FILENAME: &str = "test-export.svg";
pub const SVG_MIME: &str = "image/svg+xml";
pub const PNG_MIME: &str = "image/png";
pub const JSON_MIME: &str = "application/json";
/// Copied instead of binary PNG data when only the clipboard is left.
pub const PNG_CLIPBOARD_MARKER: &str = "[block-diagram.png: PNG export could not be saved; use SVG export instead]";
pub const TEST_EXPORT_WIDTH: f32 = 240.0;
pub const TEST_EXPORT_HEIGHT: f32 = 120.0;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to serialize layout: {0}")]
    Layout(#[source] serde_json::Error),
    #[error("failed to parse serialized SVG for rasterization: {0}")]
    SvgParse(#[source] usvg::Error),
    #[error("failed to allocate a {width}x{height} pixmap")]
    Pixmap { width: u32, height: u32 },
    #[error("failed to encode PNG: {0}")]
    PngEncode(String),
    #[error("every delivery strategy failed for `{filename}`: {}", summarize(.failures))]
    FallbackExhausted {
        filename: String,
        failures: Vec<delivery::AttemptFailure>,
    },
}

fn summarize(failures: &[delivery::AttemptFailure]) -> String {
    if failures.is_empty() {
        return "no strategies configured".to_owned();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub filename: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
    /// What the clipboard fallback copies.
    pub clipboard_text: String,
}

impl ExportArtifact {
    pub fn text(filename: &str, mime: &'static str, text: String) -> Self {
        Self {
            filename: filename.to_owned(),
            mime,
            bytes: text.clone().into_bytes(),
            clipboard_text: text,
        }
    }

    pub fn extension(&self) -> &str {
        self.filename
            .rsplit_once('.')
            .map(|(_, extension)| extension)
            .unwrap_or("")
    }
}

/// Serializes the scene as the user currently sees it: explicit canvas size
/// on the root and every child wrapped in one group carrying the viewport
/// transform.
pub fn serialize_scene(scene: &SvgElement, viewport: ViewportState) -> String {
    serialize_sized(scene, viewport, CANVAS_WIDTH, CANVAS_HEIGHT)
}

fn serialize_sized(scene: &SvgElement, viewport: ViewportState, width: f32, height: f32) -> String {
    let mut root = scene.clone();
    root.set_attr("width", width);
    root.set_attr("height", height);
    root.set_attr("viewBox", format!("0 0 {width} {height}"));

    let (defs, content): (Vec<_>, Vec<_>) = std::mem::take(&mut root.children)
        .into_iter()
        .partition(|child| matches!(child, SvgNode::Element(element) if element.name == "defs"));
    let mut group = SvgElement::new("g").attr("transform", viewport.transform_attribute());
    group.children = content;
    root.children = defs;
    root.push(group);

    format!("{XML_DECLARATION}\n{}", root.to_xml())
}

pub fn svg_artifact(store: &LayoutStore, viewport: ViewportState, orthogonal: bool) -> ExportArtifact {
    let scene = crate::scene::build_scene(store, orthogonal);
    ExportArtifact::text(SVG_FILENAME, SVG_MIME, serialize_scene(&scene, viewport))
}

pub fn png_artifact(
    store: &LayoutStore,
    viewport: ViewportState,
    orthogonal: bool,
) -> Result<ExportArtifact, ExportError> {
    let scene = crate::scene::build_scene(store, orthogonal);
    let svg = serialize_scene(&scene, viewport);
    let bytes = raster::rasterize_svg(&svg, raster::PIXEL_DENSITY)?;
    Ok(ExportArtifact {
        filename: PNG_FILENAME.to_owned(),
        mime: PNG_MIME,
        bytes,
        clipboard_text: PNG_CLIPBOARD_MARKER.to_owned(),
    })
}

pub fn layout_artifact(store: &LayoutStore) -> Result<ExportArtifact, ExportError> {
    let json = store.to_json().map_err(ExportError::Layout)?;
    Ok(ExportArtifact::text(LAYOUT_FILENAME, JSON_MIME, json))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Svg,
    Png,
    Layout,
    Test,
}

impl ExportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Png => "png",
            Self::Layout => "layout",
            Self::Test => "test",
        }
    }
}

/// A snapshot of everything an export needs, so artifacts can be built off
/// the interactive thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub kind: ExportKind,
    pub store: LayoutStore,
    pub viewport: ViewportState,
    pub orthogonal: bool,
}

impl ExportRequest {
    pub fn build(&self) -> Result<ExportArtifact, ExportError> {
        match self.kind {
            ExportKind::Svg => Ok(svg_artifact(&self.store, self.viewport, self.orthogonal)),
            ExportKind::Png => png_artifact(&self.store, self.viewport, self.orthogonal),
            ExportKind::Layout => layout_artifact(&self.store),
            ExportKind::Test => Ok(test_artifact()),
        }
    }
}

/// A fixed diagram that does not depend on editor state, for checking which
/// delivery strategies work in the current environment.
pub fn test_artifact() -> ExportArtifact {
    let scene = SvgElement::new("svg")
        .attr("xmlns", crate::scene::SVG_NAMESPACE)
        .child(
            SvgElement::new("rect")
                .attr("x", 10)
                .attr("y", 10)
                .attr("width", 220)
                .attr("height", 100)
                .attr("rx", 8)
                .attr("fill", crate::scene::NODE_FILL)
                .attr("stroke", crate::canvas::edge::EDGE_COLOR),
        )
        .child(
            SvgElement::new("text")
                .attr("x", 120)
                .attr("y", 64)
                .attr("text-anchor", "middle")
                .attr("font-family", crate::scene::FONT_FAMILY)
                .attr("font-size", 16)
                .text("Export test"),
        );
    let svg = serialize_sized(
        &scene,
        ViewportState::default(),
        TEST_EXPORT_WIDTH,
        TEST_EXPORT_HEIGHT,
    );
    ExportArtifact::text(TEST_EXPORT_FILENAME, SVG_MIME, svg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    #[test]
    fn serialized_scene_wraps_content_in_viewport_group() {
        let store = LayoutStore::default();
        let viewport = ViewportState {
            scale: 1.5,
            offset: Point::new(-20.0, 35.0),
        };
        let svg = svg_artifact(&store, viewport, false);
        let text = String::from_utf8(svg.bytes.clone()).expect("svg should be utf-8");

        assert!(text.starts_with(XML_DECLARATION));
        assert!(text.contains(r#"width="1800""#));
        assert!(text.contains(r#"height="900""#));
        assert!(text.contains(r#"<g transform="translate(-20,35) scale(1.5)">"#));
        assert_eq!(text.matches("translate(").count(), 1);
        assert!(text.contains("Spec Authoring Portal"));
        assert_eq!(svg.mime, SVG_MIME);
        assert_eq!(svg.filename, SVG_FILENAME);
        assert_eq!(svg.clipboard_text, text);
    }

    #[test]
    fn defs_stay_outside_the_transformed_group() {
        let scene = crate::scene::build_scene(&LayoutStore::default(), false);
        let svg = serialize_scene(&scene, ViewportState::default());
        let defs = svg.find("<defs>").expect("defs should be serialized");
        let group = svg.find("<g transform=").expect("group should be serialized");
        assert!(defs < group);
    }

    #[test]
    fn serialization_does_not_mutate_live_scene() {
        let scene = crate::scene::build_scene(&LayoutStore::default(), false);
        let before = scene.clone();
        let _ = serialize_scene(&scene, ViewportState::default());
        assert_eq!(scene, before);
        assert_eq!(scene.get_attr("viewBox"), None);
    }

    #[test]
    fn test_artifact_is_small_and_static() {
        let artifact = test_artifact();
        assert_eq!(artifact.filename, TEST_EXPORT_FILENAME);
        assert_eq!(artifact.extension(), "svg");
        assert!(artifact.clipboard_text.contains(r#"viewBox="0 0 240 120""#));
        assert_eq!(artifact, test_artifact());
    }

    #[test]
    fn test_request_ignores_diagram_state() {
        let request = ExportRequest {
            kind: ExportKind::Test,
            store: LayoutStore::empty(),
            viewport: ViewportState {
                scale: 3.0,
                offset: Point::new(500.0, 500.0),
            },
            orthogonal: true,
        };
        assert_eq!(request.build().expect("test export builds"), test_artifact());
    }

    #[test]
    fn layout_artifact_round_trips_through_import() {
        let mut store = LayoutStore::default();
        store.set_sep_y(300.0);
        let artifact = layout_artifact(&store).expect("layout should serialize");
        let imported = LayoutStore::from_json(&artifact.clipboard_text).expect("layout should import");
        assert_eq!(imported.sep_y(), 300.0);
        assert_eq!(artifact.mime, JSON_MIME);
    }
}
