use std::fmt::Write as _;

use crate::canvas::edge::{self, EDGE_COLOR, EdgeStroke};
use crate::canvas::label::label_anchor;
use crate::geometry::{CANVAS_HEIGHT, CANVAS_WIDTH};
use crate::layout::{LayoutStore, NodeShape, NodeView};

pub const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";
pub const ARROW_MARKER_ID: &str = "arrow";
pub const NODE_FILL: &str = "#f8fafc";
pub const CLOUD_FILL: &str = "#eef2ff";
pub const SEPARATOR_COLOR: &str = "#cbd5e1";
pub const NODE_CORNER_RADIUS: f32 = 6.0;
pub const FONT_FAMILY: &str = "sans-serif";
pub const NODE_FONT_SIZE: f32 = 13.0;
pub const LABEL_FONT_SIZE: f32 = 11.0;

#[derive(Debug, Clone, PartialEq)]
pub enum SvgNode {
    Element(SvgElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SvgElement {
    pub name: &'static str,
    pub attributes: Vec<(&'static str, String)>,
    pub children: Vec<SvgNode>,
}

impl SvgElement {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, name: &'static str, value: impl ToString) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Replaces an existing attribute in place, keeping attribute order stable.
    pub fn set_attr(&mut self, name: &'static str, value: impl ToString) {
        let value = value.to_string();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some((_, slot)) => *slot = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn child(mut self, child: SvgElement) -> Self {
        self.children.push(SvgNode::Element(child));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(SvgNode::Text(text.into()));
        self
    }

    pub fn push(&mut self, child: SvgElement) {
        self.children.push(SvgNode::Element(child));
    }

    /// Depth-first search over element descendants, including `self`.
    pub fn find_all<'a>(&'a self, predicate: &dyn Fn(&SvgElement) -> bool, out: &mut Vec<&'a SvgElement>) {
        if predicate(self) {
            out.push(self);
        }
        for child in &self.children {
            if let SvgNode::Element(element) = child {
                element.find_all(predicate, out);
            }
        }
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        let _ = write!(out, "<{}", self.name);
        for (name, value) in &self.attributes {
            let _ = write!(out, " {name}=\"{}\"", escape_xml(value));
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                SvgNode::Element(element) => element.write_xml(out),
                SvgNode::Text(text) => out.push_str(&escape_xml(text)),
            }
        }
        let _ = write!(out, "</{}>", self.name);
    }
}

pub fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Builds the untransformed scene graph: separator, edges, edge labels and
/// nodes, painted in that order.
pub fn build_scene(store: &LayoutStore, orthogonal: bool) -> SvgElement {
    let mut root = SvgElement::new("svg")
        .attr("xmlns", SVG_NAMESPACE)
        .attr("width", CANVAS_WIDTH)
        .attr("height", CANVAS_HEIGHT)
        .child(arrow_defs());

    root.push(
        SvgElement::new("line")
            .attr("class", "separator")
            .attr("x1", 0)
            .attr("y1", store.sep_y())
            .attr("x2", CANVAS_WIDTH)
            .attr("y2", store.sep_y())
            .attr("stroke", SEPARATOR_COLOR)
            .attr("stroke-dasharray", "4 4"),
    );

    let mut edges = SvgElement::new("g").attr("class", "edges");
    let mut labels = SvgElement::new("g").attr("class", "edge-labels");
    for (index, edge) in store.edges().iter().enumerate() {
        let a = store.center(&edge.from);
        let b = store.center(&edge.to);
        for stroke in edge::render(edge, a, b, orthogonal).strokes {
            edges.push(stroke_element(&stroke, index));
        }
        if let Some(label) = &edge.label {
            let anchor = label_anchor(a, b, store.label_offset(index));
            labels.push(
                SvgElement::new("text")
                    .attr("class", "edge-label")
                    .attr("data-edge-index", index)
                    .attr("x", anchor.x)
                    .attr("y", anchor.y)
                    .attr("text-anchor", "middle")
                    .attr("font-family", FONT_FAMILY)
                    .attr("font-size", LABEL_FONT_SIZE)
                    .attr("fill", EDGE_COLOR)
                    .text(label.as_str()),
            );
        }
    }
    root.push(edges);
    root.push(labels);

    let mut nodes = SvgElement::new("g").attr("class", "nodes");
    for node in store.nodes() {
        nodes.push(node_element(&node));
    }
    root.push(nodes);
    root
}

fn arrow_defs() -> SvgElement {
    SvgElement::new("defs").child(
        SvgElement::new("marker")
            .attr("id", ARROW_MARKER_ID)
            .attr("markerWidth", 10)
            .attr("markerHeight", 10)
            .attr("refX", 9)
            .attr("refY", 3)
            .attr("orient", "auto")
            .attr("markerUnits", "strokeWidth")
            .child(
                SvgElement::new("path")
                    .attr("d", "M0,0 L0,6 L9,3 z")
                    .attr("fill", EDGE_COLOR),
            ),
    )
}

fn stroke_element(stroke: &EdgeStroke, index: usize) -> SvgElement {
    let style = stroke.style;
    let mut element = SvgElement::new("path")
        .attr("class", if stroke.is_shadow { "edge-shadow" } else { "edge" })
        .attr("data-edge-index", index)
        .attr("d", stroke.path_data())
        .attr("fill", "none")
        .attr("stroke", style.color)
        .attr("stroke-width", style.width);
    if let Some(dash) = style.dash_attribute() {
        element.set_attr("stroke-dasharray", dash);
    }
    if style.opacity < 1.0 {
        element.set_attr("stroke-opacity", style.opacity);
    }
    if !stroke.is_shadow {
        element.set_attr("marker-end", format!("url(#{ARROW_MARKER_ID})"));
    }
    element
}

fn node_element(node: &NodeView<'_>) -> SvgElement {
    let rect = node.rect;
    let center = rect.center();
    let body = match node.meta.shape {
        NodeShape::Rect => SvgElement::new("rect")
            .attr("x", rect.origin.x)
            .attr("y", rect.origin.y)
            .attr("width", rect.size.w)
            .attr("height", rect.size.h)
            .attr("rx", NODE_CORNER_RADIUS)
            .attr("fill", NODE_FILL),
        NodeShape::Cloud => SvgElement::new("ellipse")
            .attr("cx", center.x)
            .attr("cy", center.y)
            .attr("rx", rect.size.w / 2.0)
            .attr("ry", rect.size.h / 2.0)
            .attr("fill", CLOUD_FILL),
    }
    .attr("stroke", EDGE_COLOR)
    .attr("stroke-width", 1.2);

    SvgElement::new("g")
        .attr("class", "node")
        .attr("data-node-id", node.id)
        .attr("data-shape", node.meta.shape.as_str())
        .child(body)
        .child(
            SvgElement::new("text")
                .attr("x", center.x)
                .attr("y", center.y)
                .attr("text-anchor", "middle")
                .attr("dominant-baseline", "central")
                .attr("font-family", FONT_FAMILY)
                .attr("font-size", NODE_FONT_SIZE)
                .attr("fill", "#0f172a")
                .text(node.meta.label.as_str()),
        )
}
