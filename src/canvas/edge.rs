use std::fmt::Write as _;

use crate::geometry::{Delta, Point};
use crate::layout::{Edge, EdgeStyle};

pub const EDGE_COLOR: &str = "#334155";
pub const DASHED_EDGE_COLOR: &str = "#8a8f98";
pub const DASH_PATTERN: [f32; 2] = [6.0, 4.0];
pub const BOLD_SHADOW_OPACITY: f32 = 0.25;
pub const BOLD_SHADOW_OFFSET: Delta = Delta { dx: 0.0, dy: 2.0 };

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    pub color: &'static str,
    pub width: f32,
    pub dash: Option<[f32; 2]>,
    pub opacity: f32,
}

impl StrokeStyle {
    pub fn for_edge(style: Option<EdgeStyle>) -> Self {
        match style {
            Some(EdgeStyle::Dashed) => Self {
                color: DASHED_EDGE_COLOR,
                width: 1.4,
                dash: Some(DASH_PATTERN),
                opacity: 1.0,
            },
            Some(EdgeStyle::Bold) => Self {
                color: EDGE_COLOR,
                width: 4.0,
                dash: None,
                opacity: 1.0,
            },
            Some(EdgeStyle::Solid) => Self {
                color: EDGE_COLOR,
                width: 1.6,
                dash: None,
                opacity: 1.0,
            },
            None => Self {
                color: EDGE_COLOR,
                width: 1.2,
                dash: None,
                opacity: 1.0,
            },
        }
    }

    pub fn dash_attribute(&self) -> Option<String> {
        self.dash.map(|[on, off]| format!("{on} {off}"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeStroke {
    pub points: Vec<Point>,
    pub style: StrokeStyle,
    /// Shadows are decoration only and carry no arrowhead.
    pub is_shadow: bool,
}

impl EdgeStroke {
    pub fn path_data(&self) -> String {
        let mut data = String::new();
        for (index, point) in self.points.iter().enumerate() {
            let command = if index == 0 { 'M' } else { 'L' };
            if index > 0 {
                data.push(' ');
            }
            let _ = write!(data, "{command}{} {}", point.x, point.y);
        }
        data
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgePath {
    /// Painted in order; a bold shadow comes before the main stroke.
    pub strokes: Vec<EdgeStroke>,
}

impl EdgePath {
    pub fn main(&self) -> Option<&EdgeStroke> {
        self.strokes.iter().find(|stroke| !stroke.is_shadow)
    }
}

pub fn route(a: Point, b: Point, orthogonal: bool) -> Vec<Point> {
    if orthogonal {
        let mid_x = (a.x + b.x) / 2.0;
        vec![a, Point::new(mid_x, a.y), Point::new(mid_x, b.y), b]
    } else {
        vec![a, b]
    }
}

pub fn render(edge: &Edge, a: Point, b: Point, orthogonal: bool) -> EdgePath {
    let style = StrokeStyle::for_edge(edge.style);
    let points = route(a, b, orthogonal);
    let mut strokes = Vec::with_capacity(2);

    if !orthogonal && edge.style == Some(EdgeStyle::Bold) {
        strokes.push(EdgeStroke {
            points: points.iter().map(|point| *point + BOLD_SHADOW_OFFSET).collect(),
            style: StrokeStyle {
                width: style.width + 2.0,
                opacity: BOLD_SHADOW_OPACITY,
                ..style
            },
            is_shadow: true,
        });
    }
    strokes.push(EdgeStroke {
        points,
        style,
        is_shadow: false,
    });

    EdgePath { strokes }
}
