use tracing::debug;

use crate::geometry::{Delta, Point, midpoint};
use crate::layout::{LabelOffset, LayoutStore};

pub const LABEL_LIFT: Delta = Delta { dx: 0.0, dy: -8.0 };

pub fn label_anchor(a: Point, b: Point, offset: LabelOffset) -> Point {
    midpoint(a, b) + LABEL_LIFT + offset
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelDragState {
    pub edge_index: usize,
    pub start_pointer: Point,
    pub origin_offset: LabelOffset,
}

impl LabelDragState {
    pub fn offset_at(&self, pointer: Point, snap: bool) -> LabelOffset {
        let offset = self.origin_offset + (pointer - self.start_pointer);
        if snap { offset.snapped() } else { offset }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LabelDragController {
    session: Option<LabelDragState>,
}

impl LabelDragController {
    pub fn session(&self) -> Option<&LabelDragState> {
        self.session.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn begin(&mut self, store: &LayoutStore, edge_index: usize, pointer: Point) -> bool {
        if self.session.is_some() || store.edge(edge_index).is_none() {
            return false;
        }
        debug!(edge_index, "edge label drag started");
        self.session = Some(LabelDragState {
            edge_index,
            start_pointer: pointer,
            origin_offset: store.label_offset(edge_index),
        });
        true
    }

    pub fn update(&self, store: &mut LayoutStore, pointer: Point, snap: bool) -> bool {
        let Some(session) = self.session else {
            return false;
        };
        store.set_label_offset(session.edge_index, session.offset_at(pointer, snap))
    }

    pub fn end(&mut self) -> Option<LabelDragState> {
        let session = self.session.take()?;
        debug!(edge_index = session.edge_index, "edge label drag ended");
        Some(session)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeparatorDragState {
    pub start_pointer: Point,
    pub origin_y: f32,
}

impl SeparatorDragState {
    pub fn apply(&self, store: &mut LayoutStore, pointer: Point) {
        store.set_sep_y(self.origin_y + (pointer.y - self.start_pointer.y));
    }
}
