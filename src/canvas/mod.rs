use tracing::{debug, info};

use crate::geometry::{Point, Rect};
use crate::layout::{LayoutStore, NodeId};
use crate::scene::{SvgElement, build_scene};

pub mod edge;
pub mod label;
pub mod node;
pub mod viewport;

use self::edge::EdgePath;
use self::label::{LabelDragController, SeparatorDragState, label_anchor};
use self::node::{NodeInteractionController, ResizeHandle};
use self::viewport::{ViewportController, WheelEvent, WheelOutcome};

/// Half the side of a square resize handle, in scene units.
pub const HANDLE_RADIUS: f32 = 5.0;
pub const SEPARATOR_HIT_TOLERANCE: f32 = 4.0;
/// Rough label hit box; labels are short captions.
pub const LABEL_HIT_HALF_WIDTH: f32 = 40.0;
pub const LABEL_HIT_HALF_HEIGHT: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub fn pans(self) -> bool {
        self.shift || self.alt
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointerButton {
    #[default]
    Primary,
    Middle,
    Secondary,
}

/// A pointer sample in canvas (screen) coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub position: Point,
    pub button: PointerButton,
    pub modifiers: Modifiers,
}

impl PointerEvent {
    pub fn at(position: Point) -> Self {
        Self {
            position,
            button: PointerButton::Primary,
            modifiers: Modifiers::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HitTarget {
    Background,
    Node(NodeId),
    ResizeHandle { node_id: NodeId, handle: ResizeHandle },
    EdgeLabel(usize),
    Separator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerCapture {
    Captured,
    Ignored,
}

/// A label edit the host must resolve (typically with a text prompt) and
/// hand back through [`Editor::commit_edit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditRequest {
    NodeLabel { node_id: NodeId, current: String },
    EdgeLabel { edge_index: usize, current: String },
}

impl EditRequest {
    pub fn prompt(&self) -> &'static str {
        match self {
            Self::NodeLabel { .. } => "Block label",
            Self::EdgeLabel { .. } => "Connector label",
        }
    }

    pub fn current(&self) -> &str {
        match self {
            Self::NodeLabel { current, .. } | Self::EdgeLabel { current, .. } => current,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditorOptions {
    pub snap_to_grid: bool,
    pub orthogonal_edges: bool,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            snap_to_grid: true,
            orthogonal_edges: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEdge {
    pub index: usize,
    pub path: EdgePath,
    pub label: Option<String>,
    pub label_anchor: Point,
}

/// The interaction surface: routes device-independent pointer events to the
/// viewport, node, label and separator controllers over a single store.
#[derive(Debug, Clone)]
pub struct Editor {
    store: LayoutStore,
    viewport: ViewportController,
    nodes: NodeInteractionController,
    labels: LabelDragController,
    separator: Option<SeparatorDragState>,
    options: EditorOptions,
    dirty: bool,
}

impl Editor {
    pub fn new(store: LayoutStore, options: EditorOptions) -> Self {
        Self {
            store,
            viewport: ViewportController::default(),
            nodes: NodeInteractionController::default(),
            labels: LabelDragController::default(),
            separator: None,
            options,
            dirty: false,
        }
    }

    pub fn store(&self) -> &LayoutStore {
        &self.store
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut ViewportController {
        &mut self.viewport
    }

    pub fn options(&self) -> EditorOptions {
        self.options
    }

    pub fn set_snap_to_grid(&mut self, enabled: bool) {
        self.options.snap_to_grid = enabled;
    }

    pub fn set_orthogonal_edges(&mut self, enabled: bool) {
        self.options.orthogonal_edges = enabled;
    }

    /// Returns whether the store changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn is_interacting(&self) -> bool {
        self.viewport.is_panning()
            || self.nodes.is_active()
            || self.labels.is_active()
            || self.separator.is_some()
    }

    pub fn import_json(&mut self, raw: &str) -> Result<(), crate::layout::document::ImportError> {
        self.store.import_json(raw)?;
        self.dirty = true;
        Ok(())
    }

    pub fn rendered_edges(&self) -> Vec<RenderedEdge> {
        self.store
            .edges()
            .iter()
            .enumerate()
            .map(|(index, edge)| {
                let a = self.store.center(&edge.from);
                let b = self.store.center(&edge.to);
                RenderedEdge {
                    index,
                    path: edge::render(edge, a, b, self.options.orthogonal_edges),
                    label: edge.label.clone(),
                    label_anchor: label_anchor(a, b, self.store.label_offset(index)),
                }
            })
            .collect()
    }

    pub fn scene(&self) -> SvgElement {
        build_scene(&self.store, self.options.orthogonal_edges)
    }

    /// Resize handles win over labels, labels over node bodies, and the
    /// separator over the bare background. Later nodes are on top.
    pub fn hit_test(&self, screen: Point) -> HitTarget {
        let scene = self.viewport.state().screen_to_scene(screen);
        let nodes = self.store.nodes().collect::<Vec<_>>();

        for node in nodes.iter().rev() {
            for handle in ResizeHandle::ALL {
                if handle_rect(handle.corner(node.rect)).contains(scene) {
                    return HitTarget::ResizeHandle {
                        node_id: node.id.to_owned(),
                        handle,
                    };
                }
            }
        }

        for rendered in self.rendered_edges().iter().rev() {
            if rendered.label.is_none() {
                continue;
            }
            let anchor = rendered.label_anchor;
            let within = (scene.x - anchor.x).abs() <= LABEL_HIT_HALF_WIDTH
                && (scene.y - anchor.y).abs() <= LABEL_HIT_HALF_HEIGHT;
            if within {
                return HitTarget::EdgeLabel(rendered.index);
            }
        }

        if let Some(node) = nodes.iter().rev().find(|node| node.rect.contains(scene)) {
            return HitTarget::Node(node.id.to_owned());
        }

        if (scene.y - self.store.sep_y()).abs() <= SEPARATOR_HIT_TOLERANCE {
            return HitTarget::Separator;
        }

        HitTarget::Background
    }

    pub fn pointer_down(&mut self, target: &HitTarget, event: PointerEvent) -> PointerCapture {
        if self.is_interacting() {
            return PointerCapture::Ignored;
        }

        let on_background = matches!(target, HitTarget::Background);
        if ViewportController::should_start_pan(on_background, event.button, event.modifiers) {
            self.viewport.begin_pan(event.position);
            return PointerCapture::Captured;
        }
        if event.button != PointerButton::Primary {
            return PointerCapture::Ignored;
        }

        let scene = self.viewport.state().screen_to_scene(event.position);
        let started = match target {
            HitTarget::ResizeHandle { node_id, handle } => {
                self.nodes.begin_resize(&self.store, node_id, *handle, scene)
            }
            HitTarget::Node(node_id) => self.nodes.begin_drag(&self.store, node_id, scene),
            HitTarget::EdgeLabel(edge_index) => self.labels.begin(&self.store, *edge_index, scene),
            HitTarget::Separator => {
                debug!(sep_y = self.store.sep_y(), "separator drag started");
                self.separator = Some(SeparatorDragState {
                    start_pointer: scene,
                    origin_y: self.store.sep_y(),
                });
                true
            }
            HitTarget::Background => false,
        };

        if started {
            PointerCapture::Captured
        } else {
            PointerCapture::Ignored
        }
    }

    pub fn pointer_move(&mut self, event: PointerEvent) -> bool {
        if self.viewport.update_pan(event.position) {
            return true;
        }

        let scene = self.viewport.state().screen_to_scene(event.position);
        let snap = self.options.snap_to_grid;
        let changed = if self.nodes.is_active() {
            self.nodes.update(&mut self.store, scene, snap)
        } else if self.labels.is_active() {
            self.labels.update(&mut self.store, scene, snap)
        } else if let Some(separator) = self.separator {
            separator.apply(&mut self.store, scene);
            true
        } else {
            false
        };
        self.dirty |= changed;
        changed
    }

    pub fn pointer_up(&mut self, event: PointerEvent) {
        self.pointer_move(event);
        self.viewport.end_pan();
        self.nodes.end();
        self.labels.end();
        if self.separator.take().is_some() {
            debug!(sep_y = self.store.sep_y(), "separator drag ended");
        }
    }

    /// Captured gestures survive the pointer leaving the canvas; only panning
    /// stops.
    pub fn pointer_leave(&mut self) {
        self.viewport.end_pan();
    }

    pub fn wheel(&mut self, event: WheelEvent) -> WheelOutcome {
        self.viewport.handle_wheel(event)
    }

    pub fn double_click(&self, target: &HitTarget) -> Option<EditRequest> {
        match target {
            HitTarget::Node(node_id) => {
                self.store
                    .node_meta(node_id)
                    .map(|meta| EditRequest::NodeLabel {
                        node_id: node_id.clone(),
                        current: meta.label.clone(),
                    })
            }
            HitTarget::EdgeLabel(edge_index) => {
                self.store.edge(*edge_index).map(|edge| EditRequest::EdgeLabel {
                    edge_index: *edge_index,
                    current: edge.label.clone().unwrap_or_default(),
                })
            }
            HitTarget::Background | HitTarget::ResizeHandle { .. } | HitTarget::Separator => None,
        }
    }

    /// `None` means the prompt was dismissed. Blank node labels are ignored;
    /// a blank edge label removes the label.
    pub fn commit_edit(&mut self, request: &EditRequest, response: Option<&str>) -> bool {
        let Some(text) = response else {
            return false;
        };
        let text = text.trim();
        let committed = match request {
            EditRequest::NodeLabel { node_id, .. } => {
                !text.is_empty() && self.store.set_node_label(node_id, text)
            }
            EditRequest::EdgeLabel { edge_index, .. } => {
                let label = (!text.is_empty()).then(|| text.to_owned());
                self.store.set_edge_label(*edge_index, label)
            }
        };
        if committed {
            info!(request = ?request, "label edited");
            self.dirty = true;
        }
        committed
    }
}

fn handle_rect(corner: Point) -> Rect {
    Rect::new(
        Point::new(corner.x - HANDLE_RADIUS, corner.y - HANDLE_RADIUS),
        crate::geometry::Size::new(HANDLE_RADIUS * 2.0, HANDLE_RADIUS * 2.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Delta, Size};
    use crate::layout::NodeShape;

    fn editor() -> Editor {
        Editor::new(LayoutStore::default(), EditorOptions::default())
    }

    fn primary(x: f32, y: f32) -> PointerEvent {
        PointerEvent::at(Point::new(x, y))
    }

    #[test]
    fn hit_test_prefers_resize_handles_over_bodies() {
        let editor = editor();
        let rect = editor.store().rect("user");

        assert_eq!(
            editor.hit_test(Point::new(rect.right(), rect.bottom())),
            HitTarget::ResizeHandle {
                node_id: "user".to_owned(),
                handle: ResizeHandle::SouthEast,
            }
        );
        assert_eq!(
            editor.hit_test(rect.center()),
            HitTarget::Node("user".to_owned())
        );
        assert_eq!(editor.hit_test(Point::new(5.0, 5.0)), HitTarget::Background);
        assert_eq!(
            editor.hit_test(Point::new(5.0, editor.store().sep_y() + 2.0)),
            HitTarget::Separator
        );
    }

    #[test]
    fn hit_test_accounts_for_viewport_transform() {
        let mut editor = editor();
        editor.viewport_mut().pan(100.0, 50.0);
        editor.viewport_mut().zoom(1.0);
        let center = editor.store().center("user");
        let screen = editor.viewport().state().scene_to_screen(center);
        assert_eq!(editor.hit_test(screen), HitTarget::Node("user".to_owned()));
    }

    #[test]
    fn dragging_a_node_moves_it_by_scene_delta() {
        let mut editor = editor();
        editor.set_snap_to_grid(false);
        editor.viewport_mut().zoom(1.0);
        let before = editor.store().position("user");
        let target = HitTarget::Node("user".to_owned());

        assert_eq!(editor.pointer_down(&target, primary(10.0, 10.0)), PointerCapture::Captured);
        editor.pointer_move(primary(50.0, 30.0));
        editor.pointer_up(primary(50.0, 30.0));

        assert_eq!(editor.store().position("user"), before + Delta::new(20.0, 10.0));
        assert!(editor.take_dirty());
        assert!(!editor.take_dirty());
        assert!(!editor.is_interacting());
    }

    #[test]
    fn resize_handle_drag_resizes_from_opposite_anchor() {
        let mut editor = editor();
        editor.set_snap_to_grid(false);
        let rect = editor.store().rect("user");
        let target = HitTarget::ResizeHandle {
            node_id: "user".to_owned(),
            handle: ResizeHandle::NorthWest,
        };

        editor.pointer_down(&target, primary(rect.origin.x, rect.origin.y));
        editor.pointer_up(primary(rect.origin.x + 20.0, rect.origin.y + 10.0));

        let after = editor.store().rect("user");
        assert_eq!(after.size, Size::new(rect.size.w - 20.0, rect.size.h - 10.0));
        assert_eq!(after.right(), rect.right());
        assert_eq!(after.bottom(), rect.bottom());
    }

    #[test]
    fn background_press_pans_until_pointer_leaves() {
        let mut editor = editor();
        let before = editor.store().clone();

        assert_eq!(
            editor.pointer_down(&HitTarget::Background, primary(0.0, 0.0)),
            PointerCapture::Captured
        );
        editor.pointer_move(primary(30.0, -20.0));
        editor.pointer_leave();
        editor.pointer_move(primary(300.0, 300.0));

        assert_eq!(editor.viewport().offset(), Point::new(30.0, -20.0));
        assert_eq!(editor.store(), &before);
        assert!(!editor.is_interacting());
    }

    #[test]
    fn node_drag_survives_pointer_leaving_the_canvas() {
        let mut editor = editor();
        editor.set_snap_to_grid(false);
        let before = editor.store().position("user");

        editor.pointer_down(&HitTarget::Node("user".to_owned()), primary(10.0, 10.0));
        editor.pointer_move(primary(20.0, 10.0));
        editor.pointer_leave();
        assert!(editor.is_interacting());

        editor.pointer_move(primary(45.0, 40.0));
        assert_eq!(editor.store().position("user"), before + Delta::new(35.0, 30.0));

        editor.pointer_up(primary(45.0, 40.0));
        assert!(!editor.is_interacting());
        editor.pointer_move(primary(400.0, 400.0));
        assert_eq!(editor.store().position("user"), before + Delta::new(35.0, 30.0));
        assert_eq!(editor.viewport().offset(), Point::ORIGIN);
    }

    #[test]
    fn label_drag_survives_pointer_leaving_the_canvas() {
        let mut editor = editor();
        editor.set_snap_to_grid(true);
        let anchor = editor.rendered_edges()[0].label_anchor;

        editor.pointer_down(&HitTarget::EdgeLabel(0), primary(anchor.x, anchor.y));
        editor.pointer_leave();
        assert!(editor.is_interacting());
        editor.pointer_up(primary(anchor.x + 12.0, anchor.y + 18.0));

        assert_eq!(editor.store().label_offset(0), Delta::new(10.0, 20.0));
        assert!(!editor.is_interacting());
    }

    #[test]
    fn middle_button_on_node_pans_instead_of_dragging() {
        let mut editor = editor();
        let before = editor.store().position("user");
        let event = PointerEvent {
            button: PointerButton::Middle,
            ..primary(0.0, 0.0)
        };

        editor.pointer_down(&HitTarget::Node("user".to_owned()), event);
        editor.pointer_up(PointerEvent {
            position: Point::new(40.0, 40.0),
            ..event
        });

        assert_eq!(editor.store().position("user"), before);
        assert_eq!(editor.viewport().offset(), Point::new(40.0, 40.0));
    }

    #[test]
    fn second_press_during_gesture_is_ignored() {
        let mut editor = editor();
        editor.pointer_down(&HitTarget::Node("user".to_owned()), primary(0.0, 0.0));
        assert_eq!(
            editor.pointer_down(&HitTarget::Background, primary(0.0, 0.0)),
            PointerCapture::Ignored
        );
        assert!(!editor.viewport().is_panning());
    }

    #[test]
    fn label_drag_updates_offset_and_anchor() {
        let mut editor = editor();
        editor.set_snap_to_grid(true);
        let anchor = editor.rendered_edges()[0].label_anchor;

        editor.pointer_down(&HitTarget::EdgeLabel(0), primary(anchor.x, anchor.y));
        editor.pointer_up(primary(anchor.x + 23.0, anchor.y - 7.0));

        assert_eq!(editor.store().label_offset(0), Delta::new(20.0, -10.0));
        let moved = editor.rendered_edges()[0].label_anchor;
        assert_eq!(moved, anchor + Delta::new(20.0, -10.0));
    }

    #[test]
    fn separator_drag_moves_guide_line() {
        let mut editor = editor();
        let sep_y = editor.store().sep_y();
        editor.pointer_down(&HitTarget::Separator, primary(10.0, sep_y));
        editor.pointer_up(primary(10.0, sep_y - 100.0));
        assert_eq!(editor.store().sep_y(), sep_y - 100.0);
    }

    #[test]
    fn double_click_produces_edit_requests() {
        let mut editor = editor();
        let request = editor
            .double_click(&HitTarget::Node("llm".to_owned()))
            .expect("node edit should be requested");
        assert_eq!(request.current(), "LLM Provider");

        assert!(editor.commit_edit(&request, Some("  Model Gateway ")));
        assert_eq!(
            editor.store().node_meta("llm").map(|meta| meta.label.as_str()),
            Some("Model Gateway")
        );
        assert_eq!(editor.store().node_meta("llm").map(|meta| meta.shape), Some(NodeShape::Cloud));

        assert!(!editor.commit_edit(&request, None));
        assert!(!editor.commit_edit(&request, Some("   ")));
        assert!(editor.double_click(&HitTarget::Background).is_none());
    }

    #[test]
    fn blank_edge_label_edit_clears_label_but_not_offset() {
        let mut editor = editor();
        let request = editor
            .double_click(&HitTarget::EdgeLabel(2))
            .expect("edge edit should be requested");
        assert!(editor.commit_edit(&request, Some("")));
        assert_eq!(editor.store().edge(2).and_then(|edge| edge.label.clone()), None);
        assert_eq!(editor.store().label_offset(2), Delta::ZERO);
    }

    #[test]
    fn failed_import_leaves_editor_untouched() {
        let mut editor = editor();
        let before = editor.store().clone();
        assert!(editor.import_json(r#"{"positions": {}}"#).is_err());
        assert_eq!(editor.store(), &before);
        assert!(!editor.take_dirty());
    }
}
