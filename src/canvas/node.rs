use tracing::debug;

use crate::geometry::{
    Delta, MIN_NODE_HEIGHT, MIN_NODE_WIDTH, Point, Rect, Size, snap_down_to_grid, snap_to_grid,
    snap_up_to_grid,
};
use crate::layout::{LayoutStore, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResizeHandle {
    NorthWest,
    NorthEast,
    SouthEast,
    SouthWest,
}

impl ResizeHandle {
    pub const ALL: [Self; 4] = [
        Self::NorthWest,
        Self::NorthEast,
        Self::SouthEast,
        Self::SouthWest,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NorthWest => "nw",
            Self::NorthEast => "ne",
            Self::SouthEast => "se",
            Self::SouthWest => "sw",
        }
    }

    pub fn moves_left_edge(self) -> bool {
        matches!(self, Self::NorthWest | Self::SouthWest)
    }

    pub fn moves_top_edge(self) -> bool {
        matches!(self, Self::NorthWest | Self::NorthEast)
    }

    /// The corner this handle sits on.
    pub fn corner(self, rect: Rect) -> Point {
        let x = if self.moves_left_edge() {
            rect.origin.x
        } else {
            rect.right()
        };
        let y = if self.moves_top_edge() {
            rect.origin.y
        } else {
            rect.bottom()
        };
        Point::new(x, y)
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::NorthWest => Self::SouthEast,
            Self::NorthEast => Self::SouthWest,
            Self::SouthEast => Self::NorthWest,
            Self::SouthWest => Self::NorthEast,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragState {
    pub start_pointer: Point,
    pub origin_position: Point,
}

impl DragState {
    pub fn position_at(&self, pointer: Point, snap: bool) -> Point {
        let position = self.origin_position + (pointer - self.start_pointer);
        if snap { position.snapped() } else { position }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeState {
    pub handle: ResizeHandle,
    pub start_pointer: Point,
    pub origin_position: Point,
    pub origin_size: Size,
}

impl ResizeState {
    pub fn rect_at(&self, pointer: Point, snap: bool) -> Rect {
        let origin = Rect::new(self.origin_position, self.origin_size);
        let delta = pointer - self.start_pointer;
        if snap {
            resize_rect_snapped(self.handle, origin, delta)
        } else {
            resize_rect(self.handle, origin, delta)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeGesture {
    Dragging(DragState),
    Resizing(ResizeState),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeSession {
    pub node_id: NodeId,
    pub gesture: NodeGesture,
}

/// Drives one node at a time through `Idle -> Dragging | Resizing -> Idle`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeInteractionController {
    session: Option<NodeSession>,
}

impl NodeInteractionController {
    pub fn session(&self) -> Option<&NodeSession> {
        self.session.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn begin_drag(&mut self, store: &LayoutStore, node_id: &str, pointer: Point) -> bool {
        if self.session.is_some() || !store.contains_node(node_id) {
            return false;
        }
        debug!(node_id, "node drag started");
        self.session = Some(NodeSession {
            node_id: node_id.to_owned(),
            gesture: NodeGesture::Dragging(DragState {
                start_pointer: pointer,
                origin_position: store.position(node_id),
            }),
        });
        true
    }

    pub fn begin_resize(
        &mut self,
        store: &LayoutStore,
        node_id: &str,
        handle: ResizeHandle,
        pointer: Point,
    ) -> bool {
        if self.session.is_some() || !store.contains_node(node_id) {
            return false;
        }
        debug!(node_id, handle = handle.as_str(), "node resize started");
        let rect = store.rect(node_id);
        self.session = Some(NodeSession {
            node_id: node_id.to_owned(),
            gesture: NodeGesture::Resizing(ResizeState {
                handle,
                start_pointer: pointer,
                origin_position: rect.origin,
                origin_size: rect.size,
            }),
        });
        true
    }

    pub fn update(&self, store: &mut LayoutStore, pointer: Point, snap: bool) -> bool {
        let Some(session) = &self.session else {
            return false;
        };
        match session.gesture {
            NodeGesture::Dragging(drag) => {
                store.set_position(&session.node_id, drag.position_at(pointer, snap));
            }
            NodeGesture::Resizing(resize) => {
                let rect = resize.rect_at(pointer, snap);
                store.set_geometry(&session.node_id, rect.origin, rect.size);
            }
        }
        true
    }

    pub fn end(&mut self) -> Option<NodeSession> {
        let session = self.session.take()?;
        debug!(node_id = %session.node_id, "node gesture ended");
        Some(session)
    }
}

/// Applies a corner drag. The corner opposite `handle` stays fixed; positions
/// are derived from the clamped size so that corner never drifts.
pub fn resize_rect(handle: ResizeHandle, origin: Rect, delta: Delta) -> Rect {
    let Size { w, h } = origin.size;
    let Point { x, y } = origin.origin;

    let new_w = if handle.moves_left_edge() {
        (w - delta.dx).max(MIN_NODE_WIDTH)
    } else {
        (w + delta.dx).max(MIN_NODE_WIDTH)
    };
    let new_h = if handle.moves_top_edge() {
        (h - delta.dy).max(MIN_NODE_HEIGHT)
    } else {
        (h + delta.dy).max(MIN_NODE_HEIGHT)
    };
    let new_x = if handle.moves_left_edge() { x + (w - new_w) } else { x };
    let new_y = if handle.moves_top_edge() { y + (h - new_h) } else { y };

    Rect::new(Point::new(new_x, new_y), Size::new(new_w, new_h))
}

/// Grid-aware variant of [`resize_rect`]: the moving edge lands on the grid
/// and a moving left/top edge never leaves the grid, even when the minimum
/// size kicks in.
pub fn resize_rect_snapped(handle: ResizeHandle, origin: Rect, delta: Delta) -> Rect {
    let (x, w) = snap_axis(
        origin.origin.x,
        origin.size.w,
        delta.dx,
        MIN_NODE_WIDTH,
        handle.moves_left_edge(),
    );
    let (y, h) = snap_axis(
        origin.origin.y,
        origin.size.h,
        delta.dy,
        MIN_NODE_HEIGHT,
        handle.moves_top_edge(),
    );
    Rect::new(Point::new(x, y), Size::new(w, h))
}

fn snap_axis(start: f32, length: f32, delta: f32, min_length: f32, moves_start: bool) -> (f32, f32) {
    if moves_start {
        let end = start + length;
        let latest_start = snap_down_to_grid(end - min_length);
        let new_start = snap_to_grid(start + delta).min(latest_start);
        (new_start, end - new_start)
    } else {
        let new_end = snap_to_grid(start + length + delta);
        let new_length = (new_end - start).max(min_length);
        if new_length > new_end - start {
            // Minimum size kicked in; keep the far edge on the grid as well.
            (start, snap_up_to_grid(start + min_length) - start)
        } else {
            (start, new_length)
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::geometry::GRID_SIZE;

    fn node_rect() -> Rect {
        Rect::new(Point::new(100.0, 100.0), Size::new(140.0, 44.0))
    }

    #[test]
    fn north_west_resize_keeps_south_east_corner_fixed() {
        let before = node_rect();
        let after = resize_rect(ResizeHandle::NorthWest, before, Delta::new(20.0, 10.0));

        assert_eq!(after.size, Size::new(120.0, 34.0));
        assert_eq!(after.origin, Point::new(120.0, 110.0));
        assert_eq!(ResizeHandle::SouthEast.corner(before), Point::new(240.0, 144.0));
        assert_eq!(ResizeHandle::SouthEast.corner(after), Point::new(240.0, 144.0));
    }

    #[test]
    fn south_east_resize_leaves_position_unchanged() {
        let after = resize_rect(ResizeHandle::SouthEast, node_rect(), Delta::new(15.0, -5.0));
        assert_eq!(after.origin, Point::new(100.0, 100.0));
        assert_eq!(after.size, Size::new(155.0, 39.0));
    }

    #[test]
    fn mixed_corners_move_one_axis_each() {
        let ne = resize_rect(ResizeHandle::NorthEast, node_rect(), Delta::new(10.0, 4.0));
        assert_eq!(ne.origin, Point::new(100.0, 104.0));
        assert_eq!(ne.size, Size::new(150.0, 40.0));

        let sw = resize_rect(ResizeHandle::SouthWest, node_rect(), Delta::new(10.0, 4.0));
        assert_eq!(sw.origin, Point::new(110.0, 100.0));
        assert_eq!(sw.size, Size::new(130.0, 48.0));
    }

    #[test]
    fn clamped_resize_derives_position_from_clamped_size() {
        let before = node_rect();
        let after = resize_rect(ResizeHandle::NorthWest, before, Delta::new(500.0, 500.0));

        assert_eq!(after.size, Size::new(MIN_NODE_WIDTH, MIN_NODE_HEIGHT));
        assert_eq!(after.origin, Point::new(180.0, 116.0));
        assert_eq!(ResizeHandle::SouthEast.corner(after), ResizeHandle::SouthEast.corner(before));
    }

    #[test]
    fn opposite_handles_pair_up() {
        for handle in ResizeHandle::ALL {
            assert_eq!(handle.opposite().opposite(), handle);
            assert_ne!(handle.opposite(), handle);
        }
    }

    #[test]
    fn drag_applies_pointer_delta_and_optional_snap() {
        let drag = DragState {
            start_pointer: Point::new(10.0, 10.0),
            origin_position: Point::new(100.0, 100.0),
        };
        assert_eq!(drag.position_at(Point::new(23.0, 6.0), false), Point::new(113.0, 96.0));
        assert_eq!(drag.position_at(Point::new(23.0, 6.0), true), Point::new(110.0, 100.0));
    }

    #[test]
    fn controller_drives_drag_session_against_store() {
        let mut store = LayoutStore::default();
        let mut controller = NodeInteractionController::default();
        let start = store.position("user");

        assert!(controller.begin_drag(&store, "user", Point::new(0.0, 0.0)));
        assert!(!controller.begin_resize(&store, "user", ResizeHandle::SouthEast, Point::ORIGIN));
        assert!(controller.update(&mut store, Point::new(34.0, 12.0), true));
        assert_eq!(store.position("user"), (start + Delta::new(34.0, 12.0)).snapped());

        let session = controller.end().expect("session should be active");
        assert_eq!(session.node_id, "user");
        assert!(!controller.update(&mut store, Point::new(500.0, 500.0), true));
    }

    #[test]
    fn controller_ignores_unknown_nodes() {
        let store = LayoutStore::default();
        let mut controller = NodeInteractionController::default();
        assert!(!controller.begin_drag(&store, "missing", Point::ORIGIN));
        assert!(!controller.is_active());
    }

    fn handle_strategy() -> impl Strategy<Value = ResizeHandle> {
        prop::sample::select(ResizeHandle::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn resize_respects_minimum_size(
            handle in handle_strategy(),
            w in 1.0f32..600.0,
            h in 1.0f32..400.0,
            dx in -800.0f32..800.0,
            dy in -800.0f32..800.0,
            snap in any::<bool>(),
        ) {
            let origin = Rect::new(Point::new(200.0, 200.0), Size::new(w, h));
            let rect = if snap {
                resize_rect_snapped(handle, origin, Delta::new(dx, dy))
            } else {
                resize_rect(handle, origin, Delta::new(dx, dy))
            };
            prop_assert!(rect.size.w >= MIN_NODE_WIDTH - 1e-3);
            prop_assert!(rect.size.h >= MIN_NODE_HEIGHT - 1e-3);
        }

        #[test]
        fn unsnapped_resize_keeps_opposite_corner_fixed(
            handle in handle_strategy(),
            dx in -300.0f32..300.0,
            dy in -300.0f32..300.0,
        ) {
            let origin = node_rect();
            let rect = resize_rect(handle, origin, Delta::new(dx, dy));
            let before = handle.opposite().corner(origin);
            let after = handle.opposite().corner(rect);
            prop_assert!((before.x - after.x).abs() < 1e-3);
            prop_assert!((before.y - after.y).abs() < 1e-3);
        }

        #[test]
        fn snapped_gestures_commit_grid_positions(
            handle in handle_strategy(),
            gx in 0i32..100,
            gy in 0i32..60,
            dx in -400.0f32..400.0,
            dy in -400.0f32..400.0,
        ) {
            let origin = Point::new(gx as f32 * GRID_SIZE, gy as f32 * GRID_SIZE);
            let drag = DragState { start_pointer: Point::ORIGIN, origin_position: origin };
            let dragged = drag.position_at(Point::new(dx, dy), true);
            prop_assert_eq!(dragged.x % GRID_SIZE, 0.0);
            prop_assert_eq!(dragged.y % GRID_SIZE, 0.0);

            let resized = resize_rect_snapped(handle, Rect::new(origin, Size::new(140.0, 44.0)), Delta::new(dx, dy));
            prop_assert_eq!(resized.origin.x % GRID_SIZE, 0.0);
            prop_assert_eq!(resized.origin.y % GRID_SIZE, 0.0);
        }
    }
}
