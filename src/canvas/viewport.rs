use tracing::debug;

use crate::geometry::{Delta, MAX_ZOOM, MIN_ZOOM, Point, clamp};

use super::{Modifiers, PointerButton};

pub const WHEEL_ZOOM_SENSITIVITY: f32 = 0.001;
pub const ZOOM_STEP: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    pub scale: f32,
    pub offset: Point,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: Point::ORIGIN,
        }
    }
}

impl ViewportState {
    /// `translate` first, in parent space, then `scale`.
    pub fn transform_attribute(&self) -> String {
        format!(
            "translate({},{}) scale({})",
            self.offset.x, self.offset.y, self.scale
        )
    }

    pub fn screen_to_scene(&self, point: Point) -> Point {
        Point::new(
            (point.x - self.offset.x) / self.scale,
            (point.y - self.offset.y) / self.scale,
        )
    }

    pub fn scene_to_screen(&self, point: Point) -> Point {
        Point::new(
            point.x * self.scale + self.offset.x,
            point.y * self.scale + self.offset.y,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanState {
    pub start_pointer: Point,
    pub origin_offset: Point,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelEvent {
    pub delta_y: f32,
    pub modifiers: Modifiers,
    pub over_canvas: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WheelOutcome {
    /// The host must stop the event from reaching native page zoom/scroll.
    pub prevent_default: bool,
    pub zoomed: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewportController {
    state: ViewportState,
    pan: Option<PanState>,
}

impl ViewportController {
    pub fn new(state: ViewportState) -> Self {
        let mut controller = Self { state, pan: None };
        controller.zoom(0.0);
        controller
    }

    pub fn state(&self) -> ViewportState {
        self.state
    }

    pub fn scale(&self) -> f32 {
        self.state.scale
    }

    pub fn offset(&self) -> Point {
        self.state.offset
    }

    pub fn zoom(&mut self, delta: f32) -> f32 {
        let next = if delta.is_finite() {
            self.state.scale + delta
        } else {
            self.state.scale
        };
        self.state.scale = clamp(next, MIN_ZOOM, MAX_ZOOM);
        self.state.scale
    }

    pub fn zoom_in(&mut self) -> f32 {
        self.zoom(ZOOM_STEP)
    }

    pub fn zoom_out(&mut self) -> f32 {
        self.zoom(-ZOOM_STEP)
    }

    pub fn reset(&mut self) {
        self.state = ViewportState::default();
        self.pan = None;
    }

    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.state.offset = self.state.offset + Delta::new(dx, dy);
    }

    pub fn should_start_pan(
        target_is_background: bool,
        button: PointerButton,
        modifiers: Modifiers,
    ) -> bool {
        target_is_background || button == PointerButton::Middle || modifiers.pans()
    }

    pub fn is_panning(&self) -> bool {
        self.pan.is_some()
    }

    pub fn begin_pan(&mut self, pointer: Point) {
        debug!(x = pointer.x, y = pointer.y, "pan started");
        self.pan = Some(PanState {
            start_pointer: pointer,
            origin_offset: self.state.offset,
        });
    }

    pub fn update_pan(&mut self, pointer: Point) -> bool {
        let Some(pan) = self.pan else {
            return false;
        };
        self.state.offset = pan.origin_offset + (pointer - pan.start_pointer);
        true
    }

    pub fn end_pan(&mut self) -> bool {
        let ended = self.pan.take().is_some();
        if ended {
            debug!(
                offset_x = self.state.offset.x,
                offset_y = self.state.offset.y,
                "pan ended"
            );
        }
        ended
    }

    pub fn handle_wheel(&mut self, event: WheelEvent) -> WheelOutcome {
        let global_zoom_gesture = event.modifiers.ctrl || event.modifiers.meta;
        if !event.over_canvas {
            return WheelOutcome {
                prevent_default: global_zoom_gesture,
                zoomed: false,
            };
        }

        let before = self.state.scale;
        let after = self.zoom(-event.delta_y * WHEEL_ZOOM_SENSITIVITY);
        WheelOutcome {
            prevent_default: true,
            zoomed: after != before,
        }
    }
}
