use eframe::egui::{
    self, Align2, Color32, FontId, MouseWheelUnit, Painter, Pos2, Rect, Sense, Shape, Stroke,
    StrokeKind, Vec2,
};

use crate::canvas::edge::EdgeStroke;
use crate::canvas::node::ResizeHandle;
use crate::canvas::viewport::{WheelEvent, WheelOutcome};
use crate::canvas::{
    EditRequest, Editor, HANDLE_RADIUS, HitTarget, Modifiers, PointerButton, PointerEvent,
};
use crate::geometry::{CANVAS_HEIGHT, CANVAS_WIDTH, Point};
use crate::layout::NodeShape;
use crate::scene::{CLOUD_FILL, NODE_CORNER_RADIUS, NODE_FILL, SEPARATOR_COLOR};

/// Pixels per wheel "line", matching what browsers report for line-mode wheels.
const WHEEL_LINE_HEIGHT: f32 = 40.0;

#[derive(Debug, Default)]
pub struct CanvasOutput {
    pub edit_request: Option<EditRequest>,
    pub hovered: Option<HitTarget>,
}

/// Feeds this frame's raw input into the editor and paints the result.
pub fn show_editor_canvas(ui: &mut egui::Ui, editor: &mut Editor) -> CanvasOutput {
    let (response, painter) = ui.allocate_painter(ui.available_size(), Sense::click_and_drag());
    let frame = response.rect;
    let canvas_layer = response.layer_id;
    let ctx = ui.ctx().clone();
    // Windows and popups drawn above the canvas keep their own clicks and scrolling.
    let on_canvas = |pos: Pos2| {
        frame.contains(pos) && ctx.layer_id_at(pos).is_none_or(|layer| layer == canvas_layer)
    };
    let (events, pointer) = ui.input(|input| (input.events.clone(), input.pointer.hover_pos()));
    let over_canvas = pointer.is_some_and(&on_canvas);

    let mut consume_scroll = false;
    for event in events {
        let outcome = route_event(editor, frame, &on_canvas, over_canvas, event);
        consume_scroll |= outcome.prevent_default;
    }
    if consume_scroll {
        ui.input_mut(|input| {
            input.raw_scroll_delta = Vec2::ZERO;
            input.smooth_scroll_delta = Vec2::ZERO;
        });
    }

    let mut output = CanvasOutput::default();
    if let Some(position) = response.hover_pos() {
        let target = editor.hit_test(to_canvas(frame, position));
        if response.double_clicked() {
            output.edit_request = editor.double_click(&target);
        }
        output.hovered = Some(target);
    }

    paint_editor(&painter, frame, editor, output.hovered.as_ref());
    output
}

/// Presses only start gestures on the canvas layer. Moves and releases are
/// always forwarded so a drag that wanders under a window still finishes.
fn route_event(
    editor: &mut Editor,
    frame: Rect,
    on_canvas: &dyn Fn(Pos2) -> bool,
    over_canvas: bool,
    event: egui::Event,
) -> WheelOutcome {
    match event {
        egui::Event::PointerButton {
            pos,
            button,
            pressed,
            modifiers,
        } => {
            let Some(button) = to_pointer_button(button) else {
                return WheelOutcome::default();
            };
            let pointer = PointerEvent {
                position: to_canvas(frame, pos),
                button,
                modifiers: to_modifiers(modifiers),
            };
            if pressed {
                if on_canvas(pos) {
                    let target = editor.hit_test(pointer.position);
                    editor.pointer_down(&target, pointer);
                }
            } else {
                editor.pointer_up(pointer);
            }
            WheelOutcome::default()
        }
        egui::Event::PointerMoved(pos) => {
            editor.pointer_move(PointerEvent::at(to_canvas(frame, pos)));
            WheelOutcome::default()
        }
        egui::Event::PointerGone => {
            editor.pointer_leave();
            WheelOutcome::default()
        }
        egui::Event::MouseWheel {
            unit,
            delta,
            modifiers,
        } => {
            let per_unit = match unit {
                MouseWheelUnit::Point => 1.0,
                MouseWheelUnit::Line => WHEEL_LINE_HEIGHT,
                MouseWheelUnit::Page => frame.height(),
            };
            // egui reports upward scrolling as positive.
            editor.wheel(WheelEvent {
                delta_y: -delta.y * per_unit,
                modifiers: to_modifiers(modifiers),
                over_canvas,
            })
        }
        _ => WheelOutcome::default(),
    }
}

pub fn to_modifiers(modifiers: egui::Modifiers) -> Modifiers {
    Modifiers {
        shift: modifiers.shift,
        ctrl: modifiers.ctrl,
        alt: modifiers.alt,
        meta: modifiers.mac_cmd,
    }
}

pub fn to_pointer_button(button: egui::PointerButton) -> Option<PointerButton> {
    match button {
        egui::PointerButton::Primary => Some(PointerButton::Primary),
        egui::PointerButton::Middle => Some(PointerButton::Middle),
        egui::PointerButton::Secondary => Some(PointerButton::Secondary),
        egui::PointerButton::Extra1 | egui::PointerButton::Extra2 => None,
    }
}

fn to_canvas(frame: Rect, pos: Pos2) -> Point {
    Point::new(pos.x - frame.min.x, pos.y - frame.min.y)
}

fn paint_editor(painter: &Painter, frame: Rect, editor: &Editor, hovered: Option<&HitTarget>) {
    let viewport = editor.viewport().state();
    let scale = viewport.scale;
    let to_screen = |point: Point| {
        let screen = viewport.scene_to_screen(point);
        Pos2::new(frame.min.x + screen.x, frame.min.y + screen.y)
    };

    painter.rect_filled(frame, 0.0, Color32::from_gray(244));
    let sheet = Rect::from_min_max(
        to_screen(Point::ORIGIN),
        to_screen(Point::new(CANVAS_WIDTH, CANVAS_HEIGHT)),
    );
    painter.rect_filled(sheet, 0.0, Color32::WHITE);

    let sep_y = editor.store().sep_y();
    painter.extend(Shape::dashed_line(
        &[
            to_screen(Point::new(0.0, sep_y)),
            to_screen(Point::new(CANVAS_WIDTH, sep_y)),
        ],
        Stroke::new(1.0, hex_color(SEPARATOR_COLOR)),
        4.0 * scale,
        4.0 * scale,
    ));

    let rendered = editor.rendered_edges();
    for edge in &rendered {
        for stroke in &edge.path.strokes {
            paint_stroke(painter, stroke, scale, &to_screen);
        }
    }
    for edge in &rendered {
        if let Some(label) = &edge.label {
            painter.text(
                to_screen(edge.label_anchor),
                Align2::CENTER_CENTER,
                label,
                FontId::proportional(11.0 * scale),
                hex_color(crate::canvas::edge::EDGE_COLOR),
            );
        }
    }

    let outline = Stroke::new(1.2 * scale, hex_color(crate::canvas::edge::EDGE_COLOR));
    for node in editor.store().nodes() {
        let rect = Rect::from_min_max(
            to_screen(node.rect.origin),
            to_screen(Point::new(node.rect.right(), node.rect.bottom())),
        );
        match node.meta.shape {
            NodeShape::Rect => {
                painter.rect(
                    rect,
                    NODE_CORNER_RADIUS * scale,
                    hex_color(NODE_FILL),
                    outline,
                    StrokeKind::Inside,
                );
            }
            NodeShape::Cloud => {
                let radius = rect.size() / 2.0;
                painter.add(Shape::ellipse_filled(rect.center(), radius, hex_color(CLOUD_FILL)));
                painter.add(Shape::ellipse_stroke(rect.center(), radius, outline));
            }
        }
        painter.text(
            rect.center(),
            Align2::CENTER_CENTER,
            &node.meta.label,
            FontId::proportional(13.0 * scale),
            Color32::from_rgb(15, 23, 42),
        );

        let node_hovered = match hovered {
            Some(HitTarget::Node(id)) => id == node.id,
            Some(HitTarget::ResizeHandle { node_id, .. }) => node_id == node.id,
            _ => false,
        };
        if node_hovered {
            for handle in ResizeHandle::ALL {
                let corner = to_screen(handle.corner(node.rect));
                painter.rect(
                    Rect::from_center_size(corner, Vec2::splat(HANDLE_RADIUS * 2.0 * scale)),
                    1.0,
                    Color32::WHITE,
                    outline,
                    StrokeKind::Middle,
                );
            }
        }
    }
}

fn paint_stroke(
    painter: &Painter,
    stroke: &EdgeStroke,
    scale: f32,
    to_screen: &impl Fn(Point) -> Pos2,
) {
    let style = stroke.style;
    let color = hex_color(style.color).gamma_multiply(style.opacity);
    let egui_stroke = Stroke::new(style.width * scale, color);
    let points = stroke
        .points
        .iter()
        .map(|point| to_screen(*point))
        .collect::<Vec<_>>();
    match style.dash {
        Some([on, off]) => {
            painter.extend(Shape::dashed_line(&points, egui_stroke, on * scale, off * scale));
        }
        None => {
            painter.add(Shape::line(points, egui_stroke));
        }
    }
}

fn hex_color(hex: &str) -> Color32 {
    Color32::from_hex(hex).unwrap_or(Color32::DARK_GRAY)
}
