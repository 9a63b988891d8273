use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

pub const GRID_SIZE: f32 = 10.0;
pub const MIN_NODE_WIDTH: f32 = 60.0;
pub const MIN_NODE_HEIGHT: f32 = 28.0;
pub const CANVAS_WIDTH: f32 = 1800.0;
pub const CANVAS_HEIGHT: f32 = 900.0;
pub const MIN_ZOOM: f32 = 0.4;
pub const MAX_ZOOM: f32 = 3.0;
pub const SEPARATOR_MARGIN: f32 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, delta: Delta) -> Self {
        Self {
            x: self.x + delta.dx,
            y: self.y + delta.dy,
        }
    }

    pub fn snapped(self) -> Self {
        Self {
            x: snap_to_grid(self.x),
            y: snap_to_grid(self.y),
        }
    }
}

impl Sub for Point {
    type Output = Delta;

    fn sub(self, rhs: Self) -> Delta {
        Delta {
            dx: self.x - rhs.x,
            dy: self.y - rhs.y,
        }
    }
}

impl Add<Delta> for Point {
    type Output = Point;

    fn add(self, rhs: Delta) -> Point {
        self.offset(rhs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub w: f32,
    pub h: f32,
}

impl Size {
    pub fn new(w: f32, h: f32) -> Self {
        Self { w, h }
    }
}

/// A displacement in either screen or scene space, depending on the caller.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Delta {
    pub dx: f32,
    pub dy: f32,
}

impl Delta {
    pub const ZERO: Self = Self { dx: 0.0, dy: 0.0 };

    pub fn new(dx: f32, dy: f32) -> Self {
        Self { dx, dy }
    }

    pub fn scaled(self, factor: f32) -> Self {
        Self {
            dx: self.dx * factor,
            dy: self.dy * factor,
        }
    }

    pub fn snapped(self) -> Self {
        Self {
            dx: snap_to_grid(self.dx),
            dy: snap_to_grid(self.dy),
        }
    }
}

impl Add for Delta {
    type Output = Delta;

    fn add(self, rhs: Self) -> Delta {
        Delta {
            dx: self.dx + rhs.dx,
            dy: self.dy + rhs.dy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub fn new(origin: Point, size: Size) -> Self {
        Self { origin, size }
    }

    pub fn center(&self) -> Point {
        Point {
            x: self.origin.x + self.size.w / 2.0,
            y: self.origin.y + self.size.h / 2.0,
        }
    }

    pub fn right(&self) -> f32 {
        self.origin.x + self.size.w
    }

    pub fn bottom(&self) -> f32 {
        self.origin.y + self.size.h
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.origin.x
            && point.x <= self.right()
            && point.y >= self.origin.y
            && point.y <= self.bottom()
    }
}

pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        return min;
    }
    value.max(min).min(max)
}

pub fn snap_to_grid(value: f32) -> f32 {
    // `round` ties away from zero; -5 snaps to -10 just like 5 snaps to 10.
    (value / GRID_SIZE).round() * GRID_SIZE
}

pub fn snap_down_to_grid(value: f32) -> f32 {
    (value / GRID_SIZE).floor() * GRID_SIZE
}

pub fn snap_up_to_grid(value: f32) -> f32 {
    (value / GRID_SIZE).ceil() * GRID_SIZE
}

pub fn midpoint(a: Point, b: Point) -> Point {
    Point {
        x: (a.x + b.x) / 2.0,
        y: (a.y + b.y) / 2.0,
    }
}
