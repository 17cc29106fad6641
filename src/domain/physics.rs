/// Movement and collision against the static grid.
///
/// ## Bounding boxes
///
/// Boxes are axis-aligned and half-open: `[min, max)`. A box covers
/// the cells from `floor(min / tile)` to `ceil(max / tile) - 1` on each
/// axis, so an edge lying exactly on a tile boundary belongs to the
/// lower-index tile. Two boxes that merely touch do not overlap.
///
/// ## Movement rule
///
/// A destination is legal when every covered cell is inside the grid
/// and none of them is a Wall. Moves are resolved one axis at a time,
/// X then Y, so a diagonal push into a wall still slides along it.
/// A blocked axis advances until the box sits flush with the boundary.

use super::grid::GridMap;

// ══════════════════════════════════════════════════════════════
// Geometry
// ══════════════════════════════════════════════════════════════

#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Vec2 { x, y }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Unit vector, or ZERO for a zero-length input.
    pub fn normalized(self) -> Vec2 {
        let len = self.length();
        if len <= f32::EPSILON {
            Vec2::ZERO
        } else {
            Vec2::new(self.x / len, self.y / len)
        }
    }

    pub fn scaled(self, k: f32) -> Vec2 {
        Vec2::new(self.x * k, self.y * k)
    }

    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

impl std::ops::Add for Vec2 {
    type Output = Vec2;
    fn add(self, o: Vec2) -> Vec2 {
        Vec2::new(self.x + o.x, self.y + o.y)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, o: Vec2) -> Vec2 {
        Vec2::new(self.x - o.x, self.y - o.y)
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    /// Square box of side `size` centered on `center`.
    pub fn centered(center: Vec2, size: f32) -> Self {
        let half = size / 2.0;
        Aabb {
            min: Vec2::new(center.x - half, center.y - half),
            max: Vec2::new(center.x + half, center.y + half),
        }
    }

    /// Strict overlap: shared edges do not count.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x
            && other.min.x < self.max.x
            && self.min.y < other.max.y
            && other.min.y < self.max.y
    }
}

/// Inclusive range of cells covered by a box (may lie outside the grid).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CellSpan {
    pub row0: i64,
    pub row1: i64,
    pub col0: i64,
    pub col1: i64,
}

pub fn covered_cells(aabb: &Aabb, tile_size: f32) -> CellSpan {
    CellSpan {
        row0: (aabb.min.y / tile_size).floor() as i64,
        row1: (aabb.max.y / tile_size).ceil() as i64 - 1,
        col0: (aabb.min.x / tile_size).floor() as i64,
        col1: (aabb.max.x / tile_size).ceil() as i64 - 1,
    }
}

// ══════════════════════════════════════════════════════════════
// Grid queries
// ══════════════════════════════════════════════════════════════

/// Can a box of `size` centered at `center` sit on the grid?
pub fn box_fits(grid: &GridMap, center: Vec2, size: f32) -> bool {
    let span = covered_cells(&Aabb::centered(center, size), grid.tile_size);
    if !grid.in_bounds(span.row0, span.col0) || !grid.in_bounds(span.row1, span.col1) {
        return false;
    }
    for row in span.row0..=span.row1 {
        for col in span.col0..=span.col1 {
            if grid.is_blocked(row, col) {
                return false;
            }
        }
    }
    true
}

/// Combined check: is the full displacement legal as a single jump?
pub fn can_move(grid: &GridMap, position: Vec2, size: f32, delta: Vec2) -> bool {
    box_fits(grid, position + delta, size)
}

/// Resolve a requested displacement against the grid, axis by axis.
/// Returns the displacement actually applied.
pub fn resolve_move(grid: &GridMap, position: Vec2, size: f32, delta: Vec2) -> Vec2 {
    resolve_move_among(grid, position, size, delta, &[])
}

/// Like `resolve_move`, but also treats `blockers` as static colliders.
/// A blocker only stops an axis that would newly overlap it.
pub fn resolve_move_among(
    grid: &GridMap,
    position: Vec2,
    size: f32,
    delta: Vec2,
    blockers: &[Aabb],
) -> Vec2 {
    let dx = resolve_axis(grid, position, size, delta.x, Axis::X, blockers);
    let after_x = Vec2::new(position.x + dx, position.y);
    let dy = resolve_axis(grid, after_x, size, delta.y, Axis::Y, blockers);
    Vec2::new(dx, dy)
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Axis {
    X,
    Y,
}

fn along(axis: Axis, d: f32) -> Vec2 {
    match axis {
        Axis::X => Vec2::new(d, 0.0),
        Axis::Y => Vec2::new(0.0, d),
    }
}

fn resolve_axis(grid: &GridMap, position: Vec2, size: f32, d: f32, axis: Axis, blockers: &[Aabb]) -> f32 {
    if d == 0.0 {
        return 0.0;
    }

    let before = Aabb::centered(position, size);
    let blocked_by_actor = |dest: Vec2| {
        let b = Aabb::centered(dest, size);
        blockers.iter().any(|o| b.overlaps(o) && !before.overlaps(o))
    };

    let step = along(axis, d);
    if can_move(grid, position, size, step) {
        let full = position + step;
        return if blocked_by_actor(full) { 0.0 } else { d };
    }

    // Slide up to the tile boundary ahead of the leading edge.
    let ts = grid.tile_size;
    let room = match (axis, d > 0.0) {
        (Axis::X, true) => (before.max.x / ts).ceil() * ts - before.max.x,
        (Axis::X, false) => before.min.x - (before.min.x / ts).floor() * ts,
        (Axis::Y, true) => (before.max.y / ts).ceil() * ts - before.max.y,
        (Axis::Y, false) => before.min.y - (before.min.y / ts).floor() * ts,
    };
    let flush = room.min(d.abs()).copysign(d);
    if flush == 0.0 {
        return 0.0;
    }
    let dest = position + along(axis, flush);
    if box_fits(grid, dest, size) && !blocked_by_actor(dest) {
        flush
    } else {
        0.0
    }
}

// ══════════════════════════════════════════════════════════════
// Unit tests
// ══════════════════════════════════════════════════════════════
