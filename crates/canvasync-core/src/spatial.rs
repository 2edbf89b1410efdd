//! Viewport bounds and the spatial chunk grid.
//!
//! Converts a screen-space viewport into world-space bounds (with a
//! prefetch buffer) and buckets bounds into fixed-size grid cells.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{Position, Viewport};

/// Fraction of the canvas size prefetched beyond each visible edge
pub const DEFAULT_BUFFER_FRACTION: f64 = 0.2;

/// Edge length of one grid cell in world units
pub const DEFAULT_CHUNK_SIZE: f64 = 1000.0;

/// Axis-aligned rectangle in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl WorldBounds {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// World-space region visible through `viewport`, padded on every side
    /// by `buffer_fraction` of the canvas size.
    ///
    /// `viewport.zoom` must be positive (see [`Viewport::validate`]).
    pub fn from_viewport(viewport: &Viewport, width_px: f64, height_px: f64, buffer_fraction: f64) -> Self {
        let zoom = viewport.zoom;
        let pad_x = width_px * buffer_fraction / zoom;
        let pad_y = height_px * buffer_fraction / zoom;

        Self {
            left: -viewport.x / zoom - pad_x,
            top: -viewport.y / zoom - pad_y,
            right: (-viewport.x + width_px) / zoom + pad_x,
            bottom: (-viewport.y + height_px) / zoom + pad_y,
        }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn center(&self) -> Position {
        Position::new((self.left + self.right) / 2.0, (self.top + self.bottom) / 2.0)
    }

    /// Whether the point lies inside the bounds (edges inclusive)
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }

    pub fn intersects(&self, other: &WorldBounds) -> bool {
        self.left <= other.right
            && other.left <= self.right
            && self.top <= other.bottom
            && other.top <= self.bottom
    }

    /// Euclidean distance from the bounds center to `point`
    pub fn distance_to(&self, point: Position) -> f64 {
        let center = self.center();
        (center.x - point.x).hypot(center.y - point.y)
    }

    /// Bounds widened outward to whole world units.
    ///
    /// Stores compare against integer positions, so the query range uses
    /// `floor` for the low edges and `ceil` for the high edges.
    pub fn snapped(&self) -> Self {
        Self {
            left: self.left.floor(),
            top: self.top.floor(),
            right: self.right.ceil(),
            bottom: self.bottom.ceil(),
        }
    }
}

/// Grid cell of the chunk index, derived from the top-left of a bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkKey {
    pub cx: i64,
    pub cy: i64,
}

impl ChunkKey {
    pub fn new(cx: i64, cy: i64) -> Self {
        Self { cx, cy }
    }

    /// Cell containing the top-left corner of `bounds`
    pub fn for_bounds(bounds: &WorldBounds, chunk_size: f64) -> Self {
        Self {
            cx: (bounds.left / chunk_size).floor() as i64,
            cy: (bounds.top / chunk_size).floor() as i64,
        }
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk_{}_{}", self.cx, self.cy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_bounds_at_origin() {
        let viewport = Viewport::new(0.0, 0.0, 1.0).unwrap();
        let bounds = WorldBounds::from_viewport(&viewport, 1000.0, 1000.0, 0.2);

        assert!(approx(bounds.left, -200.0));
        assert!(approx(bounds.top, -200.0));
        assert!(approx(bounds.right, 1200.0));
        assert!(approx(bounds.bottom, 1200.0));
        assert_eq!(bounds.center(), Position::new(500.0, 500.0));
    }

    #[test]
    fn test_bounds_scale_with_zoom_and_pan() {
        // Panned so that world (4000, 4000) is at the screen origin, zoomed out.
        let viewport = Viewport::new(-2000.0, -2000.0, 0.5).unwrap();
        let bounds = WorldBounds::from_viewport(&viewport, 1200.0, 800.0, 0.2);

        assert!(approx(bounds.left, 4000.0 - 480.0));
        assert!(approx(bounds.right, (2000.0 + 1200.0) / 0.5 + 480.0));
        assert!(approx(bounds.top, 4000.0 - 320.0));
        assert!(approx(bounds.bottom, (2000.0 + 800.0) / 0.5 + 320.0));
    }

    #[test]
    fn test_zero_buffer_is_visible_area() {
        let viewport = Viewport::new(100.0, 50.0, 2.0).unwrap();
        let bounds = WorldBounds::from_viewport(&viewport, 800.0, 600.0, 0.0);
        assert!(approx(bounds.width(), 400.0));
        assert!(approx(bounds.height(), 300.0));
    }

    #[test]
    fn test_chunk_key_floor_for_negative_coordinates() {
        let bounds = WorldBounds::new(-200.0, -0.5, 800.0, 900.0);
        let key = ChunkKey::for_bounds(&bounds, 1000.0);
        assert_eq!(key, ChunkKey::new(-1, -1));
        assert_eq!(key.to_string(), "chunk_-1_-1");

        let bounds = WorldBounds::new(3520.0, 3680.0, 7360.0, 5920.0);
        assert_eq!(ChunkKey::for_bounds(&bounds, 1000.0).to_string(), "chunk_3_3");
    }

    #[test]
    fn test_contains_and_intersects() {
        let a = WorldBounds::new(0.0, 0.0, 100.0, 100.0);
        assert!(a.contains_point(0.0, 100.0));
        assert!(!a.contains_point(100.5, 50.0));
        assert!(a.intersects(&WorldBounds::new(100.0, 100.0, 200.0, 200.0)));
        assert!(!a.intersects(&WorldBounds::new(101.0, 0.0, 200.0, 100.0)));
    }

    #[test]
    fn test_snapped_widens_outward() {
        let b = WorldBounds::new(-10.4, 3.6, 99.2, 120.0).snapped();
        assert_eq!(b, WorldBounds::new(-11.0, 3.0, 100.0, 120.0));
    }

    #[test]
    fn test_distance_from_center() {
        let b = WorldBounds::new(0.0, 0.0, 200.0, 200.0);
        assert!(approx(b.distance_to(Position::new(400.0, 500.0)), 500.0));
    }
}
