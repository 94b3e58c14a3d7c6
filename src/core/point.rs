//! Map Coordinates
//!
//! Integer pixel coordinates on a tile map and the coarse box-range test
//! used for area-of-interest decisions.

use std::fmt;
use serde::{Serialize, Deserialize};

/// Width and height of one map tile, in pixels.
pub const TILE_SIZE: u16 = 32;

/// Half-width of the area of interest, in tiles.
pub const AROUND_AREA_IN_TILES: u16 = 10;

/// Half-width of the area of interest, in pixels.
pub const AROUND_AREA: u16 = AROUND_AREA_IN_TILES * TILE_SIZE;

/// A position on a map, in pixels.
///
/// Coordinates are unsigned 16-bit so they can be written to the wire
/// without conversion.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal pixel coordinate
    pub x: u16,
    /// Vertical pixel coordinate
    pub y: u16,
}

impl Point {
    /// Origin of the map.
    pub const ZERO: Self = Self { x: 0, y: 0 };

    /// Create a point from pixel coordinates.
    #[inline]
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// Create a point at the top-left corner of a tile.
    #[inline]
    pub const fn from_tile(tx: u16, ty: u16) -> Self {
        Self {
            x: tx.saturating_mul(TILE_SIZE),
            y: ty.saturating_mul(TILE_SIZE),
        }
    }

    /// Tile containing this point.
    #[inline]
    pub const fn tile(self) -> (u16, u16) {
        (self.x / TILE_SIZE, self.y / TILE_SIZE)
    }

    /// Check whether `other` lies within the box of half-width `range`.
    ///
    /// A box, not a circle.
    #[inline]
    pub fn in_range_of(self, other: Point, range: u16) -> bool {
        self.x.abs_diff(other.x) <= range && self.y.abs_diff(other.y) <= range
    }

    /// Move one step of at most `speed` pixels per axis toward `target`.
    pub fn step_toward(self, target: Point, speed: u16) -> Point {
        fn axis(from: u16, to: u16, speed: u16) -> u16 {
            if from < to {
                from + (to - from).min(speed)
            } else {
                from - (from - to).min(speed)
            }
        }
        Point {
            x: axis(self.x, target.x, speed),
            y: axis(self.y, target.y, speed),
        }
    }
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Point({}, {})", self.x, self.y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Axis-aligned rectangle in pixels, used by trigger and spawn areas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rectangle {
    /// Left edge
    pub x: u16,
    /// Top edge
    pub y: u16,
    /// Width in pixels
    pub w: u16,
    /// Height in pixels
    pub h: u16,
}

impl Rectangle {
    /// Create a new rectangle.
    pub const fn new(x: u16, y: u16, w: u16, h: u16) -> Self {
        Self { x, y, w, h }
    }

    /// Check whether a point lies inside (right and bottom edges excluded).
    #[inline]
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x
            && p.y >= self.y
            && (p.x as u32) < self.x as u32 + self.w as u32
            && (p.y as u32) < self.y as u32 + self.h as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_range_is_a_box() {
        let p = Point::new(700, 900);
        assert!(p.in_range_of(Point::new(700 + AROUND_AREA, 900 + AROUND_AREA), AROUND_AREA));
        assert!(!p.in_range_of(Point::new(700 + AROUND_AREA + 1, 900), AROUND_AREA));
        assert!(!p.in_range_of(Point::new(700, 900 - AROUND_AREA - 1), AROUND_AREA));
    }

    #[test]
    fn test_in_range_is_symmetric() {
        let a = Point::new(10, 5000);
        let b = Point::new(300, 4800);
        assert_eq!(a.in_range_of(b, AROUND_AREA), b.in_range_of(a, AROUND_AREA));
    }

    #[test]
    fn test_tile() {
        assert_eq!(Point::new(752, 900).tile(), (23, 28));
        assert_eq!(Point::from_tile(3, 4), Point::new(96, 128));
    }

    #[test]
    fn test_step_toward() {
        let p = Point::new(100, 100);
        assert_eq!(p.step_toward(Point::new(200, 90), 8), Point::new(108, 92));
        assert_eq!(p.step_toward(Point::new(103, 100), 8), Point::new(103, 100));
        assert_eq!(p.step_toward(p, 8), p);
    }

    #[test]
    fn test_rectangle_contains() {
        let r = Rectangle::new(64, 64, 32, 32);
        assert!(r.contains(Point::new(64, 64)));
        assert!(r.contains(Point::new(95, 95)));
        assert!(!r.contains(Point::new(96, 80)));
        assert!(!r.contains(Point::new(63, 80)));
    }
}
