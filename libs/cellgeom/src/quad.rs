//! Four-corner rectangles read from GDS boundary rings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Corner, Point, Rect};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QuadError {
    #[error("expected 4 corners, found {0}")]
    CornerCount(usize),
    #[error("corners do not form an axis-aligned rectangle")]
    NotRectangle,
}

/// An axis-aligned rectangle that remembers the order in which its corners
/// were listed.
///
/// Translating or resizing a [`Quad`] keeps the winding, so the ring it emits
/// starts at the same corner and travels in the same direction as the ring it
/// was read from.
#[derive(Debug, Copy, Clone, Hash, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quad {
    rect: Rect,
    winding: [Corner; 4],
}

impl Quad {
    /// Counter-clockwise, starting at the lower-left corner.
    pub const DEFAULT_WINDING: [Corner; 4] = [
        Corner::LowerLeft,
        Corner::LowerRight,
        Corner::UpperRight,
        Corner::UpperLeft,
    ];

    /// Creates a [`Quad`] with the default winding.
    pub fn from_rect(rect: Rect) -> Self {
        Self {
            rect,
            winding: Self::DEFAULT_WINDING,
        }
    }

    /// Reads a quad from a boundary ring.
    ///
    /// The ring may be closed (first point repeated at the end) or open.
    pub fn from_ring(points: &[Point]) -> Result<Self, QuadError> {
        let open = match points {
            [first, .., last] if points.len() > 1 && first == last => &points[..points.len() - 1],
            _ => points,
        };
        if open.len() != 4 {
            return Err(QuadError::CornerCount(open.len()));
        }

        let x0 = open.iter().map(|p| p.x).min().unwrap_or_default();
        let y0 = open.iter().map(|p| p.y).min().unwrap_or_default();
        let x1 = open.iter().map(|p| p.x).max().unwrap_or_default();
        let y1 = open.iter().map(|p| p.y).max().unwrap_or_default();
        let rect = Rect::from_xy(x0, y0, x1, y1);

        let mut winding = Self::DEFAULT_WINDING;
        for (slot, pt) in winding.iter_mut().zip(open) {
            *slot = Corner::of(&rect, *pt).ok_or(QuadError::NotRectangle)?;
        }
        for corner in Self::DEFAULT_WINDING {
            if !winding.contains(&corner) {
                return Err(QuadError::NotRectangle);
            }
        }

        Ok(Self { rect, winding })
    }

    #[inline]
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Replaces the extent of the quad, keeping its winding.
    #[inline]
    pub fn set_rect(&mut self, rect: Rect) {
        self.rect = rect;
    }

    pub fn translate(&mut self, p: Point) {
        self.rect = self.rect.translated(p);
    }

    /// The four corners in winding order.
    pub fn corners(&self) -> [Point; 4] {
        self.winding.map(|c| self.rect.corner(c))
    }

    /// The closed five-point ring used by GDS boundaries.
    pub fn ring(&self) -> Vec<Point> {
        let corners = self.corners();
        let mut ring = corners.to_vec();
        ring.push(corners[0]);
        ring
    }
}

impl From<Rect> for Quad {
    fn from(rect: Rect) -> Self {
        Self::from_rect(rect)
    }
}
