//! Rectangular bounding boxes and associated trait implementations.

use serde::{Deserialize, Serialize};

use super::{Point, Quad, Rect};

/// An axis-aligned rectangular bounding box.
///
/// Unlike [`Rect`], a [`Bbox`] may be empty, in which case `p0`
/// lies to the upper right of `p1`.
#[derive(Debug, Copy, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Bbox {
    pub p0: Point,
    pub p1: Point,
}

impl Default for Bbox {
    fn default() -> Self {
        Self::empty()
    }
}

impl Bbox {
    /// Creates an empty, otherwise invalid bounding box.
    pub fn empty() -> Self {
        Self {
            p0: Point::new(i64::MAX, i64::MAX),
            p1: Point::new(i64::MIN, i64::MIN),
        }
    }

    /// Returns `true` if the bounding box is empty.
    pub fn is_empty(&self) -> bool {
        self.p0.x > self.p1.x || self.p0.y > self.p1.y
    }

    /// Converts a non-empty bounding box into a [`Rect`].
    pub fn into_rect(self) -> Option<Rect> {
        (!self.is_empty()).then(|| Rect::new(self.p0, self.p1))
    }

    /// Computes the union with another bounding box.
    pub fn union(self, other: Bbox) -> Bbox {
        if other.is_empty() {
            return self;
        }
        if self.is_empty() {
            return other;
        }
        Bbox {
            p0: Point::new(self.p0.x.min(other.p0.x), self.p0.y.min(other.p0.y)),
            p1: Point::new(self.p1.x.max(other.p1.x), self.p1.y.max(other.p1.y)),
        }
    }
}

impl From<Rect> for Bbox {
    fn from(r: Rect) -> Self {
        Self { p0: r.p0, p1: r.p1 }
    }
}

/// A trait representing objects with a bounding box.
pub trait BoundBox {
    /// Compute a rectangular bounding box around the implementing type.
    fn bbox(&self) -> Bbox;

    /// Computes the union with rectangular bounding box `bbox`.
    fn union(&self, bbox: Bbox) -> Bbox {
        self.bbox().union(bbox)
    }
}

impl<T> BoundBox for &T
where
    T: BoundBox,
{
    fn bbox(&self) -> Bbox {
        T::bbox(*self)
    }
}

impl BoundBox for Bbox {
    fn bbox(&self) -> Bbox {
        *self
    }
}

impl BoundBox for Point {
    fn bbox(&self) -> Bbox {
        Bbox {
            p0: *self,
            p1: *self,
        }
    }
}

impl BoundBox for Rect {
    fn bbox(&self) -> Bbox {
        Bbox::from(*self)
    }
}

impl BoundBox for Quad {
    fn bbox(&self) -> Bbox {
        Bbox::from(self.rect())
    }
}

impl<T: BoundBox> BoundBox for [T] {
    fn bbox(&self) -> Bbox {
        self.iter().fold(Bbox::empty(), |acc, item| acc.union(item.bbox()))
    }
}

impl<T: BoundBox> BoundBox for Vec<T> {
    fn bbox(&self) -> Bbox {
        self.as_slice().bbox()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_ignores_empty_boxes() {
        let a = Rect::from_xy(0, 0, 10, 10).bbox();
        assert_eq!(a.union(Bbox::empty()), a);
        assert_eq!(Bbox::empty().union(a), a);
        assert!(Bbox::empty().into_rect().is_none());
    }

    #[test]
    fn slice_bbox_covers_all_items() {
        let rects = vec![Rect::from_xy(0, 0, 10, 10), Rect::from_xy(-5, 20, 3, 25)];
        assert_eq!(
            rects.bbox().into_rect(),
            Some(Rect::from_xy(-5, 0, 10, 25))
        );
    }
}
