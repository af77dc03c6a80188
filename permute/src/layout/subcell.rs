//! Partitioning of double-height cells into two stacked rows.

use array_map::{ArrayMap, Indexable};
use cellgeom::{Rect, Span};
use serde::{Deserialize, Serialize};

/// One row of a double-height cell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Hash, PartialEq, Eq)]
#[repr(u8)]
#[derive(Indexable)]
pub enum SubCell {
    Bottom,
    Top,
}

/// Where a shape sits relative to the sub-cell boundary.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Placement {
    Within(SubCell),
    /// Crosses or touches the midline from both sides.
    Spans,
}

/// The vertical extent of each sub-cell.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SubCells {
    spans: ArrayMap<SubCell, Span, 2>,
}

impl SubCells {
    /// Splits `bounds` at its vertical midpoint.
    pub fn new(bounds: Rect) -> Self {
        let v = bounds.vspan();
        let mid = v.center();
        // Order must match the variants of [`SubCell`].
        Self {
            spans: ArrayMap::new([Span::new(v.start(), mid), Span::new(mid, v.stop())]),
        }
    }

    #[inline]
    pub fn span(&self, cell: SubCell) -> Span {
        self.spans[cell]
    }

    #[inline]
    pub fn midline(&self) -> i64 {
        self.spans[SubCell::Bottom].stop()
    }

    /// Classifies a shape by its vertical extent.
    pub fn classify(&self, rect: Rect) -> Placement {
        let mid = self.midline();
        let v = rect.vspan();
        if v.stop() <= mid && v.start() < mid {
            Placement::Within(SubCell::Bottom)
        } else if v.start() >= mid && v.stop() > mid {
            Placement::Within(SubCell::Top)
        } else {
            Placement::Spans
        }
    }

    /// The sub-cell containing the point at height `y`, or `None` on the midline.
    pub fn of_y(&self, y: i64) -> Option<SubCell> {
        let mid = self.midline();
        match y.cmp(&mid) {
            std::cmp::Ordering::Less => Some(SubCell::Bottom),
            std::cmp::Ordering::Greater => Some(SubCell::Top),
            std::cmp::Ordering::Equal => None,
        }
    }
}
