//! Integer geometry for standard-cell mask layouts.
//!
//! All coordinates are database units. Rectangles are closed: a shape that
//! ends at `x = 10` and a shape that starts at `x = 10` touch.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::bbox::{Bbox, BoundBox};
pub use self::quad::{Quad, QuadError};

pub mod bbox;
pub mod quad;

/// A point in two-dimensional layout-space.
#[derive(
    Debug, Copy, Clone, Default, Hash, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord,
)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    /// Creates a new [`Point`] from (x,y) coordinates.
    #[inline]
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Returns the origin, (0, 0).
    #[inline]
    pub const fn zero() -> Self {
        Self { x: 0, y: 0 }
    }

    /// Creates a new [`Point`] that serves as an offset in direction `dir`.
    pub fn offset(val: i64, dir: Dir) -> Self {
        match dir {
            Dir::Horiz => Self { x: val, y: 0 },
            Dir::Vert => Self { x: 0, y: val },
        }
    }

    /// Gets the coordinate associated with direction `dir`.
    pub fn coord(&self, dir: Dir) -> i64 {
        match dir {
            Dir::Horiz => self.x,
            Dir::Vert => self.y,
        }
    }

    /// Creates a new [`Point`] shifted by `p`.
    #[inline]
    pub fn translated(&self, p: Point) -> Self {
        Self::new(self.x + p.x, self.y + p.y)
    }
}

impl std::ops::Add<Point> for Point {
    type Output = Self;
    fn add(self, rhs: Point) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub<Point> for Point {
    type Output = Self;
    fn sub(self, rhs: Point) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::AddAssign<Point> for Point {
    fn add_assign(&mut self, rhs: Point) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl From<(i64, i64)> for Point {
    fn from(value: (i64, i64)) -> Self {
        Self::new(value.0, value.1)
    }
}

impl From<[i64; 2]> for Point {
    fn from(value: [i64; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

impl From<Point> for [i64; 2] {
    fn from(value: Point) -> Self {
        [value.x, value.y]
    }
}

/// A closed one-dimensional interval.
#[derive(
    Debug, Default, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize, PartialEq, Eq,
)]
pub struct Span {
    start: i64,
    stop: i64,
}

impl Span {
    /// Creates a new [`Span`] between two integers, in either order.
    pub fn new(a: i64, b: i64) -> Self {
        Self {
            start: a.min(b),
            stop: a.max(b),
        }
    }

    /// Creates a new [`Span`] without ordering its endpoints.
    ///
    /// The caller must ensure that `start <= stop`.
    pub const fn new_unchecked(start: i64, stop: i64) -> Self {
        Self { start, stop }
    }

    /// Creates a zero-length span at `x`.
    pub fn from_point(x: i64) -> Self {
        Self { start: x, stop: x }
    }

    /// Creates a span of the given length centered at `center`.
    pub fn from_center_span(center: i64, length: i64) -> Self {
        debug_assert!(length >= 0);
        Self::new(center - length / 2, center - length / 2 + length)
    }

    #[inline]
    pub fn start(&self) -> i64 {
        self.start
    }

    #[inline]
    pub fn stop(&self) -> i64 {
        self.stop
    }

    #[inline]
    pub fn length(&self) -> i64 {
        self.stop - self.start
    }

    /// The midpoint of the span, rounded towards negative infinity.
    #[inline]
    pub fn center(&self) -> i64 {
        (self.start + self.stop).div_euclid(2)
    }

    /// Returns `true` if the two closed spans share at least one point.
    pub fn intersects(&self, other: &Self) -> bool {
        self.start <= other.stop && other.start <= self.stop
    }

    /// Returns `true` if the two spans share an interval of positive length.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.stop && other.start < self.stop
    }

    /// Edge-to-edge distance between two spans.
    ///
    /// Negative when the spans overlap; zero when they abut.
    pub fn gap(&self, other: &Self) -> i64 {
        self.start.max(other.start) - self.stop.min(other.stop)
    }

    /// The smallest span containing both spans.
    pub fn union(self, other: Self) -> Self {
        Self {
            start: self.start.min(other.start),
            stop: self.stop.max(other.stop),
        }
    }

    /// The common part of both spans, if any.
    pub fn intersection(self, other: Self) -> Option<Self> {
        let start = self.start.max(other.start);
        let stop = self.stop.min(other.stop);
        (start <= stop).then_some(Self { start, stop })
    }

    /// Returns `true` if `other` lies entirely within this span.
    pub fn contains(&self, other: Self) -> bool {
        self.start <= other.start && other.stop <= self.stop
    }

    /// Returns `true` if `x` lies within the closed span.
    pub fn contains_point(&self, x: i64) -> bool {
        self.start <= x && x <= self.stop
    }

    /// Grows the span by `amount` on both ends.
    pub fn expand_all(self, amount: i64) -> Self {
        Self::new(self.start - amount, self.stop + amount)
    }

    /// Shifts the span by `amount`.
    pub fn translate(self, amount: i64) -> Self {
        Self {
            start: self.start + amount,
            stop: self.stop + amount,
        }
    }

    /// Merges many spans into their bounding span.
    pub fn merge(spans: impl IntoIterator<Item = Self>) -> Option<Self> {
        spans.into_iter().reduce(Self::union)
    }
}

impl From<(i64, i64)> for Span {
    #[inline]
    fn from(tup: (i64, i64)) -> Self {
        Self::new(tup.0, tup.1)
    }
}

/// Enumeration over possible routing directions.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Hash, PartialEq, Eq)]
pub enum Dir {
    /// Horizontal.
    #[default]
    #[serde(rename = "horizontal", alias = "horiz", alias = "h", alias = "HORIZONTAL")]
    Horiz,
    /// Vertical.
    #[serde(rename = "vertical", alias = "vert", alias = "v", alias = "VERTICAL")]
    Vert,
}

impl Dir {
    /// Returns the perpendicular direction.
    pub fn other(self) -> Self {
        match self {
            Self::Horiz => Self::Vert,
            Self::Vert => Self::Horiz,
        }
    }
}

impl Display for Dir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Horiz => write!(f, "horizontal"),
            Self::Vert => write!(f, "vertical"),
        }
    }
}

impl std::ops::Not for Dir {
    type Output = Self;
    fn not(self) -> Self::Output {
        self.other()
    }
}

#[derive(Debug, Clone, Error)]
#[error("error parsing direction: {original}")]
pub struct DirParseError {
    original: String,
}

impl FromStr for Dir {
    type Err = DirParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "horizontal" | "horiz" | "h" => Ok(Self::Horiz),
            "vertical" | "vert" | "v" => Ok(Self::Vert),
            _ => Err(DirParseError {
                original: s.to_string(),
            }),
        }
    }
}

/// The corners of an axis-aligned rectangle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Hash, PartialEq, Eq)]
pub enum Corner {
    LowerLeft,
    LowerRight,
    UpperRight,
    UpperLeft,
}

impl Corner {
    /// Classifies `pt` as a corner of `rect`, if it is one.
    pub fn of(rect: &Rect, pt: Point) -> Option<Self> {
        let left = pt.x == rect.left();
        let right = pt.x == rect.right();
        let bot = pt.y == rect.bottom();
        let top = pt.y == rect.top();
        match (left, right, bot, top) {
            (true, false, true, false) => Some(Self::LowerLeft),
            (false, true, true, false) => Some(Self::LowerRight),
            (false, true, false, true) => Some(Self::UpperRight),
            (true, false, false, true) => Some(Self::UpperLeft),
            _ => None,
        }
    }
}

/// An axis-aligned rectangle, specified by lower-left and upper-right corners.
#[derive(Debug, Default, Copy, Clone, Hash, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rect {
    pub p0: Point,
    pub p1: Point,
}

impl Rect {
    /// Creates a rectangle from two opposite corners in any order.
    pub fn new(p0: Point, p1: Point) -> Self {
        Self {
            p0: Point::new(p0.x.min(p1.x), p0.y.min(p1.y)),
            p1: Point::new(p0.x.max(p1.x), p0.y.max(p1.y)),
        }
    }

    /// Creates a rectangle from its horizontal and vertical spans.
    pub fn from_spans(h: Span, v: Span) -> Self {
        Self {
            p0: Point::new(h.start(), v.start()),
            p1: Point::new(h.stop(), v.stop()),
        }
    }

    /// Creates a rectangle from `(x0, y0, x1, y1)`.
    pub fn from_xy(x0: i64, y0: i64, x1: i64, y1: i64) -> Self {
        Self::new(Point::new(x0, y0), Point::new(x1, y1))
    }

    #[inline]
    pub fn bottom(&self) -> i64 {
        self.p0.y
    }

    #[inline]
    pub fn top(&self) -> i64 {
        self.p1.y
    }

    #[inline]
    pub fn left(&self) -> i64 {
        self.p0.x
    }

    #[inline]
    pub fn right(&self) -> i64 {
        self.p1.x
    }

    #[inline]
    pub fn hspan(&self) -> Span {
        Span::new_unchecked(self.p0.x, self.p1.x)
    }

    #[inline]
    pub fn vspan(&self) -> Span {
        Span::new_unchecked(self.p0.y, self.p1.y)
    }

    /// The span of the rectangle along `dir`.
    pub fn span(&self, dir: Dir) -> Span {
        match dir {
            Dir::Horiz => self.hspan(),
            Dir::Vert => self.vspan(),
        }
    }

    /// Replaces the span of the rectangle along `dir`.
    pub fn with_span(self, span: Span, dir: Dir) -> Self {
        match dir {
            Dir::Horiz => Self::from_spans(span, self.vspan()),
            Dir::Vert => Self::from_spans(self.hspan(), span),
        }
    }

    #[inline]
    pub fn width(&self) -> i64 {
        self.p1.x - self.p0.x
    }

    #[inline]
    pub fn height(&self) -> i64 {
        self.p1.y - self.p0.y
    }

    /// The extent of the rectangle along `dir`.
    pub fn length(&self, dir: Dir) -> i64 {
        self.span(dir).length()
    }

    pub fn area(&self) -> i64 {
        self.width() * self.height()
    }

    /// The center of the rectangle, rounded towards negative infinity.
    pub fn center(&self) -> Point {
        Point::new(self.hspan().center(), self.vspan().center())
    }

    pub fn corner(&self, corner: Corner) -> Point {
        match corner {
            Corner::LowerLeft => self.p0,
            Corner::LowerRight => Point::new(self.p1.x, self.p0.y),
            Corner::UpperRight => self.p1,
            Corner::UpperLeft => Point::new(self.p0.x, self.p1.y),
        }
    }

    /// Returns a copy of the rectangle shifted by `p`.
    pub fn translated(&self, p: Point) -> Self {
        Self {
            p0: self.p0 + p,
            p1: self.p1 + p,
        }
    }

    /// Returns `true` if the closed rectangles share at least one point.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.hspan().intersects(&other.hspan()) && self.vspan().intersects(&other.vspan())
    }

    /// Returns `true` if the rectangles share a region of positive area.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.hspan().overlaps(&other.hspan()) && self.vspan().overlaps(&other.vspan())
    }

    /// Returns `true` if the rectangles abut along an edge of positive length
    /// without overlapping.
    pub fn abuts(&self, other: &Rect) -> bool {
        let (h, v) = (self.hspan(), self.vspan());
        let (oh, ov) = (other.hspan(), other.vspan());
        (h.gap(&oh) == 0 && v.overlaps(&ov)) || (v.gap(&ov) == 0 && h.overlaps(&oh))
    }

    /// Returns `true` if `pt` lies inside or on the boundary of the rectangle.
    pub fn contains_point(&self, pt: Point) -> bool {
        self.hspan().contains_point(pt.x) && self.vspan().contains_point(pt.y)
    }

    /// Returns `true` if `other` lies entirely within the rectangle.
    pub fn contains(&self, other: &Rect) -> bool {
        self.hspan().contains(other.hspan()) && self.vspan().contains(other.vspan())
    }

    /// The common region of both rectangles, if any.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let h = self.hspan().intersection(other.hspan())?;
        let v = self.vspan().intersection(other.vspan())?;
        Some(Self::from_spans(h, v))
    }

    /// The smallest rectangle containing both rectangles.
    pub fn union(&self, other: &Rect) -> Rect {
        Self::from_spans(
            self.hspan().union(other.hspan()),
            self.vspan().union(other.vspan()),
        )
    }

    /// Edge-to-edge distance to `other` measured along `dir`.
    ///
    /// Negative when the rectangles overlap along `dir`.
    pub fn gap(&self, other: &Rect, dir: Dir) -> i64 {
        self.span(dir).gap(&other.span(dir))
    }
}

impl Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[({}, {}), ({}, {})]",
            self.p0.x, self.p0.y, self.p1.x, self.p1.y
        )
    }
}
