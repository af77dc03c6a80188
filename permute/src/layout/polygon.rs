//! Polygons and text labels.

use std::collections::BTreeSet;
use std::fmt::Display;

use arcstr::ArcStr;
use cellgeom::{Dir, Point, Quad, Rect};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tech::LayerNum;

/// Index of a [`Polygon`] in its layout's arena.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct PolygonId(pub usize);

/// Index of a [`TextLabel`] in its layout's arena.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct TextId(pub usize);

impl Display for PolygonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "polygon {}", self.0)
    }
}

impl Display for TextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "label {}", self.0)
    }
}

/// A power or ground supply net.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum Supply {
    Vdd,
    Vss,
}

impl Supply {
    /// Classifies a net name.
    pub fn from_net(net: &str) -> Option<Self> {
        let net = net.trim();
        if net.eq_ignore_ascii_case("vdd") {
            Some(Self::Vdd)
        } else if net.eq_ignore_ascii_case("vss") {
            Some(Self::Vss)
        } else {
            None
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::Vdd => Self::Vss,
            Self::Vss => Self::Vdd,
        }
    }
}

/// One rectangle of mask geometry.
///
/// Links to other polygons are arena indices; the layout owns every polygon.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Polygon {
    pub(crate) id: PolygonId,
    pub(crate) layer: LayerNum,
    pub(crate) datatype: i16,
    pub(crate) quad: Quad,
    pub(crate) direction: Dir,
    pub(crate) is_via: bool,
    pub(crate) layer_name: ArcStr,
    /// Polygons on other layers this one touches through a via or planar merge.
    pub(crate) adjacency: BTreeSet<PolygonId>,
    /// Polygons this one is wired to, in link order.
    pub(crate) layer_map: Vec<PolygonId>,
    pub(crate) texts: BTreeSet<TextId>,
    pub(crate) connected_gate: Option<PolygonId>,
    pub(crate) connected_interconnect: Option<PolygonId>,
    pub(crate) planar_partner: Option<PolygonId>,
    pub(crate) planar_union: Option<Rect>,
    /// The extent the polygon had when it was read.
    pub(crate) max_bounds: Rect,
    pub(crate) dummy: bool,
}

impl Polygon {
    pub(crate) fn new(
        id: PolygonId,
        layer: LayerNum,
        datatype: i16,
        quad: Quad,
        direction: Dir,
        is_via: bool,
        layer_name: ArcStr,
    ) -> Self {
        Self {
            id,
            layer,
            datatype,
            max_bounds: quad.rect(),
            quad,
            direction,
            is_via,
            layer_name,
            adjacency: BTreeSet::new(),
            layer_map: Vec::new(),
            texts: BTreeSet::new(),
            connected_gate: None,
            connected_interconnect: None,
            planar_partner: None,
            planar_union: None,
            dummy: false,
        }
    }

    #[inline]
    pub fn id(&self) -> PolygonId {
        self.id
    }

    #[inline]
    pub fn layer(&self) -> LayerNum {
        self.layer
    }

    #[inline]
    pub fn datatype(&self) -> i16 {
        self.datatype
    }

    /// Only primary geometry takes part in connectivity and design-rule checks.
    #[inline]
    pub fn is_primary(&self) -> bool {
        self.datatype == 0
    }

    #[inline]
    pub fn rect(&self) -> Rect {
        self.quad.rect()
    }

    #[inline]
    pub fn quad(&self) -> &Quad {
        &self.quad
    }

    /// The four corners in the order they were read.
    pub fn corners(&self) -> [Point; 4] {
        self.quad.corners()
    }

    #[inline]
    pub fn direction(&self) -> Dir {
        self.direction
    }

    #[inline]
    pub fn is_via(&self) -> bool {
        self.is_via
    }

    pub fn layer_name(&self) -> &ArcStr {
        &self.layer_name
    }

    pub fn adjacency(&self) -> &BTreeSet<PolygonId> {
        &self.adjacency
    }

    pub fn layer_map(&self) -> &[PolygonId] {
        &self.layer_map
    }

    pub fn texts(&self) -> &BTreeSet<TextId> {
        &self.texts
    }

    pub fn connected_gate(&self) -> Option<PolygonId> {
        self.connected_gate
    }

    pub fn connected_interconnect(&self) -> Option<PolygonId> {
        self.connected_interconnect
    }

    /// The paired device polygon across a gate or interconnect split.
    pub fn twin(&self) -> Option<PolygonId> {
        self.connected_gate.or(self.connected_interconnect)
    }

    pub fn planar_partner(&self) -> Option<PolygonId> {
        self.planar_partner
    }

    pub fn planar_union(&self) -> Option<Rect> {
        self.planar_union
    }

    pub fn max_bounds(&self) -> Rect {
        self.max_bounds
    }

    pub fn is_dummy(&self) -> bool {
        self.dummy
    }

    pub(crate) fn link(&mut self, other: PolygonId) {
        if !self.layer_map.contains(&other) {
            self.layer_map.push(other);
        }
        self.adjacency.insert(other);
    }
}

/// A net-name annotation at a single point.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLabel {
    pub(crate) id: TextId,
    pub(crate) layer: LayerNum,
    pub(crate) datatype: i16,
    pub(crate) point: Point,
    pub(crate) text: ArcStr,
    pub(crate) presentation: Option<Value>,
}

impl TextLabel {
    #[inline]
    pub fn id(&self) -> TextId {
        self.id
    }

    #[inline]
    pub fn layer(&self) -> LayerNum {
        self.layer
    }

    #[inline]
    pub fn point(&self) -> Point {
        self.point
    }

    #[inline]
    pub fn text(&self) -> &ArcStr {
        &self.text
    }

    pub fn supply(&self) -> Option<Supply> {
        Supply::from_net(&self.text)
    }
}
