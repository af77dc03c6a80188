//! The in-memory mask layout of one standard cell.
//!
//! Polygons and labels live in flat arenas owned by [`Layout`]; every
//! relationship between them is expressed with [`PolygonId`]/[`TextId`]
//! indices. The model is built once per base layout and then mutated in
//! place by the permutation engine, which restores every change it makes.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use arcstr::ArcStr;
use cellgeom::{Bbox, BoundBox, Point, Quad, QuadError, Rect};

pub use self::connect::DummyIsland;
pub use self::polygon::{Polygon, PolygonId, Supply, TextId, TextLabel};
pub use self::subcell::{Placement, SubCell, SubCells};
use crate::error::{with_err_context, ErrorContext, ErrorSource, Result};
use crate::gds::{GdsBoundary, GdsElement, GdsLibrary, GdsText};
use crate::tech::{LayerInfo, LayerNum, LayerProperties, LayerRole};

pub mod connect;
pub mod polygon;
pub mod subcell;

/// All polygons and labels sharing a layer number.
#[derive(Debug, Clone)]
pub struct Layer {
    pub num: LayerNum,
    pub info: LayerInfo,
    /// Polygons sorted along the layer's routing direction.
    pub polygons: Vec<PolygonId>,
    pub texts: Vec<TextId>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum ElementRef {
    Polygon(PolygonId),
    Text(TextId),
}

#[derive(Debug, Clone)]
pub struct Layout {
    name: ArcStr,
    template: GdsLibrary,
    polygons: Vec<Polygon>,
    texts: Vec<TextLabel>,
    order: Vec<ElementRef>,
    layers: BTreeMap<LayerNum, Layer>,
}

impl Layout {
    /// Builds the geometry model of the top structure of `lib`.
    ///
    /// Resolves via, planar, and label connectivity. Device pairing and
    /// dummy-island tagging are separate passes; see [`Layout::pair_devices`]
    /// and [`Layout::tag_dummy_islands`].
    pub fn from_gds(lib: &GdsLibrary, props: &LayerProperties) -> Result<Self> {
        let top = lib.top()?;
        let name = ArcStr::from(top.name.as_str());
        with_err_context(Self::build(lib, props), || ErrorContext::BuildLayout(name.clone()))
    }

    fn build(lib: &GdsLibrary, props: &LayerProperties) -> Result<Self> {
        let top = lib.top()?;
        let mut template = lib.clone();
        template.structures[0].elements.clear();

        let mut layout = Self {
            name: ArcStr::from(top.name.as_str()),
            template,
            polygons: Vec::new(),
            texts: Vec::new(),
            order: Vec::with_capacity(top.elements.len()),
            layers: BTreeMap::new(),
        };

        for elem in top.elements.iter() {
            match elem {
                GdsElement::Boundary(b) => {
                    layout.add_boundary(b, props)?;
                }
                GdsElement::Text(t) => {
                    layout.add_text(t, props)?;
                }
            }
        }

        layout.sort_layers();
        connect::map_vias(&mut layout);
        connect::map_planar(&mut layout);
        connect::map_texts(&mut layout);
        Ok(layout)
    }

    fn add_boundary(&mut self, b: &GdsBoundary, props: &LayerProperties) -> Result<PolygonId> {
        let info = props.layer(b.layer)?.clone();
        let points = b.xy.iter().copied().map(Point::from).collect::<Vec<_>>();
        let quad = Quad::from_ring(&points).map_err(|reason| ErrorSource::MalformedGeometry {
            layer: b.layer,
            points: points.len(),
            reason,
        })?;

        // The arena length is the next free id.
        let id = PolygonId(self.polygons.len());
        let is_via = info.role == LayerRole::Via || info.connector.is_some();
        self.polygons.push(Polygon::new(
            id,
            b.layer,
            b.datatype,
            quad,
            info.direction,
            is_via,
            info.name.clone(),
        ));
        self.order.push(ElementRef::Polygon(id));
        self.layer_entry(b.layer, Some(info)).polygons.push(id);
        Ok(id)
    }

    fn add_text(&mut self, t: &GdsText, props: &LayerProperties) -> Result<TextId> {
        let point = t
            .xy
            .first()
            .copied()
            .map(Point::from)
            .ok_or(ErrorSource::MalformedGeometry {
                layer: t.layer,
                points: 0,
                reason: QuadError::CornerCount(0),
            })?;
        let id = TextId(self.texts.len());
        self.texts.push(TextLabel {
            id,
            layer: t.layer,
            datatype: t.datatype,
            point,
            text: ArcStr::from(t.text.as_str()),
            presentation: t.presentation.clone(),
        });
        self.order.push(ElementRef::Text(id));
        let info = props.try_layer(t.layer).cloned();
        self.layer_entry(t.layer, info).texts.push(id);
        Ok(id)
    }

    fn layer_entry(&mut self, num: LayerNum, info: Option<LayerInfo>) -> &mut Layer {
        let layer = self.layers.entry(num).or_insert_with(|| Layer {
            num,
            info: LayerInfo::new(format!("layer{num}"), LayerRole::Other, Default::default()),
            polygons: Vec::new(),
            texts: Vec::new(),
        });
        if let Some(info) = info {
            layer.info = info;
        }
        layer
    }

    fn sort_layers(&mut self) {
        let polygons = &self.polygons;
        for layer in self.layers.values_mut() {
            let dir = layer.info.direction;
            layer.polygons.sort_by_key(|id| {
                let r = polygons[id.0].rect();
                (r.span(dir).start(), r.span(!dir).start(), *id)
            });
        }
    }

    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    #[inline]
    pub fn polygon(&self, id: PolygonId) -> &Polygon {
        &self.polygons[id.0]
    }

    #[inline]
    pub(crate) fn polygon_mut(&mut self, id: PolygonId) -> &mut Polygon {
        &mut self.polygons[id.0]
    }

    #[inline]
    pub fn text(&self, id: TextId) -> &TextLabel {
        &self.texts[id.0]
    }

    pub fn polygons(&self) -> impl Iterator<Item = &Polygon> {
        self.polygons.iter()
    }

    pub fn texts(&self) -> impl Iterator<Item = &TextLabel> {
        self.texts.iter()
    }

    #[inline]
    pub fn num_polygons(&self) -> usize {
        self.polygons.len()
    }

    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.values()
    }

    pub fn layer(&self, num: LayerNum) -> Option<&Layer> {
        self.layers.get(&num)
    }

    /// Primary polygons on layer `num`, in sorted order.
    pub fn primary_on(&self, num: LayerNum) -> impl Iterator<Item = &Polygon> + '_ {
        self.layers
            .get(&num)
            .into_iter()
            .flat_map(|l| l.polygons.iter())
            .map(|id| &self.polygons[id.0])
            .filter(|p| p.is_primary())
    }

    /// Primary polygons on every layer with the given role.
    pub fn primary_with_role(&self, role: LayerRole) -> impl Iterator<Item = &Polygon> + '_ {
        self.layers
            .values()
            .filter(move |l| l.info.role == role)
            .flat_map(|l| l.polygons.iter())
            .map(|id| &self.polygons[id.0])
            .filter(|p| p.is_primary())
    }

    /// The bounding box of every primary polygon, excluding the cell outline.
    pub fn bounds(&self) -> Option<Rect> {
        self.layers
            .values()
            .filter(|l| l.info.role != LayerRole::Boundary)
            .flat_map(|l| l.polygons.iter())
            .map(|id| &self.polygons[id.0])
            .filter(|p| p.is_primary())
            .fold(Bbox::empty(), |acc, p| acc.union(p.rect().bbox()))
            .into_rect()
    }

    /// Moves a polygon by `offset`.
    pub fn shift_polygon(&mut self, id: PolygonId, offset: Point) {
        self.polygons[id.0].quad.translate(offset);
    }

    /// Replaces a polygon's extent, keeping its corner order.
    pub fn update_coords(&mut self, id: PolygonId, rect: Rect) {
        self.polygons[id.0].quad.set_rect(rect);
    }

    pub fn shift_text(&mut self, id: TextId, offset: Point) {
        self.texts[id.0].point += offset;
    }

    pub(crate) fn set_text_point(&mut self, id: TextId, point: Point) {
        self.texts[id.0].point = point;
    }

    /// The supply a polygon is labeled with, if it carries exactly one.
    pub fn supply(&self, id: PolygonId) -> Option<Supply> {
        let mut found = None;
        for t in self.polygons[id.0].texts.iter() {
            if let Some(s) = self.texts[t.0].supply() {
                match found {
                    None => found = Some(s),
                    Some(prev) if prev != s => return None,
                    _ => {}
                }
            }
        }
        found
    }

    /// Every polygon reachable from `id` through via and planar links.
    pub fn connected_group(&self, id: PolygonId) -> BTreeSet<PolygonId> {
        let mut seen = BTreeSet::from([id]);
        let mut queue = VecDeque::from([id]);
        while let Some(cur) = queue.pop_front() {
            for next in self.polygons[cur.0].layer_map.iter() {
                if seen.insert(*next) {
                    queue.push_back(*next);
                }
            }
        }
        seen
    }

    /// The supplies a connected group of polygons is labeled with.
    pub fn group_supplies(&self, id: PolygonId) -> BTreeSet<Supply> {
        self.connected_group(id)
            .into_iter()
            .filter_map(|p| self.supply(p))
            .collect()
    }

    /// Serializes the current geometry into the GDS-JSON wire structure.
    ///
    /// Elements are emitted in the order they were read.
    pub fn to_gds(&self) -> GdsLibrary {
        let mut lib = self.template.clone();
        let elements = self
            .order
            .iter()
            .map(|elem| match elem {
                ElementRef::Polygon(id) => {
                    let p = &self.polygons[id.0];
                    GdsElement::Boundary(GdsBoundary {
                        layer: p.layer,
                        datatype: p.datatype,
                        xy: p.quad.ring().into_iter().map(<[i64; 2]>::from).collect(),
                    })
                }
                ElementRef::Text(id) => {
                    let t = &self.texts[id.0];
                    GdsElement::Text(GdsText {
                        layer: t.layer,
                        datatype: t.datatype,
                        xy: vec![t.point.into()],
                        text: t.text.to_string(),
                        presentation: t.presentation.clone(),
                    })
                }
            })
            .collect();
        lib.structures[0].elements = elements;
        lib
    }
}
