//! Geometry mutation for one candidate: shifting, bound re-optimization, and rollback.

use std::collections::BTreeSet;

use cellgeom::{Point, Quad, Rect, Span};

use crate::layout::{Layout, Placement, PolygonId, SubCells, TextId};
use crate::tech::{LayerProperties, LayerRole};

/// Original geometry of everything a candidate touched.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct UndoLog {
    quads: Vec<(PolygonId, Quad)>,
    points: Vec<(TextId, Point)>,
}

impl UndoLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_polygon(&mut self, layout: &Layout, id: PolygonId) {
        self.quads.push((id, *layout.polygon(id).quad()));
    }

    pub fn record_text(&mut self, layout: &Layout, id: TextId) {
        self.points.push((id, layout.text(id).point()));
    }

    pub fn is_empty(&self) -> bool {
        self.quads.is_empty() && self.points.is_empty()
    }

    /// Polygons recorded, in the order they were first touched.
    pub fn polygons(&self) -> impl Iterator<Item = PolygonId> + '_ {
        self.quads.iter().map(|(id, _)| *id)
    }

    /// Restores every recorded polygon and label.
    ///
    /// Entries are replayed newest first, so the oldest record of each
    /// element wins.
    pub fn rollback(self, layout: &mut Layout) {
        for (id, quad) in self.quads.into_iter().rev() {
            layout.polygon_mut(id).quad = quad;
        }
        for (id, point) in self.points.into_iter().rev() {
            layout.set_text_point(id, point);
        }
    }
}

/// Moves `metal` so its center lands at height `y`, taking its vias and labels along.
///
/// Returns `false` if the metal was already there.
pub fn shift_to_track(
    layout: &mut Layout,
    metal: PolygonId,
    y: i64,
    moved_vias: &mut BTreeSet<PolygonId>,
    moved_texts: &mut BTreeSet<TextId>,
    log: &mut UndoLog,
) -> bool {
    let p = layout.polygon(metal);
    let dy = y - p.rect().center().y;
    if dy == 0 {
        return false;
    }
    let offset = Point::new(0, dy);
    let vias = p
        .layer_map()
        .iter()
        .copied()
        .filter(|v| layout.polygon(*v).is_via())
        .collect::<Vec<_>>();
    let texts = p.texts().iter().copied().collect::<Vec<_>>();

    log.record_polygon(layout, metal);
    layout.shift_polygon(metal, offset);
    for via in vias {
        if moved_vias.insert(via) {
            log.record_polygon(layout, via);
            layout.shift_polygon(via, offset);
        }
    }
    for text in texts {
        if moved_texts.insert(text) {
            log.record_text(layout, text);
            layout.shift_text(text, offset);
        }
    }
    true
}

/// Device polygons below the given metals, with their planar partners.
pub fn dependent_devices(
    layout: &Layout,
    props: &LayerProperties,
    metals: impl IntoIterator<Item = PolygonId>,
) -> BTreeSet<PolygonId> {
    let mut out = BTreeSet::new();
    for metal in metals {
        for via in layout.polygon(metal).layer_map() {
            let via = layout.polygon(*via);
            if !via.is_via() {
                continue;
            }
            for dev in via.layer_map() {
                let d = layout.polygon(*dev);
                if *dev == metal || d.is_via() || !props.role(d.layer()).is_device() {
                    continue;
                }
                out.insert(*dev);
                if let Some(partner) = d.planar_partner() {
                    out.insert(partner);
                }
            }
        }
    }
    out
}

/// Recomputes the extent of every device below the moved metals.
pub fn optimize_layers(
    layout: &mut Layout,
    props: &LayerProperties,
    subcells: Option<&SubCells>,
    moved: &[PolygonId],
    log: &mut UndoLog,
) {
    for dev in dependent_devices(layout, props, moved.iter().copied()) {
        let rect = get_optimized_bounds(layout, props, subcells, dev);
        if rect != layout.polygon(dev).rect() {
            log.record_polygon(layout, dev);
            layout.update_coords(dev, rect);
        }
    }
}

/// The tightest extent of a device polygon along its routing direction.
///
/// The extent covers every nanosheet the device crosses in its sub-cell plus
/// the device overhang, every via landing on it plus the via overhang, and
/// the seam shared with a planar partner. With none of those the drawn
/// extent is kept. The result never leaves the drawn extent, nor the
/// polygon's sub-cell when it lies within one.
pub fn get_optimized_bounds(
    layout: &Layout,
    props: &LayerProperties,
    subcells: Option<&SubCells>,
    id: PolygonId,
) -> Rect {
    let p = layout.polygon(id);
    let dir = p.direction();
    let rect = p.rect();
    let max = p.max_bounds();
    let max_span = max.span(dir);

    let window = subcells.and_then(|cells| match cells.classify(max) {
        Placement::Within(cell) => Some(cells.span(cell)),
        Placement::Spans => None,
    });
    let in_window = |y: i64| window.map(|w| w.contains_point(y)).unwrap_or(true);

    let ext = match props.role(p.layer()) {
        LayerRole::Gate => props.rules.gate_extension,
        LayerRole::Interconnect => props.rules.interconnect_extension,
        _ => 0,
    };
    let mut need: Option<Span> = None;
    let mut cover = |span: Span| {
        need = Some(need.map_or(span, |n| n.union(span)));
    };

    for sheet in layout.primary_with_role(LayerRole::NanoSheet) {
        let rs = sheet.rect();
        if rs.span(!dir).overlaps(&rect.span(!dir))
            && rs.span(dir).overlaps(&max_span)
            && in_window(rs.center().y)
        {
            cover(rs.span(dir).expand_all(ext));
        }
    }

    for via in p.layer_map().iter().map(|v| layout.polygon(*v)) {
        if via.is_via() && in_window(via.rect().center().y) {
            cover(via.rect().span(dir).expand_all(props.rules.via_extension));
        }
    }

    if let Some(partner) = p.planar_partner() {
        let theirs = layout.polygon(partner).max_bounds().span(dir);
        let seam = if theirs.center() >= max_span.center() {
            max_span.stop()
        } else {
            max_span.start()
        };
        cover(Span::from_point(seam));
    }

    let Some(need) = need else {
        return rect.with_span(max_span, dir);
    };
    let limit = window
        .and_then(|w| max_span.intersection(w))
        .unwrap_or(max_span);
    match need.intersection(limit) {
        Some(span) if span.length() > 0 => rect.with_span(span, dir),
        _ => rect.with_span(max_span, dir),
    }
}

#[cfg(test)]
mod tests {
    use cellgeom::Dir;

    use super::*;
    use crate::gds::{GdsBoundary, GdsElement, GdsLibrary, GdsStructure, GdsText};
    use crate::tech::{LayerInfo, LayerNum, Rules};

    fn rect(layer: LayerNum, x0: i64, y0: i64, x1: i64, y1: i64) -> GdsElement {
        GdsElement::Boundary(GdsBoundary {
            layer,
            datatype: 0,
            xy: Quad::from_rect(Rect::from_xy(x0, y0, x1, y1))
                .ring()
                .into_iter()
                .map(<[i64; 2]>::from)
                .collect(),
        })
    }

    fn props() -> LayerProperties {
        LayerProperties::builder()
            .layer(1, LayerInfo::new("NanoSheet", LayerRole::NanoSheet, Dir::Horiz))
            .layer(3, LayerInfo::new("Interconnect", LayerRole::Interconnect, Dir::Vert))
            .layer(10, LayerInfo::new("VIA0", LayerRole::Via, Dir::Horiz).with_connector(3, 20))
            .layer(20, LayerInfo::new("M0", LayerRole::Metal, Dir::Horiz))
            .perm_layers(vec![20])
            .rules(
                Rules::builder()
                    .interconnect_extension(10)
                    .via_extension(5)
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap()
    }

    fn layout(elements: Vec<GdsElement>, props: &LayerProperties) -> Layout {
        let lib = GdsLibrary {
            version: Default::default(),
            timestamp: Default::default(),
            name: "LIB".into(),
            units: [0.001, 1e-9],
            structures: vec![GdsStructure {
                name: "CELL".into(),
                timestamp: Default::default(),
                elements,
            }],
            base_layout_name: None,
        };
        Layout::from_gds(&lib, props).unwrap()
    }

    /// A double-height cell split at y = 200 with one nanosheet per row.
    fn double_height(interconnect: (i64, i64), via_y: i64) -> (Layout, LayerProperties) {
        let props = props();
        let cell = layout(
            vec![
                rect(1, 0, 40, 200, 80),
                rect(1, 0, 320, 200, 360),
                rect(3, 90, interconnect.0, 110, interconnect.1),
                rect(20, 0, via_y - 10, 200, via_y + 10),
                rect(10, 95, via_y - 5, 105, via_y + 5),
            ],
            &props,
        );
        (cell, props)
    }

    #[test]
    fn bottom_row_device_ignores_top_row() {
        let (cell, props) = double_height((10, 190), 150);
        let cells = SubCells::new(Rect::from_xy(0, 0, 200, 400));
        let r = get_optimized_bounds(&cell, &props, Some(&cells), PolygonId(2));
        // Nanosheet 40..80 widened by 10, via 145..155 widened by 5.
        assert_eq!(r.vspan(), Span::new(30, 160));
        assert_eq!(r.hspan(), Span::new(90, 110));
    }

    #[test]
    fn spanning_device_covers_both_rows() {
        let (cell, props) = double_height((10, 390), 150);
        let cells = SubCells::new(Rect::from_xy(0, 0, 200, 400));
        let r = get_optimized_bounds(&cell, &props, Some(&cells), PolygonId(2));
        assert_eq!(r.vspan(), Span::new(30, 370));
    }

    #[test]
    fn result_is_clamped_to_drawn_extent() {
        let (cell, props) = double_height((50, 190), 150);
        let r = get_optimized_bounds(&cell, &props, None, PolygonId(2));
        assert_eq!(r.vspan(), Span::new(50, 160));
    }

    #[test]
    fn shift_and_rollback_restore_everything() {
        let props = props();
        let mut cell = layout(
            vec![
                rect(1, 0, 40, 200, 80),
                rect(3, 90, 10, 110, 190),
                rect(20, 0, 140, 200, 160),
                rect(10, 95, 145, 105, 155),
                GdsElement::Text(GdsText {
                    layer: 20,
                    datatype: 0,
                    xy: vec![[10, 150]],
                    text: "A".into(),
                    presentation: None,
                }),
            ],
            &props,
        );
        let before = cell.to_gds();
        let mut log = UndoLog::new();
        let (mut vias, mut texts) = (BTreeSet::new(), BTreeSet::new());
        assert!(shift_to_track(&mut cell, PolygonId(2), 100, &mut vias, &mut texts, &mut log));
        assert_eq!(cell.polygon(PolygonId(3)).rect(), Rect::from_xy(95, 95, 105, 105));
        assert_eq!(cell.text(TextId(0)).point(), cellgeom::Point::new(10, 100));

        optimize_layers(&mut cell, &props, None, &[PolygonId(2)], &mut log);
        assert_eq!(cell.polygon(PolygonId(1)).rect().vspan(), Span::new(30, 110));
        assert_ne!(cell.to_gds(), before);

        log.rollback(&mut cell);
        assert_eq!(cell.to_gds(), before);
    }
}
