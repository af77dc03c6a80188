//! Cross-layer connectivity: vias, planar merges, labels, and device pairing.

use itertools::Itertools;

use super::{Layout, PolygonId};
use crate::log::debug;
use crate::tech::{LayerNum, LayerProperties, LayerRole};

/// A via landing on one half of a split device with nothing under it on the other half.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct DummyIsland {
    pub via: PolygonId,
    pub device: PolygonId,
}

fn primary_ids(layout: &Layout, num: LayerNum) -> Vec<PolygonId> {
    layout.primary_on(num).map(|p| p.id()).collect()
}

fn link(layout: &mut Layout, a: PolygonId, b: PolygonId) {
    layout.polygons[a.0].link(b);
    layout.polygons[b.0].link(a);
}

/// Links every via to the polygons it lands on in the two layers it bridges.
pub(super) fn map_vias(layout: &mut Layout) {
    let via_layers = layout
        .layers
        .values()
        .filter_map(|l| l.info.connector.map(|c| (l.num, c)))
        .collect::<Vec<_>>();

    for (via_layer, bridged) in via_layers {
        for via in primary_ids(layout, via_layer) {
            let rect = layout.polygon(via).rect();
            let landed = bridged
                .iter()
                .flat_map(|num| layout.primary_on(*num))
                .filter(|p| p.id() != via && p.rect().overlaps(&rect))
                .map(|p| p.id())
                .collect::<Vec<_>>();

            for id in landed.iter() {
                link(layout, via, *id);
            }
            // The via makes the polygons it joins adjacent to one another.
            for (a, b) in landed.iter().tuple_combinations() {
                if layout.polygon(*a).layer() != layout.polygon(*b).layer() {
                    layout.polygons[a.0].adjacency.insert(*b);
                    layout.polygons[b.0].adjacency.insert(*a);
                }
            }
        }
    }
}

/// Merges abutting polygons across declared planar layer pairs.
pub(super) fn map_planar(layout: &mut Layout) {
    let pairs = layout
        .layers
        .values()
        .filter_map(|l| l.info.planar_connections.map(|other| (l.num, other)))
        .collect::<Vec<_>>();

    for (num, other) in pairs {
        for a in primary_ids(layout, num) {
            for b in primary_ids(layout, other) {
                let (pa, pb) = (layout.polygon(a), layout.polygon(b));
                if a == b || pa.planar_partner.is_some() || pb.planar_partner.is_some() {
                    continue;
                }
                let (ra, rb) = (pa.rect(), pb.rect());
                if !ra.abuts(&rb) {
                    continue;
                }
                let union = ra.union(&rb);
                for (id, partner) in [(a, b), (b, a)] {
                    let p = &mut layout.polygons[id.0];
                    p.planar_partner = Some(partner);
                    p.planar_union = Some(union);
                }
                link(layout, a, b);
                break;
            }
        }
    }
}

/// Attaches every label to the primary polygons containing its point.
pub(super) fn map_texts(layout: &mut Layout) {
    for t in 0..layout.texts.len() {
        let point = layout.texts[t].point;
        let id = layout.texts[t].id;
        for p in layout.polygons.iter_mut() {
            if p.is_primary() && p.rect().contains_point(point) {
                p.texts.insert(id);
            }
        }
    }
}

impl Layout {
    /// Pairs identical polygons across each declared gate or interconnect split.
    pub fn pair_devices(&mut self, props: &LayerProperties) {
        for [a, b] in props.device_pairs.iter().copied() {
            let gate = props.role(a) == LayerRole::Gate || props.role(b) == LayerRole::Gate;
            for pa in primary_ids(self, a) {
                let rect = self.polygon(pa).rect();
                let twin = self
                    .primary_on(b)
                    .find(|p| p.id() != pa && p.rect() == rect)
                    .map(|p| p.id());
                let Some(pb) = twin else { continue };
                for (id, other) in [(pa, pb), (pb, pa)] {
                    let p = &mut self.polygons[id.0];
                    if gate {
                        p.connected_gate = Some(other);
                    } else {
                        p.connected_interconnect = Some(other);
                    }
                }
            }
        }
    }

    /// Finds vias landing on one half of a device pair with the other half absent.
    pub fn find_dummy_islands(&self, props: &LayerProperties) -> Vec<DummyIsland> {
        let mut islands = Vec::new();
        for via in self.polygons().filter(|p| p.is_primary() && p.is_via()) {
            let rect = via.rect();
            for [a, b] in props.device_pairs.iter().copied() {
                for (here, there) in [(a, b), (b, a)] {
                    let covered = self.primary_on(there).any(|p| p.rect().overlaps(&rect));
                    if covered {
                        continue;
                    }
                    islands.extend(
                        self.primary_on(here)
                            .filter(|p| p.rect().overlaps(&rect))
                            .map(|p| DummyIsland {
                                via: via.id(),
                                device: p.id(),
                            }),
                    );
                }
            }
        }
        islands.sort();
        islands.dedup();
        islands
    }

    /// Tags every dummy island found in the current geometry.
    pub fn tag_dummy_islands(&mut self, props: &LayerProperties) -> Vec<DummyIsland> {
        let islands = self.find_dummy_islands(props);
        for island in islands.iter() {
            debug!(
                "{}: tagging dummy island at {} on {}",
                self.name, island.via, island.device
            );
            self.polygons[island.via.0].dummy = true;
            self.polygons[island.device.0].dummy = true;
        }
        islands
    }
}

#[cfg(test)]
mod tests {
    use cellgeom::{Dir, Point, Quad, Rect};

    use super::*;
    use crate::gds::{GdsBoundary, GdsElement, GdsLibrary, GdsStructure, GdsText};
    use crate::layout::{Supply, TextId};
    use crate::tech::LayerInfo;

    fn rect(layer: LayerNum, r: Rect) -> GdsElement {
        GdsElement::Boundary(GdsBoundary {
            layer,
            datatype: 0,
            xy: Quad::from_rect(r)
                .ring()
                .into_iter()
                .map(<[i64; 2]>::from)
                .collect(),
        })
    }

    fn label(layer: LayerNum, p: Point, s: &str) -> GdsElement {
        GdsElement::Text(GdsText {
            layer,
            datatype: 0,
            xy: vec![p.into()],
            text: s.to_string(),
            presentation: None,
        })
    }

    fn build(elements: Vec<GdsElement>, props: &LayerProperties) -> Layout {
        let lib = GdsLibrary {
            version: Default::default(),
            timestamp: Default::default(),
            name: "LIB".into(),
            units: [0.001, 1e-9],
            structures: vec![GdsStructure {
                name: "NAND2".into(),
                timestamp: Default::default(),
                elements,
            }],
            base_layout_name: None,
        };
        Layout::from_gds(&lib, props).unwrap()
    }

    fn cfet_props() -> LayerProperties {
        LayerProperties::builder()
            .layer(3, LayerInfo::new("InterconnectTop", LayerRole::Interconnect, Dir::Vert))
            .layer(4, LayerInfo::new("InterconnectBot", LayerRole::Interconnect, Dir::Vert))
            .layer(5, LayerInfo::new("InterconnectExt", LayerRole::Interconnect, Dir::Vert)
                .with_planar_connection(3))
            .layer(10, LayerInfo::new("VIA0", LayerRole::Via, Dir::Horiz).with_connector(3, 20))
            .layer(20, LayerInfo::new("M0", LayerRole::Metal, Dir::Horiz))
            .device_pairs(vec![[3, 4]])
            .build()
            .unwrap()
    }

    #[test]
    fn vias_link_both_bridged_layers() {
        let props = cfet_props();
        let layout = build(
            vec![
                rect(3, Rect::from_xy(40, 0, 60, 200)),
                rect(20, Rect::from_xy(0, 90, 100, 110)),
                rect(10, Rect::from_xy(45, 95, 55, 105)),
                // Touches the via only along an edge.
                rect(20, Rect::from_xy(45, 105, 55, 125)),
            ],
            &props,
        );
        let via = layout.polygon(PolygonId(2));
        assert_eq!(via.layer_map(), &[PolygonId(0), PolygonId(1)]);
        assert!(layout.polygon(PolygonId(0)).layer_map().contains(&PolygonId(2)));
        assert!(layout.polygon(PolygonId(0)).adjacency().contains(&PolygonId(1)));
        assert!(layout.polygon(PolygonId(3)).layer_map().is_empty());
        assert_eq!(
            layout.connected_group(PolygonId(1)),
            [PolygonId(0), PolygonId(1), PolygonId(2)].into()
        );
    }

    #[test]
    fn planar_merge_requires_abutment() {
        let props = cfet_props();
        let layout = build(
            vec![
                rect(3, Rect::from_xy(40, 0, 60, 100)),
                rect(5, Rect::from_xy(40, 100, 60, 180)),
                rect(5, Rect::from_xy(100, 50, 120, 150)),
            ],
            &props,
        );
        let a = layout.polygon(PolygonId(0));
        let b = layout.polygon(PolygonId(1));
        assert_eq!(a.planar_partner(), Some(PolygonId(1)));
        assert_eq!(b.planar_partner(), Some(PolygonId(0)));
        assert_eq!(b.planar_union(), Some(Rect::from_xy(40, 0, 60, 180)));
        assert_eq!(layout.polygon(PolygonId(2)).planar_partner(), None);
    }

    #[test]
    fn labels_propagate_through_groups() {
        let props = cfet_props();
        let layout = build(
            vec![
                rect(3, Rect::from_xy(40, 0, 60, 200)),
                rect(20, Rect::from_xy(0, 90, 100, 110)),
                rect(10, Rect::from_xy(45, 95, 55, 105)),
                label(20, Point::new(10, 100), "vss"),
            ],
            &props,
        );
        assert!(layout.polygon(PolygonId(1)).texts().contains(&TextId(0)));
        assert!(layout.polygon(PolygonId(0)).texts().is_empty());
        assert_eq!(layout.group_supplies(PolygonId(0)), [Supply::Vss].into());
    }

    #[test]
    fn device_pairs_and_dummy_islands() {
        let props = cfet_props();
        let mut layout = build(
            vec![
                rect(3, Rect::from_xy(40, 0, 60, 200)),
                rect(4, Rect::from_xy(40, 0, 60, 200)),
                rect(3, Rect::from_xy(140, 0, 160, 200)),
                rect(10, Rect::from_xy(145, 95, 155, 105)),
                rect(10, Rect::from_xy(45, 95, 55, 105)),
            ],
            &props,
        );
        layout.pair_devices(&props);
        assert_eq!(layout.polygon(PolygonId(0)).connected_interconnect(), Some(PolygonId(1)));
        assert_eq!(layout.polygon(PolygonId(1)).twin(), Some(PolygonId(0)));
        assert_eq!(layout.polygon(PolygonId(2)).twin(), None);

        let islands = layout.tag_dummy_islands(&props);
        assert_eq!(
            islands,
            vec![DummyIsland {
                via: PolygonId(3),
                device: PolygonId(2),
            }]
        );
        assert!(layout.polygon(PolygonId(3)).is_dummy());
        assert!(layout.polygon(PolygonId(2)).is_dummy());
        assert!(!layout.polygon(PolygonId(4)).is_dummy());
    }
}
