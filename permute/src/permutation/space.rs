//! The search space: routing tracks, permutable metal, clashes, and restrictions.

use std::collections::BTreeSet;

use bitvec::prelude::*;
use cellgeom::{Dir, Rect, Span};
use itertools::Itertools;

use crate::layout::{Layout, Placement, PolygonId, SubCell, SubCells};
use crate::log::{debug, warn};
use crate::tech::{LayerProperties, LayerRole, Technology};

/// Which half of a zone a device sits in.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
enum Half {
    Lower,
    Upper,
}

/// The legal moves of every permutable polygon.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct SearchSpace {
    tracks: Vec<i64>,
    metals: Vec<PolygonId>,
    clash: Vec<BTreeSet<usize>>,
    /// One bit per track; a set bit forbids the track.
    restrictions: Vec<BitVec>,
}

impl SearchSpace {
    pub fn build(
        layout: &Layout,
        props: &LayerProperties,
        bounds: Rect,
        subcells: Option<&SubCells>,
    ) -> Self {
        let tracks = collect_tracks(layout, props);
        let metals = collect_metals(layout, props, &tracks);
        let clash = build_clash(layout, props, &metals);
        let restrictions = metals
            .iter()
            .map(|id| restrict(layout, props, &tracks, *id, bounds, subcells))
            .collect::<Vec<_>>();

        debug!(
            "{}: {} permutable polygons over {} tracks",
            layout.name(),
            metals.len(),
            tracks.len()
        );
        Self {
            tracks,
            metals,
            clash,
            restrictions,
        }
    }

    /// Track y-centers in ascending order.
    #[inline]
    pub fn tracks(&self) -> &[i64] {
        &self.tracks
    }

    /// Permutable polygons, indexed by metal number.
    #[inline]
    pub fn metals(&self) -> &[PolygonId] {
        &self.metals
    }

    #[inline]
    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    #[inline]
    pub fn num_metals(&self) -> usize {
        self.metals.len()
    }

    /// Metals that may never share a track with `metal`.
    pub fn clash(&self, metal: usize) -> &BTreeSet<usize> {
        &self.clash[metal]
    }

    pub fn is_restricted(&self, metal: usize, track: usize) -> bool {
        self.restrictions[metal]
            .get(track)
            .map(|b| *b)
            .unwrap_or(true)
    }

    /// Whether `metal` may go on `track` given the tracks of every lower metal.
    pub fn can_place(&self, metal: usize, track: usize, assigned: &[usize]) -> bool {
        !self.is_restricted(metal, track)
            && self.clash[metal]
                .iter()
                .take_while(|j| **j < assigned.len())
                .all(|j| assigned[*j] != track)
    }
}

fn collect_tracks(layout: &Layout, props: &LayerProperties) -> Vec<i64> {
    let guides = layout
        .primary_with_role(LayerRole::TrackGuide)
        .map(|p| p.rect().center().y)
        .collect::<Vec<_>>();
    let centers = if guides.is_empty() {
        warn!(
            "{}: no track guides, using permutable metal centers as tracks",
            layout.name()
        );
        props
            .perm_layers
            .iter()
            .flat_map(|num| layout.primary_on(*num))
            .map(|p| p.rect().center().y)
            .collect()
    } else {
        guides
    };
    centers.into_iter().sorted().dedup().collect()
}

fn collect_metals(layout: &Layout, props: &LayerProperties, tracks: &[i64]) -> Vec<PolygonId> {
    let mut metals = Vec::new();
    for num in props.perm_layers.iter() {
        for p in layout.primary_on(*num) {
            if !props.backside_power_rail && layout.supply(p.id()).is_some() {
                continue;
            }
            let y = p.rect().center().y;
            if tracks.binary_search(&y).is_err() {
                warn!("{}: {} is not centered on any track", layout.name(), p.id());
            }
            metals.push(p.id());
        }
    }
    metals
}

fn build_clash(layout: &Layout, props: &LayerProperties, metals: &[PolygonId]) -> Vec<BTreeSet<usize>> {
    let spacing = props.rules.metal_end_spacing;
    let mut clash = vec![BTreeSet::new(); metals.len()];
    for ((i, a), (j, b)) in metals.iter().enumerate().tuple_combinations() {
        let (pa, pb) = (layout.polygon(*a), layout.polygon(*b));
        if pa.layer() != pb.layer() {
            continue;
        }
        if pa.rect().gap(&pb.rect(), Dir::Horiz) < spacing {
            clash[i].insert(j);
            clash[j].insert(i);
        }
    }
    clash
}

/// Classifies a device's vertical extent against a zone's midline.
fn half_of(span: Span, zone: Span) -> Option<Half> {
    let mid = zone.center();
    if span.stop() <= mid {
        Some(Half::Lower)
    } else if span.start() >= mid {
        Some(Half::Upper)
    } else {
        None
    }
}

fn restrict(
    layout: &Layout,
    props: &LayerProperties,
    tracks: &[i64],
    id: PolygonId,
    bounds: Rect,
    subcells: Option<&SubCells>,
) -> BitVec {
    let mut bits = bitvec![0; tracks.len()];
    let metal = layout.polygon(id);

    if let Some(cells) = subcells {
        let mid = cells.midline();
        match cells.classify(metal.rect()) {
            Placement::Within(SubCell::Bottom) => {
                for (t, y) in tracks.iter().enumerate() {
                    if *y > mid {
                        bits.set(t, true);
                    }
                }
            }
            Placement::Within(SubCell::Top) => {
                for (t, y) in tracks.iter().enumerate() {
                    if *y < mid {
                        bits.set(t, true);
                    }
                }
            }
            Placement::Spans => {}
        }
    }

    if matches!(
        props.technology,
        Technology::Gaa | Technology::GaaDoubleHeight | Technology::FinFet
    ) {
        if let Some((zone, half)) = device_zone(layout, props, id, bounds, subcells) {
            let mid = zone.center();
            for (t, y) in tracks.iter().enumerate() {
                let inside = zone.contains_point(*y)
                    && match half {
                        Half::Lower => *y <= mid,
                        Half::Upper => *y >= mid,
                    };
                if !inside {
                    bits.set(t, true);
                }
            }
        }
    }
    bits
}

/// The zone and half shared by every device a metal drives through its vias.
///
/// `None` when the metal reaches no device, when every device is planar
/// merged, or when the devices disagree.
fn device_zone(
    layout: &Layout,
    props: &LayerProperties,
    id: PolygonId,
    bounds: Rect,
    subcells: Option<&SubCells>,
) -> Option<(Span, Half)> {
    let devices = layout
        .polygon(id)
        .layer_map()
        .iter()
        .map(|v| layout.polygon(*v))
        .filter(|v| v.is_via())
        .flat_map(|v| v.layer_map().iter().copied())
        .filter(|d| *d != id)
        .map(|d| layout.polygon(d))
        .filter(|d| !d.is_via() && props.role(d.layer()).is_device())
        .collect::<Vec<_>>();
    if devices.is_empty() || devices.iter().all(|d| d.planar_partner().is_some()) {
        return None;
    }

    let mut shared = None;
    for d in devices {
        let span = d.rect().vspan();
        let zone = match subcells {
            Some(cells) => match cells.classify(d.rect()) {
                Placement::Within(cell) => cells.span(cell),
                Placement::Spans => return None,
            },
            None => bounds.vspan(),
        };
        let key = (zone, half_of(span, zone)?);
        match shared {
            None => shared = Some(key),
            Some(prev) if prev != key => return None,
            _ => {}
        }
    }
    shared
}
