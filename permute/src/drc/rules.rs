//! The predicate library.
//!
//! Every predicate looks only at primary polygons. Predicates that fail
//! because a technology constant is too strict for the drawn geometry also
//! suggest the constant value the geometry actually meets.

use cellgeom::{Dir, Rect, Span};
use itertools::Itertools;

use super::{CheckResult, Extension};
use crate::layout::{Layout, Placement, Polygon, SubCells, Supply};
use crate::log::debug;
use crate::tech::{Calibrated, LayerNum, LayerProperties, LayerRole};

fn primaries(layout: &Layout, layer: LayerNum) -> Vec<&Polygon> {
    layout.primary_on(layer).collect()
}

fn min_into(acc: &mut Option<i64>, value: i64) {
    *acc = Some(acc.map_or(value, |a| a.min(value)));
}

/// Whether two shapes are checked against each other.
///
/// In a double-height cell, shapes confined to different rows are never
/// compared. A shape crossing the midline belongs to both rows.
fn same_row(rows: Option<&SubCells>, a: Rect, b: Rect) -> bool {
    let Some(rows) = rows else {
        return true;
    };
    match (rows.classify(a), rows.classify(b)) {
        (Placement::Within(x), Placement::Within(y)) => x == y,
        _ => true,
    }
}

/// Every polygon on a fixed-width layer is exactly as wide as declared.
///
/// Polygons labeled with a supply may instead match the power-rail width.
pub fn check_width(layout: &Layout, props: &LayerProperties, layer: LayerNum) -> CheckResult {
    let Some(info) = props.try_layer(layer) else {
        return CheckResult::pass();
    };
    let Some(width) = info.width else {
        return CheckResult::pass();
    };
    let rail = props.rules.power_rail_width;
    for p in layout.primary_on(layer) {
        let extent = p.rect().length(!info.direction);
        if extent == width || (rail > 0 && extent == rail && layout.supply(p.id()).is_some()) {
            continue;
        }
        debug!(
            "{} on layer {layer} is {extent} wide, expected {width}",
            p.id()
        );
        return CheckResult::fail_with(Calibrated::LayerWidth(layer), extent);
    }
    CheckResult::pass()
}

/// Polygons on a layer never overlap, and parallel runs keep their pitch.
pub fn check_pitch(layout: &Layout, props: &LayerProperties, layer: LayerNum) -> CheckResult {
    let Some(info) = props.try_layer(layer) else {
        return CheckResult::pass();
    };
    let Some(pitch) = info.pitch else {
        return CheckResult::pass();
    };
    let dir = info.direction;
    let mut worst = None;
    for (a, b) in primaries(layout, layer).into_iter().tuple_combinations() {
        let (ra, rb) = (a.rect(), b.rect());
        if ra.overlaps(&rb) {
            debug!("{} and {} overlap on layer {layer}", a.id(), b.id());
            return CheckResult::fail();
        }
        if !ra.span(dir).overlaps(&rb.span(dir)) {
            continue;
        }
        let dist = (ra.span(!dir).center() - rb.span(!dir).center()).abs();
        if dist < pitch {
            min_into(&mut worst, dist);
        }
    }
    match worst {
        Some(dist) => CheckResult::fail_with(Calibrated::LayerPitch(layer), dist),
        None => CheckResult::pass(),
    }
}

/// Shapes sharing a track keep the minimum end-to-end spacing.
pub fn check_end_spacing(
    layout: &Layout,
    props: &LayerProperties,
    layer: LayerNum,
    rows: Option<&SubCells>,
) -> CheckResult {
    let Some(info) = props.try_layer(layer) else {
        return CheckResult::pass();
    };
    let dir = info.direction;
    let min = props.rules.metal_end_spacing;
    let mut worst = None;
    for (a, b) in primaries(layout, layer).into_iter().tuple_combinations() {
        let (ra, rb) = (a.rect(), b.rect());
        if !ra.span(!dir).overlaps(&rb.span(!dir)) || !same_row(rows, ra, rb) {
            continue;
        }
        let gap = ra.gap(&rb, dir);
        if gap < 0 {
            debug!("{} and {} overlap on layer {layer}", a.id(), b.id());
            return CheckResult::fail();
        }
        if gap < min {
            min_into(&mut worst, gap);
        }
    }
    match worst {
        Some(gap) => CheckResult::fail_with(Calibrated::MetalEndSpacing, gap),
        None => CheckResult::pass(),
    }
}

/// Facing shapes on two layers keep a minimum edge-to-edge gap along `dir`.
pub fn check_gap(
    layout: &Layout,
    props: &LayerProperties,
    a: LayerNum,
    b: LayerNum,
    dir: Dir,
    field: Calibrated,
    rows: Option<&SubCells>,
) -> CheckResult {
    let min = props.constant(field).unwrap_or(0);
    let mut worst = None;
    for p in layout.primary_on(a) {
        for q in layout.primary_on(b) {
            if p.id() == q.id() {
                continue;
            }
            let (rp, rq) = (p.rect(), q.rect());
            if !rp.span(!dir).overlaps(&rq.span(!dir)) || !same_row(rows, rp, rq) {
                continue;
            }
            let gap = rp.gap(&rq, dir);
            if gap < 0 {
                debug!("{} and {} overlap", p.id(), q.id());
                return CheckResult::fail();
            }
            if gap < min {
                min_into(&mut worst, gap);
            }
        }
    }
    match worst {
        Some(gap) => CheckResult::fail_with(field, gap),
        None => CheckResult::pass(),
    }
}

/// Shapes on `ext.outer` overhang the `ext.inner` shapes they cover.
///
/// With a window, only inner shapes centered in it are checked, and vertical
/// overhang is measured within the window.
pub fn check_extension(
    layout: &Layout,
    props: &LayerProperties,
    ext: &Extension,
    window: Option<Span>,
) -> CheckResult {
    let min = props.constant(ext.field).unwrap_or(0);
    let mut worst = None;
    for inner in layout.primary_on(ext.inner) {
        let ri = inner.rect();
        if let Some(w) = window {
            if !w.contains_point(ri.center().y) {
                continue;
            }
        }
        for outer in layout.primary_on(ext.outer) {
            let ro = outer.rect();
            if outer.id() == inner.id() || !ro.overlaps(&ri) {
                continue;
            }
            if ext.linked && !outer.adjacency().contains(&inner.id()) {
                continue;
            }
            let mut os = ro.span(ext.dir);
            if let (Some(w), Dir::Vert) = (window, ext.dir) {
                os = os.intersection(w).unwrap_or(os);
            }
            let is = ri.span(ext.dir);
            let overhang = (is.start() - os.start()).min(os.stop() - is.stop());
            if overhang < min {
                min_into(&mut worst, overhang);
            }
        }
    }
    match worst {
        Some(o) => CheckResult::fail_with(ext.field, o.max(0)),
        None => CheckResult::pass(),
    }
}

/// Every via's centroid lies inside both layers it bridges.
pub fn check_via_enclosure(layout: &Layout, props: &LayerProperties, via_layer: LayerNum) -> CheckResult {
    let Some(bridged) = props.try_layer(via_layer).and_then(|l| l.connector) else {
        return CheckResult::pass();
    };
    for via in layout.primary_on(via_layer) {
        let c = via.rect().center();
        for num in bridged {
            if !layout.primary_on(num).any(|p| p.rect().contains_point(c)) {
                debug!("{} is not enclosed by layer {num}", via.id());
                return CheckResult::fail();
            }
        }
    }
    CheckResult::pass()
}

/// Every link in the connectivity graph is still a geometric contact.
pub fn check_connectivity(layout: &Layout) -> CheckResult {
    for p in layout.polygons().filter(|p| p.is_primary()) {
        for other in p.layer_map() {
            if !p.rect().intersects(&layout.polygon(*other).rect()) {
                debug!("{} lost contact with {other}", p.id());
                return CheckResult::fail();
            }
        }
    }
    CheckResult::pass()
}

/// A via touches no polygon of a bridged layer it is not linked to.
pub fn check_via_isolation(layout: &Layout, props: &LayerProperties, via_layer: LayerNum) -> CheckResult {
    let Some(bridged) = props.try_layer(via_layer).and_then(|l| l.connector) else {
        return CheckResult::pass();
    };
    for via in layout.primary_on(via_layer) {
        let rect = via.rect();
        for num in bridged {
            let stray = layout
                .primary_on(num)
                .find(|p| p.rect().overlaps(&rect) && !via.layer_map().contains(&p.id()));
            if let Some(p) = stray {
                debug!("{} shorts to unlinked {}", via.id(), p.id());
                return CheckResult::fail();
            }
        }
    }
    CheckResult::pass()
}

/// Shapes on a layer never overlap shapes on its hinder layer.
pub fn check_hinder(layout: &Layout, props: &LayerProperties, layer: LayerNum) -> CheckResult {
    let Some(hinder) = props.try_layer(layer).and_then(|l| l.hinder) else {
        return CheckResult::pass();
    };
    for p in layout.primary_on(layer) {
        if layout
            .primary_on(hinder)
            .any(|q| q.id() != p.id() && q.rect().overlaps(&p.rect()))
        {
            debug!("{} overlaps hinder layer {hinder}", p.id());
            return CheckResult::fail();
        }
    }
    CheckResult::pass()
}

/// VDD sits above VSS in an unflipped cell and below it in a flipped one.
///
/// With a backside power rail the heights of the vias dropping to the rail
/// are compared instead of the metal itself. With a window, only metal
/// centered in it is considered.
pub fn check_vdd_vss_position(
    layout: &Layout,
    props: &LayerProperties,
    flipped: bool,
    window: Option<Span>,
) -> CheckResult {
    let mut vdd = Vec::new();
    let mut vss = Vec::new();
    for p in layout.primary_with_role(LayerRole::Metal) {
        let Some(supply) = layout.supply(p.id()) else {
            continue;
        };
        let center = p.rect().center().y;
        if let Some(w) = window {
            if !w.contains_point(center) {
                continue;
            }
        }
        let mut ys = Vec::new();
        if props.backside_power_rail {
            ys.extend(
                p.layer_map()
                    .iter()
                    .map(|id| layout.polygon(*id))
                    .filter(|v| v.is_via())
                    .map(|v| v.rect().center().y),
            );
        }
        if ys.is_empty() {
            ys.push(center);
        }
        match supply {
            Supply::Vdd => vdd.extend(ys),
            Supply::Vss => vss.extend(ys),
        }
    }

    let (Some(vdd_lo), Some(vdd_hi)) = (vdd.iter().min(), vdd.iter().max()) else {
        return CheckResult::pass();
    };
    let (Some(vss_lo), Some(vss_hi)) = (vss.iter().min(), vss.iter().max()) else {
        return CheckResult::pass();
    };
    let ok = if flipped {
        vdd_hi < vss_lo
    } else {
        vdd_lo > vss_hi
    };
    if !ok {
        debug!("supplies on the wrong side (flipped = {flipped})");
    }
    CheckResult::from_bool(ok)
}

/// Every dummy island in the current geometry has been tagged.
pub fn check_dummy_islands(layout: &Layout, props: &LayerProperties) -> CheckResult {
    for island in layout.find_dummy_islands(props) {
        if !(layout.polygon(island.via).is_dummy() && layout.polygon(island.device).is_dummy()) {
            debug!("untagged dummy island at {}", island.via);
            return CheckResult::fail();
        }
    }
    CheckResult::pass()
}

/// Stacked nanosheets keep a minimum vertical gap.
pub fn check_nanosheet_gap(
    layout: &Layout,
    props: &LayerProperties,
    layer: LayerNum,
    rows: Option<&SubCells>,
) -> CheckResult {
    let min = props.rules.nanosheet_gap;
    let mut worst = None;
    for (a, b) in primaries(layout, layer).into_iter().tuple_combinations() {
        let (ra, rb) = (a.rect(), b.rect());
        if !ra.hspan().overlaps(&rb.hspan()) || !same_row(rows, ra, rb) {
            continue;
        }
        let gap = ra.gap(&rb, Dir::Vert);
        if gap < 0 {
            debug!("nanosheets {} and {} overlap", a.id(), b.id());
            return CheckResult::fail();
        }
        if gap < min {
            min_into(&mut worst, gap);
        }
    }
    match worst {
        Some(gap) => CheckResult::fail_with(Calibrated::NanosheetGap, gap),
        None => CheckResult::pass(),
    }
}

/// Paired device twins are never tied to opposite supplies.
pub fn check_paired_power(layout: &Layout) -> CheckResult {
    for p in layout.polygons().filter(|p| p.is_primary()) {
        let Some(twin) = p.twin() else { continue };
        if twin < p.id() {
            continue;
        }
        let (a, b) = (layout.group_supplies(p.id()), layout.group_supplies(twin));
        if a.len() == 1 && b.len() == 1 && a != b {
            debug!("{} and its twin {twin} sit on opposite supplies", p.id());
            return CheckResult::fail();
        }
    }
    CheckResult::pass()
}

/// Every label on a drawn layer lands on a polygon.
pub fn check_labels(layout: &Layout) -> CheckResult {
    for t in layout.texts() {
        let drawn = layout
            .layer(t.layer())
            .map(|l| !l.polygons.is_empty())
            .unwrap_or(false);
        if drawn
            && !layout
                .polygons()
                .any(|p| p.is_primary() && p.rect().contains_point(t.point()))
        {
            debug!("label {:?} at {:?} is floating", t.text(), t.point());
            return CheckResult::fail();
        }
    }
    CheckResult::pass()
}
