#![allow(dead_code)]

use cellgeom::{Dir, Quad, Rect};
use permute::gds::{GdsBoundary, GdsElement, GdsLibrary, GdsStructure, GdsText};
use permute::tech::{LayerInfo, LayerNum, LayerProperties, LayerRole, Rules};

pub const M0: LayerNum = 20;
pub const TRACK: LayerNum = 50;
pub const BOUNDARY: LayerNum = 100;

/// A layer map matching [`m0_props`].
pub const M0_LAYER_MAP: &str = r#"{
    "technology": "GAA",
    "permLayers": [20],
    "rules": {"metalEndSpacing": 10},
    "layers": {
        "20": {"Name": "M0", "width": 20, "direction": "horizontal"},
        "50": {"Name": "TrackGuide"},
        "100": {"Name": "Boundary"}
    }
}"#;

pub fn rect(layer: LayerNum, x0: i64, y0: i64, x1: i64, y1: i64) -> GdsElement {
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

pub fn label(layer: LayerNum, x: i64, y: i64, text: &str) -> GdsElement {
    GdsElement::Text(GdsText {
        layer,
        datatype: 0,
        xy: vec![[x, y]],
        text: text.to_string(),
        presentation: None,
    })
}

pub fn library(name: &str, elements: Vec<GdsElement>) -> GdsLibrary {
    GdsLibrary {
        version: Default::default(),
        timestamp: Default::default(),
        name: "LIB".to_string(),
        units: [0.001, 1e-9],
        structures: vec![GdsStructure {
            name: name.to_string(),
            timestamp: Default::default(),
            elements,
        }],
        base_layout_name: None,
    }
}

/// Permutable horizontal M0 of width 20 over track guides.
pub fn m0_props() -> LayerProperties {
    LayerProperties::builder()
        .layer(M0, LayerInfo::new("M0", LayerRole::Metal, Dir::Horiz).with_width(20))
        .layer(TRACK, LayerInfo::new("TrackGuide", LayerRole::TrackGuide, Dir::Horiz))
        .layer(BOUNDARY, LayerInfo::new("Boundary", LayerRole::Boundary, Dir::Horiz))
        .perm_layers(vec![M0])
        .rules(Rules::builder().metal_end_spacing(10).build().unwrap())
        .build()
        .unwrap()
}

/// Two overlapping M0 shapes on two tracks inside a 200 x 300 outline.
pub fn two_track_cell() -> GdsLibrary {
    library(
        "INVx1",
        vec![
            rect(BOUNDARY, 0, 0, 200, 300),
            rect(TRACK, 0, 99, 200, 101),
            rect(TRACK, 0, 199, 200, 201),
            rect(M0, 0, 90, 100, 110),
            rect(M0, 50, 190, 150, 210),
        ],
    )
}

/// Two rows split at y = 200, one M0 shape per row, two tracks per row.
pub fn double_height_cell() -> (GdsLibrary, LayerProperties) {
    let mut props = m0_props();
    props.double_height = true;
    let lib = library(
        "DFFx1",
        vec![
            rect(BOUNDARY, 0, 0, 200, 400),
            rect(TRACK, 0, 0, 200, 2),
            rect(TRACK, 0, 99, 200, 101),
            rect(TRACK, 0, 149, 200, 151),
            rect(TRACK, 0, 249, 200, 251),
            rect(TRACK, 0, 299, 200, 301),
            rect(TRACK, 0, 398, 200, 400),
            rect(M0, 0, 90, 100, 110),
            rect(M0, 100, 290, 200, 310),
        ],
    );
    (lib, props)
}
