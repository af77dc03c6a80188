//! Technology constants and the layer map.
//!
//! A layer map is a JSON file describing every layer of a standard-cell
//! technology together with the design-rule constants of that technology.
//! Lengths in the file are expressed in user units and are scaled into
//! integer database units once, at load time.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};

use arcstr::ArcStr;
use cellgeom::Dir;
use derive_builder::Builder;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{with_err_context, ErrorContext, ErrorSource, Result};

/// A GDS layer number.
pub type LayerNum = i16;

/// The device technology a layout is drawn in.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Technology {
    #[serde(rename = "CFET", alias = "cfet")]
    Cfet,
    #[default]
    #[serde(rename = "GAA", alias = "gaa")]
    Gaa,
    #[serde(
        rename = "GAADoubleHeight",
        alias = "GAA_DH",
        alias = "gaa_double_height"
    )]
    GaaDoubleHeight,
    #[serde(rename = "FINFET", alias = "FinFET", alias = "finfet")]
    FinFet,
}

impl Display for Technology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cfet => write!(f, "CFET"),
            Self::Gaa => write!(f, "GAA"),
            Self::GaaDoubleHeight => write!(f, "GAA double-height"),
            Self::FinFet => write!(f, "FinFET"),
        }
    }
}

/// What a layer is used for.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerRole {
    /// Nanosheets or fins: the active device region.
    #[serde(alias = "fin", alias = "diffusion")]
    NanoSheet,
    Gate,
    /// Source/drain contacts.
    Interconnect,
    /// Routing metal.
    Metal,
    Via,
    /// Guide shapes whose centerlines define the routing tracks.
    #[serde(alias = "track")]
    TrackGuide,
    /// The cell outline.
    Boundary,
    #[default]
    Other,
}

impl LayerRole {
    /// Guesses a role from a conventional layer name.
    pub fn infer(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        let starts = |prefixes: &[&str]| prefixes.iter().any(|p| lower.starts_with(p));
        if lower.contains("via") {
            Self::Via
        } else if starts(&["nanosheet", "fin", "diff", "active"]) {
            Self::NanoSheet
        } else if starts(&["gate", "poly"]) {
            Self::Gate
        } else if starts(&["interconnect", "contact"]) {
            Self::Interconnect
        } else if starts(&["track"]) {
            Self::TrackGuide
        } else if starts(&["boundary", "outline", "prbound"]) {
            Self::Boundary
        } else if lower.len() > 1
            && lower.starts_with('m')
            && lower[1..].chars().all(|c| c.is_ascii_digit())
        {
            Self::Metal
        } else {
            Self::Other
        }
    }

    /// Device layers are re-optimized when the metal above them moves.
    pub fn is_device(&self) -> bool {
        matches!(self, Self::Gate | Self::Interconnect)
    }
}

/// Technology attributes of a single layer.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct LayerInfo {
    pub name: ArcStr,
    pub role: LayerRole,
    /// Required width across the routing direction, if fixed.
    pub width: Option<i64>,
    /// Minimum centerline pitch between parallel shapes, if any.
    pub pitch: Option<i64>,
    pub direction: Dir,
    /// The two layers bridged by a via layer.
    pub connector: Option<[LayerNum; 2]>,
    /// The layer whose shapes may be merged end-to-end with this layer's shapes.
    pub planar_connections: Option<LayerNum>,
    /// A layer this layer's shapes may never overlap.
    pub hinder: Option<LayerNum>,
}

impl LayerInfo {
    pub fn new(name: impl Into<ArcStr>, role: LayerRole, direction: Dir) -> Self {
        Self {
            name: name.into(),
            role,
            width: None,
            pitch: None,
            direction,
            connector: None,
            planar_connections: None,
            hinder: None,
        }
    }

    pub fn with_width(mut self, width: i64) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_pitch(mut self, pitch: i64) -> Self {
        self.pitch = Some(pitch);
        self
    }

    pub fn with_connector(mut self, a: LayerNum, b: LayerNum) -> Self {
        self.connector = Some([a, b]);
        self
    }

    pub fn with_planar_connection(mut self, layer: LayerNum) -> Self {
        self.planar_connections = Some(layer);
        self
    }

    pub fn with_hinder(mut self, layer: LayerNum) -> Self {
        self.hinder = Some(layer);
        self
    }
}

/// Design-rule constants, in database units.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default)]
pub struct Rules {
    /// Minimum centerline pitch of permutable metal.
    pub metal_pitch: i64,
    /// Minimum end-to-end spacing of metal shapes on one track.
    pub metal_end_spacing: i64,
    /// Width of the power and ground rails.
    pub power_rail_width: i64,
    /// Minimum gate overhang past a nanosheet.
    pub gate_extension: i64,
    /// Minimum interconnect overhang past a nanosheet.
    pub interconnect_extension: i64,
    /// Minimum metal overhang past an interconnect it crosses.
    pub m0_extension: i64,
    /// Minimum device overhang past a via landing on it.
    pub via_extension: i64,
    /// Minimum edge-to-edge gap between gates and interconnects.
    pub gate_interconnect_gap: i64,
    /// Minimum vertical gap between nanosheets.
    pub nanosheet_gap: i64,
    pub via_size: i64,
}

impl Rules {
    #[inline]
    pub fn builder() -> RulesBuilder {
        RulesBuilder::default()
    }
}

/// A technology constant that calibration may overwrite.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Calibrated {
    LayerWidth(LayerNum),
    LayerPitch(LayerNum),
    MetalEndSpacing,
    GateExtension,
    InterconnectExtension,
    M0Extension,
    ViaExtension,
    GateInterconnectGap,
    NanosheetGap,
}

/// A corrected value for a technology constant, suggested by a failed check.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Correction {
    pub field: Calibrated,
    pub value: i64,
}

impl Display for Correction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} -> {}", self.field, self.value)
    }
}

/// All technology constants of one base layout.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default)]
pub struct LayerProperties {
    pub technology: Technology,
    #[builder(setter(custom))]
    pub layers: BTreeMap<LayerNum, LayerInfo>,
    pub perm_layers: Vec<LayerNum>,
    pub step_size: i64,
    pub flipped: bool,
    pub backside_power_rail: bool,
    pub double_height: bool,
    /// Pairs of gate or interconnect layers split across device tiers.
    pub device_pairs: Vec<[LayerNum; 2]>,
    pub rules: Rules,
}

impl Default for LayerProperties {
    fn default() -> Self {
        Self {
            technology: Technology::default(),
            layers: BTreeMap::new(),
            perm_layers: Vec::new(),
            step_size: 1,
            flipped: false,
            backside_power_rail: false,
            double_height: false,
            device_pairs: Vec::new(),
            rules: Rules::default(),
        }
    }
}

impl LayerPropertiesBuilder {
    /// Adds a layer to the layer table.
    pub fn layer(&mut self, num: LayerNum, info: LayerInfo) -> &mut Self {
        self.layers
            .get_or_insert_with(BTreeMap::new)
            .insert(num, info);
        self
    }
}

impl LayerProperties {
    #[inline]
    pub fn builder() -> LayerPropertiesBuilder {
        LayerPropertiesBuilder::default()
    }

    /// Parses and scales a layer map.
    pub fn from_json(s: &str) -> Result<Self> {
        let raw: RawLayerMap = serde_json::from_str(s)?;
        let props = raw.into_properties()?;
        props.validate()?;
        Ok(props)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ctx = || ErrorContext::LoadLayerMap(path.to_path_buf());
        let data = with_err_context(std::fs::read_to_string(path), ctx)?;
        with_err_context(Self::from_json(&data), ctx)
    }

    pub fn layer(&self, num: LayerNum) -> Result<&LayerInfo> {
        self.layers
            .get(&num)
            .ok_or_else(|| ErrorSource::LayerNotFound(num).into())
    }

    #[inline]
    pub fn try_layer(&self, num: LayerNum) -> Option<&LayerInfo> {
        self.layers.get(&num)
    }

    pub fn layers_with_role(&self, role: LayerRole) -> impl Iterator<Item = LayerNum> + '_ {
        self.layers
            .iter()
            .filter(move |(_, info)| info.role == role)
            .map(|(num, _)| *num)
    }

    pub fn first_layer(&self, role: LayerRole) -> Option<LayerNum> {
        self.layers_with_role(role).next()
    }

    pub fn role(&self, num: LayerNum) -> LayerRole {
        self.try_layer(num).map(|l| l.role).unwrap_or_default()
    }

    #[inline]
    pub fn is_permutable(&self, num: LayerNum) -> bool {
        self.perm_layers.contains(&num)
    }

    /// The other half of a gate or interconnect layer split, if any.
    pub fn device_partner(&self, num: LayerNum) -> Option<LayerNum> {
        self.device_pairs.iter().find_map(|[a, b]| {
            if *a == num {
                Some(*b)
            } else if *b == num {
                Some(*a)
            } else {
                None
            }
        })
    }

    /// The current value of a calibratable constant.
    pub fn constant(&self, field: Calibrated) -> Option<i64> {
        let r = &self.rules;
        match field {
            Calibrated::LayerWidth(num) => self.try_layer(num)?.width,
            Calibrated::LayerPitch(num) => self.try_layer(num)?.pitch,
            Calibrated::MetalEndSpacing => Some(r.metal_end_spacing),
            Calibrated::GateExtension => Some(r.gate_extension),
            Calibrated::InterconnectExtension => Some(r.interconnect_extension),
            Calibrated::M0Extension => Some(r.m0_extension),
            Calibrated::ViaExtension => Some(r.via_extension),
            Calibrated::GateInterconnectGap => Some(r.gate_interconnect_gap),
            Calibrated::NanosheetGap => Some(r.nanosheet_gap),
        }
    }

    /// Overwrites a constant with a calibrated value.
    pub fn apply(&mut self, correction: &Correction) {
        let value = correction.value;
        match correction.field {
            Calibrated::LayerWidth(num) => {
                if let Some(info) = self.layers.get_mut(&num) {
                    info.width = Some(value);
                }
            }
            Calibrated::LayerPitch(num) => {
                if let Some(info) = self.layers.get_mut(&num) {
                    info.pitch = Some(value);
                }
            }
            Calibrated::MetalEndSpacing => self.rules.metal_end_spacing = value,
            Calibrated::GateExtension => self.rules.gate_extension = value,
            Calibrated::InterconnectExtension => self.rules.interconnect_extension = value,
            Calibrated::M0Extension => self.rules.m0_extension = value,
            Calibrated::ViaExtension => self.rules.via_extension = value,
            Calibrated::GateInterconnectGap => self.rules.gate_interconnect_gap = value,
            Calibrated::NanosheetGap => self.rules.nanosheet_gap = value,
        }
    }

    /// Checks that every layer referenced by another entry exists.
    pub fn validate(&self) -> Result<()> {
        let known = |num: &LayerNum, what: &str| -> Result<()> {
            if self.layers.contains_key(num) {
                Ok(())
            } else {
                Err(ErrorSource::InvalidLayerMap(format!("{what} refers to unknown layer {num}")).into())
            }
        };
        for num in self.perm_layers.iter() {
            known(num, "permLayers")?;
        }
        for pair in self.device_pairs.iter() {
            for num in pair {
                known(num, "devicePairs")?;
            }
        }
        for (num, info) in self.layers.iter() {
            if let Some(conn) = info.connector {
                for other in conn.iter() {
                    known(other, &format!("connector of layer {num}"))?;
                }
            }
            if let Some(other) = info.planar_connections {
                known(&other, &format!("planarConnections of layer {num}"))?;
            }
            if let Some(other) = info.hinder {
                known(&other, &format!("hinder of layer {num}"))?;
            }
        }
        if self.step_size <= 0 {
            return Err(ErrorSource::InvalidLayerMap("stepSize must be positive".into()).into());
        }
        Ok(())
    }
}

lazy_static! {
    static ref PERMUTATION_SUFFIX: Regex =
        Regex::new(r"(_\d+)+$").expect("failed to compile permutation suffix regex");
}

/// The name of the base layout a GDS file was derived from.
///
/// Strips the extension and every trailing `_<digits>` permutation suffix.
pub fn base_layout_name(gds_path: impl AsRef<Path>) -> String {
    let stem = gds_path
        .as_ref()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    PERMUTATION_SUFFIX.replace(&stem, "").into_owned()
}

/// Finds the layer map for a GDS file.
///
/// Looks for `<dir>/<base>.json`, then for the shared `<dir>/layermap.json`.
pub fn resolve_layer_map(dir: impl AsRef<Path>, gds_path: impl AsRef<Path>) -> Result<PathBuf> {
    let dir = dir.as_ref();
    let base = base_layout_name(gds_path.as_ref());
    let candidates = [dir.join(format!("{base}.json")), dir.join("layermap.json")];
    candidates
        .into_iter()
        .find(|p| p.is_file())
        .ok_or_else(|| ErrorSource::LayerMapNotFound(dir.join(format!("{base}.json"))).into())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLayerMap {
    #[serde(default)]
    technology: Technology,
    #[serde(default = "unit_scale")]
    scale: f64,
    #[serde(default)]
    perm_layers: Vec<LayerNum>,
    #[serde(default)]
    step_size: Option<f64>,
    #[serde(default)]
    flipped: bool,
    #[serde(default)]
    backside_power_rail: bool,
    #[serde(default)]
    double_height: bool,
    #[serde(default)]
    device_pairs: Vec<[LayerNum; 2]>,
    #[serde(default)]
    rules: RawRules,
    layers: BTreeMap<String, RawLayerInfo>,
}

fn unit_scale() -> f64 {
    1.0
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawRules {
    metal_pitch: f64,
    metal_end_spacing: f64,
    power_rail_width: f64,
    gate_extension: f64,
    interconnect_extension: f64,
    m0_extension: f64,
    via_extension: f64,
    gate_interconnect_gap: f64,
    nanosheet_gap: f64,
    via_size: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLayerInfo {
    #[serde(rename = "Name", alias = "name")]
    name: String,
    #[serde(default)]
    role: Option<LayerRole>,
    #[serde(default)]
    width: Option<f64>,
    #[serde(default)]
    pitch: Option<f64>,
    #[serde(default)]
    direction: Dir,
    #[serde(default)]
    connector: Option<[LayerNum; 2]>,
    #[serde(default)]
    planar_connections: Option<LayerNum>,
    #[serde(default)]
    hinder: Option<LayerNum>,
}

fn to_dbu(value: f64, scale: f64) -> i64 {
    (value * scale).round() as i64
}

impl RawLayerMap {
    fn into_properties(self) -> Result<LayerProperties> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(ErrorSource::InvalidLayerMap(format!("invalid scale {}", self.scale)).into());
        }
        let s = self.scale;
        let mut layers = BTreeMap::new();
        for (key, raw) in self.layers {
            let num: LayerNum = key.trim().parse().map_err(|_| {
                ErrorSource::InvalidLayerMap(format!("layer key {key:?} is not a layer number"))
            })?;
            let role = raw.role.unwrap_or_else(|| LayerRole::infer(&raw.name));
            layers.insert(
                num,
                LayerInfo {
                    name: ArcStr::from(raw.name),
                    role,
                    width: raw.width.map(|w| to_dbu(w, s)),
                    pitch: raw.pitch.map(|p| to_dbu(p, s)),
                    direction: raw.direction,
                    connector: raw.connector,
                    planar_connections: raw.planar_connections,
                    hinder: raw.hinder,
                },
            );
        }
        let r = self.rules;
        Ok(LayerProperties {
            technology: self.technology,
            layers,
            perm_layers: self.perm_layers,
            step_size: self.step_size.map(|v| to_dbu(v, s)).unwrap_or(1),
            flipped: self.flipped,
            backside_power_rail: self.backside_power_rail,
            double_height: self.double_height
                || self.technology == Technology::GaaDoubleHeight,
            device_pairs: self.device_pairs,
            rules: Rules {
                metal_pitch: to_dbu(r.metal_pitch, s),
                metal_end_spacing: to_dbu(r.metal_end_spacing, s),
                power_rail_width: to_dbu(r.power_rail_width, s),
                gate_extension: to_dbu(r.gate_extension, s),
                interconnect_extension: to_dbu(r.interconnect_extension, s),
                m0_extension: to_dbu(r.m0_extension, s),
                via_extension: to_dbu(r.via_extension, s),
                gate_interconnect_gap: to_dbu(r.gate_interconnect_gap, s),
                nanosheet_gap: to_dbu(r.nanosheet_gap, s),
                via_size: to_dbu(r.via_size, s),
            },
        })
    }
}
