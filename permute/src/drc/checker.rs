//! Technology-specific check sequences.

use cellgeom::{Dir, Rect};
use enum_dispatch::enum_dispatch;

use super::rules;
use super::{CheckResult, DrcOutcome, Extension, Rule};
use crate::layout::{Layout, SubCell, SubCells};
use crate::log::{debug, warn};
use crate::tech::{Calibrated, LayerProperties, LayerRole, Technology};

/// The rules shared by every technology, in evaluation order.
fn base_rules(props: &LayerProperties) -> Vec<Rule> {
    let mut out = Vec::new();
    let layers = || props.layers.iter().map(|(num, info)| (*num, info));

    out.extend(layers().filter(|(_, l)| l.width.is_some()).map(|(n, _)| Rule::Width(n)));
    out.extend(layers().filter(|(_, l)| l.pitch.is_some()).map(|(n, _)| Rule::Pitch(n)));
    out.extend(
        props
            .perm_layers
            .iter()
            .filter(|n| props.try_layer(**n).is_some())
            .map(|n| Rule::EndSpacing(*n)),
    );
    out.push(Rule::Connectivity);
    for (num, _) in layers().filter(|(_, l)| l.connector.is_some()) {
        out.push(Rule::ViaEnclosure(num));
        out.push(Rule::ViaIsolation(num));
    }
    out.extend(layers().filter(|(_, l)| l.hinder.is_some()).map(|(n, _)| Rule::Hinder(n)));

    let of = |role| props.layers_with_role(role).collect::<Vec<_>>();
    let (sheets, gates, contacts) = (
        of(LayerRole::NanoSheet),
        of(LayerRole::Gate),
        of(LayerRole::Interconnect),
    );
    let mut extension = |outer, inner, dir, field, linked| {
        out.push(Rule::Extension(Extension {
            outer,
            inner,
            dir,
            field,
            linked,
        }))
    };
    for &inner in sheets.iter() {
        for &outer in gates.iter() {
            extension(outer, inner, Dir::Vert, Calibrated::GateExtension, false);
        }
        for &outer in contacts.iter() {
            extension(outer, inner, Dir::Vert, Calibrated::InterconnectExtension, false);
        }
    }
    for &outer in props.perm_layers.iter() {
        if props.role(outer) != LayerRole::Metal {
            continue;
        }
        for &inner in contacts.iter() {
            extension(outer, inner, Dir::Horiz, Calibrated::M0Extension, true);
        }
    }

    for &a in gates.iter() {
        for &b in contacts.iter() {
            out.push(Rule::Gap {
                a,
                b,
                dir: Dir::Horiz,
                field: Calibrated::GateInterconnectGap,
            });
        }
    }
    out.push(Rule::VddVssPosition);
    out.push(Rule::DummyIslands);
    out
}

fn nanosheet_rules(props: &LayerProperties) -> Vec<Rule> {
    props
        .layers_with_role(LayerRole::NanoSheet)
        .map(Rule::NanosheetGap)
        .collect()
}

/// A technology's design-rule check.
#[enum_dispatch]
pub trait DesignRuleCheck {
    fn technology(&self) -> Technology;

    /// Rules appended after the shared sequence.
    fn extra_rules(&self, _props: &LayerProperties) -> Vec<Rule> {
        Vec::new()
    }

    /// The ordered rule sequence.
    fn rules(&self, props: &LayerProperties, strict: bool) -> Vec<Rule> {
        let mut rules = base_rules(props);
        rules.extend(self.extra_rules(props));
        if strict {
            rules.push(Rule::Labels);
        }
        rules
    }

    /// The rows spacing predicates are confined to, if the cell is split.
    fn rows(&self) -> Option<&SubCells> {
        None
    }

    fn check_vdd_vss_position(&self, layout: &Layout, props: &LayerProperties) -> CheckResult {
        rules::check_vdd_vss_position(layout, props, props.flipped, None)
    }

    fn check_layer_layer_extension(
        &self,
        layout: &Layout,
        props: &LayerProperties,
        ext: &Extension,
    ) -> CheckResult {
        rules::check_extension(layout, props, ext, None)
    }

    /// Evaluates a single rule against the current geometry.
    fn evaluate(&self, rule: &Rule, layout: &Layout, props: &LayerProperties) -> CheckResult {
        match *rule {
            Rule::Width(l) => rules::check_width(layout, props, l),
            Rule::Pitch(l) => rules::check_pitch(layout, props, l),
            Rule::EndSpacing(l) => rules::check_end_spacing(layout, props, l, self.rows()),
            Rule::Gap { a, b, dir, field } => {
                rules::check_gap(layout, props, a, b, dir, field, self.rows())
            }
            Rule::Extension(ref ext) => self.check_layer_layer_extension(layout, props, ext),
            Rule::ViaEnclosure(l) => rules::check_via_enclosure(layout, props, l),
            Rule::Connectivity => rules::check_connectivity(layout),
            Rule::ViaIsolation(l) => rules::check_via_isolation(layout, props, l),
            Rule::Hinder(l) => rules::check_hinder(layout, props, l),
            Rule::VddVssPosition => self.check_vdd_vss_position(layout, props),
            Rule::DummyIslands => rules::check_dummy_islands(layout, props),
            Rule::NanosheetGap(l) => rules::check_nanosheet_gap(layout, props, l, self.rows()),
            Rule::PairedPower => rules::check_paired_power(layout),
            Rule::Labels => rules::check_labels(layout),
        }
    }

    /// Runs the full sequence, stopping at the first failure.
    ///
    /// In update mode a failure that suggests a correction overwrites the
    /// offending constant in `props`. The rule is then evaluated again and
    /// must pass under the corrected constant for evaluation to continue.
    fn check_drc(
        &self,
        layout: &Layout,
        props: &mut LayerProperties,
        strict: bool,
        update: bool,
    ) -> DrcOutcome {
        let mut outcome = DrcOutcome::default();
        for rule in self.rules(props, strict) {
            let mut res = self.evaluate(&rule, layout, props);
            outcome.evaluated.push(rule);
            if !res.passed && update {
                if let Some(c) = res.suggested_correction {
                    warn!("{}: calibrating {rule}: {c}", layout.name());
                    props.apply(&c);
                    outcome.corrections.push(c);
                    res = self.evaluate(&rule, layout, props);
                }
            }
            if !res.passed {
                debug!("{}: failed {rule}", layout.name());
                outcome.passed = false;
                outcome.failed = Some(rule);
                break;
            }
        }
        outcome
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct CfetChecker;

impl DesignRuleCheck for CfetChecker {
    fn technology(&self) -> Technology {
        Technology::Cfet
    }

    fn extra_rules(&self, _props: &LayerProperties) -> Vec<Rule> {
        vec![Rule::PairedPower]
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct GaaChecker;

impl DesignRuleCheck for GaaChecker {
    fn technology(&self) -> Technology {
        Technology::Gaa
    }

    fn extra_rules(&self, props: &LayerProperties) -> Vec<Rule> {
        nanosheet_rules(props)
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct FinfetChecker;

impl DesignRuleCheck for FinfetChecker {
    fn technology(&self) -> Technology {
        Technology::FinFet
    }

    fn extra_rules(&self, props: &LayerProperties) -> Vec<Rule> {
        nanosheet_rules(props)
    }
}

/// GAA with two stacked rows; the top row is mirrored.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct GaaDoubleHeightChecker {
    pub subcells: SubCells,
}

impl GaaDoubleHeightChecker {
    /// Whether the row is drawn flipped, given the cell's orientation.
    pub fn flipped(cell: SubCell, props: &LayerProperties) -> bool {
        match cell {
            SubCell::Bottom => props.flipped,
            SubCell::Top => !props.flipped,
        }
    }
}

impl DesignRuleCheck for GaaDoubleHeightChecker {
    fn technology(&self) -> Technology {
        Technology::GaaDoubleHeight
    }

    fn extra_rules(&self, props: &LayerProperties) -> Vec<Rule> {
        nanosheet_rules(props)
    }

    fn rows(&self) -> Option<&SubCells> {
        Some(&self.subcells)
    }

    fn check_vdd_vss_position(&self, layout: &Layout, props: &LayerProperties) -> CheckResult {
        for cell in [SubCell::Bottom, SubCell::Top] {
            let res = rules::check_vdd_vss_position(
                layout,
                props,
                Self::flipped(cell, props),
                Some(self.subcells.span(cell)),
            );
            if !res.passed {
                return res;
            }
        }
        CheckResult::pass()
    }

    fn check_layer_layer_extension(
        &self,
        layout: &Layout,
        props: &LayerProperties,
        ext: &Extension,
    ) -> CheckResult {
        for cell in [SubCell::Bottom, SubCell::Top] {
            let res = rules::check_extension(layout, props, ext, Some(self.subcells.span(cell)));
            if !res.passed {
                return res;
            }
        }
        CheckResult::pass()
    }
}

#[enum_dispatch(DesignRuleCheck)]
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RuleChecker {
    CfetChecker,
    GaaChecker,
    FinfetChecker,
    GaaDoubleHeightChecker,
}

impl RuleChecker {
    /// Selects the checker for a layout's technology.
    pub fn new(props: &LayerProperties, layout: &Layout) -> Self {
        match props.technology {
            Technology::Cfet => CfetChecker.into(),
            Technology::FinFet => FinfetChecker.into(),
            Technology::Gaa if !props.double_height => GaaChecker.into(),
            Technology::Gaa | Technology::GaaDoubleHeight => GaaDoubleHeightChecker {
                subcells: SubCells::new(layout.bounds().unwrap_or_else(|| Rect::from_xy(0, 0, 0, 0))),
            }
            .into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use cellgeom::Quad;

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

    fn label(layer: LayerNum, x: i64, y: i64, s: &str) -> GdsElement {
        GdsElement::Text(GdsText {
            layer,
            datatype: 0,
            xy: vec![[x, y]],
            text: s.to_string(),
            presentation: None,
        })
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

    fn props(technology: Technology) -> LayerProperties {
        LayerProperties::builder()
            .technology(technology)
            .layer(1, LayerInfo::new("NanoSheet", LayerRole::NanoSheet, Dir::Horiz))
            .layer(2, LayerInfo::new("Gate", LayerRole::Gate, Dir::Vert).with_width(50))
            .layer(20, LayerInfo::new("M0", LayerRole::Metal, Dir::Horiz).with_width(20))
            .perm_layers(vec![20])
            .rules(Rules::builder().gate_extension(10).build().unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn evaluation_stops_at_first_failure() {
        let mut props = props(Technology::Gaa);
        let cell = layout(vec![rect(2, 0, 0, 48, 300), rect(20, 0, 90, 100, 110)], &props);
        let checker = RuleChecker::new(&props, &cell);
        let rules = checker.rules(&props, false);
        assert_eq!(rules[0], Rule::Width(2));
        assert_eq!(rules.last(), Some(&Rule::NanosheetGap(1)));

        let outcome = checker.check_drc(&cell, &mut props, false, false);
        assert!(!outcome.passed);
        assert_eq!(outcome.failed, Some(Rule::Width(2)));
        assert_eq!(outcome.evaluated, vec![Rule::Width(2)]);
    }

    #[test]
    fn update_mode_calibrates_and_continues() {
        let mut props = props(Technology::Gaa);
        let cell = layout(vec![rect(2, 0, 0, 48, 300), rect(20, 0, 90, 100, 110)], &props);
        let checker = RuleChecker::new(&props, &cell);
        let outcome = checker.check_drc(&cell, &mut props, false, true);
        assert!(outcome.passed);
        assert_eq!(props.layer(2).unwrap().width, Some(48));
        assert_eq!(outcome.corrections.len(), 1);
        assert_eq!(outcome.evaluated, checker.rules(&props, false));
    }

    #[test]
    fn calibration_must_satisfy_every_polygon() {
        let mut props = props(Technology::Gaa);
        let cell = layout(
            vec![
                rect(2, 0, 0, 48, 300),
                rect(2, 100, 0, 146, 300),
                rect(20, 0, 90, 100, 110),
            ],
            &props,
        );
        let checker = RuleChecker::new(&props, &cell);
        let outcome = checker.check_drc(&cell, &mut props, false, true);
        assert!(!outcome.passed);
        assert_eq!(outcome.failed, Some(Rule::Width(2)));
        assert_eq!(outcome.corrections.len(), 1);
        assert_eq!(outcome.evaluated, vec![Rule::Width(2)]);

        let recheck = checker.check_drc(&cell, &mut props, false, false);
        assert_eq!(recheck.failed, Some(Rule::Width(2)));
    }

    #[test]
    fn double_height_spacing_is_checked_per_row() {
        let mut props = props(Technology::GaaDoubleHeight);
        props.rules.nanosheet_gap = 30;
        // Rails at both outer edges put the midline at y = 200.
        let rails = || vec![rect(20, 0, 0, 100, 20), rect(20, 0, 380, 100, 400)];

        let mut elements = rails();
        elements.extend([rect(1, 0, 170, 100, 190), rect(1, 0, 210, 100, 230)]);
        let across = layout(elements, &props);
        let checker = RuleChecker::new(&props, &across);
        assert_eq!(checker.rows().map(|r| r.midline()), Some(200));
        let outcome = checker.check_drc(&across, &mut props, false, false);
        assert!(outcome.passed, "{:?}", outcome.failed);
        assert!(!GaaChecker.check_drc(&across, &mut props, false, false).passed);

        let mut elements = rails();
        elements.extend([rect(1, 0, 100, 100, 160), rect(1, 0, 170, 100, 190)]);
        let within = layout(elements, &props);
        let checker = RuleChecker::new(&props, &within);
        let outcome = checker.check_drc(&within, &mut props, false, false);
        assert_eq!(outcome.failed, Some(Rule::NanosheetGap(1)));
    }

    #[test]
    fn strict_adds_label_check() {
        let props = props(Technology::Cfet);
        let cell = layout(vec![rect(20, 0, 90, 100, 110)], &props);
        let checker = RuleChecker::new(&props, &cell);
        assert_eq!(checker.technology(), Technology::Cfet);
        let strict = checker.rules(&props, true);
        assert_eq!(strict.last(), Some(&Rule::Labels));
        assert!(strict.contains(&Rule::PairedPower));
        assert!(!checker.rules(&props, false).contains(&Rule::Labels));
    }

    #[test]
    fn double_height_checks_each_row() {
        let mut props = props(Technology::GaaDoubleHeight);
        props.double_height = true;
        // Shared VDD rail on the midline, VSS rails at the outer edges.
        let cell = layout(
            vec![
                rect(20, 0, 0, 100, 20),
                label(20, 50, 10, "VSS"),
                rect(20, 0, 190, 100, 210),
                label(20, 50, 200, "VDD"),
                rect(20, 0, 380, 100, 400),
                label(20, 50, 390, "VSS"),
            ],
            &props,
        );
        let checker = RuleChecker::new(&props, &cell);
        assert!(matches!(checker, RuleChecker::GaaDoubleHeightChecker(_)));
        assert!(checker.check_vdd_vss_position(&cell, &props).passed);
        assert!(!GaaChecker.check_vdd_vss_position(&cell, &props).passed);

        props.flipped = true;
        assert!(!checker.check_vdd_vss_position(&cell, &props).passed);
    }
}
