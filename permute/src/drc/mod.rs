//! Design-rule checking over the live geometry model.
//!
//! Each check is a pure predicate over a [`Layout`](crate::layout::Layout)
//! and the technology constants in
//! [`LayerProperties`](crate::tech::LayerProperties). A technology composes
//! the predicates into an ordered sequence of [`Rule`]s; evaluation stops at
//! the first failing rule.

use std::fmt::Display;

use cellgeom::Dir;
use serde::{Deserialize, Serialize};

use crate::log::{debug, Log};
use crate::tech::{Calibrated, Correction, LayerNum};

pub mod checker;
pub mod rules;

pub use checker::{
    CfetChecker, DesignRuleCheck, FinfetChecker, GaaChecker, GaaDoubleHeightChecker, RuleChecker,
};

/// The verdict of a single predicate.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct CheckResult {
    pub passed: bool,
    /// A value for the offending constant under which the layout would pass.
    pub suggested_correction: Option<Correction>,
}

impl CheckResult {
    #[inline]
    pub fn pass() -> Self {
        Self {
            passed: true,
            suggested_correction: None,
        }
    }

    #[inline]
    pub fn fail() -> Self {
        Self {
            passed: false,
            suggested_correction: None,
        }
    }

    #[inline]
    pub fn fail_with(field: Calibrated, value: i64) -> Self {
        Self {
            passed: false,
            suggested_correction: Some(Correction { field, value }),
        }
    }

    #[inline]
    pub fn from_bool(passed: bool) -> Self {
        Self {
            passed,
            suggested_correction: None,
        }
    }
}

/// Overhang of one layer past another it covers.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Extension {
    pub outer: LayerNum,
    pub inner: LayerNum,
    /// The direction along which the overhang is measured.
    pub dir: Dir,
    pub field: Calibrated,
    /// Only consider pairs joined by a via.
    pub linked: bool,
}

/// One predicate invocation in a technology's check sequence.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Rule {
    Width(LayerNum),
    Pitch(LayerNum),
    EndSpacing(LayerNum),
    Gap {
        a: LayerNum,
        b: LayerNum,
        dir: Dir,
        field: Calibrated,
    },
    Extension(Extension),
    ViaEnclosure(LayerNum),
    Connectivity,
    ViaIsolation(LayerNum),
    Hinder(LayerNum),
    VddVssPosition,
    DummyIslands,
    NanosheetGap(LayerNum),
    PairedPower,
    Labels,
}

impl Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Width(l) => write!(f, "width on layer {l}"),
            Self::Pitch(l) => write!(f, "pitch on layer {l}"),
            Self::EndSpacing(l) => write!(f, "end-to-end spacing on layer {l}"),
            Self::Gap { a, b, dir, .. } => write!(f, "{dir} gap between layers {a} and {b}"),
            Self::Extension(e) => write!(
                f,
                "{} extension of layer {} past layer {}",
                e.dir, e.outer, e.inner
            ),
            Self::ViaEnclosure(l) => write!(f, "via enclosure on layer {l}"),
            Self::Connectivity => write!(f, "connectivity"),
            Self::ViaIsolation(l) => write!(f, "via isolation on layer {l}"),
            Self::Hinder(l) => write!(f, "hinder on layer {l}"),
            Self::VddVssPosition => write!(f, "VDD/VSS position"),
            Self::DummyIslands => write!(f, "dummy islands"),
            Self::NanosheetGap(l) => write!(f, "nanosheet gap on layer {l}"),
            Self::PairedPower => write!(f, "paired power"),
            Self::Labels => write!(f, "label placement"),
        }
    }
}

/// The result of running a full check sequence.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DrcOutcome {
    pub passed: bool,
    /// The rule that stopped evaluation.
    pub failed: Option<Rule>,
    /// Every rule evaluated, in order.
    pub evaluated: Vec<Rule>,
    /// Corrections applied in update mode.
    pub corrections: Vec<Correction>,
}

impl Default for DrcOutcome {
    fn default() -> Self {
        Self {
            passed: true,
            failed: None,
            evaluated: Vec::new(),
            corrections: Vec::new(),
        }
    }
}

impl DrcOutcome {
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.passed
    }
}

impl Log for DrcOutcome {
    fn log(&self) {
        match self.failed {
            Some(rule) => debug!(
                "DRC failed on {rule} after {} checks",
                self.evaluated.len()
            ),
            None => debug!("DRC passed {} checks", self.evaluated.len()),
        }
        for c in self.corrections.iter() {
            debug!("  calibrated {c}");
        }
    }
}
