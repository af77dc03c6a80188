//! The permutation engine.
//!
//! The engine owns one base layout and enumerates legal reassignments of its
//! permutable metal onto routing tracks. Every complete assignment is applied
//! to the live geometry, checked, submitted to the LVS client if clean, and
//! then rolled back.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::ops::ControlFlow;
use std::path::Path;

use arcstr::ArcStr;
use cellgeom::Rect;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::drc::{DesignRuleCheck, DrcOutcome, Rule, RuleChecker};
use crate::error::{with_err_context, ErrorContext, ErrorSource, PermuteError, Result};
use crate::gds::GdsLibrary;
use crate::layout::{Layout, SubCells};
use crate::log::{debug, info, trace, warn, Log};
use crate::tech::{base_layout_name, resolve_layer_map, LayerProperties, LayerRole, Technology};
use crate::verification::lvs::LvsClient;

use self::optimize::{optimize_layers, shift_to_track, UndoLog};
pub use self::search::search;
pub use self::space::SearchSpace;

pub mod optimize;
pub mod search;
pub mod space;

/// Knobs for one engine run.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default)]
pub struct PermutationOptions {
    /// The maximum number of candidates to accept.
    #[builder(setter(strip_option))]
    pub limiter: Option<usize>,
    /// Reject base layouts with labels that land on no polygon.
    pub strict: bool,
    /// Calibrate technology constants against the base layout before searching.
    pub calibrate: bool,
}

impl PermutationOptions {
    #[inline]
    pub fn builder() -> PermutationOptionsBuilder {
        PermutationOptionsBuilder::default()
    }
}

/// What happened to one candidate.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Evaluation {
    Rejected(Rule),
    Accepted { key: usize },
}

impl Evaluation {
    #[inline]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Counts and accepted assignments of one base layout.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PermutationReport {
    pub cell: ArcStr,
    pub drc_clean: usize,
    pub lvs_clean: usize,
    /// Complete assignments evaluated.
    pub candidates: usize,
    /// Accepted assignments, in acceptance order; index is the candidate key.
    pub accepted: Vec<Vec<usize>>,
    pub baseline: DrcOutcome,
    pub lvs_summary: String,
}

impl PermutationReport {
    fn empty(cell: ArcStr, baseline: DrcOutcome) -> Self {
        Self {
            cell,
            drc_clean: 0,
            lvs_clean: 0,
            candidates: 0,
            accepted: Vec::new(),
            baseline,
            lvs_summary: String::new(),
        }
    }
}

impl Display for PermutationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} DRC clean, {} LVS clean, {} evaluated",
            self.cell, self.drc_clean, self.lvs_clean, self.candidates
        )
    }
}

impl Log for PermutationReport {
    fn log(&self) {
        info!("{self}");
        if !self.lvs_summary.is_empty() {
            info!("{}: {}", self.cell, self.lvs_summary);
        }
    }
}

pub struct PermutationEngine {
    layout: Layout,
    props: LayerProperties,
    checker: RuleChecker,
    space: SearchSpace,
    subcells: Option<SubCells>,
    bounds: Rect,
    base_name: String,
    opts: PermutationOptions,
    drc_clean: usize,
}

impl PermutationEngine {
    /// Builds the geometry model and search space of a base layout.
    pub fn new(gds: &GdsLibrary, props: LayerProperties, opts: PermutationOptions) -> Result<Self> {
        let mut layout = Layout::from_gds(gds, &props)?;
        let bounds = layout.bounds().ok_or_else(|| {
            PermuteError::new(ErrorSource::InvalidArgs(format!(
                "layout {} has no primary geometry",
                layout.name()
            )))
        })?;
        let subcells = (props.double_height || props.technology == Technology::GaaDoubleHeight)
            .then(|| SubCells::new(bounds));
        let checker = RuleChecker::new(&props, &layout);

        layout.pair_devices(&props);
        layout.tag_dummy_islands(&props);

        let space = SearchSpace::build(&layout, &props, bounds, subcells.as_ref());
        let base_name = gds
            .base_layout_name
            .clone()
            .unwrap_or_else(|| layout.name().to_string());

        info!(
            "{}: {} layout, {} polygons, {} tracks, {} permutable",
            layout.name(),
            props.technology,
            layout.num_polygons(),
            space.num_tracks(),
            space.num_metals()
        );

        Ok(Self {
            layout,
            props,
            checker,
            space,
            subcells,
            bounds,
            base_name,
            opts,
            drc_clean: 0,
        })
    }

    /// Loads a GDS-JSON file and its layer map.
    pub fn from_files(
        gds_path: impl AsRef<Path>,
        layer_map_dir: impl AsRef<Path>,
        opts: PermutationOptions,
    ) -> Result<Self> {
        let gds_path = gds_path.as_ref();
        let map = resolve_layer_map(layer_map_dir, gds_path)?;
        let props = LayerProperties::from_file(map)?;
        let mut gds = GdsLibrary::from_file(gds_path)?;
        gds.base_layout_name
            .get_or_insert_with(|| base_layout_name(gds_path));
        Self::new(&gds, props, opts)
    }

    #[inline]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    #[inline]
    pub fn props(&self) -> &LayerProperties {
        &self.props
    }

    #[inline]
    pub fn checker(&self) -> &RuleChecker {
        &self.checker
    }

    #[inline]
    pub fn search_space(&self) -> &SearchSpace {
        &self.space
    }

    #[inline]
    pub fn drc_clean(&self) -> usize {
        self.drc_clean
    }

    /// Checks the unmodified base layout.
    ///
    /// In calibration mode, failing constants are overwritten with the values
    /// the base layout meets and the search space is rebuilt.
    pub fn baseline(&mut self) -> DrcOutcome {
        let outcome = self
            .checker
            .check_drc(&self.layout, &mut self.props, false, self.opts.calibrate);
        if !outcome.corrections.is_empty() {
            self.space = SearchSpace::build(
                &self.layout,
                &self.props,
                self.bounds,
                self.subcells.as_ref(),
            );
        }
        outcome
    }

    /// Applies one assignment, checks it, submits it if clean, and rolls back.
    pub fn evaluate(
        &mut self,
        assignment: &[usize],
        lvs: &mut dyn LvsClient,
    ) -> Result<Evaluation> {
        let space = std::mem::take(&mut self.space);
        let result = self.evaluate_in(&space, assignment, lvs);
        self.space = space;
        result
    }

    fn evaluate_in(
        &mut self,
        space: &SearchSpace,
        assignment: &[usize],
        lvs: &mut dyn LvsClient,
    ) -> Result<Evaluation> {
        if assignment.len() != space.num_metals() {
            return Err(ErrorSource::InvalidArgs(format!(
                "expected {} track indices, got {}",
                space.num_metals(),
                assignment.len()
            ))
            .into());
        }
        let mut log = UndoLog::new();
        let result = self.apply_and_check(space, assignment, &mut log, lvs);
        log.rollback(&mut self.layout);
        result
    }

    fn apply_and_check(
        &mut self,
        space: &SearchSpace,
        assignment: &[usize],
        log: &mut UndoLog,
        lvs: &mut dyn LvsClient,
    ) -> Result<Evaluation> {
        let (mut vias, mut texts) = (BTreeSet::new(), BTreeSet::new());
        let mut moved = Vec::new();
        for (metal, track) in assignment.iter().enumerate() {
            let id = space.metals()[metal];
            let y = *space.tracks().get(*track).ok_or_else(|| {
                PermuteError::new(ErrorSource::InvalidArgs(format!("no track {track}")))
            })?;
            if shift_to_track(&mut self.layout, id, y, &mut vias, &mut texts, log) {
                moved.push(id);
            }
        }
        optimize_layers(
            &mut self.layout,
            &self.props,
            self.subcells.as_ref(),
            &moved,
            log,
        );

        let outcome = self
            .checker
            .check_drc(&self.layout, &mut self.props, false, false);
        if let Some(rule) = outcome.failed {
            trace!("{}: {:?} rejected by {rule}", self.layout.name(), assignment);
            return Ok(Evaluation::Rejected(rule));
        }

        let key = self.drc_clean;
        self.drc_clean += 1;
        self.normalize_boundary(log);

        let mut gds = self.layout.to_gds();
        gds.base_layout_name = Some(self.base_name.clone());
        debug!(
            "{}: accepted {:?} as candidate {key}",
            self.layout.name(),
            assignment
        );
        lvs.add_gds_json(key, gds)?;
        Ok(Evaluation::Accepted { key })
    }

    /// Stretches the cell outline to the global bounds.
    fn normalize_boundary(&mut self, log: &mut UndoLog) {
        let outlines = self
            .layout
            .primary_with_role(LayerRole::Boundary)
            .map(|p| p.id())
            .collect::<Vec<_>>();
        for id in outlines {
            let rect = self.layout.polygon(id).rect();
            let target = rect.union(&self.bounds);
            if target != rect {
                log.record_polygon(&self.layout, id);
                self.layout.update_coords(id, target);
            }
        }
    }

    /// Runs the baseline check, the search, and the LVS join.
    ///
    /// In strict mode a base layout with floating labels is rejected as
    /// malformed input before anything else is checked.
    pub fn run(&mut self, lvs: &mut dyn LvsClient) -> Result<PermutationReport> {
        let cell = self.layout.name().clone();
        if self.opts.strict
            && !self
                .checker
                .evaluate(&Rule::Labels, &self.layout, &self.props)
                .passed
        {
            return Err(ErrorSource::FloatingLabels(cell).into());
        }
        let baseline = self.baseline();
        baseline.log();
        if !baseline.passed {
            warn!(
                "{cell}: base layout fails {}, skipping search",
                baseline
                    .failed
                    .map(|r| r.to_string())
                    .unwrap_or_default()
            );
            return Ok(PermutationReport::empty(cell, baseline));
        }

        let mut report = PermutationReport::empty(cell.clone(), baseline);
        if self.opts.limiter == Some(0) {
            return Ok(report);
        }

        let space = std::mem::take(&mut self.space);
        let drc_before = self.drc_clean;
        let mut failure = None;
        let mut accepted = Vec::new();
        let limiter = self.opts.limiter;
        report.candidates = search(&space, |assignment| {
            match self.evaluate_in(&space, assignment, lvs) {
                Ok(Evaluation::Accepted { .. }) => {
                    accepted.push(assignment.to_vec());
                    if limiter.map(|l| accepted.len() >= l).unwrap_or(false) {
                        return ControlFlow::Break(());
                    }
                }
                Ok(Evaluation::Rejected(_)) => {}
                Err(e) => {
                    failure = Some(e);
                    return ControlFlow::Break(());
                }
            }
            ControlFlow::Continue(())
        });
        self.space = space;
        if let Some(e) = failure {
            return Err(e);
        }

        let output = with_err_context(lvs.run(), || {
            ErrorContext::Task(arcstr::format!("running LVS on {cell}"))
        })?;
        report.drc_clean = self.drc_clean - drc_before;
        report.lvs_clean = lvs.lvs_clean_count();
        report.accepted = accepted;
        report.lvs_summary = output.report();
        report.log();
        Ok(report)
    }
}
