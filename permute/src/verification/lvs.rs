//! LVS client API.
//!
//! The permutation engine submits every DRC-clean candidate to an
//! [`LvsClient`] and joins on [`LvsClient::run`] once the search finishes.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::gds::GdsLibrary;

/// An enumeration describing the high-level result of a LVS run.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum LvsSummary {
    /// Every candidate passed.
    Pass,
    /// Nothing was submitted.
    Warn,
    /// At least one candidate failed.
    Fail,
}

impl LvsSummary {
    /// Checks if a [`LvsSummary`] describes a passing LVS run.
    pub fn is_ok(&self) -> bool {
        match self {
            Self::Pass | Self::Warn => true,
            Self::Fail => false,
        }
    }
}

/// Outputs emitted by [`LvsClient::run`].
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct LvsOutput {
    pub summary: LvsSummary,
    pub submitted: usize,
    pub clean: usize,
    /// Keys of the candidates that failed.
    pub failed: Vec<usize>,
}

impl LvsOutput {
    pub fn from_results(results: &BTreeMap<usize, bool>) -> Self {
        let failed = results
            .iter()
            .filter(|(_, clean)| !**clean)
            .map(|(key, _)| *key)
            .collect::<Vec<_>>();
        let submitted = results.len();
        let summary = if submitted == 0 {
            LvsSummary::Warn
        } else if failed.is_empty() {
            LvsSummary::Pass
        } else {
            LvsSummary::Fail
        };
        Self {
            summary,
            submitted,
            clean: submitted - failed.len(),
            failed,
        }
    }

    /// A one-line human-readable summary.
    pub fn report(&self) -> String {
        let mut s = format!(
            "LVS {:?}: {}/{} clean",
            self.summary, self.clean, self.submitted
        );
        if !self.failed.is_empty() {
            let _ = write!(s, "; failed {:?}", self.failed);
        }
        s
    }
}

/// The trait that LVS backends must implement.
pub trait LvsClient {
    /// Queues one candidate.
    fn add_gds_json(&mut self, key: usize, gds: GdsLibrary) -> Result<()>;

    /// Checks every queued candidate, blocking until done.
    fn run(&mut self) -> Result<LvsOutput>;

    /// The number of candidates found clean so far.
    fn lvs_clean_count(&self) -> usize;

    fn summary_report(&self) -> String;
}

type Judge = Box<dyn Fn(&GdsLibrary) -> bool + Send + Sync>;

/// An in-memory client that keeps every candidate it is given.
///
/// Candidates are judged by an optional predicate; without one every
/// candidate is clean.
#[derive(Default)]
pub struct MemoryLvs {
    queued: Vec<(usize, GdsLibrary)>,
    results: BTreeMap<usize, bool>,
    judge: Option<Judge>,
}

impl std::fmt::Debug for MemoryLvs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLvs")
            .field("queued", &self.queued.len())
            .field("results", &self.results)
            .finish()
    }
}

impl MemoryLvs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_judge(judge: impl Fn(&GdsLibrary) -> bool + Send + Sync + 'static) -> Self {
        Self {
            judge: Some(Box::new(judge)),
            ..Default::default()
        }
    }

    /// Every candidate received, in submission order.
    pub fn candidates(&self) -> &[(usize, GdsLibrary)] {
        &self.queued
    }

    pub fn keys(&self) -> Vec<usize> {
        self.queued.iter().map(|(k, _)| *k).collect()
    }
}

impl LvsClient for MemoryLvs {
    fn add_gds_json(&mut self, key: usize, gds: GdsLibrary) -> Result<()> {
        self.queued.push((key, gds));
        Ok(())
    }

    fn run(&mut self) -> Result<LvsOutput> {
        for (key, gds) in self.queued.iter() {
            if self.results.contains_key(key) {
                continue;
            }
            let clean = self.judge.as_ref().map(|j| j(gds)).unwrap_or(true);
            self.results.insert(*key, clean);
        }
        Ok(LvsOutput::from_results(&self.results))
    }

    fn lvs_clean_count(&self) -> usize {
        self.results.values().filter(|c| **c).count()
    }

    fn summary_report(&self) -> String {
        LvsOutput::from_results(&self.results).report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lib(name: &str) -> GdsLibrary {
        GdsLibrary::from_json_str(&format!(
            r#"{{"name": "{name}", "structures": [{{"name": "C", "elements": []}}]}}"#
        ))
        .unwrap()
    }

    #[test]
    fn judge_decides_clean_count() {
        let mut lvs = MemoryLvs::with_judge(|gds| gds.name != "BAD");
        lvs.add_gds_json(0, lib("A")).unwrap();
        lvs.add_gds_json(1, lib("BAD")).unwrap();
        assert_eq!(lvs.lvs_clean_count(), 0);

        let out = lvs.run().unwrap();
        assert_eq!(out.summary, LvsSummary::Fail);
        assert_eq!(out.failed, vec![1]);
        assert_eq!(lvs.lvs_clean_count(), 1);
        assert_eq!(lvs.keys(), vec![0, 1]);
        assert!(lvs.summary_report().contains("1/2 clean"));
    }

    #[test]
    fn empty_run_warns() {
        let mut lvs = MemoryLvs::new();
        let out = lvs.run().unwrap();
        assert_eq!(out.summary, LvsSummary::Warn);
        assert!(out.summary.is_ok());
    }
}
