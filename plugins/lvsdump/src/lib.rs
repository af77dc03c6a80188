use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use arcstr::ArcStr;
use derive_builder::Builder;
use log::{debug, warn};
use permute::error::{with_err_context, ErrorContext, ErrorSource, Result};
use permute::gds::GdsLibrary;
use permute::verification::lvs::{LvsClient, LvsOutput};

/// Writes every candidate to `<work_dir>/<cell>_<key>.json` and checks it
/// with an external command.
///
/// The command is run once per file with the file path appended; a zero exit
/// status counts as LVS clean. Without a command every written file is clean.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[non_exhaustive]
#[builder(pattern = "owned")]
pub struct DumpLvs {
    #[builder(setter(into))]
    pub work_dir: PathBuf,
    #[builder(setter(into))]
    pub cell: ArcStr,
    #[builder(setter(strip_option), default)]
    pub command: Option<Vec<String>>,
    #[builder(setter(skip))]
    written: Vec<(usize, PathBuf)>,
    #[builder(setter(skip))]
    results: BTreeMap<usize, bool>,
}

impl DumpLvs {
    pub fn builder() -> DumpLvsBuilder {
        DumpLvsBuilder::default()
    }

    /// Files written so far, keyed by candidate.
    pub fn written(&self) -> &[(usize, PathBuf)] {
        &self.written
    }

    fn check(&self, path: &Path) -> Result<bool> {
        let Some((program, args)) = self.command.as_ref().and_then(|c| c.split_first()) else {
            return Ok(true);
        };
        let status = Command::new(program)
            .args(args)
            .arg(path)
            .status()
            .map_err(|e| ErrorSource::Lvs(format!("failed to run {program}: {e}")))?;
        if !status.success() {
            debug!("{program} rejected {path:?} ({status})");
        }
        Ok(status.success())
    }
}

impl LvsClient for DumpLvs {
    fn add_gds_json(&mut self, key: usize, gds: GdsLibrary) -> Result<()> {
        if self.written.is_empty() {
            with_err_context(std::fs::create_dir_all(&self.work_dir), || {
                ErrorContext::CreateDir(self.work_dir.clone())
            })?;
        }
        let path = self.work_dir.join(format!("{}_{key}.json", self.cell));
        gds.write_to(&path)?;
        self.written.push((key, path));
        Ok(())
    }

    fn run(&mut self) -> Result<LvsOutput> {
        for (key, path) in self.written.iter() {
            if self.results.contains_key(key) {
                continue;
            }
            let clean = self.check(path)?;
            self.results.insert(*key, clean);
        }
        let output = LvsOutput::from_results(&self.results);
        if !output.summary.is_ok() {
            warn!("{}: {}", self.cell, output.report());
        }
        Ok(output)
    }

    fn lvs_clean_count(&self) -> usize {
        self.results.values().filter(|c| **c).count()
    }

    fn summary_report(&self) -> String {
        LvsOutput::from_results(&self.results).report()
    }
}
