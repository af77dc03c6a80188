//! Parallel permutation of many base layouts.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::config::PermuteConfig;
use crate::error::{with_err_context, ErrorContext, ErrorSource, Result};
use crate::log::{error, info};
use crate::permutation::{PermutationEngine, PermutationReport};
use crate::verification::lvs::LvsClient;

/// The outcome of one base layout.
#[derive(Debug)]
pub struct BatchResult {
    pub path: PathBuf,
    pub report: Result<PermutationReport>,
}

impl BatchResult {
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.report.is_ok()
    }
}

/// Permutes every layout in `paths` independently.
///
/// `lvs_factory` builds one client per layout from its [`output_name`], so
/// layouts derived from the same base cell never share output. A failure in
/// one layout is logged and recorded in its [`BatchResult`]; the others keep
/// going. Only an invalid `cfg` or two inputs with the same output name fail
/// the whole batch.
pub fn run_batch<P, F>(paths: &[P], cfg: &PermuteConfig, lvs_factory: F) -> Result<Vec<BatchResult>>
where
    P: AsRef<Path> + Sync,
    F: Fn(&str) -> Result<Box<dyn LvsClient>> + Sync,
{
    cfg.validate()?;
    let mut names = HashSet::new();
    for path in paths {
        let name = output_name(path);
        if !names.insert(name.clone()) {
            return Err(ErrorSource::InvalidArgs(format!("more than one input named {name}")).into());
        }
    }
    info!("permuting {} layouts", paths.len());

    let results = paths
        .par_iter()
        .map(|path| {
            let path = path.as_ref();
            let report = with_err_context(permute_one(path, cfg, &lvs_factory), || {
                ErrorContext::Task(arcstr::format!("permuting {}", path.display()))
            });
            if let Err(e) = &report {
                error!("{e}");
            }
            BatchResult {
                path: path.to_path_buf(),
                report,
            }
        })
        .collect::<Vec<_>>();

    let failed = results.iter().filter(|r| !r.is_ok()).count();
    info!("finished {} layouts, {failed} failed", results.len());
    Ok(results)
}

/// The name a layout's output is filed under: its file stem.
pub fn output_name(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn permute_one<F>(path: &Path, cfg: &PermuteConfig, lvs_factory: &F) -> Result<PermutationReport>
where
    F: Fn(&str) -> Result<Box<dyn LvsClient>>,
{
    let mut engine = PermutationEngine::from_files(path, &cfg.layer_map_dir, cfg.options())?;
    let mut lvs = lvs_factory(&output_name(path))?;
    engine.run(lvs.as_mut())
}
