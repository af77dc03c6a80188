use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use log::info;
use lvsdump::DumpLvs;
use permute::batch::run_batch;
use permute::verification::lvs::LvsClient;
use permute::PermuteConfig;

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    long_about = "Enumerate DRC-clean metal track permutations of standard-cell layouts"
)]
pub struct Args {
    /// A TOML run configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// The directory holding layer maps.
    #[arg(short, long)]
    layer_maps: Option<PathBuf>,
    /// The directory permutations are written to.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Stop after this many DRC-clean permutations per layout.
    #[arg(long)]
    limiter: Option<usize>,
    /// Require every label to land on a polygon.
    #[arg(long)]
    strict: bool,
    /// Calibrate technology constants against each base layout.
    #[arg(long)]
    calibrate: bool,
    /// The LVS command; each permutation's path is appended.
    #[arg(long, num_args = 1.., allow_hyphen_values = true)]
    lvs: Option<Vec<String>>,
    /// The input GDS-JSON files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<(PermuteConfig, Vec<PathBuf>)> {
        let mut cfg = match &self.config {
            Some(path) => PermuteConfig::from_file(path)?,
            None => PermuteConfig::default(),
        };
        if let Some(dir) = self.layer_maps {
            cfg.layer_map_dir = dir;
        }
        if let Some(dir) = self.output {
            cfg.output_dir = dir;
        }
        if self.limiter.is_some() {
            cfg.limiter = self.limiter;
        }
        cfg.strict |= self.strict;
        cfg.calibrate |= self.calibrate;
        if self.lvs.is_some() {
            cfg.lvs_command = self.lvs;
        }
        Ok((cfg, self.inputs))
    }
}

pub fn main() -> anyhow::Result<()> {
    env_logger::init();

    let (cfg, inputs) = Args::parse().into_config()?;
    let results = run_batch(&inputs, &cfg, |name| {
        let mut builder = DumpLvs::builder()
            .work_dir(cfg.output_dir.join(name))
            .cell(name);
        if let Some(cmd) = cfg.lvs_command.clone() {
            builder = builder.command(cmd);
        }
        let lvs = builder
            .build()
            .map_err(|e| permute::ErrorSource::InvalidArgs(e.to_string()))?;
        Ok(Box::new(lvs) as Box<dyn LvsClient>)
    })
    .context("invalid run configuration")?;

    let mut failed = 0;
    for result in results.iter() {
        match &result.report {
            Ok(report) => println!("{}: {report}", result.path.display()),
            Err(_) => failed += 1,
        }
    }
    info!("{} of {} layouts permuted", results.len() - failed, results.len());
    if failed > 0 {
        bail!("{failed} layouts failed");
    }
    Ok(())
}
