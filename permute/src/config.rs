//! Run configuration.

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{with_err_context, ErrorContext, ErrorSource, Result};
use crate::permutation::PermutationOptions;

/// Where accepted candidates are persisted.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowType {
    /// GDS-JSON files handed to an LVS client.
    #[default]
    Gds,
    /// A database collection. Not supported.
    Db,
}

/// Settings shared by every base layout in a run.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct PermuteConfig {
    /// Directory holding per-cell and shared layer maps.
    #[builder(setter(into))]
    pub layer_map_dir: PathBuf,
    /// Directory candidates are written to.
    #[builder(setter(into))]
    pub output_dir: PathBuf,
    #[builder(default, setter(strip_option))]
    pub limiter: Option<usize>,
    #[builder(default)]
    pub strict: bool,
    #[builder(default)]
    pub calibrate: bool,
    /// Command run on every candidate file; a zero exit status means LVS clean.
    #[builder(default, setter(strip_option))]
    pub lvs_command: Option<Vec<String>>,
    #[builder(default)]
    pub flow: FlowType,
}

impl Default for PermuteConfig {
    fn default() -> Self {
        Self {
            layer_map_dir: PathBuf::from("layermaps"),
            output_dir: PathBuf::from("permutations"),
            limiter: None,
            strict: false,
            calibrate: false,
            lvs_command: None,
            flow: FlowType::Gds,
        }
    }
}

impl PermuteConfig {
    #[inline]
    pub fn builder() -> PermuteConfigBuilder {
        PermuteConfigBuilder::default()
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = with_err_context(std::fs::read_to_string(path), || {
            ErrorContext::ReadFile(path.to_path_buf())
        })?;
        with_err_context(Self::from_toml_str(&s), || {
            ErrorContext::ReadFile(path.to_path_buf())
        })
    }

    /// Rejects settings no run could honor.
    pub fn validate(&self) -> Result<()> {
        if self.flow == FlowType::Db {
            return Err(ErrorSource::InvalidArgs(
                "the database flow is not supported; use the GDS flow".to_string(),
            )
            .into());
        }
        if let Some(cmd) = &self.lvs_command {
            if cmd.is_empty() {
                return Err(ErrorSource::InvalidArgs("empty LVS command".to_string()).into());
            }
        }
        Ok(())
    }

    pub fn options(&self) -> PermutationOptions {
        PermutationOptions {
            limiter: self.limiter,
            strict: self.strict,
            calibrate: self.calibrate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_fills_in_defaults() {
        let cfg = PermuteConfig::from_toml_str(
            r#"
            layer_map_dir = "maps"
            limiter = 4
            lvs_command = ["true"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.layer_map_dir, PathBuf::from("maps"));
        assert_eq!(cfg.output_dir, PathBuf::from("permutations"));
        assert_eq!(cfg.flow, FlowType::Gds);
        assert_eq!(cfg.options().limiter, Some(4));
        cfg.validate().unwrap();
    }

    #[test]
    fn db_flow_is_rejected() {
        let cfg = PermuteConfig::from_toml_str("flow = \"db\"").unwrap();
        assert!(matches!(
            cfg.validate().unwrap_err().source(),
            ErrorSource::InvalidArgs(_)
        ));
    }

    #[test]
    fn builder_requires_directories() {
        assert!(PermuteConfig::builder().limiter(1).build().is_err());
        let cfg = PermuteConfig::builder()
            .layer_map_dir("maps")
            .output_dir("out")
            .strict(true)
            .build()
            .unwrap();
        assert!(cfg.options().strict);
        assert_eq!(cfg.limiter, None);
    }
}
